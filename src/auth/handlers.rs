use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use axum::{
    extract::{ConnectInfo, FromRef, State},
    routing::{get, post},
    Json, Router,
};
use tracing::{info, instrument, warn};
use validator::Validate;

use crate::{
    auth::{
        dto::{LoginRequest, LoginResponse},
        extractors::AdminUser,
        jwt::JwtKeys,
    },
    error::AppError,
    state::AppState,
    users::dto::PublicUser,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new().route("/auth/login", post(login))
}

pub fn me_routes() -> Router<AppState> {
    Router::new().route("/me", get(get_me))
}

#[instrument(skip(state, connect, payload))]
pub async fn login(
    State(state): State<AppState>,
    connect: Option<ConnectInfo<SocketAddr>>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    let ip = connect
        .map(|ConnectInfo(addr)| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
    if !state.limiter.check(ip) {
        return Err(AppError::TooManyRequests(
            "Too many login attempts. Please try again later.",
        ));
    }

    let payload = payload.normalized();
    payload.validate()?;

    let identity = state
        .verifier
        .verify(&payload.username, &payload.password)
        .await?
        .ok_or_else(|| {
            warn!("login with invalid credentials");
            AppError::Unauthorized("Invalid credentials")
        })?;

    if !identity.is_admin {
        warn!(user_id = identity.id, "non-admin login refused");
        return Err(AppError::Forbidden(
            "Insufficient permissions: administrator access required",
        ));
    }

    let user = state
        .repo
        .find_by_id(identity.id)
        .await
        .map_err(anyhow::Error::from)?
        .ok_or(AppError::Unauthorized("Invalid credentials"))?;

    let keys = JwtKeys::from_ref(&state);
    let access_token = keys.sign(&identity)?;

    info!(user_id = identity.id, "admin logged in");
    Ok(Json(LoginResponse {
        access_token,
        token_type: "Bearer",
        expires_in: keys.ttl.as_secs(),
        user: PublicUser::from(user),
    }))
}

#[instrument(skip(state))]
pub async fn get_me(
    State(state): State<AppState>,
    AdminUser(user_id): AdminUser,
) -> Result<Json<PublicUser>, AppError> {
    let user = state
        .repo
        .find_by_id(user_id)
        .await
        .map_err(anyhow::Error::from)?
        .ok_or_else(|| {
            warn!(user_id, "token subject no longer exists");
            AppError::Unauthorized("User not found")
        })?;
    Ok(Json(PublicUser::from(user)))
}

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
    };
    use serde_json::{json, Value};
    use time::macros::date;
    use tower::ServiceExt;

    use std::sync::Arc;

    use crate::auth::password::Passwords;
    use crate::users::memory::MemoryUserRepository;
    use crate::users::repo_types::{Gender, NewUser};

    use super::*;

    fn fake() -> (AppState, Arc<MemoryUserRepository>) {
        let repo = Arc::new(MemoryUserRepository::default());
        (AppState::fake_with(repo.clone()), repo)
    }

    async fn seed(repo: &MemoryUserRepository, username: &str, is_admin: bool) -> i64 {
        let hash = Passwords::fast().hash("Secret1".into()).await.unwrap();
        repo.insert_raw(NewUser {
            username: username.into(),
            password_hash: hash,
            first_name: "First".into(),
            last_name: "Last".into(),
            gender: Gender::Female,
            birthdate: date!(1985 - 03 - 14),
            is_admin,
        })
        .id
    }

    fn app(state: AppState) -> Router {
        crate::auth::router().with_state(state)
    }

    fn login_request(username: &str, password: &str) -> Request<Body> {
        Request::post("/auth/login")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(
                json!({ "username": username, "password": password }).to_string(),
            ))
            .unwrap()
    }

    async fn body_json(res: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn admin_login_then_me() {
        let (state, repo) = fake();
        let admin_id = seed(&repo, "admin", true).await;

        let res = app(state.clone())
            .oneshot(login_request("admin", "Secret1"))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let body = body_json(res).await;
        assert_eq!(body["token_type"], "Bearer");
        assert_eq!(body["user"]["id"], admin_id);
        assert!(body["user"].get("password_hash").is_none());
        let token = body["access_token"].as_str().unwrap().to_string();

        let res = app(state)
            .oneshot(
                Request::get("/me")
                    .header(header::AUTHORIZATION, format!("Bearer {token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(body_json(res).await["username"], "admin");
    }

    #[tokio::test]
    async fn wrong_password_and_unknown_user_get_401() {
        let (state, repo) = fake();
        seed(&repo, "admin", true).await;

        for (username, password) in [("admin", "Wrong12"), ("ghost1", "Secret1")] {
            let res = app(state.clone())
                .oneshot(login_request(username, password))
                .await
                .unwrap();
            assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
            assert_eq!(body_json(res).await["error"], "Invalid credentials");
        }
    }

    #[tokio::test]
    async fn regular_user_cannot_sign_in() {
        let (state, repo) = fake();
        seed(&repo, "alice01", false).await;

        let res = app(state)
            .oneshot(login_request("alice01", "Secret1"))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn short_fields_are_rejected_before_lookup() {
        let state = AppState::fake();
        let res = app(state).oneshot(login_request("ab", "123")).await.unwrap();
        assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = body_json(res).await;
        assert!(body["errors"]["username"].is_string());
        assert!(body["errors"]["password"].is_string());
    }

    #[tokio::test]
    async fn repeated_attempts_are_throttled() {
        let state = AppState::fake();
        let max = state.config.login_limit.max_attempts;
        for _ in 0..max {
            let res = app(state.clone())
                .oneshot(login_request("ghost1", "Secret1"))
                .await
                .unwrap();
            assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        }
        let res = app(state)
            .oneshot(login_request("ghost1", "Secret1"))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn me_requires_a_token() {
        let res = app(AppState::fake())
            .oneshot(Request::get("/me").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }
}
