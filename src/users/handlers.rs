use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use tracing::{info, instrument};
use validator::Validate;

use super::dto::{
    total_pages, CreateUserRequest, ListUsersQuery, PublicUser, UpdateUserRequest,
    UserListResponse,
};
use super::services::ListOptions;
use super::validation::FieldErrors;
use crate::{auth::extractors::AdminUser, error::AppError, state::AppState};

// --- public routers ---

pub fn read_routes() -> Router<AppState> {
    Router::new()
        .route("/admin/users", get(list_users))
        .route("/admin/users/:id", get(get_user))
}

pub fn write_routes() -> Router<AppState> {
    Router::new()
        .route("/admin/users", axum::routing::post(create_user))
        .route(
            "/admin/users/:id",
            axum::routing::put(update_user).delete(delete_user),
        )
}

fn parse_id(raw: &str) -> Result<i64, AppError> {
    raw.trim()
        .parse::<i64>()
        .ok()
        .filter(|id| *id > 0)
        .ok_or_else(|| FieldErrors::single("id", "Invalid ID").into())
}

// --- handlers ---

#[instrument(skip(state, params))]
pub async fn list_users(
    State(state): State<AppState>,
    _admin: AdminUser,
    Query(params): Query<ListUsersQuery>,
) -> Result<Json<UserListResponse>, AppError> {
    let page = params.check()?;
    let page_size = state.config.page_size;

    let listing = state
        .users
        .list(
            page,
            page_size,
            ListOptions {
                sort_by: params.sort_by,
                sort_dir: params.sort_dir,
                q: params.q,
            },
        )
        .await?;

    Ok(Json(UserListResponse {
        total_pages: total_pages(listing.total_count, page_size),
        users: listing.users.into_iter().map(PublicUser::from).collect(),
        page,
        page_size,
        total_count: listing.total_count,
        sort_by: listing.sort_by,
        sort_dir: listing.sort_dir,
        q: listing.q,
    }))
}

#[instrument(skip(state))]
pub async fn get_user(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<String>,
) -> Result<Json<PublicUser>, AppError> {
    let id = parse_id(&id)?;
    let user = state.users.get_by_id(id).await?.ok_or(AppError::NotFound)?;
    Ok(Json(user.into()))
}

#[instrument(skip(state, payload))]
pub async fn create_user(
    State(state): State<AppState>,
    AdminUser(admin_id): AdminUser,
    Json(payload): Json<CreateUserRequest>,
) -> Result<impl IntoResponse, AppError> {
    let payload = payload.normalized();
    payload.validate()?;

    let user = state.users.create(payload).await?;
    info!(admin_id, user_id = user.id, "user created via panel");

    let location = format!("/admin/users/{}", user.id);
    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, location)],
        Json(PublicUser::from(user)),
    ))
}

#[instrument(skip(state, payload))]
pub async fn update_user(
    State(state): State<AppState>,
    AdminUser(admin_id): AdminUser,
    Path(id): Path<String>,
    Json(payload): Json<UpdateUserRequest>,
) -> Result<Json<PublicUser>, AppError> {
    let id = parse_id(&id)?;
    if state.users.get_by_id(id).await?.is_none() {
        return Err(AppError::NotFound);
    }

    let payload = payload.normalized();
    payload.validate()?;

    let user = state
        .users
        .update(id, payload)
        .await?
        .ok_or(AppError::NotFound)?;
    info!(admin_id, user_id = id, "user updated via panel");
    Ok(Json(user.into()))
}

#[instrument(skip(state))]
pub async fn delete_user(
    State(state): State<AppState>,
    AdminUser(admin_id): AdminUser,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let id = parse_id(&id)?;
    if !state.users.delete(id).await? {
        return Err(AppError::NotFound);
    }
    info!(admin_id, user_id = id, "user deleted via panel");
    Ok(StatusCode::NO_CONTENT)
}
