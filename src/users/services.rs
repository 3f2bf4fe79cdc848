use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use super::dto::{CreateUserRequest, UpdateUserRequest};
use super::repo::{RepoError, UserRepository};
use super::repo_types::{
    Gender, NewUser, RoleScope, SortDirection, SortField, User, UserPage, UserQuery,
};
use super::validation::{check_birthdate, check_name, check_username, FieldErrors};
use crate::auth::password::Passwords;

#[derive(Debug, Error)]
pub enum UserError {
    #[error("validation failed: {0}")]
    Validation(FieldErrors),
    #[error("duplicate username")]
    DuplicateUsername,
    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl UserError {
    fn invalid(field: &str, message: &str) -> Self {
        Self::Validation(FieldErrors::single(field, message))
    }
}

fn check_first_name(value: &str) -> Result<(), UserError> {
    check_name(value, "First name is required", "Max first name length is 100 characters")
        .map_err(|m| UserError::invalid("first_name", m))
}

fn check_last_name(value: &str) -> Result<(), UserError> {
    check_name(value, "Last name is required", "Max last name length is 100 characters")
        .map_err(|m| UserError::invalid("last_name", m))
}

impl From<RepoError> for UserError {
    fn from(e: RepoError) -> Self {
        match e {
            RepoError::DuplicateUsername => Self::DuplicateUsername,
            RepoError::Store(e) => Self::Store(e),
        }
    }
}

/// Raw list options; anything unknown falls back to the defaults.
#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    pub sort_by: Option<String>,
    pub sort_dir: Option<String>,
    pub q: Option<String>,
}

/// Result of a list call plus the normalized options that produced it.
#[derive(Debug, Clone)]
pub struct UserListing {
    pub users: Vec<User>,
    pub total_count: i64,
    pub sort_by: SortField,
    pub sort_dir: SortDirection,
    pub q: String,
}

/// Business rules for the regular user-management surface.
///
/// Administrator rows are invisible here: list never returns them, and
/// get/update/delete answer exactly as they would for a missing id.
#[derive(Clone)]
pub struct UserService {
    repo: Arc<dyn UserRepository>,
    passwords: Passwords,
}

impl UserService {
    pub fn new(repo: Arc<dyn UserRepository>, passwords: Passwords) -> Self {
        Self { repo, passwords }
    }

    #[instrument(skip(self, options))]
    pub async fn list(
        &self,
        page: i64,
        page_size: i64,
        options: ListOptions,
    ) -> Result<UserListing, UserError> {
        let sort_by = options
            .sort_by
            .as_deref()
            .and_then(SortField::parse)
            .unwrap_or_default();
        let sort_dir = options
            .sort_dir
            .as_deref()
            .and_then(SortDirection::parse)
            .unwrap_or_default();
        let q = options.q.as_deref().unwrap_or("").trim().to_string();

        let query = UserQuery {
            page: page.max(1),
            limit: page_size.max(1),
            sort: sort_by,
            direction: sort_dir,
            filter: (!q.is_empty()).then(|| q.clone()),
            scope: RoleScope::NonAdmins,
        };
        let UserPage { rows, total_count } = self.repo.query(&query).await?;
        debug!(returned = rows.len(), total_count, "listed users");

        Ok(UserListing {
            users: rows,
            total_count,
            sort_by,
            sort_dir,
            q,
        })
    }

    #[instrument(skip(self))]
    pub async fn get_by_id(&self, id: i64) -> Result<Option<User>, UserError> {
        let user = self.repo.find_by_id(id).await?;
        Ok(user.filter(|u| !u.is_admin))
    }

    #[instrument(skip(self, data), fields(username = %data.username.trim()))]
    pub async fn create(&self, data: CreateUserRequest) -> Result<User, UserError> {
        let data = data.normalized();
        if data.username.is_empty() || data.password.is_empty() {
            return Err(UserError::invalid(
                if data.username.is_empty() { "username" } else { "password" },
                "Missing username or password",
            ));
        }
        if data.first_name.is_empty() || data.last_name.is_empty() {
            return Err(UserError::invalid(
                if data.first_name.is_empty() { "first_name" } else { "last_name" },
                "Missing first_name or last_name",
            ));
        }
        check_username(&data.username).map_err(|m| UserError::invalid("username", m))?;
        check_first_name(&data.first_name)?;
        check_last_name(&data.last_name)?;
        let gender =
            Gender::parse(&data.gender).ok_or_else(|| UserError::invalid("gender", "Invalid gender"))?;
        let birthdate =
            check_birthdate(&data.birthdate).map_err(|m| UserError::invalid("birthdate", m))?;

        let password_hash = self.passwords.hash(data.password).await?;
        let new_user = NewUser {
            username: data.username,
            password_hash,
            first_name: data.first_name,
            last_name: data.last_name,
            gender,
            birthdate,
            is_admin: false,
        };

        let user = self.repo.create(new_user).await.map_err(|e| {
            if matches!(e, RepoError::DuplicateUsername) {
                warn!("username already taken");
            }
            UserError::from(e)
        })?;
        info!(user_id = user.id, "user created");
        Ok(user)
    }

    /// Partial update. `Ok(None)` when the id is missing or belongs to an administrator.
    #[instrument(skip(self, data))]
    pub async fn update(&self, id: i64, data: UpdateUserRequest) -> Result<Option<User>, UserError> {
        let Some(mut user) = self.get_by_id(id).await? else {
            return Ok(None);
        };

        let data = data.normalized();
        if let Some(username) = data.username {
            check_username(&username).map_err(|m| UserError::invalid("username", m))?;
            user.username = username;
        }
        if let Some(first_name) = data.first_name {
            check_first_name(&first_name)?;
            user.first_name = first_name;
        }
        if let Some(last_name) = data.last_name {
            check_last_name(&last_name)?;
            user.last_name = last_name;
        }
        if let Some(gender) = data.gender {
            user.gender =
                Gender::parse(&gender).ok_or_else(|| UserError::invalid("gender", "Invalid gender"))?;
        }
        // a blank birthdate keeps the stored one
        if let Some(raw) = data.birthdate.as_deref().filter(|v| !v.is_empty()) {
            user.birthdate =
                check_birthdate(raw).map_err(|m| UserError::invalid("birthdate", m))?;
        }
        if let Some(password) = data.password.filter(|p| !p.is_empty()) {
            user.password_hash = self.passwords.hash(password).await?;
        }

        let Some(updated) = self.repo.update(&user).await? else {
            warn!(user_id = id, "user deleted during update");
            return Ok(None);
        };
        info!(user_id = updated.id, "user updated");
        Ok(Some(updated))
    }

    /// `false` when the id is missing or belongs to an administrator.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: i64) -> Result<bool, UserError> {
        let Some(user) = self.get_by_id(id).await? else {
            return Ok(false);
        };
        self.repo.delete(&user).await?;
        info!(user_id = id, "user deleted");
        Ok(true)
    }
}
