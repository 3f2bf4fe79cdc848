use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::users::dto::PublicUser;

/// Request body for login.
#[derive(Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    #[serde(default)]
    #[validate(length(min = 3, max = 100, message = "Username length must be 3–100 characters"))]
    pub username: String,
    #[serde(default)]
    #[validate(length(min = 6, max = 100, message = "Password length must be 6–100 characters"))]
    pub password: String,
}

impl LoginRequest {
    pub fn normalized(mut self) -> Self {
        self.username = self.username.trim().to_string();
        self
    }
}

/// Response returned after a successful login.
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_in: u64,
    pub user: PublicUser,
}
