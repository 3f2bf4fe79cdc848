use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};
use validator::Validate;

use super::repo_types::{Gender, SortDirection, SortField, User};
use super::validation::{
    validate_birthdate, validate_first_name, validate_gender, validate_last_name,
    validate_optional_birthdate, validate_optional_password, validate_username, FieldErrors,
};

time::serde::format_description!(iso_date, Date, "[year]-[month]-[day]");

/// Raw list parameters as they arrive on the query string.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListUsersQuery {
    pub page: Option<String>,
    pub sort_by: Option<String>,
    pub sort_dir: Option<String>,
    pub q: Option<String>,
}

impl ListUsersQuery {
    /// Collects every invalid parameter; returns the parsed page on success.
    pub fn check(&self) -> Result<i64, FieldErrors> {
        let mut errors = FieldErrors::default();

        let page = match self.page.as_deref().map(str::trim) {
            None | Some("") => 1,
            Some(raw) => match raw.parse::<i64>() {
                Ok(p) if p >= 1 => p,
                _ => {
                    errors.add("page", "Invalid page");
                    1
                }
            },
        };
        if let Some(raw) = self.sort_by.as_deref() {
            if SortField::parse(raw).is_none() {
                errors.add("sortBy", "Invalid sort field");
            }
        }
        if let Some(raw) = self.sort_dir.as_deref() {
            if SortDirection::parse(raw).is_none() {
                errors.add("sortDir", "Invalid sort direction");
            }
        }
        if let Some(q) = self.q.as_deref() {
            if q.trim().chars().count() > 100 {
                errors.add("q", "Query too long");
            }
        }

        if errors.is_empty() {
            Ok(page)
        } else {
            Err(errors)
        }
    }
}

/// Body of `POST /admin/users`.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct CreateUserRequest {
    #[serde(default)]
    #[validate(custom(function = "validate_username"))]
    pub username: String,
    #[serde(default)]
    #[validate(length(min = 6, message = "Password must be at least 6 characters"))]
    pub password: String,
    #[serde(default)]
    #[validate(custom(function = "validate_first_name"))]
    pub first_name: String,
    #[serde(default)]
    #[validate(custom(function = "validate_last_name"))]
    pub last_name: String,
    #[serde(default)]
    #[validate(custom(function = "validate_gender"))]
    pub gender: String,
    #[serde(default)]
    #[validate(custom(function = "validate_birthdate"))]
    pub birthdate: String,
}

impl CreateUserRequest {
    /// Trims the text fields the way the form layer does. Passwords are kept verbatim.
    pub fn normalized(mut self) -> Self {
        self.username = self.username.trim().to_string();
        self.first_name = self.first_name.trim().to_string();
        self.last_name = self.last_name.trim().to_string();
        self.birthdate = self.birthdate.trim().to_string();
        self
    }
}

/// Body of `PUT /admin/users/:id`. Absent and `null` fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct UpdateUserRequest {
    #[validate(custom(function = "validate_username"))]
    pub username: Option<String>,
    #[validate(custom(function = "validate_optional_password"))]
    pub password: Option<String>,
    #[validate(custom(function = "validate_first_name"))]
    pub first_name: Option<String>,
    #[validate(custom(function = "validate_last_name"))]
    pub last_name: Option<String>,
    #[validate(custom(function = "validate_gender"))]
    pub gender: Option<String>,
    #[validate(custom(function = "validate_optional_birthdate"))]
    pub birthdate: Option<String>,
}

impl UpdateUserRequest {
    pub fn normalized(mut self) -> Self {
        for field in [
            &mut self.username,
            &mut self.first_name,
            &mut self.last_name,
            &mut self.birthdate,
        ] {
            if let Some(v) = field.as_mut() {
                *v = v.trim().to_string();
            }
        }
        self
    }
}

/// User as exposed to the panel; the password hash never appears here.
#[derive(Debug, Clone, Serialize)]
pub struct PublicUser {
    pub id: i64,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub gender: Gender,
    #[serde(with = "iso_date")]
    pub birthdate: Date,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl From<User> for PublicUser {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            username: u.username,
            first_name: u.first_name,
            last_name: u.last_name,
            gender: u.gender,
            birthdate: u.birthdate,
            created_at: u.created_at,
            updated_at: u.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct UserListResponse {
    pub users: Vec<PublicUser>,
    pub page: i64,
    pub page_size: i64,
    pub total_count: i64,
    pub total_pages: i64,
    pub sort_by: SortField,
    pub sort_dir: SortDirection,
    pub q: String,
}

pub fn total_pages(total_count: i64, page_size: i64) -> i64 {
    if page_size <= 0 {
        return 0;
    }
    (total_count + page_size - 1) / page_size
}
