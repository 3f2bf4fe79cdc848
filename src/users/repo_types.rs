use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::{Date, OffsetDateTime};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "user_gender", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "male" => Some(Self::Male),
            "female" => Some(Self::Female),
            _ => None,
        }
    }
}

/// User record in the database.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub password_hash: String, // never leaves the service layer
    pub first_name: String,
    pub last_name: String,
    pub gender: Gender,
    pub birthdate: Date,
    pub is_admin: bool,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Row to insert; `is_admin` is only ever true on the provisioning path.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub gender: Gender,
    pub birthdate: Date,
    pub is_admin: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    #[default]
    Username,
    FullName,
    Birthdate,
}

impl SortField {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "username" => Some(Self::Username),
            "full_name" => Some(Self::FullName),
            "birthdate" => Some(Self::Birthdate),
            _ => None,
        }
    }

    /// Columns to order by, most significant first. `id` is not included.
    pub fn columns(self) -> &'static [&'static str] {
        match self {
            Self::Username => &["username"],
            Self::FullName => &["first_name", "last_name"],
            Self::Birthdate => &["birthdate"],
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "asc" => Some(Self::Asc),
            "desc" => Some(Self::Desc),
            _ => None,
        }
    }

    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RoleScope {
    #[default]
    All,
    NonAdmins,
}

/// Fully-normalized list query handed to the repository.
#[derive(Debug, Clone)]
pub struct UserQuery {
    pub page: i64,
    pub limit: i64,
    pub sort: SortField,
    pub direction: SortDirection,
    pub filter: Option<String>,
    pub scope: RoleScope,
}

impl UserQuery {
    pub fn offset(&self) -> i64 {
        (self.page.max(1) - 1).saturating_mul(self.limit)
    }
}

#[derive(Debug, Clone)]
pub struct UserPage {
    pub rows: Vec<User>,
    pub total_count: i64,
}
