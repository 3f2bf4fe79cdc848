use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder};
use thiserror::Error;
use tracing::{debug, instrument, warn};

use super::repo_types::{NewUser, RoleScope, User, UserPage, UserQuery};

const USER_COLUMNS: &str = "id, username, password_hash, first_name, last_name, gender, \
                            birthdate, is_admin, created_at, updated_at";

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("duplicate username")]
    DuplicateUsername,
    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),
}

/// Persistence operations over the `users` table.
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// One page of matching rows plus the total match count.
    async fn query(&self, q: &UserQuery) -> Result<UserPage, RepoError>;
    async fn find_by_id(&self, id: i64) -> Result<Option<User>, RepoError>;
    /// Exact, case-sensitive username lookup.
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, RepoError>;
    /// Insert after checking the username is free.
    async fn create(&self, new_user: NewUser) -> Result<User, RepoError>;
    /// Persist every mutable column of `user`. `is_admin` is never written.
    /// `None` when the row is gone.
    async fn update(&self, user: &User) -> Result<Option<User>, RepoError>;
    async fn delete(&self, user: &User) -> Result<(), RepoError>;
}

/// Translate a unique-index violation into [`RepoError::DuplicateUsername`].
fn map_write_error(e: sqlx::Error) -> RepoError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            warn!(constraint = ?db.constraint(), "unique violation on users write");
            RepoError::DuplicateUsername
        }
        _ => RepoError::Store(e),
    }
}

/// Escape LIKE metacharacters so the filter is matched literally.
pub(crate) fn escape_like(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len() + 2);
    for c in raw.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn push_where(qb: &mut QueryBuilder<'_, Postgres>, q: &UserQuery) {
    let mut has_clause = false;

    if q.scope == RoleScope::NonAdmins {
        qb.push(" WHERE is_admin = FALSE");
        has_clause = true;
    }

    if let Some(filter) = q.filter.as_deref().filter(|f| !f.is_empty()) {
        let pattern = format!("%{}%", escape_like(filter));
        qb.push(if has_clause { " AND (" } else { " WHERE (" });
        let mut first = true;
        for column in ["username", "first_name", "last_name"] {
            if !first {
                qb.push(" OR ");
            }
            first = false;
            qb.push(column);
            qb.push(" ILIKE ");
            qb.push_bind(pattern.clone());
            qb.push(" ESCAPE '\\'");
        }
        qb.push(")");
    }
}

fn push_order(qb: &mut QueryBuilder<'_, Postgres>, q: &UserQuery) {
    let dir = q.direction.as_sql();
    qb.push(" ORDER BY ");
    for column in q.sort.columns() {
        qb.push(*column);
        qb.push(" ");
        qb.push(dir);
        qb.push(", ");
    }
    // id keeps equal sort keys in a stable order across pages
    qb.push("id ");
    qb.push(dir);
}

pub(crate) fn build_select(q: &UserQuery) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new(format!("SELECT {USER_COLUMNS} FROM users"));
    push_where(&mut qb, q);
    push_order(&mut qb, q);
    qb.push(" LIMIT ");
    qb.push_bind(q.limit);
    qb.push(" OFFSET ");
    qb.push_bind(q.offset());
    qb
}

pub(crate) fn build_count(q: &UserQuery) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM users");
    push_where(&mut qb, q);
    qb
}

#[derive(Clone)]
pub struct PgUserRepository {
    db: PgPool,
}

impl PgUserRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    #[instrument(skip(self))]
    async fn query(&self, q: &UserQuery) -> Result<UserPage, RepoError> {
        let rows = build_select(q)
            .build_query_as::<User>()
            .fetch_all(&self.db)
            .await?;
        let total_count = build_count(q)
            .build_query_scalar::<i64>()
            .fetch_one(&self.db)
            .await?;
        debug!(rows = rows.len(), total_count, "users page loaded");
        Ok(UserPage { rows, total_count })
    }

    #[instrument(skip(self))]
    async fn find_by_id(&self, id: i64) -> Result<Option<User>, RepoError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    #[instrument(skip(self))]
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, RepoError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = $1"
        ))
        .bind(username)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    #[instrument(skip(self, new_user), fields(username = %new_user.username))]
    async fn create(&self, new_user: NewUser) -> Result<User, RepoError> {
        if self.find_by_username(&new_user.username).await?.is_some() {
            return Err(RepoError::DuplicateUsername);
        }

        // The unique index still decides between concurrent inserts.
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (username, password_hash, first_name, last_name, gender, birthdate, is_admin)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(&new_user.username)
        .bind(&new_user.password_hash)
        .bind(&new_user.first_name)
        .bind(&new_user.last_name)
        .bind(new_user.gender)
        .bind(new_user.birthdate)
        .bind(new_user.is_admin)
        .fetch_one(&self.db)
        .await
        .map_err(map_write_error)?;
        Ok(user)
    }

    #[instrument(skip(self, user), fields(user_id = user.id))]
    async fn update(&self, user: &User) -> Result<Option<User>, RepoError> {
        if let Some(existing) = self.find_by_username(&user.username).await? {
            if existing.id != user.id {
                return Err(RepoError::DuplicateUsername);
            }
        }

        let updated = sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
               SET username = $2, password_hash = $3, first_name = $4, last_name = $5,
                   gender = $6, birthdate = $7, updated_at = now()
             WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(user.id)
        .bind(&user.username)
        .bind(&user.password_hash)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(user.gender)
        .bind(user.birthdate)
        .fetch_optional(&self.db)
        .await
        .map_err(map_write_error)?;
        if updated.is_none() {
            debug!("row vanished before update");
        }
        Ok(updated)
    }

    #[instrument(skip(self, user), fields(user_id = user.id))]
    async fn delete(&self, user: &User) -> Result<(), RepoError> {
        sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(user.id)
            .execute(&self.db)
            .await?;
        Ok(())
    }
}
