//! In-memory `UserRepository` for tests; mirrors the Postgres semantics.

use std::cmp::Ordering;
use std::sync::Mutex;

use async_trait::async_trait;
use time::{macros::date, OffsetDateTime};

use super::repo::{RepoError, UserRepository};
use super::repo_types::{Gender, NewUser, RoleScope, SortDirection, SortField, User, UserPage, UserQuery};

#[derive(Default)]
struct Table {
    rows: Vec<User>,
    next_id: i64,
}

impl Table {
    fn insert(&mut self, new_user: NewUser) -> User {
        self.next_id += 1;
        let now = OffsetDateTime::now_utc();
        let user = User {
            id: self.next_id,
            username: new_user.username,
            password_hash: new_user.password_hash,
            first_name: new_user.first_name,
            last_name: new_user.last_name,
            gender: new_user.gender,
            birthdate: new_user.birthdate,
            is_admin: new_user.is_admin,
            created_at: now,
            updated_at: now,
        };
        self.rows.push(user.clone());
        user
    }
}

#[derive(Default)]
pub struct MemoryUserRepository {
    table: Mutex<Table>,
}

fn compare(a: &User, b: &User, sort: SortField) -> Ordering {
    let keys = match sort {
        SortField::Username => a.username.cmp(&b.username),
        SortField::FullName => a
            .first_name
            .cmp(&b.first_name)
            .then_with(|| a.last_name.cmp(&b.last_name)),
        SortField::Birthdate => a.birthdate.cmp(&b.birthdate),
    };
    keys.then_with(|| a.id.cmp(&b.id))
}

fn is_match(user: &User, q: &UserQuery) -> bool {
    if q.scope == RoleScope::NonAdmins && user.is_admin {
        return false;
    }
    match q.filter.as_deref().filter(|f| !f.is_empty()) {
        None => true,
        Some(filter) => {
            let needle = filter.to_lowercase();
            [&user.username, &user.first_name, &user.last_name]
                .iter()
                .any(|field| field.to_lowercase().contains(&needle))
        }
    }
}

impl MemoryUserRepository {
    pub fn len(&self) -> usize {
        self.table.lock().unwrap().rows.len()
    }

    pub fn get(&self, id: i64) -> Option<User> {
        self.table.lock().unwrap().rows.iter().find(|u| u.id == id).cloned()
    }

    /// Inserts without any checks, as a provisioning script would.
    pub fn insert_raw(&self, new_user: NewUser) -> User {
        self.table.lock().unwrap().insert(new_user)
    }

    pub fn insert_admin(&self, username: &str) -> User {
        self.insert_raw(NewUser {
            username: username.into(),
            password_hash: "not-a-hash".into(),
            first_name: "Admin".into(),
            last_name: "User".into(),
            gender: Gender::Male,
            birthdate: date!(1990 - 01 - 01),
            is_admin: true,
        })
    }
}

#[async_trait]
impl UserRepository for MemoryUserRepository {
    async fn query(&self, q: &UserQuery) -> Result<UserPage, RepoError> {
        let table = self.table.lock().unwrap();
        let mut rows: Vec<User> = table.rows.iter().filter(|u| is_match(u, q)).cloned().collect();
        rows.sort_by(|a, b| {
            let ord = compare(a, b, q.sort);
            match q.direction {
                SortDirection::Asc => ord,
                SortDirection::Desc => ord.reverse(),
            }
        });
        let total_count = rows.len() as i64;
        let rows = rows
            .into_iter()
            .skip(q.offset() as usize)
            .take(q.limit as usize)
            .collect();
        Ok(UserPage { rows, total_count })
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<User>, RepoError> {
        Ok(self.get(id))
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, RepoError> {
        let table = self.table.lock().unwrap();
        Ok(table.rows.iter().find(|u| u.username == username).cloned())
    }

    async fn create(&self, new_user: NewUser) -> Result<User, RepoError> {
        // check and insert under one lock, like a unique index
        let mut table = self.table.lock().unwrap();
        if table.rows.iter().any(|u| u.username == new_user.username) {
            return Err(RepoError::DuplicateUsername);
        }
        Ok(table.insert(new_user))
    }

    async fn update(&self, user: &User) -> Result<Option<User>, RepoError> {
        let mut table = self.table.lock().unwrap();
        if table
            .rows
            .iter()
            .any(|u| u.username == user.username && u.id != user.id)
        {
            return Err(RepoError::DuplicateUsername);
        }
        let Some(row) = table.rows.iter_mut().find(|u| u.id == user.id) else {
            return Ok(None);
        };
        let is_admin = row.is_admin;
        *row = User {
            is_admin,
            updated_at: OffsetDateTime::now_utc(),
            ..user.clone()
        };
        Ok(Some(row.clone()))
    }

    async fn delete(&self, user: &User) -> Result<(), RepoError> {
        self.table.lock().unwrap().rows.retain(|u| u.id != user.id);
        Ok(())
    }
}
