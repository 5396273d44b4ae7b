use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use super::{NewUser, User, UserStore};
use crate::error::{Error, Result};

#[derive(Default)]
pub struct MemoryUserStore {
    rows: Mutex<Vec<User>>,
}

impl MemoryUserStore {
    pub fn users(&self) -> Vec<User> {
        self.rows.lock().unwrap().clone()
    }

    pub fn deactivate(&self, id: i64) {
        let mut rows = self.rows.lock().unwrap();
        if let Some(u) = rows.iter_mut().find(|u| u.id == id) {
            u.is_active = false;
        }
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let rows = self.rows.lock().unwrap();
        Ok(rows.iter().find(|u| u.email == email).cloned())
    }

    async fn insert(&self, user: &NewUser) -> Result<i64> {
        let mut rows = self.rows.lock().unwrap();
        if rows
            .iter()
            .any(|u| u.email == user.email || u.username == user.username)
        {
            return Err(Error::conflict("username or email already registered"));
        }
        let id = rows.len() as i64 + 1;
        rows.push(User {
            id,
            username: user.username.clone(),
            email: user.email.clone(),
            password_hash: user.password_hash.clone(),
            role: user.role,
            is_active: true,
            created_at: Utc::now(),
        });
        Ok(id)
    }
}
