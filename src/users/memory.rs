//! In-process `UserStore` used by unit tests. Enforces the same unique
//! constraints as the `users` table.

use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Mutex,
};

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use super::model::{NewUser, UniqueField, User};
use super::repo::{StoreError, UserStore};

#[derive(Default)]
pub struct MemoryUserStore {
    rows: Mutex<Vec<User>>,
    /// Number of upcoming writes that will be rejected as API-key collisions.
    api_key_collisions: AtomicUsize,
    broken: AtomicBool,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn collide_api_keys(&self, times: usize) {
        self.api_key_collisions.store(times, Ordering::SeqCst);
    }

    /// Makes every call fail with a backend error.
    pub fn break_backend(&self) {
        self.broken.store(true, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.rows.lock().unwrap().len()
    }

    pub fn get(&self, id: Uuid) -> Option<User> {
        self.rows.lock().unwrap().iter().find(|u| u.id == id).cloned()
    }

    pub fn update(&self, id: Uuid, f: impl FnOnce(&mut User)) {
        let mut rows = self.rows.lock().unwrap();
        if let Some(user) = rows.iter_mut().find(|u| u.id == id) {
            f(user);
        }
    }

    fn check_backend(&self) -> Result<(), StoreError> {
        if self.broken.load(Ordering::SeqCst) {
            return Err(StoreError::Backend(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }

    fn take_api_key_collision(&self) -> bool {
        self.api_key_collisions
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn find(&self, pred: impl Fn(&User) -> bool) -> Result<Option<User>, StoreError> {
        self.check_backend()?;
        Ok(self.rows.lock().unwrap().iter().find(|u| pred(u)).cloned())
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn insert(&self, new: &NewUser) -> Result<Uuid, StoreError> {
        self.check_backend()?;
        let mut rows = self.rows.lock().unwrap();
        if rows.iter().any(|u| u.id == new.id) {
            return Err(StoreError::Conflict(UniqueField::Other));
        }
        if rows.iter().any(|u| u.email == new.email) {
            return Err(StoreError::Conflict(UniqueField::Email));
        }
        if new.username.is_some() && rows.iter().any(|u| u.username == new.username) {
            return Err(StoreError::Conflict(UniqueField::Username));
        }
        if new.api_key.is_some()
            && (self.take_api_key_collision() || rows.iter().any(|u| u.api_key == new.api_key))
        {
            return Err(StoreError::Conflict(UniqueField::ApiKey));
        }
        rows.push(User {
            id: new.id,
            name: new.name.clone(),
            email: new.email.clone(),
            username: new.username.clone(),
            password_hash: new.password_hash.clone(),
            api_key: new.api_key.clone(),
            image: new.image.clone(),
            role: "user".into(),
            plan: None,
            plan_status: None,
            reset_token: None,
            reset_token_expires_at: None,
            created_at: OffsetDateTime::now_utc(),
        });
        Ok(new.id)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        self.find(|u| u.id == id)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        self.find(|u| u.email == email)
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        self.find(|u| u.username.as_deref() == Some(username))
    }

    async fn find_by_login(&self, identifier: &str) -> Result<Option<User>, StoreError> {
        let email = identifier.to_lowercase();
        if let Some(user) = self.find(|u| u.email == email)? {
            return Ok(Some(user));
        }
        self.find(|u| u.username.as_deref() == Some(identifier))
    }

    async fn backfill_profile(
        &self,
        id: Uuid,
        api_key: &str,
        image: &str,
    ) -> Result<(), StoreError> {
        self.check_backend()?;
        let mut rows = self.rows.lock().unwrap();
        let needs_key = rows.iter().any(|u| u.id == id && u.api_key.is_none());
        if needs_key
            && (self.take_api_key_collision()
                || rows.iter().any(|u| u.api_key.as_deref() == Some(api_key)))
        {
            return Err(StoreError::Conflict(UniqueField::ApiKey));
        }
        if let Some(user) = rows.iter_mut().find(|u| u.id == id) {
            user.api_key.get_or_insert_with(|| api_key.to_string());
            user.image.get_or_insert_with(|| image.to_string());
        }
        Ok(())
    }

    async fn set_reset_token(
        &self,
        id: Uuid,
        token: &str,
        expires_at: OffsetDateTime,
    ) -> Result<(), StoreError> {
        self.check_backend()?;
        self.update(id, |u| {
            u.reset_token = Some(token.to_string());
            u.reset_token_expires_at = Some(expires_at);
        });
        Ok(())
    }

    async fn consume_reset_token(
        &self,
        token: &str,
        now: OffsetDateTime,
        password_hash: &str,
    ) -> Result<Option<Uuid>, StoreError> {
        self.check_backend()?;
        let mut rows = self.rows.lock().unwrap();
        let user = rows.iter_mut().find(|u| {
            u.reset_token.as_deref() == Some(token)
                && u.reset_token_expires_at.is_some_and(|exp| exp > now)
        });
        Ok(user.map(|u| {
            u.password_hash = Some(password_hash.to_string());
            u.reset_token = None;
            u.reset_token_expires_at = None;
            u.id
        }))
    }
}
