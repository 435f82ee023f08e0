use std::{
    collections::HashMap,
    sync::atomic::{AtomicI64, Ordering},
};

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;

use super::{
    repo::{StoreError, UserStore},
    repo_types::{NewUser, User},
};

/// In-process user store keyed by username. Used by tests and `AppState::fake`.
#[derive(Debug, Default)]
pub struct MemoryUserStore {
    users: RwLock<HashMap<String, User>>,
    next_id: AtomicI64,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.users.read().await.len()
    }

    /// Flips the active flag; there is no HTTP route for this.
    pub async fn set_active(&self, username: &str, active: bool) -> Result<(), StoreError> {
        let mut users = self.users.write().await;
        let user = users.get_mut(username).ok_or(StoreError::NotFound)?;
        user.is_active = active;
        user.updated_at = Some(OffsetDateTime::now_utc());
        Ok(())
    }

    pub async fn remove(&self, username: &str) -> Option<User> {
        self.users.write().await.remove(username)
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        Ok(self.users.read().await.get(username).cloned())
    }

    async fn insert(&self, new_user: NewUser<'_>) -> Result<User, StoreError> {
        let mut users = self.users.write().await;
        if users.contains_key(new_user.username) {
            return Err(StoreError::UniqueViolation);
        }
        let user = User {
            id: self.next_id.fetch_add(1, Ordering::Relaxed) + 1,
            username: new_user.username.to_string(),
            password_hash: new_user.password_hash.to_string(),
            chronic_condition: new_user.chronic_condition.to_string(),
            location: new_user.location.to_string(),
            is_active: true,
            created_at: OffsetDateTime::now_utc(),
            updated_at: None,
        };
        users.insert(user.username.clone(), user.clone());
        Ok(user)
    }

    async fn update_password(
        &self,
        username: &str,
        password_hash: &str,
        updated_at: OffsetDateTime,
    ) -> Result<User, StoreError> {
        let mut users = self.users.write().await;
        let user = users.get_mut(username).ok_or(StoreError::NotFound)?;
        user.password_hash = password_hash.to_string();
        user.updated_at = Some(updated_at);
        Ok(user.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_user<'a>(username: &'a str, hash: &'a str) -> NewUser<'a> {
        NewUser {
            username,
            password_hash: hash,
            chronic_condition: "Diabetes",
            location: "NYC",
        }
    }

    #[tokio::test]
    async fn insert_enforces_unique_username() {
        let store = MemoryUserStore::new();
        let first = store.insert(new_user("alice", "h1")).await.unwrap();
        assert_eq!(first.id, 1);
        assert!(first.is_active);
        assert!(first.updated_at.is_none());

        let err = store.insert(new_user("alice", "h2")).await.unwrap_err();
        assert!(matches!(err, StoreError::UniqueViolation));
        assert_eq!(store.len().await, 1);

        let kept = store.find_by_username("alice").await.unwrap().unwrap();
        assert_eq!(kept.password_hash, "h1");
    }

    #[tokio::test]
    async fn usernames_are_case_sensitive() {
        let store = MemoryUserStore::new();
        store.insert(new_user("alice", "h1")).await.unwrap();
        store.insert(new_user("Alice", "h2")).await.unwrap();
        assert_eq!(store.len().await, 2);
        assert!(store.find_by_username("ALICE").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn update_password_stamps_updated_at() {
        let store = MemoryUserStore::new();
        store.insert(new_user("alice", "h1")).await.unwrap();
        let now = OffsetDateTime::now_utc();
        let updated = store.update_password("alice", "h2", now).await.unwrap();
        assert_eq!(updated.password_hash, "h2");
        assert_eq!(updated.updated_at, Some(now));

        let err = store.update_password("bob", "h", now).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound));
    }
}
