use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

use chat_core::entities::User;
use chat_core::error::DomainError;
use chat_core::traits::{RepoResult, UserRepository};
use chat_core::value_objects::UserId;

#[derive(Debug, Default)]
pub struct MemoryUserRepository {
    users: DashMap<UserId, User>,
}

impl MemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserRepository for MemoryUserRepository {
    async fn find_by_id(&self, id: UserId) -> RepoResult<Option<User>> {
        Ok(self.users.get(&id).map(|u| u.value().clone()))
    }

    async fn exists(&self, id: UserId) -> RepoResult<bool> {
        Ok(self.users.contains_key(&id))
    }

    async fn create(&self, user: &User) -> RepoResult<()> {
        self.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn record_presence(&self, id: UserId, online: bool, at: DateTime<Utc>) -> RepoResult<()> {
        let mut user = self.users.get_mut(&id).ok_or(DomainError::UserNotFound(id))?;
        user.set_presence(online, at);
        Ok(())
    }
}
