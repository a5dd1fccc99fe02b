//! Presence queries
//!
//! Liveness comes from the engine; `last_seen_at` from the user record.

use chat_core::{DomainError, UserId};
use tracing::instrument;

use crate::dto::PresenceResponse;

use super::context::ServiceContext;
use super::error::ServiceResult;

pub struct PresenceService<'a> {
    ctx: &'a ServiceContext,
}

impl<'a> PresenceService<'a> {
    pub fn new(ctx: &'a ServiceContext) -> Self {
        Self { ctx }
    }

    #[instrument(skip(self))]
    pub async fn get_presence(&self, user_id: UserId) -> ServiceResult<PresenceResponse> {
        let user = self
            .ctx
            .user_repo()
            .find_by_id(user_id)
            .await?
            .ok_or(DomainError::UserNotFound(user_id))?;

        let online = self.ctx.notifier().is_online(user_id).await;
        Ok(PresenceResponse {
            user_id,
            online,
            last_seen_at: if online { None } else { user.last_seen_at },
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chat_core::entities::User;
    use chat_core::traits::UserRepository;
    use chat_db::{MemoryChatDirectory, MemoryMessageStore, MemoryUserRepository};
    use chrono::Utc;

    use super::*;
    use crate::services::context::ServiceContextBuilder;

    async fn context(users: Arc<MemoryUserRepository>) -> ServiceContext {
        ServiceContextBuilder::new()
            .message_store(Arc::new(MemoryMessageStore::new()))
            .chat_directory(Arc::new(MemoryChatDirectory::new()))
            .user_repo(users)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_offline_user_reports_last_seen() {
        let users = Arc::new(MemoryUserRepository::new());
        let id = UserId::new(7);
        users.create(&User::new(id, "gus".into())).await.unwrap();
        let seen = Utc::now();
        users.record_presence(id, false, seen).await.unwrap();

        let ctx = context(users).await;
        let presence = PresenceService::new(&ctx).get_presence(id).await.unwrap();
        assert!(!presence.online);
        assert_eq!(presence.last_seen_at, Some(seen));
    }

    #[tokio::test]
    async fn test_unknown_user() {
        let ctx = context(Arc::new(MemoryUserRepository::new())).await;
        let err = PresenceService::new(&ctx)
            .get_presence(UserId::new(404))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 404);
    }
}
