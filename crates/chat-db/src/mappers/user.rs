//! User entity <-> model mapper

use chat_core::entities::User;
use chat_core::value_objects::UserId;

use crate::models::UserModel;

impl From<UserModel> for User {
    fn from(model: UserModel) -> Self {
        User {
            id: UserId::new(model.id),
            name: model.name,
            avatar: model.avatar,
            is_online: model.is_online,
            last_seen_at: model.last_seen_at,
            created_at: model.created_at,
        }
    }
}
