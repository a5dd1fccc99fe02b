//! Service context - dependency container for services
//!
//! Holds the stores and the real-time notifier the services need.

use std::sync::Arc;

use chat_core::traits::{ChatDirectory, MessageStore, UserRepository};
use chat_core::SnowflakeGenerator;

use super::error::{ServiceError, ServiceResult};
use super::notifier::{NoopNotifier, RealtimeNotifier};

/// Service context containing all dependencies
///
/// Cheap to clone; every field is shared.
#[derive(Clone)]
pub struct ServiceContext {
    // Stores
    message_store: Arc<dyn MessageStore>,
    chat_directory: Arc<dyn ChatDirectory>,
    user_repo: Arc<dyn UserRepository>,

    // Real-time engine
    notifier: Arc<dyn RealtimeNotifier>,

    snowflake_generator: Arc<SnowflakeGenerator>,
}

impl ServiceContext {
    pub fn new(
        message_store: Arc<dyn MessageStore>,
        chat_directory: Arc<dyn ChatDirectory>,
        user_repo: Arc<dyn UserRepository>,
        notifier: Arc<dyn RealtimeNotifier>,
        snowflake_generator: Arc<SnowflakeGenerator>,
    ) -> Self {
        Self {
            message_store,
            chat_directory,
            user_repo,
            notifier,
            snowflake_generator,
        }
    }

    // === Stores ===

    pub fn message_store(&self) -> &dyn MessageStore {
        self.message_store.as_ref()
    }

    pub fn chat_directory(&self) -> &dyn ChatDirectory {
        self.chat_directory.as_ref()
    }

    pub fn user_repo(&self) -> &dyn UserRepository {
        self.user_repo.as_ref()
    }

    /// Shared handles, for collaborators that outlive a request
    pub fn chat_directory_arc(&self) -> Arc<dyn ChatDirectory> {
        Arc::clone(&self.chat_directory)
    }

    pub fn user_repo_arc(&self) -> Arc<dyn UserRepository> {
        Arc::clone(&self.user_repo)
    }

    // === Real-time ===

    pub fn notifier(&self) -> &dyn RealtimeNotifier {
        self.notifier.as_ref()
    }

    // === Ids ===

    pub fn snowflake_generator(&self) -> &SnowflakeGenerator {
        self.snowflake_generator.as_ref()
    }

    /// Generate a new Snowflake ID
    pub fn generate_id(&self) -> chat_core::Snowflake {
        self.snowflake_generator.generate()
    }
}

impl std::fmt::Debug for ServiceContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceContext")
            .field("stores", &"...")
            .field("notifier", &"dyn RealtimeNotifier")
            .finish_non_exhaustive()
    }
}

/// Builder for creating ServiceContext with custom configuration
///
/// The notifier defaults to [`NoopNotifier`] and the generator to worker 0.
#[derive(Default)]
pub struct ServiceContextBuilder {
    message_store: Option<Arc<dyn MessageStore>>,
    chat_directory: Option<Arc<dyn ChatDirectory>>,
    user_repo: Option<Arc<dyn UserRepository>>,
    notifier: Option<Arc<dyn RealtimeNotifier>>,
    snowflake_generator: Option<Arc<SnowflakeGenerator>>,
}

impl ServiceContextBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn message_store(mut self, store: Arc<dyn MessageStore>) -> Self {
        self.message_store = Some(store);
        self
    }

    pub fn chat_directory(mut self, directory: Arc<dyn ChatDirectory>) -> Self {
        self.chat_directory = Some(directory);
        self
    }

    pub fn user_repo(mut self, repo: Arc<dyn UserRepository>) -> Self {
        self.user_repo = Some(repo);
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn RealtimeNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn snowflake_generator(mut self, generator: Arc<SnowflakeGenerator>) -> Self {
        self.snowflake_generator = Some(generator);
        self
    }

    /// Build the ServiceContext
    ///
    /// # Errors
    /// Returns `ServiceError::Validation` if a store is missing
    pub fn build(self) -> ServiceResult<ServiceContext> {
        Ok(ServiceContext::new(
            self.message_store
                .ok_or_else(|| ServiceError::validation("message_store is required"))?,
            self.chat_directory
                .ok_or_else(|| ServiceError::validation("chat_directory is required"))?,
            self.user_repo
                .ok_or_else(|| ServiceError::validation("user_repo is required"))?,
            self.notifier.unwrap_or_else(|| Arc::new(NoopNotifier)),
            self.snowflake_generator
                .unwrap_or_else(|| Arc::new(SnowflakeGenerator::new(0))),
        ))
    }
}
