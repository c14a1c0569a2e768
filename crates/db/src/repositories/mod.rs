use async_trait::async_trait;
use thiserror::Error;

use geochat_core::domain::message::Message;
use geochat_core::domain::preferences::{CompletePreferences, PreferenceField, Preferences};
use geochat_core::domain::user::UserId;

pub mod conversation;
pub mod kv;
pub mod memory;

pub use conversation::KvConversationRepository;
pub use kv::SqlKeyValueStore;
pub use memory::InMemoryKeyValueStore;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// String-to-string storage with last-write-wins semantics.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, RepositoryError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), RepositoryError>;
    async fn ping(&self) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait ConversationRepository: Send + Sync {
    async fn preferences(&self, user: &UserId) -> Result<Preferences, RepositoryError>;

    async fn set_preference(
        &self,
        user: &UserId,
        field: PreferenceField,
        value: &str,
    ) -> Result<(), RepositoryError>;

    async fn save_preferences(
        &self,
        user: &UserId,
        preferences: &CompletePreferences,
    ) -> Result<(), RepositoryError>;

    async fn messages(&self, user: &UserId) -> Result<Vec<Message>, RepositoryError>;

    /// Appends `batch` to the stored history and returns the resulting history.
    async fn append_messages(
        &self,
        user: &UserId,
        batch: Vec<Message>,
    ) -> Result<Vec<Message>, RepositoryError>;

    /// Stores `seed` only when the history is empty. Returns the resulting history.
    async fn seed_messages(
        &self,
        user: &UserId,
        seed: Vec<Message>,
    ) -> Result<Vec<Message>, RepositoryError>;

    async fn ping(&self) -> Result<(), RepositoryError>;
}
