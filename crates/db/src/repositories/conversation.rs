use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, warn};

use geochat_core::domain::message::Message;
use geochat_core::domain::preferences::{CompletePreferences, PreferenceField, Preferences};
use geochat_core::domain::user::UserId;

use super::{ConversationRepository, KeyValueStore, RepositoryError};

pub fn messages_key(user: &UserId) -> String {
    format!("messages:{}", user.as_str())
}

pub fn preference_key(field: PreferenceField, user: &UserId) -> String {
    format!("{}:{}", field.key(), user.as_str())
}

/// Conversation state laid out over a flat key-value store.
///
/// History mutations for one user are serialised through a per-user lock so
/// that read-append-write is atomic within this process. A user's lock is
/// dropped from the table once nobody holds or waits on it.
pub struct KvConversationRepository<S> {
    store: S,
    user_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl<S: KeyValueStore> KvConversationRepository<S> {
    pub fn new(store: S) -> Self {
        Self { store, user_locks: Mutex::new(HashMap::new()) }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    async fn user_lock(&self, user: &UserId) -> Arc<Mutex<()>> {
        let mut locks = self.user_locks.lock().await;
        locks.entry(user.as_str().to_string()).or_default().clone()
    }

    async fn release_user_lock(&self, user: &UserId, lock: Arc<Mutex<()>>) {
        let mut locks = self.user_locks.lock().await;
        // Clones are only handed out under the table lock, so a count of two
        // (table plus ours) means no other caller is holding or queued.
        if Arc::strong_count(&lock) == 2 {
            locks.remove(user.as_str());
        }
    }

    async fn read_history(&self, user: &UserId) -> Result<Vec<Message>, RepositoryError> {
        let Some(raw) = self.store.get(&messages_key(user)).await? else {
            return Ok(Vec::new());
        };

        match serde_json::from_str::<Vec<Message>>(&raw) {
            Ok(history) => Ok(history),
            Err(error) => {
                warn!(
                    event_name = "conversation.history.decode_failed",
                    user_id = %user,
                    error = %error,
                    "stored history is not a message list; treating it as empty"
                );
                Ok(Vec::new())
            }
        }
    }

    async fn write_history(
        &self,
        user: &UserId,
        history: &[Message],
    ) -> Result<(), RepositoryError> {
        let encoded =
            serde_json::to_string(history).map_err(|e| RepositoryError::Decode(e.to_string()))?;
        self.store.set(&messages_key(user), &encoded).await
    }

    async fn append_locked(
        &self,
        user: &UserId,
        batch: Vec<Message>,
    ) -> Result<Vec<Message>, RepositoryError> {
        let mut history = self.read_history(user).await?;
        if batch.is_empty() {
            return Ok(history);
        }
        history.extend(batch);
        self.write_history(user, &history).await?;
        Ok(history)
    }

    async fn seed_locked(
        &self,
        user: &UserId,
        seed: Vec<Message>,
    ) -> Result<Vec<Message>, RepositoryError> {
        let history = self.read_history(user).await?;
        if !history.is_empty() || seed.is_empty() {
            return Ok(history);
        }
        self.write_history(user, &seed).await?;
        debug!(event_name = "conversation.history.seeded", user_id = %user, "history seeded");
        Ok(seed)
    }
}

#[async_trait::async_trait]
impl<S: KeyValueStore> ConversationRepository for KvConversationRepository<S> {
    async fn preferences(&self, user: &UserId) -> Result<Preferences, RepositoryError> {
        let country_key = preference_key(PreferenceField::FavoriteCountry, user);
        let continent_key = preference_key(PreferenceField::FavoriteContinent, user);
        let destination_key = preference_key(PreferenceField::FavoriteDestination, user);

        let (country, continent, destination) = tokio::try_join!(
            self.store.get(&country_key),
            self.store.get(&continent_key),
            self.store.get(&destination_key),
        )?;

        let blank_to_none = |value: Option<String>| value.filter(|value| !value.trim().is_empty());
        Ok(Preferences {
            favorite_country: blank_to_none(country),
            favorite_continent: blank_to_none(continent),
            favorite_destination: blank_to_none(destination),
        })
    }

    async fn set_preference(
        &self,
        user: &UserId,
        field: PreferenceField,
        value: &str,
    ) -> Result<(), RepositoryError> {
        self.store.set(&preference_key(field, user), value).await?;
        debug!(
            event_name = "conversation.preference.stored",
            user_id = %user,
            field = field.key(),
            "preference stored"
        );
        Ok(())
    }

    async fn save_preferences(
        &self,
        user: &UserId,
        preferences: &CompletePreferences,
    ) -> Result<(), RepositoryError> {
        for field in PreferenceField::ALL {
            self.set_preference(user, field, preferences.get(field)).await?;
        }
        Ok(())
    }

    async fn messages(&self, user: &UserId) -> Result<Vec<Message>, RepositoryError> {
        self.read_history(user).await
    }

    async fn append_messages(
        &self,
        user: &UserId,
        batch: Vec<Message>,
    ) -> Result<Vec<Message>, RepositoryError> {
        let lock = self.user_lock(user).await;
        let result = {
            let _guard = lock.lock().await;
            self.append_locked(user, batch).await
        };
        self.release_user_lock(user, lock).await;
        result
    }

    async fn seed_messages(
        &self,
        user: &UserId,
        seed: Vec<Message>,
    ) -> Result<Vec<Message>, RepositoryError> {
        let lock = self.user_lock(user).await;
        let result = {
            let _guard = lock.lock().await;
            self.seed_locked(user, seed).await
        };
        self.release_user_lock(user, lock).await;
        result
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        self.store.ping().await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use geochat_core::domain::message::Message;
    use geochat_core::domain::preferences::{CompletePreferences, PreferenceField};
    use geochat_core::domain::user::UserId;

    use super::{messages_key, preference_key, KvConversationRepository};
    use crate::repositories::{
        ConversationRepository, InMemoryKeyValueStore, KeyValueStore, SqlKeyValueStore,
    };
    use crate::{connect_with_settings, migrations};

    fn user(id: &str) -> UserId {
        UserId::parse(id).expect("valid user id")
    }

    #[test]
    fn keys_follow_field_and_user() {
        let alice = user("alice");
        assert_eq!(messages_key(&alice), "messages:alice");
        assert_eq!(
            preference_key(PreferenceField::FavoriteContinent, &alice),
            "favoriteContinent:alice"
        );
        assert_eq!(
            preference_key(PreferenceField::FavoriteDestination, &alice),
            "favoriteDestination:alice"
        );
    }

    #[tokio::test]
    async fn preferences_start_empty_and_fill_independently() {
        let repo = KvConversationRepository::new(InMemoryKeyValueStore::new());
        let alice = user("alice");

        let empty = repo.preferences(&alice).await.expect("read");
        assert_eq!(empty.first_missing(), Some(PreferenceField::FavoriteCountry));

        repo.set_preference(&alice, PreferenceField::FavoriteContinent, "Europe")
            .await
            .expect("write");

        let prefs = repo.preferences(&alice).await.expect("read");
        assert_eq!(prefs.favorite_continent.as_deref(), Some("Europe"));
        assert_eq!(prefs.favorite_country, None);
    }

    #[tokio::test]
    async fn blank_stored_preference_reads_as_missing() {
        let store = InMemoryKeyValueStore::new();
        store.set("favoriteCountry:alice", "   ").await.expect("set");
        let repo = KvConversationRepository::new(store);

        let prefs = repo.preferences(&user("alice")).await.expect("read");
        assert_eq!(prefs.favorite_country, None);
    }

    #[tokio::test]
    async fn save_preferences_writes_all_three() {
        let repo = KvConversationRepository::new(InMemoryKeyValueStore::new());
        let bob = user("bob");
        let complete = CompletePreferences {
            favorite_country: "Peru".to_string(),
            favorite_continent: "South America".to_string(),
            favorite_destination: "Machu Picchu".to_string(),
        };

        repo.save_preferences(&bob, &complete).await.expect("save");

        let prefs = repo.preferences(&bob).await.expect("read");
        assert_eq!(prefs.to_complete(), Some(complete));
    }

    #[tokio::test]
    async fn users_do_not_share_state() {
        let repo = KvConversationRepository::new(InMemoryKeyValueStore::new());
        repo.append_messages(&user("alice"), vec![Message::user("hi")]).await.expect("append");

        assert!(repo.messages(&user("bob")).await.expect("read").is_empty());
        assert_eq!(repo.messages(&user("alice")).await.expect("read").len(), 1);
    }

    #[tokio::test]
    async fn seed_only_applies_to_empty_history() {
        let repo = KvConversationRepository::new(InMemoryKeyValueStore::new());
        let alice = user("alice");

        let first = repo.seed_messages(&alice, vec![Message::assistant("welcome")]).await;
        let second = repo.seed_messages(&alice, vec![Message::assistant("welcome")]).await;

        assert_eq!(first.expect("seed"), vec![Message::assistant("welcome")]);
        assert_eq!(second.expect("seed"), vec![Message::assistant("welcome")]);
        assert_eq!(repo.messages(&alice).await.expect("read").len(), 1);
    }

    #[tokio::test]
    async fn corrupt_history_is_treated_as_empty() {
        let store = InMemoryKeyValueStore::new();
        store.set("messages:alice", "{not json").await.expect("set");
        let repo = KvConversationRepository::new(store);

        assert!(repo.messages(&user("alice")).await.expect("read").is_empty());

        let history =
            repo.append_messages(&user("alice"), vec![Message::user("hello")]).await.expect("append");
        assert_eq!(history, vec![Message::user("hello")]);
    }

    #[tokio::test]
    async fn concurrent_appends_are_not_lost() {
        let repo = Arc::new(KvConversationRepository::new(InMemoryKeyValueStore::new()));
        let alice = user("alice");

        let mut handles = Vec::new();
        for i in 0..20 {
            let repo = Arc::clone(&repo);
            let alice = alice.clone();
            handles.push(tokio::spawn(async move {
                repo.append_messages(&alice, vec![Message::user(format!("message {i}"))]).await
            }));
        }
        for handle in handles {
            handle.await.expect("join").expect("append");
        }

        assert_eq!(repo.messages(&alice).await.expect("read").len(), 20);
        assert!(repo.user_locks.lock().await.is_empty());
    }

    #[tokio::test]
    async fn user_locks_are_released_after_use() {
        let repo = KvConversationRepository::new(InMemoryKeyValueStore::new());

        for i in 0..1_000 {
            let id = user(&format!("visitor-{i}"));
            repo.seed_messages(&id, vec![Message::assistant("welcome")]).await.expect("seed");
            repo.append_messages(&id, vec![Message::user("hi")]).await.expect("append");
        }

        assert!(repo.user_locks.lock().await.is_empty());
        assert_eq!(repo.messages(&user("visitor-999")).await.expect("read").len(), 2);
    }

    #[tokio::test]
    async fn history_survives_on_sql_store() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        let repo = KvConversationRepository::new(SqlKeyValueStore::new(pool));
        let alice = user("alice");

        repo.append_messages(&alice, vec![Message::user("hi"), Message::assistant("hello")])
            .await
            .expect("append");
        repo.append_messages(&alice, vec![Message::user("again")]).await.expect("append");

        let history = repo.messages(&alice).await.expect("read");
        assert_eq!(
            history,
            vec![Message::user("hi"), Message::assistant("hello"), Message::user("again")]
        );
        repo.ping().await.expect("ping");
    }
}
