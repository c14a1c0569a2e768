use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::info;

use geochat_core::config::AppConfig;
use geochat_core::domain::message::Message;
use geochat_core::domain::preferences::{CompletePreferences, PreferenceField, Preferences};
use geochat_core::domain::user::UserId;
use geochat_core::errors::{ApplicationError, DomainError};
use geochat_core::flows::replies::{self, SUGGESTIONS, WELCOME_MESSAGE};
use geochat_core::flows::{OnboardingFlow, OnboardingState, TurnFacts};
use geochat_core::validation::{validate_preferences, PreferencesInput, ValidationErrors};
use geochat_db::repositories::{ConversationRepository, RepositoryError};

use crate::completion::{spawn_relay, Relay};
use crate::extractor::PreferenceExtractor;
use crate::llm::{ChatRequest, LlmClient, LlmError};
use crate::prompts::{PromptError, PromptLibrary};

#[derive(Clone, Debug)]
pub struct RuntimeSettings {
    pub extraction_model: String,
    pub chat_model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub max_message_length: usize,
}

impl RuntimeSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            extraction_model: config.llm.extraction_model.clone(),
            chat_model: config.llm.chat_model.clone(),
            temperature: config.llm.temperature,
            max_tokens: config.llm.max_tokens,
            max_message_length: config.chat.max_message_length,
        }
    }
}

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("conversation store failed: {0}")]
    Repository(#[from] RepositoryError),
    #[error("prompt rendering failed: {0}")]
    Prompt(#[from] PromptError),
    #[error("language model unavailable: {0}")]
    CompletionUnavailable(#[source] LlmError),
}

impl From<ValidationErrors> for RuntimeError {
    fn from(errors: ValidationErrors) -> Self {
        Self::Domain(DomainError::Validation(errors))
    }
}

impl From<RuntimeError> for ApplicationError {
    fn from(error: RuntimeError) -> Self {
        match error {
            RuntimeError::Domain(domain) => Self::Domain(domain),
            RuntimeError::Repository(error) => Self::Persistence(error.to_string()),
            RuntimeError::Prompt(error) => Self::Configuration(error.to_string()),
            RuntimeError::CompletionUnavailable(error) => Self::Integration(error.to_string()),
        }
    }
}

/// Preferences as shown to the client, with the canned question suggestions.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PreferencesView {
    #[serde(flatten)]
    pub preferences: Preferences,
    pub suggestions: Vec<String>,
}

impl From<Preferences> for PreferencesView {
    fn from(preferences: Preferences) -> Self {
        Self { preferences, suggestions: SUGGESTIONS.iter().map(|s| s.to_string()).collect() }
    }
}

pub enum TurnReply {
    /// A fixed onboarding text, already appended to the history.
    Directive(String),
    /// An open-domain answer being relayed from the model.
    Stream(Relay),
}

pub struct ChatRuntime {
    repository: Arc<dyn ConversationRepository>,
    llm: Arc<dyn LlmClient>,
    prompts: Arc<PromptLibrary>,
    extractor: PreferenceExtractor,
    flow: OnboardingFlow,
    settings: RuntimeSettings,
}

impl ChatRuntime {
    pub fn new(
        repository: Arc<dyn ConversationRepository>,
        llm: Arc<dyn LlmClient>,
        settings: RuntimeSettings,
    ) -> Result<Self, RuntimeError> {
        let prompts = Arc::new(PromptLibrary::new()?);
        let extractor = PreferenceExtractor::new(
            Arc::clone(&llm),
            Arc::clone(&prompts),
            settings.extraction_model.clone(),
        );

        Ok(Self { repository, llm, prompts, extractor, flow: OnboardingFlow::new(), settings })
    }

    /// The user's transcript; an empty one is seeded with the welcome message.
    pub async fn messages(&self, user: &UserId) -> Result<Vec<Message>, RuntimeError> {
        let seed = vec![Message::assistant(WELCOME_MESSAGE)];
        Ok(self.repository.seed_messages(user, seed).await?)
    }

    pub async fn preferences(&self, user: &UserId) -> Result<PreferencesView, RuntimeError> {
        Ok(self.repository.preferences(user).await?.into())
    }

    pub async fn save_preferences(
        &self,
        user: &UserId,
        input: &PreferencesInput,
    ) -> Result<PreferencesView, RuntimeError> {
        let complete = validate_preferences(input)?;
        self.repository.save_preferences(user, &complete).await?;
        info!(event_name = "chat.preferences.saved", user_id = %user, "preferences saved from form");
        Ok(Preferences::from(complete).into())
    }

    pub async fn ping(&self) -> Result<(), RuntimeError> {
        Ok(self.repository.ping().await?)
    }

    /// Runs one chat turn: store the message, extract, apply the onboarding
    /// table, and either reply with a directive or start streaming an answer.
    pub async fn handle_message(
        &self,
        user: &UserId,
        text: &str,
        correlation_id: &str,
    ) -> Result<TurnReply, RuntimeError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(DomainError::EmptyMessage.into());
        }
        let max = self.settings.max_message_length;
        if text.chars().count() > max {
            return Err(DomainError::MessageTooLong { max }.into());
        }

        let (stored, history) = tokio::try_join!(
            self.repository.preferences(user),
            self.repository.append_messages(user, vec![Message::user(text)]),
        )?;

        let extraction = self.extractor.extract(&history, &stored, correlation_id).await;
        let plan = self.flow.plan(&stored, &extraction);
        for change in &plan.changes {
            self.repository.set_preference(user, change.field, &change.value).await?;
        }
        let current =
            if plan.has_changes() { self.repository.preferences(user).await? } else { stored };

        let decision = self.flow.decide(TurnFacts {
            state: OnboardingState::of(&current),
            changed: plan.has_changes(),
            invalid: plan.invalid.clone(),
        });
        info!(
            event_name = "chat.turn.decided",
            correlation_id,
            user_id = %user,
            decision = decision.kind(),
            changes = plan.changes.len(),
            "chat turn decided"
        );

        let complete = current.to_complete();
        match (replies::directive(&decision, &plan.changes, complete.as_ref()), complete) {
            (Some(directive), _) => self.reply_with(user, directive).await,
            (None, Some(complete)) => {
                self.stream_answer(user, &complete, &history, text, correlation_id).await
            }
            (None, None) => {
                // Answer is only decided on complete preferences.
                let field = current.first_missing().unwrap_or(PreferenceField::FavoriteCountry);
                self.reply_with(user, replies::question(field)).await
            }
        }
    }

    async fn reply_with(&self, user: &UserId, text: String) -> Result<TurnReply, RuntimeError> {
        self.repository.append_messages(user, vec![Message::assistant(text.clone())]).await?;
        Ok(TurnReply::Directive(text))
    }

    async fn stream_answer(
        &self,
        user: &UserId,
        preferences: &CompletePreferences,
        history: &[Message],
        text: &str,
        correlation_id: &str,
    ) -> Result<TurnReply, RuntimeError> {
        // The current message goes out as the trailing user turn, not in the transcript.
        let earlier = history.split_last().map_or(history, |(_, earlier)| earlier);
        let system = self.prompts.answer(preferences, earlier)?;
        let request = ChatRequest {
            model: self.settings.chat_model.clone(),
            messages: vec![Message::system(system), Message::user(text)],
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
        };
        let upstream =
            self.llm.stream_chat(request).await.map_err(RuntimeError::CompletionUnavailable)?;

        Ok(TurnReply::Stream(spawn_relay(
            upstream,
            Arc::clone(&self.repository),
            user.clone(),
            correlation_id.to_string(),
        )))
    }
}
