use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{debug, warn};

use geochat_core::domain::extraction::PreferenceExtraction;
use geochat_core::domain::message::Message;
use geochat_core::domain::preferences::Preferences;

use crate::llm::{LlmClient, StructuredRequest};
use crate::prompts::PromptLibrary;

pub const EXTRACTION_SCHEMA_NAME: &str = "preference_extraction";

/// JSON schema for [`PreferenceExtraction`]. Strict mode needs every
/// property listed as required, so optional values are nullable instead.
pub fn extraction_schema() -> Value {
    let nullable_string = json!({ "type": ["string", "null"] });
    json!({
        "type": "object",
        "additionalProperties": false,
        "properties": {
            "isUpdatingUserPreferences": { "type": "boolean" },
            "favoriteCountry": nullable_string,
            "favoriteContinent": nullable_string,
            "favoriteDestination": nullable_string,
            "invalidField": nullable_string,
            "invalidReason": nullable_string,
        },
        "required": [
            "isUpdatingUserPreferences",
            "favoriteCountry",
            "favoriteContinent",
            "favoriteDestination",
            "invalidField",
            "invalidReason",
        ],
    })
}

pub struct PreferenceExtractor {
    llm: Arc<dyn LlmClient>,
    prompts: Arc<PromptLibrary>,
    model: String,
}

impl PreferenceExtractor {
    pub fn new(llm: Arc<dyn LlmClient>, prompts: Arc<PromptLibrary>, model: impl Into<String>) -> Self {
        Self { llm, prompts, model: model.into() }
    }

    /// Classifies the latest message. Any failure degrades to
    /// [`PreferenceExtraction::no_update`].
    pub async fn extract(
        &self,
        history: &[Message],
        known: &Preferences,
        correlation_id: &str,
    ) -> PreferenceExtraction {
        let system = match self.prompts.extraction(known) {
            Ok(system) => system,
            Err(error) => {
                warn!(
                    event_name = "extraction.prompt_failed",
                    correlation_id,
                    error = %error,
                    "could not render extraction prompt"
                );
                return PreferenceExtraction::no_update();
            }
        };

        let request = StructuredRequest {
            model: self.model.clone(),
            system,
            messages: history.to_vec(),
            schema_name: EXTRACTION_SCHEMA_NAME.to_string(),
            schema: extraction_schema(),
        };

        let value = match self.llm.complete_structured(request).await {
            Ok(value) => value,
            Err(error) => {
                warn!(
                    event_name = "extraction.call_failed",
                    correlation_id,
                    error = %error,
                    "preference extraction failed; assuming no update"
                );
                return PreferenceExtraction::no_update();
            }
        };

        match serde_json::from_value::<PreferenceExtraction>(value) {
            Ok(extraction) => {
                debug!(
                    event_name = "extraction.completed",
                    correlation_id,
                    updating = extraction.is_updating_user_preferences,
                    invalid_field = extraction.invalid_field.as_deref().unwrap_or(""),
                    "preference extraction completed"
                );
                extraction
            }
            Err(error) => {
                warn!(
                    event_name = "extraction.decode_failed",
                    correlation_id,
                    error = %error,
                    "extraction did not match the schema; assuming no update"
                );
                PreferenceExtraction::no_update()
            }
        }
    }
}
