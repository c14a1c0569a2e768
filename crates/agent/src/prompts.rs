//! System prompts, rendered with tera at call time.

use serde::Serialize;
use tera::{Context, Tera};
use thiserror::Error;

use geochat_core::domain::message::Message;
use geochat_core::domain::preferences::{CompletePreferences, Continent, Preferences};

const EXTRACTION_TEMPLATE: &str = "extraction.txt";
const ANSWER_TEMPLATE: &str = "answer.txt";

const EXTRACTION_SOURCE: &str = r#"{% if has_known %}The user has already set the following preferences:
{% for item in known %}{{ item.key }}: {{ item.value }}
{% endfor %}
{% endif %}You are an assistant that extracts user preferences from conversation messages.

Analyze the conversation history and determine if the user is updating their geographic preferences in their latest message.

The preferences you should extract are:
- favoriteCountry: Any country name mentioned as preferred
- favoriteContinent: Any continent name. Valid continents are: {{ continents }}
- favoriteDestination: Any destination (city, landmark, region) mentioned as preferred

If the user is just asking questions about geography without expressing personal preferences, set isUpdatingUserPreferences to false.

Look at the full conversation context to understand the user's intent.
Leave a field null when the latest message does not mention it.
If one of the fields is invalid, set invalidField to its name (favoriteCountry, favoriteContinent or favoriteDestination) and invalidReason to a short explanation of what is wrong with the value.
"#;

const ANSWER_SOURCE: &str = r#"You are a knowledgeable geography expert chatbot. Your goal is to provide accurate, engaging, and informative responses about world geography.

User Preferences:
- Favorite Country: {{ favorite_country }}
- Favorite Continent: {{ favorite_continent }}
- Favorite Destination: {{ favorite_destination }}

Guidelines:
1. Use the user's preferences to personalize responses when relevant
2. Provide accurate geographical information
3. Include interesting facts and cultural context
4. Keep responses concise but informative
5. If asked about the user's favorite places, incorporate their preferences naturally
6. For questions outside geography, politely redirect to geography topics
7. Use a friendly and engaging tone
8. Include relevant statistics when appropriate
9. Mention cultural aspects of geographical locations
10. Provide context about climate, population, and notable features
{% if has_transcript %}
Conversation so far:
{% for line in transcript %}{{ line.role }}: {{ line.content }}
{% endfor %}{% endif %}"#;

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("prompt template error: {0}")]
    Template(#[from] tera::Error),
}

#[derive(Serialize)]
struct KnownPreference<'a> {
    key: &'a str,
    value: &'a str,
}

#[derive(Serialize)]
struct TranscriptLine<'a> {
    role: &'a str,
    content: &'a str,
}

pub struct PromptLibrary {
    tera: Tera,
}

impl PromptLibrary {
    pub fn new() -> Result<Self, PromptError> {
        let mut tera = Tera::default();
        tera.add_raw_templates(vec![
            (EXTRACTION_TEMPLATE, EXTRACTION_SOURCE),
            (ANSWER_TEMPLATE, ANSWER_SOURCE),
        ])?;
        Ok(Self { tera })
    }

    pub fn extraction(&self, known: &Preferences) -> Result<String, PromptError> {
        let known: Vec<KnownPreference<'_>> = known
            .known()
            .into_iter()
            .map(|(field, value)| KnownPreference { key: field.key(), value })
            .collect();

        let mut context = Context::new();
        context.insert("has_known", &!known.is_empty());
        context.insert("known", &known);
        context.insert("continents", &Continent::allowed_list());
        Ok(self.tera.render(EXTRACTION_TEMPLATE, &context)?)
    }

    pub fn answer(
        &self,
        preferences: &CompletePreferences,
        history: &[Message],
    ) -> Result<String, PromptError> {
        let transcript: Vec<TranscriptLine<'_>> = history
            .iter()
            .map(|message| TranscriptLine { role: message.role.as_str(), content: &message.content })
            .collect();

        let mut context = Context::new();
        context.insert("favorite_country", &preferences.favorite_country);
        context.insert("favorite_continent", &preferences.favorite_continent);
        context.insert("favorite_destination", &preferences.favorite_destination);
        context.insert("has_transcript", &!transcript.is_empty());
        context.insert("transcript", &transcript);
        Ok(self.tera.render(ANSWER_TEMPLATE, &context)?)
    }
}
