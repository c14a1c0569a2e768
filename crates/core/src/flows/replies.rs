//! Fixed assistant texts for the onboarding branches.

use crate::domain::preferences::{CompletePreferences, Continent, PreferenceField};
use crate::flows::states::{InvalidPreference, PreferenceChange, TurnDecision};

pub const WELCOME_MESSAGE: &str = "Welcome to Geography Chat! To personalize your experience, \
I need to know your favorite country, continent, and destination. Let's start! \
What is your favorite country?";

pub const SUGGESTIONS: [&str; 5] = [
    "What are the most famous landmarks in my favorite country?",
    "What is the climate like in my favorite destination?",
    "Tell me about the culture of my favorite continent.",
    "What are some interesting facts about my favorite country?",
    "How does the population of my favorite destination compare to others?",
];

pub fn question(field: PreferenceField) -> String {
    match field {
        PreferenceField::FavoriteCountry => "What is your favorite country?".to_string(),
        PreferenceField::FavoriteContinent => format!(
            "What is your favorite continent? Please choose one of: {}.",
            Continent::allowed_list()
        ),
        PreferenceField::FavoriteDestination => {
            "What is your favorite destination? It can be a city, landmark, or region.".to_string()
        }
    }
}

/// Text for every branch except [`TurnDecision::Answer`], which streams.
pub fn directive(
    decision: &TurnDecision,
    changes: &[PreferenceChange],
    preferences: Option<&CompletePreferences>,
) -> Option<String> {
    match decision {
        TurnDecision::ReportInvalid { invalid, next_question } => {
            Some(invalid_text(invalid, *next_question))
        }
        TurnDecision::Ask(field) => Some(match acknowledgement(changes) {
            Some(ack) => format!("{ack} {}", question(*field)),
            None => question(*field),
        }),
        TurnDecision::ConfirmUpdate => Some(match preferences {
            Some(preferences) => format!(
                "Your preferences have been updated! Favorite country: {}, favorite continent: {}, \
                 favorite destination: {}. You can now ask me anything about world geography.",
                preferences.favorite_country,
                preferences.favorite_continent,
                preferences.favorite_destination
            ),
            None => "Your preferences have been updated! You can now ask me anything about \
                     world geography."
                .to_string(),
        }),
        TurnDecision::Answer => None,
    }
}

fn acknowledgement(changes: &[PreferenceChange]) -> Option<String> {
    if changes.is_empty() {
        return None;
    }
    let saved = changes
        .iter()
        .map(|change| format!("{} as your {}", change.value, change.field.label()))
        .collect::<Vec<_>>()
        .join(" and ");
    Some(format!("Got it! I've saved {saved}."))
}

fn invalid_text(invalid: &InvalidPreference, next_question: Option<PreferenceField>) -> String {
    let mut text = format!(
        "Sorry, that doesn't look like a valid {}: {}.",
        invalid.field.label(),
        invalid.reason.trim_end_matches('.')
    );

    let allowed = Continent::allowed_list();
    if invalid.field == PreferenceField::FavoriteContinent && !invalid.reason.contains(&allowed) {
        text.push_str(&format!(" Please choose one of: {allowed}."));
    }

    match next_question {
        Some(next) if next != invalid.field => {
            text.push(' ');
            text.push_str(&question(next));
        }
        Some(_) => text.push_str(" Could you try again?"),
        None => {}
    }

    text
}
