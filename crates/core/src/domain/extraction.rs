use serde::{Deserialize, Serialize};

use crate::domain::preferences::PreferenceField;

/// Structured verdict on the latest user message, produced by the extraction
/// model call. Consumed once per turn and never stored.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreferenceExtraction {
    pub is_updating_user_preferences: bool,
    #[serde(default)]
    pub favorite_country: Option<String>,
    #[serde(default)]
    pub favorite_continent: Option<String>,
    #[serde(default)]
    pub favorite_destination: Option<String>,
    #[serde(default)]
    pub invalid_field: Option<String>,
    #[serde(default)]
    pub invalid_reason: Option<String>,
}

impl PreferenceExtraction {
    /// The "no update" verdict returned whenever the model call fails.
    pub fn no_update() -> Self {
        Self::default()
    }

    pub fn value(&self, field: PreferenceField) -> Option<&str> {
        let value = match field {
            PreferenceField::FavoriteCountry => &self.favorite_country,
            PreferenceField::FavoriteContinent => &self.favorite_continent,
            PreferenceField::FavoriteDestination => &self.favorite_destination,
        };
        value.as_deref().map(str::trim).filter(|value| !value.is_empty())
    }

    /// The flagged field, if the model named one we know.
    pub fn flagged_field(&self) -> Option<PreferenceField> {
        self.invalid_field.as_deref().and_then(PreferenceField::parse)
    }
}
