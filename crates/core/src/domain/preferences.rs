use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PreferenceField {
    FavoriteCountry,
    FavoriteContinent,
    FavoriteDestination,
}

impl PreferenceField {
    /// Onboarding order. Questions are asked strictly left to right.
    pub const ALL: [Self; 3] =
        [Self::FavoriteCountry, Self::FavoriteContinent, Self::FavoriteDestination];

    pub fn key(&self) -> &'static str {
        match self {
            Self::FavoriteCountry => "favoriteCountry",
            Self::FavoriteContinent => "favoriteContinent",
            Self::FavoriteDestination => "favoriteDestination",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::FavoriteCountry => "favorite country",
            Self::FavoriteContinent => "favorite continent",
            Self::FavoriteDestination => "favorite destination",
        }
    }

    /// Accepts the wire key (`favoriteContinent`) or the bare noun (`continent`).
    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "favoritecountry" | "favorite_country" | "country" => Some(Self::FavoriteCountry),
            "favoritecontinent" | "favorite_continent" | "continent" => {
                Some(Self::FavoriteContinent)
            }
            "favoritedestination" | "favorite_destination" | "destination" => {
                Some(Self::FavoriteDestination)
            }
            _ => None,
        }
    }
}

impl fmt::Display for PreferenceField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Continent {
    Africa,
    Antarctica,
    Asia,
    Europe,
    #[serde(rename = "North America")]
    NorthAmerica,
    #[serde(rename = "South America")]
    SouthAmerica,
    Oceania,
}

impl Continent {
    pub const ALL: [Self; 7] = [
        Self::Africa,
        Self::Antarctica,
        Self::Asia,
        Self::Europe,
        Self::NorthAmerica,
        Self::SouthAmerica,
        Self::Oceania,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Africa => "Africa",
            Self::Antarctica => "Antarctica",
            Self::Asia => "Asia",
            Self::Europe => "Europe",
            Self::NorthAmerica => "North America",
            Self::SouthAmerica => "South America",
            Self::Oceania => "Oceania",
        }
    }

    /// `Africa, Antarctica, Asia, ...` for prompts and error messages.
    pub fn allowed_list() -> String {
        Self::ALL.iter().map(Continent::as_str).collect::<Vec<_>>().join(", ")
    }
}

impl fmt::Display for Continent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Continent {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let collapsed = value.split_whitespace().collect::<Vec<_>>().join(" ");
        Self::ALL
            .into_iter()
            .find(|continent| continent.as_str().eq_ignore_ascii_case(&collapsed))
            .ok_or(())
    }
}

/// Stored personalization slots. Each one is written and read independently.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preferences {
    pub favorite_country: Option<String>,
    pub favorite_continent: Option<String>,
    pub favorite_destination: Option<String>,
}

impl Preferences {
    pub fn get(&self, field: PreferenceField) -> Option<&str> {
        let value = match field {
            PreferenceField::FavoriteCountry => &self.favorite_country,
            PreferenceField::FavoriteContinent => &self.favorite_continent,
            PreferenceField::FavoriteDestination => &self.favorite_destination,
        };
        value.as_deref().filter(|value| !value.trim().is_empty())
    }

    pub fn set(&mut self, field: PreferenceField, value: impl Into<String>) {
        let slot = match field {
            PreferenceField::FavoriteCountry => &mut self.favorite_country,
            PreferenceField::FavoriteContinent => &mut self.favorite_continent,
            PreferenceField::FavoriteDestination => &mut self.favorite_destination,
        };
        *slot = Some(value.into());
    }

    pub fn first_missing(&self) -> Option<PreferenceField> {
        PreferenceField::ALL.into_iter().find(|field| self.get(*field).is_none())
    }

    pub fn is_complete(&self) -> bool {
        self.first_missing().is_none()
    }

    /// Fields that already hold a value, in onboarding order.
    pub fn known(&self) -> Vec<(PreferenceField, &str)> {
        PreferenceField::ALL
            .into_iter()
            .filter_map(|field| self.get(field).map(|value| (field, value)))
            .collect()
    }

    pub fn to_complete(&self) -> Option<CompletePreferences> {
        Some(CompletePreferences {
            favorite_country: self.get(PreferenceField::FavoriteCountry)?.to_string(),
            favorite_continent: self.get(PreferenceField::FavoriteContinent)?.to_string(),
            favorite_destination: self.get(PreferenceField::FavoriteDestination)?.to_string(),
        })
    }
}

/// A fully populated, validated preference set.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletePreferences {
    pub favorite_country: String,
    pub favorite_continent: String,
    pub favorite_destination: String,
}

impl CompletePreferences {
    pub fn get(&self, field: PreferenceField) -> &str {
        match field {
            PreferenceField::FavoriteCountry => &self.favorite_country,
            PreferenceField::FavoriteContinent => &self.favorite_continent,
            PreferenceField::FavoriteDestination => &self.favorite_destination,
        }
    }
}

impl From<CompletePreferences> for Preferences {
    fn from(value: CompletePreferences) -> Self {
        Self {
            favorite_country: Some(value.favorite_country),
            favorite_continent: Some(value.favorite_continent),
            favorite_destination: Some(value.favorite_destination),
        }
    }
}
