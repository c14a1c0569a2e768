//! Preference rules shared by the `POST /preferences` boundary and by the
//! onboarding flow when it checks values pulled out of chat messages.
//!
//! - country: 2-50 characters, letters, spaces and hyphens
//! - continent: one of [`Continent::ALL`], matched case-insensitively and
//!   stored in canonical spelling
//! - destination: 2-100 characters, letters, spaces and hyphens

use std::fmt;

use serde::Deserialize;
use thiserror::Error;

use crate::domain::preferences::{CompletePreferences, Continent, PreferenceField};

const COUNTRY_LEN: (usize, usize) = (2, 50);
const DESTINATION_LEN: (usize, usize) = (2, 100);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldViolation {
    pub field: PreferenceField,
    pub message: String,
}

impl fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{}", join_messages(.violations))]
pub struct ValidationErrors {
    pub violations: Vec<FieldViolation>,
}

fn join_messages(violations: &[FieldViolation]) -> String {
    violations.iter().map(|violation| violation.message.as_str()).collect::<Vec<_>>().join("; ")
}

/// Raw form body. Every field is optional on the wire so that a missing
/// field surfaces as a validation message rather than a decode failure.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreferencesInput {
    pub favorite_country: Option<String>,
    pub favorite_continent: Option<String>,
    pub favorite_destination: Option<String>,
}

impl PreferencesInput {
    fn get(&self, field: PreferenceField) -> Option<&str> {
        match field {
            PreferenceField::FavoriteCountry => self.favorite_country.as_deref(),
            PreferenceField::FavoriteContinent => self.favorite_continent.as_deref(),
            PreferenceField::FavoriteDestination => self.favorite_destination.as_deref(),
        }
    }
}

/// Validates one value, returning the normalized form to store.
pub fn validate_field(field: PreferenceField, raw: &str) -> Result<String, FieldViolation> {
    let value = raw.trim();
    let violation = |message: String| FieldViolation { field, message };

    match field {
        PreferenceField::FavoriteCountry => {
            check_name(value, "Favorite country", "Country name", COUNTRY_LEN).map_err(violation)
        }
        PreferenceField::FavoriteDestination => {
            check_name(value, "Favorite destination", "Destination name", DESTINATION_LEN)
                .map_err(violation)
        }
        PreferenceField::FavoriteContinent => {
            if value.is_empty() {
                return Err(violation("Favorite continent is required".to_string()));
            }
            value.parse::<Continent>().map(|continent| continent.as_str().to_string()).map_err(
                |_| {
                    violation(format!(
                        "Please select a valid continent: {}",
                        Continent::allowed_list()
                    ))
                },
            )
        }
    }
}

/// Validates a whole submission and reports every failing field.
pub fn validate_preferences(
    input: &PreferencesInput,
) -> Result<CompletePreferences, ValidationErrors> {
    let mut violations = Vec::new();
    let mut values = Vec::with_capacity(PreferenceField::ALL.len());

    for field in PreferenceField::ALL {
        match validate_field(field, input.get(field).unwrap_or_default()) {
            Ok(value) => values.push(value),
            Err(violation) => violations.push(violation),
        }
    }

    if !violations.is_empty() {
        return Err(ValidationErrors { violations });
    }

    let mut values = values.into_iter();
    match (values.next(), values.next(), values.next()) {
        (Some(favorite_country), Some(favorite_continent), Some(favorite_destination)) => {
            Ok(CompletePreferences { favorite_country, favorite_continent, favorite_destination })
        }
        _ => Err(ValidationErrors { violations: Vec::new() }),
    }
}

fn check_name(
    value: &str,
    required_label: &str,
    name_label: &str,
    (min, max): (usize, usize),
) -> Result<String, String> {
    if value.is_empty() {
        return Err(format!("{required_label} is required"));
    }

    let length = value.chars().count();
    if length < min {
        return Err(format!("{name_label} must be at least {min} characters"));
    }
    if length > max {
        return Err(format!("{name_label} must be less than {max} characters"));
    }
    if !value.chars().all(|ch| ch.is_alphabetic() || ch == ' ' || ch == '-') {
        return Err(format!("{name_label} can only contain letters, spaces, and hyphens"));
    }

    Ok(value.to_string())
}

#[cfg(test)]
mod tests {
    use super::{validate_field, validate_preferences, PreferencesInput};
    use crate::domain::preferences::PreferenceField;

    fn input(country: &str, continent: &str, destination: &str) -> PreferencesInput {
        PreferencesInput {
            favorite_country: Some(country.to_string()),
            favorite_continent: Some(continent.to_string()),
            favorite_destination: Some(destination.to_string()),
        }
    }

    #[test]
    fn valid_submission_is_normalized() {
        let complete = validate_preferences(&input(" Peru ", "south america", "Machu Picchu"))
            .expect("valid preferences");

        assert_eq!(complete.favorite_country, "Peru");
        assert_eq!(complete.favorite_continent, "South America");
        assert_eq!(complete.favorite_destination, "Machu Picchu");
    }

    #[test]
    fn unknown_continent_lists_allowed_set() {
        let errors =
            validate_preferences(&input("France", "Atlantis", "Paris")).expect_err("invalid");

        assert_eq!(errors.violations.len(), 1);
        assert_eq!(errors.violations[0].field, PreferenceField::FavoriteContinent);
        let message = errors.to_string();
        for continent in ["Africa", "Antarctica", "Asia", "Europe", "North America", "Oceania"] {
            assert!(message.contains(continent), "missing {continent} in `{message}`");
        }
    }

    #[test]
    fn every_failing_field_is_reported() {
        let errors = validate_preferences(&PreferencesInput::default()).expect_err("invalid");

        assert_eq!(errors.violations.len(), 3);
        assert_eq!(
            errors.to_string(),
            "Favorite country is required; Favorite continent is required; \
             Favorite destination is required"
        );
    }

    #[test]
    fn names_enforce_length_and_charset() {
        assert!(validate_field(PreferenceField::FavoriteCountry, "X").is_err());
        assert!(validate_field(PreferenceField::FavoriteCountry, &"a".repeat(51)).is_err());
        assert!(validate_field(PreferenceField::FavoriteDestination, &"a".repeat(100)).is_ok());
        assert!(validate_field(PreferenceField::FavoriteDestination, "Paris 75").is_err());
        assert_eq!(
            validate_field(PreferenceField::FavoriteCountry, "Guinea-Bissau"),
            Ok("Guinea-Bissau".to_string())
        );
        assert_eq!(
            validate_field(PreferenceField::FavoriteCountry, "Côte-dIvoire"),
            Ok("Côte-dIvoire".to_string())
        );
    }
}
