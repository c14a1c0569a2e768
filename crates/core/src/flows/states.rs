use crate::domain::preferences::{PreferenceField, Preferences};

/// Where a user stands in onboarding, derived from the stored slots.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OnboardingState {
    NeedsCountry,
    NeedsContinent,
    NeedsDestination,
    Complete,
}

impl OnboardingState {
    pub fn of(preferences: &Preferences) -> Self {
        match preferences.first_missing() {
            Some(PreferenceField::FavoriteCountry) => Self::NeedsCountry,
            Some(PreferenceField::FavoriteContinent) => Self::NeedsContinent,
            Some(PreferenceField::FavoriteDestination) => Self::NeedsDestination,
            None => Self::Complete,
        }
    }

    pub fn missing_field(&self) -> Option<PreferenceField> {
        match self {
            Self::NeedsCountry => Some(PreferenceField::FavoriteCountry),
            Self::NeedsContinent => Some(PreferenceField::FavoriteContinent),
            Self::NeedsDestination => Some(PreferenceField::FavoriteDestination),
            Self::Complete => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InvalidPreference {
    pub field: PreferenceField,
    pub reason: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PreferenceChange {
    pub field: PreferenceField,
    pub value: String,
}

/// Writes to apply for one turn plus the invalid value, if any, that was held back.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UpdatePlan {
    pub changes: Vec<PreferenceChange>,
    pub invalid: Option<InvalidPreference>,
}

impl UpdatePlan {
    pub fn has_changes(&self) -> bool {
        !self.changes.is_empty()
    }
}

/// Everything the decision table looks at, taken after the turn's writes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TurnFacts {
    pub state: OnboardingState,
    pub changed: bool,
    pub invalid: Option<InvalidPreference>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TurnDecision {
    ReportInvalid { invalid: InvalidPreference, next_question: Option<PreferenceField> },
    Ask(PreferenceField),
    ConfirmUpdate,
    Answer,
}

impl TurnDecision {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ReportInvalid { .. } => "report_invalid",
            Self::Ask(PreferenceField::FavoriteCountry) => "ask_country",
            Self::Ask(PreferenceField::FavoriteContinent) => "ask_continent",
            Self::Ask(PreferenceField::FavoriteDestination) => "ask_destination",
            Self::ConfirmUpdate => "confirm_update",
            Self::Answer => "answer",
        }
    }
}
