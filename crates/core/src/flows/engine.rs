use crate::domain::extraction::PreferenceExtraction;
use crate::domain::preferences::{PreferenceField, Preferences};
use crate::flows::states::{
    InvalidPreference, OnboardingState, PreferenceChange, TurnDecision, TurnFacts, UpdatePlan,
};
use crate::validation::validate_field;

/// Onboarding decision logic. Pure: callers own the reads and writes that
/// happen between [`OnboardingFlow::plan`] and [`OnboardingFlow::decide`].
#[derive(Clone, Debug, Default)]
pub struct OnboardingFlow;

impl OnboardingFlow {
    pub fn new() -> Self {
        Self
    }

    /// Turns an extraction into the writes for this turn.
    ///
    /// Only validated values that differ from what is stored become changes.
    /// A value that fails validation, or that the model itself flagged, is
    /// never written.
    pub fn plan(&self, stored: &Preferences, extraction: &PreferenceExtraction) -> UpdatePlan {
        let flagged = extraction.flagged_field();
        let mut plan = UpdatePlan::default();

        if extraction.is_updating_user_preferences {
            for field in PreferenceField::ALL {
                let Some(raw) = extraction.value(field) else {
                    continue;
                };
                if flagged == Some(field) {
                    continue;
                }
                match validate_field(field, raw) {
                    Ok(value) if stored.get(field) != Some(value.as_str()) => {
                        plan.changes.push(PreferenceChange { field, value });
                    }
                    Ok(_) => {}
                    Err(violation) => {
                        if plan.invalid.is_none() {
                            plan.invalid =
                                Some(InvalidPreference { field, reason: violation.message });
                        }
                    }
                }
            }
        }

        if plan.invalid.is_none() {
            if let Some(field) = flagged {
                plan.invalid = Some(InvalidPreference {
                    field,
                    reason: flagged_reason(field, extraction),
                });
            }
        }

        plan
    }

    /// First matching rule wins: invalid input, then the missing-field ladder
    /// (country, continent, destination), then the one-time confirmation,
    /// then open answering.
    pub fn decide(&self, facts: TurnFacts) -> TurnDecision {
        use OnboardingState::{Complete, NeedsContinent, NeedsCountry, NeedsDestination};

        match (facts.invalid, facts.state, facts.changed) {
            (Some(invalid), state, _) => {
                TurnDecision::ReportInvalid { invalid, next_question: state.missing_field() }
            }
            (None, NeedsCountry, _) => TurnDecision::Ask(PreferenceField::FavoriteCountry),
            (None, NeedsContinent, _) => TurnDecision::Ask(PreferenceField::FavoriteContinent),
            (None, NeedsDestination, _) => TurnDecision::Ask(PreferenceField::FavoriteDestination),
            (None, Complete, true) => TurnDecision::ConfirmUpdate,
            (None, Complete, false) => TurnDecision::Answer,
        }
    }
}

fn flagged_reason(field: PreferenceField, extraction: &PreferenceExtraction) -> String {
    if let Some(reason) =
        extraction.invalid_reason.as_deref().map(str::trim).filter(|reason| !reason.is_empty())
    {
        return reason.to_string();
    }

    extraction
        .value(field)
        .and_then(|raw| validate_field(field, raw).err())
        .map(|violation| violation.message)
        .unwrap_or_else(|| format!("that is not a valid {}", field.label()))
}
