pub mod engine;
pub mod replies;
pub mod states;

pub use engine::OnboardingFlow;
pub use states::{
    InvalidPreference, OnboardingState, PreferenceChange, TurnDecision, TurnFacts, UpdatePlan,
};
