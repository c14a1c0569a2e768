pub mod config;
pub mod domain;
pub mod errors;
pub mod flows;
pub mod validation;

pub use domain::extraction::PreferenceExtraction;
pub use domain::message::{Message, Role};
pub use domain::preferences::{CompletePreferences, Continent, PreferenceField, Preferences};
pub use domain::user::UserId;
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use flows::{OnboardingFlow, TurnDecision};
pub use validation::{FieldViolation, PreferencesInput, ValidationErrors};
