pub mod extraction;
pub mod message;
pub mod preferences;
pub mod user;
