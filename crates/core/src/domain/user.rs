use std::fmt;

use serde::{Deserialize, Serialize};

pub const MAX_USER_ID_LEN: usize = 128;

/// Opaque caller identity. Every stored key for a user is namespaced by it.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

impl UserId {
    /// Accepts a trimmed, non-empty identifier of at most [`MAX_USER_ID_LEN`] characters.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.chars().count() > MAX_USER_ID_LEN {
            return None;
        }
        Some(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::{UserId, MAX_USER_ID_LEN};

    #[test]
    fn parse_trims_and_rejects_blank_or_oversized_ids() {
        assert_eq!(UserId::parse("  alice ").map(|id| id.0), Some("alice".to_string()));
        assert!(UserId::parse("   ").is_none());
        assert!(UserId::parse(&"x".repeat(MAX_USER_ID_LEN + 1)).is_none());
    }
}
