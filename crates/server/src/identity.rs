use axum::http::HeaderMap;

use geochat_core::domain::user::UserId;

pub const USER_ID_HEADER: &str = "x-user-id";

/// Caller identity from `x-user-id`; unusable or missing values fall back
/// to the configured default user.
pub fn user_id(headers: &HeaderMap, default_user: &UserId) -> UserId {
    headers
        .get(USER_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(UserId::parse)
        .unwrap_or_else(|| default_user.clone())
}

#[cfg(test)]
mod tests {
    use axum::http::{HeaderMap, HeaderValue};

    use geochat_core::domain::user::UserId;

    use super::user_id;

    fn default_user() -> UserId {
        UserId::parse("anonymous").expect("default user")
    }

    #[test]
    fn header_value_is_trimmed_and_used() {
        let mut headers = HeaderMap::new();
        headers.insert("x-user-id", HeaderValue::from_static("  traveler-42 "));

        assert_eq!(user_id(&headers, &default_user()).as_str(), "traveler-42");
    }

    #[test]
    fn missing_blank_or_oversized_ids_fall_back() {
        assert_eq!(user_id(&HeaderMap::new(), &default_user()).as_str(), "anonymous");

        let mut headers = HeaderMap::new();
        headers.insert("x-user-id", HeaderValue::from_static("   "));
        assert_eq!(user_id(&headers, &default_user()).as_str(), "anonymous");

        let long = "u".repeat(129);
        headers.insert("x-user-id", HeaderValue::from_str(&long).expect("header"));
        assert_eq!(user_id(&headers, &default_user()).as_str(), "anonymous");
    }
}
