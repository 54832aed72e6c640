//! Opaque bearer token generation.

use uuid::Uuid;

/// Generate a new opaque bearer token.
pub fn generate_token() -> String {
    format!("folio-{}", Uuid::new_v4().simple())
}

/// Validate the shape of a bearer token
pub fn validate_token_format(token: &str) -> bool {
    token.starts_with("folio-") && token.len() > 20
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_token() {
        let token = generate_token();
        assert!(token.starts_with("folio-"));
        assert!(validate_token_format(&token));
    }

    #[test]
    fn test_validate_token() {
        assert!(!validate_token_format("invalid"));
        assert!(!validate_token_format("folio-"));
    }

    #[test]
    fn test_tokens_are_unique() {
        assert_ne!(generate_token(), generate_token());
    }
}
