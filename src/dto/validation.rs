//! Validation helpers for DTOs.

use validator::ValidationError;

/// Maximum accepted length for a field tag; anything longer is a client bug.
const MAX_FIELD_TAG_LEN: usize = 64;

/// Validates a lockable field tag: non-blank, bounded length.
///
/// Field tags are application-defined strings (`"score"`, `"points"`,
/// `"notes"`, ...) rather than a fixed enum; only well-formedness is checked.
pub fn validate_field_tag(field: &str) -> Result<(), ValidationError> {
    if field.trim().is_empty() {
        let mut err = ValidationError::new("field_tag_blank");
        err.message = Some("field tag must not be blank".into());
        return Err(err);
    }

    if field.len() > MAX_FIELD_TAG_LEN {
        let mut err = ValidationError::new("field_tag_length");
        err.message = Some(
            format!(
                "field tag must be at most {MAX_FIELD_TAG_LEN} characters (got {})",
                field.len()
            )
            .into(),
        );
        return Err(err);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_field_tag_valid() {
        assert!(validate_field_tag("score").is_ok());
        assert!(validate_field_tag("points").is_ok());
        assert!(validate_field_tag("notes").is_ok());
        assert!(validate_field_tag("bonus_round_3").is_ok());
    }

    #[test]
    fn test_validate_field_tag_blank() {
        assert!(validate_field_tag("").is_err());
        assert!(validate_field_tag("   ").is_err());
        assert!(validate_field_tag("\t").is_err());
    }

    #[test]
    fn test_validate_field_tag_too_long() {
        let long = "f".repeat(MAX_FIELD_TAG_LEN + 1);
        assert!(validate_field_tag(&long).is_err());
        let max = "f".repeat(MAX_FIELD_TAG_LEN);
        assert!(validate_field_tag(&max).is_ok());
    }
}
