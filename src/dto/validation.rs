//! Validation helpers for DTOs.

use validator::ValidationError;

/// Validates a participant display name: non-blank, at most 40 characters.
pub fn validate_display_name(name: &str) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        let mut err = ValidationError::new("name_blank");
        err.message = Some("Name must not be blank".into());
        return Err(err);
    }

    if name.chars().count() > 40 {
        let mut err = ValidationError::new("name_length");
        err.message = Some("Name must be at most 40 characters".into());
        return Err(err);
    }

    Ok(())
}
