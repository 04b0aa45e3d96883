//! Validation helpers for DTOs.

use validator::ValidationError;

use crate::state::session::Athlete;

/// Longest accepted player name, in characters, after trimming.
pub const MAX_NAME_CHARS: usize = 40;

/// Validates that a player name has visible characters and a sane length.
///
/// # Examples
///
/// ```ignore
/// validate_player_name("Heidi")  // Ok
/// validate_player_name("   ")    // Err - blank
/// ```
pub fn validate_player_name(name: &str) -> Result<(), ValidationError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        let mut err = ValidationError::new("name_required");
        err.message = Some("Please enter your name!".into());
        return Err(err);
    }

    let chars = trimmed.chars().count();
    if chars > MAX_NAME_CHARS {
        let mut err = ValidationError::new("name_length");
        err.message = Some(
            format!("Name must be at most {MAX_NAME_CHARS} characters (got {chars})").into(),
        );
        return Err(err);
    }

    Ok(())
}

/// Validates that an athlete was picked and is one this build knows.
pub fn validate_athlete(icon: &str) -> Result<(), ValidationError> {
    let icon = icon.trim();
    if icon.is_empty() {
        let mut err = ValidationError::new("athlete_required");
        err.message = Some("Please select an athlete!".into());
        return Err(err);
    }

    if icon.parse::<Athlete>().is_err() {
        let mut err = ValidationError::new("athlete_unknown");
        err.message = Some(format!("Unknown athlete `{icon}`").into());
        return Err(err);
    }

    Ok(())
}
