//! Input rules for accounts and content
//!
//! Every rule reports a `ValidationError` naming the offending input field.

use gazette_core::ApiError;

pub const USERNAME_LENGTH: (usize, usize) = (3, 32);
pub const PASSWORD_MIN_LENGTH: usize = 8;
pub const TITLE_LENGTH: (usize, usize) = (1, 200);
pub const POST_BODY_LENGTH: (usize, usize) = (1, 10_000);
pub const COMMENT_BODY_LENGTH: (usize, usize) = (1, 2_000);

pub fn username(value: &str) -> Result<String, ApiError> {
    let (min, max) = USERNAME_LENGTH;
    let length = value.chars().count();
    if length < min || length > max {
        return Err(ApiError::validation(
            "username",
            format!("Username must be between {min} and {max} characters"),
        ));
    }
    if !value.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(ApiError::validation(
            "username",
            "Username may only contain letters, digits and underscores",
        ));
    }
    Ok(value.to_string())
}

/// Check the shape `local@domain.tld` and return the stored form: trimmed
/// and lowercased
pub fn email(value: &str) -> Result<String, ApiError> {
    let normalized = value.trim().to_lowercase();
    if is_email(&normalized) {
        Ok(normalized)
    } else {
        Err(ApiError::validation("email", "Email address is not valid"))
    }
}

fn is_email(value: &str) -> bool {
    if value.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    let labels: Vec<&str> = domain.split('.').collect();
    labels.len() >= 2
        && labels.iter().all(|label| !label.is_empty())
        && labels.last().is_some_and(|tld| tld.len() >= 2)
}

/// At least eight characters with an upper-case letter, a lower-case letter
/// and a digit
pub fn password(field: &str, value: &str) -> Result<(), ApiError> {
    if value.chars().count() < PASSWORD_MIN_LENGTH {
        return Err(ApiError::validation(
            field,
            format!("Password must be at least {PASSWORD_MIN_LENGTH} characters"),
        ));
    }
    let upper = value.chars().any(char::is_uppercase);
    let lower = value.chars().any(char::is_lowercase);
    let digit = value.chars().any(|c| c.is_ascii_digit());
    if upper && lower && digit {
        Ok(())
    } else {
        Err(ApiError::validation(
            field,
            "Password must contain an upper-case letter, a lower-case letter and a digit",
        ))
    }
}

/// Trim `value` and require its length to fall within `bounds`
pub fn text(field: &str, value: &str, bounds: (usize, usize)) -> Result<String, ApiError> {
    let (min, max) = bounds;
    let trimmed = value.trim();
    let length = trimmed.chars().count();
    if length < min || length > max {
        return Err(ApiError::validation(
            field,
            format!("{field} must be between {min} and {max} characters"),
        ));
    }
    Ok(trimmed.to_string())
}
