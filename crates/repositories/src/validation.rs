//! Input validation for emergency contact fields.

use std::fmt;

/// Validation error types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Phone number is not dialable.
    InvalidPhone(String),
    /// Value too long.
    TooLong { field: String, max: usize, actual: usize },
    /// Empty value where one is required.
    Empty(String),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::InvalidPhone(msg) => write!(f, "Invalid phone: {}", msg),
            ValidationError::TooLong { field, max, actual } => {
                write!(f, "{} is too long ({} chars, max {})", field, actual, max)
            }
            ValidationError::Empty(field) => write!(f, "{} cannot be empty", field),
        }
    }
}

impl std::error::Error for ValidationError {}

/// Maximum allowed length for contact names.
pub const MAX_NAME_LENGTH: usize = 100;

/// Maximum allowed length for relationship labels.
pub const MAX_RELATIONSHIP_LENGTH: usize = 50;

/// Minimum number of digits in a phone number.
pub const MIN_PHONE_DIGITS: usize = 3;

/// Maximum number of digits in a phone number (E.164).
pub const MAX_PHONE_DIGITS: usize = 15;

/// Validate a contact name.
pub fn validate_name(name: &str) -> Result<(), ValidationError> {
    let name = name.trim();

    if name.is_empty() {
        return Err(ValidationError::Empty("name".to_string()));
    }

    let len = name.chars().count();
    if len > MAX_NAME_LENGTH {
        return Err(ValidationError::TooLong {
            field: "name".to_string(),
            max: MAX_NAME_LENGTH,
            actual: len,
        });
    }

    Ok(())
}

/// Validate a phone number.
///
/// Accepts an optional leading `+`, digits, and the separators people type
/// (spaces, dashes, dots, parentheses). Short codes such as `112` are allowed.
pub fn validate_phone(phone: &str) -> Result<(), ValidationError> {
    let phone = phone.trim();

    if phone.is_empty() {
        return Err(ValidationError::Empty("phone".to_string()));
    }

    let body = phone.strip_prefix('+').unwrap_or(phone);
    let mut digits = 0usize;

    for c in body.chars() {
        match c {
            '0'..='9' => digits += 1,
            ' ' | '-' | '.' | '(' | ')' => {}
            other => {
                return Err(ValidationError::InvalidPhone(format!(
                    "unexpected character '{}'",
                    other
                )));
            }
        }
    }

    if digits < MIN_PHONE_DIGITS {
        return Err(ValidationError::InvalidPhone("too few digits".to_string()));
    }

    if digits > MAX_PHONE_DIGITS {
        return Err(ValidationError::TooLong {
            field: "phone".to_string(),
            max: MAX_PHONE_DIGITS,
            actual: digits,
        });
    }

    Ok(())
}

/// Validate a relationship label. Empty is allowed.
pub fn validate_relationship(relationship: &str) -> Result<(), ValidationError> {
    let len = relationship.trim().chars().count();

    if len > MAX_RELATIONSHIP_LENGTH {
        return Err(ValidationError::TooLong {
            field: "relationship".to_string(),
            max: MAX_RELATIONSHIP_LENGTH,
            actual: len,
        });
    }

    Ok(())
}

/// Validate every editable contact field.
pub fn validate_contact(name: &str, phone: &str, relationship: &str) -> Result<(), ValidationError> {
    validate_name(name)?;
    validate_phone(phone)?;
    validate_relationship(relationship)
}
