//! Locally generated identifiers.
//!
//! Records created while offline get an id with a reserved prefix. Such an id
//! is never sent to the backend as an update key: its presence means the
//! record still has to be created remotely.

use uuid::Uuid;

/// Prefix that marks an id as locally generated.
pub const PREFIX: &str = "local_";

/// Generate a new placeholder id.
pub fn generate() -> String {
    format!("{}{}", PREFIX, Uuid::new_v4())
}

/// Whether `id` was generated locally.
pub fn is_placeholder(id: &str) -> bool {
    id.starts_with(PREFIX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_ids_are_placeholders() {
        let a = generate();
        let b = generate();
        assert!(is_placeholder(&a));
        assert_ne!(a, b);
    }

    #[test]
    fn test_server_ids_are_not_placeholders() {
        assert!(!is_placeholder("42"));
        assert!(!is_placeholder("c27fb365-0c84-4cf2-8555-814bb065e448"));
    }
}
