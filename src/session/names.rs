//! Run and experiment names.

use std::path::{Component, Path};

use uuid::Uuid;

use crate::config::MAX_RUN_NAME_LENGTH;
use crate::{Error, Result};

/// Generate a random lowercase hex run name of `len` characters.
///
/// Uniqueness is not checked here; the `(experiment, name)` constraint is the
/// only guard.
#[must_use]
pub fn generate_run_name(len: usize) -> String {
    let mut name = Uuid::new_v4().simple().to_string();
    name.truncate(len.clamp(1, MAX_RUN_NAME_LENGTH));
    name
}

/// Reject names that cannot be used as a single directory component.
pub(crate) fn validate_name(name: &str) -> Result<()> {
    let reason = if name.is_empty() {
        Some("name must not be empty")
    } else if name.contains('/') || name.contains('\\') {
        Some("name must not contain path separators")
    } else if !matches!(Path::new(name).components().next(), Some(Component::Normal(_))) {
        Some("name must not be '.' or '..'")
    } else {
        None
    };
    match reason {
        Some(reason) => Err(Error::InvalidName {
            name: name.to_string(),
            reason,
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_name_length_and_charset() {
        let name = generate_run_name(10);
        assert_eq!(name.len(), 10);
        assert!(name.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_generated_name_length_is_clamped() {
        assert_eq!(generate_run_name(0).len(), 1);
        assert_eq!(generate_run_name(100).len(), MAX_RUN_NAME_LENGTH);
    }

    #[test]
    fn test_generated_names_differ() {
        assert_ne!(generate_run_name(32), generate_run_name(32));
    }

    #[test]
    fn test_validate_name() {
        validate_name("exp-A").unwrap();
        validate_name("experiment 1").unwrap();
        for bad in ["", ".", "..", "a/b", "a\\b", "/abs"] {
            assert!(
                matches!(validate_name(bad), Err(Error::InvalidName { .. })),
                "accepted {bad:?}"
            );
        }
    }
}
