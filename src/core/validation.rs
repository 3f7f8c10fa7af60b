//! Validation for entry names and paths
//!
//! Entry names are stored as UTF-16 in a 64-byte field that includes a
//! terminating null, so a name holds at most 31 code units.
//!
//! # Rules
//! - Non-empty
//! - At most 31 UTF-16 code units
//! - None of `/`, `\`, `:`, `!` or NUL
//!
//! Paths use `/` as separator. Empty components are ignored, so
//! `"/Dir//Doc"` and `"Dir/Doc"` name the same entry.

use crate::error::{CompoundError, Result};
use regex::Regex;

/// Longest name in UTF-16 code units
pub const MAX_NAME_UNITS: usize = 31;

/// Characters that cannot appear in an entry name
const FORBIDDEN_PATTERN: &str = r"[/\\:!\x00]";

/// Validate a name for a new or renamed entry
///
/// # Examples
///
/// ```
/// use compound_rs::core::validation::validate_entry_name;
///
/// assert!(validate_entry_name("WordDocument").is_ok());
/// assert!(validate_entry_name("\u{5}SummaryInformation").is_ok());
/// assert!(validate_entry_name("a/b").is_err());
/// assert!(validate_entry_name("").is_err());
/// ```
pub fn validate_entry_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(invalid(name, "name cannot be empty"));
    }

    let units = name.encode_utf16().count();
    if units > MAX_NAME_UNITS {
        return Err(invalid(
            name,
            &format!(
                "name is {} UTF-16 units long, maximum is {}",
                units, MAX_NAME_UNITS
            ),
        ));
    }

    let re = Regex::new(FORBIDDEN_PATTERN).map_err(|e| invalid(name, &e.to_string()))?;
    if let Some(found) = re.find(name) {
        return Err(invalid(
            name,
            &format!("character {:?} is not allowed", found.as_str()),
        ));
    }

    Ok(())
}

/// Split a slash path into its non-empty components
pub fn split_path(path: &str) -> Vec<&str> {
    path.split('/').filter(|part| !part.is_empty()).collect()
}

fn invalid(name: &str, reason: &str) -> CompoundError {
    CompoundError::InvalidName {
        name: name.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_names() {
        assert!(validate_entry_name("Root Entry").is_ok());
        assert!(validate_entry_name("Workbook").is_ok());
        assert!(validate_entry_name("__substg1.0_0037001F").is_ok());
        assert!(validate_entry_name("\u{1}CompObj").is_ok());
        assert!(validate_entry_name(&"x".repeat(31)).is_ok());
    }

    #[test]
    fn test_invalid_names() {
        assert!(validate_entry_name("").is_err());
        assert!(validate_entry_name(&"x".repeat(32)).is_err());
        assert!(validate_entry_name("a/b").is_err());
        assert!(validate_entry_name("a\\b").is_err());
        assert!(validate_entry_name("drive:").is_err());
        assert!(validate_entry_name("bang!").is_err());
        assert!(validate_entry_name("nul\0").is_err());
    }

    #[test]
    fn test_length_counts_utf16_units() {
        // Each of these is two UTF-16 units
        let name = "\u{1F600}".repeat(16);
        assert!(matches!(
            validate_entry_name(&name),
            Err(CompoundError::InvalidName { .. })
        ));
        assert!(validate_entry_name(&"\u{1F600}".repeat(15)).is_ok());
    }

    #[test]
    fn test_split_path() {
        assert_eq!(split_path("/Dir//Doc"), vec!["Dir", "Doc"]);
        assert_eq!(split_path("Doc"), vec!["Doc"]);
        assert!(split_path("/").is_empty());
    }
}
