//! Language code newtype.
//!
//! The source system treats language codes as open strings validated against
//! a configured supported set, not a closed enum of every language on earth —
//! modeled here the same way.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A BCP-47-ish language tag, e.g. `"en"`, `"ja"`, `"pt-BR"`.
///
/// Comparison and hashing are case-insensitive on the ASCII range; the
/// original casing is preserved for display.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LanguageCode(String);

impl LanguageCode {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn normalized(&self) -> String {
        self.0.to_ascii_lowercase()
    }
}

impl PartialEq for LanguageCode {
    fn eq(&self, other: &Self) -> bool {
        self.normalized() == other.normalized()
    }
}

impl Eq for LanguageCode {}

impl std::hash::Hash for LanguageCode {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.normalized().hash(state);
    }
}

impl fmt::Display for LanguageCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for LanguageCode {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for LanguageCode {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_is_case_insensitive() {
        assert_eq!(LanguageCode::new("EN"), LanguageCode::new("en"));
        assert_ne!(LanguageCode::new("en"), LanguageCode::new("ja"));
    }

    #[test]
    fn hash_matches_normalized_equality() {
        use std::collections::HashSet;
        let mut set = HashSet::new();
        set.insert(LanguageCode::new("JA"));
        assert!(set.contains(&LanguageCode::new("ja")));
    }
}
