//! Namespace selection config
//!
//! Parses the user-supplied `namespaces` setting (a comma-separated list)
//! into a validated set of namespace names.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Name of the config key holding the namespace selection
pub const NAMESPACES_KEY: &str = "namespaces";

/// Namespace selection used when the user has not configured one
pub const DEFAULT_NAMESPACES: &str = "kube-system, kube-public, metallb-system";

/// Errors produced while validating the namespace selection
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The raw value was empty or held only separators and whitespace
    #[error("the namespaces config cannot be empty")]
    Empty,

    /// An entry does not match the namespace name pattern
    #[error("invalid namespace name: '{0}'")]
    InvalidName(String),
}

/// A validated Kubernetes namespace name
///
/// Lowercase alphanumerics and hyphens, at least one character, and no
/// leading or trailing hyphen.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NamespaceName(String);

impl NamespaceName {
    /// Validate and wrap a namespace name
    pub fn new(name: impl Into<String>) -> Result<Self, ConfigError> {
        let name = name.into();
        if is_valid_namespace_name(&name) {
            Ok(Self(name))
        } else {
            Err(ConfigError::InvalidName(name))
        }
    }

    /// The name as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn is_valid_namespace_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('-')
        && !name.ends_with('-')
        && name
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
}

impl fmt::Display for NamespaceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for NamespaceName {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for NamespaceName {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<NamespaceName> for String {
    fn from(name: NamespaceName) -> Self {
        name.0
    }
}

impl AsRef<str> for NamespaceName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Validate a raw comma-separated namespace selection
///
/// Entries are trimmed and empty entries are skipped. The first entry that
/// is not a valid namespace name fails the whole selection. A selection
/// with no entries at all is [`ConfigError::Empty`].
pub fn validate(raw: &str) -> Result<BTreeSet<NamespaceName>, ConfigError> {
    let mut namespaces = BTreeSet::new();
    for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        namespaces.insert(NamespaceName::new(entry)?);
    }

    if namespaces.is_empty() {
        return Err(ConfigError::Empty);
    }
    Ok(namespaces)
}

/// The raw namespace selection and the set derived from it
///
/// Rebuilt whenever the raw value changes; never mutated in place.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NamespaceConfig {
    raw: String,
    namespaces: BTreeSet<NamespaceName>,
}

impl NamespaceConfig {
    /// Parse a raw selection
    pub fn parse(raw: impl Into<String>) -> Result<Self, ConfigError> {
        let raw = raw.into();
        let namespaces = validate(&raw)?;
        Ok(Self { raw, namespaces })
    }

    /// The raw value as supplied by the user
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// The validated, never-empty namespace set
    pub fn namespaces(&self) -> &BTreeSet<NamespaceName> {
        &self.namespaces
    }
}

impl Default for NamespaceConfig {
    fn default() -> Self {
        let namespaces = ["kube-system", "kube-public", "metallb-system"]
            .into_iter()
            .map(|n| NamespaceName(n.to_string()))
            .collect();
        Self {
            raw: DEFAULT_NAMESPACES.to_string(),
            namespaces,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> BTreeSet<NamespaceName> {
        list.iter().map(|n| NamespaceName::new(*n).unwrap()).collect()
    }

    #[test]
    fn validates_comma_separated_list() {
        let parsed = validate("kube-system, kube-public").unwrap();
        assert_eq!(parsed, names(&["kube-system", "kube-public"]));
    }

    #[test]
    fn empty_and_whitespace_are_rejected() {
        assert_eq!(validate(""), Err(ConfigError::Empty));
        assert_eq!(validate("   "), Err(ConfigError::Empty));
        assert_eq!(validate(" , ,"), Err(ConfigError::Empty));
    }

    #[test]
    fn empty_error_message() {
        assert_eq!(
            ConfigError::Empty.to_string(),
            "the namespaces config cannot be empty"
        );
    }

    #[test]
    fn leading_hyphen_is_rejected() {
        let err = validate("-bad").unwrap_err();
        assert_eq!(err, ConfigError::InvalidName("-bad".to_string()));
        assert_eq!(err.to_string(), "invalid namespace name: '-bad'");
    }

    #[test]
    fn invalid_entry_fails_whole_selection() {
        assert_eq!(
            validate("kube-system, Kube_Public"),
            Err(ConfigError::InvalidName("Kube_Public".to_string()))
        );
        assert_eq!(
            validate("default, trailing-"),
            Err(ConfigError::InvalidName("trailing-".to_string()))
        );
        assert_eq!(
            validate("has space"),
            Err(ConfigError::InvalidName("has space".to_string()))
        );
    }

    #[test]
    fn empty_entries_and_duplicates_collapse() {
        let parsed = validate(",default,, default ,kube-system,").unwrap();
        assert_eq!(parsed, names(&["default", "kube-system"]));
    }

    #[test]
    fn single_character_and_digits_are_valid() {
        assert!(NamespaceName::new("a").is_ok());
        assert!(NamespaceName::new("0").is_ok());
        assert!(NamespaceName::new("team-42-prod").is_ok());
        assert!(NamespaceName::new("").is_err());
        assert!(NamespaceName::new("-").is_err());
    }

    #[test]
    fn default_config_matches_default_string() {
        let config = NamespaceConfig::default();
        assert_eq!(config.raw(), DEFAULT_NAMESPACES);
        assert_eq!(
            config,
            NamespaceConfig::parse(DEFAULT_NAMESPACES).unwrap(),
            "built-in default must equal parsing the default string"
        );
        assert_eq!(config.namespaces().len(), 3);
    }

    #[test]
    fn namespace_name_deserialization_validates() {
        let ok: NamespaceName = serde_json::from_str("\"kube-system\"").unwrap();
        assert_eq!(ok.as_str(), "kube-system");
        assert!(serde_json::from_str::<NamespaceName>("\"Kube-System\"").is_err());
    }
}
