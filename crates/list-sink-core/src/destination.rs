//! The ordered set of lists every payload is appended to.

use crate::error::ConfigError;
use std::fmt;
use tracing::warn;

/// Destination list keys, in delivery order.
///
/// Duplicates are kept as configured (each one is written), but logged at
/// construction since they are almost always a configuration mistake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    keys: Vec<String>,
}

impl Destination {
    pub fn new<I, S>(keys: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let keys: Vec<String> = keys.into_iter().map(Into::into).collect();

        if keys.is_empty() {
            return Err(ConfigError::Invalid(
                "at least one destination key is required".to_string(),
            ));
        }
        if let Some(pos) = keys.iter().position(|k| k.trim().is_empty()) {
            return Err(ConfigError::Invalid(format!(
                "destination key at position {} is empty",
                pos
            )));
        }

        let destination = Self { keys };
        if destination.has_duplicates() {
            warn!(keys = %destination, "Destination keys contain duplicates; records will be written more than once");
        }
        Ok(destination)
    }

    /// Parse a comma-separated key list, trimming whitespace.
    pub fn parse(list: &str) -> Result<Self, ConfigError> {
        Self::new(list.split(',').map(str::trim).filter(|k| !k.is_empty()))
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn has_duplicates(&self) -> bool {
        self.keys
            .iter()
            .enumerate()
            .any(|(i, key)| self.keys[..i].contains(key))
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.keys.join(","))
    }
}
