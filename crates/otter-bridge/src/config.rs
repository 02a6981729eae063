//! Bridge configuration

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::convert::Converter;
use crate::error::{BridgeError, BridgeResult};

/// Configuration for a [`Runner`](crate::Runner)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Directories searched, in order, for script files (first match wins)
    pub search_dirs: Vec<PathBuf>,

    /// Field-tag scheme used to name record fields in scripts
    pub tag: Option<String>,

    /// Language features enabled in compiled scripts
    pub dialect: Dialect,
}

impl BridgeConfig {
    /// Configuration searching the given directories
    pub fn new<I, P>(dirs: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            search_dirs: dirs.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Use a field-tag scheme
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    /// Use a dialect
    pub fn with_dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }

    /// Check the configuration before building a runner
    pub fn validate(&self) -> BridgeResult<()> {
        if self.search_dirs.is_empty() {
            return Err(BridgeError::Config(
                "at least one search directory is required".to_string(),
            ));
        }
        if self.tag.as_deref() == Some("") {
            return Err(BridgeError::Config("tag scheme must not be empty".to_string()));
        }
        Ok(())
    }

    /// Converter honoring the configured tag scheme
    pub fn converter(&self) -> Converter {
        match &self.tag {
            Some(tag) => Converter::with_tag(tag),
            None => Converter::new(),
        }
    }
}

/// Optional language features passed to the engine at compile time.
///
/// Everything is enabled by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Dialect {
    /// Nested `def` statements
    pub nested_def: bool,
    /// `lambda` expressions
    pub lambda: bool,
    /// Floating point numbers
    pub float: bool,
    /// The `set` type
    pub set: bool,
    /// Bitwise operators on integers
    pub bitwise: bool,
}

impl Default for Dialect {
    fn default() -> Self {
        Self {
            nested_def: true,
            lambda: true,
            float: true,
            set: true,
            bitwise: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_requires_dirs() {
        assert!(matches!(
            BridgeConfig::default().validate(),
            Err(BridgeError::Config(_))
        ));
        assert!(BridgeConfig::new(["scripts"]).validate().is_ok());
        assert!(BridgeConfig::new(["scripts"]).with_tag("").validate().is_err());
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let config: BridgeConfig =
            serde_json::from_str(r#"{"search_dirs": ["a", "b"], "dialect": {"lambda": false}}"#)
                .unwrap();
        assert_eq!(config.search_dirs, vec![PathBuf::from("a"), PathBuf::from("b")]);
        assert!(!config.dialect.lambda);
        assert!(config.dialect.nested_def);
        assert_eq!(config.tag, None);
    }

    #[test]
    fn test_converter_uses_tag() {
        let config = BridgeConfig::new(["x"]).with_tag("star");
        assert_eq!(config.converter().tag(), Some("star"));
    }
}
