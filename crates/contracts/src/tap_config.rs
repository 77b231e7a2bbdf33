//! Tap identity configuration and the process-wide default author

use serde::{Deserialize, Serialize};

use crate::IngestError;

/// Identity configuration shared by every tap
///
/// `name` becomes the `source` of records the tap produces; `author`
/// overrides the injected process default when set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TapConfig {
    /// Source name for records produced by this tap (required, non-empty)
    pub name: String,

    /// Author override for records produced by this tap
    pub author: Option<String>,
}

impl TapConfig {
    /// Create a tap configuration with the default author
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            author: None,
        }
    }

    /// Set an explicit author
    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    /// Validate required fields
    ///
    /// # Errors
    /// Returns `ConfigValidation` when `name` is empty.
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.name.is_empty() {
            return Err(IngestError::config_validation("name", "name is required"));
        }
        Ok(())
    }

    /// Resolve the effective author, falling back to the injected default.
    ///
    /// Resolution happens once at tap construction; the result is cached by
    /// the tap and never re-read.
    pub fn resolve_author(&self, default: &AuthorDefault) -> String {
        self.author
            .clone()
            .unwrap_or_else(|| default.as_str().to_string())
    }
}

/// Explicitly-initialized process-wide default author
///
/// Built once at startup and injected into every tap constructor. There is
/// no mutable global; taps constructed later with a different default are
/// unaffected by each other.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorDefault(String);

impl AuthorDefault {
    /// Environment variable consulted when no explicit default is configured.
    pub const ENV_VAR: &'static str = "INGESTER_AUTHOR";

    /// Resolve the default author.
    ///
    /// Precedence: explicit configuration value, then `INGESTER_AUTHOR`,
    /// then `"localhost"`.
    pub fn resolve(configured: Option<String>) -> Self {
        let value = configured
            .or_else(|| std::env::var(Self::ENV_VAR).ok())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| "localhost".to_string());
        Self(value)
    }

    /// Get the underlying author name
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for AuthorDefault {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for AuthorDefault {
    fn from(s: String) -> Self {
        Self(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_name_rejected() {
        let config = TapConfig::new("");
        assert!(config.validate().is_err());
        assert!(TapConfig::new("weather").validate().is_ok());
    }

    #[test]
    fn test_author_resolution_precedence() {
        let default = AuthorDefault::resolve(Some("edge-7".into()));
        assert_eq!(default.as_str(), "edge-7");

        let config = TapConfig::new("weather");
        assert_eq!(config.resolve_author(&default), "edge-7");

        let config = TapConfig::new("weather").with_author("override");
        assert_eq!(config.resolve_author(&default), "override");
    }

    #[test]
    fn test_author_default_fallback() {
        // Explicit empty config falls through to env or the localhost default;
        // with a plain From it stays verbatim.
        let default: AuthorDefault = "station".into();
        assert_eq!(default.as_str(), "station");
    }
}
