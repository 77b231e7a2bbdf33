//! # Config Loader
//!
//! Configuration loading and parsing module.
//!
//! Responsibilities:
//! - Parse TOML/JSON pipeline files
//! - Validate blueprint legality
//! - Generate `PipelineBlueprint`
//!
//! # Example
//!
//! ```no_run
//! use config_loader::ConfigLoader;
//! use std::path::Path;
//!
//! let blueprint = ConfigLoader::load_from_path(Path::new("pipeline.toml")).unwrap();
//! println!("taps: {}", blueprint.tap_names().count());
//! ```

mod model;
mod parser;
mod validator;

pub use model::{
    AmqpTapSpec, FilePayloadMode, FileSinkSpec, LogSinkSpec, PipelineBlueprint, QueueBindSpec,
    SinksSection, TapsSection, WebSocketTapSpec,
};
pub use parser::ConfigFormat;

use contracts::IngestError;
use std::path::Path;

/// Configuration loader
///
/// Provides static methods to load a pipeline blueprint from files or
/// strings.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load a blueprint from a file path
    ///
    /// Automatically detects format from file extension (.toml / .json).
    ///
    /// # Errors
    /// - File read failure
    /// - Unsupported format
    /// - Parse failure
    /// - Validation failure
    pub fn load_from_path(path: &Path) -> Result<PipelineBlueprint, IngestError> {
        let format = Self::detect_format(path)?;
        let content = Self::read_file(path)?;
        Self::load_from_str(&content, format)
    }

    /// Load a blueprint from a string
    ///
    /// # Errors
    /// - Parse failure
    /// - Validation failure
    pub fn load_from_str(
        content: &str,
        format: ConfigFormat,
    ) -> Result<PipelineBlueprint, IngestError> {
        let blueprint = parser::parse(content, format)?;
        validator::validate(&blueprint)?;
        Ok(blueprint)
    }

    /// Serialize a blueprint to a TOML string
    pub fn to_toml(blueprint: &PipelineBlueprint) -> Result<String, IngestError> {
        toml::to_string_pretty(blueprint)
            .map_err(|e| IngestError::config_parse(format!("TOML serialize error: {e}")))
    }

    /// Serialize a blueprint to a JSON string
    pub fn to_json(blueprint: &PipelineBlueprint) -> Result<String, IngestError> {
        serde_json::to_string_pretty(blueprint)
            .map_err(|e| IngestError::config_parse(format!("JSON serialize error: {e}")))
    }
}

impl ConfigLoader {
    fn detect_format(path: &Path) -> Result<ConfigFormat, IngestError> {
        let ext = path.extension().and_then(|e| e.to_str()).ok_or_else(|| {
            IngestError::config_parse("cannot determine file format from extension")
        })?;

        ConfigFormat::from_extension(ext)
            .ok_or_else(|| IngestError::config_parse(format!("unsupported config format: .{ext}")))
    }

    fn read_file(path: &Path) -> Result<String, IngestError> {
        Ok(std::fs::read_to_string(path)?)
    }
}
