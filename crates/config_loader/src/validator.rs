//! Blueprint validation
//!
//! Field rules come from the `validator` derive on the model; this module
//! adds the cross-reference checks:
//! - tap names unique (across websocket and amqp taps)
//! - sink names unique
//! - every sink a tap references must be declared

use std::collections::HashSet;

use contracts::IngestError;
use validator::{Validate, ValidationErrors, ValidationErrorsKind};

use crate::model::PipelineBlueprint;

/// Returns the first error encountered, or `Ok(())`.
pub fn validate(blueprint: &PipelineBlueprint) -> Result<(), IngestError> {
    blueprint.validate().map_err(into_ingest_error)?;
    validate_unique_tap_names(blueprint)?;
    validate_unique_sink_names(blueprint)?;
    validate_sink_references(blueprint)?;
    Ok(())
}

fn validate_unique_tap_names(blueprint: &PipelineBlueprint) -> Result<(), IngestError> {
    let mut seen = HashSet::new();
    for name in blueprint.tap_names() {
        if !seen.insert(name) {
            return Err(IngestError::config_validation(
                format!("taps[name={name}]"),
                "duplicate tap name",
            ));
        }
    }
    Ok(())
}

fn validate_unique_sink_names(blueprint: &PipelineBlueprint) -> Result<(), IngestError> {
    let mut seen = HashSet::new();
    for name in blueprint.sink_names() {
        if !seen.insert(name) {
            return Err(IngestError::config_validation(
                format!("sinks[name={name}]"),
                "duplicate sink name",
            ));
        }
    }
    Ok(())
}

fn validate_sink_references(blueprint: &PipelineBlueprint) -> Result<(), IngestError> {
    let declared: HashSet<&str> = blueprint.sink_names().collect();

    let references = blueprint
        .taps
        .websocket
        .iter()
        .map(|t| (t.name.as_str(), &t.sinks))
        .chain(blueprint.taps.amqp.iter().map(|t| (t.name.as_str(), &t.sinks)));

    for (tap_name, sinks) in references {
        for sink_name in sinks {
            if !declared.contains(sink_name.as_str()) {
                return Err(IngestError::config_validation(
                    format!("taps[name={tap_name}].sinks"),
                    format!("references undeclared sink '{sink_name}'"),
                ));
            }
        }
    }
    Ok(())
}

/// Flatten derive validation errors into the first offending field path.
fn into_ingest_error(errors: ValidationErrors) -> IngestError {
    fn first(prefix: &str, errors: &ValidationErrors) -> Option<(String, String)> {
        for (field, kind) in errors.errors() {
            let path = if prefix.is_empty() {
                field.to_string()
            } else {
                format!("{prefix}.{field}")
            };
            match kind {
                ValidationErrorsKind::Field(field_errors) => {
                    if let Some(err) = field_errors.first() {
                        let message = err
                            .message
                            .as_ref()
                            .map(|m| m.to_string())
                            .unwrap_or_else(|| err.code.to_string());
                        return Some((path, message));
                    }
                }
                ValidationErrorsKind::Struct(nested) => {
                    if let Some(found) = first(&path, nested) {
                        return Some(found);
                    }
                }
                ValidationErrorsKind::List(items) => {
                    for (index, nested) in items {
                        if let Some(found) = first(&format!("{path}[{index}]"), nested) {
                            return Some(found);
                        }
                    }
                }
            }
        }
        None
    }

    match first("", &errors) {
        Some((field, message)) => IngestError::config_validation(field, message),
        None => IngestError::config_validation("<unknown>", "validation failed"),
    }
}
