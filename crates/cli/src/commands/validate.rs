//! `validate` command implementation.

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use crate::cli::ValidateArgs;

/// Validation result for JSON output
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warnings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ConfigSummary>,
}

#[derive(Serialize)]
struct ConfigSummary {
    websocket_taps: usize,
    amqp_taps: usize,
    sink_count: usize,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating pipeline file");

    let result = validate_config(args);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{}", json);
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Pipeline validation failed")
    }
}

fn validate_config(args: &ValidateArgs) -> ValidationResult {
    let config_path = args.config.display().to_string();

    if !args.config.exists() {
        return ValidationResult {
            valid: false,
            config_path,
            error: Some(format!("File not found: {}", args.config.display())),
            warnings: None,
            summary: None,
        };
    }

    match config_loader::ConfigLoader::load_from_path(&args.config) {
        Ok(blueprint) => {
            let warnings = collect_warnings(&blueprint);

            ValidationResult {
                valid: true,
                config_path,
                error: None,
                warnings: if warnings.is_empty() {
                    None
                } else {
                    Some(warnings)
                },
                summary: Some(ConfigSummary {
                    websocket_taps: blueprint.taps.websocket.len(),
                    amqp_taps: blueprint.taps.amqp.len(),
                    sink_count: blueprint.sink_names().count(),
                }),
            }
        }
        Err(e) => ValidationResult {
            valid: false,
            config_path,
            error: Some(e.to_string()),
            warnings: None,
            summary: None,
        },
    }
}

/// Collect pipeline warnings (non-fatal issues)
fn collect_warnings(blueprint: &config_loader::PipelineBlueprint) -> Vec<String> {
    let mut warnings = Vec::new();

    if blueprint.tap_names().next().is_none() {
        warnings.push("No taps configured - nothing will be ingested".to_string());
    }

    for tap in &blueprint.taps.websocket {
        if tap.sinks.is_empty() {
            warnings.push(format!("Tap '{}' has no sinks - records will be dropped", tap.name));
        }
    }
    for tap in &blueprint.taps.amqp {
        if tap.sinks.is_empty() {
            warnings.push(format!("Tap '{}' has no sinks - records will be dropped", tap.name));
        }
        if tap.binds.is_empty() {
            warnings.push(format!(
                "Tap '{}' has no queue bindings - only direct publishes will arrive",
                tap.name
            ));
        }
    }

    if blueprint.default_author.is_none() {
        warnings.push(
            "default_author is not set - falling back to INGESTER_AUTHOR or 'localhost'"
                .to_string(),
        );
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Pipeline is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  WebSocket taps: {}", summary.websocket_taps);
            println!("  AMQP taps: {}", summary.amqp_taps);
            println!("  Sinks: {}", summary.sink_count);
        }

        if let Some(ref warnings) = result.warnings {
            println!("\n⚠ Warnings:");
            for warning in warnings {
                println!("  - {}", warning);
            }
        }
    } else {
        println!("✗ Pipeline is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {}", error);
        }
    }
}
