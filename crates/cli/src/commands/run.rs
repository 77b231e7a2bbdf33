//! `run` command implementation.

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::cli::RunArgs;
use crate::pipeline::Pipeline;

/// Execute the `run` command
pub async fn run_pipeline(args: &RunArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading pipeline file");

    if !args.config.exists() {
        anyhow::bail!("Pipeline file not found: {}", args.config.display());
    }

    let blueprint = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load pipeline from {}", args.config.display()))?;

    info!(
        websocket_taps = blueprint.taps.websocket.len(),
        amqp_taps = blueprint.taps.amqp.len(),
        sinks = blueprint.sink_names().count(),
        "Pipeline loaded"
    );

    // Dry run - just validate and exit
    if args.dry_run {
        info!("Dry run mode - pipeline is valid, exiting");
        print_blueprint_summary(&blueprint);
        return Ok(());
    }

    if args.metrics_port != 0 {
        observability::init_metrics_only(args.metrics_port)
            .context("Failed to start metrics endpoint")?;
    }

    let pipeline = Pipeline::build(&blueprint).context("Failed to build pipeline")?;

    info!("Starting pipeline...");
    pipeline.start().await.context("Failed to start pipeline")?;

    shutdown_signal().await;
    warn!("Received shutdown signal, stopping pipeline...");

    pipeline.shutdown().await;

    info!("Ingester finished");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Print a blueprint summary for dry-run mode
fn print_blueprint_summary(blueprint: &config_loader::PipelineBlueprint) {
    println!("\n=== Pipeline Summary ===\n");

    if !blueprint.taps.websocket.is_empty() {
        println!("WebSocket taps ({}):", blueprint.taps.websocket.len());
        for tap in &blueprint.taps.websocket {
            println!("  - {} <- {} -> {:?}", tap.name, tap.url, tap.sinks);
        }
    }

    if !blueprint.taps.amqp.is_empty() {
        println!("\nAMQP taps ({}):", blueprint.taps.amqp.len());
        for tap in &blueprint.taps.amqp {
            println!(
                "  - {} <- {} queue '{}' -> {:?}",
                tap.name, tap.uri, tap.queue_name, tap.sinks
            );
        }
    }

    println!("\nSinks ({}):", blueprint.sink_names().count());
    for sink in &blueprint.sinks.file {
        println!("  - {} (file: {})", sink.name, sink.path);
    }
    for sink in &blueprint.sinks.log {
        println!("  - {} (log)", sink.name);
    }

    println!();
}
