//! `plinth run` - host plugins until interrupted

use anyhow::Result;
use tokio_util::sync::CancellationToken;

use plinth_core::plugins::NativeLoader;
use plinth_core::{Orchestrator, RunReport, TomlConfigStore};

use super::HostArgs;
use crate::config::ConfigLoader;

/// Run the host until Ctrl-C
pub async fn run(args: &HostArgs) -> Result<()> {
    let config = ConfigLoader::load(args.config.as_deref())?;
    let settings = ConfigLoader::settings_path(&config, args.settings.as_deref());
    let orchestrator_config = args.orchestrator_config(&config)?;

    tracing::info!(
        dirs = ?orchestrator_config.search_dirs,
        settings = %settings.display(),
        "Starting plinth"
    );

    let mut host = Orchestrator::new(
        orchestrator_config,
        Box::new(NativeLoader),
        Box::new(TomlConfigStore::new(settings)),
    );

    let shutdown = CancellationToken::new();
    spawn_signal_handler(shutdown.clone());

    let report = host.run_until(shutdown).await?;
    print_summary(&report);

    if args.clear_settings {
        host.clear_settings()?;
    }

    Ok(())
}

fn spawn_signal_handler(shutdown: CancellationToken) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => shutdown.cancel(),
            Err(e) => tracing::error!(error = %e, "Failed to listen for Ctrl-C"),
        }
    });
}

fn print_summary(report: &RunReport) {
    let startup = &report.startup;
    if startup.discovered.is_empty() {
        println!("No plugins found");
        return;
    }

    println!(
        "{} discovered, {} ran, {} failed",
        startup.discovered.len(),
        startup.running().len(),
        startup.loaded.failed.len() + startup.initialized.failed.len() + startup.started.failed.len()
    );
    for (name, error) in startup
        .loaded
        .failed
        .iter()
        .chain(&startup.initialized.failed)
        .chain(&startup.started.failed)
    {
        println!("  ✗ {}: {}", name, error);
    }
    if !report.shutdown.settings_saved {
        println!("Warning: settings were not saved");
    }
}
