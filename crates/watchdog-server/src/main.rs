//! Sheetwatch Server Watchdog binary

use std::sync::Arc;
use watchdog_server::{Config, PassRunner, TriggerServer, Watchdog};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration first (needed for logging settings)
    let config = match Config::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            eprintln!("Using default configuration");
            Config::default()
        }
    };

    let level = config.logging.level.as_deref().unwrap_or("info");
    match config.logging.format.as_deref() {
        Some("json") => common::logging::init_json(),
        _ => common::logging::init_with_level(level),
    }

    tracing::info!("Sheetwatch Server Watchdog starting");

    let watchdog: Arc<dyn PassRunner> = Arc::new(Watchdog::from_config(&config)?);

    // `--once` runs a single pass and exits, for cron-style invocation.
    if std::env::args().any(|a| a == "--once") {
        let summary = watchdog.run_once().await?;
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    if let Some(interval) = config.server.run_interval {
        let runner = Arc::clone(&watchdog);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick fires immediately; skip it so startup does
            // not double up with a triggered run.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match runner.run_once().await {
                    Ok(summary) => {
                        tracing::info!(
                            collections = summary.results.len(),
                            "scheduled pass complete"
                        );
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "scheduled pass failed");
                    }
                }
            }
        });
        tracing::info!(interval = ?interval, "Scheduled runs enabled");
    }

    let server = TriggerServer::new(watchdog, config.server.listen_addr.clone());
    server.run().await?;

    Ok(())
}
