use std::path::Path;
use tracing::{debug, info};

use crate::cli::args::{Cli, Commands};
use crate::config::HarvestConfig;
use crate::error::{HarvestError, Result};
use crate::models::WeatherObserved;
use crate::processors::HarvestRunner;
use crate::utils::progress::ProgressReporter;

pub async fn run(cli: Cli) -> Result<()> {
    setup_logging(cli.verbose, cli.log_file.as_deref())?;

    let mut config = HarvestConfig::load(cli.config.as_deref())?;
    let show_progress = !cli.quiet && cli.log_file.is_none();

    match cli.command {
        Commands::Run {
            broker_url,
            dry_run,
            concurrency,
            retries,
            latest_policy,
        } => {
            if let Some(url) = broker_url {
                config.broker_url = url;
            }
            if let Some(concurrency) = concurrency {
                config.max_concurrent_publishes = concurrency;
            }
            if let Some(retries) = retries {
                config.publish_retries = retries;
            }
            if let Some(policy) = latest_policy {
                config.latest_policy = policy;
            }
            config.dry_run |= dry_run;
            config.check()?;

            info!("Publishing to {}", config.batch_update_url());
            let runner = HarvestRunner::from_config(&config)?.with_progress(show_progress);
            let report = runner.run().await?;

            println!("\n{}", report.summary());
        }

        Commands::Stations { station_source_url } => {
            if let Some(url) = station_source_url {
                config.station_source_url = url;
            }
            config.check()?;

            let progress = ProgressReporter::new_spinner("Loading stations...", !show_progress);
            let registry = HarvestRunner::from_config(&config)?.load_stations().await?;
            progress.finish_with_message(&format!("Loaded {} stations", registry.len()));

            for station in registry.iter() {
                println!(
                    "{:>10}  {:<40} {}",
                    station.code,
                    station.name,
                    serde_json::to_string(&station.location)?
                );
            }
        }

        Commands::Decode { station, pretty } => {
            let progress =
                ProgressReporter::new_spinner("Fetching observations...", !show_progress);
            let cycle = HarvestRunner::from_config(&config)?
                .fetch_and_decode()
                .await?;
            progress.finish_with_message(&format!(
                "Decoded {} entities",
                cycle.output.entity_count()
            ));

            let entities: Vec<&WeatherObserved> = cycle
                .output
                .batches
                .iter()
                .filter(|b| station.as_deref().map_or(true, |code| b.station_code == code))
                .flat_map(|b| b.entities.iter())
                .collect();

            let json = if pretty {
                serde_json::to_string_pretty(&entities)?
            } else {
                serde_json::to_string(&entities)?
            };
            println!("{}", json);

            for err in &cycle.output.errors {
                eprintln!("skipped: {}", err);
            }
        }
    }

    Ok(())
}

/// Set up structured logging to stderr, or appended to `log_file` when given
pub fn setup_logging(verbose: bool, log_file: Option<&Path>) -> Result<()> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let log_level = if verbose { "debug" } else { "info" };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("weather_observed_harvester={}", log_level)));

    let result = match log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .with_ansi(false)
                        .with_level(true)
                        .with_writer(std::sync::Mutex::new(file)),
                )
                .try_init()
        }
        None => tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_level(true)
                    .with_timer(fmt::time::uptime())
                    .with_writer(std::io::stderr),
            )
            .try_init(),
    };

    result.map_err(|e| HarvestError::Config(format!("Failed to initialize logging: {}", e)))?;

    debug!("Logging initialized at level: {}", log_level);
    Ok(())
}
