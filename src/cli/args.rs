use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::LatestPolicy;

#[derive(Parser)]
#[command(name = "weather-observed-harvester")]
#[command(about = "Harvest IPMA weather observations into an Orion Context Broker")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(short, long, global = true, help = "Enable verbose logging")]
    pub verbose: bool,

    #[arg(short, long, global = true, help = "Hide progress output")]
    pub quiet: bool,

    #[arg(long, global = true, help = "Log file path")]
    pub log_file: Option<PathBuf>,

    #[arg(short, long, global = true, help = "Configuration file (TOML)")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run one harvest cycle and publish every station to the context broker
    Run {
        #[arg(long, help = "Context broker base URL")]
        broker_url: Option<String>,

        #[arg(long, help = "Decode and log payloads without sending them")]
        dry_run: bool,

        #[arg(long, help = "Stations published at the same time")]
        concurrency: Option<usize>,

        #[arg(long, help = "Retries per station on transport or 5xx errors")]
        retries: Option<u32>,

        #[arg(long, value_enum, help = "How the most recent entity of a station is published")]
        latest_policy: Option<LatestPolicy>,
    },

    /// Load the station list and print it
    Stations {
        #[arg(long, help = "Station list URL")]
        station_source_url: Option<String>,
    },

    /// Fetch and decode observations, printing entities as NGSI JSON
    Decode {
        #[arg(short, long, help = "Only print this station's entities")]
        station: Option<String>,

        #[arg(long, help = "Pretty-print the JSON output")]
        pretty: bool,
    },
}
