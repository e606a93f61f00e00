pub mod cli;
pub mod config;
pub mod error;
pub mod models;
pub mod processors;
pub mod readers;
pub mod utils;
pub mod writers;

pub use config::{HarvestConfig, LatestPolicy};
pub use error::{DecodeError, FetchError, HarvestError, PublishError, Result};
