use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;

use crate::error::PublishError;

/// Result of publishing one station's batch.
#[derive(Debug, Clone, PartialEq)]
pub enum PublishOutcome {
    /// Nothing to send for this station.
    Skipped,
    Persisted { entities: usize },
    /// Payload built and logged but not sent.
    DryRun { entities: usize },
    Failed { entities: usize, error: PublishError },
}

impl PublishOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, PublishOutcome::Failed { .. })
    }
}

/// Counters for one harvest cycle, built by folding per-station outcomes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    pub persisted_entities: usize,
    pub persisted_stations: usize,
    pub in_error_entities: usize,
    pub in_error_stations: usize,
    pub dry_run_entities: usize,
    pub skipped_stations: usize,
}

impl RunStats {
    pub fn record(&mut self, outcome: &PublishOutcome) {
        match outcome {
            PublishOutcome::Skipped => self.skipped_stations += 1,
            PublishOutcome::Persisted { entities } => {
                self.persisted_entities += entities;
                self.persisted_stations += 1;
            }
            PublishOutcome::DryRun { entities } => self.dry_run_entities += entities,
            PublishOutcome::Failed { entities, .. } => {
                self.in_error_entities += entities;
                self.in_error_stations += 1;
            }
        }
    }
}

impl<'a> FromIterator<&'a PublishOutcome> for RunStats {
    fn from_iter<I: IntoIterator<Item = &'a PublishOutcome>>(iter: I) -> Self {
        let mut stats = RunStats::default();
        for outcome in iter {
            stats.record(outcome);
        }
        stats
    }
}

/// End-of-run summary.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    #[serde(with = "duration_secs")]
    pub elapsed: Duration,
    pub total_stations: usize,
    pub timestamps: usize,
    pub decoded_entities: usize,
    pub decode_errors: usize,
    pub stats: RunStats,
}

impl RunReport {
    pub fn summary(&self) -> String {
        let mut summary = String::new();

        summary.push_str("=== Harvest Cycle Report ===\n");
        summary.push_str(&format!("Started: {}\n", self.started_at.to_rfc3339()));
        summary.push_str(&format!("Elapsed: {:.2}s\n", self.elapsed.as_secs_f64()));
        summary.push_str(&format!("Weather stations known: {}\n", self.total_stations));
        summary.push_str(&format!("Timestamps in feed: {}\n", self.timestamps));
        summary.push_str(&format!("Entities decoded: {}\n", self.decoded_entities));
        summary.push_str(&format!("Records skipped: {}\n", self.decode_errors));
        summary.push_str(&format!(
            "Entities persisted: {} ({} stations)\n",
            self.stats.persisted_entities, self.stats.persisted_stations
        ));
        summary.push_str(&format!(
            "Entities in error: {} ({} stations)\n",
            self.stats.in_error_entities, self.stats.in_error_stations
        ));
        if self.stats.dry_run_entities > 0 {
            summary.push_str(&format!(
                "Entities not sent (dry run): {}\n",
                self.stats.dry_run_entities
            ));
        }

        summary
    }

    pub fn has_failures(&self) -> bool {
        self.stats.in_error_entities > 0
    }
}

mod duration_secs {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(duration.as_secs_f64())
    }
}
