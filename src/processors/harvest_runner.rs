use chrono::Utc;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::HarvestConfig;
use crate::error::{HarvestError, PublishError, Result};
use crate::models::StationRegistry;
use crate::processors::{
    DecodeOutput, DecoderSettings, ObservationDecoder, PublishOutcome, RunReport, RunStats,
    StationBatch,
};
use crate::readers::{DocumentSource, HttpDocumentSource, ObservationReader, StationReader};
use crate::utils::progress::ProgressReporter;
use crate::writers::{BatchPublisher, ContextBroker, OrionClient};

/// Stages of a harvest cycle, in the order they run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HarvestStage {
    LoadStations,
    FetchObservations,
    Decode,
    PublishEachStation,
    Report,
}

impl fmt::Display for HarvestStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HarvestStage::LoadStations => "load stations",
            HarvestStage::FetchObservations => "fetch observations",
            HarvestStage::Decode => "decode",
            HarvestStage::PublishEachStation => "publish",
            HarvestStage::Report => "report",
        };
        f.write_str(name)
    }
}

/// Everything known after the feed has been decoded, before anything is published.
#[derive(Debug, Clone)]
pub struct DecodedCycle {
    pub registry: StationRegistry,
    pub timestamps: usize,
    pub output: DecodeOutput,
}

/// Runs one harvest cycle: stations, observations, decode, publish, report.
pub struct HarvestRunner {
    stations: StationReader,
    observations: ObservationReader,
    decoder: ObservationDecoder,
    publisher: Arc<BatchPublisher>,
    max_concurrent_publishes: usize,
    run_deadline: Duration,
    show_progress: bool,
}

impl HarvestRunner {
    pub fn new(
        source: Arc<dyn DocumentSource>,
        broker: Arc<dyn ContextBroker>,
        config: &HarvestConfig,
    ) -> Self {
        Self {
            stations: StationReader::new(source.clone(), &config.station_source_url),
            observations: ObservationReader::new(source, &config.observation_source_url),
            decoder: ObservationDecoder::new(DecoderSettings::from(config)),
            publisher: Arc::new(BatchPublisher::from_config(broker, config)),
            max_concurrent_publishes: config.max_concurrent_publishes.max(1),
            run_deadline: config.run_deadline(),
            show_progress: false,
        }
    }

    /// Runner talking HTTP to the configured sources and broker.
    pub fn from_config(config: &HarvestConfig) -> Result<Self> {
        let source = Arc::new(HttpDocumentSource::new(config.request_timeout())?);
        let broker = Arc::new(OrionClient::from_config(config)?);
        Ok(Self::new(source, broker, config))
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// Run the full cycle within the configured deadline.
    ///
    /// Running out of time while loading stations or fetching the feed fails the run.
    /// Once publishing has started the run always ends with a report; stations not
    /// published in time are counted as failed.
    pub async fn run(&self) -> Result<RunReport> {
        self.run_cycle(Instant::now() + self.run_deadline).await
    }

    async fn run_cycle(&self, deadline: Instant) -> Result<RunReport> {
        let started_at = Utc::now();
        let clock = Instant::now();
        info!("#### Starting a new harvesting and harmonization cycle ####");

        let cycle = match tokio::time::timeout_at(deadline, self.fetch_and_decode()).await {
            Ok(cycle) => cycle?,
            Err(_) => {
                return Err(HarvestError::DeadlineExceeded {
                    seconds: self.run_deadline.as_secs(),
                })
            }
        };
        let decoded_entities = cycle.output.entity_count();
        let decode_errors = cycle.output.errors.len();

        enter(HarvestStage::PublishEachStation);
        let outcomes = self.publish_until(cycle.output.batches, deadline).await;
        let stats: RunStats = outcomes.iter().map(|(_, outcome)| outcome).collect();

        let late = outcomes
            .iter()
            .filter(|(_, outcome)| {
                matches!(
                    outcome,
                    PublishOutcome::Failed {
                        error: PublishError::DeadlineExceeded,
                        ..
                    }
                )
            })
            .count();
        if late > 0 {
            warn!(
                "Run deadline of {}s reached, {} stations were not published",
                self.run_deadline.as_secs(),
                late
            );
        }

        enter(HarvestStage::Report);
        let report = RunReport {
            started_at,
            elapsed: clock.elapsed(),
            total_stations: cycle.registry.len(),
            timestamps: cycle.timestamps,
            decoded_entities,
            decode_errors,
            stats,
        };

        info!("Number of weather stations known: {}", report.total_stations);
        info!(
            "Number of entities persisted: {} ({} stations)",
            stats.persisted_entities, stats.persisted_stations
        );
        info!("Number of entities in error: {}", stats.in_error_entities);
        info!("#### Harvesting cycle finished ####");

        Ok(report)
    }

    /// Load stations (fatal on failure), fetch the feed (fatal on failure) and decode it.
    pub async fn fetch_and_decode(&self) -> Result<DecodedCycle> {
        enter(HarvestStage::LoadStations);
        let registry = self.stations.load().await?;

        enter(HarvestStage::FetchObservations);
        let feed = self.observations.fetch().await?;

        enter(HarvestStage::Decode);
        let output = self.decoder.decode(&feed, &registry);

        Ok(DecodedCycle {
            registry,
            timestamps: feed.timestamp_count(),
            output,
        })
    }

    /// Load and return the station registry only.
    pub async fn load_stations(&self) -> Result<StationRegistry> {
        enter(HarvestStage::LoadStations);
        Ok(self.stations.load().await?)
    }

    /// Publish every station batch within the run deadline, returning outcomes in batch order.
    ///
    /// A failing station never stops the others from being attempted.
    pub async fn publish_all(&self, batches: Vec<StationBatch>) -> Vec<(String, PublishOutcome)> {
        self.publish_until(batches, Instant::now() + self.run_deadline).await
    }

    async fn publish_until(
        &self,
        batches: Vec<StationBatch>,
        deadline: Instant,
    ) -> Vec<(String, PublishOutcome)> {
        let progress = if self.show_progress {
            ProgressReporter::new(batches.len() as u64, "Publishing stations...", false)
        } else {
            ProgressReporter::silent()
        };

        let outcomes = if self.max_concurrent_publishes <= 1 {
            let mut outcomes = Vec::with_capacity(batches.len());
            for batch in batches {
                let outcome = publish_before(&self.publisher, &batch, deadline).await;
                progress.increment(1);
                outcomes.push((batch.station_code, outcome));
            }
            outcomes
        } else {
            self.publish_concurrently(batches, deadline, &progress).await
        };

        progress.finish_with_message("Publishing complete");
        outcomes
    }

    async fn publish_concurrently(
        &self,
        batches: Vec<StationBatch>,
        deadline: Instant,
        progress: &ProgressReporter,
    ) -> Vec<(String, PublishOutcome)> {
        debug!(
            "Publishing {} stations with up to {} concurrent requests",
            batches.len(),
            self.max_concurrent_publishes
        );

        let permits = Arc::new(Semaphore::new(self.max_concurrent_publishes));
        let mut tasks = JoinSet::new();
        let mut slots: Vec<(String, usize, Option<PublishOutcome>)> =
            Vec::with_capacity(batches.len());

        for (index, batch) in batches.into_iter().enumerate() {
            slots.push((batch.station_code.clone(), batch.entities.len(), None));

            let publisher = self.publisher.clone();
            let permits = permits.clone();
            tasks.spawn(async move {
                let _permit = permits.acquire_owned().await;
                (index, publish_before(&publisher, &batch, deadline).await)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            progress.increment(1);
            match joined {
                Ok((index, outcome)) => slots[index].2 = Some(outcome),
                Err(e) => error!("Publish task failed: {}", e),
            }
        }

        // A slot left empty belongs to a task that panicked or was cancelled.
        slots
            .into_iter()
            .map(|(code, entities, outcome)| {
                let outcome = outcome.unwrap_or_else(|| PublishOutcome::Failed {
                    entities,
                    error: PublishError::TaskFailed(format!("no outcome for station {}", code)),
                });
                (code, outcome)
            })
            .collect()
    }
}

/// Publish one batch unless the deadline has passed, giving up when it is reached mid-request.
async fn publish_before(
    publisher: &BatchPublisher,
    batch: &StationBatch,
    deadline: Instant,
) -> PublishOutcome {
    if batch.entities.is_empty() {
        return PublishOutcome::Skipped;
    }

    if Instant::now() >= deadline {
        warn!("Run deadline passed, station {} not published", batch.station_code);
        return deadline_failure(batch);
    }

    match tokio::time::timeout_at(
        deadline,
        publisher.publish(&batch.station_code, &batch.entities),
    )
    .await
    {
        Ok(outcome) => outcome,
        Err(_) => {
            warn!(
                "Run deadline passed while publishing station {}",
                batch.station_code
            );
            deadline_failure(batch)
        }
    }
}

fn deadline_failure(batch: &StationBatch) -> PublishOutcome {
    PublishOutcome::Failed {
        entities: batch.entities.len(),
        error: PublishError::DeadlineExceeded,
    }
}

fn enter(stage: HarvestStage) {
    debug!("Stage: {}", stage);
}
