use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::config::HarvestConfig;
use crate::error::PublishError;
use crate::models::{BatchUpdate, WeatherObserved};
use crate::processors::PublishOutcome;
use crate::utils::constants::MAX_RETRY_BACKOFF_MS;
use crate::writers::{ContextBroker, ServiceScope};

/// Sends each station's entities to the context broker as one bulk append.
pub struct BatchPublisher {
    broker: Arc<dyn ContextBroker>,
    scope: ServiceScope,
    retries: u32,
    retry_backoff: Duration,
    dry_run: bool,
}

impl BatchPublisher {
    pub fn new(broker: Arc<dyn ContextBroker>, scope: ServiceScope) -> Self {
        Self {
            broker,
            scope,
            retries: 0,
            retry_backoff: Duration::from_millis(500),
            dry_run: false,
        }
    }

    pub fn from_config(broker: Arc<dyn ContextBroker>, config: &HarvestConfig) -> Self {
        Self::new(broker, ServiceScope::from(config))
            .with_retries(config.publish_retries, config.retry_backoff())
            .with_dry_run(config.dry_run)
    }

    pub fn with_retries(mut self, retries: u32, backoff: Duration) -> Self {
        self.retries = retries;
        self.retry_backoff = backoff;
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn scope(&self) -> &ServiceScope {
        &self.scope
    }

    /// Publish one station's batch.
    ///
    /// Never fails the caller: a broker error is reported in the outcome and the
    /// payload that failed is logged.
    pub async fn publish(&self, station_code: &str, entities: &[WeatherObserved]) -> PublishOutcome {
        if entities.is_empty() {
            return PublishOutcome::Skipped;
        }

        let count = entities.len();
        let payload = match BatchUpdate::append(entities).to_json() {
            Ok(payload) => payload,
            Err(e) => {
                error!("Could not encode batch for station {}: {}", station_code, e);
                return PublishOutcome::Failed {
                    entities: count,
                    error: PublishError::Encode(e.to_string()),
                };
            }
        };

        if self.dry_run {
            info!("Dry run: would persist {} entities for station {}", count, station_code);
            debug!("Payload: {}", payload);
            return PublishOutcome::DryRun { entities: count };
        }

        debug!(
            "Going to persist {} ({}) to {}{}",
            station_code, count, self.scope.service, self.scope.service_path
        );

        match self.send_with_retry(station_code, &payload).await {
            Ok(()) => {
                debug!("Entities successfully created for station {}", station_code);
                PublishOutcome::Persisted { entities: count }
            }
            Err(err) => {
                error!("Error while persisting station {}: {}", station_code, err);
                debug!("Data which failed: {}", payload);
                PublishOutcome::Failed {
                    entities: count,
                    error: err,
                }
            }
        }
    }

    async fn send_with_retry(&self, station_code: &str, payload: &str) -> Result<(), PublishError> {
        let mut attempt = 0;
        loop {
            match self
                .broker
                .batch_update(&self.scope, payload.to_string())
                .await
            {
                Ok(()) => return Ok(()),
                Err(err) if attempt < self.retries && is_retryable(&err) => {
                    let delay = backoff_delay(self.retry_backoff, attempt);
                    attempt += 1;
                    warn!(
                        "Attempt {} for station {} failed ({}), retrying in {:?}",
                        attempt, station_code, err, delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// Client errors are the payload's fault and will not improve on a retry.
fn is_retryable(err: &PublishError) -> bool {
    match err {
        PublishError::Transport(_) => true,
        PublishError::Rejected { status, .. } => *status >= 500,
        PublishError::Encode(_) | PublishError::DeadlineExceeded | PublishError::TaskFailed(_) => {
            false
        }
    }
}

/// Exponential backoff for the given attempt, capped at `MAX_RETRY_BACKOFF_MS`.
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let cap = Duration::from_millis(MAX_RETRY_BACKOFF_MS);
    base.checked_mul(2u32.saturating_pow(attempt))
        .map_or(cap, |delay| delay.min(cap))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{latest_id, timestamped_id, Geometry};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Records every request and answers from a script of responses.
    struct ScriptedBroker {
        requests: Mutex<Vec<(ServiceScope, String)>>,
        responses: Mutex<Vec<Result<(), PublishError>>>,
    }

    impl ScriptedBroker {
        fn new(responses: Vec<Result<(), PublishError>>) -> Arc<Self> {
            Arc::new(Self {
                requests: Mutex::new(Vec::new()),
                responses: Mutex::new(responses),
            })
        }

        fn request_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ContextBroker for ScriptedBroker {
        async fn batch_update(
            &self,
            scope: &ServiceScope,
            payload: String,
        ) -> Result<(), PublishError> {
            self.requests.lock().unwrap().push((scope.clone(), payload));
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                Ok(())
            } else {
                responses.remove(0)
            }
        }
    }

    fn entity(id: String) -> WeatherObserved {
        WeatherObserved {
            id,
            station_code: "1".to_string(),
            station_name: "TestStation".to_string(),
            temperature: Some(10.0),
            wind_speed: Some(5.0),
            wind_direction: Some(180.0),
            precipitation: Some(0.0),
            atmosferic_pressure: Some(1000.0),
            relative_humidity: Some(0.8),
            date_observed: "2020-01-01T00:00".to_string(),
            source: "https://www.ipma.pt/".to_string(),
            data_provider: "TEF".to_string(),
            location: Geometry::point(1.0, 2.0),
        }
    }

    fn batch() -> Vec<WeatherObserved> {
        vec![
            entity(timestamped_id("Portugal", "1", "2020-01-01T00:00")),
            entity(latest_id("Portugal", "1")),
        ]
    }

    fn publisher(broker: Arc<ScriptedBroker>) -> BatchPublisher {
        BatchPublisher::new(broker, ServiceScope::new("Weather", "/Portugal"))
    }

    #[tokio::test]
    async fn test_empty_batch_makes_no_call() {
        let broker = ScriptedBroker::new(vec![]);
        let outcome = publisher(broker.clone()).publish("1", &[]).await;

        assert_eq!(outcome, PublishOutcome::Skipped);
        assert_eq!(broker.request_count(), 0);
    }

    #[tokio::test]
    async fn test_one_request_per_station() {
        let broker = ScriptedBroker::new(vec![]);
        let outcome = publisher(broker.clone()).publish("1", &batch()).await;

        assert_eq!(outcome, PublishOutcome::Persisted { entities: 2 });
        let requests = broker.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);

        let (scope, payload) = &requests[0];
        assert_eq!(scope, &ServiceScope::new("Weather", "/Portugal"));
        let body: serde_json::Value = serde_json::from_str(payload).unwrap();
        assert_eq!(body["actionType"], "APPEND");
        assert_eq!(body["entities"].as_array().unwrap().len(), 2);
        assert_eq!(body["entities"][1]["id"], "Portugal-WeatherObserved-1-latest");
    }

    #[tokio::test]
    async fn test_rejection_is_reported_not_raised() {
        let rejection = PublishError::Rejected {
            status: 422,
            body: r#"{"error":"Unprocessable"}"#.to_string(),
        };
        let broker = ScriptedBroker::new(vec![Err(rejection.clone())]);

        let outcome = publisher(broker.clone())
            .with_retries(3, Duration::from_millis(1))
            .publish("1", &batch())
            .await;

        assert_eq!(
            outcome,
            PublishOutcome::Failed {
                entities: 2,
                error: rejection
            }
        );
        assert_eq!(broker.request_count(), 1);
    }

    #[tokio::test]
    async fn test_no_retry_by_default() {
        let broker = ScriptedBroker::new(vec![Err(PublishError::Transport("refused".into()))]);
        let outcome = publisher(broker.clone()).publish("1", &batch()).await;

        assert!(outcome.is_failure());
        assert_eq!(broker.request_count(), 1);
    }

    #[tokio::test]
    async fn test_bounded_retry_on_transport_errors() {
        let broker = ScriptedBroker::new(vec![
            Err(PublishError::Transport("reset".into())),
            Err(PublishError::Rejected {
                status: 503,
                body: String::new(),
            }),
        ]);

        let outcome = publisher(broker.clone())
            .with_retries(2, Duration::from_millis(1))
            .publish("1", &batch())
            .await;

        assert_eq!(outcome, PublishOutcome::Persisted { entities: 2 });
        assert_eq!(broker.request_count(), 3);
    }

    #[test]
    fn test_backoff_doubles_and_is_capped() {
        let base = Duration::from_millis(500);
        assert_eq!(backoff_delay(base, 0), Duration::from_millis(500));
        assert_eq!(backoff_delay(base, 2), Duration::from_millis(2000));
        assert_eq!(backoff_delay(base, 10), Duration::from_millis(MAX_RETRY_BACKOFF_MS));
        assert_eq!(
            backoff_delay(Duration::from_secs(u64::MAX), 31),
            Duration::from_millis(MAX_RETRY_BACKOFF_MS)
        );
    }

    #[tokio::test]
    async fn test_dry_run_sends_nothing() {
        let broker = ScriptedBroker::new(vec![]);
        let outcome = publisher(broker.clone())
            .with_dry_run(true)
            .publish("1", &batch())
            .await;

        assert_eq!(outcome, PublishOutcome::DryRun { entities: 2 });
        assert_eq!(broker.request_count(), 0);
    }
}
