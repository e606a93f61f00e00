use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::info;

use crate::error::FetchError;
use crate::models::{ObservationFeed, RawObservation, TimestampSlot};
use crate::readers::DocumentSource;

/// Fetches the `{timestamp: {stationCode: fields | null}}` observation document.
pub struct ObservationReader {
    source: Arc<dyn DocumentSource>,
    url: String,
}

impl ObservationReader {
    pub fn new(source: Arc<dyn DocumentSource>, url: impl Into<String>) -> Self {
        Self {
            source,
            url: url.into(),
        }
    }

    pub async fn fetch(&self) -> Result<ObservationFeed, FetchError> {
        let body = self.source.fetch(&self.url).await?;
        let feed = parse_observations(&self.url, &body)?;
        info!(
            "Fetched {} timestamps ({} station records) from {}",
            feed.timestamp_count(),
            feed.record_count(),
            self.url
        );
        Ok(feed)
    }
}

/// Parse the observation document, keeping timestamps and stations in document order.
///
/// Station records are passed through untouched; judging them is the decoder's job.
pub fn parse_observations(url: &str, body: &str) -> Result<ObservationFeed, FetchError> {
    let document: Map<String, Value> =
        serde_json::from_str(body).map_err(|source| FetchError::Parse {
            url: url.to_string(),
            source,
        })?;

    let mut slots = Vec::with_capacity(document.len());
    for (timestamp, stations) in document {
        let stations = match stations {
            Value::Object(stations) => stations,
            Value::Null => Map::new(),
            _ => {
                return Err(FetchError::Structure {
                    url: url.to_string(),
                    message: format!("timestamp {} does not hold a station map", timestamp),
                })
            }
        };

        let observations = stations
            .into_iter()
            .map(|(code, fields)| RawObservation::new(code, fields))
            .collect();

        slots.push(TimestampSlot {
            timestamp,
            observations,
        });
    }

    Ok(ObservationFeed::new(slots))
}
