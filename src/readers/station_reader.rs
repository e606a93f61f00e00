use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};
use validator::Validate;

use crate::error::FetchError;
use crate::models::{Geometry, Station, StationRegistry};
use crate::readers::DocumentSource;
use crate::utils::constants::{PROP_STATION_ID, PROP_STATION_NAME};
use crate::utils::sanitize;

#[derive(Debug, Deserialize)]
struct StationFeature {
    geometry: Geometry,
    properties: StationProperties,
}

#[derive(Debug, Deserialize)]
struct StationProperties {
    #[serde(rename = "idEstacao")]
    id: StationId,
    #[serde(rename = "localEstacao")]
    name: String,
}

/// Station ids are published as numbers, but some mirrors quote them.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StationId {
    Number(serde_json::Number),
    Text(String),
}

impl StationId {
    fn into_code(self) -> String {
        match self {
            StationId::Number(n) => n.to_string(),
            StationId::Text(s) => s,
        }
    }
}

/// Loads the station registry from the station-list document.
pub struct StationReader {
    source: Arc<dyn DocumentSource>,
    url: String,
}

impl StationReader {
    pub fn new(source: Arc<dyn DocumentSource>, url: impl Into<String>) -> Self {
        Self {
            source,
            url: url.into(),
        }
    }

    /// Fetch and parse the station list. Any failure here is fatal for the run.
    pub async fn load(&self) -> Result<StationRegistry, FetchError> {
        let body = self.source.fetch(&self.url).await?;
        let registry = parse_stations(&self.url, &body)?;
        info!("Loaded {} stations from {}", registry.len(), self.url);
        Ok(registry)
    }
}

/// Parse a station-list document into a registry.
///
/// Accepts either a bare array of features or a GeoJSON `FeatureCollection`.
pub fn parse_stations(url: &str, body: &str) -> Result<StationRegistry, FetchError> {
    let document: Value = serde_json::from_str(body).map_err(|source| FetchError::Parse {
        url: url.to_string(),
        source,
    })?;

    let features = match document {
        Value::Array(features) => features,
        Value::Object(mut map) => match map.remove("features") {
            Some(Value::Array(features)) => features,
            _ => {
                return Err(FetchError::Structure {
                    url: url.to_string(),
                    message: "object without a 'features' array".to_string(),
                })
            }
        },
        other => {
            return Err(FetchError::Structure {
                url: url.to_string(),
                message: format!("expected an array of stations, got {}", json_kind(&other)),
            })
        }
    };

    let mut registry = StationRegistry::new();
    for (index, feature) in features.into_iter().enumerate() {
        let station = parse_station(index, feature)?;
        debug!("Station {} -> {}", station.code, station.name);

        if let Some(previous) = registry.insert(station) {
            warn!(
                "Duplicate station code {} in station list, replacing '{}'",
                previous.code, previous.name
            );
        }
    }

    Ok(registry)
}

fn parse_station(index: usize, feature: Value) -> Result<Station, FetchError> {
    let invalid = |message: String| FetchError::InvalidStation { index, message };

    let feature: StationFeature = serde_json::from_value(feature).map_err(|e| {
        invalid(format!(
            "expected properties.{} / properties.{} and a geometry: {}",
            PROP_STATION_ID, PROP_STATION_NAME, e
        ))
    })?;

    let station = Station::new(
        feature.properties.id.into_code(),
        sanitize(&feature.properties.name),
        feature.geometry,
    );

    station.validate().map_err(|e| invalid(e.to_string()))?;
    station
        .location
        .check()
        .map_err(|e| invalid(format!("station {}: {}", station.code, e)))?;

    Ok(station)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
