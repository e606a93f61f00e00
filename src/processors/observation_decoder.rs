use serde_json::{Map, Value};
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::config::{HarvestConfig, LatestPolicy};
use crate::error::DecodeError;
use crate::models::{
    latest_id, timestamped_id, ObservationFeed, RawObservation, Station, StationRegistry,
    WeatherObserved,
};
use crate::utils::constants::{
    DEFAULT_DATA_PROVIDER, DEFAULT_DATA_SOURCE, DEFAULT_ID_PREFIX, DEFAULT_SCALE,
    FIELD_HUMIDITY, FIELD_PRECIPITATION, FIELD_PRESSURE, FIELD_TEMPERATURE,
    FIELD_WIND_DIRECTION, FIELD_WIND_SPEED, HUMIDITY_SCALE,
};
use crate::utils::{decode_value, decode_wind_direction};

/// The parts of the run configuration that shape entities.
#[derive(Debug, Clone, PartialEq)]
pub struct DecoderSettings {
    pub id_prefix: String,
    pub data_source: String,
    pub data_provider: String,
    pub latest_policy: LatestPolicy,
}

impl Default for DecoderSettings {
    fn default() -> Self {
        Self {
            id_prefix: DEFAULT_ID_PREFIX.to_string(),
            data_source: DEFAULT_DATA_SOURCE.to_string(),
            data_provider: DEFAULT_DATA_PROVIDER.to_string(),
            latest_policy: LatestPolicy::Replace,
        }
    }
}

impl From<&HarvestConfig> for DecoderSettings {
    fn from(config: &HarvestConfig) -> Self {
        Self {
            id_prefix: config.id_prefix.clone(),
            data_source: config.data_source.clone(),
            data_provider: config.data_provider.clone(),
            latest_policy: config.latest_policy,
        }
    }
}

/// Entities decoded for one station, oldest first.
#[derive(Debug, Clone, PartialEq)]
pub struct StationBatch {
    pub station_code: String,
    pub entities: Vec<WeatherObserved>,
}

#[derive(Debug, Clone, Default)]
pub struct DecodeOutput {
    /// One batch per station code seen in the feed, in order of first appearance.
    /// Stations that only reported nulls have an empty batch.
    pub batches: Vec<StationBatch>,
    pub errors: Vec<DecodeError>,
}

impl DecodeOutput {
    pub fn entity_count(&self) -> usize {
        self.batches.iter().map(|b| b.entities.len()).sum()
    }

    pub fn station_count(&self) -> usize {
        self.batches.len()
    }
}

pub struct ObservationDecoder {
    settings: DecoderSettings,
}

impl ObservationDecoder {
    pub fn new(settings: DecoderSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &DecoderSettings {
        &self.settings
    }

    /// Decode the whole feed and give each station's last entity its `-latest` id.
    pub fn decode(&self, feed: &ObservationFeed, registry: &StationRegistry) -> DecodeOutput {
        let mut output = self.decode_timestamped(feed, registry);
        self.mark_latest(&mut output.batches);
        output
    }

    /// Decode every record under its timestamped id.
    ///
    /// Bad records are collected as errors and skipped; they never stop decoding.
    pub fn decode_timestamped(
        &self,
        feed: &ObservationFeed,
        registry: &StationRegistry,
    ) -> DecodeOutput {
        let mut output = DecodeOutput::default();
        let mut batch_index: HashMap<String, usize> = HashMap::new();

        for slot in &feed.slots {
            for raw in &slot.observations {
                let index = *batch_index
                    .entry(raw.station_code.clone())
                    .or_insert_with(|| {
                        output.batches.push(StationBatch {
                            station_code: raw.station_code.clone(),
                            entities: Vec::new(),
                        });
                        output.batches.len() - 1
                    });

                if raw.is_empty() {
                    continue;
                }

                match self.decode_record(&slot.timestamp, raw, registry) {
                    Ok(entity) => output.batches[index].entities.push(entity),
                    Err(err) => {
                        warn!("Skipping record: {}", err);
                        output.errors.push(err);
                    }
                }
            }
        }

        debug!(
            "Decoded {} entities for {} stations ({} records skipped)",
            output.entity_count(),
            output.station_count(),
            output.errors.len()
        );
        output
    }

    /// Re-identify the most recent entity of every station according to the latest policy.
    pub fn mark_latest(&self, batches: &mut [StationBatch]) {
        for batch in batches.iter_mut() {
            let Some(last) = batch.entities.last_mut() else {
                continue;
            };
            let id = latest_id(&self.settings.id_prefix, &batch.station_code);

            match self.settings.latest_policy {
                LatestPolicy::Replace => last.id = id,
                LatestPolicy::Duplicate => {
                    let mut latest = last.clone();
                    latest.id = id;
                    batch.entities.push(latest);
                }
            }
        }
    }

    /// Build one entity from a non-null station record.
    pub fn decode_record(
        &self,
        timestamp: &str,
        raw: &RawObservation,
        registry: &StationRegistry,
    ) -> Result<WeatherObserved, DecodeError> {
        let station: &Station =
            registry
                .get(&raw.station_code)
                .ok_or_else(|| DecodeError::UnknownStation {
                    station_code: raw.station_code.clone(),
                    timestamp: timestamp.to_string(),
                })?;

        let fields = raw
            .fields
            .as_object()
            .ok_or_else(|| DecodeError::MalformedRecord {
                station_code: raw.station_code.clone(),
                timestamp: timestamp.to_string(),
            })?;

        let reader = FieldReader {
            fields,
            station_code: &raw.station_code,
            timestamp,
        };

        Ok(WeatherObserved {
            id: timestamped_id(&self.settings.id_prefix, &station.code, timestamp),
            station_code: station.code.clone(),
            station_name: station.name.clone(),
            temperature: reader.numeric(FIELD_TEMPERATURE, DEFAULT_SCALE)?,
            wind_speed: reader.numeric(FIELD_WIND_SPEED, DEFAULT_SCALE)?,
            wind_direction: reader.wind_direction(FIELD_WIND_DIRECTION)?,
            precipitation: reader.numeric(FIELD_PRECIPITATION, DEFAULT_SCALE)?,
            atmosferic_pressure: reader.numeric(FIELD_PRESSURE, DEFAULT_SCALE)?,
            relative_humidity: reader.numeric(FIELD_HUMIDITY, HUMIDITY_SCALE)?,
            date_observed: timestamp.to_string(),
            source: self.settings.data_source.clone(),
            data_provider: self.settings.data_provider.clone(),
            location: station.location.clone(),
        })
    }
}

impl Default for ObservationDecoder {
    fn default() -> Self {
        Self::new(DecoderSettings::default())
    }
}

struct FieldReader<'a> {
    fields: &'a Map<String, Value>,
    station_code: &'a str,
    timestamp: &'a str,
}

impl FieldReader<'_> {
    /// A missing or null field is absent; a non-numeric one is malformed.
    fn numeric(&self, field: &str, scale: f64) -> Result<Option<f64>, DecodeError> {
        match self.fields.get(field) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Number(n)) => Ok(n.as_f64().and_then(|v| decode_value(v, scale))),
            Some(other) => Err(self.malformed(field, other)),
        }
    }

    /// The compass code may be published as a number or a string.
    fn wind_direction(&self, field: &str) -> Result<Option<f64>, DecodeError> {
        match self.fields.get(field) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Number(n)) => Ok(decode_wind_direction(&n.to_string())),
            Some(Value::String(s)) => Ok(decode_wind_direction(s)),
            Some(other) => Err(self.malformed(field, other)),
        }
    }

    fn malformed(&self, field: &str, value: &Value) -> DecodeError {
        DecodeError::MalformedField {
            station_code: self.station_code.to_string(),
            timestamp: self.timestamp.to_string(),
            field: field.to_string(),
            value: value.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Geometry, TimestampSlot};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn registry() -> StationRegistry {
        vec![
            Station::new("1".into(), "TestStation".into(), Geometry::point(1.0, 2.0)),
            Station::new("2".into(), "Other".into(), Geometry::point(3.0, 4.0)),
        ]
        .into_iter()
        .collect()
    }

    fn slot(timestamp: &str, observations: Vec<(&str, Value)>) -> TimestampSlot {
        TimestampSlot {
            timestamp: timestamp.to_string(),
            observations: observations
                .into_iter()
                .map(|(code, fields)| RawObservation::new(code, fields))
                .collect(),
        }
    }

    fn reading(temperature: f64) -> Value {
        json!({
            "temperatura": temperature,
            "intensidadeVento": 5,
            "idDireccVento": 9,
            "precAcumulada": 0,
            "pressao": 1000,
            "humidade": 80
        })
    }

    #[test]
    fn test_decode_single_reading() {
        let feed = ObservationFeed::new(vec![slot(
            "2020-01-01T00:00",
            vec![(
                "1",
                json!({
                    "temperatura": 10,
                    "intensidadeVento": 5,
                    "idDireccVento": "9",
                    "precAcumulada": 0,
                    "pressao": 1000,
                    "humidade": 80
                }),
            )],
        )]);

        let output = ObservationDecoder::default().decode(&feed, &registry());

        assert!(output.errors.is_empty());
        assert_eq!(output.batches.len(), 1);
        let entities = &output.batches[0].entities;
        assert_eq!(entities.len(), 1);

        let entity = &entities[0];
        assert_eq!(entity.id, "Portugal-WeatherObserved-1-latest");
        assert_eq!(entity.station_code, "1");
        assert_eq!(entity.station_name, "TestStation");
        assert_eq!(entity.temperature, Some(10.0));
        assert_eq!(entity.wind_speed, Some(5.0));
        assert_eq!(entity.wind_direction, Some(180.0));
        assert_eq!(entity.precipitation, Some(0.0));
        assert_eq!(entity.atmosferic_pressure, Some(1000.0));
        assert_eq!(entity.relative_humidity, Some(0.8));
        assert_eq!(entity.date_observed, "2020-01-01T00:00");
        assert_eq!(entity.source, "https://www.ipma.pt/");
        assert_eq!(entity.data_provider, "TEF");
        assert_eq!(entity.location, Geometry::point(1.0, 2.0));
    }

    #[test]
    fn test_null_reading_skipped_and_last_rewritten() {
        let feed = ObservationFeed::new(vec![
            slot("T1", vec![("1", reading(10.0))]),
            slot("T2", vec![("1", Value::Null)]),
            slot("T3", vec![("1", reading(12.0))]),
        ]);

        let output = ObservationDecoder::default().decode(&feed, &registry());
        let entities = &output.batches[0].entities;

        assert_eq!(entities.len(), 2);
        assert_eq!(entities[0].id, "Portugal-WeatherObserved-1-T1");
        assert_eq!(entities[0].temperature, Some(10.0));
        assert_eq!(entities[1].id, "Portugal-WeatherObserved-1-latest");
        assert_eq!(entities[1].date_observed, "T3");
        assert_eq!(entities[1].temperature, Some(12.0));
    }

    #[test]
    fn test_duplicate_policy_keeps_timestamped_entity() {
        let feed = ObservationFeed::new(vec![
            slot("T1", vec![("1", reading(10.0))]),
            slot("T2", vec![("1", reading(11.0))]),
        ]);
        let decoder = ObservationDecoder::new(DecoderSettings {
            latest_policy: LatestPolicy::Duplicate,
            ..DecoderSettings::default()
        });

        let output = decoder.decode(&feed, &registry());
        let ids: Vec<_> = output.batches[0]
            .entities
            .iter()
            .map(|e| e.id.as_str())
            .collect();

        assert_eq!(
            ids,
            vec![
                "Portugal-WeatherObserved-1-T1",
                "Portugal-WeatherObserved-1-T2",
                "Portugal-WeatherObserved-1-latest"
            ]
        );
        assert_eq!(output.batches[0].entities[2].temperature, Some(11.0));
    }

    #[test]
    fn test_negative_values_are_absent() {
        let feed = ObservationFeed::new(vec![slot(
            "T1",
            vec![(
                "1",
                json!({
                    "temperatura": -99,
                    "intensidadeVento": -99.0,
                    "idDireccVento": -99,
                    "precAcumulada": -0.5,
                    "pressao": -99,
                    "humidade": -99
                }),
            )],
        )]);

        let output = ObservationDecoder::default().decode(&feed, &registry());
        let entity = &output.batches[0].entities[0];

        assert_eq!(entity.temperature, None);
        assert_eq!(entity.wind_speed, None);
        assert_eq!(entity.wind_direction, None);
        assert_eq!(entity.precipitation, None);
        assert_eq!(entity.atmosferic_pressure, None);
        assert_eq!(entity.relative_humidity, None);
    }

    #[test]
    fn test_missing_fields_are_absent() {
        let feed = ObservationFeed::new(vec![slot("T1", vec![("1", json!({"temperatura": 7.5}))])]);

        let output = ObservationDecoder::default().decode(&feed, &registry());
        let entity = &output.batches[0].entities[0];

        assert!(output.errors.is_empty());
        assert_eq!(entity.temperature, Some(7.5));
        assert_eq!(entity.relative_humidity, None);
        assert_eq!(entity.wind_direction, None);
    }

    #[test]
    fn test_unknown_station_is_skipped() {
        let feed = ObservationFeed::new(vec![slot(
            "T1",
            vec![("404", reading(10.0)), ("2", reading(11.0))],
        )]);

        let output = ObservationDecoder::default().decode(&feed, &registry());

        assert_eq!(
            output.errors,
            vec![DecodeError::UnknownStation {
                station_code: "404".to_string(),
                timestamp: "T1".to_string(),
            }]
        );
        assert_eq!(output.batches[0].station_code, "404");
        assert!(output.batches[0].entities.is_empty());
        assert_eq!(output.batches[1].entities.len(), 1);
        assert_eq!(output.entity_count(), 1);
    }

    #[test]
    fn test_malformed_records_are_skipped() {
        let feed = ObservationFeed::new(vec![
            slot("T1", vec![("1", json!({"temperatura": "warm"}))]),
            slot("T2", vec![("1", json!([1, 2]))]),
            slot("T3", vec![("1", json!({"idDireccVento": [9]}))]),
            slot("T4", vec![("1", reading(9.0))]),
        ]);

        let output = ObservationDecoder::default().decode(&feed, &registry());

        assert_eq!(output.errors.len(), 3);
        assert!(matches!(
            &output.errors[0],
            DecodeError::MalformedField { field, .. } if field == "temperatura"
        ));
        assert!(matches!(&output.errors[1], DecodeError::MalformedRecord { .. }));
        assert_eq!(output.batches[0].entities.len(), 1);
        assert_eq!(output.batches[0].entities[0].id, "Portugal-WeatherObserved-1-latest");
    }

    #[test]
    fn test_stations_keep_first_appearance_order() {
        let feed = ObservationFeed::new(vec![
            slot("T1", vec![("2", reading(1.0)), ("1", Value::Null)]),
            slot("T2", vec![("1", reading(2.0)), ("2", reading(3.0))]),
        ]);

        let output = ObservationDecoder::default().decode(&feed, &registry());
        let codes: Vec<_> = output
            .batches
            .iter()
            .map(|b| b.station_code.as_str())
            .collect();

        assert_eq!(codes, vec!["2", "1"]);
        assert_eq!(output.batches[0].entities.len(), 2);
        assert_eq!(output.batches[0].entities[0].id, "Portugal-WeatherObserved-2-T1");
        assert_eq!(output.batches[1].entities.len(), 1);
    }

    #[test]
    fn test_station_with_only_nulls_has_empty_batch() {
        let feed = ObservationFeed::new(vec![slot("T1", vec![("1", Value::Null)])]);

        let output = ObservationDecoder::default().decode(&feed, &registry());

        assert_eq!(output.batches.len(), 1);
        assert!(output.batches[0].entities.is_empty());
        assert!(output.errors.is_empty());
    }

    #[test]
    fn test_wind_code_forms() {
        let feed = ObservationFeed::new(vec![
            slot("T1", vec![("1", json!({"idDireccVento": 2}))]),
            slot("T2", vec![("1", json!({"idDireccVento": "6"}))]),
            slot("T3", vec![("1", json!({"idDireccVento": 9.5}))]),
            slot("T4", vec![("1", json!({"idDireccVento": 0}))]),
        ]);

        let output = ObservationDecoder::default().decode_timestamped(&feed, &registry());
        let directions: Vec<_> = output.batches[0]
            .entities
            .iter()
            .map(|e| e.wind_direction)
            .collect();

        assert_eq!(directions, vec![Some(-135.0), Some(45.0), None, None]);
    }
}
