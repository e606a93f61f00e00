use serde::{Serialize, Serializer};

use crate::models::Geometry;
use crate::utils::constants::{
    ACTION_APPEND, ATTR_TYPE_DATETIME, ATTR_TYPE_GEOJSON, ATTR_TYPE_URL, ENTITY_TYPE,
    LATEST_SUFFIX,
};

/// Entity id for a reading taken at `timestamp`.
pub fn timestamped_id(id_prefix: &str, station_code: &str, timestamp: &str) -> String {
    format!("{}-{}-{}-{}", id_prefix, ENTITY_TYPE, station_code, timestamp)
}

/// Entity id under which a station's most recent reading is published.
pub fn latest_id(id_prefix: &str, station_code: &str) -> String {
    timestamped_id(id_prefix, station_code, LATEST_SUFFIX)
}

/// A normalized `WeatherObserved` entity.
///
/// Serializes to the NGSI v2 normalized representation, where every attribute
/// is wrapped as `{"value": ...}`.
#[derive(Debug, Clone, PartialEq)]
pub struct WeatherObserved {
    pub id: String,
    pub station_code: String,
    pub station_name: String,
    pub temperature: Option<f64>,
    pub wind_speed: Option<f64>,
    pub wind_direction: Option<f64>,
    pub precipitation: Option<f64>,
    pub atmosferic_pressure: Option<f64>,
    pub relative_humidity: Option<f64>,
    pub date_observed: String,
    pub source: String,
    pub data_provider: String,
    pub location: Geometry,
}

impl WeatherObserved {
    pub fn is_latest(&self) -> bool {
        self.id.ends_with(&format!("-{}", LATEST_SUFFIX))
    }
}

#[derive(Serialize)]
struct Attribute<'a, T> {
    value: &'a T,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    kind: Option<&'static str>,
}

fn attr<T>(value: &T) -> Attribute<'_, T> {
    Attribute { value, kind: None }
}

fn typed_attr<'a, T>(value: &'a T, kind: &'static str) -> Attribute<'a, T> {
    Attribute {
        value,
        kind: Some(kind),
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct NgsiWeatherObserved<'a> {
    id: &'a str,
    #[serde(rename = "type")]
    entity_type: &'static str,
    station_code: Attribute<'a, String>,
    station_name: Attribute<'a, String>,
    temperature: Attribute<'a, Option<f64>>,
    wind_speed: Attribute<'a, Option<f64>>,
    wind_direction: Attribute<'a, Option<f64>>,
    precipitation: Attribute<'a, Option<f64>>,
    atmosferic_pressure: Attribute<'a, Option<f64>>,
    relative_humidity: Attribute<'a, Option<f64>>,
    date_observed: Attribute<'a, String>,
    source: Attribute<'a, String>,
    data_provider: Attribute<'a, String>,
    location: Attribute<'a, Geometry>,
}

impl Serialize for WeatherObserved {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        NgsiWeatherObserved {
            id: &self.id,
            entity_type: ENTITY_TYPE,
            station_code: attr(&self.station_code),
            station_name: attr(&self.station_name),
            temperature: attr(&self.temperature),
            wind_speed: attr(&self.wind_speed),
            wind_direction: attr(&self.wind_direction),
            precipitation: attr(&self.precipitation),
            atmosferic_pressure: attr(&self.atmosferic_pressure),
            relative_humidity: attr(&self.relative_humidity),
            date_observed: typed_attr(&self.date_observed, ATTR_TYPE_DATETIME),
            source: typed_attr(&self.source, ATTR_TYPE_URL),
            data_provider: attr(&self.data_provider),
            location: typed_attr(&self.location, ATTR_TYPE_GEOJSON),
        }
        .serialize(serializer)
    }
}

/// Body of a bulk append request to the context broker.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchUpdate<'a> {
    action_type: &'static str,
    entities: &'a [WeatherObserved],
}

impl<'a> BatchUpdate<'a> {
    pub fn append(entities: &'a [WeatherObserved]) -> Self {
        Self {
            action_type: ACTION_APPEND,
            entities,
        }
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn sample() -> WeatherObserved {
        WeatherObserved {
            id: timestamped_id("Portugal", "1", "2020-01-01T00:00"),
            station_code: "1".to_string(),
            station_name: "TestStation".to_string(),
            temperature: Some(10.0),
            wind_speed: None,
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

    #[test]
    fn test_ids() {
        assert_eq!(
            timestamped_id("Portugal", "1210881", "2020-01-01T00:00"),
            "Portugal-WeatherObserved-1210881-2020-01-01T00:00"
        );
        assert_eq!(
            latest_id("Portugal", "1210881"),
            "Portugal-WeatherObserved-1210881-latest"
        );
    }

    #[test]
    fn test_ngsi_normalized_shape() {
        let value = serde_json::to_value(sample()).unwrap();

        assert_eq!(
            value,
            json!({
                "id": "Portugal-WeatherObserved-1-2020-01-01T00:00",
                "type": "WeatherObserved",
                "stationCode": {"value": "1"},
                "stationName": {"value": "TestStation"},
                "temperature": {"value": 10.0},
                "windSpeed": {"value": null},
                "windDirection": {"value": 180.0},
                "precipitation": {"value": 0.0},
                "atmosfericPressure": {"value": 1000.0},
                "relativeHumidity": {"value": 0.8},
                "dateObserved": {"value": "2020-01-01T00:00", "type": "DateTime"},
                "source": {"value": "https://www.ipma.pt/", "type": "URL"},
                "dataProvider": {"value": "TEF"},
                "location": {
                    "value": {"type": "Point", "coordinates": [1.0, 2.0]},
                    "type": "geo:json"
                }
            })
        );
    }

    #[test]
    fn test_batch_update_body() {
        let mut latest = sample();
        latest.id = latest_id("Portugal", "1");
        assert!(latest.is_latest());
        assert!(!sample().is_latest());

        let entities = vec![sample(), latest];
        let batch = BatchUpdate::append(&entities);
        assert_eq!(batch.len(), 2);

        let value: serde_json::Value = serde_json::from_str(&batch.to_json().unwrap()).unwrap();
        assert_eq!(value["actionType"], "APPEND");
        assert_eq!(value["entities"].as_array().unwrap().len(), 2);
        assert_eq!(
            value["entities"][1]["id"],
            "Portugal-WeatherObserved-1-latest"
        );
    }
}
