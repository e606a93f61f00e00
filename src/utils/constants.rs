/// NGSI entity type produced by the harvester
pub const ENTITY_TYPE: &str = "WeatherObserved";

/// Suffix replacing the timestamp in the id of a station's most recent entity
pub const LATEST_SUFFIX: &str = "latest";

/// Source field names in the IPMA observation feed
pub const FIELD_TEMPERATURE: &str = "temperatura";
pub const FIELD_WIND_SPEED: &str = "intensidadeVento";
pub const FIELD_WIND_DIRECTION: &str = "idDireccVento";
pub const FIELD_PRECIPITATION: &str = "precAcumulada";
pub const FIELD_PRESSURE: &str = "pressao";
pub const FIELD_HUMIDITY: &str = "humidade";

/// Source property names in the IPMA station list
pub const PROP_STATION_ID: &str = "idEstacao";
pub const PROP_STATION_NAME: &str = "localEstacao";

/// Unit scales applied after the validity rule
pub const DEFAULT_SCALE: f64 = 1.0;
pub const HUMIDITY_SCALE: f64 = 100.0;

/// NGSI v2 attribute types
pub const ATTR_TYPE_DATETIME: &str = "DateTime";
pub const ATTR_TYPE_URL: &str = "URL";
pub const ATTR_TYPE_GEOJSON: &str = "geo:json";

/// Context broker API
pub const BATCH_UPDATE_PATH: &str = "/v2/op/update";
pub const ACTION_APPEND: &str = "APPEND";
pub const MIME_JSON: &str = "application/json";
pub const HEADER_FIWARE_SERVICE: &str = "Fiware-Service";
pub const HEADER_FIWARE_SERVICE_PATH: &str = "Fiware-ServicePath";

/// Configuration defaults
pub const DEFAULT_BROKER_URL: &str = "http://localhost:1030";
pub const DEFAULT_SERVICE_NAME: &str = "Weather";
pub const DEFAULT_SERVICE_PATH: &str = "/Portugal";
pub const DEFAULT_STATION_SOURCE_URL: &str =
    "http://www.ipma.pt/resources.www/transf/obs-sup/stations.json";
pub const DEFAULT_OBSERVATION_SOURCE_URL: &str =
    "http://www.ipma.pt/resources.www/transf/obs-sup/observations.json";
pub const DEFAULT_ID_PREFIX: &str = "Portugal";
pub const DEFAULT_DATA_SOURCE: &str = "https://www.ipma.pt/";
pub const DEFAULT_DATA_PROVIDER: &str = "TEF";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_RUN_DEADLINE_SECS: u64 = 600;
pub const DEFAULT_MAX_CONCURRENT_PUBLISHES: usize = 1;
pub const DEFAULT_PUBLISH_RETRIES: u32 = 0;
pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 500;
pub const MAX_RETRY_BACKOFF_MS: u64 = 60_000;

/// Environment variable prefix for configuration overrides
pub const ENV_PREFIX: &str = "HARVEST";
