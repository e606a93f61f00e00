use thiserror::Error;

pub type Result<T> = std::result::Result<T, HarvestError>;

#[derive(Error, Debug)]
pub enum HarvestError {
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Publish error: {0}")]
    Publish(#[from] PublishError),

    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("Harvest cycle exceeded its deadline of {seconds}s")]
    DeadlineExceeded { seconds: u64 },
}

impl From<config::ConfigError> for HarvestError {
    fn from(err: config::ConfigError) -> Self {
        HarvestError::Config(err.to_string())
    }
}

/// Failures while retrieving the station list or the observation feed.
/// Any of these aborts the run.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Request to {url} returned status {status}")]
    Status { url: String, status: u16 },

    #[error("Could not parse document from {url}: {source}")]
    Parse {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Unexpected document structure from {url}: {message}")]
    Structure { url: String, message: String },

    #[error("Invalid station entry {index}: {message}")]
    InvalidStation { index: usize, message: String },
}

/// Per-record problems found while decoding. The record is skipped.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    #[error("Station {station_code} at {timestamp} is not in the station registry")]
    UnknownStation {
        station_code: String,
        timestamp: String,
    },

    #[error("Station {station_code} at {timestamp}: record is not an object")]
    MalformedRecord {
        station_code: String,
        timestamp: String,
    },

    #[error("Station {station_code} at {timestamp}: field '{field}' has unexpected value {value}")]
    MalformedField {
        station_code: String,
        timestamp: String,
        field: String,
        value: String,
    },
}

/// Failure to persist one station's batch.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PublishError {
    #[error("Context broker unreachable: {0}")]
    Transport(String),

    #[error("Context broker rejected batch: {status} {body}")]
    Rejected { status: u16, body: String },

    #[error("Could not encode batch: {0}")]
    Encode(String),

    #[error("Run deadline passed before the batch was sent")]
    DeadlineExceeded,

    #[error("Publish task failed: {0}")]
    TaskFailed(String),
}
