use serde_json::Value;

/// One station's raw reading at a timestamp, exactly as published.
///
/// `Value::Null` means the station reported nothing at that timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct RawObservation {
    pub station_code: String,
    pub fields: Value,
}

impl RawObservation {
    pub fn new(station_code: impl Into<String>, fields: Value) -> Self {
        Self {
            station_code: station_code.into(),
            fields,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_null()
    }
}

/// All station readings published for a single timestamp, in document order.
#[derive(Debug, Clone, PartialEq)]
pub struct TimestampSlot {
    pub timestamp: String,
    pub observations: Vec<RawObservation>,
}

/// The observation document: timestamps in the order the source lists them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObservationFeed {
    pub slots: Vec<TimestampSlot>,
}

impl ObservationFeed {
    pub fn new(slots: Vec<TimestampSlot>) -> Self {
        Self { slots }
    }

    pub fn timestamp_count(&self) -> usize {
        self.slots.len()
    }

    pub fn record_count(&self) -> usize {
        self.slots.iter().map(|s| s.observations.len()).sum()
    }
}
