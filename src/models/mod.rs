pub mod entity;
pub mod observation;
pub mod station;

pub use entity::{latest_id, timestamped_id, BatchUpdate, WeatherObserved};
pub use observation::{ObservationFeed, RawObservation, TimestampSlot};
pub use station::{Geometry, Position, Station, StationRegistry};
