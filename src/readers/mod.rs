pub mod observation_reader;
pub mod source;
pub mod station_reader;

pub use observation_reader::{parse_observations, ObservationReader};
pub use source::{DocumentSource, HttpDocumentSource};
pub use station_reader::{parse_stations, StationReader};
