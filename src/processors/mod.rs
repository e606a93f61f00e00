pub mod harvest_runner;
pub mod observation_decoder;
pub mod run_stats;

pub use harvest_runner::{DecodedCycle, HarvestRunner, HarvestStage};
pub use observation_decoder::{DecodeOutput, DecoderSettings, ObservationDecoder, StationBatch};
pub use run_stats::{PublishOutcome, RunReport, RunStats};
