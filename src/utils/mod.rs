pub mod constants;
pub mod progress;
pub mod sanitize;
pub mod wind;

pub use constants::*;
pub use progress::ProgressReporter;
pub use sanitize::sanitize;
pub use wind::{decode_value, decode_wind_direction};
