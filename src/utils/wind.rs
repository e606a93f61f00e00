/// Decode an IPMA compass code into a wind direction in degrees.
///
/// Codes outside the table decode to `None`.
pub fn decode_wind_direction(code: &str) -> Option<f64> {
    match code {
        "9" => Some(180.0),  // North
        "5" => Some(0.0),    // South
        "3" => Some(-90.0),  // East
        "7" => Some(90.0),   // West
        "2" => Some(-135.0), // Northeast
        "8" => Some(135.0),  // Northwest
        "4" => Some(-45.0),  // Southeast
        "6" => Some(45.0),   // Southwest
        _ => None,
    }
}

/// Apply the validity rule: negative readings are missing, others are divided by `scale`.
pub fn decode_value(value: f64, scale: f64) -> Option<f64> {
    if value < 0.0 {
        None
    } else {
        Some(value / scale)
    }
}
