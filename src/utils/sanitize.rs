/// Characters the context broker refuses in attribute values
pub const FORBIDDEN_CHARS: [char; 9] = ['<', '>', '(', ')', '"', '\'', '=', ';', '-'];

/// Remove every forbidden character from `input`, keeping everything else in order.
///
/// # Examples
/// ```
/// use weather_observed_harvester::utils::sanitize;
///
/// assert_eq!(sanitize("Viana do Castelo (Chafé)"), "Viana do Castelo Chafé");
/// ```
pub fn sanitize(input: &str) -> String {
    input
        .chars()
        .filter(|c| !FORBIDDEN_CHARS.contains(c))
        .collect()
}
