//! Deterministic identifiers for the generic client's location/system/sensor
//! tree. The same row always yields the same ids.

/// Trims, joins whitespace runs with `_`, drops anything outside
/// `[A-Za-z0-9_]`, and lowercases.
pub fn clean_key(raw: &str) -> String {
    let mut cleaned = String::with_capacity(raw.len());
    let mut in_whitespace = false;
    for ch in raw.trim().chars() {
        if ch.is_whitespace() {
            if !in_whitespace {
                cleaned.push('_');
            }
            in_whitespace = true;
            continue;
        }
        in_whitespace = false;
        if ch.is_ascii_alphanumeric() || ch == '_' {
            cleaned.push(ch.to_ascii_lowercase());
        }
    }
    cleaned
}

pub fn location_id(provider: &str, location: &str) -> String {
    format!("{}-{}", clean_key(provider), clean_key(location))
}

pub fn system_id(location_id: &str, manufacturer: Option<&str>, model: Option<&str>) -> String {
    let suffix = match (manufacturer, model) {
        (Some(manufacturer), Some(model)) => {
            format!("{}::{}", clean_key(manufacturer), clean_key(model))
        }
        (Some(one), None) | (None, Some(one)) => clean_key(one),
        (None, None) => "default".to_string(),
    };
    format!("{location_id}-{suffix}")
}

/// Sensor ids hang off the location, not the system: two systems at one
/// location reporting the same parameter share a sensor id.
pub fn sensor_id(location_id: &str, parameter: &str) -> String {
    format!("{location_id}-{parameter}")
}
