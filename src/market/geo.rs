// src/market/geo.rs — Supported-city lookup

use std::collections::BTreeMap;

use crate::infra::config::GeoEntry;
use crate::infra::errors::CopilotError;

/// Look up `city` (case and surrounding whitespace ignored).
///
/// An unknown city is a caller error and must be rejected before the
/// strategist loop starts.
pub fn resolve_city<'a>(
    table: &'a BTreeMap<String, GeoEntry>,
    city: &str,
) -> Result<&'a GeoEntry, CopilotError> {
    let key = city.trim().to_lowercase();
    if key.is_empty() {
        return Err(CopilotError::InvalidRequest("city must not be empty".into()));
    }
    table
        .iter()
        .find(|(name, _)| name.trim().to_lowercase() == key)
        .map(|(_, entry)| entry)
        .ok_or(CopilotError::UnsupportedCity { city: key })
}

/// Sorted list of supported city names, for error messages and `--help`.
pub fn supported_cities(table: &BTreeMap<String, GeoEntry>) -> Vec<&str> {
    table.keys().map(String::as_str).collect()
}
