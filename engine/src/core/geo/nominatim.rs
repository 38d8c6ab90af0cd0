//! Nominatim Reverse Geocoder
//!
//! OpenStreetMap `reverse` endpoint over reqwest.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::core::settings::GeoSettings;
use crate::core::{CoreError, CoreResult};

use super::{GeoPlace, ReverseGeocoder};

/// Locality keys in order of preference
const LOCALITY_KEYS: &[&str] = &["city", "town", "village", "state", "municipality", "region"];

/// Address keys and values that mark a point of interest
const POI_KEYS: &[(&str, &[&str])] = &[
    ("tourism", &["attraction", "museum", "viewpoint"]),
    ("historic", &["monument", "castle", "ruins"]),
    ("amenity", &["place_of_worship"]),
    ("leisure", &["park"]),
];

// =============================================================================
// API Types
// =============================================================================

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ReverseResponse {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    address: HashMap<String, String>,
    #[serde(default)]
    error: Option<String>,
}

// =============================================================================
// Geocoder
// =============================================================================

/// Reverse geocoder backed by a Nominatim server
pub struct NominatimGeocoder {
    base_url: String,
    language: String,
    client: reqwest::Client,
}

impl NominatimGeocoder {
    pub fn new(settings: &GeoSettings) -> CoreResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .user_agent(settings.user_agent.clone())
            .build()
            .map_err(|e| CoreError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            language: settings.language.clone(),
            client,
        })
    }
}

#[async_trait]
impl ReverseGeocoder for NominatimGeocoder {
    fn name(&self) -> &str {
        "nominatim"
    }

    async fn reverse(&self, latitude: f64, longitude: f64) -> CoreResult<GeoPlace> {
        let url = format!("{}/reverse", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("format", "jsonv2".to_string()),
                ("lat", latitude.to_string()),
                ("lon", longitude.to_string()),
                ("zoom", "18".to_string()),
                ("addressdetails", "1".to_string()),
            ])
            .header(reqwest::header::ACCEPT_LANGUAGE, &self.language)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    CoreError::Timeout(format!("Nominatim request timed out: {}", e))
                } else {
                    CoreError::GeocodeFailed(format!("Failed to reach {}: {}", self.base_url, e))
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| CoreError::GeocodeFailed(format!("Failed to read response: {}", e)))?;

        if !status.is_success() {
            return Err(CoreError::GeocodeFailed(format!(
                "Nominatim error ({}): {}",
                status, body
            )));
        }

        parse_reverse_response(&body)
    }
}

/// Turns a `reverse` response body into a place
pub(crate) fn parse_reverse_response(body: &str) -> CoreResult<GeoPlace> {
    let response: ReverseResponse = serde_json::from_str(body)
        .map_err(|e| CoreError::GeocodeFailed(format!("Failed to parse response: {}", e)))?;

    if let Some(error) = response.error {
        return Err(CoreError::GeocodeFailed(error));
    }

    Ok(GeoPlace {
        address: format_address(&response.address),
        landmark: extract_landmark(&response),
    })
}

/// `road, locality, country`, skipping missing parts
fn format_address(address: &HashMap<String, String>) -> String {
    let road = address.get("road");
    let locality = LOCALITY_KEYS.iter().find_map(|key| address.get(*key));
    let country = address.get("country");

    [road, locality, country]
        .into_iter()
        .flatten()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(", ")
}

fn extract_landmark(response: &ReverseResponse) -> Option<String> {
    let is_poi = POI_KEYS.iter().any(|(key, allowed)| {
        response
            .address
            .get(*key)
            .is_some_and(|value| allowed.contains(&value.as_str()))
    });
    if !is_poi {
        return None;
    }

    [&response.name, &response.display_name]
        .into_iter()
        .flatten()
        .map(|s| s.trim())
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_uses_first_locality() {
        let body = r#"{
            "name": "",
            "display_name": "10, Example Road, Springfield, Example State, Exampleland",
            "address": {
                "house_number": "10",
                "road": "Example Road",
                "town": "Springfield",
                "state": "Example State",
                "country": "Exampleland"
            }
        }"#;

        let place = parse_reverse_response(body).unwrap();
        assert_eq!(place.address, "Example Road, Springfield, Exampleland");
        assert_eq!(place.landmark, None);
    }

    #[test]
    fn test_address_skips_missing_parts() {
        let body = r#"{"address": {"state": "Bavaria", "country": "Germany"}}"#;
        let place = parse_reverse_response(body).unwrap();
        assert_eq!(place.address, "Bavaria, Germany");
    }

    #[test]
    fn test_landmark_from_point_of_interest() {
        let body = r#"{
            "name": "Eiffel Tower",
            "display_name": "Eiffel Tower, Avenue Anatole France, Paris, France",
            "address": {
                "tourism": "attraction",
                "road": "Avenue Anatole France",
                "city": "Paris",
                "country": "France"
            }
        }"#;

        let place = parse_reverse_response(body).unwrap();
        assert_eq!(place.address, "Avenue Anatole France, Paris, France");
        assert_eq!(place.landmark.as_deref(), Some("Eiffel Tower"));
    }

    #[test]
    fn test_landmark_falls_back_to_display_name() {
        let body = r#"{
            "name": "",
            "display_name": "Old Castle, Hill Road",
            "address": {"historic": "castle", "road": "Hill Road"}
        }"#;

        let place = parse_reverse_response(body).unwrap();
        assert_eq!(place.landmark.as_deref(), Some("Old Castle, Hill Road"));
    }

    #[test]
    fn test_other_tourism_values_are_not_landmarks() {
        let body = r#"{
            "name": "Hotel Central",
            "address": {"tourism": "hotel", "city": "Vienna"}
        }"#;

        let place = parse_reverse_response(body).unwrap();
        assert_eq!(place.landmark, None);
    }

    #[test]
    fn test_error_response() {
        let err = parse_reverse_response(r#"{"error": "Unable to geocode"}"#).unwrap_err();
        assert!(matches!(err, CoreError::GeocodeFailed(_)));
        assert!(parse_reverse_response("<html>").is_err());
    }

    #[test]
    fn test_geocoder_builds_from_defaults() {
        let geocoder = NominatimGeocoder::new(&GeoSettings::default()).unwrap();
        assert_eq!(geocoder.base_url, "https://nominatim.openstreetmap.org");
        assert_eq!(geocoder.name(), "nominatim");
    }
}
