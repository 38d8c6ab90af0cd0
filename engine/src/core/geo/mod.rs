//! Geo Resolution
//!
//! Coordinate to address/landmark lookup with a memo cache keyed on rounded
//! coordinates, so photos taken a few meters apart share one network call.

mod nominatim;

pub use nominatim::NominatimGeocoder;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::CoreResult;

/// Decimal places kept when rounding coordinates by default
pub const DEFAULT_PRECISION: u32 = 5;

/// Highest supported rounding precision
pub const MAX_PRECISION: u32 = 7;

// =============================================================================
// Types
// =============================================================================

/// Result of a reverse lookup
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeoPlace {
    /// `road, locality, country`
    pub address: String,
    /// Named point of interest at the position, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub landmark: Option<String>,
}

/// Reverse geocoding service
#[async_trait]
pub trait ReverseGeocoder: Send + Sync {
    fn name(&self) -> &str;

    async fn reverse(&self, latitude: f64, longitude: f64) -> CoreResult<GeoPlace>;
}

/// Cache key: precision plus both coordinates scaled to integers
pub type GeoKey = (u32, i64, i64);

/// Rounds a position to `precision` decimal places
pub fn geo_key(latitude: f64, longitude: f64, precision: u32) -> GeoKey {
    let precision = precision.min(MAX_PRECISION);
    let factor = 10f64.powi(precision as i32);
    (
        precision,
        (latitude * factor).round() as i64,
        (longitude * factor).round() as i64,
    )
}

fn is_valid_position(latitude: f64, longitude: f64) -> bool {
    latitude.is_finite()
        && longitude.is_finite()
        && (-90.0..=90.0).contains(&latitude)
        && (-180.0..=180.0).contains(&longitude)
}

// =============================================================================
// Geo Resolver
// =============================================================================

/// Memoizing front of a [`ReverseGeocoder`]
pub struct GeoResolver {
    geocoder: Arc<dyn ReverseGeocoder>,
    cache: Mutex<HashMap<GeoKey, GeoPlace>>,
    capacity: usize,
    precision: u32,
}

impl GeoResolver {
    pub fn new(geocoder: Arc<dyn ReverseGeocoder>, capacity: usize, precision: u32) -> Self {
        Self {
            geocoder,
            cache: Mutex::new(HashMap::new()),
            capacity,
            precision: precision.min(MAX_PRECISION),
        }
    }

    /// Resolves at the configured precision
    pub async fn resolve(&self, latitude: f64, longitude: f64) -> Option<GeoPlace> {
        self.resolve_with_precision(latitude, longitude, self.precision)
            .await
    }

    /// Resolves a position rounded to `precision` decimals.
    ///
    /// Lookup failures yield `None` and are not cached. Once the cache is
    /// full, fresh results are returned without being stored.
    pub async fn resolve_with_precision(
        &self,
        latitude: f64,
        longitude: f64,
        precision: u32,
    ) -> Option<GeoPlace> {
        if !is_valid_position(latitude, longitude) {
            return None;
        }

        let key = geo_key(latitude, longitude, precision);
        if let Some(place) = self.cached(&key) {
            debug!("Geo cache hit for {:?}", key);
            return Some(place);
        }

        let factor = 10f64.powi(key.0 as i32);
        let (lat, lon) = (key.1 as f64 / factor, key.2 as f64 / factor);

        match self.geocoder.reverse(lat, lon).await {
            Ok(place) => {
                self.insert(key, place.clone());
                Some(place)
            }
            Err(e) => {
                warn!(
                    "Reverse geocoding of {:.6}, {:.6} via {} failed: {}",
                    lat,
                    lon,
                    self.geocoder.name(),
                    e
                );
                None
            }
        }
    }

    /// Number of cached positions
    pub fn cache_len(&self) -> usize {
        self.cache.lock().map(|c| c.len()).unwrap_or(0)
    }

    fn cached(&self, key: &GeoKey) -> Option<GeoPlace> {
        self.cache.lock().ok().and_then(|c| c.get(key).cloned())
    }

    fn insert(&self, key: GeoKey, place: GeoPlace) {
        if let Ok(mut cache) = self.cache.lock() {
            if cache.len() < self.capacity {
                cache.entry(key).or_insert(place);
            } else {
                debug!("Geo cache full ({} entries), not caching {:?}", self.capacity, key);
            }
        }
    }

    /// Appends the landmark sentence to a caption when a landmark is known
    pub fn merge_with_caption(caption: &str, landmark: Option<&str>) -> String {
        match landmark.map(str::trim) {
            Some(landmark) if !landmark.is_empty() => {
                format!("{} The image was taken near {}.", caption, landmark)
            }
            _ => caption.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::annotations::testing::StubGeocoder;

    fn create_test_resolver(capacity: usize) -> (Arc<StubGeocoder>, GeoResolver) {
        let geocoder = Arc::new(StubGeocoder::new("Unter den Linden, Berlin, Germany", None));
        let resolver = GeoResolver::new(geocoder.clone(), capacity, DEFAULT_PRECISION);
        (geocoder, resolver)
    }

    // -------------------------------------------------------------------------
    // Key Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_geo_key_rounding() {
        assert_eq!(geo_key(52.520008, 13.404954, 3), (3, 52520, 13405));
        assert_eq!(geo_key(52.520007, 13.404951, 3), (3, 52520, 13405));
        assert_ne!(
            geo_key(52.520008, 13.404954, 6),
            geo_key(52.520007, 13.404951, 6)
        );
        assert_eq!(geo_key(-33.8688, 151.2093, 2), (2, -3387, 15121));
    }

    // -------------------------------------------------------------------------
    // Resolver Tests
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_nearby_positions_share_one_call() {
        let (geocoder, resolver) = create_test_resolver(100);

        let a = resolver.resolve_with_precision(52.520008, 13.404954, 3).await;
        let b = resolver.resolve_with_precision(52.520007, 13.404951, 3).await;

        assert_eq!(geocoder.calls(), 1);
        assert_eq!(a, b);
        assert_eq!(a.unwrap().address, "Unter den Linden, Berlin, Germany");
    }

    #[tokio::test]
    async fn test_precision_is_part_of_the_key() {
        let (geocoder, resolver) = create_test_resolver(100);

        resolver.resolve_with_precision(52.520008, 13.404954, 3).await;
        resolver.resolve_with_precision(52.520008, 13.404954, 5).await;

        assert_eq!(geocoder.calls(), 2);
        assert_eq!(resolver.cache_len(), 2);
    }

    #[tokio::test]
    async fn test_failures_are_not_cached() {
        let (geocoder, resolver) = create_test_resolver(100);
        geocoder.set_failing(true);

        assert!(resolver.resolve(48.8584, 2.2945).await.is_none());
        assert_eq!(resolver.cache_len(), 0);

        geocoder.set_failing(false);
        assert!(resolver.resolve(48.8584, 2.2945).await.is_some());
        assert_eq!(geocoder.calls(), 2);
    }

    #[tokio::test]
    async fn test_full_cache_still_returns_results() {
        let (geocoder, resolver) = create_test_resolver(1);

        assert!(resolver.resolve(10.0, 10.0).await.is_some());
        assert!(resolver.resolve(20.0, 20.0).await.is_some());
        assert!(resolver.resolve(20.0, 20.0).await.is_some());

        assert_eq!(resolver.cache_len(), 1);
        assert_eq!(geocoder.calls(), 3);
    }

    #[tokio::test]
    async fn test_invalid_positions_skip_the_network() {
        let (geocoder, resolver) = create_test_resolver(10);

        assert!(resolver.resolve(f64::NAN, 2.0).await.is_none());
        assert!(resolver.resolve(91.0, 2.0).await.is_none());
        assert_eq!(geocoder.calls(), 0);
    }

    #[test]
    fn test_merge_with_caption() {
        assert_eq!(
            GeoResolver::merge_with_caption("A tall tower", Some("Eiffel Tower")),
            "A tall tower The image was taken near Eiffel Tower."
        );
        assert_eq!(
            GeoResolver::merge_with_caption("A tall tower", None),
            "A tall tower"
        );
        assert_eq!(
            GeoResolver::merge_with_caption("A tall tower", Some("  ")),
            "A tall tower"
        );
    }
}
