//! External place search and distance lookup.

pub mod google;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::PlacesError;

pub use google::GooglePlaces;

/// Travel mode for a distance lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TravelMode {
    Driving,
    Walking,
    Bicycling,
}

impl TravelMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Driving => "driving",
            Self::Walking => "walking",
            Self::Bicycling => "bicycling",
        }
    }
}

/// A place from either the curated store or an external search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Place {
    pub id: String,
    pub name: String,
    pub address: String,
    pub lat: f64,
    pub lng: f64,
    pub rating: Option<f64>,
    /// True when the place came from an external search rather than the
    /// curated store; rendered with a provenance label.
    pub is_external: bool,
}

/// A resolved distance between two named places.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistanceResult {
    pub distance_text: String,
    pub duration_text: String,
    pub distance_meters: i64,
    pub duration_seconds: i64,
}

/// External place provider.
#[async_trait]
pub trait PlaceSearch: Send + Sync {
    /// Text search; results carry `is_external = true`.
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Place>, PlacesError>;

    /// Distance between two free-text endpoints.
    async fn distance(
        &self,
        origin: &str,
        destination: &str,
        mode: TravelMode,
    ) -> Result<DistanceResult, PlacesError>;
}
