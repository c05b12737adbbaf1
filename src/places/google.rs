//! Google Maps backend for place search and distance lookups.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::debug;

use crate::error::PlacesError;

use super::{DistanceResult, Place, PlaceSearch, TravelMode};

const PLACES_URL: &str = "https://maps.googleapis.com/maps/api/place/textsearch/json";
const DISTANCE_URL: &str = "https://maps.googleapis.com/maps/api/distancematrix/json";

pub struct GooglePlaces {
    client: reqwest::Client,
    api_key: SecretString,
}

impl GooglePlaces {
    pub fn new(api_key: SecretString) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
        }
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<T, PlacesError> {
        let response = self
            .client
            .get(url)
            .query(query)
            .query(&[("key", self.api_key.expose_secret()), ("language", "zh-TW")])
            .send()
            .await
            .map_err(|e| PlacesError::RequestFailed {
                status: None,
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(PlacesError::RequestFailed {
                status: Some(status.as_u16()),
                reason: "place service returned an error".into(),
            });
        }
        response
            .json()
            .await
            .map_err(|e| PlacesError::InvalidResponse(e.to_string()))
    }
}

#[derive(Deserialize)]
struct SearchResponse {
    status: String,
    #[serde(default)]
    results: Vec<SearchResult>,
}

#[derive(Deserialize)]
struct SearchResult {
    place_id: String,
    name: String,
    #[serde(default)]
    formatted_address: String,
    geometry: Geometry,
    rating: Option<f64>,
}

#[derive(Deserialize)]
struct Geometry {
    location: LatLng,
}

#[derive(Deserialize)]
struct LatLng {
    lat: f64,
    lng: f64,
}

#[derive(Deserialize)]
struct DistanceResponse {
    status: String,
    #[serde(default)]
    rows: Vec<DistanceRow>,
}

#[derive(Deserialize)]
struct DistanceRow {
    #[serde(default)]
    elements: Vec<DistanceElement>,
}

#[derive(Deserialize)]
struct DistanceElement {
    status: String,
    distance: Option<TextValue>,
    duration: Option<TextValue>,
}

#[derive(Deserialize)]
struct TextValue {
    text: String,
    value: i64,
}

#[async_trait]
impl PlaceSearch for GooglePlaces {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Place>, PlacesError> {
        let body: SearchResponse = self.get_json(PLACES_URL, &[("query", query)]).await?;
        match body.status.as_str() {
            "OK" | "ZERO_RESULTS" => {}
            other => {
                return Err(PlacesError::RequestFailed {
                    status: None,
                    reason: format!("place search status: {other}"),
                });
            }
        }
        debug!(query, results = body.results.len(), "External place search");
        Ok(body
            .results
            .into_iter()
            .take(limit)
            .map(|r| Place {
                id: r.place_id,
                name: r.name,
                address: r.formatted_address,
                lat: r.geometry.location.lat,
                lng: r.geometry.location.lng,
                rating: r.rating,
                is_external: true,
            })
            .collect())
    }

    async fn distance(
        &self,
        origin: &str,
        destination: &str,
        mode: TravelMode,
    ) -> Result<DistanceResult, PlacesError> {
        let body: DistanceResponse = self
            .get_json(
                DISTANCE_URL,
                &[
                    ("origins", origin),
                    ("destinations", destination),
                    ("mode", mode.as_str()),
                ],
            )
            .await?;
        if body.status != "OK" {
            return Err(PlacesError::RequestFailed {
                status: None,
                reason: format!("distance matrix status: {}", body.status),
            });
        }
        let element = body
            .rows
            .first()
            .and_then(|r| r.elements.first())
            .ok_or_else(|| PlacesError::InvalidResponse("empty distance matrix".into()))?;
        if element.status != "OK" {
            return Err(PlacesError::InvalidResponse(format!(
                "no route: {}",
                element.status
            )));
        }
        let (distance, duration) = match (&element.distance, &element.duration) {
            (Some(d), Some(t)) => (d, t),
            _ => {
                return Err(PlacesError::InvalidResponse(
                    "distance element missing fields".into(),
                ));
            }
        };
        Ok(DistanceResult {
            distance_text: distance.text.clone(),
            duration_text: duration.text.clone(),
            distance_meters: distance.value,
            duration_seconds: duration.value,
        })
    }
}
