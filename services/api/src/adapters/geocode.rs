//! services/api/src/adapters/geocode.rs
//!
//! Google Geocoding adapter for the `GeocodingService` port.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};
use weather_to_ride_core::domain::Coordinates;
use weather_to_ride_core::ports::{GeocodingService, PortError, PortResult};
use weather_to_ride_core::quota::UsageMeter;

use super::transport_error;

pub const PROVIDER: &str = "geocoding";

const INVALID_ADDRESS: &str = "Please make sure the address is valid.";
const QUERY_FAILED: &str = "Error while querying the geocoding API.";

#[derive(Debug, Deserialize)]
struct GeocodeResponse {
    status: String,
    #[serde(default)]
    results: Vec<GeocodeResult>,
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeocodeResult {
    geometry: Geometry,
}

#[derive(Debug, Deserialize)]
struct Geometry {
    location: LatLng,
}

#[derive(Debug, Deserialize)]
struct LatLng {
    lat: f64,
    lng: f64,
}

/// Turns a geocoding response body into the first result's coordinates.
fn parse_response(body: &str) -> PortResult<Coordinates> {
    let response: GeocodeResponse = serde_json::from_str(body)
        .map_err(|e| PortError::Upstream(format!("Unreadable geocoding response: {e}")))?;

    match response.status.as_str() {
        "OK" => {}
        "ZERO_RESULTS" | "INVALID_REQUEST" => {
            return Err(PortError::Invalid(INVALID_ADDRESS.into()))
        }
        "OVER_QUERY_LIMIT" | "OVER_DAILY_LIMIT" => {
            return Err(PortError::QuotaExceeded(format!(
                "The {PROVIDER} service has reached capacity for today."
            )))
        }
        other => {
            return Err(PortError::Upstream(format!(
                "Geocoding failed with status {other}: {}",
                response.error_message.unwrap_or_default()
            )))
        }
    }

    let location = response
        .results
        .into_iter()
        .next()
        .map(|r| r.geometry.location)
        .ok_or_else(|| PortError::Invalid(INVALID_ADDRESS.into()))?;

    let coordinates = Coordinates::new(location.lat, location.lng);
    if !coordinates.is_valid() {
        return Err(PortError::Invalid(INVALID_ADDRESS.into()));
    }
    Ok(coordinates)
}

/// A geocoder backed by the Google Geocoding JSON API.
#[derive(Clone)]
pub struct GoogleGeocoder {
    client: Client,
    base_url: String,
    key: Option<String>,
    meter: UsageMeter,
}

impl GoogleGeocoder {
    pub fn new(client: Client, base_url: String, key: Option<String>, meter: UsageMeter) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            key,
            meter,
        }
    }
}

#[async_trait]
impl GeocodingService for GoogleGeocoder {
    async fn geocode(&self, address: &str) -> PortResult<Coordinates> {
        let key = self
            .key
            .as_deref()
            .ok_or_else(|| PortError::Upstream("The geocoding API key is not configured.".into()))?;

        self.meter.charge().await?;

        let url = format!("{}/maps/api/geocode/json", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("address", address), ("key", key)])
            .send()
            .await
            .map_err(|e| transport_error(e, "Geocoding request", QUERY_FAILED))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| transport_error(e, "Geocoding body read", QUERY_FAILED))?;
        if !status.is_success() {
            warn!(%status, "Geocoding API returned an error status");
            return Err(PortError::Upstream(format!(
                "The geocoding API responded with {status}."
            )));
        }

        let coordinates = parse_response(&body)?;
        debug!(lat = coordinates.lat, lng = coordinates.lng, "Address geocoded");
        Ok(coordinates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_result_is_used() {
        let body = r#"{
            "status": "OK",
            "results": [
                {"geometry": {"location": {"lat": 33.5021349, "lng": -86.8064487}}},
                {"geometry": {"location": {"lat": 1.0, "lng": 1.0}}}
            ]
        }"#;
        let coords = parse_response(body).unwrap();
        assert_eq!(coords, Coordinates::new(33.502135, -86.806449));
    }

    #[test]
    fn zero_results_is_an_invalid_address() {
        let body = r#"{"status": "ZERO_RESULTS", "results": []}"#;
        assert_eq!(
            parse_response(body),
            Err(PortError::Invalid(INVALID_ADDRESS.into()))
        );
    }

    #[test]
    fn provider_limits_are_reported_as_quota() {
        let body = r#"{"status": "OVER_QUERY_LIMIT", "results": []}"#;
        assert!(matches!(parse_response(body), Err(PortError::QuotaExceeded(_))));
    }

    #[test]
    fn denied_requests_are_upstream_failures() {
        let body = r#"{"status": "REQUEST_DENIED", "error_message": "bad key"}"#;
        match parse_response(body) {
            Err(PortError::Upstream(message)) => assert!(message.contains("bad key")),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn garbage_is_an_upstream_failure() {
        assert!(matches!(parse_response("<html>"), Err(PortError::Upstream(_))));
    }
}
