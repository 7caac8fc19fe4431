//! services/api/src/adapters/weather.rs
//!
//! Weather adapter for any Dark Sky compatible forecast API (Pirate Weather
//! by default). Only the `daily` block of the response is read.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};
use weather_to_ride_core::domain::Coordinates;
use weather_to_ride_core::ports::{DailyConditions, PortError, PortResult, WeatherService};
use weather_to_ride_core::quota::UsageMeter;

use super::transport_error;

pub const PROVIDER: &str = "weather";

const QUERY_FAILED: &str = "Error while querying API.";

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    daily: Option<DailyBlock>,
}

#[derive(Debug, Deserialize)]
struct DailyBlock {
    #[serde(default)]
    data: Vec<DailyPoint>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DailyPoint {
    #[serde(default)]
    icon: String,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    precip_probability: f64,
    #[serde(default)]
    wind_speed: f64,
    #[serde(alias = "temperatureMin")]
    temperature_low: Option<f64>,
    #[serde(alias = "temperatureMax")]
    temperature_high: Option<f64>,
}

impl DailyPoint {
    fn into_conditions(self) -> DailyConditions {
        DailyConditions {
            icon: self.icon,
            summary: self.summary,
            precip_probability: self.precip_probability,
            wind_speed: self.wind_speed,
            temperature_low: self.temperature_low,
            temperature_high: self.temperature_high,
        }
    }
}

fn parse_response(body: &str) -> PortResult<Vec<DailyConditions>> {
    let response: ForecastResponse = serde_json::from_str(body).map_err(|e| {
        warn!(error = %e, "Unreadable forecast response");
        PortError::Upstream("Error while extracting daily forecasts from response.".into())
    })?;
    let daily = response.daily.ok_or_else(|| {
        PortError::Upstream("Error while extracting daily forecasts from response.".into())
    })?;
    Ok(daily.data.into_iter().map(DailyPoint::into_conditions).collect())
}

/// A client for `GET {base}/forecast/{key}/{lat},{lng}`.
#[derive(Clone)]
pub struct DarkSkyWeather {
    client: Client,
    base_url: String,
    key: Option<String>,
    meter: UsageMeter,
}

impl DarkSkyWeather {
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
impl WeatherService for DarkSkyWeather {
    async fn daily_forecast(&self, coordinates: Coordinates) -> PortResult<Vec<DailyConditions>> {
        let key = self
            .key
            .as_deref()
            .ok_or_else(|| PortError::Upstream("The weather API key is not configured.".into()))?;

        self.meter.charge().await?;

        let url = format!(
            "{}/forecast/{}/{},{}",
            self.base_url, key, coordinates.lat, coordinates.lng
        );
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| transport_error(e, "Forecast request", QUERY_FAILED))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| transport_error(e, "Forecast body read", QUERY_FAILED))?;
        if !status.is_success() {
            warn!(%status, "Forecast API returned an error status");
            return Err(PortError::Upstream(format!(
                "The weather API responded with {status}."
            )));
        }
        if body.trim().is_empty() {
            return Err(PortError::Upstream("Received empty response from API.".into()));
        }

        let days = parse_response(&body)?;
        debug!(days = days.len(), "Daily forecast received");
        Ok(days)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn daily_points_are_mapped_in_order() {
        let body = r#"{
            "latitude": 33.5,
            "daily": {
                "summary": "Rain on Friday.",
                "data": [
                    {"time": 1, "icon": "clear-day", "summary": "Clear.", "precipProbability": 0.05,
                     "windSpeed": 4.2, "temperatureLow": 51.3, "temperatureHigh": 72.9},
                    {"time": 2, "icon": "rain", "summary": "Rain.", "precipProbability": 0.8,
                     "windSpeed": 11.0, "temperatureMin": 48.0, "temperatureMax": 60.5}
                ]
            }
        }"#;
        let days = parse_response(body).unwrap();
        assert_eq!(days.len(), 2);
        assert_eq!(days[0].icon, "clear-day");
        assert_eq!(days[0].temperature_high, Some(72.9));
        assert_eq!(days[1].summary, "Rain.");
        assert_eq!(days[1].precip_probability, 0.8);
        assert_eq!(days[1].temperature_low, Some(48.0));
        assert_eq!(days[1].temperature_high, Some(60.5));
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let body = r#"{"daily": {"data": [{"icon": "fog"}]}}"#;
        let days = parse_response(body).unwrap();
        assert_eq!(days[0].icon, "fog");
        assert_eq!(days[0].summary, "");
        assert_eq!(days[0].wind_speed, 0.0);
        assert_eq!(days[0].temperature_low, None);
        assert_eq!(days[0].temperature_high, None);
    }

    #[tokio::test]
    async fn unreachable_provider_does_not_echo_the_key() {
        use chrono::{TimeZone, Utc};
        use std::sync::Arc;
        use weather_to_ride_core::testing::{FixedClock, InMemoryDatabase};

        let clock = FixedClock::new(Utc.with_ymd_and_hms(2024, 3, 6, 12, 0, 0).unwrap());
        let meter = UsageMeter::new(Arc::new(InMemoryDatabase::new()), Arc::new(clock), PROVIDER, 10);
        let weather = DarkSkyWeather::new(
            crate::adapters::http_client().unwrap(),
            "http://127.0.0.1:1".to_string(),
            Some("SECRETKEY123".to_string()),
            meter,
        );

        let result = weather.daily_forecast(Coordinates::new(1.0, 2.0)).await;
        assert_eq!(result, Err(PortError::Upstream(QUERY_FAILED.into())));
    }

    #[test]
    fn missing_daily_block_is_an_upstream_failure() {
        assert_eq!(
            parse_response(r#"{"currently": {}}"#),
            Err(PortError::Upstream(
                "Error while extracting daily forecasts from response.".into()
            ))
        );
    }
}
