pub mod db;
pub mod email;
pub mod geocode;
pub mod weather;

use std::time::Duration;
use tracing::warn;
use weather_to_ride_core::ports::PortError;

pub use db::DbAdapter;
pub use email::SendGridMailer;
pub use geocode::GoogleGeocoder;
pub use weather::DarkSkyWeather;

const REQUEST_TIMEOUT_SECS: u64 = 10;

/// The HTTP client shared by the outbound adapters.
pub fn http_client() -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
        .user_agent(concat!("weather-to-ride/", env!("CARGO_PKG_VERSION")))
        .build()
}

/// Turns a failed call into a fixed `Upstream` message. Request URLs carry API
/// keys, so the logged error has its URL stripped.
pub(crate) fn transport_error(e: reqwest::Error, what: &str, message: &str) -> PortError {
    let e = e.without_url();
    warn!(error = %e, "{what} failed");
    PortError::Upstream(message.to_string())
}
