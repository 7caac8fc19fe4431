//! crates/weather_to_ride_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of specific external implementations like databases or APIs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{
    ApiUsage, Coordinates, Forecast, Location, NewLocation, NewRoute, NewUser, Route, User,
    UserCredentials,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
/// Every variant except `Unexpected` carries a message meant for the end user.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PortError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Invalid(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("Unauthorized")]
    Unauthorized,
    #[error("{0}")]
    QuotaExceeded(String),
    #[error("{0}")]
    Upstream(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait DatabaseService: Send + Sync {
    // --- User Management ---
    /// Fails with `Conflict` when the e-mail or phone is already registered.
    async fn create_user(&self, user: NewUser) -> PortResult<User>;

    async fn count_users(&self) -> PortResult<i64>;

    async fn get_user(&self, user_id: Uuid) -> PortResult<User>;

    async fn get_user_by_email(&self, email: &str) -> PortResult<UserCredentials>;

    async fn confirm_email(&self, email: &str) -> PortResult<()>;

    async fn update_password(&self, email: &str, hashed_password: &str) -> PortResult<()>;

    /// Removes the user together with everything the user owns.
    async fn delete_user(&self, user_id: Uuid) -> PortResult<()>;

    // --- Auth Methods ---
    async fn create_auth_session(
        &self,
        session_id: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()>;

    async fn validate_auth_session(&self, session_id: &str) -> PortResult<Uuid>;

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()>;

    // --- Developer Keys ---
    /// Stores the key digest for `user_id`, replacing any previous key.
    async fn upsert_developer_key(&self, user_id: Uuid, key_digest: &str) -> PortResult<()>;

    async fn get_developer_user(&self, key_digest: &str) -> PortResult<Uuid>;

    // --- Location Management ---
    async fn list_locations(&self, user_id: Uuid) -> PortResult<Vec<Location>>;

    async fn get_location(&self, location_id: Uuid) -> PortResult<Location>;

    /// Inserts unless the owner already holds `max_per_user` locations, in which
    /// case it fails with [`rules::location_limit_reached`]. The count and the
    /// insert are atomic per owner.
    ///
    /// [`rules::location_limit_reached`]: crate::rules::location_limit_reached
    async fn insert_location(
        &self,
        location: NewLocation,
        max_per_user: usize,
    ) -> PortResult<Location>;

    async fn update_location(&self, location: &Location) -> PortResult<Location>;

    /// Deleting a location also deletes its forecast and every route using it.
    async fn delete_location(&self, location_id: Uuid) -> PortResult<()>;

    // --- Route Management ---
    async fn list_routes(&self, user_id: Uuid) -> PortResult<Vec<Route>>;

    async fn get_route(&self, route_id: Uuid) -> PortResult<Route>;

    /// Route counterpart of `insert_location`, failing with
    /// [`rules::route_limit_reached`](crate::rules::route_limit_reached).
    async fn insert_route(&self, route: NewRoute, max_per_user: usize) -> PortResult<Route>;

    async fn update_route(&self, route: &Route) -> PortResult<Route>;

    async fn delete_route(&self, route_id: Uuid) -> PortResult<()>;

    // --- Forecast Cache ---
    async fn get_forecast(&self, location_id: Uuid) -> PortResult<Option<Forecast>>;

    async fn save_forecast(&self, forecast: &Forecast) -> PortResult<()>;

    // --- External API Accounting ---
    /// Counts one call against `provider`, resetting the daily counter when the
    /// date of `now` is past the last reset. Fails with `QuotaExceeded` when
    /// `daily_limit` calls have already been made today.
    async fn record_api_call(
        &self,
        provider: &str,
        daily_limit: i32,
        now: DateTime<Utc>,
    ) -> PortResult<ApiUsage>;
}

/// Resolves free-form addresses into coordinates.
#[async_trait]
pub trait GeocodingService: Send + Sync {
    async fn geocode(&self, address: &str) -> PortResult<Coordinates>;
}

/// The provider-neutral conditions for one forecast day.
#[derive(Debug, Clone, PartialEq)]
pub struct DailyConditions {
    /// Provider icon keyword, e.g. `partly-cloudy-day`.
    pub icon: String,
    pub summary: String,
    /// 0.0 ..= 1.0
    pub precip_probability: f64,
    /// Miles per hour.
    pub wind_speed: f64,
    /// Degrees Fahrenheit. `None` when the provider left it out.
    pub temperature_low: Option<f64>,
    pub temperature_high: Option<f64>,
}

/// Retrieves a daily forecast, starting with today, for a coordinate pair.
#[async_trait]
pub trait WeatherService: Send + Sync {
    async fn daily_forecast(&self, coordinates: Coordinates) -> PortResult<Vec<DailyConditions>>;
}

#[async_trait]
pub trait EmailService: Send + Sync {
    /// Sends an HTML message to a single recipient.
    async fn send(&self, to: &str, subject: &str, html: &str) -> PortResult<()>;
}

/// A source of wall-clock time, swappable in tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The real clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
