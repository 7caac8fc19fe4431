//! In-memory implementations of the ports, for tests that should not need
//! PostgreSQL or network access.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

use crate::domain::{
    ApiUsage, Coordinates, Forecast, Location, NewLocation, NewRoute, NewUser, Route, User,
    UserCredentials,
};
use crate::ports::{
    Clock, DailyConditions, DatabaseService, EmailService, GeocodingService, PortError,
    PortResult, WeatherService,
};
use crate::rules;

fn guard<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

//=========================================================================================
// Database
//=========================================================================================

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, (User, String)>,
    sessions: HashMap<String, (Uuid, DateTime<Utc>)>,
    developers: HashMap<String, Uuid>,
    locations: Vec<Location>,
    routes: Vec<Route>,
    forecasts: HashMap<Uuid, Forecast>,
    usage: HashMap<String, ApiUsage>,
}

/// A `DatabaseService` backed by in-process tables. Rows keep insertion order.
#[derive(Clone, Default)]
pub struct InMemoryDatabase {
    tables: Arc<Mutex<Tables>>,
}

impl InMemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn forecast_count(&self) -> usize {
        guard(&self.tables).forecasts.len()
    }

    pub fn usage(&self, provider: &str) -> Option<ApiUsage> {
        guard(&self.tables).usage.get(provider).cloned()
    }

    /// Moves a cached forecast's timestamp into the past.
    pub fn age_forecast(&self, location_id: Uuid, by: Duration) {
        if let Some(forecast) = guard(&self.tables).forecasts.get_mut(&location_id) {
            forecast.updated_at -= by;
        }
    }
}

fn not_found(what: &str, id: impl std::fmt::Display) -> PortError {
    PortError::NotFound(format!("{what} {id} not found"))
}

#[async_trait]
impl DatabaseService for InMemoryDatabase {
    async fn create_user(&self, user: NewUser) -> PortResult<User> {
        let mut t = guard(&self.tables);
        if t.users.values().any(|(u, _)| u.email == user.email) {
            return Err(PortError::Conflict("That e-mail address is already in use.".into()));
        }
        if t.users.values().any(|(u, _)| u.phone == user.phone) {
            return Err(PortError::Conflict("That phone number is already in use.".into()));
        }
        let created = User {
            id: Uuid::new_v4(),
            email: user.email,
            name: user.name,
            phone: user.phone,
            email_confirmed: false,
            phone_confirmed: false,
            created_at: Utc::now(),
        };
        t.users
            .insert(created.id, (created.clone(), user.hashed_password));
        Ok(created)
    }

    async fn count_users(&self) -> PortResult<i64> {
        Ok(guard(&self.tables).users.len() as i64)
    }

    async fn get_user(&self, user_id: Uuid) -> PortResult<User> {
        guard(&self.tables)
            .users
            .get(&user_id)
            .map(|(u, _)| u.clone())
            .ok_or_else(|| not_found("User", user_id))
    }

    async fn get_user_by_email(&self, email: &str) -> PortResult<UserCredentials> {
        guard(&self.tables)
            .users
            .values()
            .find(|(u, _)| u.email == email)
            .map(|(u, hash)| UserCredentials {
                user_id: u.id,
                email: u.email.clone(),
                hashed_password: hash.clone(),
            })
            .ok_or_else(|| not_found("User", email))
    }

    async fn confirm_email(&self, email: &str) -> PortResult<()> {
        let mut t = guard(&self.tables);
        let (user, _) = t
            .users
            .values_mut()
            .find(|(u, _)| u.email == email)
            .ok_or_else(|| not_found("User", email))?;
        user.email_confirmed = true;
        Ok(())
    }

    async fn update_password(&self, email: &str, hashed_password: &str) -> PortResult<()> {
        let mut t = guard(&self.tables);
        let (_, hash) = t
            .users
            .values_mut()
            .find(|(u, _)| u.email == email)
            .ok_or_else(|| not_found("User", email))?;
        *hash = hashed_password.to_string();
        Ok(())
    }

    async fn delete_user(&self, user_id: Uuid) -> PortResult<()> {
        let mut t = guard(&self.tables);
        t.users
            .remove(&user_id)
            .ok_or_else(|| not_found("User", user_id))?;
        t.sessions.retain(|_, (owner, _)| *owner != user_id);
        t.developers.retain(|_, owner| *owner != user_id);
        t.routes.retain(|r| r.user_id != user_id);
        let owned: Vec<Uuid> = t
            .locations
            .iter()
            .filter(|l| l.user_id == user_id)
            .map(|l| l.id)
            .collect();
        t.locations.retain(|l| l.user_id != user_id);
        t.forecasts.retain(|id, _| !owned.contains(id));
        Ok(())
    }

    async fn create_auth_session(
        &self,
        session_id: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()> {
        guard(&self.tables)
            .sessions
            .insert(session_id.to_string(), (user_id, expires_at));
        Ok(())
    }

    async fn validate_auth_session(&self, session_id: &str) -> PortResult<Uuid> {
        match guard(&self.tables).sessions.get(session_id) {
            Some((user_id, expires_at)) if *expires_at > Utc::now() => Ok(*user_id),
            _ => Err(PortError::Unauthorized),
        }
    }

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()> {
        guard(&self.tables).sessions.remove(session_id);
        Ok(())
    }

    async fn upsert_developer_key(&self, user_id: Uuid, key_digest: &str) -> PortResult<()> {
        let mut t = guard(&self.tables);
        t.developers.retain(|_, owner| *owner != user_id);
        t.developers.insert(key_digest.to_string(), user_id);
        Ok(())
    }

    async fn get_developer_user(&self, key_digest: &str) -> PortResult<Uuid> {
        guard(&self.tables)
            .developers
            .get(key_digest)
            .copied()
            .ok_or_else(|| not_found("Developer", key_digest))
    }

    async fn list_locations(&self, user_id: Uuid) -> PortResult<Vec<Location>> {
        Ok(guard(&self.tables)
            .locations
            .iter()
            .filter(|l| l.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn get_location(&self, location_id: Uuid) -> PortResult<Location> {
        guard(&self.tables)
            .locations
            .iter()
            .find(|l| l.id == location_id)
            .cloned()
            .ok_or_else(|| not_found("Location", location_id))
    }

    async fn insert_location(
        &self,
        location: NewLocation,
        max_per_user: usize,
    ) -> PortResult<Location> {
        let mut t = guard(&self.tables);
        let held = t.locations.iter().filter(|l| l.user_id == location.user_id).count();
        if held >= max_per_user {
            return Err(rules::location_limit_reached());
        }
        let created = Location {
            id: Uuid::new_v4(),
            user_id: location.user_id,
            name: location.name,
            coordinates: location.coordinates,
        };
        t.locations.push(created.clone());
        Ok(created)
    }

    async fn update_location(&self, location: &Location) -> PortResult<Location> {
        let mut t = guard(&self.tables);
        let row = t
            .locations
            .iter_mut()
            .find(|l| l.id == location.id)
            .ok_or_else(|| not_found("Location", location.id))?;
        *row = location.clone();
        Ok(location.clone())
    }

    async fn delete_location(&self, location_id: Uuid) -> PortResult<()> {
        let mut t = guard(&self.tables);
        t.routes.retain(|r| !r.uses_location(location_id));
        t.forecasts.remove(&location_id);
        t.locations.retain(|l| l.id != location_id);
        Ok(())
    }

    async fn list_routes(&self, user_id: Uuid) -> PortResult<Vec<Route>> {
        Ok(guard(&self.tables)
            .routes
            .iter()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn get_route(&self, route_id: Uuid) -> PortResult<Route> {
        guard(&self.tables)
            .routes
            .iter()
            .find(|r| r.id == route_id)
            .cloned()
            .ok_or_else(|| not_found("Route", route_id))
    }

    async fn insert_route(&self, route: NewRoute, max_per_user: usize) -> PortResult<Route> {
        let mut t = guard(&self.tables);
        if t.routes.iter().filter(|r| r.user_id == route.user_id).count() >= max_per_user {
            return Err(rules::route_limit_reached());
        }
        let created = Route {
            id: Uuid::new_v4(),
            user_id: route.user_id,
            name: route.name,
            start_location_id: route.start_location_id,
            end_location_id: route.end_location_id,
            departs_at: route.departs_at,
            days: route.days,
        };
        t.routes.push(created.clone());
        Ok(created)
    }

    async fn update_route(&self, route: &Route) -> PortResult<Route> {
        let mut t = guard(&self.tables);
        let row = t
            .routes
            .iter_mut()
            .find(|r| r.id == route.id)
            .ok_or_else(|| not_found("Route", route.id))?;
        *row = route.clone();
        Ok(route.clone())
    }

    async fn delete_route(&self, route_id: Uuid) -> PortResult<()> {
        guard(&self.tables).routes.retain(|r| r.id != route_id);
        Ok(())
    }

    async fn get_forecast(&self, location_id: Uuid) -> PortResult<Option<Forecast>> {
        Ok(guard(&self.tables).forecasts.get(&location_id).cloned())
    }

    async fn save_forecast(&self, forecast: &Forecast) -> PortResult<()> {
        guard(&self.tables)
            .forecasts
            .insert(forecast.location_id, forecast.clone());
        Ok(())
    }

    async fn record_api_call(
        &self,
        provider: &str,
        daily_limit: i32,
        now: DateTime<Utc>,
    ) -> PortResult<ApiUsage> {
        let mut t = guard(&self.tables);
        let usage = t
            .usage
            .entry(provider.to_string())
            .or_insert_with(|| ApiUsage::fresh(provider, now));
        usage.register_call(now, daily_limit)?;
        Ok(usage.clone())
    }
}

//=========================================================================================
// External Services
//=========================================================================================

/// A clock that only moves when told to.
#[derive(Clone)]
pub struct FixedClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(now)),
        }
    }

    pub fn advance(&self, by: Duration) {
        *guard(&self.now) += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *guard(&self.now)
    }
}

/// Resolves addresses from a fixed table; anything else is not found.
#[derive(Clone, Default)]
pub struct StubGeocoder {
    known: Arc<Mutex<HashMap<String, Coordinates>>>,
    calls: Arc<AtomicUsize>,
}

impl StubGeocoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, address: &str, lat: f64, lng: f64) -> Self {
        guard(&self.known).insert(address.to_string(), Coordinates::new(lat, lng));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GeocodingService for StubGeocoder {
    async fn geocode(&self, address: &str) -> PortResult<Coordinates> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        guard(&self.known)
            .get(address)
            .copied()
            .ok_or_else(|| PortError::Invalid("Please make sure the address is valid.".into()))
    }
}

/// Serves the same week of conditions for every coordinate pair.
#[derive(Clone)]
pub struct StubWeather {
    days: Arc<Mutex<Vec<DailyConditions>>>,
    failing: Arc<Mutex<bool>>,
    calls: Arc<AtomicUsize>,
}

impl Default for StubWeather {
    fn default() -> Self {
        Self::new()
    }
}

impl StubWeather {
    /// Eight clear, mild days.
    pub fn new() -> Self {
        let clear = DailyConditions {
            icon: "clear-day".to_string(),
            summary: "Clear throughout the day.".to_string(),
            precip_probability: 0.0,
            wind_speed: 5.0,
            temperature_low: Some(55.0),
            temperature_high: Some(72.0),
        };
        Self {
            days: Arc::new(Mutex::new(vec![clear; 8])),
            failing: Arc::new(Mutex::new(false)),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn set_day(&self, index: usize, conditions: DailyConditions) {
        if let Some(day) = guard(&self.days).get_mut(index) {
            *day = conditions;
        }
    }

    pub fn set_failing(&self, failing: bool) {
        *guard(&self.failing) = failing;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WeatherService for StubWeather {
    async fn daily_forecast(&self, _coordinates: Coordinates) -> PortResult<Vec<DailyConditions>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if *guard(&self.failing) {
            return Err(PortError::Upstream("Error while querying API.".into()));
        }
        Ok(guard(&self.days).clone())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SentEmail {
    pub to: String,
    pub subject: String,
    pub html: String,
}

/// Keeps every message instead of sending it.
#[derive(Clone, Default)]
pub struct RecordingMailer {
    sent: Arc<Mutex<Vec<SentEmail>>>,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<SentEmail> {
        guard(&self.sent).clone()
    }
}

#[async_trait]
impl EmailService for RecordingMailer {
    async fn send(&self, to: &str, subject: &str, html: &str) -> PortResult<()> {
        guard(&self.sent).push(SentEmail {
            to: to.to_string(),
            subject: subject.to_string(),
            html: html.to_string(),
        });
        Ok(())
    }
}
