//! crates/weather_to_ride_core/src/service.rs
//!
//! The commute service composes the ports into the location, route and
//! forecast operations. Both HTTP surfaces (session pages and the developer
//! API) go through it so the rules are enforced in one place.

use chrono::{FixedOffset, NaiveDate, NaiveTime};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::{Coordinates, Forecast, Location, NewLocation, NewRoute, Route, User};
use crate::forecast::{build_forecast, is_stale};
use crate::ports::{
    Clock, DatabaseService, GeocodingService, PortError, PortResult, WeatherService,
};
use crate::rules::{self, MAX_LOCATIONS, MAX_ROUTES};
use crate::schedule::{week_outlook, RouteDay};

//=========================================================================================
// Inputs and Views
//=========================================================================================

/// A location as submitted by a user: the address is geocoded on save.
#[derive(Debug, Clone)]
pub struct LocationInput {
    pub name: String,
    pub address: String,
}

#[derive(Debug, Clone)]
pub struct RouteInput {
    pub name: String,
    pub start_location_id: Uuid,
    pub end_location_id: Uuid,
    /// 0 = Monday .. 6 = Sunday
    pub days: Vec<i64>,
    pub departs_at: Option<NaiveTime>,
}

/// A location with whatever forecast could be produced for it.
#[derive(Debug, Clone)]
pub struct LocationView {
    pub location: Location,
    pub forecast: Option<Forecast>,
}

#[derive(Debug, Clone)]
pub struct RouteView {
    pub route: Route,
    pub start: LocationView,
    pub end: LocationView,
    pub outlook: Vec<RouteDay>,
}

/// The SHA-256 hex digest under which a developer key is stored.
pub fn developer_key_digest(key: &str) -> String {
    hex::encode(Sha256::digest(key.as_bytes()))
}

//=========================================================================================
// The Service
//=========================================================================================

#[derive(Clone)]
pub struct CommuteService {
    db: Arc<dyn DatabaseService>,
    geocoder: Arc<dyn GeocodingService>,
    weather: Arc<dyn WeatherService>,
    clock: Arc<dyn Clock>,
    utc_offset: FixedOffset,
}

impl CommuteService {
    pub fn new(
        db: Arc<dyn DatabaseService>,
        geocoder: Arc<dyn GeocodingService>,
        weather: Arc<dyn WeatherService>,
        clock: Arc<dyn Clock>,
        utc_offset: FixedOffset,
    ) -> Self {
        Self {
            db,
            geocoder,
            weather,
            clock,
            utc_offset,
        }
    }

    /// The current date in the service's local time zone.
    pub fn today(&self) -> NaiveDate {
        self.clock.now().with_timezone(&self.utc_offset).date_naive()
    }

    // --- Validation Helpers ---

    pub async fn resolve_user(&self, user_id: Uuid) -> PortResult<User> {
        self.db.get_user(user_id).await.map_err(|e| match e {
            PortError::NotFound(_) => PortError::NotFound("User does not exist.".into()),
            other => other,
        })
    }

    pub async fn resolve_location(&self, location_id: Uuid) -> PortResult<Location> {
        self.db.get_location(location_id).await.map_err(|e| match e {
            PortError::NotFound(_) => PortError::NotFound("Location does not exist.".into()),
            other => other,
        })
    }

    pub async fn resolve_route(&self, route_id: Uuid) -> PortResult<Route> {
        self.db.get_route(route_id).await.map_err(|e| match e {
            PortError::NotFound(_) => PortError::NotFound("Route does not exist.".into()),
            other => other,
        })
    }

    /// Finds the user a developer key belongs to.
    pub async fn resolve_developer(&self, key: &str) -> PortResult<User> {
        let invalid = || PortError::Forbidden("The API key is invalid.".into());
        if key.trim().is_empty() {
            return Err(invalid());
        }
        let user_id = self
            .db
            .get_developer_user(&developer_key_digest(key))
            .await
            .map_err(|e| match e {
                PortError::NotFound(_) => invalid(),
                other => other,
            })?;
        self.resolve_user(user_id).await
    }

    async fn owned_location(&self, user_id: Uuid, location_id: Uuid) -> PortResult<Location> {
        let location = self.resolve_location(location_id).await?;
        if location.user_id != user_id {
            return Err(PortError::Forbidden("Location does not belong to user.".into()));
        }
        Ok(location)
    }

    async fn owned_route(&self, user_id: Uuid, route_id: Uuid) -> PortResult<Route> {
        let route = self.resolve_route(route_id).await?;
        if route.user_id != user_id {
            return Err(PortError::Forbidden("Route does not belong to user.".into()));
        }
        Ok(route)
    }

    // --- Forecasts ---

    /// Fetches a new forecast for the location and stores it in place of the old one.
    pub async fn refresh_forecast(&self, location: &Location) -> PortResult<Forecast> {
        let daily = self.weather.daily_forecast(location.coordinates).await?;
        let forecast = build_forecast(location.id, self.today(), &daily, self.clock.now())?;
        self.db.save_forecast(&forecast).await?;
        info!(location_id = %location.id, "Forecast refreshed");
        Ok(forecast)
    }

    /// The cached forecast while it is fresh, otherwise a refreshed one. A stale
    /// copy is still served when the refresh fails.
    pub async fn current_forecast(&self, location: &Location) -> PortResult<Forecast> {
        let cached = self.db.get_forecast(location.id).await?;
        if let Some(forecast) = &cached {
            if !is_stale(forecast.updated_at, self.clock.now()) {
                return Ok(forecast.clone());
            }
        }

        match (self.refresh_forecast(location).await, cached) {
            (Ok(forecast), _) => Ok(forecast),
            (Err(e), Some(stale)) => {
                warn!(location_id = %location.id, error = %e, "Serving stale forecast");
                Ok(stale)
            }
            (Err(e), None) => Err(e),
        }
    }

    async fn view_of(&self, location: Location) -> LocationView {
        let forecast = match self.current_forecast(&location).await {
            Ok(forecast) => Some(forecast),
            Err(e) => {
                warn!(location_id = %location.id, error = %e, "No forecast available");
                None
            }
        };
        LocationView { location, forecast }
    }

    async fn resolve_address(&self, address: &str) -> PortResult<Coordinates> {
        match Coordinates::from_resolved_address(address) {
            Some(coordinates) => Ok(coordinates),
            None => self.geocoder.geocode(address).await,
        }
    }

    // --- Locations ---

    pub async fn list_locations(&self, user_id: Uuid) -> PortResult<Vec<LocationView>> {
        let locations = self.db.list_locations(user_id).await?;
        let mut views = Vec::with_capacity(locations.len());
        for location in locations {
            views.push(self.view_of(location).await);
        }
        Ok(views)
    }

    pub async fn get_location(&self, user_id: Uuid, location_id: Uuid) -> PortResult<LocationView> {
        let location = self.owned_location(user_id, location_id).await?;
        Ok(self.view_of(location).await)
    }

    pub async fn create_location(
        &self,
        user_id: Uuid,
        input: LocationInput,
    ) -> PortResult<LocationView> {
        let user = self.resolve_user(user_id).await?;
        rules::validate_location_name(&input.name)?;
        rules::validate_address(&input.address)?;

        if self.db.list_locations(user.id).await?.len() >= MAX_LOCATIONS {
            return Err(rules::location_limit_reached());
        }

        let coordinates = self.resolve_address(&input.address).await?;
        let location = self
            .db
            .insert_location(
                NewLocation {
                    user_id: user.id,
                    name: input.name.trim().to_string(),
                    coordinates,
                },
                MAX_LOCATIONS,
            )
            .await?;
        info!(user_id = %user.id, location_id = %location.id, "Location created");

        Ok(self.with_fresh_forecast(location).await)
    }

    pub async fn update_location(
        &self,
        user_id: Uuid,
        location_id: Uuid,
        input: LocationInput,
    ) -> PortResult<LocationView> {
        let user = self.resolve_user(user_id).await?;
        rules::validate_location_name(&input.name)?;
        rules::validate_address(&input.address)?;
        let mut location = self.owned_location(user.id, location_id).await?;

        let coordinates = self.resolve_address(&input.address).await?;
        let moved = coordinates != location.coordinates;
        location.name = input.name.trim().to_string();
        location.coordinates = coordinates;
        let location = self.db.update_location(&location).await?;
        info!(user_id = %user.id, location_id = %location.id, "Location updated");

        if moved {
            Ok(self.with_fresh_forecast(location).await)
        } else {
            Ok(self.view_of(location).await)
        }
    }

    /// A failed refresh does not undo the location write.
    async fn with_fresh_forecast(&self, location: Location) -> LocationView {
        let forecast = match self.refresh_forecast(&location).await {
            Ok(forecast) => Some(forecast),
            Err(e) => {
                warn!(location_id = %location.id, error = %e, "Forecast refresh failed");
                None
            }
        };
        LocationView { location, forecast }
    }

    /// Deletes the location along with its forecast and the routes that use it.
    pub async fn delete_location(&self, user_id: Uuid, location_id: Uuid) -> PortResult<Location> {
        let user = self.resolve_user(user_id).await?;
        let location = self.owned_location(user.id, location_id).await?;
        self.db.delete_location(location.id).await?;
        info!(user_id = %user.id, location_id = %location.id, "Location deleted");
        Ok(location)
    }

    // --- Routes ---

    pub async fn list_routes(&self, user_id: Uuid) -> PortResult<Vec<RouteView>> {
        let routes = self.db.list_routes(user_id).await?;
        if routes.is_empty() {
            return Ok(Vec::new());
        }

        let mut views: HashMap<Uuid, LocationView> = HashMap::new();
        for location in self.db.list_locations(user_id).await? {
            if routes.iter().any(|r| r.uses_location(location.id)) {
                views.insert(location.id, self.view_of(location).await);
            }
        }

        let today = self.today();
        let mut result = Vec::with_capacity(routes.len());
        for route in routes {
            let (Some(start), Some(end)) = (
                views.get(&route.start_location_id).cloned(),
                views.get(&route.end_location_id).cloned(),
            ) else {
                warn!(route_id = %route.id, "Route references a missing location");
                continue;
            };
            result.push(route_view(today, route, start, end));
        }
        Ok(result)
    }

    pub async fn get_route(&self, user_id: Uuid, route_id: Uuid) -> PortResult<RouteView> {
        let route = self.owned_route(user_id, route_id).await?;
        let start = self.view_of(self.resolve_location(route.start_location_id).await?).await;
        let end = self.view_of(self.resolve_location(route.end_location_id).await?).await;
        Ok(route_view(self.today(), route, start, end))
    }

    pub async fn create_route(&self, user_id: Uuid, input: RouteInput) -> PortResult<Route> {
        let user = self.resolve_user(user_id).await?;
        if self.db.list_locations(user.id).await?.len() < 2 {
            return Err(PortError::Invalid(
                "You must have at least 2 saved locations to create a route.".into(),
            ));
        }
        let new_route = self.check_route_input(&user, &input).await?;

        if self.db.list_routes(user.id).await?.len() >= MAX_ROUTES {
            return Err(rules::route_limit_reached());
        }

        let route = self.db.insert_route(new_route, MAX_ROUTES).await?;
        info!(user_id = %user.id, route_id = %route.id, "Route created");
        Ok(route)
    }

    pub async fn update_route(
        &self,
        user_id: Uuid,
        route_id: Uuid,
        input: RouteInput,
    ) -> PortResult<Route> {
        let user = self.resolve_user(user_id).await?;
        let existing = self.owned_route(user.id, route_id).await?;
        let checked = self.check_route_input(&user, &input).await?;

        let route = self
            .db
            .update_route(&Route {
                id: existing.id,
                user_id: existing.user_id,
                name: checked.name,
                start_location_id: checked.start_location_id,
                end_location_id: checked.end_location_id,
                departs_at: checked.departs_at,
                days: checked.days,
            })
            .await?;
        info!(user_id = %user.id, route_id = %route.id, "Route updated");
        Ok(route)
    }

    pub async fn delete_route(&self, user_id: Uuid, route_id: Uuid) -> PortResult<Route> {
        let user = self.resolve_user(user_id).await?;
        let route = self.owned_route(user.id, route_id).await?;
        self.db.delete_route(route.id).await?;
        info!(user_id = %user.id, route_id = %route.id, "Route deleted");
        Ok(route)
    }

    async fn check_route_input(&self, user: &User, input: &RouteInput) -> PortResult<NewRoute> {
        let start = self.resolve_location(input.start_location_id).await?;
        if start.user_id != user.id {
            return Err(PortError::Forbidden("Location 1 does not belong to user.".into()));
        }
        let end = self.resolve_location(input.end_location_id).await?;
        if end.user_id != user.id {
            return Err(PortError::Forbidden("Location 2 does not belong to user.".into()));
        }
        if start.id == end.id {
            return Err(PortError::Invalid("The two locations must be different.".into()));
        }

        rules::validate_route_name(&input.name)?;
        let days = rules::parse_route_days(&input.days)?;

        Ok(NewRoute {
            user_id: user.id,
            name: input.name.trim().to_string(),
            start_location_id: start.id,
            end_location_id: end.id,
            departs_at: input.departs_at,
            days,
        })
    }

    // --- Accounts ---

    /// Removes the user and everything the user owns.
    pub async fn delete_account(&self, user_id: Uuid) -> PortResult<User> {
        let user = self.resolve_user(user_id).await?;
        self.db.delete_user(user.id).await?;
        info!(user_id = %user.id, "Account deleted");
        Ok(user)
    }
}

fn route_view(today: NaiveDate, route: Route, start: LocationView, end: LocationView) -> RouteView {
    let outlook = week_outlook(today, route.days, start.forecast.as_ref(), end.forecast.as_ref());
    RouteView {
        route,
        start,
        end,
        outlook,
    }
}
