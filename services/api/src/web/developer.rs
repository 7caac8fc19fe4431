//! services/api/src/web/developer.rs
//!
//! The developer API: the same location and route operations as the session
//! surface, authenticated by a key in the path. Payloads are camelCase and
//! every client error is reported as `400 {"error": "..."}`.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;
use weather_to_ride_core::domain::{DayForecast, Forecast, Location, Route};
use weather_to_ride_core::forecast::is_stale;
use weather_to_ride_core::ports::PortError;
use weather_to_ride_core::schedule::RouteDay;
use weather_to_ride_core::service::{LocationInput, LocationView, RouteInput, RouteView};

use crate::error::ApiError;
use crate::web::state::AppState;

//=========================================================================================
// Errors
//=========================================================================================

/// Wraps `ApiError` to fold every client-side failure into a 400.
#[derive(Debug)]
pub struct DeveloperError(ApiError);

impl From<ApiError> for DeveloperError {
    fn from(e: ApiError) -> Self {
        Self(e)
    }
}

impl From<PortError> for DeveloperError {
    fn from(e: PortError) -> Self {
        Self(ApiError::Port(e))
    }
}

impl From<JsonRejection> for DeveloperError {
    fn from(rejection: JsonRejection) -> Self {
        debug!(error = %rejection.body_text(), "Rejected developer API payload");
        Self(ApiError::BadRequest(format!(
            "Invalid request body: {}",
            rejection.body_text()
        )))
    }
}

impl IntoResponse for DeveloperError {
    fn into_response(self) -> Response {
        if self.0.status().is_server_error() {
            return self.0.into_response();
        }
        (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": self.0.public_message() })),
        )
            .into_response()
    }
}

type DevResult<T> = Result<Json<T>, DeveloperError>;

//=========================================================================================
// Payloads
//=========================================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct DevDay {
    pub date: NaiveDate,
    pub icon: String,
    pub summary: String,
    pub recommendation: String,
}

impl DevDay {
    fn new(date: NaiveDate, day: &DayForecast) -> Self {
        Self {
            date,
            icon: day.icon.clone(),
            summary: day.summary.clone(),
            recommendation: day.recommendation.clone(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DevForecast {
    pub issued_on: NaiveDate,
    pub updated_at: DateTime<Utc>,
    pub stale: bool,
    pub days: Vec<DevDay>,
}

impl DevForecast {
    fn new(forecast: &Forecast, now: DateTime<Utc>) -> Self {
        Self {
            issued_on: forecast.issued_on,
            updated_at: forecast.updated_at,
            stale: is_stale(forecast.updated_at, now),
            days: forecast
                .days
                .iter()
                .enumerate()
                .map(|(i, day)| DevDay::new(forecast.issued_on + Duration::days(i as i64), day))
                .collect(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DevLocation {
    pub location_id: Uuid,
    pub location_name: String,
    pub location_lat: f64,
    pub location_lng: f64,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub forecast: Option<DevForecast>,
}

impl DevLocation {
    fn bare(location: &Location) -> Self {
        Self {
            location_id: location.id,
            location_name: location.name.clone(),
            location_lat: location.coordinates.lat,
            location_lng: location.coordinates.lng,
            forecast: None,
        }
    }

    fn with_forecast(view: &LocationView, now: DateTime<Utc>) -> Self {
        Self {
            forecast: view.forecast.as_ref().map(|f| DevForecast::new(f, now)),
            ..Self::bare(&view.location)
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DevRoute {
    pub route_id: Uuid,
    pub route_name: String,
    pub route_days: Vec<u8>,
    pub route_location1: Uuid,
    pub route_location2: Uuid,
    pub route_departs_at: Option<NaiveTime>,
}

impl From<&Route> for DevRoute {
    fn from(route: &Route) -> Self {
        Self {
            route_id: route.id,
            route_name: route.name.clone(),
            route_days: route.days.day_indices(),
            route_location1: route.start_location_id,
            route_location2: route.end_location_id,
            route_departs_at: route.departs_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DevRouteDay {
    pub date: NaiveDate,
    pub label: String,
    pub location1: Option<DevDay>,
    pub location2: Option<DevDay>,
}

impl From<&RouteDay> for DevRouteDay {
    fn from(day: &RouteDay) -> Self {
        Self {
            date: day.date,
            label: day.label.clone(),
            location1: day.start.as_ref().map(|s| DevDay::new(day.date, s)),
            location2: day.end.as_ref().map(|s| DevDay::new(day.date, s)),
        }
    }
}

/// A route with both locations and their forecasts embedded.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DevRouteDetail {
    pub route_id: Uuid,
    pub route_name: String,
    pub route_days: Vec<u8>,
    pub route_departs_at: Option<NaiveTime>,
    pub route_location1: DevLocation,
    pub route_location2: DevLocation,
    pub route_outlook: Vec<DevRouteDay>,
}

impl DevRouteDetail {
    fn new(view: &RouteView, now: DateTime<Utc>) -> Self {
        Self {
            route_id: view.route.id,
            route_name: view.route.name.clone(),
            route_days: view.route.days.day_indices(),
            route_departs_at: view.route.departs_at,
            route_location1: DevLocation::with_forecast(&view.start, now),
            route_location2: DevLocation::with_forecast(&view.end, now),
            route_outlook: view.outlook.iter().map(DevRouteDay::from).collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateLocationBody {
    pub location_name: String,
    pub location_address: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateLocationBody {
    pub location_id: Uuid,
    pub location_name: String,
    pub location_address: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationIdBody {
    pub location_id: Uuid,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteBody {
    pub route_location1: Uuid,
    pub route_location2: Uuid,
    pub route_name: String,
    pub route_days: Vec<i64>,
    #[serde(default)]
    pub route_departs_at: Option<NaiveTime>,
}

impl From<RouteBody> for RouteInput {
    fn from(body: RouteBody) -> Self {
        RouteInput {
            name: body.route_name,
            start_location_id: body.route_location1,
            end_location_id: body.route_location2,
            days: body.route_days,
            departs_at: body.route_departs_at,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRouteBody {
    pub route_id: Uuid,
    #[serde(flatten)]
    pub route: RouteBody,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteIdBody {
    pub route_id: Uuid,
}

//=========================================================================================
// Handlers
//=========================================================================================

/// GET /api/{key}/location
pub async fn list_locations(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> DevResult<serde_json::Value> {
    let user = state.commute.resolve_developer(&key).await?;
    let now = state.clock.now();
    let locations: Vec<DevLocation> = state
        .commute
        .list_locations(user.id)
        .await?
        .iter()
        .map(|v| DevLocation::with_forecast(v, now))
        .collect();
    Ok(Json(json!({
        "userId": user.id,
        "numberOfLocations": locations.len(),
        "locations": locations,
    })))
}

/// GET /api/{key}/location/{id}
pub async fn get_location(
    State(state): State<Arc<AppState>>,
    Path((key, id)): Path<(String, String)>,
) -> DevResult<serde_json::Value> {
    let user = state.commute.resolve_developer(&key).await?;
    let location_id = Uuid::parse_str(&id)
        .map_err(|_| PortError::NotFound("Location does not exist.".into()))?;
    let view = state.commute.get_location(user.id, location_id).await?;
    Ok(Json(json!({
        "location": DevLocation::with_forecast(&view, state.clock.now()),
    })))
}

/// POST /api/{key}/location/create
pub async fn create_location(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    body: Result<Json<CreateLocationBody>, JsonRejection>,
) -> DevResult<serde_json::Value> {
    let user = state.commute.resolve_developer(&key).await?;
    let Json(body) = body?;
    let view = state
        .commute
        .create_location(
            user.id,
            LocationInput {
                name: body.location_name,
                address: body.location_address,
            },
        )
        .await?;
    Ok(Json(json!({
        "createdLocation": DevLocation::with_forecast(&view, state.clock.now()),
    })))
}

/// POST /api/{key}/location/update
pub async fn update_location(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    body: Result<Json<UpdateLocationBody>, JsonRejection>,
) -> DevResult<serde_json::Value> {
    let user = state.commute.resolve_developer(&key).await?;
    let Json(body) = body?;
    let view = state
        .commute
        .update_location(
            user.id,
            body.location_id,
            LocationInput {
                name: body.location_name,
                address: body.location_address,
            },
        )
        .await?;
    Ok(Json(json!({
        "updatedLocation": DevLocation::with_forecast(&view, state.clock.now()),
    })))
}

/// POST /api/{key}/location/delete
pub async fn delete_location(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    body: Result<Json<LocationIdBody>, JsonRejection>,
) -> DevResult<serde_json::Value> {
    let user = state.commute.resolve_developer(&key).await?;
    let Json(body) = body?;
    let location = state
        .commute
        .delete_location(user.id, body.location_id)
        .await?;
    Ok(Json(json!({ "deletedLocation": DevLocation::bare(&location) })))
}

/// GET /api/{key}/routes
pub async fn list_routes(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> DevResult<serde_json::Value> {
    let user = state.commute.resolve_developer(&key).await?;
    let now = state.clock.now();
    let routes: Vec<DevRouteDetail> = state
        .commute
        .list_routes(user.id)
        .await?
        .iter()
        .map(|v| DevRouteDetail::new(v, now))
        .collect();
    Ok(Json(json!({
        "userId": user.id,
        "numberOfRoutes": routes.len(),
        "routes": routes,
    })))
}

/// POST /api/{key}/route/create
pub async fn create_route(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    body: Result<Json<RouteBody>, JsonRejection>,
) -> DevResult<serde_json::Value> {
    let user = state.commute.resolve_developer(&key).await?;
    let Json(body) = body?;
    let route = state.commute.create_route(user.id, body.into()).await?;
    Ok(Json(json!({ "createdRoute": DevRoute::from(&route) })))
}

/// POST /api/{key}/route/update
pub async fn update_route(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    body: Result<Json<UpdateRouteBody>, JsonRejection>,
) -> DevResult<serde_json::Value> {
    let user = state.commute.resolve_developer(&key).await?;
    let Json(body) = body?;
    let route = state
        .commute
        .update_route(user.id, body.route_id, body.route.into())
        .await?;
    Ok(Json(json!({ "updatedRoute": DevRoute::from(&route) })))
}

/// DELETE /api/{key}/route/delete
pub async fn delete_route(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    body: Result<Json<RouteIdBody>, JsonRejection>,
) -> DevResult<serde_json::Value> {
    let user = state.commute.resolve_developer(&key).await?;
    let Json(body) = body?;
    let route = state.commute.delete_route(user.id, body.route_id).await?;
    Ok(Json(json!({ "deletedRoute": DevRoute::from(&route) })))
}
