//! services/api/src/web/locations.rs
//!
//! Location endpoints of the session surface.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use serde::Deserialize;
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;
use weather_to_ride_core::service::LocationInput;

use crate::error::ApiError;
use crate::web::state::AppState;
use crate::web::views::LocationResponse;

#[derive(Debug, Deserialize, ToSchema)]
pub struct LocationRequest {
    pub name: String,
    /// A street address, or `<<<lat,lng>>>` to keep known coordinates.
    pub address: String,
}

impl From<LocationRequest> for LocationInput {
    fn from(req: LocationRequest) -> Self {
        LocationInput {
            name: req.name,
            address: req.address,
        }
    }
}

/// GET /locations - Every location of the user with its forecast
#[utoipa::path(
    get,
    path = "/locations",
    responses(
        (status = 200, description = "The user's locations", body = [LocationResponse]),
        (status = 401, description = "Not logged in")
    )
)]
pub async fn list_locations_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
) -> Result<Json<Vec<LocationResponse>>, ApiError> {
    let now = state.clock.now();
    let views = state.commute.list_locations(user_id).await?;
    Ok(Json(views.iter().map(|v| LocationResponse::new(v, now)).collect()))
}

/// POST /locations - Save a new location
#[utoipa::path(
    post,
    path = "/locations",
    request_body = LocationRequest,
    responses(
        (status = 201, description = "Location created", body = LocationResponse),
        (status = 400, description = "Invalid name or address, or limit reached"),
        (status = 429, description = "Geocoding quota exhausted")
    )
)]
pub async fn create_location_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Json(req): Json<LocationRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let view = state.commute.create_location(user_id, req.into()).await?;
    Ok((
        StatusCode::CREATED,
        Json(LocationResponse::new(&view, state.clock.now())),
    ))
}

/// GET /locations/{id}
#[utoipa::path(
    get,
    path = "/locations/{id}",
    params(("id" = Uuid, Path, description = "Location ID")),
    responses(
        (status = 200, description = "The location", body = LocationResponse),
        (status = 403, description = "Owned by another user"),
        (status = 404, description = "No such location")
    )
)]
pub async fn get_location_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(location_id): Path<Uuid>,
) -> Result<Json<LocationResponse>, ApiError> {
    let view = state.commute.get_location(user_id, location_id).await?;
    Ok(Json(LocationResponse::new(&view, state.clock.now())))
}

/// PUT /locations/{id} - Rename or move a location
#[utoipa::path(
    put,
    path = "/locations/{id}",
    params(("id" = Uuid, Path, description = "Location ID")),
    request_body = LocationRequest,
    responses(
        (status = 200, description = "Location updated", body = LocationResponse),
        (status = 400, description = "Invalid name or address"),
        (status = 403, description = "Owned by another user"),
        (status = 404, description = "No such location")
    )
)]
pub async fn update_location_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(location_id): Path<Uuid>,
    Json(req): Json<LocationRequest>,
) -> Result<Json<LocationResponse>, ApiError> {
    let view = state
        .commute
        .update_location(user_id, location_id, req.into())
        .await?;
    Ok(Json(LocationResponse::new(&view, state.clock.now())))
}

/// DELETE /locations/{id} - Delete a location and every route using it
#[utoipa::path(
    delete,
    path = "/locations/{id}",
    params(("id" = Uuid, Path, description = "Location ID")),
    responses(
        (status = 204, description = "Location deleted"),
        (status = 403, description = "Owned by another user"),
        (status = 404, description = "No such location")
    )
)]
pub async fn delete_location_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(location_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.commute.delete_location(user_id, location_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
