//! services/api/src/web/routes.rs
//!
//! Route (commute) endpoints of the session surface.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use chrono::NaiveTime;
use serde::Deserialize;
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;
use weather_to_ride_core::service::RouteInput;

use crate::error::ApiError;
use crate::web::state::AppState;
use crate::web::views::{RouteDetailResponse, RouteResponse};

#[derive(Debug, Deserialize, ToSchema)]
pub struct RouteRequest {
    pub name: String,
    pub start_location_id: Uuid,
    pub end_location_id: Uuid,
    /// 0 = Monday .. 6 = Sunday
    #[serde(default)]
    pub days: Vec<i64>,
    pub departs_at: Option<NaiveTime>,
}

impl From<RouteRequest> for RouteInput {
    fn from(req: RouteRequest) -> Self {
        RouteInput {
            name: req.name,
            start_location_id: req.start_location_id,
            end_location_id: req.end_location_id,
            days: req.days,
            departs_at: req.departs_at,
        }
    }
}

/// GET /routes - Every route of the user with its week outlook
#[utoipa::path(
    get,
    path = "/routes",
    responses(
        (status = 200, description = "The user's routes", body = [RouteDetailResponse]),
        (status = 401, description = "Not logged in")
    )
)]
pub async fn list_routes_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
) -> Result<Json<Vec<RouteDetailResponse>>, ApiError> {
    let now = state.clock.now();
    let views = state.commute.list_routes(user_id).await?;
    Ok(Json(views.iter().map(|v| RouteDetailResponse::new(v, now)).collect()))
}

/// POST /routes - Save a new route between two of the user's locations
#[utoipa::path(
    post,
    path = "/routes",
    request_body = RouteRequest,
    responses(
        (status = 201, description = "Route created", body = RouteResponse),
        (status = 400, description = "Invalid route or limit reached"),
        (status = 403, description = "A location belongs to another user"),
        (status = 404, description = "A location does not exist")
    )
)]
pub async fn create_route_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Json(req): Json<RouteRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let route = state.commute.create_route(user_id, req.into()).await?;
    Ok((StatusCode::CREATED, Json(RouteResponse::from(&route))))
}

/// GET /routes/{id}
#[utoipa::path(
    get,
    path = "/routes/{id}",
    params(("id" = Uuid, Path, description = "Route ID")),
    responses(
        (status = 200, description = "The route with its outlook", body = RouteDetailResponse),
        (status = 403, description = "Owned by another user"),
        (status = 404, description = "No such route")
    )
)]
pub async fn get_route_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(route_id): Path<Uuid>,
) -> Result<Json<RouteDetailResponse>, ApiError> {
    let view = state.commute.get_route(user_id, route_id).await?;
    Ok(Json(RouteDetailResponse::new(&view, state.clock.now())))
}

/// PUT /routes/{id}
#[utoipa::path(
    put,
    path = "/routes/{id}",
    params(("id" = Uuid, Path, description = "Route ID")),
    request_body = RouteRequest,
    responses(
        (status = 200, description = "Route updated", body = RouteResponse),
        (status = 400, description = "Invalid route"),
        (status = 403, description = "Owned by another user"),
        (status = 404, description = "No such route or location")
    )
)]
pub async fn update_route_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(route_id): Path<Uuid>,
    Json(req): Json<RouteRequest>,
) -> Result<Json<RouteResponse>, ApiError> {
    let route = state
        .commute
        .update_route(user_id, route_id, req.into())
        .await?;
    Ok(Json(RouteResponse::from(&route)))
}

/// DELETE /routes/{id}
#[utoipa::path(
    delete,
    path = "/routes/{id}",
    params(("id" = Uuid, Path, description = "Route ID")),
    responses(
        (status = 204, description = "Route deleted"),
        (status = 403, description = "Owned by another user"),
        (status = 404, description = "No such route")
    )
)]
pub async fn delete_route_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(route_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.commute.delete_route(user_id, route_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
