//! services/api/src/web/account.rs
//!
//! The dashboard and account management endpoints.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;
use weather_to_ride_core::service::developer_key_digest;

use crate::error::ApiError;
use crate::web::auth::{expired_session_cookie, MessageResponse};
use crate::web::state::AppState;
use crate::web::views::{LocationResponse, RouteDetailResponse, UserResponse};

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DashboardResponse {
    pub user: UserResponse,
    pub locations: Vec<LocationResponse>,
    pub routes: Vec<RouteDetailResponse>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DeveloperKeyResponse {
    /// Shown once; only its digest is stored.
    pub key: String,
}

/// GET /dashboard - Profile, locations and route outlooks in one call
#[utoipa::path(
    get,
    path = "/dashboard",
    responses(
        (status = 200, description = "The user's dashboard", body = DashboardResponse),
        (status = 401, description = "Not logged in")
    )
)]
pub async fn dashboard_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
) -> Result<Json<DashboardResponse>, ApiError> {
    let user = state.commute.resolve_user(user_id).await?;
    let locations = state.commute.list_locations(user.id).await?;
    let routes = state.commute.list_routes(user.id).await?;
    let now = state.clock.now();

    Ok(Json(DashboardResponse {
        user: UserResponse::from(&user),
        locations: locations.iter().map(|v| LocationResponse::new(v, now)).collect(),
        routes: routes.iter().map(|v| RouteDetailResponse::new(v, now)).collect(),
    }))
}

/// POST /account/developer-key - Issue a key for the developer API
///
/// A user holds at most one key; issuing a new one revokes the old.
#[utoipa::path(
    post,
    path = "/account/developer-key",
    responses(
        (status = 201, description = "Key issued", body = DeveloperKeyResponse),
        (status = 401, description = "Not logged in")
    )
)]
pub async fn issue_developer_key_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let user = state.commute.resolve_user(user_id).await?;
    let key = Uuid::new_v4().simple().to_string();
    state
        .db
        .upsert_developer_key(user.id, &developer_key_digest(&key))
        .await?;
    info!(user_id = %user.id, "Developer key issued");
    Ok((StatusCode::CREATED, Json(DeveloperKeyResponse { key })))
}

/// DELETE /account - Delete the account with everything it owns and log out
#[utoipa::path(
    delete,
    path = "/account",
    responses(
        (status = 200, description = "Account deleted", body = MessageResponse),
        (status = 401, description = "Not logged in")
    )
)]
pub async fn delete_account_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    state.commute.delete_account(user_id).await?;
    Ok((
        StatusCode::OK,
        [(header::SET_COOKIE, expired_session_cookie())],
        MessageResponse::new("Your account has been deleted."),
    ))
}
