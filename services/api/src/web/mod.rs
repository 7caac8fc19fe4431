pub mod account;
pub mod auth;
pub mod developer;
pub mod locations;
pub mod middleware;
pub mod rest;
pub mod routes;
pub mod state;
pub mod tokens;
pub mod views;

use axum::{
    extract::DefaultBodyLimit,
    http::{
        header::{ACCEPT, CONTENT_TYPE},
        HeaderValue, Method, StatusCode,
    },
    middleware as axum_middleware,
    response::IntoResponse,
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower::Layer;
use tower_http::{cors::CorsLayer, normalize_path::NormalizePathLayer, trace::TraceLayer};
use tracing::warn;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub use middleware::require_auth;
pub use state::AppState;

const MAX_BODY_BYTES: usize = 64 * 1024;

async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "The requested page could not be found.")
}

fn cors_layer(origin: &str) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, ACCEPT]);
    match origin.parse::<HeaderValue>() {
        Ok(origin) => layer.allow_origin(origin),
        Err(e) => {
            warn!(error = %e, "Ignoring unusable CORS origin");
            layer
        }
    }
}

/// All service routes except the Swagger UI, without path normalization.
pub fn router(state: Arc<AppState>) -> Router {
    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/auth/signup", post(auth::signup_handler))
        .route("/auth/login", post(auth::login_handler))
        .route("/auth/logout", post(auth::logout_handler))
        .route("/auth/confirm/{token}", get(auth::confirm_email_handler))
        .route("/auth/forgot", post(auth::forgot_password_handler))
        .route("/auth/reset/{token}", post(auth::reset_password_handler));

    // Protected routes (auth required)
    let protected_routes = Router::new()
        .route("/dashboard", get(account::dashboard_handler))
        .route(
            "/locations",
            get(locations::list_locations_handler).post(locations::create_location_handler),
        )
        .route(
            "/locations/{id}",
            get(locations::get_location_handler)
                .put(locations::update_location_handler)
                .delete(locations::delete_location_handler),
        )
        .route(
            "/routes",
            get(routes::list_routes_handler).post(routes::create_route_handler),
        )
        .route(
            "/routes/{id}",
            get(routes::get_route_handler)
                .put(routes::update_route_handler)
                .delete(routes::delete_route_handler),
        )
        .route(
            "/account/developer-key",
            post(account::issue_developer_key_handler),
        )
        .route("/account", delete(account::delete_account_handler))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            require_auth,
        ));

    // Developer API (key in the path)
    let developer_routes = Router::new()
        .route("/api/{key}/location", get(developer::list_locations))
        .route("/api/{key}/location/{id}", get(developer::get_location))
        .route("/api/{key}/location/create", post(developer::create_location))
        .route("/api/{key}/location/update", post(developer::update_location))
        .route("/api/{key}/location/delete", post(developer::delete_location))
        .route("/api/{key}/routes", get(developer::list_routes))
        .route("/api/{key}/route/create", post(developer::create_route))
        .route("/api/{key}/route/update", post(developer::update_route))
        .route("/api/{key}/route/delete", delete(developer::delete_route));

    let cors = cors_layer(&state.config.cors_origin);

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .merge(developer_routes)
        .fallback(not_found)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// The complete application. `/routes/` and `/routes` reach the same handler.
///
/// The Swagger UI redirects `/swagger-ui` to `/swagger-ui/`, so it is served
/// ahead of the trailing-slash trimming.
pub fn app(state: Arc<AppState>) -> Router {
    let normalized = NormalizePathLayer::trim_trailing_slash().layer(router(state));
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", rest::ApiDoc::openapi()))
        .fallback_service(normalized)
}
