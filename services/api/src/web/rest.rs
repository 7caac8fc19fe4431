//! services/api/src/web/rest.rs
//!
//! The master definition for the OpenAPI specification of the session surface.

use utoipa::OpenApi;

use crate::web::{account, auth, locations, routes, views};

#[derive(OpenApi)]
#[openapi(
    paths(
        auth::signup_handler,
        auth::login_handler,
        auth::logout_handler,
        auth::confirm_email_handler,
        auth::forgot_password_handler,
        auth::reset_password_handler,
        account::dashboard_handler,
        account::issue_developer_key_handler,
        account::delete_account_handler,
        locations::list_locations_handler,
        locations::create_location_handler,
        locations::get_location_handler,
        locations::update_location_handler,
        locations::delete_location_handler,
        routes::list_routes_handler,
        routes::create_route_handler,
        routes::get_route_handler,
        routes::update_route_handler,
        routes::delete_route_handler,
    ),
    components(
        schemas(
            auth::SignupRequest,
            auth::LoginRequest,
            auth::ForgotPasswordRequest,
            auth::ResetPasswordRequest,
            auth::AuthResponse,
            auth::MessageResponse,
            account::DashboardResponse,
            account::DeveloperKeyResponse,
            locations::LocationRequest,
            routes::RouteRequest,
            views::LocationResponse,
            views::ForecastResponse,
            views::DayForecastResponse,
            views::RouteResponse,
            views::RouteDetailResponse,
            views::RouteDayResponse,
            views::UserResponse,
        )
    ),
    tags(
        (name = "Weather To Ride API", description = "Commute forecasts for cyclists: locations, routes and ride recommendations.")
    )
)]
pub struct ApiDoc;
