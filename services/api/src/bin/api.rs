//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{
        email, geocode, http_client, weather, DarkSkyWeather, DbAdapter, GoogleGeocoder,
        SendGridMailer,
    },
    config::Config,
    error::ApiError,
    web::{self, state::AppState},
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use weather_to_ride_core::{
    ports::{Clock, DatabaseService, SystemClock},
    service::CommuteService,
    UsageMeter,
};

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Connect to Database & Run Migrations ---
    info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;
    let db_adapter = Arc::new(DbAdapter::new(db_pool));
    info!("Running database migrations...");
    db_adapter.run_migrations().await?;
    info!("Database migrations complete.");
    let db: Arc<dyn DatabaseService> = db_adapter;

    // --- 3. Initialize Service Adapters ---
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let client = http_client()
        .map_err(|e| ApiError::Internal(format!("Failed to build the HTTP client: {e}")))?;

    for (name, key) in [
        ("GOOGLE_KEY", &config.google_key),
        ("WEATHER_KEY", &config.weather_key),
        ("SENDGRID_KEY", &config.sendgrid_key),
    ] {
        if key.is_none() {
            warn!("{name} is not set; the matching provider will refuse every call");
        }
    }

    let geocoder = Arc::new(GoogleGeocoder::new(
        client.clone(),
        config.geocode_base_url.clone(),
        config.google_key.clone(),
        UsageMeter::new(
            db.clone(),
            clock.clone(),
            geocode::PROVIDER,
            config.geocode_daily_limit,
        ),
    ));
    let weather = Arc::new(DarkSkyWeather::new(
        client.clone(),
        config.weather_base_url.clone(),
        config.weather_key.clone(),
        UsageMeter::new(
            db.clone(),
            clock.clone(),
            weather::PROVIDER,
            config.weather_daily_limit,
        ),
    ));
    let mailer = Arc::new(SendGridMailer::new(
        client,
        config.sendgrid_base_url.clone(),
        config.sendgrid_key.clone(),
        config.email_from.clone(),
        UsageMeter::new(
            db.clone(),
            clock.clone(),
            email::PROVIDER,
            config.email_daily_limit,
        ),
    ));

    // --- 4. Build the Shared AppState ---
    let commute = CommuteService::new(
        db.clone(),
        geocoder,
        weather,
        clock.clone(),
        config.utc_offset,
    );
    let app_state = Arc::new(AppState {
        db,
        config: config.clone(),
        commute,
        email: mailer,
        clock,
    });

    // --- 5. Create the Web Router ---
    let app = web::app(app_state);

    // --- 6. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
