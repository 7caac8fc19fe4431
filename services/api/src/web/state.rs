//! services/api/src/web/state.rs
//!
//! Defines the application state shared by every handler.

use crate::config::Config;
use std::sync::Arc;
use weather_to_ride_core::ports::{Clock, DatabaseService, EmailService};
use weather_to_ride_core::service::CommuteService;

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<dyn DatabaseService>,
    pub config: Arc<Config>,
    /// Location, route and forecast operations.
    pub commute: CommuteService,
    pub email: Arc<dyn EmailService>,
    pub clock: Arc<dyn Clock>,
}
