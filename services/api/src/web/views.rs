//! services/api/src/web/views.rs
//!
//! JSON shapes returned by the session (cookie) surface.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use weather_to_ride_core::domain::{DayForecast, Forecast, Route, User};
use weather_to_ride_core::forecast::is_stale;
use weather_to_ride_core::schedule::{weekday_name, RouteDay};
use weather_to_ride_core::service::{LocationView, RouteView};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DayForecastResponse {
    pub date: NaiveDate,
    /// A weather-icons CSS class, e.g. `wi-day-sunny`.
    pub icon: String,
    pub summary: String,
    pub recommendation: String,
}

impl DayForecastResponse {
    fn from_slot(date: NaiveDate, day: &DayForecast) -> Self {
        Self {
            date,
            icon: day.icon.clone(),
            summary: day.summary.clone(),
            recommendation: day.recommendation.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ForecastResponse {
    pub issued_on: NaiveDate,
    pub updated_at: DateTime<Utc>,
    /// True when the refresh failed and an older copy is being served.
    pub stale: bool,
    pub days: Vec<DayForecastResponse>,
}

impl ForecastResponse {
    pub fn new(forecast: &Forecast, now: DateTime<Utc>) -> Self {
        Self {
            issued_on: forecast.issued_on,
            updated_at: forecast.updated_at,
            stale: is_stale(forecast.updated_at, now),
            days: forecast
                .days
                .iter()
                .enumerate()
                .map(|(i, day)| {
                    DayForecastResponse::from_slot(forecast.issued_on + Duration::days(i as i64), day)
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LocationResponse {
    pub id: Uuid,
    pub name: String,
    pub lat: f64,
    pub lng: f64,
    /// Submitting this back as the address keeps the coordinates unchanged.
    pub address: String,
    pub forecast: Option<ForecastResponse>,
}

impl LocationResponse {
    pub fn new(view: &LocationView, now: DateTime<Utc>) -> Self {
        let location = &view.location;
        Self {
            id: location.id,
            name: location.name.clone(),
            lat: location.coordinates.lat,
            lng: location.coordinates.lng,
            address: location.coordinates.to_resolved_address(),
            forecast: view.forecast.as_ref().map(|f| ForecastResponse::new(f, now)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RouteDayResponse {
    pub date: NaiveDate,
    /// `Today`, `Tomorrow` or a weekday name.
    pub label: String,
    pub start: Option<DayForecastResponse>,
    pub end: Option<DayForecastResponse>,
}

impl From<&RouteDay> for RouteDayResponse {
    fn from(day: &RouteDay) -> Self {
        Self {
            date: day.date,
            label: day.label.clone(),
            start: day.start.as_ref().map(|s| DayForecastResponse::from_slot(day.date, s)),
            end: day.end.as_ref().map(|s| DayForecastResponse::from_slot(day.date, s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RouteResponse {
    pub id: Uuid,
    pub name: String,
    pub start_location_id: Uuid,
    pub end_location_id: Uuid,
    pub departs_at: Option<NaiveTime>,
    /// 0 = Monday .. 6 = Sunday
    pub days: Vec<u8>,
    pub day_names: Vec<String>,
}

impl From<&Route> for RouteResponse {
    fn from(route: &Route) -> Self {
        let days = route.days.day_indices();
        let day_names = days
            .iter()
            .filter_map(|d| chrono::Weekday::try_from(*d).ok())
            .map(|d| weekday_name(d).to_string())
            .collect();
        Self {
            id: route.id,
            name: route.name.clone(),
            start_location_id: route.start_location_id,
            end_location_id: route.end_location_id,
            departs_at: route.departs_at,
            days,
            day_names,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RouteDetailResponse {
    #[serde(flatten)]
    pub route: RouteResponse,
    pub start: LocationResponse,
    pub end: LocationResponse,
    pub outlook: Vec<RouteDayResponse>,
}

impl RouteDetailResponse {
    pub fn new(view: &RouteView, now: DateTime<Utc>) -> Self {
        Self {
            route: RouteResponse::from(&view.route),
            start: LocationResponse::new(&view.start, now),
            end: LocationResponse::new(&view.end, now),
            outlook: view.outlook.iter().map(RouteDayResponse::from).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserResponse {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub phone: String,
    pub email_confirmed: bool,
    pub phone_confirmed: bool,
}

impl From<&User> for UserResponse {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            name: user.name.clone(),
            phone: user.phone.clone(),
            email_confirmed: user.email_confirmed,
            phone_confirmed: user.phone_confirmed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use weather_to_ride_core::domain::{WeekdayMask, FORECAST_DAYS};

    #[test]
    fn forecast_days_are_dated_from_the_issue_date() {
        let issued_on = NaiveDate::from_ymd_opt(2024, 3, 6).unwrap();
        let updated_at = Utc.with_ymd_and_hms(2024, 3, 6, 12, 0, 0).unwrap();
        let forecast = Forecast {
            location_id: Uuid::new_v4(),
            issued_on,
            days: std::array::from_fn(|_| DayForecast {
                icon: "wi-day-sunny".into(),
                summary: "Clear.".into(),
                recommendation: "Great day to ride!".into(),
            }),
            updated_at,
        };

        let fresh = ForecastResponse::new(&forecast, updated_at + Duration::minutes(5));
        assert!(!fresh.stale);
        assert_eq!(fresh.days.len(), FORECAST_DAYS);
        assert_eq!(fresh.days[7].date, NaiveDate::from_ymd_opt(2024, 3, 13).unwrap());

        let old = ForecastResponse::new(&forecast, updated_at + Duration::minutes(16));
        assert!(old.stale);
    }

    #[test]
    fn route_days_are_named() {
        let route = Route {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            name: "Work".into(),
            start_location_id: Uuid::new_v4(),
            end_location_id: Uuid::new_v4(),
            departs_at: None,
            days: WeekdayMask::from_day_indices(&[0, 4, 6]).unwrap(),
        };
        let response = RouteResponse::from(&route);
        assert_eq!(response.days, vec![0, 4, 6]);
        assert_eq!(response.day_names, vec!["Monday", "Friday", "Sunday"]);
    }
}
