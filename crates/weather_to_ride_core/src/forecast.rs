//! Forecast caching policy and the conversion from raw daily conditions into
//! stored forecast slots with a riding recommendation.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use uuid::Uuid;

use crate::domain::{DayForecast, Forecast, FORECAST_DAYS};
use crate::ports::{DailyConditions, PortError, PortResult};

/// Cached forecasts older than this are fetched again.
pub const STALENESS_THRESHOLD_SECS: i64 = 900;

pub fn is_stale(updated_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    now - updated_at > Duration::seconds(STALENESS_THRESHOLD_SECS)
}

/// Maps provider icon keywords onto weather-icons CSS classes
/// (http://erikflowers.github.io/weather-icons/).
pub fn css_icon(icon: &str) -> &'static str {
    match icon {
        "clear-day" => "wi-day-sunny",
        "clear-night" => "wi-night-clear",
        "rain" => "wi-rain",
        "snow" => "wi-snow",
        "sleet" => "wi-sleet",
        "wind" => "wi-windy",
        "fog" => "wi-fog",
        "cloudy" => "wi-cloud",
        "partly-cloudy-day" => "wi-day-cloudy",
        "partly-cloudy-night" => "wi-night-partly-cloudy",
        "hail" => "wi-hail",
        "thunderstorm" => "wi-thunderstorm",
        "tornado" => "wi-tornado",
        _ => "wi-na",
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RideAdvice {
    Ride,
    Caution,
    DontRide,
}

/// Grades a day for riding and explains the grade.
pub fn assess(day: &DailyConditions) -> (RideAdvice, String) {
    let precip = (day.precip_probability * 100.0).round();

    let stop = if matches!(
        day.icon.as_str(),
        "rain" | "snow" | "sleet" | "hail" | "thunderstorm" | "tornado"
    ) {
        Some(format!("{} expected", day.icon.replace('-', " ")))
    } else if day.precip_probability >= 0.6 {
        Some(format!("{precip}% chance of precipitation"))
    } else if day.wind_speed >= 25.0 {
        Some(format!("winds around {:.0} mph", day.wind_speed))
    } else if let Some(high) = day.temperature_high.filter(|t| *t < 25.0) {
        Some(format!("a high of only {high:.0}°F"))
    } else {
        None
    };
    if let Some(reason) = stop {
        return (RideAdvice::DontRide, format!("Not a good day to ride: {reason}."));
    }

    let caution = if day.precip_probability >= 0.3 {
        Some(format!("{precip}% chance of precipitation"))
    } else if day.wind_speed >= 15.0 {
        Some(format!("winds around {:.0} mph", day.wind_speed))
    } else if matches!(day.icon.as_str(), "fog" | "wind") {
        Some(format!("{} expected", day.icon))
    } else if let Some(low) = day.temperature_low.filter(|t| *t < 35.0) {
        Some(format!("a low of {low:.0}°F"))
    } else if let Some(high) = day.temperature_high.filter(|t| *t > 95.0) {
        Some(format!("a high of {high:.0}°F"))
    } else {
        None
    };
    match caution {
        Some(reason) => (RideAdvice::Caution, format!("Ride with caution: {reason}.")),
        None => (RideAdvice::Ride, "Great day to ride!".to_string()),
    }
}

/// Builds the stored forecast for a location from the provider's daily list.
/// Only the first eight days are kept.
pub fn build_forecast(
    location_id: Uuid,
    issued_on: NaiveDate,
    daily: &[DailyConditions],
    now: DateTime<Utc>,
) -> PortResult<Forecast> {
    if daily.len() < FORECAST_DAYS {
        return Err(PortError::Upstream(format!(
            "Daily forecasts list is smaller than expected ({} instead of {}).",
            daily.len(),
            FORECAST_DAYS
        )));
    }

    let days: [DayForecast; FORECAST_DAYS] = std::array::from_fn(|i| {
        let day = &daily[i];
        DayForecast {
            icon: css_icon(&day.icon).to_string(),
            summary: day.summary.clone(),
            recommendation: assess(day).1,
        }
    });

    Ok(Forecast {
        location_id,
        issued_on,
        days,
        updated_at: now,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn mild(icon: &str) -> DailyConditions {
        DailyConditions {
            icon: icon.to_string(),
            summary: "Mild".to_string(),
            precip_probability: 0.05,
            wind_speed: 6.0,
            temperature_low: Some(55.0),
            temperature_high: Some(75.0),
        }
    }

    #[test]
    fn staleness_boundary_is_exclusive() {
        let updated = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        assert!(!is_stale(updated, updated + Duration::seconds(900)));
        assert!(is_stale(updated, updated + Duration::seconds(901)));
        assert!(!is_stale(updated, updated));
    }

    #[test]
    fn unknown_icons_fall_back() {
        assert_eq!(css_icon("clear-day"), "wi-day-sunny");
        assert_eq!(css_icon("partly-cloudy-night"), "wi-night-partly-cloudy");
        assert_eq!(css_icon("volcano"), "wi-na");
    }

    #[test]
    fn advice_grades() {
        assert_eq!(assess(&mild("clear-day")).0, RideAdvice::Ride);
        assert_eq!(assess(&mild("clear-day")).1, "Great day to ride!");

        let (advice, text) = assess(&mild("rain"));
        assert_eq!(advice, RideAdvice::DontRide);
        assert_eq!(text, "Not a good day to ride: rain expected.");

        let showers = DailyConditions {
            precip_probability: 0.4,
            ..mild("cloudy")
        };
        let (advice, text) = assess(&showers);
        assert_eq!(advice, RideAdvice::Caution);
        assert_eq!(text, "Ride with caution: 40% chance of precipitation.");

        let gale = DailyConditions {
            wind_speed: 30.0,
            ..mild("wind")
        };
        assert_eq!(assess(&gale).0, RideAdvice::DontRide);

        let frost = DailyConditions {
            temperature_low: Some(28.0),
            ..mild("clear-day")
        };
        assert_eq!(assess(&frost).0, RideAdvice::Caution);
    }

    #[test]
    fn missing_temperatures_are_not_graded() {
        let unknown = DailyConditions {
            temperature_low: None,
            temperature_high: None,
            ..mild("clear-day")
        };
        assert_eq!(
            assess(&unknown),
            (RideAdvice::Ride, "Great day to ride!".to_string())
        );

        let cold_high_only = DailyConditions {
            temperature_low: None,
            temperature_high: Some(20.0),
            ..mild("clear-day")
        };
        assert_eq!(
            assess(&cold_high_only).1,
            "Not a good day to ride: a high of only 20°F."
        );
    }

    #[test]
    fn build_requires_eight_days() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let issued_on = now.date_naive();
        let short = vec![mild("clear-day"); 7];
        assert_eq!(
            build_forecast(Uuid::nil(), issued_on, &short, now),
            Err(PortError::Upstream(
                "Daily forecasts list is smaller than expected (7 instead of 8).".to_string()
            ))
        );

        let mut week = vec![mild("clear-day"); 9];
        week[3] = mild("snow");
        let forecast = build_forecast(Uuid::nil(), issued_on, &week, now).unwrap();
        assert_eq!(forecast.days.len(), 8);
        assert_eq!(forecast.days[3].icon, "wi-snow");
        assert!(forecast.days[3].recommendation.starts_with("Not a good day"));
        assert_eq!(forecast.updated_at, now);
    }
}
