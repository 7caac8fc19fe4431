//! crates/weather_to_ride_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any database or HTTP representation.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Number of daily slots kept in a location's forecast.
pub const FORECAST_DAYS: usize = 8;

// Represents a user - used throughout app
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub phone: String,
    pub email_confirmed: bool,
    pub phone_confirmed: bool,
    pub created_at: DateTime<Utc>,
}

// Only used internally for login/signup - contains sensitive data
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub user_id: Uuid,
    pub email: String,
    pub hashed_password: String,
}

/// The fields required to register a new account.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub name: String,
    pub phone: String,
    pub hashed_password: String,
}

/// A latitude/longitude pair with six fractional digits, the precision of
/// the `NUMERIC(10,6)` columns they are stored in.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self {
            lat: round_micro(lat),
            lng: round_micro(lng),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }

    /// The "already resolved" address form, `<<<lat,lng>>>`, which the
    /// geocoding step accepts without calling the provider.
    pub fn to_resolved_address(&self) -> String {
        format!("<<<{:.6},{:.6}>>>", self.lat, self.lng)
    }

    /// Parses the `<<<lat,lng>>>` address form. Returns `None` for anything
    /// else, including malformed or out-of-range pairs.
    pub fn from_resolved_address(address: &str) -> Option<Self> {
        let inner = address.trim().strip_prefix("<<<")?.strip_suffix(">>>")?;
        let (lat, lng) = inner.split_once(',')?;
        let coords = Self::new(lat.trim().parse().ok()?, lng.trim().parse().ok()?);
        coords.is_valid().then_some(coords)
    }
}

fn round_micro(value: f64) -> f64 {
    (value * 1_000_000.0).round() / 1_000_000.0
}

/// A named place saved by a user.
#[derive(Debug, Clone, PartialEq)]
pub struct Location {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub coordinates: Coordinates,
}

#[derive(Debug, Clone)]
pub struct NewLocation {
    pub user_id: Uuid,
    pub name: String,
    pub coordinates: Coordinates,
}

/// Seven independent weekday flags. Bit 0 is Monday, bit 6 is Sunday.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct WeekdayMask(u8);

impl WeekdayMask {
    pub const EMPTY: Self = Self(0);
    pub const ALL: Self = Self(0b111_1111);

    /// Builds a mask from raw bits, rejecting anything above bit 6.
    pub fn from_bits(bits: u8) -> Option<Self> {
        (bits <= Self::ALL.0).then_some(Self(bits))
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    /// Builds a mask from day indices where 0 is Monday and 6 is Sunday.
    /// Returns the first out-of-range index on failure.
    pub fn from_day_indices(days: &[i64]) -> Result<Self, i64> {
        days.iter().try_fold(Self::EMPTY, |mask, &day| match u8::try_from(day) {
            Ok(d) if d <= 6 => Ok(Self(mask.0 | (1 << d))),
            _ => Err(day),
        })
    }

    /// The active day indices in ascending order (Monday first).
    pub fn day_indices(self) -> Vec<u8> {
        (0..7).filter(|d| self.0 & (1 << d) != 0).collect()
    }

    pub fn contains(self, day: Weekday) -> bool {
        self.0 & (1 << day.num_days_from_monday()) != 0
    }

    pub fn with(self, day: Weekday) -> Self {
        Self(self.0 | (1 << day.num_days_from_monday()))
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

/// A recurring weekly trip between two of a user's locations.
#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub start_location_id: Uuid,
    pub end_location_id: Uuid,
    pub departs_at: Option<NaiveTime>,
    pub days: WeekdayMask,
}

impl Route {
    pub fn uses_location(&self, location_id: Uuid) -> bool {
        self.start_location_id == location_id || self.end_location_id == location_id
    }
}

#[derive(Debug, Clone)]
pub struct NewRoute {
    pub user_id: Uuid,
    pub name: String,
    pub start_location_id: Uuid,
    pub end_location_id: Uuid,
    pub departs_at: Option<NaiveTime>,
    pub days: WeekdayMask,
}

/// One slot of a stored forecast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayForecast {
    /// A weather-icons CSS class, e.g. `wi-day-sunny`.
    pub icon: String,
    pub summary: String,
    pub recommendation: String,
}

/// The cached 8-day outlook of a location. Slot 0 is `issued_on`.
#[derive(Debug, Clone, PartialEq)]
pub struct Forecast {
    pub location_id: Uuid,
    pub issued_on: NaiveDate,
    pub days: [DayForecast; FORECAST_DAYS],
    pub updated_at: DateTime<Utc>,
}

impl Forecast {
    /// The slot covering `date`, if the forecast reaches that far.
    pub fn slot_for(&self, date: NaiveDate) -> Option<&DayForecast> {
        let offset = date.signed_duration_since(self.issued_on).num_days();
        usize::try_from(offset).ok().and_then(|i| self.days.get(i))
    }
}

/// Daily call accounting for one external provider.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiUsage {
    pub provider: String,
    pub calls_today: i32,
    pub calls_total: i64,
    pub last_reset: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mask_round_trips_day_indices() {
        let mask = WeekdayMask::from_day_indices(&[0, 2, 4, 4]).unwrap();
        assert_eq!(mask.bits(), 0b001_0101);
        assert_eq!(mask.day_indices(), vec![0, 2, 4]);
        assert!(mask.contains(Weekday::Mon));
        assert!(mask.contains(Weekday::Fri));
        assert!(!mask.contains(Weekday::Sun));
    }

    #[test]
    fn mask_rejects_out_of_range_days() {
        assert_eq!(WeekdayMask::from_day_indices(&[1, 7]), Err(7));
        assert_eq!(WeekdayMask::from_day_indices(&[-1]), Err(-1));
        assert!(WeekdayMask::from_bits(128).is_none());
        assert_eq!(WeekdayMask::from_bits(127), Some(WeekdayMask::ALL));
    }

    #[test]
    fn resolved_address_parses_and_formats() {
        let coords = Coordinates::from_resolved_address("<<<33.5021, -86.8064>>>").unwrap();
        assert_eq!(coords, Coordinates::new(33.5021, -86.8064));
        assert_eq!(coords.to_resolved_address(), "<<<33.502100,-86.806400>>>");

        assert!(Coordinates::from_resolved_address("1720 2nd Ave S").is_none());
        assert!(Coordinates::from_resolved_address("<<<95.0,10.0>>>").is_none());
        assert!(Coordinates::from_resolved_address("<<<abc,10.0>>>").is_none());
    }

    #[test]
    fn coordinates_keep_six_decimals() {
        let coords = Coordinates::new(33.123_456_789, -86.987_654_321);
        assert_eq!(coords.lat, 33.123_457);
        assert_eq!(coords.lng, -86.987_654);
    }

    #[test]
    fn forecast_slot_is_relative_to_issue_date() {
        let issued_on = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap();
        let days: [DayForecast; FORECAST_DAYS] = std::array::from_fn(|i| DayForecast {
            icon: "wi-day-sunny".to_string(),
            summary: format!("day {i}"),
            recommendation: String::new(),
        });
        let forecast = Forecast {
            location_id: Uuid::new_v4(),
            issued_on,
            days,
            updated_at: Utc::now(),
        };

        assert_eq!(forecast.slot_for(issued_on).unwrap().summary, "day 0");
        assert_eq!(
            forecast.slot_for(NaiveDate::from_ymd_opt(2024, 3, 11).unwrap()).unwrap().summary,
            "day 7"
        );
        assert!(forecast.slot_for(NaiveDate::from_ymd_opt(2024, 3, 12).unwrap()).is_none());
        assert!(forecast.slot_for(NaiveDate::from_ymd_opt(2024, 3, 3).unwrap()).is_none());
    }
}
