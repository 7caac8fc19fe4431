//! Maps a route's weekday mask onto the coming week and pairs every active
//! day with the matching forecast slot of both endpoints.

use chrono::{Datelike, Duration, NaiveDate, Weekday};

use crate::domain::{DayForecast, Forecast, WeekdayMask};

/// How many days ahead the outlook covers, today included.
pub const OUTLOOK_DAYS: i64 = 7;

/// One active day of a route in the coming week.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteDay {
    pub date: NaiveDate,
    pub label: String,
    pub start: Option<DayForecast>,
    pub end: Option<DayForecast>,
}

pub fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

/// `Today`, `Tomorrow`, then the weekday name.
pub fn day_label(offset: i64, date: NaiveDate) -> String {
    match offset {
        0 => "Today".to_string(),
        1 => "Tomorrow".to_string(),
        _ => weekday_name(date.weekday()).to_string(),
    }
}

/// The days in `today .. today + 7` on which a route with mask `days` runs.
pub fn week_outlook(
    today: NaiveDate,
    days: WeekdayMask,
    start: Option<&Forecast>,
    end: Option<&Forecast>,
) -> Vec<RouteDay> {
    (0..OUTLOOK_DAYS)
        .map(|offset| (offset, today + Duration::days(offset)))
        .filter(|(_, date)| days.contains(date.weekday()))
        .map(|(offset, date)| RouteDay {
            date,
            label: day_label(offset, date),
            start: start.and_then(|f| f.slot_for(date)).cloned(),
            end: end.and_then(|f| f.slot_for(date)).cloned(),
        })
        .collect()
}
