pub mod domain;
pub mod forecast;
pub mod ports;
pub mod quota;
pub mod rules;
pub mod schedule;
pub mod service;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use domain::{
    ApiUsage, Coordinates, DayForecast, Forecast, Location, NewLocation,
    NewRoute, NewUser, Route, User, UserCredentials, WeekdayMask, FORECAST_DAYS,
};
pub use ports::{
    Clock, DailyConditions, DatabaseService, EmailService, GeocodingService, PortError,
    PortResult, SystemClock, WeatherService,
};
pub use quota::UsageMeter;
pub use schedule::RouteDay;
pub use service::{CommuteService, LocationInput, LocationView, RouteInput, RouteView};
