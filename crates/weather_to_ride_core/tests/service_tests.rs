//! Commute service behaviour against the in-memory ports.

use chrono::{Duration, FixedOffset, TimeZone, Utc};
use std::sync::Arc;
use uuid::Uuid;
use weather_to_ride_core::service::developer_key_digest;
use weather_to_ride_core::testing::{FixedClock, InMemoryDatabase, StubGeocoder, StubWeather};
use weather_to_ride_core::domain::{Coordinates, NewLocation, NewRoute, WeekdayMask};
use weather_to_ride_core::rules::{MAX_LOCATIONS, MAX_ROUTES};
use weather_to_ride_core::{
    CommuteService, DailyConditions, DatabaseService, LocationInput, NewUser, PortError,
    RouteInput, UsageMeter,
};

struct Harness {
    db: InMemoryDatabase,
    geocoder: StubGeocoder,
    weather: StubWeather,
    clock: FixedClock,
    service: CommuteService,
}

fn harness() -> Harness {
    let db = InMemoryDatabase::new();
    let geocoder = StubGeocoder::new()
        .with("home", 33.5186, -86.8104)
        .with("work", 33.5021, -86.8064)
        .with("gym", 33.4735, -86.7923)
        .with("park", 33.5207, -86.8025)
        .with("cafe", 33.5100, -86.8000)
        .with("store", 33.4900, -86.8100);
    let weather = StubWeather::new();
    // Wednesday, 2024-03-06.
    let clock = FixedClock::new(Utc.with_ymd_and_hms(2024, 3, 6, 12, 0, 0).unwrap());
    let service = CommuteService::new(
        Arc::new(db.clone()),
        Arc::new(geocoder.clone()),
        Arc::new(weather.clone()),
        Arc::new(clock.clone()),
        FixedOffset::east_opt(0).unwrap(),
    );
    Harness {
        db,
        geocoder,
        weather,
        clock,
        service,
    }
}

async fn user(h: &Harness, tag: &str) -> Uuid {
    h.db.create_user(NewUser {
        email: format!("{tag}@example.com"),
        name: tag.to_string(),
        phone: format!("205555{:04}", tag.len()),
        hashed_password: "hash".to_string(),
    })
    .await
    .unwrap()
    .id
}

fn place(name: &str, address: &str) -> LocationInput {
    LocationInput {
        name: name.to_string(),
        address: address.to_string(),
    }
}

fn commute(start: Uuid, end: Uuid, days: Vec<i64>) -> RouteInput {
    RouteInput {
        name: "Work commute".to_string(),
        start_location_id: start,
        end_location_id: end,
        days,
        departs_at: None,
    }
}

#[tokio::test]
async fn creating_a_location_geocodes_and_fetches_a_forecast() {
    let h = harness();
    let owner = user(&h, "ray").await;

    let view = h.service.create_location(owner, place("Home", "home")).await.unwrap();
    assert_eq!(view.location.name, "Home");
    assert_eq!(view.location.coordinates.lat, 33.5186);
    let forecast = view.forecast.expect("forecast");
    assert_eq!(forecast.days[0].icon, "wi-day-sunny");
    assert_eq!(forecast.days[0].recommendation, "Great day to ride!");
    assert_eq!(forecast.issued_on, h.service.today());
    assert_eq!(h.geocoder.calls(), 1);
    assert_eq!(h.weather.calls(), 1);
}

#[tokio::test]
async fn resolved_addresses_skip_the_geocoder() {
    let h = harness();
    let owner = user(&h, "ray").await;

    let view = h
        .service
        .create_location(owner, place("Bench", "<<<33.5,-86.8>>>"))
        .await
        .unwrap();
    assert_eq!(view.location.coordinates.lng, -86.8);
    assert_eq!(h.geocoder.calls(), 0);
}

#[tokio::test]
async fn location_rules_are_enforced() {
    let h = harness();
    let owner = user(&h, "ray").await;

    let err = h.service.create_location(owner, place("", "home")).await.unwrap_err();
    assert_eq!(err, PortError::Invalid("Location name cannot be blank.".into()));

    let err = h
        .service
        .create_location(owner, place("Nowhere", "atlantis"))
        .await
        .unwrap_err();
    assert_eq!(err, PortError::Invalid("Please make sure the address is valid.".into()));

    for address in ["home", "work", "gym", "park", "cafe"] {
        h.service.create_location(owner, place(address, address)).await.unwrap();
    }
    let err = h
        .service
        .create_location(owner, place("Store", "store"))
        .await
        .unwrap_err();
    assert_eq!(err, PortError::Invalid("Location limit has been reached.".into()));

    let err = h
        .service
        .create_location(Uuid::new_v4(), place("Home", "home"))
        .await
        .unwrap_err();
    assert_eq!(err, PortError::NotFound("User does not exist.".into()));
}

#[tokio::test]
async fn store_refuses_inserts_past_the_limit() {
    let h = harness();
    let owner = user(&h, "ray").await;
    for address in ["home", "work", "gym", "park"] {
        h.service.create_location(owner, place(address, address)).await.unwrap();
    }

    // Two requests that both passed the early count at four.
    let extra = |name: &str| NewLocation {
        user_id: owner,
        name: name.to_string(),
        coordinates: Coordinates::new(33.5, -86.8),
    };
    h.db.insert_location(extra("Cafe"), MAX_LOCATIONS).await.unwrap();
    let err = h
        .db
        .insert_location(extra("Store"), MAX_LOCATIONS)
        .await
        .unwrap_err();
    assert_eq!(err, PortError::Invalid("Location limit has been reached.".into()));
    assert_eq!(h.db.list_locations(owner).await.unwrap().len(), MAX_LOCATIONS);

    let (home, work) = {
        let held = h.db.list_locations(owner).await.unwrap();
        (held[0].id, held[1].id)
    };
    let route = |name: &str| NewRoute {
        user_id: owner,
        name: name.to_string(),
        start_location_id: home,
        end_location_id: work,
        departs_at: None,
        days: WeekdayMask::from_day_indices(&[0]).unwrap(),
    };
    for i in 0..MAX_ROUTES {
        h.db.insert_route(route(&format!("Route {i}")), MAX_ROUTES).await.unwrap();
    }
    let err = h.db.insert_route(route("One too many"), MAX_ROUTES).await.unwrap_err();
    assert_eq!(err, PortError::Invalid("Route limit has been reached.".into()));
}

#[tokio::test]
async fn concurrent_creates_stop_at_the_limit() {
    let h = harness();
    let owner = user(&h, "ray").await;
    for address in ["home", "work", "gym", "park"] {
        h.service.create_location(owner, place(address, address)).await.unwrap();
    }

    let (a, b) = tokio::join!(
        h.service.create_location(owner, place("Cafe", "cafe")),
        h.service.create_location(owner, place("Store", "store")),
    );
    assert_eq!(a.is_ok() as u8 + b.is_ok() as u8, 1);
    assert_eq!(h.db.list_locations(owner).await.unwrap().len(), MAX_LOCATIONS);
}

#[tokio::test]
async fn a_failed_forecast_does_not_block_the_location() {
    let h = harness();
    let owner = user(&h, "ray").await;
    h.weather.set_failing(true);

    let view = h.service.create_location(owner, place("Home", "home")).await.unwrap();
    assert!(view.forecast.is_none());
    assert_eq!(h.service.list_locations(owner).await.unwrap().len(), 1);
}

#[tokio::test]
async fn forecasts_are_cached_until_stale() {
    let h = harness();
    let owner = user(&h, "ray").await;
    h.service.create_location(owner, place("Home", "home")).await.unwrap();
    assert_eq!(h.weather.calls(), 1);

    h.clock.advance(Duration::seconds(900));
    h.service.list_locations(owner).await.unwrap();
    assert_eq!(h.weather.calls(), 1);

    h.clock.advance(Duration::seconds(1));
    let views = h.service.list_locations(owner).await.unwrap();
    assert_eq!(h.weather.calls(), 2);
    assert_eq!(views[0].forecast.as_ref().unwrap().updated_at, h.clock_now());
}

#[tokio::test]
async fn stale_forecasts_are_served_when_the_provider_fails() {
    let h = harness();
    let owner = user(&h, "ray").await;
    let created = h.service.create_location(owner, place("Home", "home")).await.unwrap();
    let first = created.forecast.unwrap();

    h.db.age_forecast(created.location.id, Duration::hours(1));
    h.weather.set_failing(true);

    let view = h.service.get_location(owner, created.location.id).await.unwrap();
    let served = view.forecast.unwrap();
    assert_eq!(served.days, first.days);
    assert!(served.updated_at < first.updated_at);
}

#[tokio::test]
async fn other_users_cannot_touch_a_location() {
    let h = harness();
    let owner = user(&h, "ray").await;
    let intruder = user(&h, "mallory").await;
    let home = h.service.create_location(owner, place("Home", "home")).await.unwrap();

    let err = h
        .service
        .delete_location(intruder, home.location.id)
        .await
        .unwrap_err();
    assert_eq!(err, PortError::Forbidden("Location does not belong to user.".into()));

    let err = h
        .service
        .update_location(intruder, home.location.id, place("Mine", "work"))
        .await
        .unwrap_err();
    assert_eq!(err, PortError::Forbidden("Location does not belong to user.".into()));
}

#[tokio::test]
async fn moving_a_location_refreshes_its_forecast() {
    let h = harness();
    let owner = user(&h, "ray").await;
    let home = h.service.create_location(owner, place("Home", "home")).await.unwrap();
    let resolved = home.location.coordinates.to_resolved_address();

    let renamed = h
        .service
        .update_location(owner, home.location.id, place("House", &resolved))
        .await
        .unwrap();
    assert_eq!(renamed.location.name, "House");
    assert_eq!(h.weather.calls(), 1);

    let moved = h
        .service
        .update_location(owner, home.location.id, place("House", "work"))
        .await
        .unwrap();
    assert_eq!(moved.location.coordinates.lat, 33.5021);
    assert_eq!(h.weather.calls(), 2);
}

#[tokio::test]
async fn route_rules_are_enforced() {
    let h = harness();
    let owner = user(&h, "ray").await;
    let other = user(&h, "mallory").await;

    let home = h.service.create_location(owner, place("Home", "home")).await.unwrap();
    let err = h
        .service
        .create_route(owner, commute(home.location.id, home.location.id, vec![0]))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        PortError::Invalid("You must have at least 2 saved locations to create a route.".into())
    );

    let work = h.service.create_location(owner, place("Work", "work")).await.unwrap();
    let theirs = h.service.create_location(other, place("Gym", "gym")).await.unwrap();
    let (home, work) = (home.location.id, work.location.id);

    let err = h
        .service
        .create_route(owner, commute(theirs.location.id, work, vec![0]))
        .await
        .unwrap_err();
    assert_eq!(err, PortError::Forbidden("Location 1 does not belong to user.".into()));

    let err = h
        .service
        .create_route(owner, commute(home, theirs.location.id, vec![0]))
        .await
        .unwrap_err();
    assert_eq!(err, PortError::Forbidden("Location 2 does not belong to user.".into()));

    let err = h
        .service
        .create_route(owner, commute(home, home, vec![0]))
        .await
        .unwrap_err();
    assert_eq!(err, PortError::Invalid("The two locations must be different.".into()));

    let err = h
        .service
        .create_route(owner, commute(home, work, vec![]))
        .await
        .unwrap_err();
    assert_eq!(err, PortError::Invalid("Days are required.".into()));

    let err = h
        .service
        .create_route(owner, commute(home, work, vec![3, 9]))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        PortError::Invalid("Encountered day in list that was outside of allowable range [0-6]".into())
    );

    for _ in 0..5 {
        h.service
            .create_route(owner, commute(home, work, vec![0, 1, 2, 3, 4]))
            .await
            .unwrap();
    }
    let err = h
        .service
        .create_route(owner, commute(work, home, vec![5]))
        .await
        .unwrap_err();
    assert_eq!(err, PortError::Invalid("Route limit has been reached.".into()));
}

#[tokio::test]
async fn routes_pair_active_days_with_forecast_slots() {
    let h = harness();
    let owner = user(&h, "ray").await;
    h.weather.set_day(
        5,
        DailyConditions {
            icon: "rain".to_string(),
            summary: "Rain all day.".to_string(),
            precip_probability: 0.9,
            wind_speed: 10.0,
            temperature_low: Some(50.0),
            temperature_high: Some(60.0),
        },
    );
    let home = h.service.create_location(owner, place("Home", "home")).await.unwrap();
    let work = h.service.create_location(owner, place("Work", "work")).await.unwrap();
    let route = h
        .service
        .create_route(owner, commute(home.location.id, work.location.id, vec![0, 1, 2, 3, 4]))
        .await
        .unwrap();

    let views = h.service.list_routes(owner).await.unwrap();
    assert_eq!(views.len(), 1);
    let view = &views[0];
    assert_eq!(view.route.id, route.id);
    assert_eq!(view.start.location.name, "Home");
    assert_eq!(view.end.location.name, "Work");

    let labels: Vec<_> = view.outlook.iter().map(|d| d.label.as_str()).collect();
    assert_eq!(labels, ["Today", "Tomorrow", "Friday", "Monday", "Tuesday"]);

    // Monday is slot 5, where the rain is.
    let monday = &view.outlook[3];
    assert_eq!(monday.start.as_ref().unwrap().icon, "wi-rain");
    assert!(monday.end.as_ref().unwrap().recommendation.starts_with("Not a good day"));

    let single = h.service.get_route(owner, route.id).await.unwrap();
    assert_eq!(single.outlook, view.outlook);
}

#[tokio::test]
async fn updating_and_deleting_routes_checks_ownership() {
    let h = harness();
    let owner = user(&h, "ray").await;
    let other = user(&h, "mallory").await;
    let home = h.service.create_location(owner, place("Home", "home")).await.unwrap();
    let work = h.service.create_location(owner, place("Work", "work")).await.unwrap();
    let (home, work) = (home.location.id, work.location.id);
    let route = h
        .service
        .create_route(owner, commute(home, work, vec![0]))
        .await
        .unwrap();

    let updated = h
        .service
        .update_route(owner, route.id, commute(work, home, vec![5, 6]))
        .await
        .unwrap();
    assert_eq!(updated.start_location_id, work);
    assert_eq!(updated.days.day_indices(), vec![5, 6]);

    let err = h
        .service
        .update_route(other, route.id, commute(home, work, vec![1]))
        .await
        .unwrap_err();
    assert_eq!(err, PortError::Forbidden("Route does not belong to user.".into()));

    let err = h.service.delete_route(other, route.id).await.unwrap_err();
    assert_eq!(err, PortError::Forbidden("Route does not belong to user.".into()));

    let err = h.service.delete_route(owner, Uuid::new_v4()).await.unwrap_err();
    assert_eq!(err, PortError::NotFound("Route does not exist.".into()));

    let deleted = h.service.delete_route(owner, route.id).await.unwrap();
    assert_eq!(deleted.id, route.id);
    assert!(h.service.list_routes(owner).await.unwrap().is_empty());
}

#[tokio::test]
async fn deleting_a_location_cascades() {
    let h = harness();
    let owner = user(&h, "ray").await;
    let home = h.service.create_location(owner, place("Home", "home")).await.unwrap();
    let work = h.service.create_location(owner, place("Work", "work")).await.unwrap();
    let gym = h.service.create_location(owner, place("Gym", "gym")).await.unwrap();
    let (home, work, gym) = (home.location.id, work.location.id, gym.location.id);
    h.service.create_route(owner, commute(home, work, vec![0])).await.unwrap();
    let kept = h.service.create_route(owner, commute(gym, work, vec![2])).await.unwrap();
    assert_eq!(h.db.forecast_count(), 3);

    h.service.delete_location(owner, home).await.unwrap();

    let routes = h.service.list_routes(owner).await.unwrap();
    assert_eq!(routes.len(), 1);
    assert_eq!(routes[0].route.id, kept.id);
    assert_eq!(h.db.forecast_count(), 2);
}

#[tokio::test]
async fn developer_keys_resolve_to_their_owner() {
    let h = harness();
    let owner = user(&h, "ray").await;
    h.db.upsert_developer_key(owner, &developer_key_digest("secret-key"))
        .await
        .unwrap();

    let user = h.service.resolve_developer("secret-key").await.unwrap();
    assert_eq!(user.id, owner);

    let err = h.service.resolve_developer("wrong").await.unwrap_err();
    assert_eq!(err, PortError::Forbidden("The API key is invalid.".into()));
}

#[tokio::test]
async fn deleting_an_account_removes_everything() {
    let h = harness();
    let owner = user(&h, "ray").await;
    let home = h.service.create_location(owner, place("Home", "home")).await.unwrap();
    let work = h.service.create_location(owner, place("Work", "work")).await.unwrap();
    h.service
        .create_route(owner, commute(home.location.id, work.location.id, vec![0]))
        .await
        .unwrap();

    h.service.delete_account(owner).await.unwrap();

    assert!(h.db.list_locations(owner).await.unwrap().is_empty());
    assert!(h.db.list_routes(owner).await.unwrap().is_empty());
    assert_eq!(h.db.forecast_count(), 0);
    assert_eq!(
        h.service.resolve_user(owner).await.unwrap_err(),
        PortError::NotFound("User does not exist.".into())
    );
}

#[tokio::test]
async fn usage_meter_counts_against_the_daily_limit() {
    let h = harness();
    let meter = UsageMeter::new(Arc::new(h.db.clone()), Arc::new(h.clock.clone()), "Geocoding", 2);

    meter.charge().await.unwrap();
    let usage = meter.charge().await.unwrap();
    assert_eq!(usage.calls_today, 2);
    assert!(matches!(meter.charge().await, Err(PortError::QuotaExceeded(_))));

    h.clock.advance(Duration::days(1));
    let usage = meter.charge().await.unwrap();
    assert_eq!(usage.calls_today, 1);
    assert_eq!(h.db.usage("Geocoding").unwrap().calls_total, 3);
}

impl Harness {
    fn clock_now(&self) -> chrono::DateTime<Utc> {
        use weather_to_ride_core::Clock;
        self.clock.now()
    }
}
