//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `DatabaseService` port from the `core` crate. It handles all interactions
//! with the PostgreSQL database using `sqlx`.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;
use weather_to_ride_core::domain::{
    ApiUsage, Coordinates, DayForecast, Forecast, Location, NewLocation, NewRoute, NewUser, Route,
    User, UserCredentials, WeekdayMask,
};
use weather_to_ride_core::ports::{DatabaseService, PortError, PortResult};
use weather_to_ride_core::rules;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `DatabaseService` port.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }
}

//=========================================================================================
// Error Mapping
//=========================================================================================

const UNIQUE_VIOLATION: &str = "23505";

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

/// Maps `RowNotFound` to a `NotFound` naming the missing row.
fn missing(what: &str, id: impl std::fmt::Display) -> impl FnOnce(sqlx::Error) -> PortError {
    let message = format!("{what} {id} not found");
    move |e| match e {
        sqlx::Error::RowNotFound => PortError::NotFound(message),
        other => unexpected(other),
    }
}

/// Locks the owner's row for the rest of `tx` and counts the rows it holds in
/// `table`. Concurrent inserts for the same owner queue up behind the lock.
async fn lock_owner_and_count(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    user_id: Uuid,
    table: &str,
) -> PortResult<usize> {
    sqlx::query("SELECT id FROM users WHERE id = $1 FOR UPDATE")
        .bind(user_id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(unexpected)?
        .ok_or_else(|| PortError::NotFound(format!("User {user_id} not found")))?;

    let held: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table} WHERE user_id = $1"))
        .bind(user_id)
        .fetch_one(&mut **tx)
        .await
        .map_err(unexpected)?;
    Ok(usize::try_from(held).unwrap_or(usize::MAX))
}

fn user_conflict(e: sqlx::Error) -> PortError {
    if let sqlx::Error::Database(db_err) = &e {
        if db_err.code().as_deref() == Some(UNIQUE_VIOLATION) {
            return match db_err.constraint() {
                Some(c) if c.contains("phone") => {
                    PortError::Conflict("That phone number is already in use.".into())
                }
                _ => PortError::Conflict("That e-mail address is already in use.".into()),
            };
        }
    }
    unexpected(e)
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct UserRecord {
    id: Uuid,
    email: String,
    name: String,
    phone: String,
    email_confirmed: bool,
    phone_confirmed: bool,
    created_at: DateTime<Utc>,
}
impl UserRecord {
    fn to_domain(self) -> User {
        User {
            id: self.id,
            email: self.email,
            name: self.name,
            phone: self.phone,
            email_confirmed: self.email_confirmed,
            phone_confirmed: self.phone_confirmed,
            created_at: self.created_at,
        }
    }
}

#[derive(FromRow)]
struct CredentialsRecord {
    id: Uuid,
    email: String,
    password: String,
}

#[derive(FromRow)]
struct LocationRecord {
    id: Uuid,
    user_id: Uuid,
    name: String,
    lat: f64,
    lng: f64,
}
impl LocationRecord {
    fn to_domain(self) -> Location {
        Location {
            id: self.id,
            user_id: self.user_id,
            name: self.name,
            coordinates: Coordinates::new(self.lat, self.lng),
        }
    }
}

#[derive(FromRow)]
struct RouteRecord {
    id: Uuid,
    user_id: Uuid,
    name: String,
    start_location_id: Uuid,
    end_location_id: Uuid,
    departs_at: Option<NaiveTime>,
    days: i16,
}
impl RouteRecord {
    fn to_domain(self) -> PortResult<Route> {
        let days = u8::try_from(self.days)
            .ok()
            .and_then(WeekdayMask::from_bits)
            .ok_or_else(|| {
                PortError::Unexpected(format!("Route {} has an invalid day mask", self.id))
            })?;
        Ok(Route {
            id: self.id,
            user_id: self.user_id,
            name: self.name,
            start_location_id: self.start_location_id,
            end_location_id: self.end_location_id,
            departs_at: self.departs_at,
            days,
        })
    }
}

#[derive(FromRow)]
struct ForecastRecord {
    location_id: Uuid,
    issued_on: NaiveDate,
    days: Json<Vec<DayForecast>>,
    updated_at: DateTime<Utc>,
}
impl ForecastRecord {
    fn to_domain(self) -> PortResult<Forecast> {
        let count = self.days.0.len();
        let days = self.days.0.try_into().map_err(|_| {
            PortError::Unexpected(format!(
                "Forecast for location {} holds {count} days",
                self.location_id
            ))
        })?;
        Ok(Forecast {
            location_id: self.location_id,
            issued_on: self.issued_on,
            days,
            updated_at: self.updated_at,
        })
    }
}

#[derive(FromRow)]
struct ApiUsageRecord {
    provider: String,
    calls_today: i32,
    calls_total: i64,
    last_reset: DateTime<Utc>,
}
impl ApiUsageRecord {
    fn to_domain(self) -> ApiUsage {
        ApiUsage {
            provider: self.provider,
            calls_today: self.calls_today,
            calls_total: self.calls_total,
            last_reset: self.last_reset,
        }
    }
}

const USER_COLUMNS: &str =
    "id, email, name, phone, email_confirmed, phone_confirmed, created_at";
const LOCATION_COLUMNS: &str = "id, user_id, name, lat::float8 AS lat, lng::float8 AS lng";
const ROUTE_COLUMNS: &str =
    "id, user_id, name, start_location_id, end_location_id, departs_at, days";

//=========================================================================================
// `DatabaseService` Trait Implementation
//=========================================================================================

#[async_trait]
impl DatabaseService for DbAdapter {
    async fn create_user(&self, user: NewUser) -> PortResult<User> {
        let record = sqlx::query_as::<_, UserRecord>(&format!(
            "INSERT INTO users (id, email, password, name, phone) VALUES ($1, $2, $3, $4, $5) \
             RETURNING {USER_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(&user.email)
        .bind(&user.hashed_password)
        .bind(&user.name)
        .bind(&user.phone)
        .fetch_one(&self.pool)
        .await
        .map_err(user_conflict)?;
        Ok(record.to_domain())
    }

    async fn count_users(&self) -> PortResult<i64> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await
            .map_err(unexpected)
    }

    async fn get_user(&self, user_id: Uuid) -> PortResult<User> {
        let record = sqlx::query_as::<_, UserRecord>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(missing("User", user_id))?;
        Ok(record.to_domain())
    }

    async fn get_user_by_email(&self, email: &str) -> PortResult<UserCredentials> {
        let record = sqlx::query_as::<_, CredentialsRecord>(
            "SELECT id, email, password FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_one(&self.pool)
        .await
        .map_err(missing("User", email))?;
        Ok(UserCredentials {
            user_id: record.id,
            email: record.email,
            hashed_password: record.password,
        })
    }

    async fn confirm_email(&self, email: &str) -> PortResult<()> {
        let result = sqlx::query("UPDATE users SET email_confirmed = TRUE WHERE email = $1")
            .bind(email)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("User {email} not found")));
        }
        Ok(())
    }

    async fn update_password(&self, email: &str, hashed_password: &str) -> PortResult<()> {
        let result = sqlx::query("UPDATE users SET password = $1 WHERE email = $2")
            .bind(hashed_password)
            .bind(email)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("User {email} not found")));
        }
        Ok(())
    }

    async fn delete_user(&self, user_id: Uuid) -> PortResult<()> {
        // Sessions, keys, locations, routes and forecasts go with it.
        sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }

    async fn create_auth_session(
        &self,
        session_id: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()> {
        sqlx::query("INSERT INTO auth_sessions (id, user_id, expires_at) VALUES ($1, $2, $3)")
            .bind(session_id)
            .bind(user_id)
            .bind(expires_at)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }

    async fn validate_auth_session(&self, session_id: &str) -> PortResult<Uuid> {
        sqlx::query_scalar::<_, Uuid>(
            "SELECT user_id FROM auth_sessions WHERE id = $1 AND expires_at > NOW()",
        )
        .bind(session_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => PortError::Unauthorized,
            other => unexpected(other),
        })
    }

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()> {
        sqlx::query("DELETE FROM auth_sessions WHERE id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }

    async fn upsert_developer_key(&self, user_id: Uuid, key_digest: &str) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO developers (user_id, key_digest) VALUES ($1, $2) \
             ON CONFLICT (user_id) DO UPDATE SET key_digest = EXCLUDED.key_digest, created_at = NOW()",
        )
        .bind(user_id)
        .bind(key_digest)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(())
    }

    async fn get_developer_user(&self, key_digest: &str) -> PortResult<Uuid> {
        sqlx::query_scalar::<_, Uuid>("SELECT user_id FROM developers WHERE key_digest = $1")
            .bind(key_digest)
            .fetch_one(&self.pool)
            .await
            .map_err(missing("Developer key", "digest"))
    }

    async fn list_locations(&self, user_id: Uuid) -> PortResult<Vec<Location>> {
        let records = sqlx::query_as::<_, LocationRecord>(&format!(
            "SELECT {LOCATION_COLUMNS} FROM locations WHERE user_id = $1 ORDER BY created_at ASC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records.into_iter().map(LocationRecord::to_domain).collect())
    }

    async fn get_location(&self, location_id: Uuid) -> PortResult<Location> {
        let record = sqlx::query_as::<_, LocationRecord>(&format!(
            "SELECT {LOCATION_COLUMNS} FROM locations WHERE id = $1"
        ))
        .bind(location_id)
        .fetch_one(&self.pool)
        .await
        .map_err(missing("Location", location_id))?;
        Ok(record.to_domain())
    }

    async fn insert_location(
        &self,
        location: NewLocation,
        max_per_user: usize,
    ) -> PortResult<Location> {
        let mut tx = self.pool.begin().await.map_err(unexpected)?;
        if lock_owner_and_count(&mut tx, location.user_id, "locations").await? >= max_per_user {
            return Err(rules::location_limit_reached());
        }

        let record = sqlx::query_as::<_, LocationRecord>(&format!(
            "INSERT INTO locations (id, user_id, name, lat, lng) \
             VALUES ($1, $2, $3, $4::numeric, $5::numeric) RETURNING {LOCATION_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(location.user_id)
        .bind(&location.name)
        .bind(location.coordinates.lat)
        .bind(location.coordinates.lng)
        .fetch_one(&mut *tx)
        .await
        .map_err(unexpected)?;

        tx.commit().await.map_err(unexpected)?;
        Ok(record.to_domain())
    }

    async fn update_location(&self, location: &Location) -> PortResult<Location> {
        let record = sqlx::query_as::<_, LocationRecord>(&format!(
            "UPDATE locations SET name = $2, lat = $3::numeric, lng = $4::numeric \
             WHERE id = $1 RETURNING {LOCATION_COLUMNS}"
        ))
        .bind(location.id)
        .bind(&location.name)
        .bind(location.coordinates.lat)
        .bind(location.coordinates.lng)
        .fetch_one(&self.pool)
        .await
        .map_err(missing("Location", location.id))?;
        Ok(record.to_domain())
    }

    async fn delete_location(&self, location_id: Uuid) -> PortResult<()> {
        sqlx::query("DELETE FROM locations WHERE id = $1")
            .bind(location_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }

    async fn list_routes(&self, user_id: Uuid) -> PortResult<Vec<Route>> {
        let records = sqlx::query_as::<_, RouteRecord>(&format!(
            "SELECT {ROUTE_COLUMNS} FROM routes WHERE user_id = $1 ORDER BY created_at ASC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        records.into_iter().map(RouteRecord::to_domain).collect()
    }

    async fn get_route(&self, route_id: Uuid) -> PortResult<Route> {
        sqlx::query_as::<_, RouteRecord>(&format!(
            "SELECT {ROUTE_COLUMNS} FROM routes WHERE id = $1"
        ))
        .bind(route_id)
        .fetch_one(&self.pool)
        .await
        .map_err(missing("Route", route_id))?
        .to_domain()
    }

    async fn insert_route(&self, route: NewRoute, max_per_user: usize) -> PortResult<Route> {
        let mut tx = self.pool.begin().await.map_err(unexpected)?;
        if lock_owner_and_count(&mut tx, route.user_id, "routes").await? >= max_per_user {
            return Err(rules::route_limit_reached());
        }

        let record = sqlx::query_as::<_, RouteRecord>(&format!(
            "INSERT INTO routes (id, user_id, name, start_location_id, end_location_id, departs_at, days) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {ROUTE_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(route.user_id)
        .bind(&route.name)
        .bind(route.start_location_id)
        .bind(route.end_location_id)
        .bind(route.departs_at)
        .bind(i16::from(route.days.bits()))
        .fetch_one(&mut *tx)
        .await
        .map_err(unexpected)?;

        tx.commit().await.map_err(unexpected)?;
        record.to_domain()
    }

    async fn update_route(&self, route: &Route) -> PortResult<Route> {
        sqlx::query_as::<_, RouteRecord>(&format!(
            "UPDATE routes SET name = $2, start_location_id = $3, end_location_id = $4, \
             departs_at = $5, days = $6 WHERE id = $1 RETURNING {ROUTE_COLUMNS}"
        ))
        .bind(route.id)
        .bind(&route.name)
        .bind(route.start_location_id)
        .bind(route.end_location_id)
        .bind(route.departs_at)
        .bind(i16::from(route.days.bits()))
        .fetch_one(&self.pool)
        .await
        .map_err(missing("Route", route.id))?
        .to_domain()
    }

    async fn delete_route(&self, route_id: Uuid) -> PortResult<()> {
        sqlx::query("DELETE FROM routes WHERE id = $1")
            .bind(route_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }

    async fn get_forecast(&self, location_id: Uuid) -> PortResult<Option<Forecast>> {
        let record = sqlx::query_as::<_, ForecastRecord>(
            "SELECT location_id, issued_on, days, updated_at FROM forecasts WHERE location_id = $1",
        )
        .bind(location_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;
        record.map(ForecastRecord::to_domain).transpose()
    }

    async fn save_forecast(&self, forecast: &Forecast) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO forecasts (location_id, issued_on, days, updated_at) VALUES ($1, $2, $3, $4) \
             ON CONFLICT (location_id) DO UPDATE SET issued_on = EXCLUDED.issued_on, \
             days = EXCLUDED.days, updated_at = EXCLUDED.updated_at",
        )
        .bind(forecast.location_id)
        .bind(forecast.issued_on)
        .bind(Json(forecast.days.to_vec()))
        .bind(forecast.updated_at)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(())
    }

    async fn record_api_call(
        &self,
        provider: &str,
        daily_limit: i32,
        now: DateTime<Utc>,
    ) -> PortResult<ApiUsage> {
        let mut tx = self.pool.begin().await.map_err(unexpected)?;

        sqlx::query(
            "INSERT INTO api_usage (provider, calls_today, calls_total, last_reset) \
             VALUES ($1, 0, 0, $2) ON CONFLICT (provider) DO NOTHING",
        )
        .bind(provider)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(unexpected)?;

        let mut usage = sqlx::query_as::<_, ApiUsageRecord>(
            "SELECT provider, calls_today, calls_total, last_reset FROM api_usage \
             WHERE provider = $1 FOR UPDATE",
        )
        .bind(provider)
        .fetch_one(&mut *tx)
        .await
        .map_err(unexpected)?
        .to_domain();

        // Dropping the transaction on a refused call releases the row lock.
        usage.register_call(now, daily_limit)?;

        sqlx::query(
            "UPDATE api_usage SET calls_today = $2, calls_total = $3, last_reset = $4 \
             WHERE provider = $1",
        )
        .bind(&usage.provider)
        .bind(usage.calls_today)
        .bind(usage.calls_total)
        .bind(usage.last_reset)
        .execute(&mut *tx)
        .await
        .map_err(unexpected)?;

        tx.commit().await.map_err(unexpected)?;
        Ok(usage)
    }
}
