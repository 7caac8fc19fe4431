//! Per-provider daily call quotas for the external services.

use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::domain::ApiUsage;
use crate::ports::{Clock, DatabaseService, PortError, PortResult};

impl ApiUsage {
    /// A counter that has never been used.
    pub fn fresh(provider: &str, now: DateTime<Utc>) -> Self {
        Self {
            provider: provider.to_string(),
            calls_today: 0,
            calls_total: 0,
            last_reset: now,
        }
    }

    /// Counts one call made at `now`. The daily count starts over once the
    /// UTC date has moved past the last reset.
    pub fn register_call(&mut self, now: DateTime<Utc>, daily_limit: i32) -> PortResult<()> {
        if now.date_naive() > self.last_reset.date_naive() {
            self.calls_today = 0;
            self.last_reset = now;
        }
        if self.calls_today >= daily_limit {
            return Err(PortError::QuotaExceeded(format!(
                "The {} service has reached capacity for today.",
                self.provider
            )));
        }
        self.calls_today += 1;
        self.calls_total += 1;
        Ok(())
    }
}

/// Charges calls to one provider's counter before an adapter goes out to it.
#[derive(Clone)]
pub struct UsageMeter {
    db: Arc<dyn DatabaseService>,
    clock: Arc<dyn Clock>,
    provider: &'static str,
    daily_limit: i32,
}

impl UsageMeter {
    pub fn new(
        db: Arc<dyn DatabaseService>,
        clock: Arc<dyn Clock>,
        provider: &'static str,
        daily_limit: i32,
    ) -> Self {
        Self {
            db,
            clock,
            provider,
            daily_limit,
        }
    }

    pub fn provider(&self) -> &'static str {
        self.provider
    }

    pub async fn charge(&self) -> PortResult<ApiUsage> {
        let usage = self
            .db
            .record_api_call(self.provider, self.daily_limit, self.clock.now())
            .await?;
        tracing::debug!(
            provider = self.provider,
            calls_today = usage.calls_today,
            "External API call recorded"
        );
        Ok(usage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn limit_is_enforced_within_a_day() {
        let morning = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
        let mut usage = ApiUsage::fresh("SendGrid", morning);
        usage.register_call(morning, 2).unwrap();
        usage.register_call(morning + Duration::hours(1), 2).unwrap();

        let err = usage.register_call(morning + Duration::hours(2), 2).unwrap_err();
        assert_eq!(
            err,
            PortError::QuotaExceeded("The SendGrid service has reached capacity for today.".into())
        );
        assert_eq!(usage.calls_today, 2);
        assert_eq!(usage.calls_total, 2);
    }

    #[test]
    fn counter_resets_on_a_new_date() {
        let late = Utc.with_ymd_and_hms(2024, 5, 1, 23, 59, 0).unwrap();
        let mut usage = ApiUsage::fresh("Weather", late);
        usage.register_call(late, 1).unwrap();
        assert!(usage.register_call(late, 1).is_err());

        let next_day = late + Duration::minutes(2);
        usage.register_call(next_day, 1).unwrap();
        assert_eq!(usage.calls_today, 1);
        assert_eq!(usage.calls_total, 2);
        assert_eq!(usage.last_reset, next_day);
    }
}
