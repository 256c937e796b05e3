use chrono::{DateTime, Days, Utc};
use chrono_tz::Tz;
use std::sync::Arc;

pub type NowProvider = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Wall-clock source; day keys are computed in the configured timezone.
#[derive(Clone)]
pub struct Clock {
    now_provider: NowProvider,
    timezone: Tz,
}

impl Clock {
    pub fn new(timezone: Tz) -> Self {
        Self {
            now_provider: Arc::new(Utc::now),
            timezone,
        }
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    pub fn now(&self) -> DateTime<Utc> {
        (self.now_provider)()
    }

    pub fn now_ms(&self) -> i64 {
        self.now().timestamp_millis()
    }

    pub fn today_key(&self) -> String {
        self.now()
            .with_timezone(&self.timezone)
            .date_naive()
            .format("%Y-%m-%d")
            .to_string()
    }

    /// The last `days` date keys ending today, oldest first.
    pub fn trailing_day_keys(&self, days: u64) -> Vec<String> {
        let today = self.now().with_timezone(&self.timezone).date_naive();
        (0..days)
            .rev()
            .filter_map(|offset| today.checked_sub_days(Days::new(offset)))
            .map(|date| date.format("%Y-%m-%d").to_string())
            .collect()
    }
}

impl std::fmt::Debug for Clock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Clock")
            .field("timezone", &self.timezone)
            .finish_non_exhaustive()
    }
}
