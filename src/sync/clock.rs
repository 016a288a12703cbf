use chrono::{DateTime, Datelike, Local, Utc};

/// Source of "now" for passes. Swapped for a fixed clock in tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Year assumed for listing entries that carry a time but no year.
    fn current_year(&self) -> i32 {
        self.now().with_timezone(&Local).year()
    }
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
