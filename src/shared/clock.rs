//! Wall clock in the configured fixed offset.

use std::sync::Arc;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Utc};

use crate::domain::entities::format_local;

pub trait Clock: Send + Sync {
    fn now_utc(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Always returns the same instant. For tests and reproducible runs.
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now_utc(&self) -> DateTime<Utc> {
        self.0
    }
}

/// A clock bound to the local fixed offset. Cheap to clone.
#[derive(Clone)]
pub struct LocalClock {
    clock: Arc<dyn Clock>,
    offset: FixedOffset,
}

impl LocalClock {
    pub fn new(clock: Arc<dyn Clock>, offset: FixedOffset) -> Self {
        Self { clock, offset }
    }

    pub fn system(offset: FixedOffset) -> Self {
        Self::new(Arc::new(SystemClock), offset)
    }

    pub fn fixed(now_utc: DateTime<Utc>, offset: FixedOffset) -> Self {
        Self::new(Arc::new(FixedClock(now_utc)), offset)
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    pub fn now(&self) -> DateTime<FixedOffset> {
        self.clock.now_utc().with_timezone(&self.offset)
    }

    pub fn now_naive(&self) -> NaiveDateTime {
        self.now().naive_local()
    }

    pub fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }

    /// `YYYYMMDD_HHMMSS` stamp used in file names.
    pub fn file_stamp(&self) -> String {
        self.now().format("%Y%m%d_%H%M%S").to_string()
    }

    pub fn format(&self, utc: DateTime<Utc>) -> String {
        format_local(utc, self.offset)
    }
}
