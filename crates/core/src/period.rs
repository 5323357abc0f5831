//! Calendar-month billing periods.

use chrono::{DateTime, Datelike, Days, Months, NaiveDate, NaiveTime, TimeZone, Utc};

use crate::error::{DomainError, DomainResult};

/// A closed calendar month, the unit invoices are generated for.
///
/// Both bounds are inclusive days: `start` is the first and `end` the last
/// calendar day of the month.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BillingPeriod {
    start: NaiveDate,
    end: NaiveDate,
}

impl BillingPeriod {
    /// Build the period for `year`/`month` (month is 1-based).
    pub fn new(year: i32, month: u32) -> DomainResult<Self> {
        if !(1..=12).contains(&month) {
            return Err(DomainError::validation(format!(
                "month must be within 1..=12, got {month}"
            )));
        }
        let start = NaiveDate::from_ymd_opt(year, month, 1)
            .ok_or_else(|| DomainError::validation(format!("year {year} out of range")))?;
        let end = start
            .checked_add_months(Months::new(1))
            .and_then(|next| next.checked_sub_days(Days::new(1)))
            .ok_or_else(|| DomainError::validation(format!("year {year} out of range")))?;
        Ok(Self { start, end })
    }

    /// The period containing `at`.
    pub fn containing(at: DateTime<Utc>) -> Self {
        let start = at.date_naive().with_day(1).unwrap_or(at.date_naive());
        let end = start
            .checked_add_months(Months::new(1))
            .and_then(|next| next.checked_sub_days(Days::new(1)))
            .unwrap_or(start);
        Self { start, end }
    }

    /// The calendar month before this one.
    pub fn previous(&self) -> DomainResult<Self> {
        let prev = self
            .start
            .checked_sub_months(Months::new(1))
            .ok_or_else(|| DomainError::validation("no month before the calendar start"))?;
        Self::new(prev.year(), prev.month())
    }

    pub fn year(&self) -> i32 {
        self.start.year()
    }

    pub fn month(&self) -> u32 {
        self.start.month()
    }

    /// First calendar day of the month.
    pub fn start(&self) -> NaiveDate {
        self.start
    }

    /// Last calendar day of the month.
    pub fn end(&self) -> NaiveDate {
        self.end
    }

    /// First day of the month at UTC midnight.
    pub fn start_utc(&self) -> DateTime<Utc> {
        Utc.from_utc_datetime(&self.start.and_time(NaiveTime::MIN))
    }

    /// Last day of the month at UTC midnight.
    pub fn end_utc(&self) -> DateTime<Utc> {
        Utc.from_utc_datetime(&self.end.and_time(NaiveTime::MIN))
    }

    /// Whether a fact timestamp falls into this month.
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at.year() == self.year() && at.month() == self.month()
    }
}

impl core::fmt::Display for BillingPeriod {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.start.format("%Y %B"))
    }
}
