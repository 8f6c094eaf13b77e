use anyhow::{Result, anyhow};
use chrono::{Datelike, Local, Months, NaiveDate, NaiveDateTime, NaiveTime};
use std::fmt::Display;

/// Half-open `[start, end)` window of reported transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportPeriod {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl ReportPeriod {
    /// The whole calendar year.
    pub fn for_year(year: i32) -> Result<Self> {
        let start = NaiveDate::from_ymd_opt(year, 1, 1);
        let end = year
            .checked_add(1)
            .and_then(|next| NaiveDate::from_ymd_opt(next, 1, 1));
        match (start, end) {
            (Some(start), Some(end)) => Ok(Self {
                start: start.and_time(NaiveTime::MIN),
                end: end.and_time(NaiveTime::MIN),
            }),
            _ => Err(anyhow!("Invalid reporting year: {}", year)),
        }
    }

    /// The calendar year before the one `today` falls into.
    pub fn year_before(today: NaiveDate) -> Self {
        let end = NaiveDate::from_yo_opt(today.year(), 1).unwrap_or(today);
        let start = end
            .checked_sub_months(Months::new(12))
            .unwrap_or(NaiveDate::MIN);
        Self {
            start: start.and_time(NaiveTime::MIN),
            end: end.and_time(NaiveTime::MIN),
        }
    }

    /// The previous calendar year in local time.
    pub fn previous_year() -> Self {
        Self::year_before(Local::now().date_naive())
    }

    pub fn contains(&self, at: NaiveDateTime) -> bool {
        at >= self.start && at < self.end
    }

    /// True for moments before the window opens.
    pub fn precedes(&self, at: NaiveDateTime) -> bool {
        at < self.start
    }
}

impl Display for ReportPeriod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} to {}",
            self.start.format("%Y-%m-%d"),
            self.end.format("%Y-%m-%d")
        )
    }
}
