use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};
use std::fmt::Display;

/// Calendar distance between a purchase and a sale, e.g. `1y2m3d 4h`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HoldingPeriod {
    pub years: i32,
    pub months: i32,
    pub days: i32,
    pub hours: i32,
    pub minutes: i32,
    pub seconds: i32,
}

impl HoldingPeriod {
    pub fn between(a: NaiveDateTime, b: NaiveDateTime) -> Self {
        let (from, to) = if a > b { (b, a) } else { (a, b) };

        let mut period = HoldingPeriod {
            years: to.year() - from.year(),
            months: to.month() as i32 - from.month() as i32,
            days: to.day() as i32 - from.day() as i32,
            hours: to.hour() as i32 - from.hour() as i32,
            minutes: to.minute() as i32 - from.minute() as i32,
            seconds: to.second() as i32 - from.second() as i32,
        };

        if period.seconds < 0 {
            period.seconds += 60;
            period.minutes -= 1;
        }
        if period.minutes < 0 {
            period.minutes += 60;
            period.hours -= 1;
        }
        if period.hours < 0 {
            period.hours += 24;
            period.days -= 1;
        }
        if period.days < 0 {
            period.days += days_in_month(from.year(), from.month());
            period.months -= 1;
        }
        if period.months < 0 {
            period.months += 12;
            period.years -= 1;
        }

        period
    }
}

fn days_in_month(year: i32, month: u32) -> i32 {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|first| first.pred_opt())
        .map_or(31, |last| last.day() as i32)
}

impl Display for HoldingPeriod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut text = String::new();
        if self.years > 0 {
            text.push_str(&format!("{}y", self.years));
        }
        if self.months > 0 {
            text.push_str(&format!("{}m", self.months));
        }
        if self.days > 0 {
            text.push_str(&format!("{}d", self.days));
        }
        if self.hours > 0 {
            if !text.is_empty() {
                text.push(' ');
            }
            text.push_str(&format!("{}h", self.hours));
        }
        if self.minutes > 0 {
            text.push_str(&format!("{}m", self.minutes));
        }
        if self.seconds > 0 {
            text.push_str(&format!("{}s", self.seconds));
        }
        f.pad(&text)
    }
}
