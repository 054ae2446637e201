//! Rolling four-week occupancy window.

use crate::models::Record;
use chrono::{Datelike, Duration, Local, NaiveDate};
use serde_json::Value;
use std::collections::HashSet;

/// Days covered by one analysis, today included
pub const WINDOW_DAYS: i64 = 28;

/// Booking-calendar statuses that mean the night is taken
pub const RESERVED_STATUSES: [&str; 2] = ["disable", "booking"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OccupancyWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
    /// (year, month) pairs touched by the window, in order
    pub months: Vec<(i32, u32)>,
}

impl OccupancyWindow {
    pub fn today() -> Self {
        Self::starting(Local::now().date_naive())
    }

    pub fn starting(start: NaiveDate) -> Self {
        let end = start + Duration::days(WINDOW_DAYS - 1);
        let mut months = Vec::new();
        let (mut year, mut month) = (start.year(), start.month());
        loop {
            months.push((year, month));
            if (year, month) == (end.year(), end.month()) {
                break;
            }
            if month == 12 {
                year += 1;
                month = 1;
            } else {
                month += 1;
            }
        }
        Self { start, end, months }
    }

    pub fn days(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.start.iter_days().take_while(move |d| *d <= self.end)
    }

    pub fn len(&self) -> usize {
        WINDOW_DAYS as usize
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// Reserved dates that fall inside the window
    pub fn reserved_days(&self, reserved: &HashSet<NaiveDate>) -> usize {
        self.days().filter(|d| reserved.contains(d)).count()
    }

    /// Percentage of window days reserved, rounded to two decimals
    pub fn rate(&self, reserved: &HashSet<NaiveDate>) -> f64 {
        let pct = self.reserved_days(reserved) as f64 / self.len() as f64 * 100.0;
        (pct * 100.0).round() / 100.0
    }

    /// Copies `row` and appends the analysis columns.
    pub fn annotate(&self, row: &Record, reserved: &HashSet<NaiveDate>) -> Record {
        let mut out = row.clone();
        out.entry("state").or_insert(Value::String(String::new()));
        out.insert(
            "analysis_start_date".into(),
            Value::String(self.start.format("%Y-%m-%d").to_string()),
        );
        out.insert(
            "analysis_end_date".into(),
            Value::String(self.end.format("%Y-%m-%d").to_string()),
        );
        out.insert("occupancy_rate_percent".into(), Value::from(self.rate(reserved)));
        out.insert(
            "total_reserved_days".into(),
            Value::from(self.reserved_days(reserved)),
        );
        out.insert("total_days_analyzed".into(), Value::from(self.len()));
        out.insert("months_analyzed".into(), Value::from(self.months.len()));
        out.insert(
            "analysis_date".into(),
            Value::String(Local::now().format("%Y-%m-%d %H:%M:%S").to_string()),
        );
        out
    }
}

/// Reserved dates in one month of a schedule response
pub fn reserved_dates(data: &Value) -> HashSet<NaiveDate> {
    data.get("schedule_list")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter(|day| {
            day.get("status")
                .and_then(Value::as_str)
                .is_some_and(|s| RESERVED_STATUSES.contains(&s))
        })
        .filter_map(|day| day.get("date").and_then(Value::as_str))
        .filter_map(|date| NaiveDate::parse_from_str(date, "%Y-%m-%d").ok())
        .collect()
}
