//! Calendar windows
//!
//! A window is a closed date interval used to scope order listings and counts.
//! Monthly windows feed the statistics dashboard, the full-year window is the
//! default scope of the order listing.

use std::fmt;

use chrono::{Datelike, Local, NaiveDate};
use serde::Serialize;

pub const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// Both bounds are inclusive.
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

impl fmt::Display for DateWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} – {}",
            self.start.format(DATE_FORMAT),
            self.end.format(DATE_FORMAT)
        )
    }
}

fn first_day(year: i32, month: u32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, 1)
}

fn last_day(year: i32, month: u32) -> Option<NaiveDate> {
    let next = if month == 12 {
        first_day(year.checked_add(1)?, 1)
    } else {
        first_day(year, month + 1)
    };
    match next {
        Some(next) => next.pred_opt(),
        // December of the last year chrono can represent
        None => NaiveDate::from_ymd_opt(year, month, 31),
    }
}

fn month_window(year: i32, month: u32) -> Option<DateWindow> {
    Some(DateWindow::new(first_day(year, month)?, last_day(year, month)?))
}

/// One window per calendar month of `year`, January first. `None` when the
/// year is outside the supported calendar.
pub fn monthly_windows_for_year(year: i32) -> Option<Vec<DateWindow>> {
    (1..=12).map(|month| month_window(year, month)).collect()
}

/// January 1st to December 31st of `year`.
pub fn full_year_window(year: i32) -> Option<DateWindow> {
    Some(DateWindow::new(first_day(year, 1)?, last_day(year, 12)?))
}

pub fn current_year_window(today: NaiveDate) -> DateWindow {
    full_year_window(today.year()).unwrap_or(DateWindow::new(today, today))
}

pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// Builds a window from user supplied `YYYY-MM-DD` strings.
///
/// Input coming from the search form is never rejected: a missing or malformed
/// start falls back to the first day of the current year, a missing or malformed
/// end to the last day of the current year.
pub fn resolve_window(start: Option<&str>, end: Option<&str>, today: NaiveDate) -> DateWindow {
    let default = current_year_window(today);
    DateWindow::new(
        parse_or(start, default.start),
        parse_or(end, default.end),
    )
}

fn parse_or(value: Option<&str>, fallback: NaiveDate) -> NaiveDate {
    let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) else {
        return fallback;
    };

    match NaiveDate::parse_from_str(value, DATE_FORMAT) {
        Ok(date) => date,
        Err(e) => {
            tracing::warn!(value, error = %e, fallback = %fallback, "Unparseable date, using default");
            fallback
        }
    }
}
