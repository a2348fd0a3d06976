// src/fetch/period.rs
use anyhow::{anyhow, Result};
use chrono::{Datelike, Local, NaiveDate};
use std::fmt;

/// Inclusive date range a report is requested for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportPeriod {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl ReportPeriod {
    /// First to last day of the month containing `today`.
    pub fn current_month(today: NaiveDate) -> Self {
        // day 1 and the month's own length always exist
        Self::month_of(today.year(), today.month()).unwrap_or(Self {
            start: today,
            end: today,
        })
    }

    pub fn today() -> Self {
        Self::current_month(Local::now().date_naive())
    }

    pub fn for_month(year: i32, month: u32) -> Result<Self> {
        Self::month_of(year, month).ok_or_else(|| anyhow!("invalid month {year}-{month:02}"))
    }

    /// Parse `YYYY-MM`.
    pub fn parse_month(s: &str) -> Result<Self> {
        let (y, m) = s
            .trim()
            .split_once('-')
            .ok_or_else(|| anyhow!("expected YYYY-MM, got {s:?}"))?;
        let year: i32 = y.parse().map_err(|_| anyhow!("bad year in {s:?}"))?;
        let month: u32 = m.parse().map_err(|_| anyhow!("bad month in {s:?}"))?;
        Self::for_month(year, month)
    }

    fn month_of(year: i32, month: u32) -> Option<Self> {
        let start = NaiveDate::from_ymd_opt(year, month, 1)?;
        let next = if month == 12 {
            NaiveDate::from_ymd_opt(year + 1, 1, 1)?
        } else {
            NaiveDate::from_ymd_opt(year, month + 1, 1)?
        };
        Some(Self {
            start,
            end: next.pred_opt()?,
        })
    }

    /// Dates as the portal's forms expect them (`dd/mm/YYYY`).
    pub fn form_dates(&self) -> (String, String) {
        (
            self.start.format("%d/%m/%Y").to_string(),
            self.end.format("%d/%m/%Y").to_string(),
        )
    }
}

impl fmt::Display for ReportPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (start, end) = self.form_dates();
        write!(f, "{start}..{end}")
    }
}
