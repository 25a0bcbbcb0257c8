use chrono::{Datelike, Duration, NaiveDate};
use serde::Serialize;

/// Start of the academic year as a month/day. Feb 29 is not accepted so the
/// start exists in every year.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcademicCalendar {
    start_month: u32,
    start_day: u32,
}

impl Default for AcademicCalendar {
    fn default() -> Self {
        Self {
            start_month: 7,
            start_day: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AcademicYear {
    pub label: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl AcademicYear {
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

impl AcademicCalendar {
    pub fn new(start_month: u32, start_day: u32) -> Option<Self> {
        // 2001 is not a leap year.
        NaiveDate::from_ymd_opt(2001, start_month, start_day)?;
        Some(Self {
            start_month,
            start_day,
        })
    }

    /// Parses `MM-DD`.
    pub fn parse_month_day(raw: &str) -> Option<Self> {
        let (m, d) = raw.trim().split_once('-')?;
        Self::new(m.parse().ok()?, d.parse().ok()?)
    }

    pub fn start_month(&self) -> u32 {
        self.start_month
    }

    pub fn start_day(&self) -> u32 {
        self.start_day
    }

    fn year_start(&self, year: i32) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(year, self.start_month, self.start_day)
    }

    pub fn year_starting(&self, start_year: i32) -> Option<AcademicYear> {
        let start = self.year_start(start_year)?;
        let end = self.year_start(start_year.checked_add(1)?)?.pred_opt()?;
        Some(AcademicYear {
            label: format!("{}-{}", start_year, start_year + 1),
            start,
            end,
        })
    }

    pub fn academic_year_for(&self, date: NaiveDate) -> Option<AcademicYear> {
        let this_start = self.year_start(date.year())?;
        if date >= this_start {
            self.year_starting(date.year())
        } else {
            self.year_starting(date.year() - 1)
        }
    }

    /// Parses a `YYYY-YYYY` label; the second year must follow the first.
    pub fn parse_label(&self, label: &str) -> Option<AcademicYear> {
        let (a, b) = label.trim().split_once('-')?;
        let first: i32 = a.trim().parse().ok()?;
        let second: i32 = b.trim().parse().ok()?;
        if second != first.checked_add(1)? {
            return None;
        }
        self.year_starting(first)
    }
}

pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").ok()
}

pub fn days_before(date: NaiveDate, days: i64) -> NaiveDate {
    date.checked_sub_signed(Duration::days(days))
        .unwrap_or(NaiveDate::MIN)
}
