use chrono::NaiveDate;
use serde::Serialize;

use crate::calendar::{days_before, AcademicYear};
use crate::model::Student;

pub const RETENTION_WINDOW_DAYS: i64 = 30;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetentionResult {
    pub rate: Option<f64>,
    pub retained: usize,
    pub baseline: usize,
    pub from: NaiveDate,
    pub to: NaiveDate,
}

/// Whether `student` counted as active on `at`, judged from the point of view
/// of `evaluated_on`.
///
/// A drop without a recorded date is assumed to have happened after `at` but
/// no later than `evaluated_on`, so the student still counts toward the
/// baseline of any earlier window but is never retained.
pub fn is_active_at(student: &Student, at: NaiveDate, evaluated_on: NaiveDate) -> bool {
    if student.enrolled_on > at {
        return false;
    }
    if !student.dropped {
        return true;
    }
    match student.dropped_on {
        Some(dropped_on) => at < dropped_on,
        None => at < evaluated_on,
    }
}

/// Whether `student` has left the class as of `at`. A drop recorded for a
/// later date has not happened yet; an undated drop counts immediately.
pub fn is_dropped_at(student: &Student, at: NaiveDate) -> bool {
    student.dropped && student.dropped_on.map_or(true, |d| d <= at)
}

pub fn retention_between(students: &[Student], from: NaiveDate, to: NaiveDate) -> RetentionResult {
    let mut baseline = 0usize;
    let mut retained = 0usize;
    for s in students {
        if !is_active_at(s, from, to) {
            continue;
        }
        baseline += 1;
        if is_active_at(s, to, to) {
            retained += 1;
        }
    }
    let rate = if baseline > 0 {
        Some(100.0 * retained as f64 / baseline as f64)
    } else {
        None
    };
    RetentionResult {
        rate,
        retained,
        baseline,
        from,
        to,
    }
}

pub fn retention_30_day(students: &[Student], today: NaiveDate) -> RetentionResult {
    retention_between(
        students,
        days_before(today, RETENTION_WINDOW_DAYS),
        today,
    )
}

/// Retention since `year.start`, evaluated today or at year end if the year
/// is over. A year that has not started yet has no baseline.
pub fn retention_year_to_date(
    students: &[Student],
    year: &AcademicYear,
    today: NaiveDate,
) -> RetentionResult {
    if today < year.start {
        return RetentionResult {
            rate: None,
            retained: 0,
            baseline: 0,
            from: year.start,
            to: year.start,
        };
    }
    retention_between(students, year.start, today.min(year.end))
}
