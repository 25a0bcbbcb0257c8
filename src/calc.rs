use chrono::NaiveDate;
use serde::Serialize;
use std::cmp::Ordering;

use crate::calendar::{AcademicCalendar, AcademicYear};
use crate::model::{AttendanceEntry, CaceLevel, CasasKind, Class, Student};
use crate::retention::{is_dropped_at, retention_30_day, retention_year_to_date, RetentionResult};
use crate::settings::{ColorThresholds, RankingWeights};

pub const DEFAULT_TOP_N: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ColorCategory {
    Good,
    Warning,
    NeedsImprovement,
    Neutral,
}

pub fn classify(value: Option<f64>, thresholds: &ColorThresholds) -> ColorCategory {
    let Some(v) = value else {
        return ColorCategory::Neutral;
    };
    if v >= f64::from(thresholds.good) {
        ColorCategory::Good
    } else if v >= f64::from(thresholds.warning) {
        ColorCategory::Warning
    } else {
        ColorCategory::NeedsImprovement
    }
}

/// Present / recorded, in percent. `None` when nothing is recorded.
pub fn attendance_rate(entries: &[AttendanceEntry]) -> Option<f64> {
    if entries.is_empty() {
        return None;
    }
    let present = entries.iter().filter(|e| e.present).count();
    Some(100.0 * present as f64 / entries.len() as f64)
}

pub fn class_attendance_rate(students: &[Student]) -> Option<f64> {
    mean(students.iter().filter_map(|s| attendance_rate(&s.attendance)))
}

fn mean<I>(values: I) -> Option<f64>
where
    I: IntoIterator<Item = f64>,
{
    let mut n = 0usize;
    let mut sum = 0.0;
    for v in values {
        n += 1;
        sum += v;
    }
    if n == 0 {
        None
    } else {
        Some(sum / n as f64)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryValues {
    pub casas_reading: Option<f64>,
    pub casas_listening: Option<f64>,
    pub tests: Option<f64>,
    pub attendance: Option<f64>,
}

fn casas_percent(student: &Student, kind: CasasKind, target: f64) -> Option<f64> {
    if target <= 0.0 {
        return None;
    }
    let avg = mean(
        student
            .casas_scores
            .iter()
            .filter(|c| c.kind == kind)
            .map(|c| c.score),
    )?;
    Some((100.0 * avg / target).min(100.0))
}

fn test_percent(student: &Student) -> Option<f64> {
    mean(
        student
            .test_scores
            .iter()
            .filter(|t| t.max_score > 0.0)
            .map(|t| 100.0 * t.score / t.max_score),
    )
}

pub fn category_values(student: &Student, level: &CaceLevel) -> CategoryValues {
    CategoryValues {
        casas_reading: casas_percent(student, CasasKind::Reading, level.reading_target),
        casas_listening: casas_percent(student, CasasKind::Listening, level.listening_target),
        tests: test_percent(student),
        attendance: attendance_rate(&student.attendance),
    }
}

/// Weighted mean over the categories that have data; missing categories drop
/// out of both numerator and denominator.
pub fn composite_score(values: &CategoryValues, weights: &RankingWeights) -> Option<f64> {
    let pairs = [
        (weights.casas_reading, values.casas_reading),
        (weights.casas_listening, values.casas_listening),
        (weights.tests, values.tests),
        (weights.attendance, values.attendance),
    ];
    let mut weighted = 0.0;
    let mut total_weight = 0.0;
    for (w, v) in pairs {
        if let Some(v) = v {
            weighted += f64::from(w) * v;
            total_weight += f64::from(w);
        }
    }
    if total_weight > 0.0 {
        Some(weighted / total_weight)
    } else {
        None
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentWithStats {
    pub student_id: String,
    pub name: String,
    pub dropped: bool,
    #[serde(flatten)]
    pub values: CategoryValues,
    pub composite: Option<f64>,
    pub rank: Option<usize>,
    pub color: ColorCategory,
}

fn name_order(a: &StudentWithStats, b: &StudentWithStats) -> Ordering {
    a.name
        .to_lowercase()
        .cmp(&b.name.to_lowercase())
        .then_with(|| a.student_id.cmp(&b.student_id))
}

/// Ranked students first (1-based, contiguous, ties broken by name then id),
/// then unranked students by name. Students dropped as of `today` are never
/// ranked.
pub fn rank_students(
    students: &[Student],
    level: &CaceLevel,
    weights: &RankingWeights,
    thresholds: &ColorThresholds,
    today: NaiveDate,
) -> Vec<StudentWithStats> {
    let (mut ranked, mut unranked): (Vec<_>, Vec<_>) = students
        .iter()
        .map(|s| {
            let values = category_values(s, level);
            let composite = composite_score(&values, weights);
            StudentWithStats {
                student_id: s.id.clone(),
                name: s.name.clone(),
                dropped: is_dropped_at(s, today),
                values,
                composite,
                rank: None,
                color: classify(composite, thresholds),
            }
        })
        .partition(|s| s.composite.is_some() && !s.dropped);

    ranked.sort_by(|a, b| {
        let (sa, sb) = (a.composite.unwrap_or(0.0), b.composite.unwrap_or(0.0));
        sb.partial_cmp(&sa)
            .unwrap_or(Ordering::Equal)
            .then_with(|| name_order(a, b))
    });
    for (i, s) in ranked.iter_mut().enumerate() {
        s.rank = Some(i + 1);
    }
    unranked.sort_by(name_order);

    ranked.extend(unranked);
    ranked
}

pub fn top_performers(ranked: &[StudentWithStats], n: usize) -> Vec<StudentWithStats> {
    let mut out: Vec<_> = ranked.iter().filter(|s| s.rank.is_some()).cloned().collect();
    out.sort_by_key(|s| s.rank);
    out.truncate(n);
    out
}

/// The `n` lowest-ranked students below the warning threshold, worst first.
pub fn at_risk(
    ranked: &[StudentWithStats],
    thresholds: &ColorThresholds,
    n: usize,
) -> Vec<StudentWithStats> {
    let warning = f64::from(thresholds.warning);
    let mut out: Vec<_> = ranked
        .iter()
        .filter(|s| s.rank.is_some() && s.composite.map(|c| c < warning).unwrap_or(false))
        .cloned()
        .collect();
    out.sort_by(|a, b| b.rank.cmp(&a.rank));
    out.truncate(n);
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Rated {
    pub value: Option<f64>,
    pub color: ColorCategory,
}

impl Rated {
    pub fn new(value: Option<f64>, thresholds: &ColorThresholds) -> Self {
        Self {
            value,
            color: classify(value, thresholds),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RatedRetention {
    #[serde(flatten)]
    pub result: RetentionResult,
    pub color: ColorCategory,
}

impl RatedRetention {
    fn new(result: RetentionResult, thresholds: &ColorThresholds) -> Self {
        let color = classify(result.rate, thresholds);
        Self { result, color }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassDashboard {
    pub class_id: String,
    pub class_name: String,
    pub cace_level: CaceLevel,
    pub academic_year: Option<AcademicYear>,
    pub as_of: NaiveDate,
    pub student_count: usize,
    pub active_count: usize,
    pub dropped_count: usize,
    pub attendance: Rated,
    pub average_composite: Rated,
    pub retention_30_day: RatedRetention,
    pub retention_year_to_date: Option<RatedRetention>,
    pub students: Vec<StudentWithStats>,
    pub top_performers: Vec<StudentWithStats>,
    pub at_risk: Vec<StudentWithStats>,
}

/// Everything a class view shows, recomputed from the full record set.
pub fn class_dashboard(
    class: &Class,
    students: &[Student],
    calendar: &AcademicCalendar,
    today: NaiveDate,
    top_n: usize,
) -> ClassDashboard {
    let thresholds = &class.thresholds;
    let level = class.level();
    let ranked = rank_students(students, level, &class.weights, thresholds, today);
    let average_composite = mean(
        ranked
            .iter()
            .filter(|s| s.rank.is_some())
            .filter_map(|s| s.composite),
    );
    let dropped_count = students.iter().filter(|s| is_dropped_at(s, today)).count();

    let academic_year = calendar.parse_label(&class.academic_year);
    let retention_year_to_date = academic_year
        .as_ref()
        .map(|y| RatedRetention::new(retention_year_to_date(students, y, today), thresholds));

    ClassDashboard {
        class_id: class.id.clone(),
        class_name: class.name.clone(),
        cace_level: *level,
        academic_year,
        as_of: today,
        student_count: students.len(),
        active_count: students.len() - dropped_count,
        dropped_count,
        attendance: Rated::new(class_attendance_rate(students), thresholds),
        average_composite: Rated::new(average_composite, thresholds),
        retention_30_day: RatedRetention::new(retention_30_day(students, today), thresholds),
        retention_year_to_date,
        top_performers: top_performers(&ranked, top_n),
        at_risk: at_risk(&ranked, thresholds, top_n),
        students: ranked,
    }
}
