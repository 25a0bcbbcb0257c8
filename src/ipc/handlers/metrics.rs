use crate::calc::{class_attendance_rate, class_dashboard, classify, Rated, DEFAULT_TOP_N};
use crate::calendar::AcademicYear;
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::{
    date_or_today, get_optional_f64, get_optional_settings, get_optional_str, get_optional_usize,
    require_db,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{Class, Student};
use crate::retention::{is_dropped_at, retention_30_day, retention_year_to_date};
use crate::settings::ColorThresholds;
use crate::store;
use rusqlite::Connection;
use serde_json::json;

fn load_class(conn: &Connection, class_id: &str) -> Result<(Class, Vec<Student>), HandlerErr> {
    let class = store::get_class(conn, class_id)
        .map_err(|e| HandlerErr::db("db_query_failed", e))?
        .ok_or_else(|| HandlerErr::not_found("class"))?;
    let students =
        store::load_class_students(conn, class_id).map_err(|e| HandlerErr::db("db_query_failed", e))?;
    Ok((class, students))
}

/// `params.classId`, else the selected class, else `None` (all classes).
fn class_scope(state: &AppState, params: &serde_json::Value) -> Result<Option<String>, HandlerErr> {
    Ok(get_optional_str(params, "classId")?
        .or_else(|| state.context.selected_class_id().map(|s| s.to_string())))
}

fn metrics_class(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let Some(class_id) = class_scope(state, params)? else {
        return Err(HandlerErr::bad_params("missing classId and no class is selected"));
    };
    let today = date_or_today(params, "today")?;
    let top_n = get_optional_usize(params, "topN")?.unwrap_or(DEFAULT_TOP_N);
    let (class, students) = load_class(conn, &class_id)?;
    let dashboard = class_dashboard(&class, &students, &state.config.calendar, today, top_n);
    serde_json::to_value(dashboard).map_err(|e| HandlerErr::new("internal", e.to_string()))
}

fn metrics_overview(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let today = date_or_today(params, "today")?;
    let overall = ColorThresholds::default();

    let classes = store::all_classes(conn).map_err(|e| HandlerErr::db("db_query_failed", e))?;
    let mut everyone: Vec<Student> = Vec::new();
    let mut rows = Vec::with_capacity(classes.len());
    for class in &classes {
        let students = store::load_class_students(conn, &class.id)
            .map_err(|e| HandlerErr::db("db_query_failed", e))?;
        let dropped = students.iter().filter(|s| is_dropped_at(s, today)).count();
        let retention = retention_30_day(&students, today);
        rows.push(json!({
            "classId": class.id,
            "name": class.name,
            "caceLevel": class.cace_level,
            "studentCount": students.len(),
            "activeCount": students.len() - dropped,
            "attendance": Rated::new(class_attendance_rate(&students), &class.thresholds),
            "retention30Day": {
                "rate": retention.rate,
                "retained": retention.retained,
                "baseline": retention.baseline,
                "color": classify(retention.rate, &class.thresholds),
            },
        }));
        everyone.extend(students);
    }

    let year = state.config.calendar.academic_year_for(today);
    let ytd = year.as_ref().map(|y| retention_year_to_date(&everyone, y, today));
    Ok(json!({
        "asOf": today,
        "academicYear": year,
        "classCount": classes.len(),
        "studentCount": everyone.len(),
        "activeCount": everyone.iter().filter(|s| !is_dropped_at(s, today)).count(),
        "attendance": Rated::new(class_attendance_rate(&everyone), &overall),
        "retention30Day": retention_30_day(&everyone, today),
        "retentionYearToDate": ytd,
        "classes": rows,
    }))
}

fn metrics_retention(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let today = date_or_today(params, "today")?;
    let calendar = &state.config.calendar;

    let (class, students) = match class_scope(state, params)? {
        Some(id) => {
            let (class, students) = load_class(conn, &id)?;
            (Some(class), students)
        }
        None => (
            None,
            store::load_all_students(conn).map_err(|e| HandlerErr::db("db_query_failed", e))?,
        ),
    };

    let year: Option<AcademicYear> = match get_optional_str(params, "academicYear")? {
        Some(label) => Some(
            calendar
                .parse_label(&label)
                .ok_or_else(|| HandlerErr::bad_params("academicYear must look like 2024-2025"))?,
        ),
        None => class
            .as_ref()
            .and_then(|c| calendar.parse_label(&c.academic_year))
            .or_else(|| calendar.academic_year_for(today)),
    };
    let thresholds = class.as_ref().map(|c| c.thresholds).unwrap_or_default();
    let thirty = retention_30_day(&students, today);
    let ytd = year.as_ref().map(|y| retention_year_to_date(&students, y, today));

    Ok(json!({
        "classId": class.as_ref().map(|c| c.id.clone()),
        "asOf": today,
        "academicYear": year,
        "thirtyDay": thirty,
        "thirtyDayColor": classify(thirty.rate, &thresholds),
        "yearInProgress": year.as_ref().map(|y| y.contains(today)),
        "yearToDate": ytd,
        "yearToDateColor": classify(ytd.as_ref().and_then(|r| r.rate), &thresholds),
    }))
}

fn metrics_classify(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let value = get_optional_f64(params, "value")?;
    let thresholds = match get_optional_settings::<ColorThresholds>(params, "thresholds")? {
        Some(t) => {
            t.validate()?;
            t
        }
        None => match get_optional_str(params, "classId")? {
            Some(id) => {
                let conn = require_db(state)?;
                store::get_class(conn, &id)
                    .map_err(|e| HandlerErr::db("db_query_failed", e))?
                    .ok_or_else(|| HandlerErr::not_found("class"))?
                    .thresholds
            }
            None => ColorThresholds::default(),
        },
    };
    Ok(json!({
        "value": value,
        "thresholds": thresholds,
        "category": classify(value, &thresholds),
    }))
}

fn calendar_academic_year(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let date = date_or_today(params, "date")?;
    let calendar = &state.config.calendar;
    let year = calendar
        .academic_year_for(date)
        .ok_or_else(|| HandlerErr::bad_params("date out of range"))?;
    Ok(json!({
        "date": date,
        "yearStart": format!("{:02}-{:02}", calendar.start_month(), calendar.start_day()),
        "academicYear": year,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "metrics.class" => metrics_class(state, &req.params),
        "metrics.overview" => metrics_overview(state, &req.params),
        "metrics.retention" => metrics_retention(state, &req.params),
        "metrics.classify" => metrics_classify(state, &req.params),
        "calendar.academicYear" => calendar_academic_year(state, &req.params),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
