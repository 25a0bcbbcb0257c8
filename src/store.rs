use anyhow::Context;
use chrono::{NaiveDate, Utc};
use rusqlite::{Connection, OptionalExtension, Row};
use serde::Serialize;
use std::collections::HashMap;
use uuid::Uuid;

use crate::model::{AttendanceEntry, CasasKind, CasasScore, Class, Note, Student, TestScore};
use crate::settings::{ClassSettings, ColorThresholds, RankingWeights};

const CLASS_COLUMNS: &str = "id, name, schedule, academic_year, cace_level,
    w_casas_reading, w_casas_listening, w_tests, w_attendance,
    good_threshold, warning_threshold, created_at";

const STUDENT_COLUMNS: &str = "id, class_id, name, enrolled_on, dropped, dropped_on, sort_order";

fn now_stamp() -> String {
    Utc::now().to_rfc3339()
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

fn class_from_row(r: &Row<'_>) -> rusqlite::Result<Class> {
    Ok(Class {
        id: r.get(0)?,
        name: r.get(1)?,
        schedule: r.get(2)?,
        academic_year: r.get(3)?,
        cace_level: r.get(4)?,
        weights: RankingWeights {
            casas_reading: r.get(5)?,
            casas_listening: r.get(6)?,
            tests: r.get(7)?,
            attendance: r.get(8)?,
        },
        thresholds: ColorThresholds {
            good: r.get(9)?,
            warning: r.get(10)?,
        },
        created_at: r.get(11)?,
    })
}

fn student_from_row(r: &Row<'_>) -> rusqlite::Result<Student> {
    Ok(Student {
        id: r.get(0)?,
        class_id: r.get(1)?,
        name: r.get(2)?,
        enrolled_on: r.get(3)?,
        dropped: r.get::<_, i64>(4)? != 0,
        dropped_on: r.get(5)?,
        sort_order: r.get(6)?,
        attendance: Vec::new(),
        test_scores: Vec::new(),
        casas_scores: Vec::new(),
        notes: Vec::new(),
    })
}

// ---- classes ----

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassListing {
    #[serde(flatten)]
    pub class: Class,
    pub student_count: i64,
    pub active_count: i64,
}

#[derive(Debug, Clone)]
pub struct NewClass {
    pub name: String,
    pub schedule: String,
    pub academic_year: String,
    pub cace_level: u8,
    pub settings: ClassSettings,
}

#[derive(Debug, Clone, Default)]
pub struct ClassPatch {
    pub name: Option<String>,
    pub schedule: Option<String>,
    pub academic_year: Option<String>,
    pub cace_level: Option<u8>,
}

pub fn class_exists(conn: &Connection, class_id: &str) -> anyhow::Result<bool> {
    Ok(conn
        .query_row("SELECT 1 FROM classes WHERE id = ?", [class_id], |r| {
            r.get::<_, i64>(0)
        })
        .optional()?
        .is_some())
}

pub fn list_classes(conn: &Connection) -> anyhow::Result<Vec<ClassListing>> {
    // Correlated subqueries keep the counts independent of each other.
    let sql = format!(
        "SELECT {CLASS_COLUMNS},
           (SELECT COUNT(*) FROM students s WHERE s.class_id = c.id),
           (SELECT COUNT(*) FROM students s WHERE s.class_id = c.id AND s.dropped = 0)
         FROM classes c
         ORDER BY c.name, c.id"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], |r| {
            Ok(ClassListing {
                class: class_from_row(r)?,
                student_count: r.get(12)?,
                active_count: r.get(13)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn get_class(conn: &Connection, class_id: &str) -> anyhow::Result<Option<Class>> {
    let sql = format!("SELECT {CLASS_COLUMNS} FROM classes WHERE id = ?");
    Ok(conn.query_row(&sql, [class_id], class_from_row).optional()?)
}

pub fn all_classes(conn: &Connection) -> anyhow::Result<Vec<Class>> {
    let sql = format!("SELECT {CLASS_COLUMNS} FROM classes ORDER BY name, id");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], class_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn insert_class(conn: &Connection, class: &Class) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO classes(
           id, name, schedule, academic_year, cace_level,
           w_casas_reading, w_casas_listening, w_tests, w_attendance,
           good_threshold, warning_threshold, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        rusqlite::params![
            class.id,
            class.name,
            class.schedule,
            class.academic_year,
            class.cace_level,
            class.weights.casas_reading,
            class.weights.casas_listening,
            class.weights.tests,
            class.weights.attendance,
            class.thresholds.good,
            class.thresholds.warning,
            class.created_at,
        ],
    )
    .with_context(|| format!("failed to insert class {}", class.id))?;
    Ok(())
}

pub fn create_class(conn: &Connection, new: &NewClass) -> anyhow::Result<Class> {
    let class = Class {
        id: new_id(),
        name: new.name.clone(),
        schedule: new.schedule.clone(),
        academic_year: new.academic_year.clone(),
        cace_level: new.cace_level,
        weights: new.settings.weights,
        thresholds: new.settings.thresholds,
        created_at: now_stamp(),
    };
    insert_class(conn, &class)?;
    Ok(class)
}

pub fn update_class(
    conn: &Connection,
    class_id: &str,
    patch: &ClassPatch,
) -> anyhow::Result<Option<Class>> {
    let Some(mut class) = get_class(conn, class_id)? else {
        return Ok(None);
    };
    if let Some(v) = &patch.name {
        class.name = v.clone();
    }
    if let Some(v) = &patch.schedule {
        class.schedule = v.clone();
    }
    if let Some(v) = &patch.academic_year {
        class.academic_year = v.clone();
    }
    if let Some(v) = patch.cace_level {
        class.cace_level = v;
    }
    conn.execute(
        "UPDATE classes SET name = ?, schedule = ?, academic_year = ?, cace_level = ? WHERE id = ?",
        (
            &class.name,
            &class.schedule,
            &class.academic_year,
            class.cace_level,
            class_id,
        ),
    )?;
    Ok(Some(class))
}

/// Callers validate `settings` first; this writes them as given.
pub fn update_class_settings(
    conn: &Connection,
    class_id: &str,
    settings: &ClassSettings,
) -> anyhow::Result<Option<Class>> {
    let changed = conn.execute(
        "UPDATE classes
         SET w_casas_reading = ?, w_casas_listening = ?, w_tests = ?, w_attendance = ?,
             good_threshold = ?, warning_threshold = ?
         WHERE id = ?",
        rusqlite::params![
            settings.weights.casas_reading,
            settings.weights.casas_listening,
            settings.weights.tests,
            settings.weights.attendance,
            settings.thresholds.good,
            settings.thresholds.warning,
            class_id,
        ],
    )?;
    if changed == 0 {
        return Ok(None);
    }
    get_class(conn, class_id)
}

const MEASUREMENT_TABLES: [&str; 4] = ["attendance", "test_scores", "casas_scores", "student_notes"];

/// Deletes the class, its students and all of their measurements.
pub fn delete_class(conn: &Connection, class_id: &str) -> anyhow::Result<bool> {
    if !class_exists(conn, class_id)? {
        return Ok(false);
    }
    let tx = conn.unchecked_transaction()?;
    // No ON DELETE CASCADE; children first.
    for table in MEASUREMENT_TABLES {
        tx.execute(
            &format!(
                "DELETE FROM {table}
                 WHERE student_id IN (SELECT id FROM students WHERE class_id = ?)"
            ),
            [class_id],
        )
        .with_context(|| format!("failed to delete from {table}"))?;
    }
    tx.execute("DELETE FROM students WHERE class_id = ?", [class_id])
        .context("failed to delete from students")?;
    tx.execute("DELETE FROM classes WHERE id = ?", [class_id])
        .context("failed to delete from classes")?;
    tx.commit()?;
    Ok(true)
}

// ---- students ----

#[derive(Debug, Clone, Default)]
pub struct StudentPatch {
    pub name: Option<String>,
    pub enrolled_on: Option<NaiveDate>,
}

pub fn student_exists(conn: &Connection, student_id: &str) -> anyhow::Result<bool> {
    Ok(conn
        .query_row("SELECT 1 FROM students WHERE id = ?", [student_id], |r| {
            r.get::<_, i64>(0)
        })
        .optional()?
        .is_some())
}

/// Students of one class without their measurements, in roster order.
pub fn list_students(conn: &Connection, class_id: &str) -> anyhow::Result<Vec<Student>> {
    let sql = format!(
        "SELECT {STUDENT_COLUMNS} FROM students WHERE class_id = ? ORDER BY sort_order, id"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([class_id], student_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn get_student(conn: &Connection, student_id: &str) -> anyhow::Result<Option<Student>> {
    let sql = format!("SELECT {STUDENT_COLUMNS} FROM students WHERE id = ?");
    let Some(student) = conn
        .query_row(&sql, [student_id], student_from_row)
        .optional()?
    else {
        return Ok(None);
    };
    let mut one = vec![student];
    attach_records(conn, &mut one, RecordScope::Student(student_id))?;
    Ok(one.pop())
}

pub fn create_student(
    conn: &Connection,
    class_id: &str,
    name: &str,
    enrolled_on: NaiveDate,
) -> anyhow::Result<Student> {
    let sort_order: i64 = conn.query_row(
        "SELECT COALESCE(MAX(sort_order) + 1, 0) FROM students WHERE class_id = ?",
        [class_id],
        |r| r.get(0),
    )?;
    let student = Student {
        id: new_id(),
        class_id: class_id.to_string(),
        name: name.to_string(),
        enrolled_on,
        dropped: false,
        dropped_on: None,
        sort_order,
        attendance: Vec::new(),
        test_scores: Vec::new(),
        casas_scores: Vec::new(),
        notes: Vec::new(),
    };
    insert_student_row(conn, &student)?;
    Ok(student)
}

fn insert_student_row(conn: &Connection, s: &Student) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO students(id, class_id, name, enrolled_on, dropped, dropped_on, sort_order, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
        rusqlite::params![
            s.id,
            s.class_id,
            s.name,
            s.enrolled_on,
            s.dropped as i64,
            s.dropped_on,
            s.sort_order,
            now_stamp(),
        ],
    )
    .with_context(|| format!("failed to insert student {}", s.id))?;
    Ok(())
}

pub fn update_student(
    conn: &Connection,
    student_id: &str,
    patch: &StudentPatch,
) -> anyhow::Result<Option<Student>> {
    if !student_exists(conn, student_id)? {
        return Ok(None);
    }
    if let Some(name) = &patch.name {
        conn.execute(
            "UPDATE students SET name = ?, updated_at = ? WHERE id = ?",
            (name, now_stamp(), student_id),
        )?;
    }
    if let Some(enrolled_on) = patch.enrolled_on {
        conn.execute(
            "UPDATE students SET enrolled_on = ?, updated_at = ? WHERE id = ?",
            (enrolled_on, now_stamp(), student_id),
        )?;
    }
    get_student(conn, student_id)
}

/// Un-dropping clears the recorded drop date.
pub fn set_student_dropped(
    conn: &Connection,
    student_id: &str,
    dropped: bool,
    dropped_on: Option<NaiveDate>,
) -> anyhow::Result<Option<Student>> {
    let dropped_on = if dropped { dropped_on } else { None };
    let changed = conn.execute(
        "UPDATE students SET dropped = ?, dropped_on = ?, updated_at = ? WHERE id = ?",
        (dropped as i64, dropped_on, now_stamp(), student_id),
    )?;
    if changed == 0 {
        return Ok(None);
    }
    get_student(conn, student_id)
}

pub fn delete_student(conn: &Connection, student_id: &str) -> anyhow::Result<bool> {
    if !student_exists(conn, student_id)? {
        return Ok(false);
    }
    let tx = conn.unchecked_transaction()?;
    for table in MEASUREMENT_TABLES {
        tx.execute(
            &format!("DELETE FROM {table} WHERE student_id = ?"),
            [student_id],
        )
        .with_context(|| format!("failed to delete from {table}"))?;
    }
    tx.execute("DELETE FROM students WHERE id = ?", [student_id])
        .context("failed to delete from students")?;
    tx.commit()?;
    Ok(true)
}

// ---- measurements ----

/// One entry per student and date; marking a date again replaces it.
pub fn upsert_attendance(
    conn: &Connection,
    student_id: &str,
    date: NaiveDate,
    present: bool,
) -> anyhow::Result<AttendanceEntry> {
    conn.execute(
        "INSERT INTO attendance(id, student_id, date, present) VALUES(?, ?, ?, ?)
         ON CONFLICT(student_id, date) DO UPDATE SET present = excluded.present",
        (new_id(), student_id, date, present as i64),
    )?;
    let entry = conn.query_row(
        "SELECT id, date, present FROM attendance WHERE student_id = ? AND date = ?",
        (student_id, date),
        |r| {
            Ok(AttendanceEntry {
                id: r.get(0)?,
                date: r.get(1)?,
                present: r.get::<_, i64>(2)? != 0,
            })
        },
    )?;
    Ok(entry)
}

pub fn delete_attendance(
    conn: &Connection,
    student_id: &str,
    date: NaiveDate,
) -> anyhow::Result<bool> {
    let n = conn.execute(
        "DELETE FROM attendance WHERE student_id = ? AND date = ?",
        (student_id, date),
    )?;
    Ok(n > 0)
}

pub fn add_test_score(
    conn: &Connection,
    student_id: &str,
    subject: &str,
    date: NaiveDate,
    score: f64,
    max_score: f64,
) -> anyhow::Result<TestScore> {
    let t = TestScore {
        id: new_id(),
        subject: subject.to_string(),
        date,
        score,
        max_score,
    };
    insert_test_score(conn, student_id, &t)?;
    Ok(t)
}

fn insert_test_score(conn: &Connection, student_id: &str, t: &TestScore) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO test_scores(id, student_id, subject, date, score, max_score)
         VALUES(?, ?, ?, ?, ?, ?)",
        (&t.id, student_id, &t.subject, t.date, t.score, t.max_score),
    )?;
    Ok(())
}

pub fn add_casas_score(
    conn: &Connection,
    student_id: &str,
    kind: CasasKind,
    date: NaiveDate,
    score: f64,
) -> anyhow::Result<CasasScore> {
    let c = CasasScore {
        id: new_id(),
        kind,
        date,
        score,
    };
    insert_casas_score(conn, student_id, &c)?;
    Ok(c)
}

fn insert_casas_score(conn: &Connection, student_id: &str, c: &CasasScore) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO casas_scores(id, student_id, kind, date, score) VALUES(?, ?, ?, ?, ?)",
        (&c.id, student_id, c.kind.as_str(), c.date, c.score),
    )?;
    Ok(())
}

pub fn add_note(
    conn: &Connection,
    student_id: &str,
    date: NaiveDate,
    text: &str,
) -> anyhow::Result<Note> {
    let n = Note {
        id: new_id(),
        date,
        text: text.to_string(),
    };
    insert_note(conn, student_id, &n)?;
    Ok(n)
}

fn insert_note(conn: &Connection, student_id: &str, n: &Note) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO student_notes(id, student_id, date, note) VALUES(?, ?, ?, ?)",
        (&n.id, student_id, n.date, &n.text),
    )?;
    Ok(())
}

/// Deletes one measurement row by id from `table`.
fn delete_measurement(conn: &Connection, table: &str, id: &str) -> anyhow::Result<bool> {
    let n = conn.execute(&format!("DELETE FROM {table} WHERE id = ?"), [id])?;
    Ok(n > 0)
}

pub fn delete_test_score(conn: &Connection, id: &str) -> anyhow::Result<bool> {
    delete_measurement(conn, "test_scores", id)
}

pub fn delete_casas_score(conn: &Connection, id: &str) -> anyhow::Result<bool> {
    delete_measurement(conn, "casas_scores", id)
}

pub fn delete_note(conn: &Connection, id: &str) -> anyhow::Result<bool> {
    delete_measurement(conn, "student_notes", id)
}

// ---- full record loads ----

enum RecordScope<'a> {
    All,
    Class(&'a str),
    Student(&'a str),
}

impl RecordScope<'_> {
    fn filter(&self) -> (&'static str, Option<&str>) {
        match self {
            RecordScope::All => ("1 = 1 OR ? IS NULL", None),
            RecordScope::Class(id) => ("s.class_id = ?", Some(*id)),
            RecordScope::Student(id) => ("s.id = ?", Some(*id)),
        }
    }
}

fn attach_records(
    conn: &Connection,
    students: &mut [Student],
    scope: RecordScope<'_>,
) -> anyhow::Result<()> {
    let index: HashMap<String, usize> = students
        .iter()
        .enumerate()
        .map(|(i, s)| (s.id.clone(), i))
        .collect();
    let (filter, arg) = scope.filter();

    let sql = format!(
        "SELECT m.student_id, m.id, m.date, m.present
         FROM attendance m JOIN students s ON s.id = m.student_id
         WHERE {filter} ORDER BY m.date, m.id"
    );
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([arg])?;
    while let Some(r) = rows.next()? {
        let sid: String = r.get(0)?;
        if let Some(&i) = index.get(&sid) {
            students[i].attendance.push(AttendanceEntry {
                id: r.get(1)?,
                date: r.get(2)?,
                present: r.get::<_, i64>(3)? != 0,
            });
        }
    }

    let sql = format!(
        "SELECT m.student_id, m.id, m.subject, m.date, m.score, m.max_score
         FROM test_scores m JOIN students s ON s.id = m.student_id
         WHERE {filter} ORDER BY m.date, m.id"
    );
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([arg])?;
    while let Some(r) = rows.next()? {
        let sid: String = r.get(0)?;
        if let Some(&i) = index.get(&sid) {
            students[i].test_scores.push(TestScore {
                id: r.get(1)?,
                subject: r.get(2)?,
                date: r.get(3)?,
                score: r.get(4)?,
                max_score: r.get(5)?,
            });
        }
    }

    let sql = format!(
        "SELECT m.student_id, m.id, m.kind, m.date, m.score
         FROM casas_scores m JOIN students s ON s.id = m.student_id
         WHERE {filter} ORDER BY m.date, m.id"
    );
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([arg])?;
    while let Some(r) = rows.next()? {
        let sid: String = r.get(0)?;
        let kind_raw: String = r.get(2)?;
        let Some(kind) = CasasKind::parse(&kind_raw) else {
            anyhow::bail!("unknown CASAS kind {:?} for student {}", kind_raw, sid);
        };
        if let Some(&i) = index.get(&sid) {
            students[i].casas_scores.push(CasasScore {
                id: r.get(1)?,
                kind,
                date: r.get(3)?,
                score: r.get(4)?,
            });
        }
    }

    let sql = format!(
        "SELECT m.student_id, m.id, m.date, m.note
         FROM student_notes m JOIN students s ON s.id = m.student_id
         WHERE {filter} ORDER BY m.date, m.id"
    );
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([arg])?;
    while let Some(r) = rows.next()? {
        let sid: String = r.get(0)?;
        if let Some(&i) = index.get(&sid) {
            students[i].notes.push(Note {
                id: r.get(1)?,
                date: r.get(2)?,
                text: r.get(3)?,
            });
        }
    }

    Ok(())
}

/// Students of one class with every measurement collection filled in.
pub fn load_class_students(conn: &Connection, class_id: &str) -> anyhow::Result<Vec<Student>> {
    let mut students = list_students(conn, class_id)?;
    attach_records(conn, &mut students, RecordScope::Class(class_id))?;
    Ok(students)
}

pub fn load_all_students(conn: &Connection) -> anyhow::Result<Vec<Student>> {
    let sql = format!("SELECT {STUDENT_COLUMNS} FROM students ORDER BY class_id, sort_order, id");
    let mut stmt = conn.prepare(&sql)?;
    let mut students = stmt
        .query_map([], student_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    attach_records(conn, &mut students, RecordScope::All)?;
    Ok(students)
}

// ---- wholesale replace (backup import) ----

pub fn clear_all(conn: &Connection) -> anyhow::Result<()> {
    for table in MEASUREMENT_TABLES {
        conn.execute(&format!("DELETE FROM {table}"), [])
            .with_context(|| format!("failed to clear {table}"))?;
    }
    conn.execute("DELETE FROM students", [])
        .context("failed to clear students")?;
    conn.execute("DELETE FROM classes", [])
        .context("failed to clear classes")?;
    Ok(())
}

/// Inserts a student and every measurement it carries, keeping all ids.
pub fn insert_student(conn: &Connection, s: &Student) -> anyhow::Result<()> {
    insert_student_row(conn, s)?;
    for a in &s.attendance {
        conn.execute(
            "INSERT INTO attendance(id, student_id, date, present) VALUES(?, ?, ?, ?)",
            (&a.id, &s.id, a.date, a.present as i64),
        )
        .with_context(|| format!("failed to insert attendance {}", a.id))?;
    }
    for t in &s.test_scores {
        insert_test_score(conn, &s.id, t)?;
    }
    for c in &s.casas_scores {
        insert_casas_score(conn, &s.id, c)?;
    }
    for n in &s.notes {
        insert_note(conn, &s.id, n)?;
    }
    Ok(())
}
