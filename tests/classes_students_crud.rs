mod test_support;

use serde_json::json;
use test_support::{request_err, request_ok, spawn_sidecar, str_field, temp_dir};

fn count(conn: &rusqlite::Connection, sql: &str) -> i64 {
    conn.query_row(sql, [], |r| r.get(0)).expect("count query")
}

#[test]
fn class_and_student_lifecycle_with_cascading_delete() {
    let workspace = temp_dir("gradebook-crud");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let created = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "classes.create",
        json!({
            "name": "ESL Evening",
            "schedule": "Mon/Wed 6pm",
            "academicYear": "2024-2025",
            "caceLevel": 2
        }),
    );
    let class_id = str_field(&created, "classId");
    assert_eq!(created["class"]["caceLevel"], json!(2));
    assert_eq!(created["class"]["weights"]["casasReading"], json!(25));
    assert_eq!(created["class"]["thresholds"]["good"], json!(80));

    assert_eq!(
        request_err(
            &mut stdin,
            &mut reader,
            "3",
            "classes.create",
            json!({ "name": "Bad", "caceLevel": 9 }),
        ),
        "bad_params"
    );
    assert_eq!(
        request_err(&mut stdin, &mut reader, "4", "classes.create", json!({ "name": "  " })),
        "bad_params"
    );

    let mut student_ids = Vec::new();
    for (i, name) in ["Maria", "Tran", "Ahmed"].iter().enumerate() {
        let s = request_ok(
            &mut stdin,
            &mut reader,
            &format!("s{}", i),
            "students.create",
            json!({ "classId": class_id, "name": name, "enrolledOn": "2024-08-15" }),
        );
        assert_eq!(s["student"]["sortOrder"], json!(i));
        student_ids.push(str_field(&s, "studentId"));
    }

    let listing = request_ok(&mut stdin, &mut reader, "5", "classes.list", json!({}));
    let rows = listing["classes"].as_array().expect("classes array");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["studentCount"], json!(3));
    assert_eq!(rows[0]["activeCount"], json!(3));

    let renamed = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "students.update",
        json!({ "studentId": student_ids[1], "name": "Tran Van" }),
    );
    assert_eq!(renamed["student"]["name"], json!("Tran Van"));

    let dropped = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "students.setDropped",
        json!({ "studentId": student_ids[2], "dropped": true, "droppedOn": "2024-10-01" }),
    );
    assert_eq!(dropped["student"]["dropped"], json!(true));
    assert_eq!(dropped["student"]["droppedOn"], json!("2024-10-01"));

    let undropped = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "students.setDropped",
        json!({ "studentId": student_ids[2], "dropped": false }),
    );
    assert_eq!(undropped["student"]["dropped"], json!(false));
    assert!(undropped["student"]["droppedOn"].is_null());

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "attendance.mark",
        json!({ "studentId": student_ids[0], "date": "2024-09-02", "present": true }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "10",
        "scores.add",
        json!({ "studentId": student_ids[0], "subject": "Unit 1", "date": "2024-09-10", "score": 42, "maxScore": 50 }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "11",
        "casas.add",
        json!({ "studentId": student_ids[0], "kind": "reading", "date": "2024-09-20", "score": 205 }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "12",
        "notes.add",
        json!({ "studentId": student_ids[0], "text": "Moved up from Literacy" }),
    );

    let detail = request_ok(
        &mut stdin,
        &mut reader,
        "13",
        "students.get",
        json!({ "studentId": student_ids[0] }),
    );
    assert_eq!(detail["student"]["attendance"].as_array().map(|a| a.len()), Some(1));
    assert_eq!(detail["student"]["testScores"].as_array().map(|a| a.len()), Some(1));
    assert_eq!(detail["student"]["casasScores"][0]["kind"], json!("reading"));
    assert_eq!(detail["student"]["notes"].as_array().map(|a| a.len()), Some(1));

    let db_path = workspace.join("gradebook.sqlite3");
    let conn = rusqlite::Connection::open(&db_path).expect("open db");
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM attendance"), 1);

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "14",
        "classes.delete",
        json!({ "classId": class_id }),
    );
    for table in ["classes", "students", "attendance", "test_scores", "casas_scores", "student_notes"] {
        assert_eq!(
            count(&conn, &format!("SELECT COUNT(*) FROM {}", table)),
            0,
            "{} should be empty after class delete",
            table
        );
    }

    assert_eq!(
        request_err(
            &mut stdin,
            &mut reader,
            "15",
            "students.get",
            json!({ "studentId": student_ids[0] }),
        ),
        "not_found"
    );

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn record_validation_rejects_bad_input() {
    let workspace = temp_dir("gradebook-record-validation");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let class = request_ok(&mut stdin, &mut reader, "2", "classes.create", json!({ "name": "Morning" }));
    let class_id = str_field(&class, "classId");
    let student = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "students.create",
        json!({ "classId": class_id, "name": "Lina" }),
    );
    let student_id = str_field(&student, "studentId");

    let cases = [
        ("scores.add", json!({ "studentId": student_id, "subject": "Quiz", "score": 11, "maxScore": 10 })),
        ("scores.add", json!({ "studentId": student_id, "subject": "Quiz", "score": 5, "maxScore": 0 })),
        ("casas.add", json!({ "studentId": student_id, "kind": "writing", "score": 200 })),
        ("casas.add", json!({ "studentId": student_id, "kind": "reading", "score": 0 })),
        ("attendance.mark", json!({ "studentId": student_id, "date": "2024-13-01", "present": true })),
        ("notes.add", json!({ "studentId": student_id, "text": "" })),
    ];
    for (i, (method, params)) in cases.into_iter().enumerate() {
        assert_eq!(
            request_err(&mut stdin, &mut reader, &format!("v{}", i), method, params),
            "bad_params",
            "{}",
            method
        );
    }

    assert_eq!(
        request_err(
            &mut stdin,
            &mut reader,
            "4",
            "attendance.mark",
            json!({ "studentId": "missing", "date": "2024-09-01", "present": true }),
        ),
        "not_found"
    );

    // Marking the same day twice keeps one entry with the latest value.
    for (i, present) in [true, false].into_iter().enumerate() {
        let _ = request_ok(
            &mut stdin,
            &mut reader,
            &format!("m{}", i),
            "attendance.mark",
            json!({ "studentId": student_id, "date": "2024-09-03", "present": present }),
        );
    }
    let detail = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "students.get",
        json!({ "studentId": student_id }),
    );
    let attendance = detail["student"]["attendance"].as_array().expect("attendance");
    assert_eq!(attendance.len(), 1);
    assert_eq!(attendance[0]["present"], json!(false));

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "attendance.delete",
        json!({ "studentId": student_id, "date": "2024-09-03" }),
    );
    assert_eq!(
        request_err(
            &mut stdin,
            &mut reader,
            "7",
            "attendance.delete",
            json!({ "studentId": student_id, "date": "2024-09-03" }),
        ),
        "not_found"
    );

    let _ = std::fs::remove_dir_all(workspace);
}
