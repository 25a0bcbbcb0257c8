mod test_support;

use rusqlite::Connection;
use serde_json::json;
use test_support::{request_ok, spawn_sidecar, temp_dir};

fn has_column(conn: &Connection, table: &str, column: &str) -> bool {
    let mut stmt = conn
        .prepare(&format!("PRAGMA table_info({})", table))
        .expect("prepare table_info");
    let names: Vec<String> = stmt
        .query_map([], |r| r.get(1))
        .expect("query table_info")
        .collect::<Result<_, _>>()
        .expect("collect columns");
    names.iter().any(|n| n == column)
}

#[test]
fn older_workspace_gains_dropped_on_and_keeps_rows() {
    let workspace = temp_dir("gradebook-db-migration");
    let db_path = workspace.join("gradebook.sqlite3");
    {
        let conn = Connection::open(&db_path).expect("create old db");
        conn.execute_batch(
            "CREATE TABLE classes(
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                schedule TEXT NOT NULL DEFAULT '',
                academic_year TEXT NOT NULL,
                cace_level INTEGER NOT NULL,
                w_casas_reading INTEGER NOT NULL DEFAULT 25,
                w_casas_listening INTEGER NOT NULL DEFAULT 25,
                w_tests INTEGER NOT NULL DEFAULT 25,
                w_attendance INTEGER NOT NULL DEFAULT 25,
                good_threshold INTEGER NOT NULL DEFAULT 80,
                warning_threshold INTEGER NOT NULL DEFAULT 60,
                created_at TEXT NOT NULL
            );
            CREATE TABLE students(
                id TEXT PRIMARY KEY,
                class_id TEXT NOT NULL,
                name TEXT NOT NULL,
                enrolled_on TEXT NOT NULL,
                dropped INTEGER NOT NULL DEFAULT 0,
                sort_order INTEGER NOT NULL,
                updated_at TEXT
            );
            INSERT INTO classes(id, name, academic_year, cace_level, created_at)
                VALUES('c1', 'Old Class', '2023-2024', 1, '2023-07-01T00:00:00Z');
            INSERT INTO students(id, class_id, name, enrolled_on, dropped, sort_order)
                VALUES('s1', 'c1', 'Legacy Drop', '2023-08-01', 1, 0);",
        )
        .expect("seed old schema");
        assert!(!has_column(&conn, "students", "dropped_on"));
    }

    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let conn = Connection::open(&db_path).expect("reopen db");
    assert!(has_column(&conn, "students", "dropped_on"));

    let student = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "students.get",
        json!({ "studentId": "s1" }),
    );
    assert_eq!(student["student"]["dropped"], json!(true));
    assert!(student["student"]["droppedOn"].is_null());

    // An undated drop is in the baseline but never retained.
    let retention = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "metrics.retention",
        json!({ "classId": "c1", "today": "2023-10-01" }),
    );
    assert_eq!(retention["thirtyDay"]["baseline"], json!(1));
    assert_eq!(retention["thirtyDay"]["retained"], json!(0));

    let _ = std::fs::remove_dir_all(workspace);
}
