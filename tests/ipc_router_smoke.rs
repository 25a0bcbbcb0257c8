mod test_support;

use serde_json::json;
use std::io::{BufRead, Write};
use test_support::{request, request_err, request_ok, spawn_sidecar, temp_dir};

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let workspace = temp_dir("gradebook-router-smoke");
    let backup_out = workspace.join("smoke-backup.zip");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let health = request_ok(&mut stdin, &mut reader, "1", "health", json!({}));
    assert!(health["version"].is_string());
    assert!(health["workspacePath"].is_null());

    // Nothing needing the store works before a workspace is selected.
    for (i, method) in ["classes.get", "students.list", "metrics.class", "metrics.overview", "backup.export"]
        .into_iter()
        .enumerate()
    {
        assert_eq!(
            request_err(&mut stdin, &mut reader, &format!("nw{}", i), method, json!({ "classId": "x", "path": "x" })),
            "no_workspace",
            "{}",
            method
        );
    }
    let empty = request_ok(&mut stdin, &mut reader, "2", "classes.list", json!({}));
    assert_eq!(empty["classes"], json!([]));

    // A regular file cannot hold a workspace.
    let blocker = workspace.join("not-a-directory");
    std::fs::write(&blocker, b"x").expect("write blocker");
    assert_eq!(
        request_err(
            &mut stdin,
            &mut reader,
            "3a",
            "workspace.select",
            json!({ "path": blocker.to_string_lossy() }),
        ),
        "db_open_failed"
    );
    let still_none = request_ok(&mut stdin, &mut reader, "3b", "health", json!({}));
    assert!(still_none["workspacePath"].is_null());

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let levels = request_ok(&mut stdin, &mut reader, "4", "classes.levels", json!({}));
    assert_eq!(levels["levels"].as_array().map(|l| l.len()), Some(6));
    assert_eq!(levels["levels"][5]["name"], json!("Advanced"));

    let families = [
        ("context.get", json!({})),
        ("classes.list", json!({})),
        ("metrics.overview", json!({})),
        ("metrics.retention", json!({})),
        ("metrics.classify", json!({ "value": 50 })),
        ("calendar.academicYear", json!({})),
        ("backup.export", json!({ "path": backup_out.to_string_lossy() })),
        ("sync.status", json!({})),
    ];
    for (i, (method, params)) in families.into_iter().enumerate() {
        let _ = request_ok(&mut stdin, &mut reader, &format!("f{}", i), method, params);
    }

    let unknown = request(&mut stdin, &mut reader, "5", "grades.explode", json!({}));
    assert_eq!(unknown["error"]["code"], json!("not_implemented"));

    writeln!(stdin, "{{ this is not json").expect("write garbage");
    stdin.flush().expect("flush garbage");
    let mut line = String::new();
    reader.read_line(&mut line).expect("read bad_json reply");
    let reply: serde_json::Value = serde_json::from_str(line.trim()).expect("parse reply");
    assert_eq!(reply["ok"], json!(false));
    assert_eq!(reply["error"]["code"], json!("bad_json"));

    // Still serving after the bad line.
    let _ = request_ok(&mut stdin, &mut reader, "6", "health", json!({}));

    let _ = std::fs::remove_dir_all(workspace);
}
