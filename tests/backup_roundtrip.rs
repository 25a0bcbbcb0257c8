mod test_support;

use serde_json::json;
use std::fs::File;
use std::io::Read;
use test_support::{request, request_ok, spawn_sidecar, str_field, temp_dir};

fn class_names(v: &serde_json::Value) -> Vec<String> {
    let mut names: Vec<String> = v["classes"]
        .as_array()
        .expect("classes")
        .iter()
        .map(|c| c["name"].as_str().expect("name").to_string())
        .collect();
    names.sort();
    names
}

#[test]
fn json_and_zip_exports_restore_the_store() {
    let workspace = temp_dir("gradebook-backup-src");
    let out_dir = temp_dir("gradebook-backup-out");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let class = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "classes.create",
        json!({ "name": "Citizenship", "academicYear": "2024-2025", "caceLevel": 4 }),
    );
    let class_id = str_field(&class, "classId");
    let student = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "students.create",
        json!({ "classId": class_id, "name": "Sofia", "enrolledOn": "2024-08-20" }),
    );
    let student_id = str_field(&student, "studentId");
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "casas.add",
        json!({ "studentId": student_id, "kind": "listening", "date": "2024-09-12", "score": 214 }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "attendance.mark",
        json!({ "studentId": student_id, "date": "2024-09-12", "present": true }),
    );

    let json_path = out_dir.join("gradebook-backup.json");
    let exported = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "backup.export",
        json!({ "path": json_path.to_string_lossy() }),
    );
    assert_eq!(exported["format"], json!("gradebook-backup-v1"));
    assert_eq!(exported["classCount"], json!(1));
    assert_eq!(exported["studentCount"], json!(1));

    let zip_path = out_dir.join("gradebook-backup.zip");
    let bundled = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "backup.export",
        json!({ "path": zip_path.to_string_lossy() }),
    );
    assert_eq!(bundled["format"], json!("gradebook-bundle-v1"));

    let f = File::open(&zip_path).expect("open bundle");
    let mut archive = zip::ZipArchive::new(f).expect("open zip archive");
    let mut manifest = String::new();
    archive
        .by_name("manifest.json")
        .expect("manifest entry")
        .read_to_string(&mut manifest)
        .expect("read manifest");
    assert!(manifest.contains("gradebook-bundle-v1"));
    assert!(manifest.contains("sha256"));
    archive.by_name("backup.json").expect("payload entry");

    // Diverge from the backup, then restore.
    let _ = request_ok(&mut stdin, &mut reader, "8", "classes.create", json!({ "name": "Scratch" }));
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "context.selectClass",
        json!({ "classId": class_id }),
    );

    let imported = request_ok(
        &mut stdin,
        &mut reader,
        "10",
        "backup.import",
        json!({ "path": json_path.to_string_lossy() }),
    );
    assert_eq!(imported["formatDetected"], json!("gradebook-backup-v1"));
    assert_eq!(imported["selectedClassId"], json!(class_id));
    let listing = request_ok(&mut stdin, &mut reader, "11", "classes.list", json!({}));
    assert_eq!(class_names(&listing), vec!["Citizenship".to_string()]);

    let restored = request_ok(
        &mut stdin,
        &mut reader,
        "12",
        "students.get",
        json!({ "studentId": student_id }),
    );
    assert_eq!(restored["student"]["casasScores"][0]["kind"], json!("listening"));
    assert_eq!(restored["student"]["attendance"][0]["present"], json!(true));

    // Restore the same data into a fresh workspace from the bundle.
    let workspace2 = temp_dir("gradebook-backup-dst");
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "13",
        "workspace.select",
        json!({ "path": workspace2.to_string_lossy() }),
    );
    let imported = request_ok(
        &mut stdin,
        &mut reader,
        "14",
        "backup.import",
        json!({ "path": zip_path.to_string_lossy() }),
    );
    assert_eq!(imported["formatDetected"], json!("gradebook-bundle-v1"));
    assert_eq!(imported["studentCount"], json!(1));
    let listing = request_ok(&mut stdin, &mut reader, "15", "classes.list", json!({}));
    assert_eq!(listing["classes"][0]["caceLevel"], json!(4));
    assert_eq!(listing["classes"][0]["studentCount"], json!(1));

    let _ = std::fs::remove_dir_all(workspace);
    let _ = std::fs::remove_dir_all(workspace2);
    let _ = std::fs::remove_dir_all(out_dir);
}

#[test]
fn rejected_imports_leave_the_store_untouched() {
    let workspace = temp_dir("gradebook-backup-bad");
    let out_dir = temp_dir("gradebook-backup-bad-in");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let class = request_ok(&mut stdin, &mut reader, "2", "classes.create", json!({ "name": "Keep Me" }));
    let class_id = str_field(&class, "classId");
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "students.create",
        json!({ "classId": class_id, "name": "Yusuf" }),
    );

    let garbage = out_dir.join("garbage.json");
    std::fs::write(&garbage, b"{ not json").expect("write garbage");

    let dangling = out_dir.join("dangling.json");
    let doc = json!({
        "format": "gradebook-backup-v1",
        "version": 1,
        "classes": [],
        "students": [{
            "id": "s1",
            "classId": "missing-class",
            "name": "Ghost",
            "enrolledOn": "2024-09-01",
            "dropped": false,
            "sortOrder": 0
        }]
    });
    std::fs::write(&dangling, doc.to_string()).expect("write dangling");

    let wrong_format = out_dir.join("wrong.json");
    std::fs::write(
        &wrong_format,
        json!({ "format": "something-else", "version": 1, "classes": [], "students": [] }).to_string(),
    )
    .expect("write wrong format");

    let bad_year = out_dir.join("bad-year.json");
    std::fs::write(
        &bad_year,
        json!({
            "format": "gradebook-backup-v1",
            "version": 1,
            "classes": [{
                "id": "c1",
                "name": "Odd Year",
                "academicYear": "garbage",
                "caceLevel": 2,
                "createdAt": "2024-07-01T00:00:00Z"
            }],
            "students": []
        })
        .to_string(),
    )
    .expect("write bad year");

    for (i, path) in [&garbage, &dangling, &wrong_format, &bad_year].into_iter().enumerate() {
        let res = request(
            &mut stdin,
            &mut reader,
            &format!("bad{}", i),
            "backup.import",
            json!({ "path": path.to_string_lossy() }),
        );
        assert_eq!(res["ok"], json!(false), "{}", path.display());
        assert_eq!(res["error"]["code"], json!("import_failed"));
    }

    let listing = request_ok(&mut stdin, &mut reader, "4", "classes.list", json!({}));
    assert_eq!(class_names(&listing), vec!["Keep Me".to_string()]);
    assert_eq!(listing["classes"][0]["studentCount"], json!(1));

    let _ = std::fs::remove_dir_all(workspace);
    let _ = std::fs::remove_dir_all(out_dir);
}
