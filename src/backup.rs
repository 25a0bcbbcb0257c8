use anyhow::Context;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use thiserror::Error;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::calendar::AcademicCalendar;
use crate::model::{cace_level, Class, Student};
use crate::settings::ClassSettings;
use crate::store;

const MANIFEST_ENTRY: &str = "manifest.json";
const PAYLOAD_ENTRY: &str = "backup.json";
pub const BACKUP_FORMAT_V1: &str = "gradebook-backup-v1";
pub const BUNDLE_FORMAT_V1: &str = "gradebook-bundle-v1";

#[derive(Debug, Error)]
pub enum BackupError {
    #[error("backup is not valid JSON: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("unsupported backup format: {0:?}")]
    UnsupportedFormat(String),

    #[error("bundle is missing {0}")]
    MissingEntry(&'static str),

    #[error("bundle checksum mismatch (manifest {expected}, payload {actual})")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("duplicate {kind} id {id}")]
    DuplicateId { kind: &'static str, id: String },

    #[error("student {student_id} references unknown class {class_id}")]
    DanglingStudent { student_id: String, class_id: String },

    #[error("class {class_id} has invalid CACE level {level}")]
    BadLevel { class_id: String, level: u8 },

    #[error("class {class_id} has invalid settings: {reason}")]
    BadSettings { class_id: String, reason: String },

    #[error("class {class_id} has invalid academic year {label:?}")]
    BadAcademicYear { class_id: String, label: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupDocument {
    pub format: String,
    pub version: u32,
    #[serde(default)]
    pub app_version: String,
    #[serde(default)]
    pub exported_at: String,
    pub classes: Vec<Class>,
    pub students: Vec<Student>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BundleManifest {
    format: String,
    version: u32,
    app_version: String,
    exported_at: String,
    sha256: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportSummary {
    pub format: String,
    pub class_count: usize,
    pub student_count: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub format_detected: String,
    pub class_count: usize,
    pub student_count: usize,
}

pub fn export_document(conn: &Connection) -> anyhow::Result<BackupDocument> {
    Ok(BackupDocument {
        format: BACKUP_FORMAT_V1.to_string(),
        version: 1,
        app_version: env!("CARGO_PKG_VERSION").to_string(),
        exported_at: chrono::Utc::now().to_rfc3339(),
        classes: store::all_classes(conn)?,
        students: store::load_all_students(conn)?,
    })
}

fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

fn ensure_parent(path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.to_string_lossy()))?;
    }
    Ok(())
}

/// Writes the whole store as one pretty-printed JSON document.
pub fn write_json(conn: &Connection, out_path: &Path) -> anyhow::Result<ExportSummary> {
    let doc = export_document(conn)?;
    ensure_parent(out_path)?;
    let text = serde_json::to_string_pretty(&doc).context("failed to serialize backup")?;
    std::fs::write(out_path, text)
        .with_context(|| format!("failed to write {}", out_path.to_string_lossy()))?;
    Ok(ExportSummary {
        format: BACKUP_FORMAT_V1.to_string(),
        class_count: doc.classes.len(),
        student_count: doc.students.len(),
    })
}

/// Writes a zip bundle: a manifest carrying the payload checksum, plus the
/// JSON document itself.
pub fn write_bundle(conn: &Connection, out_path: &Path) -> anyhow::Result<ExportSummary> {
    let doc = export_document(conn)?;
    let payload = serde_json::to_vec_pretty(&doc).context("failed to serialize backup")?;
    let manifest = BundleManifest {
        format: BUNDLE_FORMAT_V1.to_string(),
        version: 1,
        app_version: doc.app_version.clone(),
        exported_at: doc.exported_at.clone(),
        sha256: sha256_hex(&payload),
    };

    ensure_parent(out_path)?;
    let out_file = File::create(out_path).with_context(|| {
        format!(
            "failed to create output file {}",
            out_path.to_string_lossy()
        )
    })?;
    let mut zip = ZipWriter::new(out_file);
    let opts = FileOptions::default().compression_method(CompressionMethod::Deflated);

    zip.start_file(MANIFEST_ENTRY, opts)
        .context("failed to start manifest entry")?;
    zip.write_all(
        serde_json::to_string_pretty(&manifest)
            .context("failed to serialize manifest")?
            .as_bytes(),
    )
    .context("failed to write manifest entry")?;

    zip.start_file(PAYLOAD_ENTRY, opts)
        .context("failed to start payload entry")?;
    zip.write_all(&payload)
        .context("failed to write payload entry")?;

    zip.finish().context("failed to finalize zip bundle")?;

    Ok(ExportSummary {
        format: BUNDLE_FORMAT_V1.to_string(),
        class_count: doc.classes.len(),
        student_count: doc.students.len(),
    })
}

pub fn parse_document(bytes: &[u8]) -> Result<BackupDocument, BackupError> {
    let doc: BackupDocument = serde_json::from_slice(bytes)?;
    validate_document(&doc)?;
    Ok(doc)
}

/// Structural checks run before anything touches the store.
pub fn validate_document(doc: &BackupDocument) -> Result<(), BackupError> {
    if doc.format != BACKUP_FORMAT_V1 {
        return Err(BackupError::UnsupportedFormat(doc.format.clone()));
    }

    // Labels are checked for shape only; any start date yields the same years.
    let calendar = AcademicCalendar::default();
    let mut class_ids = HashSet::new();
    for c in &doc.classes {
        if !class_ids.insert(c.id.as_str()) {
            return Err(BackupError::DuplicateId {
                kind: "class",
                id: c.id.clone(),
            });
        }
        if calendar.parse_label(&c.academic_year).is_none() {
            return Err(BackupError::BadAcademicYear {
                class_id: c.id.clone(),
                label: c.academic_year.clone(),
            });
        }
        if cace_level(i64::from(c.cace_level)).is_none() {
            return Err(BackupError::BadLevel {
                class_id: c.id.clone(),
                level: c.cace_level,
            });
        }
        let settings = ClassSettings {
            weights: c.weights,
            thresholds: c.thresholds,
        };
        settings.validate().map_err(|e| BackupError::BadSettings {
            class_id: c.id.clone(),
            reason: e.to_string(),
        })?;
    }

    let mut student_ids = HashSet::new();
    let mut record_ids = HashSet::new();
    for s in &doc.students {
        if !student_ids.insert(s.id.as_str()) {
            return Err(BackupError::DuplicateId {
                kind: "student",
                id: s.id.clone(),
            });
        }
        if !class_ids.contains(s.class_id.as_str()) {
            return Err(BackupError::DanglingStudent {
                student_id: s.id.clone(),
                class_id: s.class_id.clone(),
            });
        }
        let mut attendance_dates = HashSet::new();
        for a in &s.attendance {
            if !attendance_dates.insert(a.date) {
                return Err(BackupError::DuplicateId {
                    kind: "attendance date",
                    id: format!("{}@{}", s.id, a.date),
                });
            }
        }
        let ids = s
            .attendance
            .iter()
            .map(|a| &a.id)
            .chain(s.test_scores.iter().map(|t| &t.id))
            .chain(s.casas_scores.iter().map(|c| &c.id))
            .chain(s.notes.iter().map(|n| &n.id));
        for id in ids {
            if !record_ids.insert(id.as_str()) {
                return Err(BackupError::DuplicateId {
                    kind: "record",
                    id: id.clone(),
                });
            }
        }
    }
    Ok(())
}

/// Reads a plain JSON document or a zip bundle (detected by signature).
/// Returns the detected format with the validated document.
pub fn read_document(in_path: &Path) -> anyhow::Result<(String, BackupDocument)> {
    if !is_zip_file(in_path)? {
        let bytes = std::fs::read(in_path)
            .with_context(|| format!("failed to read {}", in_path.to_string_lossy()))?;
        return Ok((BACKUP_FORMAT_V1.to_string(), parse_document(&bytes)?));
    }

    let in_file = File::open(in_path)
        .with_context(|| format!("failed to open bundle {}", in_path.to_string_lossy()))?;
    let mut archive = ZipArchive::new(in_file).context("invalid zip archive")?;

    let mut manifest_text = String::new();
    archive
        .by_name(MANIFEST_ENTRY)
        .map_err(|_| BackupError::MissingEntry(MANIFEST_ENTRY))?
        .read_to_string(&mut manifest_text)
        .context("failed to read manifest.json")?;
    let manifest: BundleManifest =
        serde_json::from_str(&manifest_text).map_err(BackupError::Malformed)?;
    if manifest.format != BUNDLE_FORMAT_V1 {
        return Err(BackupError::UnsupportedFormat(manifest.format).into());
    }

    let mut payload = Vec::new();
    archive
        .by_name(PAYLOAD_ENTRY)
        .map_err(|_| BackupError::MissingEntry(PAYLOAD_ENTRY))?
        .read_to_end(&mut payload)
        .context("failed to read backup.json")?;
    let actual = sha256_hex(&payload);
    if !actual.eq_ignore_ascii_case(&manifest.sha256) {
        return Err(BackupError::ChecksumMismatch {
            expected: manifest.sha256,
            actual,
        }
        .into());
    }
    Ok((BUNDLE_FORMAT_V1.to_string(), parse_document(&payload)?))
}

/// Replaces the whole store with `doc` in one transaction. On any error the
/// transaction is dropped and the previous contents stay in place.
pub fn import_document(conn: &Connection, doc: &BackupDocument) -> anyhow::Result<()> {
    validate_document(doc)?;
    let tx = conn.unchecked_transaction()?;
    store::clear_all(&tx)?;
    for c in &doc.classes {
        store::insert_class(&tx, c)?;
    }
    for s in &doc.students {
        store::insert_student(&tx, s)?;
    }
    tx.commit().context("failed to commit import")?;
    Ok(())
}

pub fn import_file(conn: &Connection, in_path: &Path) -> anyhow::Result<ImportSummary> {
    let (format_detected, doc) = read_document(in_path)?;
    import_document(conn, &doc)?;
    Ok(ImportSummary {
        format_detected,
        class_count: doc.classes.len(),
        student_count: doc.students.len(),
    })
}

fn is_zip_file(path: &Path) -> anyhow::Result<bool> {
    let mut f = File::open(path)
        .with_context(|| format!("failed to open input file {}", path.to_string_lossy()))?;
    let mut sig = [0u8; 4];
    let read = f.read(&mut sig).context("failed to read file signature")?;
    if read < 4 {
        return Ok(false);
    }
    Ok(sig == [0x50, 0x4B, 0x03, 0x04])
}
