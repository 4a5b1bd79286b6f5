//! Workspace backup bundles.
//!
//! A bundle is a zip holding `manifest.json`, the SQLite database under `db/` and a
//! small workspace note. The manifest records the database's SHA-256, and import
//! refuses a bundle whose database entry no longer matches it.

use anyhow::{bail, ensure, Context};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{Read, Seek, Write};
use std::path::Path;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

const MANIFEST_ENTRY: &str = "manifest.json";
const DB_ENTRY: &str = "db/gradebook.sqlite3";
const WORKSPACE_NOTE_ENTRY: &str = "meta/workspace.json";
const DB_FILE_NAME: &str = "gradebook.sqlite3";
const SQLITE_HEADER: &[u8] = b"SQLite format 3\0";
const ZIP_SIGNATURE: &[u8] = b"PK\x03\x04";

pub const BUNDLE_FORMAT_V1: &str = "gradebook-workspace-v1";
pub const RAW_SQLITE_FORMAT: &str = "sqlite3";

#[derive(Debug, Clone)]
pub struct ExportSummary {
    pub bundle_format: String,
    pub entry_count: usize,
    pub db_sha256: String,
}

#[derive(Debug, Clone)]
pub struct ImportSummary {
    pub bundle_format_detected: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Manifest {
    format: String,
    #[serde(default)]
    app_version: String,
    #[serde(default)]
    exported_at: String,
    #[serde(default)]
    db_sha256: Option<String>,
    #[serde(default)]
    db_bytes: Option<u64>,
}

fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

fn put_json<W: Write + Seek, T: Serialize>(
    zip: &mut ZipWriter<W>,
    name: &str,
    value: &T,
) -> anyhow::Result<()> {
    let body = serde_json::to_vec_pretty(value).with_context(|| format!("encode {name}"))?;
    let opts = FileOptions::default().compression_method(CompressionMethod::Deflated);
    zip.start_file(name, opts).with_context(|| format!("start {name}"))?;
    zip.write_all(&body).with_context(|| format!("write {name}"))?;
    Ok(())
}

pub fn export_workspace_bundle(
    workspace_path: &Path,
    out_path: &Path,
) -> anyhow::Result<ExportSummary> {
    let db_path = workspace_path.join(DB_FILE_NAME);
    ensure!(
        db_path.is_file(),
        "workspace database not found: {}",
        db_path.display()
    );
    let db_bytes =
        std::fs::read(&db_path).with_context(|| format!("read {}", db_path.display()))?;
    let db_sha256 = sha256_hex(&db_bytes);

    if let Some(dir) = out_path.parent() {
        std::fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
    }
    let file = File::create(out_path).with_context(|| format!("create {}", out_path.display()))?;
    let mut zip = ZipWriter::new(file);

    let manifest = Manifest {
        format: BUNDLE_FORMAT_V1.to_string(),
        app_version: env!("CARGO_PKG_VERSION").to_string(),
        exported_at: chrono::Utc::now().to_rfc3339(),
        db_sha256: Some(db_sha256.clone()),
        db_bytes: Some(db_bytes.len() as u64),
    };
    put_json(&mut zip, MANIFEST_ENTRY, &manifest)?;

    let opts = FileOptions::default().compression_method(CompressionMethod::Deflated);
    zip.start_file(DB_ENTRY, opts).context("start database entry")?;
    zip.write_all(&db_bytes).context("write database entry")?;

    put_json(
        &mut zip,
        WORKSPACE_NOTE_ENTRY,
        &serde_json::json!({ "sourceWorkspace": workspace_path.to_string_lossy() }),
    )?;
    zip.finish().context("finalize bundle")?;

    Ok(ExportSummary {
        bundle_format: BUNDLE_FORMAT_V1.to_string(),
        entry_count: 3,
        db_sha256,
    })
}

/// Restores the workspace database from a bundle or a bare SQLite file.
/// The current database is only replaced once the input has been fully checked.
pub fn import_workspace_bundle(
    in_path: &Path,
    workspace_path: &Path,
) -> anyhow::Result<ImportSummary> {
    let mut raw = Vec::new();
    File::open(in_path)
        .with_context(|| format!("open {}", in_path.display()))?
        .read_to_end(&mut raw)
        .with_context(|| format!("read {}", in_path.display()))?;

    let (db_bytes, detected) = if raw.starts_with(ZIP_SIGNATURE) {
        (unpack_bundle(&raw)?, BUNDLE_FORMAT_V1)
    } else if raw.starts_with(SQLITE_HEADER) {
        (raw, RAW_SQLITE_FORMAT)
    } else {
        bail!("unrecognized backup file: {}", in_path.display());
    };

    swap_in_database(workspace_path, &db_bytes)?;
    Ok(ImportSummary {
        bundle_format_detected: detected.to_string(),
    })
}

fn unpack_bundle(raw: &[u8]) -> anyhow::Result<Vec<u8>> {
    let mut archive = ZipArchive::new(std::io::Cursor::new(raw)).context("invalid zip archive")?;

    let manifest: Manifest = {
        let entry = archive
            .by_name(MANIFEST_ENTRY)
            .context("bundle has no manifest.json")?;
        serde_json::from_reader(entry).context("manifest.json is not a valid manifest")?
    };
    ensure!(
        manifest.format == BUNDLE_FORMAT_V1,
        "unsupported bundle format: {}",
        manifest.format
    );
    tracing::debug!(
        app_version = %manifest.app_version,
        exported_at = %manifest.exported_at,
        "bundle manifest read"
    );

    let mut db_bytes = Vec::new();
    archive
        .by_name(DB_ENTRY)
        .with_context(|| format!("bundle has no {DB_ENTRY}"))?
        .read_to_end(&mut db_bytes)
        .context("extract database entry")?;

    if let Some(expected_len) = manifest.db_bytes {
        ensure!(
            expected_len == db_bytes.len() as u64,
            "database size mismatch: manifest {expected_len} bytes, entry {} bytes",
            db_bytes.len()
        );
    }
    if let Some(expected) = manifest.db_sha256.as_deref() {
        let actual = sha256_hex(&db_bytes);
        ensure!(
            actual.eq_ignore_ascii_case(expected),
            "database checksum mismatch: manifest {expected}, entry {actual}"
        );
    }
    Ok(db_bytes)
}

/// Writes beside the live file first, then renames over it.
fn swap_in_database(workspace_path: &Path, db_bytes: &[u8]) -> anyhow::Result<()> {
    std::fs::create_dir_all(workspace_path)
        .with_context(|| format!("create {}", workspace_path.display()))?;
    let live = workspace_path.join(DB_FILE_NAME);
    let staged = workspace_path.join(format!("{DB_FILE_NAME}.importing"));

    std::fs::write(&staged, db_bytes).with_context(|| format!("write {}", staged.display()))?;
    if live.exists() {
        std::fs::remove_file(&live).with_context(|| format!("remove {}", live.display()))?;
    }
    std::fs::rename(&staged, &live)
        .with_context(|| format!("move {} into place", staged.display()))?;
    Ok(())
}
