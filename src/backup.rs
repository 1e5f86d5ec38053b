//! Workspace backups.
//!
//! A bundle is a zip holding `manifest.json` and the workspace database. The
//! manifest records the database checksum and a copy of the workspace
//! settings. Restoring is split in two so callers can reject a bad source
//! before they let go of a live database: [`read_restore_source`] checks
//! everything, [`restore_database`] only writes.

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

pub const BUNDLE_FORMAT_V1: &str = "meritd-workspace-v1";
pub const RAW_SQLITE_FORMAT: &str = "sqlite3";

const MANIFEST_ENTRY: &str = "manifest.json";
const DB_FILE_NAME: &str = "meritd.sqlite3";
const DB_ENTRY: &str = "db/meritd.sqlite3";
const STAGING_FILE_NAME: &str = "meritd.sqlite3.restore";

const ZIP_MAGIC: &[u8; 4] = b"PK\x03\x04";
const SQLITE_MAGIC: &[u8; 16] = b"SQLite format 3\0";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub format: String,
    #[serde(default)]
    pub app_version: String,
    #[serde(default)]
    pub exported_at: String,
    pub db_sha256: String,
    /// Settings rows keyed as in the workspace `settings` table.
    #[serde(default)]
    pub settings: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone)]
pub struct ExportSummary {
    pub bundle_format: String,
    pub entry_count: usize,
    pub db_sha256: String,
}

/// A database image that passed every check and is ready to be written.
#[derive(Debug, Clone)]
pub struct RestoreSource {
    pub format: String,
    pub db_sha256: String,
    /// Present only for bundles.
    pub manifest: Option<Manifest>,
    db_bytes: Vec<u8>,
}

fn sha256_hex(bytes: &[u8]) -> String {
    Sha256::digest(bytes)
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

pub fn export_workspace_bundle(
    workspace_path: &Path,
    out_path: &Path,
    settings: serde_json::Map<String, serde_json::Value>,
) -> anyhow::Result<ExportSummary> {
    let db_path = workspace_path.join(DB_FILE_NAME);
    if !db_path.is_file() {
        bail!("workspace database not found: {}", db_path.display());
    }
    let db_bytes =
        std::fs::read(&db_path).with_context(|| format!("reading {}", db_path.display()))?;

    let manifest = Manifest {
        format: BUNDLE_FORMAT_V1.to_string(),
        app_version: env!("CARGO_PKG_VERSION").to_string(),
        exported_at: chrono::Utc::now().to_rfc3339(),
        db_sha256: sha256_hex(&db_bytes),
        settings,
    };
    let manifest_json =
        serde_json::to_vec_pretty(&manifest).context("serializing bundle manifest")?;

    if let Some(dir) = out_path.parent() {
        std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }
    let file = File::create(out_path).with_context(|| format!("creating {}", out_path.display()))?;
    let mut zip = ZipWriter::new(file);
    let opts = FileOptions::default().compression_method(CompressionMethod::Deflated);
    for (name, bytes) in [(MANIFEST_ENTRY, &manifest_json), (DB_ENTRY, &db_bytes)] {
        zip.start_file(name, opts)
            .and_then(|_| zip.write_all(bytes).map_err(Into::into))
            .with_context(|| format!("writing bundle entry {}", name))?;
    }
    zip.finish().context("finishing bundle")?;

    tracing::info!(
        path = %out_path.display(),
        settings = manifest.settings.len(),
        "workspace bundle written"
    );
    Ok(ExportSummary {
        bundle_format: manifest.format,
        entry_count: 2,
        db_sha256: manifest.db_sha256,
    })
}

/// Read and verify a bundle or a bare SQLite file. Nothing on disk changes.
pub fn read_restore_source(in_path: &Path) -> anyhow::Result<RestoreSource> {
    let mut head = Vec::with_capacity(SQLITE_MAGIC.len());
    File::open(in_path)
        .with_context(|| format!("opening {}", in_path.display()))?
        .take(SQLITE_MAGIC.len() as u64)
        .read_to_end(&mut head)
        .with_context(|| format!("reading {}", in_path.display()))?;

    if head.as_slice() == SQLITE_MAGIC {
        let db_bytes =
            std::fs::read(in_path).with_context(|| format!("reading {}", in_path.display()))?;
        return Ok(RestoreSource {
            format: RAW_SQLITE_FORMAT.to_string(),
            db_sha256: sha256_hex(&db_bytes),
            manifest: None,
            db_bytes,
        });
    }
    if !head.starts_with(ZIP_MAGIC) {
        bail!(
            "not a workspace bundle or SQLite database: {}",
            in_path.display()
        );
    }

    let file = File::open(in_path).with_context(|| format!("opening {}", in_path.display()))?;
    let mut archive = ZipArchive::new(file).context("bundle is not a readable zip")?;
    let manifest: Manifest = {
        let entry = archive
            .by_name(MANIFEST_ENTRY)
            .context("bundle has no manifest.json")?;
        serde_json::from_reader(entry).context("manifest.json is malformed")?
    };
    if manifest.format != BUNDLE_FORMAT_V1 {
        bail!("unsupported bundle format: {}", manifest.format);
    }

    let mut db_bytes = Vec::new();
    archive
        .by_name(DB_ENTRY)
        .with_context(|| format!("bundle has no {}", DB_ENTRY))?
        .read_to_end(&mut db_bytes)
        .context("extracting database entry")?;
    let actual = sha256_hex(&db_bytes);
    if !actual.eq_ignore_ascii_case(&manifest.db_sha256) {
        bail!(
            "database checksum mismatch: manifest {}, bundle {}",
            manifest.db_sha256,
            actual
        );
    }
    if !db_bytes.starts_with(SQLITE_MAGIC) {
        bail!("bundled database is not a SQLite file");
    }

    Ok(RestoreSource {
        format: manifest.format.clone(),
        db_sha256: actual,
        manifest: Some(manifest),
        db_bytes,
    })
}

/// Replace the workspace database with `source`. The new image is staged
/// next to the live file and renamed over it.
pub fn restore_database(workspace_path: &Path, source: &RestoreSource) -> anyhow::Result<()> {
    std::fs::create_dir_all(workspace_path)
        .with_context(|| format!("creating {}", workspace_path.display()))?;
    let staging = workspace_path.join(STAGING_FILE_NAME);
    let dst = workspace_path.join(DB_FILE_NAME);

    let written = File::create(&staging)
        .and_then(|mut f| {
            f.write_all(&source.db_bytes)?;
            f.sync_all()
        })
        .with_context(|| format!("staging {}", staging.display()));
    if let Err(e) = written {
        let _ = std::fs::remove_file(&staging);
        return Err(e);
    }
    std::fs::rename(&staging, &dst)
        .with_context(|| format!("replacing {}", dst.display()))?;

    tracing::info!(
        workspace = %workspace_path.display(),
        format = %source.format,
        "workspace database restored"
    );
    Ok(())
}

pub fn import_workspace_bundle(
    in_path: &Path,
    workspace_path: &Path,
) -> anyhow::Result<RestoreSource> {
    let source = read_restore_source(in_path)?;
    restore_database(workspace_path, &source)?;
    Ok(source)
}
