use anyhow::Context;
use chrono::Utc;
use serde::Serialize;
use std::path::{Path, PathBuf};
use uuid::Uuid;

pub const BACKUP_DIR: &str = "backups";
const BACKUP_PREFIX: &str = "scores_backup_";
const BACKUP_SUFFIX: &str = ".sqlite3";

#[derive(Debug, Clone, Serialize)]
pub struct BackupEntry {
    pub file_name: String,
    pub path: String,
    pub size_bytes: u64,
}

fn backup_file_name() -> String {
    let stamp = Utc::now().format("%Y%m%dT%H%M%S%.3fZ");
    let suffix = Uuid::new_v4().simple().to_string();
    format!(
        "{}{}_{}{}",
        BACKUP_PREFIX,
        stamp,
        &suffix[..8],
        BACKUP_SUFFIX
    )
}

/// Copy the database file into `backup_dir` under a timestamped name.
///
/// Returns `Ok(None)` when there is nothing to back up yet.
pub fn backup_database(db_path: &Path, backup_dir: &Path) -> anyhow::Result<Option<PathBuf>> {
    if !db_path.is_file() {
        return Ok(None);
    }
    std::fs::create_dir_all(backup_dir).with_context(|| {
        format!(
            "failed to create backup directory {}",
            backup_dir.to_string_lossy()
        )
    })?;
    let dst = backup_dir.join(backup_file_name());
    std::fs::copy(db_path, &dst).with_context(|| {
        format!(
            "failed to copy {} to {}",
            db_path.to_string_lossy(),
            dst.to_string_lossy()
        )
    })?;
    Ok(Some(dst))
}

/// Backups in `backup_dir`, newest first. A missing directory is an empty list.
pub fn list_backups(backup_dir: &Path) -> anyhow::Result<Vec<BackupEntry>> {
    if !backup_dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut out = Vec::new();
    for ent in std::fs::read_dir(backup_dir)
        .with_context(|| format!("failed to read {}", backup_dir.to_string_lossy()))?
    {
        let ent = ent?;
        let p = ent.path();
        if !p.is_file() {
            continue;
        }
        let Some(name) = p.file_name().and_then(|s| s.to_str()) else {
            continue;
        };
        if !name.starts_with(BACKUP_PREFIX) || !name.ends_with(BACKUP_SUFFIX) {
            continue;
        }
        let size_bytes = ent.metadata().map(|m| m.len()).unwrap_or(0);
        out.push(BackupEntry {
            file_name: name.to_string(),
            path: p.to_string_lossy().to_string(),
            size_bytes,
        });
    }
    // Timestamps are fixed-width, so name order is time order.
    out.sort_by(|a, b| b.file_name.cmp(&a.file_name));
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_dir(prefix: &str) -> PathBuf {
        let p = std::env::temp_dir().join(format!(
            "{}-{}",
            prefix,
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .expect("clock")
                .as_nanos()
        ));
        std::fs::create_dir_all(&p).expect("create temp dir");
        p
    }

    #[test]
    fn backup_copies_bytes_and_lists_newest_first() {
        let workspace = temp_dir("scorebook-backup");
        let db = workspace.join("scores.sqlite3");
        std::fs::write(&db, b"sqlite-test-payload").expect("write db");
        let dir = workspace.join(BACKUP_DIR);

        let first = backup_database(&db, &dir).expect("first").expect("path");
        std::thread::sleep(std::time::Duration::from_millis(5));
        let second = backup_database(&db, &dir).expect("second").expect("path");
        assert_ne!(first, second);
        assert_eq!(std::fs::read(&first).expect("read"), b"sqlite-test-payload");

        let listed = list_backups(&dir).expect("list");
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].path, second.to_string_lossy());
        assert_eq!(listed[0].size_bytes, 19);

        let _ = std::fs::remove_dir_all(workspace);
    }

    #[test]
    fn missing_database_is_not_an_error() {
        let workspace = temp_dir("scorebook-backup-empty");
        let out = backup_database(&workspace.join("nope.sqlite3"), &workspace.join(BACKUP_DIR))
            .expect("no error");
        assert!(out.is_none());
        assert!(list_backups(&workspace.join(BACKUP_DIR)).expect("list").is_empty());
        let _ = std::fs::remove_dir_all(workspace);
    }
}
