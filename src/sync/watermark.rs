use std::path::Path;

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::date_util::DATETIME_FORMAT;
use crate::error::{Error, Result};

/// Minute-precision format of the `date` form field sent to the remote.
pub const SINCE_FORMAT: &str = "%Y-%m-%d %H:%M";

#[derive(Debug, Serialize, Deserialize)]
struct StatusFile {
    last_sync_time: String,
    updated_at: String,
}

/// Read the persisted watermark. A missing, unreadable, or corrupt status
/// file means "never synced": log and return `None`, never fail the pass.
pub fn load_last_sync(path: &Path) -> Option<NaiveDateTime> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) => {
            log::info!("no usable sync status at {}: {e}", path.display());
            return None;
        }
    };
    let status: StatusFile = match serde_json::from_str(&raw) {
        Ok(status) => status,
        Err(e) => {
            log::warn!("corrupt sync status at {}: {e}", path.display());
            return None;
        }
    };
    match NaiveDateTime::parse_from_str(&status.last_sync_time, DATETIME_FORMAT) {
        Ok(ts) => Some(ts),
        Err(e) => {
            log::warn!(
                "unparseable last_sync_time {:?} in {}: {e}",
                status.last_sync_time,
                path.display()
            );
            None
        }
    }
}

/// Persist the watermark, keeping a `.backup` copy of the previous status
/// file so a crash mid-write never loses the last good watermark.
pub fn save_last_sync(path: &Path, watermark: NaiveDateTime, now: NaiveDateTime) -> Result<()> {
    if path.exists() {
        let backup = backup_path(path);
        std::fs::copy(path, &backup)
            .map_err(|e| Error::Watermark(format!("cannot back up {}: {e}", path.display())))?;
    }
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let status = StatusFile {
        last_sync_time: watermark.format(DATETIME_FORMAT).to_string(),
        updated_at: now.format(DATETIME_FORMAT).to_string(),
    };
    let raw = serde_json::to_string_pretty(&status)?;
    std::fs::write(path, raw)
        .map_err(|e| Error::Watermark(format!("cannot write {}: {e}", path.display())))?;
    log::debug!("sync watermark saved: {}", status.last_sync_time);
    Ok(())
}

/// `.backup` appended to the full file name, whatever its extension.
fn backup_path(path: &Path) -> std::path::PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".backup");
    path.with_file_name(name)
}

/// Compute the `date` parameter for a delta fetch: the watermark pulled
/// back by the lead interval, truncated to minute precision. The overlap
/// re-fetches records written while the previous pass was in flight;
/// re-applying them is idempotent.
pub fn since_param(watermark: NaiveDateTime, lead_minutes: i64) -> String {
    (watermark - Duration::minutes(lead_minutes))
        .format(SINCE_FORMAT)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, DATETIME_FORMAT).unwrap()
    }

    #[test]
    fn test_since_param_subtracts_lead_and_truncates() {
        let wm = ts("2025-03-01 10:30:45");
        assert_eq!(since_param(wm, 60), "2025-03-01 09:30");
        assert_eq!(since_param(wm, 0), "2025-03-01 10:30");
    }

    #[test]
    fn test_since_param_crosses_midnight() {
        let wm = NaiveDate::from_ymd_opt(2025, 3, 1)
            .unwrap()
            .and_hms_opt(0, 10, 0)
            .unwrap();
        assert_eq!(since_param(wm, 60), "2025-02-28 23:10");
    }

    #[test]
    fn test_save_then_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("status.json");
        let wm = ts("2025-03-01 10:30:45");

        save_last_sync(&path, wm, ts("2025-03-01 10:31:00")).unwrap();
        assert_eq!(load_last_sync(&path), Some(wm));
    }

    #[test]
    fn test_save_backs_up_previous_status() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("status.json");
        let first = ts("2025-03-01 10:00:00");
        let second = ts("2025-03-01 11:00:00");

        save_last_sync(&path, first, first).unwrap();
        save_last_sync(&path, second, second).unwrap();

        assert_eq!(load_last_sync(&path), Some(second));
        let backup = dir.path().join("status.json.backup");
        assert_eq!(load_last_sync(&backup), Some(first));
    }

    #[test]
    fn test_backup_keeps_full_file_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("status.txt");
        let first = ts("2025-03-01 10:00:00");
        let second = ts("2025-03-01 11:00:00");

        save_last_sync(&path, first, first).unwrap();
        save_last_sync(&path, second, second).unwrap();

        let backup = dir.path().join("status.txt.backup");
        assert_eq!(load_last_sync(&backup), Some(first));
    }

    #[test]
    fn test_missing_file_means_never_synced() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(load_last_sync(&dir.path().join("nope.json")), None);
    }

    #[test]
    fn test_corrupt_file_means_never_synced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("status.json");
        std::fs::write(&path, "{not json").unwrap();
        assert_eq!(load_last_sync(&path), None);

        std::fs::write(&path, r#"{"last_sync_time": "03/01/2025", "updated_at": ""}"#).unwrap();
        assert_eq!(load_last_sync(&path), None);
    }
}
