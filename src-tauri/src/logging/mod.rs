//! Logging setup for Silicon Console
//! Log files live in the app data `logs` folder and are kept for seven days.

use crate::utils::get_logs_dir;
use log::info;
use std::fs;
use std::path::Path;
use std::time::{Duration, SystemTime};

const LOG_RETENTION_DAYS: u64 = 7;

pub const LOG_FILE_NAME: &str = "silicon-console";

pub fn cleanup_old_logs() -> usize {
    remove_logs_older_than(
        &get_logs_dir(),
        Duration::from_secs(LOG_RETENTION_DAYS * 24 * 60 * 60),
        SystemTime::now(),
    )
}

/// Delete `*.log` files in `dir` last modified more than `retention` before `now`
pub fn remove_logs_older_than(dir: &Path, retention: Duration, now: SystemTime) -> usize {
    let Ok(entries) = fs::read_dir(dir) else {
        return 0;
    };

    let mut removed = 0;
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().map_or(true, |ext| ext != "log") {
            continue;
        }
        let expired = fs::metadata(&path)
            .and_then(|meta| meta.modified())
            .ok()
            .and_then(|modified| now.duration_since(modified).ok())
            .map_or(false, |age| age > retention);
        if expired && fs::remove_file(&path).is_ok() {
            info!("Cleaned up old log: {:?}", path.file_name());
            removed += 1;
        }
    }
    removed
}

#[cfg(feature = "desktop")]
pub fn plugin<R: tauri::Runtime>() -> tauri::plugin::TauriPlugin<R> {
    use tauri_plugin_log::{Target, TargetKind};

    let level = if cfg!(debug_assertions) {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    tauri_plugin_log::Builder::new()
        .targets([
            Target::new(TargetKind::Stdout),
            Target::new(TargetKind::Folder {
                path: get_logs_dir(),
                file_name: Some(LOG_FILE_NAME.to_string()),
            }),
        ])
        .level(level)
        .level_for("ureq", log::LevelFilter::Warn)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file_manager::json_ops::scratch_dir;

    #[test]
    fn test_only_expired_log_files_are_removed() {
        let dir = scratch_dir("logs");
        fs::write(dir.join("old.log"), "x").unwrap();
        fs::write(dir.join("notes.txt"), "x").unwrap();

        // Everything written just now is "old" from a clock a day ahead
        let later = SystemTime::now() + Duration::from_secs(24 * 60 * 60);
        assert_eq!(remove_logs_older_than(&dir, Duration::from_secs(60), later), 1);
        assert!(!dir.join("old.log").exists());
        assert!(dir.join("notes.txt").exists());

        assert_eq!(remove_logs_older_than(&dir.join("missing"), Duration::ZERO, later), 0);
        fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_recent_logs_are_kept() {
        let dir = scratch_dir("logs");
        fs::write(dir.join("today.log"), "x").unwrap();
        assert_eq!(
            remove_logs_older_than(&dir, Duration::from_secs(3600), SystemTime::now()),
            0
        );
        fs::remove_dir_all(dir).ok();
    }
}
