use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use svcmap_types::Checkpoint;
use tracing::{debug, info, warn};

/// Owns the `<output_dir>/<input_basename>.progress.json` resume file.
pub struct ProgressManager {
    path: PathBuf,
}

impl ProgressManager {
    pub fn new(input_path: &Path, output_dir: &Path) -> Self {
        let basename = input_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "input".to_string());
        let path = output_dir.join(format!("{basename}.progress.json"));
        debug!(path = %path.display(), "checkpoint file");
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write-then-rename so a crash never truncates the previous state.
    pub fn save(&self, checkpoint: &Checkpoint) -> std::io::Result<()> {
        let body = serde_json::to_string_pretty(checkpoint)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        let mut tmp_name = self.path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp = PathBuf::from(tmp_name);
        fs::write(&tmp, body)?;
        fs::rename(&tmp, &self.path)?;
        debug!(
            last_ip = %checkpoint.last_ip,
            processed = checkpoint.processed_count,
            successful = checkpoint.successful_count,
            "checkpoint saved"
        );
        Ok(())
    }

    pub fn load(&self) -> Option<Checkpoint> {
        if !self.has_valid_checkpoint() {
            return None;
        }
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "failed to read checkpoint");
                return None;
            }
        };
        match serde_json::from_str::<Checkpoint>(&raw) {
            Ok(checkpoint) => {
                info!(
                    last_ip = %checkpoint.last_ip,
                    processed = checkpoint.processed_count,
                    "checkpoint loaded"
                );
                Some(checkpoint)
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "invalid checkpoint ignored");
                None
            }
        }
    }

    pub fn has_valid_checkpoint(&self) -> bool {
        fs::metadata(&self.path).map(|m| m.len() > 0).unwrap_or(false)
    }

    /// Remove the file; called on clean completion.
    pub fn clear(&self) {
        match fs::remove_file(&self.path) {
            Ok(()) => info!(path = %self.path.display(), "checkpoint cleared"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "failed to clear checkpoint"),
        }
    }
}

/// Cheap input fingerprint: `<size>_<mtime_seconds>_<hash of first 1 KiB>`,
/// hex fields. Enough to notice the input file changed between runs.
pub fn input_file_hash(path: &Path) -> String {
    use std::hash::{Hash, Hasher};

    let meta = match fs::metadata(path) {
        Ok(meta) => meta,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to fingerprint input file");
            return String::new();
        }
    };
    let size = meta.len();
    let mtime = meta
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs())
        .unwrap_or(0);

    let mut head = Vec::with_capacity(1024);
    if let Ok(file) = fs::File::open(path) {
        let _ = file.take(1024).read_to_end(&mut head);
    }
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    head.hash(&mut hasher);

    format!("{size:x}_{mtime:x}_{:x}", hasher.finish())
}

/// Current UTC time as `YYYY-MM-DD HH:MM:SS`, computed without a
/// calendar dependency.
pub fn utc_timestamp() -> String {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    format_utc(secs)
}

pub(crate) fn format_utc(secs: u64) -> String {
    let days = secs / 86_400;
    let time_of_day = secs % 86_400;
    let (year, month, day) = days_to_ymd(days);
    format!(
        "{year:04}-{month:02}-{day:02} {:02}:{:02}:{:02}",
        time_of_day / 3_600,
        (time_of_day % 3_600) / 60,
        time_of_day % 60,
    )
}

fn is_leap_year(year: u64) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

/// Days since 1970-01-01 to a civil (year, month, day).
fn days_to_ymd(days: u64) -> (u64, u32, u32) {
    let mut remaining = days;
    let mut year = 1970u64;
    loop {
        let days_in_year = if is_leap_year(year) { 366 } else { 365 };
        if remaining < days_in_year {
            break;
        }
        remaining -= days_in_year;
        year += 1;
    }

    let month_days: [u64; 12] = if is_leap_year(year) {
        [31, 29, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31]
    } else {
        [31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31]
    };

    let mut month = 1u32;
    for &days_in_month in &month_days {
        if remaining < days_in_month {
            break;
        }
        remaining -= days_in_month;
        month += 1;
    }
    (year, month, remaining as u32 + 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn manager(dir: &tempfile::TempDir) -> ProgressManager {
        ProgressManager::new(Path::new("/data/domains.txt"), dir.path())
    }

    fn sample() -> Checkpoint {
        Checkpoint {
            last_ip: "10.2.3.4".into(),
            processed_count: 1_000,
            successful_count: 73,
            timestamp: "2026-08-02 11:22:33".into(),
            input_file_hash: "ff_1_2".into(),
        }
    }

    #[test]
    fn path_uses_input_basename() {
        let dir = tempfile::tempdir().unwrap();
        let pm = manager(&dir);
        assert!(pm
            .path()
            .to_string_lossy()
            .ends_with("domains.txt.progress.json"));
    }

    #[test]
    fn save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let pm = manager(&dir);
        assert!(pm.load().is_none());

        pm.save(&sample()).unwrap();
        assert!(pm.has_valid_checkpoint());
        assert_eq!(pm.load().unwrap(), sample());
    }

    #[test]
    fn clear_removes_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let pm = manager(&dir);
        pm.save(&sample()).unwrap();
        pm.clear();
        assert!(!pm.has_valid_checkpoint());
        // Clearing twice is harmless.
        pm.clear();
    }

    #[test]
    fn garbage_checkpoint_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let pm = manager(&dir);
        fs::write(pm.path(), "{not json").unwrap();
        assert!(pm.load().is_none());
    }

    #[test]
    fn hash_tracks_content_changes() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"10.0.0.1\n10.0.0.2\n").unwrap();
        file.flush().unwrap();
        let first = input_file_hash(file.path());
        assert!(!first.is_empty());
        assert_eq!(first.split('_').count(), 3);

        file.write_all(b"10.0.0.3\n").unwrap();
        file.flush().unwrap();
        let second = input_file_hash(file.path());
        assert_ne!(first, second);
    }

    #[test]
    fn utc_formatting_known_instants() {
        assert_eq!(format_utc(0), "1970-01-01 00:00:00");
        // 2000-02-29 12:00:00 UTC (leap day).
        assert_eq!(format_utc(951_825_600), "2000-02-29 12:00:00");
        // 2026-01-01 00:00:01 UTC.
        assert_eq!(format_utc(1_767_225_601), "2026-01-01 00:00:01");
    }
}
