use super::entry::EntryOutcome;
use serde::Serialize;

/// 同步报告，同时作为整个同步过程的累加器
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub run_id: String,
    pub start_time: i64,
    pub end_time: i64,
    pub files_considered: u32,
    pub files_transferred: u32,
    pub files_skipped: u32,
    pub files_verified: u32,
    pub files_mismatched: u32,
    pub files_failed: u32,
    pub files_deleted: u32,
    pub manifest_flushes: u32,
    /// 本次上传的字节数
    pub bytes_uploaded: u64,
    /// 当前已确认存在于目标端的字节数
    pub bytes_stored: u64,
    pub errors: Vec<String>,
}

impl SyncReport {
    pub fn new() -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            start_time: chrono::Utc::now().timestamp(),
            end_time: 0,
            files_considered: 0,
            files_transferred: 0,
            files_skipped: 0,
            files_verified: 0,
            files_mismatched: 0,
            files_failed: 0,
            files_deleted: 0,
            manifest_flushes: 0,
            bytes_uploaded: 0,
            bytes_stored: 0,
            errors: Vec::new(),
        }
    }

    /// (已上传字节数, 目标端字节数)
    pub fn totals(&self) -> (u64, u64) {
        (self.bytes_uploaded, self.bytes_stored)
    }

    pub fn record_outcome(&mut self, path: &str, outcome: &EntryOutcome) {
        match outcome {
            EntryOutcome::Skipped(_) => self.files_skipped += 1,
            EntryOutcome::Verified => self.files_verified += 1,
            EntryOutcome::Mismatch { .. } => self.files_mismatched += 1,
            EntryOutcome::Transferred { bytes, .. } => {
                self.files_transferred += 1;
                self.bytes_uploaded += bytes;
                self.bytes_stored += bytes;
            }
            EntryOutcome::Abandoned { error } => self.record_failure(path, error),
        }
    }

    pub fn record_failure(&mut self, path: &str, error: impl std::fmt::Display) {
        self.files_failed += 1;
        self.errors.push(format!("{}: {}", path, error));
    }

    pub fn finish(&mut self) {
        self.end_time = chrono::Utc::now().timestamp();
    }
}

impl Default for SyncReport {
    fn default() -> Self {
        Self::new()
    }
}

/// 格式化字节数
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.2} {}", value, UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::entry::SkipReason;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(0), "0 B");
        assert_eq!(format_size(1023), "1023 B");
        assert_eq!(format_size(1536), "1.50 KB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.00 MB");
    }

    #[test]
    fn test_outcomes_update_counters() {
        let mut report = SyncReport::new();
        report.record_outcome(
            "a.txt",
            &EntryOutcome::Transferred {
                bytes: 10,
                checksum: "x".into(),
            },
        );
        report.record_outcome("b.txt", &EntryOutcome::Skipped(SkipReason::Filtered));
        report.record_outcome(
            "c.txt",
            &EntryOutcome::Abandoned {
                error: "timeout".into(),
            },
        );

        assert_eq!(report.totals(), (10, 10));
        assert_eq!(report.files_transferred, 1);
        assert_eq!(report.files_skipped, 1);
        assert_eq!(report.files_failed, 1);
        assert_eq!(report.errors, vec!["c.txt: timeout".to_string()]);
    }
}
