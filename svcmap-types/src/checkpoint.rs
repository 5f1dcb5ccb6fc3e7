use serde::{Deserialize, Serialize};

/// Resume state persisted alongside the output, rewritten every
/// `checkpoint_interval` reports and deleted on clean completion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// The last target IP whose report reached the writer.
    pub last_ip: String,
    pub processed_count: u64,
    pub successful_count: u64,
    /// UTC, `YYYY-MM-DD HH:MM:SS`.
    pub timestamp: String,
    /// Cheap input fingerprint: `<size>_<mtime_seconds>_<hash of first 1 KiB>`.
    pub input_file_hash: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_json() {
        let cp = Checkpoint {
            last_ip: "10.0.0.17".into(),
            processed_count: 4_200,
            successful_count: 311,
            timestamp: "2026-01-05 14:03:59".into(),
            input_file_hash: "1f40_6868a0c1_deadbeef".into(),
        };
        let json = serde_json::to_string(&cp).unwrap();
        let back: Checkpoint = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cp);
    }

    #[test]
    fn tolerates_missing_fields() {
        let cp: Checkpoint = serde_json::from_str(r#"{"last_ip":"10.0.0.1","processed_count":1,"successful_count":0,"timestamp":"","input_file_hash":""}"#).unwrap();
        assert_eq!(cp.last_ip, "10.0.0.1");
    }
}
