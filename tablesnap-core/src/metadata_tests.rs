/*!
Tests for snapshot metadata and file naming, including edge cases.
*/

#[cfg(test)]
mod tests {
    use crate::metadata::{
        format_timestamp, parse_snapshot_file_name, report_file_name, snapshot_file_name,
        SnapshotMetadata,
    };
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_metadata_creation() {
        let metadata = SnapshotMetadata::new("users", None, 42);

        assert_eq!(metadata.table_name, "users");
        assert_eq!(metadata.base_name, "users");
        assert_eq!(metadata.record_count, 42);

        let time_diff = (Utc::now() - metadata.captured_at).num_seconds().abs();
        assert!(time_diff <= 5);
    }

    #[test]
    fn test_base_name_override() {
        let metadata = SnapshotMetadata::new("users", Some("nightly"), 0);
        assert_eq!(metadata.table_name, "users");
        assert_eq!(metadata.base_name, "nightly");
    }

    #[test]
    fn test_timestamp_is_minute_resolution() {
        let at = Utc.with_ymd_and_hms(2024, 3, 7, 9, 5, 59).unwrap();
        assert_eq!(format_timestamp(at), "2024-03-07_0905");
    }

    #[test]
    fn test_file_names() {
        let at = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
        let metadata = SnapshotMetadata::captured_at("t", None, 1, at);

        assert_eq!(metadata.file_name(true), "t_2024-02-01_0000.json");
        assert_eq!(metadata.file_name(false), "t.json");
        assert_eq!(metadata.report_file_name(), "changes_t_2024-02-01_0000.json");
        assert_eq!(report_file_name("t", at), metadata.report_file_name());
    }

    #[test]
    fn test_timestamped_names_sort_chronologically() {
        let earlier = snapshot_file_name("t", Some(Utc.with_ymd_and_hms(2023, 12, 31, 23, 59, 0).unwrap()));
        let later = snapshot_file_name("t", Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()));
        assert!(earlier < later);
    }

    #[test]
    fn test_parse_timestamped_name() {
        let (base, at) = parse_snapshot_file_name("users_2024-01-01_1230.json").unwrap();
        assert_eq!(base, "users");
        assert_eq!(at, Some(Utc.with_ymd_and_hms(2024, 1, 1, 12, 30, 0).unwrap()));
    }

    #[test]
    fn test_parse_plain_name() {
        assert_eq!(
            parse_snapshot_file_name("users.json"),
            Some(("users".to_string(), None))
        );
        assert_eq!(
            parse_snapshot_file_name("users_archive_2020.json"),
            Some(("users_archive_2020".to_string(), None))
        );
    }

    #[test]
    fn test_parse_rejects_other_extensions() {
        assert_eq!(parse_snapshot_file_name("users_2024-01-01_1230.csv"), None);
    }

    #[test]
    fn test_parse_base_with_underscores() {
        let (base, at) = parse_snapshot_file_name("prod_users_2024-05-06_0700.json").unwrap();
        assert_eq!(base, "prod_users");
        assert!(at.is_some());
    }

    #[test]
    fn test_parse_non_ascii_stem() {
        let (base, at) = parse_snapshot_file_name("ユーザー.json").unwrap();
        assert_eq!(base, "ユーザー");
        assert!(at.is_none());
    }

    #[test]
    fn test_metadata_serialization_roundtrip() {
        let metadata = SnapshotMetadata::new("users", Some("nightly"), 3);

        let json = serde_json::to_string(&metadata).unwrap();
        let deserialized: SnapshotMetadata = serde_json::from_str(&json).unwrap();

        assert_eq!(metadata, deserialized);
    }
}
