/*!
Tests for error handling and error types.
*/

#[cfg(test)]
mod tests {
    use crate::error::TableSnapError;
    use std::io;

    #[test]
    fn test_error_display() {
        let error = TableSnapError::retrieval("scan of users failed");
        assert_eq!(error.to_string(), "Retrieval failed: scan of users failed");

        let error = TableSnapError::persistence("disk full");
        assert_eq!(error.to_string(), "Persistence failed: disk full");

        let error = TableSnapError::ordering("record 7 has no 'number'");
        assert_eq!(error.to_string(), "Ordering failed: record 7 has no 'number'");

        let error = TableSnapError::write("throughput exceeded");
        assert_eq!(error.to_string(), "Write failed: throughput exceeded");

        let error = TableSnapError::validation("empty identity key");
        assert_eq!(error.to_string(), "Validation error: empty identity key");
    }

    #[test]
    fn test_error_from_io_error() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "File not found");
        let error = TableSnapError::from(io_error);

        match error {
            TableSnapError::Io(_) => {}
            _ => panic!("Expected Io error variant"),
        }
    }

    #[test]
    fn test_error_from_json_error() {
        let json_error = serde_json::from_str::<serde_json::Value>("[{").unwrap_err();
        let error = TableSnapError::from(json_error);

        match error {
            TableSnapError::Json(_) => {}
            _ => panic!("Expected Json error variant"),
        }
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<TableSnapError>();
        assert_sync::<TableSnapError>();
    }

    #[test]
    fn test_question_mark_conversion() {
        fn read_missing() -> crate::Result<Vec<u8>> {
            Ok(std::fs::read("/definitely/not/here/snapshot.json")?)
        }

        assert!(matches!(read_missing(), Err(TableSnapError::Io(_))));
    }
}
