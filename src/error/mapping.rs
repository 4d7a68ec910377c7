//! Error code mapping from provider responses to typed errors.

use super::*;

/// Provider error codes that mean "the target does not exist".
const NOT_FOUND_CODES: &[&str] = &[
    // S3
    "NoSuchKey",
    "NoSuchBucket",
    "NoSuchVersion",
    "NotFound",
    // SQS
    "AWS.SimpleQueueService.NonExistentQueue",
    "QueueDoesNotExist",
    // IAM
    "NoSuchEntity",
];

/// Returns true if `code` is one of the provider's "does not exist" codes.
pub fn is_not_found_code(code: &str) -> bool {
    NOT_FOUND_CODES.contains(&code)
}

/// Map a provider error code to a typed error.
///
/// Throttling and 5xx codes become [`ServiceError`]s like everything else.
/// Codes that describe a transport condition rather than a rejection map
/// to [`NetworkError`].
///
/// # Arguments
///
/// * `service` - Service that produced the error
/// * `operation` - Operation name (e.g. "ListObjectsV2")
/// * `code` - Provider error code
/// * `message` - Provider message
/// * `status` - HTTP status, if known
pub fn map_error_code(
    service: ServiceKind,
    operation: &str,
    code: &str,
    message: &str,
    status: Option<u16>,
) -> BulkError {
    match code {
        "RequestTimeout" | "RequestTimeoutException" => BulkError::Network(NetworkError::Timeout {
            message: format!("{operation}: {message}"),
        }),
        _ => {
            let mut err = ServiceError::new(service, operation, code, message);
            err.status = status;
            BulkError::Service(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_codes() {
        assert!(is_not_found_code("NoSuchKey"));
        assert!(is_not_found_code("NoSuchEntity"));
        assert!(is_not_found_code("AWS.SimpleQueueService.NonExistentQueue"));
        assert!(!is_not_found_code("AccessDenied"));
        assert!(!is_not_found_code("InternalError"));
    }

    #[test]
    fn test_map_service_code() {
        let err = map_error_code(
            ServiceKind::Identity,
            "GetRole",
            "NoSuchEntity",
            "role missing",
            Some(404),
        );
        assert!(err.is_not_found());
        assert_eq!(err.status_code(), Some(404));
    }

    #[test]
    fn test_map_timeout_code() {
        let err = map_error_code(ServiceKind::Storage, "PutObject", "RequestTimeout", "slow", Some(400));
        assert!(matches!(err, BulkError::Network(NetworkError::Timeout { .. })));
    }
}
