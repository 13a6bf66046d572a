//! Retry-count header propagation and infrastructure-error classification
//! — the two pure decision functions at the heart of the consumer's state
//! machine.

use lapin::types::{AMQPValue, FieldTable};
use urlshort_core::{InfrastructureError, RepoError};

pub const RETRY_COUNT_HEADER: &str = "x-retry-count";

/// Read `x-retry-count`, tolerating whichever integer width the broker
/// client or a prior producer encoded it as. Absent or non-integer ⇒ 0.
pub fn read_retry_count(headers: Option<&FieldTable>) -> u32 {
    let Some(headers) = headers else {
        return 0;
    };
    match headers.inner().get(RETRY_COUNT_HEADER) {
        Some(AMQPValue::ShortShortInt(v)) => (*v).max(0) as u32,
        Some(AMQPValue::ShortShortUInt(v)) => *v as u32,
        Some(AMQPValue::ShortInt(v)) => (*v).max(0) as u32,
        Some(AMQPValue::ShortUInt(v)) => *v as u32,
        Some(AMQPValue::LongInt(v)) => (*v).max(0) as u32,
        Some(AMQPValue::LongUInt(v)) => *v,
        Some(AMQPValue::LongLongInt(v)) => (*v).max(0) as u32,
        _ => 0,
    }
}

/// Headers for a republish carrying an incremented retry count.
pub fn headers_with_retry_count(retries: u32) -> FieldTable {
    let mut headers = FieldTable::default();
    headers.insert(RETRY_COUNT_HEADER.into(), AMQPValue::LongUInt(retries));
    headers
}

const INFRA_SUBSTRINGS: &[&str] = &[
    "connection refused",
    "connection reset",
    "dial tcp",
    "EOF",
    "failed to connect",
];

/// An error is "infrastructure" iff it looks like a timeout or a
/// connection-class failure: an explicit [`InfrastructureError`] marker
/// (how `urlshort_core` flags a DB pool timeout or I/O failure without this
/// crate needing to know about `sqlx`), a timeout, a connection-class
/// `io::Error`, or a substring match on its rendered form as a last resort.
/// These are retried in place (no header mutation) rather than consuming
/// retry budget, since the cause is the backend flapping, not the message.
pub fn is_infrastructure_error(err: &RepoError) -> bool {
    let RepoError::Transient(source) = err else {
        return false;
    };

    if source.is::<InfrastructureError>() {
        return true;
    }
    if source.is::<tokio::time::error::Elapsed>() {
        return true;
    }
    if let Some(io_err) = source.downcast_ref::<std::io::Error>() {
        use std::io::ErrorKind::*;
        if matches!(
            io_err.kind(),
            TimedOut | ConnectionRefused | ConnectionReset | ConnectionAborted
        ) {
            return true;
        }
    }

    let rendered = format!("{source:#}");
    INFRA_SUBSTRINGS.iter().any(|needle| rendered.contains(needle))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers_with(value: AMQPValue) -> FieldTable {
        let mut headers = FieldTable::default();
        headers.insert(RETRY_COUNT_HEADER.into(), value);
        headers
    }

    #[test]
    fn absent_header_defaults_to_zero() {
        assert_eq!(read_retry_count(None), 0);
        assert_eq!(read_retry_count(Some(&FieldTable::default())), 0);
    }

    #[test]
    fn reads_32_and_64_bit_encodings() {
        assert_eq!(read_retry_count(Some(&headers_with(AMQPValue::LongInt(2)))), 2);
        assert_eq!(
            read_retry_count(Some(&headers_with(AMQPValue::LongLongInt(5)))),
            5
        );
        assert_eq!(
            read_retry_count(Some(&headers_with(AMQPValue::LongUInt(7)))),
            7
        );
    }

    #[test]
    fn unexpected_type_falls_back_to_zero() {
        let headers = headers_with(AMQPValue::Boolean(true));
        assert_eq!(read_retry_count(Some(&headers)), 0);
    }

    #[test]
    fn republish_headers_carry_incremented_count() {
        let headers = headers_with_retry_count(3);
        assert_eq!(read_retry_count(Some(&headers)), 3);
    }

    #[test]
    fn classifies_connection_refused_as_infrastructure() {
        let err = RepoError::transient(anyhow::anyhow!(
            "dial tcp 10.0.0.1:5432: connection refused"
        ));
        assert!(is_infrastructure_error(&err));
    }

    #[test]
    fn classifies_timeout_elapsed_as_infrastructure() {
        // Simulate a tokio::time::timeout elapsing.
        let elapsed = tokio::time::timeout(std::time::Duration::ZERO, std::future::pending::<()>());
        let err = futures::executor::block_on(async {
            match elapsed.await {
                Ok(_) => unreachable!(),
                Err(e) => RepoError::transient(e),
            }
        });
        assert!(is_infrastructure_error(&err));
    }

    #[test]
    fn classifies_infrastructure_error_marker_regardless_of_message() {
        // This is how a pool-exhausted or I/O-failed `sqlx::Error` reaches
        // the classifier: the `urlshort_core` layer already recognized it
        // and wrapped it, so the message text itself doesn't have to match
        // any of `INFRA_SUBSTRINGS`.
        let err = RepoError::transient(InfrastructureError(
            "pool timed out while waiting for an open connection".to_string(),
        ));
        assert!(is_infrastructure_error(&err));
    }

    #[test]
    fn does_not_classify_generic_transient_as_infrastructure() {
        let err = RepoError::transient(anyhow::anyhow!("constraint violation on insert"));
        assert!(!is_infrastructure_error(&err));
    }

    #[test]
    fn integrity_violation_is_never_infrastructure() {
        let err = RepoError::IntegrityViolation("abc123".to_string());
        assert!(!is_infrastructure_error(&err));
    }
}
