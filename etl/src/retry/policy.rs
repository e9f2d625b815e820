use crate::error::{ErrorKind, EtlError};

/// Retry behavior for a classified error.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum RetryDirective {
    /// The cycle can be re-run automatically after a backoff delay.
    Timed,
    /// The error is returned to the caller.
    NoRetry,
}

/// Policy describing how an [`EtlError`] should be handled by the orchestrator.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct ErrorHandlingPolicy {
    retry_directive: RetryDirective,
    solution: Option<&'static str>,
}

impl ErrorHandlingPolicy {
    const fn new(retry_directive: RetryDirective, solution: Option<&'static str>) -> Self {
        Self {
            retry_directive,
            solution,
        }
    }

    pub fn retry_directive(&self) -> RetryDirective {
        self.retry_directive
    }

    /// Returns an optional operator-facing solution message.
    pub fn solution(&self) -> Option<&'static str> {
        self.solution
    }
}

/// Builds an [`ErrorHandlingPolicy`] from an [`EtlError`].
pub fn build_error_handling_policy(error: &EtlError) -> ErrorHandlingPolicy {
    match error.kind() {
        // Keep this list narrow: only failures expected to recover on their own.
        ErrorKind::SourceConnectionFailed
        | ErrorKind::SourceDatabaseShutdown
        | ErrorKind::DestinationConnectionFailed
        | ErrorKind::DestinationThrottled
        | ErrorKind::StateStoreConnectionFailed => {
            ErrorHandlingPolicy::new(RetryDirective::Timed, None)
        }

        ErrorKind::SourceSchemaError => ErrorHandlingPolicy::new(
            RetryDirective::NoRetry,
            Some("Check that the `content` schema matches the expected tables and columns."),
        ),
        ErrorKind::ValidationError => ErrorHandlingPolicy::new(
            RetryDirective::NoRetry,
            Some("Fix the offending row in the source database."),
        ),
        ErrorKind::DestinationDocumentRejected => ErrorHandlingPolicy::new(
            RetryDirective::NoRetry,
            Some("Compare the index mapping with the documents produced by the indexer."),
        ),
        ErrorKind::ConfigError => ErrorHandlingPolicy::new(
            RetryDirective::NoRetry,
            Some("Verify the indexer configuration and credentials."),
        ),

        _ => ErrorHandlingPolicy::new(RetryDirective::NoRetry, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn err(kind: ErrorKind) -> EtlError {
        EtlError::from((kind, "test error"))
    }

    #[test]
    fn transient_kinds_are_retried() {
        for kind in [
            ErrorKind::SourceConnectionFailed,
            ErrorKind::SourceDatabaseShutdown,
            ErrorKind::DestinationConnectionFailed,
            ErrorKind::DestinationThrottled,
            ErrorKind::StateStoreConnectionFailed,
        ] {
            let policy = build_error_handling_policy(&err(kind));
            assert_eq!(policy.retry_directive(), RetryDirective::Timed);
            assert_eq!(policy.solution(), None);
        }
    }

    #[test]
    fn data_errors_are_not_retried() {
        let policy = build_error_handling_policy(&err(ErrorKind::ValidationError));
        assert_eq!(policy.retry_directive(), RetryDirective::NoRetry);
        assert!(policy.solution().is_some());

        let policy = build_error_handling_policy(&err(ErrorKind::SourceQueryFailed));
        assert_eq!(policy.retry_directive(), RetryDirective::NoRetry);
    }
}
