//! Error types and result definitions for indexing operations.
//!
//! Every fallible operation of the crate returns [`EtlResult`]. An [`EtlError`] carries an
//! [`ErrorKind`] used by the retry policy to decide whether a failed cycle is worth re-running,
//! a static description, an optional dynamic detail, the originating error and the location
//! where it was created.

use std::backtrace::Backtrace;
use std::borrow::Cow;
use std::error;
use std::fmt;
use std::panic::Location;
use std::sync::Arc;

/// Result type for indexing operations.
pub type EtlResult<T> = Result<T, EtlError>;

/// Error produced by any stage of the indexer.
///
/// Cloning is cheap: the source error and the backtrace are shared.
#[derive(Debug, Clone)]
pub struct EtlError {
    kind: ErrorKind,
    description: Cow<'static, str>,
    detail: Option<Cow<'static, str>>,
    source: Option<Arc<dyn error::Error + Send + Sync>>,
    location: &'static Location<'static>,
    backtrace: Arc<Backtrace>,
}

/// Categories of failures, grouped by the collaborator they originate from.
#[derive(PartialEq, Eq, Copy, Clone, Debug, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    // Source database
    SourceConnectionFailed,
    SourceQueryFailed,
    SourceDatabaseShutdown,
    SourceSchemaError,

    // Search index
    DestinationConnectionFailed,
    DestinationQueryFailed,
    /// Every failed item was rejected with a transient status (429 or 5xx).
    DestinationThrottled,
    /// At least one item was rejected for a non transient reason, for example a strict
    /// mapping violation.
    DestinationDocumentRejected,

    // Progress store
    StateStoreConnectionFailed,
    StateStoreError,

    // Data
    ValidationError,
    SerializationError,
    DeserializationError,

    // Workflow
    InvalidState,
    ConfigError,

    IoError,
    Unknown,
}

impl EtlError {
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Returns the dynamic detail attached to this error, if any.
    pub fn detail(&self) -> Option<&str> {
        self.detail.as_deref()
    }

    pub fn backtrace(&self) -> &Backtrace {
        self.backtrace.as_ref()
    }

    /// Returns the callsite where this error was created.
    pub fn location(&self) -> &'static Location<'static> {
        self.location
    }

    /// Attaches an originating error, exposed through [`error::Error::source`].
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: error::Error + Send + Sync + 'static,
    {
        self.source = Some(Arc::new(source));
        self
    }

    #[track_caller]
    fn from_components(
        kind: ErrorKind,
        description: Cow<'static, str>,
        detail: Option<Cow<'static, str>>,
        source: Option<Arc<dyn error::Error + Send + Sync>>,
    ) -> Self {
        EtlError {
            kind,
            description,
            detail,
            source,
            location: Location::caller(),
            backtrace: Arc::new(Backtrace::capture()),
        }
    }
}

impl PartialEq for EtlError {
    fn eq(&self, other: &EtlError) -> bool {
        self.kind == other.kind
    }
}

impl fmt::Display for EtlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{:?}] {} @ {}:{}:{}",
            self.kind,
            self.description,
            self.location.file(),
            self.location.line(),
            self.location.column()
        )?;

        if let Some(detail) = &self.detail {
            write!(f, "\n  Detail:")?;
            for line in detail.lines() {
                write!(f, "\n    {line}")?;
            }
        }

        let backtrace = self.backtrace.to_string();
        if !backtrace.trim().is_empty() {
            write!(f, "\n  Backtrace:")?;
            for line in backtrace.lines() {
                write!(f, "\n    {line}")?;
            }
        }

        Ok(())
    }
}

impl error::Error for EtlError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|source| source.as_ref() as &(dyn error::Error + 'static))
    }
}

impl From<(ErrorKind, &'static str)> for EtlError {
    #[track_caller]
    fn from((kind, desc): (ErrorKind, &'static str)) -> EtlError {
        EtlError::from_components(kind, Cow::Borrowed(desc), None, None)
    }
}

impl<D> From<(ErrorKind, &'static str, D)> for EtlError
where
    D: Into<Cow<'static, str>>,
{
    #[track_caller]
    fn from((kind, desc, detail): (ErrorKind, &'static str, D)) -> EtlError {
        EtlError::from_components(kind, Cow::Borrowed(desc), Some(detail.into()), None)
    }
}

/// Builds an [`EtlError`] wrapping `err` as its source and its message as detail.
#[track_caller]
fn wrap<E>(kind: ErrorKind, description: &'static str, err: E) -> EtlError
where
    E: error::Error + Send + Sync + 'static,
{
    let detail = err.to_string();
    EtlError::from_components(
        kind,
        Cow::Borrowed(description),
        Some(Cow::Owned(detail)),
        Some(Arc::new(err)),
    )
}

impl From<std::io::Error> for EtlError {
    #[track_caller]
    fn from(err: std::io::Error) -> EtlError {
        wrap(ErrorKind::IoError, "I/O operation failed", err)
    }
}

impl From<serde_json::Error> for EtlError {
    #[track_caller]
    fn from(err: serde_json::Error) -> EtlError {
        let (kind, description) = match err.classify() {
            serde_json::error::Category::Io => (ErrorKind::IoError, "JSON I/O operation failed"),
            serde_json::error::Category::Syntax
            | serde_json::error::Category::Data
            | serde_json::error::Category::Eof => (
                ErrorKind::DeserializationError,
                "JSON deserialization failed",
            ),
        };

        wrap(kind, description, err)
    }
}

/// SQLSTATE class for connection exceptions.
const SQLSTATE_CONNECTION_EXCEPTION_CLASS: &str = "08";

/// SQLSTATE codes reported while the server shuts down or is not yet accepting connections.
const SQLSTATE_SHUTDOWN_CODES: &[&str] = &["57P01", "57P02", "57P03"];

const SQLSTATE_UNDEFINED_TABLE: &str = "42P01";

const SQLSTATE_UNDEFINED_COLUMN: &str = "42703";

/// Classifies [`sqlx::Error`] so that unreachable or restarting databases are retried while
/// query bugs are not.
impl From<sqlx::Error> for EtlError {
    #[track_caller]
    fn from(err: sqlx::Error) -> EtlError {
        let (kind, description) = match &err {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => (
                ErrorKind::SourceConnectionFailed,
                "Source database connection failed",
            ),
            sqlx::Error::Database(db_err) => match db_err.code().as_deref() {
                Some(code) if code.starts_with(SQLSTATE_CONNECTION_EXCEPTION_CLASS) => (
                    ErrorKind::SourceConnectionFailed,
                    "Source database connection failed",
                ),
                Some(code) if SQLSTATE_SHUTDOWN_CODES.contains(&code) => (
                    ErrorKind::SourceDatabaseShutdown,
                    "Source database is shutting down",
                ),
                Some(SQLSTATE_UNDEFINED_TABLE | SQLSTATE_UNDEFINED_COLUMN) => (
                    ErrorKind::SourceSchemaError,
                    "Source schema does not match the expected layout",
                ),
                _ => (ErrorKind::SourceQueryFailed, "Source query failed"),
            },
            sqlx::Error::ColumnDecode { .. }
            | sqlx::Error::ColumnNotFound(_)
            | sqlx::Error::Decode(_) => (
                ErrorKind::SourceSchemaError,
                "Source row could not be decoded",
            ),
            _ => (ErrorKind::SourceQueryFailed, "Source query failed"),
        };

        wrap(kind, description, err)
    }
}

/// Classifies [`reqwest::Error`], treating transport level failures as connection errors.
impl From<reqwest::Error> for EtlError {
    #[track_caller]
    fn from(err: reqwest::Error) -> EtlError {
        let (kind, description) = if err.is_connect() || err.is_timeout() {
            (
                ErrorKind::DestinationConnectionFailed,
                "Search index connection failed",
            )
        } else if err.is_decode() {
            (
                ErrorKind::DeserializationError,
                "Search index response could not be decoded",
            )
        } else if err.is_request() || err.is_body() {
            (
                ErrorKind::DestinationConnectionFailed,
                "Search index request could not be sent",
            )
        } else {
            (ErrorKind::DestinationQueryFailed, "Search index request failed")
        };

        wrap(kind, description, err)
    }
}

/// Classifies [`fred::error::Error`], treating transport level failures as connection errors.
impl From<fred::error::Error> for EtlError {
    #[track_caller]
    fn from(err: fred::error::Error) -> EtlError {
        use fred::error::ErrorKind as RedisErrorKind;

        let (kind, description) = match err.kind() {
            RedisErrorKind::IO
            | RedisErrorKind::Timeout
            | RedisErrorKind::Canceled
            | RedisErrorKind::Backpressure => (
                ErrorKind::StateStoreConnectionFailed,
                "State store connection failed",
            ),
            RedisErrorKind::Auth | RedisErrorKind::Config | RedisErrorKind::Url => {
                (ErrorKind::ConfigError, "State store configuration is invalid")
            }
            _ => (ErrorKind::StateStoreError, "State store operation failed"),
        };

        wrap(kind, description, err)
    }
}
