// models/src/errors.rs

pub use thiserror::Error;

/// Errors raised by the consent and access-control core.
///
/// The first three variants are the caller-facing taxonomy; the storage and
/// serialization variants are internal and surface as 5xx-equivalents.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// A referenced user, connection or consent does not exist.
    #[error("Not found: {0}")]
    NotFound(String),
    /// The caller lacks rights for the requested operation.
    #[error("Access denied: {0}")]
    Forbidden(String),
    /// An invariant would be violated (duplicate row, bad state transition).
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Invalid data provided: {0}")]
    InvalidData(String),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// The underlying store could not be reached or refused the write.
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),
    #[error("Serialization error: {0}")]
    SerializationError(String),
    #[error("Configuration error: {0}")]
    ConfigurationError(String),
    #[error("An internal error occurred: {0}")]
    InternalError(String),
}

impl LedgerError {
    pub fn is_storage_failure(&self) -> bool {
        matches!(self, LedgerError::StorageUnavailable(_))
    }
}

impl From<serde_json::Error> for LedgerError {
    fn from(err: serde_json::Error) -> Self {
        LedgerError::SerializationError(format!("JSON processing error: {}", err))
    }
}

#[cfg(feature = "sled-errors")]
impl From<sled::Error> for LedgerError {
    fn from(err: sled::Error) -> Self {
        LedgerError::StorageUnavailable(err.to_string())
    }
}

#[cfg(feature = "sled-errors")]
impl From<sled::transaction::TransactionError<LedgerError>> for LedgerError {
    fn from(err: sled::transaction::TransactionError<LedgerError>) -> Self {
        match err {
            sled::transaction::TransactionError::Abort(inner) => inner,
            sled::transaction::TransactionError::Storage(e) => LedgerError::StorageUnavailable(e.to_string()),
        }
    }
}

#[cfg(feature = "bincode-errors")]
impl From<bincode::error::EncodeError> for LedgerError {
    fn from(err: bincode::error::EncodeError) -> Self {
        LedgerError::SerializationError(format!("Bincode encode error: {}", err))
    }
}

#[cfg(feature = "bincode-errors")]
impl From<bincode::error::DecodeError> for LedgerError {
    fn from(err: bincode::error::DecodeError) -> Self {
        LedgerError::SerializationError(format!("Bincode decode error: {}", err))
    }
}

/// A validation error for caller-supplied fields.
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    /// An identifier is not a well-formed UUID.
    #[error("identifier '{0}' is invalid")]
    InvalidIdentifier(String),
    /// A free-text field is shorter than the configured minimum.
    #[error("{field} must be at least {min} characters long")]
    TooShort { field: &'static str, min: usize },
    /// A required free-text field was missing or blank.
    #[error("{0} is required")]
    MissingField(&'static str),
    /// An expiry timestamp is not in the future.
    #[error("expiry must be in the future")]
    ExpiryInPast,
    /// A user tried to relate to themselves.
    #[error("a user cannot connect to or consent for themselves")]
    SelfReference,
    #[error("unknown value '{value}' for {field}")]
    UnknownVariant { field: &'static str, value: String },
}

/// A type alias for a `Result` that returns a `LedgerError` on failure.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// A type alias for a `Result` that returns a `ValidationError` on failure.
pub type ValidationResult<T> = Result<T, ValidationError>;
