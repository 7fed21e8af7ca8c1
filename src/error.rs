// Error taxonomy shared by the registry and both ledgers

use thiserror::Error;

/// Errors surfaced by ledger and registry operations
#[derive(Error, Debug)]
pub enum LedgerError {
    /// Bad input from the caller
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Member not found: {0}")]
    NotFound(String),

    /// Attendance is blocked until the outstanding fee is settled
    #[error("Payment of {amount_due} required before recording attendance for {member_code}")]
    PaymentRequired { member_code: String, amount_due: i64 },

    #[error("No payment due for member {0}")]
    NothingDue(String),

    /// Generated member code already exists; retry with a fresh code
    #[error("Member code already in use: {0}")]
    Conflict(String),

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),
}

impl LedgerError {
    /// Whether the caller may retry the same operation unchanged
    pub fn is_retryable(&self) -> bool {
        match self {
            LedgerError::Conflict(_) => true,
            LedgerError::Storage(err) => matches!(
                err.sqlite_error_code(),
                Some(rusqlite::ErrorCode::DatabaseBusy) | Some(rusqlite::ErrorCode::DatabaseLocked)
            ),
            _ => false,
        }
    }

    /// True for a SQLite constraint violation (unique, primary key, check)
    pub(crate) fn is_constraint_violation(&self) -> bool {
        matches!(
            self,
            LedgerError::Storage(err)
                if err.sqlite_error_code() == Some(rusqlite::ErrorCode::ConstraintViolation)
        )
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;

/// Errors raised while loading configuration
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Unknown transport in fee schedule: {0}")]
    UnknownTransport(String),

    #[error("Fee schedule is missing transport {0}")]
    MissingTransport(&'static str),

    #[error("Invalid fee for {transport}: {reason}")]
    InvalidFee { transport: String, reason: String },

    #[error("Malformed fee entry '{0}' (expected TRANSPORT=AMOUNT)")]
    MalformedEntry(String),
}
