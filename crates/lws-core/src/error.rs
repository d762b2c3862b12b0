//! Error types for the light-wallet server.
//!
//! Every fallible operation returns [`Expect<T>`], a plain `Result` over the
//! closed [`Error`] taxonomy. Errors carry a stable numeric [`ErrorCode`] and
//! can be compared against coarse [`Condition`] classes, so callers can react
//! to "no entry" or "timed out" without knowing which layer produced it.
//!
//! Broken store invariants are not errors: they are [`ConsistencyViolation`]s
//! and abort the current operation through [`raise`].
use std::fmt;

use thiserror::Error;

use crate::types::OutputId;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum LwsError {
    #[error("Account with specified address already exists")] AccountExists = 1,
    #[error("Invalid base58 public address - wrong --network ?")] BadAddress,
    #[error("Address/viewkey mismatch")] BadViewKey,
    #[error("Unable to sync blockchain - wrong --network ?")] BadBlockchain,
    #[error("REST client submitted invalid transaction")] BadClientTx,
    #[error("RPC response from daemon was invalid")] BadDaemonResponse,
    #[error("A blockchain reorg has been detected")] BlockchainReorg,
    #[error("Exceeded maxmimum number of pending account requests")] CreateQueueMax,
    #[error("Connection failed with daemon")] DaemonConnectionFailure,
    #[error("Timeout on send/receive with daemon")] DaemonTimeout,
    #[error("A request of this type for this address has already been made")] DuplicateRequest,
    #[error("Exceeded internal buffer for blockchain hashes")] ExceededBlockchainBuffer,
    #[error("Exceeded enforced size limits for request")] ExceededRestRequestLimit,
    #[error("No account with the specified address exists")] NoSuchAccount,
    #[error("System clock is out of range for account storage format")] SystemClockInvalidRange,
    #[error("Daemon failed to relay transaction from REST client")] TxRelayFailed,
}

impl LwsError {
    const ALL: [LwsError; 16] = [
        Self::AccountExists,
        Self::BadAddress,
        Self::BadViewKey,
        Self::BadBlockchain,
        Self::BadClientTx,
        Self::BadDaemonResponse,
        Self::BlockchainReorg,
        Self::CreateQueueMax,
        Self::DaemonConnectionFailure,
        Self::DaemonTimeout,
        Self::DuplicateRequest,
        Self::ExceededBlockchainBuffer,
        Self::ExceededRestRequestLimit,
        Self::NoSuchAccount,
        Self::SystemClockInvalidRange,
        Self::TxRelayFailed,
    ];

    fn from_value(value: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|e| *e as u32 == value)
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum CommonError {
    #[error("Default constructed error code was used where an error was expected")]
    InvalidErrorCode = 1,
    #[error("Invalid argument")] InvalidArgument,
    #[error("Cryptographic function failed")] CryptoFailure,
}

impl CommonError {
    fn from_value(value: u32) -> Option<Self> {
        [Self::InvalidErrorCode, Self::InvalidArgument, Self::CryptoFailure]
            .into_iter()
            .find(|e| *e as u32 == value)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("no entry found")] NotFound,
    #[error("missing column family: {0}")] MissingTable(String),
    #[error("storage busy")] Busy,
    #[error("storage operation timed out")] TimedOut,
    #[error("storage: {0}")] Backend(String),
}

impl StorageError {
    fn value(&self) -> u32 {
        match self {
            Self::NotFound => 1,
            Self::MissingTable(_) => 2,
            Self::Busy => 3,
            Self::TimedOut => 4,
            Self::Backend(_) => 5,
        }
    }

    fn from_value(value: u32) -> Option<Self> {
        match value {
            1 => Some(Self::NotFound),
            2 => Some(Self::MissingTable(String::new())),
            3 => Some(Self::Busy),
            4 => Some(Self::TimedOut),
            5 => Some(Self::Backend(String::new())),
            _ => None,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error(transparent)] Lws(#[from] LwsError),
    #[error(transparent)] Common(#[from] CommonError),
    #[error(transparent)] Storage(#[from] StorageError),
}

/// Value-or-error returned by every fallible operation.
pub type Expect<T> = Result<T, Error>;

/// The successful `Expect<()>`.
pub fn success() -> Expect<()> {
    Ok(())
}

/// Error domain of an [`ErrorCode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Lws,
    Common,
    Storage,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Lws => "lws::error_category()",
            Self::Common => "common_category()",
            Self::Storage => "storage_category()",
        };
        f.write_str(name)
    }
}

/// Raw `(category, value)` pair, the portable form of an [`Error`].
///
/// Value `0` is reserved for "no error" and never round-trips: converting it
/// into an [`Error`] yields [`CommonError::InvalidErrorCode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ErrorCode {
    category: Category,
    value: u32,
}

impl ErrorCode {
    pub const fn new(category: Category, value: u32) -> Self {
        Self { category, value }
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn value(&self) -> u32 {
        self.value
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.category, self.value)
    }
}

impl From<ErrorCode> for Error {
    fn from(code: ErrorCode) -> Self {
        let decoded = match code.category {
            Category::Lws => LwsError::from_value(code.value).map(Error::Lws),
            Category::Common => CommonError::from_value(code.value).map(Error::Common),
            Category::Storage => StorageError::from_value(code.value).map(Error::Storage),
        };
        decoded.unwrap_or(Error::Common(CommonError::InvalidErrorCode))
    }
}

/// Generic condition classes for coarse-grained error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Condition {
    BadAddress,
    ConnectionRefused,
    NoBufferSpace,
    ResultOutOfRange,
    TimedOut,
    NoLockAvailable,
    NoEntry,
    InvalidArgument,
}

impl Error {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Lws(e) => ErrorCode::new(Category::Lws, *e as u32),
            Self::Common(e) => ErrorCode::new(Category::Common, *e as u32),
            Self::Storage(e) => ErrorCode::new(Category::Storage, e.value()),
        }
    }

    /// The generic condition this error maps to, if any.
    pub fn condition(&self) -> Option<Condition> {
        match self {
            Self::Lws(LwsError::BadAddress | LwsError::BadViewKey) => Some(Condition::BadAddress),
            Self::Lws(LwsError::DaemonConnectionFailure) => Some(Condition::ConnectionRefused),
            Self::Lws(LwsError::ExceededBlockchainBuffer) => Some(Condition::NoBufferSpace),
            Self::Lws(LwsError::SystemClockInvalidRange) => Some(Condition::ResultOutOfRange),
            Self::Lws(LwsError::DaemonTimeout) => Some(Condition::TimedOut),
            Self::Common(CommonError::InvalidArgument) => Some(Condition::InvalidArgument),
            Self::Storage(StorageError::NotFound) => Some(Condition::NoEntry),
            Self::Storage(StorageError::Busy) => Some(Condition::NoLockAvailable),
            Self::Storage(StorageError::TimedOut) => Some(Condition::TimedOut),
            _ => None,
        }
    }

    pub fn matches(&self, condition: Condition) -> bool {
        self.condition() == Some(condition)
    }
}

/// Inspection helpers for [`Expect`].
pub trait ExpectExt<T> {
    /// False when holding a value, otherwise whether the error maps to `condition`.
    fn matches(&self, condition: Condition) -> bool;

    /// Raw error code; `None` when holding a value.
    fn error_code(&self) -> Option<ErrorCode>;

    /// The payload, or a fatal failure carrying the error and `annotation`.
    fn value_or_raise(self, annotation: &str) -> T;
}

impl<T> ExpectExt<T> for Expect<T> {
    fn matches(&self, condition: Condition) -> bool {
        match self {
            Ok(_) => false,
            Err(e) => e.matches(condition),
        }
    }

    fn error_code(&self) -> Option<ErrorCode> {
        self.as_ref().err().map(Error::code)
    }

    #[track_caller]
    fn value_or_raise(self, annotation: &str) -> T {
        match self {
            Ok(value) => value,
            Err(e) => {
                let location = std::panic::Location::caller();
                panic!("{annotation} ({}:{}): {e} [{}]", location.file(), location.line(), e.code())
            }
        }
    }
}

/// A broken structural invariant between the scanner (writer) and the reader.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConsistencyViolation {
    #[error("Serious database error, no receive for spend of output {output}")]
    NoReceiveForSpend { output: OutputId },
    #[error("DB has unexpected sort order: {next} after {trailing}")]
    UnexpectedSortOrder { trailing: OutputId, next: OutputId },
    #[error("record size mismatch in {table}: expected {expected} bytes, found {found}")]
    RecordSize { table: &'static str, expected: usize, found: usize },
}

/// Abort the current operation on a store consistency violation.
#[track_caller]
pub fn raise(violation: ConsistencyViolation) -> ! {
    tracing::error!(%violation, "store consistency violation");
    panic!("store consistency violation: {violation}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_code_is_invalid_error_code() {
        for category in [Category::Lws, Category::Common, Category::Storage] {
            let err = Error::from(ErrorCode::new(category, 0));
            assert_eq!(err, Error::Common(CommonError::InvalidErrorCode));
            let result: Expect<u64> = Err(ErrorCode::new(category, 0).into());
            assert_eq!(
                result.error_code(),
                Some(ErrorCode::new(Category::Common, CommonError::InvalidErrorCode as u32))
            );
        }
    }

    #[test]
    fn unknown_code_is_invalid_error_code() {
        let err = Error::from(ErrorCode::new(Category::Lws, 9999));
        assert_eq!(err, Error::Common(CommonError::InvalidErrorCode));
    }

    #[test]
    fn codes_round_trip_through_error() {
        for e in LwsError::ALL {
            let err = Error::from(e);
            assert_ne!(err.code().value(), 0);
            assert_eq!(Error::from(err.code()), err);
        }
        let err = Error::from(StorageError::NotFound);
        assert_eq!(Error::from(err.code()), err);
    }

    #[test]
    fn not_found_matches_no_entry() {
        let result: Expect<()> = Err(StorageError::NotFound.into());
        assert!(result.matches(Condition::NoEntry));
        assert!(!result.matches(Condition::TimedOut));
    }

    #[test]
    fn value_never_matches() {
        let result: Expect<u32> = Ok(5);
        assert!(!result.matches(Condition::NoEntry));
        assert_eq!(result.error_code(), None);
    }

    #[test]
    fn no_such_account_is_unmatchable() {
        let err = Error::from(LwsError::NoSuchAccount);
        assert_eq!(err.condition(), None);
        assert_eq!(err, Error::Lws(LwsError::NoSuchAccount));
    }

    #[test]
    fn view_key_mismatch_is_bad_address() {
        assert!(Error::from(LwsError::BadViewKey).matches(Condition::BadAddress));
        assert!(Error::from(LwsError::ExceededBlockchainBuffer).matches(Condition::NoBufferSpace));
        let err = Error::from(LwsError::SystemClockInvalidRange);
        assert!(err.matches(Condition::ResultOutOfRange));
    }

    #[test]
    fn conversion_uses_map_and_question_mark() {
        fn inner() -> Expect<u32> {
            Ok(7)
        }
        fn outer() -> Expect<u64> {
            let v = inner().map(u64::from)?;
            Ok(v * 2)
        }
        assert_eq!(outer(), Ok(14));
        assert_eq!(success(), Ok(()));
    }

    #[test]
    fn value_or_raise_returns_value() {
        let result: Expect<&str> = Ok("ok");
        assert_eq!(result.value_or_raise("reading"), "ok");
    }

    #[test]
    #[should_panic(expected = "reading last block")]
    fn value_or_raise_panics_with_annotation() {
        let result: Expect<u8> = Err(StorageError::NotFound.into());
        result.value_or_raise("reading last block");
    }

    #[test]
    #[should_panic(expected = "no receive for spend")]
    fn raise_panics() {
        raise(ConsistencyViolation::NoReceiveForSpend { output: OutputId::new(1, 2) });
    }
}
