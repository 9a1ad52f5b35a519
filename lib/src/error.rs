use num_enum::{FromPrimitive, IntoPrimitive};
use serde::{Deserialize, Serialize};

/// The externally visible error code taxonomy.
///
/// Every failure surfaced to a client maps to one of these codes. Codes are
/// stable across releases; new codes may be appended but existing values
/// never change meaning.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Placeholder for "no error recorded yet". An [`ErrorInfo`] holding
    /// this code may be overwritten by a later error.
    #[error("none")]
    None,

    /// A primary key or unique index rejected a duplicate entry.
    #[error("unique constraint violation: {0}")]
    UniqueConstraintViolation(String),

    /// A non-unique constraint (e.g. NOT NULL) was violated.
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    /// DDL attempted to create an object that already exists.
    #[error("target already exists: {0}")]
    TargetAlreadyExists(String),

    /// A long transaction wrote a storage outside its write-preserve list.
    #[error("ltx write operation without write preserve: {0}")]
    LtxWriteWithoutWritePreserve(String),

    /// A read-only transaction attempted a write operation.
    #[error("write operation by rtx: {0}")]
    WriteByRtx(String),

    /// The requested operation is valid SQL but not supported at runtime.
    #[error("unsupported runtime feature: {0}")]
    UnsupportedRuntimeFeature(String),

    /// The transaction already ended (committed or aborted) and accepts no
    /// further statements.
    #[error("inactive transaction: {0}")]
    InactiveTransaction(String),

    /// The request was canceled by the client.
    #[error("request canceled: {0}")]
    RequestCanceled(String),

    /// An I/O failure on the result channel or the storage layer.
    #[error("io error: {0}")]
    IoError(String),

    /// The storage layer detected a serialization conflict and the
    /// transaction must be retried.
    #[error("serialization failure: {0}")]
    SerializationFailure(String),

    /// The requested object does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Internal code for a storage operation racing with a concurrent one.
    /// Remapped before reaching the client (see the configuration knobs).
    #[error("concurrent operation: {0}")]
    ConcurrentOperation(String),

    /// The statement text failed to compile.
    #[error("compile error: {0}")]
    CompileError(String),

    /// A malformed argument from the client (bad handle, bad parameter).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// An unexpected engine-internal failure.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ErrorKind {
    /// Code used for comparing/serializing without the payload message.
    pub fn code_name(&self) -> &'static str {
        match self {
            ErrorKind::None => "none",
            ErrorKind::UniqueConstraintViolation(_) => "unique_constraint_violation_exception",
            ErrorKind::ConstraintViolation(_) => "constraint_violation_exception",
            ErrorKind::TargetAlreadyExists(_) => "target_already_exists",
            ErrorKind::LtxWriteWithoutWritePreserve(_) => {
                "ltx_write_operation_without_write_preserve_exception"
            }
            ErrorKind::WriteByRtx(_) => "write_operation_by_rtx_exception",
            ErrorKind::UnsupportedRuntimeFeature(_) => "unsupported_runtime_feature_exception",
            ErrorKind::InactiveTransaction(_) => "err_inactive_transaction",
            ErrorKind::RequestCanceled(_) => "request_canceled",
            ErrorKind::IoError(_) => "err_io_error",
            ErrorKind::SerializationFailure(_) => "err_serialization_failure",
            ErrorKind::NotFound(_) => "not_found",
            ErrorKind::ConcurrentOperation(_) => "concurrent_operation",
            ErrorKind::CompileError(_) => "compile_error",
            ErrorKind::InvalidArgument(_) => "invalid_argument",
            ErrorKind::Internal(_) => "internal",
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, ErrorKind::None)
    }

    /// The legacy status code that accompanies this kind on the wire.
    pub fn status(&self) -> Status {
        match self {
            ErrorKind::None => Status::Ok,
            ErrorKind::UniqueConstraintViolation(_) => Status::AlreadyExists,
            ErrorKind::ConstraintViolation(_) => Status::ErrIntegrityConstraintViolation,
            ErrorKind::TargetAlreadyExists(_) => Status::AlreadyExists,
            ErrorKind::LtxWriteWithoutWritePreserve(_) => Status::ErrIllegalOperation,
            ErrorKind::WriteByRtx(_) => Status::ErrIllegalOperation,
            ErrorKind::UnsupportedRuntimeFeature(_) => Status::ErrUnsupported,
            ErrorKind::InactiveTransaction(_) => Status::ErrInactiveTransaction,
            ErrorKind::RequestCanceled(_) => Status::RequestCanceled,
            ErrorKind::IoError(_) => Status::ErrIoError,
            ErrorKind::SerializationFailure(_) => Status::ErrSerializationFailure,
            ErrorKind::NotFound(_) => Status::NotFound,
            ErrorKind::ConcurrentOperation(_) => Status::Concurrent,
            ErrorKind::CompileError(_) => Status::ErrCompileError,
            ErrorKind::InvalidArgument(_) => Status::ErrInvalidArgument,
            ErrorKind::Internal(_) => Status::ErrUnknown,
        }
    }
}

/// Legacy compatibility status codes, kept alongside [`ErrorKind`] for
/// clients that still dispatch on the numeric value.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, IntoPrimitive, FromPrimitive,
)]
#[repr(i32)]
pub enum Status {
    Ok = 0,
    NotFound = 1,
    AlreadyExists = 2,
    UserRollback = 3,
    RequestCanceled = 4,
    Concurrent = 5,
    ErrIoError = -1000,
    ErrInvalidArgument = -1100,
    ErrCompileError = -1200,
    ErrInactiveTransaction = -1300,
    ErrSerializationFailure = -1400,
    ErrIntegrityConstraintViolation = -1500,
    ErrIllegalOperation = -1600,
    ErrUnsupported = -1700,
    #[num_enum(default)]
    ErrUnknown = -9999,
}

impl Status {
    pub fn is_ok(&self) -> bool {
        matches!(self, Status::Ok)
    }
}

/// Full error description attached to a request: the code, the legacy
/// status, a message and optional supplemental text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    kind: ErrorKind,
    status: Status,
    message: String,
    supplement: Option<String>,
}

impl ErrorInfo {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        let status = kind.status();
        Self {
            kind,
            status,
            message: message.into(),
            supplement: None,
        }
    }

    pub fn with_supplement(mut self, supplement: impl Into<String>) -> Self {
        self.supplement = Some(supplement.into());
        self
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn supplement(&self) -> Option<&str> {
        self.supplement.as_deref()
    }

    /// Whether a later error may replace this entry. Only the `none`
    /// placeholder is overwritable; the first real error wins.
    pub fn overwritable(&self) -> bool {
        self.kind.is_none()
    }
}

impl std::fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind.code_name(), self.message)?;
        if let Some(s) = &self.supplement {
            write!(f, " ({s})")?;
        }
        Ok(())
    }
}

/// The error type flowing through engine-internal `Result`s.
#[derive(thiserror::Error, Debug, Clone)]
#[error("{info}")]
pub struct EngineError {
    info: ErrorInfo,
}

impl EngineError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            info: ErrorInfo::new(kind, message),
        }
    }

    pub fn kind(&self) -> &ErrorKind {
        self.info.kind()
    }

    pub fn status(&self) -> Status {
        self.info.status()
    }

    pub fn info(&self) -> &ErrorInfo {
        &self.info
    }

    pub fn into_info(self) -> ErrorInfo {
        self.info
    }
}

impl From<ErrorInfo> for EngineError {
    fn from(info: ErrorInfo) -> Self {
        Self { info }
    }
}

impl From<ErrorKind> for EngineError {
    fn from(kind: ErrorKind) -> Self {
        let message = kind.to_string();
        Self {
            info: ErrorInfo::new(kind, message),
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trips_through_i32() {
        for status in [
            Status::Ok,
            Status::NotFound,
            Status::ErrInactiveTransaction,
            Status::ErrSerializationFailure,
        ] {
            let raw: i32 = status.into();
            assert_eq!(Status::from(raw), status);
        }
        // unknown values collapse to the catch-all
        assert_eq!(Status::from(12345), Status::ErrUnknown);
    }

    #[test]
    fn test_error_info_overwritable_only_for_none() {
        let none = ErrorInfo::new(ErrorKind::None, "");
        assert!(none.overwritable());
        let real = ErrorInfo::new(ErrorKind::NotFound("t".into()), "missing");
        assert!(!real.overwritable());
    }

    #[test]
    fn test_kind_maps_to_status() {
        assert_eq!(
            ErrorKind::InactiveTransaction(String::new()).status(),
            Status::ErrInactiveTransaction
        );
        assert_eq!(
            ErrorKind::UniqueConstraintViolation(String::new()).status(),
            Status::AlreadyExists
        );
        assert_eq!(
            ErrorKind::RequestCanceled(String::new()).status(),
            Status::RequestCanceled
        );
    }
}
