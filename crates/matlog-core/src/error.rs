use thiserror::Error;

/// Hot-path errors from a single variable's buffer.
///
/// Only [`VariableError::ShapeMismatch`] is ever returned from `append`; the
/// plain overflow/backpressure case is reported as `Ok(false)` rather than
/// an error (see the propagation policy in the crate docs).
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum VariableError {
    #[error("shape mismatch: expected {expected} elements, got {actual}")]
    ShapeMismatch { expected: usize, actual: usize },

    #[error("drain_one_block is not permitted while the buffer is in circular mode")]
    ModeViolation,
}

/// Construction- and structural-path errors from a [`crate::Logger`].
#[derive(Debug, Error)]
pub enum LoggerError {
    #[error("variable {0:?} already exists")]
    DuplicateVariable(String),

    #[error("invalid dimensions: rows={rows}, cols={cols}, buffer_size={buffer_size}")]
    InvalidDimensions {
        rows: i64,
        cols: i64,
        buffer_size: i64,
    },

    #[error("no variable named {0:?}")]
    UnknownVariable(String),

    #[error("file name {0:?} has a non-.mat extension")]
    BadFilename(String),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    MatData(#[from] MatDataError),

    #[error(transparent)]
    Variable(#[from] VariableError),
}

/// Errors surfaced by a [`crate::backend::MatBackend`] implementation.
///
/// Deliberately decoupled from any specific I/O library's error type so the
/// core never depends on a particular backend crate.
#[derive(Debug, Error, Clone)]
pub enum BackendError {
    #[error("failed to open backend at {path:?}: {message}")]
    OpenFailed { path: String, message: String },

    #[error("backend I/O error on variable {variable:?}: {message}")]
    IoFailed {
        variable: Option<String>,
        message: String,
    },

    #[error("variable {0:?} not present in backend")]
    MissingVariable(String),

    #[error(
        "variable {name:?}: shape mismatch, backend holds rows={existing_rows} cols={existing_cols}, got rows={rows} cols={cols}"
    )]
    ShapeMismatch {
        name: String,
        existing_rows: usize,
        existing_cols: usize,
        rows: usize,
        cols: usize,
    },
}

/// Runtime tag mismatch on a [`crate::mat_data::MatData`] accessor.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MatDataError {
    #[error("expected MatData tag {expected}, found {actual}")]
    WrongType {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("cell index {index} out of bounds (len {len})")]
    CellIndexOutOfBounds { index: usize, len: usize },

    #[error("struct has no field named {0:?}")]
    NoSuchField(String),
}
