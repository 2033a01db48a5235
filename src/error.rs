use thiserror::Error;

/// Failure building an `AttendanceRecord` from serialized cells.
///
/// This is the only error a consumer of cleaned output has to handle for
/// row content; the extraction pipeline itself drops bad rows instead.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecordError {
    #[error("expected {expected} columns, found {found}")]
    WrongColumnCount { expected: usize, found: usize },

    #[error("column '{column}' is not a non-negative integer: '{value}'")]
    InvalidInteger { column: &'static str, value: String },

    #[error("header does not match: expected '{expected}', found '{found}'")]
    HeaderMismatch { expected: String, found: String },
}

/// Structural failures of a pipeline run. Row content never produces one.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error in {path}: {source}")]
    Csv {
        path: String,
        #[source]
        source: csv::Error,
    },

    #[error("malformed record at line {line} of {path}: {source}")]
    Record {
        path: String,
        line: usize,
        #[source]
        source: RecordError,
    },
}

pub type Result<T> = std::result::Result<T, PipelineError>;
