//! Custom error types for the consolidation pipeline.
//!
//! This module provides the error hierarchy using `thiserror`. Value-level
//! parse failures never reach this type: they degrade to null or zero inside
//! [`crate::coercion`]. What remains here are the fatal conditions of a run
//! (missing files, sheets or columns) and the wrapped I/O and library errors.
//!
//! Errors are serializable so a host application can forward them as
//! `{code, message}` objects.

use crate::sources::SourceKind;
use serde::Serialize;
use serde::ser::SerializeStruct;
use std::path::PathBuf;
use thiserror::Error;

/// The main error type for the consolidation pipeline.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// A source extract does not exist on disk.
    #[error("{kind} source not found: {}", .path.display())]
    SourceNotFound { kind: SourceKind, path: PathBuf },

    /// The named sheet is missing from a spreadsheet source.
    #[error("{kind} source has no sheet named '{sheet}' (available: {available:?})")]
    SheetNotFound {
        kind: SourceKind,
        sheet: String,
        available: Vec<String>,
    },

    /// A required column is missing from a source extract.
    #[error("{kind} source is missing required column '{column}'")]
    ColumnNotFound { kind: SourceKind, column: String },

    /// The header row could not be located (skip offset past the end of the data).
    #[error("{kind} source has no header row after skipping {skip_rows} rows")]
    MissingHeader { kind: SourceKind, skip_rows: usize },

    /// The configured text encoding label is not recognised.
    #[error("Unsupported text encoding '{0}'")]
    UnsupportedEncoding(String),

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Output data could not be persisted.
    #[error("Failed to write output '{name}': {reason}")]
    WriteFailed { name: String, reason: String },

    /// No consolidated output is available to read back.
    #[error("No consolidated data found in {}", .0.display())]
    NoDataLoaded(PathBuf),

    /// IO error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Polars error wrapper.
    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    /// Spreadsheet reader error wrapper.
    #[error("Spreadsheet error: {0}")]
    Spreadsheet(#[from] calamine::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context.
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<PipelineError>,
    },
}

impl PipelineError {
    /// Add context to an error.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        PipelineError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Get a stable error code for host-side handling.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::SourceNotFound { .. } => "SOURCE_NOT_FOUND",
            Self::SheetNotFound { .. } => "SHEET_NOT_FOUND",
            Self::ColumnNotFound { .. } => "COLUMN_NOT_FOUND",
            Self::MissingHeader { .. } => "MISSING_HEADER",
            Self::UnsupportedEncoding(_) => "UNSUPPORTED_ENCODING",
            Self::InvalidConfig(_) => "INVALID_CONFIG",
            Self::WriteFailed { .. } => "WRITE_FAILED",
            Self::NoDataLoaded(_) => "NO_DATA_LOADED",
            Self::Io(_) => "IO_ERROR",
            Self::Polars(_) => "POLARS_ERROR",
            Self::Spreadsheet(_) => "SPREADSHEET_ERROR",
            Self::Json(_) => "JSON_ERROR",
            Self::WithContext { source, .. } => source.error_code(),
        }
    }

    /// Whether the error points at a missing or malformed input artifact.
    ///
    /// These are the failures an operator fixes by correcting the inputs and
    /// re-running; everything else is an environment or programming problem.
    pub fn is_input_problem(&self) -> bool {
        match self {
            Self::SourceNotFound { .. }
            | Self::SheetNotFound { .. }
            | Self::ColumnNotFound { .. }
            | Self::MissingHeader { .. }
            | Self::UnsupportedEncoding(_) => true,
            Self::WithContext { source, .. } => source.is_input_problem(),
            _ => false,
        }
    }
}

impl Serialize for PipelineError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut state = serializer.serialize_struct("PipelineError", 2)?;
        state.serialize_field("code", &self.error_code())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Add context to an error result.
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, polars::error::PolarsError> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| PipelineError::Polars(e).with_context(context))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, calamine::Error> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| PipelineError::Spreadsheet(e).with_context(context))
    }
}
