//! Error types for the rowgen generation engine.
//!
//! This module defines a hierarchy of error types following best practices:
//!
//! - [`CsvError`] - CSV reading/writing errors
//! - [`GenerateError`] - Generation backend errors
//! - [`JobError`] - Batch job orchestration errors
//!
//! Error conversion is automatic via `From` implementations,
//! allowing `?` to work across error boundaries.
//!
//! Template resolution deliberately has no error type: a malformed or
//! unknown reference resolves to an empty string instead of failing, so a
//! single bad reference can never abort a whole batch run.

use thiserror::Error;

// =============================================================================
// CSV Errors
// =============================================================================

/// Errors during CSV reading or writing.
#[derive(Debug, Error)]
pub enum CsvError {
    /// Failed to read or write a file.
    #[error("Failed to read file: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to decode content with the detected encoding.
    #[error("Failed to decode content: {0}")]
    EncodingError(String),

    /// Invalid CSV format.
    #[error("Invalid CSV format: {0}")]
    ParseError(String),

    /// Empty file.
    #[error("CSV file is empty")]
    EmptyFile,

    /// No headers found.
    #[error("No headers found in CSV")]
    NoHeaders,
}

impl From<csv::Error> for CsvError {
    fn from(e: csv::Error) -> Self {
        CsvError::ParseError(e.to_string())
    }
}

// =============================================================================
// Generation Backend Errors
// =============================================================================

/// Errors from the generation backend client.
#[derive(Debug, Error)]
pub enum GenerateError {
    /// Network-level failure (connection refused, DNS, timeout, ...).
    #[error("Network error: {0}")]
    Network(String),

    /// Authentication or authorization rejected by the backend.
    #[error("Invalid API key: {0}")]
    Auth(String),

    /// Backend returned a non-success HTTP status.
    #[error("Ollama API error: {status}")]
    Api { status: u16 },

    /// A streamed chunk was not valid JSON.
    #[error("Invalid response chunk: {0}")]
    InvalidChunk(String),

    /// The backend completed but produced no text.
    #[error("Empty response from backend")]
    EmptyResponse,

    /// The in-flight call was cancelled by a stop request.
    #[error("Generation cancelled")]
    Cancelled,
}

impl GenerateError {
    /// Whether this error aborts the whole batch job instead of
    /// failing a single row.
    ///
    /// Auth failures, network failures, and non-success responses from the
    /// generation endpoint are job-aborting; everything else only fails the
    /// row it occurred on.
    pub fn is_critical(&self) -> bool {
        matches!(
            self,
            GenerateError::Auth(_) | GenerateError::Network(_) | GenerateError::Api { .. }
        )
    }

    /// Whether this error is a cancellation signal rather than a failure.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, GenerateError::Cancelled)
    }
}

impl From<reqwest::Error> for GenerateError {
    fn from(e: reqwest::Error) -> Self {
        if let Some(status) = e.status() {
            if status.as_u16() == 401 || status.as_u16() == 403 {
                return GenerateError::Auth(e.to_string());
            }
            return GenerateError::Api {
                status: status.as_u16(),
            };
        }
        GenerateError::Network(e.to_string())
    }
}

// =============================================================================
// Job Errors (top-level)
// =============================================================================

/// Batch job orchestration errors.
///
/// This is the main error type returned by [`crate::job::run_job`].
#[derive(Debug, Error)]
pub enum JobError {
    /// The row selection expression matched no valid rows.
    #[error("No valid rows to process")]
    NoTargetRows,

    /// No output column name was provided.
    #[error("No output column name provided")]
    MissingColumn,

    /// A critical backend error aborted the job at the given 1-based row.
    /// Rows committed before the abort are kept.
    #[error("Job aborted at row {row}: {source}")]
    Aborted {
        row: usize,
        #[source]
        source: GenerateError,
    },

    /// CSV error while loading the dataset.
    #[error("CSV error: {0}")]
    Csv(#[from] CsvError),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for CSV operations.
pub type CsvResult<T> = Result<T, CsvError>;

/// Result type for generation backend operations.
pub type GenerateResult<T> = Result<T, GenerateError>;

/// Result type for batch job operations.
pub type JobResult<T> = Result<T, JobError>;
