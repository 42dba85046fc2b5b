//! # Rowgen - AI-powered CSV column generation
//!
//! Rowgen adds a generated column to a CSV dataset, one row at a time, from
//! a prompt template that can reference the row's own cells, other rows'
//! cells, and ranges of rows.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌──────────────┐     ┌─────────────┐     ┌─────────────┐
//! │   CSV File  │────▶│   Template   │────▶│  Batch Job  │────▶│  CSV File   │
//! │  (auto-enc) │     │ interpolator │     │ (Ollama)    │     │ (+1 column) │
//! └─────────────┘     └──────────────┘     └─────────────┘     └─────────────┘
//! ```
//!
//! Rows are processed strictly sequentially: each row's template resolves
//! against the job's running snapshot, so later rows can reference values
//! generated for earlier rows in the same run.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use rowgen::{parse_csv_file_auto, run_job, JobSpec, OllamaClient};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut parsed = parse_csv_file_auto("cities.csv".as_ref()).unwrap();
//!     let client = OllamaClient::new("http://localhost:11434", "llama3.2");
//!     let spec = JobSpec::new("Capital of @[country]?", "capital", "all");
//!     let report = run_job(
//!         &mut parsed.dataset,
//!         &spec,
//!         &client,
//!         CancellationToken::new(),
//!         None,
//!     )
//!     .await
//!     .unwrap();
//!     println!("{}", report.summary());
//! }
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Hierarchical error types
//! - [`model`] - Dataset and row models
//! - [`parser`] - CSV parsing with auto-detection
//! - [`template`] - Reference parsing and interpolation
//! - [`job`] - Batch job controller
//! - [`ollama`] - Streaming generation client
//! - [`logs`] - Progress log broadcasting

// Core modules
pub mod error;
pub mod model;

// Parsing
pub mod parser;

// Template resolution
pub mod template;

// Batch jobs
pub mod job;

// Generation backend
pub mod ollama;

// Logging
pub mod logs;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{
    CsvError, CsvResult, GenerateError, GenerateResult, JobError, JobResult,
};

// =============================================================================
// Re-exports - Models
// =============================================================================

pub use model::{Dataset, Row};

// =============================================================================
// Re-exports - CSV Parsing
// =============================================================================

pub use parser::{
    decode_content, detect_delimiter, detect_encoding, parse_bytes_auto, parse_csv,
    parse_csv_file_auto, write_csv, write_csv_file, ParseResult,
};

// =============================================================================
// Re-exports - Template Resolution
// =============================================================================

pub use template::{
    interpolate, parse_template, resolve_reference, PositionToken, RangeCall, Reference, Segment,
};

// =============================================================================
// Re-exports - Batch Jobs
// =============================================================================

pub use job::{
    parse_selection, run_job, Generator, JobEvent, JobOptions, JobReport, JobSpec, RowFailure,
    RowState,
};

// =============================================================================
// Re-exports - Generation Client
// =============================================================================

pub use ollama::{OllamaClient, SamplingOptions, DEFAULT_BASE_URL};
