//! Row batch job controller.
//!
//! Drives one generation call per target row, strictly sequentially: row
//! `i`'s template is resolved against the job's running dataset copy, so it
//! sees every value committed by rows processed earlier in the same run and
//! the original values everywhere else. At most one backend call is in
//! flight at any time.
//!
//! Failure containment follows three tiers:
//!
//! - row-level errors are retried once, then recorded and the job moves on;
//! - critical errors (auth, network, non-2xx response) abort the whole job,
//!   keeping already-committed rows;
//! - cancellation stops the job without recording an error for the row that
//!   was in flight.

pub mod selection;

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::future::Future;
use tokio::sync::mpsc;
use tokio::time::{sleep, Duration};
use tokio_util::sync::CancellationToken;

use crate::error::{GenerateError, GenerateResult, JobError, JobResult};
use crate::logs::{log_error, log_info, log_success, log_warning};
use crate::model::{Dataset, Row};
use crate::template::interpolate;

pub use selection::parse_selection;

/// Attempts per row: the first try plus one retry.
const DEFAULT_MAX_ATTEMPTS: u32 = 2;

/// Fixed delay between the two attempts, in milliseconds.
const DEFAULT_RETRY_DELAY_MS: u64 = 2000;

// =============================================================================
// Generator seam
// =============================================================================

/// One generation call against the text backend.
///
/// Implementations must honor `cancel` while streaming so a stop request
/// tears down the in-flight call instead of waiting for it to finish; a
/// cancelled call returns [`GenerateError::Cancelled`] and its partial
/// output is discarded.
pub trait Generator {
    /// Produce the full text for one resolved prompt.
    fn generate(
        &self,
        prompt: &str,
        cancel: &CancellationToken,
    ) -> impl Future<Output = GenerateResult<String>>;
}

// =============================================================================
// Job specification and report
// =============================================================================

/// What a batch run should do.
#[derive(Debug, Clone)]
pub struct JobSpec {
    /// Prompt template with embedded column references.
    pub template: String,
    /// Column the generated text is written to; added to the catalog if new.
    pub output_column: String,
    /// Row selection expression (`all`, `2, 5`, `2 to 6`, ...).
    pub rows: String,
    /// Retry/delay tuning.
    pub options: JobOptions,
}

impl JobSpec {
    pub fn new(
        template: impl Into<String>,
        output_column: impl Into<String>,
        rows: impl Into<String>,
    ) -> Self {
        Self {
            template: template.into(),
            output_column: output_column.into(),
            rows: rows.into(),
            options: JobOptions::default(),
        }
    }
}

/// Retry tuning for a job.
#[derive(Debug, Clone)]
pub struct JobOptions {
    /// Total attempts per row (first try included).
    pub max_attempts: u32,
    /// Fixed delay between attempts, in milliseconds.
    pub retry_delay_ms: u64,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
        }
    }
}

/// Lifecycle of one target row within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowState {
    /// Not reached yet.
    Pending,
    /// Template being resolved against the running snapshot.
    Resolving,
    /// Backend call being issued.
    Calling,
    /// Backend output being accumulated.
    Streaming,
    /// Result written into the running snapshot.
    Committed,
    /// Job stopped before this row was reached.
    Skipped,
    /// Both attempts failed; a row-level error was recorded.
    Failed,
}

/// A recorded row-level failure.
#[derive(Debug, Clone)]
pub struct RowFailure {
    /// 1-based row number, as shown to the user.
    pub row: usize,
    /// Message of the last attempt's error.
    pub message: String,
}

/// Progress notifications surfaced while the job runs, one row at a time.
#[derive(Debug, Clone)]
pub enum JobEvent {
    /// A target row started processing.
    RowStarted { index: usize },
    /// A row committed; carries the updated row for immediate display.
    RowCommitted { index: usize, row: Row },
    /// A row failed both attempts. `row` is 1-based.
    RowFailed { row: usize, message: String },
}

/// Outcome of a finished (or stopped) run.
#[derive(Debug, Clone)]
pub struct JobReport {
    /// Rows committed.
    pub processed: usize,
    /// Rows targeted.
    pub total: usize,
    /// Row-level failures, in processing order.
    pub failures: Vec<RowFailure>,
    /// Whether the run was stopped by a cancellation request.
    pub cancelled: bool,
    /// Final state per 0-based target row index.
    pub states: BTreeMap<usize, RowState>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl JobReport {
    /// Whether the run completed with every targeted row committed.
    pub fn is_success(&self) -> bool {
        !self.cancelled && self.failures.is_empty()
    }

    /// One-line user-facing summary.
    pub fn summary(&self) -> String {
        if self.cancelled {
            format!("Processing stopped ({}/{} rows done)", self.processed, self.total)
        } else if self.failures.is_empty() {
            "Processing completed successfully".to_string()
        } else {
            format!("Processing completed with {} errors", self.failures.len())
        }
    }
}

// =============================================================================
// Controller
// =============================================================================

/// Run a batch job over `dataset`, mutating it in place as rows commit.
///
/// The dataset is exclusively owned by the job for its duration. On a
/// critical backend error the job returns [`JobError::Aborted`]; rows
/// committed before the abort stay committed because they were written as
/// they completed.
pub async fn run_job<G: Generator>(
    dataset: &mut Dataset,
    spec: &JobSpec,
    generator: &G,
    cancel: CancellationToken,
    events: Option<mpsc::UnboundedSender<JobEvent>>,
) -> JobResult<JobReport> {
    let output_column = spec.output_column.trim();
    if output_column.is_empty() {
        return Err(JobError::MissingColumn);
    }

    let targets = parse_selection(&spec.rows, dataset.len());
    if targets.is_empty() {
        return Err(JobError::NoTargetRows);
    }

    dataset.ensure_column(output_column);

    let started_at = Utc::now();
    let mut states: BTreeMap<usize, RowState> =
        targets.iter().map(|&i| (i, RowState::Pending)).collect();
    let mut failures = Vec::new();
    let mut processed = 0usize;
    let mut cancelled = false;

    log_info(format!("Processing {} row(s)...", targets.len()));

    for (done, &index) in targets.iter().enumerate() {
        if cancel.is_cancelled() {
            cancelled = true;
            break;
        }

        emit(&events, JobEvent::RowStarted { index });
        states.insert(index, RowState::Resolving);
        let prompt = interpolate(&spec.template, dataset, index);

        // The generator seam hides the call/stream boundary, so the
        // recorded state jumps to streaming once the request is issued.
        states.insert(index, RowState::Calling);
        states.insert(index, RowState::Streaming);
        let outcome =
            generate_with_retry(generator, &prompt, &cancel, &spec.options).await;

        match outcome {
            Ok(result) => {
                dataset.set_cell(index, output_column, result);
                states.insert(index, RowState::Committed);
                processed += 1;
                log_success(format!("Row {} done ({}/{})", index + 1, done + 1, targets.len()));
                if let Some(row) = dataset.rows.get(index) {
                    emit(
                        &events,
                        JobEvent::RowCommitted {
                            index,
                            row: row.clone(),
                        },
                    );
                }
            }
            Err(err) if err.is_cancellation() || cancel.is_cancelled() => {
                // No row-level error for the row in flight when stopped.
                states.insert(index, RowState::Skipped);
                cancelled = true;
                break;
            }
            Err(err) if err.is_critical() => {
                log_error(format!("Critical error at row {}: {}", index + 1, err));
                return Err(JobError::Aborted {
                    row: index + 1,
                    source: err,
                });
            }
            Err(err) => {
                let failure = RowFailure {
                    row: index + 1,
                    message: err.to_string(),
                };
                log_warning(format!("Row {}: {}", failure.row, failure.message));
                emit(
                    &events,
                    JobEvent::RowFailed {
                        row: failure.row,
                        message: failure.message.clone(),
                    },
                );
                states.insert(index, RowState::Failed);
                failures.push(failure);
            }
        }
    }

    if cancelled {
        for state in states.values_mut() {
            if *state == RowState::Pending {
                *state = RowState::Skipped;
            }
        }
        log_info("Processing stopped by user");
    }

    let report = JobReport {
        processed,
        total: targets.len(),
        failures,
        cancelled,
        states,
        started_at,
        finished_at: Utc::now(),
    };

    if !report.cancelled {
        if report.is_success() {
            log_success(report.summary());
        } else {
            log_warning(report.summary());
        }
    }

    Ok(report)
}

/// Call the generator with the per-row retry policy.
///
/// The result is trimmed and an empty result counts as a failed attempt.
/// Cancellation is passed through untouched; critical errors are never
/// retried so the job can abort on the first sign of a dead backend.
async fn generate_with_retry<G: Generator>(
    generator: &G,
    prompt: &str,
    cancel: &CancellationToken,
    options: &JobOptions,
) -> GenerateResult<String> {
    let mut last_error = None;

    for attempt in 1..=options.max_attempts {
        if cancel.is_cancelled() {
            return Err(GenerateError::Cancelled);
        }

        match generator.generate(prompt, cancel).await {
            Ok(text) => {
                let result = text.trim().to_string();
                if !result.is_empty() {
                    return Ok(result);
                }
                last_error = Some(GenerateError::EmptyResponse);
            }
            Err(err) if err.is_cancellation() || err.is_critical() => return Err(err),
            Err(err) => last_error = Some(err),
        }

        if attempt < options.max_attempts {
            log_warning(format!(
                "Attempt {}/{} failed, retrying in {}ms...",
                attempt, options.max_attempts, options.retry_delay_ms
            ));
            tokio::select! {
                _ = cancel.cancelled() => return Err(GenerateError::Cancelled),
                _ = sleep(Duration::from_millis(options.retry_delay_ms)) => {}
            }
        }
    }

    Err(last_error.unwrap_or(GenerateError::EmptyResponse))
}

fn emit(events: &Option<mpsc::UnboundedSender<JobEvent>>, event: JobEvent) {
    if let Some(tx) = events {
        let _ = tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Row;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    fn dataset(values: &[(&str, &str)]) -> Dataset {
        let mut ds = Dataset::new(vec!["c".into(), "out".into()]);
        for (c, out) in values {
            ds.rows.push(Row::from_pairs([("c", *c), ("out", *out)]));
        }
        ds
    }

    fn fast_spec(template: &str, rows: &str) -> JobSpec {
        let mut spec = JobSpec::new(template, "out", rows);
        spec.options.retry_delay_ms = 0;
        spec
    }

    /// Returns the resolved prompt as the generated text.
    struct Echo;

    impl Generator for Echo {
        async fn generate(
            &self,
            prompt: &str,
            _cancel: &CancellationToken,
        ) -> GenerateResult<String> {
            Ok(format!("<{}>", prompt))
        }
    }

    /// Pops the next scripted outcome on every call.
    struct Scripted {
        outcomes: Mutex<Vec<GenerateResult<String>>>,
        calls: AtomicU32,
    }

    impl Scripted {
        fn new(outcomes: Vec<GenerateResult<String>>) -> Self {
            let mut outcomes = outcomes;
            outcomes.reverse();
            Self {
                outcomes: Mutex::new(outcomes),
                calls: AtomicU32::new(0),
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl Generator for Scripted {
        async fn generate(
            &self,
            _prompt: &str,
            _cancel: &CancellationToken,
        ) -> GenerateResult<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.outcomes
                .lock()
                .unwrap()
                .pop()
                .unwrap_or(Err(GenerateError::EmptyResponse))
        }
    }

    /// Cancels the shared token, then reports the call as cancelled.
    struct CancelsItself;

    impl Generator for CancelsItself {
        async fn generate(
            &self,
            _prompt: &str,
            cancel: &CancellationToken,
        ) -> GenerateResult<String> {
            cancel.cancel();
            Err(GenerateError::Cancelled)
        }
    }

    #[tokio::test]
    async fn test_commits_every_target_row() {
        let mut ds = dataset(&[("a", ""), ("b", ""), ("c", "")]);
        let spec = fast_spec("row: @[c]", "all");
        let report = run_job(&mut ds, &spec, &Echo, CancellationToken::new(), None)
            .await
            .unwrap();

        assert!(report.is_success());
        assert_eq!(report.processed, 3);
        assert_eq!(ds.cell(0, "out"), "<row: a>");
        assert_eq!(ds.cell(2, "out"), "<row: c>");
        assert!(report
            .states
            .values()
            .all(|s| *s == RowState::Committed));
    }

    #[tokio::test]
    async fn test_read_after_write_within_run() {
        // Row 1 references row 2's value before row 2 runs (sees the
        // original); row 2 references row 1's value after it committed
        // (sees the new one).
        let mut ds = dataset(&[("x", "orig1"), ("y", "orig2")]);
        let spec = fast_spec("[@[out].at(1)|@[out].at(2)]", "1, 2");
        let report = run_job(&mut ds, &spec, &Echo, CancellationToken::new(), None)
            .await
            .unwrap();

        assert!(report.is_success());
        assert_eq!(ds.cell(0, "out"), "<[orig1|orig2]>");
        assert_eq!(ds.cell(1, "out"), "<[<[orig1|orig2]>|orig2]>");
    }

    #[tokio::test]
    async fn test_new_output_column_added_to_catalog() {
        let mut ds = dataset(&[("a", "")]);
        let mut spec = fast_spec("@[c]", "all");
        spec.output_column = "summary".into();
        run_job(&mut ds, &spec, &Echo, CancellationToken::new(), None)
            .await
            .unwrap();
        assert!(ds.has_column("summary"));
        assert_eq!(ds.cell(0, "summary"), "<a>");
    }

    #[tokio::test]
    async fn test_retry_then_success_records_no_failure() {
        let gen = Scripted::new(vec![
            Err(GenerateError::InvalidChunk("truncated".into())),
            Ok("recovered".into()),
        ]);
        let mut ds = dataset(&[("a", "")]);
        let spec = fast_spec("@[c]", "1");
        let report = run_job(&mut ds, &spec, &gen, CancellationToken::new(), None)
            .await
            .unwrap();

        assert!(report.is_success());
        assert_eq!(gen.calls(), 2);
        assert_eq!(ds.cell(0, "out"), "recovered");
    }

    #[tokio::test]
    async fn test_two_failed_attempts_record_one_row_error() {
        let gen = Scripted::new(vec![
            Err(GenerateError::EmptyResponse),
            Err(GenerateError::EmptyResponse),
            Ok("fine".into()),
        ]);
        let mut ds = dataset(&[("a", ""), ("b", "")]);
        let spec = fast_spec("@[c]", "all");
        let report = run_job(&mut ds, &spec, &gen, CancellationToken::new(), None)
            .await
            .unwrap();

        assert!(!report.is_success());
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].row, 1);
        assert_eq!(report.states[&0], RowState::Failed);
        // The job continued past the failed row.
        assert_eq!(ds.cell(1, "out"), "fine");
        assert_eq!(gen.calls(), 3);
    }

    #[tokio::test]
    async fn test_empty_result_is_an_error() {
        let gen = Scripted::new(vec![Ok("   ".into()), Ok("  \n ".into())]);
        let mut ds = dataset(&[("a", "")]);
        let spec = fast_spec("@[c]", "1");
        let report = run_job(&mut ds, &spec, &gen, CancellationToken::new(), None)
            .await
            .unwrap();

        assert_eq!(report.failures.len(), 1);
        assert!(report.failures[0].message.contains("Empty"));
        assert_eq!(gen.calls(), 2);
    }

    #[tokio::test]
    async fn test_critical_error_aborts_without_retry() {
        let gen = Scripted::new(vec![
            Ok("first".into()),
            Err(GenerateError::Api { status: 500 }),
            Ok("never reached".into()),
        ]);
        let mut ds = dataset(&[("a", ""), ("b", ""), ("c", "")]);
        let spec = fast_spec("@[c]", "all");
        let err = run_job(&mut ds, &spec, &gen, CancellationToken::new(), None)
            .await
            .unwrap_err();

        match err {
            JobError::Aborted { row, source } => {
                assert_eq!(row, 2);
                assert!(source.is_critical());
            }
            other => panic!("expected abort, got {:?}", other),
        }
        // Previously committed row kept, later rows untouched.
        assert_eq!(ds.cell(0, "out"), "first");
        assert_eq!(ds.cell(2, "out"), "");
        // The critical attempt was not retried: one call for row 2.
        assert_eq!(gen.calls(), 2);
    }

    #[tokio::test]
    async fn test_auth_and_network_errors_abort_too() {
        for source in [
            GenerateError::Auth("bad key".into()),
            GenerateError::Network("refused".into()),
        ] {
            let gen = Scripted::new(vec![Err(source)]);
            let mut ds = dataset(&[("a", "")]);
            let spec = fast_spec("@[c]", "all");
            let err = run_job(&mut ds, &spec, &gen, CancellationToken::new(), None)
                .await
                .unwrap_err();
            assert!(matches!(err, JobError::Aborted { row: 1, .. }));
        }
    }

    #[tokio::test]
    async fn test_pre_cancelled_job_does_nothing() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut ds = dataset(&[("a", ""), ("b", "")]);
        let spec = fast_spec("@[c]", "all");
        let report = run_job(&mut ds, &spec, &Echo, cancel, None).await.unwrap();

        assert!(report.cancelled);
        assert_eq!(report.processed, 0);
        assert!(report.failures.is_empty());
        assert!(report.states.values().all(|s| *s == RowState::Skipped));
        assert_eq!(ds.cell(0, "out"), "");
    }

    #[tokio::test]
    async fn test_cancellation_mid_run_keeps_committed_rows() {
        let gen = Scripted::new(vec![Ok("kept".into())]);
        let mut ds = dataset(&[("a", ""), ("b", ""), ("c", "")]);
        let spec = fast_spec("@[c]", "all");
        let cancel = CancellationToken::new();

        // First row succeeds; second call cancels the run.
        struct FirstThenCancel(Scripted);
        impl Generator for FirstThenCancel {
            async fn generate(
                &self,
                prompt: &str,
                cancel: &CancellationToken,
            ) -> GenerateResult<String> {
                if self.0.calls() == 0 {
                    self.0.generate(prompt, cancel).await
                } else {
                    cancel.cancel();
                    Err(GenerateError::Cancelled)
                }
            }
        }

        let report = run_job(&mut ds, &spec, &FirstThenCancel(gen), cancel, None)
            .await
            .unwrap();

        assert!(report.cancelled);
        assert_eq!(report.processed, 1);
        // No row-level error for the in-flight row; the job just stopped.
        assert!(report.failures.is_empty());
        assert_eq!(ds.cell(0, "out"), "kept");
        assert_eq!(ds.cell(1, "out"), "");
        assert_eq!(report.states[&1], RowState::Skipped);
        assert_eq!(report.states[&2], RowState::Skipped);
    }

    #[tokio::test]
    async fn test_cancellation_during_row_discards_partial_output() {
        let mut ds = dataset(&[("a", "")]);
        let spec = fast_spec("@[c]", "all");
        let report = run_job(
            &mut ds,
            &spec,
            &CancelsItself,
            CancellationToken::new(),
            None,
        )
        .await
        .unwrap();

        assert!(report.cancelled);
        assert!(report.failures.is_empty());
        assert_eq!(ds.cell(0, "out"), "");
    }

    #[tokio::test]
    async fn test_events_surface_rows_one_at_a_time() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut ds = dataset(&[("a", ""), ("b", "")]);
        let spec = fast_spec("@[c]", "all");
        run_job(&mut ds, &spec, &Echo, CancellationToken::new(), Some(tx))
            .await
            .unwrap();

        let mut committed = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let JobEvent::RowCommitted { index, row } = event {
                committed.push((index, row.cell("out").to_string()));
            }
        }
        assert_eq!(
            committed,
            vec![(0, "<a>".to_string()), (1, "<b>".to_string())]
        );
    }

    #[tokio::test]
    async fn test_no_target_rows_is_an_error() {
        let mut ds = dataset(&[("a", "")]);
        let spec = fast_spec("@[c]", "99");
        let err = run_job(&mut ds, &spec, &Echo, CancellationToken::new(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, JobError::NoTargetRows));
    }

    #[tokio::test]
    async fn test_missing_output_column_is_an_error() {
        let mut ds = dataset(&[("a", "")]);
        let mut spec = fast_spec("@[c]", "all");
        spec.output_column = "  ".into();
        let err = run_job(&mut ds, &spec, &Echo, CancellationToken::new(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, JobError::MissingColumn));
    }
}
