//! Multi-file conversion on a bounded worker pool.
//!
//! Each input becomes one task on a dedicated rayon pool. Tasks report back
//! through a channel tagged with their index, so outcomes land in input order
//! no matter which file finishes first. A failing or panicking task only
//! affects its own slot.
//!
//! The whole run is bounded by a timeout. When it expires every unfinished
//! task's [`CancelFlag`] is raised and the task is recorded as
//! [`ErrorKind::TimedOut`]; workers notice the flag at their next row and
//! discard their temporary file. A task that already claimed its publish
//! step cannot be cancelled, so the orchestrator waits up to
//! [`PUBLISH_GRACE`] for it and reports what it actually did. A `TimedOut`
//! outcome therefore means this run did not publish that output.

use crate::config::ConverterConfig;
use crate::error::{ConversionError, ErrorKind};
use crate::io::compression::strip_compression_extension;
use crate::pipeline::{CancelFlag, Convert};
use crate::report::{FileOutcome, RunReport, TaskResult};
use anyhow::{Context, Result};
use std::any::Any;
use std::collections::HashSet;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Extension of every produced file.
pub const OUTPUT_EXTENSION: &str = "parquet";

/// How long a timed-out run still waits for tasks that are mid-publish.
pub const PUBLISH_GRACE: Duration = Duration::from_secs(10);

/// Where the output for `input` goes: its file name, with any compression
/// suffix and the data extension replaced by `.parquet`, under `output_dir`.
///
/// ```
/// use parquetize::orchestrator::output_path_for;
/// use std::path::Path;
///
/// let out = output_path_for(Path::new("landing/sales.csv.gz"), Path::new("out"));
/// assert_eq!(out, Path::new("out/sales.parquet"));
/// ```
#[must_use]
pub fn output_path_for(input: &Path, output_dir: &Path) -> PathBuf {
    let stripped = strip_compression_extension(input);
    let name = stripped
        .with_extension(OUTPUT_EXTENSION)
        .file_name()
        .map_or_else(|| format!("output.{OUTPUT_EXTENSION}").into(), ToOwned::to_owned);
    output_dir.join(name)
}

/// Runs a [`Convert`] implementation over many inputs.
pub struct Orchestrator {
    converter: Arc<dyn Convert>,
    concurrency: usize,
    timeout: Duration,
}

impl Orchestrator {
    pub fn new(converter: Arc<dyn Convert>) -> Self {
        let defaults = ConverterConfig::default();
        Self {
            converter,
            concurrency: defaults.concurrency,
            timeout: defaults.timeout(),
        }
    }

    pub fn from_config(converter: Arc<dyn Convert>, config: &ConverterConfig) -> Self {
        Self::new(converter)
            .with_concurrency(config.concurrency)
            .with_timeout(config.timeout())
    }

    /// Worker threads; zero is treated as one.
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Convert every input into `output_dir` and report per-file outcomes.
    ///
    /// # Errors
    /// Only run-level problems are errors: the output directory cannot be
    /// created or the worker pool cannot be started. Individual file failures
    /// are recorded in the returned report.
    pub fn convert_all(&self, inputs: &[PathBuf], output_dir: &Path) -> Result<RunReport> {
        let started = Instant::now();
        std::fs::create_dir_all(output_dir)
            .with_context(|| format!("create output directory {}", output_dir.display()))?;

        let outputs: Vec<PathBuf> = inputs
            .iter()
            .map(|input| output_path_for(input, output_dir))
            .collect();
        let mut slots: Vec<Option<TaskResult>> = vec![None; inputs.len()];

        // Two inputs must never share a temp or final path.
        let mut claimed = HashSet::new();
        let mut runnable = Vec::with_capacity(inputs.len());
        for (index, output) in outputs.iter().enumerate() {
            if claimed.insert(output.as_path()) {
                runnable.push(index);
            } else {
                warn!(input = %inputs[index].display(), output = %output.display(), "duplicate output path");
                slots[index] = Some(TaskResult::Failed {
                    kind: ErrorKind::Duplicate,
                    message: format!(
                        "output {} is already produced by another input",
                        output.display()
                    ),
                });
            }
        }

        info!(
            files = inputs.len(),
            concurrency = self.concurrency,
            timeout_secs = self.timeout.as_secs(),
            "starting conversion"
        );

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.concurrency)
            .thread_name(|i| format!("convert-{i}"))
            .build()
            .context("build conversion worker pool")?;
        let flags: Vec<CancelFlag> = inputs.iter().map(|_| CancelFlag::new()).collect();
        let (tx, rx) = mpsc::channel::<(usize, TaskResult)>();

        for &index in &runnable {
            let tx = tx.clone();
            let converter = Arc::clone(&self.converter);
            let cancel = flags[index].clone();
            let input = inputs[index].clone();
            let output = outputs[index].clone();
            pool.spawn(move || {
                let result = if cancel.is_cancelled() {
                    failed(&ConversionError::Cancelled)
                } else {
                    run_task(converter.as_ref(), &input, &output, &cancel)
                };
                // The receiver is gone once the run has timed out.
                let _ = tx.send((index, result));
            });
        }
        drop(tx);

        let deadline = started + self.timeout;
        let mut pending = runnable.len();
        let mut publishing = HashSet::new();
        while pending > 0 {
            let left = deadline.saturating_duration_since(Instant::now());
            match rx.recv_timeout(left) {
                Ok((index, result)) => {
                    slots[index] = Some(result);
                    pending -= 1;
                }
                Err(RecvTimeoutError::Timeout) => {
                    warn!(unfinished = pending, "timeout reached, cancelling remaining work");
                    // Keep anything that reported before the flags went up.
                    while let Ok((index, result)) = rx.try_recv() {
                        slots[index] = Some(result);
                    }
                    publishing = runnable
                        .iter()
                        .copied()
                        .filter(|&i| slots[i].is_none() && !flags[i].try_cancel())
                        .collect();
                    break;
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        Self::await_publishing(&rx, &mut publishing, &mut slots);

        let timeout = self.timeout;
        let outcomes: Vec<FileOutcome> = inputs
            .iter()
            .zip(outputs)
            .zip(slots)
            .enumerate()
            .map(|(index, ((input, output), slot))| {
                let result = slot.unwrap_or_else(|| {
                    let mut message = format!("not finished within {}s", timeout.as_secs_f64());
                    if publishing.contains(&index) {
                        message.push_str("; output may have been published");
                    }
                    TaskResult::Failed {
                        kind: ErrorKind::TimedOut,
                        message,
                    }
                });
                if let TaskResult::Failed { kind, message } = &result {
                    error!(input = %input.display(), %kind, "{message}");
                }
                FileOutcome {
                    input: input.clone(),
                    output,
                    result,
                }
            })
            .collect();

        let report = RunReport {
            outcomes,
            elapsed: started.elapsed(),
        };
        info!(
            succeeded = report.succeeded().count(),
            failed = report.failed().count(),
            rows = report.total_rows(),
            elapsed_ms = crate::pipeline::millis(report.elapsed),
            "conversion finished"
        );
        Ok(report)
    }

    /// Wait for tasks that won the publish race to report. Whatever is still
    /// outstanding after [`PUBLISH_GRACE`] stays in `publishing`.
    fn await_publishing(
        rx: &mpsc::Receiver<(usize, TaskResult)>,
        publishing: &mut HashSet<usize>,
        slots: &mut [Option<TaskResult>],
    ) {
        if publishing.is_empty() {
            return;
        }
        info!(tasks = publishing.len(), "waiting for outputs being published");
        let deadline = Instant::now() + PUBLISH_GRACE;
        while !publishing.is_empty() {
            let left = deadline.saturating_duration_since(Instant::now());
            match rx.recv_timeout(left) {
                // Cancelled tasks reporting late keep their TimedOut slot.
                Ok((index, result)) => {
                    if publishing.remove(&index) {
                        slots[index] = Some(result);
                    }
                }
                Err(_) => {
                    warn!(tasks = publishing.len(), "publish still in progress");
                    break;
                }
            }
        }
    }
}

fn run_task(converter: &dyn Convert, input: &Path, output: &Path, cancel: &CancelFlag) -> TaskResult {
    match catch_unwind(AssertUnwindSafe(|| converter.convert(input, output, cancel))) {
        Ok(Ok(rows)) => TaskResult::Converted { rows },
        Ok(Err(err)) => failed(&err),
        Err(payload) => TaskResult::Failed {
            kind: ErrorKind::Panicked,
            message: format!("worker panicked: {}", panic_message(payload.as_ref())),
        },
    }
}

fn failed(err: &ConversionError) -> TaskResult {
    TaskResult::Failed {
        kind: err.kind(),
        message: err.to_string(),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}
