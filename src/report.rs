//! Per-file outcomes of a conversion run.
//!
//! [`RunReport`] is what [`Orchestrator::convert_all`](crate::Orchestrator::convert_all)
//! returns. It never fails as a whole: every input gets exactly one
//! [`FileOutcome`], and the caller decides what counts as a failed run.
//!
//! ```no_run
//! # use parquetize::report::RunReport;
//! # fn demo(report: &RunReport) -> anyhow::Result<()> {
//! report.print();
//! report.save_to_file("run.json")?;
//! if !report.is_success() {
//!     std::process::exit(1);
//! }
//! # Ok(())
//! # }
//! ```

use crate::error::ErrorKind;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Terminal state of one conversion task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TaskResult {
    Converted { rows: u64 },
    Failed { kind: ErrorKind, message: String },
}

/// One input file and what became of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileOutcome {
    pub input: PathBuf,
    pub output: PathBuf,
    #[serde(flatten)]
    pub result: TaskResult,
}

impl FileOutcome {
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self.result, TaskResult::Converted { .. })
    }

    #[must_use]
    pub const fn error_kind(&self) -> Option<ErrorKind> {
        match &self.result {
            TaskResult::Converted { .. } => None,
            TaskResult::Failed { kind, .. } => Some(*kind),
        }
    }
}

/// Outcomes of a conversion run, in input order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub outcomes: Vec<FileOutcome>,
    #[serde(with = "duration_ms")]
    pub elapsed: Duration,
}

impl RunReport {
    pub fn succeeded(&self) -> impl Iterator<Item = &FileOutcome> {
        self.outcomes.iter().filter(|o| o.is_success())
    }

    pub fn failed(&self) -> impl Iterator<Item = &FileOutcome> {
        self.outcomes.iter().filter(|o| !o.is_success())
    }

    /// True when every input converted.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(FileOutcome::is_success)
    }

    #[must_use]
    pub fn total_rows(&self) -> u64 {
        self.outcomes
            .iter()
            .map(|o| match o.result {
                TaskResult::Converted { rows } => rows,
                TaskResult::Failed { .. } => 0,
            })
            .sum()
    }

    /// Output paths of the converted files, in input order.
    #[must_use]
    pub fn outputs(&self) -> Vec<&Path> {
        self.succeeded().map(|o| o.output.as_path()).collect()
    }

    #[must_use]
    pub fn outcome_for(&self, input: impl AsRef<Path>) -> Option<&FileOutcome> {
        let input = input.as_ref();
        self.outcomes.iter().find(|o| o.input == input)
    }

    #[must_use]
    pub fn to_json(&self) -> Value {
        json!({
            "files": self.outcomes.len(),
            "succeeded": self.succeeded().count(),
            "failed": self.failed().count(),
            "rows": self.total_rows(),
            "elapsed_ms": u64::try_from(self.elapsed.as_millis()).unwrap_or(u64::MAX),
            "outcomes": self.outcomes,
        })
    }

    /// Print a human-readable summary to stdout.
    pub fn print(&self) {
        println!("\n========== Conversion Report ==========");
        println!(
            "Execution Time: {:.3}s ({} ms)",
            self.elapsed.as_secs_f64(),
            self.elapsed.as_millis()
        );
        println!(
            "Files: {} converted, {} failed, {} rows",
            self.succeeded().count(),
            self.failed().count(),
            self.total_rows()
        );
        println!("---------------------------------------");
        for outcome in &self.outcomes {
            match &outcome.result {
                TaskResult::Converted { rows } => println!(
                    "ok    {} -> {} ({rows} rows)",
                    outcome.input.display(),
                    outcome.output.display()
                ),
                TaskResult::Failed { kind, message } => {
                    println!("FAIL  {} [{kind}] {message}", outcome.input.display());
                }
            }
        }
        println!("=======================================\n");
    }

    /// Write the JSON form of the report to `path`.
    ///
    /// # Errors
    /// Returns an error if the file cannot be created or written.
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        let formatted = serde_json::to_string_pretty(&self.to_json())?;
        file.write_all(formatted.as_bytes())?;
        Ok(())
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
