//! Input path expansion.
//!
//! The command line accepts a mix of literal paths and glob patterns
//! (`landing/2024-*/*.csv`, `in/**/*.csv.gz`). [`expand_inputs`] turns them into
//! one sorted, de-duplicated list of files.

use anyhow::{Context, Result, bail};
use glob::glob;
use std::collections::BTreeSet;
use std::path::PathBuf;

fn is_pattern(s: &str) -> bool {
    s.contains(['*', '?', '['])
}

/// Expand a single glob pattern into the sorted list of matching files.
/// Directories are skipped. No match yields an empty list.
///
/// # Errors
/// Returns an error if the pattern is invalid or a matched entry cannot be
/// read.
pub fn expand_glob(pattern: &str) -> Result<Vec<PathBuf>> {
    let paths = glob(pattern).with_context(|| format!("invalid glob pattern: {pattern}"))?;

    let mut result = Vec::new();
    for entry in paths {
        let path =
            entry.with_context(|| format!("error reading glob entry for pattern: {pattern}"))?;
        if path.is_file() {
            result.push(path);
        }
    }
    result.sort();
    Ok(result)
}

/// Expand literal paths and glob patterns into a sorted, de-duplicated list.
///
/// Literal paths are kept even if they do not exist, so the conversion can
/// report them as failed instead of silently dropping them.
///
/// # Errors
/// Returns an error for an invalid pattern, or when nothing at all was
/// matched.
pub fn expand_inputs<S: AsRef<str>>(inputs: &[S]) -> Result<Vec<PathBuf>> {
    let mut out = BTreeSet::new();
    for input in inputs {
        let input = input.as_ref();
        if is_pattern(input) {
            out.extend(expand_glob(input)?);
        } else {
            out.insert(PathBuf::from(input));
        }
    }
    if out.is_empty() {
        bail!("no input files matched");
    }
    Ok(out.into_iter().collect())
}
