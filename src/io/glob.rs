//! Resolving intensity-file arguments into a batch of paths.
//!
//! Batches are usually given as glob patterns (`runs/2024-*/*.CEL`,
//! `**/*.CEL.gz`). Matches are sorted so that the column order of a populated
//! store is deterministic across runs and platforms.
//!
//! ```no_run
//! use affyingest::io::glob::expand_glob;
//!
//! let cels = expand_glob("data/*.CEL")?;
//! # Ok::<(), anyhow::Error>(())
//! ```

use anyhow::{Context, Result, bail};
use glob::glob;
use std::path::PathBuf;

/// Expand a glob pattern into a sorted list of matching files.
///
/// Directories are skipped. No match is an empty list, not an error.
///
/// # Errors
///
/// Returns an error for an invalid pattern or an unreadable directory entry.
pub fn expand_glob(pattern: &str) -> Result<Vec<PathBuf>> {
    let entries = glob(pattern).with_context(|| format!("bad intensity-file pattern {pattern:?}"))?;
    let mut files = entries
        .filter_map(|entry| match entry {
            Ok(path) if !path.is_file() => None,
            other => Some(other),
        })
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("scan files matching {pattern:?}"))?;
    files.sort_unstable();
    Ok(files)
}

/// Like [`expand_glob`], but zero matches is an error.
///
/// # Errors
///
/// Returns an error for an invalid pattern, an unreadable entry, or no matches.
pub fn expand_glob_required(pattern: &str) -> Result<Vec<PathBuf>> {
    let files = expand_glob(pattern)?;
    if files.is_empty() {
        bail!("no intensity files match {pattern:?}");
    }
    Ok(files)
}

/// Resolve a mixed list of literal paths and patterns, keeping argument order.
///
/// An argument naming an existing file is taken as-is, even if it contains
/// glob metacharacters; anything else must match at least one file.
///
/// # Errors
///
/// Returns an error for the first argument that resolves to nothing.
pub fn expand_inputs<S: AsRef<str>>(args: &[S]) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    for arg in args {
        let arg = arg.as_ref();
        let literal = PathBuf::from(arg);
        if literal.is_file() {
            out.push(literal);
        } else {
            out.extend(expand_glob_required(arg)?);
        }
    }
    Ok(out)
}
