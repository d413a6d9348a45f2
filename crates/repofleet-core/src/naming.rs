//! Repository name generation.
//!
//! Produces the ordered list of unique names a run will create.  Names are
//! generated exactly once per run; collisions within the run are resolved
//! with a numeric disambiguator.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::NamingStrategy;

/// Word pool for auto-generated names, cycled with a positional suffix.
const WORD_POOL: &[&str] = &[
    "nexus", "vertex", "core", "edge", "flux", "quantum", "matrix", "prism", "cipher", "node",
    "apex", "zenith", "pixel", "spark", "forge", "pulse", "byte", "scope", "drift", "mesh",
    "atlas", "titan", "summit", "prime", "fusion", "beacon", "orbit", "stellar", "lunar", "nova",
    "echo", "flow", "wave", "bloom", "craft", "shift", "glow", "dash", "leap", "rise",
];

/// Prefix used for auto-generated names.
const AUTO_PREFIX: &str = "repo";

/// Errors raised while producing repository names.
#[derive(Debug, Error)]
pub enum NamingError {
    /// The names file could not be read.
    #[error("names file {path} could not be read: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The names file holds fewer usable names than the run needs.
    #[error("names file {path} holds {available} name(s) but {needed} are required")]
    NotEnoughNames {
        path: PathBuf,
        available: usize,
        needed: usize,
    },

    /// A prefix strategy was configured with an empty prefix.
    #[error("naming prefix must not be empty")]
    EmptyPrefix,
}

/// Generate exactly `count` unique repository names for the given strategy.
///
/// # Errors
///
/// `ImportFile` fails hard when the file is unreadable or yields fewer than
/// `count` names; this surfaces at validation time, before any remote call.
pub fn generate(strategy: &NamingStrategy, count: u32) -> Result<Vec<String>, NamingError> {
    let count = count as usize;
    match strategy {
        NamingStrategy::AutoGenerate => Ok(auto_generate(count)),
        NamingStrategy::CustomPrefix { prefix } | NamingStrategy::SequentialPrefix { prefix } => {
            prefixed(prefix, count)
        }
        NamingStrategy::ImportFile { path } => from_file(path, count),
    }
}

fn auto_generate(count: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut names = Vec::with_capacity(count);
    for i in 0..count {
        let word = WORD_POOL[i % WORD_POOL.len()];
        push_unique(
            &mut names,
            &mut seen,
            format!("{AUTO_PREFIX}-{word}-{:02}", i + 1),
        );
    }
    names
}

fn prefixed(prefix: &str, count: usize) -> Result<Vec<String>, NamingError> {
    let prefix = prefix.trim();
    if prefix.is_empty() {
        return Err(NamingError::EmptyPrefix);
    }
    let mut seen = HashSet::new();
    let mut names = Vec::with_capacity(count);
    for i in 0..count {
        push_unique(&mut names, &mut seen, format!("{prefix}-{:02}", i + 1));
    }
    Ok(names)
}

fn from_file(path: &Path, count: usize) -> Result<Vec<String>, NamingError> {
    let contents = std::fs::read_to_string(path).map_err(|source| NamingError::Unreadable {
        path: path.to_path_buf(),
        source,
    })?;

    let lines: Vec<&str> = contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();

    if lines.len() < count {
        return Err(NamingError::NotEnoughNames {
            path: path.to_path_buf(),
            available: lines.len(),
            needed: count,
        });
    }

    let mut seen = HashSet::new();
    let mut names = Vec::with_capacity(count);
    for line in lines.into_iter().take(count) {
        push_unique(&mut names, &mut seen, line.to_string());
    }
    Ok(names)
}

/// Append `candidate`, disambiguating with a numeric suffix on collision.
fn push_unique(names: &mut Vec<String>, seen: &mut HashSet<String>, candidate: String) {
    if seen.insert(candidate.clone()) {
        names.push(candidate);
        return;
    }
    let mut n = 2;
    loop {
        let alternative = format!("{candidate}-{n}");
        if seen.insert(alternative.clone()) {
            names.push(alternative);
            return;
        }
        n += 1;
    }
}
