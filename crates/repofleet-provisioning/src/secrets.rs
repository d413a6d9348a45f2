//! Secret value resolution.
//!
//! Import files and the shared `KEY=VALUE` file are read once at run
//! start; per-repository values are then resolved positionally without
//! touching the filesystem again.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;

use repofleet_core::config::{SecretSource, SecretSpec};

/// Errors raised while pre-reading secret value files.
#[derive(Debug, Error)]
pub enum SecretError {
    #[error("secret values file {path} could not be read: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A non-fatal per-repository resolution failure.
///
/// Recorded as a warning against the repository; the rest of its pipeline
/// continues.
#[derive(Debug, PartialEq, Eq)]
pub enum ResolveError {
    /// Fewer issued keys than repositories.
    NotEnoughKeys { need: usize, have: usize },
    /// Fewer value lines than repositories.
    NotEnoughValues {
        name: String,
        need: usize,
        have: usize,
    },
    /// A constant secret was configured with an empty value.
    EmptyValue { name: String },
}

impl fmt::Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolveError::NotEnoughKeys { need, have } => {
                write!(f, "not enough auth keys issued: need {need}, have {have}")
            }
            ResolveError::NotEnoughValues { name, need, have } => write!(
                f,
                "not enough values for secret '{name}': need {need}, have {have}"
            ),
            ResolveError::EmptyValue { name } => {
                write!(f, "secret '{name}' has an empty value")
            }
        }
    }
}

/// Pre-read secret sources for one run.
#[derive(Debug, Default)]
pub struct SecretResolver {
    /// Lines of each import file, keyed by secret name.
    import_values: HashMap<String, Vec<String>>,
    /// `KEY=VALUE` pairs applied identically to every repository.
    shared: Vec<(String, String)>,
}

impl SecretResolver {
    /// Read every import file and the shared secrets file once.
    pub fn prepare(
        specs: &[SecretSpec],
        shared_file: Option<&Path>,
    ) -> Result<Self, SecretError> {
        let mut import_values = HashMap::new();
        for spec in specs {
            if let SecretSource::ImportFile { path } = &spec.source {
                import_values.insert(spec.name.clone(), read_lines(path)?);
            }
        }

        let mut shared = Vec::new();
        if let Some(path) = shared_file {
            for line in read_lines(path)? {
                if let Some(pair) = parse_env_line(&line) {
                    shared.push(pair);
                }
            }
        }

        Ok(Self {
            import_values,
            shared,
        })
    }

    /// Resolve the value of `spec` for the repository at 0-based `index`.
    pub fn resolve<'a>(
        &'a self,
        spec: &'a SecretSpec,
        index: usize,
        issued_keys: &'a [String],
    ) -> Result<&'a str, ResolveError> {
        match &spec.source {
            SecretSource::IssuerAuto => issued_keys.get(index).map(String::as_str).ok_or(
                ResolveError::NotEnoughKeys {
                    need: index + 1,
                    have: issued_keys.len(),
                },
            ),
            SecretSource::Constant { value } => {
                if value.is_empty() {
                    Err(ResolveError::EmptyValue {
                        name: spec.name.clone(),
                    })
                } else {
                    Ok(value)
                }
            }
            SecretSource::ImportFile { .. } => {
                let values = self
                    .import_values
                    .get(&spec.name)
                    .map(Vec::as_slice)
                    .unwrap_or_default();
                values
                    .get(index)
                    .map(String::as_str)
                    .ok_or(ResolveError::NotEnoughValues {
                        name: spec.name.clone(),
                        need: index + 1,
                        have: values.len(),
                    })
            }
        }
    }

    /// Shared `KEY=VALUE` pairs added to every repository.
    #[must_use]
    pub fn shared(&self) -> &[(String, String)] {
        &self.shared
    }
}

/// Split a `KEY=VALUE` line on the first `=`; both sides are trimmed and
/// must be non-empty.
#[must_use]
pub fn parse_env_line(line: &str) -> Option<(String, String)> {
    let (key, value) = line.split_once('=')?;
    let key = key.trim();
    let value = value.trim();
    if key.is_empty() || value.is_empty() {
        return None;
    }
    Some((key.to_string(), value.to_string()))
}

fn read_lines(path: &Path) -> Result<Vec<String>, SecretError> {
    let contents = std::fs::read_to_string(path).map_err(|source| SecretError::Unreadable {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}
