//! Offline pre-flight validation.
//!
//! Everything checked here is surfaced before any remote mutating call is
//! made.  Live connectivity checks belong to the orchestrator, which owns
//! the API clients.

use std::path::Path;

use crate::config::{
    ProvisioningConfig, SecretSource, MAX_REPO_COUNT, MIN_REPO_COUNT,
};
use crate::error::CoreError;
use crate::naming;

/// Whether `name` is a valid Actions secret name (`^[A-Z0-9_]+$`).
#[must_use]
pub fn is_valid_secret_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}

/// Whether `name` is an acceptable repository name.
#[must_use]
pub fn is_valid_repo_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 100
        && !name.starts_with('-')
        && !name.starts_with('_')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Run every offline check against the configuration.
///
/// # Errors
///
/// Returns [`CoreError::Validation`] carrying every problem found; a run
/// must not start while this fails.
pub fn validate(config: &ProvisioningConfig) -> Result<(), CoreError> {
    let mut issues = Vec::new();

    if config.github.token.trim().is_empty() {
        issues.push("GitHub token is required".to_string());
    }
    if config.github.username.trim().is_empty() {
        issues.push("GitHub username is required".to_string());
    }

    if config.repo_count < MIN_REPO_COUNT || config.repo_count > MAX_REPO_COUNT {
        issues.push(format!(
            "repository count {} is out of range [{MIN_REPO_COUNT}, {MAX_REPO_COUNT}]",
            config.repo_count
        ));
    }

    // Generating the names up front catches unreadable or short import
    // files and bad prefixes before the run starts.
    match naming::generate(&config.naming, config.repo_count.max(MIN_REPO_COUNT)) {
        Ok(names) => {
            for name in names.iter().filter(|n| !is_valid_repo_name(n)) {
                issues.push(format!("generated repository name '{name}' is invalid"));
            }
        }
        Err(e) => issues.push(e.to_string()),
    }

    check_file(&mut issues, config.files.workflow_file.as_deref(), "workflow file");
    check_file(
        &mut issues,
        config.files.gitignore_file.as_deref(),
        ".gitignore file",
    );
    for path in &config.files.project_paths {
        if !path.exists() {
            issues.push(format!("project path not found: {}", path.display()));
        }
    }
    check_file(
        &mut issues,
        config.secrets.shared_secrets_file.as_deref(),
        "shared secrets file",
    );

    for spec in &config.secrets.repository_secrets {
        if !is_valid_secret_name(&spec.name) {
            issues.push(format!(
                "secret name '{}' is invalid: only uppercase letters, digits and underscores are allowed",
                spec.name
            ));
        }
        if let SecretSource::ImportFile { path } = &spec.source {
            if !path.is_file() {
                issues.push(format!(
                    "value file for secret '{}' not found: {}",
                    spec.name,
                    path.display()
                ));
            }
        }
    }

    if config.wants_issued_keys() && config.tailscale.is_none() {
        issues.push(
            "Tailscale credentials are required when issuer-sourced secrets are configured"
                .to_string(),
        );
    }
    if let Some(ts) = &config.tailscale {
        if config.wants_issued_keys() {
            if ts.api_key.trim().is_empty() {
                issues.push("Tailscale API key is required".to_string());
            }
            if ts.tailnet.trim().is_empty() {
                issues.push("Tailscale tailnet name is required".to_string());
            }
        }
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(CoreError::Validation(issues))
    }
}

fn check_file(issues: &mut Vec<String>, path: Option<&Path>, label: &str) {
    if let Some(path) = path {
        if !path.is_file() {
            issues.push(format!("{label} not found: {}", path.display()));
        }
    }
}
