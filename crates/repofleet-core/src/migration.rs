//! One-shot migration of legacy (version-1) configuration files.
//!
//! Early releases persisted a flat key/value layout with boolean toggles
//! such as `auto_generate_tailscale` instead of the structured per-secret
//! list.  The migration runs once at load time; nothing downstream ever
//! branches on legacy fields.

use std::path::PathBuf;

use serde_json::Value;
use tracing::debug;

use crate::config::{
    BackupOptions, FileUploads, GithubCredentials, NamingStrategy, PagesSource,
    PostCreateActions, ProvisioningConfig, RepositoryTemplate, SecretSource, SecretSpec,
    SecretsConfig, TailscaleCredentials, CONFIG_VERSION,
};
use crate::error::CoreResult;

/// Secret name legacy configs implied when `auto_generate_tailscale` was set.
const LEGACY_ISSUER_SECRET_NAME: &str = "TAILSCALE_AUTH_KEY";

fn str_field(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .trim()
        .to_string()
}

fn opt_path_field(value: &Value, key: &str) -> Option<PathBuf> {
    let raw = str_field(value, key);
    if raw.is_empty() {
        None
    } else {
        Some(PathBuf::from(raw))
    }
}

fn bool_field(value: &Value, key: &str, default: bool) -> bool {
    value.get(key).and_then(Value::as_bool).unwrap_or(default)
}

/// Translate a legacy flat configuration into the current schema.
pub fn migrate_legacy(raw: &Value) -> CoreResult<ProvisioningConfig> {
    let github = GithubCredentials {
        username: str_field(raw, "github_username"),
        token: str_field(raw, "github_token"),
    };

    let tailscale = {
        let api_key = str_field(raw, "tailscale_api");
        let tailnet = str_field(raw, "tailscale_network");
        if api_key.is_empty() && tailnet.is_empty() {
            None
        } else {
            Some(TailscaleCredentials { api_key, tailnet })
        }
    };

    let repo_count = raw
        .get("repo_count")
        .and_then(Value::as_u64)
        .map_or(10, |n| n as u32);

    let naming = migrate_naming(raw.get("naming_strategy").unwrap_or(&Value::Null));

    let template = RepositoryTemplate {
        description: str_field(raw, "description"),
        private: bool_field(raw, "private", true),
        auto_init: true,
        enable_issues: bool_field(raw, "enable_issues", true),
        enable_wiki: bool_field(raw, "enable_wiki", false),
        enable_projects: bool_field(raw, "enable_projects", false),
        topics: raw
            .get("repo_topics")
            .and_then(Value::as_array)
            .map(|topics| {
                topics
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default(),
    };

    let mut project_paths: Vec<PathBuf> = raw
        .get("project_paths")
        .and_then(Value::as_array)
        .map(|paths| {
            paths
                .iter()
                .filter_map(Value::as_str)
                .filter(|p| !p.trim().is_empty())
                .map(PathBuf::from)
                .collect()
        })
        .unwrap_or_default();

    // Single project_folder predates the multi-path list.
    if project_paths.is_empty() {
        if let Some(folder) = opt_path_field(raw, "project_folder") {
            project_paths.push(folder);
        }
    }

    let files = FileUploads {
        workflow_file: opt_path_field(raw, "workflow_file"),
        gitignore_file: opt_path_field(raw, "gitignore_file"),
        project_paths,
    };

    let mut repository_secrets = migrate_secrets(raw.get("repository_secrets"));

    // The old auto_generate_tailscale toggle becomes an explicit
    // issuer-sourced secret, unless the structured list already has one.
    let has_issuer_secret = repository_secrets
        .iter()
        .any(|spec| spec.source == SecretSource::IssuerAuto);
    if bool_field(raw, "auto_generate_tailscale", false) && !has_issuer_secret {
        debug!("Migrating auto_generate_tailscale flag to an issuer-sourced secret");
        repository_secrets.push(SecretSpec {
            name: LEGACY_ISSUER_SECRET_NAME.to_string(),
            source: SecretSource::IssuerAuto,
        });
    }

    let secrets = SecretsConfig {
        repository_secrets,
        shared_secrets_file: opt_path_field(raw, "shared_secrets_file"),
    };

    let actions = PostCreateActions {
        start_workflows: bool_field(raw, "start_workflows", true),
        wait_workflow_completion: bool_field(raw, "wait_workflow_completion", false),
        protect_main_branch: bool_field(raw, "protect_main_branch", false),
        require_pr_reviews: bool_field(raw, "require_pr_reviews", false),
        require_status_checks: bool_field(raw, "require_status_checks", false),
        restrict_push_access: bool_field(raw, "restrict_push_access", false),
        enable_pages: bool_field(raw, "enable_github_pages", false),
        pages_source: migrate_pages_source(&str_field(raw, "pages_source")),
    };

    let backup = BackupOptions {
        auto_backup: bool_field(raw, "auto_backup", true),
        ..Default::default()
    };

    Ok(ProvisioningConfig {
        version: CONFIG_VERSION,
        github,
        tailscale,
        repo_count,
        naming,
        template,
        files,
        secrets,
        actions,
        backup,
    })
}

fn migrate_naming(raw: &Value) -> NamingStrategy {
    let strategy = raw.get("strategy").and_then(Value::as_str).unwrap_or("");
    match strategy {
        "Custom" => NamingStrategy::CustomPrefix {
            prefix: str_field(raw, "custom_prefix"),
        },
        "Sequential" => NamingStrategy::SequentialPrefix {
            prefix: str_field(raw, "sequential_prefix"),
        },
        "ImportFile" => match opt_path_field(raw, "names_file") {
            Some(path) => NamingStrategy::ImportFile { path },
            None => NamingStrategy::AutoGenerate,
        },
        _ => NamingStrategy::AutoGenerate,
    }
}

fn migrate_secrets(raw: Option<&Value>) -> Vec<SecretSpec> {
    let Some(entries) = raw.and_then(Value::as_array) else {
        return Vec::new();
    };

    entries
        .iter()
        .filter_map(|entry| {
            let name = str_field(entry, "name");
            if name.is_empty() {
                return None;
            }
            let source = match entry.get("source").and_then(Value::as_str) {
                Some("tailscale_auto") => SecretSource::IssuerAuto,
                Some("custom_value") => SecretSource::Constant {
                    value: str_field(entry, "value"),
                },
                Some("import_file") => SecretSource::ImportFile {
                    path: PathBuf::from(str_field(entry, "file_path")),
                },
                _ => return None,
            };
            Some(SecretSpec { name, source })
        })
        .collect()
}

fn migrate_pages_source(raw: &str) -> PagesSource {
    // Legacy values were free-text like "main branch /docs".
    if raw.contains("docs") {
        PagesSource::MainDocs
    } else if raw.contains("gh-pages") {
        PagesSource::GhPages
    } else {
        PagesSource::MainRoot
    }
}
