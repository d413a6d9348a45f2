//! Typed provisioning configuration.
//!
//! The configuration is supplied by an external surface (CLI, UI) and is
//! immutable for the duration of a run.  Files on disk are JSON; version-1
//! files in the legacy flat layout are migrated once at load time by
//! [`crate::migration`].

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Current configuration schema version.
pub const CONFIG_VERSION: u64 = 2;

/// Smallest allowed repository count for a single run.
pub const MIN_REPO_COUNT: u32 = 1;

/// Largest allowed repository count for a single run.
pub const MAX_REPO_COUNT: u32 = 100;

fn default_version() -> u64 {
    CONFIG_VERSION
}

fn default_repo_count() -> u32 {
    10
}

fn default_true() -> bool {
    true
}

fn default_backup_dir() -> PathBuf {
    PathBuf::from("backups")
}

/// Complete description of one provisioning run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisioningConfig {
    /// Schema version of the file this config was loaded from.
    #[serde(default = "default_version")]
    pub version: u64,

    /// GitHub credentials.
    pub github: GithubCredentials,

    /// Tailscale credentials; required only when issuer-sourced secrets
    /// are configured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tailscale: Option<TailscaleCredentials>,

    /// Number of repositories to create, in `[1, 100]`.
    #[serde(default = "default_repo_count")]
    pub repo_count: u32,

    /// How repository names are produced.
    #[serde(default)]
    pub naming: NamingStrategy,

    /// Settings applied to every created repository.
    #[serde(default)]
    pub template: RepositoryTemplate,

    /// Optional files uploaded into every repository.
    #[serde(default)]
    pub files: FileUploads,

    /// Secrets injected into every repository.
    #[serde(default)]
    pub secrets: SecretsConfig,

    /// Post-create actions.
    #[serde(default)]
    pub actions: PostCreateActions,

    /// Key backup behavior.
    #[serde(default)]
    pub backup: BackupOptions,
}

/// GitHub personal-access-token credentials.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GithubCredentials {
    /// Configured account name; the authenticated login wins on mismatch.
    #[serde(default)]
    pub username: String,

    /// Personal access token.
    #[serde(default)]
    pub token: String,
}

/// Tailscale API credentials.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TailscaleCredentials {
    /// API access token.
    pub api_key: String,

    /// Tailnet name the keys are issued against.
    pub tailnet: String,
}

/// Repository naming strategy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum NamingStrategy {
    /// Curated word list combined with a positional suffix.
    AutoGenerate,

    /// `{prefix}-{01..count}`.
    CustomPrefix { prefix: String },

    /// `{prefix}-{01..count}`; kept distinct from [`NamingStrategy::CustomPrefix`]
    /// so saved configs round-trip the user's original choice.
    SequentialPrefix { prefix: String },

    /// One name per non-empty trimmed line of a file.
    ImportFile { path: PathBuf },
}

impl Default for NamingStrategy {
    fn default() -> Self {
        NamingStrategy::AutoGenerate
    }
}

/// Settings applied to each created repository.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryTemplate {
    /// Repository description.
    #[serde(default)]
    pub description: String,

    /// Create repositories as private.
    #[serde(default = "default_true")]
    pub private: bool,

    /// Initialize with a README so the default branch exists immediately.
    #[serde(default = "default_true")]
    pub auto_init: bool,

    /// Enable the issue tracker.
    #[serde(default = "default_true")]
    pub enable_issues: bool,

    /// Enable the wiki.
    #[serde(default)]
    pub enable_wiki: bool,

    /// Enable projects.
    #[serde(default)]
    pub enable_projects: bool,

    /// Topics set on every repository.
    #[serde(default)]
    pub topics: Vec<String>,
}

impl Default for RepositoryTemplate {
    fn default() -> Self {
        Self {
            description: String::new(),
            private: true,
            auto_init: true,
            enable_issues: true,
            enable_wiki: false,
            enable_projects: false,
            topics: Vec::new(),
        }
    }
}

/// Files uploaded into each repository after creation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileUploads {
    /// Workflow definition uploaded to the fixed workflow path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_file: Option<PathBuf>,

    /// `.gitignore` uploaded to the repository root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gitignore_file: Option<PathBuf>,

    /// Additional files or folders; files land at the root under their own
    /// name, folders under a same-named subfolder.
    #[serde(default)]
    pub project_paths: Vec<PathBuf>,
}

/// Secret injection configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecretsConfig {
    /// Per-repository secret specifications, applied in order.
    #[serde(default)]
    pub repository_secrets: Vec<SecretSpec>,

    /// `KEY=VALUE` file whose every line is added to every repository.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shared_secrets_file: Option<PathBuf>,
}

/// One secret to inject into each repository.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SecretSpec {
    /// Secret name; must match `^[A-Z0-9_]+$`.
    pub name: String,

    /// Where the value comes from.
    #[serde(flatten)]
    pub source: SecretSource,
}

/// Value source for a [`SecretSpec`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum SecretSource {
    /// A freshly issued Tailscale auth key, unique per repository by
    /// position.
    IssuerAuto,

    /// The same fixed value for every repository.
    Constant { value: String },

    /// Line `i` of a file for repository `i`.
    ImportFile { path: PathBuf },
}

/// GitHub Pages publishing source.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PagesSource {
    /// `main` branch, repository root.
    #[default]
    MainRoot,

    /// `main` branch, `/docs` folder.
    MainDocs,

    /// `gh-pages` branch root.
    GhPages,
}

impl PagesSource {
    /// Branch the Pages site is served from.
    #[must_use]
    pub fn branch(&self) -> &'static str {
        match self {
            PagesSource::MainRoot | PagesSource::MainDocs => "main",
            PagesSource::GhPages => "gh-pages",
        }
    }

    /// Path within the branch the Pages site is served from.
    #[must_use]
    pub fn path(&self) -> &'static str {
        match self {
            PagesSource::MainRoot | PagesSource::GhPages => "/",
            PagesSource::MainDocs => "/docs",
        }
    }
}

/// Actions taken after each repository is created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostCreateActions {
    /// Dispatch the uploaded workflow once the repository is provisioned.
    #[serde(default = "default_true")]
    pub start_workflows: bool,

    /// Accepted for forward compatibility; dispatched workflows are not
    /// currently awaited.
    #[serde(default)]
    pub wait_workflow_completion: bool,

    /// Protect the default branch.
    #[serde(default)]
    pub protect_main_branch: bool,

    /// Require pull-request reviews on the protected branch.
    #[serde(default)]
    pub require_pr_reviews: bool,

    /// Require status checks on the protected branch.
    #[serde(default)]
    pub require_status_checks: bool,

    /// Restrict who can push to the protected branch.
    #[serde(default)]
    pub restrict_push_access: bool,

    /// Enable GitHub Pages.
    #[serde(default)]
    pub enable_pages: bool,

    /// Pages publishing source.
    #[serde(default)]
    pub pages_source: PagesSource,
}

impl Default for PostCreateActions {
    fn default() -> Self {
        Self {
            start_workflows: true,
            wait_workflow_completion: false,
            protect_main_branch: false,
            require_pr_reviews: false,
            require_status_checks: false,
            restrict_push_access: false,
            enable_pages: false,
            pages_source: PagesSource::default(),
        }
    }
}

/// Key backup behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupOptions {
    /// Write issued keys to a timestamped backup file.
    #[serde(default = "default_true")]
    pub auto_backup: bool,

    /// Directory backup files are written to.
    #[serde(default = "default_backup_dir")]
    pub backup_dir: PathBuf,
}

impl Default for BackupOptions {
    fn default() -> Self {
        Self {
            auto_backup: true,
            backup_dir: default_backup_dir(),
        }
    }
}

impl Default for ProvisioningConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            github: GithubCredentials::default(),
            tailscale: None,
            repo_count: default_repo_count(),
            naming: NamingStrategy::default(),
            template: RepositoryTemplate::default(),
            files: FileUploads::default(),
            secrets: SecretsConfig::default(),
            actions: PostCreateActions::default(),
            backup: BackupOptions::default(),
        }
    }
}

impl ProvisioningConfig {
    /// Load a configuration file, migrating legacy layouts if necessary.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not valid JSON, or
    /// declares an unknown schema version.
    pub fn load(path: &Path) -> CoreResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        let value: serde_json::Value = serde_json::from_str(&raw)?;

        match value.get("version").and_then(serde_json::Value::as_u64) {
            Some(CONFIG_VERSION) => Ok(serde_json::from_value(value)?),
            // Version-1 files never carried a version field.
            None | Some(1) => {
                tracing::info!(path = %path.display(), "Migrating legacy configuration");
                crate::migration::migrate_legacy(&value)
            }
            Some(other) => Err(CoreError::UnsupportedVersion(other)),
        }
    }

    /// Save the configuration as pretty-printed JSON.
    pub fn save(&self, path: &Path) -> CoreResult<()> {
        let rendered = serde_json::to_string_pretty(self)?;
        std::fs::write(path, rendered)?;
        Ok(())
    }

    /// Whether any configured secret draws its value from the key issuer.
    #[must_use]
    pub fn wants_issued_keys(&self) -> bool {
        self.secrets
            .repository_secrets
            .iter()
            .any(|spec| spec.source == SecretSource::IssuerAuto)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sensible() {
        let config = ProvisioningConfig::default();
        assert_eq!(config.version, CONFIG_VERSION);
        assert_eq!(config.repo_count, 10);
        assert_eq!(config.naming, NamingStrategy::AutoGenerate);
        assert!(config.template.private);
        assert!(config.template.auto_init);
        assert!(config.actions.start_workflows);
        assert!(config.backup.auto_backup);
        assert!(!config.wants_issued_keys());
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config: ProvisioningConfig = serde_json::from_str(
            r#"{
                "version": 2,
                "github": { "username": "octo", "token": "ghp_x" }
            }"#,
        )
        .unwrap();
        assert_eq!(config.repo_count, 10);
        assert!(config.template.enable_issues);
        assert!(!config.template.enable_wiki);
        assert_eq!(config.backup.backup_dir, PathBuf::from("backups"));
    }

    #[test]
    fn secret_source_tags_round_trip() {
        let specs = vec![
            SecretSpec {
                name: "TAILSCALE_AUTH_KEY".into(),
                source: SecretSource::IssuerAuto,
            },
            SecretSpec {
                name: "API_TOKEN".into(),
                source: SecretSource::Constant {
                    value: "abc".into(),
                },
            },
            SecretSpec {
                name: "DEPLOY_KEY".into(),
                source: SecretSource::ImportFile {
                    path: PathBuf::from("keys.txt"),
                },
            },
        ];
        let json = serde_json::to_string(&specs).unwrap();
        assert!(json.contains(r#""source":"issuer_auto""#));
        assert!(json.contains(r#""source":"constant""#));
        assert!(json.contains(r#""source":"import_file""#));
        let back: Vec<SecretSpec> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, specs);
    }

    #[test]
    fn wants_issued_keys_detects_issuer_source() {
        let mut config = ProvisioningConfig::default();
        config.secrets.repository_secrets.push(SecretSpec {
            name: "TAILSCALE_AUTH_KEY".into(),
            source: SecretSource::IssuerAuto,
        });
        assert!(config.wants_issued_keys());
    }

    #[test]
    fn pages_source_mapping() {
        assert_eq!(PagesSource::MainRoot.branch(), "main");
        assert_eq!(PagesSource::MainRoot.path(), "/");
        assert_eq!(PagesSource::MainDocs.path(), "/docs");
        assert_eq!(PagesSource::GhPages.branch(), "gh-pages");
    }

    #[test]
    fn load_rejects_unknown_version() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"version": 99, "github": {}}"#).unwrap();
        match ProvisioningConfig::load(&path) {
            Err(CoreError::UnsupportedVersion(99)) => {}
            other => panic!("expected UnsupportedVersion, got {other:?}"),
        }
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut config = ProvisioningConfig {
            version: CONFIG_VERSION,
            ..Default::default()
        };
        config.github.username = "octo".into();
        config.github.token = "ghp_test".into();
        config.repo_count = 3;
        config.naming = NamingStrategy::CustomPrefix {
            prefix: "demo".into(),
        };

        config.save(&path).unwrap();
        let loaded = ProvisioningConfig::load(&path).unwrap();
        assert_eq!(loaded.repo_count, 3);
        assert_eq!(
            loaded.naming,
            NamingStrategy::CustomPrefix {
                prefix: "demo".into()
            }
        );
    }
}
