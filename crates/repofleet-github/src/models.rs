//! Wire models for the GitHub REST API (subset used by provisioning).

use serde::{Deserialize, Serialize};

fn default_branch() -> String {
    "main".to_string()
}

/// A repository as returned by the repositories endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Repository {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub full_name: String,
    #[serde(default = "default_branch")]
    pub default_branch: String,
    #[serde(default)]
    pub private: bool,
}

/// Request body for `POST /user/repos`.
#[derive(Debug, Clone, Serialize)]
pub struct NewRepository {
    pub name: String,
    pub description: String,
    pub private: bool,
    pub auto_init: bool,
    pub has_issues: bool,
    pub has_wiki: bool,
    pub has_projects: bool,
}

/// A branch as returned by the branches endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct Branch {
    pub name: String,
}

/// The authenticated user (`GET /user`).
#[derive(Debug, Clone, Deserialize)]
pub struct AuthenticatedUser {
    pub login: String,
}

/// Repository public key used to seal Actions secrets.
#[derive(Debug, Clone, Deserialize)]
pub struct RepoPublicKey {
    pub key_id: String,
    /// Base64-encoded 32-byte Curve25519 public key.
    pub key: String,
}

/// One workflow from the workflows list endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct Workflow {
    pub id: u64,
    #[serde(default)]
    pub name: String,
    pub path: String,
}

/// Response of `GET /repos/{owner}/{repo}/actions/workflows`.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkflowList {
    #[serde(default)]
    pub workflows: Vec<Workflow>,
}

/// Branch protection options applied by provisioning.
#[derive(Debug, Clone, Copy, Default)]
pub struct BranchProtection {
    pub require_reviews: bool,
    pub require_status_checks: bool,
    pub restrict_push: bool,
}

/// Outcome of a best-effort multi-file upload.
#[derive(Debug, Clone, Copy, Default)]
pub struct UploadSummary {
    pub uploaded: usize,
    pub failed: usize,
}
