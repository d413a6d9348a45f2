//! GitHub REST client (reqwest-based).

use std::path::{Path, PathBuf};
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine};
use reqwest::{header, Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use repofleet_core::config::PagesSource;
use repofleet_core::validate::is_valid_secret_name;

use crate::error::{GithubError, GithubResult};
use crate::models::{
    AuthenticatedUser, Branch, BranchProtection, NewRepository, RepoPublicKey, Repository,
    UploadSummary, WorkflowList,
};
use crate::seal::seal_secret;

/// Production API base URL.
pub const API_BASE_URL: &str = "https://api.github.com";

/// Branch repositories are initialized with and workflows dispatch against.
pub const DEFAULT_BRANCH: &str = "main";

const ACCEPT_HEADER: &str = "application/vnd.github+json";
const USER_AGENT: &str = concat!("repofleet/", env!("CARGO_PKG_VERSION"));
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Fixed pause after every successful mutating call.  A blanket throttle,
/// not adaptive; keeps the run under GitHub's secondary rate limits.
const MUTATION_PACING: Duration = Duration::from_millis(500);

/// Local upload cap, below GitHub's own limit.
const MAX_UPLOAD_BYTES: u64 = 50 * 1024 * 1024;

const WORKFLOW_DIR_PREFIX: &str = ".github/workflows/";
const LIST_WORKFLOWS_ATTEMPTS: u32 = 3;
const DISPATCH_ATTEMPTS: u32 = 2;

/// GitHub API client scoped to one authenticated user.
#[derive(Debug, Clone)]
pub struct GithubClient {
    base_url: String,
    token: String,
    username: String,
    http: Client,
    pacing: Duration,
}

impl GithubClient {
    /// Create a new client for the given token and configured username.
    ///
    /// The username is replaced by the authenticated login once
    /// [`GithubClient::authenticate`] runs.
    pub fn new(token: impl Into<String>, username: impl Into<String>) -> GithubResult<Self> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| GithubError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            base_url: API_BASE_URL.to_string(),
            token: token.into(),
            username: username.into(),
            http,
            pacing: MUTATION_PACING,
        })
    }

    /// Point the client at a different base URL (for testing).
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Override the post-mutation pacing delay (for testing).
    #[must_use]
    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }

    /// Account the client operates under.
    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    // ── Authentication ────────────────────────────────────────────────

    /// Resolve the authenticated login and adopt it as the owner for all
    /// subsequent repository URLs.
    ///
    /// Repositories are created under the token's real account, so a stale
    /// configured username would otherwise produce Not Found errors on
    /// every follow-up call.
    pub async fn authenticate(&mut self) -> GithubResult<String> {
        let user = self.fetch_authenticated_user().await?;
        if !self.username.is_empty() && self.username != user.login {
            warn!(
                configured = %self.username,
                authenticated = %user.login,
                "Configured username differs from authenticated user; using authenticated user"
            );
        }
        self.username = user.login.clone();
        info!(login = %user.login, "GitHub API authenticated");
        Ok(user.login)
    }

    /// Read-only connectivity check; returns the authenticated login.
    pub async fn test_connection(&self) -> GithubResult<String> {
        Ok(self.fetch_authenticated_user().await?.login)
    }

    async fn fetch_authenticated_user(&self) -> GithubResult<AuthenticatedUser> {
        let response = self.request(Method::GET, self.url("/user")).send().await?;
        if response.status().is_success() {
            Self::read_json(response).await
        } else {
            Err(Self::error_from(response).await)
        }
    }

    // ── Repositories ──────────────────────────────────────────────────

    /// Create a repository under the authenticated user.
    ///
    /// A duplicate name surfaces as [`GithubError::NameConflict`], which is
    /// fatal and must not be retried.
    pub async fn create_repository(&self, new_repo: &NewRepository) -> GithubResult<Repository> {
        debug!(name = %new_repo.name, "Creating repository");
        let response = self
            .request(Method::POST, self.url("/user/repos"))
            .json(new_repo)
            .send()
            .await?;

        if response.status().is_success() {
            let repo: Repository = Self::read_json(response).await?;
            info!(name = %repo.name, "Repository created");
            self.pace().await;
            return Ok(repo);
        }

        let status = response.status();
        let err = Self::error_from(response).await;
        if status == StatusCode::UNPROCESSABLE_ENTITY {
            if let GithubError::Api { message, .. } = &err {
                if message.to_lowercase().contains("already exists") {
                    return Err(GithubError::NameConflict {
                        name: new_repo.name.clone(),
                    });
                }
            }
        }
        Err(err)
    }

    /// Fetch a branch; a [`GithubError::NotFound`] means the repository is
    /// not ready yet and readiness polling should continue.
    pub async fn get_branch(&self, repo: &str, branch: &str) -> GithubResult<Branch> {
        let response = self
            .request(Method::GET, self.repo_url(repo, &format!("branches/{branch}")))
            .send()
            .await?;
        if response.status().is_success() {
            Self::read_json(response).await
        } else {
            Err(Self::error_from(response).await)
        }
    }

    // ── Content uploads ───────────────────────────────────────────────

    /// Upload one local file as a single commit.
    pub async fn upload_file(
        &self,
        repo: &str,
        local_path: &Path,
        target_path: &str,
        commit_message: &str,
    ) -> GithubResult<()> {
        let metadata = std::fs::metadata(local_path).map_err(|source| GithubError::Io {
            path: local_path.to_path_buf(),
            source,
        })?;
        if metadata.len() > MAX_UPLOAD_BYTES {
            return Err(GithubError::FileTooLarge {
                path: local_path.to_path_buf(),
                size_mib: metadata.len() as f64 / (1024.0 * 1024.0),
            });
        }

        let content = std::fs::read(local_path).map_err(|source| GithubError::Io {
            path: local_path.to_path_buf(),
            source,
        })?;

        debug!(repo, target = target_path, bytes = content.len(), "Uploading file");
        let body = json!({
            "message": commit_message,
            "content": STANDARD.encode(&content),
            "branch": DEFAULT_BRANCH,
        });
        let response = self
            .request(
                Method::PUT,
                self.repo_url(repo, &format!("contents/{target_path}")),
            )
            .json(&body)
            .send()
            .await?;

        if response.status().is_success() {
            self.pace().await;
            Ok(())
        } else {
            Err(Self::error_from(response).await)
        }
    }

    /// Upload every file under a folder, preserving relative paths.
    ///
    /// Each file is best effort: a failed file is counted and logged but
    /// never aborts its siblings.
    pub async fn upload_folder(
        &self,
        repo: &str,
        folder: &Path,
        target_folder: &str,
        commit_message: &str,
    ) -> GithubResult<UploadSummary> {
        let mut files = Vec::new();
        collect_files(folder, &mut files).map_err(|source| GithubError::Io {
            path: folder.to_path_buf(),
            source,
        })?;
        files.sort();

        let mut summary = UploadSummary::default();
        for file in &files {
            let rel = file
                .strip_prefix(folder)
                .unwrap_or(file)
                .to_string_lossy()
                .replace('\\', "/");
            let target = if target_folder.is_empty() {
                rel.clone()
            } else {
                format!("{target_folder}/{rel}")
            };
            match self
                .upload_file(repo, file, &target, &format!("{commit_message} - {rel}"))
                .await
            {
                Ok(()) => summary.uploaded += 1,
                Err(e) => {
                    warn!(repo, file = %rel, error = %e, "File upload failed");
                    summary.failed += 1;
                }
            }
        }

        info!(
            repo,
            uploaded = summary.uploaded,
            failed = summary.failed,
            "Folder upload finished"
        );
        Ok(summary)
    }

    // ── Secrets ───────────────────────────────────────────────────────

    /// Seal and store an Actions secret on the repository.
    pub async fn add_secret(
        &self,
        repo: &str,
        secret_name: &str,
        secret_value: &str,
    ) -> GithubResult<()> {
        if !is_valid_secret_name(secret_name) {
            return Err(GithubError::InvalidSecretName(secret_name.to_string()));
        }

        debug!(repo, secret = secret_name, "Adding secret");
        let response = self
            .request(Method::GET, self.repo_url(repo, "actions/secrets/public-key"))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Self::error_from(response).await);
        }
        let key: RepoPublicKey = Self::read_json(response).await?;

        let encrypted = seal_secret(&key.key, secret_value)?;
        let body = json!({ "encrypted_value": encrypted, "key_id": key.key_id });
        let response = self
            .request(
                Method::PUT,
                self.repo_url(repo, &format!("actions/secrets/{secret_name}")),
            )
            .json(&body)
            .send()
            .await?;

        if response.status().is_success() {
            info!(repo, secret = secret_name, "Secret added");
            self.pace().await;
            Ok(())
        } else {
            Err(Self::error_from(response).await)
        }
    }

    // ── Repository settings (best effort at the call site) ────────────

    /// Replace the repository's topics.
    pub async fn set_topics(&self, repo: &str, topics: &[String]) -> GithubResult<()> {
        if topics.is_empty() {
            return Ok(());
        }
        debug!(repo, ?topics, "Setting topics");
        let response = self
            .request(Method::PUT, self.repo_url(repo, "topics"))
            .json(&json!({ "names": topics }))
            .send()
            .await?;
        if response.status().is_success() {
            self.pace().await;
            Ok(())
        } else {
            Err(Self::error_from(response).await)
        }
    }

    /// Enable GitHub Pages; an existing Pages site counts as success.
    pub async fn enable_pages(&self, repo: &str, source: &PagesSource) -> GithubResult<()> {
        debug!(repo, branch = source.branch(), path = source.path(), "Enabling Pages");
        let body = json!({
            "source": { "branch": source.branch(), "path": source.path() }
        });
        let response = self
            .request(Method::POST, self.repo_url(repo, "pages"))
            .json(&body)
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => {
                self.pace().await;
                Ok(())
            }
            StatusCode::CONFLICT => {
                debug!(repo, "Pages already enabled");
                Ok(())
            }
            _ => Err(Self::error_from(response).await),
        }
    }

    /// Apply branch protection to the given branch.
    pub async fn protect_branch(
        &self,
        repo: &str,
        branch: &str,
        protection: &BranchProtection,
    ) -> GithubResult<()> {
        debug!(repo, branch, "Applying branch protection");
        let required_status_checks = if protection.require_status_checks {
            json!({ "strict": true, "contexts": [] })
        } else {
            Value::Null
        };
        let required_reviews = if protection.require_reviews {
            json!({ "required_approving_review_count": 1 })
        } else {
            Value::Null
        };
        let body = json!({
            "required_status_checks": required_status_checks,
            "enforce_admins": false,
            "required_pull_request_reviews": required_reviews,
            "restrictions": Value::Null,
        });

        let response = self
            .request(
                Method::PUT,
                self.repo_url(repo, &format!("branches/{branch}/protection")),
            )
            .json(&body)
            .send()
            .await?;
        if response.status().is_success() {
            self.pace().await;
            Ok(())
        } else {
            Err(Self::error_from(response).await)
        }
    }

    // ── Workflows ─────────────────────────────────────────────────────

    /// Resolve a workflow by filename and dispatch it against the default
    /// branch.
    ///
    /// Accepts either a bare filename or a full `.github/workflows/` path.
    /// Distinct errors separate "no workflows at all", "file not among the
    /// workflows", and "workflow refuses manual dispatch".
    pub async fn start_workflow(&self, repo: &str, workflow_file: &str) -> GithubResult<()> {
        let file = workflow_file
            .strip_prefix(WORKFLOW_DIR_PREFIX)
            .unwrap_or(workflow_file);
        info!(repo, workflow = file, "Starting workflow");

        let list = self.list_workflows_with_retry(repo).await?;
        let Some(workflow) = list.workflows.iter().find(|w| w.path.ends_with(file)) else {
            if list.workflows.is_empty() {
                return Err(GithubError::NoWorkflows {
                    repo: repo.to_string(),
                });
            }
            return Err(GithubError::WorkflowNotFound {
                repo: repo.to_string(),
                file: file.to_string(),
                available: list.workflows.iter().map(|w| w.path.clone()).collect(),
            });
        };

        debug!(repo, id = workflow.id, path = %workflow.path, "Resolved workflow");
        self.dispatch_workflow(repo, workflow.id, file).await
    }

    async fn list_workflows_with_retry(&self, repo: &str) -> GithubResult<WorkflowList> {
        let mut attempt = 0;
        loop {
            let result: GithubResult<WorkflowList> = async {
                let response = self
                    .request(Method::GET, self.repo_url(repo, "actions/workflows"))
                    .send()
                    .await?;
                if response.status().is_success() {
                    Self::read_json(response).await
                } else {
                    Err(Self::error_from(response).await)
                }
            }
            .await;

            match result {
                Ok(list) => return Ok(list),
                Err(e) if e.is_retryable() && attempt + 1 < LIST_WORKFLOWS_ATTEMPTS => {
                    attempt += 1;
                    warn!(repo, attempt, error = %e, "Workflow list failed, retrying");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
                Err(GithubError::NotFound(_)) => {
                    return Err(GithubError::NotFound(format!(
                        "repository '{repo}' not found or has no workflows"
                    )))
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn dispatch_workflow(&self, repo: &str, workflow_id: u64, file: &str) -> GithubResult<()> {
        let body = json!({ "ref": DEFAULT_BRANCH, "inputs": {} });
        let url = self.repo_url(repo, &format!("actions/workflows/{workflow_id}/dispatches"));

        let mut attempt = 0;
        loop {
            let response = self
                .request(Method::POST, url.clone())
                .json(&body)
                .send()
                .await?;
            let status = response.status();

            if status.is_success() {
                info!(repo, workflow = file, "Workflow dispatched");
                self.pace().await;
                return Ok(());
            }

            // 422 immediately after creation usually means the repository
            // is not yet ready to accept dispatches.
            if status == StatusCode::UNPROCESSABLE_ENTITY && attempt + 1 < DISPATCH_ATTEMPTS {
                let wait = Duration::from_secs(1 << attempt);
                debug!(
                    repo,
                    workflow = file,
                    delay_secs = wait.as_secs(),
                    "Dispatch returned 422, retrying"
                );
                tokio::time::sleep(wait).await;
                attempt += 1;
                continue;
            }

            return Err(match status {
                StatusCode::NOT_FOUND | StatusCode::UNPROCESSABLE_ENTITY => {
                    GithubError::WorkflowNotDispatchable {
                        file: file.to_string(),
                    }
                }
                _ => Self::error_from(response).await,
            });
        }
    }

    // ── Internals ─────────────────────────────────────────────────────

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn repo_url(&self, repo: &str, suffix: &str) -> String {
        format!("{}/repos/{}/{repo}/{suffix}", self.base_url, self.username)
    }

    fn request(&self, method: Method, url: String) -> RequestBuilder {
        self.http
            .request(method, url)
            .bearer_auth(&self.token)
            .header(header::ACCEPT, ACCEPT_HEADER)
    }

    async fn pace(&self) {
        if !self.pacing.is_zero() {
            tokio::time::sleep(self.pacing).await;
        }
    }

    async fn read_json<T: DeserializeOwned>(response: Response) -> GithubResult<T> {
        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| GithubError::Parse(e.to_string()))
    }

    async fn error_from(response: Response) -> GithubError {
        let status = response.status();
        let retry_after = response
            .headers()
            .get("Retry-After")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        let body = response.text().await.unwrap_or_default();

        let message = match serde_json::from_str::<Value>(&body) {
            Ok(parsed) => {
                let mut message = parsed
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("")
                    .to_string();
                // Validation responses carry the specifics in an errors array.
                if let Some(errors) = parsed.get("errors") {
                    message.push_str(&format!(" {errors}"));
                }
                message.trim().to_string()
            }
            Err(_) => body.clone(),
        };
        let message = if message.is_empty() {
            format!("HTTP {status}")
        } else {
            message
        };

        match status {
            StatusCode::NOT_FOUND => GithubError::NotFound(message),
            StatusCode::UNAUTHORIZED => GithubError::Auth {
                status: 401,
                message,
            },
            StatusCode::TOO_MANY_REQUESTS => GithubError::RateLimited {
                retry_after_secs: retry_after,
            },
            StatusCode::FORBIDDEN if message.to_lowercase().contains("rate limit") => {
                GithubError::RateLimited {
                    retry_after_secs: retry_after,
                }
            }
            StatusCode::FORBIDDEN => GithubError::Auth {
                status: 403,
                message,
            },
            _ => GithubError::Api {
                status: status.as_u16(),
                message,
            },
        }
    }
}

/// Recursively collect every file under `dir`.
fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> std::io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_files(&path, out)?;
        } else {
            out.push(path);
        }
    }
    Ok(())
}
