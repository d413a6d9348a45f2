//! The provisioning run state machine.
//!
//! One background task drives the whole run: validate, connect, generate
//! names, optionally issue keys, then process each repository fully
//! before the next begins.  All mutable state lives in [`RunState`] and
//! is owned by this task; the outside world sees only the event stream.

use std::time::{Duration, Instant};

use tracing::{debug, error, info};
use uuid::Uuid;

use repofleet_core::config::ProvisioningConfig;
use repofleet_core::error::CoreError;
use repofleet_core::{naming, validate};
use repofleet_github::models::{BranchProtection, NewRepository};
use repofleet_github::{GithubClient, GithubError, DEFAULT_BRANCH};
use repofleet_tailscale::{backup, AuthKeyOptions, TailscaleClient};

use crate::events::{CancelHandle, EventSender, RunPhase, RunReport, RunStats};
use crate::retry::RetryPolicy;
use crate::run::{RunState, MAX_CONSECUTIVE_FAILURES};
use crate::secrets::SecretResolver;

/// Fixed in-repository path the workflow file is uploaded to.
const WORKFLOW_TARGET_PATH: &str = ".github/workflows/main.yml";

/// Filename dispatched after upload.
const WORKFLOW_DISPATCH_FILE: &str = "main.yml";

/// Timing knobs for a run.
///
/// Defaults are the production values; tests shrink them to keep the
/// pipeline fast.
#[derive(Debug, Clone)]
pub struct RunTuning {
    /// Readiness poll attempts per repository.
    pub ready_poll_attempts: u32,
    /// Pause between readiness polls.
    pub ready_poll_interval: Duration,
    /// Pause before secret injection, once the repository settles.
    pub pre_secret_delay: Duration,
    /// Pause after each successful mutating GitHub call.
    pub mutation_pacing: Duration,
}

impl Default for RunTuning {
    fn default() -> Self {
        Self {
            ready_poll_attempts: 10,
            ready_poll_interval: Duration::from_secs(2),
            pre_secret_delay: Duration::from_secs(2),
            mutation_pacing: Duration::from_millis(500),
        }
    }
}

/// Drives one provisioning run to completion.
pub struct Orchestrator {
    config: ProvisioningConfig,
    events: EventSender,
    cancel: CancelHandle,
    retry: RetryPolicy,
    tuning: RunTuning,
    key_options: AuthKeyOptions,
    github_base_url: String,
    tailscale_base_url: String,
}

impl Orchestrator {
    /// Create an orchestrator for the given configuration.
    #[must_use]
    pub fn new(config: ProvisioningConfig) -> Self {
        Self {
            config,
            events: EventSender::disabled(),
            cancel: CancelHandle::new(),
            retry: RetryPolicy::default(),
            tuning: RunTuning::default(),
            key_options: AuthKeyOptions::default(),
            github_base_url: repofleet_github::API_BASE_URL.to_string(),
            tailscale_base_url: repofleet_tailscale::API_BASE_URL.to_string(),
        }
    }

    /// Attach an event stream.
    #[must_use]
    pub fn with_events(mut self, events: EventSender) -> Self {
        self.events = events;
        self
    }

    /// Use an externally owned cancellation handle.
    #[must_use]
    pub fn with_cancel_handle(mut self, cancel: CancelHandle) -> Self {
        self.cancel = cancel;
        self
    }

    /// Override the creation retry policy.
    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Override the timing knobs.
    #[must_use]
    pub fn with_tuning(mut self, tuning: RunTuning) -> Self {
        self.tuning = tuning;
        self
    }

    /// Override the issued-key options.
    #[must_use]
    pub fn with_key_options(mut self, options: AuthKeyOptions) -> Self {
        self.key_options = options;
        self
    }

    /// Point the run at a different GitHub base URL (for testing).
    #[must_use]
    pub fn with_github_base_url(mut self, url: impl Into<String>) -> Self {
        self.github_base_url = url.into();
        self
    }

    /// Point the run at a different Tailscale base URL (for testing).
    #[must_use]
    pub fn with_tailscale_base_url(mut self, url: impl Into<String>) -> Self {
        self.tailscale_base_url = url.into();
        self
    }

    /// Handle the invoking surface can use to request cancellation.
    #[must_use]
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Execute the run to completion.
    ///
    /// Always returns a terminal [`RunReport`]; the same report is also
    /// delivered as the final event on the stream.
    pub async fn run(self) -> RunReport {
        let run_id = Uuid::new_v4();
        let started = Instant::now();
        info!(
            run_id = %run_id,
            repos = self.config.repo_count,
            "Starting provisioning run"
        );

        let report = self.execute(run_id, started).await;
        if report.success {
            info!(run_id = %run_id, "{}", report.message);
        } else {
            error!(run_id = %run_id, "{}", report.message);
        }
        self.events.finished(report.clone());
        report
    }

    async fn execute(&self, run_id: Uuid, started: Instant) -> RunReport {
        // ── 1. Offline validation ────────────────────────────────────
        self.events
            .progress(0, RunPhase::Validating, "Checking configuration...");
        if let Err(e) = validate::validate(&self.config) {
            let errors = match e {
                CoreError::Validation(issues) => issues,
                other => vec![other.to_string()],
            };
            return self.fatal(
                run_id,
                started,
                "Configuration validation failed".to_string(),
                errors,
            );
        }
        self.events
            .progress(5, RunPhase::Validating, "Configuration validated");

        // ── 2. Clients and live pre-flight checks ────────────────────
        self.events
            .progress(10, RunPhase::Initializing, "Connecting to GitHub...");
        let mut github =
            match GithubClient::new(&self.config.github.token, &self.config.github.username) {
                Ok(client) => client
                    .with_base_url(&self.github_base_url)
                    .with_pacing(self.tuning.mutation_pacing),
                Err(e) => {
                    return self.fatal(run_id, started, format!("GitHub client setup failed: {e}"), Vec::new())
                }
            };
        if let Err(e) = github.authenticate().await {
            return self.fatal(
                run_id,
                started,
                format!("GitHub connection failed: {e}"),
                Vec::new(),
            );
        }

        let tailscale = if self.config.wants_issued_keys() {
            let Some(creds) = self.config.tailscale.as_ref() else {
                // Validation guarantees this; keep the run safe regardless.
                return self.fatal(
                    run_id,
                    started,
                    "Tailscale credentials missing for issuer-sourced secrets".to_string(),
                    Vec::new(),
                );
            };
            self.events
                .progress(12, RunPhase::Initializing, "Testing Tailscale API...");
            let client = match TailscaleClient::new(&creds.api_key, &creds.tailnet) {
                Ok(client) => client
                    .with_base_url(&self.tailscale_base_url)
                    .with_pacing(self.tuning.mutation_pacing),
                Err(e) => {
                    return self.fatal(
                        run_id,
                        started,
                        format!("Tailscale client setup failed: {e}"),
                        Vec::new(),
                    )
                }
            };
            if let Err(e) = client.test_connection().await {
                return self.fatal(
                    run_id,
                    started,
                    format!("Tailscale connection failed: {e}"),
                    Vec::new(),
                );
            }
            Some(client)
        } else {
            None
        };
        self.events
            .progress(15, RunPhase::Initializing, "APIs initialized");

        // ── 3. Names and secret sources ──────────────────────────────
        self.events
            .progress(20, RunPhase::Preparing, "Generating repository names...");
        let names = match naming::generate(&self.config.naming, self.config.repo_count) {
            Ok(names) => names,
            Err(e) => {
                return self.fatal(run_id, started, format!("Name generation failed: {e}"), Vec::new())
            }
        };
        self.events.progress(
            25,
            RunPhase::Preparing,
            format!("Generated {} repository names", names.len()),
        );

        let resolver = match SecretResolver::prepare(
            &self.config.secrets.repository_secrets,
            self.config.secrets.shared_secrets_file.as_deref(),
        ) {
            Ok(resolver) => resolver,
            Err(e) => {
                return self.fatal(
                    run_id,
                    started,
                    format!("Failed to read secret values: {e}"),
                    Vec::new(),
                )
            }
        };

        let mut state = RunState::new(names);

        // ── 4. Bulk key issuance (optional, shortfall is a warning) ──
        if let Some(ts) = &tailscale {
            self.events.progress(
                30,
                RunPhase::GeneratingKeys,
                "Issuing Tailscale auth keys...",
            );
            let count = state.total();
            let events = &self.events;
            let result = ts
                .create_auth_keys(count, &self.key_options, |current, total, message| {
                    let percent = 30 + current * 10 / total.max(1);
                    events.progress(percent as u8, RunPhase::GeneratingKeys, message);
                })
                .await;

            match result {
                Ok(batch) => {
                    if batch.keys.len() < count {
                        state.warn(format!(
                            "Issued only {}/{} auth keys; some repositories will not \
                             receive issuer-sourced secrets",
                            batch.keys.len(),
                            count
                        ));
                    }
                    state.issued_keys = batch.keys;

                    if self.config.backup.auto_backup {
                        match backup::write_key_backup(
                            &state.issued_keys,
                            &self.config.backup.backup_dir,
                            self.key_options.expiry_days,
                        ) {
                            Ok(path) => info!(path = %path.display(), "Auth keys backed up"),
                            Err(e) => state.warn(format!("Failed to back up auth keys: {e}")),
                        }
                    }
                }
                Err(e) => {
                    state.warn(format!("Auth key issuance failed, continuing without keys: {e}"));
                }
            }
        }

        // ── 5. Per-repository pipeline, strictly sequential ──────────
        let total = state.total();
        let mut cancelled = false;
        let mut breaker = false;

        for i in 0..total {
            let name = state.names[i].clone();
            state.current_index = i + 1;

            if self.cancel.is_cancelled() {
                info!(next = %name, "Cancellation requested; abandoning remaining repositories");
                cancelled = true;
                break;
            }
            if state.breaker_tripped() {
                let message = format!(
                    "Aborting run: {} consecutive creation failures",
                    state.consecutive_failures
                );
                error!("{message}");
                state.errors.push(message);
                breaker = true;
                break;
            }

            let percent = (40 + i * 50 / total.max(1)) as u8;
            self.events.progress(
                percent,
                RunPhase::Creating,
                format!("Creating repository {}/{total}: {name}", i + 1),
            );
            self.emit_stats(&state);

            let new_repo = self.new_repository(&name);
            let github_ref = &github;
            let created = self
                .retry
                .execute("create_repository", || {
                    let repo = new_repo.clone();
                    async move { github_ref.create_repository(&repo).await }
                })
                .await;
            match created {
                Ok(_) => state.record_created(&name),
                Err(e) => {
                    state.record_failed(&name, format!("Failed to create {name}: {e}"));
                    self.emit_stats(&state);
                    continue;
                }
            }

            self.events.progress(
                percent,
                RunPhase::Creating,
                format!("Waiting for {name} to be ready..."),
            );
            self.wait_for_ready(&github, &name, &mut state).await;

            self.apply_settings(&github, &name, &mut state).await;
            self.upload_files(&github, &name, &mut state).await;

            if !self.tuning.pre_secret_delay.is_zero() {
                tokio::time::sleep(self.tuning.pre_secret_delay).await;
            }
            self.events.progress(
                percent,
                RunPhase::Creating,
                format!("Adding secrets to {name}..."),
            );
            self.add_secrets(&github, &name, i, &resolver, &mut state)
                .await;

            if self.config.actions.start_workflows {
                self.events.progress(
                    percent,
                    RunPhase::Creating,
                    format!("Starting workflow for {name}..."),
                );
                if let Err(e) = github.start_workflow(&name, WORKFLOW_DISPATCH_FILE).await {
                    state.warn(format!("{name}: failed to start workflow: {e}"));
                }
            }

            self.events
                .progress(percent, RunPhase::Creating, format!("Completed {name}"));
            self.emit_stats(&state);
        }

        // ── 6. Finalize ──────────────────────────────────────────────
        self.events
            .progress(95, RunPhase::Finalizing, "Finalizing...");
        self.emit_stats(&state);

        let elapsed = started.elapsed();
        let success = state.is_success();
        let phase = if cancelled {
            RunPhase::Cancelled
        } else if success {
            RunPhase::Completed
        } else {
            RunPhase::Failed
        };
        let message = if cancelled {
            format!(
                "Cancelled after creating {}/{total} repositories",
                state.created.len()
            )
        } else if breaker {
            format!(
                "Aborted after {MAX_CONSECUTIVE_FAILURES} consecutive failures; \
                 created {}/{total} repositories",
                state.created.len()
            )
        } else if success {
            format!(
                "Successfully created {}/{total} repositories in {:.1}s",
                state.created.len(),
                elapsed.as_secs_f64()
            )
        } else {
            "No repositories were created".to_string()
        };
        self.events.progress(100, phase, message.clone());

        RunReport {
            run_id,
            success,
            message,
            created_repos: state.created,
            generated_key_count: state.issued_keys.len(),
            errors: state.errors,
            elapsed_secs: elapsed.as_secs_f64(),
            phase,
        }
    }

    // ── Pipeline steps ────────────────────────────────────────────────

    /// Poll the default branch until the repository answers.
    ///
    /// Not-ready (404) keeps polling; any other failure or exhausting the
    /// attempts is a warning and never blocks the rest of the pipeline.
    async fn wait_for_ready(&self, github: &GithubClient, name: &str, state: &mut RunState) {
        for attempt in 1..=self.tuning.ready_poll_attempts {
            match github.get_branch(name, DEFAULT_BRANCH).await {
                Ok(_) => {
                    debug!(repo = name, attempt, "Repository ready");
                    return;
                }
                Err(GithubError::NotFound(_)) => {
                    if attempt < self.tuning.ready_poll_attempts
                        && !self.tuning.ready_poll_interval.is_zero()
                    {
                        tokio::time::sleep(self.tuning.ready_poll_interval).await;
                    }
                }
                Err(e) => {
                    state.warn(format!("{name}: readiness check failed: {e}"));
                    return;
                }
            }
        }
        state.warn(format!(
            "{name}: repository not confirmed ready after {} attempts",
            self.tuning.ready_poll_attempts
        ));
    }

    /// Topics, Pages, and branch protection; all best effort.
    async fn apply_settings(&self, github: &GithubClient, name: &str, state: &mut RunState) {
        let actions = &self.config.actions;

        if !self.config.template.topics.is_empty() {
            if let Err(e) = github.set_topics(name, &self.config.template.topics).await {
                state.warn(format!("{name}: failed to set topics: {e}"));
            }
        }

        if actions.enable_pages {
            if let Err(e) = github.enable_pages(name, &actions.pages_source).await {
                state.warn(format!("{name}: failed to enable Pages: {e}"));
            }
        }

        if actions.protect_main_branch {
            let protection = BranchProtection {
                require_reviews: actions.require_pr_reviews,
                require_status_checks: actions.require_status_checks,
                restrict_push: actions.restrict_push_access,
            };
            if let Err(e) = github.protect_branch(name, DEFAULT_BRANCH, &protection).await {
                state.warn(format!("{name}: failed to protect branch: {e}"));
            }
        }
    }

    /// Workflow file, .gitignore, and project paths; all best effort.
    async fn upload_files(&self, github: &GithubClient, name: &str, state: &mut RunState) {
        let files = &self.config.files;

        if let Some(workflow) = &files.workflow_file {
            if let Err(e) = github
                .upload_file(name, workflow, WORKFLOW_TARGET_PATH, "Add workflow")
                .await
            {
                state.warn(format!("{name}: workflow upload failed: {e}"));
            }
        }

        if let Some(gitignore) = &files.gitignore_file {
            if let Err(e) = github
                .upload_file(name, gitignore, ".gitignore", "Add .gitignore")
                .await
            {
                state.warn(format!("{name}: .gitignore upload failed: {e}"));
            }
        }

        for path in &files.project_paths {
            let item = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());

            if path.is_dir() {
                match github
                    .upload_folder(name, path, &item, &format!("Add {item}"))
                    .await
                {
                    Ok(summary) if summary.failed > 0 => state.warn(format!(
                        "{name}: {} file(s) under '{item}' failed to upload",
                        summary.failed
                    )),
                    Ok(_) => {}
                    Err(e) => {
                        state.warn(format!("{name}: folder upload failed for '{item}': {e}"));
                    }
                }
            } else if let Err(e) = github
                .upload_file(name, path, &item, &format!("Add {item}"))
                .await
            {
                state.warn(format!("{name}: file upload failed for '{item}': {e}"));
            }
        }
    }

    /// Per-repository secrets plus the shared `KEY=VALUE` file.
    ///
    /// Resolution shortfalls (not enough keys or value lines) and
    /// individual injection failures are warnings; the repository keeps
    /// its place in the created list either way.
    async fn add_secrets(
        &self,
        github: &GithubClient,
        name: &str,
        index: usize,
        resolver: &SecretResolver,
        state: &mut RunState,
    ) {
        let mut added = 0usize;
        let mut failed = 0usize;

        for spec in &self.config.secrets.repository_secrets {
            let resolved = resolver
                .resolve(spec, index, &state.issued_keys)
                .map(str::to_string);
            let value = match resolved {
                Ok(value) => value,
                Err(e) => {
                    failed += 1;
                    state.warn(format!("{name}: {e}"));
                    continue;
                }
            };

            match github.add_secret(name, &spec.name, &value).await {
                Ok(()) => added += 1,
                Err(e) => {
                    failed += 1;
                    state.warn(format!("{name}: failed to add secret '{}': {e}", spec.name));
                }
            }
        }

        for (key, value) in resolver.shared() {
            match github.add_secret(name, key, value).await {
                Ok(()) => added += 1,
                Err(e) => {
                    failed += 1;
                    state.warn(format!("{name}: failed to add shared secret '{key}': {e}"));
                }
            }
        }

        if added > 0 || failed > 0 {
            info!(repo = name, added, failed, "Secrets applied");
        }
    }

    // ── Helpers ───────────────────────────────────────────────────────

    fn new_repository(&self, name: &str) -> NewRepository {
        let template = &self.config.template;
        NewRepository {
            name: name.to_string(),
            description: template.description.clone(),
            private: template.private,
            auto_init: template.auto_init,
            has_issues: template.enable_issues,
            has_wiki: template.enable_wiki,
            has_projects: template.enable_projects,
        }
    }

    fn emit_stats(&self, state: &RunState) {
        self.events.stats(RunStats {
            total: state.total(),
            created: state.created.len(),
            current_index: state.current_index,
            failed: state.failed.len(),
        });
    }

    /// Terminal report for failures before the repository loop starts.
    fn fatal(
        &self,
        run_id: Uuid,
        started: Instant,
        message: String,
        errors: Vec<String>,
    ) -> RunReport {
        error!("{message}");
        self.events.progress(100, RunPhase::Failed, message.clone());
        RunReport {
            run_id,
            success: false,
            message,
            created_repos: Vec::new(),
            generated_key_count: 0,
            errors,
            elapsed_secs: started.elapsed().as_secs_f64(),
            phase: RunPhase::Failed,
        }
    }
}
