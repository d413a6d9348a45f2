//! Mock GitHub and Tailscale servers for orchestrator tests.

#![allow(dead_code)]

use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine};
use serde_json::json;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

use repofleet_core::config::{NamingStrategy, ProvisioningConfig, TailscaleCredentials};
use repofleet_provisioning::{RetryPolicy, RunTuning};

/// A scenario-configurable mock of the GitHub API.
pub struct MockGithub {
    pub server: MockServer,
}

impl MockGithub {
    pub async fn start() -> Self {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/user"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "login": "octo" })))
            .mount(&server)
            .await;
        Self { server }
    }

    pub fn uri(&self) -> String {
        self.server.uri()
    }

    /// Every repository creation succeeds.
    pub async fn mock_create_ok(&self) {
        Mock::given(method("POST"))
            .and(path("/user/repos"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "id": 1,
                "name": "created",
                "full_name": "octo/created",
                "default_branch": "main",
                "private": true
            })))
            .mount(&self.server)
            .await;
    }

    /// Every repository creation fails with the given status; `expected`
    /// asserts the exact number of creation attempts.
    pub async fn mock_create_failing(&self, status: u16, expected: u64) {
        Mock::given(method("POST"))
            .and(path("/user/repos"))
            .respond_with(
                ResponseTemplate::new(status).set_body_json(json!({ "message": "creation failed" })),
            )
            .expect(expected)
            .mount(&self.server)
            .await;
    }

    /// The first `fast` creations answer immediately, the next one is
    /// delayed to give a cancellation window.
    pub async fn mock_create_with_slow_tail(&self, fast: u64, delay: Duration) {
        let body = json!({
            "id": 1,
            "name": "created",
            "full_name": "octo/created",
            "default_branch": "main",
            "private": true
        });
        Mock::given(method("POST"))
            .and(path("/user/repos"))
            .respond_with(ResponseTemplate::new(201).set_body_json(body.clone()))
            .up_to_n_times(fast)
            .mount(&self.server)
            .await;
        Mock::given(method("POST"))
            .and(path("/user/repos"))
            .respond_with(
                ResponseTemplate::new(201)
                    .set_body_json(body)
                    .set_delay(delay),
            )
            .mount(&self.server)
            .await;
    }

    /// Default branch is immediately available for every repository.
    pub async fn mock_branch_ready(&self) {
        Mock::given(method("GET"))
            .and(path_regex(r"^/repos/octo/[^/]+/branches/main$"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "name": "main" })))
            .mount(&self.server)
            .await;
    }

    /// Secrets public key plus accepting secret PUTs; `expected_puts`
    /// asserts how many secrets actually land.
    pub async fn mock_secrets(&self, expected_puts: u64) {
        Mock::given(method("GET"))
            .and(path_regex(r"^/repos/octo/[^/]+/actions/secrets/public-key$"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "key_id": "568250167242549743",
                "key": STANDARD.encode([7u8; 32])
            })))
            .mount(&self.server)
            .await;
        Mock::given(method("PUT"))
            .and(path_regex(r"^/repos/octo/[^/]+/actions/secrets/[A-Z0-9_]+$"))
            .respond_with(ResponseTemplate::new(201))
            .expect(expected_puts)
            .mount(&self.server)
            .await;
    }

    /// Workflow listing returns no workflows at all.
    pub async fn mock_no_workflows(&self) {
        Mock::given(method("GET"))
            .and(path_regex(r"^/repos/octo/[^/]+/actions/workflows$"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "workflows": [] })))
            .mount(&self.server)
            .await;
    }

    /// Number of repository-creation requests the server received.
    pub async fn create_calls(&self) -> usize {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|r| r.method.as_str() == "POST" && r.url.path() == "/user/repos")
            .count()
    }
}

/// A scenario-configurable mock of the Tailscale API.
pub struct MockTailscale {
    pub server: MockServer,
}

impl MockTailscale {
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    pub fn uri(&self) -> String {
        self.server.uri()
    }

    /// Read-only key listing succeeds (connectivity pre-flight).
    pub async fn mock_list_ok(&self) {
        Mock::given(method("GET"))
            .and(path("/tailnet/test-net/keys"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "keys": [] })))
            .mount(&self.server)
            .await;
    }

    /// Read-only key listing rejects the credentials.
    pub async fn mock_list_unauthorized(&self) {
        Mock::given(method("GET"))
            .and(path("/tailnet/test-net/keys"))
            .respond_with(
                ResponseTemplate::new(401).set_body_json(json!({ "message": "invalid API key" })),
            )
            .mount(&self.server)
            .await;
    }

    /// The first `successes` issuance calls return keys, the rest fail.
    pub async fn mock_issue_partial(&self, successes: u64) {
        Mock::given(method("POST"))
            .and(path("/tailnet/test-net/keys"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "key": "tskey-auth-issued"
            })))
            .up_to_n_times(successes)
            .mount(&self.server)
            .await;
        Mock::given(method("POST"))
            .and(path("/tailnet/test-net/keys"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({ "message": "boom" })))
            .mount(&self.server)
            .await;
    }
}

/// A minimal valid configuration pointed at the mock servers.
pub fn base_config(repo_count: u32, prefix: &str) -> ProvisioningConfig {
    let mut config = ProvisioningConfig::default();
    config.github.username = "octo".into();
    config.github.token = "ghp_test".into();
    config.repo_count = repo_count;
    config.naming = NamingStrategy::CustomPrefix {
        prefix: prefix.into(),
    };
    config.actions.start_workflows = false;
    config.backup.auto_backup = false;
    config
}

/// Tailscale credentials matching the mock server.
pub fn test_tailscale_credentials() -> TailscaleCredentials {
    TailscaleCredentials {
        api_key: "tskey-api-test".into(),
        tailnet: "test-net".into(),
    }
}

/// Timing without production sleeps.
pub fn fast_tuning() -> RunTuning {
    RunTuning {
        ready_poll_attempts: 1,
        ready_poll_interval: Duration::ZERO,
        pre_secret_delay: Duration::ZERO,
        mutation_pacing: Duration::ZERO,
    }
}

/// Retry policy without backoff sleeps.
pub fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy::immediate(max_attempts)
}
