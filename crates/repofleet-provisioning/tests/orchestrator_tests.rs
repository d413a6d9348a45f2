//! End-to-end orchestrator tests against mock GitHub/Tailscale servers.

mod helpers;

use std::time::Duration;

use helpers::{
    base_config, fast_retry, fast_tuning, test_tailscale_credentials, MockGithub, MockTailscale,
};
use repofleet_core::config::{SecretSource, SecretSpec};
use repofleet_provisioning::{events, Orchestrator, RunEvent, RunPhase};

#[tokio::test]
async fn full_run_creates_every_repository() {
    let github = MockGithub::start().await;
    github.mock_create_ok().await;
    github.mock_branch_ready().await;

    let config = base_config(3, "repo");
    let report = Orchestrator::new(config)
        .with_github_base_url(github.uri())
        .with_tuning(fast_tuning())
        .with_retry_policy(fast_retry(3))
        .run()
        .await;

    assert!(report.success);
    assert_eq!(report.phase, RunPhase::Completed);
    assert_eq!(report.created_repos, vec!["repo-01", "repo-02", "repo-03"]);
    assert!(report.errors.is_empty(), "unexpected errors: {:?}", report.errors);
    assert_eq!(report.generated_key_count, 0);
    assert_eq!(github.create_calls().await, 3);
}

#[tokio::test]
async fn five_consecutive_failures_abort_the_run() {
    let github = MockGithub::start().await;
    // 10 repositories requested; the breaker stops the run after the 5th
    // consecutive creation failure, so exactly 5 attempts reach the API.
    github.mock_create_failing(500, 5).await;

    let config = base_config(10, "repo");
    let report = Orchestrator::new(config)
        .with_github_base_url(github.uri())
        .with_tuning(fast_tuning())
        .with_retry_policy(fast_retry(1))
        .run()
        .await;

    assert!(!report.success);
    assert_eq!(report.phase, RunPhase::Failed);
    assert!(report.created_repos.is_empty());
    assert!(report
        .errors
        .iter()
        .any(|e| e.contains("consecutive creation failures")));
    assert_eq!(github.create_calls().await, 5);
}

#[tokio::test]
async fn scattered_failures_do_not_abort() {
    let github = MockGithub::start().await;
    github.mock_branch_ready().await;
    // Creation alternates: ok, fail, ok, fail (mount order decides).
    // up_to_n_times(1) each keeps the sequence deterministic.
    for ok in [true, false, true, false] {
        let template = if ok {
            wiremock::ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "id": 1, "name": "created", "full_name": "octo/created",
                "default_branch": "main", "private": true
            }))
        } else {
            wiremock::ResponseTemplate::new(500)
                .set_body_json(serde_json::json!({ "message": "boom" }))
        };
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .and(wiremock::matchers::path("/user/repos"))
            .respond_with(template)
            .up_to_n_times(1)
            .mount(&github.server)
            .await;
    }

    let config = base_config(4, "repo");
    let report = Orchestrator::new(config)
        .with_github_base_url(github.uri())
        .with_tuning(fast_tuning())
        .with_retry_policy(fast_retry(1))
        .run()
        .await;

    // Partial success is still success.
    assert!(report.success);
    assert_eq!(report.phase, RunPhase::Completed);
    assert_eq!(report.created_repos, vec!["repo-01", "repo-03"]);
    assert_eq!(report.errors.len(), 2);
}

#[tokio::test]
async fn key_shortfall_is_a_warning_not_a_failure() {
    let github = MockGithub::start().await;
    github.mock_create_ok().await;
    github.mock_branch_ready().await;
    // Two repositories want issuer secrets; only repository 0 gets one.
    github.mock_secrets(1).await;

    let tailscale = MockTailscale::start().await;
    tailscale.mock_list_ok().await;
    tailscale.mock_issue_partial(1).await;

    let mut config = base_config(2, "repo");
    config.tailscale = Some(test_tailscale_credentials());
    config.secrets.repository_secrets.push(SecretSpec {
        name: "TAILSCALE_AUTH_KEY".into(),
        source: SecretSource::IssuerAuto,
    });

    let report = Orchestrator::new(config)
        .with_github_base_url(github.uri())
        .with_tailscale_base_url(tailscale.uri())
        .with_tuning(fast_tuning())
        .with_retry_policy(fast_retry(1))
        .run()
        .await;

    assert!(report.success);
    assert_eq!(report.created_repos, vec!["repo-01", "repo-02"]);
    assert_eq!(report.generated_key_count, 1);
    assert!(report.errors.iter().any(|e| e.contains("Issued only 1/2")));
    assert!(report
        .errors
        .iter()
        .any(|e| e.contains("repo-02") && e.contains("not enough auth keys")));
}

#[tokio::test]
async fn cancellation_keeps_partial_results() {
    let github = MockGithub::start().await;
    github.mock_branch_ready().await;
    // Repositories 1-2 create instantly; repository 3 is slow enough for
    // the cancellation (sent once two are created) to land while it is in
    // flight.  The in-flight repository finishes, 4-5 are never started.
    github
        .mock_create_with_slow_tail(2, Duration::from_millis(500))
        .await;

    let (sender, mut rx) = events::channel();
    let orchestrator = Orchestrator::new(base_config(5, "repo"))
        .with_github_base_url(github.uri())
        .with_tuning(fast_tuning())
        .with_retry_policy(fast_retry(1))
        .with_events(sender);
    let cancel = orchestrator.cancel_handle();

    let run = tokio::spawn(orchestrator.run());

    let mut finished = None;
    while let Some(event) = rx.recv().await {
        match event {
            RunEvent::Stats(stats) if stats.created == 2 => cancel.cancel(),
            RunEvent::Finished(report) => finished = Some(report),
            _ => {}
        }
    }
    let report = run.await.unwrap();

    assert_eq!(report.phase, RunPhase::Cancelled);
    assert!(report.success, "partial completion is not an error state");
    assert_eq!(report.created_repos, vec!["repo-01", "repo-02", "repo-03"]);
    assert_eq!(github.create_calls().await, 3);
    assert!(report.message.contains("Cancelled after creating 3/5"));

    // The terminal report is also delivered on the event stream.
    let streamed = finished.expect("Finished event missing");
    assert_eq!(streamed.created_repos, report.created_repos);
}

#[tokio::test]
async fn validation_failure_stops_before_any_remote_call() {
    let github = MockGithub::start().await;

    let mut config = base_config(3, "repo");
    config.github.token.clear();

    let report = Orchestrator::new(config)
        .with_github_base_url(github.uri())
        .with_tuning(fast_tuning())
        .run()
        .await;

    assert!(!report.success);
    assert_eq!(report.phase, RunPhase::Failed);
    assert!(report.message.contains("validation failed"));
    assert!(report.errors.iter().any(|e| e.contains("token")));
    assert!(github.server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn tailscale_preflight_failure_stops_the_run() {
    let github = MockGithub::start().await;
    let tailscale = MockTailscale::start().await;
    tailscale.mock_list_unauthorized().await;

    let mut config = base_config(2, "repo");
    config.tailscale = Some(test_tailscale_credentials());
    config.secrets.repository_secrets.push(SecretSpec {
        name: "TAILSCALE_AUTH_KEY".into(),
        source: SecretSource::IssuerAuto,
    });

    let report = Orchestrator::new(config)
        .with_github_base_url(github.uri())
        .with_tailscale_base_url(tailscale.uri())
        .with_tuning(fast_tuning())
        .run()
        .await;

    assert!(!report.success);
    assert!(report.message.contains("Tailscale connection failed"));
    assert_eq!(github.create_calls().await, 0);
}

#[tokio::test]
async fn workflow_trigger_failure_is_a_warning() {
    let github = MockGithub::start().await;
    github.mock_create_ok().await;
    github.mock_branch_ready().await;
    github.mock_no_workflows().await;

    let mut config = base_config(1, "repo");
    config.actions.start_workflows = true;

    let report = Orchestrator::new(config)
        .with_github_base_url(github.uri())
        .with_tuning(fast_tuning())
        .with_retry_policy(fast_retry(1))
        .run()
        .await;

    assert!(report.success);
    assert_eq!(report.created_repos, vec!["repo-01"]);
    assert!(report
        .errors
        .iter()
        .any(|e| e.contains("failed to start workflow")));
}

#[tokio::test]
async fn progress_events_cover_the_whole_run() {
    let github = MockGithub::start().await;
    github.mock_create_ok().await;
    github.mock_branch_ready().await;

    let (sender, mut rx) = events::channel();
    let report = Orchestrator::new(base_config(2, "repo"))
        .with_github_base_url(github.uri())
        .with_tuning(fast_tuning())
        .with_retry_policy(fast_retry(1))
        .with_events(sender)
        .run()
        .await;
    assert!(report.success);

    let mut percents = Vec::new();
    let mut saw_finished = false;
    while let Ok(event) = rx.try_recv() {
        match event {
            RunEvent::Progress(update) => percents.push(update.overall_percent),
            RunEvent::Finished(_) => saw_finished = true,
            RunEvent::Stats(_) => {}
        }
    }

    assert!(saw_finished);
    assert_eq!(*percents.first().unwrap(), 0);
    assert_eq!(*percents.last().unwrap(), 100);
    assert!(percents.windows(2).all(|w| w[0] <= w[1]), "{percents:?}");
}
