//! Mutable state of one provisioning run.
//!
//! A plain data object owned exclusively by the orchestrator task; the
//! breaker arithmetic lives here so it can be tested in isolation.

/// Consecutive hard creation failures that abort the whole run.
///
/// Guards against burning the remaining names on a systemically broken
/// setup (revoked token, suspended account) rather than a few bad names.
pub const MAX_CONSECUTIVE_FAILURES: u32 = 5;

/// Accumulated state of a run.
#[derive(Debug)]
pub struct RunState {
    /// Ordered target names, fixed at run start.
    pub names: Vec<String>,
    /// 1-based index of the repository currently being processed.
    pub current_index: usize,
    /// Names created so far, in order.
    pub created: Vec<String>,
    /// Names whose creation failed.
    pub failed: Vec<String>,
    /// Every warning and error message, verbatim.
    pub errors: Vec<String>,
    /// Hard creation failures since the last success.
    pub consecutive_failures: u32,
    /// Keys issued for issuer-sourced secrets, positional by repository.
    pub issued_keys: Vec<String>,
}

impl RunState {
    #[must_use]
    pub fn new(names: Vec<String>) -> Self {
        Self {
            names,
            current_index: 0,
            created: Vec::new(),
            failed: Vec::new(),
            errors: Vec::new(),
            consecutive_failures: 0,
            issued_keys: Vec::new(),
        }
    }

    /// Total number of target repositories.
    #[must_use]
    pub fn total(&self) -> usize {
        self.names.len()
    }

    /// Record a successful creation, resetting the breaker counter.
    pub fn record_created(&mut self, name: &str) {
        self.consecutive_failures = 0;
        self.created.push(name.to_string());
    }

    /// Record a failed creation, advancing the breaker counter.
    pub fn record_failed(&mut self, name: &str, error: String) {
        self.consecutive_failures += 1;
        self.failed.push(name.to_string());
        self.errors.push(error);
    }

    /// Record a non-fatal warning.
    pub fn warn(&mut self, message: String) {
        tracing::warn!("{message}");
        self.errors.push(message);
    }

    /// Whether the consecutive-failure breaker has tripped.
    #[must_use]
    pub fn breaker_tripped(&self) -> bool {
        self.consecutive_failures >= MAX_CONSECUTIVE_FAILURES
    }

    /// Overall success: at least one repository was created.
    #[must_use]
    pub fn is_success(&self) -> bool {
        !self.created.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(n: usize) -> Vec<String> {
        (1..=n).map(|i| format!("repo-{i:02}")).collect()
    }

    #[test]
    fn starts_empty() {
        let state = RunState::new(names(3));
        assert_eq!(state.total(), 3);
        assert!(state.created.is_empty());
        assert!(state.failed.is_empty());
        assert!(!state.breaker_tripped());
        assert!(!state.is_success());
    }

    #[test]
    fn success_resets_the_breaker() {
        let mut state = RunState::new(names(10));
        state.record_failed("repo-01", "boom".into());
        state.record_failed("repo-02", "boom".into());
        assert_eq!(state.consecutive_failures, 2);

        state.record_created("repo-03");
        assert_eq!(state.consecutive_failures, 0);

        state.record_failed("repo-04", "boom".into());
        assert!(!state.breaker_tripped());
    }

    #[test]
    fn breaker_trips_at_threshold() {
        let mut state = RunState::new(names(10));
        for i in 0..MAX_CONSECUTIVE_FAILURES {
            assert!(!state.breaker_tripped());
            state.record_failed(&format!("repo-{i:02}"), "boom".into());
        }
        assert!(state.breaker_tripped());
        assert_eq!(state.errors.len(), 5);
    }

    #[test]
    fn scattered_failures_do_not_trip_the_breaker() {
        let mut state = RunState::new(names(10));
        for i in 0..8 {
            if i % 2 == 0 {
                state.record_failed(&format!("repo-{i:02}"), "boom".into());
            } else {
                state.record_created(&format!("repo-{i:02}"));
            }
        }
        assert!(!state.breaker_tripped());
        assert_eq!(state.failed.len(), 4);
        assert!(state.is_success());
    }

    #[test]
    fn partial_success_is_success() {
        let mut state = RunState::new(names(2));
        state.record_created("repo-01");
        state.record_failed("repo-02", "boom".into());
        assert!(state.is_success());
    }
}
