//! Bulk provisioning orchestrator.
//!
//! Turns a [`repofleet_core::ProvisioningConfig`] into a sequence of
//! idempotent, retried, partially recoverable remote operations against
//! GitHub and Tailscale, tracking progress, errors, and cancellation.
//!
//! A run is a single background task that owns all mutable run state and
//! communicates outward only through an ordered event stream; see
//! [`events`] for the channel surface and [`orchestrator`] for the state
//! machine.

pub mod events;
pub mod orchestrator;
pub mod retry;
pub mod run;
pub mod secrets;

pub use events::{CancelHandle, EventSender, ProgressUpdate, RunEvent, RunPhase, RunReport, RunStats};
pub use orchestrator::{Orchestrator, RunTuning};
pub use retry::{RetryPolicy, RetryableError};
