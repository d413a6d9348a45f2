//! GitHub REST client for repository provisioning.
//!
//! Wraps `reqwest::Client` with the operations a provisioning run needs:
//! repository creation, content uploads, Actions secret injection (sealed
//! box), repository settings, and workflow dispatch.  Every operation
//! translates transport and API failures into [`GithubError`] values with
//! retryable/fatal classification; no raw transport error crosses the
//! crate boundary.

pub mod client;
pub mod error;
pub mod models;
pub mod seal;

pub use client::{GithubClient, API_BASE_URL, DEFAULT_BRANCH};
pub use error::{GithubError, GithubResult};
