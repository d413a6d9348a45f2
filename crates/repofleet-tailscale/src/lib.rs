//! Tailscale key-issuance client.
//!
//! Issues, lists, and deletes tailnet auth keys, with bulk issuance that
//! reports progress and tolerates partial failure, and plain-text key
//! backups with a commented header block.

pub mod backup;
pub mod client;
pub mod error;

pub use client::{AuthKeyOptions, KeyBatch, TailscaleClient, API_BASE_URL, DEFAULT_KEY_EXPIRY_DAYS};
pub use error::{TailscaleError, TailscaleResult};
