//! Core configuration and pre-flight logic for repofleet.
//!
//! This crate owns everything a provisioning run needs before the first
//! remote call is made: the typed configuration model (with one-shot
//! migration of the legacy flat layout), repository name generation, and
//! offline validation.

pub mod config;
pub mod error;
pub mod migration;
pub mod naming;
pub mod validate;

pub use config::{
    BackupOptions, FileUploads, GithubCredentials, NamingStrategy, PagesSource,
    PostCreateActions, ProvisioningConfig, RepositoryTemplate, SecretSource, SecretSpec,
    SecretsConfig, TailscaleCredentials,
};
pub use error::{CoreError, CoreResult};
