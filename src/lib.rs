//! cfgtree - schema-driven hierarchical configuration
//!
//! Re-exports the resolution engine from `cfgtree-core` and adds document
//! parsing (TOML / JSON) plus the deployment configuration schemas used by
//! the `cfgtree` command-line tool.

pub mod deployment;
pub mod document;

pub use cfgtree_core::*;
pub use deployment::{DeploymentConfig, DeploymentReport, EnvironmentReport};
pub use document::{DocumentError, DocumentFormat, LoadedDocument};
