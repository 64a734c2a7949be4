//! Paths to deployment documents used by the integration tests.

use std::path::{Path, PathBuf};

/// Path to the TOML deployment fixture
pub fn deployment_toml_path() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/deployment.toml")
}

/// Path to the JSON deployment fixture
pub fn deployment_json_path() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/deployment.json")
}
