//! Deployment configuration schemas.
//!
//! A `config_root` owns a single `deployment`. The deployment holds the
//! defaults; every key it does not declare names an environment and becomes
//! a `deployment_environment` child that overrides or merges with them:
//!
//! ```toml
//! [deployment]
//! repo = "git@example.org:app.git"
//! listen_port = "80"
//! environment = { RAILS_ENV = "production" }
//!
//! [deployment.staging]
//! db_host = "127.0.0.1"
//! environment = { RAILS_ENV = "staging", DEBUG = "1" }
//! ```

use serde::Serialize;
use serde_json::Value;
use std::fmt::Write as _;
use std::net::ToSocketAddrs;
use std::path::Path;
use std::sync::Arc;

use cfgtree_core::{
    to_text, ConfigTree, Error, NodeId, PropertyDefinition, PropertyValue, Schema,
    SchemaRegistry, ValidationError, ValidationSpec, ValueType,
};

use crate::document::{load_into, DocumentError, LoadedDocument};

pub const CONFIG_ROOT: &str = "config_root";
pub const DEPLOYMENT: &str = "deployment";
pub const DEPLOYMENT_ENVIRONMENT: &str = "deployment_environment";

const PORT_PATTERN: &str = r"^\d+$";

/// Check used by the `db_host` validator; returns the failure reason.
pub type HostCheck = Arc<dyn Fn(&str) -> Result<(), String> + Send + Sync>;

/// Registry with the deployment kinds, checking `db_host` through DNS.
pub fn registry() -> Result<SchemaRegistry, Error> {
    registry_with_host_check(Arc::new(resolve_host))
}

/// Registry with the deployment kinds and a caller-supplied host check.
pub fn registry_with_host_check(host_check: HostCheck) -> Result<SchemaRegistry, Error> {
    let mut registry = SchemaRegistry::new();

    registry.register(
        Schema::new(CONFIG_ROOT)
            .with_property(DEPLOYMENT, PropertyDefinition::child().kind(DEPLOYMENT))?,
    )?;

    registry.register(
        Schema::new(DEPLOYMENT)
            .with_property(
                "repo",
                PropertyDefinition::scalar().validation(ValidationSpec::Type(ValueType::String)),
            )?
            .with_property(
                "listen_port",
                PropertyDefinition::scalar().validation(ValidationSpec::pattern(PORT_PATTERN)?),
            )?
            .with_property(
                "environment",
                PropertyDefinition::scalar().validation(ValidationSpec::Type(ValueType::Hash)),
            )?
            .open(register_environment),
    )?;

    registry.register(
        Schema::new(DEPLOYMENT_ENVIRONMENT)
            .with_property(
                "environment",
                PropertyDefinition::scalar()
                    .merge_with_parent(true)
                    .override_parent(false)
                    .default(Value::Object(Default::default()))
                    .validation(ValidationSpec::Type(ValueType::Hash)),
            )?
            .with_property(
                "name",
                PropertyDefinition::scalar().validation(ValidationSpec::Type(ValueType::String)),
            )?
            .with_property(
                "db_host",
                PropertyDefinition::scalar()
                    .validation(ValidationSpec::Type(ValueType::String))
                    .validator(move |property, value| {
                        let host = value.as_str().ok_or_else(|| {
                            ValidationError::rejected(property, "should be a host name")
                        })?;
                        host_check(host).map_err(|reason| {
                            ValidationError::rejected(
                                property,
                                format!("DNS validation of host `{}` failed: {}", host, reason),
                            )
                        })
                    }),
            )?
            .with_property(
                "listen_port",
                PropertyDefinition::scalar()
                    .validation(ValidationSpec::pattern(PORT_PATTERN)?)
                    .override_parent(true),
            )?,
    )?;

    Ok(registry)
}

/// Unknown keys of a deployment name environments: create one, load its
/// data, then link it under the deployment by that name.
fn register_environment(
    tree: &mut ConfigTree,
    deployment: NodeId,
    key: &str,
    data: &Value,
) -> Result<(), Error> {
    let environment = tree.new_node_of_kind(DEPLOYMENT_ENVIRONMENT)?;
    tree.set(environment, "name", Value::String(key.to_string()))?;
    tree.load_data(environment, data)?;
    tree.register_child(deployment, environment, Some(key))?;
    tracing::info!(environment = key, "found deployment environment");
    Ok(())
}

fn resolve_host(host: &str) -> Result<(), String> {
    let mut addrs = (host, 0).to_socket_addrs().map_err(|e| e.to_string())?;
    match addrs.next() {
        Some(_) => Ok(()),
        None => Err("no addresses found".to_string()),
    }
}

/// A loaded deployment configuration.
#[derive(Debug, Clone)]
pub struct DeploymentConfig {
    pub tree: ConfigTree,
    pub root: NodeId,
    pub deployment: NodeId,
}

impl DeploymentConfig {
    /// Empty configuration built from `registry`.
    pub fn new(registry: SchemaRegistry) -> Result<Self, Error> {
        let mut tree = ConfigTree::new(Arc::new(registry));
        let root = tree.new_node_of_kind(CONFIG_ROOT)?;
        let deployment = tree
            .get(root, DEPLOYMENT)?
            .as_node()
            .ok_or_else(|| Error::ChildNotLinked {
                kind: CONFIG_ROOT.to_string(),
                property: DEPLOYMENT.to_string(),
            })?;
        Ok(Self {
            tree,
            root,
            deployment,
        })
    }

    /// Load generic nested data at the root.
    pub fn load_data(&mut self, data: &Value) -> Result<(), Error> {
        self.tree.load_data(self.root, data)
    }

    /// Load a TOML or JSON document at the root.
    pub fn load_file(&mut self, path: &Path) -> Result<LoadedDocument, DocumentError> {
        load_into(&mut self.tree, self.root, path)
    }

    /// Environment nodes in the order they were found.
    pub fn environments(&self) -> Result<Vec<(String, NodeId)>, Error> {
        let mut found = Vec::new();
        for &child in self.tree.children(self.deployment)? {
            if self.tree.kind(child)? != DEPLOYMENT_ENVIRONMENT {
                continue;
            }
            let name = self
                .tree
                .get(child, "name")?
                .as_str()
                .unwrap_or_default()
                .to_string();
            found.push((name, child));
        }
        Ok(found)
    }

    /// Resolved settings for the deployment and every environment.
    pub fn report(&self) -> Result<DeploymentReport, Error> {
        let environments = self
            .environments()?
            .into_iter()
            .map(|(name, node)| {
                Ok(EnvironmentReport {
                    name,
                    listen_port: data(self.tree.get(node, "listen_port")?),
                    db_host: data(self.tree.get(node, "db_host")?),
                    environment: data(self.tree.get(node, "environment")?),
                })
            })
            .collect::<Result<Vec<_>, Error>>()?;

        Ok(DeploymentReport {
            repo: data(self.tree.get(self.deployment, "repo")?),
            listen_port: data(self.tree.get(self.deployment, "listen_port")?),
            environment: data(self.tree.get(self.deployment, "environment")?),
            environments,
        })
    }
}

fn data(value: PropertyValue) -> Value {
    value.into_data().unwrap_or(Value::Null)
}

/// Resolved deployment defaults plus per-environment settings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeploymentReport {
    pub repo: Value,
    pub listen_port: Value,
    pub environment: Value,
    pub environments: Vec<EnvironmentReport>,
}

/// Resolved settings of one environment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnvironmentReport {
    pub name: String,
    pub listen_port: Value,
    pub db_host: Value,
    pub environment: Value,
}

impl DeploymentReport {
    /// Serialize to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Plain-text rendering for terminals.
    pub fn to_human(&self) -> String {
        let names: Vec<&str> = self.environments.iter().map(|e| e.name.as_str()).collect();

        let mut out = String::new();
        let _ = writeln!(out, "Deployment Defaults:");
        let _ = writeln!(out, "         repo: {}", to_text(&self.repo));
        let _ = writeln!(out, "  listen_port: {}", to_text(&self.listen_port));
        let _ = writeln!(out, "  environment: {}", to_text(&self.environment));
        let _ = writeln!(out);
        let _ = writeln!(out, "Found the following environments: {}", names.join(", "));

        for env in &self.environments {
            let _ = writeln!(out);
            let _ = writeln!(out, "Settings for {} environment:", env.name);
            let _ = writeln!(out);
            let _ = writeln!(out, "  listen_port: {}", to_text(&env.listen_port));
            let _ = writeln!(out, "      db_host: {}", to_text(&env.db_host));
            let _ = writeln!(out, "  environment: {}", to_text(&env.environment));
        }
        out
    }
}
