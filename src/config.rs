//! Stack context and topology configuration.
//!
//! `StackEnv` carries the deployment context (account, stage, region) and
//! loads from dotenv-style environment variables. `BackendConfig` carries
//! every tunable the topology builder accepts and deserializes from YAML,
//! so a deployment can swap table names, password policy or resolver
//! bindings without touching the builder. Every field has a default
//! mirroring the reference deployment.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

use crate::error::ConfigError;
use crate::resources::api::{DefaultAction, FieldLogLevel};
use crate::resources::client::AuthFlow;
use crate::resources::directory::{
    AttributeDataType, CustomAttribute, PasswordPolicy, SchemaOverride, TriggerFailurePolicy,
};
use crate::resources::function::Runtime;
use crate::resources::table::KeyAttributeType;

// ---------------------------------------------------------------------------
// StackEnv
// ---------------------------------------------------------------------------

/// Deployment context for one provisioning pass.
#[derive(Debug, Clone, Deserialize)]
pub struct StackEnv {
    pub account: Option<String>,
    pub stage: String,
    pub region: String,
}

impl StackEnv {
    /// Load from the process environment, reading a `.env` file first if one
    /// is present. `STAGE` and `REGION` are required; `ACCOUNT` is optional.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Ok(Self {
            account: std::env::var("ACCOUNT").ok(),
            stage: require_var("STAGE")?,
            region: require_var("REGION")?,
        })
    }

    pub fn new(stage: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            account: None,
            stage: stage.into(),
            region: region.into(),
        }
    }
}

fn require_var(var: &str) -> Result<String, ConfigError> {
    std::env::var(var).map_err(|_| ConfigError::MissingVar {
        var: var.to_string(),
    })
}

// ---------------------------------------------------------------------------
// BackendConfig
// ---------------------------------------------------------------------------

/// All tunables of the backend topology.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub table: TableConfig,
    pub function: FunctionConfig,
    pub directory: DirectoryConfig,
    pub client: ClientConfig,
    pub api: ApiConfig,
}

impl BackendConfig {
    pub fn from_yaml_str(source: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(source)?)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&source)
    }

    /// Convenience loader for binaries: same as [`Self::from_yaml_file`]
    /// with the failing path named in the error chain.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        Self::from_yaml_file(path)
            .with_context(|| format!("loading backend config from {}", path.display()))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct KeyConfig {
    pub name: String,
    pub attr_type: KeyAttributeType,
}

impl Default for KeyConfig {
    fn default() -> Self {
        Self {
            name: "id".to_string(),
            attr_type: KeyAttributeType::String,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TableConfig {
    pub name: String,
    pub partition_key: KeyConfig,
    pub sort_key: Option<KeyConfig>,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            name: "Users".to_string(),
            partition_key: KeyConfig::default(),
            sort_key: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FunctionConfig {
    pub name: String,
    pub runtime: Runtime,
    pub handler: String,
    pub code_path: String,
    pub memory_mb: u32,
    pub timeout_secs: u32,
}

impl Default for FunctionConfig {
    fn default() -> Self {
        Self {
            name: "confirmSignup".to_string(),
            runtime: Runtime::NodeJs12,
            handler: "functions/confirm-user-signup.handler".to_string(),
            code_path: "functions/".to_string(),
            memory_mb: 1024,
            timeout_secs: 360,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DirectoryConfig {
    pub name: String,
    pub password_policy: PasswordPolicy,
    pub custom_attributes: BTreeMap<String, CustomAttribute>,
    pub schema_overrides: Vec<SchemaOverride>,
    /// Explicit lifecycle policy for a failing hook; never left to the
    /// platform default.
    pub trigger_failure_policy: TriggerFailurePolicy,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        let mut custom_attributes = BTreeMap::new();
        custom_attributes.insert(
            "name".to_string(),
            CustomAttribute {
                data_type: AttributeDataType::String,
                required: false,
                mutable: true,
            },
        );
        Self {
            name: "userpool".to_string(),
            password_policy: PasswordPolicy::default(),
            custom_attributes,
            // The reference deployment widens the custom attribute after the
            // high-level declaration; kept as the default override.
            schema_overrides: vec![SchemaOverride::for_attribute("name")
                .data_type(AttributeDataType::String)
                .required(false)
                .mutable(true)],
            trigger_failure_policy: TriggerFailurePolicy::FailOpen,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub name: String,
    pub auth_flows: BTreeSet<AuthFlow>,
    pub prevent_existence_leakage: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            name: "web".to_string(),
            auth_flows: BTreeSet::from([
                AuthFlow::UserSrp,
                AuthFlow::UserPassword,
                AuthFlow::RefreshToken,
            ]),
            prevent_existence_leakage: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    pub type_name: String,
    pub field_name: String,
    /// Partition key attribute the lookup targets.
    pub key: String,
    /// Caller-identity field supplying the key value.
    pub value_from: String,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            type_name: "Query".to_string(),
            field_name: "getMyProfile".to_string(),
            key: "id".to_string(),
            value_from: "username".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub name: String,
    pub schema_path: String,
    pub log_level: FieldLogLevel,
    pub default_action: DefaultAction,
    pub xray_enabled: bool,
    pub resolvers: Vec<ResolverConfig>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            name: "backend-api".to_string(),
            schema_path: "schema.api.graphql".to_string(),
            log_level: FieldLogLevel::All,
            default_action: DefaultAction::Allow,
            xray_enabled: false,
            resolvers: vec![ResolverConfig::default()],
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
