//! Trigger function descriptor.
//!
//! An execution unit with a fixed runtime, handler entry point and bundled
//! code location. The environment mapping stays open until synthesis:
//! values registered by downstream components (the directory id in
//! particular) arrive after the function itself is declared, so the mapping
//! is a growing map rather than a fixed struct fixed at construction time.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::attr::{LogicalId, ValueRef};
use crate::resources::iam::{PolicyStatement, ServicePrincipal};

/// Environment key carrying the deployment stage name.
pub const ENV_STAGE: &str = "STAGE";
/// Environment key carrying the connection-reuse hint.
pub const ENV_CONNECTION_REUSE: &str = "AWS_NODEJS_CONNECTION_REUSE_ENABLED";
/// Environment key carrying the owning directory's generated id.
pub const ENV_DIRECTORY_ID: &str = "COGNITO_USER_POOL_ID";

/// Execution runtimes the platform accepts for trigger functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Runtime {
    NodeJs12,
    NodeJs16,
    NodeJs18,
}

impl fmt::Display for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Runtime::NodeJs12 => "nodejs12.x",
            Runtime::NodeJs16 => "nodejs16.x",
            Runtime::NodeJs18 => "nodejs18.x",
        };
        write!(f, "{name}")
    }
}

/// Bundled code location, resolved relative to the deployment bundle root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeAsset {
    pub path: String,
}

impl CodeAsset {
    pub fn from_path(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

/// Declarative descriptor for the trigger function.
///
/// Produces the deferred `FunctionArn` attribute, which is also the
/// function's invocation identity for event-handler wiring.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionSpec {
    pub logical_id: LogicalId,
    pub function_name: String,
    pub runtime: Runtime,
    pub handler: String,
    pub code: CodeAsset,
    pub memory_mb: u32,
    pub timeout_secs: u32,
    /// Open until synthesis; may reference attributes of earlier producers.
    pub environment: BTreeMap<String, ValueRef>,
    /// Least-privilege statements on the execution role.
    pub role_statements: Vec<PolicyStatement>,
    /// Service principals with the broad (unscoped-source) invoke grant.
    /// Insufficient on its own for principals that must prove the call
    /// originates from a specific resource instance.
    pub invoke_principals: Vec<ServicePrincipal>,
    pub tags: BTreeMap<String, String>,
}

impl FunctionSpec {
    pub fn new(
        logical_id: LogicalId,
        function_name: impl Into<String>,
        runtime: Runtime,
        handler: impl Into<String>,
        code: CodeAsset,
    ) -> Self {
        Self {
            logical_id,
            function_name: function_name.into(),
            runtime,
            handler: handler.into(),
            code,
            memory_mb: 128,
            timeout_secs: 3,
            environment: BTreeMap::new(),
            role_statements: Vec::new(),
            invoke_principals: Vec::new(),
            tags: BTreeMap::new(),
        }
    }

    pub fn with_memory_mb(mut self, memory_mb: u32) -> Self {
        self.memory_mb = memory_mb;
        self
    }

    pub fn with_timeout_secs(mut self, timeout_secs: u32) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Register an environment value. Later writes win, matching the open
    /// mapping contract.
    pub fn add_environment(&mut self, key: impl Into<String>, value: ValueRef) {
        self.environment.insert(key.into(), value);
    }

    pub fn with_environment(mut self, key: impl Into<String>, value: ValueRef) -> Self {
        self.add_environment(key, value);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attr::LogicalId;

    fn confirm_signup() -> FunctionSpec {
        FunctionSpec::new(
            LogicalId::new("ConfirmSignup").unwrap(),
            "backend-dev-confirmSignup",
            Runtime::NodeJs12,
            "functions/confirm-user-signup.handler",
            CodeAsset::from_path("functions/"),
        )
    }

    #[test]
    fn environment_stays_open() {
        let mut spec = confirm_signup().with_environment(ENV_STAGE, ValueRef::literal("dev"));
        // A later registration for the same key wins.
        spec.add_environment(ENV_STAGE, ValueRef::literal("prod"));
        spec.add_environment(ENV_CONNECTION_REUSE, ValueRef::literal("1"));
        assert_eq!(spec.environment.len(), 2);
        assert_eq!(
            spec.environment.get(ENV_STAGE),
            Some(&ValueRef::literal("prod"))
        );
    }

    #[test]
    fn runtime_renders_platform_name() {
        assert_eq!(Runtime::NodeJs12.to_string(), "nodejs12.x");
    }
}
