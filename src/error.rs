//! Error types for the provisioning topology core.
//!
//! Every failure is surfaced at declaration or synthesis time; nothing is
//! swallowed and nothing is deferred to provisioning that the core can catch
//! earlier. `thiserror` derives all Display impls. Validation variants name
//! the offending resource and field so the operator can fix the declaration
//! without reading the graph dump.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::attr::{Attr, LogicalId};
use crate::resources::directory::LifecycleEvent;

/// Umbrella error for the crate's public entry points.
#[derive(Error, Debug)]
pub enum StackError {
    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Synthesis error: {0}")]
    Synthesis(#[from] crate::synth::SynthesisError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

// ---------------------------------------------------------------------------
// GraphError - structural defects caught while assembling the graph
// ---------------------------------------------------------------------------

/// Defects in graph assembly itself, reported by `declare_*` and the handle
/// mutation operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("invalid logical id '{id}': expected a letter followed by letters, digits or dashes")]
    InvalidLogicalId { id: String },

    #[error("logical id '{id}' is already declared")]
    DuplicateLogicalId { id: LogicalId },

    #[error("resource '{id}' is not declared in this graph")]
    UnknownHandle { id: LogicalId },

    #[error("resource '{id}' is not a {expected}")]
    HandleKindMismatch { id: LogicalId, expected: &'static str },

    #[error("directory '{directory}' has no {event} handler binding to patch")]
    UnboundLifecycleEvent {
        directory: LogicalId,
        event: LifecycleEvent,
    },
}

// ---------------------------------------------------------------------------
// ValidationError - declaration-time rule violations
// ---------------------------------------------------------------------------

/// Declaration-time rule violations found by the validation pass.
///
/// Each variant carries the resource (and field, where meaningful) that
/// caused the rejection. The pass fails fast: the first violation in
/// declaration order is returned.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationError {
    #[error("table '{table}': key '{key}' is declared as both partition and sort key")]
    DuplicateKeyName { table: LogicalId, key: String },

    #[error(
        "directory '{directory}': auto-verified channel '{channel}' requires the \
         '{channel}' standard attribute to be marked required"
    )]
    AutoVerifyRequiresRequired {
        directory: LogicalId,
        channel: String,
    },

    #[error(
        "directory '{directory}': {event} handler '{function}' has no invoke permission \
         scoped to this directory's ARN; binding the handler alone grants no invocation rights"
    )]
    UnauthorizedEventHandler {
        directory: LogicalId,
        event: LifecycleEvent,
        function: LogicalId,
    },

    #[error(
        "directory '{directory}': {event} handler binding still carries only the logical \
         name; the function's invocation identity was never patched in"
    )]
    HandlerIdentityUnresolved {
        directory: LogicalId,
        event: LifecycleEvent,
    },

    #[error("resource '{consumer}' references attribute {attr} of undeclared resource")]
    UnknownProducer { consumer: LogicalId, attr: Attr },

    #[error(
        "resource '{consumer}' consumes deferred attribute {attr} but is declared before \
         its producer '{producer}'"
    )]
    ForwardReference {
        consumer: LogicalId,
        producer: LogicalId,
        attr: Attr,
    },

    #[error("grant on '{resource}': scope {attr} is not an ARN attribute of a single resource")]
    GrantScopeNotArn { resource: LogicalId, attr: Attr },

    #[error("resource '{consumer}' references {attr}, which a {producer_type} does not produce")]
    AttrNotProducedBy {
        consumer: LogicalId,
        attr: Attr,
        producer_type: String,
    },

    #[error(
        "directory '{directory}': {event} handler identity does not resolve to the bound \
         function '{function}'"
    )]
    HandlerIdentityMismatch {
        directory: LogicalId,
        event: LifecycleEvent,
        function: LogicalId,
    },

    #[error("grant on '{resource}': empty action set")]
    EmptyActionSet { resource: LogicalId },

    #[error("function '{function}': required environment key '{key}' is missing")]
    MissingEnvironmentKey { function: LogicalId, key: String },

    #[error(
        "function '{function}': environment key '{key}' is set both on the function and \
         by a grant-step addition"
    )]
    DuplicateEnvironmentKey { function: LogicalId, key: String },

    #[error("client '{client}': owner reference {attr} is not a directory id attribute")]
    ClientOwnerNotDirectory { client: LogicalId, attr: Attr },

    #[error("api '{api}': data source '{name}' is declared twice")]
    DuplicateDataSource { api: LogicalId, name: String },

    #[error("api '{api}': resolver {type_name}.{field_name} is bound to unknown data source '{data_source}'")]
    UnknownDataSource {
        api: LogicalId,
        type_name: String,
        field_name: String,
        data_source: String,
    },

    #[error("api '{api}': resolver {type_name}.{field_name} is declared twice")]
    DuplicateResolver {
        api: LogicalId,
        type_name: String,
        field_name: String,
    },

    #[error("output '{output}': export key '{key}' is declared twice")]
    DuplicateOutputKey { output: LogicalId, key: String },
}

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

/// Failures while loading the stack context or a topology config document.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("required environment variable '{var}' is not set")]
    MissingVar { var: String },

    #[error("cannot read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed config document: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attr::AttrKind;

    #[test]
    fn validation_errors_name_resource_and_field() {
        let table = LogicalId::new("Users").unwrap();
        let err = ValidationError::DuplicateKeyName {
            table,
            key: "id".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("Users"));
        assert!(msg.contains("id"));
    }

    #[test]
    fn forward_reference_message_names_both_ends() {
        let consumer = LogicalId::new("ConfirmSignup").unwrap();
        let producer = LogicalId::new("Directory").unwrap();
        let attr = Attr::new(producer.clone(), AttrKind::DirectoryId);
        let err = ValidationError::ForwardReference {
            consumer,
            producer,
            attr,
        };
        let msg = err.to_string();
        assert!(msg.contains("ConfirmSignup"));
        assert!(msg.contains("Directory"));
        assert!(msg.contains("${Directory#DirectoryId}"));
    }

    #[test]
    fn validation_error_serde_round_trip() {
        let err = ValidationError::MissingEnvironmentKey {
            function: LogicalId::new("ConfirmSignup").unwrap(),
            key: "STAGE".into(),
        };
        let json = serde_json::to_string(&err).expect("serialize");
        let back: ValidationError = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(err, back);
    }
}
