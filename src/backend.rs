//! Backend topology assembly.
//!
//! Builds the complete resource graph for the identity-aware backend from a
//! [`BackendConfig`] and a [`StackEnv`]: storage table, trigger function
//! with its write grant, identity directory with the post-confirmation hook
//! wired in two phases, the scoped invocation grant carrying the
//! directory-id environment propagation, the client registration, the query
//! API, and the output exports.
//!
//! Declaration order is the dependency order. Each step only references
//! attributes of resources already declared, so the frozen plan never
//! contains a forward reference and the engine may parallelize the
//! independent branches (the table and the directory's base configuration
//! share no attributes).

use tracing::info;

use crate::attr::{LogicalId, ValueRef};
use crate::config::{BackendConfig, StackEnv};
use crate::error::StackError;
use crate::graph::{
    ApiHandle, ClientHandle, DirectoryHandle, FunctionHandle, ResourceGraph, TableHandle,
};
use crate::resources::api::{
    ApiAuthorization, ApiSpec, DataSourceKind, RequestTransform, Resolver, ResponseTransform,
    SchemaSource,
};
use crate::resources::client::ClientSpec;
use crate::resources::directory::{
    AutoVerify, DirectorySpec, LifecycleEvent, StandardAttribute,
};
use crate::resources::function::{
    CodeAsset, FunctionSpec, ENV_CONNECTION_REUSE, ENV_DIRECTORY_ID, ENV_STAGE,
};
use crate::resources::iam::{
    InvokePermissionSpec, ServicePrincipal, ACTION_PUT_ITEM,
};
use crate::resources::output::OutputSpec;
use crate::resources::table::{KeyDefinition, TableSpec};
use crate::synth::{synthesize, ProvisioningPlan, SynthesisError};

/// Tag applied to every taggable resource in the topology.
const TAG_ENVIRONMENT: &str = "Environment";

/// Name of the inert data source.
const DATA_SOURCE_NONE: &str = "none";
/// Name of the table-backed data source.
const DATA_SOURCE_USERS: &str = "users";

/// Export keys surfaced to external consumers.
pub const EXPORT_DIRECTORY_ID: &str = "directoryId";
pub const EXPORT_CLIENT_ID: &str = "clientId";
pub const EXPORT_REGION: &str = "region";

/// The assembled topology: the graph plus the handles needed to inspect or
/// extend it before synthesis.
#[derive(Debug)]
pub struct BackendTopology {
    graph: ResourceGraph,
    table: TableHandle,
    function: FunctionHandle,
    directory: DirectoryHandle,
    client: ClientHandle,
    api: ApiHandle,
    invoke_grant: LogicalId,
}

impl BackendTopology {
    /// Declare the full topology.
    pub fn declare(config: &BackendConfig, env: &StackEnv) -> Result<Self, StackError> {
        let mut graph = ResourceGraph::new();

        // 1. Storage table. No dependencies.
        let mut table_spec = TableSpec::new(
            LogicalId::new(config.table.name.clone())?,
            config.table.name.clone(),
            KeyDefinition::new(
                config.table.partition_key.name.clone(),
                config.table.partition_key.attr_type,
            ),
        )
        .with_tag(TAG_ENVIRONMENT, env.stage.clone());
        if let Some(sort_key) = &config.table.sort_key {
            table_spec =
                table_spec.with_sort_key(KeyDefinition::new(sort_key.name.clone(), sort_key.attr_type));
        }
        let table = graph.declare_table(table_spec)?;

        // 2. Trigger function. The stage and connection-reuse entries are
        //    known now; the directory id arrives later via the grant step.
        let function = graph.declare_function(
            FunctionSpec::new(
                LogicalId::new(config.function.name.clone())?,
                format!("{}-{}", env.stage, config.function.name),
                config.function.runtime,
                config.function.handler.clone(),
                CodeAsset::from_path(config.function.code_path.clone()),
            )
            .with_memory_mb(config.function.memory_mb)
            .with_timeout_secs(config.function.timeout_secs)
            .with_environment(ENV_STAGE, ValueRef::literal(env.stage.clone()))
            .with_environment(ENV_CONNECTION_REUSE, ValueRef::literal("1"))
            .with_tag(TAG_ENVIRONMENT, env.stage.clone()),
        )?;
        graph.grant_resource_access(
            &function,
            vec![ACTION_PUT_ITEM.to_string()],
            table.arn(),
        )?;
        graph.grant_invocation_to(&function, ServicePrincipal::identity_directory())?;

        // 3. Identity directory, with the logical handler binding declared
        //    up front and the function's invocation identity patched into
        //    the low-level hook field as an explicit second phase.
        let mut directory_spec = DirectorySpec::new(
            LogicalId::new(config.directory.name.clone())?,
            config.directory.name.clone(),
            config.directory.trigger_failure_policy,
        )
        .with_auto_verify(AutoVerify {
            email: true,
            phone: false,
        })
        .with_password_policy(config.directory.password_policy.clone())
        .with_standard_attribute(
            "email",
            StandardAttribute {
                required: true,
                mutable: true,
            },
        )
        .with_event_handler(LifecycleEvent::PostConfirmation, function.logical_id().clone())
        .with_tag(TAG_ENVIRONMENT, env.stage.clone());
        for (name, attribute) in &config.directory.custom_attributes {
            directory_spec = directory_spec.with_custom_attribute(name.clone(), *attribute);
        }
        for schema_override in &config.directory.schema_overrides {
            directory_spec = directory_spec.with_schema_override(schema_override.clone());
        }
        let directory = graph.declare_directory(directory_spec)?;
        graph.patch_event_handler_identity(
            &directory,
            LifecycleEvent::PostConfirmation,
            function.function_arn(),
        )?;

        // 4. Scoped invocation grant. Binding the handler grants nothing by
        //    itself; this statement authorizes the directory service to
        //    invoke the function, restricted to this directory instance,
        //    and carries the directory id into the function's environment.
        let invoke_grant = graph.declare_invoke_permission(
            InvokePermissionSpec::new(
                LogicalId::new(format!("{}-invoke-{}", config.directory.name, config.function.name))?,
                function.logical_id().clone(),
                function.function_arn(),
                ServicePrincipal::identity_directory(),
                directory.directory_arn(),
            )
            .with_environment_addition(ENV_DIRECTORY_ID, ValueRef::attr(directory.directory_id())),
        )?;

        // 5. Client registration, owned by the directory.
        let mut client_spec = ClientSpec::new(
            LogicalId::new(format!("{}-client", config.client.name))?,
            config.client.name.clone(),
            directory.directory_id(),
        )
        .with_auth_flows(config.client.auth_flows.iter().copied());
        if config.client.prevent_existence_leakage {
            client_spec = client_spec.prevent_existence_leakage();
        }
        let client = graph.declare_client(client_spec)?;

        // 6. API layer: directory-backed authorization, an inert source, a
        //    table-backed source, and the configured resolvers.
        let mut api_spec = ApiSpec::new(
            LogicalId::new(config.api.name.clone())?,
            config.api.name.clone(),
            SchemaSource::from_path(config.api.schema_path.clone()),
            ApiAuthorization {
                directory: directory.directory_id(),
                default_action: config.api.default_action,
            },
        )
        .with_log_level(config.api.log_level)
        .with_xray(config.api.xray_enabled)
        .with_data_source(DATA_SOURCE_NONE, DataSourceKind::None)
        .with_data_source(
            DATA_SOURCE_USERS,
            DataSourceKind::Table {
                table: table.table_name(),
            },
        )
        .with_tag(TAG_ENVIRONMENT, env.stage.clone());
        for resolver in &config.api.resolvers {
            api_spec = api_spec.with_resolver(Resolver {
                type_name: resolver.type_name.clone(),
                field_name: resolver.field_name.clone(),
                data_source: DATA_SOURCE_USERS.to_string(),
                request: RequestTransform::KeyLookup {
                    key: resolver.key.clone(),
                    value_from: resolver.value_from.clone(),
                },
                response: ResponseTransform::ResultItem,
            });
        }
        let api = graph.declare_api(api_spec)?;

        // 7. Output exports: pure projection of already-declared values.
        graph.declare_output(OutputSpec::new(
            LogicalId::new("directory-id-export")?,
            EXPORT_DIRECTORY_ID,
            ValueRef::attr(directory.directory_id()),
        ))?;
        graph.declare_output(OutputSpec::new(
            LogicalId::new("client-id-export")?,
            EXPORT_CLIENT_ID,
            ValueRef::attr(client.client_id()),
        ))?;
        graph.declare_output(OutputSpec::new(
            LogicalId::new("region-export")?,
            EXPORT_REGION,
            ValueRef::literal(env.region.clone()),
        ))?;

        info!(
            stage = %env.stage,
            region = %env.region,
            resources = graph.len(),
            "backend topology declared"
        );

        Ok(Self {
            graph,
            table,
            function,
            directory,
            client,
            api,
            invoke_grant,
        })
    }

    pub fn graph(&self) -> &ResourceGraph {
        &self.graph
    }

    /// Mutable access for callers extending the topology before synthesis.
    pub fn graph_mut(&mut self) -> &mut ResourceGraph {
        &mut self.graph
    }

    pub fn table(&self) -> &TableHandle {
        &self.table
    }

    pub fn function(&self) -> &FunctionHandle {
        &self.function
    }

    pub fn directory(&self) -> &DirectoryHandle {
        &self.directory
    }

    pub fn client(&self) -> &ClientHandle {
        &self.client
    }

    pub fn api(&self) -> &ApiHandle {
        &self.api
    }

    pub fn invoke_grant(&self) -> &LogicalId {
        &self.invoke_grant
    }

    /// Validate, order and freeze the plan.
    pub fn synthesize(&self) -> Result<ProvisioningPlan, SynthesisError> {
        synthesize(&self.graph)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Descriptor;

    fn topology() -> BackendTopology {
        BackendTopology::declare(&BackendConfig::default(), &StackEnv::new("dev", "eu-west-1"))
            .expect("default topology declares")
    }

    #[test]
    fn default_topology_synthesizes() {
        let plan = topology().synthesize().expect("plan freezes");
        // Six resources plus three outputs.
        assert_eq!(plan.resources().count(), 6);
        assert_eq!(plan.outputs().len(), 3);
    }

    #[test]
    fn stage_tag_is_applied() {
        let topology = topology();
        match topology.graph().get(topology.table.logical_id()).unwrap() {
            Descriptor::Table(spec) => {
                assert_eq!(spec.tags.get(TAG_ENVIRONMENT).map(String::as_str), Some("dev"));
            }
            other => panic!("expected table, got {}", other.describe()),
        }
    }

    #[test]
    fn function_environment_contract_is_complete() {
        let topology = topology();
        let environment = topology
            .graph()
            .effective_environment(topology.function.logical_id());
        assert!(environment.contains_key(ENV_STAGE));
        assert!(environment.contains_key(ENV_CONNECTION_REUSE));
        assert!(environment.contains_key(ENV_DIRECTORY_ID));
    }

    #[test]
    fn directory_id_env_value_is_deferred() {
        let topology = topology();
        let environment = topology
            .graph()
            .effective_environment(topology.function.logical_id());
        let value = &environment[ENV_DIRECTORY_ID];
        assert_eq!(
            value.reference().map(|attr| &attr.producer),
            Some(topology.directory.logical_id())
        );
    }
}
