//! Resource graph assembly and topological ordering.
//!
//! The graph is an ordered list of resource descriptors. Declaring a
//! resource appends its descriptor and returns a typed handle carrying the
//! declaration index; deferred-attribute references are only constructible
//! through those handles, so the assembly order is also the reference
//! order. Dependency edges are derived from the [`Attr`] references inside
//! each descriptor, and ordering runs Kahn's algorithm with a stable
//! tie-break on declaration index so independent resources keep their
//! source order across re-synthesis.
//!
//! The graph holds no shared mutable state and performs no I/O; it is the
//! in-memory artifact handed to the synthesis pipeline.

use std::collections::{BinaryHeap, HashMap};

use serde::{Deserialize, Serialize};

use crate::attr::{Attr, AttrKind, LogicalId, ValueRef};
use crate::error::GraphError;
use crate::resources::api::ApiSpec;
use crate::resources::client::ClientSpec;
use crate::resources::directory::{DirectorySpec, LifecycleEvent};
use crate::resources::function::FunctionSpec;
use crate::resources::iam::{InvokePermissionSpec, PolicyStatement, ServicePrincipal};
use crate::resources::output::OutputSpec;
use crate::resources::table::TableSpec;

// ---------------------------------------------------------------------------
// Descriptor
// ---------------------------------------------------------------------------

/// One declared resource, in the declarative form handed to the
/// provisioning engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Descriptor {
    Table(TableSpec),
    Function(FunctionSpec),
    Directory(DirectorySpec),
    InvokePermission(InvokePermissionSpec),
    Client(ClientSpec),
    Api(ApiSpec),
    Output(OutputSpec),
}

impl Descriptor {
    pub fn logical_id(&self) -> &LogicalId {
        match self {
            Descriptor::Table(spec) => &spec.logical_id,
            Descriptor::Function(spec) => &spec.logical_id,
            Descriptor::Directory(spec) => &spec.logical_id,
            Descriptor::InvokePermission(spec) => &spec.logical_id,
            Descriptor::Client(spec) => &spec.logical_id,
            Descriptor::Api(spec) => &spec.logical_id,
            Descriptor::Output(spec) => &spec.logical_id,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Descriptor::Table(_) => "table",
            Descriptor::Function(_) => "function",
            Descriptor::Directory(_) => "directory",
            Descriptor::InvokePermission(_) => "invoke-permission",
            Descriptor::Client(_) => "client",
            Descriptor::Api(_) => "api",
            Descriptor::Output(_) => "output",
        }
    }

    /// Every deferred-attribute reference this descriptor consumes.
    /// Dependency edges and the forward-reference check both read this.
    pub fn references(&self) -> Vec<Attr> {
        let mut refs = Vec::new();
        match self {
            Descriptor::Table(_) => {}
            Descriptor::Function(spec) => {
                for value in spec.environment.values() {
                    if let Some(attr) = value.reference() {
                        refs.push(attr.clone());
                    }
                }
                for statement in &spec.role_statements {
                    refs.push(statement.resource.clone());
                }
            }
            Descriptor::Directory(spec) => {
                for binding in spec.event_handlers.values() {
                    if let Some(identity) = &binding.resolved_identity {
                        refs.push(identity.clone());
                    }
                }
            }
            Descriptor::InvokePermission(spec) => {
                refs.push(spec.function_arn.clone());
                refs.push(spec.source_arn.clone());
                for value in spec.environment_additions.values() {
                    if let Some(attr) = value.reference() {
                        refs.push(attr.clone());
                    }
                }
            }
            Descriptor::Client(spec) => {
                refs.push(spec.directory.clone());
            }
            Descriptor::Api(spec) => {
                refs.push(spec.authorization.directory.clone());
                for source in &spec.data_sources {
                    if let crate::resources::api::DataSourceKind::Table { table } = &source.kind {
                        refs.push(table.clone());
                    }
                }
            }
            Descriptor::Output(spec) => {
                if let Some(attr) = spec.value.reference() {
                    refs.push(attr.clone());
                }
            }
        }
        refs
    }

    /// Whether this resource produces the given deferred attribute once
    /// materialized.
    pub fn produces(&self, kind: AttrKind) -> bool {
        matches!(
            (self, kind),
            (Descriptor::Table(_), AttrKind::Arn | AttrKind::TableName)
                | (Descriptor::Function(_), AttrKind::FunctionArn)
                | (
                    Descriptor::Directory(_),
                    AttrKind::DirectoryId | AttrKind::DirectoryArn
                )
                | (Descriptor::Client(_), AttrKind::ClientId)
                | (Descriptor::Api(_), AttrKind::ApiId)
        )
    }

    /// Short human-readable form for plan listings and error messages.
    pub fn describe(&self) -> String {
        format!("{} '{}'", self.type_name(), self.logical_id())
    }
}

// ---------------------------------------------------------------------------
// Typed handles
// ---------------------------------------------------------------------------

macro_rules! handle {
    ($name:ident) => {
        /// Returned by the matching `declare_*` call; the only way to mint
        /// deferred-attribute references to this resource.
        #[derive(Debug, Clone)]
        pub struct $name {
            logical_id: LogicalId,
            index: usize,
        }

        impl $name {
            pub fn logical_id(&self) -> &LogicalId {
                &self.logical_id
            }

            pub fn index(&self) -> usize {
                self.index
            }
        }
    };
}

handle!(TableHandle);
handle!(FunctionHandle);
handle!(DirectoryHandle);
handle!(ClientHandle);
handle!(ApiHandle);

impl TableHandle {
    pub fn arn(&self) -> Attr {
        Attr::new(self.logical_id.clone(), AttrKind::Arn)
    }

    pub fn table_name(&self) -> Attr {
        Attr::new(self.logical_id.clone(), AttrKind::TableName)
    }
}

impl FunctionHandle {
    pub fn function_arn(&self) -> Attr {
        Attr::new(self.logical_id.clone(), AttrKind::FunctionArn)
    }
}

impl DirectoryHandle {
    pub fn directory_id(&self) -> Attr {
        Attr::new(self.logical_id.clone(), AttrKind::DirectoryId)
    }

    pub fn directory_arn(&self) -> Attr {
        Attr::new(self.logical_id.clone(), AttrKind::DirectoryArn)
    }
}

impl ClientHandle {
    pub fn client_id(&self) -> Attr {
        Attr::new(self.logical_id.clone(), AttrKind::ClientId)
    }
}

impl ApiHandle {
    pub fn api_id(&self) -> Attr {
        Attr::new(self.logical_id.clone(), AttrKind::ApiId)
    }
}

// ---------------------------------------------------------------------------
// CycleError
// ---------------------------------------------------------------------------

/// A cycle in the derived dependency graph. Structurally impossible through
/// the handle API alone, but a deserialized or hand-assembled graph can
/// carry one, and the engine must never receive it.
#[derive(Debug, Clone)]
pub struct CycleError {
    /// Resources involved in the cycle.
    pub members: Vec<LogicalId>,
    pub explanation: String,
}

impl std::fmt::Display for CycleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.explanation)
    }
}

impl std::error::Error for CycleError {}

// ---------------------------------------------------------------------------
// ResourceGraph
// ---------------------------------------------------------------------------

/// The in-memory graph being assembled.
#[derive(Debug, Default, Clone)]
pub struct ResourceGraph {
    declarations: Vec<Descriptor>,
    index: HashMap<LogicalId, usize>,
}

impl ResourceGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn descriptors(&self) -> &[Descriptor] {
        &self.declarations
    }

    pub fn len(&self) -> usize {
        self.declarations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.declarations.is_empty()
    }

    /// Declaration index of a resource, if declared.
    pub fn index_of(&self, id: &LogicalId) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn get(&self, id: &LogicalId) -> Option<&Descriptor> {
        self.index_of(id).map(|idx| &self.declarations[idx])
    }

    fn push(&mut self, descriptor: Descriptor) -> Result<usize, GraphError> {
        let id = descriptor.logical_id().clone();
        if self.index.contains_key(&id) {
            return Err(GraphError::DuplicateLogicalId { id });
        }
        let idx = self.declarations.len();
        self.index.insert(id, idx);
        self.declarations.push(descriptor);
        Ok(idx)
    }

    // -- declarations --

    pub fn declare_table(&mut self, spec: TableSpec) -> Result<TableHandle, GraphError> {
        let logical_id = spec.logical_id.clone();
        let index = self.push(Descriptor::Table(spec))?;
        Ok(TableHandle { logical_id, index })
    }

    pub fn declare_function(&mut self, spec: FunctionSpec) -> Result<FunctionHandle, GraphError> {
        let logical_id = spec.logical_id.clone();
        let index = self.push(Descriptor::Function(spec))?;
        Ok(FunctionHandle { logical_id, index })
    }

    pub fn declare_directory(
        &mut self,
        spec: DirectorySpec,
    ) -> Result<DirectoryHandle, GraphError> {
        let logical_id = spec.logical_id.clone();
        let index = self.push(Descriptor::Directory(spec))?;
        Ok(DirectoryHandle { logical_id, index })
    }

    pub fn declare_invoke_permission(
        &mut self,
        spec: InvokePermissionSpec,
    ) -> Result<LogicalId, GraphError> {
        let logical_id = spec.logical_id.clone();
        self.push(Descriptor::InvokePermission(spec))?;
        Ok(logical_id)
    }

    pub fn declare_client(&mut self, spec: ClientSpec) -> Result<ClientHandle, GraphError> {
        let logical_id = spec.logical_id.clone();
        let index = self.push(Descriptor::Client(spec))?;
        Ok(ClientHandle { logical_id, index })
    }

    pub fn declare_api(&mut self, spec: ApiSpec) -> Result<ApiHandle, GraphError> {
        let logical_id = spec.logical_id.clone();
        let index = self.push(Descriptor::Api(spec))?;
        Ok(ApiHandle { logical_id, index })
    }

    pub fn declare_output(&mut self, spec: OutputSpec) -> Result<LogicalId, GraphError> {
        let logical_id = spec.logical_id.clone();
        self.push(Descriptor::Output(spec))?;
        Ok(logical_id)
    }

    // -- post-declaration mutation (open until synthesis) --

    fn function_mut(&mut self, handle: &FunctionHandle) -> Result<&mut FunctionSpec, GraphError> {
        match self.declarations.get_mut(handle.index) {
            Some(Descriptor::Function(spec)) if spec.logical_id == handle.logical_id => Ok(spec),
            Some(_) => Err(GraphError::HandleKindMismatch {
                id: handle.logical_id.clone(),
                expected: "function",
            }),
            None => Err(GraphError::UnknownHandle {
                id: handle.logical_id.clone(),
            }),
        }
    }

    fn directory_mut(
        &mut self,
        handle: &DirectoryHandle,
    ) -> Result<&mut DirectorySpec, GraphError> {
        match self.declarations.get_mut(handle.index) {
            Some(Descriptor::Directory(spec)) if spec.logical_id == handle.logical_id => Ok(spec),
            Some(_) => Err(GraphError::HandleKindMismatch {
                id: handle.logical_id.clone(),
                expected: "directory",
            }),
            None => Err(GraphError::UnknownHandle {
                id: handle.logical_id.clone(),
            }),
        }
    }

    /// Register an environment value on a declared function.
    pub fn add_environment(
        &mut self,
        function: &FunctionHandle,
        key: impl Into<String>,
        value: ValueRef,
    ) -> Result<(), GraphError> {
        self.function_mut(function)?.add_environment(key, value);
        Ok(())
    }

    /// Attach a least-privilege statement to the function's execution role,
    /// scoped to exactly one resource ARN attribute.
    pub fn grant_resource_access(
        &mut self,
        function: &FunctionHandle,
        actions: Vec<String>,
        resource: Attr,
    ) -> Result<(), GraphError> {
        self.function_mut(function)?
            .role_statements
            .push(PolicyStatement::allow(actions, resource));
        Ok(())
    }

    /// Record the broad invoke grant for a service principal. The scoped
    /// grant (an [`InvokePermissionSpec`] descriptor) is still required for
    /// event-handler wiring; the validator enforces that.
    pub fn grant_invocation_to(
        &mut self,
        function: &FunctionHandle,
        principal: ServicePrincipal,
    ) -> Result<(), GraphError> {
        self.function_mut(function)?.invoke_principals.push(principal);
        Ok(())
    }

    /// Second phase of event-handler wiring: resolve the handler's
    /// invocation identity into the directory's low-level hook field.
    pub fn patch_event_handler_identity(
        &mut self,
        directory: &DirectoryHandle,
        event: LifecycleEvent,
        identity: Attr,
    ) -> Result<(), GraphError> {
        let directory_id = directory.logical_id.clone();
        let spec = self.directory_mut(directory)?;
        match spec.event_handlers.get_mut(&event) {
            Some(binding) => {
                binding.resolved_identity = Some(identity);
                Ok(())
            }
            None => Err(GraphError::UnboundLifecycleEvent {
                directory: directory_id,
                event,
            }),
        }
    }

    // -- derived views --

    /// Effective environment of a function: its own mapping plus every
    /// grant-step addition targeting it. Grant additions land after the
    /// function's own entries, matching the order they are applied during
    /// provisioning.
    pub fn effective_environment(
        &self,
        function: &LogicalId,
    ) -> std::collections::BTreeMap<String, ValueRef> {
        let mut environment = std::collections::BTreeMap::new();
        if let Some(Descriptor::Function(spec)) = self.get(function) {
            environment.extend(
                spec.environment
                    .iter()
                    .map(|(key, value)| (key.clone(), value.clone())),
            );
        }
        for descriptor in &self.declarations {
            if let Descriptor::InvokePermission(spec) = descriptor {
                if &spec.function == function {
                    environment.extend(
                        spec.environment_additions
                            .iter()
                            .map(|(key, value)| (key.clone(), value.clone())),
                    );
                }
            }
        }
        environment
    }

    /// Topological order over declaration indices, Kahn's algorithm.
    ///
    /// Stable: among resources with no unmet dependencies, the lowest
    /// declaration index goes first, so independent branches keep their
    /// source order and repeated synthesis of the same graph yields the
    /// same sequence. References to producers outside the graph create no
    /// edge here; the validation pass rejects them separately.
    pub fn topological_order(&self) -> Result<Vec<usize>, CycleError> {
        let n = self.declarations.len();
        if n == 0 {
            return Ok(Vec::new());
        }

        let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); n];
        let mut in_degree: Vec<usize> = vec![0; n];

        for (idx, descriptor) in self.declarations.iter().enumerate() {
            for reference in descriptor.references() {
                if let Some(producer_idx) = self.index_of(&reference.producer) {
                    if producer_idx != idx {
                        adjacency[producer_idx].push(idx);
                        in_degree[idx] += 1;
                    }
                }
            }
        }

        // Min-heap on declaration index for the stable tie-break.
        let mut ready: BinaryHeap<std::cmp::Reverse<usize>> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, &degree)| degree == 0)
            .map(|(idx, _)| std::cmp::Reverse(idx))
            .collect();

        let mut order = Vec::with_capacity(n);
        while let Some(std::cmp::Reverse(idx)) = ready.pop() {
            order.push(idx);
            for &next in &adjacency[idx] {
                in_degree[next] -= 1;
                if in_degree[next] == 0 {
                    ready.push(std::cmp::Reverse(next));
                }
            }
        }

        if order.len() != n {
            let remaining: Vec<usize> = (0..n).filter(|idx| !order.contains(idx)).collect();
            let members: Vec<LogicalId> = remaining
                .iter()
                .map(|&idx| self.declarations[idx].logical_id().clone())
                .collect();
            let mut explanation = String::from("circular dependency detected:\n");
            for &idx in &remaining {
                explanation.push_str(&format!(
                    "  --> {}\n",
                    self.declarations[idx].describe()
                ));
            }
            explanation.push_str("these resources reference each other's deferred attributes");
            return Err(CycleError {
                members,
                explanation,
            });
        }

        Ok(order)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::function::{CodeAsset, Runtime};
    use crate::resources::table::{KeyAttributeType, KeyDefinition};

    fn graph_with_table_and_function() -> (ResourceGraph, TableHandle, FunctionHandle) {
        let mut graph = ResourceGraph::new();
        let table = graph
            .declare_table(TableSpec::new(
                LogicalId::new("Users").unwrap(),
                "Users",
                KeyDefinition::new("id", KeyAttributeType::String),
            ))
            .unwrap();
        let function = graph
            .declare_function(FunctionSpec::new(
                LogicalId::new("ConfirmSignup").unwrap(),
                "confirmSignup",
                Runtime::NodeJs12,
                "functions/confirm-user-signup.handler",
                CodeAsset::from_path("functions/"),
            ))
            .unwrap();
        (graph, table, function)
    }

    #[test]
    fn duplicate_logical_id_is_rejected() {
        let (mut graph, _, _) = graph_with_table_and_function();
        let err = graph
            .declare_table(TableSpec::new(
                LogicalId::new("Users").unwrap(),
                "Users2",
                KeyDefinition::new("id", KeyAttributeType::String),
            ))
            .unwrap_err();
        assert!(matches!(err, GraphError::DuplicateLogicalId { .. }));
    }

    #[test]
    fn grant_appends_role_statement() {
        let (mut graph, table, function) = graph_with_table_and_function();
        graph
            .grant_resource_access(
                &function,
                vec!["dynamodb:PutItem".to_string()],
                table.arn(),
            )
            .unwrap();
        match graph.get(function.logical_id()).unwrap() {
            Descriptor::Function(spec) => {
                assert_eq!(spec.role_statements.len(), 1);
                assert_eq!(spec.role_statements[0].resource, table.arn());
            }
            other => panic!("expected function, got {}", other.describe()),
        }
    }

    #[test]
    fn references_follow_grant_scope() {
        let (mut graph, table, function) = graph_with_table_and_function();
        graph
            .grant_resource_access(
                &function,
                vec!["dynamodb:PutItem".to_string()],
                table.arn(),
            )
            .unwrap();
        let refs = graph.get(function.logical_id()).unwrap().references();
        assert!(refs.contains(&table.arn()));
    }

    #[test]
    fn topological_order_is_stable_for_independent_resources() {
        let mut graph = ResourceGraph::new();
        for name in ["A", "B", "C"] {
            graph
                .declare_table(TableSpec::new(
                    LogicalId::new(name).unwrap(),
                    name,
                    KeyDefinition::new("id", KeyAttributeType::String),
                ))
                .unwrap();
        }
        assert_eq!(graph.topological_order().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn topological_order_respects_derived_edges() {
        let (mut graph, table, function) = graph_with_table_and_function();
        graph
            .grant_resource_access(
                &function,
                vec!["dynamodb:PutItem".to_string()],
                table.arn(),
            )
            .unwrap();
        let order = graph.topological_order().unwrap();
        let table_pos = order.iter().position(|&idx| idx == table.index()).unwrap();
        let func_pos = order
            .iter()
            .position(|&idx| idx == function.index())
            .unwrap();
        assert!(table_pos < func_pos);
    }

    #[test]
    fn patch_requires_existing_binding() {
        let (mut graph, _, function) = graph_with_table_and_function();
        let directory = graph
            .declare_directory(crate::resources::directory::DirectorySpec::new(
                LogicalId::new("Directory").unwrap(),
                "userpool",
                crate::resources::directory::TriggerFailurePolicy::FailOpen,
            ))
            .unwrap();
        let err = graph
            .patch_event_handler_identity(
                &directory,
                LifecycleEvent::PostConfirmation,
                function.function_arn(),
            )
            .unwrap_err();
        assert!(matches!(err, GraphError::UnboundLifecycleEvent { .. }));
    }

    #[test]
    fn mutual_references_are_reported_as_a_cycle() {
        let (mut graph, _table, function) = graph_with_table_and_function();
        let directory = graph
            .declare_directory(
                crate::resources::directory::DirectorySpec::new(
                    LogicalId::new("Directory").unwrap(),
                    "userpool",
                    crate::resources::directory::TriggerFailurePolicy::FailOpen,
                )
                .with_event_handler(
                    LifecycleEvent::PostConfirmation,
                    function.logical_id().clone(),
                ),
            )
            .unwrap();
        graph
            .patch_event_handler_identity(
                &directory,
                LifecycleEvent::PostConfirmation,
                function.function_arn(),
            )
            .unwrap();
        // Late mutation closes the loop: the function now consumes an
        // attribute of the directory that consumes the function's identity.
        // This is the hazard the grant-step environment additions avoid.
        graph
            .add_environment(
                &function,
                "POOL",
                ValueRef::attr(directory.directory_id()),
            )
            .unwrap();

        let err = graph.topological_order().unwrap_err();
        assert_eq!(err.members.len(), 2);
        assert!(err.explanation.contains("circular dependency"));
    }

    #[test]
    fn effective_environment_merges_grant_additions() {
        let (mut graph, _, function) = graph_with_table_and_function();
        graph
            .add_environment(&function, "STAGE", ValueRef::literal("dev"))
            .unwrap();
        let directory = graph
            .declare_directory(
                crate::resources::directory::DirectorySpec::new(
                    LogicalId::new("Directory").unwrap(),
                    "userpool",
                    crate::resources::directory::TriggerFailurePolicy::FailOpen,
                )
                .with_event_handler(
                    LifecycleEvent::PostConfirmation,
                    function.logical_id().clone(),
                ),
            )
            .unwrap();
        graph
            .declare_invoke_permission(
                InvokePermissionSpec::new(
                    LogicalId::new("DirectoryInvokesConfirmSignup").unwrap(),
                    function.logical_id().clone(),
                    function.function_arn(),
                    ServicePrincipal::identity_directory(),
                    directory.directory_arn(),
                )
                .with_environment_addition(
                    "COGNITO_USER_POOL_ID",
                    ValueRef::attr(directory.directory_id()),
                ),
            )
            .unwrap();

        let environment = graph.effective_environment(function.logical_id());
        assert_eq!(environment.len(), 2);
        assert!(environment.contains_key("STAGE"));
        assert!(environment.contains_key("COGNITO_USER_POOL_ID"));
    }
}
