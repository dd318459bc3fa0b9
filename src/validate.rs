//! Declaration-time validation of the assembled graph.
//!
//! Runs before the graph is handed to the provisioning engine, so every
//! structural defect is caught while it is still cheap to fix. The pass
//! fails fast: descriptors are visited in declaration order, each against
//! its reference rules and local rules, then the cross-resource rules run.
//! The first violation is returned with the offending resource and field
//! named.
//!
//! Provisioning-time conflicts (name collisions, quotas) are deliberately
//! NOT checked here; the engine surfaces those verbatim, and retrying a
//! naming conflict cannot succeed without a declaration change.

use std::collections::{BTreeSet, HashMap};

use tracing::debug;

use crate::attr::{Attr, AttrKind, LogicalId};
use crate::error::ValidationError;
use crate::graph::{Descriptor, ResourceGraph};
use crate::resources::function::{ENV_CONNECTION_REUSE, ENV_DIRECTORY_ID, ENV_STAGE};

/// Environment keys every lifecycle-handler function must end up with.
const REQUIRED_HANDLER_ENV: [&str; 3] = [ENV_STAGE, ENV_CONNECTION_REUSE, ENV_DIRECTORY_ID];

/// Validate the whole graph. Ok(()) means the graph is safe to order and
/// freeze.
pub fn validate_graph(graph: &ResourceGraph) -> Result<(), ValidationError> {
    for (idx, descriptor) in graph.descriptors().iter().enumerate() {
        check_references(graph, idx, descriptor)?;
        check_local_rules(graph, descriptor)?;
    }
    check_handler_authorization(graph)?;
    check_handler_environment(graph)?;
    check_output_keys(graph)?;
    debug!(resources = graph.len(), "graph validation passed");
    Ok(())
}

// ---------------------------------------------------------------------------
// Reference rules
// ---------------------------------------------------------------------------

/// Every deferred-attribute reference must point at a declared producer
/// that (a) precedes the consumer and (b) actually produces the referenced
/// attribute kind.
fn check_references(
    graph: &ResourceGraph,
    idx: usize,
    descriptor: &Descriptor,
) -> Result<(), ValidationError> {
    let consumer = descriptor.logical_id();
    for attr in descriptor.references() {
        let producer_idx = graph.index_of(&attr.producer).ok_or_else(|| {
            ValidationError::UnknownProducer {
                consumer: consumer.clone(),
                attr: attr.clone(),
            }
        })?;
        if producer_idx >= idx {
            return Err(ValidationError::ForwardReference {
                consumer: consumer.clone(),
                producer: attr.producer.clone(),
                attr,
            });
        }
        let producer = &graph.descriptors()[producer_idx];
        if !producer.produces(attr.kind) {
            return Err(ValidationError::AttrNotProducedBy {
                consumer: consumer.clone(),
                attr,
                producer_type: producer.type_name().to_string(),
            });
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Local rules
// ---------------------------------------------------------------------------

fn is_arn_kind(kind: AttrKind) -> bool {
    matches!(
        kind,
        AttrKind::Arn | AttrKind::FunctionArn | AttrKind::DirectoryArn
    )
}

fn check_local_rules(graph: &ResourceGraph, descriptor: &Descriptor) -> Result<(), ValidationError> {
    match descriptor {
        Descriptor::Table(spec) => spec.validate(),
        Descriptor::Function(spec) => {
            for statement in &spec.role_statements {
                if statement.actions.is_empty() {
                    return Err(ValidationError::EmptyActionSet {
                        resource: spec.logical_id.clone(),
                    });
                }
                if !is_arn_kind(statement.resource.kind) {
                    return Err(ValidationError::GrantScopeNotArn {
                        resource: spec.logical_id.clone(),
                        attr: statement.resource.clone(),
                    });
                }
            }
            Ok(())
        }
        Descriptor::Directory(spec) => {
            spec.validate()?;
            for (event, binding) in &spec.event_handlers {
                let identity = binding.resolved_identity.as_ref().ok_or_else(|| {
                    ValidationError::HandlerIdentityUnresolved {
                        directory: spec.logical_id.clone(),
                        event: *event,
                    }
                })?;
                // The patched identity must be the bound function's own
                // invocation identity, not some other resource's.
                if identity.producer != binding.function
                    || identity.kind != AttrKind::FunctionArn
                {
                    return Err(ValidationError::HandlerIdentityMismatch {
                        directory: spec.logical_id.clone(),
                        event: *event,
                        function: binding.function.clone(),
                    });
                }
            }
            Ok(())
        }
        Descriptor::InvokePermission(spec) => {
            if !is_arn_kind(spec.source_arn.kind) {
                return Err(ValidationError::GrantScopeNotArn {
                    resource: spec.logical_id.clone(),
                    attr: spec.source_arn.clone(),
                });
            }
            if spec.function_arn.kind != AttrKind::FunctionArn {
                return Err(ValidationError::GrantScopeNotArn {
                    resource: spec.logical_id.clone(),
                    attr: spec.function_arn.clone(),
                });
            }
            Ok(())
        }
        Descriptor::Client(spec) => {
            let owner_is_directory = spec.directory.kind == AttrKind::DirectoryId
                && matches!(graph.get(&spec.directory.producer), Some(Descriptor::Directory(_)));
            if !owner_is_directory {
                return Err(ValidationError::ClientOwnerNotDirectory {
                    client: spec.logical_id.clone(),
                    attr: spec.directory.clone(),
                });
            }
            Ok(())
        }
        Descriptor::Api(spec) => {
            let mut source_names = BTreeSet::new();
            for source in &spec.data_sources {
                if !source_names.insert(source.name.as_str()) {
                    return Err(ValidationError::DuplicateDataSource {
                        api: spec.logical_id.clone(),
                        name: source.name.clone(),
                    });
                }
            }
            let mut resolver_fields = BTreeSet::new();
            for resolver in &spec.resolvers {
                if !resolver_fields.insert((resolver.type_name.as_str(), resolver.field_name.as_str()))
                {
                    return Err(ValidationError::DuplicateResolver {
                        api: spec.logical_id.clone(),
                        type_name: resolver.type_name.clone(),
                        field_name: resolver.field_name.clone(),
                    });
                }
                if !source_names.contains(resolver.data_source.as_str()) {
                    return Err(ValidationError::UnknownDataSource {
                        api: spec.logical_id.clone(),
                        type_name: resolver.type_name.clone(),
                        field_name: resolver.field_name.clone(),
                        data_source: resolver.data_source.clone(),
                    });
                }
            }
            Ok(())
        }
        Descriptor::Output(_) => Ok(()),
    }
}

// ---------------------------------------------------------------------------
// Cross-resource rules
// ---------------------------------------------------------------------------

/// A function wired as an event handler must also hold a scoped invoke
/// permission naming the directory's own ARN as the source. The broad
/// service-principal grant on the function is not enough: the caller must
/// prove the invocation originates from this directory instance.
fn check_handler_authorization(graph: &ResourceGraph) -> Result<(), ValidationError> {
    for descriptor in graph.descriptors() {
        let Descriptor::Directory(directory) = descriptor else {
            continue;
        };
        for (event, binding) in &directory.event_handlers {
            let scoped_source = Attr::new(directory.logical_id.clone(), AttrKind::DirectoryArn);
            let authorized = graph.descriptors().iter().any(|candidate| {
                matches!(
                    candidate,
                    Descriptor::InvokePermission(grant)
                        if grant.function == binding.function
                            && grant.source_arn == scoped_source
                )
            });
            if !authorized {
                return Err(ValidationError::UnauthorizedEventHandler {
                    directory: directory.logical_id.clone(),
                    event: *event,
                    function: binding.function.clone(),
                });
            }
        }
    }
    Ok(())
}

/// Handler functions must end up with the full environment contract (stage,
/// directory id, connection-reuse hint), counting grant-step additions.
/// A key set both on the function and by an addition is a conflict, not a
/// merge.
fn check_handler_environment(graph: &ResourceGraph) -> Result<(), ValidationError> {
    let mut handler_functions: Vec<&LogicalId> = Vec::new();
    for descriptor in graph.descriptors() {
        if let Descriptor::Directory(directory) = descriptor {
            for binding in directory.event_handlers.values() {
                handler_functions.push(&binding.function);
            }
        }
    }

    for function in handler_functions {
        if let Some(Descriptor::Function(spec)) = graph.get(function) {
            for descriptor in graph.descriptors() {
                if let Descriptor::InvokePermission(grant) = descriptor {
                    if &grant.function == function {
                        for key in grant.environment_additions.keys() {
                            if spec.environment.contains_key(key) {
                                return Err(ValidationError::DuplicateEnvironmentKey {
                                    function: function.clone(),
                                    key: key.clone(),
                                });
                            }
                        }
                    }
                }
            }
            let environment = graph.effective_environment(function);
            for key in REQUIRED_HANDLER_ENV {
                if !environment.contains_key(key) {
                    return Err(ValidationError::MissingEnvironmentKey {
                        function: function.clone(),
                        key: key.to_string(),
                    });
                }
            }
        }
    }
    Ok(())
}

fn check_output_keys(graph: &ResourceGraph) -> Result<(), ValidationError> {
    let mut seen: HashMap<&str, &LogicalId> = HashMap::new();
    for descriptor in graph.descriptors() {
        if let Descriptor::Output(output) = descriptor {
            if seen.insert(output.export_key.as_str(), &output.logical_id).is_some() {
                return Err(ValidationError::DuplicateOutputKey {
                    output: output.logical_id.clone(),
                    key: output.export_key.clone(),
                });
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
