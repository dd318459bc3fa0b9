//! Synthesis pipeline: validate, order, freeze.
//!
//! `synthesize()` is the single surface between graph assembly and the
//! provisioning engine. It runs the declaration-time validation pass,
//! orders the descriptors topologically, and freezes them into an immutable
//! [`ProvisioningPlan`] with a content-addressed id. Nothing mutates a plan
//! after creation; re-declaring the same graph yields a plan with the same
//! id and an empty diff, which is how idempotent re-provisioning shows up
//! as a no-op.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::attr::LogicalId;
use crate::canonical::{canonical_bytes_for_descriptor, content_addressed_id};
use crate::error::ValidationError;
use crate::graph::{CycleError, Descriptor, ResourceGraph};
use crate::validate::validate_graph;

// ---------------------------------------------------------------------------
// PlanId
// ---------------------------------------------------------------------------

/// Content-addressed identity of a frozen plan.
///
/// Derived from the canonical bytes of the ordered descriptor set (see
/// [`crate::canonical`]); equal ids mean byte-identical plans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlanId(pub Uuid);

impl std::fmt::Display for PlanId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// SynthesisError
// ---------------------------------------------------------------------------

/// Failure while turning a graph into a plan. Both variants are
/// declaration-side defects; nothing here comes back from the engine.
#[derive(Error, Debug)]
pub enum SynthesisError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("ordering failed: {0}")]
    Cycle(#[from] CycleError),
}

// ---------------------------------------------------------------------------
// ProvisioningPlan
// ---------------------------------------------------------------------------

/// The immutable synthesis artifact handed to the provisioning engine.
///
/// Descriptors are stored in creation order: every resource appears after
/// everything it references, so the engine may create sequentially as-is or
/// parallelize independent branches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisioningPlan {
    pub id: PlanId,
    pub descriptors: Vec<Descriptor>,
    pub created_at: DateTime<Utc>,
}

impl ProvisioningPlan {
    pub fn descriptor_count(&self) -> usize {
        self.descriptors.len()
    }

    /// Descriptors that provision infrastructure, excluding output exports.
    pub fn resources(&self) -> impl Iterator<Item = &Descriptor> {
        self.descriptors
            .iter()
            .filter(|descriptor| !matches!(descriptor, Descriptor::Output(_)))
    }

    /// The plan's output exports, in declaration order.
    pub fn outputs(&self) -> Vec<&crate::resources::output::OutputSpec> {
        self.descriptors
            .iter()
            .filter_map(|descriptor| match descriptor {
                Descriptor::Output(output) => Some(output),
                _ => None,
            })
            .collect()
    }

    pub fn get(&self, id: &LogicalId) -> Option<&Descriptor> {
        self.descriptors
            .iter()
            .find(|descriptor| descriptor.logical_id() == id)
    }

    /// Compare against a newer plan for the same stack.
    pub fn diff(&self, newer: &ProvisioningPlan) -> PlanDiff {
        let mut changes = Vec::new();
        for descriptor in &newer.descriptors {
            match self.get(descriptor.logical_id()) {
                None => changes.push(PlanChange::Added(descriptor.logical_id().clone())),
                Some(existing) => {
                    if canonical_bytes_for_descriptor(existing)
                        != canonical_bytes_for_descriptor(descriptor)
                    {
                        changes.push(PlanChange::Modified(descriptor.logical_id().clone()));
                    }
                }
            }
        }
        for descriptor in &self.descriptors {
            if newer.get(descriptor.logical_id()).is_none() {
                changes.push(PlanChange::Removed(descriptor.logical_id().clone()));
            }
        }
        PlanDiff { changes }
    }

    /// Plan listing for dry-run output.
    pub fn describe(&self) -> String {
        let mut output = String::new();
        output.push_str(&format!("Provisioning plan {}\n", self.id));
        output.push_str(&format!("Resources: {}\n", self.descriptor_count()));
        for (idx, descriptor) in self.descriptors.iter().enumerate() {
            output.push_str(&format!("  [{idx}] {}\n", descriptor.describe()));
        }
        output
    }
}

/// One difference between two plans.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanChange {
    Added(LogicalId),
    Removed(LogicalId),
    Modified(LogicalId),
}

/// Set of differences between two plans. Empty for identical graphs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanDiff {
    pub changes: Vec<PlanChange>,
}

impl PlanDiff {
    /// True when re-applying would change nothing.
    pub fn is_noop(&self) -> bool {
        self.changes.is_empty()
    }
}

// ---------------------------------------------------------------------------
// synthesize
// ---------------------------------------------------------------------------

/// Validate the graph, order it, and freeze the plan.
pub fn synthesize(graph: &ResourceGraph) -> Result<ProvisioningPlan, SynthesisError> {
    debug!(resources = graph.len(), "starting synthesis");
    validate_graph(graph)?;

    let order = graph.topological_order()?;
    let descriptors: Vec<Descriptor> = order
        .iter()
        .map(|&idx| graph.descriptors()[idx].clone())
        .collect();

    let id = content_addressed_id(&descriptors);
    info!(plan = %id, resources = descriptors.len(), "plan frozen");

    Ok(ProvisioningPlan {
        id,
        descriptors,
        created_at: Utc::now(),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attr::ValueRef;
    use crate::resources::output::OutputSpec;
    use crate::resources::table::{KeyAttributeType, KeyDefinition, TableSpec};

    fn graph_with_tables(names: &[&str]) -> ResourceGraph {
        let mut graph = ResourceGraph::new();
        for name in names {
            graph
                .declare_table(TableSpec::new(
                    LogicalId::new(*name).unwrap(),
                    *name,
                    KeyDefinition::new("id", KeyAttributeType::String),
                ))
                .unwrap();
        }
        graph
    }

    #[test]
    fn identical_graphs_synthesize_to_same_id() {
        let a = synthesize(&graph_with_tables(&["Users"])).unwrap();
        let b = synthesize(&graph_with_tables(&["Users"])).unwrap();
        assert_eq!(a.id, b.id);
        assert!(a.diff(&b).is_noop());
    }

    #[test]
    fn added_resource_shows_in_diff() {
        let a = synthesize(&graph_with_tables(&["Users"])).unwrap();
        let b = synthesize(&graph_with_tables(&["Users", "Accounts"])).unwrap();
        let diff = a.diff(&b);
        assert_eq!(
            diff.changes,
            vec![PlanChange::Added(LogicalId::new("Accounts").unwrap())]
        );
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn removed_resource_shows_in_diff() {
        let a = synthesize(&graph_with_tables(&["Users", "Accounts"])).unwrap();
        let b = synthesize(&graph_with_tables(&["Users"])).unwrap();
        let diff = a.diff(&b);
        assert_eq!(
            diff.changes,
            vec![PlanChange::Removed(LogicalId::new("Accounts").unwrap())]
        );
    }

    #[test]
    fn modified_resource_shows_in_diff() {
        let a = synthesize(&graph_with_tables(&["Users"])).unwrap();
        let mut graph = ResourceGraph::new();
        graph
            .declare_table(
                TableSpec::new(
                    LogicalId::new("Users").unwrap(),
                    "Users",
                    KeyDefinition::new("id", KeyAttributeType::String),
                )
                .with_tag("Environment", "dev"),
            )
            .unwrap();
        let b = synthesize(&graph).unwrap();
        assert_eq!(
            a.diff(&b).changes,
            vec![PlanChange::Modified(LogicalId::new("Users").unwrap())]
        );
    }

    #[test]
    fn timestamps_do_not_affect_identity() {
        let a = synthesize(&graph_with_tables(&["Users"])).unwrap();
        let b = synthesize(&graph_with_tables(&["Users"])).unwrap();
        // created_at differs between runs; the id must not.
        assert_eq!(a.id, b.id);
    }

    #[test]
    fn outputs_are_projected() {
        let mut graph = graph_with_tables(&["Users"]);
        graph
            .declare_output(OutputSpec::new(
                LogicalId::new("RegionExport").unwrap(),
                "region",
                ValueRef::literal("eu-west-1"),
            ))
            .unwrap();
        let plan = synthesize(&graph).unwrap();
        assert_eq!(plan.outputs().len(), 1);
        assert_eq!(plan.resources().count(), 1);
        assert_eq!(plan.descriptor_count(), 2);
    }

    #[test]
    fn invalid_graph_fails_synthesis() {
        let mut graph = ResourceGraph::new();
        graph
            .declare_table(
                TableSpec::new(
                    LogicalId::new("Users").unwrap(),
                    "Users",
                    KeyDefinition::new("id", KeyAttributeType::String),
                )
                .with_sort_key(KeyDefinition::new("id", KeyAttributeType::String)),
            )
            .unwrap();
        let err = synthesize(&graph).unwrap_err();
        assert!(matches!(err, SynthesisError::Validation(_)));
    }
}
