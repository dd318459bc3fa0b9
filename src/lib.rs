//! stackform - declarative provisioning topology for an identity-aware
//! backend.
//!
//! This crate assembles the resource graph for a backend made of a user
//! directory, a storage table, a signup trigger function and a query API:
//! which resources exist, which deferred attributes (ARNs, generated ids)
//! flow between them, and which permission grants bind them together. The
//! output is an immutable, content-addressed [`synth::ProvisioningPlan`]
//! that an external provisioning engine turns into create operations. The
//! crate itself performs no I/O and handles no requests.
//!
//! ## Quick start
//!
//! ```rust
//! use stackform::{BackendConfig, BackendTopology, StackEnv};
//!
//! let env = StackEnv::new("dev", "eu-west-1");
//! let topology = BackendTopology::declare(&BackendConfig::default(), &env)?;
//! let plan = topology.synthesize()?;
//! assert!(plan.diff(&topology.synthesize()?).is_noop());
//! # Ok::<(), stackform::StackError>(())
//! ```

// Deferred-attribute handles and value references
pub mod attr;

// Error types
pub mod error;

// Stack context and topology configuration
pub mod config;

// Subscriber setup for binaries and test harnesses
pub mod logging;

// Resource descriptors, one module per provisionable unit
pub mod resources;

// Graph assembly and topological ordering
pub mod graph;

// Declaration-time validation pass
pub mod validate;

// Canonical serialization for content-addressed plan ids
pub mod canonical;

// Synthesis pipeline and the frozen plan
pub mod synth;

// The backend topology builder
pub mod backend;

// Public surface re-exports
pub use attr::{Attr, AttrKind, LogicalId, ValueRef};
pub use backend::{BackendTopology, EXPORT_CLIENT_ID, EXPORT_DIRECTORY_ID, EXPORT_REGION};
pub use config::{BackendConfig, StackEnv};
pub use error::{ConfigError, GraphError, StackError, ValidationError};
pub use graph::{Descriptor, ResourceGraph};
pub use synth::{synthesize, PlanChange, PlanDiff, PlanId, ProvisioningPlan, SynthesisError};
pub use validate::validate_graph;
