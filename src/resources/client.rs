//! Client registration descriptor.
//!
//! A client application entry belonging to exactly one identity directory.
//! The owner reference is derived from the directory handle at construction
//! time, so the client's directory id and the owning directory's id cannot
//! diverge once set.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::attr::{Attr, LogicalId};

/// Authentication flows a client may be allowed to use, each independently
/// enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthFlow {
    /// Secure remote password exchange.
    UserSrp,
    /// Direct username/password submission.
    UserPassword,
    /// Session renewal via refresh token.
    RefreshToken,
}

/// Declarative descriptor for a client registration.
///
/// Produces the deferred `ClientId` attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientSpec {
    pub logical_id: LogicalId,
    pub client_name: String,
    /// The owning directory's generated id attribute.
    pub directory: Attr,
    pub auth_flows: BTreeSet<AuthFlow>,
    /// Suppress user-existence disclosure in error responses. Hardening
    /// that must be enabled explicitly, never implied.
    pub prevent_existence_leakage: bool,
}

impl ClientSpec {
    pub fn new(logical_id: LogicalId, client_name: impl Into<String>, directory: Attr) -> Self {
        Self {
            logical_id,
            client_name: client_name.into(),
            directory,
            auth_flows: BTreeSet::new(),
            prevent_existence_leakage: false,
        }
    }

    pub fn with_auth_flow(mut self, flow: AuthFlow) -> Self {
        self.auth_flows.insert(flow);
        self
    }

    pub fn with_auth_flows(mut self, flows: impl IntoIterator<Item = AuthFlow>) -> Self {
        self.auth_flows.extend(flows);
        self
    }

    pub fn prevent_existence_leakage(mut self) -> Self {
        self.prevent_existence_leakage = true;
        self
    }
}
