//! Permission grants.
//!
//! Two grant shapes exist in this topology. A [`PolicyStatement`] rides on a
//! function's execution role and scopes a set of actions to exactly one
//! resource ARN attribute; it never carries a wildcard. An
//! [`InvokePermissionSpec`] is a standalone descriptor authorizing a managed
//! service principal to invoke a function, with the source ARN pinned to one
//! specific caller instance. Service principals are not IAM roles, so the
//! invoke grant is registered as an explicit permission statement rather
//! than a role-policy attachment.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::attr::{Attr, LogicalId, ValueRef};

/// Action namespace for function invocation.
pub const ACTION_INVOKE_FUNCTION: &str = "lambda:InvokeFunction";
/// Single-item write to the storage table.
pub const ACTION_PUT_ITEM: &str = "dynamodb:PutItem";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Effect {
    Allow,
    Deny,
}

/// Least-privilege statement on an execution role.
///
/// The resource scope is an [`Attr`], so the statement can only ever name
/// one declared resource's ARN attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyStatement {
    pub effect: Effect,
    pub actions: Vec<String>,
    pub resource: Attr,
}

impl PolicyStatement {
    pub fn allow(actions: Vec<String>, resource: Attr) -> Self {
        Self {
            effect: Effect::Allow,
            actions,
            resource,
        }
    }
}

/// A named external service identity, e.g. the identity directory service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServicePrincipal(String);

impl ServicePrincipal {
    pub fn new(service: impl Into<String>) -> Self {
        Self(service.into())
    }

    /// The identity directory's managed service principal.
    pub fn identity_directory() -> Self {
        Self::new("cognito-idp.amazonaws.com")
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ServicePrincipal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Standalone scoped invoke grant.
///
/// Declared only after both the function and the caller exist in the graph,
/// so both deferred references here point backwards. The grant also carries
/// the environment additions applied to the function once the caller is
/// materialized; this is how a value produced later than the function (the
/// directory id) reaches the function's environment without a forward
/// reference on the function descriptor itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvokePermissionSpec {
    pub logical_id: LogicalId,
    /// Function being invoked.
    pub function: LogicalId,
    pub function_arn: Attr,
    pub principal: ServicePrincipal,
    pub action: String,
    /// Caller instance the grant is restricted to.
    pub source_arn: Attr,
    /// Applied to the function's environment after the source exists.
    pub environment_additions: BTreeMap<String, ValueRef>,
}

impl InvokePermissionSpec {
    pub fn new(
        logical_id: LogicalId,
        function: LogicalId,
        function_arn: Attr,
        principal: ServicePrincipal,
        source_arn: Attr,
    ) -> Self {
        Self {
            logical_id,
            function,
            function_arn,
            principal,
            action: ACTION_INVOKE_FUNCTION.to_string(),
            source_arn,
            environment_additions: BTreeMap::new(),
        }
    }

    pub fn with_environment_addition(mut self, key: impl Into<String>, value: ValueRef) -> Self {
        self.environment_additions.insert(key.into(), value);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attr::AttrKind;

    #[test]
    fn invoke_permission_defaults_to_invoke_action() {
        let func = LogicalId::new("ConfirmSignup").unwrap();
        let dir = LogicalId::new("Directory").unwrap();
        let grant = InvokePermissionSpec::new(
            LogicalId::new("DirectoryInvokesConfirmSignup").unwrap(),
            func.clone(),
            Attr::new(func, AttrKind::FunctionArn),
            ServicePrincipal::identity_directory(),
            Attr::new(dir, AttrKind::DirectoryArn),
        );
        assert_eq!(grant.action, ACTION_INVOKE_FUNCTION);
        assert_eq!(grant.principal.as_str(), "cognito-idp.amazonaws.com");
        assert!(grant.environment_additions.is_empty());
    }

    #[test]
    fn environment_additions_accumulate() {
        let func = LogicalId::new("ConfirmSignup").unwrap();
        let dir = LogicalId::new("Directory").unwrap();
        let grant = InvokePermissionSpec::new(
            LogicalId::new("Grant").unwrap(),
            func.clone(),
            Attr::new(func, AttrKind::FunctionArn),
            ServicePrincipal::identity_directory(),
            Attr::new(dir.clone(), AttrKind::DirectoryArn),
        )
        .with_environment_addition(
            "COGNITO_USER_POOL_ID",
            ValueRef::attr(Attr::new(dir, AttrKind::DirectoryId)),
        );
        assert_eq!(grant.environment_additions.len(), 1);
    }
}
