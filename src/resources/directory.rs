//! Identity directory descriptor.
//!
//! A directory of end-user identities with self-service signup, automatic
//! email verification and a post-confirmation hook. The high-level attribute
//! declarations generate a schema; low-level [`SchemaOverride`]s are merged
//! on top afterwards, field by field with last-write-wins semantics, to
//! express properties the high-level declaration cannot.
//!
//! Event-handler wiring is two-phase. Declaring the directory records the
//! logical binding (which function handles which lifecycle event); a second,
//! explicit patch step resolves the function's invocation identity into the
//! low-level hook field. A raw name string is not enough once the function
//! name is template-generated, and the validator rejects bindings that were
//! never patched.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::attr::{Attr, LogicalId};
use crate::error::ValidationError;

// ---------------------------------------------------------------------------
// High-level attribute declarations
// ---------------------------------------------------------------------------

/// Channels verified automatically, without an admin confirmation step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoVerify {
    pub email: bool,
    pub phone: bool,
}

/// Password policy. Every character-class requirement toggles
/// independently; all four may be disabled at once. A weak policy is a
/// valid explicit configuration, not a default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordPolicy {
    pub min_length: u32,
    pub require_lowercase: bool,
    pub require_uppercase: bool,
    pub require_digits: bool,
    pub require_symbols: bool,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            min_length: 8,
            require_lowercase: false,
            require_uppercase: false,
            require_digits: false,
            require_symbols: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountRecovery {
    EmailOnly,
    PhoneOnly,
    EmailAndPhone,
}

/// Flags on a platform-defined attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StandardAttribute {
    pub required: bool,
    pub mutable: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeDataType {
    String,
    Number,
    Boolean,
    DateTime,
}

/// A directory-defined attribute. Custom attributes are always optional at
/// the platform level; the directory may still mark one required, which the
/// schema merge carries through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomAttribute {
    pub data_type: AttributeDataType,
    pub required: bool,
    pub mutable: bool,
}

// ---------------------------------------------------------------------------
// Lifecycle event handlers
// ---------------------------------------------------------------------------

/// Points in a user's lifecycle at which the directory invokes a handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleEvent {
    PreSignUp,
    PostConfirmation,
    PostAuthentication,
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleEvent::PreSignUp => "pre-sign-up",
            LifecycleEvent::PostConfirmation => "post-confirmation",
            LifecycleEvent::PostAuthentication => "post-authentication",
        };
        write!(f, "{name}")
    }
}

/// Whether a failed handler invocation blocks the lifecycle transition.
/// There is no default; the policy must be set explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerFailurePolicy {
    /// The lifecycle event completes even if the handler errors.
    FailOpen,
    /// A handler error aborts the lifecycle transition.
    FailClosed,
}

/// Two-phase handler binding: the logical function reference is recorded at
/// declaration, the resolved invocation identity is patched in afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventHandlerBinding {
    pub function: LogicalId,
    /// Populated by the explicit patch step; `None` means the binding still
    /// carries only the logical name.
    pub resolved_identity: Option<Attr>,
}

impl EventHandlerBinding {
    pub fn logical(function: LogicalId) -> Self {
        Self {
            function,
            resolved_identity: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Schema generation and overrides
// ---------------------------------------------------------------------------

/// One attribute definition in the directory's effective schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaField {
    pub data_type: AttributeDataType,
    pub required: bool,
    pub mutable: bool,
}

/// A field-level override merged onto the generated schema. Only the set
/// fields are written; each write wins over whatever came before it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaOverride {
    pub name: String,
    pub data_type: Option<AttributeDataType>,
    pub required: Option<bool>,
    pub mutable: Option<bool>,
}

impl SchemaOverride {
    pub fn for_attribute(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: None,
            required: None,
            mutable: None,
        }
    }

    pub fn data_type(mut self, data_type: AttributeDataType) -> Self {
        self.data_type = Some(data_type);
        self
    }

    pub fn required(mut self, required: bool) -> Self {
        self.required = Some(required);
        self
    }

    pub fn mutable(mut self, mutable: bool) -> Self {
        self.mutable = Some(mutable);
        self
    }
}

// ---------------------------------------------------------------------------
// DirectorySpec
// ---------------------------------------------------------------------------

/// Declarative descriptor for the identity directory.
///
/// Produces the deferred `DirectoryId` and `DirectoryArn` attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectorySpec {
    pub logical_id: LogicalId,
    pub name: String,
    pub auto_verify: AutoVerify,
    pub password_policy: PasswordPolicy,
    pub account_recovery: AccountRecovery,
    pub standard_attributes: BTreeMap<String, StandardAttribute>,
    pub custom_attributes: BTreeMap<String, CustomAttribute>,
    pub event_handlers: BTreeMap<LifecycleEvent, EventHandlerBinding>,
    /// Applied in order after the high-level schema is generated.
    pub schema_overrides: Vec<SchemaOverride>,
    pub trigger_failure_policy: TriggerFailurePolicy,
    pub tags: BTreeMap<String, String>,
}

impl DirectorySpec {
    pub fn new(
        logical_id: LogicalId,
        name: impl Into<String>,
        trigger_failure_policy: TriggerFailurePolicy,
    ) -> Self {
        Self {
            logical_id,
            name: name.into(),
            auto_verify: AutoVerify::default(),
            password_policy: PasswordPolicy::default(),
            account_recovery: AccountRecovery::EmailOnly,
            standard_attributes: BTreeMap::new(),
            custom_attributes: BTreeMap::new(),
            event_handlers: BTreeMap::new(),
            schema_overrides: Vec::new(),
            trigger_failure_policy,
            tags: BTreeMap::new(),
        }
    }

    pub fn with_auto_verify(mut self, auto_verify: AutoVerify) -> Self {
        self.auto_verify = auto_verify;
        self
    }

    pub fn with_password_policy(mut self, policy: PasswordPolicy) -> Self {
        self.password_policy = policy;
        self
    }

    pub fn with_account_recovery(mut self, recovery: AccountRecovery) -> Self {
        self.account_recovery = recovery;
        self
    }

    pub fn with_standard_attribute(
        mut self,
        name: impl Into<String>,
        attribute: StandardAttribute,
    ) -> Self {
        self.standard_attributes.insert(name.into(), attribute);
        self
    }

    pub fn with_custom_attribute(
        mut self,
        name: impl Into<String>,
        attribute: CustomAttribute,
    ) -> Self {
        self.custom_attributes.insert(name.into(), attribute);
        self
    }

    /// Record the logical handler binding for a lifecycle event. The
    /// resolved identity is patched in later through the graph.
    pub fn with_event_handler(mut self, event: LifecycleEvent, function: LogicalId) -> Self {
        self.event_handlers
            .insert(event, EventHandlerBinding::logical(function));
        self
    }

    pub fn with_schema_override(mut self, schema_override: SchemaOverride) -> Self {
        self.schema_overrides.push(schema_override);
        self
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Schema generated from the high-level attribute declarations alone.
    /// Standard attributes default to the String data type.
    pub fn generated_schema(&self) -> BTreeMap<String, SchemaField> {
        let mut schema = BTreeMap::new();
        for (name, attribute) in &self.standard_attributes {
            schema.insert(
                name.clone(),
                SchemaField {
                    data_type: AttributeDataType::String,
                    required: attribute.required,
                    mutable: attribute.mutable,
                },
            );
        }
        for (name, attribute) in &self.custom_attributes {
            schema.insert(
                name.clone(),
                SchemaField {
                    data_type: attribute.data_type,
                    required: attribute.required,
                    mutable: attribute.mutable,
                },
            );
        }
        schema
    }

    /// Effective schema: the generated schema with every override applied in
    /// declaration order. Overrides are pure data merges; an override for an
    /// attribute the high-level declarations never mentioned introduces it
    /// with platform defaults for the unset fields.
    pub fn merged_schema(&self) -> BTreeMap<String, SchemaField> {
        let mut schema = self.generated_schema();
        for schema_override in &self.schema_overrides {
            let field = schema
                .entry(schema_override.name.clone())
                .or_insert(SchemaField {
                    data_type: AttributeDataType::String,
                    required: false,
                    mutable: true,
                });
            if let Some(data_type) = schema_override.data_type {
                field.data_type = data_type;
            }
            if let Some(required) = schema_override.required {
                field.required = required;
            }
            if let Some(mutable) = schema_override.mutable {
                field.mutable = mutable;
            }
        }
        schema
    }

    /// Platform consistency rules checked before submission, so the engine
    /// never rejects the directory late.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.auto_verify.email {
            let email_required = self
                .standard_attributes
                .get("email")
                .map(|attribute| attribute.required)
                .unwrap_or(false);
            if !email_required {
                return Err(ValidationError::AutoVerifyRequiresRequired {
                    directory: self.logical_id.clone(),
                    channel: "email".to_string(),
                });
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn base_directory() -> DirectorySpec {
        DirectorySpec::new(
            LogicalId::new("Directory").unwrap(),
            "backend-userpool",
            TriggerFailurePolicy::FailOpen,
        )
    }

    #[test]
    fn weak_password_policy_is_valid_configuration() {
        let spec = base_directory().with_password_policy(PasswordPolicy::default());
        assert!(spec.validate().is_ok());
        assert!(!spec.password_policy.require_lowercase);
        assert!(!spec.password_policy.require_symbols);
    }

    #[test]
    fn auto_verify_email_requires_required_email_attribute() {
        let spec = base_directory().with_auto_verify(AutoVerify {
            email: true,
            phone: false,
        });
        let err = spec.validate().unwrap_err();
        assert!(matches!(
            err,
            ValidationError::AutoVerifyRequiresRequired { ref channel, .. } if channel == "email"
        ));

        let spec = spec.with_standard_attribute(
            "email",
            StandardAttribute {
                required: true,
                mutable: true,
            },
        );
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn auto_verify_email_rejected_when_email_optional() {
        let spec = base_directory()
            .with_auto_verify(AutoVerify {
                email: true,
                phone: false,
            })
            .with_standard_attribute(
                "email",
                StandardAttribute {
                    required: false,
                    mutable: true,
                },
            );
        assert!(spec.validate().is_err());
    }

    #[test]
    fn generated_schema_covers_standard_and_custom_attributes() {
        let spec = base_directory()
            .with_standard_attribute(
                "email",
                StandardAttribute {
                    required: true,
                    mutable: true,
                },
            )
            .with_custom_attribute(
                "name",
                CustomAttribute {
                    data_type: AttributeDataType::String,
                    required: false,
                    mutable: true,
                },
            );
        let schema = spec.generated_schema();
        assert_eq!(schema.len(), 2);
        assert!(schema["email"].required);
        assert!(!schema["name"].required);
    }

    #[test]
    fn schema_overrides_merge_last_write_wins() {
        let spec = base_directory()
            .with_custom_attribute(
                "name",
                CustomAttribute {
                    data_type: AttributeDataType::String,
                    required: false,
                    mutable: false,
                },
            )
            .with_schema_override(SchemaOverride::for_attribute("name").mutable(true))
            .with_schema_override(SchemaOverride::for_attribute("name").required(true))
            // Last write for `required` wins.
            .with_schema_override(SchemaOverride::for_attribute("name").required(false));

        let schema = spec.merged_schema();
        let field = schema["name"];
        assert!(field.mutable);
        assert!(!field.required);
        assert_eq!(field.data_type, AttributeDataType::String);
    }

    #[test]
    fn schema_override_can_introduce_new_attribute() {
        let spec = base_directory().with_schema_override(
            SchemaOverride::for_attribute("locale").data_type(AttributeDataType::String),
        );
        let schema = spec.merged_schema();
        assert!(schema.contains_key("locale"));
        // Unset override fields fall back to platform defaults.
        assert!(!schema["locale"].required);
        assert!(schema["locale"].mutable);
    }

    #[test]
    fn event_handler_binding_starts_unresolved() {
        let spec = base_directory().with_event_handler(
            LifecycleEvent::PostConfirmation,
            LogicalId::new("ConfirmSignup").unwrap(),
        );
        let binding = &spec.event_handlers[&LifecycleEvent::PostConfirmation];
        assert!(binding.resolved_identity.is_none());
    }
}
