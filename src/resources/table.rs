//! Storage table descriptor.
//!
//! A single keyed table with on-demand billing. The table is the leaf of the
//! topology: nothing it declares references another resource, while its ARN
//! attribute scopes the trigger function's write grant and its name attribute
//! backs the API data source.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::attr::LogicalId;
use crate::error::ValidationError;

/// Scalar key attribute types supported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyAttributeType {
    String,
    Number,
    Binary,
}

/// One key field: attribute name plus its scalar type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyDefinition {
    pub name: String,
    pub attr_type: KeyAttributeType,
}

impl KeyDefinition {
    pub fn new(name: impl Into<String>, attr_type: KeyAttributeType) -> Self {
        Self {
            name: name.into(),
            attr_type,
        }
    }
}

/// Billing configuration. The topology only requires on-demand billing;
/// provisioned throughput is accepted for completeness.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingMode {
    PayPerRequest,
    Provisioned {
        read_capacity: u64,
        write_capacity: u64,
    },
}

/// Declarative descriptor for the storage table.
///
/// Produces the deferred `Arn` and `TableName` attributes once created.
/// Creation fails at provisioning time if `name` collides with an existing
/// table in the target account and region; that conflict is surfaced
/// verbatim by the engine and is not retried here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSpec {
    pub logical_id: LogicalId,
    pub name: String,
    pub partition_key: KeyDefinition,
    pub sort_key: Option<KeyDefinition>,
    pub billing_mode: BillingMode,
    pub tags: BTreeMap<String, String>,
}

impl TableSpec {
    pub fn new(logical_id: LogicalId, name: impl Into<String>, partition_key: KeyDefinition) -> Self {
        Self {
            logical_id,
            name: name.into(),
            partition_key,
            sort_key: None,
            billing_mode: BillingMode::PayPerRequest,
            tags: BTreeMap::new(),
        }
    }

    pub fn with_sort_key(mut self, sort_key: KeyDefinition) -> Self {
        self.sort_key = Some(sort_key);
        self
    }

    pub fn with_billing_mode(mut self, billing_mode: BillingMode) -> Self {
        self.billing_mode = billing_mode;
        self
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Local key-schema rules, checked at declaration time.
    ///
    /// A key field must not appear as both partition and sort key under the
    /// same name; the keys must be distinct, explicitly named attributes.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(sort_key) = &self.sort_key {
            if sort_key.name == self.partition_key.name {
                return Err(ValidationError::DuplicateKeyName {
                    table: self.logical_id.clone(),
                    key: sort_key.name.clone(),
                });
            }
        }
        Ok(())
    }
}
