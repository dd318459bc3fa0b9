//! Query API descriptor.
//!
//! Declares a query/mutation API authorized against the identity directory.
//! The schema document is an external, versioned file referenced by
//! location; its contents are the API engine's business. Resolver
//! transforms are data, not executable logic: the only shape this topology
//! needs is a single-item key lookup with the key value supplied by the
//! caller's identity.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::attr::{Attr, LogicalId};

/// Field-level request logging verbosity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldLogLevel {
    None,
    Error,
    All,
}

/// What happens to an authenticated caller on a field with no finer rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefaultAction {
    Allow,
    Deny,
}

/// Directory-backed authorization: callers authenticate against the
/// directory, and `default_action` governs authenticated requests that no
/// field-level rule covers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiAuthorization {
    pub directory: Attr,
    pub default_action: DefaultAction,
}

/// Reference to the external schema document. Not parsed or validated here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaSource {
    pub path: String,
}

impl SchemaSource {
    pub fn from_path(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

/// Backing store binding for resolvers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSourceKind {
    /// Inert source for fields requiring no data access.
    None,
    /// Table-backed source.
    Table { table: Attr },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSource {
    pub name: String,
    pub kind: DataSourceKind,
}

/// Request-side transform: how the field's invocation becomes a storage
/// operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestTransform {
    /// Single-item get by partition key. `key` names the table's partition
    /// key attribute; `value_from` names the caller-identity field that
    /// supplies the key value.
    KeyLookup { key: String, value_from: String },
}

/// Response-side transform: how the storage result becomes the field value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseTransform {
    /// The full stored item, or an absence signal when no item matched.
    ResultItem,
    /// A single named field projected out of the stored item.
    ResultField { name: String },
}

/// Binding of one (type, field) pair to a data source and transform pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolver {
    pub type_name: String,
    pub field_name: String,
    pub data_source: String,
    pub request: RequestTransform,
    pub response: ResponseTransform,
}

/// Declarative descriptor for the API layer.
///
/// Produces the deferred `ApiId` attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiSpec {
    pub logical_id: LogicalId,
    pub name: String,
    pub schema: SchemaSource,
    pub log_level: FieldLogLevel,
    pub authorization: ApiAuthorization,
    pub data_sources: Vec<DataSource>,
    pub resolvers: Vec<Resolver>,
    pub xray_enabled: bool,
    pub tags: BTreeMap<String, String>,
}

impl ApiSpec {
    pub fn new(
        logical_id: LogicalId,
        name: impl Into<String>,
        schema: SchemaSource,
        authorization: ApiAuthorization,
    ) -> Self {
        Self {
            logical_id,
            name: name.into(),
            schema,
            log_level: FieldLogLevel::None,
            authorization,
            data_sources: Vec::new(),
            resolvers: Vec::new(),
            xray_enabled: false,
            tags: BTreeMap::new(),
        }
    }

    pub fn with_log_level(mut self, log_level: FieldLogLevel) -> Self {
        self.log_level = log_level;
        self
    }

    pub fn with_xray(mut self, enabled: bool) -> Self {
        self.xray_enabled = enabled;
        self
    }

    pub fn with_data_source(mut self, name: impl Into<String>, kind: DataSourceKind) -> Self {
        self.data_sources.push(DataSource {
            name: name.into(),
            kind,
        });
        self
    }

    pub fn with_resolver(mut self, resolver: Resolver) -> Self {
        self.resolvers.push(resolver);
        self
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Look up a declared data source by name.
    pub fn data_source(&self, name: &str) -> Option<&DataSource> {
        self.data_sources.iter().find(|source| source.name == name)
    }
}
