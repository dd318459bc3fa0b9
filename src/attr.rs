//! Deferred-attribute handles.
//!
//! A provisioning engine learns some resource properties only after the
//! resource is materialized (an ARN, a generated id). Inside the graph those
//! values are represented by [`Attr`] placeholder handles: a producer's
//! logical id plus the attribute kind being referenced. The engine resolves
//! each handle before substituting it into dependent descriptors; the core
//! never reads resolved values through global state.
//!
//! An `Attr` can only be obtained from the typed handle returned when its
//! producer is declared, so a reference to an undeclared resource cannot be
//! constructed through the public API.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::GraphError;

// ---------------------------------------------------------------------------
// LogicalId
// ---------------------------------------------------------------------------

/// Allowed logical-id / export-key syntax: leading letter, then letters,
/// digits or dashes, at most 128 characters.
static ID_SYNTAX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9-]{0,127}$").expect("static id pattern compiles"));

/// Name of one declared resource in the graph.
///
/// Logical ids are unique per graph and stable across re-synthesis; they are
/// the namespace in which placeholder tokens are rendered.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LogicalId(String);

impl LogicalId {
    /// Validate syntax and wrap. Used by every `declare_*` entry point.
    pub fn new(raw: impl Into<String>) -> Result<Self, GraphError> {
        let raw = raw.into();
        if ID_SYNTAX.is_match(&raw) {
            Ok(Self(raw))
        } else {
            Err(GraphError::InvalidLogicalId { id: raw })
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LogicalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// AttrKind / Attr
// ---------------------------------------------------------------------------

/// Which post-creation attribute of a resource is being referenced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttrKind {
    /// Table ARN.
    Arn,
    /// Table name as assigned by the platform.
    TableName,
    /// Function ARN, also its invocation identity.
    FunctionArn,
    /// Generated directory id.
    DirectoryId,
    /// Directory ARN.
    DirectoryArn,
    /// Generated client id.
    ClientId,
    /// Generated API id.
    ApiId,
}

impl AttrKind {
    fn token_suffix(self) -> &'static str {
        match self {
            AttrKind::Arn => "Arn",
            AttrKind::TableName => "TableName",
            AttrKind::FunctionArn => "FunctionArn",
            AttrKind::DirectoryId => "DirectoryId",
            AttrKind::DirectoryArn => "DirectoryArn",
            AttrKind::ClientId => "ClientId",
            AttrKind::ApiId => "ApiId",
        }
    }
}

/// Placeholder handle for a deferred attribute.
///
/// Rendered into descriptors as a `${Producer#Kind}` token. Two handles are
/// equal exactly when they reference the same attribute of the same
/// producer, which is what the grant-scoping checks rely on.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Attr {
    pub producer: LogicalId,
    pub kind: AttrKind,
}

impl Attr {
    pub fn new(producer: LogicalId, kind: AttrKind) -> Self {
        Self { producer, kind }
    }

    /// Stable token form substituted by the provisioning engine.
    pub fn token(&self) -> String {
        format!("${{{}#{}}}", self.producer, self.kind.token_suffix())
    }
}

impl fmt::Display for Attr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.token())
    }
}

// ---------------------------------------------------------------------------
// ValueRef
// ---------------------------------------------------------------------------

/// A value threaded into a descriptor field: either known at declaration
/// time or deferred until the producer is materialized.
///
/// Environment mappings and output exports both carry these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueRef {
    Static(String),
    Deferred(Attr),
}

impl ValueRef {
    pub fn literal(value: impl Into<String>) -> Self {
        ValueRef::Static(value.into())
    }

    pub fn attr(attr: Attr) -> Self {
        ValueRef::Deferred(attr)
    }

    /// The deferred reference carried by this value, if any.
    pub fn reference(&self) -> Option<&Attr> {
        match self {
            ValueRef::Static(_) => None,
            ValueRef::Deferred(attr) => Some(attr),
        }
    }

    /// Rendered form: the literal itself, or the placeholder token.
    pub fn render(&self) -> String {
        match self {
            ValueRef::Static(value) => value.clone(),
            ValueRef::Deferred(attr) => attr.token(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logical_id_accepts_plain_names() {
        assert!(LogicalId::new("Users").is_ok());
        assert!(LogicalId::new("confirm-signup").is_ok());
        assert!(LogicalId::new("A1-b2-C3").is_ok());
    }

    #[test]
    fn logical_id_rejects_bad_syntax() {
        assert!(LogicalId::new("").is_err());
        assert!(LogicalId::new("1users").is_err());
        assert!(LogicalId::new("has space").is_err());
        assert!(LogicalId::new("dots.not.allowed").is_err());
        assert!(LogicalId::new("x".repeat(129)).is_err());
    }

    #[test]
    fn attr_token_is_stable() {
        let id = LogicalId::new("Users").unwrap();
        let attr = Attr::new(id, AttrKind::Arn);
        assert_eq!(attr.token(), "${Users#Arn}");
        // Same reference renders identically every time.
        assert_eq!(attr.token(), attr.to_string());
    }

    #[test]
    fn value_ref_reference_and_render() {
        let lit = ValueRef::literal("eu-west-1");
        assert!(lit.reference().is_none());
        assert_eq!(lit.render(), "eu-west-1");

        let attr = Attr::new(LogicalId::new("Directory").unwrap(), AttrKind::DirectoryId);
        let deferred = ValueRef::attr(attr.clone());
        assert_eq!(deferred.reference(), Some(&attr));
        assert_eq!(deferred.render(), "${Directory#DirectoryId}");
    }
}
