//! Output exports.
//!
//! Named key/value pairs surfaced after provisioning completes, consumed by
//! whatever configures the front end. Pure projection of already-declared
//! values; the export key is the external name, the logical id names the
//! export inside the graph.

use serde::{Deserialize, Serialize};

use crate::attr::{LogicalId, ValueRef};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputSpec {
    pub logical_id: LogicalId,
    pub export_key: String,
    pub value: ValueRef,
}

impl OutputSpec {
    pub fn new(logical_id: LogicalId, export_key: impl Into<String>, value: ValueRef) -> Self {
        Self {
            logical_id,
            export_key: export_key.into(),
            value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attr::{Attr, AttrKind};

    #[test]
    fn output_projects_deferred_value() {
        let dir = LogicalId::new("Directory").unwrap();
        let output = OutputSpec::new(
            LogicalId::new("DirectoryIdExport").unwrap(),
            "directoryId",
            ValueRef::attr(Attr::new(dir, AttrKind::DirectoryId)),
        );
        assert_eq!(output.value.render(), "${Directory#DirectoryId}");
    }
}
