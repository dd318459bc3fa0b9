//! Canonical serialization for content-addressed plan ids.
//!
//! Descriptors use `bincode` for deterministic binary serialization. The
//! canonical types carry `BTreeMap`/`BTreeSet` only and no floats, so
//! iteration order and byte layout are stable. JSON is never hashed: key
//! order and whitespace are not deterministic across serializers, and the
//! plan id must survive being stored and re-derived.
//!
//! ```text
//! SHA-256(bincode(ordered descriptors))
//!   -> truncate to 128 bits
//!   -> Uuid::from_bytes()
//!   -> PlanId
//! ```
//!
//! Two synthesis runs over the same graph produce the same id, which is the
//! whole idempotence story: the engine compares ids and diffs to a no-op.

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::graph::Descriptor;
use crate::synth::PlanId;

/// Serialize one descriptor to deterministic bincode bytes.
pub fn canonical_bytes_for_descriptor(descriptor: &Descriptor) -> Vec<u8> {
    bincode::serialize(descriptor).expect("bincode serialization of Descriptor is infallible")
}

/// Serialize an ordered descriptor slice to deterministic bincode bytes.
pub fn canonical_bytes_for_descriptors(descriptors: &[Descriptor]) -> Vec<u8> {
    bincode::serialize(descriptors)
        .expect("bincode serialization of Descriptor slice is infallible")
}

/// Content-addressed plan id: SHA-256 over the canonical bytes, truncated
/// to 128 bits. The only way a `PlanId` is derived in production.
pub fn content_addressed_id(descriptors: &[Descriptor]) -> PlanId {
    let hash = full_sha256(descriptors);
    let bytes: [u8; 16] = hash[..16]
        .try_into()
        .expect("SHA-256 always produces 32 bytes; first 16 are always available");
    PlanId(Uuid::from_bytes(bytes))
}

/// Full 32-byte digest, kept alongside stored plans for tamper detection.
pub fn full_sha256(descriptors: &[Descriptor]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(canonical_bytes_for_descriptors(descriptors));
    hasher.finalize().into()
}

/// Hex form of the full digest, for logs and stored-plan metadata.
pub fn hex_digest(descriptors: &[Descriptor]) -> String {
    hex::encode(full_sha256(descriptors))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attr::{LogicalId, ValueRef};
    use crate::graph::Descriptor;
    use crate::resources::output::OutputSpec;
    use crate::resources::table::{KeyAttributeType, KeyDefinition, TableSpec};

    fn table(name: &str) -> Descriptor {
        Descriptor::Table(TableSpec::new(
            LogicalId::new(name).unwrap(),
            name,
            KeyDefinition::new("id", KeyAttributeType::String),
        ))
    }

    #[test]
    fn canonical_bytes_are_deterministic() {
        let descriptors = vec![table("Users")];
        assert_eq!(
            canonical_bytes_for_descriptors(&descriptors),
            canonical_bytes_for_descriptors(&descriptors),
        );
    }

    #[test]
    fn same_descriptors_same_id() {
        let descriptors = vec![table("Users")];
        assert_eq!(
            content_addressed_id(&descriptors),
            content_addressed_id(&descriptors),
        );
    }

    #[test]
    fn different_descriptors_different_id() {
        let a = vec![table("Users")];
        let b = vec![table("Accounts")];
        assert_ne!(content_addressed_id(&a), content_addressed_id(&b));
    }

    #[test]
    fn descriptor_order_changes_id() {
        let a = vec![table("Users"), table("Accounts")];
        let b = vec![table("Accounts"), table("Users")];
        assert_ne!(content_addressed_id(&a), content_addressed_id(&b));
    }

    #[test]
    fn id_matches_truncated_sha256() {
        let descriptors = vec![table("Users")];
        let id = content_addressed_id(&descriptors);
        let hash = full_sha256(&descriptors);
        let expected = Uuid::from_bytes(hash[..16].try_into().unwrap());
        assert_eq!(id.0, expected);
    }

    #[test]
    fn json_is_not_used_for_hashing() {
        // Guard against regression to JSON-based hashing.
        let descriptor = table("Users");
        let bincode_bytes = canonical_bytes_for_descriptor(&descriptor);
        let json_bytes = serde_json::to_vec(&descriptor).unwrap();
        assert_ne!(bincode_bytes, json_bytes);
    }

    #[test]
    fn descriptor_bincode_round_trip() {
        let descriptor = Descriptor::Output(OutputSpec::new(
            LogicalId::new("Export").unwrap(),
            "region",
            ValueRef::literal("eu-west-1"),
        ));
        let bytes = canonical_bytes_for_descriptor(&descriptor);
        let decoded: Descriptor = bincode::deserialize(&bytes).expect("round-trip deserialize");
        assert_eq!(descriptor, decoded);
    }

    #[test]
    fn hex_digest_is_64_chars() {
        assert_eq!(hex_digest(&[table("Users")]).len(), 64);
    }
}
