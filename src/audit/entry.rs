//! Audit entry shape, canonical serialization and integrity hashing

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

use crate::types::{LedgerError, Result};

/// prevHash of the first entry in a chain.
pub const AUDIT_ROOT: &str = "AUDIT_ROOT";

/// Default channel when the caller does not supply one.
pub const CHANNEL_SYSTEM: &str = "system";

/// Canonical outcome values. The field is string-typed; other values pass
/// through as operator-defined.
pub const OUTCOME_SUCCESS: &str = "success";
pub const OUTCOME_FAILED: &str = "failed";
pub const OUTCOME_BLOCKED: &str = "blocked";

/// One recorded action. Optional fields serialize as null so a stored entry
/// reads back byte-identical through the query path.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    /// Contiguous ascending sequence assigned by the log, starting at 1
    pub sequence: u64,
    pub id: String,
    /// RFC 3339 UTC timestamp
    pub timestamp: String,
    pub action: String,
    pub actor_id: String,
    pub actor_type: String,
    pub resource: String,
    pub outcome: String,
    pub patient_id: Option<String>,
    pub ip_address: Option<String>,
    pub block_hash: Option<String>,
    pub details: Option<String>,
    pub metadata: Map<String, Value>,
    pub tags: Vec<String>,
    pub channel: String,
    pub prev_hash: String,
    pub integrity_hash: String,
}

/// Caller-supplied fields for a new entry. Sequence, hashes and timestamp are
/// assigned by the log.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditInput {
    pub action: String,
    pub actor_id: String,
    pub actor_type: String,
    pub resource: String,
    pub outcome: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub patient_id: Option<String>,
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub block_hash: Option<String>,
    #[serde(default)]
    pub details: Option<String>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub channel: Option<String>,
}

impl AuditInput {
    /// Required fields must be present and non-empty.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("action", &self.action),
            ("actorId", &self.actor_id),
            ("actorType", &self.actor_type),
            ("resource", &self.resource),
            ("outcome", &self.outcome),
        ] {
            if value.trim().is_empty() {
                return Err(LedgerError::Validation(format!(
                    "audit entry is missing required field '{}'",
                    name
                )));
            }
        }
        Ok(())
    }
}

/// Stable serialization: objects re-emitted with keys sorted recursively,
/// no insignificant whitespace. Absent optionals must already be nulls in
/// the supplied value; nothing is elided.
pub fn canonical_json(value: &Value) -> String {
    serde_json::to_string(&normalize(value)).expect("normalized JSON value always serializes")
}

fn normalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<&String, Value> =
                map.iter().map(|(k, v)| (k, normalize(v))).collect();
            let mut out = Map::new();
            for (k, v) in sorted {
                out.insert(k.clone(), v);
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(normalize).collect()),
        other => other.clone(),
    }
}

/// SHA-256 over the canonical JSON of the hashed envelope. The envelope is
/// the full entry minus `id` and `integrityHash` itself.
pub fn compute_integrity_hash(entry: &AuditEntry) -> String {
    let envelope = json!({
        "prevHash": entry.prev_hash,
        "sequence": entry.sequence,
        "timestamp": entry.timestamp,
        "action": entry.action,
        "actorId": entry.actor_id,
        "actorType": entry.actor_type,
        "resource": entry.resource,
        "outcome": entry.outcome,
        "patientId": entry.patient_id,
        "ipAddress": entry.ip_address,
        "blockHash": entry.block_hash,
        "details": entry.details,
        "metadata": entry.metadata,
        "tags": entry.tags,
        "channel": entry.channel,
    });
    let canonical = canonical_json(&envelope);
    hex::encode(Sha256::digest(canonical.as_bytes()))
}
