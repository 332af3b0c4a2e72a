//! Append-only audit log
//!
//! Every operator and system action is recorded as an entry whose integrity
//! hash binds the previous entry's hash, producing a tamper-evident chain:
//!
//! - entry 1 carries `prevHash = "AUDIT_ROOT"`
//! - entry N carries `prevHash = entry[N-1].integrityHash`
//! - `integrityHash = SHA-256(canonical JSON of the hashed envelope)`
//!
//! The log lives as newline-delimited JSON on disk. Appends are strictly
//! serialized; queries read the full log and never block appends for long.

mod entry;
mod log;
mod query;

pub use entry::{
    canonical_json, compute_integrity_hash, AuditEntry, AuditInput, AUDIT_ROOT, CHANNEL_SYSTEM,
    OUTCOME_BLOCKED, OUTCOME_FAILED, OUTCOME_SUCCESS,
};
pub use log::{spawn_audit_sweep_task, AuditConfig, AuditLog};
pub use query::{AuditQuery, AuditQueryResult, Direction};
