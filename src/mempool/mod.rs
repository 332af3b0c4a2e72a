//! Tiered Mempool - bounded priority queues for pending transactions
//!
//! Three tiers with fixed capacities (100 / 2000 / 8000), each kept sorted by
//! priority descending. Every mutation persists the snapshot; on persist
//! failure the in-memory change is rolled back so a crashed or cancelled
//! request never leaves memory ahead of disk.

mod pool;

pub use pool::{Admission, TieredMempool, TIER_CAPACITIES};

use serde::{Deserialize, Serialize};

use crate::context::PriorityBreakdown;
use crate::transactions::Transaction;

/// A transaction resident in the mempool with its admission metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MempoolEntry {
    pub transaction: Transaction,
    pub tier: u8,
    pub priority: f64,
    pub breakdown: PriorityBreakdown,
    pub admitted_at: String,
}

/// The durable projection of mempool state: the three tier queues, each
/// sorted by priority descending.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MempoolSnapshot {
    pub tier1: Vec<MempoolEntry>,
    pub tier2: Vec<MempoolEntry>,
    pub tier3: Vec<MempoolEntry>,
}

/// Occupancy and priority aggregates, plus the validator counts the caller
/// passes in from the reference directory.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MempoolStats {
    pub tier_sizes: [usize; 3],
    pub tier_capacities: [usize; 3],
    pub total_size: usize,
    pub total_capacity: usize,
    pub validators_online: usize,
    pub validators_total: usize,
    pub min_priority: f64,
    pub avg_priority: f64,
    pub max_priority: f64,
}
