//! Mempool tier queues and persistence

use std::cmp::Ordering;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::context::PriorityBreakdown;
use crate::storage::FileStore;
use crate::transactions::Transaction;
use crate::types::{LedgerError, Result};

use super::{MempoolEntry, MempoolSnapshot, MempoolStats};

const SNAPSHOT_FILE: &str = "mempool.json";

/// Fixed per-tier capacities.
pub const TIER_CAPACITIES: [usize; 3] = [100, 2000, 8000];

const TIER1_PRIORITY: f64 = 0.85;
const TIER2_PRIORITY: f64 = 0.60;

/// Outcome of an admission: the tier the entry landed in and whichever entry
/// (possibly the new one) was evicted to keep the tier at capacity.
#[derive(Debug, Clone)]
pub struct Admission {
    pub entry: MempoolEntry,
    pub tier: u8,
    pub evicted: Option<MempoolEntry>,
}

/// In-memory tier queues, single writer, persisted on every mutation.
pub struct TieredMempool {
    storage: FileStore,
    tiers: Mutex<[Vec<MempoolEntry>; 3]>,
}

impl TieredMempool {
    /// Load the persisted snapshot. A corrupt or absent snapshot starts the
    /// mempool empty and writes a fresh one.
    pub async fn load(storage: FileStore) -> Result<Self> {
        let tiers = match storage.read_json::<MempoolSnapshot>(SNAPSHOT_FILE).await {
            Ok(Some(snapshot)) => [snapshot.tier1, snapshot.tier2, snapshot.tier3],
            Ok(None) => {
                storage
                    .write_json(SNAPSHOT_FILE, &MempoolSnapshot::default())
                    .await?;
                Default::default()
            }
            Err(e) => {
                warn!(error = %e, "mempool snapshot unreadable, starting empty");
                storage
                    .write_json(SNAPSHOT_FILE, &MempoolSnapshot::default())
                    .await?;
                Default::default()
            }
        };
        Ok(Self {
            storage,
            tiers: Mutex::new(tiers),
        })
    }

    /// Tier implied by the final priority and the caller-supplied hint.
    /// Priority thresholds are authoritative; a hint can only promote within
    /// the band below them.
    pub fn select_tier(priority: f64, hint: Option<u8>) -> u8 {
        if hint == Some(1) || priority >= TIER1_PRIORITY {
            1
        } else if hint == Some(2) || priority >= TIER2_PRIORITY {
            2
        } else {
            3
        }
    }

    /// Admit a transaction. Fills in the transaction's tier and priority from
    /// the breakdown, enforces tier capacity, returns the admission outcome
    /// together with any evicted entry.
    pub async fn add(
        &self,
        mut transaction: Transaction,
        breakdown: PriorityBreakdown,
        hint: Option<u8>,
    ) -> Result<Admission> {
        let tier = Self::select_tier(breakdown.priority, hint);
        transaction.tier = tier;
        transaction.priority = breakdown.priority;

        let entry = MempoolEntry {
            tier,
            priority: breakdown.priority,
            breakdown,
            admitted_at: Utc::now().to_rfc3339(),
            transaction,
        };

        let mut tiers = self.tiers.lock().await;

        let id = entry.transaction.id.clone();
        if tiers.iter().flatten().any(|e| e.transaction.id == id) {
            return Err(LedgerError::Validation(format!(
                "transaction {} is already in the mempool",
                id
            )));
        }

        let queue = &mut tiers[(tier - 1) as usize];
        let saved = queue.clone();
        queue.push(entry.clone());
        queue.sort_by(compare_priority_desc);
        let evicted = if queue.len() > TIER_CAPACITIES[(tier - 1) as usize] {
            queue.pop()
        } else {
            None
        };

        if let Err(e) = self.persist(&tiers).await {
            tiers[(tier - 1) as usize] = saved;
            return Err(e);
        }

        debug!(id = %id, tier, priority = entry.priority, evicted = evicted.is_some(), "admitted transaction");
        Ok(Admission { entry, tier, evicted })
    }

    /// Remove the first entry matching `id` across tiers.
    pub async fn remove_by_id(&self, id: &str) -> Result<Option<MempoolEntry>> {
        let mut tiers = self.tiers.lock().await;
        for tier_idx in 0..3 {
            if let Some(pos) = tiers[tier_idx].iter().position(|e| e.transaction.id == id) {
                let removed = tiers[tier_idx].remove(pos);
                if let Err(e) = self.persist(&tiers).await {
                    tiers[tier_idx].insert(pos, removed);
                    return Err(e);
                }
                return Ok(Some(removed));
            }
        }
        Ok(None)
    }

    /// Remove many entries, persisting once at the end.
    pub async fn flush(&self, ids: &[String]) -> Result<usize> {
        let mut tiers = self.tiers.lock().await;
        let saved = tiers.clone();
        let mut removed = 0usize;
        for queue in tiers.iter_mut() {
            let before = queue.len();
            queue.retain(|e| !ids.contains(&e.transaction.id));
            removed += before - queue.len();
        }
        if removed == 0 {
            return Ok(0);
        }
        if let Err(e) = self.persist(&tiers).await {
            *tiers = saved;
            return Err(e);
        }
        Ok(removed)
    }

    /// Top `limit` transactions of a tier in priority order.
    pub async fn by_tier(&self, tier: u8, limit: usize) -> Result<Vec<Transaction>> {
        if !(1..=3).contains(&tier) {
            return Err(LedgerError::Validation(format!("invalid tier {}", tier)));
        }
        let tiers = self.tiers.lock().await;
        Ok(tiers[(tier - 1) as usize]
            .iter()
            .take(limit)
            .map(|e| e.transaction.clone())
            .collect())
    }

    /// Current occupancy plus the validator counts supplied by the caller.
    pub async fn stats(&self, validators_online: usize, validators_total: usize) -> MempoolStats {
        let tiers = self.tiers.lock().await;
        let tier_sizes = [tiers[0].len(), tiers[1].len(), tiers[2].len()];
        let total_size = tier_sizes.iter().sum();

        let priorities: Vec<f64> = tiers.iter().flatten().map(|e| e.priority).collect();
        let (min_priority, avg_priority, max_priority) = if priorities.is_empty() {
            (0.0, 0.0, 0.0)
        } else {
            let sum: f64 = priorities.iter().sum();
            (
                priorities.iter().cloned().fold(f64::INFINITY, f64::min),
                sum / priorities.len() as f64,
                priorities.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
            )
        };

        MempoolStats {
            tier_sizes,
            tier_capacities: TIER_CAPACITIES,
            total_size,
            total_capacity: TIER_CAPACITIES.iter().sum(),
            validators_online,
            validators_total,
            min_priority,
            avg_priority,
            max_priority,
        }
    }

    /// A read-only copy of the three queues.
    pub async fn snapshot(&self) -> MempoolSnapshot {
        let tiers = self.tiers.lock().await;
        MempoolSnapshot {
            tier1: tiers[0].clone(),
            tier2: tiers[1].clone(),
            tier3: tiers[2].clone(),
        }
    }

    async fn persist(&self, tiers: &[Vec<MempoolEntry>; 3]) -> Result<()> {
        let snapshot = MempoolSnapshot {
            tier1: tiers[0].clone(),
            tier2: tiers[1].clone(),
            tier3: tiers[2].clone(),
        };
        self.storage.write_json(SNAPSHOT_FILE, &snapshot).await
    }
}

/// Priority descending; stable, so equal priorities keep admission order.
fn compare_priority_desc(a: &MempoolEntry, b: &MempoolEntry) -> Ordering {
    b.priority.partial_cmp(&a.priority).unwrap_or(Ordering::Equal)
}
