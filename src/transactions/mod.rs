//! Transaction records and the durable transaction store
//!
//! Transactions are heterogeneous clinical events; the structured fields are
//! fixed and the payload is an opaque string-keyed map the Context Engine
//! walks recursively. The store is a durable keyed map with filtered listing
//! for the read path and an upsert for ingestion.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::warn;

use crate::storage::FileStore;
use crate::types::{LedgerError, Result};

const STORE_FILE: &str = "transactions.json";

pub const STATUS_PENDING: &str = "pending";

/// A signed clinical event as admitted to the ledger.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    /// Globally unique id, caller-supplied or server-generated
    pub id: String,
    /// Free-form type tag ("Emergency Record", "Prescription", ...)
    #[serde(rename = "type")]
    pub record_type: String,
    /// Mempool tier assigned at admission
    pub tier: u8,
    /// Final priority in [0, 1]
    pub priority: f64,
    /// Opaque clinical payload
    pub payload: serde_json::Map<String, Value>,
    pub signature: String,
    /// RFC 3339 creation timestamp
    pub created_at: String,
}

/// Stored projection of a transaction: the event plus its ledger lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    #[serde(flatten)]
    pub transaction: Transaction,
    pub status: String,
    /// Set once the chain layer includes the transaction in a block
    pub block_hash: Option<String>,
}

/// AND-composed filters for the read path.
#[derive(Debug, Default, Clone)]
pub struct TransactionFilter {
    pub patient_id: Option<String>,
    pub record_type: Option<String>,
    /// Tier label filter ("Tier-1" .. "Tier-3")
    pub tier: Option<u8>,
    pub status: Option<String>,
    pub limit: Option<usize>,
}

pub const DEFAULT_LIST_LIMIT: usize = 100;
pub const MAX_LIST_LIMIT: usize = 1000;

/// Parse a "Tier-N" priority label into a tier number.
pub fn parse_tier_label(label: &str) -> Result<u8> {
    match label {
        "Tier-1" => Ok(1),
        "Tier-2" => Ok(2),
        "Tier-3" => Ok(3),
        other => Err(LedgerError::Validation(format!(
            "invalid priority label '{}', expected Tier-1, Tier-2 or Tier-3",
            other
        ))),
    }
}

/// Durable keyed map of transaction records.
pub struct TransactionStore {
    storage: FileStore,
    records: Mutex<HashMap<String, TransactionRecord>>,
}

impl TransactionStore {
    /// Load the store from disk; a corrupt document starts empty with a warning.
    pub async fn load(storage: FileStore) -> Result<Self> {
        let records = match storage.read_json::<HashMap<String, TransactionRecord>>(STORE_FILE).await
        {
            Ok(Some(map)) => map,
            Ok(None) => HashMap::new(),
            Err(e) => {
                warn!(error = %e, "transaction store unreadable, starting empty");
                HashMap::new()
            }
        };
        Ok(Self {
            storage,
            records: Mutex::new(records),
        })
    }

    /// Insert or replace a record. On persist failure the in-memory map is
    /// rolled back and the error surfaces to the caller.
    pub async fn upsert(&self, record: TransactionRecord) -> Result<()> {
        let mut records = self.records.lock().await;
        let id = record.transaction.id.clone();
        let previous = records.insert(id.clone(), record);
        if let Err(e) = self.persist(&records).await {
            match previous {
                Some(prev) => {
                    records.insert(id, prev);
                }
                None => {
                    records.remove(&id);
                }
            }
            return Err(e);
        }
        Ok(())
    }

    /// Label a committed transaction with the block hash supplied by the
    /// chain layer.
    pub async fn set_block_hash(&self, id: &str, block_hash: &str) -> Result<TransactionRecord> {
        let mut records = self.records.lock().await;
        let record = records
            .get_mut(id)
            .ok_or_else(|| LedgerError::NotFound(format!("transaction {} not found", id)))?;
        let previous = record.block_hash.clone();
        record.block_hash = Some(block_hash.to_string());
        let updated = record.clone();
        if let Err(e) = self.persist(&records).await {
            if let Some(record) = records.get_mut(id) {
                record.block_hash = previous;
            }
            return Err(e);
        }
        Ok(updated)
    }

    pub async fn get(&self, id: &str) -> Option<TransactionRecord> {
        self.records.lock().await.get(id).cloned()
    }

    /// Filtered listing, newest first, bounded by the limit cap.
    pub async fn query(&self, filter: &TransactionFilter) -> Vec<TransactionRecord> {
        let records = self.records.lock().await;
        let mut matches: Vec<TransactionRecord> = records
            .values()
            .filter(|r| Self::matches(r, filter))
            .cloned()
            .collect();
        matches.sort_by(|a, b| {
            b.transaction
                .created_at
                .cmp(&a.transaction.created_at)
                .then_with(|| a.transaction.id.cmp(&b.transaction.id))
        });
        let limit = filter
            .limit
            .unwrap_or(DEFAULT_LIST_LIMIT)
            .min(MAX_LIST_LIMIT);
        matches.truncate(limit);
        matches
    }

    /// Transactions created within the trailing window, for throughput gauges.
    pub async fn count_since(&self, window: Duration) -> usize {
        let cutoff = Utc::now() - window;
        let records = self.records.lock().await;
        records
            .values()
            .filter(|r| parsed_at(&r.transaction.created_at).map(|t| t >= cutoff).unwrap_or(false))
            .count()
    }

    /// Hourly admission counts for the trailing `hours` hours, oldest first.
    pub async fn hourly_counts(&self, hours: usize) -> Vec<u64> {
        let now = Utc::now();
        let mut buckets = vec![0u64; hours];
        let records = self.records.lock().await;
        for record in records.values() {
            let Some(created) = parsed_at(&record.transaction.created_at) else {
                continue;
            };
            let age = now - created;
            if age < Duration::zero() {
                continue;
            }
            let hours_ago = age.num_hours() as usize;
            if hours_ago < hours {
                buckets[hours - 1 - hours_ago] += 1;
            }
        }
        buckets
    }

    fn matches(record: &TransactionRecord, filter: &TransactionFilter) -> bool {
        if let Some(ref patient_id) = filter.patient_id {
            let found = record
                .transaction
                .payload
                .get("patientId")
                .and_then(Value::as_str)
                .map(|p| p == patient_id)
                .unwrap_or(false);
            if !found {
                return false;
            }
        }
        if let Some(ref record_type) = filter.record_type {
            if record.transaction.record_type != *record_type {
                return false;
            }
        }
        if let Some(tier) = filter.tier {
            if record.transaction.tier != tier {
                return false;
            }
        }
        if let Some(ref status) = filter.status {
            if record.status != *status {
                return false;
            }
        }
        true
    }

    async fn persist(&self, records: &HashMap<String, TransactionRecord>) -> Result<()> {
        self.storage.write_json(STORE_FILE, records).await
    }
}

fn parsed_at(ts: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(ts)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}
