//! Challenge nonce store
//!
//! At most one active nonce per normalized address, time-bounded and
//! single-use. Records are removed on successful verification and by a
//! periodic expiry sweep.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::storage::FileStore;
use crate::types::Result;
use crate::wallet::registry::WalletFamily;

const NONCE_FILE: &str = "nonces.json";

/// One issued challenge.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NonceRecord {
    pub address: String,
    pub normalized_address: String,
    pub nonce: String,
    pub message: String,
    pub family: WalletFamily,
    pub issued_at: String,
    pub expires_at: String,
    pub context: Option<serde_json::Map<String, Value>>,
}

impl NonceRecord {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        DateTime::parse_from_rfc3339(&self.expires_at)
            .map(|t| t.with_timezone(&Utc) <= now)
            .unwrap_or(true)
    }
}

/// Durable nonce store keyed by normalized address. All writes go through
/// one lock, which also serializes reads during verification so a nonce can
/// never be consumed twice.
pub struct NonceStore {
    storage: FileStore,
    records: Mutex<HashMap<String, NonceRecord>>,
}

impl NonceStore {
    pub async fn load(storage: FileStore) -> Result<Self> {
        let records = match storage.read_json::<HashMap<String, NonceRecord>>(NONCE_FILE).await {
            Ok(Some(map)) => map,
            Ok(None) => HashMap::new(),
            Err(e) => {
                warn!(error = %e, "nonce store unreadable, starting empty");
                HashMap::new()
            }
        };
        Ok(Self {
            storage,
            records: Mutex::new(records),
        })
    }

    /// Store a fresh challenge, replacing any active nonce for the address.
    pub async fn issue(&self, record: NonceRecord) -> Result<()> {
        let mut records = self.records.lock().await;
        let key = record.normalized_address.clone();
        let previous = records.insert(key.clone(), record);
        if let Err(e) = self.persist(&records).await {
            match previous {
                Some(prev) => {
                    records.insert(key, prev);
                }
                None => {
                    records.remove(&key);
                }
            }
            return Err(e);
        }
        Ok(())
    }

    /// The active nonce for an address, if any.
    pub async fn peek(&self, normalized_address: &str) -> Option<NonceRecord> {
        self.records.lock().await.get(normalized_address).cloned()
    }

    /// Remove a consumed or expired nonce; removal is atomic with
    /// persistence.
    pub async fn remove(&self, normalized_address: &str) -> Result<Option<NonceRecord>> {
        let mut records = self.records.lock().await;
        let removed = records.remove(normalized_address);
        if removed.is_none() {
            return Ok(None);
        }
        if let Err(e) = self.persist(&records).await {
            records.insert(
                normalized_address.to_string(),
                removed.clone().expect("removed is some"),
            );
            return Err(e);
        }
        Ok(removed)
    }

    /// Drop every expired record. Returns the number removed.
    pub async fn sweep_expired(&self) -> Result<usize> {
        let now = Utc::now();
        let mut records = self.records.lock().await;
        let before = records.len();
        let saved = records.clone();
        records.retain(|_, r| !r.is_expired(now));
        let removed = before - records.len();
        if removed == 0 {
            return Ok(0);
        }
        if let Err(e) = self.persist(&records).await {
            *records = saved;
            return Err(e);
        }
        Ok(removed)
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    async fn persist(&self, records: &HashMap<String, NonceRecord>) -> Result<()> {
        self.storage.write_json(NONCE_FILE, records).await
    }
}

/// Background expiry sweep; best-effort, logs and continues on failure.
pub fn spawn_nonce_sweep_task(store: Arc<NonceStore>, interval: Duration) {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(interval).await;
            match store.sweep_expired().await {
                Ok(0) => {}
                Ok(removed) => debug!(removed, "nonce sweep removed expired challenges"),
                Err(e) => warn!(error = %e, "nonce sweep failed"),
            }
        }
    });
    info!("nonce sweep task started");
}
