//! Chain snapshot - read-only state supplied by the block producer
//!
//! The ledger core does not build or finalize blocks; it consumes the chain
//! state the out-of-scope block producer maintains in `chain.json` and
//! treats its figures as opaque.

use serde::{Deserialize, Serialize};

use crate::storage::FileStore;
use crate::types::Result;

const CHAIN_FILE: &str = "chain.json";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChainSnapshot {
    pub total_blocks: u64,
    pub latest_block_hash: Option<String>,
    pub network_latency_ms: u64,
    pub updated_at: Option<String>,
}

impl ChainSnapshot {
    /// Load the collaborator-owned snapshot; absent or unreadable means an
    /// empty chain.
    pub async fn load(storage: &FileStore) -> Result<Self> {
        Ok(storage.read_json(CHAIN_FILE).await.unwrap_or_default().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_absent_chain_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStore::open(dir.path()).await.unwrap();
        let chain = ChainSnapshot::load(&storage).await.unwrap();
        assert_eq!(chain.total_blocks, 0);
        assert!(chain.latest_block_hash.is_none());
    }

    #[tokio::test]
    async fn test_load_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStore::open(dir.path()).await.unwrap();
        storage
            .write_json(
                "chain.json",
                &serde_json::json!({
                    "totalBlocks": 1204,
                    "latestBlockHash": "0xfeed",
                    "networkLatencyMs": 87
                }),
            )
            .await
            .unwrap();

        let chain = ChainSnapshot::load(&storage).await.unwrap();
        assert_eq!(chain.total_blocks, 1204);
        assert_eq!(chain.latest_block_hash.as_deref(), Some("0xfeed"));
        assert_eq!(chain.network_latency_ms, 87);
    }
}
