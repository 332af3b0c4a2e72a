//! File-backed durable storage
//!
//! One deployment serves one logical network rooted at `DATA_ROOT`:
//!
//! ```text
//! <data_root>/
//!   audit/audit-log.ndjson     append-only audit entries, one JSON per line
//!   audit/audit-log-<ts>.ndjson rotated archives
//!   mempool.json               persisted mempool snapshot
//!   wallets.json               wallet registry
//!   nonces.json                active challenge nonces
//!   transactions.json          transaction store
//!   chain.json                 chain snapshot (written by the block producer)
//!   reference/*.json           read-only directory inputs
//! ```
//!
//! JSON documents are written atomically (temp file + rename) so a crash
//! mid-write never leaves a truncated document behind. The audit log is the
//! only append-mode file.

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::types::{LedgerError, Result};

const AUDIT_DIR: &str = "audit";
const AUDIT_LOG_FILE: &str = "audit-log.ndjson";

/// Handle to the data root; cheap to clone.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Open (creating directories as needed) the store rooted at `root`.
    pub async fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        tokio::fs::create_dir_all(root.join(AUDIT_DIR)).await?;
        tokio::fs::create_dir_all(root.join("reference")).await?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn audit_log_path(&self) -> PathBuf {
        self.root.join(AUDIT_DIR).join(AUDIT_LOG_FILE)
    }

    /// Read a JSON document; absent file yields `None`.
    pub async fn read_json<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>> {
        let path = self.root.join(name);
        let bytes = match tokio::fs::read(&path).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let value = serde_json::from_slice(&bytes)
            .map_err(|e| LedgerError::Storage(format!("corrupt document {}: {}", name, e)))?;
        Ok(Some(value))
    }

    /// Atomically replace a JSON document.
    pub async fn write_json<T: Serialize>(&self, name: &str, value: &T) -> Result<()> {
        let path = self.root.join(name);
        let tmp = self.root.join(format!("{}.tmp", name));
        if let Some(parent) = tmp.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let bytes = serde_json::to_vec_pretty(value)?;
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(&bytes).await?;
        file.sync_all().await?;
        tokio::fs::rename(&tmp, &path).await?;
        debug!(document = name, bytes = bytes.len(), "persisted document");
        Ok(())
    }

    /// Append one line to the audit log, fsynced before returning.
    pub async fn append_audit_line(&self, line: &str) -> Result<()> {
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.audit_log_path())
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.write_all(b"\n").await?;
        file.sync_all().await?;
        Ok(())
    }

    /// Read every non-empty line of the audit log in order.
    pub async fn read_audit_lines(&self) -> Result<Vec<String>> {
        let path = self.audit_log_path();
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        Ok(content
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| l.to_string())
            .collect())
    }

    /// Current size of the audit log in bytes (0 when absent).
    pub async fn audit_log_size(&self) -> Result<u64> {
        match tokio::fs::metadata(self.audit_log_path()).await {
            Ok(m) => Ok(m.len()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    /// Move the current audit log aside to a timestamped archive and start
    /// a fresh file. Returns the archive path, or `None` when there was no
    /// log to rotate.
    pub async fn rotate_audit_log(&self, stamp: &str) -> Result<Option<PathBuf>> {
        let path = self.audit_log_path();
        if tokio::fs::metadata(&path).await.is_err() {
            return Ok(None);
        }
        let archive = self
            .root
            .join(AUDIT_DIR)
            .join(format!("audit-log-{}.ndjson", stamp));
        tokio::fs::rename(&path, &archive).await?;
        Ok(Some(archive))
    }

    /// Atomically replace the audit log contents (retention pruning).
    pub async fn rewrite_audit_log(&self, lines: &[String]) -> Result<()> {
        let path = self.audit_log_path();
        let tmp = self.root.join(AUDIT_DIR).join("audit-log.ndjson.tmp");
        let mut body = lines.join("\n");
        if !body.is_empty() {
            body.push('\n');
        }
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(body.as_bytes()).await?;
        file.sync_all().await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Doc {
        name: String,
        count: u32,
    }

    #[tokio::test]
    async fn test_json_roundtrip_and_absent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).await.unwrap();

        assert!(store.read_json::<Doc>("missing.json").await.unwrap().is_none());

        let doc = Doc { name: "tier".into(), count: 3 };
        store.write_json("doc.json", &doc).await.unwrap();
        let back: Doc = store.read_json("doc.json").await.unwrap().unwrap();
        assert_eq!(back, doc);
    }

    #[tokio::test]
    async fn test_corrupt_document_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).await.unwrap();
        tokio::fs::write(dir.path().join("doc.json"), b"{nope")
            .await
            .unwrap();
        assert!(store.read_json::<Doc>("doc.json").await.is_err());
    }

    #[tokio::test]
    async fn test_audit_append_read_rotate() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).await.unwrap();

        assert_eq!(store.audit_log_size().await.unwrap(), 0);
        store.append_audit_line("{\"sequence\":1}").await.unwrap();
        store.append_audit_line("{\"sequence\":2}").await.unwrap();

        let lines = store.read_audit_lines().await.unwrap();
        assert_eq!(lines.len(), 2);
        assert!(store.audit_log_size().await.unwrap() > 0);

        let archive = store.rotate_audit_log("20250101T000000Z").await.unwrap();
        assert!(archive.is_some());
        assert_eq!(store.read_audit_lines().await.unwrap().len(), 0);

        // Rotating an absent log is a no-op
        assert!(store.rotate_audit_log("again").await.unwrap().is_none());
    }
}
