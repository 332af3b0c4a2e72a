//! Audit log tail management, appends, retention and rotation

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::storage::FileStore;
use crate::types::Result;

use super::entry::{compute_integrity_hash, AuditEntry, AuditInput, AUDIT_ROOT, CHANNEL_SYSTEM};
use super::query::{AuditQuery, AuditQueryResult};

/// Retention and rotation policy. Zero disables either policy.
#[derive(Debug, Clone, Copy, Default)]
pub struct AuditConfig {
    pub retention_days: u32,
    pub max_log_bytes: u64,
}

/// Process-level chain tail, owned by the log and rehydrated from storage.
#[derive(Debug, Clone)]
struct Tail {
    next_sequence: u64,
    last_integrity_hash: String,
}

/// The append-only, hash-chained audit log.
pub struct AuditLog {
    storage: FileStore,
    config: AuditConfig,
    tail: Mutex<Tail>,
}

impl AuditLog {
    /// Open the log, rehydrating the tail from the durable file. A chain
    /// break on reload resets the tail to the last valid entry's hash with a
    /// warning; committed entries are never truncated.
    pub async fn open(storage: FileStore, config: AuditConfig) -> Result<Self> {
        let entries = Self::parse_entries(&storage.read_audit_lines().await?);
        let tail = Self::tail_from_entries(&entries);
        Ok(Self {
            storage,
            config,
            tail: Mutex::new(tail),
        })
    }

    fn tail_from_entries(entries: &[AuditEntry]) -> Tail {
        let mut expected_prev = AUDIT_ROOT.to_string();
        let mut last_valid_hash = AUDIT_ROOT.to_string();
        let mut broken = false;

        for entry in entries {
            if entry.prev_hash != expected_prev
                || compute_integrity_hash(entry) != entry.integrity_hash
            {
                broken = true;
                break;
            }
            last_valid_hash = entry.integrity_hash.clone();
            expected_prev = entry.integrity_hash.clone();
        }

        if broken {
            warn!(
                last_valid_hash = %last_valid_hash,
                "audit chain broken on reload; resetting tail to last valid entry"
            );
        }

        let next_sequence = entries.last().map(|e| e.sequence + 1).unwrap_or(1);
        Tail {
            next_sequence,
            last_integrity_hash: last_valid_hash,
        }
    }

    fn parse_entries(lines: &[String]) -> Vec<AuditEntry> {
        lines
            .iter()
            .filter_map(|line| match serde_json::from_str::<AuditEntry>(line) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!(error = %e, "skipping unparseable audit line");
                    None
                }
            })
            .collect()
    }

    /// Validate, chain, hash and durably append one entry. The in-memory
    /// tail advances only after the write returns, so appends are strictly
    /// serialized and a cancelled write loses the attempt, never the chain.
    pub async fn record(&self, input: AuditInput) -> Result<AuditEntry> {
        input.validate()?;

        let mut tail = self.tail.lock().await;

        if self.config.max_log_bytes > 0 {
            if let Err(e) = self.maybe_rotate().await {
                warn!(error = %e, "audit log rotation failed, continuing on current file");
            }
        }

        let mut entry = AuditEntry {
            sequence: tail.next_sequence,
            id: input.id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            timestamp: Utc::now().to_rfc3339(),
            action: input.action,
            actor_id: input.actor_id,
            actor_type: input.actor_type,
            resource: input.resource,
            outcome: input.outcome,
            patient_id: input.patient_id,
            ip_address: input.ip_address,
            block_hash: input.block_hash,
            details: input.details,
            metadata: input.metadata,
            tags: input.tags,
            channel: input.channel.unwrap_or_else(|| CHANNEL_SYSTEM.to_string()),
            prev_hash: tail.last_integrity_hash.clone(),
            integrity_hash: String::new(),
        };
        entry.integrity_hash = compute_integrity_hash(&entry);

        let line = serde_json::to_string(&entry)?;
        self.storage.append_audit_line(&line).await?;

        tail.next_sequence += 1;
        tail.last_integrity_hash = entry.integrity_hash.clone();

        debug!(sequence = entry.sequence, action = %entry.action, "audit entry appended");
        Ok(entry)
    }

    /// Paginated, filtered scan over the full log.
    pub async fn query(&self, query: &AuditQuery) -> Result<AuditQueryResult> {
        let entries = Self::parse_entries(&self.storage.read_audit_lines().await?);
        Ok(query.run(entries))
    }

    /// Filtered CSV export with the fixed column set.
    pub async fn export_csv(&self, query: &AuditQuery) -> Result<String> {
        let entries = Self::parse_entries(&self.storage.read_audit_lines().await?);
        Ok(super::query::to_csv(&query.filter_all(entries)))
    }

    /// Prune entries older than the retention window and reset the tail from
    /// the rewritten file. Hashes of surviving entries are untouched.
    /// Returns the number of pruned entries.
    pub async fn sweep_retention(&self) -> Result<usize> {
        if self.config.retention_days == 0 {
            return Ok(0);
        }
        let cutoff = Utc::now() - chrono::Duration::days(self.config.retention_days as i64);

        let mut tail = self.tail.lock().await;
        let lines = self.storage.read_audit_lines().await?;
        let entries = Self::parse_entries(&lines);
        let keep: Vec<String> = entries
            .iter()
            .filter(|e| {
                chrono::DateTime::parse_from_rfc3339(&e.timestamp)
                    .map(|t| t.with_timezone(&Utc) >= cutoff)
                    .unwrap_or(true)
            })
            .map(|e| serde_json::to_string(e))
            .collect::<std::result::Result<_, _>>()?;

        let pruned = entries.len() - keep.len();
        if pruned == 0 {
            return Ok(0);
        }

        self.storage.rewrite_audit_log(&keep).await?;
        let remaining = Self::parse_entries(&keep);
        let next_sequence = tail.next_sequence;
        *tail = Self::tail_from_retained(&remaining, next_sequence);

        info!(pruned, "audit retention sweep complete");
        Ok(pruned)
    }

    /// Tail after a retention rewrite: the chain continues from the last
    /// surviving entry (its prevHash now points outside the file, which is
    /// expected; pruning never rewrites hashes). Sequence numbering is
    /// preserved.
    fn tail_from_retained(entries: &[AuditEntry], next_sequence: u64) -> Tail {
        Tail {
            next_sequence,
            last_integrity_hash: entries
                .last()
                .map(|e| e.integrity_hash.clone())
                .unwrap_or_else(|| AUDIT_ROOT.to_string()),
        }
    }

    /// Rotate the log file to a timestamped archive once it exceeds the byte
    /// budget. Sequence numbering and the hash chain continue into the fresh
    /// file. Callers hold the tail lock.
    async fn maybe_rotate(&self) -> Result<()> {
        let size = self.storage.audit_log_size().await?;
        if size <= self.config.max_log_bytes {
            return Ok(());
        }
        let stamp = Utc::now().format("%Y%m%dT%H%M%S%3fZ").to_string();
        if let Some(archive) = self.storage.rotate_audit_log(&stamp).await? {
            info!(archive = %archive.display(), size, "audit log rotated");
        }
        Ok(())
    }

    /// Current chain head hash, primarily for health reporting and tests.
    pub async fn last_integrity_hash(&self) -> String {
        self.tail.lock().await.last_integrity_hash.clone()
    }
}

/// Background retention/rotation sweep. Best-effort: failures are logged and
/// the loop continues.
pub fn spawn_audit_sweep_task(log: Arc<AuditLog>, interval: Duration) {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(interval).await;
            match log.sweep_retention().await {
                Ok(0) => {}
                Ok(pruned) => debug!(pruned, "audit sweep pruned entries"),
                Err(e) => warn!(error = %e, "audit retention sweep failed"),
            }
        }
    });
    info!("audit sweep task started");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::entry::OUTCOME_SUCCESS;

    fn input(action: &str) -> AuditInput {
        AuditInput {
            action: action.to_string(),
            actor_id: "system".to_string(),
            actor_type: "system".to_string(),
            resource: "ledger".to_string(),
            outcome: OUTCOME_SUCCESS.to_string(),
            ..AuditInput::default()
        }
    }

    async fn open_log(dir: &tempfile::TempDir) -> AuditLog {
        let storage = FileStore::open(dir.path()).await.unwrap();
        AuditLog::open(storage, AuditConfig::default()).await.unwrap()
    }

    #[tokio::test]
    async fn test_chain_construction() {
        let dir = tempfile::tempdir().unwrap();
        let log = open_log(&dir).await;

        let e1 = log.record(input("node.start")).await.unwrap();
        let e2 = log.record(input("transaction.submitted")).await.unwrap();
        let e3 = log.record(input("wallet.verify")).await.unwrap();

        assert_eq!((e1.sequence, e2.sequence, e3.sequence), (1, 2, 3));
        assert_eq!(e1.prev_hash, AUDIT_ROOT);
        assert_eq!(e2.prev_hash, e1.integrity_hash);
        assert_eq!(e3.prev_hash, e2.integrity_hash);

        for entry in [&e1, &e2, &e3] {
            assert_eq!(compute_integrity_hash(entry), entry.integrity_hash);
        }
    }

    #[tokio::test]
    async fn test_missing_required_field_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let log = open_log(&dir).await;

        let mut bad = input("x");
        bad.outcome = String::new();
        assert!(log.record(bad).await.is_err());

        // The rejection did not advance the chain.
        let ok = log.record(input("node.start")).await.unwrap();
        assert_eq!(ok.sequence, 1);
    }

    #[tokio::test]
    async fn test_tail_rehydrates_across_restart() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStore::open(dir.path()).await.unwrap();

        let last_hash;
        {
            let log = AuditLog::open(storage.clone(), AuditConfig::default())
                .await
                .unwrap();
            log.record(input("one")).await.unwrap();
            last_hash = log.record(input("two")).await.unwrap().integrity_hash;
        }

        let log = AuditLog::open(storage, AuditConfig::default()).await.unwrap();
        let e3 = log.record(input("three")).await.unwrap();
        assert_eq!(e3.sequence, 3);
        assert_eq!(e3.prev_hash, last_hash);
    }

    #[tokio::test]
    async fn test_corrupt_tail_resets_to_last_valid_hash() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStore::open(dir.path()).await.unwrap();

        let good_hash;
        {
            let log = AuditLog::open(storage.clone(), AuditConfig::default())
                .await
                .unwrap();
            good_hash = log.record(input("one")).await.unwrap().integrity_hash;
            let tampered = log.record(input("two")).await.unwrap();
            // Rewrite entry 2 with a forged outcome, breaking its hash.
            let mut forged = tampered.clone();
            forged.outcome = "blocked".to_string();
            let mut rewritten = storage.read_audit_lines().await.unwrap();
            rewritten[1] = serde_json::to_string(&forged).unwrap();
            storage.rewrite_audit_log(&rewritten).await.unwrap();
        }

        let log = AuditLog::open(storage, AuditConfig::default()).await.unwrap();
        // Sequence continues past all committed entries, but the chain tail
        // points at the last valid entry.
        assert_eq!(log.last_integrity_hash().await, good_hash);
        let next = log.record(input("three")).await.unwrap();
        assert_eq!(next.sequence, 3);
        assert_eq!(next.prev_hash, good_hash);
    }

    #[tokio::test]
    async fn test_rotation_preserves_chain() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStore::open(dir.path()).await.unwrap();
        let log = AuditLog::open(
            storage.clone(),
            AuditConfig {
                retention_days: 0,
                max_log_bytes: 1,
            },
        )
        .await
        .unwrap();

        let e1 = log.record(input("one")).await.unwrap();
        // The first append exceeded the one-byte budget, so this append
        // rotates first and continues the chain in a fresh file.
        let e2 = log.record(input("two")).await.unwrap();
        assert_eq!(e2.sequence, 2);
        assert_eq!(e2.prev_hash, e1.integrity_hash);

        let current = storage.read_audit_lines().await.unwrap();
        assert_eq!(current.len(), 1);
    }

    #[tokio::test]
    async fn test_retention_prunes_old_entries() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStore::open(dir.path()).await.unwrap();
        let log = AuditLog::open(
            storage.clone(),
            AuditConfig {
                retention_days: 30,
                max_log_bytes: 0,
            },
        )
        .await
        .unwrap();

        let old = log.record(input("old")).await.unwrap();
        let fresh = log.record(input("fresh")).await.unwrap();

        // Backdate the first entry on disk without touching its hashes.
        let mut aged = old.clone();
        aged.timestamp = "2020-01-01T00:00:00Z".to_string();
        let lines = vec![
            serde_json::to_string(&aged).unwrap(),
            serde_json::to_string(&fresh).unwrap(),
        ];
        storage.rewrite_audit_log(&lines).await.unwrap();

        let pruned = log.sweep_retention().await.unwrap();
        assert_eq!(pruned, 1);

        let remaining = storage.read_audit_lines().await.unwrap();
        assert_eq!(remaining.len(), 1);
        // Surviving entry is byte-identical; its hash was not rewritten.
        let survivor: AuditEntry = serde_json::from_str(&remaining[0]).unwrap();
        assert_eq!(survivor, fresh);

        // Sequence numbering continues.
        let next = log.record(input("next")).await.unwrap();
        assert_eq!(next.sequence, 3);
        assert_eq!(next.prev_hash, fresh.integrity_hash);
    }
}
