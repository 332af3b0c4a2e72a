//! Wallet registry - durable keyed map from normalized address to profile

use std::collections::HashMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::storage::FileStore;
use crate::types::{LedgerError, Result};

const REGISTRY_FILE: &str = "wallets.json";

pub const DEFAULT_ROLE: &str = "clinician";

/// How a wallet's signatures are verified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WalletFamily {
    /// ECDSA-secp256k1 with address recovery (EIP-191 personal-sign)
    #[serde(rename = "external-signer")]
    ExternalSigner,
    /// Direct verification against a registered public key (ed25519/RSA-PSS)
    #[serde(rename = "custom-keypair")]
    CustomKeypair,
}

impl WalletFamily {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "external-signer" => Some(Self::ExternalSigner),
            "custom-keypair" => Some(Self::CustomKeypair),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ExternalSigner => "external-signer",
            Self::CustomKeypair => "custom-keypair",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WalletStatus {
    Active,
    Revoked,
    Suspended,
}

/// A registered wallet.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WalletProfile {
    pub id: String,
    /// Address as first presented
    pub address: String,
    /// Lowercased, trimmed; unique across the registry
    pub normalized_address: String,
    pub family: WalletFamily,
    pub label: Option<String>,
    /// Required for custom-keypair wallets
    pub public_key: Option<String>,
    pub metadata: serde_json::Map<String, Value>,
    pub roles: Vec<String>,
    pub status: WalletStatus,
    pub created_at: String,
    pub updated_at: String,
    pub last_seen_at: Option<String>,
}

/// Registration input; `register` is idempotent by normalized address.
#[derive(Debug, Clone)]
pub struct RegisterWallet {
    pub address: String,
    pub family: WalletFamily,
    pub label: Option<String>,
    pub public_key: Option<String>,
    pub metadata: serde_json::Map<String, Value>,
}

/// Lowercase and trim an address into its registry key form.
pub fn normalize_address(address: &str) -> String {
    address.trim().to_lowercase()
}

/// Single-writer registry persisted to `wallets.json`.
pub struct WalletRegistry {
    storage: FileStore,
    wallets: Mutex<HashMap<String, WalletProfile>>,
}

impl WalletRegistry {
    pub async fn load(storage: FileStore) -> Result<Self> {
        let wallets = match storage.read_json::<HashMap<String, WalletProfile>>(REGISTRY_FILE).await
        {
            Ok(Some(map)) => map,
            Ok(None) => HashMap::new(),
            Err(e) => {
                warn!(error = %e, "wallet registry unreadable, starting empty");
                HashMap::new()
            }
        };
        Ok(Self {
            storage,
            wallets: Mutex::new(wallets),
        })
    }

    /// Register a wallet. Idempotent: an existing profile for the normalized
    /// address is returned unchanged. Custom-keypair wallets must present a
    /// public key on first sight.
    pub async fn register(&self, input: RegisterWallet) -> Result<WalletProfile> {
        let normalized = normalize_address(&input.address);
        if normalized.is_empty() {
            return Err(LedgerError::Validation("wallet address must not be empty".into()));
        }

        let mut wallets = self.wallets.lock().await;
        if let Some(existing) = wallets.get(&normalized) {
            return Ok(existing.clone());
        }

        if input.family == WalletFamily::CustomKeypair && input.public_key.is_none() {
            return Err(LedgerError::Auth(
                "custom-keypair wallets require a public key on first registration".into(),
            ));
        }

        let now = Utc::now().to_rfc3339();
        let profile = WalletProfile {
            id: Uuid::new_v4().to_string(),
            address: input.address.trim().to_string(),
            normalized_address: normalized.clone(),
            family: input.family,
            label: input.label,
            public_key: input.public_key,
            metadata: input.metadata,
            roles: vec![DEFAULT_ROLE.to_string()],
            status: WalletStatus::Active,
            created_at: now.clone(),
            updated_at: now,
            last_seen_at: None,
        };

        wallets.insert(normalized.clone(), profile.clone());
        if let Err(e) = self.persist(&wallets).await {
            wallets.remove(&normalized);
            return Err(e);
        }

        info!(address = %profile.normalized_address, family = profile.family.as_str(), "wallet registered");
        Ok(profile)
    }

    pub async fn get(&self, address: &str) -> Option<WalletProfile> {
        let normalized = normalize_address(address);
        self.wallets.lock().await.get(&normalized).cloned()
    }

    /// Update lastSeenAt (and updatedAt) for a wallet.
    pub async fn touch(&self, address: &str) -> Result<WalletProfile> {
        let normalized = normalize_address(address);
        let mut wallets = self.wallets.lock().await;
        let wallet = wallets
            .get_mut(&normalized)
            .ok_or_else(|| LedgerError::Auth(format!("unknown wallet {}", normalized)))?;
        let saved = wallet.clone();
        let now = Utc::now().to_rfc3339();
        wallet.last_seen_at = Some(now.clone());
        wallet.updated_at = now;
        let updated = wallet.clone();
        if let Err(e) = self.persist(&wallets).await {
            wallets.insert(normalized, saved);
            return Err(e);
        }
        Ok(updated)
    }

    /// Transition a wallet among {active, revoked, suspended}.
    pub async fn set_status(&self, address: &str, status: WalletStatus) -> Result<WalletProfile> {
        let normalized = normalize_address(address);
        let mut wallets = self.wallets.lock().await;
        let wallet = wallets
            .get_mut(&normalized)
            .ok_or_else(|| LedgerError::Auth(format!("unknown wallet {}", normalized)))?;
        let saved = wallet.clone();
        wallet.status = status;
        wallet.updated_at = Utc::now().to_rfc3339();
        let updated = wallet.clone();
        if let Err(e) = self.persist(&wallets).await {
            wallets.insert(normalized, saved);
            return Err(e);
        }
        Ok(updated)
    }

    pub async fn count(&self) -> usize {
        self.wallets.lock().await.len()
    }

    async fn persist(&self, wallets: &HashMap<String, WalletProfile>) -> Result<()> {
        self.storage.write_json(REGISTRY_FILE, wallets).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(address: &str, family: WalletFamily) -> RegisterWallet {
        RegisterWallet {
            address: address.to_string(),
            family,
            label: None,
            public_key: matches!(family, WalletFamily::CustomKeypair)
                .then(|| "0x00".to_string()),
            metadata: serde_json::Map::new(),
        }
    }

    async fn registry() -> (tempfile::TempDir, WalletRegistry) {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStore::open(dir.path()).await.unwrap();
        let registry = WalletRegistry::load(storage).await.unwrap();
        (dir, registry)
    }

    #[tokio::test]
    async fn test_register_is_idempotent() {
        let (_dir, registry) = registry().await;
        let first = registry
            .register(input("0xABCDEF", WalletFamily::ExternalSigner))
            .await
            .unwrap();
        // Same address, different case and whitespace: same profile.
        let second = registry
            .register(input("  0xabcdef ", WalletFamily::ExternalSigner))
            .await
            .unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(registry.count().await, 1);
        assert_eq!(first.normalized_address, "0xabcdef");
        assert_eq!(first.roles, vec![DEFAULT_ROLE.to_string()]);
    }

    #[tokio::test]
    async fn test_custom_keypair_requires_public_key() {
        let (_dir, registry) = registry().await;
        let mut missing = input("clinic-key-1", WalletFamily::CustomKeypair);
        missing.public_key = None;
        assert!(registry.register(missing).await.is_err());
    }

    #[tokio::test]
    async fn test_touch_and_status() {
        let (_dir, registry) = registry().await;
        registry
            .register(input("0xabc", WalletFamily::ExternalSigner))
            .await
            .unwrap();

        let touched = registry.touch("0xABC").await.unwrap();
        assert!(touched.last_seen_at.is_some());

        let revoked = registry
            .set_status("0xabc", WalletStatus::Revoked)
            .await
            .unwrap();
        assert_eq!(revoked.status, WalletStatus::Revoked);

        assert!(registry.touch("0xmissing").await.is_err());
    }

    #[tokio::test]
    async fn test_registry_survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStore::open(dir.path()).await.unwrap();
        {
            let registry = WalletRegistry::load(storage.clone()).await.unwrap();
            registry
                .register(input("0xabc", WalletFamily::ExternalSigner))
                .await
                .unwrap();
        }
        let registry = WalletRegistry::load(storage).await.unwrap();
        assert!(registry.get("0xabc").await.is_some());
    }
}
