//! Wallet challenge/verify service
//!
//! Binds addresses to sessions via time-bounded single-use nonces. The flow:
//! issue a challenge message for an address, the client signs it under its
//! wallet family, verify consumes the nonce on success and hands back an
//! opaque session token for the caller's session layer.

use std::sync::Arc;

use chrono::{Duration, Utc};
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{debug, info};
use uuid::Uuid;

use crate::types::{LedgerError, Result};

use super::nonce::{NonceRecord, NonceStore};
use super::registry::{
    normalize_address, RegisterWallet, WalletFamily, WalletProfile, WalletRegistry, WalletStatus,
};
use super::verifier::VerifierSet;

const NONCE_PREFIX: &str = "CAMTC";

/// Options accompanying a challenge request.
#[derive(Debug, Clone, Default)]
pub struct ChallengeOptions {
    /// Declared wallet family; defaults to external-signer
    pub family: Option<WalletFamily>,
    pub label: Option<String>,
    pub metadata: Option<serde_json::Map<String, Value>>,
    /// Required when a custom-keypair wallet is seen for the first time
    pub public_key: Option<String>,
    pub context: Option<serde_json::Map<String, Value>>,
}

/// A freshly issued challenge.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedChallenge {
    pub nonce: String,
    pub message: String,
    pub expires_at: String,
    pub wallet: WalletProfile,
}

/// A successful verification.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifiedSession {
    pub wallet: WalletProfile,
    pub verified_at: String,
    pub session_token: String,
    pub proof: String,
}

/// The challenge/verify service.
pub struct WalletAuthService {
    registry: Arc<WalletRegistry>,
    nonces: Arc<NonceStore>,
    verifiers: VerifierSet,
    network_id: String,
    nonce_ttl_seconds: u64,
}

impl WalletAuthService {
    pub fn new(
        registry: Arc<WalletRegistry>,
        nonces: Arc<NonceStore>,
        network_id: String,
        nonce_ttl_seconds: u64,
    ) -> Self {
        Self {
            registry,
            nonces,
            verifiers: VerifierSet::standard(),
            network_id,
            nonce_ttl_seconds,
        }
    }

    /// Resolve (or auto-create, for external signers) the wallet and issue a
    /// fresh challenge, replacing any active nonce for the address.
    pub async fn issue_nonce(
        &self,
        address: &str,
        options: ChallengeOptions,
    ) -> Result<IssuedChallenge> {
        let declared = options.family.unwrap_or(WalletFamily::ExternalSigner);

        let wallet = match self.registry.get(address).await {
            Some(existing) => {
                if let Some(family) = options.family {
                    if family != existing.family {
                        return Err(LedgerError::Auth(format!(
                            "wallet {} is registered as {}, not {}",
                            existing.normalized_address,
                            existing.family.as_str(),
                            family.as_str()
                        )));
                    }
                }
                existing
            }
            None => {
                // First sight: external signers materialize on demand;
                // custom keypairs must bring their public key (enforced by
                // the registry).
                self.registry
                    .register(RegisterWallet {
                        address: address.to_string(),
                        family: declared,
                        label: options.label.clone(),
                        public_key: options.public_key.clone(),
                        metadata: options.metadata.clone().unwrap_or_default(),
                    })
                    .await?
            }
        };

        if wallet.status != WalletStatus::Active {
            return Err(LedgerError::Auth(format!(
                "wallet {} is not active",
                wallet.normalized_address
            )));
        }

        let now = Utc::now();
        let expires_at = (now + Duration::seconds(self.nonce_ttl_seconds as i64)).to_rfc3339();
        let issued_at = now.to_rfc3339();
        let nonce = format!("{}-{}", NONCE_PREFIX, Uuid::new_v4());
        let message = self.challenge_message(&wallet.address, &nonce, &issued_at);

        self.nonces
            .issue(NonceRecord {
                address: wallet.address.clone(),
                normalized_address: wallet.normalized_address.clone(),
                nonce: nonce.clone(),
                message: message.clone(),
                family: wallet.family,
                issued_at,
                expires_at: expires_at.clone(),
                context: options.context,
            })
            .await?;

        debug!(address = %wallet.normalized_address, "challenge issued");
        Ok(IssuedChallenge {
            nonce,
            message,
            expires_at,
            wallet,
        })
    }

    /// Verify a signature over the active challenge. On success the nonce is
    /// consumed atomically with persistence and cannot be replayed.
    pub async fn verify(&self, address: &str, signature: &str) -> Result<VerifiedSession> {
        let normalized = normalize_address(address);
        let wallet = self
            .registry
            .get(&normalized)
            .await
            .ok_or_else(|| LedgerError::Auth(format!("unknown wallet {}", normalized)))?;

        let record = self
            .nonces
            .peek(&normalized)
            .await
            .ok_or_else(|| LedgerError::Auth(format!("no active nonce for {}", normalized)))?;

        if record.is_expired(Utc::now()) {
            self.nonces.remove(&normalized).await?;
            return Err(LedgerError::Auth(format!("nonce expired for {}", normalized)));
        }

        let verifier = self
            .verifiers
            .for_family(wallet.family)
            .ok_or_else(|| {
                LedgerError::Internal(format!(
                    "no verifier registered for family {}",
                    wallet.family.as_str()
                ))
            })?;

        if !verifier.verify(&wallet, &record.message, signature)? {
            return Err(LedgerError::Auth(format!(
                "signature invalid for {}",
                normalized
            )));
        }

        self.nonces.remove(&normalized).await?;
        let wallet = self.registry.touch(&normalized).await?;

        let verified_at = Utc::now().to_rfc3339();
        let session_token = sha256_hex(&format!("{}:{}:{}", wallet.id, record.nonce, verified_at));
        let proof = sha256_hex(&format!("{}:{}", signature, record.message));

        info!(address = %normalized, "wallet verified");
        Ok(VerifiedSession {
            wallet,
            verified_at,
            session_token,
            proof,
        })
    }

    /// The multi-line message the wallet signs.
    fn challenge_message(&self, address: &str, nonce: &str, timestamp: &str) -> String {
        format!(
            "CAMTC Healthcare Ledger ({})\nSign this message to authenticate\nWallet: {}\nNonce: {}\nTimestamp: {}",
            self.network_id, address, nonce, timestamp
        )
    }
}

fn sha256_hex(input: &str) -> String {
    hex::encode(Sha256::digest(input.as_bytes()))
}
