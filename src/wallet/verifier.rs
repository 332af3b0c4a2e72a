//! Signature family verification
//!
//! Verifiers form a small capability set dispatched on wallet family, so
//! cryptographic specifics stay out of the auth service and route handlers.
//!
//! - external-signer: recoverable ECDSA-secp256k1 over the EIP-191
//!   personal-sign envelope; the recovered Ethereum address must match the
//!   wallet's normalized address
//! - custom-keypair: direct verification of the raw message against the
//!   registered public key, ed25519 by default or RSA-PSS/SHA-256 when the
//!   wallet metadata says `"scheme": "rsa-pss"`

use base64::{engine::general_purpose, Engine as _};
use ed25519_dalek::Verifier as _;
use k256::ecdsa::{RecoveryId, Signature as EcdsaSignature, VerifyingKey as EcdsaVerifyingKey};
use rsa::pkcs8::DecodePublicKey;
use rsa::{Pss, RsaPublicKey};
use sha2::Sha256;
use sha3::{Digest, Keccak256};

use crate::types::{LedgerError, Result};
use crate::wallet::registry::{WalletFamily, WalletProfile};

const SCHEME_ED25519: &str = "ed25519";
const SCHEME_RSA_PSS: &str = "rsa-pss";

/// Capability set for one signature family.
pub trait SignatureVerifier: Send + Sync {
    fn can_verify(&self, family: WalletFamily) -> bool;

    /// `Ok(false)` covers both a mismatched and a malformed signature; `Err`
    /// is reserved for wallets that cannot be verified at all (for example a
    /// missing public key).
    fn verify(&self, wallet: &WalletProfile, message: &str, signature: &str) -> Result<bool>;
}

/// Dispatch table over the registered verifiers.
pub struct VerifierSet {
    verifiers: Vec<Box<dyn SignatureVerifier>>,
}

impl VerifierSet {
    /// The standard set: both wallet families.
    pub fn standard() -> Self {
        Self {
            verifiers: vec![
                Box::new(ExternalSignerVerifier),
                Box::new(CustomKeypairVerifier),
            ],
        }
    }

    pub fn for_family(&self, family: WalletFamily) -> Option<&dyn SignatureVerifier> {
        self.verifiers
            .iter()
            .find(|v| v.can_verify(family))
            .map(|v| v.as_ref())
    }
}

/// EIP-191 personal-sign envelope: `"\x19Ethereum Signed Message:\n" + len + message`.
pub fn personal_sign_digest(message: &str) -> Keccak256 {
    let mut prefixed = format!("\x19Ethereum Signed Message:\n{}", message.len()).into_bytes();
    prefixed.extend_from_slice(message.as_bytes());
    Keccak256::new_with_prefix(prefixed)
}

/// Ethereum address of a secp256k1 verifying key: keccak over the
/// uncompressed point (sans the 0x04 tag), last 20 bytes, lowercase hex.
pub fn ethereum_address(key: &EcdsaVerifyingKey) -> String {
    let point = key.to_encoded_point(false);
    let hash = Keccak256::digest(&point.as_bytes()[1..]);
    format!("0x{}", hex::encode(&hash[12..]))
}

/// ECDSA-secp256k1 address recovery.
pub struct ExternalSignerVerifier;

impl SignatureVerifier for ExternalSignerVerifier {
    fn can_verify(&self, family: WalletFamily) -> bool {
        family == WalletFamily::ExternalSigner
    }

    fn verify(&self, wallet: &WalletProfile, message: &str, signature: &str) -> Result<bool> {
        let Some(bytes) = decode_flexible(signature) else {
            return Ok(false);
        };
        if bytes.len() != 65 {
            return Ok(false);
        }

        let v = bytes[64];
        let recovery_byte = if v >= 27 { v - 27 } else { v };
        let Some(recovery_id) = RecoveryId::from_byte(recovery_byte) else {
            return Ok(false);
        };
        let Ok(sig) = EcdsaSignature::from_slice(&bytes[..64]) else {
            return Ok(false);
        };

        let recovered =
            match EcdsaVerifyingKey::recover_from_digest(personal_sign_digest(message), &sig, recovery_id) {
                Ok(key) => key,
                Err(_) => return Ok(false),
            };

        Ok(ethereum_address(&recovered) == wallet.normalized_address)
    }
}

/// Direct verification against the registered public key.
pub struct CustomKeypairVerifier;

impl SignatureVerifier for CustomKeypairVerifier {
    fn can_verify(&self, family: WalletFamily) -> bool {
        family == WalletFamily::CustomKeypair
    }

    fn verify(&self, wallet: &WalletProfile, message: &str, signature: &str) -> Result<bool> {
        let public_key = wallet.public_key.as_deref().ok_or_else(|| {
            LedgerError::Auth(format!(
                "wallet {} has no registered public key",
                wallet.normalized_address
            ))
        })?;
        let Some(sig_bytes) = decode_flexible(signature) else {
            return Ok(false);
        };

        let scheme = wallet
            .metadata
            .get("scheme")
            .and_then(serde_json::Value::as_str)
            .unwrap_or(SCHEME_ED25519);

        match scheme {
            SCHEME_RSA_PSS => verify_rsa_pss(public_key, message, &sig_bytes),
            _ => Ok(verify_ed25519(public_key, message, &sig_bytes)),
        }
    }
}

fn verify_ed25519(public_key: &str, message: &str, sig_bytes: &[u8]) -> bool {
    let Some(key_bytes) = decode_flexible(public_key) else {
        return false;
    };
    let Ok(key_array) = <[u8; 32]>::try_from(key_bytes.as_slice()) else {
        return false;
    };
    let Ok(key) = ed25519_dalek::VerifyingKey::from_bytes(&key_array) else {
        return false;
    };
    let Ok(sig_array) = <[u8; 64]>::try_from(sig_bytes) else {
        return false;
    };
    let sig = ed25519_dalek::Signature::from_bytes(&sig_array);
    key.verify(message.as_bytes(), &sig).is_ok()
}

fn verify_rsa_pss(public_key: &str, message: &str, sig_bytes: &[u8]) -> Result<bool> {
    let key = if public_key.trim_start().starts_with("-----") {
        RsaPublicKey::from_public_key_pem(public_key)
            .map_err(|e| LedgerError::Auth(format!("unreadable RSA public key: {}", e)))?
    } else {
        let der = decode_flexible(public_key)
            .ok_or_else(|| LedgerError::Auth("unreadable RSA public key encoding".into()))?;
        RsaPublicKey::from_public_key_der(&der)
            .map_err(|e| LedgerError::Auth(format!("unreadable RSA public key: {}", e)))?
    };
    let digest = <Sha256 as sha2::Digest>::digest(message.as_bytes());
    Ok(key.verify(Pss::new::<Sha256>(), &digest, sig_bytes).is_ok())
}

/// Accepts 0x-prefixed hex, bare hex, or base64.
fn decode_flexible(encoded: &str) -> Option<Vec<u8>> {
    let trimmed = encoded.trim();
    if let Some(stripped) = trimmed.strip_prefix("0x") {
        return hex::decode(stripped).ok();
    }
    if let Ok(bytes) = hex::decode(trimmed) {
        return Some(bytes);
    }
    if let Ok(bytes) = general_purpose::STANDARD.decode(trimmed) {
        return Some(bytes);
    }
    general_purpose::STANDARD_NO_PAD.decode(trimmed).ok()
}
