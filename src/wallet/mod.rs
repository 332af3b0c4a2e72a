//! Wallet authentication
//!
//! Write access to the ledger is gated by wallet ownership: a client proves
//! control of an address through a nonce/signature challenge before the
//! server attributes actions to it.
//!
//! - [`registry`] - durable map of known wallet profiles
//! - [`nonce`] - short-lived challenge nonce store with expiry sweep
//! - [`verifier`] - per-family signature verification capability set
//! - [`auth`] - the challenge/verify service tying the three together

pub mod auth;
pub mod nonce;
pub mod registry;
pub mod verifier;

pub use auth::{ChallengeOptions, IssuedChallenge, VerifiedSession, WalletAuthService};
pub use nonce::{spawn_nonce_sweep_task, NonceRecord, NonceStore};
pub use registry::{
    normalize_address, RegisterWallet, WalletFamily, WalletProfile, WalletRegistry, WalletStatus,
};
pub use verifier::{CustomKeypairVerifier, ExternalSignerVerifier, SignatureVerifier, VerifierSet};
