//! CAMTC Ledger - persistence and ingestion backbone for a healthcare
//! transaction ledger.
//!
//! The core subsystems:
//! - [`context`] - scores incoming transactions on clinical criticality,
//!   temporal sensitivity, resource pressure and regulatory compliance
//! - [`mempool`] - tiered priority queues with bounded capacity, eviction
//!   and crash-safe snapshot persistence
//! - [`audit`] - append-only audit log, hash-chained entry to entry
//! - [`wallet`] - wallet registry plus nonce challenge/verify service
//!
//! Block production, consensus and the operator dashboard are external
//! collaborators; this crate only consumes their state (the chain snapshot,
//! the reference directory) read-only.

pub mod audit;
pub mod chain;
pub mod config;
pub mod context;
pub mod mempool;
pub mod reference;
pub mod routes;
pub mod server;
pub mod storage;
pub mod transactions;
pub mod types;
pub mod wallet;

pub use config::Args;
pub use types::{LedgerError, Result};
