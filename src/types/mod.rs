//! Shared types for the ledger core

pub mod error;

pub use error::{LedgerError, Result};
