//! Reference directory - read-only provider/patient/validator inputs
//!
//! Seeded by the operator (or the deployment tooling) under
//! `<data_root>/reference/`. The core consumes these for lookups, validator
//! counts and the metrics endpoint; it never mutates them.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::storage::FileStore;
use crate::types::Result;

const PROVIDERS_FILE: &str = "reference/providers.json";
const PATIENTS_FILE: &str = "reference/patients.json";
const VALIDATORS_FILE: &str = "reference/validators.json";

/// A validator is counted online when it has been seen within this window.
const ONLINE_WINDOW_MINUTES: i64 = 15;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Provider {
    pub id: String,
    pub name: String,
    pub specialty: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Patient {
    pub id: String,
    pub full_name: String,
    pub dob: String,
    pub primary_provider_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidatorInfo {
    pub id: String,
    pub tier: u8,
    pub reputation: f64,
    pub blocks_proposed: u64,
    pub uptime: f64,
    pub last_seen: String,
}

/// The loaded directory; immutable for the life of the process.
#[derive(Debug, Clone, Default)]
pub struct Directory {
    pub providers: Vec<Provider>,
    pub patients: Vec<Patient>,
    pub validators: Vec<ValidatorInfo>,
}

impl Directory {
    /// Load all three collections; absent files mean empty collections.
    pub async fn load(storage: &FileStore) -> Result<Self> {
        Ok(Self {
            providers: storage.read_json(PROVIDERS_FILE).await?.unwrap_or_default(),
            patients: storage.read_json(PATIENTS_FILE).await?.unwrap_or_default(),
            validators: storage.read_json(VALIDATORS_FILE).await?.unwrap_or_default(),
        })
    }

    pub fn validators_total(&self) -> usize {
        self.validators.len()
    }

    /// Validators seen within the online window.
    pub fn validators_online(&self) -> usize {
        let cutoff = Utc::now() - Duration::minutes(ONLINE_WINDOW_MINUTES);
        self.validators
            .iter()
            .filter(|v| {
                DateTime::parse_from_rfc3339(&v.last_seen)
                    .map(|t| t.with_timezone(&Utc) >= cutoff)
                    .unwrap_or(false)
            })
            .count()
    }

    /// Top validators by reputation, for the metrics endpoint.
    pub fn top_validators(&self, limit: usize) -> Vec<ValidatorInfo> {
        let mut ranked = self.validators.clone();
        ranked.sort_by(|a, b| {
            b.reputation
                .partial_cmp(&a.reputation)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        ranked.truncate(limit);
        ranked
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator(id: &str, reputation: f64, last_seen: String) -> ValidatorInfo {
        ValidatorInfo {
            id: id.to_string(),
            tier: 1,
            reputation,
            blocks_proposed: 10,
            uptime: 0.99,
            last_seen,
        }
    }

    #[tokio::test]
    async fn test_absent_files_mean_empty_directory() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStore::open(dir.path()).await.unwrap();
        let directory = Directory::load(&storage).await.unwrap();
        assert!(directory.providers.is_empty());
        assert_eq!(directory.validators_total(), 0);
    }

    #[tokio::test]
    async fn test_load_and_rank() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStore::open(dir.path()).await.unwrap();

        let recent = Utc::now().to_rfc3339();
        let validators = vec![
            validator("v-low", 0.40, "2020-01-01T00:00:00+00:00".to_string()),
            validator("v-high", 0.95, recent.clone()),
            validator("v-mid", 0.70, recent),
        ];
        storage
            .write_json("reference/validators.json", &validators)
            .await
            .unwrap();

        let directory = Directory::load(&storage).await.unwrap();
        assert_eq!(directory.validators_total(), 3);
        assert_eq!(directory.validators_online(), 2);

        let top = directory.top_validators(2);
        assert_eq!(top[0].id, "v-high");
        assert_eq!(top[1].id, "v-mid");
    }
}
