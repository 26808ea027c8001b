//! Application State Management
//!
//! This module provides the application state that contains both services
//! and their store dependencies, following the dependency injection
//! pattern. There are no process-wide singletons: every `AppState` owns
//! its own stores, which is also what gives tests isolated fixtures.

use std::sync::Arc;

use log::info;

use crate::config::AppConfig;
use crate::error::Result;
use crate::relational::RelationalStore;
use crate::service::{CaseService, EvidenceService};
use crate::vault::{mock_store::MockVault, ObjectVault};

/// Application state containing the services and their dependencies.
pub struct AppState {
    pub case_service: Arc<CaseService>,
    pub evidence_service: Arc<EvidenceService>,
    pub store: Arc<RelationalStore>,
    pub vault: Arc<dyn ObjectVault>,
    pub config: AppConfig,
}

impl AppState {
    /// Create application state with services configured from `config.yaml`.
    pub fn new() -> Result<Self> {
        let config = AppConfig::load()
            .map_err(|e| crate::error::VaultError::InvalidRequest(format!("bad config: {}", e)))?;
        Self::from_config(config)
    }

    /// Create application state from configuration.
    pub fn from_config(config: AppConfig) -> Result<Self> {
        info!(
            "Initializing application state: db_path={}, vault backend={:?}",
            config.database.db_path, config.vault.backend
        );

        let store = Arc::new(RelationalStore::open(&config.database.db_path)?);
        let vault = config.vault.create_store()?;

        Ok(Self::wire(store, vault, config))
    }

    /// Create an isolated fixture for testing: fresh in-memory database,
    /// fresh mock vault. Nothing is shared between two fixtures.
    pub fn new_for_testing() -> Result<Self> {
        let store = Arc::new(RelationalStore::open_in_memory()?);
        let vault: Arc<dyn ObjectVault> = Arc::new(MockVault::new());
        Ok(Self::wire(store, vault, AppConfig::default()))
    }

    fn wire(store: Arc<RelationalStore>, vault: Arc<dyn ObjectVault>, config: AppConfig) -> Self {
        let case_service = Arc::new(CaseService::new(store.clone(), vault.clone()));
        let evidence_service = Arc::new(EvidenceService::new(store.clone(), vault.clone()));
        Self {
            case_service,
            evidence_service,
            store,
            vault,
            config,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixtures_are_isolated() {
        let a = AppState::new_for_testing().unwrap();
        let b = AppState::new_for_testing().unwrap();

        let tx = a.store.begin().unwrap();
        tx.create_court("District Court PG", "OSPG").unwrap();
        tx.commit().unwrap();

        // The second fixture sees none of it.
        let tx = b.store.begin().unwrap();
        assert!(tx.list_cases().unwrap().is_empty());
        let result = tx.create_court("District Court PG", "OSPG");
        assert!(result.is_ok(), "fixtures must not share a unique-name space");
    }

    #[test]
    fn test_from_config_with_local_backend() {
        use crate::vault::config::{VaultBackend, VaultConfig};

        let dir = tempfile::TempDir::new().unwrap();
        let config = AppConfig {
            database: crate::config::DatabaseConfig {
                db_path: dir.path().join("cases.db").to_string_lossy().into_owned(),
            },
            vault: VaultConfig {
                backend: VaultBackend::Local,
                base_path: dir.path().join("vault").to_string_lossy().into_owned(),
            },
        };

        let state = AppState::from_config(config).unwrap();
        assert!(state.vault.list_containers().unwrap().is_empty());
    }
}
