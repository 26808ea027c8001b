//! Configuration for object vault backends

use std::env;
use std::sync::Arc;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::vault::{local_store::LocalVault, mock_store::MockVault, ObjectVault};

/// Available object vault backends
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum VaultBackend {
    Local,
    Mock,
}

impl Default for VaultBackend {
    fn default() -> Self {
        VaultBackend::Local
    }
}

impl std::str::FromStr for VaultBackend {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "local" | "fs" | "filesystem" => Ok(VaultBackend::Local),
            "mock" => Ok(VaultBackend::Mock),
            _ => Err(format!("Unknown vault backend: {}", s)),
        }
    }
}

/// Configuration for the object vault
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultConfig {
    pub backend: VaultBackend,
    /// Base directory for the local backend.
    pub base_path: String,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            backend: VaultBackend::default(),
            base_path: "./data/vault".to_string(),
        }
    }
}

impl VaultConfig {
    /// Create a vault configuration from environment variables, falling
    /// back to defaults for anything unset or unparseable.
    pub fn from_env() -> Self {
        let backend = match env::var("VAULT_BACKEND") {
            Ok(backend_str) => match backend_str.parse::<VaultBackend>() {
                Ok(backend) => {
                    info!("Using vault backend from environment: {:?}", backend);
                    backend
                }
                Err(e) => {
                    warn!("Invalid vault backend in environment: {}. Using default Local.", e);
                    VaultBackend::default()
                }
            },
            Err(_) => VaultBackend::default(),
        };

        let base_path = match env::var("VAULT_DIRECTORY") {
            Ok(dir) => {
                info!("Using vault directory from environment: {}", dir);
                dir
            }
            Err(_) => VaultConfig::default().base_path,
        };

        Self { backend, base_path }
    }

    /// Create a vault instance based on the configuration.
    pub fn create_store(&self) -> Result<Arc<dyn ObjectVault>> {
        match self.backend {
            VaultBackend::Local => Ok(Arc::new(LocalVault::new(&self.base_path)?)),
            VaultBackend::Mock => Ok(Arc::new(MockVault::new())),
        }
    }
}
