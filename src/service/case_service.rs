//! Case lifecycle orchestration across the relational store and the vault

use std::collections::HashSet;
use std::sync::Arc;

use log::{info, warn};
use uuid::Uuid;

use crate::error::{Result, VaultError};
use crate::naming::{build_database_name, build_vault_name, database_name_to_vault_name};
use crate::relational::{Case, RelationalStore};
use crate::vault::ObjectVault;

/// Parameters for creating a case. The human-readable and container names
/// are both derived from the referenced court and case type plus number
/// and year; callers never supply names directly.
#[derive(Debug, Clone)]
pub struct NewCaseParams {
    pub case_type_id: Uuid,
    pub court_id: Uuid,
    pub number: i32,
    pub year: i32,
    pub tags: Vec<String>,
}

/// Orchestrates case create/get/list/delete across both stores.
pub struct CaseService {
    store: Arc<RelationalStore>,
    vault: Arc<dyn ObjectVault>,
}

impl CaseService {
    pub fn new(store: Arc<RelationalStore>, vault: Arc<dyn ObjectVault>) -> Self {
        Self { store, vault }
    }

    /// Create a case in both stores.
    ///
    /// The row inserts happen first but stay uncommitted while the
    /// container is created; a container failure therefore rolls the rows
    /// back and leaves nothing behind. The reverse window (container
    /// created, commit fails) leaves an orphan container with no row.
    /// That gap is accepted: commit failures are rare, and an orphan
    /// container never surfaces in reconciled listings.
    pub fn create(&self, user_id: Uuid, params: &NewCaseParams) -> Result<Case> {
        let tx = self.store.begin()?;
        tx.set_actor(user_id);

        let case_type = tx.get_case_type(params.case_type_id)?;
        let court = tx.get_court(params.court_id)?;

        let db_name = build_database_name(
            &court.short_name,
            &case_type.name,
            params.number,
            params.year,
        )?;
        if tx.case_exists_by_name(&db_name)? {
            return Err(VaultError::AlreadyExists(format!("case {}", db_name)));
        }

        let case = tx.create_case(&db_name, case_type.id, court.id, &params.tags)?;
        tx.create_case_member(case.id, user_id)?;

        let vault_name = build_vault_name(
            &court.short_name,
            &case_type.name,
            params.number,
            params.year,
        )?;
        self.vault.create_container(&vault_name).map_err(|e| {
            // Two racing creates can both pass the existence check above;
            // the container creation is atomic per name, so its own
            // AlreadyExists is authoritative.
            if e.is_already_exists() {
                VaultError::AlreadyExists(format!("case {}", db_name))
            } else {
                e.context(format!("create container {}", vault_name))
            }
        })?;

        tx.commit()?;
        info!("Created case {} ({}) with container {}", case.id, db_name, vault_name);
        Ok(case)
    }

    /// Fetch a case by id. The relational store is the metadata source of
    /// truth for reads; the vault is not consulted.
    pub fn get_by_id(&self, id: Uuid) -> Result<Case> {
        let tx = self.store.begin()?;
        tx.get_case(id)
    }

    /// Reconciled listing: only cases whose derived container is actually
    /// present in the vault are returned, in relational-store order. Rows
    /// without a backing container, and containers without a row, are
    /// silently masked.
    pub fn list(&self) -> Result<Vec<Case>> {
        let containers: HashSet<String> = self.vault.list_containers()?.into_iter().collect();

        let tx = self.store.begin()?;
        let cases = tx.list_cases()?;
        drop(tx);

        let mut visible = Vec::with_capacity(cases.len());
        for case in cases {
            let vault_name = database_name_to_vault_name(&case.name)?;
            if containers.contains(&vault_name) {
                visible.push(case);
            }
        }
        Ok(visible)
    }

    /// Delete a case from both stores.
    ///
    /// Unlike create, this does not roll back on a vault failure: the row
    /// deletion commits either way and the removal error is returned
    /// afterwards. A stale container is recoverable by manual cleanup,
    /// whereas a resurrected case row would be assumed to have a backing
    /// container by every other code path.
    pub fn delete(&self, id: Uuid) -> Result<()> {
        let tx = self.store.begin()?;
        let case = tx.get_case(id)?;
        tx.delete_case(case.id)?;

        let vault_name = database_name_to_vault_name(&case.name)?;
        let removal = self.vault.remove_container(&vault_name);
        tx.commit()?;

        match removal {
            Ok(()) => {
                info!("Deleted case {} ({}) and container {}", id, case.name, vault_name);
                Ok(())
            }
            Err(e) => {
                warn!(
                    "Case {} row deleted but container {} removal failed: {}",
                    id, vault_name, e
                );
                Err(e.context(format!("remove container {} for case {}", vault_name, id)))
            }
        }
    }
}
