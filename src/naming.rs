//! Name translation between the two stores.
//!
//! A case is identified by the relational store through a human-readable
//! name ("OSPG KM 2/23") and by the object vault through a container-safe
//! name ("ospg-km-2-23"). Both are derived from the same four fields and
//! the derivation must stay byte-for-byte reproducible for the lifetime of
//! the system: the names are the join key between the stores, so changing
//! a rule here is a breaking migration, not a code change.
//!
//! Everything in this module is pure; no I/O, no state.

use crate::error::{Result, VaultError};

fn validate_parts(court: &str, case_type: &str, number: i32, year: i32) -> Result<()> {
    if court.is_empty() {
        return Err(VaultError::InvalidRequest(
            "court short name must not be empty".to_string(),
        ));
    }
    if case_type.is_empty() {
        return Err(VaultError::InvalidRequest(
            "case type name must not be empty".to_string(),
        ));
    }
    if number < 0 {
        return Err(VaultError::InvalidRequest(format!(
            "case number must not be negative, got {}",
            number
        )));
    }
    if year < 1000 {
        return Err(VaultError::InvalidRequest(format!(
            "year must be a four digit year, got {}",
            year
        )));
    }
    Ok(())
}

/// Build the human-readable name stored in the relational store:
/// `"<court> <case_type> <number>/<year mod 100>"`.
pub fn build_database_name(court: &str, case_type: &str, number: i32, year: i32) -> Result<String> {
    validate_parts(court, case_type, number, year)?;
    Ok(format!("{} {} {}/{:02}", court, case_type, number, year % 100))
}

/// Build the container name used by the object vault:
/// `"<court>-<case_type>-<number>-<year mod 100>"`, all lowercase.
pub fn build_vault_name(court: &str, case_type: &str, number: i32, year: i32) -> Result<String> {
    validate_parts(court, case_type, number, year)?;
    Ok(format!(
        "{}-{}-{}-{:02}",
        court.to_lowercase(),
        case_type.to_lowercase(),
        number,
        year % 100
    ))
}

/// Derive the vault container name from a stored database name.
///
/// This is a lossy structural transform (lowercase, space and `/` become
/// `-`), not a re-parse of the four source fields. List and delete paths
/// only have the stored name available, so they must be able to reach the
/// matching container from it alone. For names produced by
/// [`build_database_name`] the result always equals [`build_vault_name`]
/// on the same inputs.
pub fn database_name_to_vault_name(db_name: &str) -> Result<String> {
    if db_name.is_empty() {
        return Err(VaultError::InvalidRequest(
            "case name must not be empty".to_string(),
        ));
    }
    Ok(db_name.to_lowercase().replace(' ', "-").replace('/', "-"))
}
