//! Evidence lifecycle orchestration across the relational store and the vault

use std::collections::HashSet;
use std::io::Read;
use std::sync::Arc;

use log::{info, warn};
use uuid::Uuid;

use crate::error::{Result, VaultError};
use crate::naming::database_name_to_vault_name;
use crate::relational::{Evidence, RelationalStore};
use crate::vault::ObjectVault;

/// Parameters for creating an evidence item. The content itself is passed
/// separately as a reader and streamed exactly once.
#[derive(Debug, Clone)]
pub struct NewEvidenceParams {
    pub case_id: Uuid,
    /// Filename as supplied by the uploader; becomes the object key, so no
    /// `/` or spaces.
    pub name: String,
    pub description: Option<String>,
    pub evidence_type_id: Option<Uuid>,
}

/// Orchestrates evidence create/get/download/list within a case.
pub struct EvidenceService {
    store: Arc<RelationalStore>,
    vault: Arc<dyn ObjectVault>,
}

impl EvidenceService {
    pub fn new(store: Arc<RelationalStore>, vault: Arc<dyn ObjectVault>) -> Self {
        Self { store, vault }
    }

    /// Create an evidence item: stream the content into the vault (hashing
    /// as it streams), then insert the metadata row with the hash.
    ///
    /// The object is written first and the row second. If the row insert
    /// fails the object write is compensated with a removal, so the
    /// failure mode is an invisible orphan object rather than a metadata
    /// row pointing at content that does not exist.
    pub fn create(&self, params: &NewEvidenceParams, content: &mut dyn Read) -> Result<Evidence> {
        let tx = self.store.begin()?;

        // Both existence checks must pass. The stores can drift, and
        // either one catching the duplicate is sufficient to reject.
        if tx.evidence_exists(params.case_id, &params.name)? {
            return Err(VaultError::AlreadyExists(format!(
                "evidence {} in case {}",
                params.name, params.case_id
            )));
        }
        let case = tx.get_case(params.case_id)?;
        if let Some(type_id) = params.evidence_type_id {
            tx.get_evidence_type(type_id)?;
        }

        let container = database_name_to_vault_name(&case.name)?;
        if self.vault.object_exists(&container, &params.name)? {
            return Err(VaultError::AlreadyExists(format!(
                "object {} in container {}",
                params.name, container
            )));
        }

        let hash = self.vault.put_object(&container, &params.name, content)?;

        let evidence = match tx.create_evidence(
            case.id,
            &params.name,
            params.description.as_deref(),
            params.evidence_type_id,
            &hash,
        ) {
            Ok(evidence) => evidence,
            Err(insert_err) => {
                // The object landed but its row did not; remove the object
                // so the stores stay aligned.
                return Err(match self.vault.remove_object(&container, &params.name) {
                    Ok(()) => {
                        info!(
                            "Compensated failed evidence insert: removed object {}/{}",
                            container, params.name
                        );
                        insert_err
                    }
                    Err(cleanup) => {
                        warn!(
                            "Compensation failed for object {}/{}: {}",
                            container, params.name, cleanup
                        );
                        VaultError::Compensation {
                            source: Box::new(insert_err),
                            cleanup: Box::new(cleanup),
                        }
                    }
                });
            }
        };

        tx.commit()?;
        info!(
            "Created evidence {} ({}) in case {} with hash {}",
            evidence.id, evidence.name, case.id, hash
        );
        Ok(evidence)
    }

    /// Fetch an evidence row by id. `NotFound` if absent.
    pub fn get_by_id(&self, id: Uuid) -> Result<Evidence> {
        let tx = self.store.begin()?;
        tx.get_evidence(id)
    }

    /// Open the content stream for an evidence item.
    ///
    /// Existence is re-validated in both stores independently before the
    /// stream is opened; the stores may have drifted since the caller last
    /// read the row, and a reader must never receive a stream that errors
    /// on first read. Returns the stream and the download filename.
    pub fn download(&self, evidence: &Evidence) -> Result<(Box<dyn Read + Send>, String)> {
        let tx = self.store.begin()?;
        if !tx.evidence_exists(evidence.case_id, &evidence.name)? {
            return Err(VaultError::NotFound(format!(
                "evidence {} in case {}",
                evidence.name, evidence.case_id
            )));
        }
        let case = tx.get_case(evidence.case_id)?;
        drop(tx);

        let container = database_name_to_vault_name(&case.name)?;
        if !self.vault.object_exists(&container, &evidence.name)? {
            return Err(VaultError::NotFound(format!(
                "object {} in container {}",
                evidence.name, container
            )));
        }

        let stream = self.vault.get_object(&container, &evidence.name)?;
        Ok((stream, evidence.name.clone()))
    }

    /// Reconciled listing for a case: evidence rows whose object is
    /// actually present in the container, in relational-store order. A
    /// reader never sees an item it could not also download.
    pub fn list(&self, case_id: Uuid) -> Result<Vec<Evidence>> {
        let tx = self.store.begin()?;
        let case = tx.get_case(case_id)?;
        let container = database_name_to_vault_name(&case.name)?;

        let present: HashSet<String> = match self.vault.list_objects(&container) {
            Ok(names) => names.into_iter().collect(),
            // Container gone entirely: every row is masked.
            Err(e) if e.is_not_found() => HashSet::new(),
            Err(e) => return Err(e),
        };

        let rows = tx.list_evidence(case_id)?;
        Ok(rows
            .into_iter()
            .filter(|evidence| present.contains(&evidence.name))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::case_service::{CaseService, NewCaseParams};
    use crate::vault::mock_store::MockVault;

    struct Fixture {
        store: Arc<RelationalStore>,
        vault: Arc<MockVault>,
        cases: CaseService,
        service: EvidenceService,
        case_id: Uuid,
        evidence_type_id: Uuid,
    }

    // One provisioned case ("OSPG KM 2/23" / "ospg-km-2-23") per fixture.
    fn fixture() -> Fixture {
        let store = Arc::new(RelationalStore::open_in_memory().unwrap());
        let vault = Arc::new(MockVault::new());

        let tx = store.begin().unwrap();
        let court = tx.create_court("District Court PG", "OSPG").unwrap();
        let case_type = tx.create_case_type("KM").unwrap();
        let evidence_type = tx.create_evidence_type("photo").unwrap();
        let user = tx.create_user("prosecutor1").unwrap();
        tx.commit().unwrap();

        let cases = CaseService::new(store.clone(), vault.clone());
        let case = cases
            .create(
                user.id,
                &NewCaseParams {
                    case_type_id: case_type.id,
                    court_id: court.id,
                    number: 2,
                    year: 2023,
                    tags: vec![],
                },
            )
            .unwrap();

        let service = EvidenceService::new(store.clone(), vault.clone());
        Fixture {
            store,
            vault,
            cases,
            service,
            case_id: case.id,
            evidence_type_id: evidence_type.id,
        }
    }

    fn params(f: &Fixture, name: &str) -> NewEvidenceParams {
        NewEvidenceParams {
            case_id: f.case_id,
            name: name.to_string(),
            description: None,
            evidence_type_id: Some(f.evidence_type_id),
        }
    }

    #[test]
    fn test_create_streams_and_hashes_once() {
        let f = fixture();
        let mut content: &[u8] = b"abc";
        let evidence = f.service.create(&params(&f, "photo1"), &mut content).unwrap();

        // SHA-256("abc")
        assert_eq!(
            evidence.content_hash,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(f.vault.object_bytes("ospg-km-2-23", "photo1").unwrap(), b"abc");

        let fetched = f.service.get_by_id(evidence.id).unwrap();
        assert_eq!(fetched.content_hash, evidence.content_hash);
    }

    #[test]
    fn test_content_hash_tracks_content() {
        let f = fixture();
        let mut a: &[u8] = b"first content";
        let mut b: &[u8] = b"second content";
        let mut c: &[u8] = b"first content";

        let ev_a = f.service.create(&params(&f, "a"), &mut a).unwrap();
        let ev_b = f.service.create(&params(&f, "b"), &mut b).unwrap();
        let ev_c = f.service.create(&params(&f, "c"), &mut c).unwrap();

        assert_ne!(ev_a.content_hash, ev_b.content_hash);
        assert_eq!(ev_a.content_hash, ev_c.content_hash);
    }

    #[test]
    fn test_duplicate_name_rejected_by_either_store() {
        let f = fixture();
        let mut content: &[u8] = b"abc";
        f.service.create(&params(&f, "photo1"), &mut content).unwrap();

        // Relational store catches it.
        let mut content: &[u8] = b"abc";
        let err = f.service.create(&params(&f, "photo1"), &mut content).unwrap_err();
        assert!(err.is_already_exists());

        // Vault-only duplicate (row missing, object present) is caught by
        // the independent vault check.
        let mut stray: &[u8] = b"stray";
        f.vault.put_object("ospg-km-2-23", "stray-object", &mut stray).unwrap();
        let mut content: &[u8] = b"abc";
        let err = f
            .service
            .create(&params(&f, "stray-object"), &mut content)
            .unwrap_err();
        assert!(err.is_already_exists());
    }

    #[test]
    fn test_invalid_object_name_leaves_nothing() {
        let f = fixture();
        for bad in ["a/b", "a b"] {
            let mut content: &[u8] = b"abc";
            let err = f.service.create(&params(&f, bad), &mut content).unwrap_err();
            assert!(err.is_invalid_request());
        }
        assert_eq!(f.vault.object_count("ospg-km-2-23"), 0);
        let tx = f.store.begin().unwrap();
        assert!(tx.list_evidence(f.case_id).unwrap().is_empty());
    }

    // Makes every evidence insert fail the way a duplicate-name race
    // does: the pre-checks pass, the object write happens, and only the
    // insert itself errors.
    fn inject_insert_failure(f: &Fixture) {
        f.store
            .with_raw_connection(|conn| {
                conn.execute_batch(
                    "CREATE TRIGGER inject_insert_failure BEFORE INSERT ON evidence
                     BEGIN SELECT RAISE(ABORT, 'injected insert failure'); END;",
                )
            })
            .unwrap();
    }

    #[test]
    fn test_insert_failure_compensates_object_write() {
        let f = fixture();
        inject_insert_failure(&f);

        let mut content: &[u8] = b"abc";
        let err = f.service.create(&params(&f, "photo1"), &mut content).unwrap_err();
        assert!(err.is_already_exists());

        // The uploaded object was removed again; the vault holds nothing.
        assert!(f.vault.object_bytes("ospg-km-2-23", "photo1").is_none());
        assert_eq!(f.vault.object_count("ospg-km-2-23"), 0);
    }

    #[test]
    fn test_compensation_failure_reports_both_errors() {
        let f = fixture();
        inject_insert_failure(&f);
        f.vault.set_fail_object_removals(true);

        let mut content: &[u8] = b"abc";
        let err = f.service.create(&params(&f, "photo1"), &mut content).unwrap_err();
        match err {
            VaultError::Compensation { source, cleanup } => {
                assert!(source.is_already_exists());
                assert!(matches!(*cleanup, VaultError::Backend(_)));
            }
            other => panic!("expected Compensation error, got {}", other),
        }
        // The caller must not assume the object was removed; here it wasn't.
        assert!(f.vault.object_bytes("ospg-km-2-23", "photo1").is_some());
    }

    #[test]
    fn test_download_round_trip() {
        let f = fixture();
        let mut content: &[u8] = b"abc";
        let evidence = f.service.create(&params(&f, "photo1"), &mut content).unwrap();

        let (mut stream, filename) = f.service.download(&evidence).unwrap();
        assert_eq!(filename, "photo1");
        let mut buf = Vec::new();
        stream.read_to_end(&mut buf).unwrap();
        assert_eq!(buf, b"abc");
    }

    #[test]
    fn test_download_after_out_of_band_object_removal() {
        let f = fixture();
        let mut content: &[u8] = b"abc";
        let evidence = f.service.create(&params(&f, "photo1"), &mut content).unwrap();

        // The row still exists, the object is gone.
        f.vault.drop_object("ospg-km-2-23", "photo1");
        assert!(f.service.download(&evidence).err().unwrap().is_not_found());
    }

    #[test]
    fn test_download_after_row_removal() {
        let f = fixture();
        let mut content: &[u8] = b"abc";
        let evidence = f.service.create(&params(&f, "photo1"), &mut content).unwrap();

        // Delete the whole case row-side; the stale Evidence value the
        // caller still holds must not produce a stream.
        f.cases.delete(f.case_id).unwrap();
        assert!(f.service.download(&evidence).err().unwrap().is_not_found());
    }

    #[test]
    fn test_list_masks_rows_without_objects() {
        let f = fixture();
        let mut one: &[u8] = b"one";
        let mut two: &[u8] = b"two";
        let kept = f.service.create(&params(&f, "photo1"), &mut one).unwrap();
        f.service.create(&params(&f, "photo2"), &mut two).unwrap();

        f.vault.drop_object("ospg-km-2-23", "photo2");

        let listed = f.service.list(f.case_id).unwrap();
        let names: Vec<_> = listed.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["photo1"]);
        assert_eq!(listed[0].id, kept.id);
    }

    #[test]
    fn test_list_with_missing_container_is_empty() {
        let f = fixture();
        let mut content: &[u8] = b"abc";
        f.service.create(&params(&f, "photo1"), &mut content).unwrap();

        f.vault.remove_container("ospg-km-2-23").unwrap();
        assert!(f.service.list(f.case_id).unwrap().is_empty());
    }

    #[test]
    fn test_list_unknown_case_is_not_found() {
        let f = fixture();
        assert!(f.service.list(Uuid::new_v4()).unwrap_err().is_not_found());
    }

    #[test]
    fn test_unknown_evidence_type_is_not_found() {
        let f = fixture();
        let mut p = params(&f, "photo1");
        p.evidence_type_id = Some(Uuid::new_v4());
        let mut content: &[u8] = b"abc";
        assert!(f.service.create(&p, &mut content).unwrap_err().is_not_found());
        assert_eq!(f.vault.object_count("ospg-km-2-23"), 0);
    }
}
