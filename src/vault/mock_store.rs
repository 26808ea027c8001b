//! Mock implementation of ObjectVault for testing
//!
//! In-memory store with inspection helpers and failure-injection switches,
//! used to exercise the lifecycle services' compensation paths without a
//! real backend.

use std::collections::BTreeMap;
use std::io::{Cursor, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use log::info;

use crate::error::{Result, VaultError};
use crate::vault::{
    copy_and_hash, normalize_key_error, validate_container_name, validate_object_name,
    ObjectVault, KEY_NOT_FOUND_MESSAGE,
};

/// Mock implementation of ObjectVault.
#[derive(Default)]
pub struct MockVault {
    // container name -> object name -> content
    containers: Mutex<BTreeMap<String, BTreeMap<String, Vec<u8>>>>,
    fail_container_creates: AtomicBool,
    fail_container_removals: AtomicBool,
    fail_object_removals: AtomicBool,
    fail_puts: AtomicBool,
}

impl MockVault {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent `create_container` calls fail with a backend error.
    pub fn set_fail_container_creates(&self, fail: bool) {
        self.fail_container_creates.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent `remove_container` calls fail with a backend error.
    pub fn set_fail_container_removals(&self, fail: bool) {
        self.fail_container_removals.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent `remove_object` calls fail with a backend error.
    pub fn set_fail_object_removals(&self, fail: bool) {
        self.fail_object_removals.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent `put_object` calls fail with a backend error.
    pub fn set_fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }

    /// Number of containers currently in the store.
    pub fn container_count(&self) -> usize {
        self.containers.lock().unwrap().len()
    }

    /// Number of objects in a container, 0 if the container is absent.
    pub fn object_count(&self, container: &str) -> usize {
        let containers = self.containers.lock().unwrap();
        containers.get(container).map(|objects| objects.len()).unwrap_or(0)
    }

    /// Raw content of an object, if present.
    pub fn object_bytes(&self, container: &str, object: &str) -> Option<Vec<u8>> {
        let containers = self.containers.lock().unwrap();
        containers.get(container).and_then(|objects| objects.get(object)).cloned()
    }

    /// Delete a single object out-of-band, bypassing failure injection.
    /// Used by tests that simulate store drift.
    pub fn drop_object(&self, container: &str, object: &str) {
        let mut containers = self.containers.lock().unwrap();
        if let Some(objects) = containers.get_mut(container) {
            objects.remove(object);
        }
    }

    fn injected(&self, flag: &AtomicBool, op: &str) -> Result<()> {
        if flag.load(Ordering::SeqCst) {
            return Err(VaultError::Backend(format!("injected {} failure", op)));
        }
        Ok(())
    }
}

impl ObjectVault for MockVault {
    fn create_container(&self, name: &str) -> Result<()> {
        validate_container_name(name)?;
        self.injected(&self.fail_container_creates, "container create")?;

        let mut containers = self.containers.lock().unwrap();
        if containers.contains_key(name) {
            return Err(VaultError::AlreadyExists(format!("container {}", name)));
        }
        containers.insert(name.to_string(), BTreeMap::new());
        info!("Mock: created container {}", name);
        Ok(())
    }

    fn remove_container(&self, name: &str) -> Result<()> {
        validate_container_name(name)?;
        self.injected(&self.fail_container_removals, "container removal")?;

        let mut containers = self.containers.lock().unwrap();
        if containers.remove(name).is_none() {
            return Err(VaultError::NotFound(format!("container {}", name)));
        }
        info!("Mock: removed container {}", name);
        Ok(())
    }

    fn container_exists(&self, name: &str) -> Result<bool> {
        validate_container_name(name)?;
        Ok(self.containers.lock().unwrap().contains_key(name))
    }

    fn list_containers(&self) -> Result<Vec<String>> {
        Ok(self.containers.lock().unwrap().keys().cloned().collect())
    }

    fn put_object(&self, container: &str, object: &str, reader: &mut dyn Read) -> Result<String> {
        validate_container_name(container)?;
        validate_object_name(object)?;
        self.injected(&self.fail_puts, "put")?;

        let mut content = Vec::new();
        let hash = copy_and_hash(reader, &mut content)?;

        let mut containers = self.containers.lock().unwrap();
        let objects = containers
            .get_mut(container)
            .ok_or_else(|| VaultError::NotFound(format!("container {}", container)))?;
        objects.insert(object.to_string(), content);
        info!("Mock: stored object {}/{} with hash {}", container, object, hash);
        Ok(hash)
    }

    fn object_exists(&self, container: &str, object: &str) -> Result<bool> {
        validate_container_name(container)?;
        validate_object_name(object)?;
        let containers = self.containers.lock().unwrap();
        Ok(containers
            .get(container)
            .map(|objects| objects.contains_key(object))
            .unwrap_or(false))
    }

    fn remove_object(&self, container: &str, object: &str) -> Result<()> {
        validate_container_name(container)?;
        validate_object_name(object)?;
        self.injected(&self.fail_object_removals, "object removal")?;

        let mut containers = self.containers.lock().unwrap();
        let removed = containers
            .get_mut(container)
            .and_then(|objects| objects.remove(object));
        if removed.is_none() {
            return Err(VaultError::NotFound(format!("object {}/{}", container, object)));
        }
        info!("Mock: removed object {}/{}", container, object);
        Ok(())
    }

    fn list_objects(&self, container: &str) -> Result<Vec<String>> {
        validate_container_name(container)?;
        let containers = self.containers.lock().unwrap();
        containers
            .get(container)
            .map(|objects| objects.keys().cloned().collect())
            .ok_or_else(|| VaultError::NotFound(format!("container {}", container)))
    }

    fn get_object(&self, container: &str, object: &str) -> Result<Box<dyn Read + Send>> {
        validate_container_name(container)?;
        validate_object_name(object)?;
        let containers = self.containers.lock().unwrap();
        let content = containers
            .get(container)
            .and_then(|objects| objects.get(object))
            .cloned()
            // Same backend message as the real client, normalized the same way.
            .ok_or_else(|| VaultError::Backend(KEY_NOT_FOUND_MESSAGE.to_string()))
            .map_err(|e| normalize_key_error(e, container, object))?;
        Ok(Box::new(Cursor::new(content)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_vault_basic_operations() {
        let vault = MockVault::new();

        assert_eq!(vault.container_count(), 0);
        vault.create_container("ospg-km-2-23").unwrap();
        assert!(vault.container_exists("ospg-km-2-23").unwrap());
        assert!(vault
            .create_container("ospg-km-2-23")
            .unwrap_err()
            .is_already_exists());

        let mut content: &[u8] = b"abc";
        let hash = vault.put_object("ospg-km-2-23", "photo1", &mut content).unwrap();
        assert_eq!(
            hash,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(vault.object_count("ospg-km-2-23"), 1);
        assert_eq!(vault.object_bytes("ospg-km-2-23", "photo1").unwrap(), b"abc");

        let mut stream = vault.get_object("ospg-km-2-23", "photo1").unwrap();
        let mut buf = Vec::new();
        stream.read_to_end(&mut buf).unwrap();
        assert_eq!(buf, b"abc");

        vault.remove_object("ospg-km-2-23", "photo1").unwrap();
        assert_eq!(vault.object_count("ospg-km-2-23"), 0);
        vault.remove_container("ospg-km-2-23").unwrap();
        assert_eq!(vault.container_count(), 0);
    }

    #[test]
    fn test_mock_vault_missing_key_is_not_found() {
        let vault = MockVault::new();
        vault.create_container("ospg-km-2-23").unwrap();

        assert!(vault.get_object("ospg-km-2-23", "missing").err().unwrap().is_not_found());
        assert!(vault.remove_object("ospg-km-2-23", "missing").unwrap_err().is_not_found());
        assert!(vault.list_objects("no-such-one").unwrap_err().is_not_found());
    }

    #[test]
    fn test_mock_vault_failure_injection() {
        let vault = MockVault::new();
        vault.create_container("ospg-km-2-23").unwrap();

        vault.set_fail_puts(true);
        let mut content: &[u8] = b"abc";
        let err = vault.put_object("ospg-km-2-23", "photo1", &mut content).unwrap_err();
        assert!(matches!(err, VaultError::Backend(_)));
        vault.set_fail_puts(false);

        let mut content: &[u8] = b"abc";
        vault.put_object("ospg-km-2-23", "photo1", &mut content).unwrap();

        vault.set_fail_object_removals(true);
        assert!(vault.remove_object("ospg-km-2-23", "photo1").is_err());
        vault.set_fail_object_removals(false);
        vault.remove_object("ospg-km-2-23", "photo1").unwrap();
    }

    #[test]
    fn test_mock_vault_listing_is_sorted() {
        let vault = MockVault::new();
        vault.create_container("bbb-k-1-23").unwrap();
        vault.create_container("aaa-k-1-23").unwrap();
        assert_eq!(vault.list_containers().unwrap(), vec!["aaa-k-1-23", "bbb-k-1-23"]);
    }
}
