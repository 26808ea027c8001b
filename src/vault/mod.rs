//! Object Vault Abstraction
//!
//! This module provides an abstraction over the object store that backs
//! case containers and evidence objects, allowing the system to use
//! different backends (local filesystem, in-memory mock, a real S3-style
//! service) without affecting the lifecycle services.
//!
//! Every operation is a single synchronous round trip with no internal
//! retry; transient failures propagate to the caller, which decides
//! whether to compensate.

pub mod config;
pub mod local_store;
pub mod mock_store;

use std::io::{Read, Write};

use sha2::{Digest, Sha256};

use crate::error::{Result, VaultError};

/// Error string reported by S3-style backends for a missing key. Backends
/// surface it verbatim; [`normalize_key_error`] turns it into the typed
/// `NotFound` so callers never have to match on it themselves.
pub const KEY_NOT_FOUND_MESSAGE: &str = "The specified key does not exist.";

/// Trait defining the object vault interface.
///
/// Containers are the store's unit of namespace for a case (one container
/// per case); objects are the evidence files within a container.
pub trait ObjectVault: Send + Sync {
    /// Create a container. Fails with `AlreadyExists` if a container with
    /// this name is already present, `InvalidRequest` if the name violates
    /// the container naming rules.
    fn create_container(&self, name: &str) -> Result<()>;

    /// Remove a container and everything in it. `NotFound` if absent.
    fn remove_container(&self, name: &str) -> Result<()>;

    /// Check whether a container exists.
    fn container_exists(&self, name: &str) -> Result<bool>;

    /// List all container names.
    fn list_containers(&self) -> Result<Vec<String>>;

    /// Stream `reader` into an object, hashing the bytes as they pass
    /// through. Returns the lowercase hex SHA-256 digest of the content.
    /// Fails with `InvalidRequest` if the object name contains `/` or a
    /// space, `NotFound` if the container is absent.
    fn put_object(&self, container: &str, object: &str, reader: &mut dyn Read) -> Result<String>;

    /// Check whether an object exists within a container.
    fn object_exists(&self, container: &str, object: &str) -> Result<bool>;

    /// Remove a single object. `NotFound` if absent.
    fn remove_object(&self, container: &str, object: &str) -> Result<()>;

    /// List the object names within a container. `NotFound` if the
    /// container is absent.
    fn list_objects(&self, container: &str) -> Result<Vec<String>>;

    /// Open an object for reading. Implementations must probe the object's
    /// metadata before returning the stream: with S3-style clients the
    /// open alone can succeed for a nonexistent key and only error on the
    /// first read. `NotFound` if the key does not exist.
    fn get_object(&self, container: &str, object: &str) -> Result<Box<dyn Read + Send>>;
}

/// Validate a container name against the store's naming rules: 3-63
/// characters, lowercase letters, digits, `.` and `-` only, starting and
/// ending with a letter or digit.
pub fn validate_container_name(name: &str) -> Result<()> {
    if name.len() < 3 || name.len() > 63 {
        return Err(VaultError::InvalidRequest(format!(
            "container name must be 3-63 characters, got {} ({:?})",
            name.len(),
            name
        )));
    }
    let valid_char = |c: char| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '.' || c == '-';
    if !name.chars().all(valid_char) {
        return Err(VaultError::InvalidRequest(format!(
            "container name may only contain lowercase letters, digits, '.' and '-': {:?}",
            name
        )));
    }
    let edge_ok = |c: Option<char>| c.map(|c| c.is_ascii_alphanumeric()).unwrap_or(false);
    if !edge_ok(name.chars().next()) || !edge_ok(name.chars().last()) {
        return Err(VaultError::InvalidRequest(format!(
            "container name must start and end with a letter or digit: {:?}",
            name
        )));
    }
    Ok(())
}

/// Validate an object name: non-empty, no `/`, no space. Object names
/// become store keys, so path separators and spaces are rejected outright.
pub fn validate_object_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(VaultError::InvalidRequest(
            "object name must not be empty".to_string(),
        ));
    }
    if name.contains('/') || name.contains(' ') {
        return Err(VaultError::InvalidRequest(format!(
            "object name must not contain '/' or spaces: {:?}",
            name
        )));
    }
    Ok(())
}

/// Copy `reader` into `writer` while feeding the same bytes through a
/// SHA-256 accumulator, in one pass with no whole-payload buffering.
/// Returns the lowercase hex digest.
pub fn copy_and_hash(reader: &mut dyn Read, writer: &mut dyn Write) -> Result<String> {
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        writer.write_all(&buf[..n])?;
    }
    writer.flush()?;
    Ok(hex::encode(hasher.finalize()))
}

/// Normalize a backend error: the well-known missing-key message becomes
/// the typed `NotFound`, anything else passes through unchanged.
pub fn normalize_key_error(err: VaultError, container: &str, object: &str) -> VaultError {
    if let VaultError::Backend(msg) = &err {
        if msg.contains(KEY_NOT_FOUND_MESSAGE) {
            return VaultError::NotFound(format!("object {}/{}", container, object));
        }
    }
    err
}
