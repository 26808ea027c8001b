//! Local filesystem object vault implementation
//!
//! Containers are directories under a base path and objects are files
//! within them. `fs::create_dir` supplies the create-fails-if-exists
//! semantics the lifecycle layer relies on for racing creates.

use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::error::{Result, VaultError};
use crate::vault::{
    copy_and_hash, normalize_key_error, validate_container_name, validate_object_name,
    ObjectVault, KEY_NOT_FOUND_MESSAGE,
};

/// Local filesystem object vault.
pub struct LocalVault {
    base_path: PathBuf,
}

impl LocalVault {
    /// Create a vault rooted at `base_path`, creating the directory if it
    /// does not exist yet.
    pub fn new(base_path: impl Into<PathBuf>) -> Result<Self> {
        let base_path = base_path.into();
        if !base_path.exists() {
            fs::create_dir_all(&base_path)?;
        }
        info!("Using local vault directory: {}", base_path.display());
        Ok(Self { base_path })
    }

    fn container_path(&self, name: &str) -> Result<PathBuf> {
        // Validation doubles as path-traversal protection: a valid
        // container name cannot contain separators.
        validate_container_name(name)?;
        Ok(self.base_path.join(name))
    }

    fn object_path(&self, container: &str, object: &str) -> Result<PathBuf> {
        let dir = self.container_path(container)?;
        validate_object_name(object)?;
        Ok(dir.join(object))
    }

    fn require_container(&self, name: &str) -> Result<PathBuf> {
        let dir = self.container_path(name)?;
        if !dir.is_dir() {
            return Err(VaultError::NotFound(format!("container {}", name)));
        }
        Ok(dir)
    }

    /// Probe an object's metadata the way an S3 client's stat call would,
    /// surfacing the backend's verbatim missing-key message.
    fn stat_object(&self, container: &str, object: &str) -> Result<()> {
        let path = self.object_path(container, object)?;
        match fs::metadata(&path) {
            Ok(meta) if meta.is_file() => Ok(()),
            Ok(_) => Err(VaultError::Backend(KEY_NOT_FOUND_MESSAGE.to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(VaultError::Backend(KEY_NOT_FOUND_MESSAGE.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn list_dir_names(path: &Path, dirs: bool) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(path)? {
            let entry = entry?;
            let is_dir = entry.file_type()?.is_dir();
            if is_dir == dirs {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }
}

impl ObjectVault for LocalVault {
    fn create_container(&self, name: &str) -> Result<()> {
        let dir = self.container_path(name)?;
        match fs::create_dir(&dir) {
            Ok(()) => {
                info!("Created container {}", name);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(VaultError::AlreadyExists(format!("container {}", name)))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn remove_container(&self, name: &str) -> Result<()> {
        let dir = self.require_container(name)?;
        fs::remove_dir_all(&dir)?;
        info!("Removed container {}", name);
        Ok(())
    }

    fn container_exists(&self, name: &str) -> Result<bool> {
        Ok(self.container_path(name)?.is_dir())
    }

    fn list_containers(&self) -> Result<Vec<String>> {
        Self::list_dir_names(&self.base_path, true)
    }

    fn put_object(&self, container: &str, object: &str, reader: &mut dyn Read) -> Result<String> {
        self.require_container(container)?;
        let path = self.object_path(container, object)?;

        let mut file = File::create(&path)?;
        let hash = match copy_and_hash(reader, &mut file) {
            Ok(hash) => hash,
            Err(e) => {
                // A failed S3 put leaves no key behind; match that here.
                drop(file);
                if let Err(cleanup) = fs::remove_file(&path) {
                    warn!("Failed to remove partial object {}/{}: {}", container, object, cleanup);
                }
                return Err(e);
            }
        };

        info!("Stored object {}/{} with hash {}", container, object, hash);
        Ok(hash)
    }

    fn object_exists(&self, container: &str, object: &str) -> Result<bool> {
        Ok(self.object_path(container, object)?.is_file())
    }

    fn remove_object(&self, container: &str, object: &str) -> Result<()> {
        let path = self.object_path(container, object)?;
        if !path.is_file() {
            return Err(VaultError::NotFound(format!(
                "object {}/{}",
                container, object
            )));
        }
        fs::remove_file(&path)?;
        info!("Removed object {}/{}", container, object);
        Ok(())
    }

    fn list_objects(&self, container: &str) -> Result<Vec<String>> {
        let dir = self.require_container(container)?;
        Self::list_dir_names(&dir, false)
    }

    fn get_object(&self, container: &str, object: &str) -> Result<Box<dyn Read + Send>> {
        let path = self.object_path(container, object)?;
        // Probe the metadata before handing out the stream; the open alone
        // is not proof the key exists with every backend.
        self.stat_object(container, object)
            .map_err(|e| normalize_key_error(e, container, object))?;
        let file = File::open(path)?;
        Ok(Box::new(file))
    }
}
