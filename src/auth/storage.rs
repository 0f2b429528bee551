//! Durable key/value storage for session tokens.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

/// Key holding the access token.
pub const TOKEN_KEY: &str = "token";
/// Key holding the refresh token.
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";
/// Key holding the RFC 3339 time of the last command run in this session.
pub const LAST_ACTIVITY_KEY: &str = "last_activity";

/// Errors that can occur while persisting session tokens.
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("Failed to read session file '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to write session file '{}': {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse session file '{}': {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },
    #[error("Failed to encode session: {0}")]
    Encode(#[from] serde_yaml::Error),
}

/// Simple durable string storage the credential store persists into.
pub trait SessionStorage: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, CredentialError>;
    fn set(&self, key: &str, value: &str) -> Result<(), CredentialError>;
    fn remove(&self, key: &str) -> Result<(), CredentialError>;
}

/// Session storage backed by a small YAML file.
///
/// The whole file is rewritten on every change. It holds a few short strings.
#[derive(Debug)]
pub struct FileSessionStorage {
    path: PathBuf,
    // Serializes read-modify-write cycles within the process.
    lock: Mutex<()>,
}

impl FileSessionStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<BTreeMap<String, String>, CredentialError> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let contents = std::fs::read_to_string(&self.path).map_err(|e| CredentialError::Read {
            path: self.path.clone(),
            source: e,
        })?;
        if contents.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_yaml::from_str(&contents).map_err(|e| CredentialError::Parse {
            path: self.path.clone(),
            source: e,
        })
    }

    fn write_all(&self, values: &BTreeMap<String, String>) -> Result<(), CredentialError> {
        let write_err = |e| CredentialError::Write {
            path: self.path.clone(),
            source: e,
        };

        if values.is_empty() {
            return match std::fs::remove_file(&self.path) {
                Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(write_err(e)),
                _ => Ok(()),
            };
        }

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }
        let yaml = serde_yaml::to_string(values)?;
        std::fs::write(&self.path, yaml).map_err(write_err)?;
        restrict_permissions(&self.path).map_err(write_err)
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

impl SessionStorage for FileSessionStorage {
    fn get(&self, key: &str) -> Result<Option<String>, CredentialError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(self.read_all()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), CredentialError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut values = self.read_all()?;
        values.insert(key.to_string(), value.to_string());
        self.write_all(&values)
    }

    fn remove(&self, key: &str) -> Result<(), CredentialError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut values = self.read_all()?;
        if values.remove(key).is_some() {
            self.write_all(&values)?;
        }
        Ok(())
    }
}

/// Non-durable storage for tests and throwaway sessions.
#[derive(Debug, Default)]
pub struct MemorySessionStorage {
    values: Mutex<HashMap<String, String>>,
}

impl MemorySessionStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(self, key: &str, value: &str) -> Self {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.to_string());
        self
    }
}

impl SessionStorage for MemorySessionStorage {
    fn get(&self, key: &str) -> Result<Option<String>, CredentialError> {
        let values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), CredentialError> {
        let mut values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), CredentialError> {
        let mut values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        values.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_file_storage_roundtrip() {
        let temp_dir = tempdir().unwrap();
        let storage = FileSessionStorage::new(temp_dir.path().join("nested/credentials.yaml"));

        assert_eq!(storage.get(TOKEN_KEY).unwrap(), None);

        storage.set(TOKEN_KEY, "access").unwrap();
        storage.set(REFRESH_TOKEN_KEY, "refresh").unwrap();

        // A second handle sees the persisted values
        let reopened = FileSessionStorage::new(storage.path());
        assert_eq!(reopened.get(TOKEN_KEY).unwrap().as_deref(), Some("access"));
        assert_eq!(
            reopened.get(REFRESH_TOKEN_KEY).unwrap().as_deref(),
            Some("refresh")
        );
    }

    #[test]
    fn test_file_storage_remove_last_key_deletes_file() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("credentials.yaml");
        let storage = FileSessionStorage::new(&path);

        storage.set(TOKEN_KEY, "access").unwrap();
        assert!(path.exists());

        storage.remove(TOKEN_KEY).unwrap();
        assert!(!path.exists());

        // Removing again is fine
        storage.remove(TOKEN_KEY).unwrap();
    }

    #[test]
    fn test_file_storage_parse_error() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("credentials.yaml");
        std::fs::write(&path, "token: [unclosed").unwrap();

        let storage = FileSessionStorage::new(&path);
        let err = storage.get(TOKEN_KEY).unwrap_err();
        assert!(err.to_string().contains("Failed to parse session file"));
    }

    #[cfg(unix)]
    #[test]
    fn test_file_storage_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("credentials.yaml");
        FileSessionStorage::new(&path).set(TOKEN_KEY, "x").unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_memory_storage() {
        let storage = MemorySessionStorage::new().with_value(TOKEN_KEY, "seed");
        assert_eq!(storage.get(TOKEN_KEY).unwrap().as_deref(), Some("seed"));
        storage.remove(TOKEN_KEY).unwrap();
        assert_eq!(storage.get(TOKEN_KEY).unwrap(), None);
    }
}
