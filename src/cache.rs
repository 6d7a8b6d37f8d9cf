use std::{
    collections::BTreeMap,
    io,
    path::{Path, PathBuf},
};

use chrono::Utc;
use futures::TryFutureExt;
use tokio::fs;

use crate::TemporaryCredentials;

/// The schema version of the credential cache.
pub const CACHE_FILE_VERSION: &str = "1.0.0";

const CACHE_MARGIN_MINUTES: i64 = 5;

/// Versioned credentials, keyed by identity fingerprint (or profile name).
#[derive(Clone, Debug, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct CredentialCacheFile {
    /// The schema version.
    pub version: String,

    /// Cached credentials per key.
    #[serde(default)]
    pub credentials: BTreeMap<String, TemporaryCredentials>,
}

impl Default for CredentialCacheFile {
    fn default() -> Self {
        Self {
            version: CACHE_FILE_VERSION.to_string(),
            credentials: BTreeMap::new(),
        }
    }
}

/// A file of previously issued credentials.
///
/// A cache without a path never returns or stores anything.
#[derive(Debug)]
pub struct CredentialCache {
    path: Option<PathBuf>,
    margin: chrono::Duration,
}

impl CredentialCache {
    /// A cache backed by the file at `path`.
    ///
    /// Credentials stop being handed out five minutes before they expire.
    #[must_use]
    pub fn new(path: Option<PathBuf>) -> Self {
        Self {
            path,
            margin: chrono::Duration::minutes(CACHE_MARGIN_MINUTES),
        }
    }

    /// Stop handing out credentials `margin` before they expire.
    #[must_use]
    pub fn with_margin(self, margin: chrono::Duration) -> Self {
        Self { margin, ..self }
    }

    /// The cache file location, if caching is enabled.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Cached credentials for `key`, if they are still usable.
    ///
    /// Expired entries are left for the next [`store`](Self::store) to replace.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache file can't be read, is corrupt, or has a different version.
    pub async fn lookup(&self, key: &str) -> Result<Option<TemporaryCredentials>, CacheError> {
        let Some(path) = &self.path else {
            return Ok(None);
        };
        let Some(mut file) = read(path).await? else {
            return Ok(None);
        };

        let now = Utc::now();
        Ok(file
            .credentials
            .remove(key)
            .filter(|credentials| credentials.is_usable_at(now, self.margin)))
    }

    /// Cache `credentials` under `key`, if `remember` is set.
    ///
    /// A corrupt cache file is replaced by one holding only the new entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the existing cache file can't be read or has a different version, or if
    /// the new one can't be written.
    pub async fn store(
        &self,
        key: &str,
        credentials: &TemporaryCredentials,
        remember: bool,
    ) -> Result<(), CacheError> {
        let Some(path) = self.path.as_deref().filter(|_| remember) else {
            return Ok(());
        };

        let mut file = match read(path).await {
            Ok(file) => file.unwrap_or_default(),
            Err(error @ CacheError::Corrupt { .. }) => {
                tracing::debug!(%error, "replacing corrupt cache file");
                CredentialCacheFile::default()
            }
            Err(error) => return Err(error),
        };
        file.credentials.insert(key.to_string(), credentials.clone());

        let content = serde_json::to_string_pretty(&file)
            .map_err(|error| CacheError::write(path, error))?;
        fs::create_dir_all(path.parent().unwrap_or_else(|| Path::new(".")))
            .and_then(|()| fs::write(path, &content))
            .and_then(|()| restrict_permissions(path))
            .await
            .map_err(|error| CacheError::write(path, error))
    }
}

async fn read(path: &Path) -> Result<Option<CredentialCacheFile>, CacheError> {
    let content = match fs::read_to_string(path).await {
        Ok(content) => content,
        Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(error) => return Err(CacheError::read(path, error)),
    };

    let file: CredentialCacheFile =
        serde_json::from_str(&content).map_err(|error| CacheError::Corrupt {
            path: path.to_path_buf(),
            message: error.to_string(),
        })?;
    if file.version != CACHE_FILE_VERSION {
        return Err(CacheError::VersionMismatch {
            path: path.to_path_buf(),
            found: file.version,
            expected: CACHE_FILE_VERSION,
        });
    }
    Ok(Some(file))
}

#[cfg(unix)]
async fn restrict_permissions(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).await
}

#[cfg(not(unix))]
async fn restrict_permissions(_path: &Path) -> io::Result<()> {
    Ok(())
}

/// An error that occurred interacting with the credential cache.
///
/// This could be due to insufficient permissions, corrupt data, or an usual OS configuration.
/// The error message should be sufficient to aid end-user debugging.
#[allow(clippy::module_name_repetitions)]
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// The cache file couldn't be read or written.
    #[error("failed to {action} cache file {}: {message}", path.display())]
    Io {
        /// What was being attempted.
        action: &'static str,
        /// The cache location.
        path: PathBuf,
        /// The underlying error.
        message: String,
    },

    /// The cache file isn't a valid credential cache.
    #[error("corrupt cache file {}: {message}", path.display())]
    Corrupt {
        /// The cache location.
        path: PathBuf,
        /// What was wrong with it.
        message: String,
    },

    /// The cache file was written with another schema version.
    #[error("cache file {} has version {found}, expected {expected}", path.display())]
    VersionMismatch {
        /// The cache location.
        path: PathBuf,
        /// The version in the file.
        found: String,
        /// The version this crate reads.
        expected: &'static str,
    },
}

impl CacheError {
    fn read(path: &Path, error: impl ToString) -> Self {
        Self::Io {
            action: "read",
            path: path.to_path_buf(),
            message: error.to_string(),
        }
    }

    fn write(path: &Path, error: impl ToString) -> Self {
        Self::Io {
            action: "write",
            path: path.to_path_buf(),
            message: error.to_string(),
        }
    }
}
