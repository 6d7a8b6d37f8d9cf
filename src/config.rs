use std::{
    collections::BTreeMap,
    io,
    ops::RangeInclusive,
    path::{Path, PathBuf},
    time::Duration,
};

use sha2::{Digest, Sha512};
use tokio::fs;

/// The schema version of the configuration store.
pub const CONFIG_FILE_VERSION: &str = "1.0.0";

const DURATION_HOURS: RangeInclusive<i64> = 1..=12;
const DEFAULT_DURATION_HOURS: u64 = 1;

/// Identifies an identity provider login and what to do with it.
///
/// Fields left empty (or `false`, or `0`) are "not provided", which is what makes
/// [`merge`](Self::merge) work for partially entered configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct Configuration {
    /// The Azure AD tenant ID.
    pub azure_tenant_id: String,

    /// The App ID URI of the enterprise application that federates with AWS.
    pub azure_app_id_uri: String,

    /// The Azure AD username.
    pub azure_username: String,

    /// The Okta username.
    pub okta_username: String,

    /// Whether configuration and issued credentials should be remembered.
    pub remember_me: bool,

    /// The role ARN to pick without prompting, if the assertion offers it.
    pub default_jump_role: String,

    /// The account to chain into after assuming the jump role.
    pub destination_account_id: String,

    /// The role to chain into in `destination_account_id`.
    pub destination_role_name: String,

    /// Requested session duration, in hours (1-12).
    pub default_duration_hours: i64,

    /// The region used for STS calls.
    pub region: String,
}

impl Configuration {
    /// A stable fingerprint of the identity this configuration logs in as.
    ///
    /// Only the tenant, app ID URI and usernames contribute, so the fingerprint survives changes
    /// to roles, durations or regions.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let input = format!(
            "{}|{}|{}|{}",
            self.azure_tenant_id, self.azure_app_id_uri, self.azure_username, self.okta_username
        );
        format!("{:x}", Sha512::digest(input.as_bytes()))
    }

    /// Merge newly entered configuration onto `self`, returning the result.
    ///
    /// Text fields are replaced by non-empty values, `remember_me` can only be switched on, and
    /// `default_duration_hours` is only replaced by values between 1 and 12.
    #[must_use]
    pub fn merge(&self, update: &Self) -> Self {
        Self {
            azure_tenant_id: merge_text(&self.azure_tenant_id, &update.azure_tenant_id),
            azure_app_id_uri: merge_text(&self.azure_app_id_uri, &update.azure_app_id_uri),
            azure_username: merge_text(&self.azure_username, &update.azure_username),
            okta_username: merge_text(&self.okta_username, &update.okta_username),
            remember_me: self.remember_me || update.remember_me,
            default_jump_role: merge_text(&self.default_jump_role, &update.default_jump_role),
            destination_account_id: merge_text(
                &self.destination_account_id,
                &update.destination_account_id,
            ),
            destination_role_name: merge_text(
                &self.destination_role_name,
                &update.destination_role_name,
            ),
            default_duration_hours: if DURATION_HOURS.contains(&update.default_duration_hours) {
                update.default_duration_hours
            } else {
                self.default_duration_hours
            },
            region: merge_text(&self.region, &update.region),
        }
    }

    /// The session duration to request, defaulting to one hour.
    #[must_use]
    pub fn session_duration(&self) -> Duration {
        let hours = if DURATION_HOURS.contains(&self.default_duration_hours) {
            self.default_duration_hours.unsigned_abs()
        } else {
            DEFAULT_DURATION_HOURS
        };
        Duration::from_secs(hours * 60 * 60)
    }

    /// The destination role to chain into, if one is configured.
    pub(crate) fn destination(&self) -> Option<(&str, &str)> {
        if self.destination_account_id.is_empty() || self.destination_role_name.is_empty() {
            None
        } else {
            Some((&self.destination_account_id, &self.destination_role_name))
        }
    }
}

fn merge_text(base: &str, update: &str) -> String {
    let value = if update.is_empty() { base } else { update };
    value.to_string()
}

/// Versioned configuration, keyed by profile name.
#[derive(Clone, Debug, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct ConfigurationStore {
    /// The schema version, always [`CONFIG_FILE_VERSION`] once loaded.
    pub version: String,

    /// Configuration per profile.
    #[serde(default)]
    pub configs: BTreeMap<String, Configuration>,
}

impl Default for ConfigurationStore {
    fn default() -> Self {
        Self {
            version: CONFIG_FILE_VERSION.to_string(),
            configs: BTreeMap::new(),
        }
    }
}

impl ConfigurationStore {
    /// Parse a store from YAML.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Corrupt`] if the document can't be decoded and
    /// [`ConfigError::VersionMismatch`] if it was written with a different schema version.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let store: Self = serde_yaml::from_str(content).map_err(ConfigError::Corrupt)?;
        if store.version != CONFIG_FILE_VERSION {
            return Err(ConfigError::VersionMismatch {
                found: store.version,
                expected: CONFIG_FILE_VERSION,
            });
        }
        Ok(store)
    }

    /// Render the store as YAML.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Corrupt`] if serialization fails.
    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        serde_yaml::to_string(self).map_err(ConfigError::Corrupt)
    }

    /// Load the store at `path`, or an empty store if the file doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file can't be read or isn't a valid store.
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        match fs::read_to_string(path).await {
            Ok(content) => Self::from_yaml(&content),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(Self::default()),
            Err(source) => Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Write the store to `path`, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the store can't be serialized or written.
    pub async fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = self.to_yaml()?;
        let write = |source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(write)?;
        }
        fs::write(path, content).await.map_err(write)
    }

    /// The configuration stored for `profile`.
    #[must_use]
    pub fn get(&self, profile: &str) -> Option<&Configuration> {
        self.configs.get(profile)
    }

    /// Insert or replace the configuration for `profile`.
    pub fn upsert(&mut self, profile: impl Into<String>, config: Configuration) {
        self.configs.insert(profile.into(), config);
    }
}

/// An error indicating missing or invalid configuration.
#[allow(clippy::module_name_repetitions)]
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration store couldn't be read.
    #[error("unable to read config file {}: {source}", path.display())]
    Read {
        /// The store location.
        path: PathBuf,
        /// The underlying error.
        source: io::Error,
    },

    /// The configuration store couldn't be written.
    #[error("unable to write config file {}: {source}", path.display())]
    Write {
        /// The store location.
        path: PathBuf,
        /// The underlying error.
        source: io::Error,
    },

    /// The configuration store isn't valid YAML of the expected shape.
    #[error("corrupt config file: {0}")]
    Corrupt(#[source] serde_yaml::Error),

    /// The configuration store was written with another schema version.
    #[error("config file version {found} is not supported (expected {expected})")]
    VersionMismatch {
        /// The version in the file.
        found: String,
        /// The version this crate reads.
        expected: &'static str,
    },

    /// The requested profile isn't stored and no configuration was supplied for it.
    #[error("profile {0} is not defined in the config file")]
    UnknownProfile(String),

    /// Required configuration fields are empty.
    #[error("incomplete configuration; missing: {}", .0.join(", "))]
    Incomplete(Vec<&'static str>),

    /// A configuration field has a value that can't be used.
    #[error("invalid {field}: {message}")]
    Invalid {
        /// The offending field.
        field: &'static str,
        /// What was wrong with it.
        message: String,
    },

    /// The login request couldn't be encoded.
    #[error("failed to encode login request: {0}")]
    Encoding(#[source] io::Error),

    /// The environment couldn't be used to locate configuration.
    #[error("{0}")]
    Environment(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn populated() -> Configuration {
        Configuration {
            azure_tenant_id: "tenant".to_string(),
            azure_app_id_uri: "https://signin.aws.amazon.com/saml#1".to_string(),
            azure_username: "someone@example.com".to_string(),
            okta_username: "someone".to_string(),
            remember_me: true,
            default_jump_role: "arn:aws:iam::111111111111:role/Jump".to_string(),
            destination_account_id: "222222222222".to_string(),
            destination_role_name: "Admin".to_string(),
            default_duration_hours: 4,
            region: "eu-west-1".to_string(),
        }
    }

    #[test]
    fn fingerprint_ignores_non_identity_fields() {
        let a = populated();
        let b = Configuration {
            remember_me: false,
            default_jump_role: String::new(),
            destination_account_id: "333333333333".to_string(),
            destination_role_name: String::new(),
            default_duration_hours: 9,
            region: "us-east-1".to_string(),
            ..populated()
        };
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint().len(), 128);
        assert!(a.fingerprint().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn fingerprint_changes_with_identity() {
        let a = populated();
        let b = Configuration {
            okta_username: "someone-else".to_string(),
            ..populated()
        };
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn fingerprint_field_boundaries_are_separated() {
        let a = Configuration {
            azure_tenant_id: "ab".to_string(),
            azure_app_id_uri: "c".to_string(),
            ..Configuration::default()
        };
        let b = Configuration {
            azure_tenant_id: "a".to_string(),
            azure_app_id_uri: "bc".to_string(),
            ..Configuration::default()
        };
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn merge_with_empty_update_keeps_base() {
        let base = populated();
        assert_eq!(base.merge(&Configuration::default()), base);
    }

    #[test]
    fn merge_with_full_update_takes_update() {
        let base = populated();
        let update = Configuration {
            azure_tenant_id: "other-tenant".to_string(),
            azure_app_id_uri: "urn:other".to_string(),
            azure_username: "other@example.com".to_string(),
            okta_username: "other".to_string(),
            remember_me: true,
            default_jump_role: "arn:aws:iam::999999999999:role/Other".to_string(),
            destination_account_id: "999999999999".to_string(),
            destination_role_name: "ReadOnly".to_string(),
            default_duration_hours: 12,
            region: "ap-southeast-2".to_string(),
        };
        assert_eq!(base.merge(&update), update);
    }

    #[test]
    fn merge_never_switches_remember_off() {
        let base = populated();
        let update = Configuration {
            remember_me: false,
            ..Configuration::default()
        };
        assert!(base.merge(&update).remember_me);

        let forgetful = Configuration {
            remember_me: false,
            ..populated()
        };
        let update = Configuration {
            remember_me: true,
            ..Configuration::default()
        };
        assert!(forgetful.merge(&update).remember_me);
    }

    #[test]
    fn merge_ignores_out_of_range_durations() {
        let base = populated();
        for hours in [0, 13, -1] {
            let update = Configuration {
                default_duration_hours: hours,
                ..Configuration::default()
            };
            assert_eq!(base.merge(&update).default_duration_hours, 4, "{hours}");
        }
        for hours in [1, 12] {
            let update = Configuration {
                default_duration_hours: hours,
                ..Configuration::default()
            };
            assert_eq!(base.merge(&update).default_duration_hours, hours);
        }
    }

    #[test]
    fn session_duration_falls_back_to_one_hour() {
        assert_eq!(
            populated().session_duration(),
            Duration::from_secs(4 * 60 * 60)
        );
        assert_eq!(
            Configuration::default().session_duration(),
            Duration::from_secs(60 * 60)
        );
    }

    #[test]
    fn destination_requires_account_and_role() {
        assert_eq!(populated().destination(), Some(("222222222222", "Admin")));
        let partial = Configuration {
            destination_role_name: String::new(),
            ..populated()
        };
        assert_eq!(partial.destination(), None);
    }

    #[test]
    fn store_round_trips_through_yaml() {
        let mut store = ConfigurationStore::default();
        store.upsert("work", populated());
        store.upsert("empty", Configuration::default());

        let parsed = ConfigurationStore::from_yaml(&store.to_yaml().unwrap()).unwrap();
        assert_eq!(parsed, store);
    }

    #[test]
    fn store_rejects_other_versions() {
        let error = ConfigurationStore::from_yaml("version: 2.0.0\nconfigs: {}\n").unwrap_err();
        assert!(matches!(
            error,
            ConfigError::VersionMismatch { ref found, .. } if found == "2.0.0"
        ));
    }

    #[test]
    fn store_rejects_garbage() {
        let error = ConfigurationStore::from_yaml("version: [1.0.0\n").unwrap_err();
        assert!(matches!(error, ConfigError::Corrupt(_)));
    }

    #[test]
    fn store_fills_missing_fields_with_defaults() {
        let store = ConfigurationStore::from_yaml(
            "version: 1.0.0\nconfigs:\n  work:\n    azure_tenant_id: tenant\n",
        )
        .unwrap();
        let work = store.get("work").unwrap();
        assert_eq!(work.azure_tenant_id, "tenant");
        assert!(!work.remember_me);
        assert_eq!(work.default_duration_hours, 0);
    }

    #[tokio::test]
    async fn store_loads_missing_file_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigurationStore::load(&dir.path().join("config.yaml"))
            .await
            .unwrap();
        assert_eq!(store, ConfigurationStore::default());
    }

    #[tokio::test]
    async fn store_saves_and_loads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.yaml");
        let mut store = ConfigurationStore::default();
        store.upsert("work", populated());
        store.save(&path).await.unwrap();

        assert_eq!(ConfigurationStore::load(&path).await.unwrap(), store);
    }
}
