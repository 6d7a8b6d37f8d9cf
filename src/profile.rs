use std::{env, path::PathBuf};

use futures::future::BoxFuture;

use crate::{ConfigError, ConfigSource, Configuration, ConfigurationStore, Profile};

const AWS_SAML_CONFIG_FILE: &str = "AWS_SAML_CONFIG_FILE";
const AWS_SAML_CONFIG_FILE_DEFAULT: &[&str] = &[".config", "aws_saml_flow", "config.yaml"];

const AWS_SAML_PROFILE: &str = "AWS_SAML_PROFILE";
const AWS_SAML_PROFILE_DEFAULT: &str = "default";

/// A reference to a profile in the configuration store.
///
/// The default profile source uses the `AWS_SAML_CONFIG_FILE` and `AWS_SAML_PROFILE` environment
/// variables, but this can be overridden with [`with_config_file`](Self::with_config_file) and
/// [`with_profile`](Self::with_profile).
///
/// Values entered by the user can be layered on top of the stored profile with
/// [`with_update`](Self::with_update). If the result has `remember_me` set, it's written back to
/// the store.
///
/// # Example
///
/// ```no_run
/// # #[tokio::main] async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// use std::convert::Infallible;
///
/// use aws_saml_flow::{Configuration, ProfileSource, Role, SamlFlow};
///
/// let my_profile = ProfileSource::default()
///     .with_config_file("saml.yaml")
///     .with_profile("my-profile")
///     .with_update(Configuration {
///         azure_username: "someone@example.com".to_string(),
///         ..Configuration::default()
///     });
///
/// let flow = SamlFlow::builder()
///     .config(my_profile)
///     .authenticator(|_config: Configuration| async move { Ok::<_, Infallible>(String::new()) })
///     .role_prompt(|roles: Vec<Role>| async move { Ok::<_, Infallible>(roles.first().cloned()) })
///     .build()
///     .await?;
/// # Ok(()) }
/// ```
#[allow(clippy::module_name_repetitions)]
#[derive(Clone, Debug, Default)]
pub struct ProfileSource {
    config_file: Option<PathBuf>,
    profile: Option<String>,
    update: Option<Configuration>,
}

impl ProfileSource {
    /// Set the location of the configuration store.
    #[must_use]
    pub fn with_config_file(self, path: impl Into<PathBuf>) -> Self {
        Self {
            config_file: Some(path.into()),
            ..self
        }
    }

    /// Set the profile.
    #[must_use]
    pub fn with_profile(self, name: impl Into<String>) -> Self {
        Self {
            profile: Some(name.into()),
            ..self
        }
    }

    /// Merge `update` onto the stored profile.
    ///
    /// See [`Configuration::merge`] for how values are combined. The profile doesn't need to exist
    /// in the store when an update is given.
    #[must_use]
    pub fn with_update(self, update: Configuration) -> Self {
        Self {
            update: Some(update),
            ..self
        }
    }
}

impl ConfigSource for ProfileSource {
    type Future = BoxFuture<'static, Result<Profile, Self::Error>>;

    type Error = ConfigError;

    fn load(self) -> Self::Future {
        Box::pin(async move {
            let path = self.config_file.map_or_else(get_config_file_from_env, Ok)?;
            let name = self.profile.map_or_else(get_profile_from_env, Ok)?;

            let mut store = ConfigurationStore::load(&path).await?;
            let config = match (store.get(&name), self.update) {
                (Some(stored), Some(update)) => stored.merge(&update),
                (None, Some(update)) => Configuration::default().merge(&update),
                (Some(stored), None) => {
                    let config = stored.clone();
                    return Ok(Profile { name, config });
                }
                (None, None) => return Err(ConfigError::UnknownProfile(name)),
            };

            if config.remember_me {
                tracing::debug!(profile = %name, path = %path.display(), "saving configuration");
                store.upsert(name.clone(), config.clone());
                store.save(&path).await?;
            }

            Ok(Profile { name, config })
        })
    }
}

fn get_config_file_from_env() -> Result<PathBuf, ConfigError> {
    read_env(AWS_SAML_CONFIG_FILE)
        .map_err(|error| {
            ConfigError::Environment(format!(
                "invalid path in environment variable {AWS_SAML_CONFIG_FILE}: {error}",
            ))
        })?
        .map(PathBuf::from)
        .map_or_else(
            || {
                let mut path = dirs_next::home_dir().ok_or_else(|| {
                    ConfigError::Environment("could not determine home directory".to_string())
                })?;
                for segment in AWS_SAML_CONFIG_FILE_DEFAULT {
                    path.push(segment);
                }
                Ok(path)
            },
            Ok,
        )
}

fn get_profile_from_env() -> Result<String, ConfigError> {
    Ok(read_env(AWS_SAML_PROFILE)
        .map_err(|error| {
            ConfigError::Environment(format!(
                "invalid profile name in environment variable {AWS_SAML_PROFILE}: {error}",
            ))
        })?
        .unwrap_or_else(|| AWS_SAML_PROFILE_DEFAULT.to_string()))
}

fn read_env(name: &str) -> Result<Option<String>, String> {
    env::var(name).map(Some).or_else(|error| match error {
        env::VarError::NotPresent => Ok(None),
        env::VarError::NotUnicode(data) => Err(format!("{data:?} contains invalid UTF-8")),
    })
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;

    fn source(path: &Path) -> ProfileSource {
        ProfileSource::default()
            .with_config_file(path)
            .with_profile("work")
    }

    fn stored() -> Configuration {
        Configuration {
            azure_tenant_id: "tenant".to_string(),
            azure_app_id_uri: "https://signin.aws.amazon.com/saml#1".to_string(),
            azure_username: "someone@example.com".to_string(),
            default_duration_hours: 4,
            ..Configuration::default()
        }
    }

    async fn write_store(path: &Path, config: Configuration) {
        let mut store = ConfigurationStore::default();
        store.upsert("work", config);
        store.save(path).await.unwrap();
    }

    #[tokio::test]
    async fn loads_stored_profile() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        write_store(&path, stored()).await;

        let profile = source(&path).load().await.unwrap();
        assert_eq!(profile.name, "work");
        assert_eq!(profile.config, stored());
    }

    #[tokio::test]
    async fn unknown_profile() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        write_store(&path, stored()).await;

        let error = source(&path).with_profile("home").load().await.unwrap_err();
        assert!(matches!(error, ConfigError::UnknownProfile(ref name) if name == "home"));

        let error = source(&dir.path().join("missing.yaml"))
            .load()
            .await
            .unwrap_err();
        assert!(matches!(error, ConfigError::UnknownProfile(_)));
    }

    #[tokio::test]
    async fn update_is_merged_but_not_saved_without_remember_me() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        write_store(&path, stored()).await;

        let profile = source(&path)
            .with_update(Configuration {
                azure_username: "other@example.com".to_string(),
                ..Configuration::default()
            })
            .load()
            .await
            .unwrap();
        assert_eq!(profile.config.azure_username, "other@example.com");
        assert_eq!(profile.config.azure_tenant_id, "tenant");

        let store = ConfigurationStore::load(&path).await.unwrap();
        assert_eq!(store.get("work"), Some(&stored()));
    }

    #[tokio::test]
    async fn update_with_remember_me_is_saved() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.yaml");

        let update = Configuration {
            remember_me: true,
            ..stored()
        };
        let profile = source(&path).with_update(update.clone()).load().await.unwrap();
        assert_eq!(profile.config, update);

        let store = ConfigurationStore::load(&path).await.unwrap();
        assert_eq!(store.get("work"), Some(&update));

        // remembered from now on
        let profile = source(&path)
            .with_update(Configuration::default())
            .load()
            .await
            .unwrap();
        assert!(profile.config.remember_me);
    }

    #[tokio::test]
    async fn corrupt_store_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "version: 0.1.0\nconfigs: {}\n").unwrap();

        assert!(matches!(
            source(&path).load().await,
            Err(ConfigError::VersionMismatch { .. })
        ));
    }
}
