use std::{convert::Infallible, fmt, path::PathBuf, sync::Arc, time::Duration};

use aws_config::{BehaviorVersion, SdkConfig};

use crate::{
    sts, Authenticator, Configuration, CredentialCache, CredentialExchanger, ProfileSource, Region,
    RolePrompt, SamlFlow, CLIENT_NAME,
};

const CACHE_FILE_NAME: &str = "credentials.json";

/// Builder for [`SamlFlow`].
///
/// This allows aspects of the authentication flow to be configured. The authenticator and role
/// prompt must be set before the flow can be built.
///
/// # Example
///
/// ```
/// # #[tokio::main] async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// use std::{convert::Infallible, fmt, time::Duration};
///
/// use aws_saml_flow::{Configuration, Profile, Role, SamlFlowBuilder};
///
/// let flow = SamlFlowBuilder::new()
///     // cache credentials in "$PWD/.cache/credentials.json" instead of OS cache dir
///     .cache_file(".cache/credentials.json")
///     // use hard-coded configuration instead of loading from the configuration store
///     .config(Profile {
///         name: "work".to_string(),
///         config: Configuration {
///             azure_tenant_id: "00000000-0000-0000-0000-000000000000".to_string(),
///             azure_app_id_uri: "https://signin.aws.amazon.com/saml#1".to_string(),
///             remember_me: true,
///             ..Configuration::default()
///         },
///     })
///     // give up if the user hasn't logged in after 5 minutes
///     .capture_timeout(Duration::from_secs(5 * 60))
///     // always error when asked to log in
///     .authenticator(|_config: Configuration| async move { Err::<String, _>(NonInteractive) })
///     // never choose between several roles
///     .role_prompt(|_roles: Vec<Role>| async move { Ok::<_, Infallible>(None) })
///     .build()
///     .await
///     .expect("infallible");
///
/// #[derive(Debug)]
/// struct NonInteractive;
///
/// impl fmt::Display for NonInteractive {
///     fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
///         write!(f, "interactive authentication required")
///     }
/// }
///
/// impl std::error::Error for NonInteractive {}
/// # Ok(())
/// # }
/// ```
#[allow(clippy::module_name_repetitions)]
#[derive(Clone)]
pub struct SamlFlowBuilder<S = ProfileSource, A = (), P = ()> {
    cache_file: Option<PathBuf>,
    cache_disabled: bool,
    cache_margin: Option<chrono::Duration>,
    fingerprint_keys: bool,
    capture_timeout: Option<Duration>,
    region: Option<Region>,
    exchanger: Option<Arc<dyn CredentialExchanger>>,
    config_source: S,
    authenticator: A,
    role_prompt: P,
}

impl SamlFlowBuilder<ProfileSource, (), ()> {
    /// Construct a [`SamlFlow`] builder with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Default for SamlFlowBuilder<ProfileSource, (), ()> {
    fn default() -> Self {
        Self {
            cache_file: None,
            cache_disabled: false,
            cache_margin: None,
            fingerprint_keys: true,
            capture_timeout: None,
            region: None,
            exchanger: None,
            config_source: ProfileSource::default(),
            authenticator: (),
            role_prompt: (),
        }
    }
}

impl<S: fmt::Debug, A, P> fmt::Debug for SamlFlowBuilder<S, A, P> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("SamlFlowBuilder")
            .field("cache_file", &self.cache_file)
            .field("cache_disabled", &self.cache_disabled)
            .field("cache_margin", &self.cache_margin)
            .field("fingerprint_keys", &self.fingerprint_keys)
            .field("capture_timeout", &self.capture_timeout)
            .field("region", &self.region)
            .field("config_source", &self.config_source)
            .finish_non_exhaustive()
    }
}

impl<S, A, P> SamlFlowBuilder<S, A, P> {
    /// Set the credential cache file.
    ///
    /// Credentials are cached as JSON, keyed by the identity fingerprint of the configuration.
    /// Nothing is written unless the configuration has `remember_me` set. The cache format is
    /// considered part of the crate's API.
    ///
    /// By default, the cache is created under the user's cache directory (see
    /// [`dirs_next::cache_dir`]) as `aws_saml_flow@0.1/credentials.json`.
    #[must_use]
    pub fn cache_file(self, path: impl Into<PathBuf>) -> Self {
        Self {
            cache_file: Some(path.into()),
            cache_disabled: false,
            ..self
        }
    }

    /// Never read or write cached credentials.
    #[must_use]
    pub fn disable_cache(self) -> Self {
        Self {
            cache_disabled: true,
            ..self
        }
    }

    /// Stop reusing cached credentials `margin` before they expire.
    ///
    /// The default is five minutes.
    #[must_use]
    pub fn cache_margin(self, margin: chrono::Duration) -> Self {
        Self {
            cache_margin: Some(margin),
            ..self
        }
    }

    /// Whether to key cached credentials by identity fingerprint.
    ///
    /// When disabled, credentials are keyed by profile name instead, so changing the identity of a
    /// profile doesn't invalidate its cached credentials. Enabled by default.
    #[must_use]
    pub fn fingerprint_keys(self, enabled: bool) -> Self {
        Self {
            fingerprint_keys: enabled,
            ..self
        }
    }

    /// Fail if the authenticator hasn't captured an assertion within `timeout`.
    ///
    /// By default the flow waits indefinitely.
    #[must_use]
    pub fn capture_timeout(self, timeout: Duration) -> Self {
        Self {
            capture_timeout: Some(timeout),
            ..self
        }
    }

    /// Set the region for AWS STS calls.
    ///
    /// By default the configuration's `region` is used, or `us-east-1` if that's empty.
    #[must_use]
    pub fn region(self, region: Region) -> Self {
        Self {
            region: Some(region),
            ..self
        }
    }

    /// Set how assertions are exchanged for credentials.
    ///
    /// By default, assertions are exchanged with AWS STS `AssumeRoleWithSAML`.
    #[must_use]
    pub fn exchanger(self, exchanger: impl CredentialExchanger + 'static) -> Self {
        Self {
            exchanger: Some(Arc::new(exchanger)),
            ..self
        }
    }

    /// Set the configuration source.
    ///
    /// By default, configuration is sourced from the configuration store (located with
    /// `AWS_SAML_CONFIG_FILE` and `AWS_SAML_PROFILE`).
    #[must_use]
    pub fn config<NewS>(self, config_source: NewS) -> SamlFlowBuilder<NewS, A, P>
    where
        NewS: ConfigSource,
    {
        SamlFlowBuilder {
            cache_file: self.cache_file,
            cache_disabled: self.cache_disabled,
            cache_margin: self.cache_margin,
            fingerprint_keys: self.fingerprint_keys,
            capture_timeout: self.capture_timeout,
            region: self.region,
            exchanger: self.exchanger,
            config_source,
            authenticator: self.authenticator,
            role_prompt: self.role_prompt,
        }
    }

    /// Set the authenticator.
    ///
    /// The authenticator is asked for a SAML assertion every time the flow runs, before any cached
    /// credentials are considered.
    #[must_use]
    pub fn authenticator<NewA>(self, authenticator: NewA) -> SamlFlowBuilder<S, NewA, P>
    where
        NewA: Authenticator,
    {
        SamlFlowBuilder {
            cache_file: self.cache_file,
            cache_disabled: self.cache_disabled,
            cache_margin: self.cache_margin,
            fingerprint_keys: self.fingerprint_keys,
            capture_timeout: self.capture_timeout,
            region: self.region,
            exchanger: self.exchanger,
            config_source: self.config_source,
            authenticator,
            role_prompt: self.role_prompt,
        }
    }

    /// Set the role prompt.
    ///
    /// The prompt is only used when an assertion offers several roles and none of them is the
    /// configuration's `default_jump_role`.
    #[must_use]
    pub fn role_prompt<NewP>(self, role_prompt: NewP) -> SamlFlowBuilder<S, A, NewP>
    where
        NewP: RolePrompt,
    {
        SamlFlowBuilder {
            cache_file: self.cache_file,
            cache_disabled: self.cache_disabled,
            cache_margin: self.cache_margin,
            fingerprint_keys: self.fingerprint_keys,
            capture_timeout: self.capture_timeout,
            region: self.region,
            exchanger: self.exchanger,
            config_source: self.config_source,
            authenticator: self.authenticator,
            role_prompt,
        }
    }
}

impl<S, A, P> SamlFlowBuilder<S, A, P>
where
    S: ConfigSource,
    A: Authenticator,
    P: RolePrompt,
{
    /// Build a [`SamlFlow`] with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns any errors encountered when loading the [`ConfigSource`].
    pub async fn build(self) -> Result<SamlFlow<A, P>, S::Error> {
        let profile = self.config_source.load().await?;

        let cache_file = if self.cache_disabled {
            None
        } else {
            self.cache_file.or_else(default_cache_file)
        };
        let mut cache = CredentialCache::new(cache_file);
        if let Some(margin) = self.cache_margin {
            cache = cache.with_margin(margin);
        }

        let exchanger = self.exchanger.unwrap_or_else(|| {
            let region = self
                .region
                .unwrap_or_else(|| Region::or_default(&profile.config.region));
            let sdk_config = SdkConfig::builder()
                .region(region.0)
                .behavior_version(BehaviorVersion::latest())
                .build();
            Arc::new(sts::Client::new(&sdk_config))
        });

        Ok(SamlFlow::build(
            profile,
            cache,
            self.fingerprint_keys,
            self.capture_timeout,
            exchanger,
            self.authenticator,
            self.role_prompt,
        ))
    }
}

fn default_cache_file() -> Option<PathBuf> {
    dirs_next::cache_dir().map(|mut path| {
        path.push(CLIENT_NAME);
        path.push(CACHE_FILE_NAME);
        path
    })
}

/// A source of flow configuration.
///
/// This trait is more intended to facilitate precise error handling in [`SamlFlowBuilder::build`],
/// but it could also be used to implement alternative configuration sources.
pub trait ConfigSource {
    /// The future returned by the config source.
    type Future: std::future::Future<Output = Result<Profile, Self::Error>>;

    /// The error that might occur when sourcing the configuration.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Load the profile.
    fn load(self) -> Self::Future;
}

/// A named configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Profile {
    /// The profile name.
    ///
    /// This is used as the cache key when fingerprint keys are disabled.
    pub name: String,

    /// The profile's configuration.
    pub config: Configuration,
}

impl ConfigSource for Profile {
    type Future = futures::future::Ready<Result<Self, Self::Error>>;

    type Error = Infallible;

    fn load(self) -> Self::Future {
        futures::future::ready(Ok(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_cache_file_is_versioned() {
        if let Some(path) = default_cache_file() {
            assert!(path.ends_with(format!("{CLIENT_NAME}/{CACHE_FILE_NAME}")));
        }
    }
}
