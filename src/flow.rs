use std::{convert::Infallible, fmt, sync::Arc, time::Duration};

use chrono::Utc;

use crate::{
    select::{select_role, SelectionError},
    ConfigError, Configuration, CredentialCache, CredentialExchanger, ExchangeError, ParseError,
    Profile, Role, RolePrompt, SamlAssertion, SamlFlowBuilder, TemporaryCredentials,
};

/// A configured SAML authentication flow.
///
/// A default flow can be constructed with [`new`](Self::new).
#[allow(clippy::module_name_repetitions)]
pub struct SamlFlow<A, P> {
    profile: Profile,
    cache: CredentialCache,
    fingerprint_keys: bool,
    capture_timeout: Option<Duration>,
    exchanger: Arc<dyn CredentialExchanger>,
    authenticator: A,
    role_prompt: P,
}

impl SamlFlow<(), ()> {
    /// Construct a builder for a SAML flow.
    ///
    /// Use this to override the default flow configuration.
    #[must_use]
    pub fn builder() -> SamlFlowBuilder {
        SamlFlowBuilder::default()
    }
}

impl<A, P> SamlFlow<A, P>
where
    A: Authenticator,
    P: RolePrompt,
{
    /// Construct a default SAML flow with the given `authenticator` and `role_prompt`.
    ///
    /// The profile is loaded from the configuration store (located with `AWS_SAML_CONFIG_FILE` and
    /// `AWS_SAML_PROFILE`) and credentials are cached in the user's OS cache directory in
    /// `aws_saml_flow@0.1/credentials.json`. The cache format is considered part of the crate's
    /// API.
    ///
    /// For more flexible configuration see [`SamlFlowBuilder`].
    ///
    /// # Example
    ///
    /// ```no_run
    /// # #[tokio::main] async fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// use std::{convert::Infallible, io};
    ///
    /// use aws_saml_flow::SamlFlow;
    ///
    /// let flow = SamlFlow::new(
    ///     |config: aws_saml_flow::Configuration| async move {
    ///         println!("Sign in at {}", aws_saml_flow::login_url(&config).unwrap());
    ///         let mut assertion = String::new();
    ///         io::stdin().read_line(&mut assertion)?;
    ///         Ok::<_, io::Error>(assertion)
    ///     },
    ///     |roles: Vec<aws_saml_flow::Role>| async move {
    ///         Ok::<_, Infallible>(roles.into_iter().next())
    ///     },
    /// )
    /// .await?;
    ///
    /// let credentials = flow.authenticate().await?;
    /// # Ok(()) }
    /// ```
    ///
    /// # Errors
    ///
    /// An error is returned if the configuration store can't be read, or doesn't contain the
    /// profile.
    pub async fn new(authenticator: A, role_prompt: P) -> Result<Self, ConfigError> {
        SamlFlowBuilder::default()
            .authenticator(authenticator)
            .role_prompt(role_prompt)
            .build()
            .await
    }

    pub(crate) fn build(
        profile: Profile,
        cache: CredentialCache,
        fingerprint_keys: bool,
        capture_timeout: Option<Duration>,
        exchanger: Arc<dyn CredentialExchanger>,
        authenticator: A,
        role_prompt: P,
    ) -> Self {
        Self {
            profile,
            cache,
            fingerprint_keys,
            capture_timeout,
            exchanger,
            authenticator,
            role_prompt,
        }
    }

    /// The profile this flow authenticates.
    #[must_use]
    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    /// The key credentials are cached under.
    ///
    /// This is the configuration's [fingerprint](Configuration::fingerprint), unless fingerprint
    /// keys were disabled, in which case it's the profile name.
    #[must_use]
    pub fn cache_key(&self) -> String {
        if self.fingerprint_keys {
            self.profile.config.fingerprint()
        } else {
            self.profile.name.clone()
        }
    }

    /// Perform the SAML authentication flow and obtain credentials.
    ///
    /// The user is asked to log in through the [`Authenticator`], a role is picked from the
    /// resulting assertion, and the assertion is exchanged for credentials unless usable
    /// credentials are already cached. When a destination account and role are configured, the
    /// credentials are then used to assume the destination role.
    ///
    /// Failures to read or write the credential cache are logged and otherwise ignored.
    ///
    /// # Errors
    ///
    /// An error is returned if any other stage fails. See [`SamlFlowError`] for details.
    pub async fn authenticate(
        &self,
    ) -> Result<TemporaryCredentials, SamlFlowError<A::Error, P::Error>> {
        let config = &self.profile.config;

        tracing::debug!(profile = %self.profile.name, stage = ?Stage::Capturing, "waiting for SAML assertion");
        let raw = self.capture(config).await?;

        tracing::debug!(stage = ?Stage::Parsing, bytes = raw.len(), "parsing SAML assertion");
        let assertion = SamlAssertion::parse(raw)?;
        let roles = assertion.roles()?;

        tracing::debug!(stage = ?Stage::Selecting, roles = roles.len(), "selecting role");
        let role = select_role(
            &roles,
            Some(config.default_jump_role.as_str()),
            self.role_prompt.clone(),
        )
        .await?;
        tracing::info!(role_arn = %role.role_arn, "selected role");

        let key = self.cache_key();
        tracing::debug!(stage = ?Stage::CacheCheck, "checking credential cache");
        let credentials = match self.cache.lookup(&key).await {
            Ok(Some(credentials)) => {
                tracing::info!(expires_at = %credentials.expires_at, "using cached credentials");
                credentials
            }
            Ok(None) => self.exchange(&assertion, &role, &key).await?,
            Err(error) => {
                tracing::warn!(%error, "ignoring unusable credential cache");
                self.exchange(&assertion, &role, &key).await?
            }
        };

        match config.destination() {
            Some((account_id, role_name)) => {
                let role_arn = format!(
                    "arn:{}:iam::{account_id}:role/{role_name}",
                    role.partition()
                );
                self.chain(&credentials, &role_arn).await
            }
            None => Ok(credentials),
        }
    }

    async fn capture(
        &self,
        config: &Configuration,
    ) -> Result<String, SamlFlowError<A::Error, P::Error>> {
        let capture = self.authenticator.clone().capture_assertion(config.clone());
        let raw = match self.capture_timeout {
            Some(timeout) => tokio::time::timeout(timeout, capture)
                .await
                .map_err(|_| SamlFlowError::CaptureTimeout)?,
            None => capture.await,
        };
        raw.map_err(SamlFlowError::Capture)
    }

    async fn exchange(
        &self,
        assertion: &SamlAssertion,
        role: &Role,
        key: &str,
    ) -> Result<TemporaryCredentials, SamlFlowError<A::Error, P::Error>> {
        let config = &self.profile.config;
        let duration = config.session_duration();

        tracing::debug!(stage = ?Stage::Exchanging, duration_secs = duration.as_secs(), "exchanging SAML assertion");
        let credentials = self.exchanger.exchange(assertion, role, duration).await?;
        credentials.validate(Utc::now())?;
        tracing::info!(expires_at = %credentials.expires_at, "obtained credentials");

        tracing::debug!(stage = ?Stage::Storing, remember = config.remember_me, "caching credentials");
        if let Err(error) = self
            .cache
            .store(key, &credentials, config.remember_me)
            .await
        {
            tracing::warn!(%error, "failed to cache credentials");
        }

        Ok(credentials)
    }

    async fn chain(
        &self,
        credentials: &TemporaryCredentials,
        role_arn: &str,
    ) -> Result<TemporaryCredentials, SamlFlowError<A::Error, P::Error>> {
        tracing::debug!(stage = ?Stage::Chaining, %role_arn, "assuming destination role");
        let chained = self
            .exchanger
            .assume_role(credentials, role_arn, self.profile.config.session_duration())
            .await
            .map_err(SamlFlowError::Chain)?;
        chained
            .validate(Utc::now())
            .map_err(SamlFlowError::Chain)?;
        tracing::info!(%role_arn, expires_at = %chained.expires_at, "assumed destination role");
        Ok(chained)
    }
}

impl<A, P> fmt::Debug for SamlFlow<A, P> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("SamlFlow")
            .field("profile", &self.profile)
            .field("cache", &self.cache)
            .field("fingerprint_keys", &self.fingerprint_keys)
            .field("capture_timeout", &self.capture_timeout)
            .field("exchanger", &"_")
            .field("authenticator", &"_")
            .field("role_prompt", &"_")
            .finish()
    }
}

/// Captures a SAML assertion from an interactive login.
///
/// Logging in usually involves a browser. There are many ways this could be arranged (a browser
/// extension, a local HTTP listener, pasting from developer tools), so capturing is modelled with
/// this trait. [`login_url`](crate::login_url) builds the URL that starts an Azure AD login.
///
/// The trait is implemented for async functions taking the [`Configuration`] and returning
/// `Result<String, E>` with the raw assertion XML, so a trivial authenticator could look like:
///
/// ```
/// use std::convert::Infallible;
///
/// use aws_saml_flow::Authenticator;
///
/// fn canned() -> impl Authenticator {
///     |_config| async move { Ok::<_, Infallible>("<Response>...</Response>".to_string()) }
/// }
/// ```
///
/// The `Error` associated type can be used if capturing is fallible. Type information is
/// preserved in the event of any subsequent [`SamlFlowError`].
pub trait Authenticator: Clone + Send + Sync {
    /// The future returned by the authenticator.
    type Future: std::future::Future<Output = Result<String, Self::Error>> + Send;

    /// An error that could occur when attempting to capture an assertion.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Have the user log in as `config` describes, and return the SAML assertion XML.
    fn capture_assertion(self, config: Configuration) -> Self::Future;
}

impl<F, Fut, E> Authenticator for F
where
    F: FnOnce(Configuration) -> Fut + Clone + Send + Sync,
    Fut: std::future::Future<Output = Result<String, E>> + Send,
    E: std::error::Error + Send + Sync + 'static,
{
    type Future = Fut;
    type Error = E;

    fn capture_assertion(self, config: Configuration) -> Fut {
        self(config)
    }
}

/// The stages of a [`SamlFlow`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    /// Waiting for the user to log in.
    Capturing,
    /// Reading roles from the assertion.
    Parsing,
    /// Choosing a role.
    Selecting,
    /// Looking for cached credentials.
    CacheCheck,
    /// Trading the assertion for credentials.
    Exchanging,
    /// Caching new credentials.
    Storing,
    /// Assuming the destination role.
    Chaining,
}

/// An error that occurred during the SAML authentication flow.
#[derive(Debug, thiserror::Error)]
pub enum SamlFlowError<
    A: std::error::Error + Send + Sync + 'static = Infallible,
    P: std::error::Error + Send + Sync + 'static = Infallible,
> {
    /// The authenticator failed to capture an assertion.
    ///
    /// See [`Authenticator`] for more information.
    #[error("SAML authentication failed during login: {0}")]
    Capture(#[source] A),

    /// The user didn't finish logging in before the capture timeout.
    #[error("SAML authentication failed: timed out waiting for login")]
    CaptureTimeout,

    /// The assertion couldn't be read, or offers no usable roles.
    #[error("SAML authentication failed due to: {0}")]
    Parse(#[from] ParseError),

    /// No role was chosen.
    #[error("SAML authentication failed due to: {0}")]
    Selection(#[from] SelectionError<P>),

    /// The assertion couldn't be exchanged for credentials.
    #[error("SAML authentication failed due to: {0}")]
    Exchange(#[from] ExchangeError),

    /// The destination role couldn't be assumed with the jump role's credentials.
    #[error("SAML authentication failed assuming the destination role: {0}")]
    Chain(#[source] ExchangeError),
}

impl<A, P> SamlFlowError<A, P>
where
    A: std::error::Error + Send + Sync + 'static,
    P: std::error::Error + Send + Sync + 'static,
{
    /// The stage the flow failed in.
    #[must_use]
    pub fn stage(&self) -> Stage {
        match self {
            Self::Capture(_) | Self::CaptureTimeout => Stage::Capturing,
            Self::Parse(_) => Stage::Parsing,
            Self::Selection(_) => Stage::Selecting,
            Self::Exchange(_) => Stage::Exchanging,
            Self::Chain(_) => Stage::Chaining,
        }
    }
}
