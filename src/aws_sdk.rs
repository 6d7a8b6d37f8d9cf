use aws_types_integration::{
    provider::{
        error::CredentialsError, future::ProvideCredentials as ProvideCredentialsFut,
        ProvideCredentials,
    },
    Credentials,
};

use crate::{
    Authenticator, ConfigSource, RolePrompt, SamlFlow, SamlFlowBuilder, TemporaryCredentials,
};

/// Provide credentials via a [`SamlFlowBuilder`].
///
/// If configuration can't be loaded for any reason, errors are converted to
/// [`CredentialsError::CredentialsNotLoaded`], which won't stop resolution if the builder is used
/// as part of a credentials chain. If a profile is loaded successfully, then any subsequent
/// authentication errors are converted to [`CredentialsError::ProviderError`] which will stop
/// resolution.
///
/// Each resolution runs the whole flow, including asking the [`Authenticator`] for a new
/// assertion, so the provider should be wrapped in a caching layer if credentials are requested
/// often.
///
/// ```no_run
/// # #[tokio::main] async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// # use aws_types_integration as aws_credential_types;
/// use std::{convert::Infallible, io};
///
/// use aws_config::meta::credentials::CredentialsProviderChain;
/// use aws_credential_types::provider::ProvideCredentials;
/// use aws_saml_flow::{Configuration, Role, SamlFlow};
///
/// // Configure a SAML flow that loads the profile from the configuration store
/// let flow = SamlFlow::builder()
///     .authenticator(|_config: Configuration| async move {
///         let mut assertion = String::new();
///         io::stdin().read_line(&mut assertion)?;
///         Ok::<_, io::Error>(assertion)
///     })
///     .role_prompt(|roles: Vec<Role>| async move { Ok::<_, Infallible>(roles.first().cloned()) });
///
/// // Try the default chain, and fall back to the SAML flow only if no default providers could
/// // be loaded.
/// let provider = CredentialsProviderChain::default_provider()
///     .await
///     .or_else("SamlFlow", flow);
///
/// let creds = provider.provide_credentials().await?;
/// # Ok(()) }
/// ```
impl<S, A, P> ProvideCredentials for SamlFlowBuilder<S, A, P>
where
    S: ConfigSource + Clone + std::fmt::Debug + Send + Sync,
    S::Future: Send,
    A: Authenticator,
    P: RolePrompt,
{
    fn provide_credentials<'a>(&'a self) -> ProvideCredentialsFut<'a>
    where
        Self: 'a,
    {
        ProvideCredentialsFut::new(async {
            let flow = self
                .clone()
                .build()
                .await
                .map_err(CredentialsError::not_loaded)?;

            let creds = flow
                .authenticate()
                .await
                .map(Into::into)
                .map_err(CredentialsError::provider_error)?;

            Ok(creds)
        })
    }
}

impl<A, P> ProvideCredentials for SamlFlow<A, P>
where
    A: Authenticator,
    P: RolePrompt,
{
    fn provide_credentials<'a>(&'a self) -> ProvideCredentialsFut<'a>
    where
        Self: 'a,
    {
        ProvideCredentialsFut::new(async {
            let creds = self
                .authenticate()
                .await
                .map(Into::into)
                .map_err(CredentialsError::provider_error)?;

            Ok(creds)
        })
    }
}

impl From<TemporaryCredentials> for Credentials {
    fn from(creds: TemporaryCredentials) -> Self {
        Credentials::new(
            creds.access_key_id,
            creds.secret_access_key,
            Some(creds.session_token),
            Some(creds.expires_at.into()),
            "SamlFlow",
        )
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, UNIX_EPOCH};

    use super::*;

    #[test]
    fn converts_into_sdk_credentials() {
        let creds: Credentials = TemporaryCredentials {
            access_key_id: "ASIAEXAMPLE".to_string(),
            secret_access_key: "secret".to_string(),
            session_token: "token".to_string(),
            expires_at: "2030-01-02T03:04:05Z".parse().unwrap(),
        }
        .into();

        assert_eq!(creds.access_key_id(), "ASIAEXAMPLE");
        assert_eq!(creds.secret_access_key(), "secret");
        assert_eq!(creds.session_token(), Some("token"));
        assert_eq!(
            creds.expiry(),
            Some(UNIX_EPOCH + Duration::from_secs(1_893_553_445))
        );
    }
}
