//! Cleaned up AWS STS API.

use std::{fmt, time::Duration};

use aws_config::SdkConfig;
use aws_sdk_sts::{config::Credentials, error::DisplayErrorContext};
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;

use crate::{CredentialExchanger, ExchangeError, Role, SamlAssertion, TemporaryCredentials};

// STS refuses longer sessions for chained roles.
const MAX_CHAINED_DURATION: Duration = Duration::from_secs(60 * 60);

pub(crate) struct Client {
    config: SdkConfig,
    inner: aws_sdk_sts::Client,
}

impl Client {
    pub(crate) fn new(config: &SdkConfig) -> Self {
        Self {
            config: config.clone(),
            inner: aws_sdk_sts::Client::new(config),
        }
    }
}

impl CredentialExchanger for Client {
    fn exchange<'a>(
        &'a self,
        assertion: &'a SamlAssertion,
        role: &'a Role,
        duration: Duration,
    ) -> BoxFuture<'a, Result<TemporaryCredentials, ExchangeError>> {
        Box::pin(async move {
            let output = self
                .inner
                .assume_role_with_saml()
                .role_arn(&role.role_arn)
                .principal_arn(&role.principal_arn)
                .saml_assertion(assertion.encoded())
                .duration_seconds(duration_seconds(duration))
                .send()
                .await
                .map_err(rejected)?;

            credentials_from("AssumeRoleWithSAML", output.credentials)
        })
    }

    fn assume_role<'a>(
        &'a self,
        credentials: &'a TemporaryCredentials,
        role_arn: &'a str,
        duration: Duration,
    ) -> BoxFuture<'a, Result<TemporaryCredentials, ExchangeError>> {
        Box::pin(async move {
            let provider = Credentials::new(
                &credentials.access_key_id,
                &credentials.secret_access_key,
                Some(credentials.session_token.clone()),
                Some(credentials.expires_at.into()),
                env!("CARGO_PKG_NAME"),
            );
            let config = aws_sdk_sts::config::Builder::from(&self.config)
                .credentials_provider(provider)
                .build();

            let output = aws_sdk_sts::Client::from_conf(config)
                .assume_role()
                .role_arn(role_arn)
                .role_session_name(session_name())
                .duration_seconds(duration_seconds(duration.min(MAX_CHAINED_DURATION)))
                .send()
                .await
                .map_err(rejected)?;

            credentials_from("AssumeRole", output.credentials)
        })
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Client").finish_non_exhaustive()
    }
}

fn rejected(error: impl std::error::Error) -> ExchangeError {
    ExchangeError::Rejected(DisplayErrorContext(&error).to_string())
}

fn duration_seconds(duration: Duration) -> i32 {
    i32::try_from(duration.as_secs()).unwrap_or(i32::MAX)
}

fn session_name() -> String {
    format!(
        "{}-{}",
        env!("CARGO_PKG_NAME"),
        Utc::now().format("%Y%m%d%H%M%S")
    )
}

fn credentials_from(
    operation: &str,
    credentials: Option<aws_sdk_sts::types::Credentials>,
) -> Result<TemporaryCredentials, ExchangeError> {
    let invalid =
        |msg: &str| ExchangeError::InvalidResponse(format!("invalid {operation} response: {msg}"));

    let credentials = credentials.ok_or_else(|| invalid("missing credentials"))?;
    let expiration = credentials.expiration();
    let expires_at = DateTime::from_timestamp(expiration.secs(), expiration.subsec_nanos())
        .ok_or_else(|| invalid("expiration out of range"))?;

    Ok(TemporaryCredentials {
        access_key_id: credentials.access_key_id().to_string(),
        secret_access_key: credentials.secret_access_key().to_string(),
        session_token: credentials.session_token().to_string(),
        expires_at,
    })
}
