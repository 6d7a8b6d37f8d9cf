use std::time::Duration;

use futures::future::BoxFuture;

use crate::{Role, SamlAssertion, TemporaryCredentials};

/// Trades a SAML assertion for temporary credentials.
///
/// The default implementation calls AWS STS. Alternative implementations can be supplied with
/// [`SamlFlowBuilder::exchanger`](crate::SamlFlowBuilder::exchanger), e.g. to add retries or to
/// test without a network.
///
/// Credentials returned by an exchanger are validated before they are used or cached, so
/// implementations don't need to check for empty keys or past expiry themselves.
pub trait CredentialExchanger: Send + Sync {
    /// Assume `role` using `assertion`, asking for credentials valid for `duration`.
    fn exchange<'a>(
        &'a self,
        assertion: &'a SamlAssertion,
        role: &'a Role,
        duration: Duration,
    ) -> BoxFuture<'a, Result<TemporaryCredentials, ExchangeError>>;

    /// Assume `role_arn` using previously exchanged `credentials`.
    fn assume_role<'a>(
        &'a self,
        credentials: &'a TemporaryCredentials,
        role_arn: &'a str,
        duration: Duration,
    ) -> BoxFuture<'a, Result<TemporaryCredentials, ExchangeError>>;
}

/// An error exchanging an assertion for credentials.
#[allow(clippy::module_name_repetitions)]
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ExchangeError {
    /// The broker refused the request, or couldn't be reached.
    #[error("credential exchange was rejected: {0}")]
    Rejected(String),

    /// The broker responded with unusable credentials.
    #[error("credential exchange returned an invalid response: {0}")]
    InvalidResponse(String),
}
