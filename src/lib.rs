#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs, clippy::pedantic)]

//! AWS credentials via SAML federation.
//!
//! The user logs in with an identity provider (IdP), the resulting SAML assertion is checked for
//! the AWS roles it grants, one role is picked, and the assertion is exchanged with AWS STS for
//! temporary credentials. Credentials are cached so that they can be reused until shortly before
//! they expire.
//!
//! See [`authenticate`] for the main entrypoint to the crate.
//!
//! ```no_run
//! # #[tokio::main] async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use std::{convert::Infallible, io};
//!
//! use aws_saml_flow::{Configuration, Role};
//!
//! let credentials = aws_saml_flow::authenticate(
//!     |config: Configuration| async move {
//!         let url = aws_saml_flow::login_url(&config).unwrap();
//!         println!("Sign in at {url} and paste the SAML response");
//!         let mut response = String::new();
//!         io::stdin().read_line(&mut response)?;
//!         aws_saml_flow::SamlAssertion::from_base64(response.trim())
//!             .map(|assertion| assertion.raw().to_string())
//!             .map_err(|error| io::Error::new(io::ErrorKind::InvalidData, error))
//!     },
//!     |roles: Vec<Role>| async move { Ok::<_, Infallible>(roles.into_iter().next()) },
//! )
//! .await?;
//! # Ok(()) }
//! ```

#[cfg_attr(docsrs, doc(cfg(feature = "aws-sdk")))]
#[cfg(feature = "aws-sdk")]
mod aws_sdk;
mod builder;
mod cache;
mod config;
mod credentials;
mod exchange;
mod flow;
mod login;
mod profile;
mod region;
mod saml;
mod select;
mod sts;

pub use crate::{
    builder::{ConfigSource, Profile, SamlFlowBuilder},
    cache::{CacheError, CredentialCache, CredentialCacheFile, CACHE_FILE_VERSION},
    config::{ConfigError, Configuration, ConfigurationStore, CONFIG_FILE_VERSION},
    credentials::TemporaryCredentials,
    exchange::{CredentialExchanger, ExchangeError},
    flow::{Authenticator, SamlFlow, SamlFlowError, Stage},
    login::login_url,
    profile::ProfileSource,
    region::Region,
    saml::{Attribute, ParseError, Role, SamlAssertion, ROLE_ATTRIBUTE},
    select::{select_role, RolePrompt, SelectionError},
};

const _: () = assert!(
    const_str::equal!(env!("CARGO_PKG_VERSION_MAJOR"), "0"),
    "client naming scheme needs updated for 1.0"
);
const CLIENT_NAME: &str = concat!(
    env!("CARGO_PKG_NAME"),
    "@",
    "0.",
    env!("CARGO_PKG_VERSION_MINOR")
);

/// Perform a default SAML authentication flow with the given `authenticator` and `role_prompt`.
///
/// The authenticator should have the user log in with their IdP and return the SAML assertion
/// XML. The role prompt is only used if the assertion offers several roles and none of them is
/// the profile's `default_jump_role`. Issued credentials are cached if the profile has
/// `remember_me` set, and reused until five minutes before they expire.
///
/// Configuration is sourced from the configuration store (located with `AWS_SAML_CONFIG_FILE` and
/// `AWS_SAML_PROFILE`) and credentials are cached in the user's OS cache directory in
/// `aws_saml_flow@0.1/credentials.json`. The cache format is considered part of the crate's API.
///
/// For more flexible configuration see [`SamlFlowBuilder`].
///
/// # Errors
///
/// An error is returned if a profile cannot be loaded, or if there's a failure during the
/// authentication flow. You can separate configuration errors from authentication flow errors by
/// using [`SamlFlow::new`] instead.
pub async fn authenticate<A: Authenticator, P: RolePrompt>(
    authenticator: A,
    role_prompt: P,
) -> Result<TemporaryCredentials, Error<A::Error, P::Error>> {
    let credentials = SamlFlow::new(authenticator, role_prompt)
        .await?
        .authenticate()
        .await?;
    Ok(credentials)
}

/// An error indicating either misconfiguration or a failure during authentication.
#[derive(Debug, thiserror::Error)]
pub enum Error<A, P>
where
    A: std::error::Error + Send + Sync + 'static,
    P: std::error::Error + Send + Sync + 'static,
{
    /// Configuration was missing or invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Failure during authentication.
    #[error(transparent)]
    Flow(#[from] SamlFlowError<A, P>),
}
