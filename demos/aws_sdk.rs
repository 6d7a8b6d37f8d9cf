use std::{convert::Infallible, io};

use aws_config::meta::credentials::CredentialsProviderChain;
use aws_types_integration::provider::ProvideCredentials;

use aws_saml_flow::{Configuration, Role, SamlAssertion, SamlFlow};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let flow = SamlFlow::builder()
        .authenticator(|config: Configuration| async move {
            let url = aws_saml_flow::login_url(&config)
                .map_err(|error| io::Error::new(io::ErrorKind::InvalidInput, error))?;
            println!("Go to {url} to sign in, then paste the SAMLResponse form value:");

            let mut response = String::new();
            io::stdin().read_line(&mut response)?;
            SamlAssertion::from_base64(&response)
                .map(|assertion| assertion.raw().to_string())
                .map_err(|error| io::Error::new(io::ErrorKind::InvalidData, error))
        })
        .role_prompt(|roles: Vec<Role>| async move { Ok::<_, Infallible>(roles.first().cloned()) });
    let provider = CredentialsProviderChain::first_try("SamlFlow", flow)
        .or_default_provider()
        .await;

    let credentials = provider.provide_credentials().await?;

    dbg!(credentials);

    Ok(())
}
