use std::io;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use aws_saml_flow::{Configuration, Role, SamlAssertion, SamlFlow};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let flow = SamlFlow::new(
        |config: Configuration| async move {
            let url = aws_saml_flow::login_url(&config)
                .map_err(|error| io::Error::new(io::ErrorKind::InvalidInput, error))?;
            println!("Go to {url} to sign in, then paste the SAMLResponse form value:");

            let response = read_line().await?;
            SamlAssertion::from_base64(&response)
                .map(|assertion| assertion.raw().to_string())
                .map_err(|error| io::Error::new(io::ErrorKind::InvalidData, error))
        },
        |roles: Vec<Role>| async move {
            for (index, role) in roles.iter().enumerate() {
                println!("{index}: {}", role.role_arn);
            }
            println!("Choose a role:");

            let choice = read_line().await?;
            Ok::<_, io::Error>(
                choice
                    .parse::<usize>()
                    .ok()
                    .and_then(|index| roles.get(index).cloned()),
            )
        },
    )
    .await?;

    let credentials = flow.authenticate().await?;

    dbg!(credentials);

    Ok(())
}

async fn read_line() -> io::Result<String> {
    let mut line = String::new();
    BufReader::new(tokio::io::stdin())
        .read_line(&mut line)
        .await?;
    Ok(line.trim().to_string())
}
