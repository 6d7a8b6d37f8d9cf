//! Azure AD login URLs.

use std::io::Write;

use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{SecondsFormat, Utc};
use flate2::{write::DeflateEncoder, Compression};
use url::Url;

use crate::{ConfigError, Configuration};

const AZURE_LOGIN_BASE: &str = "https://login.microsoftonline.com/";
const AWS_SAML_ENDPOINT: &str = "https://signin.aws.amazon.com/saml";

/// The URL that starts an Azure AD login for `config`.
///
/// The URL carries a SAML `AuthnRequest` for the enterprise application identified by
/// `azure_app_id_uri`, using the HTTP-Redirect binding. Completing the login in a browser ends
/// with the IdP posting a `SAMLResponse` to AWS, which is what an
/// [`Authenticator`](crate::Authenticator) needs to capture.
///
/// # Errors
///
/// Returns [`ConfigError::Incomplete`] if the tenant ID or app ID URI is missing, and
/// [`ConfigError::Invalid`] if the tenant ID isn't a GUID or domain name.
pub fn login_url(config: &Configuration) -> Result<Url, ConfigError> {
    let missing: Vec<_> = [
        ("azure_tenant_id", &config.azure_tenant_id),
        ("azure_app_id_uri", &config.azure_app_id_uri),
    ]
    .into_iter()
    .filter(|(_, value)| value.is_empty())
    .map(|(name, _)| name)
    .collect();
    if !missing.is_empty() {
        return Err(ConfigError::Incomplete(missing));
    }

    if let Some(invalid) = config
        .azure_tenant_id
        .chars()
        .find(|&c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '.')))
    {
        return Err(invalid_tenant(format!("unexpected character {invalid:?}")));
    }

    let request = authn_request(&config.azure_app_id_uri);

    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    let compressed = encoder
        .write_all(request.as_bytes())
        .and_then(|()| encoder.finish())
        .map_err(ConfigError::Encoding)?;

    let mut url = Url::parse(AZURE_LOGIN_BASE)
        .and_then(|base| base.join(&format!("{}/saml2", config.azure_tenant_id)))
        .map_err(|error| invalid_tenant(error.to_string()))?;
    url.query_pairs_mut()
        .append_pair("SAMLRequest", &STANDARD.encode(compressed));
    Ok(url)
}

fn invalid_tenant(message: String) -> ConfigError {
    ConfigError::Invalid {
        field: "azure_tenant_id",
        message,
    }
}

fn authn_request(issuer: &str) -> String {
    format!(
        concat!(
            r#"<samlp:AuthnRequest xmlns="urn:oasis:names:tc:SAML:2.0:metadata" "#,
            r#"ID="_{id}" Version="2.0" IssueInstant="{instant}" IsPassive="false" "#,
            r#"AssertionConsumerServiceURL="{acs}" "#,
            r#"xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol">"#,
            r#"<Issuer xmlns="urn:oasis:names:tc:SAML:2.0:assertion">{issuer}</Issuer>"#,
            r#"<samlp:NameIDPolicy Format="urn:oasis:names:tc:SAML:1.1:nameid-format:unspecified"/>"#,
            r#"</samlp:AuthnRequest>"#,
        ),
        id = uuid::Uuid::new_v4().simple(),
        instant = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        acs = AWS_SAML_ENDPOINT,
        issuer = quick_xml::escape::escape(issuer),
    )
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use flate2::read::DeflateDecoder;

    use super::*;

    fn request_from(url: &Url) -> String {
        let (_, encoded) = url
            .query_pairs()
            .find(|(key, _)| key == "SAMLRequest")
            .unwrap();
        let compressed = STANDARD.decode(encoded.as_bytes()).unwrap();
        let mut xml = String::new();
        DeflateDecoder::new(compressed.as_slice())
            .read_to_string(&mut xml)
            .unwrap();
        xml
    }

    #[test]
    fn builds_tenant_login_url() {
        let config = Configuration {
            azure_tenant_id: "00000000-0000-0000-0000-000000000000".to_string(),
            azure_app_id_uri: "https://signin.aws.amazon.com/saml#a&b".to_string(),
            ..Configuration::default()
        };
        let url = login_url(&config).unwrap();
        assert_eq!(url.path(), "/00000000-0000-0000-0000-000000000000/saml2");
        assert_eq!(url.host_str(), Some("login.microsoftonline.com"));

        let xml = request_from(&url);
        assert!(xml.contains(
            r#"AssertionConsumerServiceURL="https://signin.aws.amazon.com/saml""#
        ));
        assert!(xml.contains(">https://signin.aws.amazon.com/saml#a&amp;b</Issuer>"));
    }

    #[test]
    fn request_ids_are_unique() {
        assert_ne!(authn_request("urn:app"), authn_request("urn:app"));
    }

    #[test]
    fn requires_tenant_and_app() {
        let error = login_url(&Configuration::default()).unwrap_err();
        assert!(matches!(
            error,
            ConfigError::Incomplete(ref missing) if missing == &["azure_tenant_id", "azure_app_id_uri"]
        ));
    }

    #[test]
    fn rejects_tenant_outside_login_path() {
        for tenant in ["bad/tenant", "tenant?x=1", "tenant#frag", "my tenant", "../common"] {
            let config = Configuration {
                azure_tenant_id: tenant.to_string(),
                azure_app_id_uri: "urn:app".to_string(),
                ..Configuration::default()
            };
            assert!(
                matches!(
                    login_url(&config),
                    Err(ConfigError::Invalid { field: "azure_tenant_id", .. })
                ),
                "{tenant}"
            );
        }

        let config = Configuration {
            azure_tenant_id: "contoso.onmicrosoft.com".to_string(),
            azure_app_id_uri: "urn:app".to_string(),
            ..Configuration::default()
        };
        assert_eq!(
            login_url(&config).unwrap().path(),
            "/contoso.onmicrosoft.com/saml2"
        );
    }
}
