//! SAML assertion parsing and role extraction.

use std::{fmt, str::FromStr};

use base64::{engine::general_purpose::STANDARD, Engine};
use quick_xml::{events::Event, Reader};

/// The attribute AWS reads assumable roles from.
pub const ROLE_ATTRIBUTE: &str = "https://aws.amazon.com/SAML/Attributes/Role";

/// A parsed SAML assertion.
///
/// Only the attribute statement is retained, along with the raw document so that it can be
/// forwarded to STS.
#[derive(Clone, Debug)]
pub struct SamlAssertion {
    raw: String,
    attributes: Vec<Attribute>,
}

/// A named attribute in an assertion's attribute statement.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Attribute {
    /// The attribute's `Name`.
    pub name: String,

    /// The text of each `AttributeValue`, in document order.
    pub values: Vec<String>,
}

impl SamlAssertion {
    /// Parse a SAML response (or a bare assertion) from XML.
    ///
    /// The first `Assertion` element in the document is used, and within it the first
    /// `AttributeStatement`. Elements are matched by local name, so any namespace prefix is
    /// accepted.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::MalformedXml`] if the document isn't well-formed and
    /// [`ParseError::MissingAssertion`] if there's no assertion with an attribute statement.
    pub fn parse(raw: impl Into<String>) -> Result<Self, ParseError> {
        let raw = raw.into();
        let attributes = parse_attributes(&raw)?;
        Ok(Self { raw, attributes })
    }

    /// Parse a base64 encoded SAML response, as posted in a `SAMLResponse` form field.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::InvalidEncoding`] if the value isn't base64 encoded UTF-8, or any
    /// error from [`parse`](Self::parse).
    pub fn from_base64(encoded: &str) -> Result<Self, ParseError> {
        let decoded = STANDARD
            .decode(encoded.trim())
            .map_err(|error| ParseError::InvalidEncoding(error.to_string()))?;
        let raw = String::from_utf8(decoded)
            .map_err(|error| ParseError::InvalidEncoding(error.to_string()))?;
        Self::parse(raw)
    }

    /// The document as it was captured.
    #[must_use]
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// The document in the base64 form STS expects.
    #[must_use]
    pub fn encoded(&self) -> String {
        STANDARD.encode(&self.raw)
    }

    /// All attributes in the attribute statement.
    #[must_use]
    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    /// The first attribute called `name`.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|attribute| attribute.name == name)
    }

    /// The roles this assertion allows assuming, in document order.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::NoRoleAttribute`] if there's no role attribute,
    /// [`ParseError::MalformedRoleValue`] if any value is not a role/provider pair, and
    /// [`ParseError::NoRolesAvailable`] if the attribute has no values.
    pub fn roles(&self) -> Result<Vec<Role>, ParseError> {
        let attribute = self
            .attribute(ROLE_ATTRIBUTE)
            .ok_or(ParseError::NoRoleAttribute)?;

        let roles = attribute
            .values
            .iter()
            .map(|value| value.parse())
            .collect::<Result<Vec<Role>, _>>()?;

        if roles.is_empty() {
            return Err(ParseError::NoRolesAvailable);
        }
        Ok(roles)
    }
}

/// An IAM role that can be assumed with an assertion.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Role {
    /// The role to assume.
    pub role_arn: String,

    /// The SAML provider trusted by the role.
    pub principal_arn: String,
}

impl Role {
    /// The account the role belongs to.
    #[must_use]
    pub fn account_id(&self) -> Option<&str> {
        self.role_arn.split(':').nth(4).filter(|id| !id.is_empty())
    }

    /// The role's name, without any path.
    #[must_use]
    pub fn role_name(&self) -> Option<&str> {
        self.role_arn
            .split_once(":role/")
            .and_then(|(_, name)| name.rsplit('/').next())
    }

    /// The partition the role lives in (`aws`, `aws-cn`, ...).
    #[must_use]
    pub fn partition(&self) -> &str {
        self.role_arn
            .split(':')
            .nth(1)
            .filter(|partition| !partition.is_empty())
            .unwrap_or("aws")
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.role_arn.fmt(f)
    }
}

impl FromStr for Role {
    type Err = ParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let malformed = || ParseError::MalformedRoleValue(value.to_string());

        let mut parts = value.split(',').map(str::trim);
        let (first, second) = match (parts.next(), parts.next(), parts.next()) {
            (Some(first), Some(second), None) => (first, second),
            _ => return Err(malformed()),
        };

        // AWS accepts the pair in either order
        let (role_arn, principal_arn) = if is_role_arn(first) && is_provider_arn(second) {
            (first, second)
        } else if is_provider_arn(first) && is_role_arn(second) {
            (second, first)
        } else {
            return Err(malformed());
        };

        Ok(Self {
            role_arn: role_arn.to_string(),
            principal_arn: principal_arn.to_string(),
        })
    }
}

fn is_role_arn(value: &str) -> bool {
    value.starts_with("arn:")
        && value
            .split_once(":role/")
            .is_some_and(|(_, name)| !name.is_empty())
}

fn is_provider_arn(value: &str) -> bool {
    value.starts_with("arn:")
        && value
            .split_once(":saml-provider/")
            .is_some_and(|(_, name)| !name.is_empty())
}

/// An error encountered reading an assertion.
#[allow(clippy::module_name_repetitions)]
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// The SAML response wasn't valid base64/UTF-8.
    #[error("SAML response is not valid base64: {0}")]
    InvalidEncoding(String),

    /// The document isn't well-formed XML.
    #[error("SAML response is not well-formed XML: {0}")]
    MalformedXml(String),

    /// The document has no assertion, or the assertion has no attribute statement.
    #[error("SAML response does not contain an assertion with an attribute statement")]
    MissingAssertion,

    /// The assertion doesn't grant any roles.
    #[error("SAML assertion has no role attribute ({})", ROLE_ATTRIBUTE)]
    NoRoleAttribute,

    /// A role attribute value isn't a role/provider pair.
    #[error("SAML assertion has a malformed role value: {0:?}")]
    MalformedRoleValue(String),

    /// The role attribute is present but empty.
    #[error("SAML assertion does not offer any roles")]
    NoRolesAvailable,
}

#[derive(Default)]
struct AttributeCollector {
    depth: usize,
    seen_root: bool,
    assertion: Option<usize>,
    assertion_done: bool,
    statement: Option<usize>,
    statement_seen: bool,
    attribute: Option<Attribute>,
    value: Option<String>,
    attributes: Vec<Attribute>,
}

impl AttributeCollector {
    fn open<F>(&mut self, name: &[u8], attribute_name: F) -> Result<(), ParseError>
    where
        F: FnOnce() -> Result<String, ParseError>,
    {
        self.depth += 1;
        self.seen_root = true;

        match (name, self.assertion, self.statement) {
            (b"Assertion", None, _) if !self.assertion_done => {
                self.assertion = Some(self.depth);
            }
            (b"AttributeStatement", Some(_), None) if !self.statement_seen => {
                self.statement = Some(self.depth);
                self.statement_seen = true;
            }
            (b"Attribute", _, Some(statement)) if self.depth == statement + 1 => {
                self.attribute = Some(Attribute {
                    name: attribute_name()?,
                    values: Vec::new(),
                });
            }
            (b"AttributeValue", _, Some(statement))
                if self.depth == statement + 2 && self.attribute.is_some() =>
            {
                self.value = Some(String::new());
            }
            _ => {}
        }
        Ok(())
    }

    fn text(&mut self, text: &str) {
        if let Some(value) = &mut self.value {
            value.push_str(text);
        }
    }

    fn close(&mut self) {
        if let Some(statement) = self.statement {
            if self.depth == statement + 2 {
                if let (Some(value), Some(attribute)) = (self.value.take(), &mut self.attribute) {
                    attribute.values.push(value.trim().to_string());
                }
            } else if self.depth == statement + 1 {
                if let Some(attribute) = self.attribute.take() {
                    self.attributes.push(attribute);
                }
            } else if self.depth == statement {
                self.statement = None;
            }
        }
        if self.assertion == Some(self.depth) {
            self.assertion = None;
            self.assertion_done = true;
        }
        self.depth -= 1;
    }

    fn finish(self) -> Result<Vec<Attribute>, ParseError> {
        if !self.seen_root {
            return Err(ParseError::MalformedXml("no root element".to_string()));
        }
        if self.depth != 0 {
            return Err(ParseError::MalformedXml(
                "unexpected end of document".to_string(),
            ));
        }
        if !self.statement_seen {
            return Err(ParseError::MissingAssertion);
        }
        Ok(self.attributes)
    }
}

fn parse_attributes(xml: &str) -> Result<Vec<Attribute>, ParseError> {
    let mut reader = Reader::from_str(xml);
    let mut collector = AttributeCollector::default();
    let malformed = |error: quick_xml::Error| ParseError::MalformedXml(error.to_string());

    loop {
        match reader.read_event().map_err(malformed)? {
            Event::Start(element) => {
                collector.open(element.local_name().as_ref(), || name_attribute(&element))?;
            }
            Event::Empty(element) => {
                collector.open(element.local_name().as_ref(), || name_attribute(&element))?;
                collector.close();
            }
            Event::End(_) => {
                if collector.depth == 0 {
                    return Err(ParseError::MalformedXml("unbalanced end tag".to_string()));
                }
                collector.close();
            }
            Event::Text(text) => {
                let text = text.unescape().map_err(malformed)?;
                if collector.depth == 0 && !text.trim().is_empty() {
                    return Err(ParseError::MalformedXml(
                        "text outside of the root element".to_string(),
                    ));
                }
                collector.text(&text);
            }
            Event::CData(data) => {
                collector.text(&String::from_utf8_lossy(&data));
            }
            Event::Eof => break,
            _ => {}
        }
    }

    collector.finish()
}

fn name_attribute(element: &quick_xml::events::BytesStart) -> Result<String, ParseError> {
    for attribute in element.attributes() {
        let attribute =
            attribute.map_err(|error| ParseError::MalformedXml(error.to_string()))?;
        if attribute.key.local_name().as_ref() == b"Name" {
            return attribute
                .unescape_value()
                .map(|value| value.into_owned())
                .map_err(|error| ParseError::MalformedXml(error.to_string()));
        }
    }
    Ok(String::new())
}
