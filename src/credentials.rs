use std::fmt;

use chrono::{DateTime, Utc};

use crate::ExchangeError;

/// Temporary AWS credentials.
///
/// The fields of this struct are obviously pretty sensitive, and should be handled with care.
/// The secret and session token are not printed in `Debug` output.
#[allow(clippy::module_name_repetitions)]
#[derive(Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct TemporaryCredentials {
    /// The access key ID.
    #[serde(rename = "aws_access_key_id")]
    pub access_key_id: String,

    /// The secret access key.
    #[serde(rename = "aws_secret_access_key")]
    pub secret_access_key: String,

    /// The session token.
    #[serde(rename = "aws_session_token")]
    pub session_token: String,

    /// When the credentials expire.
    #[serde(rename = "aws_expiration")]
    pub expires_at: DateTime<Utc>,
}

impl TemporaryCredentials {
    /// Whether the credentials can still be handed out at `now`, leaving `margin` before they
    /// expire.
    #[must_use]
    pub fn is_usable_at(&self, now: DateTime<Utc>, margin: chrono::Duration) -> bool {
        self.expires_at
            .checked_sub_signed(margin)
            .is_some_and(|limit| now < limit)
    }

    pub(crate) fn validate(&self, now: DateTime<Utc>) -> Result<(), ExchangeError> {
        let missing: Vec<_> = [
            ("access_key_id", &self.access_key_id),
            ("secret_access_key", &self.secret_access_key),
            ("session_token", &self.session_token),
        ]
        .into_iter()
        .filter(|(_, value)| value.is_empty())
        .map(|(name, _)| name)
        .collect();

        if !missing.is_empty() {
            return Err(ExchangeError::InvalidResponse(format!(
                "empty {}",
                missing.join(", ")
            )));
        }
        if self.expires_at <= now {
            return Err(ExchangeError::InvalidResponse(format!(
                "credentials expired at {}",
                self.expires_at
            )));
        }
        Ok(())
    }
}

impl fmt::Debug for TemporaryCredentials {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("TemporaryCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn credentials(expires_at: DateTime<Utc>) -> TemporaryCredentials {
        TemporaryCredentials {
            access_key_id: "ASIAEXAMPLE".to_string(),
            secret_access_key: "secret".to_string(),
            session_token: "token".to_string(),
            expires_at,
        }
    }

    #[test]
    fn usable_until_margin() {
        let now = Utc::now();
        let margin = Duration::minutes(5);
        assert!(credentials(now + Duration::hours(1)).is_usable_at(now, margin));
        assert!(!credentials(now + Duration::minutes(1)).is_usable_at(now, margin));
        assert!(!credentials(now + margin).is_usable_at(now, margin));
    }

    #[test]
    fn out_of_range_expiry_is_not_usable() {
        let now = Utc::now();
        assert!(!credentials(DateTime::<Utc>::MIN_UTC).is_usable_at(now, Duration::minutes(5)));
        assert!(!credentials(now + Duration::hours(1)).is_usable_at(now, Duration::weeks(1 << 30)));
    }

    #[test]
    fn validate_rejects_empty_keys() {
        let now = Utc::now();
        let creds = TemporaryCredentials {
            secret_access_key: String::new(),
            session_token: String::new(),
            ..credentials(now + Duration::hours(1))
        };
        match creds.validate(now) {
            Err(ExchangeError::InvalidResponse(message)) => {
                assert_eq!(message, "empty secret_access_key, session_token");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn validate_rejects_expired() {
        let now = Utc::now();
        assert!(credentials(now + Duration::seconds(1)).validate(now).is_ok());
        assert!(matches!(
            credentials(now).validate(now),
            Err(ExchangeError::InvalidResponse(_))
        ));
    }

    #[test]
    fn debug_hides_secrets() {
        let output = format!("{:?}", credentials(Utc::now()));
        assert!(output.contains("ASIAEXAMPLE"));
        assert!(!output.contains("secret"));
        assert!(!output.contains("token"));
    }
}
