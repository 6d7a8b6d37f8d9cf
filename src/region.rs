// A wrapper around `aws_types::Region` to avoid exposing it in the API.

use std::{borrow::Cow, fmt};

// Use `Region` from `aws_sdk_sts` to avoid depending directly on `aws_types`.
use aws_sdk_sts::config::Region as SdkRegion;

const DEFAULT_REGION: &str = "us-east-1";

/// An AWS region.
#[derive(Clone, Eq, Hash, PartialEq)]
pub struct Region(pub(crate) SdkRegion);

impl Region {
    /// Construct a new `Region` for the given string.
    pub fn new(region: impl Into<Cow<'static, str>>) -> Self {
        Self(SdkRegion::new(region))
    }

    /// The configured region, or `us-east-1` if `region` is empty.
    pub(crate) fn or_default(region: &str) -> Self {
        if region.is_empty() {
            Self::new(DEFAULT_REGION)
        } else {
            Self::new(region.to_string())
        }
    }
}

impl AsRef<str> for Region {
    fn as_ref(&self) -> &str {
        self.0.as_ref()
    }
}

impl fmt::Debug for Region {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.0.fmt(f)
    }
}
