use std::fmt;
use std::str::FromStr;

/// Content-derived photo identity: the lowercase hex SHA-256 digest of the
/// file bytes. Two files with identical bytes share one identity regardless
/// of where they live in the tree.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "String", into = "String"))]
pub struct PhotoIdentity(String);

/// Length of a hex-encoded SHA-256 digest.
pub const IDENTITY_HEX_LEN: usize = 64;

impl PhotoIdentity {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short prefix used in log lines.
    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }
}

impl fmt::Display for PhotoIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for PhotoIdentity {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Raised when a string is not a 64-character hex digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityParseError(pub String);

impl fmt::Display for IdentityParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid photo identity '{}'", self.0)
    }
}

impl std::error::Error for IdentityParseError {}

impl FromStr for PhotoIdentity {
    type Err = IdentityParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let valid = s.len() == IDENTITY_HEX_LEN
            && s.bytes().all(|b| b.is_ascii_hexdigit());
        if valid {
            Ok(Self(s.to_ascii_lowercase()))
        } else {
            Err(IdentityParseError(s.to_string()))
        }
    }
}

impl TryFrom<String> for PhotoIdentity {
    type Error = IdentityParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PhotoIdentity> for String {
    fn from(value: PhotoIdentity) -> Self {
        value.0
    }
}
