#![expect(
    clippy::module_name_repetitions,
    reason = "Error types include the module name to indicate their scope"
)]

use std::error::Error as StdError;
use std::fmt;

/// Session error variants.
#[non_exhaustive]
#[derive(Debug)]
pub enum SessionError {
    /// The computed target URL did not parse
    InvalidUrl(url::ParseError),
    /// The session task has shut down and can no longer accept commands
    Detached,
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidUrl(e) => write!(f, "invalid session URL: {e}"),
            Self::Detached => write!(f, "session task has shut down"),
        }
    }
}

impl StdError for SessionError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::InvalidUrl(e) => Some(e),
            Self::Detached => None,
        }
    }
}

// Integration with main Error type
impl From<SessionError> for crate::error::Error {
    fn from(e: SessionError) -> Self {
        crate::error::Error::with_source(crate::error::Kind::Session, e)
    }
}

impl From<url::ParseError> for crate::error::Error {
    fn from(e: url::ParseError) -> Self {
        crate::error::Error::with_source(crate::error::Kind::Session, SessionError::InvalidUrl(e))
    }
}
