use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::SessionError;

lazy_static! {
    static ref SESSION_ID_REGEX: Regex = Regex::new(
        r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-4[0-9a-fA-F]{3}-[89abAB][0-9a-fA-F]{3}-[0-9a-fA-F]{12}$"
    )
    .unwrap();
}

/// Identifier of a session record: a version-4 UUID.
///
/// The only ways to obtain one are [`SessionId::generate`] and
/// [`SessionId::parse`], so a value of this type has always passed the format
/// gate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn generate() -> Self {
        SessionId(Uuid::new_v4())
    }

    /// Validate a client-supplied identifier.
    ///
    /// Anything that is not a lowercase or uppercase v4 UUID in hyphenated form
    /// is rejected as `InvalidInput`, before any store lookup happens.
    pub fn parse(raw: &str) -> Result<Self, SessionError> {
        if !SESSION_ID_REGEX.is_match(raw) {
            return Err(SessionError::invalid(format!(
                "malformed session id: {:?}",
                raw
            )));
        }
        Uuid::parse_str(raw)
            .map(SessionId)
            .map_err(|e| SessionError::invalid(e.to_string()))
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl TryFrom<String> for SessionId {
    type Error = SessionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        SessionId::parse(&value)
    }
}

impl From<SessionId> for String {
    fn from(id: SessionId) -> Self {
        id.to_string()
    }
}
