use serde::{Deserialize, Serialize};
use std::fmt;

/// An opaque revision identifier (commit id, image id, ...).
///
/// Revisions compare by equality only. The empty string is the "unknown"
/// sentinel: a lookup that failed or has not resolved yet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Revision(String);

impl Revision {
    /// Number of characters kept by [`Revision::short`].
    pub const SHORT_LEN: usize = 7;

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The unknown sentinel.
    pub fn unknown() -> Self {
        Self(String::new())
    }

    pub fn is_unknown(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Display prefix of the revision. Unknown stays unknown, and values
    /// shorter than [`Revision::SHORT_LEN`] are returned whole.
    pub fn short(&self) -> Revision {
        match self.0.char_indices().nth(Self::SHORT_LEN) {
            Some((idx, _)) => Revision(self.0[..idx].to_string()),
            None => self.clone(),
        }
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Revision {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for Revision {
    fn from(s: String) -> Self {
        Self(s)
    }
}
