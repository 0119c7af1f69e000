//! Newtype domain identifiers.
//!
//! Keeps correlation identifiers distinct from plain strings so they cannot be
//! confused with file paths or operation names in signatures.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifies a single node request (one call to the dispatcher's `execute`).
///
/// Generated fresh for every request; recorded on the request span so all
/// session activity from one request can be correlated in the logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Generates a new random request identifier.
    pub fn new_random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a [`RequestId`] from an existing UUID (e.g. supplied by the workflow framework).
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Returns the underlying [`Uuid`].
    pub fn as_uuid(self) -> Uuid {
        self.0
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
