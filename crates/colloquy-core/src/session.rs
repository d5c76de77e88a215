//! Session keys: the thread id binding a conversation to engine-side state.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Namespace for deriving thread ids from participant ids. Changing it orphans every
/// existing engine thread.
pub const SESSION_NAMESPACE: Uuid = Uuid::from_u128(0x41010b5d_5447_4df5_baf2_97d69f2e9d06);

/// Stable identifier for one conversational thread.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionKey(String);

impl SessionKey {
    /// Wrap an existing thread id as-is.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<Uuid> for SessionKey {
    fn from(id: Uuid) -> Self {
        Self(id.to_string())
    }
}

/// Derive the thread id for a participant/session id.
///
/// Present ids map to a UUIDv5 under [`SESSION_NAMESPACE`] (the empty string included), so a
/// reconnecting participant lands on the same engine thread. Absent ids get a fresh UUIDv4.
pub fn derive_session_key(raw_id: Option<&str>) -> SessionKey {
    match raw_id {
        Some(id) => Uuid::new_v5(&SESSION_NAMESPACE, id.as_bytes()).into(),
        None => Uuid::new_v4().into(),
    }
}
