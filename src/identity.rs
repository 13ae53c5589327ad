//! Identity atoms: user identifiers and stored credential digests.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use uuid::Uuid;

/// Invalid identifier input.
#[derive(Debug, Error, Clone)]
#[non_exhaustive]
pub enum InvalidId {
    #[error("user id `{raw}` is invalid: {reason}")]
    User { raw: String, reason: String },
}

/// User identifier - a v4 UUID in canonical lowercase hyphenated form.
///
/// Directory names under the namespace root and `users.id` rows both carry
/// the canonical form, so the two stores compare as plain string sets.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(Uuid);

impl UserId {
    pub fn new(id: Uuid) -> Self {
        Self(id)
    }

    /// Fresh random identifier. Uniqueness is the record store's job.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse and canonicalize. Accepts any input case; Display renders the
    /// canonical lowercase hyphenated form.
    pub fn parse_str(s: &str) -> Result<Self, InvalidId> {
        Uuid::try_parse(s).map(Self).map_err(|e| InvalidId::User {
            raw: s.to_string(),
            reason: e.to_string(),
        })
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Debug for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UserId({})", self.0)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for UserId {
    type Error = InvalidId;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        UserId::parse_str(&s)
    }
}

impl From<Uuid> for UserId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl From<UserId> for Uuid {
    fn from(id: UserId) -> Uuid {
        id.0
    }
}

/// SHA-256 digest of a caller-supplied secret.
///
/// The plaintext is hashed at the provisioning boundary and never persisted.
/// Verification against the digest is owned by an external collaborator.
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SecretDigest([u8; 32]);

impl SecretDigest {
    pub fn from_secret(secret: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(secret.as_bytes());
        Self(hasher.finalize().into())
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for SecretDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretDigest(..)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_id_canonicalizes_to_lowercase() {
        let id = UserId::parse_str("6BA7B810-9DAD-11D1-80B4-00C04FD430C8").unwrap();
        assert_eq!(id.to_string(), "6ba7b810-9dad-11d1-80b4-00c04fd430c8");
    }

    #[test]
    fn user_id_rejects_garbage() {
        for raw in ["", "not-a-uuid", "6ba7b810", "6ba7b810-9dad-11d1-80b4-00c04fd430c8z"] {
            assert!(UserId::parse_str(raw).is_err(), "{raw}");
        }
    }

    #[test]
    fn user_id_round_trips_through_display() {
        let id = UserId::generate();
        let reparsed = UserId::parse_str(&id.to_string()).unwrap();
        assert_eq!(id, reparsed);
    }

    #[test]
    fn generated_ids_are_version_4() {
        let id = UserId::generate();
        assert_eq!(id.as_uuid().get_version_num(), 4);
    }

    #[test]
    fn secret_digest_is_deterministic_and_input_sensitive() {
        let a = SecretDigest::from_secret("secret1");
        let b = SecretDigest::from_secret("secret1");
        let c = SecretDigest::from_secret("secret2");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn secret_digest_debug_is_redacted() {
        let digest = SecretDigest::from_secret("hunter2");
        assert_eq!(format!("{digest:?}"), "SecretDigest(..)");
    }
}
