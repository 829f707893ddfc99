//! Identifier derivation and key encoding.
//!
//! Migration ids and target record ids are derived with blake3 so that the
//! same logical record always lands on the same key. That is what makes
//! batch replays upserts rather than duplicates.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Current time in microseconds since the Unix epoch.
pub fn current_timestamp() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}

/// Hash a sequence of parts into 16 bytes.
///
/// Parts are length-prefixed so `["ab", "c"]` and `["a", "bc"]` differ.
pub fn hash16(parts: &[&[u8]]) -> [u8; 16] {
    let mut hasher = blake3::Hasher::new();
    for part in parts {
        hasher.update(&(part.len() as u64).to_be_bytes());
        hasher.update(part);
    }
    let digest = hasher.finalize();
    let mut out = [0u8; 16];
    out.copy_from_slice(&digest.as_bytes()[..16]);
    out
}

/// Deterministic id of a target record, hex encoded.
pub fn record_id(kind: &str, parts: &[&str]) -> String {
    let mut all: Vec<&[u8]> = Vec::with_capacity(parts.len() + 1);
    all.push(kind.as_bytes());
    all.extend(parts.iter().map(|p| p.as_bytes()));
    hex::encode(hash16(&all))
}

/// Unique identifier of a migration run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MigrationId([u8; 16]);

impl MigrationId {
    /// Wrap raw bytes.
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Derive an id from arbitrary parts.
    pub fn derive(parts: &[&[u8]]) -> Self {
        Self(hash16(parts))
    }

    /// Raw bytes of the id.
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl fmt::Display for MigrationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// Error parsing a migration id from text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid migration id '{0}': expected 32 hex characters")]
pub struct ParseMigrationIdError(String);

impl FromStr for MigrationId {
    type Err = ParseMigrationIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s.trim()).map_err(|_| ParseMigrationIdError(s.to_string()))?;
        let bytes: [u8; 16] = bytes
            .try_into()
            .map_err(|_| ParseMigrationIdError(s.to_string()))?;
        Ok(Self(bytes))
    }
}

impl Serialize for MigrationId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for MigrationId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash16_is_length_prefixed() {
        assert_ne!(hash16(&[b"ab", b"c"]), hash16(&[b"a", b"bc"]));
        assert_eq!(hash16(&[b"x"]), hash16(&[b"x"]));
    }

    #[test]
    fn test_record_id_stable() {
        let a = record_id("entity", &["customer", "OCRD", "C001"]);
        let b = record_id("entity", &["customer", "OCRD", "C001"]);
        let c = record_id("entity", &["customer", "OCRD", "C002"]);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 32);
    }

    #[test]
    fn test_migration_id_parse_display() {
        let id = MigrationId::derive(&[b"schema", b"target"]);
        let text = id.to_string();
        let parsed: MigrationId = text.parse().unwrap();
        assert_eq!(parsed, id);
        assert!("not-hex".parse::<MigrationId>().is_err());
        assert!("abcd".parse::<MigrationId>().is_err());
    }

    #[test]
    fn test_migration_id_json() {
        let id = MigrationId::from_bytes([7u8; 16]);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", "07".repeat(16)));
        let back: MigrationId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
