//! Hashing for Commitments and Verification
//!
//! Provides:
//! - Board commitments (`sha256(board_le || salt)`)
//! - Deterministic record hashing for receipts and journal replay
//! - Hex serde helpers for 32-byte digests

use sha2::{Sha256, Digest};

/// Hash output type (256 bits / 32 bytes)
pub type StateHash = [u8; 32];

/// Commitment to a hidden board.
pub type CommitHash = [u8; 32];

/// Secret salt mixed into a board commitment.
pub type Salt = [u8; 32];

/// Deterministic hasher for game records.
///
/// Wraps SHA-256 with typed update helpers.
/// Order of updates is critical for determinism.
pub struct StateHasher {
    hasher: Sha256,
}

impl StateHasher {
    /// Create a new hasher with domain separator.
    pub fn new(domain: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(domain);
        Self { hasher }
    }

    /// Create hasher for a game record.
    pub fn for_game_record() -> Self {
        Self::new(b"FLEET_WARS_GAME_V1")
    }

    /// Create hasher for transaction signatures.
    pub fn for_transaction() -> Self {
        Self::new(b"FLEET_WARS_TX_V1")
    }

    /// Update with raw bytes.
    #[inline]
    pub fn update_bytes(&mut self, bytes: &[u8]) {
        self.hasher.update(bytes);
    }

    /// Update with a u8 value.
    #[inline]
    pub fn update_u8(&mut self, value: u8) {
        self.hasher.update([value]);
    }

    /// Update with a u64 value (little-endian).
    #[inline]
    pub fn update_u64(&mut self, value: u64) {
        self.hasher.update(value.to_le_bytes());
    }

    /// Update with a boolean.
    #[inline]
    pub fn update_bool(&mut self, value: bool) {
        self.update_u8(value as u8);
    }

    /// Finalize and return the hash.
    pub fn finalize(self) -> StateHash {
        self.hasher.finalize().into()
    }
}

/// Compute a simple hash of arbitrary data.
pub fn hash_bytes(data: &[u8]) -> StateHash {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Compute hash with domain separator.
pub fn hash_with_domain(domain: &[u8], data: &[u8]) -> StateHash {
    let mut hasher = Sha256::new();
    hasher.update(domain);
    hasher.update(data);
    hasher.finalize().into()
}

/// Commitment to a board: `sha256(board as 8-byte little-endian || salt)`.
///
/// No domain separator: clients compute the same digest with a plain
/// SHA-256 over the 40-byte preimage.
pub fn board_commitment(board: u64, salt: &Salt) -> CommitHash {
    let mut hasher = Sha256::new();
    hasher.update(board.to_le_bytes());
    hasher.update(salt);
    hasher.finalize().into()
}

/// Serde helper that writes 32-byte digests as hex in human-readable
/// formats (JSON) and as raw bytes in binary formats (bincode).
pub mod hex32 {
    use serde::{Deserialize, Deserializer, Serializer};
    use serde::de::Error as _;

    /// Serialize a 32-byte array.
    pub fn serialize<S: Serializer>(bytes: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&hex::encode(bytes))
        } else {
            serde::Serialize::serialize(bytes, serializer)
        }
    }

    /// Deserialize a 32-byte array.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<[u8; 32], D::Error> {
        if deserializer.is_human_readable() {
            let text = String::deserialize(deserializer)?;
            let raw = hex::decode(text.trim_start_matches("0x")).map_err(D::Error::custom)?;
            raw.try_into()
                .map_err(|v: Vec<u8>| D::Error::custom(format!("expected 32 bytes, got {}", v.len())))
        } else {
            <[u8; 32]>::deserialize(deserializer)
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
