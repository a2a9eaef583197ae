//! Identities and Game Addresses
//!
//! `Pubkey` identifies a signer (player or validator). `GameAddress` locates a
//! game record and is derived deterministically from the creator and a
//! per-game nonce, so a record can be found without any index.

use std::fmt;
use serde::{Serialize, Deserialize, Serializer, Deserializer};
use sha2::{Sha256, Digest};

/// Seed prefix for game address derivation.
pub const GAME_SEED: &[u8] = b"game";

/// Domain separator for game address derivation.
const ADDRESS_DOMAIN: &[u8] = b"FLEET_WARS_ADDRESS_V1";

macro_rules! key_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
        pub struct $name(pub [u8; 32]);

        impl $name {
            /// Create from raw bytes.
            pub const fn new(bytes: [u8; 32]) -> Self {
                Self(bytes)
            }

            /// Get raw bytes.
            pub fn as_bytes(&self) -> &[u8; 32] {
                &self.0
            }

            /// Parse from a 64-character hex string.
            pub fn from_hex(s: &str) -> Option<Self> {
                let bytes = hex::decode(s.trim_start_matches("0x")).ok()?;
                let arr: [u8; 32] = bytes.try_into().ok()?;
                Some(Self(arr))
            }

            /// Full hex encoding.
            pub fn to_hex(&self) -> String {
                hex::encode(self.0)
            }

            /// First 4 bytes as hex, for log lines.
            pub fn short(&self) -> String {
                hex::encode(&self.0[..4])
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.short())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.to_hex())
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                crate::core::hash::hex32::serialize(&self.0, serializer)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                crate::core::hash::hex32::deserialize(deserializer).map(Self)
            }
        }
    };
}

key_type! {
    /// Public identity of a signer.
    ///
    /// The all-zero key is reserved to mean "unset" inside the game record.
    Pubkey
}

key_type! {
    /// Deterministic location of a game record.
    GameAddress
}

impl Pubkey {
    /// The reserved "unset" key.
    pub const UNSET: Pubkey = Pubkey([0; 32]);

    /// Is this the reserved unset key?
    pub fn is_unset(&self) -> bool {
        self.0 == [0; 32]
    }

    /// Derive a key from a human-readable label.
    ///
    /// Used for configured validator identities and test fixtures.
    pub fn from_label(label: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(b"fleet-wars-key:");
        hasher.update(label.as_bytes());
        Self(hasher.finalize().into())
    }
}

impl GameAddress {
    /// Derive the address of the game created by `creator` with `nonce`.
    pub fn derive(creator: &Pubkey, nonce: u64) -> Self {
        let mut hasher = Sha256::new();

        // Domain separator
        hasher.update(ADDRESS_DOMAIN);

        hasher.update(GAME_SEED);
        hasher.update(creator.as_bytes());
        hasher.update(nonce.to_le_bytes());

        Self(hasher.finalize().into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_derivation_deterministic() {
        let creator = Pubkey::from_label("alice");
        assert_eq!(GameAddress::derive(&creator, 7), GameAddress::derive(&creator, 7));
    }

    #[test]
    fn test_address_depends_on_creator_and_nonce() {
        let alice = Pubkey::from_label("alice");
        let bob = Pubkey::from_label("bob");

        assert_ne!(GameAddress::derive(&alice, 1), GameAddress::derive(&alice, 2));
        assert_ne!(GameAddress::derive(&alice, 1), GameAddress::derive(&bob, 1));
    }

    #[test]
    fn test_hex_roundtrip() {
        let key = Pubkey::from_label("validator");
        assert_eq!(Pubkey::from_hex(&key.to_hex()), Some(key));
        assert_eq!(Pubkey::from_hex(&format!("0x{}", key.to_hex())), Some(key));
        assert!(Pubkey::from_hex("abcd").is_none());
        assert!(Pubkey::from_hex("zz").is_none());
    }

    #[test]
    fn test_unset_key() {
        assert!(Pubkey::UNSET.is_unset());
        assert!(Pubkey::default().is_unset());
        assert!(!Pubkey::from_label("alice").is_unset());
    }

    #[test]
    fn test_serde_formats() {
        let key = Pubkey::from_label("alice");

        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, format!("\"{}\"", key.to_hex()));

        let bytes = bincode::serialize(&key).unwrap();
        assert_eq!(bytes.len(), 32);
        assert_eq!(bincode::deserialize::<Pubkey>(&bytes).unwrap(), key);
    }
}
