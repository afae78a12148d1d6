//! Salted password digests stored per agent.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Stored form of an agent password.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PasswordDigest {
    pub salt: String,
    pub hash: String,
}

impl PasswordDigest {
    #[must_use]
    pub fn new(salt: &str, password: &str) -> Self {
        Self {
            salt: salt.to_string(),
            hash: hash_password(salt, password),
        }
    }

    #[must_use]
    pub fn verify(&self, password: &str) -> bool {
        constant_time_eq(
            self.hash.as_bytes(),
            hash_password(&self.salt, password).as_bytes(),
        )
    }
}

/// Random 32-hex-character salt.
#[must_use]
pub fn generate_salt() -> String {
    use std::collections::hash_map::RandomState;
    use std::hash::{BuildHasher, Hasher};

    let mut halves = [0u64; 2];
    for half in &mut halves {
        let mut hasher = RandomState::new().build_hasher();
        hasher.write_u128(
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_nanos())
                .unwrap_or(0),
        );
        hasher.write_u64(RandomState::new().build_hasher().finish());
        *half = hasher.finish();
    }
    format!("{:016x}{:016x}", halves[0], halves[1])
}

/// Hex SHA-256 of `salt || password`.
#[must_use]
pub fn hash_password(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
