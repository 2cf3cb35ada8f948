//! Voter trapdoor generation
//!
//! The secret `x` is 16 random bytes in hex; the commitment registered with
//! the node is `hex(sha256(x))` taken over the hex text.

use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;

/// Secret byte length
pub const SECRET_LEN: usize = 16;

/// Trapdoor secret and its commitment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trapdoor {
    pub secret: String,
    pub commitment: String,
}

impl Trapdoor {
    /// Generate a fresh trapdoor
    pub fn generate() -> Self {
        let mut bytes = [0u8; SECRET_LEN];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self::from_secret(hex::encode(bytes))
    }

    /// Rebuild a trapdoor from a known secret
    pub fn from_secret(secret: impl Into<String>) -> Self {
        let secret = secret.into();
        let commitment = commit(&secret);
        Self { secret, commitment }
    }

    /// Check that the commitment matches the secret
    pub fn verify(&self) -> bool {
        commit(&self.secret) == self.commitment
    }

    pub fn to_json(&self) -> anyhow::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Load a trapdoor saved with [`Trapdoor::save`]
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let trapdoor: Trapdoor = serde_json::from_str(&content)?;
        if !trapdoor.verify() {
            anyhow::bail!("commitment in {} does not match its secret", path.display());
        }
        Ok(trapdoor)
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }
}

/// Commitment for a secret
pub fn commit(secret: &str) -> String {
    hex::encode(Sha256::digest(secret.as_bytes()))
}
