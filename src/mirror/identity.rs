use crate::mirror::transport::{
    Address,
    Transaction,
};
use anyhow::{
    Context,
    anyhow,
};
use ed25519_dalek::{
    Signer,
    SigningKey,
};
use std::path::Path;

/// The server's operating keypair. Its public key is the recorded authority
/// on every mirror account this process initializes.
pub struct ServerIdentity {
    key: SigningKey,
}

impl ServerIdentity {
    /// Load a 32-byte hex-encoded secret key from disk.
    pub fn from_key_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref()).with_context(|| {
            format!("read server key file {}", path.as_ref().display())
        })?;
        let bytes = hex::decode(raw.trim()).context("decode server key hex")?;
        let secret: [u8; 32] = bytes
            .try_into()
            .map_err(|_| anyhow!("server key must be 32 bytes"))?;
        Ok(Self {
            key: SigningKey::from_bytes(&secret),
        })
    }

    /// Fresh random keypair. Mirror accounts initialized under an ephemeral
    /// identity are unreachable after a restart, so this is for local runs.
    pub fn ephemeral() -> Self {
        let secret: [u8; 32] = rand::random();
        Self {
            key: SigningKey::from_bytes(&secret),
        }
    }

    pub fn address(&self) -> Address {
        Address(self.key.verifying_key().to_bytes())
    }

    /// Attach this identity's signature to a transaction.
    pub fn sign(&self, transaction: &mut Transaction) {
        let signature = self.key.sign(&transaction.message());
        transaction
            .signatures
            .push((self.address(), signature.to_bytes().to_vec()));
    }
}
