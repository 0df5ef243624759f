// ===============================
// src/signer.rs
// ===============================
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::domain::{tagged_digest, Address, Operation};

/// Signs operations on behalf of one account.
pub trait Signer {
    fn address(&self) -> &Address;
    fn sign(&self, op: &Operation) -> String;
}

/// Keyed-MAC signer for development ledgers. The address is derived from the
/// secret, so the same secret always names the same account.
#[derive(Clone)]
pub struct DevSigner {
    label: String,
    secret: Vec<u8>,
    address: Address,
}

impl DevSigner {
    pub fn from_secret(label: &str, secret: &str) -> Self {
        Self {
            label: label.to_string(),
            secret: secret.as_bytes().to_vec(),
            address: Address::from_digest(&tagged_digest(b"addr", secret.as_bytes())),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn verify(&self, op: &Operation, signature: &str) -> bool {
        self.sign(op) == signature
    }
}

impl std::fmt::Debug for DevSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // never print the secret
        f.debug_struct("DevSigner")
            .field("label", &self.label)
            .field("address", &self.address)
            .finish()
    }
}

impl Signer for DevSigner {
    fn address(&self) -> &Address {
        &self.address
    }

    fn sign(&self, op: &Operation) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(&self.secret).expect("HMAC can take key");
        mac.update(&op.canonical_bytes());
        hex::encode(mac.finalize().into_bytes())
    }
}
