//! RSA keypairs for HTTP Signatures
//!
//! RSA-SHA256 (PKCS#1 v1.5) only. A keypair built from a public key can
//! verify but refuses to sign.

use std::fmt;

use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey};
use rsa::pkcs1v15::{Signature as Pkcs1v15Signature, SigningKey, VerifyingKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::signature::{RandomizedSigner, SignatureEncoding, Verifier};
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;

use crate::error::AppError;

/// Modulus size used by [`Keypair::generate`]
pub const KEY_BITS: usize = 2048;

/// One RSA key: public half always, private half optionally
#[derive(Clone)]
pub struct Keypair {
    public_key: RsaPublicKey,
    private_key: Option<RsaPrivateKey>,
}

impl Keypair {
    /// Generate a fresh 2048-bit keypair with both halves present
    pub fn generate() -> Result<Self, AppError> {
        let mut rng = rand::thread_rng();
        let private_key = RsaPrivateKey::new(&mut rng, KEY_BITS)
            .map_err(|e| AppError::Key(format!("Key generation failed: {}", e)))?;
        let public_key = RsaPublicKey::from(&private_key);

        Ok(Self {
            public_key,
            private_key: Some(private_key),
        })
    }

    /// Verify-only keypair from a PEM public key
    ///
    /// Accepts SPKI (`BEGIN PUBLIC KEY`) and PKCS#1 (`BEGIN RSA PUBLIC KEY`).
    pub fn from_public_key(pem: &str) -> Result<Self, AppError> {
        let pem = pem.trim();
        let public_key = RsaPublicKey::from_public_key_pem(pem)
            .or_else(|_| RsaPublicKey::from_pkcs1_pem(pem))
            .map_err(|e| AppError::Key(format!("Invalid public key: {}", e)))?;

        Ok(Self {
            public_key,
            private_key: None,
        })
    }

    /// Full keypair from a PEM private key (PKCS#8 or PKCS#1)
    pub fn from_private_key_pem(pem: &str) -> Result<Self, AppError> {
        let pem = pem.trim();
        let private_key = RsaPrivateKey::from_pkcs8_pem(pem)
            .or_else(|_| RsaPrivateKey::from_pkcs1_pem(pem))
            .map_err(|e| AppError::Key(format!("Invalid private key: {}", e)))?;
        let public_key = RsaPublicKey::from(&private_key);

        Ok(Self {
            public_key,
            private_key: Some(private_key),
        })
    }

    /// Whether this keypair can sign
    pub fn has_private_key(&self) -> bool {
        self.private_key.is_some()
    }

    /// RSA-SHA256 signature over `data`
    ///
    /// # Errors
    /// `OperationNotPermitted` when the private half is absent
    pub fn sign(&self, data: &[u8]) -> Result<Vec<u8>, AppError> {
        let private_key = self
            .private_key
            .as_ref()
            .ok_or(AppError::OperationNotPermitted)?;

        let signing_key = SigningKey::<Sha256>::new(private_key.clone());
        let mut rng = rand::thread_rng();
        let signature = signing_key
            .try_sign_with_rng(&mut rng, data)
            .map_err(|e| AppError::Key(format!("Signing failed: {}", e)))?;

        Ok(signature.to_vec())
    }

    /// Check an RSA-SHA256 signature; any mismatch or malformed signature is `false`
    pub fn verify(&self, data: &[u8], signature: &[u8]) -> bool {
        let Ok(signature) = Pkcs1v15Signature::try_from(signature) else {
            return false;
        };
        let verifier = VerifyingKey::<Sha256>::new(self.public_key.clone());
        verifier.verify(data, &signature).is_ok()
    }

    /// Public half as SPKI PEM
    pub fn public_key_pem(&self) -> Result<String, AppError> {
        self.public_key
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| AppError::Key(format!("Failed to encode public key: {}", e)))
    }

    /// Private half as PKCS#8 PEM
    pub fn private_key_pem(&self) -> Result<String, AppError> {
        let private_key = self
            .private_key
            .as_ref()
            .ok_or(AppError::OperationNotPermitted)?;

        private_key
            .to_pkcs8_pem(LineEnding::LF)
            .map(|pem| pem.to_string())
            .map_err(|e| AppError::Key(format!("Failed to encode private key: {}", e)))
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keypair")
            .field("has_private_key", &self.has_private_key())
            .finish()
    }
}
