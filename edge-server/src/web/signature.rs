//! QQ bot callback signatures.
//!
//! The platform proves possession of the bot secret with Ed25519: the secret
//! is turned into a 32-byte seed, the seed into a keypair, and the keypair
//! signs `event_ts + plain_token` for the callback validation handshake.
//! Event pushes are signed by the platform over `timestamp + body` with the
//! same key and can be verified with [`QqSigner::verify`].

use std::str::FromStr;

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, SECRET_KEY_LENGTH};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::warn;

/// Errors raised while building a signer.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("QQ_SECRET not configured")]
    EmptySecret,
}

/// How the bot secret is turned into an Ed25519 seed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedDerivation {
    /// SHA-256 of the secret bytes.
    Sha256,
    /// The secret repeated until it covers the seed, then truncated.
    Repeat,
}

impl SeedDerivation {
    fn seed(self, secret: &str) -> [u8; SECRET_KEY_LENGTH] {
        let mut seed = [0u8; SECRET_KEY_LENGTH];
        match self {
            SeedDerivation::Sha256 => {
                seed.copy_from_slice(&Sha256::digest(secret.as_bytes()));
            }
            SeedDerivation::Repeat => {
                for (slot, byte) in seed.iter_mut().zip(secret.as_bytes().iter().cycle()) {
                    *slot = *byte;
                }
            }
        }
        seed
    }
}

impl FromStr for SeedDerivation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sha256" => Ok(SeedDerivation::Sha256),
            "repeat" => Ok(SeedDerivation::Repeat),
            other => Err(format!("unknown seed derivation: {other}")),
        }
    }
}

/// Ed25519 keypair derived from the bot secret.
#[derive(Clone)]
pub struct QqSigner {
    key: SigningKey,
}

impl std::fmt::Debug for QqSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QqSigner")
            .field("public_key", &hex::encode(self.key.verifying_key().as_bytes()))
            .finish()
    }
}

impl QqSigner {
    /// Derive the signing key from the bot secret.
    pub fn from_secret(secret: &str, derivation: SeedDerivation) -> Result<Self, SignatureError> {
        if secret.is_empty() {
            return Err(SignatureError::EmptySecret);
        }

        let seed = derivation.seed(secret);
        Ok(Self {
            key: SigningKey::from_bytes(&seed),
        })
    }

    /// Sign a validation challenge.
    ///
    /// The signed message is `event_ts` followed by `plain_token`; the result
    /// is the 64-byte signature as 128 lowercase hex characters.
    pub fn sign(&self, event_ts: &str, plain_token: &str) -> String {
        let mut message = Vec::with_capacity(event_ts.len() + plain_token.len());
        message.extend_from_slice(event_ts.as_bytes());
        message.extend_from_slice(plain_token.as_bytes());

        hex::encode(self.key.sign(&message).to_bytes())
    }

    /// Verify a platform-signed event push.
    ///
    /// Returns `false` for malformed hex, wrong lengths and bad signatures.
    pub fn verify(&self, timestamp: &str, body: &[u8], signature_hex: &str) -> bool {
        if timestamp.is_empty() || signature_hex.is_empty() {
            warn!(
                has_timestamp = !timestamp.is_empty(),
                has_signature = !signature_hex.is_empty(),
                "qq_signature_missing_fields"
            );
            return false;
        }

        let bytes: [u8; 64] = match hex::decode(signature_hex)
            .ok()
            .and_then(|b| <[u8; 64]>::try_from(b).ok())
        {
            Some(b) => b,
            None => {
                warn!(signature_length = signature_hex.len(), "qq_signature_malformed");
                return false;
            }
        };

        let mut message = Vec::with_capacity(timestamp.len() + body.len());
        message.extend_from_slice(timestamp.as_bytes());
        message.extend_from_slice(body);

        let valid = self
            .key
            .verifying_key()
            .verify(&message, &Signature::from_bytes(&bytes))
            .is_ok();

        if !valid {
            warn!("qq_signature_mismatch");
        }

        valid
    }
}

/// Sign a validation challenge straight from the secret.
pub fn sign(secret: &str, event_ts: &str, plain_token: &str) -> Result<String, SignatureError> {
    Ok(QqSigner::from_secret(secret, SeedDerivation::Sha256)?.sign(event_ts, plain_token))
}
