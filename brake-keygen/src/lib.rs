//! Derives a 2048-bit RSA keypair deterministically from a hex seed.
//!
//! The seed (the OPRF's output, see `brake-oprf::derive_seed`) is hashed
//! with SHA-256 to a 32-byte value, which seeds a `ChaCha20Rng`. That RNG
//! is handed straight to `rsa::RsaPrivateKey::new` — prime generation,
//! witness sequences and bit layout are entirely the `rsa` crate's own, so
//! two invocations with the same seed draw the same stream from that RNG
//! and produce byte-identical keys. This crate never generates primes or
//! performs Miller-Rabin itself for RSA.

use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use rsa::pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha256};

/// Minimum accepted length, in hex characters, of a seed. Chosen so the
/// seed carries at least as much entropy as the SHA-256 hash it feeds —
/// shorter inputs are rejected rather than silently zero-extended.
pub const MIN_SEED_HEX_LEN: usize = 8;

const RSA_BITS: usize = 2048;

/// Errors from deriving a keypair.
#[derive(Debug, thiserror::Error)]
pub enum KeygenError {
    /// The seed was shorter than [`MIN_SEED_HEX_LEN`].
    #[error("seed must be at least {MIN_SEED_HEX_LEN} hex characters, got {0}")]
    SeedTooShort(usize),
    /// The `rsa` crate's key generation or PEM export failed.
    #[error("RSA key generation failed: {0}")]
    KeygenInternal(String),
}

/// An RSA keypair exported as PEM strings.
pub struct Keypair {
    private_key_pem: String,
    public_key_pem: String,
}

impl Keypair {
    /// PKCS#8 PEM encoding of the private key.
    pub fn private_key_pem(&self) -> &str {
        &self.private_key_pem
    }

    /// SPKI PEM encoding of the public key.
    pub fn public_key_pem(&self) -> &str {
        &self.public_key_pem
    }
}

/// Derives a 2048-bit RSA keypair from `seed_hex`.
///
/// # Errors
/// Returns [`KeygenError::SeedTooShort`] if `seed_hex` is shorter than
/// [`MIN_SEED_HEX_LEN`] characters, or [`KeygenError::KeygenInternal`] if
/// the underlying RSA key generation or PEM export fails.
pub fn keypair_from_seed(seed_hex: &str) -> Result<Keypair, KeygenError> {
    if seed_hex.len() < MIN_SEED_HEX_LEN {
        return Err(KeygenError::SeedTooShort(seed_hex.len()));
    }

    let digest: [u8; 32] = Sha256::digest(seed_hex.as_bytes()).into();
    let mut rng = ChaCha20Rng::from_seed(digest);

    let private_key = RsaPrivateKey::new(&mut rng, RSA_BITS)
        .map_err(|e| KeygenError::KeygenInternal(e.to_string()))?;
    let public_key = RsaPublicKey::from(&private_key);

    let private_key_pem = private_key
        .to_pkcs8_pem(LineEnding::LF)
        .map_err(|e| KeygenError::KeygenInternal(e.to_string()))?
        .to_string();
    let public_key_pem = public_key
        .to_public_key_pem(LineEnding::LF)
        .map_err(|e| KeygenError::KeygenInternal(e.to_string()))?;

    Ok(Keypair {
        private_key_pem,
        public_key_pem,
    })
}
