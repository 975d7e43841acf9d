//! Composes the field/vault/OPRF/keygen crates into the enrolment and
//! verification phases of the protocol, plus the session-key transport
//! that rides on top of the recovered RSA keypair.
//!
//! Three independent randomness roles feed this orchestration and must
//! never share a stream: secret-polynomial sampling, OPRF blinding, and
//! the fuzzy vault's decoder combination sampling. Callers supply each as
//! a distinct RNG parameter rather than a single shared context.

pub mod store;

use std::io;

use brake_field::{FieldError, Group};
use brake_oprf::Evaluator;
use brake_vault::VaultError;
use num_bigint::BigUint;
use rand::{CryptoRng, RngCore};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub use store::{FileProfileStore, InMemoryProfileStore, ProfileStore};

/// Errors from enrolment, verification, or session-key transport.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error(transparent)]
    Field(#[from] FieldError),
    #[error(transparent)]
    Vault(#[from] VaultError),
    #[error(transparent)]
    Keygen(#[from] brake_keygen::KeygenError),
    #[error("client {0} already has a profile")]
    ClientExists(u64),
    #[error("no profile exists for client {0}")]
    ClientMissing(u64),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    /// Unlock exhausted its round budget, or the recovered seed's RSA key
    /// failed to decrypt the session key. The two causes are deliberately
    /// not distinguished to the caller (see the crate's error-handling
    /// design): either way the client is not who it claims to be.
    #[error("verification failed")]
    VerificationFailed,
    /// A lower-level RSA/PKCS8 operation failed (key parsing, OAEP
    /// encryption on a key of the wrong size, PEM export).
    #[error("cryptographic operation failed: {0}")]
    Crypto(String),
}

/// A client profile as stored by the server: the vault's coefficients,
/// the client's RSA public key, and the field/threshold parameters needed
/// to reconstruct and unlock the vault.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub client_id: u64,
    pub vault_coefs: Vec<BigUint>,
    #[serde(rename = "client_public_key_PEM")]
    pub client_public_key_pem: String,
    pub group_order: BigUint,
    pub verify_threshold: usize,
}

/// The subset of a [`Profile`] returned to clients: everything except the
/// public key, which the client already holds (it derives the same
/// keypair itself from a correct biometric).
#[derive(Debug, Clone, Serialize)]
pub struct PublicProfile {
    pub client_id: u64,
    pub vault_coefs: Vec<BigUint>,
    pub group_order: BigUint,
    pub verify_threshold: usize,
}

impl From<&Profile> for PublicProfile {
    fn from(p: &Profile) -> Self {
        Self {
            client_id: p.client_id,
            vault_coefs: p.vault_coefs.clone(),
            group_order: p.group_order.clone(),
            verify_threshold: p.verify_threshold,
        }
    }
}

/// Enrols a fresh client: samples a secret polynomial, locks it behind
/// `template`, runs the OPRF exchange to derive a seed, derives the
/// client's RSA keypair from that seed, and persists the resulting
/// profile.
///
/// `secret_rng` and `blinding_rng` must be cryptographically secure and
/// must not be the same stream (see the crate-level docs on RNG roles).
///
/// # Errors
/// Returns [`ProtocolError::ClientExists`] if `client_id` is already
/// enrolled, or any lower-layer error from field/keygen construction.
pub fn enrol<R1: RngCore + CryptoRng, R2: RngCore + CryptoRng>(
    store: &dyn ProfileStore,
    client_id: u64,
    template: &[BigUint],
    group_order: &BigUint,
    tau: usize,
    secret_rng: &mut R1,
    blinding_rng: &mut R2,
) -> Result<PublicProfile, ProtocolError> {
    tracing::info!(client_id, tau, "enrolling client");
    let group = Group::new(group_order.clone())?;

    let secret = brake_field::random_secret_poly(group.order(), tau, secret_rng);
    tracing::info!(client_id, "locking secret polynomial behind biometric template");
    let vault = brake_vault::lock(group.order(), template, &secret)?;

    let evaluator = Evaluator::new();
    tracing::info!(client_id, "running OPRF round trip to derive seed");
    let seed = brake_oprf::derive_seed(secret.coefficients(), group.order(), &evaluator, blinding_rng);
    tracing::info!(client_id, "deriving client RSA keypair from seed");
    let keypair = brake_keygen::keypair_from_seed(&seed)?;

    let profile = Profile {
        client_id,
        vault_coefs: vault.coefficients().to_vec(),
        client_public_key_pem: keypair.public_key_pem().to_string(),
        group_order: group.order().clone(),
        verify_threshold: tau,
    };
    let public = PublicProfile::from(&profile);
    store.create(profile)?;
    tracing::debug!(client_id, "enrolment complete");
    Ok(public)
}

/// The outcome of a successful [`verify`] call: the client's recovered
/// RSA private key, ready for session-key decryption.
pub struct VerifiedClient {
    private_key_pem: String,
}

impl VerifiedClient {
    /// The recovered private key, PEM-encoded.
    pub fn private_key_pem(&self) -> &str {
        &self.private_key_pem
    }
}

/// Attempts to verify a fresh biometric measurement against a stored
/// profile, recovering the client's RSA private key on success.
///
/// `decoder_rng` drives the fuzzy vault's randomised combination sampling
/// (need not be cryptographic, but must be reseedable for reproducible
/// tests); `blinding_rng` drives OPRF blinding and must be cryptographic.
/// Neither may share a stream with the other or with enrolment's
/// `secret_rng`.
///
/// # Errors
/// Returns [`ProtocolError::ClientMissing`] if no profile exists for
/// `client_id`, or [`ProtocolError::VerificationFailed`] if the decoder
/// exhausts its round budget without recovering a candidate. A recovered
/// candidate that simply doesn't match the enrolled secret is not
/// detected here — it surfaces downstream as a session-key mismatch (see
/// [`decrypt_session_key`]), per the error-handling design's choice not
/// to distinguish "wrong key" from "no key" to the client.
pub fn verify<R1: RngCore, R2: RngCore + CryptoRng>(
    store: &dyn ProfileStore,
    client_id: u64,
    template_prime: &[BigUint],
    rounds: usize,
    decoder_rng: &mut R1,
    blinding_rng: &mut R2,
) -> Result<VerifiedClient, ProtocolError> {
    tracing::info!(client_id, "verifying client");
    let profile = store.get(client_id)?;
    let group = Group::new(profile.group_order.clone())?;
    let vault = brake_field::Poly::new(group.order().clone(), profile.vault_coefs.clone())?;

    tracing::info!(client_id, rounds, "unlocking fuzzy vault");
    let recovered = brake_vault::unlock(
        group.order(),
        &vault,
        template_prime,
        profile.verify_threshold,
        rounds,
        decoder_rng,
        || false,
    )
    .map_err(|e| match e {
        VaultError::DecodeFailure => {
            tracing::warn!(client_id, rounds, "decoder exhausted its round budget without recovering a candidate");
            ProtocolError::VerificationFailed
        }
        other => other.into(),
    })?;

    let evaluator = Evaluator::new();
    tracing::info!(client_id, "running OPRF round trip to derive seed");
    let seed = brake_oprf::derive_seed(
        recovered.coefficients(),
        group.order(),
        &evaluator,
        blinding_rng,
    );
    tracing::info!(client_id, "deriving client RSA keypair from seed");
    let keypair = brake_keygen::keypair_from_seed(&seed)?;
    tracing::debug!(client_id, "verification recovered a candidate key");

    Ok(VerifiedClient {
        private_key_pem: keypair.private_key_pem().to_string(),
    })
}

/// Number of PBKDF2-HMAC-SHA256 iterations used to derive a session key
/// from random input keying material.
pub const SESSION_KEY_PBKDF2_ITERATIONS: u32 = 100_000;

const SESSION_KEY_LEN: usize = 32;
const SESSION_KEY_SALT_LEN: usize = 16;
const SESSION_KEY_IKM_LEN: usize = 2048 / 8;

/// A session key generated by the server, encrypted for a specific
/// client's public key.
pub struct SessionKeyEnvelope {
    ciphertext: Vec<u8>,
    sha256_hex: String,
}

impl SessionKeyEnvelope {
    /// The RSA-OAEP ciphertext.
    pub fn ciphertext(&self) -> &[u8] {
        &self.ciphertext
    }

    /// SHA-256 hex digest of the plaintext session key, used by the
    /// client to confirm it decrypted the same key the server sent.
    pub fn sha256_hex(&self) -> &str {
        &self.sha256_hex
    }
}

/// Generates a fresh 32-byte session key via PBKDF2-HMAC-SHA256 over
/// random input keying material and a random salt, then encrypts it
/// under `public_key_pem` with RSAES-OAEP.
///
/// # Errors
/// Returns [`ProtocolError::Crypto`] if `public_key_pem` does not parse
/// as an SPKI-encoded RSA public key, or if OAEP encryption fails (e.g.
/// the key is too small for a 32-byte payload under the OAEP overhead).
pub fn issue_session_key<R: RngCore + CryptoRng>(
    public_key_pem: &str,
    rng: &mut R,
) -> Result<SessionKeyEnvelope, ProtocolError> {
    let mut ikm = vec![0u8; SESSION_KEY_IKM_LEN];
    rng.fill_bytes(&mut ikm);
    let mut salt = [0u8; SESSION_KEY_SALT_LEN];
    rng.fill_bytes(&mut salt);

    let mut session_key = [0u8; SESSION_KEY_LEN];
    pbkdf2::pbkdf2::<hmac::Hmac<Sha256>>(
        &ikm,
        &salt,
        SESSION_KEY_PBKDF2_ITERATIONS,
        &mut session_key,
    )
    .expect("32-byte output is within HMAC-SHA256's valid range");

    let sha256_hex = hex::encode(Sha256::digest(session_key));

    let public_key = RsaPublicKey::from_public_key_pem(public_key_pem)
        .map_err(|e| ProtocolError::Crypto(e.to_string()))?;
    let ciphertext = public_key
        .encrypt(rng, Oaep::new::<sha1::Sha1>(), &session_key)
        .map_err(|e| ProtocolError::Crypto(e.to_string()))?;

    Ok(SessionKeyEnvelope {
        ciphertext,
        sha256_hex,
    })
}

/// Decrypts a session-key envelope with a recovered private key and
/// returns the SHA-256 hex digest of the decrypted key, for comparison
/// against [`SessionKeyEnvelope::sha256_hex`].
///
/// Any decryption failure (wrong key, corrupted ciphertext) is reported
/// uniformly as [`ProtocolError::VerificationFailed`] — the client side
/// never learns which.
pub fn decrypt_session_key(
    envelope: &SessionKeyEnvelope,
    private_key_pem: &str,
) -> Result<String, ProtocolError> {
    tracing::info!("decrypting session key with recovered private key");
    let private_key = RsaPrivateKey::from_pkcs8_pem(private_key_pem)
        .map_err(|_| ProtocolError::VerificationFailed)?;
    let plaintext = private_key
        .decrypt(Oaep::new::<sha1::Sha1>(), &envelope.ciphertext)
        .map_err(|_| ProtocolError::VerificationFailed)?;
    Ok(hex::encode(Sha256::digest(&plaintext)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::{ChaCha8Rng, ChaCha20Rng};

    fn field_template(values: &[u64]) -> Vec<BigUint> {
        values.iter().map(|&v| BigUint::from(v)).collect()
    }

    #[test]
    fn enrol_then_verify_with_exact_template_recovers_matching_session_key() {
        let store = InMemoryProfileStore::new();
        let group_order = BigUint::from(2_147_483_647u64);
        let template: Vec<BigUint> = (1..=44u64).map(BigUint::from).collect();

        let mut secret_rng = ChaCha20Rng::seed_from_u64(1);
        let mut blinding_rng = ChaCha20Rng::seed_from_u64(2);
        let public_profile = enrol(
            &store,
            1,
            &template,
            &group_order,
            8,
            &mut secret_rng,
            &mut blinding_rng,
        )
        .unwrap();
        assert_eq!(public_profile.client_id, 1);

        let server_profile = store.get(1).unwrap();
        let mut issue_rng = ChaCha20Rng::seed_from_u64(3);
        let envelope = issue_session_key(&server_profile.client_public_key_pem, &mut issue_rng).unwrap();

        let mut decoder_rng = ChaCha8Rng::seed_from_u64(4);
        let mut verify_blinding_rng = ChaCha20Rng::seed_from_u64(2);
        let verified = verify(
            &store,
            1,
            &template,
            brake_vault::DEFAULT_ROUNDS,
            &mut decoder_rng,
            &mut verify_blinding_rng,
        )
        .unwrap();

        let client_hash = decrypt_session_key(&envelope, verified.private_key_pem()).unwrap();
        assert_eq!(client_hash, envelope.sha256_hex());
    }

    #[test]
    fn verify_with_insufficient_overlap_fails_before_session_key_comparison() {
        let store = InMemoryProfileStore::new();
        let group_order = BigUint::from(2_147_483_647u64);
        let template: Vec<BigUint> = (1..=44u64).map(BigUint::from).collect();

        let mut secret_rng = ChaCha20Rng::seed_from_u64(5);
        let mut blinding_rng = ChaCha20Rng::seed_from_u64(6);
        enrol(
            &store,
            2,
            &template,
            &group_order,
            8,
            &mut secret_rng,
            &mut blinding_rng,
        )
        .unwrap();

        let mut verify_template: Vec<BigUint> = template[..4].to_vec();
        verify_template.extend((9000..9040u64).map(BigUint::from));

        let mut decoder_rng = ChaCha8Rng::seed_from_u64(7);
        let mut verify_blinding_rng = ChaCha20Rng::seed_from_u64(8);
        let result = verify(
            &store,
            2,
            &verify_template,
            brake_vault::DEFAULT_ROUNDS,
            &mut decoder_rng,
            &mut verify_blinding_rng,
        );
        assert!(matches!(result, Err(ProtocolError::VerificationFailed)));
    }

    #[test]
    fn duplicate_enrol_is_rejected() {
        let store = InMemoryProfileStore::new();
        let group_order = BigUint::from(12401u64);
        let template = field_template(&[3, 1, 4, 1, 5, 9, 2, 6]);

        let mut secret_rng = ChaCha20Rng::seed_from_u64(10);
        let mut blinding_rng = ChaCha20Rng::seed_from_u64(11);
        enrol(
            &store,
            3,
            &template,
            &group_order,
            4,
            &mut secret_rng,
            &mut blinding_rng,
        )
        .unwrap();

        let mut secret_rng2 = ChaCha20Rng::seed_from_u64(12);
        let mut blinding_rng2 = ChaCha20Rng::seed_from_u64(13);
        let result = enrol(
            &store,
            3,
            &template,
            &group_order,
            4,
            &mut secret_rng2,
            &mut blinding_rng2,
        );
        assert!(matches!(result, Err(ProtocolError::ClientExists(3))));
    }

    #[test]
    fn verify_without_enrol_reports_client_missing() {
        let store = InMemoryProfileStore::new();
        let template = field_template(&[1, 2, 3, 4]);
        let mut decoder_rng = ChaCha8Rng::seed_from_u64(14);
        let mut blinding_rng = ChaCha20Rng::seed_from_u64(15);
        let result = verify(
            &store,
            4,
            &template,
            brake_vault::DEFAULT_ROUNDS,
            &mut decoder_rng,
            &mut blinding_rng,
        );
        assert!(matches!(result, Err(ProtocolError::ClientMissing(4))));
    }

    #[test]
    fn profile_json_uses_the_exact_field_names() {
        let profile = Profile {
            client_id: 9,
            vault_coefs: vec![BigUint::from(1u32), BigUint::from(2u32)],
            client_public_key_pem: "pem".to_string(),
            group_order: BigUint::from(7u32),
            verify_threshold: 2,
        };
        let json = serde_json::to_string(&profile).unwrap();
        for key in [
            "client_id",
            "vault_coefs",
            "client_public_key_PEM",
            "group_order",
            "verify_threshold",
        ] {
            assert!(json.contains(key), "missing key {key} in {json}");
        }
    }

    #[test]
    fn public_profile_omits_the_public_key() {
        let profile = Profile {
            client_id: 9,
            vault_coefs: vec![BigUint::from(1u32)],
            client_public_key_pem: "pem".to_string(),
            group_order: BigUint::from(7u32),
            verify_threshold: 1,
        };
        let json = serde_json::to_string(&PublicProfile::from(&profile)).unwrap();
        assert!(!json.contains("client_public_key_PEM"));
    }
}
