//! The client/evaluator OPRF exchange: blind a hash of the secret
//! polynomial, have the evaluator apply its key, unblind to obtain a
//! deterministic per-user seed.
//!
//! This is an *additive* construction, not a true oblivious PRF: the
//! blind, evaluate and unblind steps use `+` over `Z_m` rather than
//! exponentiation in a cyclic group, so an evaluator that observes the
//! blinded value and later the unblinded seed can recover the hash it was
//! meant to stay oblivious to. The unblind step compounds this by
//! subtracting using the *biometric field's* order rather than the
//! blinding modulus — `blind` and `unblind` were sampled and reduced over
//! different moduli, so they do not invert each other. Both properties are
//! carried over unchanged from the reference behaviour this crate
//! reimplements; see [`unblind`]'s docs for the exact arithmetic kept.

use std::sync::LazyLock;

use num_bigint::{BigInt, BigUint, Sign};
use num_traits::One;
use rand::{CryptoRng, RngCore};
use sha2::{Digest, Sha256};
use zeroize::ZeroizeOnDrop;

/// Errors from the OPRF exchange.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum OprfError {
    /// A hex string was empty, of odd semantics, or contained non-hex
    /// characters.
    #[error("invalid hex input: {0:?}")]
    InvalidInput(String),
}

const MODULUS_HEX: &str =
    "fffffffffffffffffffffffffffffffffffffffffffffffffffffffffffff43";

/// The fixed 256-bit blinding modulus `m`.
pub fn modulus() -> &'static BigUint {
    static MODULUS: LazyLock<BigUint> =
        LazyLock::new(|| BigUint::parse_bytes(MODULUS_HEX.as_bytes(), 16).expect("valid literal"));
    &MODULUS
}

fn evaluator_key() -> &'static BigUint {
    static KEY: LazyLock<BigUint> = LazyLock::new(|| {
        let digest = Sha256::digest(b"evaluator_secret_key");
        BigUint::from_bytes_be(&digest) % modulus()
    });
    &KEY
}

/// Joins `coef` (low-order first) as a comma-separated decimal string, then
/// hashes with SHA-256 and reinterprets the digest as a big-endian integer.
///
/// Leading/trailing zero coefficients that `lock`/`unlock` may have
/// introduced or exposed are serialised as-is; no canonicalisation happens
/// here beyond what the `Poly` that produced `coef` already enforced.
pub fn hash_coefficients(coef: &[BigUint]) -> BigUint {
    let serialised = coef
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",");
    let digest = Sha256::digest(serialised.as_bytes());
    BigUint::from_bytes_be(&digest)
}

/// A per-invocation blinding scalar `r` and its modular inverse `r^-1 mod m`.
///
/// `r^-1` satisfies the invariant `r * r^-1 = 1 (mod m)` asserted at
/// construction, but is not the quantity [`unblind`] actually uses to
/// recover the seed — see that function's docs.
///
/// `BigUint`'s digit buffer is zeroized in place on drop (via `num-bigint`'s
/// `zeroize` feature), so dropping a `BlindingFactor` wipes the actual
/// heap allocation rather than just rebinding the fields to a fresh zero.
#[derive(ZeroizeOnDrop)]
pub struct BlindingFactor {
    r: BigUint,
    r_inv: BigUint,
}

impl BlindingFactor {
    /// Samples `r` uniformly from `[2, m-1]` and computes its inverse mod
    /// `m` (valid because `m` is prime, so every nonzero residue is
    /// invertible).
    pub fn sample<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let m = modulus();
        let two = BigUint::from(2u32);
        let r = loop {
            let candidate = brake_field::uniform_below(m, rng);
            if candidate >= two {
                break candidate;
            }
        };
        let r_inv = brake_field::fermat_inverse(&r, m).expect("r is coprime to the prime modulus");
        debug_assert_eq!((&r * &r_inv) % m, BigUint::one());
        Self { r, r_inv }
    }

    /// The blinding scalar `r`.
    pub fn r(&self) -> &BigUint {
        &self.r
    }

    /// `r^-1 mod m`.
    pub fn r_inv(&self) -> &BigUint {
        &self.r_inv
    }
}

/// Blinds `h` with `r`: `B = (h + r) mod m`.
pub fn blind(h: &BigUint, blinding: &BlindingFactor) -> BigUint {
    (h + &blinding.r) % modulus()
}

/// Unblinds an evaluator response `e` to recover the seed value.
///
/// Computes `r~ = field_order - 1 - r`, then `S = (e + r~) mod m`. Note
/// that `r~` is reduced modulo the *biometric field's* order, not modulo
/// `m` — `r` was sampled from `[2, m-1]`, a range almost always larger
/// than `field_order`, so `field_order - 1 - r` is typically negative
/// before the final reduction mod `m`. This means `unblind` does not
/// invert `blind`: `S` depends on `r` rather than cancelling it, and an
/// evaluator holding `k` cannot be cut out of recovering `h` from the
/// two values it sees. Kept intentionally; see the crate-level docs.
pub fn unblind(e: &BigUint, blinding: &BlindingFactor, field_order: &BigUint) -> BigUint {
    let m = BigInt::from(modulus().clone());
    let field_order = BigInt::from(field_order.clone());
    let r = BigInt::from(blinding.r.clone());
    let r_tilde = field_order - BigInt::one() - r;
    let s = (BigInt::from(e.clone()) + r_tilde) % &m;
    let s = if s.sign() == Sign::Minus { s + &m } else { s };
    s.to_biguint().expect("non-negative after reduction")
}

/// The evaluator side of the exchange: holds a fixed secret key and applies
/// it to whatever blinded value it is shown. Stateless beyond that key, and
/// injectable (rather than a process singleton) so tests can substitute a
/// different key.
pub struct Evaluator {
    key: BigUint,
}

impl Evaluator {
    /// The evaluator with the protocol's fixed key
    /// `SHA-256("evaluator_secret_key") mod m`.
    pub fn new() -> Self {
        Self {
            key: evaluator_key().clone(),
        }
    }

    /// An evaluator with an explicit key, for tests.
    pub fn with_key(key: BigUint) -> Self {
        Self { key: key % modulus() }
    }

    /// `E = (B + k) mod m`.
    pub fn evaluate_value(&self, b: &BigUint) -> BigUint {
        (b + &self.key) % modulus()
    }

    /// Evaluates a hex-encoded blinded request, returning a hex-encoded
    /// response.
    ///
    /// # Errors
    /// Returns [`OprfError::InvalidInput`] if `hex_in` is empty or contains
    /// non-hex-digit characters.
    pub fn evaluate(&self, hex_in: &str) -> Result<String, OprfError> {
        let b = parse_hex(hex_in)?;
        Ok(to_hex(&self.evaluate_value(&b)))
    }
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs the full client-side exchange for a recovered secret polynomial's
/// coefficients: hash, blind, hand to the evaluator, unblind. Returns the
/// seed as a lowercase hex string with no `0x` prefix and no zero-padding.
pub fn derive_seed<R: RngCore + CryptoRng>(
    coef: &[BigUint],
    field_order: &BigUint,
    evaluator: &Evaluator,
    rng: &mut R,
) -> String {
    let h = hash_coefficients(coef);
    let blinding = BlindingFactor::sample(rng);
    let b = blind(&h, &blinding);
    let e = evaluator.evaluate_value(&b);
    let s = unblind(&e, &blinding, field_order);
    to_hex(&s)
}

fn to_hex(n: &BigUint) -> String {
    format!("{n:x}")
}

fn parse_hex(s: &str) -> Result<BigUint, OprfError> {
    if s.is_empty() || !s.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(OprfError::InvalidInput(s.to_string()));
    }
    BigUint::parse_bytes(s.as_bytes(), 16).ok_or_else(|| OprfError::InvalidInput(s.to_string()))
}
