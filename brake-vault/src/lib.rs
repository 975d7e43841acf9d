//! Fuzzy-vault lock/unlock: lock a secret polynomial behind a biometric
//! multiset, and recover it from a noisy measurement via randomised
//! list-decoding with majority voting.
//!
//! The vault itself (`lock`) is a pure polynomial operation built on top of
//! [`brake_field`]. The decoder (`unlock`) works at a lower level: Lagrange
//! interpolation candidates are accumulated as raw, zero-padded coefficient
//! vectors rather than [`brake_field::Poly`] values, because `Poly`
//! canonicalises away exactly the leading-zero information the majority
//! vote's frequency count depends on (see [`unlock`]'s docs).

use std::collections::{BTreeMap, HashSet};

use brake_field::{FieldError, Poly, fermat_inverse};
use num_bigint::BigUint;
use num_traits::{One, Zero};
use rand::RngCore;

/// Errors from locking or unlocking a fuzzy vault.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum VaultError {
    /// Underlying field/polynomial operation failed.
    #[error(transparent)]
    Field(#[from] FieldError),
    /// `tau` was zero, or larger than the verification template.
    #[error("invalid verify_threshold {tau} for template of length {template_len}")]
    InvalidThreshold { tau: usize, template_len: usize },
    /// The decoder exhausted its round budget without any interpolation
    /// succeeding (every combination hit degenerate/duplicate x-coordinates).
    #[error("decoder found no viable candidate after exhausting its round budget")]
    DecodeFailure,
    /// The caller's cancellation check fired between rounds.
    #[error("unlock was cancelled")]
    Cancelled,
}

/// Locks `secret` (a τ-coefficient polynomial, see
/// [`brake_field::random_secret_poly`]) behind the biometric multiset
/// `template`, yielding `V(x) = prod_{b in template}(x - b) + secret(x)`.
///
/// # Errors
/// Returns [`VaultError::Field`] if `secret` is not over `order`.
pub fn lock(order: &BigUint, template: &[BigUint], secret: &Poly) -> Result<Poly, VaultError> {
    if secret.order() != order {
        return Err(FieldError::FieldMismatch(order.clone(), secret.order().clone()).into());
    }
    let mut vault = Poly::one(order.clone());
    for b in template {
        let linear = Poly::new(order.clone(), vec![field_neg(order, b), BigUint::one()])?;
        vault = vault.mul(&linear)?;
    }
    Ok(vault.add(secret)?)
}

/// Default number of randomised decoder rounds, matching §4.2.2.
pub const DEFAULT_ROUNDS: usize = 5000;

/// Attempts to recover the τ-coefficient secret polynomial locked in `vault`
/// from a fresh, possibly-noisy biometric measurement `template_prime`.
///
/// Runs up to `rounds` randomised decoding attempts, each picking a
/// size-`tau` combination of positions in `template_prime`, interpolating
/// through the corresponding points of `vault`, and recording the result in
/// a frequency histogram over *raw* zero-padded coefficient vectors (not
/// canonicalised `Poly`s — a legitimate candidate may have a zero leading
/// coefficient, and canonicalising before counting would silently merge it
/// with unrelated shorter candidates). The most frequent vector wins;
/// ties are broken by taking the lexicographically smallest vector.
///
/// `cancel`, if supplied, is polled between rounds; if it returns `true`,
/// unlock stops immediately and returns [`VaultError::Cancelled`] with no
/// partial result.
///
/// # Errors
/// - [`VaultError::InvalidThreshold`] if `tau` is zero or exceeds
///   `template_prime.len()`.
/// - [`VaultError::Cancelled`] if `cancel` fired.
/// - [`VaultError::DecodeFailure`] if every sampled combination was
///   degenerate (duplicate x-coordinates) and no candidate was ever
///   recorded.
pub fn unlock<R: RngCore>(
    order: &BigUint,
    vault: &Poly,
    template_prime: &[BigUint],
    tau: usize,
    rounds: usize,
    rng: &mut R,
    mut cancel: impl FnMut() -> bool,
) -> Result<Poly, VaultError> {
    let n = template_prime.len();
    if tau == 0 || tau > n {
        return Err(VaultError::InvalidThreshold {
            tau,
            template_len: n,
        });
    }

    let mut histogram: BTreeMap<Vec<BigUint>, usize> = BTreeMap::new();

    for combo in sample_combinations(n, tau, rounds, rng) {
        if cancel() {
            return Err(VaultError::Cancelled);
        }
        let xs: Vec<BigUint> = combo.iter().map(|&i| template_prime[i].clone()).collect();
        if has_duplicate(&xs) {
            // FieldDegenerate: interpolation undefined, round silently skipped.
            continue;
        }
        let ys: Vec<BigUint> = xs.iter().map(|x| vault.eval(x)).collect();
        if let Some(coef) = lagrange_coefficients(order, &xs, &ys) {
            *histogram.entry(coef).or_insert(0) += 1;
        }
    }

    let winner = histogram
        .into_iter()
        .fold(None, |best: Option<(Vec<BigUint>, usize)>, (coef, count)| {
            match &best {
                Some((_, best_count)) if *best_count >= count => best,
                _ => Some((coef, count)),
            }
        })
        .map(|(coef, _)| coef)
        .ok_or(VaultError::DecodeFailure)?;

    Ok(Poly::new(order.clone(), winner)?)
}

fn has_duplicate(xs: &[BigUint]) -> bool {
    for i in 0..xs.len() {
        for j in i + 1..xs.len() {
            if xs[i] == xs[j] {
                return true;
            }
        }
    }
    false
}

/// Generates up to `rounds` distinct sorted size-`tau` index combinations
/// drawn from `0..n`. Enumerates exhaustively when the combinatorial
/// universe is no larger than `rounds`; otherwise rejection-samples
/// uniformly without replacement from tuple-space.
fn sample_combinations<R: RngCore>(
    n: usize,
    tau: usize,
    rounds: usize,
    rng: &mut R,
) -> Vec<Vec<usize>> {
    use itertools::Itertools;

    match binomial(n, tau) {
        Some(total) if total <= rounds as u128 => (0..n).combinations(tau).collect(),
        _ => {
            let mut seen = HashSet::new();
            let mut out = Vec::with_capacity(rounds);
            while out.len() < rounds {
                let mut combo = rand::seq::index::sample(rng, n, tau).into_vec();
                combo.sort_unstable();
                if seen.insert(combo.clone()) {
                    out.push(combo);
                }
            }
            out
        }
    }
}

/// `C(n, k)`, saturating to `None` ("too large to matter") rather than
/// overflowing; `n` is a template length (tens, not millions) in practice.
fn binomial(n: usize, k: usize) -> Option<u128> {
    if k > n {
        return Some(0);
    }
    let k = k.min(n - k);
    let mut result: u128 = 1;
    for i in 0..k {
        result = result.checked_mul((n - i) as u128)?;
        result /= (i + 1) as u128;
    }
    Some(result)
}

fn field_neg(order: &BigUint, x: &BigUint) -> BigUint {
    if x.is_zero() {
        BigUint::zero()
    } else {
        order - (x % order)
    }
}

fn field_sub(order: &BigUint, a: &BigUint, b: &BigUint) -> BigUint {
    (a + order - (b % order)) % order
}

/// Lagrange-interpolates the unique degree-`< xs.len()` polynomial through
/// `(xs[i], ys[i])`, returning its coefficients zero-padded to exactly
/// `xs.len()` entries (not canonicalised — a legitimately zero leading
/// coefficient is kept).
///
/// Returns `None` if any two `xs` coincide (interpolation undefined).
fn lagrange_coefficients(order: &BigUint, xs: &[BigUint], ys: &[BigUint]) -> Option<Vec<BigUint>> {
    let k = xs.len();
    if has_duplicate(xs) {
        return None;
    }
    let mut result = vec![BigUint::zero(); k];
    for j in 0..k {
        let mut numerator = vec![BigUint::one()];
        let mut denom = BigUint::one();
        for (m, xm) in xs.iter().enumerate() {
            if m == j {
                continue;
            }
            numerator = multiply_by_monomial(order, &numerator, xm);
            let diff = field_sub(order, &xs[j], xm);
            denom = (&denom * diff) % order;
        }
        let denom_inv = fermat_inverse(&denom, order)?;
        let scale = (&ys[j] * denom_inv) % order;
        for (i, c) in numerator.iter().enumerate() {
            result[i] = (&result[i] + c * &scale) % order;
        }
    }
    Some(result)
}

/// Multiplies the polynomial `coef` (low-order first) by `(x - root)`.
fn multiply_by_monomial(order: &BigUint, coef: &[BigUint], root: &BigUint) -> Vec<BigUint> {
    let mut out = vec![BigUint::zero(); coef.len() + 1];
    for (i, c) in coef.iter().enumerate() {
        out[i + 1] = (&out[i + 1] + c) % order;
        let term = (c * root) % order;
        out[i] = field_sub(order, &out[i], &term);
    }
    out
}
