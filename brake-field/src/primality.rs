//! A self-contained Miller–Rabin primality test for arbitrary-size `BigUint`s.
//!
//! Used only to validate a proposed group order (§4.1's `InvalidField`
//! check); this is deliberately independent of the RSA keypair machinery in
//! `brake-keygen`, which draws its own primes through the `rsa` crate rather
//! than through this module.

use num_bigint::BigUint;
use num_integer::Integer;
use num_traits::{One, Zero};

use crate::uniform_below;

const SMALL_PRIMES: &[u32] = &[
    2, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37, 41, 43, 47, 53, 59, 61, 67, 71, 73, 79, 83, 89, 97,
];

const MILLER_RABIN_ROUNDS: u32 = 40;

/// Returns `true` if `n` is (almost certainly) prime.
///
/// Uses trial division by small primes followed by `MILLER_RABIN_ROUNDS`
/// rounds of Miller-Rabin with random bases, giving a false-positive
/// probability below `4^-40`.
pub fn is_probably_prime(n: &BigUint) -> bool {
    if *n < BigUint::from(2u32) {
        return false;
    }
    for &p in SMALL_PRIMES {
        let p = BigUint::from(p);
        if *n == p {
            return true;
        }
        if (n % &p).is_zero() {
            return false;
        }
    }
    miller_rabin(n, MILLER_RABIN_ROUNDS)
}

fn miller_rabin(n: &BigUint, rounds: u32) -> bool {
    let one = BigUint::one();
    let two = BigUint::from(2u32);
    let n_minus_one = n - &one;

    // Write n - 1 = 2^s * d with d odd.
    let mut d = n_minus_one.clone();
    let mut s = 0u32;
    while (&d % &two).is_zero() {
        d /= &two;
        s += 1;
    }

    let mut rng = rand::thread_rng();
    'witness: for _ in 0..rounds {
        let a = loop {
            let candidate = uniform_below(&n_minus_one, &mut rng);
            if candidate >= two {
                break candidate;
            }
        };
        let mut x = a.modpow(&d, n);
        if x == one || x == n_minus_one {
            continue;
        }
        for _ in 0..s.saturating_sub(1) {
            x = (&x * &x) % n;
            if x == n_minus_one {
                continue 'witness;
            }
        }
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_primes_are_prime() {
        for &p in &[2u32, 3, 5, 7, 12401] {
            assert!(is_probably_prime(&BigUint::from(p)), "{p} should be prime");
        }
    }

    #[test]
    fn small_composites_are_not_prime() {
        for &c in &[0u32, 1, 4, 6, 8, 9, 12402, 100] {
            assert!(!is_probably_prime(&BigUint::from(c)), "{c} should not be prime");
        }
    }

    #[test]
    fn mersenne_prime_2_31_minus_1() {
        assert!(is_probably_prime(&BigUint::from(2_147_483_647u64)));
    }

    #[test]
    fn large_256_bit_prime_literal() {
        let p = BigUint::parse_bytes(
            b"fffffffffffffffffffffffffffffffffffffffffffffffffffffffffffff43",
            16,
        )
        .unwrap();
        assert!(is_probably_prime(&p));
    }
}
