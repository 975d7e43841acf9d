//! Prime-field and polynomial arithmetic over `Z_q[x]`.
//!
//! [`Group`] is an immutable descriptor of a prime modulus `q`; [`Poly`] is a
//! value type representing a polynomial over that field, always kept in
//! canonical form (coefficients reduced mod `q`, trailing zero coefficients
//! stripped, the zero polynomial represented as `[0]`).
//!
//! Every arithmetic operation restores this canonical form before returning,
//! so two `Poly`s that denote the same polynomial are always `==` to each
//! other regardless of how they were constructed.

use num_bigint::BigUint;
use num_integer::Integer;
use num_traits::{One, Zero};
use rand::{CryptoRng, RngCore};

mod primality;

pub use primality::is_probably_prime;

/// Errors produced by field and polynomial construction/arithmetic.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum FieldError {
    /// The supplied group order is not prime.
    #[error("group order {0} is not prime")]
    InvalidField(BigUint),
    /// Two polynomials with different group orders were combined.
    #[error("field mismatch: {0} != {1}")]
    FieldMismatch(BigUint, BigUint),
    /// A polynomial was constructed with no coefficients at all.
    #[error("polynomial must have at least one coefficient")]
    EmptyCoefficients,
}

/// A prime finite field `Z_q`, identified by its order `q`.
///
/// `Group` is a pure value: constructing one checks primality once and
/// every [`Poly`] carries a copy of the order it was built over rather than
/// a reference back to a `Group`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    order: BigUint,
}

impl Group {
    /// Builds a new prime field of the given order.
    ///
    /// # Errors
    /// Returns [`FieldError::InvalidField`] if `order` is not prime.
    pub fn new(order: BigUint) -> Result<Self, FieldError> {
        if !is_probably_prime(&order) {
            return Err(FieldError::InvalidField(order));
        }
        Ok(Self { order })
    }

    /// The prime order `q` of this field.
    pub fn order(&self) -> &BigUint {
        &self.order
    }

    /// The zero polynomial in this field.
    pub fn zero_poly(&self) -> Poly {
        Poly::zero(self.order.clone())
    }

    /// The constant-one polynomial in this field.
    pub fn one_poly(&self) -> Poly {
        Poly::one(self.order.clone())
    }
}

/// A polynomial over `Z_q`, stored low-order coefficient first.
///
/// Invariants (restored after every operation):
/// - every coefficient lies in `[0, q)`;
/// - trailing zero coefficients are stripped;
/// - the zero polynomial is represented as the single coefficient `[0]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Poly {
    order: BigUint,
    coef: Vec<BigUint>,
}

impl Poly {
    /// Builds a polynomial from an order and a low-to-high coefficient list,
    /// canonicalising it immediately (coefficients reduced mod `q`, trailing
    /// zeros stripped).
    ///
    /// # Errors
    /// Returns [`FieldError::EmptyCoefficients`] if `coef` is empty.
    pub fn new(order: BigUint, coef: Vec<BigUint>) -> Result<Self, FieldError> {
        if coef.is_empty() {
            return Err(FieldError::EmptyCoefficients);
        }
        let mut p = Self { order, coef };
        p.canonicalize();
        Ok(p)
    }

    fn canonicalize(&mut self) {
        for c in &mut self.coef {
            *c %= &self.order;
        }
        while self.coef.len() > 1 && self.coef.last().is_some_and(BigUint::is_zero) {
            self.coef.pop();
        }
    }

    /// The field order this polynomial lives over.
    pub fn order(&self) -> &BigUint {
        &self.order
    }

    /// Coefficients, low-order first, in canonical form.
    pub fn coefficients(&self) -> &[BigUint] {
        &self.coef
    }

    /// Returns the zero polynomial over `order`.
    pub fn zero(order: BigUint) -> Self {
        Self {
            coef: vec![BigUint::zero()],
            order,
        }
    }

    /// Returns the constant polynomial `1` over `order`.
    pub fn one(order: BigUint) -> Self {
        Self {
            coef: vec![BigUint::one()],
            order,
        }
    }

    /// The degree of the polynomial: the largest `i` with `a_i != 0`, or `0`
    /// for the zero polynomial.
    pub fn degree(&self) -> usize {
        self.coef.len() - 1
    }

    fn check_same_field(&self, other: &Poly) -> Result<(), FieldError> {
        if self.order != other.order {
            return Err(FieldError::FieldMismatch(
                self.order.clone(),
                other.order.clone(),
            ));
        }
        Ok(())
    }

    /// Adds two polynomials over the same field.
    ///
    /// # Errors
    /// Returns [`FieldError::FieldMismatch`] if the orders differ.
    pub fn add(&self, other: &Poly) -> Result<Poly, FieldError> {
        self.check_same_field(other)?;
        let len = self.coef.len().max(other.coef.len());
        let coef = (0..len)
            .map(|i| {
                let a = self.coef.get(i).cloned().unwrap_or_else(BigUint::zero);
                let b = other.coef.get(i).cloned().unwrap_or_else(BigUint::zero);
                a + b
            })
            .collect();
        Poly::new(self.order.clone(), coef)
    }

    /// Subtracts `other` from `self` over the same field.
    ///
    /// # Errors
    /// Returns [`FieldError::FieldMismatch`] if the orders differ.
    pub fn sub(&self, other: &Poly) -> Result<Poly, FieldError> {
        self.check_same_field(other)?;
        let len = self.coef.len().max(other.coef.len());
        let coef = (0..len)
            .map(|i| {
                let a = self.coef.get(i).cloned().unwrap_or_else(BigUint::zero);
                let b = other.coef.get(i).cloned().unwrap_or_else(BigUint::zero);
                // BigUint has no native negative values; lift `a` by the
                // modulus before subtracting so the result stays non-negative.
                (a + &self.order - b) % &self.order
            })
            .collect();
        Poly::new(self.order.clone(), coef)
    }

    /// Multiplies two polynomials over the same field (schoolbook product).
    ///
    /// # Errors
    /// Returns [`FieldError::FieldMismatch`] if the orders differ.
    pub fn mul(&self, other: &Poly) -> Result<Poly, FieldError> {
        self.check_same_field(other)?;
        let mut coef = vec![BigUint::zero(); self.coef.len() + other.coef.len() - 1];
        for (i, a) in self.coef.iter().enumerate() {
            if a.is_zero() {
                continue;
            }
            for (j, b) in other.coef.iter().enumerate() {
                coef[i + j] = (&coef[i + j] + a * b) % &self.order;
            }
        }
        Poly::new(self.order.clone(), coef)
    }

    /// The additive inverse of this polynomial.
    pub fn neg(&self) -> Poly {
        let coef = self
            .coef
            .iter()
            .map(|c| {
                if c.is_zero() {
                    BigUint::zero()
                } else {
                    &self.order - c
                }
            })
            .collect();
        // Never fails: same non-empty length as `self.coef`.
        Poly::new(self.order.clone(), coef).expect("non-empty coefficients")
    }

    /// Evaluates the polynomial at `x` using per-term modular exponentiation.
    pub fn eval(&self, x: &BigUint) -> BigUint {
        let mut acc = BigUint::zero();
        for (i, c) in self.coef.iter().enumerate() {
            let term = c * x.modpow(&BigUint::from(i), &self.order);
            acc = (acc + term) % &self.order;
        }
        acc
    }

    /// Structural equality: same field order and the same canonical
    /// coefficient vector.
    pub fn equal(&self, other: &Poly) -> bool {
        self == other
    }
}

/// Samples a random secret polynomial with exactly `tau` coefficients over
/// `order` (coefficients `a_0..a_{tau-1}`, with `a_{tau-1}` forced non-zero
/// so the polynomial's mathematical degree is exactly `tau - 1`).
///
/// This is the vault's closeness parameter τ from §3/§4.2: a τ-coefficient
/// secret is recoverable from exactly τ points of the vault polynomial via
/// Lagrange interpolation (see `brake-vault::unlock`). All coefficients but
/// the last are drawn uniformly from `[0, order-1]`; the last is drawn from
/// `[1, order-1]`. The caller must supply a cryptographically secure RNG —
/// this is one of the three RNG roles in the protocol that must never share
/// a stream with the other two (decoder sampling, OPRF blinding).
///
/// # Panics
/// Panics if `tau == 0`.
pub fn random_secret_poly<R: RngCore + CryptoRng>(order: &BigUint, tau: usize, rng: &mut R) -> Poly {
    assert!(tau > 0, "secret polynomial must have at least one coefficient");
    let mut coef: Vec<BigUint> = (0..tau - 1).map(|_| uniform_below(order, rng)).collect();
    coef.push(uniform_nonzero_below(order, rng));
    Poly::new(order.clone(), coef).expect("non-empty coefficients")
}

/// Draws a uniform random element of `[0, bound)`.
pub fn uniform_below<R: RngCore + CryptoRng>(bound: &BigUint, rng: &mut R) -> BigUint {
    let bits = bound.bits();
    let bytes = bits.div_ceil(8) as usize;
    loop {
        let mut buf = vec![0u8; bytes];
        rng.fill_bytes(&mut buf);
        // Mask off the excess high bits of the top byte so rejection rates
        // stay close to 50% regardless of `bound`'s bit length.
        let excess_bits = (bytes * 8) as u64 - bits;
        if excess_bits > 0 && !buf.is_empty() {
            buf[0] &= 0xff >> excess_bits;
        }
        let candidate = BigUint::from_bytes_be(&buf);
        if &candidate < bound {
            return candidate;
        }
    }
}

/// Draws a uniform random element of `[1, bound)`. Panics if `bound <= 1`.
pub fn uniform_nonzero_below<R: RngCore + CryptoRng>(bound: &BigUint, rng: &mut R) -> BigUint {
    assert!(*bound > BigUint::one(), "bound must allow a non-zero value");
    loop {
        let candidate = uniform_below(bound, rng);
        if !candidate.is_zero() {
            return candidate;
        }
    }
}

/// Computes `a^-1 mod m` via Fermat's little theorem (`a^(m-2) mod m`),
/// valid whenever `m` is prime and `a` is not a multiple of `m`.
pub fn fermat_inverse(a: &BigUint, m: &BigUint) -> Option<BigUint> {
    if a.is_zero() || (a % m).is_zero() {
        return None;
    }
    let exponent = m - BigUint::from(2u32);
    Some(a.modpow(&exponent, m))
}

/// Extended-Euclid modular inverse, for moduli that are not prime (used for
/// the OPRF blinding modulus, which the spec fixes as a prime but which this
/// helper does not assume).
pub fn mod_inverse(a: &BigUint, m: &BigUint) -> Option<BigUint> {
    let (g, x) = extended_gcd(a.clone().into(), m.clone().into());
    if g != num_bigint::BigInt::one() {
        return None;
    }
    let m_big: num_bigint::BigInt = m.clone().into();
    let result = ((x % &m_big) + &m_big) % &m_big;
    result.try_into().ok()
}

/// Returns `(g, x, y)` with `a*x + b*y = g = gcd(a, b)`.
fn extended_gcd_full(
    a: num_bigint::BigInt,
    b: num_bigint::BigInt,
) -> (num_bigint::BigInt, num_bigint::BigInt, num_bigint::BigInt) {
    if b.is_zero() {
        (a, num_bigint::BigInt::one(), num_bigint::BigInt::zero())
    } else {
        let (q, r) = a.div_rem(&b);
        let (g, x1, y1) = extended_gcd_full(b, r);
        let x = y1.clone();
        let y = x1 - &q * &y1;
        (g, x, y)
    }
}

fn extended_gcd(
    a: num_bigint::BigInt,
    b: num_bigint::BigInt,
) -> (num_bigint::BigInt, num_bigint::BigInt) {
    let (g, x, _y) = extended_gcd_full(a, b);
    (g, x)
}
