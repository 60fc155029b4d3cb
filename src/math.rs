//! Arithmetic over GF(2^8) as used by UOV
//!
//! Elements are bytes interpreted as polynomials over GF(2) modulo
//! x^8 + x^4 + x^3 + x + 1. Vectors, matrices and polynomials over the field
//! live in the submodules.

use crate::error::{RecoveryError, Result};
use rand::distributions::{Distribution, Standard};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::{Product, Sum};
use std::ops::{Add, AddAssign, Mul, MulAssign, Neg, Sub, SubAssign};

pub mod linear;
pub mod matrix;
pub mod poly;

pub use linear::{LinearExpression, QuadraticPolynomial};
pub use matrix::{Echelon, Matrix};
pub use poly::Poly;

/// Low byte of the field modulus x^8 + x^4 + x^3 + x + 1 (0x11B).
const REDUCTION: u8 = 0x1B;

/// An ordered sequence of field elements.
pub type Vector = Vec<Gf256>;

#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Gf256(u8);

impl Gf256 {
    pub const ZERO: Gf256 = Gf256(0);
    pub const ONE: Gf256 = Gf256(1);
    /// Order of the multiplicative group.
    pub const GROUP_ORDER: u32 = 255;

    pub const fn new(value: u8) -> Self {
        Gf256(value)
    }

    pub const fn value(self) -> u8 {
        self.0
    }

    pub fn zero() -> Self {
        Self::ZERO
    }

    pub fn one() -> Self {
        Self::ONE
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Iterates over all 256 field elements, zero first.
    pub fn elements() -> impl Iterator<Item = Gf256> {
        (0..=u8::MAX).map(Gf256)
    }

    pub fn pow(self, mut exp: u32) -> Self {
        let mut base = self;
        let mut acc = Self::ONE;
        while exp > 0 {
            if exp & 1 == 1 {
                acc *= base;
            }
            base *= base;
            exp >>= 1;
        }
        acc
    }

    /// Multiplicative inverse, computed as a^(2^8 - 2).
    pub fn inverse(self) -> Result<Self> {
        if self.is_zero() {
            return Err(RecoveryError::DivisionByZero);
        }
        Ok(self.pow(254))
    }

    pub fn checked_div(self, rhs: Self) -> Result<Self> {
        Ok(self * rhs.inverse()?)
    }

    /// Square root. Squaring is a field automorphism in characteristic 2,
    /// its inverse is a -> a^(2^7).
    pub fn sqrt(self) -> Self {
        self.pow(128)
    }

    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Gf256(rng.gen())
    }
}

impl fmt::Debug for Gf256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#04x}", self.0)
    }
}

impl fmt::Display for Gf256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02x}", self.0)
    }
}

impl From<u8> for Gf256 {
    fn from(value: u8) -> Self {
        Gf256(value)
    }
}

impl From<Gf256> for u8 {
    fn from(value: Gf256) -> Self {
        value.0
    }
}

impl Distribution<Gf256> for Standard {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Gf256 {
        Gf256(rng.gen())
    }
}

#[allow(clippy::suspicious_arithmetic_impl)]
impl Add for Gf256 {
    type Output = Gf256;

    fn add(self, rhs: Gf256) -> Gf256 {
        Gf256(self.0 ^ rhs.0)
    }
}

#[allow(clippy::suspicious_arithmetic_impl)]
impl Sub for Gf256 {
    type Output = Gf256;

    fn sub(self, rhs: Gf256) -> Gf256 {
        Gf256(self.0 ^ rhs.0)
    }
}

impl Neg for Gf256 {
    type Output = Gf256;

    fn neg(self) -> Gf256 {
        self
    }
}

impl Mul for Gf256 {
    type Output = Gf256;

    fn mul(self, rhs: Gf256) -> Gf256 {
        let mut a = self.0;
        let mut b = rhs.0;
        let mut product = 0u8;
        while b != 0 {
            if b & 1 != 0 {
                product ^= a;
            }
            let carry = a & 0x80 != 0;
            a <<= 1;
            if carry {
                a ^= REDUCTION;
            }
            b >>= 1;
        }
        Gf256(product)
    }
}

impl AddAssign for Gf256 {
    fn add_assign(&mut self, rhs: Gf256) {
        *self = *self + rhs;
    }
}

impl SubAssign for Gf256 {
    fn sub_assign(&mut self, rhs: Gf256) {
        *self = *self - rhs;
    }
}

impl MulAssign for Gf256 {
    fn mul_assign(&mut self, rhs: Gf256) {
        *self = *self * rhs;
    }
}

impl Sum for Gf256 {
    fn sum<I: Iterator<Item = Gf256>>(iter: I) -> Self {
        iter.fold(Gf256::ZERO, |acc, x| acc + x)
    }
}

impl Product for Gf256 {
    fn product<I: Iterator<Item = Gf256>>(iter: I) -> Self {
        iter.fold(Gf256::ONE, |acc, x| acc * x)
    }
}

/// Inner product of two equally long slices.
pub fn dot(a: &[Gf256], b: &[Gf256]) -> Gf256 {
    a.iter().zip(b).map(|(&x, &y)| x * y).sum()
}

pub fn add_vectors(a: &[Gf256], b: &[Gf256]) -> Result<Vector> {
    if a.len() != b.len() {
        return Err(RecoveryError::DimensionMismatch {
            context: "vector addition",
            expected: a.len(),
            got: b.len(),
        });
    }
    Ok(a.iter().zip(b).map(|(&x, &y)| x + y).collect())
}

pub fn scale_vector(v: &[Gf256], c: Gf256) -> Vector {
    v.iter().map(|&x| x * c).collect()
}

pub fn is_zero_vector(v: &[Gf256]) -> bool {
    v.iter().all(|x| x.is_zero())
}

pub fn parse_field_elements_hex(s: &str) -> Result<Vector> {
    let cleaned: String = s.split_whitespace().collect();
    let cleaned = cleaned
        .strip_prefix("0x")
        .or_else(|| cleaned.strip_prefix("0X"))
        .unwrap_or(&cleaned);
    let bytes = hex::decode(cleaned)
        .map_err(|e| RecoveryError::InvalidEncoding(format!("bad hex string: {e}")))?;
    Ok(bytes.into_iter().map(Gf256).collect())
}

pub fn field_elements_to_hex(v: &[Gf256]) -> String {
    let bytes: Vec<u8> = v.iter().map(|x| x.0).collect();
    hex::encode(bytes)
}
