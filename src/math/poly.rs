//! Univariate polynomials over GF(256) and their factorization.
//!
//! Factoring follows the usual three stages: square-free decomposition
//! (with p-th roots, since the characteristic is 2), distinct-degree
//! factorization, and Cantor-Zassenhaus equal-degree splitting using the
//! absolute trace instead of the (q-1)/2 power.

use super::matrix::Matrix;
use super::Gf256;
use crate::error::{RecoveryError, Result};
use rand::Rng;
use std::fmt;

/// Extension degree of GF(256) over GF(2).
const FIELD_BITS: usize = 8;

/// Random splitting attempts before giving up on one equal-degree factor.
/// Each attempt splits with probability at least 1/2.
const MAX_SPLIT_ATTEMPTS: usize = 64;

/// Coefficients are stored lowest degree first, without trailing zeros.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Poly {
    coeffs: Vec<Gf256>,
}

impl Poly {
    pub fn from_coeffs(mut coeffs: Vec<Gf256>) -> Self {
        while coeffs.last().is_some_and(|c| c.is_zero()) {
            coeffs.pop();
        }
        Self { coeffs }
    }

    pub fn zero() -> Self {
        Self { coeffs: Vec::new() }
    }

    pub fn one() -> Self {
        Self::constant(Gf256::ONE)
    }

    pub fn constant(c: Gf256) -> Self {
        Self::from_coeffs(vec![c])
    }

    /// The indeterminate t.
    pub fn x() -> Self {
        Self::from_coeffs(vec![Gf256::ZERO, Gf256::ONE])
    }

    pub fn monomial(c: Gf256, degree: usize) -> Self {
        let mut coeffs = vec![Gf256::ZERO; degree + 1];
        coeffs[degree] = c;
        Self::from_coeffs(coeffs)
    }

    pub fn coeffs(&self) -> &[Gf256] {
        &self.coeffs
    }

    pub fn coeff(&self, i: usize) -> Gf256 {
        self.coeffs.get(i).copied().unwrap_or(Gf256::ZERO)
    }

    /// `None` for the zero polynomial.
    pub fn degree(&self) -> Option<usize> {
        self.coeffs.len().checked_sub(1)
    }

    pub fn is_zero(&self) -> bool {
        self.coeffs.is_empty()
    }

    pub fn is_one(&self) -> bool {
        self.coeffs.len() == 1 && self.coeffs[0] == Gf256::ONE
    }

    pub fn leading_coefficient(&self) -> Gf256 {
        self.coeffs.last().copied().unwrap_or(Gf256::ZERO)
    }

    pub fn add(&self, other: &Poly) -> Poly {
        let len = self.coeffs.len().max(other.coeffs.len());
        Poly::from_coeffs((0..len).map(|i| self.coeff(i) + other.coeff(i)).collect())
    }

    pub fn sub(&self, other: &Poly) -> Poly {
        let len = self.coeffs.len().max(other.coeffs.len());
        Poly::from_coeffs((0..len).map(|i| self.coeff(i) - other.coeff(i)).collect())
    }

    pub fn scale(&self, c: Gf256) -> Poly {
        Poly::from_coeffs(self.coeffs.iter().map(|&a| a * c).collect())
    }

    pub fn mul(&self, other: &Poly) -> Poly {
        if self.is_zero() || other.is_zero() {
            return Poly::zero();
        }
        let mut out = vec![Gf256::ZERO; self.coeffs.len() + other.coeffs.len() - 1];
        for (i, &a) in self.coeffs.iter().enumerate() {
            if a.is_zero() {
                continue;
            }
            for (j, &b) in other.coeffs.iter().enumerate() {
                out[i + j] += a * b;
            }
        }
        Poly::from_coeffs(out)
    }

    /// Euclidean division: self = q·divisor + r with deg r < deg divisor.
    pub fn div_rem(&self, divisor: &Poly) -> Result<(Poly, Poly)> {
        let Some(dd) = divisor.degree() else {
            return Err(RecoveryError::DivisionByZero);
        };
        let lead_inv = divisor.leading_coefficient().inverse()?;
        let mut rem = self.coeffs.clone();
        if rem.len() <= dd {
            return Ok((Poly::zero(), self.clone()));
        }
        let mut quot = vec![Gf256::ZERO; rem.len() - dd];
        for i in (dd..rem.len()).rev() {
            let c = rem[i] * lead_inv;
            if c.is_zero() {
                continue;
            }
            quot[i - dd] = c;
            for (j, &d) in divisor.coeffs.iter().enumerate() {
                rem[i - dd + j] -= c * d;
            }
        }
        Ok((Poly::from_coeffs(quot), Poly::from_coeffs(rem)))
    }

    pub fn rem(&self, divisor: &Poly) -> Result<Poly> {
        Ok(self.div_rem(divisor)?.1)
    }

    /// Exact quotient; the caller guarantees divisibility.
    fn div_exact(&self, divisor: &Poly) -> Result<Poly> {
        Ok(self.div_rem(divisor)?.0)
    }

    /// Scales to leading coefficient one. The zero polynomial stays zero.
    pub fn monic(&self) -> Poly {
        match self.leading_coefficient().inverse() {
            Ok(inv) => self.scale(inv),
            Err(_) => Poly::zero(),
        }
    }

    /// Monic greatest common divisor.
    pub fn gcd(&self, other: &Poly) -> Result<Poly> {
        let mut a = self.clone();
        let mut b = other.clone();
        while !b.is_zero() {
            let r = a.rem(&b)?;
            a = b;
            b = r;
        }
        Ok(a.monic())
    }

    /// Formal derivative. Even-degree terms vanish in characteristic 2.
    pub fn derivative(&self) -> Poly {
        Poly::from_coeffs(
            self.coeffs
                .iter()
                .enumerate()
                .skip(1)
                .map(|(i, &c)| if i % 2 == 1 { c } else { Gf256::ZERO })
                .collect(),
        )
    }

    /// Inverse of the Frobenius map on a polynomial with zero derivative:
    /// Σ a_2i t^2i  ->  Σ sqrt(a_2i) t^i.
    fn frobenius_root(&self) -> Poly {
        Poly::from_coeffs(self.coeffs.iter().step_by(2).map(|c| c.sqrt()).collect())
    }

    fn square_mod(&self, modulus: &Poly) -> Result<Poly> {
        self.mul(self).rem(modulus)
    }

    pub fn evaluate(&self, x: Gf256) -> Gf256 {
        self.coeffs
            .iter()
            .rev()
            .fold(Gf256::ZERO, |acc, &c| acc * x + c)
    }

    /// Horner evaluation at a square matrix.
    pub fn evaluate_at_matrix(&self, m: &Matrix) -> Result<Matrix> {
        if !m.is_square() {
            return Err(RecoveryError::DimensionMismatch {
                context: "polynomial at matrix",
                expected: m.rows(),
                got: m.cols(),
            });
        }
        let n = m.rows();
        let identity = Matrix::identity(n);
        let mut acc = Matrix::zeros(n, n);
        for &c in self.coeffs.iter().rev() {
            acc = acc.mul(m)?;
            acc.add_scaled(&identity, c)?;
        }
        Ok(acc)
    }

    fn random_below<R: Rng + ?Sized>(degree: usize, rng: &mut R) -> Poly {
        Poly::from_coeffs((0..degree).map(|_| Gf256::random(rng)).collect())
    }

    /// Factors into distinct monic irreducible polynomials with multiplicities.
    ///
    /// The leading coefficient is dropped. Factors come out sorted by degree,
    /// then by coefficients.
    pub fn factor<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Vec<(Poly, usize)>> {
        if self.degree().unwrap_or(0) == 0 {
            return Ok(Vec::new());
        }
        let mut factors = Vec::new();
        for (square_free, multiplicity) in square_free_decomposition(&self.monic())? {
            for (product, degree) in distinct_degree_factorization(&square_free)? {
                let mut pieces = Vec::new();
                equal_degree_split(&product, degree, rng, &mut pieces)?;
                factors.extend(pieces.into_iter().map(|p| (p, multiplicity)));
            }
        }
        factors.sort_by(|(a, _), (b, _)| a.degree().cmp(&b.degree()).then_with(|| a.cmp(b)));
        Ok(factors)
    }
}

impl fmt::Debug for Poly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_zero() {
            return f.write_str("0");
        }
        let terms: Vec<String> = self
            .coeffs
            .iter()
            .enumerate()
            .rev()
            .filter(|(_, c)| !c.is_zero())
            .map(|(i, c)| match i {
                0 => format!("{c:?}"),
                1 => format!("{c:?}*t"),
                _ => format!("{c:?}*t^{i}"),
            })
            .collect();
        f.write_str(&terms.join(" + "))
    }
}

/// Square-free decomposition of a monic polynomial: pairs (g_i, i) with
/// f = Π g_i^i and every g_i square-free.
fn square_free_decomposition(f: &Poly) -> Result<Vec<(Poly, usize)>> {
    let mut out = Vec::new();
    if f.degree().unwrap_or(0) == 0 {
        return Ok(out);
    }
    let d = f.derivative();
    if d.is_zero() {
        for (g, e) in square_free_decomposition(&f.frobenius_root())? {
            out.push((g, e * 2));
        }
        return Ok(out);
    }

    let mut c = f.gcd(&d)?;
    let mut w = f.div_exact(&c)?;
    let mut i = 1;
    while !w.is_one() {
        let y = w.gcd(&c)?;
        let fac = w.div_exact(&y)?;
        if !fac.is_one() {
            out.push((fac, i));
        }
        i += 1;
        c = c.div_exact(&y)?;
        w = y;
    }
    if !c.is_one() {
        for (g, e) in square_free_decomposition(&c.frobenius_root())? {
            out.push((g, e * 2));
        }
    }
    Ok(out)
}

/// Splits a square-free monic polynomial into products of irreducibles of
/// equal degree, as pairs (product, degree).
fn distinct_degree_factorization(f: &Poly) -> Result<Vec<(Poly, usize)>> {
    let mut out = Vec::new();
    let mut rest = f.clone();
    let mut h = Poly::x().rem(&rest)?;
    let mut degree = 1;
    while rest.degree().is_some_and(|d| d >= 2 * degree) {
        // h <- h^256 mod rest
        for _ in 0..FIELD_BITS {
            h = h.square_mod(&rest)?;
        }
        let g = rest.gcd(&h.sub(&Poly::x()))?;
        if !g.is_one() {
            rest = rest.div_exact(&g)?;
            h = h.rem(&rest)?;
            out.push((g, degree));
        }
        degree += 1;
    }
    if let Some(d) = rest.degree().filter(|&d| d > 0) {
        out.push((rest.monic(), d));
    }
    Ok(out)
}

/// Cantor-Zassenhaus for characteristic 2: gcd(f, Tr(a)) with the absolute
/// trace Tr(a) = a + a^2 + ... + a^(2^(8d - 1)) mod f splits f with
/// probability at least 1/2.
fn equal_degree_split<R: Rng + ?Sized>(
    f: &Poly,
    degree: usize,
    rng: &mut R,
    out: &mut Vec<Poly>,
) -> Result<()> {
    let Some(n) = f.degree() else {
        return Ok(());
    };
    if n == degree {
        out.push(f.monic());
        return Ok(());
    }
    for _ in 0..MAX_SPLIT_ATTEMPTS {
        let a = Poly::random_below(n, rng);
        if a.degree().unwrap_or(0) == 0 {
            continue;
        }
        let mut power = a.clone();
        let mut trace = a;
        for _ in 1..FIELD_BITS * degree {
            power = power.square_mod(f)?;
            trace = trace.add(&power);
        }
        let g = f.gcd(&trace)?;
        if g.degree().is_some_and(|d| d > 0 && d < n) {
            let cofactor = f.div_exact(&g)?;
            equal_degree_split(&g, degree, rng, out)?;
            equal_degree_split(&cofactor, degree, rng, out)?;
            return Ok(());
        }
    }
    Err(RecoveryError::FactorizationStalled { degree: n })
}
