//! Affine and quadratic expressions in a fixed set of free variables.
//!
//! These stand in for symbolic coordinates during reconciliation: a
//! coordinate that is not yet known is an affine combination of the free
//! variables, and substituting such a parametrization into a public
//! quadratic form yields a [`QuadraticPolynomial`].

use super::matrix::Matrix;
use super::{dot, Gf256, Vector};
use crate::error::{RecoveryError, Result};

/// `constant + Σ coefficients[i] · t_i`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LinearExpression {
    pub constant: Gf256,
    pub coefficients: Vector,
}

impl LinearExpression {
    pub fn constant(value: Gf256, variables: usize) -> Self {
        Self {
            constant: value,
            coefficients: vec![Gf256::ZERO; variables],
        }
    }

    /// The free variable `t_index` itself.
    pub fn variable(index: usize, variables: usize) -> Self {
        let mut e = Self::constant(Gf256::ZERO, variables);
        e.coefficients[index] = Gf256::ONE;
        e
    }

    pub fn variables(&self) -> usize {
        self.coefficients.len()
    }

    pub fn is_constant(&self) -> bool {
        self.coefficients.iter().all(|c| c.is_zero())
    }

    /// self += factor · other
    pub fn add_scaled(&mut self, other: &LinearExpression, factor: Gf256) {
        self.constant += other.constant * factor;
        for (a, &b) in self.coefficients.iter_mut().zip(&other.coefficients) {
            *a += b * factor;
        }
    }

    pub fn evaluate(&self, assignment: &[Gf256]) -> Result<Gf256> {
        if assignment.len() != self.coefficients.len() {
            return Err(RecoveryError::DimensionMismatch {
                context: "linear expression assignment",
                expected: self.coefficients.len(),
                got: assignment.len(),
            });
        }
        Ok(self.constant + dot(&self.coefficients, assignment))
    }

    /// Evaluates with every unassigned variable set to zero.
    pub fn resolve(&self, assignment: &[Gf256]) -> Gf256 {
        let known = self.coefficients.iter().zip(assignment);
        self.constant + known.map(|(&c, &x)| c * x).sum::<Gf256>()
    }
}

/// `tᵗ·Q·t + linear·t + constant` with `Q` upper triangular.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QuadraticPolynomial {
    pub quadratic: Matrix,
    pub linear: Vector,
    pub constant: Gf256,
}

impl QuadraticPolynomial {
    pub fn variables(&self) -> usize {
        self.linear.len()
    }

    /// Substitutes x = c + L·t into xᵗ·P·x, where `exprs[i]` is coordinate
    /// x_i as an affine expression in t.
    pub fn from_substitution(p: &Matrix, exprs: &[LinearExpression]) -> Result<Self> {
        if p.rows() != exprs.len() || !p.is_square() {
            return Err(RecoveryError::DimensionMismatch {
                context: "quadratic substitution",
                expected: p.rows(),
                got: exprs.len(),
            });
        }
        let f = exprs.first().map_or(0, LinearExpression::variables);
        let c: Vector = exprs.iter().map(|e| e.constant).collect();
        let l = Matrix::from_fn(exprs.len(), f, |r, col| exprs[r].coefficients[col]);

        let constant = p.quadratic_form(&c)?;
        // Cross terms: cᵗ(P + Pᵗ)L
        let linear = l.transpose().mul_vec(&p.symmetrize()?.mul_vec(&c)?)?;
        let quadratic = l.transpose().mul(p)?.mul(&l)?.to_upper_triangular()?;

        Ok(Self {
            quadratic,
            linear,
            constant,
        })
    }

    pub fn evaluate(&self, t: &[Gf256]) -> Result<Gf256> {
        if t.len() != self.linear.len() {
            return Err(RecoveryError::DimensionMismatch {
                context: "quadratic polynomial assignment",
                expected: self.linear.len(),
                got: t.len(),
            });
        }
        Ok(self.quadratic.quadratic_form(t)? + dot(&self.linear, t) + self.constant)
    }

    pub fn is_zero(&self) -> bool {
        self.constant.is_zero()
            && self.linear.iter().all(|x| x.is_zero())
            && self.quadratic.is_zero()
    }

    /// Whether variable `i` occurs in any monomial.
    pub fn involves(&self, i: usize) -> bool {
        !self.linear[i].is_zero()
            || (0..self.variables()).any(|j| {
                !self.quadratic.get(i, j).is_zero() || !self.quadratic.get(j, i).is_zero()
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_linear_expression_evaluation() {
        let mut e = LinearExpression::constant(Gf256::new(5), 2);
        e.add_scaled(&LinearExpression::variable(1, 2), Gf256::new(3));
        let t = [Gf256::new(9), Gf256::new(2)];
        assert_eq!(e.evaluate(&t).unwrap(), Gf256::new(5) + Gf256::new(3) * Gf256::new(2));
        assert!(!e.is_constant());
        assert!(e.evaluate(&t[..1]).is_err());
    }

    #[test]
    fn test_resolve_defaults_missing_variables_to_zero() {
        let mut e = LinearExpression::constant(Gf256::new(7), 3);
        e.add_scaled(&LinearExpression::variable(2, 3), Gf256::new(9));
        assert_eq!(e.resolve(&[Gf256::ONE]), Gf256::new(7));
    }

    #[test]
    fn test_substitution_agrees_with_direct_evaluation() {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let n = 6;
        let f = 3;
        let p = Matrix::random(n, n, &mut rng).to_upper_triangular().unwrap();
        let exprs: Vec<LinearExpression> = (0..n)
            .map(|_| LinearExpression {
                constant: Gf256::random(&mut rng),
                coefficients: (0..f).map(|_| Gf256::random(&mut rng)).collect(),
            })
            .collect();
        let q = QuadraticPolynomial::from_substitution(&p, &exprs).unwrap();
        assert!(q.quadratic.is_upper_triangular());
        for _ in 0..20 {
            let t: Vector = (0..f).map(|_| Gf256::random(&mut rng)).collect();
            let x: Vector = exprs.iter().map(|e| e.evaluate(&t).unwrap()).collect();
            assert_eq!(q.evaluate(&t).unwrap(), p.quadratic_form(&x).unwrap());
        }
    }

    #[test]
    fn test_involves_detects_unused_variables() {
        let mut quadratic = Matrix::zeros(3, 3);
        quadratic.set(0, 2, Gf256::ONE);
        let q = QuadraticPolynomial {
            quadratic,
            linear: vec![Gf256::ZERO; 3],
            constant: Gf256::ONE,
        };
        assert!(q.involves(0));
        assert!(!q.involves(1));
        assert!(q.involves(2));
    }
}
