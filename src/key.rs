//! UOV parameters, public key and the growing oil basis

use crate::error::{RecoveryError, Result};
use crate::math::matrix::rank_of;
use crate::math::{is_zero_vector, Gf256, Matrix, Vector};
#[cfg(feature = "parallel")]
use rayon::prelude::*;
use serde::Serialize;

/// Scheme dimensions. `fixed = 3m - n` is the number of coordinates pinned to
/// zero before the eigenspace search; it may be negative for parameter sets
/// that only go through reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Parameters {
    pub v: usize,
    pub m: usize,
    pub n: usize,
    pub fixed: isize,
}

impl Parameters {
    /// uov-Ip, the NIST round-2 level I parameter set.
    pub const UOV_IP: Parameters = Parameters {
        v: 68,
        m: 44,
        n: 112,
        fixed: 20,
    };

    pub fn new(v: usize, m: usize) -> Result<Self> {
        if v == 0 || m == 0 {
            return Err(RecoveryError::InvalidParameters(format!(
                "v and m must be positive (v={v}, m={m})"
            )));
        }
        let n = v + m;
        Ok(Self {
            v,
            m,
            n,
            fixed: 3 * m as isize - n as isize,
        })
    }

    /// Dimension of the restricted space searched by Kipnis-Shamir,
    /// `2(v - m)`. Needs `m <= v <= 2m`.
    pub fn restricted_dimension(&self) -> Result<usize> {
        let fixed = usize::try_from(self.fixed).map_err(|_| {
            RecoveryError::InvalidParameters(format!(
                "eigenspace search needs 3m >= n (fixed = {})",
                self.fixed
            ))
        })?;
        (self.n - self.m).checked_sub(fixed).ok_or_else(|| {
            RecoveryError::InvalidParameters(format!(
                "eigenspace search needs v >= m (v={}, m={})",
                self.v, self.m
            ))
        })
    }
}

/// The public quadratic forms, in upper-triangular and symmetrized form.
#[derive(Debug, Clone)]
pub struct PublicKey {
    params: Parameters,
    matrices: Vec<Matrix>,
    symmetric: Vec<Matrix>,
}

impl PublicKey {
    /// Validates shapes before doing any arithmetic.
    pub fn new(params: Parameters, matrices: Vec<Matrix>) -> Result<Self> {
        if matrices.len() != params.m {
            return Err(RecoveryError::MalformedPublicKey(format!(
                "expected {} matrices, got {}",
                params.m,
                matrices.len()
            )));
        }
        if let Some((k, bad)) = matrices
            .iter()
            .enumerate()
            .find(|(_, p)| p.rows() != params.n || p.cols() != params.n)
        {
            return Err(RecoveryError::MalformedPublicKey(format!(
                "matrix {k} is {}x{}, expected {n}x{n}",
                bad.rows(),
                bad.cols(),
                n = params.n
            )));
        }

        let matrices = matrices
            .iter()
            .map(Matrix::to_upper_triangular)
            .collect::<Result<Vec<_>>>()?;

        #[cfg(feature = "parallel")]
        let symmetric = matrices
            .par_iter()
            .map(Matrix::symmetrize)
            .collect::<Result<Vec<_>>>()?;
        #[cfg(not(feature = "parallel"))]
        let symmetric = matrices
            .iter()
            .map(Matrix::symmetrize)
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            params,
            matrices,
            symmetric,
        })
    }

    pub fn params(&self) -> &Parameters {
        &self.params
    }

    pub fn matrices(&self) -> &[Matrix] {
        &self.matrices
    }

    pub fn symmetric(&self) -> &[Matrix] {
        &self.symmetric
    }

    /// Evaluates all public forms at x.
    pub fn evaluate(&self, x: &[Gf256]) -> Result<Vector> {
        self.ensure_length(x)?;
        self.matrices.iter().map(|p| p.quadratic_form(x)).collect()
    }

    /// Fails with `InvalidOilVector` naming the first form that does not vanish.
    pub fn check_oil_vector(&self, x: &[Gf256]) -> Result<()> {
        self.ensure_length(x)?;
        for (k, p) in self.matrices.iter().enumerate() {
            if !p.quadratic_form(x)?.is_zero() {
                return Err(RecoveryError::InvalidOilVector { equation: k });
            }
        }
        Ok(())
    }

    pub fn is_oil_vector(&self, x: &[Gf256]) -> bool {
        self.check_oil_vector(x).is_ok()
    }

    fn ensure_length(&self, x: &[Gf256]) -> Result<()> {
        if x.len() != self.params.n {
            return Err(RecoveryError::DimensionMismatch {
                context: "oil vector length",
                expected: self.params.n,
                got: x.len(),
            });
        }
        Ok(())
    }
}

/// Append-only set of independent oil vectors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OilBasis {
    n: usize,
    vectors: Vec<Vector>,
}

impl OilBasis {
    pub fn new(n: usize) -> Self {
        Self {
            n,
            vectors: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    pub fn vectors(&self) -> &[Vector] {
        &self.vectors
    }

    pub fn into_vectors(self) -> Vec<Vector> {
        self.vectors
    }

    /// Accepts `x` only if it is an oil vector outside the current span.
    pub fn push(&mut self, key: &PublicKey, x: Vector) -> Result<()> {
        if x.len() != self.n {
            return Err(RecoveryError::DimensionMismatch {
                context: "oil basis vector",
                expected: self.n,
                got: x.len(),
            });
        }
        key.check_oil_vector(&x)?;
        if !self.is_independent(&x)? {
            return Err(RecoveryError::LinearlyDependent);
        }
        self.vectors.push(x);
        Ok(())
    }

    /// True when `x` is nonzero and not in the span of the basis.
    pub fn is_independent(&self, x: &[Gf256]) -> Result<bool> {
        if is_zero_vector(x) {
            return Ok(false);
        }
        let mut rows = self.vectors.clone();
        rows.push(x.to_vec());
        Ok(rank_of(&rows)? == rows.len())
    }

    pub fn rank(&self) -> Result<usize> {
        rank_of(&self.vectors)
    }

    /// Reduced row-echelon form of the basis matrix, which identifies the
    /// spanned subspace uniquely.
    pub fn canonical_form(&self) -> Result<Vec<Vector>> {
        if self.vectors.is_empty() {
            return Ok(Vec::new());
        }
        let echelon = Matrix::from_rows(&self.vectors)?.rref();
        Ok(echelon.matrix.to_rows().into_iter().take(echelon.rank()).collect())
    }
}
