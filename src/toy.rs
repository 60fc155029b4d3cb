//! Toy UOV instances with a planted oil space
//!
//! Each public form is `P_k = Sᵗ·F_k·S`, where the central form `F_k` is
//! upper triangular and vanishes on the last `m` coordinates. The oil space
//! is then spanned by the last `m` columns of `S⁻¹`. Useful for exercising
//! the recovery pipeline on parameters small enough to run in tests.

use crate::error::{RecoveryError, Result};
use crate::key::{OilBasis, Parameters, PublicKey};
use crate::math::{is_zero_vector, Gf256, Matrix, Vector};
use rand::Rng;
use tracing::debug;

const MAX_DRAWS: usize = 64;

pub struct ToyInstance {
    pub key: PublicKey,
    /// Planted oil basis, one vector per oil variable.
    pub oil: Vec<Vector>,
}

impl ToyInstance {
    pub fn generate<R: Rng + ?Sized>(params: Parameters, rng: &mut R) -> Result<Self> {
        let (v, n) = (params.v, params.n);
        let s = invertible(n, rng)?;

        let matrices = (0..params.m)
            .map(|_| {
                let f = Matrix::from_fn(n, n, |r, c| {
                    if r > c || (r >= v && c >= v) {
                        Gf256::ZERO
                    } else {
                        Gf256::random(rng)
                    }
                });
                s.transpose().mul(&f)?.mul(&s)
            })
            .collect::<Result<Vec<_>>>()?;

        let s_inv = s.inverse()?;
        Ok(Self {
            key: PublicKey::new(params, matrices)?,
            oil: (v..n).map(|i| s_inv.column(i)).collect(),
        })
    }

    /// A random nonzero element of the planted oil space.
    pub fn random_oil_vector<R: Rng + ?Sized>(&self, rng: &mut R) -> Vector {
        let n = self.key.params().n;
        loop {
            let mut x = vec![Gf256::ZERO; n];
            for o in &self.oil {
                let c = Gf256::random(rng);
                for (xi, &oi) in x.iter_mut().zip(o) {
                    *xi += c * oi;
                }
            }
            if !is_zero_vector(&x) {
                return x;
            }
        }
    }

    /// Reduced row-echelon form of the planted oil space, comparable with
    /// [`OilBasis::canonical_form`] of a recovered basis.
    pub fn canonical_oil(&self) -> Result<Vec<Vector>> {
        let mut basis = OilBasis::new(self.key.params().n);
        for o in &self.oil {
            basis.push(&self.key, o.clone())?;
        }
        basis.canonical_form()
    }
}

fn invertible<R: Rng + ?Sized>(n: usize, rng: &mut R) -> Result<Matrix> {
    for draw in 0..MAX_DRAWS {
        let s = Matrix::random(n, n, rng);
        if s.is_invertible() {
            return Ok(s);
        }
        debug!(draw, "singular change of variables");
    }
    Err(RecoveryError::SingularMatrix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_planted_space_vanishes_on_every_form() {
        let mut rng = ChaCha8Rng::seed_from_u64(61);
        let toy = ToyInstance::generate(Parameters::new(6, 3).unwrap(), &mut rng).unwrap();
        assert_eq!(toy.oil.len(), 3);
        for o in &toy.oil {
            assert!(toy.key.is_oil_vector(o));
        }
        let x = toy.random_oil_vector(&mut rng);
        assert!(toy.key.evaluate(&x).unwrap().iter().all(|e| e.is_zero()));
        assert_eq!(toy.canonical_oil().unwrap().len(), 3);
    }

    #[test]
    fn test_same_seed_same_instance() {
        let params = Parameters::new(4, 2).unwrap();
        let a = ToyInstance::generate(params, &mut ChaCha8Rng::seed_from_u64(62)).unwrap();
        let b = ToyInstance::generate(params, &mut ChaCha8Rng::seed_from_u64(62)).unwrap();
        assert_eq!(a.oil, b.oil);
        assert_eq!(a.key.matrices(), b.key.matrices());
    }
}
