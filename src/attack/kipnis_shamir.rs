//! Kipnis-Shamir eigenspace search
//!
//! Fixing one known oil vector `o` and pinning `fixed` coordinates to zero
//! leaves a `d = 2(v - m)` dimensional space in which the oil vectors form a
//! subspace of half the dimension. That subspace is invariant under
//! `M0⁻¹·M1` for any invertible pencil of the restricted symmetric forms, so
//! it is a sum of pieces of the kernels `ker f(M)` for the irreducible
//! factors `f` of the characteristic polynomial.
//!
//! When `v = 2m` nothing is pinned and `o` itself stays in the restricted
//! space, in the radical of every restricted form. No pencil is invertible
//! there, so the second vector is solved for directly instead.

use super::reconciliation::{ReconciliationConfig, ReconciliationEngine};
use crate::error::{RecoveryError, Result, Stage};
use crate::key::{OilBasis, PublicKey};
use crate::math::{dot, is_zero_vector, Gf256, Matrix, Vector};
use crate::solver::{SolveOutcome, SystemSolver};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
#[cfg(feature = "parallel")]
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KipnisShamirConfig {
    pub max_attempts: usize,
    /// Redraws of `M0` per attempt while it stays singular.
    pub max_singular_redraws: usize,
    /// Attempts evaluated together; with `parallel` each batch runs on rayon.
    pub batch_size: usize,
}

impl Default for KipnisShamirConfig {
    fn default() -> Self {
        Self {
            max_attempts: 256,
            max_singular_redraws: 32,
            batch_size: 8,
        }
    }
}

/// Successful search result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KipnisShamirOutcome {
    pub vector: Vector,
    pub attempts: usize,
}

/// The symmetric public forms pulled back along `T: GF(256)^d -> GF(256)^n`.
#[derive(Debug, Clone)]
pub struct Restriction {
    transform: Matrix,
    symmetric: Vec<Matrix>,
}

impl Restriction {
    /// `T` spans the solutions of `(S_k·o)·x = 0` for all k together with
    /// `x_i = 0` for `i` in `[n - m - fixed, n - m)`.
    pub fn new(key: &PublicKey, oil: &[Gf256]) -> Result<Self> {
        let params = key.params();
        let d = validate(key, oil)?;

        let mut constraints = key
            .symmetric()
            .iter()
            .map(|s| s.mul_vec(oil))
            .collect::<Result<Vec<_>>>()?;
        for i in d..params.n - params.m {
            let mut pin = vec![Gf256::ZERO; params.n];
            pin[i] = Gf256::ONE;
            constraints.push(pin);
        }

        let kernel = Matrix::from_rows(&constraints)?.kernel();
        if kernel.len() < 2 {
            return Err(RecoveryError::InvalidParameters(format!(
                "restricted space has dimension {}",
                kernel.len()
            )));
        }
        if kernel.len() != d {
            debug!(expected = d, got = kernel.len(), "degenerate restriction");
        }

        let transform = Matrix::from_columns(params.n, &kernel)?;
        let transposed = transform.transpose();
        let symmetric = key
            .symmetric()
            .iter()
            .map(|s| transposed.mul(s)?.mul(&transform))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            transform,
            symmetric,
        })
    }

    pub fn dimension(&self) -> usize {
        self.transform.cols()
    }

    pub fn transform(&self) -> &Matrix {
        &self.transform
    }

    pub fn symmetric(&self) -> &[Matrix] {
        &self.symmetric
    }

    pub fn lift(&self, b: &[Gf256]) -> Result<Vector> {
        self.transform.mul_vec(b)
    }

    fn combination<R: Rng>(&self, rng: &mut R) -> Result<Matrix> {
        let d = self.dimension();
        let mut acc = Matrix::zeros(d, d);
        for s in &self.symmetric {
            acc.add_scaled(s, Gf256::random(rng))?;
        }
        Ok(acc)
    }

    /// Returns `M0⁻¹·M1` for a random pencil with invertible `M0`.
    fn draw_operator<R: Rng>(&self, rng: &mut R, max_redraws: usize) -> Result<Matrix> {
        for redraw in 0..=max_redraws {
            let m0 = self.combination(rng)?;
            let m1 = self.combination(rng)?;
            match m0.inverse() {
                Ok(inv) => return inv.mul(&m1),
                Err(RecoveryError::SingularMatrix) => {
                    trace!(redraw, "singular combination");
                }
                Err(e) => return Err(e),
            }
        }
        Err(RecoveryError::SingularCombination {
            redraws: max_redraws,
        })
    }

    /// One randomized attempt; `Ok(None)` when no factor kernel yields an
    /// acceptable vector.
    fn attempt(
        &self,
        key: &PublicKey,
        basis: &OilBasis,
        seed: u64,
        config: &KipnisShamirConfig,
    ) -> Result<Option<Vector>> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let operator = self.draw_operator(&mut rng, config.max_singular_redraws)?;
        let factors = operator.characteristic_polynomial()?.factor(&mut rng)?;
        trace!(factors = factors.len(), "characteristic polynomial factored");

        for (factor, _) in &factors {
            let kernel = factor.evaluate_at_matrix(&operator)?.kernel();
            for b in candidates(&kernel) {
                let x = self.lift(&b)?;
                if !is_zero_vector(&x) && key.is_oil_vector(&x) && basis.is_independent(&x)? {
                    return Ok(Some(x));
                }
            }
        }
        Ok(None)
    }
}

/// Kernel basis vectors, plus every affine point `b0 + t·b1` when the kernel
/// is a plane. An eigenspace of an alternating pencil has even dimension, so
/// the oil line through a plane is usually not a basis vector.
fn candidates(kernel: &[Vector]) -> Vec<Vector> {
    let mut out = kernel.to_vec();
    if let [b0, b1] = kernel {
        out.extend(Gf256::elements().skip(1).map(|t| {
            b0.iter()
                .zip(b1)
                .map(|(&x, &y)| x + t * y)
                .collect::<Vector>()
        }));
    }
    out
}

/// Searches for one oil vector independent of `basis`, restricting with the
/// first basis vector. Attempt seeds come from `rng` in order, so the result
/// only depends on `rng`'s state, not on scheduling.
#[instrument(skip_all, fields(n = key.params().n, known = basis.len()))]
pub fn find<R: Rng>(
    key: &PublicKey,
    basis: &OilBasis,
    config: &KipnisShamirConfig,
    solver: &dyn SystemSolver,
    rng: &mut R,
) -> Result<KipnisShamirOutcome> {
    let first = basis
        .vectors()
        .first()
        .ok_or(RecoveryError::InsufficientRank { have: 0, need: 1 })?;
    if config.max_attempts == 0 {
        return Err(exhausted(basis, 0));
    }
    if survives_restriction(key, first)? {
        debug!("known vector lies in the radical of the restricted forms");
        return solve_in_radical(key, basis, solver);
    }

    let restriction = Restriction::new(key, first)?;
    debug!(d = restriction.dimension(), "restricted public forms");

    let batch_size = config.batch_size.max(1);
    let mut attempts = 0;
    while attempts < config.max_attempts {
        let batch = batch_size.min(config.max_attempts - attempts);
        let seeds: Vec<u64> = (0..batch).map(|_| rng.gen()).collect();
        if let Some((index, found)) = run_batch(&restriction, key, basis, &seeds, config) {
            attempts += index + 1;
            let vector = found?;
            info!(attempts, "found oil vector");
            return Ok(KipnisShamirOutcome { vector, attempts });
        }
        attempts += batch;
        debug!(attempts, "batch exhausted");
    }

    Err(exhausted(basis, attempts))
}

fn exhausted(basis: &OilBasis, attempts: usize) -> RecoveryError {
    RecoveryError::NoSolutionFound {
        stage: Stage::KipnisShamir,
        attempts,
        basis: basis.vectors().to_vec(),
    }
}

/// Returns the restricted dimension `d`.
fn validate(key: &PublicKey, oil: &[Gf256]) -> Result<usize> {
    let params = key.params();
    let d = params.restricted_dimension()?;
    if params.m < 2 {
        return Err(RecoveryError::InvalidParameters(format!(
            "eigenspace search needs at least two public forms, got {}",
            params.m
        )));
    }
    if oil.len() != params.n {
        return Err(RecoveryError::DimensionMismatch {
            context: "restriction oil vector",
            expected: params.n,
            got: oil.len(),
        });
    }
    Ok(d)
}

/// True when `o` is zero on every pinned coordinate, which always holds
/// for `fixed = 0`.
fn survives_restriction(key: &PublicKey, o: &[Gf256]) -> Result<bool> {
    let d = validate(key, o)?;
    let end = key.params().n - key.params().m;
    Ok(o[d..end].iter().all(|x| x.is_zero()))
}

/// Fixes the prefix of the new vector and hands the public forms, restricted
/// to the solutions of the bilinear relations with `basis`, to `solver`.
/// Every root is a vector spanning an isotropic plane with the known one;
/// the first whose own relations cut out a totally isotropic space is kept.
fn solve_in_radical(
    key: &PublicKey,
    basis: &OilBasis,
    solver: &dyn SystemSolver,
) -> Result<KipnisShamirOutcome> {
    let engine = ReconciliationEngine::new(key, solver, ReconciliationConfig::default());
    let prefix = engine.next_prefix(basis, None)?;
    let roots = match engine.reduce(basis, &prefix)? {
        Some((param, SolveOutcome::Solutions(solutions))) => solutions
            .iter()
            .map(|assignment| param.resolve(assignment))
            .collect(),
        Some((_, SolveOutcome::Underdetermined { degrees_of_freedom })) => {
            debug!(degrees_of_freedom, "reduced system underdetermined");
            Vec::new()
        }
        Some((_, SolveOutcome::NoSolution)) | None => Vec::new(),
    };
    debug!(roots = roots.len(), "reduced system solved");

    for x in roots {
        if key.is_oil_vector(&x)
            && basis.is_independent(&x)?
            && extends_isotropically(key, basis, &x)?
        {
            info!("found oil vector in the radical case");
            return Ok(KipnisShamirOutcome {
                vector: x,
                attempts: 1,
            });
        }
    }
    Err(exhausted(basis, 1))
}

/// Whether the common kernel of the bilinear relations with `basis` and `x`
/// is totally isotropic for every public form. For `v = 2m` and a genuine
/// oil vector that kernel is the oil space itself.
fn extends_isotropically(key: &PublicKey, basis: &OilBasis, x: &[Gf256]) -> Result<bool> {
    let mut rows = Vec::with_capacity((basis.len() + 1) * key.params().m);
    for o in basis.vectors().iter().map(Vec::as_slice).chain([x]) {
        for s in key.symmetric() {
            rows.push(s.mul_vec(o)?);
        }
    }
    let kernel = Matrix::from_rows(&rows)?.kernel();
    if kernel.len() > key.params().m {
        return Ok(true);
    }
    for (i, a) in kernel.iter().enumerate() {
        if !key.is_oil_vector(a) {
            return Ok(false);
        }
        for b in &kernel[i + 1..] {
            for s in key.symmetric() {
                if !dot(&s.mul_vec(a)?, b).is_zero() {
                    return Ok(false);
                }
            }
        }
    }
    Ok(true)
}

type BatchHit = (usize, Result<Vector>);

fn settle(index: usize, result: Result<Option<Vector>>) -> Option<BatchHit> {
    match result {
        Ok(None) => None,
        Ok(Some(v)) => Some((index, Ok(v))),
        Err(e) => Some((index, Err(e))),
    }
}

#[cfg(feature = "parallel")]
fn run_batch(
    restriction: &Restriction,
    key: &PublicKey,
    basis: &OilBasis,
    seeds: &[u64],
    config: &KipnisShamirConfig,
) -> Option<BatchHit> {
    seeds.par_iter().enumerate().find_map_first(|(i, &seed)| {
        settle(i, restriction.attempt(key, basis, seed, config))
    })
}

#[cfg(not(feature = "parallel"))]
fn run_batch(
    restriction: &Restriction,
    key: &PublicKey,
    basis: &OilBasis,
    seeds: &[u64],
    config: &KipnisShamirConfig,
) -> Option<BatchHit> {
    seeds.iter().enumerate().find_map(|(i, &seed)| {
        settle(i, restriction.attempt(key, basis, seed, config))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::Parameters;
    use crate::solver::ExhaustiveSolver;
    use crate::toy::ToyInstance;
    use rand_chacha::ChaCha20Rng;

    fn plant(v: usize, m: usize, rng: &mut ChaCha8Rng) -> ToyInstance {
        ToyInstance::generate(Parameters::new(v, m).unwrap(), rng).unwrap()
    }

    fn basis_with(key: &PublicKey, x: Vector) -> OilBasis {
        let mut basis = OilBasis::new(key.params().n);
        basis.push(key, x).unwrap();
        basis
    }

    fn search(planted: &ToyInstance, basis: &OilBasis, seed: u64) -> Result<KipnisShamirOutcome> {
        find(
            &planted.key,
            basis,
            &KipnisShamirConfig::default(),
            &ExhaustiveSolver::default(),
            &mut ChaCha20Rng::seed_from_u64(seed),
        )
    }

    #[test]
    fn test_restriction_satisfies_constraints() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let planted = plant(6, 4, &mut rng);
        let o = planted.random_oil_vector(&mut rng);
        let restriction = Restriction::new(&planted.key, &o).unwrap();
        assert_eq!(restriction.dimension(), 4);

        let t = restriction.transform();
        for c in 0..t.cols() {
            let col = t.column(c);
            assert!(col[4].is_zero() && col[5].is_zero());
            for s in planted.key.symmetric() {
                assert!(dot(&s.mul_vec(&o).unwrap(), &col).is_zero());
            }
        }
        for s in restriction.symmetric() {
            assert_eq!(s.rows(), 4);
            assert_eq!(s, &s.transpose());
        }
    }

    #[test]
    fn test_unpinned_restriction_keeps_known_vector_in_radical() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let planted = plant(4, 2, &mut rng);
        let o = planted.random_oil_vector(&mut rng);
        assert!(survives_restriction(&planted.key, &o).unwrap());

        let restriction = Restriction::new(&planted.key, &o).unwrap();
        let t = restriction.transform();
        let mut columns: Vec<Vector> = (0..t.cols()).map(|c| t.column(c)).collect();
        columns.push(o);
        assert_eq!(
            Matrix::from_columns(6, &columns).unwrap().rank(),
            t.cols(),
            "o lies in the restricted space"
        );
        for s in restriction.symmetric() {
            assert!(s.rank() < restriction.dimension());
        }
    }

    #[test]
    fn test_rejects_negative_fixed() {
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let planted = plant(7, 3, &mut rng);
        let result = Restriction::new(&planted.key, &planted.oil[0]);
        assert!(matches!(result, Err(RecoveryError::InvalidParameters(_))));
    }

    #[test]
    fn test_more_oil_than_vinegar_is_invalid() {
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let planted = plant(2, 4, &mut rng);
        let basis = basis_with(&planted.key, planted.oil[0].clone());
        assert!(matches!(
            search(&planted, &basis, 0),
            Err(RecoveryError::InvalidParameters(_))
        ));
    }

    #[test]
    fn test_plane_candidates_cover_projective_line() {
        let b0 = vec![Gf256::ONE, Gf256::ZERO];
        let b1 = vec![Gf256::ZERO, Gf256::ONE];
        let all = candidates(&[b0, b1]);
        assert_eq!(all.len(), 257);
        assert!(all.contains(&vec![Gf256::ONE, Gf256::new(0x42)]));
        assert_eq!(candidates(&[vec![Gf256::ONE; 3]]).len(), 1);
    }

    fn assert_finds_second_vector(v: usize, m: usize, seed: u64) -> KipnisShamirOutcome {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let planted = plant(v, m, &mut rng);
        let o = planted.random_oil_vector(&mut rng);
        let basis = basis_with(&planted.key, o);

        let outcome = search(&planted, &basis, seed).unwrap();
        assert!(planted.key.is_oil_vector(&outcome.vector));
        assert!(basis.is_independent(&outcome.vector).unwrap());
        assert!(outcome.attempts >= 1);
        outcome
    }

    #[test]
    fn test_finds_second_vector_balanced_toy() {
        let outcome = assert_finds_second_vector(4, 2, 11);
        assert_eq!(outcome.attempts, 1);
    }

    #[test]
    fn test_finds_second_vector_three_forms_unpinned() {
        assert_finds_second_vector(6, 3, 14);
    }

    #[test]
    fn test_finds_second_vector_scalar_pencil() {
        assert_finds_second_vector(4, 3, 12);
    }

    #[test]
    fn test_finds_second_vector_with_pinned_coordinates() {
        assert_finds_second_vector(6, 4, 13);
    }

    #[test]
    fn test_radical_case_vector_lies_in_planted_space() {
        let mut rng = ChaCha8Rng::seed_from_u64(15);
        let planted = plant(6, 3, &mut rng);
        let o = planted.random_oil_vector(&mut rng);
        let basis = basis_with(&planted.key, o);
        let outcome = search(&planted, &basis, 15).unwrap();

        let mut rows = planted.oil.clone();
        rows.push(outcome.vector);
        assert_eq!(Matrix::from_rows(&rows).unwrap().rank(), 3);
    }

    #[test]
    fn test_radical_case_respects_solver_capacity() {
        let mut rng = ChaCha8Rng::seed_from_u64(16);
        let planted = plant(8, 4, &mut rng);
        let basis = basis_with(&planted.key, planted.random_oil_vector(&mut rng));
        assert!(matches!(
            search(&planted, &basis, 16),
            Err(RecoveryError::SolverCapacity {
                variables: 4,
                limit: 3
            })
        ));
    }

    #[test]
    fn test_same_seed_same_vector() {
        let mut rng = ChaCha8Rng::seed_from_u64(21);
        let planted = plant(6, 4, &mut rng);
        let basis = basis_with(&planted.key, planted.oil[0].clone());

        let a = search(&planted, &basis, 5).unwrap();
        let b = search(&planted, &basis, 5).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_zero_budget_reports_no_solution() {
        let mut rng = ChaCha8Rng::seed_from_u64(22);
        for (v, m) in [(4, 2), (6, 4)] {
            let planted = plant(v, m, &mut rng);
            let basis = basis_with(&planted.key, planted.oil[0].clone());
            let config = KipnisShamirConfig {
                max_attempts: 0,
                ..Default::default()
            };
            let err = find(
                &planted.key,
                &basis,
                &config,
                &ExhaustiveSolver::default(),
                &mut ChaCha20Rng::seed_from_u64(0),
            )
            .unwrap_err();
            match err {
                RecoveryError::NoSolutionFound {
                    stage,
                    attempts,
                    basis,
                } => {
                    assert_eq!(stage, Stage::KipnisShamir);
                    assert_eq!(attempts, 0);
                    assert_eq!(basis.len(), 1);
                }
                other => panic!("unexpected error: {other}"),
            }
        }
    }

    #[test]
    fn test_empty_basis_is_insufficient() {
        let mut rng = ChaCha8Rng::seed_from_u64(23);
        let planted = plant(4, 2, &mut rng);
        let basis = OilBasis::new(6);
        assert!(matches!(
            search(&planted, &basis, 0),
            Err(RecoveryError::InsufficientRank { .. })
        ));
    }
}
