//! Reconciliation: extend a partial oil basis one vector at a time
//!
//! The next vector gets a prefix (its first `m` coordinates) outside the
//! span of the known prefixes: a unit vector by default, or a random one
//! when the caller supplies an RNG. Its remaining `v` coordinates are
//! pinned down by the bilinear relations `(S_k·o_i)·x = 0` with every known
//! oil vector `o_i`; whatever the linear algebra leaves free goes to the
//! polynomial-system solver through the quadratic forms themselves.

use crate::error::{RecoveryError, Result, Stage};
use crate::key::{OilBasis, PublicKey};
use crate::math::{dot, Gf256, LinearExpression, Matrix, QuadraticPolynomial, Vector};
use crate::solver::{PolynomialSystem, SolveOutcome, SystemSolver};
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconciliationConfig {
    pub max_iterations: usize,
    /// Draw the prefix of every new vector at random instead of taking the
    /// next unit vector. The answer to `NeedsRandomization`.
    pub randomize: bool,
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            max_iterations: 256,
            randomize: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconciliationReport {
    /// Basis size on entry.
    pub initial: usize,
    pub found: usize,
    pub iterations: usize,
    /// `found` after each iteration.
    pub history: Vec<usize>,
}

pub struct ReconciliationEngine<'a> {
    key: &'a PublicKey,
    solver: &'a dyn SystemSolver,
    config: ReconciliationConfig,
}

/// Coordinates of the next vector as affine expressions in the free variables.
pub(crate) struct Parametrization {
    pub(crate) coordinates: Vec<LinearExpression>,
    pub(crate) variables: Vec<String>,
}

impl Parametrization {
    pub(crate) fn resolve(&self, assignment: &[Gf256]) -> Vector {
        self.coordinates.iter().map(|e| e.resolve(assignment)).collect()
    }
}

impl<'a> ReconciliationEngine<'a> {
    pub fn new(
        key: &'a PublicKey,
        solver: &'a dyn SystemSolver,
        config: ReconciliationConfig,
    ) -> Self {
        Self {
            key,
            solver,
            config,
        }
    }

    /// Grows `basis` to `m` vectors. On error `basis` keeps every vector
    /// accepted so far.
    pub fn run(&self, basis: &mut OilBasis) -> Result<ReconciliationReport> {
        self.drive(basis, None)
    }

    /// Like [`run`](Self::run), but each new vector gets a random prefix
    /// outside the span of the known ones, so a rerun after an escalation
    /// builds different systems.
    pub fn run_with<R: Rng>(
        &self,
        basis: &mut OilBasis,
        rng: &mut R,
    ) -> Result<ReconciliationReport> {
        self.drive(basis, Some(rng))
    }

    #[instrument(skip_all, fields(solver = self.solver.name(), initial = basis.len()))]
    fn drive(
        &self,
        basis: &mut OilBasis,
        mut rng: Option<&mut dyn RngCore>,
    ) -> Result<ReconciliationReport> {
        let m = self.key.params().m;
        let w = basis.len();
        let mut report = ReconciliationReport {
            initial: w,
            ..Default::default()
        };
        if w >= m {
            return Ok(report);
        }
        if w < 2 {
            return Err(RecoveryError::InsufficientRank { have: w, need: 2 });
        }

        let target = m - w;
        while report.found < target {
            if report.iterations == self.config.max_iterations {
                return Err(RecoveryError::NoSolutionFound {
                    stage: Stage::Reconciliation,
                    attempts: report.iterations,
                    basis: basis.vectors().to_vec(),
                });
            }
            report.iterations += 1;
            let prefix = self.next_prefix(basis, rng.as_deref_mut())?;
            let x = self.extend(basis, &prefix, report.iterations)?;
            basis.push(self.key, x)?;
            report.found += 1;
            report.history.push(report.found);
            info!(
                iteration = report.iterations,
                found = report.found,
                target,
                "basis extended"
            );
        }
        Ok(report)
    }

    /// Runs one iteration and returns the new vector, not yet appended.
    fn extend(&self, basis: &OilBasis, prefix: &[Gf256], iteration: usize) -> Result<Vector> {
        let Some((param, outcome)) = self.reduce(basis, prefix)? else {
            debug!(iteration, "linear system inconsistent");
            return Err(self.no_solution(basis, iteration));
        };

        match outcome {
            SolveOutcome::Solutions(mut solutions) if solutions.len() == 1 => {
                let assignment = solutions.pop().unwrap_or_default();
                Ok(param.resolve(&assignment))
            }
            SolveOutcome::NoSolution => Err(self.no_solution(basis, iteration)),
            SolveOutcome::Solutions(solutions) if solutions.is_empty() => {
                Err(self.no_solution(basis, iteration))
            }
            SolveOutcome::Underdetermined {
                degrees_of_freedom: 1,
            } => Err(RecoveryError::NeedsRandomization {
                iteration,
                basis: basis.vectors().to_vec(),
            }),
            SolveOutcome::Solutions(_) | SolveOutcome::Underdetermined { .. } => {
                Err(RecoveryError::NeedsMoreVectors {
                    iteration,
                    basis: basis.vectors().to_vec(),
                })
            }
        }
    }

    /// Parametrizes the vectors with the given prefix that satisfy every
    /// bilinear relation with `basis`, and solves the public forms over the
    /// free variables. `None` when the relations are inconsistent.
    pub(crate) fn reduce(
        &self,
        basis: &OilBasis,
        prefix: &[Gf256],
    ) -> Result<Option<(Parametrization, SolveOutcome)>> {
        let Some(param) = self.parametrize(basis, prefix)? else {
            return Ok(None);
        };
        let equations = self
            .key
            .matrices()
            .iter()
            .map(|p| QuadraticPolynomial::from_substitution(p, &param.coordinates))
            .collect::<Result<Vec<_>>>()?;
        let system = PolynomialSystem::new(param.variables.clone(), equations)?;
        debug!(free = system.variables.len(), "submitting reduced system");

        let outcome = self.solver.solve(&system)?;
        Ok(Some((param, outcome)))
    }

    /// A prefix outside the span of the known prefixes: 1 on the first
    /// non-pivot column, 0 on the pivot columns, and with `rng` random
    /// entries on the remaining non-pivot columns.
    pub(crate) fn next_prefix(
        &self,
        basis: &OilBasis,
        rng: Option<&mut (dyn RngCore + '_)>,
    ) -> Result<Vector> {
        let m = self.key.params().m;
        let prefixes: Vec<Vector> = basis.vectors().iter().map(|o| o[..m].to_vec()).collect();
        let echelon = Matrix::from_rows(&prefixes)?.rref();
        let free = if prefixes.is_empty() {
            (0..m).collect()
        } else {
            echelon.free_columns()
        };
        let (&first, rest) = free.split_first().ok_or(RecoveryError::InsufficientRank {
            have: echelon.rank(),
            need: m,
        })?;

        let mut prefix = vec![Gf256::ZERO; m];
        prefix[first] = Gf256::ONE;
        if let Some(rng) = rng {
            for &c in rest {
                prefix[c] = Gf256::random(rng);
            }
        }
        Ok(prefix)
    }

    /// Solves the bilinear relations for the trailing `v` coordinates of a
    /// vector with the given prefix. `None` if they are inconsistent.
    fn parametrize(
        &self,
        basis: &OilBasis,
        prefix: &[Gf256],
    ) -> Result<Option<Parametrization>> {
        let params = self.key.params();
        let (v, m, n) = (params.v, params.m, params.n);

        let mut rows = Vec::with_capacity(basis.len() * m);
        for o in basis.vectors() {
            for s in self.key.symmetric() {
                rows.push(s.mul_vec(o)?);
            }
        }
        // Column c holds coordinate n-1-c; column v is the prefix contribution.
        let augmented = Matrix::from_fn(rows.len(), v + 1, |r, c| {
            if c < v {
                rows[r][n - 1 - c]
            } else {
                dot(&rows[r][..m], prefix)
            }
        });
        let echelon = augmented.rref();
        if echelon.pivots.last() == Some(&v) {
            return Ok(None);
        }

        // Free unknowns, named by their offset in the trailing block.
        let mut free: Vec<usize> = echelon
            .free_columns()
            .into_iter()
            .filter(|&c| c < v)
            .map(|c| v - 1 - c)
            .collect();
        free.sort_unstable();
        let f = free.len();

        let mut trailing = vec![LinearExpression::constant(Gf256::ZERO, f); v];
        for (k, &t) in free.iter().enumerate() {
            trailing[t] = LinearExpression::variable(k, f);
        }
        for (r, &pivot) in echelon.pivots.iter().enumerate() {
            let mut e = LinearExpression::constant(echelon.matrix.get(r, v), f);
            for (k, &t) in free.iter().enumerate() {
                e.coefficients[k] = echelon.matrix.get(r, v - 1 - t);
            }
            trailing[v - 1 - pivot] = e;
        }

        let mut coordinates: Vec<LinearExpression> = prefix
            .iter()
            .map(|&value| LinearExpression::constant(value, f))
            .collect();
        coordinates.extend(trailing);

        Ok(Some(Parametrization {
            coordinates,
            variables: free.iter().map(|t| format!("y{t}")).collect(),
        }))
    }

    fn no_solution(&self, basis: &OilBasis, iteration: usize) -> RecoveryError {
        RecoveryError::NoSolutionFound {
            stage: Stage::Reconciliation,
            attempts: iteration,
            basis: basis.vectors().to_vec(),
        }
    }
}
