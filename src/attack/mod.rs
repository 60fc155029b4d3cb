//! Oil-space recovery pipeline
//!
//! A leaked oil vector is validated, a second one is found with the
//! Kipnis-Shamir eigenspace search, and reconciliation completes the basis.

use crate::error::Result;
use crate::key::{OilBasis, Parameters, PublicKey};
use crate::math::{Gf256, Vector};
use crate::solver::{SolverConfig, SystemSolver};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{info, instrument};

pub mod kipnis_shamir;
pub mod reconciliation;

pub use kipnis_shamir::{KipnisShamirConfig, KipnisShamirOutcome};
pub use reconciliation::{ReconciliationConfig, ReconciliationEngine, ReconciliationReport};

/// Tunables for a full recovery run. Loadable from JSON; absent fields keep
/// their defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    /// Master RNG seed. A fresh one is drawn and reported when unset.
    pub seed: Option<u64>,
    pub kipnis_shamir: KipnisShamirConfig,
    pub reconciliation: ReconciliationConfig,
    pub solver: SolverConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecoveryReport {
    pub params: Parameters,
    pub success: bool,
    pub seed: u64,
    pub basis: Vec<Vector>,
    /// Reduced row-echelon form of `basis`.
    pub canonical: Vec<Vector>,
    pub kipnis_shamir_attempts: usize,
    pub reconciliation: ReconciliationReport,
}

/// Recovers the full oil space from one leaked oil vector.
///
/// Escalations from reconciliation (`NeedsRandomization`, `NeedsMoreVectors`)
/// are returned unchanged together with the partial basis. Rerunning with
/// `reconciliation.randomize` set draws the prefixes from the master RNG.
#[instrument(skip_all, fields(v = key.params().v, m = key.params().m))]
pub fn recover(
    key: &PublicKey,
    leaked: &[Gf256],
    solver: &dyn SystemSolver,
    config: &RecoveryConfig,
) -> Result<RecoveryReport> {
    let params = *key.params();
    let total = Instant::now();

    key.check_oil_vector(leaked)?;
    info!("leaked oil vector verified");

    let seed = config.seed.unwrap_or_else(|| rand::thread_rng().gen());
    let mut rng = ChaCha20Rng::seed_from_u64(seed);

    let mut basis = OilBasis::new(params.n);
    basis.push(key, leaked.to_vec())?;

    let mut kipnis_shamir_attempts = 0;
    if params.m > 1 {
        let start = Instant::now();
        let outcome = kipnis_shamir::find(key, &basis, &config.kipnis_shamir, solver, &mut rng)?;
        kipnis_shamir_attempts = outcome.attempts;
        basis.push(key, outcome.vector)?;
        info!(
            "Kipnis-Shamir finished after {} attempts: {:.2}ms",
            outcome.attempts,
            start.elapsed().as_secs_f64() * 1000.0
        );
    }

    let start = Instant::now();
    let engine = ReconciliationEngine::new(key, solver, config.reconciliation);
    let reconciliation = if config.reconciliation.randomize {
        engine.run_with(&mut basis, &mut rng)?
    } else {
        engine.run(&mut basis)?
    };
    info!(
        "Reconciliation finished after {} iterations: {:.2}ms",
        reconciliation.iterations,
        start.elapsed().as_secs_f64() * 1000.0
    );

    let canonical = basis.canonical_form()?;
    let success = basis.len() == params.m && canonical.len() == params.m;
    info!(
        "Recovery {}: {:.2}ms total",
        if success { "complete" } else { "incomplete" },
        total.elapsed().as_secs_f64() * 1000.0
    );

    Ok(RecoveryReport {
        params,
        success,
        seed,
        basis: basis.into_vectors(),
        canonical,
        kipnis_shamir_attempts,
        reconciliation,
    })
}
