//! Error taxonomy for the recovery pipeline

use crate::math::Vector;
use std::fmt;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, RecoveryError>;

/// Phase of the attack that gave up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    KipnisShamir,
    Reconciliation,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::KipnisShamir => f.write_str("kipnis-shamir"),
            Stage::Reconciliation => f.write_str("reconciliation"),
        }
    }
}

#[derive(Debug, Error)]
pub enum RecoveryError {
    #[error("division by zero in GF(256)")]
    DivisionByZero,

    #[error("matrix is singular")]
    SingularMatrix,

    /// Every random combination drawn for the pencil was singular.
    #[error("random combination of public matrices stayed singular after {redraws} redraws")]
    SingularCombination { redraws: usize },

    /// The leaked vector does not vanish on the public key.
    #[error("oil vector does not vanish on public equation {equation}")]
    InvalidOilVector { equation: usize },

    /// A search exhausted its budget. `basis` is the state to resume from.
    #[error("{stage}: no solution found after {attempts} attempts ({} basis vectors known)", .basis.len())]
    NoSolutionFound {
        stage: Stage,
        attempts: usize,
        basis: Vec<Vector>,
    },

    /// One degree of freedom is left: vary the random combination and retry.
    #[error("reconciliation iteration {iteration}: one degree of freedom left, needs randomization")]
    NeedsRandomization { iteration: usize, basis: Vec<Vector> },

    /// The reduced system admits too many solutions: supply more basis vectors.
    #[error("reconciliation iteration {iteration}: system underdetermined, needs more vectors")]
    NeedsMoreVectors { iteration: usize, basis: Vec<Vector> },

    #[error("insufficient rank: have {have} independent vectors, need {need}")]
    InsufficientRank { have: usize, need: usize },

    #[error("vector is linearly dependent on the current basis")]
    LinearlyDependent,

    #[error("malformed public key: {0}")]
    MalformedPublicKey(String),

    #[error("invalid encoding: {0}")]
    InvalidEncoding(String),

    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("dimension mismatch in {context}: expected {expected}, got {got}")]
    DimensionMismatch {
        context: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("solver limit exceeded: {variables} constrained variables, limit is {limit}")]
    SolverCapacity { variables: usize, limit: usize },

    #[error("equal-degree splitting of a degree-{degree} polynomial did not converge")]
    FactorizationStalled { degree: usize },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl RecoveryError {
    /// Signals that need a caller-driven retry strategy rather than an abort.
    pub fn is_escalation(&self) -> bool {
        matches!(
            self,
            RecoveryError::NeedsRandomization { .. } | RecoveryError::NeedsMoreVectors { .. }
        )
    }

    /// Partial basis carried by resumable failures.
    pub fn partial_basis(&self) -> Option<&[Vector]> {
        match self {
            RecoveryError::NoSolutionFound { basis, .. }
            | RecoveryError::NeedsRandomization { basis, .. }
            | RecoveryError::NeedsMoreVectors { basis, .. } => Some(basis),
            _ => None,
        }
    }
}
