//! UOV oil-space recovery library
//!
//! Given the public key of an Unbalanced Oil and Vinegar instance over
//! GF(256) and a single leaked oil vector, this library recovers a basis of
//! the whole secret oil subspace: a Kipnis-Shamir eigenspace search finds a
//! second vector, and reconciliation extends the basis to full dimension.

pub mod attack;
pub mod error;
pub mod key;
pub mod math;
pub mod provider;
pub mod solver;
pub mod toy;

pub use attack::{recover, RecoveryConfig, RecoveryReport};
pub use error::{RecoveryError, Result, Stage};
pub use key::{OilBasis, Parameters, PublicKey};
pub use math::{Gf256, Matrix, Vector};
pub use solver::{ExhaustiveSolver, SystemSolver};
