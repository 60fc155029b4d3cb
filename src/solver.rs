//! Polynomial-system solving
//!
//! Reconciliation reduces each iteration to a small system of quadratic
//! equations in named free variables and hands it to a [`SystemSolver`].
//! Solvers are stateless between calls.

use crate::error::{RecoveryError, Result};
use crate::math::{Gf256, QuadraticPolynomial, Vector};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Equations over `variables.len()` unknowns; every equation is `= 0`.
#[derive(Debug, Clone)]
pub struct PolynomialSystem {
    pub variables: Vec<String>,
    pub equations: Vec<QuadraticPolynomial>,
}

impl PolynomialSystem {
    pub fn new(variables: Vec<String>, equations: Vec<QuadraticPolynomial>) -> Result<Self> {
        if let Some(bad) = equations.iter().find(|e| e.variables() != variables.len()) {
            return Err(RecoveryError::DimensionMismatch {
                context: "polynomial system",
                expected: variables.len(),
                got: bad.variables(),
            });
        }
        Ok(Self {
            variables,
            equations,
        })
    }

    /// Indices of variables that occur in at least one equation.
    pub fn constrained_variables(&self) -> Vec<usize> {
        (0..self.variables.len())
            .filter(|&i| self.equations.iter().any(|e| e.involves(i)))
            .collect()
    }

    pub fn is_satisfied_by(&self, assignment: &[Gf256]) -> Result<bool> {
        for e in &self.equations {
            if !e.evaluate(assignment)?.is_zero() {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SolveOutcome {
    NoSolution,
    /// Solutions exist but `degrees_of_freedom` variables stay unconstrained.
    Underdetermined { degrees_of_freedom: usize },
    /// Every common root, as full assignments in variable order.
    Solutions(Vec<Vector>),
}

pub trait SystemSolver: Send + Sync {
    fn name(&self) -> &'static str;
    fn solve(&self, system: &PolynomialSystem) -> Result<SolveOutcome>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    pub max_variables: usize,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self { max_variables: 3 }
    }
}

/// Brute force over GF(256)^(k-1) for all but the last of the k constrained
/// variables; the last one is solved from an equation that involves it.
#[derive(Debug, Clone, Copy)]
pub struct ExhaustiveSolver {
    max_variables: usize,
}

impl ExhaustiveSolver {
    pub fn new(config: SolverConfig) -> Self {
        Self {
            max_variables: config.max_variables,
        }
    }
}

impl Default for ExhaustiveSolver {
    fn default() -> Self {
        Self::new(SolverConfig::default())
    }
}

impl SystemSolver for ExhaustiveSolver {
    fn name(&self) -> &'static str {
        "exhaustive"
    }

    fn solve(&self, system: &PolynomialSystem) -> Result<SolveOutcome> {
        let constrained = system.constrained_variables();
        if constrained.len() > self.max_variables {
            return Err(RecoveryError::SolverCapacity {
                variables: constrained.len(),
                limit: self.max_variables,
            });
        }
        let unconstrained = system.variables.len() - constrained.len();
        debug!(
            variables = system.variables.len(),
            constrained = constrained.len(),
            equations = system.equations.len(),
            "enumerating"
        );

        let mut solutions = Vec::new();
        let mut assignment = vec![Gf256::ZERO; system.variables.len()];
        let Some((&last, outer)) = constrained.split_last() else {
            if system.is_satisfied_by(&assignment)? {
                solutions.push(assignment);
            }
            return Ok(classify(solutions, unconstrained));
        };
        let Some(pivot) = system.equations.iter().find(|e| e.involves(last)) else {
            return Ok(SolveOutcome::NoSolution);
        };

        let mut digits = vec![0u8; outer.len()];
        loop {
            for (&var, &d) in outer.iter().zip(&digits) {
                assignment[var] = Gf256::new(d);
            }
            for t in roots_in(pivot, last, &mut assignment)? {
                assignment[last] = t;
                if system.is_satisfied_by(&assignment)? {
                    solutions.push(assignment.clone());
                }
            }
            if !increment(&mut digits) {
                break;
            }
        }

        Ok(classify(solutions, unconstrained))
    }
}

fn classify(solutions: Vec<Vector>, unconstrained: usize) -> SolveOutcome {
    match (solutions.is_empty(), unconstrained) {
        (true, _) => SolveOutcome::NoSolution,
        (false, 0) => SolveOutcome::Solutions(solutions),
        (false, u) => SolveOutcome::Underdetermined {
            degrees_of_freedom: u,
        },
    }
}

/// Roots in variable `var` of `a·t² + b·t + c`, the restriction of `e` to
/// `var` with every other variable taken from `assignment`.
fn roots_in(e: &QuadraticPolynomial, var: usize, assignment: &mut [Gf256]) -> Result<Vec<Gf256>> {
    assignment[var] = Gf256::ZERO;
    let c = e.evaluate(assignment)?;
    let a = e.quadratic.get(var, var);
    let mut b = e.linear[var];
    for (i, &x) in assignment.iter().enumerate() {
        if i != var {
            b += (e.quadratic.get(i, var) + e.quadratic.get(var, i)) * x;
        }
    }

    Ok(match (a.is_zero(), b.is_zero()) {
        (true, true) if c.is_zero() => Gf256::elements().collect(),
        (true, true) => Vec::new(),
        (true, false) => vec![c.checked_div(b)?],
        (false, true) => vec![c.checked_div(a)?.sqrt()],
        (false, false) => Gf256::elements()
            .filter(|&t| (a * t * t + b * t + c).is_zero())
            .collect(),
    })
}

/// Odometer step over base-256 digits; false once it wraps around.
fn increment(digits: &mut [u8]) -> bool {
    for d in digits.iter_mut() {
        let (next, overflow) = d.overflowing_add(1);
        *d = next;
        if !overflow {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Matrix;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    /// a·y0² + b·y0 + c over one variable, with `vars` variables in total.
    fn univariate(a: u8, b: u8, c: u8, vars: usize) -> QuadraticPolynomial {
        let mut quadratic = Matrix::zeros(vars, vars);
        quadratic.set(0, 0, Gf256::new(a));
        let mut linear = vec![Gf256::ZERO; vars];
        linear[0] = Gf256::new(b);
        QuadraticPolynomial {
            quadratic,
            linear,
            constant: Gf256::new(c),
        }
    }

    fn names(k: usize) -> Vec<String> {
        (0..k).map(|i| format!("y{i}")).collect()
    }

    #[test]
    fn test_linear_equation_has_unique_root() {
        // 3·y0 + 6 = 0  =>  y0 = 2
        let system = PolynomialSystem::new(names(1), vec![univariate(0, 3, 6, 1)]).unwrap();
        let outcome = ExhaustiveSolver::default().solve(&system).unwrap();
        assert_eq!(outcome, SolveOutcome::Solutions(vec![vec![Gf256::new(2)]]));
    }

    #[test]
    fn test_quadratic_with_two_roots() {
        // (y0 + 1)(y0 + 2) = y0² + 3·y0 + 2
        let system = PolynomialSystem::new(names(1), vec![univariate(1, 3, 2, 1)]).unwrap();
        let SolveOutcome::Solutions(roots) = ExhaustiveSolver::default().solve(&system).unwrap()
        else {
            panic!("expected solutions");
        };
        assert_eq!(roots, vec![vec![Gf256::new(1)], vec![Gf256::new(2)]]);
    }

    #[test]
    fn test_inconsistent_constant_equation() {
        let system = PolynomialSystem::new(names(0), vec![univariate_zero_vars(5)]).unwrap();
        assert_eq!(
            ExhaustiveSolver::default().solve(&system).unwrap(),
            SolveOutcome::NoSolution
        );
    }

    fn univariate_zero_vars(c: u8) -> QuadraticPolynomial {
        QuadraticPolynomial {
            quadratic: Matrix::zeros(0, 0),
            linear: Vec::new(),
            constant: Gf256::new(c),
        }
    }

    #[test]
    fn test_empty_system_has_the_empty_solution() {
        let system = PolynomialSystem::new(names(0), vec![]).unwrap();
        assert_eq!(
            ExhaustiveSolver::default().solve(&system).unwrap(),
            SolveOutcome::Solutions(vec![vec![]])
        );
    }

    #[test]
    fn test_unused_variables_are_degrees_of_freedom() {
        let system = PolynomialSystem::new(names(3), vec![univariate(0, 1, 7, 3)]).unwrap();
        assert_eq!(
            ExhaustiveSolver::default().solve(&system).unwrap(),
            SolveOutcome::Underdetermined {
                degrees_of_freedom: 2
            }
        );
    }

    #[test]
    fn test_capacity_limit() {
        let mut eq = univariate(1, 0, 0, 3);
        eq.linear = vec![Gf256::ONE; 3];
        let system = PolynomialSystem::new(names(3), vec![eq]).unwrap();
        let solver = ExhaustiveSolver::new(SolverConfig { max_variables: 2 });
        assert!(matches!(
            solver.solve(&system),
            Err(RecoveryError::SolverCapacity {
                variables: 3,
                limit: 2
            })
        ));
    }

    #[test]
    fn test_rejects_mismatched_equation() {
        let result = PolynomialSystem::new(names(2), vec![univariate(1, 0, 0, 1)]);
        assert!(matches!(result, Err(RecoveryError::DimensionMismatch { .. })));
    }

    #[test]
    fn test_last_variable_taken_from_square_root() {
        // y1² + 4 = 0 and y0 + y1 = 0
        let mut square = Matrix::zeros(2, 2);
        square.set(1, 1, Gf256::ONE);
        let equations = vec![
            QuadraticPolynomial {
                quadratic: square,
                linear: vec![Gf256::ZERO; 2],
                constant: Gf256::new(4),
            },
            QuadraticPolynomial {
                quadratic: Matrix::zeros(2, 2),
                linear: vec![Gf256::ONE; 2],
                constant: Gf256::ZERO,
            },
        ];
        let system = PolynomialSystem::new(names(2), equations).unwrap();
        assert_eq!(
            ExhaustiveSolver::default().solve(&system).unwrap(),
            SolveOutcome::Solutions(vec![vec![Gf256::new(2), Gf256::new(2)]])
        );
    }

    fn brute_force(system: &PolynomialSystem) -> Vec<Vector> {
        let mut out = Vec::new();
        for a in Gf256::elements() {
            for b in Gf256::elements() {
                if system.is_satisfied_by(&[a, b]).unwrap() {
                    out.push(vec![a, b]);
                }
            }
        }
        out
    }

    #[test]
    fn test_roots_agree_with_full_enumeration() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        for _ in 0..6 {
            let equations = (0..2)
                .map(|_| QuadraticPolynomial {
                    quadratic: Matrix::random(2, 2, &mut rng).to_upper_triangular().unwrap(),
                    linear: (0..2).map(|_| Gf256::random(&mut rng)).collect(),
                    constant: Gf256::random(&mut rng),
                })
                .collect();
            let system = PolynomialSystem::new(names(2), equations).unwrap();
            let mut found = match ExhaustiveSolver::default().solve(&system).unwrap() {
                SolveOutcome::Solutions(s) => s,
                SolveOutcome::NoSolution => Vec::new(),
                other => panic!("unexpected outcome: {other:?}"),
            };
            let mut expected = brute_force(&system);
            found.sort();
            expected.sort();
            assert_eq!(found, expected);
        }
    }

    #[test]
    fn test_odometer_wraps() {
        let mut digits = [255u8, 0];
        assert!(increment(&mut digits));
        assert_eq!(digits, [0, 1]);
        let mut last = [255u8, 255];
        assert!(!increment(&mut last));
        assert!(!increment(&mut []));
    }
}
