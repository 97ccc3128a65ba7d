// crates/covenant-bandit/src/linalg.rs
// ============================================================================
// Module: Dense Linear Algebra
// Description: Gaussian elimination solves for small design matrices.
// Purpose: Compute parameter estimates and confidence forms without LAPACK.
// Dependencies: ndarray
// ============================================================================

//! ## Overview
//! The bandit's design matrices are small (context dimension around ten),
//! so solves use straightforward Gaussian elimination with partial
//! pivoting over `ndarray` views. Singular systems return `None`; callers
//! fall back to pull-average estimates as the algorithm prescribes.

// ============================================================================
// SECTION: Imports
// ============================================================================

use ndarray::Array1;
use ndarray::Array2;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Pivot magnitude below which the system is treated as singular.
const SINGULARITY_EPSILON: f64 = 1e-12;

// ============================================================================
// SECTION: Solving
// ============================================================================

/// Solves `A x = b` by Gaussian elimination with partial pivoting.
///
/// Returns `None` for non-square, mismatched, or singular systems.
#[must_use]
pub fn solve_linear_system(a: &Array2<f64>, b: &Array1<f64>) -> Option<Array1<f64>> {
    let n = a.nrows();
    if a.ncols() != n || b.len() != n {
        return None;
    }

    // Augmented working copy.
    let mut work = a.clone();
    let mut rhs = b.clone();

    for column in 0 .. n {
        // Partial pivot: the largest magnitude entry at or below the
        // diagonal.
        let mut pivot_row = column;
        let mut pivot_magnitude = work[(column, column)].abs();
        for row in column + 1 .. n {
            let magnitude = work[(row, column)].abs();
            if magnitude > pivot_magnitude {
                pivot_magnitude = magnitude;
                pivot_row = row;
            }
        }
        if pivot_magnitude < SINGULARITY_EPSILON {
            return None;
        }
        if pivot_row != column {
            for swap_column in 0 .. n {
                work.swap((column, swap_column), (pivot_row, swap_column));
            }
            rhs.swap(column, pivot_row);
        }

        // Eliminate below the pivot.
        for row in column + 1 .. n {
            let factor = work[(row, column)] / work[(column, column)];
            if factor == 0.0 {
                continue;
            }
            for target in column .. n {
                work[(row, target)] -= factor * work[(column, target)];
            }
            rhs[row] -= factor * rhs[column];
        }
    }

    // Back-substitution.
    let mut solution = Array1::zeros(n);
    for row in (0 .. n).rev() {
        let mut accumulated = rhs[row];
        for column in row + 1 .. n {
            accumulated -= work[(row, column)] * solution[column];
        }
        solution[row] = accumulated / work[(row, row)];
    }
    Some(solution)
}

/// Computes the quadratic form `xᵀ · A⁻¹ · x` via a single solve.
///
/// Returns `None` when `A` is singular.
#[must_use]
pub fn quadratic_form(a: &Array2<f64>, x: &Array1<f64>) -> Option<f64> {
    let solved = solve_linear_system(a, x)?;
    Some(x.dot(&solved))
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use ndarray::arr1;
    use ndarray::arr2;

    use super::quadratic_form;
    use super::solve_linear_system;

    #[test]
    fn solves_a_well_conditioned_system() -> Result<(), String> {
        let a = arr2(&[[2.0, 1.0], [1.0, 3.0]]);
        let b = arr1(&[5.0, 10.0]);
        let x = solve_linear_system(&a, &b).ok_or("expected solution")?;
        assert!((x[0] - 1.0).abs() < 1e-9);
        assert!((x[1] - 3.0).abs() < 1e-9);
        Ok(())
    }

    #[test]
    fn identity_quadratic_form_is_the_norm_squared() -> Result<(), String> {
        let a = arr2(&[[1.0, 0.0], [0.0, 1.0]]);
        let x = arr1(&[3.0, 4.0]);
        let form = quadratic_form(&a, &x).ok_or("expected form")?;
        assert!((form - 25.0).abs() < 1e-9);
        Ok(())
    }

    #[test]
    fn singular_systems_return_none() {
        let a = arr2(&[[1.0, 2.0], [2.0, 4.0]]);
        let b = arr1(&[1.0, 2.0]);
        assert!(solve_linear_system(&a, &b).is_none());
    }

    #[test]
    fn pivoting_handles_zero_diagonals() -> Result<(), String> {
        let a = arr2(&[[0.0, 1.0], [1.0, 0.0]]);
        let b = arr1(&[2.0, 3.0]);
        let x = solve_linear_system(&a, &b).ok_or("expected solution")?;
        assert!((x[0] - 3.0).abs() < 1e-9);
        assert!((x[1] - 2.0).abs() < 1e-9);
        Ok(())
    }
}
