// ─────────────────────────────────────────────────────────────────────
// MF6 Adjoint — Dense Linear Solve
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Gaussian elimination with partial pivoting for the small systems of the
//! synthetic model.

use gwadj_types::error::{AdjError, AdjResult};
use ndarray::{Array1, Array2};

const PIVOT_TOL: f64 = 1e-300;

/// Solve `a x = b`. `a` and `b` are consumed as scratch.
pub fn solve_dense(mut a: Array2<f64>, mut b: Array1<f64>) -> AdjResult<Array1<f64>> {
    let n = b.len();
    if a.nrows() != n || a.ncols() != n {
        return Err(AdjError::Solver(format!(
            "matrix is {}x{}, right-hand side has {} rows",
            a.nrows(),
            a.ncols(),
            n
        )));
    }

    for k in 0..n {
        // Find pivot
        let mut piv = k;
        let mut best = a[[k, k]].abs();
        for r in (k + 1)..n {
            let v = a[[r, k]].abs();
            if v > best {
                best = v;
                piv = r;
            }
        }
        if best < PIVOT_TOL {
            return Err(AdjError::Solver(format!("singular matrix at column {k}")));
        }
        if piv != k {
            for c in 0..n {
                a.swap([k, c], [piv, c]);
            }
            b.swap(k, piv);
        }

        let pivot = a[[k, k]];
        for r in (k + 1)..n {
            let factor = a[[r, k]] / pivot;
            if factor == 0.0 {
                continue;
            }
            for c in k..n {
                a[[r, c]] -= factor * a[[k, c]];
            }
            b[r] -= factor * b[k];
        }
    }

    // Back substitution
    let mut x = Array1::zeros(n);
    for i in (0..n).rev() {
        let mut s = b[i];
        for c in (i + 1)..n {
            s -= a[[i, c]] * x[c];
        }
        x[i] = s / a[[i, i]];
    }
    Ok(x)
}
