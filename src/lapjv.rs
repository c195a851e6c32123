use crate::error::TrackError::{self, LapjvError};

/* -----------------------------------------------------------------------------
 * lapjv.rs - Jonker-Volgenant linear assignment algorithm
 * ----------------------------------------------------------------------------- */

/// Solve the dense square assignment problem, minimizing total cost.
///
/// `cost` must be an `n x n` matrix of finite values. On success `rowsol[i]`
/// holds the column assigned to row `i` and `colsol[j]` the row assigned to
/// column `j`. Shortest-augmenting-path formulation with row/column
/// potentials.
pub(crate) fn lapjv(
    cost: &[Vec<f64>],
    rowsol: &mut [isize],
    colsol: &mut [isize],
) -> Result<(), TrackError> {
    let n = cost.len();
    debug_assert!(
        rowsol.len() == n,
        "rowsol length {} is not equal to n {}",
        rowsol.len(),
        n
    );
    debug_assert!(
        colsol.len() == n,
        "colsol length {} is not equal to n {}",
        colsol.len(),
        n
    );
    for row in cost.iter() {
        if row.len() != n {
            return Err(LapjvError(format!(
                "cost matrix is not square: row of length {} in {}x{} matrix",
                row.len(),
                n,
                n
            )));
        }
        if row.iter().any(|c| !c.is_finite()) {
            return Err(LapjvError("cost matrix contains non-finite values".into()));
        }
    }
    if n == 0 {
        return Ok(());
    }

    // Potentials; index 0 is a virtual column used as augmentation root.
    let mut u = vec![0.0f64; n + 1];
    let mut v = vec![0.0f64; n + 1];
    // p[j]: 1-indexed row currently assigned to column j, 0 = free.
    let mut p = vec![0usize; n + 1];
    let mut way = vec![0usize; n + 1];

    for i in 1..=n {
        p[0] = i;
        let mut j0 = 0usize;
        let mut minv = vec![f64::INFINITY; n + 1];
        let mut used = vec![false; n + 1];

        // Dijkstra over reduced costs until a free column is reached.
        loop {
            used[j0] = true;
            let i0 = p[j0];
            let mut delta = f64::INFINITY;
            let mut j1 = 0usize;
            for j in 1..=n {
                if used[j] {
                    continue;
                }
                let cur = cost[i0 - 1][j - 1] - u[i0] - v[j];
                if cur < minv[j] {
                    minv[j] = cur;
                    way[j] = j0;
                }
                if minv[j] < delta {
                    delta = minv[j];
                    j1 = j;
                }
            }
            for j in 0..=n {
                if used[j] {
                    u[p[j]] += delta;
                    v[j] -= delta;
                } else {
                    minv[j] -= delta;
                }
            }
            j0 = j1;
            if p[j0] == 0 {
                break;
            }
        }

        // Walk the augmenting path back to the root.
        loop {
            let j1 = way[j0];
            p[j0] = p[j1];
            j0 = j1;
            if j0 == 0 {
                break;
            }
        }
    }

    for j in 1..=n {
        debug_assert!(p[j] > 0, "column {} left unassigned", j - 1);
        rowsol[p[j] - 1] = (j - 1) as isize;
        colsol[j - 1] = (p[j] - 1) as isize;
    }
    Ok(())
}
