use crate::error::{PyrffectError, PyrffectResult};

/// Pivots smaller than this are treated as zero.
pub const PIVOT_EPSILON: f64 = 1e-8;

/// Point count above which interpolation splits at the median.
pub const DEFAULT_SPLIT_THRESHOLD: usize = 9;

/// Solve for the coefficients (highest degree first) of the unique
/// polynomial of degree `n - 1` passing through `n` points.
///
/// Builds the Vandermonde system and runs Gauss-Jordan elimination with
/// row swapping when a pivot vanishes.
pub fn solve_polynomial(points: &[(f64, f64)]) -> PyrffectResult<Vec<f64>> {
    let n = points.len();
    if n == 0 {
        return Err(PyrffectError::config(
            "cannot interpolate a curve through zero points",
        ));
    }

    // Augmented matrix: n rows of [x^(n-1) .. x^0 | y].
    let mut m: Vec<Vec<f64>> = points
        .iter()
        .map(|&(x, y)| {
            let mut row: Vec<f64> = (0..n).map(|j| x.powi((n - 1 - j) as i32)).collect();
            row.push(y);
            row
        })
        .collect();

    for col in 0..n {
        if m[col][col].abs() < PIVOT_EPSILON {
            let swap = (col + 1..n).find(|&r| m[r][col].abs() >= PIVOT_EPSILON);
            match swap {
                Some(r) => m.swap(col, r),
                None => {
                    return Err(PyrffectError::config(format!(
                        "singular system while interpolating {} points (duplicate x?)",
                        n
                    )))
                }
            }
        }

        let pivot = m[col][col];
        for v in m[col].iter_mut() {
            *v /= pivot;
        }

        let pivot_row = m[col].clone();
        for (r, row) in m.iter_mut().enumerate() {
            if r == col {
                continue;
            }
            let factor = row[col];
            if factor == 0.0 {
                continue;
            }
            for (v, p) in row.iter_mut().zip(&pivot_row) {
                *v -= factor * p;
            }
        }
    }

    Ok(m.into_iter().map(|row| row[n]).collect())
}
