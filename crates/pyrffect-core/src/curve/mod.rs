//! Scalar curves driving every animated quantity.
//!
//! A [`Curve`] is an immutable tree of functions of a parameter `t`. Every
//! variant evaluates either one `t` ([`Curve::calc`]) or a whole batch
//! ([`Curve::calc_batch`]); both paths produce the same numbers.

mod interpolate;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{PyrffectError, PyrffectResult};

pub use interpolate::{solve_polynomial, DEFAULT_SPLIT_THRESHOLD, PIVOT_EPSILON};

/// An immutable, composable function of `t`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Curve {
    /// `a * t + b`
    Linear { a: f64, b: f64 },
    /// `a * t^2 + b * t + c`
    Quadratic { a: f64, b: f64, c: f64 },
    /// Coefficients from highest degree to constant, evaluated with Horner's method.
    Polynomial { coefficients: Vec<f64> },
    /// Polynomial passing through control points, solved once at construction.
    Interpolated {
        points: Vec<(f64, f64)>,
        solved: Box<Curve>,
    },
    /// Clamp the child's output.
    Capped {
        child: Box<Curve>,
        min: Option<f64>,
        max: Option<f64>,
    },
    /// Clamp the input before handing it to the child.
    CappedIn {
        child: Box<Curve>,
        min: Option<f64>,
        max: Option<f64>,
    },
    /// `amplitude * sin(pulsation * t + phase) + offset`
    Sin {
        pulsation: f64,
        phase: f64,
        offset: f64,
        amplitude: f64,
    },
    /// Product of two curves.
    Mul { a: Box<Curve>, b: Box<Curve> },
    /// `outer(inner(t))`
    Composed { outer: Box<Curve>, inner: Box<Curve> },
    /// `before(t)` when `t <= split_t`, `after(t)` otherwise.
    Split {
        before: Box<Curve>,
        after: Box<Curve>,
        split_t: f64,
    },
}

impl Curve {
    pub fn linear(a: f64, b: f64) -> Self {
        Curve::Linear { a, b }
    }

    pub fn quadratic(a: f64, b: f64, c: f64) -> Self {
        Curve::Quadratic { a, b, c }
    }

    pub fn polynomial(coefficients: impl Into<Vec<f64>>) -> Self {
        Curve::Polynomial {
            coefficients: coefficients.into(),
        }
    }

    /// Interpolate through `points`, splitting at the median past
    /// [`DEFAULT_SPLIT_THRESHOLD`] points.
    pub fn through_points(points: Vec<(f64, f64)>) -> PyrffectResult<Self> {
        Self::through_points_with_threshold(points, DEFAULT_SPLIT_THRESHOLD)
    }

    /// Interpolate through `points`.
    ///
    /// Up to `threshold` points are solved as a single polynomial. Beyond
    /// that the points are sorted by `x`, cut at the median index (the
    /// median point belongs to both halves) and each half is built
    /// recursively, joined by a [`Curve::Split`] at the median `x`.
    pub fn through_points_with_threshold(
        mut points: Vec<(f64, f64)>,
        threshold: usize,
    ) -> PyrffectResult<Self> {
        if points.is_empty() {
            return Err(PyrffectError::config(
                "cannot interpolate a curve through zero points",
            ));
        }
        // Below 3 points a split would recurse on itself forever.
        let threshold = threshold.max(2);

        let solved = if points.len() > threshold {
            points.sort_by(|a, b| a.0.total_cmp(&b.0));
            let mid = points.len() / 2;
            let split_t = points[mid].0;
            let before = Self::through_points_with_threshold(points[..=mid].to_vec(), threshold)?;
            let after = Self::through_points_with_threshold(points[mid..].to_vec(), threshold)?;
            Curve::split(before, after, split_t)
        } else {
            Curve::polynomial(solve_polynomial(&points)?)
        };

        Ok(Curve::Interpolated {
            points,
            solved: Box::new(solved),
        })
    }

    pub fn capped(child: Curve, min: Option<f64>, max: Option<f64>) -> Self {
        Curve::Capped {
            child: Box::new(child),
            min,
            max,
        }
    }

    pub fn capped_in(child: Curve, min: Option<f64>, max: Option<f64>) -> Self {
        Curve::CappedIn {
            child: Box::new(child),
            min,
            max,
        }
    }

    pub fn sin(pulsation: f64, phase: f64, offset: f64, amplitude: f64) -> Self {
        Curve::Sin {
            pulsation,
            phase,
            offset,
            amplitude,
        }
    }

    pub fn mul(a: Curve, b: Curve) -> Self {
        Curve::Mul {
            a: Box::new(a),
            b: Box::new(b),
        }
    }

    pub fn composed(outer: Curve, inner: Curve) -> Self {
        Curve::Composed {
            outer: Box::new(outer),
            inner: Box::new(inner),
        }
    }

    pub fn split(before: Curve, after: Curve, split_t: f64) -> Self {
        Curve::Split {
            before: Box::new(before),
            after: Box::new(after),
            split_t,
        }
    }

    /// Parse polynomial coefficients written as `"c0,c1,...,cn"` (highest degree first).
    pub fn polynomial_from_str(s: &str) -> PyrffectResult<Self> {
        let coefficients = s
            .split(',')
            .map(|c| {
                c.trim().parse::<f64>().map_err(|_| {
                    PyrffectError::config(format!("invalid polynomial coefficient '{}'", c))
                })
            })
            .collect::<PyrffectResult<Vec<_>>>()?;
        Ok(Curve::polynomial(coefficients))
    }

    /// Parse control points written as `"x0,y0;x1,y1;..."` and interpolate through them.
    pub fn points_from_str(s: &str) -> PyrffectResult<Self> {
        let mut points = Vec::new();
        for p in s.split(';').filter(|p| !p.trim().is_empty()) {
            let mut it = p.split(',').map(|c| c.trim().parse::<f64>());
            match (it.next(), it.next(), it.next()) {
                (Some(Ok(x)), Some(Ok(y)), None) => points.push((x, y)),
                _ => {
                    return Err(PyrffectError::config(format!(
                        "invalid control point '{}', expected 'x,y'",
                        p
                    )))
                }
            }
        }
        Self::through_points(points)
    }

    /// Evaluate at a single `t`.
    pub fn calc(&self, t: f64) -> f64 {
        match self {
            Curve::Linear { a, b } => a * t + b,
            Curve::Quadratic { a, b, c } => t * (a * t + b) + c,
            Curve::Polynomial { coefficients } => horner(coefficients, t),
            Curve::Interpolated { solved, .. } => solved.calc(t),
            Curve::Capped { child, min, max } => clamp_opt(child.calc(t), *min, *max),
            Curve::CappedIn { child, min, max } => child.calc(clamp_opt(t, *min, *max)),
            Curve::Sin {
                pulsation,
                phase,
                offset,
                amplitude,
            } => amplitude * (pulsation * t + phase).sin() + offset,
            Curve::Mul { a, b } => a.calc(t) * b.calc(t),
            Curve::Composed { outer, inner } => outer.calc(inner.calc(t)),
            Curve::Split {
                before,
                after,
                split_t,
            } => {
                if t > *split_t {
                    after.calc(t)
                } else {
                    before.calc(t)
                }
            }
        }
    }

    /// Evaluate elementwise over a batch of `t` values.
    pub fn calc_batch(&self, ts: &[f64]) -> Vec<f64> {
        match self {
            Curve::Linear { a, b } => ts.iter().map(|t| a * t + b).collect(),
            Curve::Quadratic { a, b, c } => ts.iter().map(|t| t * (a * t + b) + c).collect(),
            Curve::Polynomial { coefficients } => {
                // Horner's method, one coefficient at a time over the whole batch.
                let mut acc = vec![0.0; ts.len()];
                for c in coefficients {
                    for (r, t) in acc.iter_mut().zip(ts) {
                        *r = *r * t + c;
                    }
                }
                acc
            }
            Curve::Interpolated { solved, .. } => solved.calc_batch(ts),
            Curve::Capped { child, min, max } => {
                let mut values = child.calc_batch(ts);
                values.iter_mut().for_each(|v| *v = clamp_opt(*v, *min, *max));
                values
            }
            Curve::CappedIn { child, min, max } => {
                let clamped: Vec<f64> = ts.iter().map(|t| clamp_opt(*t, *min, *max)).collect();
                child.calc_batch(&clamped)
            }
            Curve::Sin {
                pulsation,
                phase,
                offset,
                amplitude,
            } => ts
                .iter()
                .map(|t| amplitude * (pulsation * t + phase).sin() + offset)
                .collect(),
            Curve::Mul { a, b } => {
                let mut values = a.calc_batch(ts);
                for (v, w) in values.iter_mut().zip(b.calc_batch(ts)) {
                    *v *= w;
                }
                values
            }
            Curve::Composed { outer, inner } => outer.calc_batch(&inner.calc_batch(ts)),
            Curve::Split {
                before,
                after,
                split_t,
            } => {
                let mut values = before.calc_batch(ts);
                let after_values = after.calc_batch(ts);
                for ((v, w), t) in values.iter_mut().zip(after_values).zip(ts) {
                    if t > split_t {
                        *v = w;
                    }
                }
                values
            }
        }
    }

}

fn horner(coefficients: &[f64], t: f64) -> f64 {
    coefficients.iter().fold(0.0, |acc, c| acc * t + c)
}

fn clamp_opt(v: f64, min: Option<f64>, max: Option<f64>) -> f64 {
    let mut v = v;
    if let Some(max) = max {
        if v > max {
            v = max;
        }
    }
    if let Some(min) = min {
        if v < min {
            v = min;
        }
    }
    v
}

impl fmt::Display for Curve {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Curve::Linear { a, b } => write!(f, "{}t + {}", a, b),
            Curve::Quadratic { a, b, c } => write!(f, "{}t^2 + {}t + {}", a, b, c),
            Curve::Polynomial { coefficients } => {
                let parts: Vec<String> = coefficients.iter().map(|c| c.to_string()).collect();
                write!(f, "poly[{}]", parts.join(","))
            }
            Curve::Interpolated { points, .. } => {
                let parts: Vec<String> =
                    points.iter().map(|(x, y)| format!("{},{}", x, y)).collect();
                write!(f, "points[{}]", parts.join(";"))
            }
            Curve::Capped { child, min, max } => write!(f, "cap({}, {:?}, {:?})", child, min, max),
            Curve::CappedIn { child, min, max } => {
                write!(f, "cap_in({}, {:?}, {:?})", child, min, max)
            }
            Curve::Sin {
                pulsation,
                phase,
                offset,
                amplitude,
            } => write!(
                f,
                "{} * sin({}t + {}) + {}",
                amplitude, pulsation, phase, offset
            ),
            Curve::Mul { a, b } => write!(f, "({}) * ({})", a, b),
            Curve::Composed { outer, inner } => write!(f, "({}) o ({})", outer, inner),
            Curve::Split {
                before,
                after,
                split_t,
            } => write!(f, "split({}, {} | {})", split_t, before, after),
        }
    }
}
