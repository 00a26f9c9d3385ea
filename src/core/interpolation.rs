use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SplineError {
    #[error("spline needs at least {required} keyframes, got {found}")]
    TooFewKeyframes { required: usize, found: usize },
    #[error("spline keyframe inputs must be strictly increasing (index {index})")]
    NonIncreasingInput { index: usize },
    #[error("spline keyframes must be finite (index {index})")]
    NonFiniteKeyframe { index: usize },
}

/// Keyframes, used to construct (and define) a piecewise interpolator.
/// Maps an input (query) to an output value.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct InterpolationKeyframe {
    pub input: f64,
    pub output: f64,
}

impl InterpolationKeyframe {
    pub fn new(input: f64, output: f64) -> Self {
        Self { input, output }
    }
}

/// Trait for a scalar curve fit through a set of keyframes.
pub trait Interpolator {
    fn evaluate(&self, query: f64) -> f64;

    /// Range of inputs covered by the keyframes: [first, last].
    fn domain(&self) -> [f64; 2];
}

/// Split the keyframes into separate query and value vectors, checking that the
/// queries are strictly increasing and that there are enough of them.
fn unzip_keyframes(
    keyframes: &[InterpolationKeyframe],
    min_count: usize,
) -> Result<(Vec<f64>, Vec<f64>), SplineError> {
    if keyframes.len() < min_count {
        return Err(SplineError::TooFewKeyframes {
            required: min_count,
            found: keyframes.len(),
        });
    }
    for (index, keyframe) in keyframes.iter().enumerate() {
        if !keyframe.input.is_finite() || !keyframe.output.is_finite() {
            return Err(SplineError::NonFiniteKeyframe { index });
        }
    }
    for (index, pair) in keyframes.windows(2).enumerate() {
        if pair[0].input >= pair[1].input {
            return Err(SplineError::NonIncreasingInput { index: index + 1 });
        }
    }
    let queries = keyframes.iter().map(|k| k.input).collect();
    let values = keyframes.iter().map(|k| k.output).collect();
    Ok((queries, values))
}

/// Index of the segment [queries[k], queries[k+1]] that contains the query.
/// Only valid for queries strictly inside the domain.
fn segment_index(queries: &[f64], query: f64) -> usize {
    let idx_upp = queries.partition_point(|q| query >= *q);
    idx_upp.clamp(1, queries.len() - 1) - 1
}

/**
 * Natural cubic spline: C2 continuous, zero curvature at both ends. Used for camera
 * playback, where smooth acceleration matters more than shape preservation.
 *
 * A single keyframe gives a constant curve; two keyframes give a straight line.
 * Outside the keyframe domain the curve is extended linearly along the end slopes.
 */
#[derive(Clone, Debug)]
pub struct NaturalCubicSpline {
    queries: Vec<f64>,
    values: Vec<f64>,
    second_derivatives: Vec<f64>,
}

impl NaturalCubicSpline {
    pub fn new(keyframes: &[InterpolationKeyframe]) -> Result<Self, SplineError> {
        let (queries, values) = unzip_keyframes(keyframes, 1)?;
        let second_derivatives = Self::solve_second_derivatives(&queries, &values);
        Ok(Self {
            queries,
            values,
            second_derivatives,
        })
    }

    /// Thomas algorithm on the tridiagonal system for the knot curvatures,
    /// with M[0] = M[n-1] = 0.
    fn solve_second_derivatives(queries: &[f64], values: &[f64]) -> Vec<f64> {
        let n = queries.len();
        let mut curvature = vec![0.0; n];
        if n < 3 {
            return curvature;
        }

        let interior = n - 2;
        let mut diag = vec![0.0; interior];
        let mut upper = vec![0.0; interior];
        let mut rhs = vec![0.0; interior];

        for i in 1..n - 1 {
            let h_low = queries[i] - queries[i - 1];
            let h_upp = queries[i + 1] - queries[i];
            let slope_low = (values[i] - values[i - 1]) / h_low;
            let slope_upp = (values[i + 1] - values[i]) / h_upp;
            diag[i - 1] = 2.0 * (h_low + h_upp);
            upper[i - 1] = h_upp;
            rhs[i - 1] = 6.0 * (slope_upp - slope_low);
        }

        // Forward sweep. The sub-diagonal entry of row j is h_low of knot j+1,
        // which equals the super-diagonal entry of row j-1.
        for j in 1..interior {
            let lower = upper[j - 1];
            let factor = lower / diag[j - 1];
            diag[j] -= factor * upper[j - 1];
            rhs[j] -= factor * rhs[j - 1];
        }

        // Back substitution
        let mut solution = vec![0.0; interior];
        solution[interior - 1] = rhs[interior - 1] / diag[interior - 1];
        for j in (0..interior - 1).rev() {
            solution[j] = (rhs[j] - upper[j] * solution[j + 1]) / diag[j];
        }

        curvature[1..n - 1].copy_from_slice(&solution);
        curvature
    }

    fn slope_at_start(&self) -> f64 {
        if self.queries.len() < 2 {
            return 0.0;
        }
        let h = self.queries[1] - self.queries[0];
        (self.values[1] - self.values[0]) / h
            - h * (2.0 * self.second_derivatives[0] + self.second_derivatives[1]) / 6.0
    }

    fn slope_at_end(&self) -> f64 {
        let n = self.queries.len();
        if n < 2 {
            return 0.0;
        }
        let h = self.queries[n - 1] - self.queries[n - 2];
        (self.values[n - 1] - self.values[n - 2]) / h
            + h * (self.second_derivatives[n - 2] + 2.0 * self.second_derivatives[n - 1]) / 6.0
    }
}

impl Interpolator for NaturalCubicSpline {
    fn evaluate(&self, query: f64) -> f64 {
        let n = self.queries.len();
        let first = self.queries[0];
        let last = self.queries[n - 1];
        if query <= first {
            return self.values[0] + self.slope_at_start() * (query - first);
        }
        if query >= last {
            return self.values[n - 1] + self.slope_at_end() * (query - last);
        }

        let k = segment_index(&self.queries, query);
        let h = self.queries[k + 1] - self.queries[k];
        let a = (self.queries[k + 1] - query) / h;
        let b = (query - self.queries[k]) / h;
        a * self.values[k]
            + b * self.values[k + 1]
            + ((a * a * a - a) * self.second_derivatives[k]
                + (b * b * b - b) * self.second_derivatives[k + 1])
                * (h * h)
                / 6.0
    }

    fn domain(&self) -> [f64; 2] {
        [self.queries[0], self.queries[self.queries.len() - 1]]
    }
}

/**
 * Shape-preserving (monotone) piecewise cubic Hermite spline. The tangents use the
 * weighted harmonic mean of the neighboring secant slopes, and are zero at local
 * extrema, so monotone keyframes produce a monotone curve with no overshoot.
 */
#[derive(Clone, Debug)]
pub struct MonotoneCubicSpline {
    queries: Vec<f64>,
    values: Vec<f64>,
    tangents: Vec<f64>,
}

impl MonotoneCubicSpline {
    pub fn new(keyframes: &[InterpolationKeyframe]) -> Result<Self, SplineError> {
        let (queries, values) = unzip_keyframes(keyframes, 2)?;
        let tangents = Self::compute_tangents(&queries, &values);
        Ok(Self {
            queries,
            values,
            tangents,
        })
    }

    fn compute_tangents(queries: &[f64], values: &[f64]) -> Vec<f64> {
        let n = queries.len();
        let widths: Vec<f64> = queries.windows(2).map(|q| q[1] - q[0]).collect();
        let secants: Vec<f64> = values
            .windows(2)
            .zip(&widths)
            .map(|(v, h)| (v[1] - v[0]) / h)
            .collect();

        let mut tangents = vec![0.0; n];
        tangents[0] = secants[0];
        tangents[n - 1] = secants[n - 2];
        for i in 1..n - 1 {
            let (d_low, d_upp) = (secants[i - 1], secants[i]);
            if d_low * d_upp <= 0.0 {
                continue;
            }
            let (h_low, h_upp) = (widths[i - 1], widths[i]);
            let w_low = 2.0 * h_upp + h_low;
            let w_upp = h_upp + 2.0 * h_low;
            tangents[i] = (w_low + w_upp) / (w_low / d_low + w_upp / d_upp);
        }
        tangents
    }
}

impl Interpolator for MonotoneCubicSpline {
    fn evaluate(&self, query: f64) -> f64 {
        let n = self.queries.len();
        let first = self.queries[0];
        let last = self.queries[n - 1];
        if query <= first {
            return self.values[0] + self.tangents[0] * (query - first);
        }
        if query >= last {
            return self.values[n - 1] + self.tangents[n - 1] * (query - last);
        }

        let k = segment_index(&self.queries, query);
        let h = self.queries[k + 1] - self.queries[k];
        let t = (query - self.queries[k]) / h;
        let t2 = t * t;
        let t3 = t2 * t;

        // Cubic Hermite basis
        let h00 = 2.0 * t3 - 3.0 * t2 + 1.0;
        let h10 = t3 - 2.0 * t2 + t;
        let h01 = -2.0 * t3 + 3.0 * t2;
        let h11 = t3 - t2;

        h00 * self.values[k]
            + h10 * h * self.tangents[k]
            + h01 * self.values[k + 1]
            + h11 * h * self.tangents[k + 1]
    }

    fn domain(&self) -> [f64; 2] {
        [self.queries[0], self.queries[self.queries.len() - 1]]
    }
}
