use more_asserts::assert_gt;
use nalgebra::Vector2;
use serde::{Deserialize, Serialize};

/// Escape threshold on |z|^2 for the integer escape count.
pub const CLASSIC_ESCAPE_RADIUS_SQUARED: f64 = 4.0;

/// Escape threshold on |z|^2 when smoothing. The larger radius keeps the fractional
/// correction well behaved.
pub const SMOOTH_ESCAPE_RADIUS_SQUARED: f64 = 256.0 * 256.0;

/**
 * Data structure for storing the internal state of the mandelbrot sequence calculation.
 * The squares of both components are cached, so each step costs three multiplies.
 */
pub struct QuadraticMapSequence {
    pub x0: f64,
    pub y0: f64,
    pub x: f64,
    pub y: f64,
    pub x_sqr: f64,
    pub y_sqr: f64,
}

impl QuadraticMapSequence {
    /// Implements the equation:  Z := Z*Z + C, starting from Z = 0.
    /// constant_term:  value for "C" in the above equation
    pub fn new(constant_term: &Vector2<f64>) -> QuadraticMapSequence {
        QuadraticMapSequence {
            x0: constant_term[0],
            y0: constant_term[1],
            x: 0.0,
            y: 0.0,
            x_sqr: 0.0,
            y_sqr: 0.0,
        }
    }

    pub fn radius_squared(&self) -> f64 {
        self.x_sqr + self.y_sqr
    }

    // Z = Z*Z + C
    pub fn step(&mut self) {
        self.y = (self.x + self.x) * self.y + self.y0;
        self.x = self.x_sqr - self.y_sqr + self.x0;
        self.x_sqr = self.x * self.x;
        self.y_sqr = self.y * self.y;
    }

    /// Step until |Z|^2 exceeds `max_radius_squared`, at most `max_iter_count` times.
    /// @return: zero-based index of the step that escaped, or None if it never did.
    pub fn step_until_escape(
        &mut self,
        max_iter_count: u32,
        max_radius_squared: f64,
    ) -> Option<u32> {
        for iter_index in 0..max_iter_count {
            self.step();
            if self.radius_squared() > max_radius_squared {
                return Some(iter_index);
            }
        }
        None
    }
}

/// Points inside the main cardioid or the period-2 disk never escape.
pub fn is_inside_main_bulbs(point: &Vector2<f64>) -> bool {
    let x = point[0];
    let c2 = point.dot(point);
    let in_cardioid = 256.0 * c2 * c2 - 96.0 * c2 + 32.0 * x - 3.0 < 0.0;
    let in_period_two_disk = 16.0 * (c2 + 2.0 * x + 1.0) - 1.0 < 0.0;
    in_cardioid || in_period_two_disk
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct EscapeTimeParams {
    pub max_iterations: u32,
    pub smoothing: bool,
}

impl Default for EscapeTimeParams {
    fn default() -> Self {
        EscapeTimeParams {
            max_iterations: 62,
            smoothing: false,
        }
    }
}

/**
 * Escape-time evaluation of the Mandelbrot set for one point of the complex plane.
 *
 * Classic mode returns the zero-based step at which |z|^2 first exceeded 4, or
 * `max_iterations` if it never did. Smoothed mode returns a continuous value derived
 * from the escape step and the final radius, or 0 if the orbit never escaped.
 * Points inside the two main bulbs return 0 in both modes.
 */
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EscapeTimeEngine {
    params: EscapeTimeParams,
}

impl EscapeTimeEngine {
    pub fn new(params: EscapeTimeParams) -> EscapeTimeEngine {
        assert_gt!(params.max_iterations, 0);
        EscapeTimeEngine { params }
    }

    pub fn params(&self) -> &EscapeTimeParams {
        &self.params
    }

    pub fn max_iterations(&self) -> u32 {
        self.params.max_iterations
    }

    pub fn smoothing(&self) -> bool {
        self.params.smoothing
    }

    pub fn set_max_iterations(&mut self, max_iterations: u32) {
        assert_gt!(max_iterations, 0);
        self.params.max_iterations = max_iterations;
    }

    pub fn set_smoothing(&mut self, smoothing: bool) {
        self.params.smoothing = smoothing;
    }

    pub fn evaluate(&self, point: &Vector2<f64>) -> f64 {
        if is_inside_main_bulbs(point) {
            return 0.0;
        }
        if self.params.smoothing {
            self.evaluate_smooth(point)
        } else {
            self.evaluate_classic(point)
        }
    }

    fn evaluate_classic(&self, point: &Vector2<f64>) -> f64 {
        let max_iterations = self.params.max_iterations;
        let mut sequence = QuadraticMapSequence::new(point);
        sequence
            .step_until_escape(max_iterations, CLASSIC_ESCAPE_RADIUS_SQUARED)
            .unwrap_or(max_iterations) as f64
    }

    fn evaluate_smooth(&self, point: &Vector2<f64>) -> f64 {
        let max_iterations = self.params.max_iterations as f64;
        let mut sequence = QuadraticMapSequence::new(point);
        let escape_index =
            sequence.step_until_escape(self.params.max_iterations, SMOOTH_ESCAPE_RADIUS_SQUARED);
        match escape_index {
            Some(iter_index) => {
                let correction = sequence.radius_squared().log2().log2();
                ((iter_index as f64 - correction + 4.0) * max_iterations).max(0.0)
            }
            None => 0.0,
        }
    }
}
