use more_asserts::assert_gt;
use serde::{Deserialize, Serialize};

use crate::core::color_space::{wrap_unit, HsvColor, RgbColor};
use crate::core::interpolation::{
    InterpolationKeyframe, Interpolator, MonotoneCubicSpline, SplineError,
};

/// Minimum number of caller-supplied control points for the hue redistribution.
pub const MIN_HUE_CONTROL_POINTS: usize = 3;

/// Maps an escape-time value onto a displayable pixel.
pub trait ColorMapper {
    fn compute_pixel(&self, escape_value: f64) -> image::Rgb<u8>;
}

/// Parameters of the periodic cosine palette. Each channel is
/// `0.5 + 0.5 * cos(base_shift + escape_value * frequency + channel_offset)`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CosinePaletteParams {
    pub base_shift: f64,
    pub frequency: f64,
    pub channel_offsets: [f64; 3],
}

impl Default for CosinePaletteParams {
    fn default() -> Self {
        Self {
            base_shift: 3.0,
            frequency: 0.15,
            channel_offsets: [0.0, 0.6, 1.0],
        }
    }
}

/// Palette selection, as it appears in parameter files.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum PaletteParams {
    Greyscale,
    Cosine(CosinePaletteParams),
    Spline,
}

impl Default for PaletteParams {
    fn default() -> Self {
        PaletteParams::Cosine(CosinePaletteParams::default())
    }
}

/// Linear ramp from black (escape value 0) to white (escape value = max iterations).
#[derive(Debug, Clone)]
pub struct GreyscaleColorMap {
    inv_max_iterations: f64,
}

impl GreyscaleColorMap {
    pub fn new(max_iterations: u32) -> Self {
        assert_gt!(max_iterations, 0);
        Self {
            inv_max_iterations: 1.0 / max_iterations as f64,
        }
    }

    pub fn compute_rgb(&self, escape_value: f64) -> RgbColor {
        let level = (escape_value * 255.0 * self.inv_max_iterations)
            .round()
            .clamp(0.0, 255.0);
        RgbColor::grey(level / 255.0)
    }
}

impl ColorMapper for GreyscaleColorMap {
    fn compute_pixel(&self, escape_value: f64) -> image::Rgb<u8> {
        self.compute_rgb(escape_value).to_rgb8()
    }
}

/// Smoothly cycling palette, independent of the iteration limit.
#[derive(Debug, Clone)]
pub struct CosineColorMap {
    params: CosinePaletteParams,
}

impl CosineColorMap {
    pub fn new(params: CosinePaletteParams) -> Self {
        Self { params }
    }

    pub fn compute_rgb(&self, escape_value: f64) -> RgbColor {
        let phase = self.params.base_shift + escape_value * self.params.frequency;
        let [off_r, off_g, off_b] = self.params.channel_offsets;
        let channel = |offset: f64| 0.5 + 0.5 * (phase + offset).cos();
        RgbColor::new(channel(off_r), channel(off_g), channel(off_b))
    }
}

impl ColorMapper for CosineColorMap {
    fn compute_pixel(&self, escape_value: f64) -> image::Rgb<u8> {
        self.compute_rgb(escape_value).to_rgb8()
    }
}

/**
 * Monotone remapping of raw iteration counts, used to stretch some parts of the
 * iteration range over a wider band of hues before colorizing.
 */
#[derive(Debug, Clone)]
pub struct HueRedistributionSpline {
    spline: MonotoneCubicSpline,
}

impl HueRedistributionSpline {
    /// Control points at {0 -> 0, 20% -> 40%, 50% -> 70%, 100% -> 100%} of the
    /// iteration limit.
    pub fn with_default_control_points(max_iterations: u32) -> Self {
        assert_gt!(max_iterations, 0);
        let n = max_iterations as f64;
        let keyframes = [
            InterpolationKeyframe::new(0.0, 0.0),
            InterpolationKeyframe::new(0.2 * n, 0.4 * n),
            InterpolationKeyframe::new(0.5 * n, 0.7 * n),
            InterpolationKeyframe::new(n, n),
        ];
        Self {
            spline: MonotoneCubicSpline::new(&keyframes)
                .expect("default hue control points are strictly increasing"),
        }
    }

    /// Build from caller-supplied `[iterations, redistributed]` pairs. The two axes
    /// are sorted independently, so the resulting curve is always non-decreasing.
    pub fn from_control_points(points: &[[f64; 2]]) -> Result<Self, SplineError> {
        if points.len() < MIN_HUE_CONTROL_POINTS {
            return Err(SplineError::TooFewKeyframes {
                required: MIN_HUE_CONTROL_POINTS,
                found: points.len(),
            });
        }
        let mut inputs: Vec<f64> = points.iter().map(|p| p[0]).collect();
        let mut outputs: Vec<f64> = points.iter().map(|p| p[1]).collect();
        inputs.sort_by(f64::total_cmp);
        outputs.sort_by(f64::total_cmp);

        let keyframes: Vec<InterpolationKeyframe> = inputs
            .into_iter()
            .zip(outputs)
            .map(|(input, output)| InterpolationKeyframe::new(input, output))
            .collect();
        Ok(Self {
            spline: MonotoneCubicSpline::new(&keyframes)?,
        })
    }

    /// Same as `from_control_points`, with both axes given as fractions of the
    /// iteration limit.
    pub fn from_normalized_control_points(
        points: &[[f64; 2]],
        max_iterations: u32,
    ) -> Result<Self, SplineError> {
        let n = max_iterations as f64;
        let scaled: Vec<[f64; 2]> = points.iter().map(|p| [p[0] * n, p[1] * n]).collect();
        Self::from_control_points(&scaled)
    }

    pub fn redistribute(&self, iterations: f64) -> f64 {
        self.spline.evaluate(iterations)
    }
}

/// Start and end of the band (in degrees of hue) where the saturation dips to white.
pub const WHITE_FADE_HUE_DEG: [f64; 2] = [50.0, 180.0];
/// Width (in degrees of the normalized iteration range) of the fade to black at
/// either end of the range.
pub const BLACK_FADE_WIDTH_DEG: f64 = 20.0;
/// Rotation of the color wheel applied before inverting the spectrum.
pub const HUE_ROTATION_DEG: f64 = 120.0;

/// Cosine window over [start, end]: 1 at both edges, 0 in the middle.
pub fn cosine_notch(value: f64, start: f64, end: f64) -> f64 {
    let phase = (value - start) / (end - start);
    0.5 * (2.0 * std::f64::consts::PI * phase).cos() + 0.5
}

/// Cosine window over [start, end]: 0 at both edges, 1 in the middle.
pub fn cosine_bump(value: f64, start: f64, end: f64) -> f64 {
    1.0 - cosine_notch(value, start, end)
}

/// Wrap an angle in degrees into [center - 180, center + 180).
pub fn wrap_angle_around_deg(angle: f64, center: f64) -> f64 {
    (angle - center + 180.0).rem_euclid(360.0) - 180.0 + center
}

/**
 * Hue-cycling palette in HSV space. The escape value is first redistributed by a
 * monotone spline, then turned into a hue by rotating and inverting the color wheel.
 * Saturation dips to white between 50 and 180 degrees of hue, and the value fades to
 * black within 20 degrees of either end of the iteration range.
 */
#[derive(Debug, Clone)]
pub struct SplineColorMap {
    inv_max_iterations: f64,
    redistribution: HueRedistributionSpline,
}

impl SplineColorMap {
    pub fn new(max_iterations: u32, redistribution: HueRedistributionSpline) -> Self {
        assert_gt!(max_iterations, 0);
        Self {
            inv_max_iterations: 1.0 / max_iterations as f64,
            redistribution,
        }
    }

    pub fn with_default_redistribution(max_iterations: u32) -> Self {
        Self::new(
            max_iterations,
            HueRedistributionSpline::with_default_control_points(max_iterations),
        )
    }

    pub fn compute_hsv(&self, escape_value: f64) -> HsvColor {
        let redistributed = self.redistribution.redistribute(escape_value);
        let unit = redistributed * self.inv_max_iterations;

        let rotated_deg = unit * 360.0 + HUE_ROTATION_DEG;
        let hue_deg = 360.0 - wrap_angle_around_deg(rotated_deg, 180.0);

        let [fade_start, fade_end] = WHITE_FADE_HUE_DEG;
        let saturation = if hue_deg > fade_start && hue_deg < fade_end {
            cosine_notch(hue_deg, fade_start, fade_end)
        } else {
            1.0
        };

        let position = unit.clamp(0.0, 1.0);
        let fade_width = BLACK_FADE_WIDTH_DEG / 360.0;
        let value = if position < fade_width {
            cosine_bump(position, 0.0, 2.0 * fade_width)
        } else if position > 1.0 - fade_width {
            cosine_bump(position, 1.0 - 2.0 * fade_width, 1.0)
        } else {
            1.0
        };

        HsvColor::new(wrap_unit(hue_deg / 360.0), saturation, value)
    }
}

impl ColorMapper for SplineColorMap {
    fn compute_pixel(&self, escape_value: f64) -> image::Rgb<u8> {
        self.compute_hsv(escape_value).to_rgb8()
    }
}

/// One of the palettes, built for a specific iteration limit.
#[derive(Debug, Clone)]
pub enum Palette {
    Greyscale(GreyscaleColorMap),
    Cosine(CosineColorMap),
    Spline(SplineColorMap),
}

impl Palette {
    /// @param hue_control_points: optional override for the spline palette, with both
    ///     axes given as fractions of `max_iterations`.
    pub fn new(
        params: &PaletteParams,
        max_iterations: u32,
        hue_control_points: Option<&[[f64; 2]]>,
    ) -> Result<Palette, SplineError> {
        Ok(match params {
            PaletteParams::Greyscale => Palette::Greyscale(GreyscaleColorMap::new(max_iterations)),
            PaletteParams::Cosine(cosine) => Palette::Cosine(CosineColorMap::new(cosine.clone())),
            PaletteParams::Spline => {
                let redistribution = match hue_control_points {
                    Some(points) => HueRedistributionSpline::from_normalized_control_points(
                        points,
                        max_iterations,
                    )?,
                    None => HueRedistributionSpline::with_default_control_points(max_iterations),
                };
                Palette::Spline(SplineColorMap::new(max_iterations, redistribution))
            }
        })
    }
}

impl ColorMapper for Palette {
    fn compute_pixel(&self, escape_value: f64) -> image::Rgb<u8> {
        match self {
            Palette::Greyscale(map) => map.compute_pixel(escape_value),
            Palette::Cosine(map) => map.compute_pixel(escape_value),
            Palette::Spline(map) => map.compute_pixel(escape_value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use image::Rgb;

    #[test]
    #[should_panic]
    fn test_greyscale_requires_iterations() {
        GreyscaleColorMap::new(0);
    }

    #[test]
    #[should_panic]
    fn test_spline_map_requires_iterations() {
        SplineColorMap::new(0, HueRedistributionSpline::with_default_control_points(10));
    }

    #[test]
    fn test_greyscale_end_points() {
        let map = GreyscaleColorMap::new(100);
        assert_eq!(map.compute_pixel(100.0), Rgb([255, 255, 255]));
        assert_eq!(map.compute_pixel(0.0), Rgb([0, 0, 0]));
        assert_eq!(map.compute_pixel(50.0), Rgb([128, 128, 128]));
        assert_eq!(map.compute_rgb(100.0), RgbColor::grey(1.0));
    }

    #[test]
    fn test_cosine_palette_is_periodic() {
        let map = CosineColorMap::new(CosinePaletteParams::default());
        let period = 2.0 * std::f64::consts::PI / 0.15;
        let a = map.compute_rgb(7.0);
        let b = map.compute_rgb(7.0 + period);
        assert_relative_eq!(a.r, b.r, epsilon = 1e-9);
        assert_relative_eq!(a.g, b.g, epsilon = 1e-9);
        assert_relative_eq!(a.b, b.b, epsilon = 1e-9);

        let origin = map.compute_rgb(0.0);
        assert_relative_eq!(origin.r, 0.5 + 0.5 * 3.0f64.cos());
        assert_relative_eq!(origin.g, 0.5 + 0.5 * 3.6f64.cos());
        assert_relative_eq!(origin.b, 0.5 + 0.5 * 4.0f64.cos());
    }

    #[test]
    fn test_default_hue_spline_is_identity_at_the_boundary() {
        for max_iterations in [1, 62, 100, 1000] {
            let spline = HueRedistributionSpline::with_default_control_points(max_iterations);
            let n = max_iterations as f64;
            assert_relative_eq!(spline.redistribute(0.0), 0.0, epsilon = 1e-12);
            assert_relative_eq!(spline.redistribute(n), n, epsilon = 1e-9);
            assert_relative_eq!(spline.redistribute(0.2 * n), 0.4 * n, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_custom_hue_spline_sorts_each_axis() {
        let spline =
            HueRedistributionSpline::from_control_points(&[[10.0, 0.0], [0.0, 10.0], [5.0, 2.0]])
                .unwrap();
        // sorted: inputs [0, 5, 10], outputs [0, 2, 10]
        assert_relative_eq!(spline.redistribute(0.0), 0.0);
        assert_relative_eq!(spline.redistribute(5.0), 2.0);
        assert_relative_eq!(spline.redistribute(10.0), 10.0);
    }

    #[test]
    fn test_custom_hue_spline_needs_three_points() {
        let err = HueRedistributionSpline::from_control_points(&[[0.0, 0.0], [1.0, 1.0]])
            .unwrap_err();
        assert_eq!(
            err,
            SplineError::TooFewKeyframes {
                required: 3,
                found: 2
            }
        );
        assert!(Palette::new(&PaletteParams::Spline, 100, Some(&[[0.0, 0.0]])).is_err());
    }

    #[test]
    fn test_cosine_windows() {
        assert_relative_eq!(cosine_notch(50.0, 50.0, 180.0), 1.0);
        assert_relative_eq!(cosine_notch(115.0, 50.0, 180.0), 0.0);
        assert_relative_eq!(cosine_notch(180.0, 50.0, 180.0), 1.0, epsilon = 1e-12);
        assert_relative_eq!(cosine_bump(0.0, 0.0, 2.0), 0.0);
        assert_relative_eq!(cosine_bump(1.0, 0.0, 2.0), 1.0);
    }

    #[test]
    fn test_wrap_angle() {
        assert_relative_eq!(wrap_angle_around_deg(480.0, 180.0), 120.0);
        assert_relative_eq!(wrap_angle_around_deg(120.0, 180.0), 120.0);
        assert_relative_eq!(wrap_angle_around_deg(-10.0, 180.0), 350.0);
        assert_relative_eq!(wrap_angle_around_deg(360.0, 180.0), 0.0);
    }

    #[test]
    fn test_spline_palette_bands() {
        let max_iterations = 360;
        // identity redistribution makes the hue bands easy to reason about
        let identity =
            HueRedistributionSpline::from_control_points(&[[0.0, 0.0], [180.0, 180.0], [360.0, 360.0]])
                .unwrap();
        let map = SplineColorMap::new(max_iterations, identity);

        // Both ends of the iteration range fade to black.
        assert_relative_eq!(map.compute_hsv(0.0).v, 0.0, epsilon = 1e-12);
        assert_relative_eq!(map.compute_hsv(360.0).v, 0.0, epsilon = 1e-12);
        assert_relative_eq!(map.compute_hsv(20.0).v, 1.0, epsilon = 1e-12);
        assert_relative_eq!(map.compute_hsv(340.0).v, 1.0, epsilon = 1e-12);
        assert_relative_eq!(map.compute_hsv(180.0).v, 1.0);

        // escape value 0 -> rotated 120 deg -> hue 240 deg: fully saturated blue
        let start = map.compute_hsv(0.0);
        assert_relative_eq!(start.h, 240.0 / 360.0, epsilon = 1e-12);
        assert_relative_eq!(start.s, 1.0);

        // hue 115 deg sits in the middle of the white band: 360 - (u*360 + 120) = 115
        let white = map.compute_hsv(125.0);
        assert_relative_eq!(white.h, 115.0 / 360.0, epsilon = 1e-12);
        assert_relative_eq!(white.s, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_palette_dispatch() {
        let grey = Palette::new(&PaletteParams::Greyscale, 10, None).unwrap();
        assert_eq!(grey.compute_pixel(10.0), Rgb([255, 255, 255]));

        let spline = Palette::new(&PaletteParams::Spline, 10, None).unwrap();
        // interior points are black under the spline palette
        assert_eq!(spline.compute_pixel(0.0), Rgb([0, 0, 0]));
        assert_eq!(spline.compute_pixel(10.0), Rgb([0, 0, 0]));
    }
}
