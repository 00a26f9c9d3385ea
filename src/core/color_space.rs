use serde::{Deserialize, Serialize};

/// Below this channel spread a color is treated as a shade of grey.
pub const ACHROMATIC_EPSILON: f64 = 1e-5;

/// Red, green, blue. Each channel is normalized to [0,1].
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Default)]
pub struct RgbColor {
    pub r: f64,
    pub g: f64,
    pub b: f64,
}

/// Hue, saturation, value. Each channel is normalized to [0,1]; the hue wraps.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Default)]
pub struct HsvColor {
    pub h: f64,
    pub s: f64,
    pub v: f64,
}

fn unit_to_u8(value: f64) -> u8 {
    (value * 255.0).round().clamp(0.0, 255.0) as u8
}

impl RgbColor {
    pub fn new(r: f64, g: f64, b: f64) -> Self {
        Self { r, g, b }
    }

    pub fn grey(value: f64) -> Self {
        Self::new(value, value, value)
    }

    /// Exact divide from the integral [0,255] representation.
    pub fn from_rgb8(pixel: image::Rgb<u8>) -> Self {
        let [r, g, b] = pixel.0;
        Self::new(r as f64 / 255.0, g as f64 / 255.0, b as f64 / 255.0)
    }

    /// Rounds each channel into the integral [0,255] representation used by the
    /// frame buffer.
    pub fn to_rgb8(self) -> image::Rgb<u8> {
        image::Rgb([unit_to_u8(self.r), unit_to_u8(self.g), unit_to_u8(self.b)])
    }

    pub fn to_hsv(self) -> HsvColor {
        rgb_to_hsv(self)
    }
}

impl HsvColor {
    pub fn new(h: f64, s: f64, v: f64) -> Self {
        Self { h, s, v }
    }

    pub fn to_rgb(self) -> RgbColor {
        hsv_to_rgb(self)
    }

    pub fn to_rgb8(self) -> image::Rgb<u8> {
        hsv_to_rgb(self).to_rgb8()
    }
}

/// Wrap a value onto [0,1).
pub fn wrap_unit(value: f64) -> f64 {
    let wrapped = value.rem_euclid(1.0);
    // rem_euclid can round up to exactly 1.0 for tiny negative inputs
    if wrapped >= 1.0 {
        0.0
    } else {
        wrapped
    }
}

/**
 * Standard six-region conversion from the HSV cylinder to RGB. A non-positive
 * saturation is a pure grey. Undefined (non-finite) hues are treated as red.
 */
pub fn hsv_to_rgb(hsv: HsvColor) -> RgbColor {
    let HsvColor { h, s, v } = hsv;
    if s <= 0.0 {
        return RgbColor::grey(v);
    }

    let hue = if h.is_finite() { wrap_unit(h) } else { 0.0 };
    let sector = hue * 6.0;
    let region = sector.floor();
    let remainder = sector - region;

    let p = v * (1.0 - s);
    let q = v * (1.0 - s * remainder);
    let t = v * (1.0 - s * (1.0 - remainder));

    match region as u8 {
        0 => RgbColor::new(v, t, p),
        1 => RgbColor::new(q, v, p),
        2 => RgbColor::new(p, v, t),
        3 => RgbColor::new(p, q, v),
        4 => RgbColor::new(t, p, v),
        _ => RgbColor::new(v, p, q),
    }
}

/**
 * Inverse of `hsv_to_rgb`. Value is the largest channel. Achromatic inputs (channel
 * spread below `ACHROMATIC_EPSILON`, which includes black) get hue and saturation 0.
 */
pub fn rgb_to_hsv(rgb: RgbColor) -> HsvColor {
    let RgbColor { r, g, b } = rgb;
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    if delta < ACHROMATIC_EPSILON || max <= 0.0 {
        return HsvColor::new(0.0, 0.0, max);
    }

    let sector = if r >= max {
        (g - b) / delta // between yellow and magenta
    } else if g >= max {
        2.0 + (b - r) / delta // between cyan and yellow
    } else {
        4.0 + (r - g) / delta // between magenta and cyan
    };

    let mut hue = sector / 6.0;
    if hue < 0.0 {
        hue += 1.0;
    }

    HsvColor::new(hue, delta / max, max)
}
