//! sRGB colors and the perceptual measures used to check a stimulus palette.
//!
//! Luminance and contrast follow the WCAG definitions; hue is the HSL hue
//! angle. `tune_for_contrast` searches HSL lightness for a color that sits at
//! a requested contrast ratio against the background.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ColorError {
    #[error("invalid hex color `{0}` (expected #RRGGBB)")]
    InvalidHex(String),
}

/// 8-bit sRGB color, serialized as `#RRGGBB`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb::new(0, 0, 0);
    pub const WHITE: Rgb = Rgb::new(255, 255, 255);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub fn from_hex(hex: &str) -> Result<Self, ColorError> {
        let digits = hex.strip_prefix('#').unwrap_or(hex);
        if digits.len() != 6 || !digits.is_ascii() {
            return Err(ColorError::InvalidHex(hex.to_string()));
        }
        let channel = |range: std::ops::Range<usize>| {
            u8::from_str_radix(&digits[range], 16).map_err(|_| ColorError::InvalidHex(hex.to_string()))
        };
        Ok(Self::new(channel(0..2)?, channel(2..4)?, channel(4..6)?))
    }

    pub fn to_hex(&self) -> String {
        format!("#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }

    pub fn to_rgba(&self) -> [u8; 4] {
        [self.r, self.g, self.b, 255]
    }

    /// WCAG relative luminance in `0.0..=1.0`
    pub fn relative_luminance(&self) -> f64 {
        0.2126 * srgb_to_linear(self.r) + 0.7152 * srgb_to_linear(self.g) + 0.0722 * srgb_to_linear(self.b)
    }

    /// HSL hue in degrees, `None` for achromatic colors
    pub fn hue_deg(&self) -> Option<f64> {
        let r = self.r as f64 / 255.0;
        let g = self.g as f64 / 255.0;
        let b = self.b as f64 / 255.0;
        let max = r.max(g).max(b);
        let min = r.min(g).min(b);
        let d = max - min;
        let l = (max + min) / 2.0;
        let s = if d == 0.0 { 0.0 } else { d / (1.0 - (2.0 * l - 1.0).abs()) };
        if s == 0.0 {
            return None;
        }
        let h = if max == r {
            ((g - b) / d) % 6.0
        } else if max == g {
            (b - r) / d + 2.0
        } else {
            (r - g) / d + 4.0
        };
        let h = h * 60.0;
        Some(if h < 0.0 { h + 360.0 } else { h })
    }

    /// Contrast ratio between two colors, always `>= 1.0`
    pub fn contrast_with(&self, other: &Rgb) -> f64 {
        contrast_ratio(self.relative_luminance(), other.relative_luminance())
    }

    /// Euclidean distance in 8-bit RGB space
    pub fn delta_e(&self, other: &Rgb) -> f64 {
        let dr = self.r as f64 - other.r as f64;
        let dg = self.g as f64 - other.g as f64;
        let db = self.b as f64 - other.b as f64;
        (dr * dr + dg * dg + db * db).sqrt()
    }

    /// `h` in degrees, `s` and `l` in `0.0..=1.0`
    pub fn from_hsl(h: f64, s: f64, l: f64) -> Self {
        let c = (1.0 - (2.0 * l - 1.0).abs()) * s;
        let hp = h / 60.0;
        let x = c * (1.0 - ((hp % 2.0) - 1.0).abs());
        let (r, g, b) = match hp {
            hp if (0.0..1.0).contains(&hp) => (c, x, 0.0),
            hp if (1.0..2.0).contains(&hp) => (x, c, 0.0),
            hp if (2.0..3.0).contains(&hp) => (0.0, c, x),
            hp if (3.0..4.0).contains(&hp) => (0.0, x, c),
            hp if (4.0..5.0).contains(&hp) => (x, 0.0, c),
            hp if (5.0..6.0).contains(&hp) => (c, 0.0, x),
            _ => (0.0, 0.0, 0.0),
        };
        let m = l - c / 2.0;
        let to8 = |v: f64| ((v + m) * 255.0).round().clamp(0.0, 255.0) as u8;
        Self::new(to8(r), to8(g), to8(b))
    }
}

impl TryFrom<String> for Rgb {
    type Error = ColorError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Rgb::from_hex(&value)
    }
}

impl From<Rgb> for String {
    fn from(value: Rgb) -> Self {
        value.to_hex()
    }
}

impl std::fmt::Display for Rgb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

fn srgb_to_linear(c8: u8) -> f64 {
    let c = c8 as f64 / 255.0;
    if c <= 0.04045 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

pub fn contrast_ratio(l1: f64, l2: f64) -> f64 {
    let (max, min) = if l1 >= l2 { (l1, l2) } else { (l2, l1) };
    (max + 0.05) / (min + 0.05)
}

/// Shortest angular distance between two hues
pub fn hue_distance(h1: Option<f64>, h2: Option<f64>) -> Option<f64> {
    let diff = (h1? - h2?).abs();
    Some(diff.min(360.0 - diff))
}

/// Finds the color of the given hue and saturation (percent) whose contrast
/// against `background` is closest to `target`.
pub fn tune_for_contrast(hue_deg: f64, sat_pct: f64, target: f64, background: Rgb) -> Rgb {
    let s = sat_pct / 100.0;
    let bg_lum = background.relative_luminance();
    let (mut lo, mut hi) = (0.0_f64, 1.0_f64);
    let mut best = Rgb::BLACK;
    let mut best_diff = f64::INFINITY;

    for _ in 0..32 {
        let mid = (lo + hi) / 2.0;
        let candidate = Rgb::from_hsl(hue_deg, s, mid);
        let fg_lum = candidate.relative_luminance();
        let cr = contrast_ratio(fg_lum, bg_lum);
        let diff = (cr - target).abs();
        if diff < best_diff {
            best = candidate;
            best_diff = diff;
        }
        let brighter = fg_lum >= bg_lum;
        // too much contrast moves lightness toward the background
        if cr > target {
            if brighter { hi = mid } else { lo = mid }
        } else if brighter {
            lo = mid
        } else {
            hi = mid
        }
    }
    best
}

pub fn color_set(hues: &[f64], sat_pct: f64, target: f64, background: Rgb) -> Vec<Rgb> {
    hues.iter()
        .map(|&h| tune_for_contrast(h, sat_pct, target, background))
        .collect()
}
