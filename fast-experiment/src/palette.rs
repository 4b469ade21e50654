//! Perceptual checks on a design's palette, logged at session start and
//! attached to the result header.

use crate::config::DesignConfig;
use fast_core::Rgb;
use fast_core::color::{contrast_ratio, hue_distance};
use log::{debug, warn};
use serde::Serialize;

fn round_to(value: f64, places: i32) -> f64 {
    let scale = 10f64.powi(places);
    (value * scale).round() / scale
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ColorInfo {
    pub index: Option<usize>,
    pub hex: Rgb,
    pub luminance: f64,
    pub hue_deg: Option<f64>,
    pub contrast_vs_bg: f64,
}

impl ColorInfo {
    fn measure(index: Option<usize>, color: Rgb, background: Rgb) -> Self {
        let luminance = color.relative_luminance();
        Self {
            index,
            hex: color,
            luminance: round_to(luminance, 6),
            hue_deg: color.hue_deg().map(|h| round_to(h, 2)),
            contrast_vs_bg: round_to(contrast_ratio(luminance, background.relative_luminance()), 4),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PairInfo {
    pub pair_index: usize,
    pub a: ColorInfo,
    pub b: ColorInfo,
    pub luminance_contrast: f64,
    pub hue_distance_deg: Option<f64>,
    pub delta_e: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Stats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub variance: f64,
}

impl Stats {
    pub fn of(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        Some(Self {
            min: round_to(values.iter().copied().fold(f64::INFINITY, f64::min), 4),
            max: round_to(values.iter().copied().fold(f64::NEG_INFINITY, f64::max), 4),
            mean: round_to(mean, 4),
            variance: round_to(variance, 6),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSummary {
    pub luminance: Option<Stats>,
    pub contrast_vs_bg: Option<Stats>,
    pub pair_luminance_contrast: Option<Stats>,
    /// Achromatic pairs count as 0 degrees apart
    pub pair_hue_distance_deg: Option<Stats>,
    pub delta_e: Option<Stats>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaletteMetrics {
    pub background: ColorInfo,
    pub per_color: Vec<ColorInfo>,
    pub per_pair: Vec<PairInfo>,
    pub summary: MetricsSummary,
}

impl PaletteMetrics {
    pub fn compute(palette: &[Rgb], background: Rgb, pairs: &[[usize; 2]]) -> Self {
        let per_color: Vec<ColorInfo> = palette
            .iter()
            .enumerate()
            .map(|(i, &c)| ColorInfo::measure(Some(i), c, background))
            .collect();

        let per_pair: Vec<PairInfo> = pairs
            .iter()
            .enumerate()
            .filter_map(|(pair_index, &[a, b])| {
                let (ca, cb) = (*palette.get(a)?, *palette.get(b)?);
                Some(PairInfo {
                    pair_index,
                    a: ColorInfo::measure(Some(a), ca, background),
                    b: ColorInfo::measure(Some(b), cb, background),
                    luminance_contrast: round_to(ca.contrast_with(&cb), 4),
                    hue_distance_deg: hue_distance(ca.hue_deg(), cb.hue_deg()).map(|d| round_to(d, 2)),
                    delta_e: round_to(ca.delta_e(&cb), 2),
                })
            })
            .collect();

        let collect = |f: &dyn Fn(&PairInfo) -> f64| per_pair.iter().map(f).collect::<Vec<_>>();
        let summary = MetricsSummary {
            luminance: Stats::of(&per_color.iter().map(|c| c.luminance).collect::<Vec<_>>()),
            contrast_vs_bg: Stats::of(&per_color.iter().map(|c| c.contrast_vs_bg).collect::<Vec<_>>()),
            pair_luminance_contrast: Stats::of(&collect(&|p| p.luminance_contrast)),
            pair_hue_distance_deg: Stats::of(&collect(&|p| p.hue_distance_deg.unwrap_or(0.0))),
            delta_e: Stats::of(&collect(&|p| p.delta_e)),
        };

        Self {
            background: ColorInfo::measure(None, background, background),
            per_color,
            per_pair,
            summary,
        }
    }

    pub fn for_design(design: &DesignConfig) -> Self {
        Self::compute(&design.palette, design.background, &design.color_pairs)
    }

    pub fn log(&self) {
        debug!(
            "background {} luminance {:.4}",
            self.background.hex, self.background.luminance
        );
        for c in &self.per_color {
            debug!(
                "  color {} lum {:.4} hue {:?} vs bg {:.2}",
                c.hex, c.luminance, c.hue_deg, c.contrast_vs_bg
            );
        }
        for p in &self.per_pair {
            debug!(
                "  pair {} {}/{}: lum contrast {:.3}, hue distance {:?}, dE {:.1}",
                p.pair_index, p.a.hex, p.b.hex, p.luminance_contrast, p.hue_distance_deg, p.delta_e
            );
            // pair colors should be separable by hue alone
            if p.luminance_contrast > 1.5 {
                warn!(
                    "pair {} differs in luminance (contrast {:.2}), search may be solvable by brightness",
                    p.pair_index, p.luminance_contrast
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn fast_palette_metrics() {
        let metrics = PaletteMetrics::for_design(&DesignConfig::fast());
        assert_eq!(metrics.per_color.len(), 6);
        assert_eq!(metrics.per_pair.len(), 3);
        assert_eq!(metrics.background.hue_deg, None);
        assert_relative_eq!(metrics.background.contrast_vs_bg, 1.0);

        let red_teal = &metrics.per_pair[0];
        assert_eq!((red_teal.a.index, red_teal.b.index), (Some(0), Some(3)));
        let hue = red_teal.hue_distance_deg.unwrap();
        assert!((hue - 180.0).abs() < 2.0, "{hue}");
        assert!(red_teal.delta_e > 0.0);
        assert!(metrics.summary.delta_e.is_some());
    }

    #[test]
    fn stats_over_values() {
        let s = Stats::of(&[1.0, 2.0, 3.0, 4.0]).unwrap();
        assert_relative_eq!(s.min, 1.0);
        assert_relative_eq!(s.max, 4.0);
        assert_relative_eq!(s.mean, 2.5);
        assert_relative_eq!(s.variance, 1.25);
        assert!(Stats::of(&[]).is_none());
    }

    #[test]
    fn pairs_with_bad_indices_are_skipped() {
        let palette = [Rgb::new(200, 0, 0), Rgb::new(0, 200, 200)];
        let metrics = PaletteMetrics::compute(&palette, Rgb::WHITE, &[[0, 1], [0, 5]]);
        assert_eq!(metrics.per_pair.len(), 1);
    }
}
