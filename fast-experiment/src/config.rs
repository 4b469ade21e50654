use crate::error::ConfigError;
use fast_core::{Rgb, Role, Shape};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;

/// What selects the color pair a cohort member starts from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PairBasis {
    /// `(cohort group) % pairs`: every member of a cohort shares the pair
    #[default]
    Cohort,
    /// `(participant id - 1) % pairs`
    Participant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleConfig {
    pub role: Role,
    /// Added to the base pair so roles never share a color pair
    pub pair_rotation: usize,
    /// Target shape by cohort position
    pub shape_sequence: Vec<Shape>,
    /// Replaces `shape_sequence` for the second half of the cohort groups
    #[serde(default)]
    pub late_shape_sequence: Option<Vec<Shape>>,
    /// Target-present probability for testing blocks 1..=K
    pub present_probability: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GridConfig {
    pub canvas_width: u32,
    pub canvas_height: u32,
    pub cols: usize,
    pub rows: usize,
    pub object_size: f32,
    pub jitter: f32,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            canvas_width: 600,
            canvas_height: 600,
            cols: 8,
            rows: 6,
            object_size: 45.0,
            jitter: 8.0,
        }
    }
}

impl GridConfig {
    pub fn cell_count(&self) -> usize {
        self.cols * self.rows
    }

    pub fn tile_width(&self) -> f32 {
        self.canvas_width as f32 / self.cols as f32
    }

    pub fn tile_height(&self) -> f32 {
        self.canvas_height as f32 / self.rows as f32
    }

    /// Center of grid cell `id`, counted row-major from the top left.
    pub fn cell_center(&self, id: usize) -> (f32, f32) {
        let col = (id % self.cols) as f32;
        let row = (id / self.cols) as f32;
        let (tw, th) = (self.tile_width(), self.tile_height());
        ((tw / 2.0).round() + tw * col, (th / 2.0).round() + th * row)
    }
}

/// One countdown sub-display; `text: None` clears the screen
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CountdownCue {
    pub at_ms: u64,
    pub text: Option<String>,
}

impl CountdownCue {
    fn show(at_ms: u64, text: &str) -> Self {
        Self {
            at_ms,
            text: Some(text.to_string()),
        }
    }

    fn clear(at_ms: u64) -> Self {
        Self { at_ms, text: None }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TimingConfig {
    pub countdown: Vec<CountdownCue>,
    /// Offset at which the countdown hands over to the stimulus
    pub countdown_done_ms: u64,
    pub feedback_text_ms: u64,
    pub feedback_clear_ms: u64,
    pub advance_ms: u64,
    pub text_size_px: f32,
    pub text_color: Rgb,
    pub correct_text: String,
    pub wrong_text: String,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            countdown: vec![
                CountdownCue::show(200, "3"),
                CountdownCue::clear(900),
                CountdownCue::show(1200, "2"),
                CountdownCue::clear(1900),
                CountdownCue::show(2200, "1"),
                CountdownCue::clear(2900),
            ],
            countdown_done_ms: 3200,
            feedback_text_ms: 100,
            feedback_clear_ms: 600,
            advance_ms: 900,
            text_size_px: 120.0,
            text_color: Rgb::BLACK,
            correct_text: "correct".to_string(),
            wrong_text: "wrong".to_string(),
        }
    }
}

/// Full description of one experiment variant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DesignConfig {
    pub version: String,
    pub roles: Vec<RoleConfig>,
    pub palette: Vec<Rgb>,
    pub color_pairs: Vec<[usize; 2]>,
    pub background: Rgb,
    /// Distractors per trial; one more cell is reserved for the target slot
    pub set_size: usize,
    /// Baseline has this many present and as many absent rows per role
    pub baseline_present_per_role: usize,
    pub trials_per_role_block: usize,
    pub cohort_size: usize,
    pub participant_limit: u32,
    #[serde(default)]
    pub pair_basis: PairBasis,
    #[serde(default)]
    pub pair_offset: usize,
    /// Testing blocks after which a countdown is shown; 0 is the end of baseline
    pub countdown_after_blocks: Vec<usize>,
    #[serde(default)]
    pub grid: GridConfig,
    #[serde(default)]
    pub timing: TimingConfig,
}

const HI_LO: [f64; 5] = [0.9, 0.7, 0.5, 0.3, 0.1];
const LO_HI: [f64; 5] = [0.1, 0.3, 0.5, 0.7, 0.9];

fn concat(parts: &[&[f64]]) -> Vec<f64> {
    parts.iter().flat_map(|p| p.iter().copied()).collect()
}

const fn rgb(hex: u32) -> Rgb {
    Rgb::new((hex >> 16) as u8, (hex >> 8) as u8, hex as u8)
}

const GREY_BACKGROUND: Rgb = Rgb::new(0xBC, 0xBC, 0xBC);

use Shape::{Circle as C, Square as S};

impl DesignConfig {
    /// Three roles, ten testing blocks, six-color palette
    pub fn fast() -> Self {
        Self {
            version: "FAST".to_string(),
            roles: vec![
                RoleConfig {
                    role: Role::Ex,
                    pair_rotation: 0,
                    shape_sequence: vec![S, S, C, C],
                    late_shape_sequence: None,
                    present_probability: concat(&[&HI_LO, &LO_HI]),
                },
                RoleConfig {
                    role: Role::New,
                    pair_rotation: 1,
                    shape_sequence: vec![C, C, S, S],
                    late_shape_sequence: None,
                    present_probability: concat(&[&LO_HI, &HI_LO]),
                },
                RoleConfig {
                    role: Role::Neutral,
                    pair_rotation: 2,
                    shape_sequence: vec![S, S, C, C],
                    late_shape_sequence: Some(vec![C, C, S, S]),
                    present_probability: vec![0.5; 10],
                },
            ],
            palette: vec![
                rgb(0xC15B5B),
                rgb(0x7E7E30),
                rgb(0x358B35),
                rgb(0x338686),
                rgb(0x7171C9),
                rgb(0xBC4DBC),
            ],
            color_pairs: vec![[0, 3], [1, 4], [2, 5]],
            background: GREY_BACKGROUND,
            set_size: 31,
            baseline_present_per_role: 40,
            trials_per_role_block: 16,
            cohort_size: 4,
            participant_limit: 24,
            pair_basis: PairBasis::Cohort,
            pair_offset: 0,
            countdown_after_blocks: vec![0, 5],
            grid: GridConfig::default(),
            timing: TimingConfig::default(),
        }
    }

    fn two_role(version: &str, palette: [Rgb; 4], ex: RoleConfig, new: RoleConfig, pair_offset: usize) -> Self {
        Self {
            version: version.to_string(),
            roles: vec![ex, new],
            palette: palette.to_vec(),
            color_pairs: vec![[0, 2], [1, 3]],
            background: GREY_BACKGROUND,
            set_size: 31,
            baseline_present_per_role: 40,
            trials_per_role_block: 16,
            cohort_size: 4,
            participant_limit: 24,
            pair_basis: PairBasis::Participant,
            pair_offset,
            countdown_after_blocks: vec![0, 5, 10],
            grid: GridConfig::default(),
            timing: TimingConfig::default(),
        }
    }

    /// Two roles, fifteen blocks; `new` stays rare while `ex` ramps first
    pub fn fast_2r_15b_cc() -> Self {
        Self::two_role(
            "FAST_2R_15B_CC",
            [rgb(0xB72E2E), rgb(0x446D1B), rgb(0x1B6D6D), rgb(0x8439CE)],
            RoleConfig {
                role: Role::Ex,
                pair_rotation: 0,
                shape_sequence: vec![C, C, S, S],
                late_shape_sequence: None,
                present_probability: concat(&[&HI_LO, &LO_HI, &[0.1; 5]]),
            },
            RoleConfig {
                role: Role::New,
                pair_rotation: 1,
                shape_sequence: vec![S, S, C, C],
                late_shape_sequence: None,
                present_probability: concat(&[&[0.1; 5], &LO_HI, &HI_LO]),
            },
            0,
        )
    }

    /// Two roles, fifteen blocks, ending on a flat 0.5 phase
    pub fn fast_2r_15b_tc() -> Self {
        Self::two_role(
            "FAST_2R_15B_TC",
            [rgb(0x76601D), rgb(0x1C7131), rgb(0x3359CC), rgb(0xAB2B8B)],
            RoleConfig {
                role: Role::Ex,
                pair_rotation: 0,
                shape_sequence: vec![S, S, C, C],
                late_shape_sequence: None,
                present_probability: concat(&[&HI_LO, &LO_HI, &[0.5; 5]]),
            },
            RoleConfig {
                role: Role::New,
                pair_rotation: 1,
                shape_sequence: vec![C, C, S, S],
                late_shape_sequence: None,
                present_probability: concat(&[&LO_HI, &HI_LO, &[0.5; 5]]),
            },
            1,
        )
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let design: Self = serde_json::from_str(json)?;
        design.validate()?;
        Ok(design)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    pub fn blocks(&self) -> usize {
        self.roles
            .first()
            .map_or(0, |r| r.present_probability.len())
    }

    pub fn role_order(&self) -> Vec<Role> {
        self.roles.iter().map(|r| r.role).collect()
    }

    pub fn role_config(&self, role: Role) -> Option<&RoleConfig> {
        self.roles.iter().find(|r| r.role == role)
    }

    pub fn baseline_total(&self) -> usize {
        self.baseline_present_per_role * 2 * self.roles.len()
    }

    pub fn trials_per_block(&self) -> usize {
        self.trials_per_role_block * self.roles.len()
    }

    pub fn testing_total(&self) -> usize {
        self.trials_per_block() * self.blocks()
    }

    pub fn total_trials(&self) -> usize {
        self.baseline_total() + self.testing_total()
    }

    pub fn group_count(&self) -> usize {
        (self.participant_limit as usize / self.cohort_size.max(1)).max(1)
    }

    /// Schedule indices that are preceded by a countdown, ascending.
    pub fn countdown_landmarks(&self) -> Vec<usize> {
        let mut landmarks = vec![0];
        landmarks.extend(
            self.countdown_after_blocks
                .iter()
                .map(|b| self.baseline_total() + b * self.trials_per_block()),
        );
        landmarks.sort_unstable();
        landmarks.dedup();
        landmarks
    }

    /// Present probability of `role` in testing block `block` (1-based).
    pub fn probability(&self, role: Role, block: usize) -> Option<f64> {
        let index = block.checked_sub(1)?;
        self.role_config(role)?.present_probability.get(index).copied()
    }

    /// `block -> role -> p`, the shape exported in the result document
    pub fn prob_schedule(&self) -> BTreeMap<usize, BTreeMap<Role, f64>> {
        (1..=self.blocks())
            .map(|block| {
                let per_role = self
                    .roles
                    .iter()
                    .filter_map(|r| Some((r.role, r.present_probability.get(block - 1).copied()?)))
                    .collect();
                (block, per_role)
            })
            .collect()
    }

    pub fn pair_colors(&self, pair_index: usize) -> Option<[Rgb; 2]> {
        let [a, b] = *self.color_pairs.get(pair_index)?;
        Some([*self.palette.get(a)?, *self.palette.get(b)?])
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.roles.is_empty() {
            return Err(ConfigError::NoRoles);
        }
        if self.cohort_size == 0 {
            return Err(ConfigError::CohortSize);
        }
        if (self.participant_limit as usize) < self.cohort_size {
            return Err(ConfigError::ParticipantLimit {
                limit: self.participant_limit,
                cohort: self.cohort_size,
            });
        }
        if self.set_size == 0 {
            return Err(ConfigError::EmptySetSize);
        }
        if self.grid.cell_count() < self.set_size + 1 {
            return Err(ConfigError::GridTooSmall {
                cells: self.grid.cell_count(),
                needed: self.set_size + 1,
            });
        }

        if self.color_pairs.is_empty() {
            return Err(ConfigError::NoColorPairs);
        }
        let mut used = vec![false; self.palette.len()];
        for (pair, slots) in self.color_pairs.iter().enumerate() {
            for &index in slots {
                let slot = used.get_mut(index).ok_or(ConfigError::PaletteIndex {
                    pair,
                    index,
                    len: self.palette.len(),
                })?;
                if *slot {
                    return Err(ConfigError::PaletteReuse(index));
                }
                *slot = true;
            }
        }

        let blocks = self.blocks();
        let pairs = self.color_pairs.len();
        for (i, rc) in self.roles.iter().enumerate() {
            if let Some(other) = self.roles[..i].iter().find(|o| o.role == rc.role) {
                return Err(ConfigError::DuplicateRole(other.role));
            }
            if rc.present_probability.len() != blocks {
                return Err(ConfigError::ProbabilityLength {
                    role: rc.role,
                    expected: blocks,
                    found: rc.present_probability.len(),
                });
            }
            if let Some((b, &p)) = rc
                .present_probability
                .iter()
                .enumerate()
                .find(|(_, p)| !(0.0..=1.0).contains(*p))
            {
                return Err(ConfigError::ProbabilityOutOfRange {
                    role: rc.role,
                    block: b + 1,
                    p,
                });
            }
            let sequences = std::iter::once(&rc.shape_sequence).chain(rc.late_shape_sequence.as_ref());
            for seq in sequences {
                if seq.len() != self.cohort_size {
                    return Err(ConfigError::ShapeSequenceLength {
                        role: rc.role,
                        expected: self.cohort_size,
                        found: seq.len(),
                    });
                }
            }
            if rc.pair_rotation >= pairs {
                return Err(ConfigError::PairRotation {
                    role: rc.role,
                    rotation: rc.pair_rotation,
                    pairs,
                });
            }
            if let Some(other) = self.roles[..i]
                .iter()
                .find(|o| o.pair_rotation == rc.pair_rotation)
            {
                return Err(ConfigError::RotationCollision {
                    role: rc.role,
                    other: other.role,
                });
            }
        }

        if let Some(&block) = self.countdown_after_blocks.iter().find(|&&b| b > blocks) {
            return Err(ConfigError::CountdownBlock { block, blocks });
        }
        Ok(())
    }
}

impl Default for DesignConfig {
    fn default() -> Self {
        Self::fast()
    }
}

/// Named designs selectable from the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DesignPreset {
    #[default]
    Fast,
    TwoRoleCc,
    TwoRoleTc,
}

impl DesignPreset {
    pub const ALL: [DesignPreset; 3] = [DesignPreset::Fast, DesignPreset::TwoRoleCc, DesignPreset::TwoRoleTc];

    pub fn name(self) -> &'static str {
        match self {
            DesignPreset::Fast => "fast-3r-10b",
            DesignPreset::TwoRoleCc => "fast-2r-15b-cc",
            DesignPreset::TwoRoleTc => "fast-2r-15b-tc",
        }
    }

    pub fn design(self) -> DesignConfig {
        match self {
            DesignPreset::Fast => DesignConfig::fast(),
            DesignPreset::TwoRoleCc => DesignConfig::fast_2r_15b_cc(),
            DesignPreset::TwoRoleTc => DesignConfig::fast_2r_15b_tc(),
        }
    }
}

impl FromStr for DesignPreset {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|p| p.name() == wanted)
            .ok_or_else(|| ConfigError::UnknownPreset(s.to_string()))
    }
}

impl std::fmt::Display for DesignPreset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_are_valid() {
        for preset in DesignPreset::ALL {
            preset.design().validate().unwrap();
        }
    }

    #[test]
    fn fast_trial_counts() {
        let d = DesignConfig::fast();
        assert_eq!(d.blocks(), 10);
        assert_eq!(d.baseline_total(), 240);
        assert_eq!(d.trials_per_block(), 48);
        assert_eq!(d.total_trials(), 720);
        assert_eq!(d.countdown_landmarks(), vec![0, 240, 480]);
        assert_eq!(d.group_count(), 6);
    }

    #[test]
    fn two_role_landmarks() {
        let d = DesignConfig::fast_2r_15b_cc();
        assert_eq!(d.baseline_total(), 160);
        assert_eq!(d.total_trials(), 160 + 15 * 32);
        assert_eq!(d.countdown_landmarks(), vec![0, 160, 320, 480]);
    }

    #[test]
    fn probability_lookup_is_one_based() {
        let d = DesignConfig::fast_2r_15b_cc();
        assert_eq!(d.probability(Role::Ex, 1), Some(0.9));
        assert_eq!(d.probability(Role::New, 15), Some(0.1));
        assert_eq!(d.probability(Role::Ex, 0), None);
        assert_eq!(d.probability(Role::Neutral, 1), None);
        let schedule = d.prob_schedule();
        assert_eq!(schedule.len(), 15);
        assert_eq!(schedule[&11][&Role::New], 0.9);
    }

    #[test]
    fn cell_centers_match_tile_layout() {
        let grid = GridConfig::default();
        assert_eq!(grid.cell_count(), 48);
        assert_eq!(grid.cell_center(0), (38.0, 50.0));
        assert_eq!(grid.cell_center(9), (38.0 + 75.0, 150.0));
        assert_eq!(grid.cell_center(47), (38.0 + 7.0 * 75.0, 550.0));
    }

    #[test]
    fn validation_catches_broken_designs() {
        let mut d = DesignConfig::fast();
        d.set_size = 48;
        assert!(matches!(d.validate(), Err(ConfigError::GridTooSmall { needed: 49, .. })));

        let mut d = DesignConfig::fast();
        d.roles[1].present_probability.pop();
        assert!(matches!(d.validate(), Err(ConfigError::ProbabilityLength { role: Role::New, .. })));

        let mut d = DesignConfig::fast();
        d.roles[2].pair_rotation = 0;
        assert!(matches!(d.validate(), Err(ConfigError::RotationCollision { .. })));

        let mut d = DesignConfig::fast();
        d.color_pairs[1] = [1, 3];
        assert!(matches!(d.validate(), Err(ConfigError::PaletteReuse(3))));

        let mut d = DesignConfig::fast();
        d.roles[0].late_shape_sequence = Some(vec![Shape::Square]);
        assert!(matches!(d.validate(), Err(ConfigError::ShapeSequenceLength { .. })));

        let mut d = DesignConfig::fast();
        d.countdown_after_blocks.push(11);
        assert!(matches!(d.validate(), Err(ConfigError::CountdownBlock { block: 11, .. })));
    }

    #[test]
    fn design_round_trips_through_json() {
        let d = DesignConfig::fast_2r_15b_tc();
        let json = serde_json::to_string(&d).unwrap();
        let back = DesignConfig::from_json_str(&json).unwrap();
        assert_eq!(back, d);
    }

    #[test]
    fn minimal_json_design_uses_default_grid_and_timing() {
        let json = r##"{
            "version": "PILOT",
            "roles": [{
                "role": "ex", "pairRotation": 0,
                "shapeSequence": ["square", "circle"],
                "presentProbability": [0.5, 0.25]
            }],
            "palette": ["#FF0000", "#00FFFF"],
            "colorPairs": [[0, 1]],
            "background": "#BCBCBC",
            "setSize": 11,
            "baselinePresentPerRole": 2,
            "trialsPerRoleBlock": 4,
            "cohortSize": 2,
            "participantLimit": 4,
            "countdownAfterBlocks": [0]
        }"##;
        let d = DesignConfig::from_json_str(json).unwrap();
        assert_eq!(d.grid, GridConfig::default());
        assert_eq!(d.timing.countdown_done_ms, 3200);
        assert_eq!(d.pair_basis, PairBasis::Cohort);
        assert_eq!(d.countdown_landmarks(), vec![0, 4]);
    }

    #[test]
    fn malformed_palette_color_is_rejected() {
        let mut json = serde_json::to_value(DesignConfig::fast_2r_15b_cc()).unwrap();
        json["palette"][1] = serde_json::Value::from("#44GG1B");
        let err = DesignConfig::from_json_str(&json.to_string()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)), "{err}");
    }

    #[test]
    fn preset_palettes_keep_every_color() {
        assert_eq!(DesignConfig::fast().palette.len(), 6);
        assert_eq!(DesignConfig::fast().palette[0].to_hex(), "#C15B5B");
        assert_eq!(DesignConfig::fast_2r_15b_cc().palette[3].to_hex(), "#8439CE");
        assert_eq!(DesignConfig::fast_2r_15b_tc().palette[1].to_hex(), "#1C7131");
    }

    #[test]
    fn preset_names_parse() {
        assert_eq!("fast-3r-10b".parse::<DesignPreset>().unwrap(), DesignPreset::Fast);
        assert_eq!("FAST-2R-15B-TC".parse::<DesignPreset>().unwrap(), DesignPreset::TwoRoleTc);
        assert!("fast-4r".parse::<DesignPreset>().is_err());
    }
}
