use crate::config::DesignConfig;
use crate::counterbalance::{Assignment, ParticipantId};
use crate::palette::PaletteMetrics;
use chrono::{DateTime, Local};
use fast_core::{Phase, Rgb, Role, Shape, TrialLog};
use fast_timing::{CalibrationStats, NANOS_PER_MILLI};
use serde::Serialize;
use std::collections::BTreeMap;

/// Timestamp format for `meta.date` and per-trial times
pub const ISO_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";
const FILE_STAMP_FORMAT: &str = "%Y%m%dT%H%M%S";

/// Rounded arithmetic mean, `None` for an empty slice
pub fn mean_rounded(values: &[u64]) -> Option<u64> {
    if values.is_empty() {
        return None;
    }
    let sum: u64 = values.iter().sum();
    Some((sum as f64 / values.len() as f64).round() as u64)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Tally {
    pub n_trials: usize,
    pub correct: usize,
    pub incorrect: usize,
    #[serde(rename = "meanRtMs_correct")]
    pub mean_rt_ms_correct: Option<u64>,
    #[serde(rename = "meanRtMs_wrong")]
    pub mean_rt_ms_wrong: Option<u64>,
}

impl Tally {
    pub fn from_trials<'a>(trials: impl IntoIterator<Item = &'a TrialLog>) -> Self {
        let (correct, wrong): (Vec<&TrialLog>, Vec<&TrialLog>) =
            trials.into_iter().partition(|t| t.resp_correct);
        let rts = |ts: &[&TrialLog]| ts.iter().map(|t| t.rt_ms).collect::<Vec<_>>();
        Self {
            n_trials: correct.len() + wrong.len(),
            correct: correct.len(),
            incorrect: wrong.len(),
            mean_rt_ms_correct: mean_rounded(&rts(&correct)),
            mean_rt_ms_wrong: mean_rounded(&rts(&wrong)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhaseRoleTally {
    pub phase: Phase,
    pub role: Role,
    #[serde(flatten)]
    pub tally: Tally,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockRoleTally {
    pub block: usize,
    pub role: Role,
    #[serde(flatten)]
    pub tally: Tally,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub overall: Tally,
    pub by_phase_role: Vec<PhaseRoleTally>,
    pub by_block_role: Vec<BlockRoleTally>,
}

impl Summary {
    /// Groups follow `roles` order; groups without trials are left out.
    pub fn from_log(log: &[TrialLog], roles: &[Role], blocks: usize) -> Self {
        let mut by_phase_role = Vec::new();
        for phase in Phase::ALL {
            for &role in roles {
                let tally = Tally::from_trials(log.iter().filter(|t| t.phase == phase && t.role == role));
                if tally.n_trials > 0 {
                    by_phase_role.push(PhaseRoleTally { phase, role, tally });
                }
            }
        }

        let mut by_block_role = Vec::new();
        for block in 0..=blocks {
            for &role in roles {
                let tally = Tally::from_trials(log.iter().filter(|t| t.block == block && t.role == role));
                if tally.n_trials > 0 {
                    by_block_role.push(BlockRoleTally { block, role, tally });
                }
            }
        }

        Self {
            overall: Tally::from_trials(log),
            by_phase_role,
            by_block_role,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameTiming {
    pub samples: usize,
    pub average_frame_ms: f64,
    pub jitter_ms: f64,
    pub min_frame_ms: f64,
    pub max_frame_ms: f64,
    pub effective_fps: f64,
}

impl FrameTiming {
    /// `None` when no frames were recorded
    pub fn from_stats(stats: &CalibrationStats) -> Option<Self> {
        if stats.samples == 0 {
            return None;
        }
        let ms = |ns: f64| ns / NANOS_PER_MILLI as f64;
        Some(Self {
            samples: stats.samples,
            average_frame_ms: ms(stats.average_frame_time_ns),
            jitter_ms: ms(stats.jitter_ns),
            min_frame_ms: ms(stats.min_frame_time_ns),
            max_frame_ms: ms(stats.max_frame_time_ns),
            effective_fps: stats.effective_fps,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Meta {
    pub version: String,
    pub date: String,
    pub participant_id: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame_timing: Option<FrameTiming>,
    pub calibration: PaletteMetrics,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DesignSummary {
    /// Items drawn per display, the reserved slot included
    pub set_size: usize,
    pub blocks: usize,
    pub baseline_trials: usize,
    pub testing_trials: usize,
    pub mode: &'static str,
    pub color_pairs: Vec<[Rgb; 2]>,
    pub prob_schedule: BTreeMap<usize, BTreeMap<Role, f64>>,
}

impl DesignSummary {
    pub fn of(design: &DesignConfig) -> Self {
        Self {
            set_size: design.set_size + 1,
            blocks: design.blocks(),
            baseline_trials: design.baseline_total(),
            testing_trials: design.testing_total(),
            mode: "conjunction",
            color_pairs: (0..design.color_pairs.len())
                .filter_map(|i| design.pair_colors(i))
                .collect(),
            prob_schedule: design.prob_schedule(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentEntry {
    #[serde(rename = "pairIdx")]
    pub pair_index: usize,
    pub shape: Shape,
    pub color_hex: Rgb,
}

/// The exported session document
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultRecord {
    pub meta: Meta,
    pub design: DesignSummary,
    pub assignment: BTreeMap<Role, AssignmentEntry>,
    pub trials: Vec<TrialLog>,
    pub summary: Summary,
    #[serde(skip)]
    file_stamp: String,
}

impl ResultRecord {
    pub fn assemble(
        design: &DesignConfig,
        assignment: &Assignment,
        trials: Vec<TrialLog>,
        finished_at: DateTime<Local>,
        frame_timing: Option<FrameTiming>,
    ) -> Self {
        let participant: ParticipantId = assignment.participant();
        let entries = assignment
            .targets()
            .iter()
            .filter_map(|(role, t)| {
                let color_hex = *design.palette.get(t.color)?;
                Some((
                    *role,
                    AssignmentEntry {
                        pair_index: t.pair_index,
                        shape: t.shape,
                        color_hex,
                    },
                ))
            })
            .collect();
        let summary = Summary::from_log(&trials, &design.role_order(), design.blocks());

        Self {
            meta: Meta {
                version: design.version.clone(),
                date: finished_at.format(ISO_FORMAT).to_string(),
                participant_id: participant.get(),
                frame_timing,
                calibration: PaletteMetrics::for_design(design),
            },
            design: DesignSummary::of(design),
            assignment: entries,
            trials,
            summary,
            file_stamp: finished_at.format(FILE_STAMP_FORMAT).to_string(),
        }
    }

    /// `Subject{id}_{version}_{YYYYMMDDTHHMMSS}.json`
    pub fn suggested_filename(&self) -> String {
        format!(
            "Subject{}_{}_{}.json",
            self.meta.participant_id, self.meta.version, self.file_stamp
        )
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
