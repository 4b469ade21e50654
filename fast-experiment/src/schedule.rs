use crate::config::DesignConfig;
use crate::counterbalance::Assignment;
use crate::shuffle::shuffle;
use fast_core::{Condition, Role, TrialSpec};
use log::debug;
use rand::Rng;
use serde::Serialize;

/// Ordered trial list for one session: the shuffled baseline pool followed by
/// each testing block, shuffled within the block.
#[derive(Debug, Clone, PartialEq)]
pub struct Schedule {
    trials: Vec<TrialSpec>,
    baseline_len: usize,
    trials_per_block: usize,
    blocks: usize,
}

impl Schedule {
    pub fn len(&self) -> usize {
        self.trials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trials.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&TrialSpec> {
        self.trials.get(index)
    }

    pub fn trials(&self) -> &[TrialSpec] {
        &self.trials
    }

    pub fn iter(&self) -> impl Iterator<Item = &TrialSpec> {
        self.trials.iter()
    }

    pub fn baseline(&self) -> &[TrialSpec] {
        &self.trials[..self.baseline_len]
    }

    pub fn baseline_len(&self) -> usize {
        self.baseline_len
    }

    pub fn blocks(&self) -> usize {
        self.blocks
    }

    /// Rows of testing block `block` (1-based); empty when out of range.
    pub fn block(&self, block: usize) -> &[TrialSpec] {
        if block == 0 || block > self.blocks {
            return &[];
        }
        let start = self.baseline_len + (block - 1) * self.trials_per_block;
        &self.trials[start..start + self.trials_per_block]
    }
}

/// Present rows of a block of `n` trials at probability `p`.
pub fn present_count(n: usize, p: f64) -> usize {
    ((n as f64 * p).round() as usize).min(n)
}

pub fn build_schedule<R: Rng + ?Sized>(design: &DesignConfig, assignment: &Assignment, rng: &mut R) -> Schedule {
    let row = |has_target: bool, condition: Condition, pair_index: usize, block: usize| TrialSpec {
        set_size: design.set_size,
        has_target,
        condition,
        pair_index,
        block,
    };

    let mut baseline = Vec::with_capacity(design.baseline_total());
    for (_, target) in assignment.targets() {
        for has_target in [true, false] {
            baseline.extend(
                std::iter::repeat_n(row(has_target, Condition::Baseline, target.pair_index, 0), design.baseline_present_per_role),
            );
        }
    }
    shuffle(&mut baseline, rng);

    let n = design.trials_per_role_block;
    let mut trials = baseline;
    for block in 1..=design.blocks() {
        let mut rows = Vec::with_capacity(design.trials_per_block());
        for (role, target) in assignment.targets() {
            let p = design.probability(*role, block).unwrap_or(0.0);
            let present = present_count(n, p);
            let condition = Condition::Role(*role);
            rows.extend(std::iter::repeat_n(row(true, condition, target.pair_index, block), present));
            rows.extend(std::iter::repeat_n(row(false, condition, target.pair_index, block), n - present));
        }
        shuffle(&mut rows, rng);
        trials.extend(rows);
    }

    debug!(
        "built schedule for participant {}: {} trials ({} baseline, {} blocks)",
        assignment.participant(),
        trials.len(),
        design.baseline_total(),
        design.blocks()
    );
    Schedule {
        trials,
        baseline_len: design.baseline_total(),
        trials_per_block: design.trials_per_block(),
        blocks: design.blocks(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetRow {
    pub role: Role,
    pub pair_index: usize,
    pub shape: fast_core::Shape,
    pub color: String,
    pub alt_color: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BaselineRow {
    pub pair_index: usize,
    pub role: Role,
    pub present: usize,
    pub absent: usize,
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockRow {
    pub block: usize,
    pub role: Role,
    pub p: f64,
    pub present: usize,
    pub absent: usize,
    pub total: usize,
    /// Realized present fraction, two decimals
    pub present_fraction: f64,
}

/// Counterbalance and composition overview, logged when a session starts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScheduleSummary {
    pub participant: u32,
    pub targets: Vec<TargetRow>,
    pub baseline: Vec<BaselineRow>,
    pub blocks: Vec<BlockRow>,
    pub preview: Vec<TrialSpec>,
}

impl ScheduleSummary {
    const PREVIEW_LEN: usize = 24;

    pub fn from_schedule(design: &DesignConfig, assignment: &Assignment, schedule: &Schedule) -> Self {
        let hex = |idx: usize| design.palette.get(idx).map(|c| c.to_hex()).unwrap_or_default();
        let targets = assignment
            .targets()
            .iter()
            .map(|(role, t)| {
                let alt = design
                    .color_pairs
                    .get(t.pair_index)
                    .and_then(|pair| crate::counterbalance::other_color_in_pair(*pair, t.color));
                TargetRow {
                    role: *role,
                    pair_index: t.pair_index,
                    shape: t.shape,
                    color: hex(t.color),
                    alt_color: alt.map(hex).unwrap_or_default(),
                }
            })
            .collect();

        let baseline = assignment
            .targets()
            .iter()
            .map(|(role, t)| {
                let rows = schedule.baseline().iter().filter(|s| s.pair_index == t.pair_index);
                let (present, total) = rows.fold((0, 0), |(p, n), s| (p + s.has_target as usize, n + 1));
                BaselineRow {
                    pair_index: t.pair_index,
                    role: *role,
                    present,
                    absent: total - present,
                    total,
                }
            })
            .collect();

        let mut blocks = Vec::new();
        for block in 1..=schedule.blocks() {
            for (role, _) in assignment.targets() {
                let rows = schedule
                    .block(block)
                    .iter()
                    .filter(|s| s.condition.role() == Some(*role));
                let (present, total) = rows.fold((0, 0), |(p, n), s| (p + s.has_target as usize, n + 1));
                let present_fraction = if total > 0 {
                    (present as f64 / total as f64 * 100.0).round() / 100.0
                } else {
                    0.0
                };
                blocks.push(BlockRow {
                    block,
                    role: *role,
                    p: design.probability(*role, block).unwrap_or(0.0),
                    present,
                    absent: total - present,
                    total,
                    present_fraction,
                });
            }
        }

        Self {
            participant: assignment.participant().get(),
            targets,
            baseline,
            blocks,
            preview: schedule.iter().take(Self::PREVIEW_LEN).copied().collect(),
        }
    }

    pub fn log(&self) {
        debug!("counterbalance for participant {}", self.participant);
        for t in &self.targets {
            debug!(
                "  {:<8} pair {} {} {} (alt {})",
                t.role, t.pair_index, t.shape, t.color, t.alt_color
            );
        }
        for b in &self.baseline {
            debug!(
                "  baseline pair {} ({}): {} present / {} absent",
                b.pair_index, b.role, b.present, b.absent
            );
        }
        for b in &self.blocks {
            debug!(
                "  block {:>2} {:<8} p={:.1} present {:>2} absent {:>2} ({:.2})",
                b.block, b.role, b.p, b.present, b.absent, b.present_fraction
            );
        }
        for (i, s) in self.preview.iter().enumerate() {
            debug!(
                "  #{:<3} block {:>2} {:<8} pair {} {}",
                i,
                s.block,
                s.condition.label(),
                s.pair_index,
                if s.has_target { "present" } else { "absent" }
            );
        }
    }
}
