use crate::counterbalance::FixedTarget;
use crate::stimulus::Stimulus;
use fast_core::{Role, TrialSpec};

/// The trial currently on screen
#[derive(Debug, Clone)]
pub struct ActiveTrial<T> {
    pub index: usize,
    pub spec: TrialSpec,
    pub role: Role,
    pub target: FixedTarget,
    pub stimulus: Stimulus,
    pub timestamps: TrialTimestamps<T>,
}

#[derive(Debug, Clone)]
pub struct TrialTimestamps<T> {
    /// Monotonic time the stimulus finished drawing; RT is measured from here
    pub stimulus_drawn: T,
    pub response: Option<T>,
    /// Wall-clock ISO time matching `stimulus_drawn`
    pub start_time: String,
}
