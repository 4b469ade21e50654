use crate::color::Rgb;
use crate::phase::Phase;
use crate::stimulus::Shape;
use serde::{Deserialize, Serialize, Serializer};

/// Experimental condition a participant is assigned to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Ex,
    New,
    Neutral,
}

impl Role {
    pub fn name(self) -> &'static str {
        match self {
            Role::Ex => "ex",
            Role::New => "new",
            Role::Neutral => "neutral",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// What a scheduled row is tagged with. Baseline rows only carry their pair
/// and are resolved back to a role when they are run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Condition {
    Baseline,
    Role(Role),
}

impl Condition {
    pub fn label(&self) -> &'static str {
        match self {
            Condition::Baseline => "baseline",
            Condition::Role(role) => role.name(),
        }
    }

    pub fn role(&self) -> Option<Role> {
        match self {
            Condition::Baseline => None,
            Condition::Role(role) => Some(*role),
        }
    }
}

impl Serialize for Condition {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

/// One row of the schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrialSpec {
    /// Distractor count; `set_size + 1` cells are always drawn.
    pub set_size: usize,
    pub has_target: bool,
    pub condition: Condition,
    pub pair_index: usize,
    /// 0 = baseline, 1..=K testing
    pub block: usize,
}

impl TrialSpec {
    pub fn phase(&self) -> Phase {
        Phase::from_block(self.block)
    }
}

/// Binary answer from the input collaborator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Response {
    Absent,
    Present,
}

impl Response {
    pub fn is_present(self) -> bool {
        matches!(self, Response::Present)
    }

    pub fn from_present(present: bool) -> Self {
        if present {
            Response::Present
        } else {
            Response::Absent
        }
    }
}

/// Visible state of the trial state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrialState {
    #[default]
    Idle,
    Countdown,
    AwaitingResponse,
    Feedback,
    Finished,
    Cancelled,
}

impl TrialState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TrialState::Finished | TrialState::Cancelled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DistractorCounts {
    #[serde(rename = "sameShape_otherColor")]
    pub same_shape_other_color: usize,
    #[serde(rename = "otherShape_sameColor")]
    pub other_shape_same_color: usize,
}

impl DistractorCounts {
    pub fn total(&self) -> usize {
        self.same_shape_other_color + self.other_shape_same_color
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScreenPoint {
    pub x: f32,
    pub y: f32,
}

/// Executed trial, appended once and never changed
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrialLog {
    pub index: usize,
    pub phase: Phase,
    pub block: usize,
    pub role: Role,
    pub has_target: bool,
    pub resp_has_target: bool,
    pub resp_correct: bool,
    pub rt_ms: u64,
    pub start_time: String,
    pub answer_time: String,
    pub target_shape: Shape,
    pub target_color_hex: Option<Rgb>,
    #[serde(rename = "targetXY")]
    pub target_xy: Option<ScreenPoint>,
    pub distractors: DistractorCounts,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn condition_serializes_as_label() {
        let spec = TrialSpec {
            set_size: 31,
            has_target: true,
            condition: Condition::Baseline,
            pair_index: 1,
            block: 0,
        };
        let json = serde_json::to_value(spec).unwrap();
        assert_eq!(json["condition"], "baseline");
        assert_eq!(json["setSize"], 31);
        assert_eq!(
            serde_json::to_value(Condition::Role(Role::Neutral)).unwrap(),
            "neutral"
        );
    }

    #[test]
    fn distractor_counts_use_camel_case_field_names() {
        let counts = DistractorCounts {
            same_shape_other_color: 15,
            other_shape_same_color: 16,
        };
        let json = serde_json::to_value(counts).unwrap();
        assert_eq!(json["sameShape_otherColor"], 15);
        assert_eq!(json["otherShape_sameColor"], 16);
        assert_eq!(counts.total(), 31);
    }

    #[test]
    fn response_maps_from_bool() {
        assert_eq!(Response::from_present(true), Response::Present);
        assert!(!Response::Absent.is_present());
    }
}
