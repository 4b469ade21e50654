use serde::{Deserialize, Serialize};

/// Experiment phase a trial belongs to
#[derive(Copy, Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    #[default]
    Baseline,
    Testing,
}

impl Phase {
    pub const ALL: [Phase; 2] = [Phase::Baseline, Phase::Testing];

    /// Block 0 is the baseline, every later block is a testing block.
    pub fn from_block(block: usize) -> Self {
        if block == 0 {
            Phase::Baseline
        } else {
            Phase::Testing
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Phase::Baseline => "baseline",
            Phase::Testing => "testing",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_zero_is_baseline() {
        assert_eq!(Phase::from_block(0), Phase::Baseline);
        assert_eq!(Phase::from_block(1), Phase::Testing);
        assert_eq!(Phase::from_block(15), Phase::Testing);
    }

    #[test]
    fn serializes_lowercase() {
        let json = serde_json::to_string(&Phase::Testing).unwrap();
        assert_eq!(json, "\"testing\"");
    }
}
