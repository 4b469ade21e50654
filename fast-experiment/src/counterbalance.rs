//! Participant-to-target assignment.
//!
//! A participant id picks a cohort position `k` and a cohort group. The group
//! (or the id itself, depending on [`PairBasis`]) selects a base color pair and
//! every role is rotated off that base by its own fixed amount, so two roles of
//! one participant never share a pair. `k` selects the target shape from the
//! role's shape sequence and, by parity, which color of the pair is the target.

use crate::config::{DesignConfig, PairBasis};
use crate::error::ConfigError;
use fast_core::{Condition, Rgb, Role, Shape};
use log::warn;
use serde::Serialize;
use std::collections::HashMap;

/// 1-based participant number, checked against the design's participant limit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ParticipantId(u32);

impl ParticipantId {
    pub fn new(id: u32, design: &DesignConfig) -> Result<Self, ConfigError> {
        if id == 0 || id > design.participant_limit {
            return Err(ConfigError::ParticipantOutOfRange {
                id,
                limit: design.participant_limit,
            });
        }
        Ok(Self(id))
    }

    pub fn get(self) -> u32 {
        self.0
    }

    fn zero_based(self) -> usize {
        self.0 as usize - 1
    }
}

impl std::fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which member of the color pair is the target color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ColorSide {
    A,
    B,
}

impl ColorSide {
    fn from_position(k: usize) -> Self {
        if k % 2 == 0 { ColorSide::A } else { ColorSide::B }
    }

    fn pick(self, pair: [usize; 2]) -> usize {
        match self {
            ColorSide::A => pair[0],
            ColorSide::B => pair[1],
        }
    }
}

/// Target identity held by one role for the whole session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FixedTarget {
    pub pair_index: usize,
    pub shape: Shape,
    /// Palette index of the target color
    pub color: usize,
    pub side: ColorSide,
}

/// Pure assignment function over one design
#[derive(Debug, Clone, Copy)]
pub struct Assignor<'a> {
    design: &'a DesignConfig,
}

impl<'a> Assignor<'a> {
    pub fn new(design: &'a DesignConfig) -> Self {
        Self { design }
    }

    fn base_pair(&self, z: usize) -> usize {
        let pairs = self.design.color_pairs.len();
        let base = match self.design.pair_basis {
            PairBasis::Cohort => (z / self.design.cohort_size) % self.design.group_count(),
            PairBasis::Participant => z,
        };
        (base + self.design.pair_offset) % pairs
    }

    pub fn fixed_target_for(&self, participant: ParticipantId, role: Role) -> Result<FixedTarget, ConfigError> {
        let rc = self
            .design
            .role_config(role)
            .ok_or(ConfigError::UnknownRole(role))?;
        let z = participant.zero_based();
        let cohort = self.design.cohort_size;
        let k = z % cohort;
        let group = (z / cohort) % self.design.group_count();

        let pairs = self.design.color_pairs.len();
        let pair_index = (self.base_pair(z) + rc.pair_rotation) % pairs;

        let late = group >= self.design.group_count() / 2 && self.design.group_count() > 1;
        let sequence = match (&rc.late_shape_sequence, late) {
            (Some(late_seq), true) => late_seq,
            _ => &rc.shape_sequence,
        };
        let shape = *sequence
            .get(k)
            .ok_or(ConfigError::ShapeSequenceLength {
                role,
                expected: cohort,
                found: sequence.len(),
            })?;

        let side = ColorSide::from_position(k);
        let color = side.pick(self.design.color_pairs[pair_index]);
        Ok(FixedTarget {
            pair_index,
            shape,
            color,
            side,
        })
    }

    /// Role whose target uses `pair_index`, falling back to the first role.
    pub fn role_from_pair_index(&self, participant: ParticipantId, pair_index: usize) -> Role {
        let found = self.design.roles.iter().map(|rc| rc.role).find(|&role| {
            self.fixed_target_for(participant, role)
                .is_ok_and(|t| t.pair_index == pair_index)
        });
        found.unwrap_or_else(|| {
            let fallback = self.design.roles[0].role;
            warn!(
                "participant {}: no role uses pair {}, falling back to `{}`",
                participant, pair_index, fallback
            );
            fallback
        })
    }
}

/// Per-participant lookup tables, built once at session start
#[derive(Debug, Clone)]
pub struct Assignment {
    participant: ParticipantId,
    targets: Vec<(Role, FixedTarget)>,
    by_pair: HashMap<usize, Role>,
}

impl Assignment {
    pub fn build(design: &DesignConfig, participant: ParticipantId) -> Result<Self, ConfigError> {
        let assignor = Assignor::new(design);
        let targets = design
            .roles
            .iter()
            .map(|rc| Ok((rc.role, assignor.fixed_target_for(participant, rc.role)?)))
            .collect::<Result<Vec<_>, ConfigError>>()?;
        let by_pair = targets.iter().map(|(role, t)| (t.pair_index, *role)).collect();
        Ok(Self {
            participant,
            targets,
            by_pair,
        })
    }

    pub fn participant(&self) -> ParticipantId {
        self.participant
    }

    pub fn target(&self, role: Role) -> Option<FixedTarget> {
        self.targets
            .iter()
            .find(|(r, _)| *r == role)
            .map(|(_, t)| *t)
    }

    /// Targets in design role order
    pub fn targets(&self) -> &[(Role, FixedTarget)] {
        &self.targets
    }

    pub fn role_from_pair_index(&self, pair_index: usize) -> Role {
        match self.by_pair.get(&pair_index) {
            Some(role) => *role,
            None => {
                let fallback = self.default_role();
                warn!(
                    "participant {}: no role uses pair {}, falling back to `{}`",
                    self.participant, pair_index, fallback
                );
                fallback
            }
        }
    }

    fn default_role(&self) -> Role {
        self.targets.first().map_or(Role::Ex, |(role, _)| *role)
    }

    /// Role and target a scheduled row is run with.
    pub fn resolve(&self, condition: Condition, pair_index: usize) -> (Role, FixedTarget) {
        let role = condition
            .role()
            .unwrap_or_else(|| self.role_from_pair_index(pair_index));
        match self.target(role) {
            Some(target) => (role, target),
            None => {
                let fallback = self.default_role();
                warn!("role `{}` has no target, running trial as `{}`", role, fallback);
                (fallback, self.targets[0].1)
            }
        }
    }

    /// `(shape, color)` of a role's target, for prompts and the result header
    pub fn describe(&self, design: &DesignConfig, role: Role) -> Option<(Shape, Rgb)> {
        let target = self.target(role)?;
        Some((target.shape, *design.palette.get(target.color)?))
    }
}

/// The pair partner of `color` within `pair`.
pub fn other_color_in_pair(pair: [usize; 2], color: usize) -> Option<usize> {
    match pair {
        [a, b] if a == color => Some(b),
        [a, b] if b == color => Some(a),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, HashSet};

    fn pid(id: u32, design: &DesignConfig) -> ParticipantId {
        ParticipantId::new(id, design).unwrap()
    }

    #[test]
    fn participant_range_is_enforced() {
        let d = DesignConfig::fast();
        assert!(ParticipantId::new(0, &d).is_err());
        assert!(ParticipantId::new(25, &d).is_err());
        assert_eq!(pid(24, &d).get(), 24);
    }

    #[test]
    fn first_fast_participant() {
        let d = DesignConfig::fast();
        let a = Assignor::new(&d);
        let p = pid(1, &d);
        let ex = a.fixed_target_for(p, Role::Ex).unwrap();
        assert_eq!((ex.pair_index, ex.shape, ex.color), (0, Shape::Square, 0));
        let new = a.fixed_target_for(p, Role::New).unwrap();
        assert_eq!((new.pair_index, new.shape, new.color), (1, Shape::Circle, 1));
        let neutral = a.fixed_target_for(p, Role::Neutral).unwrap();
        assert_eq!((neutral.pair_index, neutral.shape, neutral.color), (2, Shape::Square, 2));
    }

    #[test]
    fn neutral_switches_sequence_in_late_groups() {
        let d = DesignConfig::fast();
        let a = Assignor::new(&d);
        // id 13 is k = 0 of group 3
        let late = a.fixed_target_for(pid(13, &d), Role::Neutral).unwrap();
        assert_eq!(late.shape, Shape::Circle);
        let early = a.fixed_target_for(pid(1, &d), Role::Neutral).unwrap();
        assert_eq!(early.shape, Shape::Square);
    }

    #[test]
    fn assignment_is_pure() {
        for design in [DesignConfig::fast(), DesignConfig::fast_2r_15b_cc(), DesignConfig::fast_2r_15b_tc()] {
            let a = Assignor::new(&design);
            for id in 1..=design.participant_limit {
                for rc in &design.roles {
                    let p = pid(id, &design);
                    assert_eq!(
                        a.fixed_target_for(p, rc.role).unwrap(),
                        a.fixed_target_for(p, rc.role).unwrap()
                    );
                }
            }
        }
    }

    #[test]
    fn roles_never_share_a_pair() {
        for design in [DesignConfig::fast(), DesignConfig::fast_2r_15b_cc(), DesignConfig::fast_2r_15b_tc()] {
            for id in 1..=design.participant_limit {
                let assignment = Assignment::build(&design, pid(id, &design)).unwrap();
                let pairs: HashSet<_> = assignment.targets().iter().map(|(_, t)| t.pair_index).collect();
                assert_eq!(pairs.len(), design.roles.len(), "participant {id}");
            }
        }
    }

    #[test]
    fn cohort_members_get_distinct_targets() {
        for design in [DesignConfig::fast(), DesignConfig::fast_2r_15b_cc(), DesignConfig::fast_2r_15b_tc()] {
            let a = Assignor::new(&design);
            for first in (1..=design.participant_limit).step_by(design.cohort_size) {
                for rc in &design.roles {
                    let combos: HashSet<_> = (first..first + design.cohort_size as u32)
                        .map(|id| {
                            let t = a.fixed_target_for(pid(id, &design), rc.role).unwrap();
                            (t.pair_index, t.shape, t.side)
                        })
                        .collect();
                    assert_eq!(combos.len(), design.cohort_size);
                }
            }
        }
    }

    #[test]
    fn combinations_are_balanced_over_the_participant_cycle() {
        for design in [DesignConfig::fast(), DesignConfig::fast_2r_15b_cc(), DesignConfig::fast_2r_15b_tc()] {
            let a = Assignor::new(&design);
            for rc in &design.roles {
                let mut counts: HashMap<(usize, Shape, ColorSide), usize> = HashMap::new();
                for id in 1..=design.participant_limit {
                    let t = a.fixed_target_for(pid(id, &design), rc.role).unwrap();
                    *counts.entry((t.pair_index, t.shape, t.side)).or_default() += 1;
                }
                let expected = counts.values().next().copied().unwrap();
                assert!(counts.values().all(|&n| n == expected), "{}: {counts:?}", rc.role);
            }
        }
    }

    #[test]
    fn tc_offsets_the_ex_pair() {
        let d = DesignConfig::fast_2r_15b_tc();
        let a = Assignor::new(&d);
        assert_eq!(a.fixed_target_for(pid(1, &d), Role::Ex).unwrap().pair_index, 1);
        assert_eq!(a.fixed_target_for(pid(2, &d), Role::Ex).unwrap().pair_index, 0);
        let cc = DesignConfig::fast_2r_15b_cc();
        let a = Assignor::new(&cc);
        assert_eq!(a.fixed_target_for(pid(1, &cc), Role::Ex).unwrap().pair_index, 0);
    }

    #[test]
    fn role_lookup_inverts_assignment() {
        let d = DesignConfig::fast();
        for id in 1..=24 {
            let p = pid(id, &d);
            let assignment = Assignment::build(&d, p).unwrap();
            let a = Assignor::new(&d);
            for (role, target) in assignment.targets() {
                assert_eq!(assignment.role_from_pair_index(target.pair_index), *role);
                assert_eq!(a.role_from_pair_index(p, target.pair_index), *role);
            }
        }
    }

    #[test]
    fn unknown_pair_falls_back_to_first_role() {
        let _ = env_logger::builder().is_test(true).try_init();
        let d = DesignConfig::fast_2r_15b_cc();
        let p = pid(3, &d);
        let assignment = Assignment::build(&d, p).unwrap();
        assert_eq!(assignment.role_from_pair_index(7), Role::Ex);
        assert_eq!(Assignor::new(&d).role_from_pair_index(p, 7), Role::Ex);
        let (role, target) = assignment.resolve(Condition::Baseline, 7);
        assert_eq!(role, Role::Ex);
        assert_eq!(Some(target), assignment.target(Role::Ex));
    }

    #[test]
    fn resolve_and_describe_agree_with_targets() {
        let d = DesignConfig::fast();
        let assignment = Assignment::build(&d, pid(9, &d)).unwrap();
        for &(role, target) in assignment.targets() {
            assert_eq!(assignment.resolve(Condition::Role(role), 99), (role, target));
            assert_eq!(assignment.resolve(Condition::Baseline, target.pair_index), (role, target));
            let (shape, color) = assignment.describe(&d, role).unwrap();
            assert_eq!(shape, target.shape);
            assert_eq!(color, d.palette[target.color]);
        }
    }

    #[test]
    fn unknown_role_is_an_error() {
        let d = DesignConfig::fast_2r_15b_cc();
        let err = Assignor::new(&d).fixed_target_for(pid(1, &d), Role::Neutral);
        assert!(matches!(err, Err(ConfigError::UnknownRole(Role::Neutral))));
    }

    #[test]
    fn pair_partner() {
        assert_eq!(other_color_in_pair([0, 3], 0), Some(3));
        assert_eq!(other_color_in_pair([0, 3], 3), Some(0));
        assert_eq!(other_color_in_pair([0, 3], 1), None);
    }
}
