use fast_core::{Role, SurfaceError};
use std::path::PathBuf;
use thiserror::Error;

/// Problems with a design or with the inputs a session is started from
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("design has no roles")]
    NoRoles,

    #[error("role `{0}` is listed twice")]
    DuplicateRole(Role),

    #[error("role `{0}` is not part of this design")]
    UnknownRole(Role),

    #[error("role `{role}` has {found} block probabilities, expected {expected}")]
    ProbabilityLength {
        role: Role,
        expected: usize,
        found: usize,
    },

    #[error("role `{role}` block {block}: probability {p} is outside 0..=1")]
    ProbabilityOutOfRange { role: Role, block: usize, p: f64 },

    #[error("role `{role}` shape sequence has {found} entries, cohort size is {expected}")]
    ShapeSequenceLength {
        role: Role,
        expected: usize,
        found: usize,
    },

    #[error("role `{role}` pair rotation {rotation} needs fewer than {pairs} color pairs")]
    PairRotation {
        role: Role,
        rotation: usize,
        pairs: usize,
    },

    #[error("roles `{role}` and `{other}` rotate onto the same color pair")]
    RotationCollision { role: Role, other: Role },

    #[error("design has no color pairs")]
    NoColorPairs,

    #[error("color pair {pair} refers to palette index {index}, palette has {len} colors")]
    PaletteIndex {
        pair: usize,
        index: usize,
        len: usize,
    },

    #[error("palette index {0} appears in more than one color pair slot")]
    PaletteReuse(usize),

    #[error("cohort size must be positive")]
    CohortSize,

    #[error("participant limit {limit} is smaller than the cohort size {cohort}")]
    ParticipantLimit { limit: u32, cohort: usize },

    #[error("participant id {id} outside 1..={limit}")]
    ParticipantOutOfRange { id: u32, limit: u32 },

    #[error("set size must be at least 1")]
    EmptySetSize,

    #[error("grid has {cells} cells but a trial needs {needed}")]
    GridTooSmall { cells: usize, needed: usize },

    #[error("countdown after block {block} but the design has {blocks} testing blocks")]
    CountdownBlock { block: usize, blocks: usize },

    #[error("palette color {color} is not part of color pair {pair}")]
    ColorNotInPair { color: usize, pair: usize },

    #[error("unknown design preset `{0}`")]
    UnknownPreset(String),

    #[error("cannot read design file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid design file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Failures of the persistence collaborator
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("i/o error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot serialize result record: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("no participant id stored at {0}")]
    MissingParticipant(PathBuf),

    #[error("stored participant id `{0}` is not a positive integer")]
    InvalidParticipant(String),
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("cannot start session: {0}")]
    SurfaceUnavailable(#[source] SurfaceError),

    #[error("result export failed: {0}")]
    Persist(#[from] PersistError),

    #[error("session has not finished, no result record yet")]
    NotFinished,
}
