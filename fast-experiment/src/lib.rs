pub mod config;
pub mod counterbalance;
pub mod error;
pub mod palette;
pub mod results;
pub mod schedule;
pub mod shuffle;
pub mod state;
pub mod stimulus;
pub mod store;
pub mod trial;

pub use config::{CountdownCue, DesignConfig, DesignPreset, GridConfig, PairBasis, RoleConfig, TimingConfig};
pub use counterbalance::{Assignment, Assignor, ColorSide, FixedTarget, ParticipantId};
pub use error::{ConfigError, EngineError, PersistError};
pub use palette::PaletteMetrics;
pub use results::{ResultRecord, Summary, Tally};
pub use schedule::{Schedule, ScheduleSummary, build_schedule};
pub use state::{SessionEvent, TrialStateMachine};
pub use stimulus::{Stimulus, StimulusGenerator, StimulusRequest};
pub use store::{JsonFileStore, ResultStore};
