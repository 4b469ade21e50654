pub mod queue;
pub mod timer;

pub use queue::TimerQueue;
pub use timer::{CalibrationStats, HighPrecisionTimer, ManualTimer, Timer};

pub const NANOS_PER_MILLI: u64 = 1_000_000;

/// Milliseconds to the nanosecond timestamps used by every `Timer`.
pub const fn ms_to_ns(ms: u64) -> u64 {
    ms * NANOS_PER_MILLI
}
