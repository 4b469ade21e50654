use anyhow::{Result, bail};
use fast_core::{NullSurface, Response};
use fast_experiment::{DesignConfig, ParticipantId, ResultStore, TrialStateMachine};
use fast_timing::ManualTimer;
use log::{info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::PathBuf;

const ACCURACY: f64 = 0.9;
const RT_RANGE_MS: std::ops::Range<u64> = 350..900;

/// Runs a whole session against a discarding surface and a clock that jumps
/// straight to each deadline, answering every display with a random RT.
pub fn run(design: DesignConfig, participant: ParticipantId, seed: u64, store: &mut dyn ResultStore) -> Result<PathBuf> {
    let timer = ManualTimer::new();
    let total = design.total_trials();
    let mut session = TrialStateMachine::start(
        design,
        participant,
        NullSurface,
        timer.clone(),
        StdRng::seed_from_u64(seed),
    )?;
    let mut responder = StdRng::seed_from_u64(seed.wrapping_add(1));

    // every trial needs a handful of steps; anything past this is a stuck session
    let max_steps = total * 16 + 64;
    for _ in 0..max_steps {
        session.update();
        if session.is_finished() {
            break;
        }
        if session.input_enabled() {
            let Some(trial) = session.current_trial() else {
                bail!("input enabled without an active trial");
            };
            let correct = responder.random_bool(ACCURACY);
            let present = trial.spec.has_target == correct;
            timer.advance_ms(responder.random_range(RT_RANGE_MS));
            session.on_response(Response::from_present(present));
        } else if let Some(deadline) = session.next_deadline() {
            timer.set(deadline);
        } else {
            bail!("session stalled in {:?} at trial {}", session.state(), session.cursor());
        }
    }
    if !session.is_finished() {
        bail!("session did not finish within {max_steps} steps");
    }

    if let Some(record) = session.record() {
        let overall = &record.summary.overall;
        info!(
            "simulated {} trials: {} correct, {} wrong, mean RT {:?} ms",
            overall.n_trials, overall.correct, overall.incorrect, overall.mean_rt_ms_correct
        );
    }
    match session.export(store) {
        Ok(path) => Ok(path),
        Err(e) => {
            if let Some(json) = session.record().and_then(|r| r.to_json_pretty().ok()) {
                warn!("save failed, printing results to stdout instead");
                println!("{json}");
            }
            Err(e.into())
        }
    }
}
