use fast_core::{Frame, Phase, Response, Role, Surface, SurfaceError, TrialState};
use fast_experiment::error::PersistError;
use fast_experiment::{DesignConfig, EngineError, JsonFileStore, ParticipantId, ResultRecord, ResultStore, SessionEvent, TrialStateMachine};
use fast_timing::ManualTimer;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::path::PathBuf;

#[derive(Default)]
struct CountingSurface {
    erased: usize,
    drawn: usize,
    with_items: usize,
}

impl Surface for CountingSurface {
    fn erase(&mut self) -> Result<(), SurfaceError> {
        self.erased += 1;
        Ok(())
    }

    fn draw(&mut self, frame: &Frame) -> Result<(), SurfaceError> {
        self.drawn += 1;
        if !frame.primitives.is_empty() {
            self.with_items += 1;
        }
        Ok(())
    }
}

#[derive(Default)]
struct MemoryStore {
    saved: Vec<(String, String)>,
}

impl ResultStore for MemoryStore {
    fn participant_id(&self) -> Result<u32, PersistError> {
        Ok(1)
    }

    fn save(&mut self, record: &ResultRecord, filename: &str) -> Result<PathBuf, PersistError> {
        self.saved.push((filename.to_string(), record.to_json_pretty()?));
        Ok(PathBuf::from(filename))
    }
}

/// Refuses the first save, accepts the rest. Every attempt keeps the
/// document it was handed.
#[derive(Default)]
struct FailOnceStore {
    attempts: Vec<String>,
    saved: Vec<String>,
}

impl ResultStore for FailOnceStore {
    fn participant_id(&self) -> Result<u32, PersistError> {
        Ok(1)
    }

    fn save(&mut self, record: &ResultRecord, filename: &str) -> Result<PathBuf, PersistError> {
        let json = record.to_json_pretty()?;
        self.attempts.push(json.clone());
        if self.attempts.len() == 1 {
            return Err(PersistError::Io {
                path: PathBuf::from(filename),
                source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only results directory"),
            });
        }
        self.saved.push(json);
        Ok(PathBuf::from(filename))
    }
}

fn compact_design() -> DesignConfig {
    let mut design = DesignConfig::fast_2r_15b_cc();
    design.baseline_present_per_role = 1;
    design.trials_per_role_block = 2;
    design
}

type Machine = TrialStateMachine<CountingSurface, ManualTimer, StdRng>;

fn start(design: DesignConfig, id: u32, seed: u64) -> (Machine, ManualTimer) {
    let _ = env_logger::builder().is_test(true).try_init();
    let timer = ManualTimer::new();
    let participant = ParticipantId::new(id, &design).unwrap();
    let machine = TrialStateMachine::start(
        design,
        participant,
        CountingSurface::default(),
        timer.clone(),
        StdRng::seed_from_u64(seed),
    )
    .unwrap();
    (machine, timer)
}

/// Drives the session to its end, answering each display after `rt_ms`.
/// `answer` gets the trial index and whether a target was shown.
fn run(machine: &mut Machine, timer: &ManualTimer, rt_ms: u64, mut answer: impl FnMut(usize, bool) -> Response) -> Vec<SessionEvent> {
    let mut events = Vec::new();
    for _ in 0..100_000 {
        events.extend(machine.update());
        if machine.is_finished() {
            return events;
        }
        if machine.input_enabled() {
            let trial = machine.current_trial().unwrap();
            let response = answer(trial.index, trial.spec.has_target);
            timer.advance_ms(rt_ms);
            assert!(machine.on_response(response));
        } else {
            let deadline = machine.next_deadline().expect("a waiting session always has a deadline");
            timer.set(deadline);
        }
    }
    panic!("session did not finish");
}

#[test]
fn full_session_logs_every_trial_in_order() {
    let design = compact_design();
    let total = design.total_trials();
    let landmarks = design.countdown_landmarks();
    let (mut machine, timer) = start(design, 1, 42);

    let events = run(&mut machine, &timer, 350, |_, present| Response::from_present(present));

    assert_eq!(machine.state(), TrialState::Finished);
    assert_eq!(machine.progress_percent(), 100);
    assert!(machine.current_target().is_none());

    let log = machine.log();
    assert_eq!(log.len(), total);
    assert!(log.iter().enumerate().all(|(i, t)| t.index == i));
    assert!(log.iter().all(|t| t.resp_correct && t.rt_ms == 350));

    let countdowns: Vec<usize> = events
        .iter()
        .filter_map(|e| match e {
            SessionEvent::CountdownStarted { index } => Some(*index),
            _ => None,
        })
        .collect();
    assert_eq!(countdowns, landmarks);
    assert_eq!(events.iter().filter(|e| **e == SessionEvent::Finished).count(), 1);
    assert_eq!(machine.surface().with_items, total);
}

#[test]
fn baseline_rows_resolve_to_their_roles() {
    let (mut machine, timer) = start(compact_design(), 6, 7);
    run(&mut machine, &timer, 500, |_, present| Response::from_present(present));

    let assignment = machine.assignment().clone();
    for role in [Role::Ex, Role::New] {
        let rows: Vec<_> = machine
            .log()
            .iter()
            .filter(|t| t.phase == Phase::Baseline && t.role == role)
            .collect();
        assert_eq!(rows.len(), 2, "{role}");
        assert_eq!(rows.iter().filter(|t| t.has_target).count(), 1);
        let target = assignment.target(role).unwrap();
        assert!(rows.iter().all(|t| t.target_shape == target.shape));
    }
}

#[test]
fn summary_reflects_wrong_answers() {
    let (mut machine, timer) = start(compact_design(), 3, 1);
    run(&mut machine, &timer, 420, |index, present| {
        Response::from_present(if index % 4 == 0 { !present } else { present })
    });

    let record = machine.record().unwrap();
    let total = machine.log().len();
    let wrong = (0..total).filter(|i| i % 4 == 0).count();
    assert_eq!(record.summary.overall.n_trials, total);
    assert_eq!(record.summary.overall.incorrect, wrong);
    assert_eq!(record.summary.overall.mean_rt_ms_correct, Some(420));
    assert_eq!(record.summary.overall.mean_rt_ms_wrong, Some(420));
    assert_eq!(record.summary.by_phase_role.len(), 4);
    assert_eq!(record.summary.by_block_role.len(), 16 * 2);
}

#[test]
fn export_is_repeatable() {
    let (mut machine, timer) = start(compact_design(), 2, 9);
    let mut store = MemoryStore::default();
    assert!(machine.export(&mut store).is_err());

    run(&mut machine, &timer, 300, |_, present| Response::from_present(present));
    let first = machine.export(&mut store).unwrap();
    let second = machine.export(&mut store).unwrap();
    assert_eq!(first, second);
    assert_eq!(store.saved.len(), 2);
    assert!(store.saved[0].0.starts_with("Subject2_FAST_2R_15B_CC_"));

    let json: serde_json::Value = serde_json::from_str(&store.saved[0].1).unwrap();
    assert_eq!(json["meta"]["participantId"], 2);
    assert_eq!(json["trials"].as_array().unwrap().len(), machine.log().len());
    assert_eq!(json["design"]["blocks"], 15);
}

#[test]
fn failed_export_keeps_record_for_retry() {
    let (mut machine, timer) = start(compact_design(), 8, 21);
    run(&mut machine, &timer, 390, |_, present| Response::from_present(present));

    let mut store = FailOnceStore::default();
    let err = machine.export(&mut store).unwrap_err();
    assert!(matches!(err, EngineError::Persist(PersistError::Io { .. })), "{err}");
    assert!(machine.record().is_some());

    let path = machine.export(&mut store).unwrap();
    assert!(path.to_string_lossy().starts_with("Subject8_"));
    assert_eq!(store.attempts.len(), 2);
    assert_eq!(store.saved, vec![store.attempts[0].clone()]);
}

#[test]
fn export_to_results_directory() {
    let dir = std::env::temp_dir().join(format!("fast-session-{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    let (mut machine, timer) = start(compact_design(), 4, 3);
    run(&mut machine, &timer, 610, |_, present| Response::from_present(present));

    let mut store = JsonFileStore::new(&dir);
    let path = machine.export(&mut store).unwrap();
    assert!(path.exists());
    std::fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn teardown_mid_session_stops_the_clock() {
    let (mut machine, timer) = start(compact_design(), 1, 11);
    let mut responded = 0;
    while responded < 5 {
        machine.update();
        if machine.input_enabled() {
            timer.advance_ms(200);
            machine.on_response(Response::Absent);
            responded += 1;
        } else if let Some(deadline) = machine.next_deadline() {
            timer.set(deadline);
        }
    }
    machine.teardown();
    let drawn = machine.surface().drawn;
    timer.advance_ms(60_000);
    let events = machine.update();
    assert_eq!(events.last(), Some(&SessionEvent::Cancelled));
    assert_eq!(machine.surface().drawn, drawn);
    assert_eq!(machine.log().len(), 5);
    assert!(machine.record().is_none());
    assert!(!machine.on_response(Response::Present));
}

#[test]
fn full_size_three_role_session() {
    let (mut machine, timer) = start(DesignConfig::fast(), 13, 2024);
    run(&mut machine, &timer, 480, |_, present| Response::from_present(present));
    let record = machine.record().unwrap();
    assert_eq!(record.trials.len(), 720);
    assert_eq!(record.design.set_size, 32);
    assert_eq!(record.summary.by_block_role.len(), 11 * 3);
    let block_one_ex = record
        .summary
        .by_block_role
        .iter()
        .find(|g| g.block == 1 && g.role == Role::Ex)
        .unwrap();
    assert_eq!(block_one_ex.tally.n_trials, 16);
}
