use crate::config::DesignConfig;
use crate::counterbalance::{Assignment, ParticipantId};
use crate::error::{ConfigError, EngineError};
use crate::palette::PaletteMetrics;
use crate::results::{FrameTiming, ISO_FORMAT, ResultRecord};
use crate::schedule::{Schedule, ScheduleSummary, build_schedule};
use crate::stimulus::{StimulusGenerator, StimulusRequest};
use crate::store::ResultStore;
use crate::trial::{ActiveTrial, TrialTimestamps};
use chrono::{DateTime, Local};
use fast_core::{Frame, Response, Rgb, Shape, Surface, TrialLog, TrialState};
use fast_timing::{NANOS_PER_MILLI, Timer, TimerQueue, ms_to_ns};
use log::{debug, error, info, trace, warn};
use rand::Rng;
use std::path::PathBuf;

/// Single-fire transitions held in the session's timer queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transition {
    CountdownCue(usize),
    CountdownDone,
    FeedbackText,
    FeedbackClear,
    Advance,
}

/// What happened during an `update` or `on_response` call, for drivers that
/// want to react (sound, redraw requests, logging).
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    CountdownStarted { index: usize },
    CountdownCue { text: Option<String> },
    StimulusShown { index: usize },
    ResponseRecorded { index: usize, correct: bool, rt_ms: u64 },
    FeedbackShown { correct: bool },
    TrialAdvanced { index: usize },
    Finished,
    Cancelled,
}

pub struct TrialStateMachine<S, T, R>
where
    S: Surface,
    T: Timer<Timestamp = u64>,
    R: Rng,
{
    design: DesignConfig,
    assignment: Assignment,
    schedule: Schedule,
    landmarks: Vec<usize>,
    cursor: usize,
    state: TrialState,
    input_enabled: bool,
    last_correct: Option<bool>,
    queue: TimerQueue<Transition>,
    current: Option<ActiveTrial<u64>>,
    log: Vec<TrialLog>,
    events: Vec<SessionEvent>,
    record: Option<ResultRecord>,
    exports: usize,
    failure: Option<ConfigError>,
    surface: S,
    timer: T,
    rng: R,
    wall_start: DateTime<Local>,
    mono_start: u64,
}

impl<S, T, R> TrialStateMachine<S, T, R>
where
    S: Surface,
    T: Timer<Timestamp = u64>,
    R: Rng,
{
    /// Validates the design, claims the surface, builds the schedule and
    /// enters the first countdown.
    pub fn start(design: DesignConfig, participant: ParticipantId, mut surface: S, timer: T, mut rng: R) -> Result<Self, EngineError> {
        if let Err(e) = design.validate() {
            error!("refusing to start session: {}", e);
            return Err(e.into());
        }
        if let Err(e) = surface.erase() {
            error!("drawing surface unavailable: {}", e);
            return Err(EngineError::SurfaceUnavailable(e));
        }
        let assignment = Assignment::build(&design, participant)?;
        let schedule = build_schedule(&design, &assignment, &mut rng);
        ScheduleSummary::from_schedule(&design, &assignment, &schedule).log();
        PaletteMetrics::for_design(&design).log();

        info!(
            "session start: participant {} design {} ({} trials)",
            participant,
            design.version,
            schedule.len()
        );
        for role in design.role_order() {
            if let Some((shape, color)) = assignment.describe(&design, role) {
                info!("  {} target: {} {}", role, color, shape);
            }
        }

        let mono_start = timer.now();
        let mut machine = Self {
            landmarks: design.countdown_landmarks(),
            design,
            assignment,
            schedule,
            cursor: 0,
            state: TrialState::Idle,
            input_enabled: false,
            last_correct: None,
            queue: TimerQueue::new(),
            current: None,
            log: Vec::new(),
            events: Vec::new(),
            record: None,
            exports: 0,
            failure: None,
            surface,
            timer,
            rng,
            wall_start: Local::now(),
            mono_start,
        };
        machine.next_trial();
        Ok(machine)
    }

    /// Fires every transition that is due and returns what happened since the
    /// previous call.
    pub fn update(&mut self) -> Vec<SessionEvent> {
        let now = self.timer.now();
        while !self.state.is_terminal() {
            let Some((_, transition)) = self.queue.pop_due(now) else {
                break;
            };
            self.fire(transition);
        }
        std::mem::take(&mut self.events)
    }

    /// Accepts the first response of a trial; everything else is ignored.
    pub fn on_response(&mut self, response: Response) -> bool {
        if !self.input_enabled || self.state != TrialState::AwaitingResponse {
            trace!("ignoring {:?} in state {:?}", response, self.state);
            return false;
        }
        let now = self.timer.now();
        let answer_time = self.wall_at(now);
        let Some(trial) = self.current.as_mut() else {
            return false;
        };

        trial.timestamps.response = Some(now);
        let rt_ms = now.saturating_sub(trial.timestamps.stimulus_drawn) / NANOS_PER_MILLI;
        let correct = response.is_present() == trial.spec.has_target;

        let entry = TrialLog {
            index: trial.index,
            phase: trial.spec.phase(),
            block: trial.spec.block,
            role: trial.role,
            has_target: trial.spec.has_target,
            resp_has_target: response.is_present(),
            resp_correct: correct,
            rt_ms,
            start_time: trial.timestamps.start_time.clone(),
            answer_time,
            target_shape: trial.target.shape,
            target_color_hex: trial
                .spec
                .has_target
                .then(|| self.design.palette.get(trial.target.color).copied())
                .flatten(),
            target_xy: trial.stimulus.target_position,
            distractors: trial.stimulus.distractors,
        };
        debug!(
            "trial {} {} {}: {} in {} ms",
            entry.index,
            entry.role,
            if entry.has_target { "present" } else { "absent" },
            if correct { "correct" } else { "wrong" },
            rt_ms
        );
        let index = entry.index;
        self.log.push(entry);

        self.input_enabled = false;
        self.state = TrialState::Feedback;
        self.last_correct = Some(correct);
        self.show(self.blank_frame());

        self.queue.schedule(now + ms_to_ns(self.design.timing.feedback_text_ms), Transition::FeedbackText);
        self.queue.schedule(now + ms_to_ns(self.design.timing.feedback_clear_ms), Transition::FeedbackClear);
        self.queue.schedule(now + ms_to_ns(self.design.timing.advance_ms), Transition::Advance);
        self.events.push(SessionEvent::ResponseRecorded { index, correct, rt_ms });
        true
    }

    /// Cancels every pending transition. Later updates and responses are no-ops.
    pub fn teardown(&mut self) {
        if self.state.is_terminal() {
            return;
        }
        let cancelled = self.queue.cancel_all();
        self.state = TrialState::Cancelled;
        self.input_enabled = false;
        self.current = None;
        self.events.push(SessionEvent::Cancelled);
        info!(
            "session torn down at trial {}/{} ({} transitions cancelled)",
            self.cursor,
            self.schedule.len(),
            cancelled
        );
    }

    /// Saves the finished record. The first call is the session's export,
    /// later calls write it again.
    pub fn export<St: ResultStore + ?Sized>(&mut self, store: &mut St) -> Result<PathBuf, EngineError> {
        let record = self.record.as_ref().ok_or(EngineError::NotFinished)?;
        let filename = record.suggested_filename();
        match store.save(record, &filename) {
            Ok(path) => {
                self.exports += 1;
                if self.exports > 1 {
                    info!("re-exported results ({}) to {}", self.exports, path.display());
                }
                Ok(path)
            }
            Err(e) => {
                error!("could not save {}: {}", filename, e);
                Err(e.into())
            }
        }
    }

    fn fire(&mut self, transition: Transition) {
        match (self.state, transition) {
            (TrialState::Countdown, Transition::CountdownCue(i)) => {
                let text = self.design.timing.countdown.get(i).and_then(|c| c.text.clone());
                let frame = match &text {
                    Some(t) => self.text_frame(t),
                    None => self.blank_frame(),
                };
                self.show(frame);
                self.events.push(SessionEvent::CountdownCue { text });
            }
            (TrialState::Countdown, Transition::CountdownDone) => self.present_trial(),
            (TrialState::Feedback, Transition::FeedbackText) => {
                let correct = self.last_correct.unwrap_or(false);
                let word = if correct {
                    &self.design.timing.correct_text
                } else {
                    &self.design.timing.wrong_text
                };
                let frame = self.text_frame(word);
                self.show(frame);
                self.events.push(SessionEvent::FeedbackShown { correct });
            }
            (TrialState::Feedback, Transition::FeedbackClear) => self.show(self.blank_frame()),
            (TrialState::Feedback, Transition::Advance) => {
                self.cursor += 1;
                self.current = None;
                self.events.push(SessionEvent::TrialAdvanced { index: self.cursor });
                self.next_trial();
            }
            (state, transition) => warn!("dropping {:?} in state {:?}", transition, state),
        }
    }

    fn next_trial(&mut self) {
        if self.cursor >= self.schedule.len() {
            self.finish();
        } else if self.landmarks.contains(&self.cursor) {
            self.begin_countdown();
        } else {
            self.present_trial();
        }
    }

    fn begin_countdown(&mut self) {
        self.state = TrialState::Countdown;
        self.input_enabled = false;
        self.show(self.blank_frame());

        let now = self.timer.now();
        for (i, cue) in self.design.timing.countdown.iter().enumerate() {
            self.queue.schedule(now + ms_to_ns(cue.at_ms), Transition::CountdownCue(i));
        }
        self.queue.schedule(now + ms_to_ns(self.design.timing.countdown_done_ms), Transition::CountdownDone);
        debug!("countdown before trial {}", self.cursor);
        self.events.push(SessionEvent::CountdownStarted { index: self.cursor });
    }

    fn present_trial(&mut self) {
        let Some(spec) = self.schedule.get(self.cursor).copied() else {
            self.finish();
            return;
        };
        let (role, target) = self.assignment.resolve(spec.condition, spec.pair_index);
        let request = StimulusRequest {
            set_size: spec.set_size,
            has_target: spec.has_target,
            pair_index: target.pair_index,
            target_shape: target.shape,
            target_color: target.color,
        };
        let stimulus = match StimulusGenerator::new(&self.design).create_stimulus(&request, &mut self.rng) {
            Ok(stimulus) => stimulus,
            Err(e) => {
                error!("cannot build display for trial {}, ending session: {}", self.cursor, e);
                self.failure = Some(e);
                self.teardown();
                return;
            }
        };

        self.show(stimulus.to_frame(&self.design));
        let drawn = self.timer.now();
        self.current = Some(ActiveTrial {
            index: self.cursor,
            spec,
            role,
            target,
            stimulus,
            timestamps: TrialTimestamps {
                stimulus_drawn: drawn,
                response: None,
                start_time: self.wall_at(drawn),
            },
        });
        self.state = TrialState::AwaitingResponse;
        self.input_enabled = true;
        self.events.push(SessionEvent::StimulusShown { index: self.cursor });
    }

    fn finish(&mut self) {
        self.state = TrialState::Finished;
        self.input_enabled = false;
        self.current = None;
        self.queue.cancel_all();
        self.show(self.blank_frame());

        let frame_timing = FrameTiming::from_stats(&self.timer.calibration_stats());
        let finished_at = self.wall_time(self.timer.now());
        let record = ResultRecord::assemble(&self.design, &self.assignment, self.log.clone(), finished_at, frame_timing);
        info!(
            "session finished at {}: {}/{} correct",
            finished_at.format(ISO_FORMAT),
            record.summary.overall.correct,
            record.summary.overall.n_trials
        );
        self.record = Some(record);
        self.events.push(SessionEvent::Finished);
    }

    fn show(&mut self, frame: Frame) {
        let drawn = self.surface.erase().and_then(|_| self.surface.draw(&frame));
        if let Err(e) = drawn {
            warn!("draw failed: {}", e);
        }
    }

    fn blank_frame(&self) -> Frame {
        Frame::blank(self.design.grid.canvas_width, self.design.grid.canvas_height, self.design.background)
    }

    fn text_frame(&self, text: &str) -> Frame {
        self.blank_frame()
            .with_text(text, self.design.timing.text_size_px, self.design.timing.text_color)
    }

    fn wall_time(&self, mono: u64) -> DateTime<Local> {
        let offset = chrono::Duration::nanoseconds(mono.saturating_sub(self.mono_start) as i64);
        self.wall_start + offset
    }

    fn wall_at(&self, mono: u64) -> String {
        self.wall_time(mono).format(ISO_FORMAT).to_string()
    }

    pub fn state(&self) -> TrialState {
        self.state
    }

    pub fn input_enabled(&self) -> bool {
        self.input_enabled
    }

    pub fn is_finished(&self) -> bool {
        self.state == TrialState::Finished
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// 100 once finished, otherwise capped at 99
    pub fn progress_percent(&self) -> u8 {
        let total = self.schedule.len();
        if self.is_finished() || self.cursor >= total {
            return 100;
        }
        ((self.cursor * 100 / total).min(99)) as u8
    }

    /// Shape and color the participant is searching for on the current trial.
    pub fn current_target(&self) -> Option<(Shape, Rgb)> {
        let trial = self.current.as_ref()?;
        self.assignment.describe(&self.design, trial.role)
    }

    pub fn current_trial(&self) -> Option<&ActiveTrial<u64>> {
        self.current.as_ref()
    }

    /// Earliest pending transition, on the timer's clock
    pub fn next_deadline(&self) -> Option<u64> {
        self.queue.next_due()
    }

    pub fn design(&self) -> &DesignConfig {
        &self.design
    }

    pub fn assignment(&self) -> &Assignment {
        &self.assignment
    }

    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    pub fn log(&self) -> &[TrialLog] {
        &self.log
    }

    pub fn record(&self) -> Option<&ResultRecord> {
        self.record.as_ref()
    }

    /// Why the session ended early, when a trial could not be built
    pub fn failure(&self) -> Option<&ConfigError> {
        self.failure.as_ref()
    }

    pub fn timer(&self) -> &T {
        &self.timer
    }

    /// Drivers record presented frame intervals here; they end up in the
    /// record's frame timing.
    pub fn timer_mut(&mut self) -> &mut T {
        &mut self.timer
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }
}
