use anyhow::{Context, Result, anyhow};
use fast_core::{Response, Surface};
use fast_experiment::{DesignConfig, JsonFileStore, ParticipantId, ResultStore, SessionEvent, TrialStateMachine};
use fast_render::SkiaRenderer;
use fast_render::ab_glyph::FontVec;
use fast_timing::{HighPrecisionTimer, Timer};
use log::{debug, error, info, warn};
use pixels::{Pixels, SurfaceTexture};
use rand::{Rng, SeedableRng};
use rand::rngs::StdRng;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{Fullscreen, Window, WindowId},
};

type Session = TrialStateMachine<SkiaRenderer, HighPrecisionTimer, StdRng>;

/// Fullscreen driver: owns the window and the pixel buffer, feeds key presses
/// into the session and presents whatever the session last drew.
pub struct App {
    window: Option<Arc<Window>>,
    pixels: Option<Pixels<'static>>,
    session: Option<Session>,
    design: DesignConfig,
    participant: ParticipantId,
    seed: u64,
    font: Option<FontVec>,
    store: JsonFileStore,
    current_size: Option<PhysicalSize<u32>>,
    scale_factor: f64,
    refresh_rate: Option<f64>,
    last_present: Option<u64>,
    unsaved: bool,
    should_exit: bool,
}

impl App {
    pub fn new(design: DesignConfig, participant: ParticipantId, seed: u64, font: Option<FontVec>, store: JsonFileStore) -> Self {
        Self {
            window: None,
            pixels: None,
            session: None,
            design,
            participant,
            seed,
            font,
            store,
            current_size: None,
            scale_factor: 1.0,
            refresh_rate: None,
            last_present: None,
            unsaved: false,
            should_exit: false,
        }
    }

    pub fn run(mut self) -> Result<()> {
        let event_loop = EventLoop::new()?;
        info!("platform {} ({})", std::env::consts::OS, std::env::consts::ARCH);
        info!("F = target absent, J = target present, Esc = quit");
        info!("results go to {}", self.store.dir().display());
        event_loop.run_app(&mut self)?;
        Ok(())
    }

    fn create_window_and_session(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let monitor = event_loop
            .primary_monitor()
            .or_else(|| event_loop.available_monitors().next())
            .ok_or_else(|| anyhow!("no monitor available"))?;

        self.refresh_rate = monitor.refresh_rate_millihertz().map(|rate| rate as f64 / 1000.0);

        let attributes = Window::default_attributes()
            .with_title("Visual search")
            .with_fullscreen(Some(Fullscreen::Borderless(Some(monitor))))
            .with_resizable(false);

        let window = Arc::new(event_loop.create_window(attributes)?);
        let size = window.inner_size();
        self.current_size = Some(size);
        self.scale_factor = window.scale_factor();

        info!(
            "display {}x{} at scale {:.2}{}",
            size.width,
            size.height,
            self.scale_factor,
            self.refresh_rate.map(|hz| format!(", {hz:.1} Hz")).unwrap_or_default()
        );
        if size.width < self.design.grid.canvas_width || size.height < self.design.grid.canvas_height {
            warn!(
                "window is smaller than the {}x{} stimulus canvas; items near the edge are clipped",
                self.design.grid.canvas_width, self.design.grid.canvas_height
            );
        }

        let texture = SurfaceTexture::new(size.width, size.height, window.clone());
        self.pixels = Some(Pixels::new(size.width, size.height, texture)?);

        let mut renderer = SkiaRenderer::new(size.width, size.height)?;
        if let Some(font) = self.font.take() {
            renderer = renderer.with_font(font);
        }

        let session = TrialStateMachine::start(
            self.design.clone(),
            self.participant,
            renderer,
            HighPrecisionTimer::new(),
            StdRng::seed_from_u64(self.seed),
        )
        .context("starting session")?;
        self.session = Some(session);

        window.set_cursor_visible(false);
        window.request_redraw();
        self.window = Some(window);
        Ok(())
    }

    fn redraw(&mut self) -> Result<()> {
        let Some(session) = self.session.as_mut() else {
            return Ok(());
        };
        let events = session.update();

        if let Some(pixels) = self.pixels.as_mut() {
            session.surface().present(pixels.frame_mut());
            pixels.render()?;

            let now = session.timer().now();
            if let Some(prev) = self.last_present.replace(now) {
                session.timer_mut().record_frame(Duration::from_nanos(now.saturating_sub(prev)));
            }
        }

        for event in events {
            match event {
                SessionEvent::Finished => self.finish(),
                SessionEvent::Cancelled => {
                    if let Some(reason) = self.session.as_ref().and_then(|s| s.failure()) {
                        error!("session ended early: {reason}");
                    }
                    self.should_exit = true;
                }
                other => debug!("{other:?}"),
            }
        }
        Ok(())
    }

    fn finish(&mut self) {
        let Some(session) = self.session.as_ref() else {
            return;
        };
        let stats = session.timer().calibration_stats();
        info!(
            "frame timing: {} samples, {:.3} ms mean, {:.3} ms jitter",
            stats.samples,
            stats.average_frame_time_ns / 1e6,
            stats.jitter_ns / 1e6
        );
        let render = session.surface().render_timing();
        debug!(
            "rasterization: {:.3} ms mean over {} frames, {} cached sprites",
            render.average_frame_time_ns / 1e6,
            render.samples,
            session.surface().cached_sprites()
        );

        if self.save_results() {
            self.should_exit = true;
        } else {
            self.unsaved = true;
            warn!("results are still in memory: press R to retry saving, Esc to print them to stdout and quit");
        }
    }

    /// Exports to the results directory, then to the working directory when
    /// that fails. `false` means the record exists only in memory.
    fn save_results(&mut self) -> bool {
        let Some(session) = self.session.as_mut() else {
            return false;
        };
        let mut fallback = JsonFileStore::new(".");
        export_with_fallback(session, &mut self.store, &mut fallback).is_some()
    }

    fn dump_unsaved(&mut self) {
        let Some(record) = self.session.as_ref().and_then(|s| s.record()) else {
            return;
        };
        match record.to_json_pretty() {
            Ok(json) => {
                warn!("printing unsaved results ({}) to stdout", record.suggested_filename());
                println!("{json}");
                self.unsaved = false;
            }
            Err(e) => error!("cannot serialize unsaved results: {e}"),
        }
    }

    fn handle_key(&mut self, key: PhysicalKey, event_loop: &ActiveEventLoop) {
        let PhysicalKey::Code(code) = key else {
            return;
        };
        let response = match code {
            KeyCode::KeyF => Response::Absent,
            KeyCode::KeyJ => Response::Present,
            KeyCode::KeyR if self.unsaved => {
                if self.save_results() {
                    self.unsaved = false;
                    self.should_exit = true;
                }
                return;
            }
            KeyCode::Escape => {
                self.cleanup_and_exit(event_loop);
                return;
            }
            _ => return,
        };
        if let Some(session) = self.session.as_mut() {
            session.on_response(response);
        }
    }

    fn handle_resize(&mut self, size: PhysicalSize<u32>) {
        if size.width == 0 || size.height == 0 {
            return;
        }
        self.current_size = Some(size);
        if let Some(pixels) = self.pixels.as_mut() {
            if let Err(e) = pixels.resize_surface(size.width, size.height) {
                error!("failed to resize surface: {e}");
            }
            if let Err(e) = pixels.resize_buffer(size.width, size.height) {
                error!("failed to resize buffer: {e}");
            }
        }
        if let Some(session) = self.session.as_mut() {
            if let Err(e) = session.surface_mut().resize(size.width, size.height) {
                error!("failed to resize canvas: {e}");
            }
        }
        info!("display resized to {}x{}", size.width, size.height);
    }

    fn cleanup_and_exit(&mut self, event_loop: &ActiveEventLoop) {
        if self.unsaved {
            self.dump_unsaved();
        }
        if let Some(session) = self.session.as_mut() {
            if !session.is_finished() {
                warn!("session aborted at trial {}", session.cursor());
                session.teardown();
            }
        }
        if let Some(window) = &self.window {
            window.set_cursor_visible(true);
        }
        self.should_exit = true;
        event_loop.exit();
    }
}

fn export_with_fallback<S, T, R>(
    session: &mut TrialStateMachine<S, T, R>,
    primary: &mut dyn ResultStore,
    fallback: &mut dyn ResultStore,
) -> Option<PathBuf>
where
    S: Surface,
    T: Timer<Timestamp = u64>,
    R: Rng,
{
    match session.export(primary) {
        Ok(path) => {
            info!("session complete, results at {}", path.display());
            return Some(path);
        }
        Err(e) => error!("could not save results: {e}"),
    }
    match session.export(fallback) {
        Ok(path) => {
            warn!("results saved to fallback location {}", path.display());
            Some(path)
        }
        Err(e) => {
            error!("fallback save failed too: {e}");
            None
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none() {
            if let Err(e) = self.create_window_and_session(event_loop) {
                error!("{e:#}");
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => self.cleanup_and_exit(event_loop),
            WindowEvent::RedrawRequested => {
                if let Err(e) = self.redraw() {
                    error!("render failed: {e:#}");
                    self.cleanup_and_exit(event_loop);
                    return;
                }
                if let Some(window) = &self.window {
                    window.request_redraw();
                }
            }
            WindowEvent::KeyboardInput { event, .. } if event.state.is_pressed() && !event.repeat => {
                self.handle_key(event.physical_key, event_loop);
            }
            WindowEvent::Resized(size) => self.handle_resize(size),
            WindowEvent::ScaleFactorChanged { scale_factor, .. } => {
                self.scale_factor = scale_factor;
                if let Some(window) = &self.window {
                    self.handle_resize(window.inner_size());
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.should_exit {
            event_loop.exit();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fast_core::NullSurface;
    use fast_experiment::error::PersistError;
    use fast_experiment::ResultRecord;
    use fast_timing::ManualTimer;

    struct Store {
        accept: bool,
        saved: Vec<String>,
    }

    impl Store {
        fn new(accept: bool) -> Self {
            Self { accept, saved: Vec::new() }
        }
    }

    impl ResultStore for Store {
        fn participant_id(&self) -> Result<u32, PersistError> {
            Ok(1)
        }

        fn save(&mut self, record: &ResultRecord, filename: &str) -> Result<PathBuf, PersistError> {
            if !self.accept {
                return Err(PersistError::InvalidParticipant("store offline".into()));
            }
            self.saved.push(record.to_json_pretty()?);
            Ok(PathBuf::from(filename))
        }
    }

    fn finished_session() -> TrialStateMachine<NullSurface, ManualTimer, StdRng> {
        let mut design = DesignConfig::fast_2r_15b_cc();
        design.baseline_present_per_role = 1;
        design.trials_per_role_block = 2;
        let participant = ParticipantId::new(2, &design).unwrap();
        let timer = ManualTimer::new();
        let mut session =
            TrialStateMachine::start(design, participant, NullSurface, timer.clone(), StdRng::seed_from_u64(4)).unwrap();
        while !session.is_finished() {
            session.update();
            if session.input_enabled() {
                timer.advance_ms(400);
                session.on_response(Response::Absent);
            } else if let Some(deadline) = session.next_deadline() {
                timer.set(deadline);
            }
        }
        session
    }

    #[test]
    fn falls_back_when_results_directory_fails() {
        let mut session = finished_session();
        let (mut primary, mut fallback) = (Store::new(false), Store::new(true));
        let path = export_with_fallback(&mut session, &mut primary, &mut fallback).unwrap();
        assert!(path.to_string_lossy().starts_with("Subject2_"));
        assert!(primary.saved.is_empty());
        assert_eq!(fallback.saved.len(), 1);
    }

    #[test]
    fn record_survives_when_every_save_fails() {
        let mut session = finished_session();
        let (mut primary, mut fallback) = (Store::new(false), Store::new(false));
        assert!(export_with_fallback(&mut session, &mut primary, &mut fallback).is_none());
        assert!(session.record().is_some());

        primary.accept = true;
        assert!(export_with_fallback(&mut session, &mut primary, &mut fallback).is_some());
        assert_eq!(primary.saved.len(), 1);
    }
}
