//! # Root — The Frame Loop
//!
//! [`Root`] owns the tree, the backend and the clock, and is the only thing
//! that sends pulses. One call to [`Root::step`] is one frame:
//!
//! ```text
//!  1. events   backend.poll_events ─► InputState::apply ─► event pulse
//!  2. time     Time::tick ─► time pulse(delta)
//!  3. mail     drain mailbox until empty ─► root control ─► mail pulse
//!  4. render   DrawList::reset ─► render pulse (cached order) ─► present
//!  5. end      clear per-frame input, honor quit requests
//! ```
//!
//! Mail posted while the mailbox is being drained is picked up by the same
//! drain, so a request/response pair completes within one frame.
//!
//! ## Root control mail
//!
//! | Subject        | Addressed to  | Effect                           |
//! |----------------|---------------|----------------------------------|
//! | `quit`         | root name     | stop after this frame            |
//! | `show_tree`    | root name     | debug-log [`Tree::dump`]         |
//! | `tree_changed` | anyone        | debug-log [`Tree::dump`]         |
//!
//! Control mail is still pulsed through the tree afterwards.
//!
//! ## Errors
//!
//! A hook error aborts the frame and is returned from `step`. [`Root::run`]
//! logs it and exits with a failure code.

use std::process::ExitCode;
use std::time::{Duration, Instant};

use crate::backend::{Backend, HeadlessBackend};
use crate::config::RootConfig;
use crate::container::TREE_CHANGED;
use crate::error::Result;
use crate::input::InputEvent;
use crate::mail::Mail;
use crate::math::Vec2;
use crate::node::{Behavior, NodeId};
use crate::render::DrawList;
use crate::services::{PathResolver, Services};
use crate::time::Time;
use crate::tree::Tree;

/// What the last frame cost and carried.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameStats {
    pub events: usize,
    /// Mail drained from the mailbox.
    pub mail_drained: usize,
    /// Mail hooks run across all drained mail. The root node counts as a
    /// recipient of every broadcast.
    pub mail_delivered: usize,
    pub draw_commands: usize,
    pub event_us: f64,
    pub time_us: f64,
    pub mail_us: f64,
    pub render_us: f64,
}

pub struct Root {
    tree: Tree,
    backend: Box<dyn Backend>,
    time: Time,
    config: RootConfig,
    frame: DrawList,
    stats: FrameStats,
    running: bool,
    #[cfg(feature = "diagnostics")]
    diag: Option<crate::diag::DiagSender>,
}

impl Root {
    pub fn new(config: RootConfig, backend: impl Backend) -> Self {
        Self::with_boxed_backend(config, Box::new(backend))
    }

    pub fn with_boxed_backend(config: RootConfig, backend: Box<dyn Backend>) -> Self {
        let mut services = Services::with_caches(PathResolver::from_exe(&config.assets_dir));
        services.blackboard = config.blackboard();
        let tree = Tree::with_services(config.name.clone(), services);

        let time =
            Time::new().with_fixed_step(config.fixed_step_ms.map(Duration::from_millis));
        let (w, h) = backend.surface_size();
        let frame = DrawList::new(Vec2::new(w as f32, h as f32), config.clear_color);

        log::debug!("root '{}' created ({w}x{h})", config.name);
        Self {
            tree,
            backend,
            time,
            config,
            frame,
            stats: FrameStats::default(),
            running: true,
            #[cfg(feature = "diagnostics")]
            diag: crate::diag::DiagSender::new(),
        }
    }

    /// Root driving a [`HeadlessBackend`] sized like the configured window.
    pub fn headless(config: RootConfig) -> Self {
        let backend = HeadlessBackend::new(config.width, config.height);
        Self::new(config, backend)
    }

    /// Root with a real window. Fails if the window or GPU cannot be set up.
    #[cfg(feature = "window")]
    pub fn windowed(config: RootConfig) -> Result<Self> {
        let backend = crate::backend::WindowBackend::new(&config)?;
        Ok(Self::new(config, backend))
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn tree_mut(&mut self) -> &mut Tree {
        &mut self.tree
    }

    /// Attach a top-level node under the root.
    pub fn attach(&mut self, name: impl Into<String>, behavior: impl Behavior) -> Result<NodeId> {
        let root = self.tree.root();
        self.tree.attach(root, name, behavior)
    }

    pub fn config(&self) -> &RootConfig {
        &self.config
    }

    pub fn time(&self) -> &Time {
        &self.time
    }

    pub fn stats(&self) -> &FrameStats {
        &self.stats
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// The most recent frame's draw commands.
    pub fn frame(&self) -> &DrawList {
        &self.frame
    }

    pub fn backend_as<T: Backend>(&self) -> Option<&T> {
        let backend: &dyn Backend = &*self.backend;
        backend.as_any().downcast_ref::<T>()
    }

    pub fn backend_as_mut<T: Backend>(&mut self) -> Option<&mut T> {
        let backend: &mut dyn Backend = &mut *self.backend;
        backend.as_any_mut().downcast_mut::<T>()
    }

    /// Stop after the current frame.
    pub fn stop(&mut self) {
        self.running = false;
    }

    /// Run one frame. Returns whether the loop should keep going.
    pub fn step(&mut self) -> Result<bool> {
        if !self.running {
            return Ok(false);
        }
        if self.time.frame_count() == 0 {
            self.time.restart_clock();
        }
        let mut stats = FrameStats::default();

        // Events
        let start = Instant::now();
        let events = self.backend.poll_events()?;
        stats.events = events.len();
        for event in &events {
            self.tree.input_mut().apply(event);
            self.tree.pulse_event(event)?;
            if *event == InputEvent::Quit {
                log::info!("quit event received");
                self.running = false;
            }
        }
        stats.event_us = micros(start);

        // Time
        let start = Instant::now();
        self.time.tick();
        self.tree.pulse_time(self.time.delta_secs())?;
        stats.time_us = micros(start);

        // Mail
        let start = Instant::now();
        while let Some(mail) = self.tree.services_mut().mailbox.drain_one() {
            stats.mail_drained += 1;
            self.control(&mail);
            stats.mail_delivered += self.tree.pulse_mail(&mail)?;
        }
        stats.mail_us = micros(start);

        // Render
        let start = Instant::now();
        let (w, h) = self.backend.surface_size();
        self.frame.reset(Vec2::new(w as f32, h as f32));
        self.tree.pulse_render(&mut self.frame)?;
        stats.draw_commands = self.frame.len();
        self.backend.present(&self.frame, self.tree.services())?;
        stats.render_us = micros(start);

        self.tree.input_mut().end_frame();
        if self.tree.take_quit_request() {
            self.running = false;
        }
        self.stats = stats;

        #[cfg(feature = "diagnostics")]
        if let Some(diag) = &mut self.diag {
            diag.send(&self.tree, &self.time, &self.stats);
        }

        Ok(self.running)
    }

    /// Run up to `frames` frames, stopping early if the loop ends. Returns
    /// the number of frames run.
    pub fn run_frames(&mut self, frames: u64) -> Result<u64> {
        let mut ran = 0;
        while ran < frames && self.running {
            self.step()?;
            ran += 1;
        }
        Ok(ran)
    }

    /// Run until quit, sleeping `frame_delay_ms` between frames.
    pub fn run(&mut self) -> ExitCode {
        log::info!("'{}' running", self.config.title);
        let delay = Duration::from_millis(self.config.frame_delay_ms);
        loop {
            match self.step() {
                Ok(true) => {}
                Ok(false) => break,
                Err(err) => {
                    log::error!("frame aborted: {err}");
                    return ExitCode::FAILURE;
                }
            }
            if !delay.is_zero() {
                std::thread::sleep(delay);
            }
        }
        log::info!(
            "'{}' stopped after {} frames",
            self.config.title,
            self.time.frame_count()
        );
        ExitCode::SUCCESS
    }

    fn control(&mut self, mail: &Mail) {
        let to_root = mail.to.as_deref() == Some(self.config.name.as_str());
        match mail.subject.as_str() {
            "quit" if to_root => {
                log::info!("quit requested by '{}'", mail.from);
                self.running = false;
            }
            "show_tree" if to_root => log::debug!("tree:\n{}", self.tree.dump()),
            TREE_CHANGED => log::debug!("tree changed ({}):\n{}", mail.body, self.tree.dump()),
            _ => {}
        }
    }
}

fn micros(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1_000_000.0
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::input::Key;
    use crate::math::{Color, Rect};
    use crate::node::NodeCtx;
    use crate::render::{Canvas, DrawCommand};

    type Log = Rc<RefCell<Vec<String>>>;

    /// Records every hook it sees.
    struct Recorder {
        log: Log,
    }

    impl Behavior for Recorder {
        fn event(&mut self, ctx: &mut NodeCtx, event: &InputEvent) -> Result<()> {
            self.log.borrow_mut().push(format!("event:{}:{event:?}", ctx.name()));
            Ok(())
        }

        fn update(&mut self, ctx: &mut NodeCtx, _dt: f32) -> Result<()> {
            self.log.borrow_mut().push(format!("time:{}", ctx.name()));
            Ok(())
        }

        fn mail(&mut self, ctx: &mut NodeCtx, mail: &Mail) -> Result<()> {
            self.log
                .borrow_mut()
                .push(format!("mail:{}:{}", ctx.name(), mail.subject));
            Ok(())
        }

        fn render(&mut self, ctx: &mut NodeCtx, canvas: &mut dyn Canvas) -> Result<()> {
            self.log.borrow_mut().push(format!("render:{}", ctx.name()));
            canvas.fill_rect(Rect::new(0.0, 0.0, 1.0, 1.0), Color::BLACK);
            Ok(())
        }
    }

    fn config() -> RootConfig {
        RootConfig::new("game")
            .with_size(320, 200)
            .with_frame_delay_ms(0)
            .with_fixed_step_ms(10)
    }

    fn root_with_recorder(backend: HeadlessBackend) -> (Root, Log) {
        let log = Log::default();
        let mut root = Root::new(config(), backend);
        root.attach("probe", Recorder { log: log.clone() }).unwrap();
        (root, log)
    }

    #[test]
    fn pulses_run_in_frame_order() {
        let backend = HeadlessBackend::new(320, 200).with_frame([InputEvent::KeyDown(Key::Space)]);
        let (mut root, log) = root_with_recorder(backend);
        root.tree_mut()
            .services_mut()
            .mailbox
            .post(Mail::broadcast("test", "hello", ""));

        assert!(root.step().unwrap());
        assert_eq!(
            *log.borrow(),
            [
                "event:probe:KeyDown(Space)",
                "time:probe",
                "mail:probe:hello",
                "render:probe",
            ]
        );
        let stats = *root.stats();
        assert_eq!(stats.events, 1);
        assert_eq!(stats.mail_drained, 1);
        // "game" and "probe".
        assert_eq!(stats.mail_delivered, 2);
        assert_eq!(stats.draw_commands, 1);

        let backend = root.backend_as::<HeadlessBackend>().unwrap();
        assert_eq!(backend.frames_presented(), 1);
        assert_eq!(
            backend.last_frame().unwrap().commands()[0],
            DrawCommand::Rect {
                dst: Rect::new(0.0, 0.0, 1.0, 1.0),
                color: Color::BLACK,
            }
        );
    }

    #[test]
    fn input_state_is_visible_during_the_event_pulse_and_cleared_after() {
        struct Jumper {
            jumped: Rc<RefCell<bool>>,
        }
        impl Behavior for Jumper {
            fn event(&mut self, ctx: &mut NodeCtx, _event: &InputEvent) -> Result<()> {
                if ctx.input().keys.just_pressed(Key::Space) {
                    *self.jumped.borrow_mut() = true;
                }
                Ok(())
            }
        }

        let jumped = Rc::new(RefCell::new(false));
        let backend = HeadlessBackend::new(320, 200).with_frame([InputEvent::KeyDown(Key::Space)]);
        let mut root = Root::new(config(), backend);
        root.attach(
            "dino",
            Jumper {
                jumped: jumped.clone(),
            },
        )
        .unwrap();
        root.step().unwrap();
        assert!(*jumped.borrow());
        assert!(root.tree().input().keys.pressed(Key::Space));
        assert!(!root.tree().input().keys.just_pressed(Key::Space));
    }

    #[test]
    fn quit_mail_to_the_root_stops_the_loop() {
        let (mut root, log) = root_with_recorder(HeadlessBackend::new(320, 200));
        root.tree_mut()
            .services_mut()
            .mailbox
            .post(Mail::to("game", "referee", "quit", ""));
        assert!(!root.step().unwrap());
        assert!(!root.is_running());
        // The frame still completes.
        assert!(log.borrow().contains(&"render:probe".to_owned()));
        assert!(!root.step().unwrap());
    }

    #[test]
    fn quit_event_is_pulsed_then_stops_the_loop() {
        let backend = HeadlessBackend::new(320, 200).with_frame([InputEvent::Quit]);
        let (mut root, log) = root_with_recorder(backend);
        assert_eq!(root.run_frames(10).unwrap(), 1);
        assert_eq!(log.borrow()[0], "event:probe:Quit");
    }

    #[test]
    fn mail_posted_while_draining_is_handled_in_the_same_frame() {
        struct Ping;
        impl Behavior for Ping {
            fn update(&mut self, ctx: &mut NodeCtx, _dt: f32) -> Result<()> {
                ctx.mail_to("pong", "ping", "");
                Ok(())
            }
            fn mail(&mut self, ctx: &mut NodeCtx, mail: &Mail) -> Result<()> {
                if mail.subject == "pong" {
                    ctx.blackboard().set("pongs", 1.0);
                }
                Ok(())
            }
        }
        struct Pong;
        impl Behavior for Pong {
            fn mail(&mut self, ctx: &mut NodeCtx, mail: &Mail) -> Result<()> {
                if mail.subject == "ping" {
                    ctx.mail_to(&mail.from, "pong", "");
                }
                Ok(())
            }
        }

        let mut root = Root::headless(config());
        root.attach("ping", Ping).unwrap();
        root.attach("pong", Pong).unwrap();
        root.step().unwrap();
        assert_eq!(root.stats().mail_drained, 2);
        assert_eq!(root.tree().services().blackboard.get("pongs", 0.0), 1.0);
        assert!(root.tree().services().mailbox.is_empty());
    }

    #[test]
    fn request_quit_and_hook_errors() {
        struct Quitter;
        impl Behavior for Quitter {
            fn update(&mut self, ctx: &mut NodeCtx, _dt: f32) -> Result<()> {
                ctx.request_quit();
                Ok(())
            }
        }
        let mut root = Root::headless(config());
        root.attach("quitter", Quitter).unwrap();
        assert_eq!(root.run(), ExitCode::SUCCESS);
        assert_eq!(root.time().frame_count(), 1);

        struct Broken;
        impl Behavior for Broken {
            fn update(&mut self, ctx: &mut NodeCtx, _dt: f32) -> Result<()> {
                Err(ctx.fail("boom"))
            }
        }
        let mut root = Root::headless(config());
        root.attach("broken", Broken).unwrap();
        let err = root.step().unwrap_err();
        assert_eq!(err.node(), Some("broken"));
        assert_eq!(root.run(), ExitCode::FAILURE);
    }

    #[test]
    fn first_frame_delta_excludes_setup() {
        struct SlowInit;
        impl Behavior for SlowInit {
            fn init(&mut self, _ctx: &mut NodeCtx) -> Result<()> {
                std::thread::sleep(Duration::from_millis(50));
                Ok(())
            }
        }
        let mut root = Root::headless(RootConfig::new("game").with_frame_delay_ms(0));
        root.attach("loader", SlowInit).unwrap();
        root.step().unwrap();
        assert!(root.time().delta() < Duration::from_millis(50));
    }

    #[test]
    fn config_seeds_blackboard_and_time() {
        let root = Root::headless(config().with_setting("lives", 3.0));
        let bb = &root.tree().services().blackboard;
        assert_eq!(bb.get("lives", 0.0), 3.0);
        assert_eq!(bb.get("gravity", 0.0), 2400.0);
        assert!(root.tree().services().textures.is_some());
        assert_eq!(root.tree().name(root.tree().root()), Some("game"));

        let mut root = root;
        root.run_frames(3).unwrap();
        assert_eq!(root.time().elapsed(), Duration::from_millis(30));
    }
}
