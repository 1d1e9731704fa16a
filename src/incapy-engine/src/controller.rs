// Copyright 2026 The Incapy Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! The controller ties a [`LayoutEngine`], a [`WindowFeed`] and the
//! animation loop together behind one lock.
//!
//! All public entry points may be called from any thread, including from
//! inside an observer callback. Calls that would need the state lock while
//! the calling thread already holds it (the observer case) are ignored and
//! logged at debug level.

use std::sync::{Arc, Mutex, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::common::{Result, VertexId};
use crate::config::{EngineConfig, check_time_per_window};
use crate::config_err;
use crate::feed::WindowFeed;
use crate::geometry::Position;
use crate::guard::{InFlight, OwnedMutex, lock};
use crate::layout::LayoutEngine;
use crate::model::{Observer, ObserverId, UiEvent, WeightMatrix};
use crate::scheduler::{FrameTarget, Phase, RunSignal, run_loop};
use crate::source::DataSource;

/// Discrete UI commands.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Start,
    Stop,
    Pause,
    /// Resumes a paused loop, or starts a stopped one.
    Play,
    NextWindow,
    Reset,
}

/// A UI control whose value changed.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Setting {
    Repeat(bool),
    TimePerWindow(f64),
    CurrentWindow(usize),
    SpeedConstant(f64),
    RepulsiveConst(f64),
    EdgeThreshold(f64),
}

#[cfg_attr(feature = "debug-derive", derive(Debug))]
#[derive(Copy, Clone, Default, PartialEq)]
pub struct FrameStats {
    /// Frames stepped since the controller was created.
    pub frames: u64,
    /// The time delta used by the most recent frame, in seconds.
    pub last_dt: f64,
}

struct EngineState {
    engine: LayoutEngine,
    feed: WindowFeed,
    time_per_window: f64,
    window_started: Instant,
    stats: FrameStats,
    /// Windows received through [`Controller::push_window`].
    pushed: usize,
}

impl EngineState {
    fn install(&mut self, loaded: Option<(WeightMatrix, usize)>) -> Result<Option<usize>> {
        let Some((matrix, index)) = loaded else {
            return Ok(None);
        };
        self.engine.set_weights(matrix, index)?;
        self.window_started = Instant::now();
        debug!(window = index, "window applied");
        Ok(Some(index))
    }

    fn step(&mut self, dt: f64) {
        self.engine.step(dt);
        self.stats.frames += 1;
        self.stats.last_dt = dt;
    }
}

struct Inner {
    state: OwnedMutex<EngineState>,
    in_flight: InFlight,
    signal: Arc<RunSignal>,
    worker: Mutex<Option<JoinHandle<()>>>,
    dt_cap: f64,
    frame_interval: Duration,
}

impl Inner {
    fn with_state<R>(&self, f: impl FnOnce(&mut EngineState) -> R) -> Option<R> {
        match self.state.lock() {
            Some(mut state) => Some(f(&mut state)),
            None => {
                debug!("ignoring re-entrant call from an observer");
                None
            }
        }
    }

    /// Runs one weight-set sequence: load a window through the feed and
    /// install it. A second sequence entered while one is in flight, from
    /// any thread, is a no-op.
    fn apply_window(
        &self,
        load: impl FnOnce(&mut WindowFeed) -> Result<Option<(WeightMatrix, usize)>>,
    ) -> Result<Option<usize>> {
        let Some(_token) = self.in_flight.try_enter() else {
            debug!("window change already in flight");
            return Ok(None);
        };
        self.with_state(|state| {
            let loaded = load(&mut state.feed)?;
            state.install(loaded)
        })
        .unwrap_or(Ok(None))
    }

    fn apply_window_logged(
        &self,
        load: impl FnOnce(&mut WindowFeed) -> Result<Option<(WeightMatrix, usize)>>,
    ) {
        if let Err(err) = self.apply_window(load) {
            warn!(%err, "failed to load window");
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        // wakes a worker that outlived every handle
        self.signal.request_stop();
    }
}

/// The worker's view of the controller. It does not keep the engine alive:
/// once the last [`Controller`] is dropped every frame becomes a no-op and
/// the pending stop ends the loop.
struct Worker {
    inner: Weak<Inner>,
    dt_cap: f64,
    frame_interval: Duration,
}

impl Worker {
    fn with_inner(&self, f: impl FnOnce(&Inner)) {
        if let Some(inner) = self.inner.upgrade() {
            f(&inner);
        }
    }
}

impl FrameTarget for Worker {
    fn prime(&self) {
        self.with_inner(|inner| inner.apply_window_logged(|feed| feed.seek(0)));
    }

    fn advance_if_due(&self, now: Instant) {
        self.with_inner(|inner| {
            let due = inner.with_state(|state| {
                let age = now.saturating_duration_since(state.window_started);
                if age.as_secs_f64() > state.time_per_window {
                    state.window_started = now;
                    state.time_per_window != 0.0
                } else {
                    false
                }
            });
            if due == Some(true) {
                inner.apply_window_logged(WindowFeed::advance);
            }
        });
    }

    fn discount_pause(&self, paused_for: Duration) {
        self.with_inner(|inner| {
            inner.with_state(|state| state.window_started += paused_for);
        });
    }

    fn step(&self, dt: f64) {
        self.with_inner(|inner| {
            inner.with_state(|state| state.step(dt));
        });
    }

    fn dt_cap(&self) -> f64 {
        self.dt_cap
    }

    fn frame_interval(&self) -> Duration {
        self.frame_interval
    }
}

/// Handle to a layout engine and its animation loop. Clones share the same
/// engine.
///
/// Dropping the last handle stops a running loop; the worker exits after
/// its current frame. Observers that need to call back into the controller
/// should hold a [`WeakController`] to avoid a reference cycle.
#[derive(Clone)]
pub struct Controller {
    inner: Arc<Inner>,
}

#[derive(Clone)]
pub struct WeakController {
    inner: Weak<Inner>,
}

impl WeakController {
    pub fn upgrade(&self) -> Option<Controller> {
        self.inner.upgrade().map(|inner| Controller { inner })
    }
}

impl Controller {
    /// Loads the dataset from `source` and lays out its initial positions.
    /// No window is applied until the loop starts or a window is requested.
    pub fn new(mut source: impl DataSource + 'static, config: EngineConfig) -> Result<Controller> {
        config.validate()?;
        let dataset = source.load()?;

        let mut engine = LayoutEngine::new(&config);
        engine.initialize(dataset.vertex_ids, dataset.edges, dataset.positions)?;

        let feed = WindowFeed::new(Box::new(source), config.repeat);
        engine.model_mut().set_window_count(feed.window_count());
        info!(
            vertices = engine.model().vertex_count(),
            windows = ?feed.window_count(),
            "controller created"
        );

        let state = EngineState {
            engine,
            feed,
            time_per_window: config.time_per_window,
            window_started: Instant::now(),
            stats: FrameStats::default(),
            pushed: 0,
        };
        Ok(Controller {
            inner: Arc::new(Inner {
                state: OwnedMutex::new(state),
                in_flight: InFlight::new(),
                signal: Arc::new(RunSignal::new()),
                worker: Mutex::new(None),
                dt_cap: config.dt_cap,
                frame_interval: config.frame_interval(),
            }),
        })
    }

    pub fn downgrade(&self) -> WeakController {
        WeakController {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Registers an observer. It immediately receives the window count, if
    /// known. Returns `None` when called from inside an observer.
    pub fn add_observer(&self, mut observer: Box<dyn Observer>) -> Option<ObserverId> {
        self.inner.with_state(|state| {
            let model = state.engine.model_mut();
            if let Some(count) = model.window_count() {
                observer.on_ui_event(&UiEvent::WindowCount(count));
            }
            model.add_observer(observer)
        })
    }

    pub fn remove_observer(&self, id: ObserverId) -> bool {
        self.inner
            .with_state(|state| state.engine.model_mut().remove_observer(id))
            .unwrap_or(false)
    }

    /// Spawns the animation worker. Returns false if a worker is already
    /// running or the call comes from inside an observer.
    pub fn start(&self) -> bool {
        if self.inner.state.held_by_current() {
            debug!("ignoring start from inside an observer");
            return false;
        }

        let mut worker = lock(&self.inner.worker);
        if self.inner.signal.phase() != Phase::Stopped && !self.inner.signal.stop_pending() {
            warn!("animation already running");
            return false;
        }
        if let Some(previous) = worker.take()
            && previous.join().is_err()
        {
            warn!("previous animation worker panicked");
        }

        self.inner.with_state(|state| state.window_started = Instant::now());
        self.inner.signal.begin();

        let worker_target = Worker {
            inner: Arc::downgrade(&self.inner),
            dt_cap: self.inner.dt_cap,
            frame_interval: self.inner.frame_interval,
        };
        let signal = self.inner.signal.clone();
        let spawned = thread::Builder::new()
            .name("incapy-animation".to_owned())
            .spawn(move || run_loop(&worker_target, &signal));
        match spawned {
            Ok(handle) => {
                *worker = Some(handle);
                true
            }
            Err(err) => {
                warn!(%err, "failed to spawn animation worker");
                self.inner.signal.finish();
                false
            }
        }
    }

    /// Asks the worker to exit after its current frame. Does not wait.
    pub fn stop(&self) -> bool {
        self.inner.signal.request_stop()
    }

    pub fn pause(&self) -> bool {
        self.inner.signal.pause()
    }

    pub fn resume(&self) -> bool {
        self.inner.signal.resume()
    }

    /// Waits for the worker to exit. A no-op on the worker thread itself
    /// and inside observers, where the worker could never finish its frame.
    pub fn join(&self) {
        if self.inner.state.held_by_current() {
            debug!("ignoring join from inside an observer");
            return;
        }
        let handle = {
            let mut worker = lock(&self.inner.worker);
            match worker.as_ref() {
                Some(handle) if handle.thread().id() == thread::current().id() => {
                    debug!("ignoring join from the animation worker");
                    return;
                }
                _ => worker.take(),
            }
        };
        if let Some(handle) = handle
            && handle.join().is_err()
        {
            warn!("animation worker panicked");
        }
    }

    pub fn phase(&self) -> Phase {
        self.inner.signal.phase()
    }

    /// Stops the loop, restores the initial positions and rewinds the feed.
    pub fn reset(&self) {
        if self.inner.state.held_by_current() {
            debug!("ignoring reset from inside an observer");
            return;
        }
        self.stop();
        self.join();
        self.inner.with_state(|state| {
            state.engine.reset();
            state.feed.reset();
            state.pushed = 0;
            state.window_started = Instant::now();
            let count = state.feed.window_count();
            state.engine.model_mut().set_window_count(count);
        });
        info!("controller reset");
    }

    /// Applies window `index`, or the next window when `index` is `None`.
    /// Returns the index applied, or `None` when nothing changed: the
    /// requested window is already current, the feed is exhausted without
    /// `repeat`, or another window change is in flight.
    pub fn next_window(&self, index: Option<usize>) -> Result<Option<usize>> {
        match index {
            Some(index) => self.inner.apply_window(|feed| feed.seek(index)),
            None => self.inner.apply_window(WindowFeed::advance),
        }
    }

    /// Installs a matrix that did not come from the feed, e.g. one computed
    /// live. Pushed windows are numbered from 0 in arrival order. Returns
    /// false when another window change is in flight.
    pub fn push_window(&self, matrix: WeightMatrix) -> Result<bool> {
        let Some(_token) = self.inner.in_flight.try_enter() else {
            debug!("window change already in flight, dropping pushed window");
            return Ok(false);
        };
        self.inner
            .with_state(|state| {
                let index = state.pushed;
                state.install(Some((matrix, index)))?;
                state.pushed += 1;
                Ok(true)
            })
            .unwrap_or(Ok(false))
    }

    pub fn set_edge_threshold(&self, threshold: f64) -> Result<()> {
        if !threshold.is_finite() {
            return config_err!(format!("edge_threshold must be finite, got {threshold}"));
        }
        self.inner
            .with_state(|state| state.engine.set_edge_threshold(threshold));
        Ok(())
    }

    pub fn set_anim_speed_const(&self, value: f64) -> Result<()> {
        self.inner
            .with_state(|state| state.engine.set_anim_speed_const(value))
            .unwrap_or(Ok(()))
    }

    pub fn set_repulsive_const(&self, value: f64) -> Result<()> {
        self.inner
            .with_state(|state| state.engine.set_repulsive_const(value))
            .unwrap_or(Ok(()))
    }

    /// Zero disables automatic advancing.
    pub fn set_time_per_window(&self, seconds: f64) -> Result<()> {
        check_time_per_window(seconds)?;
        self.inner.with_state(|state| {
            state.time_per_window = seconds;
            state
                .engine
                .model_mut()
                .emit(&UiEvent::TimePerWindow(seconds));
        });
        Ok(())
    }

    pub fn set_repeat(&self, repeat: bool) {
        self.inner.with_state(|state| {
            state.feed.set_repeat(repeat);
            state.engine.model_mut().emit(&UiEvent::Repeat(repeat));
        });
    }

    pub fn handle_command(&self, command: Command) -> Result<()> {
        debug!(?command, "command");
        match command {
            Command::Start => {
                self.start();
            }
            Command::Stop => {
                self.stop();
            }
            Command::Pause => {
                self.pause();
            }
            Command::Play => {
                if self.phase() == Phase::Paused {
                    self.resume();
                } else {
                    self.start();
                }
            }
            Command::NextWindow => {
                self.next_window(None)?;
            }
            Command::Reset => self.reset(),
        }
        Ok(())
    }

    pub fn apply_setting(&self, setting: Setting) -> Result<()> {
        debug!(?setting, "setting changed");
        match setting {
            Setting::Repeat(repeat) => self.set_repeat(repeat),
            Setting::TimePerWindow(seconds) => self.set_time_per_window(seconds)?,
            Setting::CurrentWindow(index) => {
                self.next_window(Some(index))?;
            }
            Setting::SpeedConstant(value) => self.set_anim_speed_const(value)?,
            Setting::RepulsiveConst(value) => self.set_repulsive_const(value)?,
            Setting::EdgeThreshold(threshold) => self.set_edge_threshold(threshold)?,
        }
        Ok(())
    }

    /// Advances the layout by one frame of `dt` seconds on the calling
    /// thread. Returns false when called from inside an observer.
    pub fn step_once(&self, dt: f64) -> bool {
        self.inner.with_state(|state| state.step(dt)).is_some()
    }

    // Queries below return empty values when called from inside an
    // observer; observers get the same data from their GraphUpdate.

    pub fn positions(&self) -> Vec<Position> {
        self.inner
            .with_state(|state| state.engine.positions().to_vec())
            .unwrap_or_default()
    }

    pub fn vertex_ids(&self) -> Vec<VertexId> {
        self.inner
            .with_state(|state| state.engine.model().vertex_ids().to_vec())
            .unwrap_or_default()
    }

    pub fn visible_edges(&self) -> (Vec<usize>, Vec<usize>) {
        self.inner
            .with_state(|state| state.engine.visible_edges())
            .unwrap_or_default()
    }

    pub fn edge_threshold(&self) -> Option<f64> {
        self.inner.with_state(|state| state.engine.edge_threshold())
    }

    pub fn current_window(&self) -> Option<usize> {
        self.inner
            .with_state(|state| state.engine.model().window())
            .flatten()
    }

    pub fn window_count(&self) -> Option<usize> {
        self.inner
            .with_state(|state| state.feed.window_count())
            .flatten()
    }

    pub fn stats(&self) -> FrameStats {
        self.inner
            .with_state(|state| state.stats)
            .unwrap_or_default()
    }
}
