// Copyright 2026 The Incapy Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Wall-clock paced animation loop.
//!
//! The loop runs on one background thread. Callers steer it through a
//! [`RunSignal`]: pause parks the worker on a condition variable, resume and
//! stop wake it. Stop is cooperative and only observed at the top of an
//! iteration or while the worker waits.

use std::sync::{Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::guard::lock;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Phase {
    Stopped,
    Running,
    Paused,
}

struct RunState {
    phase: Phase,
    stop_requested: bool,
}

/// Outcome of waiting at the top of an iteration.
#[derive(Copy, Clone, Debug, PartialEq)]
pub(crate) enum Wake {
    Stop,
    Continue,
    /// The worker was parked for this long before being resumed.
    Resumed(Duration),
}

pub(crate) struct RunSignal {
    state: Mutex<RunState>,
    cond: Condvar,
}

impl RunSignal {
    pub(crate) fn new() -> Self {
        RunSignal {
            state: Mutex::new(RunState {
                phase: Phase::Stopped,
                stop_requested: false,
            }),
            cond: Condvar::new(),
        }
    }

    pub(crate) fn phase(&self) -> Phase {
        lock(&self.state).phase
    }

    pub(crate) fn stop_pending(&self) -> bool {
        lock(&self.state).stop_requested
    }

    /// Marks a fresh run as started.
    pub(crate) fn begin(&self) {
        let mut state = lock(&self.state);
        state.phase = Phase::Running;
        state.stop_requested = false;
    }

    pub(crate) fn pause(&self) -> bool {
        let mut state = lock(&self.state);
        if state.phase != Phase::Running || state.stop_requested {
            return false;
        }
        state.phase = Phase::Paused;
        self.cond.notify_all();
        true
    }

    pub(crate) fn resume(&self) -> bool {
        let mut state = lock(&self.state);
        if state.phase != Phase::Paused || state.stop_requested {
            return false;
        }
        state.phase = Phase::Running;
        self.cond.notify_all();
        true
    }

    /// Asks the worker to exit. Returns false if nothing is running.
    pub(crate) fn request_stop(&self) -> bool {
        let mut state = lock(&self.state);
        if state.phase == Phase::Stopped {
            return false;
        }
        state.stop_requested = true;
        self.cond.notify_all();
        true
    }

    /// Called by the worker on its way out.
    pub(crate) fn finish(&self) {
        let mut state = lock(&self.state);
        state.phase = Phase::Stopped;
        state.stop_requested = false;
        self.cond.notify_all();
    }

    /// Blocks while paused. A stop seen on wake-up wins over resuming.
    pub(crate) fn wait_runnable(&self) -> Wake {
        let mut state = lock(&self.state);
        let mut parked_at = None;
        while state.phase == Phase::Paused && !state.stop_requested {
            parked_at.get_or_insert_with(Instant::now);
            state = self
                .cond
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        if state.stop_requested {
            return Wake::Stop;
        }
        match parked_at {
            Some(at) => Wake::Resumed(at.elapsed()),
            None => Wake::Continue,
        }
    }

    /// Sleeps until `deadline`, returning early on pause or stop.
    pub(crate) fn sleep_until(&self, deadline: Instant) {
        let mut state = lock(&self.state);
        loop {
            if state.stop_requested || state.phase != Phase::Running {
                return;
            }
            let now = Instant::now();
            if now >= deadline {
                return;
            }
            state = self
                .cond
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }
}

/// The work done on each frame, supplied by the controller.
pub(crate) trait FrameTarget {
    /// Loads the first window before the first frame.
    fn prime(&self);

    /// Advances to the next window if the current one has been shown for
    /// longer than `time_per_window`.
    fn advance_if_due(&self, now: Instant);

    /// Shifts the window timer so paused time does not count.
    fn discount_pause(&self, paused_for: Duration);

    fn step(&self, dt: f64);

    fn dt_cap(&self) -> f64;

    fn frame_interval(&self) -> Duration;
}

/// Runs frames until a stop is requested.
pub(crate) fn run_loop<T: FrameTarget + ?Sized>(target: &T, signal: &RunSignal) {
    info!("animation loop started");
    target.prime();

    let mut last = Instant::now();
    let mut frames: u64 = 0;
    loop {
        match signal.wait_runnable() {
            Wake::Stop => break,
            Wake::Continue => {}
            Wake::Resumed(paused_for) => {
                debug!(paused_ms = paused_for.as_millis() as u64, "animation resumed");
                last = Instant::now();
                target.discount_pause(paused_for);
            }
        }

        let frame_start = Instant::now();
        let dt = frame_start
            .duration_since(last)
            .as_secs_f64()
            .min(target.dt_cap());
        last = frame_start;

        target.advance_if_due(frame_start);
        target.step(dt);
        frames += 1;

        signal.sleep_until(frame_start + target.frame_interval());
    }

    signal.finish();
    info!(frames, "animation loop stopped");
}
