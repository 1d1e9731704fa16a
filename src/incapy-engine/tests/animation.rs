// Copyright 2026 The Incapy Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::collections::HashSet;
use std::sync::mpsc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use ndarray::Array2;

use incapy_engine::{
    Controller, DataSource, Dataset, EngineConfig, Error, ErrorCode, ErrorKind, GraphUpdate,
    Observer, Phase, Position, Result, SeriesSource, Setting, StreamSource, SyntheticSource,
    UiEvent, WeakController, WeightMatrix,
};

const PATIENCE: Duration = Duration::from_secs(5);

fn wait_until(mut done: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + PATIENCE;
    while Instant::now() < deadline {
        if done() {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    done()
}

/// Joins on a helper thread so a hung worker fails the test instead of
/// hanging it.
fn join_within(controller: &Controller, limit: Duration) -> bool {
    let (tx, rx) = mpsc::channel();
    let controller = controller.clone();
    thread::spawn(move || {
        controller.join();
        let _ = tx.send(());
    });
    rx.recv_timeout(limit).is_ok()
}

fn shutdown(controller: &Controller) {
    controller.stop();
    assert!(join_within(controller, PATIENCE), "worker did not exit");
    assert_eq!(controller.phase(), Phase::Stopped);
}

fn fast_config() -> EngineConfig {
    EngineConfig {
        frame_interval_ms: 2,
        time_per_window: 0.0,
        ..EngineConfig::default()
    }
}

fn series(correlations: &[f64]) -> SeriesSource {
    let dataset = Dataset {
        vertex_ids: vec![1, 2, 3],
        edges: vec![(0, 1), (1, 2), (0, 2)],
        positions: vec![
            Position::new(0.0, 0.0),
            Position::new(1.0, 0.0),
            Position::new(0.0, 1.0),
        ],
        window_count: None,
    };
    let windows = correlations
        .iter()
        .map(|&corr| {
            let mut matrix = Array2::from_elem((3, 3), corr);
            matrix.diag_mut().fill(1.0);
            Arc::new(matrix)
        })
        .collect();
    SeriesSource::new(dataset, windows).unwrap()
}

#[derive(Default)]
struct Seen {
    updates: usize,
    threads: HashSet<ThreadId>,
    windows: Vec<usize>,
}

struct Recorder(Arc<Mutex<Seen>>);

impl Observer for Recorder {
    fn on_update(&mut self, _update: &GraphUpdate<'_>) {
        let mut seen = self.0.lock().unwrap();
        seen.updates += 1;
        seen.threads.insert(thread::current().id());
    }

    fn on_ui_event(&mut self, event: &UiEvent) {
        if let UiEvent::WindowChanged(window) = event {
            self.0.lock().unwrap().windows.push(*window);
        }
    }
}

fn recorded(controller: &Controller) -> Arc<Mutex<Seen>> {
    let seen = Arc::new(Mutex::new(Seen::default()));
    controller.add_observer(Box::new(Recorder(seen.clone())));
    seen
}

#[test]
fn double_start_spawns_one_worker() {
    let controller = Controller::new(SyntheticSource::new(3, 2, 1), fast_config()).unwrap();
    let seen = recorded(&controller);

    assert!(controller.start());
    assert!(!controller.start());
    assert_eq!(controller.phase(), Phase::Running);

    assert!(wait_until(|| controller.stats().frames >= 10));
    shutdown(&controller);

    let seen = seen.lock().unwrap();
    assert_eq!(seen.threads.len(), 1);
    assert!(!seen.threads.contains(&thread::current().id()));
}

#[test]
fn restart_after_stop() {
    let controller = Controller::new(SyntheticSource::new(2, 2, 3), fast_config()).unwrap();
    assert!(controller.start());
    assert!(controller.stop());
    // a stopping worker is joined before the new one is spawned
    assert!(controller.start());
    assert!(wait_until(|| controller.stats().frames >= 3));
    shutdown(&controller);
}

#[test]
fn pause_holds_frames_and_resume_measures_from_resume() {
    let config = EngineConfig {
        frame_interval_ms: 100,
        dt_cap: 10.0,
        time_per_window: 0.0,
        ..EngineConfig::default()
    };
    let controller = Controller::new(SyntheticSource::new(3, 1, 5), config).unwrap();
    assert!(controller.start());
    assert!(wait_until(|| controller.stats().frames >= 2));

    assert!(controller.pause());
    assert!(!controller.pause());
    thread::sleep(Duration::from_millis(50));
    assert_eq!(controller.phase(), Phase::Paused);

    let frames = controller.stats().frames;
    let positions = controller.positions();
    thread::sleep(Duration::from_millis(400));
    assert_eq!(controller.stats().frames, frames);
    assert_eq!(controller.positions(), positions);

    assert!(controller.resume());
    assert!(wait_until(|| controller.stats().frames > frames));
    let stats = controller.stats();
    assert!(
        stats.last_dt < 0.25,
        "dt {} includes the paused time",
        stats.last_dt
    );

    shutdown(&controller);
}

#[test]
fn stop_while_paused_terminates_promptly() {
    let controller = Controller::new(SyntheticSource::new(3, 2, 9), fast_config()).unwrap();
    assert!(controller.start());
    assert!(wait_until(|| controller.stats().frames >= 1));
    assert!(controller.pause());
    thread::sleep(Duration::from_millis(20));

    let stopped_at = Instant::now();
    assert!(controller.stop());
    assert!(join_within(&controller, Duration::from_secs(2)));
    assert!(stopped_at.elapsed() < Duration::from_secs(2));
    assert_eq!(controller.phase(), Phase::Stopped);
    assert!(!controller.resume());
}

struct Meddler {
    controller: WeakController,
    calls: Arc<Mutex<usize>>,
}

impl Observer for Meddler {
    fn on_update(&mut self, _update: &GraphUpdate<'_>) {
        let Some(controller) = self.controller.upgrade() else {
            return;
        };
        let matrix = Arc::new(Array2::from_elem((4, 4), 0.5));
        assert!(!controller.push_window(matrix).unwrap());
        assert_eq!(controller.next_window(None).unwrap(), None);
        controller.set_edge_threshold(0.1).unwrap();
        controller.set_repeat(true);
        assert!(!controller.step_once(0.01));
        assert!(!controller.start());
        controller.reset();
        controller.join();
        *self.calls.lock().unwrap() += 1;
    }
}

#[test]
fn reentrant_observer_calls_complete() {
    let config = EngineConfig {
        time_per_window: 0.01,
        ..fast_config()
    };
    let controller = Controller::new(SyntheticSource::new(2, 5, 11), config).unwrap();
    let calls = Arc::new(Mutex::new(0));
    controller.add_observer(Box::new(Meddler {
        controller: controller.downgrade(),
        calls: calls.clone(),
    }));

    assert!(controller.start());
    assert!(wait_until(|| *calls.lock().unwrap() >= 20));
    shutdown(&controller);

    // calls from outside an observer still go through
    assert!(controller.step_once(0.01));
}

#[test]
fn seek_to_current_window_is_noop() {
    let controller = Controller::new(series(&[0.1, 0.2, 0.3]), fast_config()).unwrap();
    let seen = recorded(&controller);

    assert_eq!(controller.next_window(Some(1)).unwrap(), Some(1));
    let updates = seen.lock().unwrap().updates;
    assert_eq!(updates, 1);

    controller.apply_setting(Setting::CurrentWindow(1)).unwrap();
    assert_eq!(seen.lock().unwrap().updates, updates);
    assert_eq!(seen.lock().unwrap().windows, vec![1]);
}

#[test]
fn advance_wraps_only_with_repeat() {
    let config = EngineConfig {
        edge_threshold: 0.25,
        ..fast_config()
    };
    let controller = Controller::new(series(&[0.1, 0.2, 0.3]), config).unwrap();
    for expected in 0..3 {
        assert_eq!(controller.next_window(None).unwrap(), Some(expected));
    }
    let (sources, _) = controller.visible_edges();
    assert_eq!(sources.len(), 3);

    assert_eq!(controller.next_window(None).unwrap(), None);
    assert_eq!(controller.current_window(), Some(2));
    // the last window's weights stay in place; recomputing the mask from
    // them still shows every edge
    controller.set_edge_threshold(0.25).unwrap();
    let (sources, _) = controller.visible_edges();
    assert_eq!(sources.len(), 3);

    controller.apply_setting(Setting::Repeat(true)).unwrap();
    assert_eq!(controller.next_window(None).unwrap(), Some(0));
}

#[test]
fn reset_restores_initial_positions() {
    let controller = Controller::new(SyntheticSource::new(4, 3, 2), fast_config()).unwrap();
    let initial = controller.positions();

    assert!(controller.start());
    assert!(wait_until(|| controller.stats().frames >= 20));
    controller.reset();

    assert_eq!(controller.phase(), Phase::Stopped);
    assert_eq!(controller.positions(), initial);
    assert_eq!(controller.current_window(), None);
    assert_eq!(controller.visible_edges(), (vec![], vec![]));
}

#[test]
fn windows_advance_on_timer() {
    let config = EngineConfig {
        time_per_window: 0.05,
        repeat: true,
        ..fast_config()
    };
    let controller = Controller::new(series(&[0.1, 0.2, 0.3]), config).unwrap();
    let seen = recorded(&controller);

    assert!(controller.start());
    assert!(wait_until(|| seen.lock().unwrap().windows.len() >= 5));
    shutdown(&controller);

    let windows = seen.lock().unwrap().windows.clone();
    assert_eq!(&windows[..5], &[0, 1, 2, 0, 1]);
}

#[test]
fn zero_time_per_window_never_advances() {
    let controller = Controller::new(series(&[0.1, 0.2, 0.3]), fast_config()).unwrap();
    let seen = recorded(&controller);

    assert!(controller.start());
    assert!(wait_until(|| controller.stats().frames >= 50));
    shutdown(&controller);

    assert_eq!(seen.lock().unwrap().windows, vec![0]);
    assert_eq!(controller.current_window(), Some(0));
}

#[test]
fn stream_windows_are_applied_as_they_arrive() {
    let (source, sender) = StreamSource::new(Dataset::grid(2)).unwrap();
    let config = EngineConfig {
        time_per_window: 0.01,
        edge_threshold: 0.5,
        ..fast_config()
    };
    let controller = Controller::new(source, config).unwrap();
    assert_eq!(controller.window_count(), None);

    assert!(controller.start());
    thread::sleep(Duration::from_millis(30));
    assert_eq!(controller.current_window(), None);

    sender.send(Arc::new(Array2::from_elem((4, 4), 0.9))).unwrap();
    assert!(wait_until(|| controller.current_window() == Some(0)));
    assert!(wait_until(|| !sender.is_pending()));
    let (sources, _) = controller.visible_edges();
    assert_eq!(sources.len(), 6);

    sender.send(Arc::new(Array2::from_elem((4, 4), 0.1))).unwrap();
    assert!(wait_until(|| controller.current_window() == Some(1)));
    assert_eq!(controller.visible_edges(), (vec![], vec![]));

    shutdown(&controller);
}

/// Serves windows from a series but fails to decode window 1.
struct Flaky {
    inner: SeriesSource,
    calls: Arc<AtomicUsize>,
}

impl DataSource for Flaky {
    fn load(&mut self) -> Result<Dataset> {
        self.inner.load()
    }

    fn window_count(&self) -> Option<usize> {
        self.inner.window_count()
    }

    fn window(&mut self, index: usize) -> Result<WeightMatrix> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if index == 1 {
            return Err(Error::new(
                ErrorKind::Data,
                ErrorCode::DatasetDecode,
                Some("corrupt window 1".to_owned()),
            ));
        }
        self.inner.window(index)
    }
}

#[test]
fn feed_errors_do_not_stop_the_loop() {
    let calls = Arc::new(AtomicUsize::new(0));
    let source = Flaky {
        inner: series(&[0.1, 0.2, 0.3]),
        calls: calls.clone(),
    };
    let config = EngineConfig {
        time_per_window: 0.01,
        ..fast_config()
    };
    let controller = Controller::new(source, config).unwrap();

    assert!(controller.start());
    assert!(wait_until(|| calls.load(Ordering::SeqCst) >= 3));
    let frames = controller.stats().frames;
    assert!(wait_until(|| controller.stats().frames > frames + 5));

    assert_eq!(controller.phase(), Phase::Running);
    assert_eq!(controller.current_window(), Some(0));
    shutdown(&controller);
}

#[test]
fn concurrent_pushes_do_not_block_the_loop() {
    let controller = Controller::new(SyntheticSource::new(2, 1, 8), fast_config()).unwrap();
    assert!(controller.start());
    assert!(wait_until(|| controller.stats().frames >= 1));
    let frames = controller.stats().frames;

    let producers: Vec<_> = (0..3)
        .map(|_| {
            let controller = controller.clone();
            thread::spawn(move || {
                let matrix = Arc::new(Array2::from_elem((4, 4), 0.5));
                let deadline = Instant::now() + Duration::from_millis(300);
                let (mut accepted, mut slowest) = (0usize, Duration::ZERO);
                while Instant::now() < deadline {
                    let called_at = Instant::now();
                    if controller.push_window(matrix.clone()).unwrap() {
                        accepted += 1;
                    }
                    slowest = slowest.max(called_at.elapsed());
                }
                (accepted, slowest)
            })
        })
        .collect();

    let mut accepted = 0;
    for producer in producers {
        let (count, slowest) = producer.join().unwrap();
        assert!(slowest < Duration::from_secs(1), "push took {slowest:?}");
        accepted += count;
    }

    assert!(accepted >= 1);
    assert_eq!(controller.current_window(), Some(accepted - 1));
    assert!(wait_until(|| controller.stats().frames > frames + 5));
    shutdown(&controller);
}
