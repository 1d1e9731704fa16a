// Copyright 2026 The Incapy Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Graph state container and observer registry.
//!
//! `GraphModel` is the single source of truth for what observers see. Every
//! mutation pushes a [`GraphUpdate`] synchronously to all observers in
//! registration order; there is no coalescing, so observers that render must
//! be cheap or debounce on their own.

use std::collections::HashMap;
use std::sync::Arc;

use ndarray::Array2;
use serde::Serialize;

use crate::common::VertexId;
use crate::geometry::Position;

/// A dense `n x n` matrix of raw correlations for one window.
pub type WeightMatrix = Arc<Array2<f64>>;

/// Snapshot pushed to observers after every mutation. Only edges whose
/// visibility flag is set are included.
#[derive(Clone, Copy, Debug)]
pub struct GraphUpdate<'a> {
    pub edge_sources: &'a [usize],
    pub edge_targets: &'a [usize],
    pub positions: &'a [Position],
    pub vertex_ids: &'a [VertexId],
}

/// Parameter echoes for UI controls.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", content = "value", rename_all = "snake_case")]
pub enum UiEvent {
    WindowCount(usize),
    WindowChanged(usize),
    SpeedConstant(f64),
    TimePerWindow(f64),
    Repeat(bool),
    EdgeThreshold(f64),
}

impl UiEvent {
    pub fn name(&self) -> &'static str {
        match self {
            UiEvent::WindowCount(_) => "window_count",
            UiEvent::WindowChanged(_) => "window_changed",
            UiEvent::SpeedConstant(_) => "speed_constant",
            UiEvent::TimePerWindow(_) => "time_per_window",
            UiEvent::Repeat(_) => "repeat",
            UiEvent::EdgeThreshold(_) => "edge_threshold",
        }
    }
}

/// Receiver of model notifications. Callbacks run on whichever thread
/// performed the mutation, while the engine state is locked.
pub trait Observer: Send {
    fn on_update(&mut self, update: &GraphUpdate<'_>);

    fn on_ui_event(&mut self, _event: &UiEvent) {}
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

pub struct GraphModel {
    vertex_ids: Vec<VertexId>,
    index_of: HashMap<VertexId, usize>,
    positions: Vec<Position>,
    edges: Vec<(usize, usize)>,
    raw_weights: Option<WeightMatrix>,
    force_weights: Array2<f64>,
    edge_mask: Vec<bool>,
    window: Option<usize>,
    window_count: Option<usize>,
    observers: Vec<(ObserverId, Box<dyn Observer>)>,
    next_observer: u64,
}

impl Default for GraphModel {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphModel {
    pub fn new() -> Self {
        Self {
            vertex_ids: Vec::new(),
            index_of: HashMap::new(),
            positions: Vec::new(),
            edges: Vec::new(),
            raw_weights: None,
            force_weights: Array2::zeros((0, 0)),
            edge_mask: Vec::new(),
            window: None,
            window_count: None,
            observers: Vec::new(),
            next_observer: 0,
        }
    }

    pub fn add_observer(&mut self, observer: Box<dyn Observer>) -> ObserverId {
        let id = ObserverId(self.next_observer);
        self.next_observer += 1;
        self.observers.push((id, observer));
        id
    }

    /// Deregisters an observer. Returns false if `id` was not registered.
    pub fn remove_observer(&mut self, id: ObserverId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(oid, _)| *oid != id);
        self.observers.len() != before
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    pub fn vertex_ids(&self) -> &[VertexId] {
        &self.vertex_ids
    }

    pub fn index_of(&self, id: VertexId) -> Option<usize> {
        self.index_of.get(&id).copied()
    }

    pub fn vertex_count(&self) -> usize {
        self.vertex_ids.len()
    }

    pub fn positions(&self) -> &[Position] {
        &self.positions
    }

    pub fn edges(&self) -> &[(usize, usize)] {
        &self.edges
    }

    pub fn raw_weights(&self) -> Option<&WeightMatrix> {
        self.raw_weights.as_ref()
    }

    pub fn force_weights(&self) -> &Array2<f64> {
        &self.force_weights
    }

    pub fn edge_mask(&self) -> &[bool] {
        &self.edge_mask
    }

    pub fn window(&self) -> Option<usize> {
        self.window
    }

    pub fn window_count(&self) -> Option<usize> {
        self.window_count
    }

    /// Edges whose visibility flag is set, split into source and target lists.
    pub fn visible_edges(&self) -> (Vec<usize>, Vec<usize>) {
        self.edges
            .iter()
            .zip(self.edge_mask.iter())
            .filter(|(_, visible)| **visible)
            .map(|(&edge, _)| edge)
            .unzip()
    }

    /// Replaces the whole topology. Weights and mask are cleared. Callers
    /// are expected to have validated the inputs.
    pub(crate) fn set_topology(
        &mut self,
        vertex_ids: Vec<VertexId>,
        edges: Vec<(usize, usize)>,
        positions: Vec<Position>,
    ) {
        let n = vertex_ids.len();
        self.index_of = vertex_ids
            .iter()
            .enumerate()
            .map(|(index, &id)| (id, index))
            .collect();
        self.vertex_ids = vertex_ids;
        self.edge_mask = vec![false; edges.len()];
        self.edges = edges;
        self.positions = positions;
        self.raw_weights = None;
        self.force_weights = Array2::zeros((n, n));
        self.window = None;
        self.notify();
    }

    pub(crate) fn set_positions(&mut self, positions: Vec<Position>) {
        debug_assert_eq!(positions.len(), self.positions.len());
        self.positions = positions;
        self.notify();
    }

    /// Installs a new window: raw matrix, derived force weights and mask are
    /// replaced together, then `WindowChanged` and a graph update are pushed.
    pub(crate) fn set_window(
        &mut self,
        raw: WeightMatrix,
        force_weights: Array2<f64>,
        edge_mask: Vec<bool>,
        window: usize,
    ) {
        debug_assert_eq!(edge_mask.len(), self.edges.len());
        self.raw_weights = Some(raw);
        self.force_weights = force_weights;
        self.edge_mask = edge_mask;
        self.window = Some(window);
        self.emit(&UiEvent::WindowChanged(window));
        self.notify();
    }

    /// Drops the current window, returning to the "no weights known" state.
    pub(crate) fn clear_window(&mut self) {
        let n = self.vertex_ids.len();
        self.raw_weights = None;
        self.force_weights = Array2::zeros((n, n));
        self.edge_mask = vec![false; self.edges.len()];
        self.window = None;
        self.notify();
    }

    pub(crate) fn set_edge_mask(&mut self, edge_mask: Vec<bool>) {
        debug_assert_eq!(edge_mask.len(), self.edges.len());
        self.edge_mask = edge_mask;
        self.notify();
    }

    pub(crate) fn set_window_count(&mut self, window_count: Option<usize>) {
        self.window_count = window_count;
        if let Some(count) = window_count {
            self.emit(&UiEvent::WindowCount(count));
        }
    }

    /// Pushes a UI echo to every observer, in registration order.
    pub(crate) fn emit(&mut self, event: &UiEvent) {
        for (_, observer) in self.observers.iter_mut() {
            observer.on_ui_event(event);
        }
    }

    fn notify(&mut self) {
        if self.observers.is_empty() {
            return;
        }
        let (edge_sources, edge_targets) = self.visible_edges();
        let update = GraphUpdate {
            edge_sources: &edge_sources,
            edge_targets: &edge_targets,
            positions: &self.positions,
            vertex_ids: &self.vertex_ids,
        };
        for (_, observer) in self.observers.iter_mut() {
            observer.on_update(&update);
        }
    }
}
