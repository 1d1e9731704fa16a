// Copyright 2026 The Incapy Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use ndarray::Array2;
use tracing::debug;

use crate::common::{Result, VertexId};
use crate::config::{Comparator, EngineConfig, WeightTransform, check_positive};
use crate::dataset::{check_window_shape, validate_topology};
use crate::force::{StepParams, compute_step, natural_spring_length};
use crate::geometry::Position;
use crate::model::{GraphModel, UiEvent, WeightMatrix};

/// Force-directed layout over a [`GraphModel`].
///
/// The engine owns the model and the simulation constants. Positions only
/// change through [`LayoutEngine::step`]; installing weights or changing the
/// threshold only touches the weights and the visibility mask.
pub struct LayoutEngine {
    model: GraphModel,
    initial_positions: Vec<Position>,
    repulsive_const: f64,
    anim_speed_const: f64,
    dt_cap: f64,
    natural_spring_length: f64,
    graph_center: Position,
    fixed_center: Option<Position>,
    edge_threshold: f64,
    comparator: Comparator,
    transform: WeightTransform,
}

impl LayoutEngine {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            model: GraphModel::new(),
            initial_positions: Vec::new(),
            repulsive_const: config.repulsive_const,
            anim_speed_const: config.anim_speed_const,
            dt_cap: config.dt_cap,
            natural_spring_length: 1.0,
            graph_center: config.graph_center.unwrap_or_default(),
            fixed_center: config.graph_center,
            edge_threshold: config.edge_threshold,
            comparator: config.comparator,
            transform: config.weight_transform,
        }
    }

    /// Installs a new topology, then derives the natural spring length and
    /// the graph center from the initial positions.
    pub fn initialize(
        &mut self,
        vertex_ids: Vec<VertexId>,
        edges: Vec<(usize, usize)>,
        positions: Vec<Position>,
    ) -> Result<()> {
        let edges = validate_topology(&vertex_ids, &edges, &positions)?;

        self.natural_spring_length = natural_spring_length(&positions, &edges);
        self.graph_center = self
            .fixed_center
            .or_else(|| Position::centroid(&positions))
            .unwrap_or_default();
        self.initial_positions = positions.clone();

        debug!(
            vertices = vertex_ids.len(),
            edges = edges.len(),
            spring_length = self.natural_spring_length,
            "layout initialized"
        );
        self.model.set_topology(vertex_ids, edges, positions);
        Ok(())
    }

    /// Puts the initial positions back and forgets the current window.
    pub fn reset(&mut self) {
        self.natural_spring_length =
            natural_spring_length(&self.initial_positions, self.model.edges());
        self.model.set_positions(self.initial_positions.clone());
        self.model.clear_window();
    }

    pub fn model(&self) -> &GraphModel {
        &self.model
    }

    pub fn model_mut(&mut self) -> &mut GraphModel {
        &mut self.model
    }

    pub fn positions(&self) -> &[Position] {
        self.model.positions()
    }

    pub fn visible_edges(&self) -> (Vec<usize>, Vec<usize>) {
        self.model.visible_edges()
    }

    pub fn natural_spring_length(&self) -> f64 {
        self.natural_spring_length
    }

    pub fn graph_center(&self) -> Position {
        self.graph_center
    }

    pub fn anim_speed_const(&self) -> f64 {
        self.anim_speed_const
    }

    pub fn repulsive_const(&self) -> f64 {
        self.repulsive_const
    }

    pub fn edge_threshold(&self) -> f64 {
        self.edge_threshold
    }

    pub fn dt_cap(&self) -> f64 {
        self.dt_cap
    }

    /// Constants for a step of `dt` seconds; `dt` is capped at `dt_cap` so
    /// a late frame cannot make vertices jump.
    pub fn step_params(&self, dt: f64) -> StepParams {
        StepParams {
            repulsive_const: self.repulsive_const,
            natural_spring_length: self.natural_spring_length,
            max_step_size: self.anim_speed_const * dt.clamp(0.0, self.dt_cap),
            graph_center: self.graph_center,
            anim_speed_const: self.anim_speed_const,
        }
    }

    pub fn step(&mut self, dt: f64) {
        let params = self.step_params(dt);
        let next = compute_step(self.model.positions(), self.model.force_weights(), &params);
        self.model.set_positions(next);
    }

    /// Replaces the active window. Positions are not recomputed.
    pub fn set_weights(&mut self, matrix: WeightMatrix, window: usize) -> Result<()> {
        check_window_shape(&matrix, self.model.vertex_count())?;

        let transform = self.transform;
        let force_weights: Array2<f64> = matrix.mapv(|corr| transform.apply(corr));
        let mask = self.mask_for(Some(&matrix));
        self.model.set_window(matrix, force_weights, mask, window);
        Ok(())
    }

    /// Re-evaluates edge visibility against `threshold` using the raw
    /// correlations of the current window. With no window loaded no edge is
    /// visible.
    pub fn set_edge_threshold(&mut self, threshold: f64) {
        self.edge_threshold = threshold;
        let mask = self.mask_for(self.model.raw_weights());
        self.model.emit(&UiEvent::EdgeThreshold(threshold));
        self.model.set_edge_mask(mask);
    }

    pub fn set_anim_speed_const(&mut self, value: f64) -> Result<()> {
        check_positive("anim_speed_const", value)?;
        self.anim_speed_const = value;
        self.model.emit(&UiEvent::SpeedConstant(value));
        Ok(())
    }

    pub fn set_repulsive_const(&mut self, value: f64) -> Result<()> {
        check_positive("repulsive_const", value)?;
        self.repulsive_const = value;
        Ok(())
    }

    fn mask_for(&self, raw: Option<&WeightMatrix>) -> Vec<bool> {
        let edges = self.model.edges();
        match raw {
            Some(raw) => edges
                .iter()
                .map(|&(s, t)| self.comparator.is_visible(raw[[s, t]], self.edge_threshold))
                .collect(),
            None => vec![false; edges.len()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::{Arc, Mutex};

    use crate::common::ErrorCode;
    use crate::model::{GraphUpdate, Observer};

    struct Counter(Arc<Mutex<usize>>);

    impl Observer for Counter {
        fn on_update(&mut self, _update: &GraphUpdate<'_>) {
            *self.0.lock().unwrap() += 1;
        }
    }

    fn pair_engine(config: &EngineConfig) -> LayoutEngine {
        let mut engine = LayoutEngine::new(config);
        engine
            .initialize(
                vec![1, 2],
                vec![(0, 1)],
                vec![Position::new(0.0, 0.0), Position::new(2.0, 0.0)],
            )
            .unwrap();
        engine
    }

    fn matrix(values: [f64; 4]) -> WeightMatrix {
        Arc::new(Array2::from_shape_vec((2, 2), values.to_vec()).unwrap())
    }

    #[test]
    fn test_initialize_derives_constants() {
        let engine = pair_engine(&EngineConfig::default());
        assert!((engine.natural_spring_length() - 3.0).abs() < 1e-12);
        assert_eq!(engine.graph_center(), Position::new(1.0, 0.0));
        assert!(engine.model().edge_mask().iter().all(|v| !v));

        let fixed = EngineConfig {
            graph_center: Some(Position::new(4.5, 4.5)),
            ..EngineConfig::default()
        };
        assert_eq!(pair_engine(&fixed).graph_center(), Position::new(4.5, 4.5));
    }

    #[test]
    fn test_threshold_mask_greater() {
        let config = EngineConfig {
            edge_threshold: 0.5,
            ..EngineConfig::default()
        };
        let mut engine = pair_engine(&config);
        engine.set_weights(matrix([0.0, 0.7, 0.7, 0.0]), 0).unwrap();
        assert_eq!(engine.model().edge_mask(), &[true]);

        engine.set_edge_threshold(0.8);
        assert_eq!(engine.model().edge_mask(), &[false]);
        assert!((engine.edge_threshold() - 0.8).abs() < f64::EPSILON);
    }

    #[test]
    fn test_threshold_mask_less() {
        let config = EngineConfig {
            edge_threshold: 0.5,
            comparator: Comparator::Less,
            ..EngineConfig::default()
        };
        let mut engine = pair_engine(&config);
        engine.set_weights(matrix([0.0, 0.3, 0.3, 0.0]), 0).unwrap();
        assert_eq!(engine.model().edge_mask(), &[true]);
        engine.set_edge_threshold(0.2);
        assert_eq!(engine.model().edge_mask(), &[false]);
    }

    #[test]
    fn test_threshold_without_weights_hides_everything() {
        let mut engine = pair_engine(&EngineConfig::default());
        engine.set_edge_threshold(-10.0);
        assert_eq!(engine.model().edge_mask(), &[false]);
    }

    #[test]
    fn test_threshold_with_no_edges() {
        let mut engine = LayoutEngine::new(&EngineConfig::default());
        engine
            .initialize(vec![1, 2], vec![], vec![Position::ORIGIN; 2])
            .unwrap();
        engine.set_weights(matrix([0.0, 0.9, 0.9, 0.0]), 0).unwrap();
        engine.set_edge_threshold(0.0);
        assert!(engine.model().edge_mask().is_empty());
        assert_eq!(engine.visible_edges(), (vec![], vec![]));
    }

    #[test]
    fn test_set_weights_applies_transform_and_keeps_positions() {
        let mut engine = pair_engine(&EngineConfig::default());
        let before = engine.positions().to_vec();
        engine.set_weights(matrix([1.0, 0.25, 0.25, 1.0]), 3).unwrap();

        assert_eq!(engine.positions(), before.as_slice());
        assert_eq!(engine.model().window(), Some(3));
        assert!((engine.model().force_weights()[[0, 1]] - 0.75).abs() < 1e-12);
        assert!((engine.model().raw_weights().unwrap()[[0, 1]] - 0.25).abs() < 1e-12);

        let wrong = Arc::new(Array2::zeros((3, 3)));
        let err = engine.set_weights(wrong, 4).unwrap_err();
        assert_eq!(err.code, ErrorCode::BadWindowShape);
        assert_eq!(engine.model().window(), Some(3));
    }

    #[test]
    fn test_step_caps_dt_and_notifies() {
        let count = Arc::new(Mutex::new(0));
        let mut engine = pair_engine(&EngineConfig::default());
        engine.model_mut().add_observer(Box::new(Counter(count.clone())));
        assert!((engine.dt_cap() - 0.1).abs() < f64::EPSILON);

        let params = engine.step_params(5.0);
        assert!((params.max_step_size - 0.1).abs() < 1e-12);
        let params = engine.step_params(0.02);
        assert!((params.max_step_size - 0.02).abs() < 1e-12);

        engine.step(0.05);
        engine.step(0.05);
        assert_eq!(*count.lock().unwrap(), 2);
        assert!(engine.positions().iter().all(|p| p.is_finite()));
    }

    #[test]
    fn test_reset_restores_initial_positions() {
        let mut engine = pair_engine(&EngineConfig::default());
        engine.set_weights(matrix([1.0, 0.0, 0.0, 1.0]), 0).unwrap();
        for _ in 0..20 {
            engine.step(0.1);
        }
        assert_ne!(engine.positions()[0], Position::new(0.0, 0.0));

        engine.reset();
        assert_eq!(
            engine.positions(),
            &[Position::new(0.0, 0.0), Position::new(2.0, 0.0)]
        );
        assert_eq!(engine.model().window(), None);
    }

    #[test]
    fn test_setters_validate() {
        let mut engine = pair_engine(&EngineConfig::default());
        assert!(engine.set_anim_speed_const(2.0).is_ok());
        assert!((engine.anim_speed_const() - 2.0).abs() < f64::EPSILON);
        assert_eq!(
            engine.set_anim_speed_const(0.0).unwrap_err().code,
            ErrorCode::BadConfig
        );
        assert_eq!(
            engine.set_repulsive_const(f64::NAN).unwrap_err().code,
            ErrorCode::BadConfig
        );
        assert!((engine.repulsive_const() - 1.0).abs() < f64::EPSILON);
    }
}
