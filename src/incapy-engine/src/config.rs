// Copyright 2026 The Incapy Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::common::Result;
use crate::config_err;
use crate::geometry::Position;

/// Conversion from a raw correlation value to the weight fed to the force
/// model.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightTransform {
    /// `weight = corr`
    Identity,
    /// `weight = 1 - corr`: strongly correlated vertices repel less and
    /// therefore end up closer together.
    #[default]
    InverseLinear,
}

impl WeightTransform {
    pub fn apply(self, corr: f64) -> f64 {
        match self {
            WeightTransform::Identity => corr,
            WeightTransform::InverseLinear => 1.0 - corr,
        }
    }
}

/// How a raw correlation is compared against the edge threshold. Thresholds
/// are always evaluated on the raw (untransformed) matrix.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparator {
    #[default]
    Greater,
    Less,
}

impl Comparator {
    pub fn is_visible(self, value: f64, threshold: f64) -> bool {
        match self {
            Comparator::Greater => value > threshold,
            Comparator::Less => value < threshold,
        }
    }
}

/// Tunables for the layout engine and the animation loop.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Strength of the weight-modulated repulsion between vertex pairs.
    pub repulsive_const: f64,
    /// Distance a vertex may travel per second of animation. Also scales
    /// the centering pull, capped at 1.
    pub anim_speed_const: f64,
    /// Seconds each window stays active before the loop advances. Zero
    /// disables automatic advancing.
    pub time_per_window: f64,
    /// Raw correlation threshold deciding which edges are visible.
    pub edge_threshold: f64,
    /// Wrap back to window 0 after the last window.
    pub repeat: bool,
    /// Upper bound on the per-frame time delta, in seconds.
    pub dt_cap: f64,
    /// Target frame pacing of the animation loop, in milliseconds. Must be
    /// at least 1.
    pub frame_interval_ms: u64,
    pub comparator: Comparator,
    pub weight_transform: WeightTransform,
    /// Fixed layout center. When absent, the centroid of the initial
    /// positions is used.
    pub graph_center: Option<Position>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            repulsive_const: 1.0,
            anim_speed_const: 1.0,
            time_per_window: 5.0,
            // raw correlations never exceed 1, so no edges are drawn initially
            edge_threshold: 1.0,
            repeat: false,
            dt_cap: 0.1,
            frame_interval_ms: 16,
            comparator: Comparator::Greater,
            weight_transform: WeightTransform::InverseLinear,
            graph_center: None,
        }
    }
}

impl EngineConfig {
    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }

    pub fn validate(&self) -> Result<()> {
        check_positive("repulsive_const", self.repulsive_const)?;
        check_positive("anim_speed_const", self.anim_speed_const)?;
        check_time_per_window(self.time_per_window)?;
        check_positive("dt_cap", self.dt_cap)?;
        if self.frame_interval_ms == 0 {
            return config_err!("frame_interval_ms must be at least 1".to_owned());
        }
        if !self.edge_threshold.is_finite() {
            return config_err!(format!(
                "edge_threshold must be finite, got {}",
                self.edge_threshold
            ));
        }
        if let Some(center) = self.graph_center
            && !center.is_finite()
        {
            return config_err!(format!("graph_center must be finite, got {center:?}"));
        }
        Ok(())
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: EngineConfig = match serde_json::from_str(json) {
            Ok(config) => config,
            Err(err) => return config_err!(format!("invalid config: {err}")),
        };
        config.validate()?;
        Ok(config)
    }
}

pub(crate) fn check_positive(name: &str, value: f64) -> Result<()> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        config_err!(format!("{name} must be positive, got {value}"))
    }
}

pub(crate) fn check_time_per_window(value: f64) -> Result<()> {
    if value >= 0.0 && value.is_finite() {
        Ok(())
    } else {
        config_err!(format!("time_per_window must be >= 0, got {value}"))
    }
}
