// Copyright 2026 The Incapy Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Weight-modulated force model.
//!
//! Every ordered vertex pair contributes a repulsive term scaled by the
//! pair's weight and an attractive spring term, so the computation is dense
//! (O(n^2)) regardless of how many edges are visible. The summed
//! displacement of each vertex is capped at `max_step_size`, then the whole
//! layout is pulled toward the graph center.

use float_cmp::approx_eq;
use ndarray::Array2;

use crate::geometry::Position;

/// Scale applied to the mean edge length to obtain the natural spring length.
pub const SPRING_LENGTH_SCALE: f64 = 1.5;

/// Constants for a single call to [`compute_step`].
#[cfg_attr(feature = "debug-derive", derive(Debug))]
#[derive(Clone, Copy, PartialEq)]
pub struct StepParams {
    pub repulsive_const: f64,
    pub natural_spring_length: f64,
    pub max_step_size: f64,
    pub graph_center: Position,
    pub anim_speed_const: f64,
}

/// Natural spring length: 1.5 times the mean length of the given edges.
/// Falls back to 1.0 when there are no edges or every edge has zero length.
pub fn natural_spring_length(positions: &[Position], edges: &[(usize, usize)]) -> f64 {
    if edges.is_empty() {
        return 1.0;
    }

    let total: f64 = edges
        .iter()
        .map(|&(s, t)| positions[s].distance(positions[t]))
        .sum();

    if approx_eq!(f64, total, 0.0) {
        1.0
    } else {
        SPRING_LENGTH_SCALE * total / edges.len() as f64
    }
}

/// Raw (uncapped) displacement for vertex `i` summed over all other vertices.
fn pair_sum(
    i: usize,
    positions: &[Position],
    weights: &Array2<f64>,
    params: &StepParams,
) -> Position {
    let k = params.natural_spring_length;
    let repulsion_scale = params.repulsive_const * k * k;
    let source = positions[i];

    let mut sum = Position::ORIGIN;
    for (j, &target) in positions.iter().enumerate() {
        if j == i {
            continue;
        }
        let diff = source - target;
        let mut dist = diff.length();
        // co-located vertices are treated as already separated
        if dist == 0.0 {
            dist = 1.0;
        }
        let dir = diff * (1.0 / dist);

        let repulsion = repulsion_scale / dist * weights[[i, j]];
        let attraction = dist * dist / k;
        sum += dir * (repulsion - attraction);
    }
    sum
}

/// Caps a raw displacement at `max_step_size` without amplifying it.
fn cap(raw: Position, max_step_size: f64) -> Position {
    let len = raw.length();
    if len == 0.0 || !len.is_finite() {
        return Position::ORIGIN;
    }
    raw * (len.min(max_step_size) / len)
}

#[cfg(not(target_arch = "wasm32"))]
fn raw_displacements(
    positions: &[Position],
    weights: &Array2<f64>,
    params: &StepParams,
) -> Vec<Position> {
    use rayon::prelude::*;

    (0..positions.len())
        .into_par_iter()
        .map(|i| pair_sum(i, positions, weights, params))
        .collect()
}

#[cfg(target_arch = "wasm32")]
fn raw_displacements(
    positions: &[Position],
    weights: &Array2<f64>,
    params: &StepParams,
) -> Vec<Position> {
    (0..positions.len())
        .map(|i| pair_sum(i, positions, weights, params))
        .collect()
}

/// Per-vertex displacement for one step, each capped at
/// `params.max_step_size`. Returns all-zero displacements for fewer than two
/// vertices.
///
/// `weights` must be at least `n x n`.
pub fn compute_displacements(
    positions: &[Position],
    weights: &Array2<f64>,
    params: &StepParams,
) -> Vec<Position> {
    let n = positions.len();
    if n < 2 {
        return vec![Position::ORIGIN; n];
    }
    debug_assert!(weights.nrows() >= n && weights.ncols() >= n);

    raw_displacements(positions, weights, params)
        .into_iter()
        .map(|raw| cap(raw, params.max_step_size))
        .collect()
}

/// Advances every vertex by one step and re-centers the layout.
pub fn compute_step(
    positions: &[Position],
    weights: &Array2<f64>,
    params: &StepParams,
) -> Vec<Position> {
    if positions.len() < 2 {
        return positions.to_vec();
    }

    let mut next: Vec<Position> = positions
        .iter()
        .zip(compute_displacements(positions, weights, params))
        .map(|(&p, d)| p + d)
        .collect();

    // speed is capped at 1 here so a large constant cannot overshoot the center
    if let Some(mean) = Position::centroid(&next) {
        let drift = (mean - params.graph_center) * params.anim_speed_const.min(1.0);
        for p in next.iter_mut() {
            *p -= drift;
        }
    }

    next
}
