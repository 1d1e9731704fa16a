// Copyright 2026 The Incapy Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::collections::HashSet;
use std::sync::Arc;

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::common::{Result, VertexId};
use crate::data_err;
use crate::geometry::Position;
use crate::model::WeightMatrix;

/// Static description of a loaded dataset: everything except the windows.
#[derive(Clone, Debug, PartialEq)]
pub struct Dataset {
    pub vertex_ids: Vec<VertexId>,
    /// Index pairs into `vertex_ids`.
    pub edges: Vec<(usize, usize)>,
    pub positions: Vec<Position>,
    /// None for unbounded (live) sources.
    pub window_count: Option<usize>,
}

impl Dataset {
    /// `side * side` vertices on a unit grid, fully connected.
    pub fn grid(side: usize) -> Dataset {
        let n = side * side;
        let vertex_ids = (0..n as VertexId).collect();
        let positions = (0..n)
            .map(|i| Position::new((i % side) as f64, (i / side) as f64))
            .collect();
        Dataset {
            vertex_ids,
            edges: all_pairs(n),
            positions,
            window_count: None,
        }
    }

    pub fn vertex_count(&self) -> usize {
        self.vertex_ids.len()
    }

    /// Checks the topology and returns the edges normalized so that
    /// `source < target`.
    pub fn normalized_edges(&self) -> Result<Vec<(usize, usize)>> {
        validate_topology(&self.vertex_ids, &self.edges, &self.positions)
    }
}

/// Every unordered pair `(i, j)` with `i < j < n`.
pub fn all_pairs(n: usize) -> Vec<(usize, usize)> {
    (0..n)
        .flat_map(|i| ((i + 1)..n).map(move |j| (i, j)))
        .collect()
}

pub(crate) fn validate_topology(
    vertex_ids: &[VertexId],
    edges: &[(usize, usize)],
    positions: &[Position],
) -> Result<Vec<(usize, usize)>> {
    let n = vertex_ids.len();
    if positions.len() != n {
        return data_err!(
            PositionCountMismatch,
            format!("{} positions for {} vertices", positions.len(), n)
        );
    }

    let mut seen = HashSet::with_capacity(n);
    for id in vertex_ids {
        if !seen.insert(*id) {
            return data_err!(DuplicateVertex, format!("vertex id {id} appears twice"));
        }
    }

    if let Some(p) = positions.iter().find(|p| !p.is_finite()) {
        return data_err!(Generic, format!("non-finite initial position {p:?}"));
    }

    edges
        .iter()
        .map(|&(s, t)| {
            if s >= n || t >= n {
                data_err!(BadEdge, format!("edge ({s}, {t}) out of range for {n} vertices"))
            } else if s == t {
                data_err!(BadEdge, format!("self-loop on vertex index {s}"))
            } else {
                Ok((s.min(t), s.max(t)))
            }
        })
        .collect()
}

pub(crate) fn check_window_shape(matrix: &Array2<f64>, n: usize) -> Result<()> {
    if matrix.dim() != (n, n) {
        let (rows, cols) = matrix.dim();
        return data_err!(
            BadWindowShape,
            format!("window is {rows}x{cols}, expected {n}x{n}")
        );
    }
    Ok(())
}

/// On-disk JSON representation of a dataset with all of its windows.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DatasetFile {
    pub vertex_ids: Vec<VertexId>,
    pub edges: Vec<(usize, usize)>,
    pub positions: Vec<[f64; 2]>,
    pub windows: Vec<Vec<Vec<f64>>>,
}

impl DatasetFile {
    pub fn from_json(json: &str) -> Result<DatasetFile> {
        match serde_json::from_str(json) {
            Ok(file) => Ok(file),
            Err(err) => data_err!(DatasetDecode, err.to_string()),
        }
    }

    pub fn into_parts(self) -> Result<(Dataset, Vec<WeightMatrix>)> {
        let n = self.vertex_ids.len();
        let windows = self
            .windows
            .into_iter()
            .enumerate()
            .map(|(i, rows)| {
                if rows.len() != n || rows.iter().any(|row| row.len() != n) {
                    return data_err!(
                        BadWindowShape,
                        format!("window {i} is not {n}x{n}")
                    );
                }
                let flat: Vec<f64> = rows.into_iter().flatten().collect();
                match Array2::from_shape_vec((n, n), flat) {
                    Ok(matrix) => Ok(Arc::new(matrix)),
                    Err(err) => data_err!(BadWindowShape, format!("window {i}: {err}")),
                }
            })
            .collect::<Result<Vec<_>>>()?;

        let dataset = Dataset {
            vertex_ids: self.vertex_ids,
            edges: self.edges,
            positions: self.positions.into_iter().map(Position::from).collect(),
            window_count: Some(windows.len()),
        };
        dataset.normalized_edges()?;
        Ok((dataset, windows))
    }
}
