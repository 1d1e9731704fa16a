// Copyright 2026 The Incapy Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Data sources: where datasets and their weight windows come from.

use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};

use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::common::Result;
use crate::data_err;
use crate::dataset::{Dataset, DatasetFile, check_window_shape};
use crate::guard::lock;
use crate::model::WeightMatrix;

/// Supplier of a dataset and its indexable sequence of windows.
pub trait DataSource: Send {
    /// Topology and initial positions.
    fn load(&mut self) -> Result<Dataset>;

    /// Number of windows, or `None` for an unbounded live source.
    fn window_count(&self) -> Option<usize>;

    /// The window at `index`. Fails with `WindowOutOfRange` past the end and
    /// with `NoWindow` when a live source has nothing new to offer.
    fn window(&mut self, index: usize) -> Result<WeightMatrix>;
}

impl<S: DataSource + ?Sized> DataSource for Box<S> {
    fn load(&mut self) -> Result<Dataset> {
        (**self).load()
    }

    fn window_count(&self) -> Option<usize> {
        (**self).window_count()
    }

    fn window(&mut self, index: usize) -> Result<WeightMatrix> {
        (**self).window(index)
    }
}

/// A dataset whose windows are all held in memory.
pub struct SeriesSource {
    dataset: Dataset,
    windows: Vec<WeightMatrix>,
}

impl SeriesSource {
    pub fn new(mut dataset: Dataset, windows: Vec<WeightMatrix>) -> Result<Self> {
        dataset.normalized_edges()?;
        let n = dataset.vertex_count();
        for window in &windows {
            check_window_shape(window, n)?;
        }
        dataset.window_count = Some(windows.len());
        Ok(SeriesSource { dataset, windows })
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let (dataset, windows) = DatasetFile::from_json(json)?.into_parts()?;
        SeriesSource::new(dataset, windows)
    }

    /// Reads a JSON dataset file (see [`DatasetFile`]).
    pub fn open(path: &Path) -> Result<Self> {
        match fs::read_to_string(path) {
            Ok(contents) => SeriesSource::from_json(&contents),
            Err(err) => data_err!(DatasetIo, format!("{}: {}", path.display(), err)),
        }
    }
}

impl DataSource for SeriesSource {
    fn load(&mut self) -> Result<Dataset> {
        Ok(self.dataset.clone())
    }

    fn window_count(&self) -> Option<usize> {
        Some(self.windows.len())
    }

    fn window(&mut self, index: usize) -> Result<WeightMatrix> {
        match self.windows.get(index) {
            Some(window) => Ok(window.clone()),
            None => data_err!(
                WindowOutOfRange,
                format!("window {} of {}", index, self.windows.len())
            ),
        }
    }
}

/// Grid topology with random symmetric correlation windows. Each window is
/// generated from `seed` and its index, so the same index always yields the
/// same matrix.
pub struct SyntheticSource {
    side: usize,
    window_count: usize,
    seed: u64,
}

impl SyntheticSource {
    pub fn new(side: usize, window_count: usize, seed: u64) -> Self {
        SyntheticSource {
            side,
            window_count,
            seed,
        }
    }

    fn generate(&self, index: usize) -> Array2<f64> {
        let n = self.side * self.side;
        let mut rng = StdRng::seed_from_u64(self.seed.wrapping_add(index as u64));
        let mut matrix = Array2::eye(n);
        for i in 0..n {
            for j in (i + 1)..n {
                let corr = rng.random::<f64>();
                matrix[[i, j]] = corr;
                matrix[[j, i]] = corr;
            }
        }
        matrix
    }
}

impl DataSource for SyntheticSource {
    fn load(&mut self) -> Result<Dataset> {
        Ok(Dataset {
            window_count: Some(self.window_count),
            ..Dataset::grid(self.side)
        })
    }

    fn window_count(&self) -> Option<usize> {
        Some(self.window_count)
    }

    fn window(&mut self, index: usize) -> Result<WeightMatrix> {
        if index >= self.window_count {
            return data_err!(
                WindowOutOfRange,
                format!("window {} of {}", index, self.window_count)
            );
        }
        Ok(Arc::new(self.generate(index)))
    }
}

type Slot = Arc<Mutex<Option<WeightMatrix>>>;

/// A live source fed from another thread through a [`StreamSender`]. Only the
/// most recent unread matrix is kept; each one is handed out once.
pub struct StreamSource {
    dataset: Dataset,
    latest: Slot,
}

/// Producer half of a [`StreamSource`].
#[derive(Clone)]
pub struct StreamSender {
    vertex_count: usize,
    latest: Slot,
}

impl StreamSource {
    pub fn new(mut dataset: Dataset) -> Result<(StreamSource, StreamSender)> {
        dataset.normalized_edges()?;
        dataset.window_count = None;
        let latest: Slot = Arc::new(Mutex::new(None));
        let sender = StreamSender {
            vertex_count: dataset.vertex_count(),
            latest: latest.clone(),
        };
        Ok((StreamSource { dataset, latest }, sender))
    }
}

impl StreamSender {
    /// Publishes a matrix, replacing any unread one.
    pub fn send(&self, matrix: WeightMatrix) -> Result<()> {
        check_window_shape(&matrix, self.vertex_count)?;
        *lock(&self.latest) = Some(matrix);
        Ok(())
    }

    /// True while a published matrix has not been read yet.
    pub fn is_pending(&self) -> bool {
        lock(&self.latest).is_some()
    }
}

impl DataSource for StreamSource {
    fn load(&mut self) -> Result<Dataset> {
        Ok(self.dataset.clone())
    }

    fn window_count(&self) -> Option<usize> {
        None
    }

    fn window(&mut self, _index: usize) -> Result<WeightMatrix> {
        let latest = lock(&self.latest).take();
        match latest {
            Some(matrix) => Ok(matrix),
            None => data_err!(NoWindow),
        }
    }
}
