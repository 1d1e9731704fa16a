// Copyright 2026 The Incapy Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use tracing::{debug, trace};

use crate::common::{ErrorCode, Result};
use crate::model::WeightMatrix;
use crate::source::DataSource;

/// Cursor over a [`DataSource`].
///
/// Running past the last window wraps to window 0 when `repeat` is set and
/// is otherwise a no-op that keeps the current window in place.
pub struct WindowFeed {
    source: Box<dyn DataSource>,
    current: Option<usize>,
    repeat: bool,
}

impl WindowFeed {
    pub fn new(source: Box<dyn DataSource>, repeat: bool) -> Self {
        WindowFeed {
            source,
            current: None,
            repeat,
        }
    }

    pub fn current(&self) -> Option<usize> {
        self.current
    }

    pub fn repeat(&self) -> bool {
        self.repeat
    }

    pub fn set_repeat(&mut self, repeat: bool) {
        self.repeat = repeat;
    }

    pub fn window_count(&self) -> Option<usize> {
        self.source.window_count()
    }

    /// Forgets the cursor so the next advance starts again at window 0.
    pub fn reset(&mut self) {
        self.current = None;
    }

    /// Direct indexed access; does not move the cursor.
    pub fn get_window(&mut self, index: usize) -> Result<WeightMatrix> {
        self.source.window(index)
    }

    /// Loads the window after the current one.
    pub fn advance(&mut self) -> Result<Option<(WeightMatrix, usize)>> {
        let next = self.current.map_or(0, |current| current + 1);
        self.load(next)
    }

    /// Loads an explicit window. Asking for the window that is already
    /// current does nothing, so an index echoed back from a UI control
    /// cannot trigger a reload.
    pub fn seek(&mut self, index: usize) -> Result<Option<(WeightMatrix, usize)>> {
        if self.current == Some(index) {
            trace!(index, "window already current");
            return Ok(None);
        }
        self.load(index)
    }

    fn load(&mut self, index: usize) -> Result<Option<(WeightMatrix, usize)>> {
        match self.source.window(index) {
            Ok(matrix) => {
                self.current = Some(index);
                Ok(Some((matrix, index)))
            }
            Err(err) if err.is_out_of_range() => {
                if self.repeat && index != 0 {
                    debug!(index, "past the last window, wrapping to 0");
                    self.load(0)
                } else {
                    debug!(index, current = ?self.current, "no window to load");
                    Ok(None)
                }
            }
            Err(err) if err.code == ErrorCode::NoWindow => {
                trace!(index, "source has no new window");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }
}
