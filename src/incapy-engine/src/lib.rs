// Copyright 2026 The Incapy Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Animated force-directed layout for graphs whose edge weights change over
//! time.
//!
//! A [`DataSource`] supplies a fixed topology and a sequence of correlation
//! windows. The [`Controller`] steps a [`LayoutEngine`] on a background
//! thread, swapping windows on a timer, and pushes every change to the
//! registered [`Observer`]s.

#![forbid(unsafe_code)]

pub mod common;
pub mod config;
pub mod controller;
pub mod dataset;
pub mod feed;
pub mod force;
pub mod geometry;
mod guard;
pub mod layout;
pub mod model;
pub mod scheduler;
pub mod source;

pub use self::common::{Error, ErrorCode, ErrorKind, Result, VertexId};
pub use self::config::{Comparator, EngineConfig, WeightTransform};
pub use self::controller::{Command, Controller, FrameStats, Setting, WeakController};
pub use self::dataset::{Dataset, DatasetFile};
pub use self::feed::WindowFeed;
pub use self::geometry::Position;
pub use self::layout::LayoutEngine;
pub use self::model::{GraphModel, GraphUpdate, Observer, ObserverId, UiEvent, WeightMatrix};
pub use self::scheduler::Phase;
pub use self::source::{DataSource, SeriesSource, StreamSender, StreamSource, SyntheticSource};
