// Copyright 2026 The Incapy Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::{error, fmt, result};

/// External vertex identifier, e.g. an electrode number.
pub type VertexId = u32;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    NoError, // will never be produced
    Generic,
    WindowOutOfRange,
    NoWindow,
    BadWindowShape,
    BadEdge,
    DuplicateVertex,
    PositionCountMismatch,
    BadConfig,
    DatasetIo,
    DatasetDecode,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use ErrorCode::*;
        let name = match self {
            NoError => "no_error",
            Generic => "generic",
            WindowOutOfRange => "window_out_of_range",
            NoWindow => "no_window",
            BadWindowShape => "bad_window_shape",
            BadEdge => "bad_edge",
            DuplicateVertex => "duplicate_vertex",
            PositionCountMismatch => "position_count_mismatch",
            BadConfig => "bad_config",
            DatasetIo => "dataset_io",
            DatasetDecode => "dataset_decode",
        };

        write!(f, "{name}")
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Data,
    Config,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Error {
    pub kind: ErrorKind,
    pub code: ErrorCode,
    pub details: Option<String>,
}

impl Error {
    pub fn new(kind: ErrorKind, code: ErrorCode, details: Option<String>) -> Self {
        Error {
            kind,
            code,
            details,
        }
    }

    pub fn get_details(&self) -> Option<String> {
        self.details.clone()
    }

    /// True for the recoverable "ran off the end of the window sequence"
    /// condition that the feed turns into a wrap or a no-op.
    pub fn is_out_of_range(&self) -> bool {
        self.code == ErrorCode::WindowOutOfRange
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let kind = match self.kind {
            ErrorKind::Data => "DataError",
            ErrorKind::Config => "ConfigError",
        };
        match self.details {
            Some(ref details) => write!(f, "{}{{{}: {}}}", kind, self.code, details),
            None => write!(f, "{}{{{}}}", kind, self.code),
        }
    }
}

impl error::Error for Error {}

pub type Result<T> = result::Result<T, Error>;

#[macro_export]
macro_rules! data_err {
    ($code:tt, $str:expr) => {{
        use $crate::common::{Error, ErrorCode, ErrorKind};
        Err(Error::new(ErrorKind::Data, ErrorCode::$code, Some($str)))
    }};
    ($code:tt) => {{
        use $crate::common::{Error, ErrorCode, ErrorKind};
        Err(Error::new(ErrorKind::Data, ErrorCode::$code, None))
    }};
}

#[macro_export]
macro_rules! config_err {
    ($str:expr) => {{
        use $crate::common::{Error, ErrorCode, ErrorKind};
        Err(Error::new(ErrorKind::Config, ErrorCode::BadConfig, Some($str)))
    }};
}

#[test]
fn test_error_display() {
    let err = Error::new(
        ErrorKind::Data,
        ErrorCode::WindowOutOfRange,
        Some("window 7 of 3".to_owned()),
    );
    assert_eq!("DataError{window_out_of_range: window 7 of 3}", err.to_string());
    assert!(err.is_out_of_range());

    let err = Error::new(ErrorKind::Config, ErrorCode::BadConfig, None);
    assert_eq!("ConfigError{bad_config}", err.to_string());
    assert!(!err.is_out_of_range());
}
