// Copyright 2023-2024 The Regents of the University of California
// released under BSD 3-Clause License
// author: Kevin Laeufer <laeufer@berkeley.edu>
//
// Two step loading for interactive viewers: the hierarchy can be shown
// while the value changes are still being read.

use crate::vcd::{Diagnostics, IdLookup};
use crate::{Hierarchy, LoadOptions, Result, Time, ValueChangeStore, WavevizError};
use std::io::{BufRead, Seek};

pub use crate::vcd::ReadBodyContinuation;

impl From<crate::vcd::VcdParseError> for WavevizError {
    fn from(value: crate::vcd::VcdParseError) -> Self {
        match value {
            crate::vcd::VcdParseError::Io(e) => WavevizError::Io(e),
            other => WavevizError::FailedToLoad(other.to_string()),
        }
    }
}

pub struct HeaderResult<R: BufRead + Seek> {
    pub hierarchy: Hierarchy,
    /// Body length in bytes.
    pub body_len: u64,
    pub body: ReadBodyContinuation<R>,
}

/// Reads the declarations of a VCD file. The synthetic root scope is named after the file.
pub fn read_header_from_file<P: AsRef<std::path::Path>>(
    filename: P,
    options: &LoadOptions,
) -> Result<HeaderResult<std::io::BufReader<std::fs::File>>> {
    let (hierarchy, body, body_len) = crate::vcd::read_header_from_file(filename, options)?;
    Ok(HeaderResult {
        hierarchy,
        body_len,
        body,
    })
}

/// Reads the declarations from any seekable input. `root_name` names the synthetic root scope.
pub fn read_header<R: BufRead + Seek>(
    input: R,
    root_name: &str,
    options: &LoadOptions,
) -> Result<HeaderResult<R>> {
    let (hierarchy, body, body_len) = crate::vcd::read_header(input, root_name, options)?;
    Ok(HeaderResult {
        hierarchy,
        body_len,
        body,
    })
}

pub fn read_header_from_bytes(
    bytes: Vec<u8>,
    root_name: &str,
    options: &LoadOptions,
) -> Result<HeaderResult<std::io::Cursor<Vec<u8>>>> {
    read_header(std::io::Cursor::new(bytes), root_name, options)
}

pub struct BodyResult {
    /// One store per [`crate::SignalRef`], indexed by [`crate::SignalRef::index`].
    pub stores: Vec<ValueChangeStore>,
    /// Identifier code of every store.
    pub id_lookup: IdLookup,
    /// First timestamp of the trace.
    pub start_time: Time,
    /// Last timestamp of the trace. Every store is padded up to here.
    pub end_time: Time,
    /// Problems in the header and the body that did not stop the parse.
    pub diagnostics: Diagnostics,
}

/// Shared counter of body bytes that have been consumed so far.
pub type ProgressCount = std::sync::Arc<std::sync::atomic::AtomicU64>;
/// Set to `true` in order to stop a running body parse at the next timestamp.
pub type CancelFlag = std::sync::Arc<std::sync::atomic::AtomicBool>;

pub fn read_body<R: BufRead + Seek>(
    body: ReadBodyContinuation<R>,
    hierarchy: &Hierarchy,
    progress: Option<ProgressCount>,
    cancel: Option<CancelFlag>,
) -> Result<BodyResult> {
    Ok(crate::vcd::read_body(body, hierarchy, progress, cancel)?)
}
