// Copyright 2023-2024 The Regents of the University of California
// Copyright 2024-2025 Cornell University
// released under BSD 3-Clause License
// author: Kevin Laeufer <laeufer@cornell.edu>
//
// A simpler interface to load waves. Use this instead of `waveviz::viewers` if you do not need
// to show the hierarchy before all value changes have been read.

use crate::timeseries::SignalView;
use crate::vcd::{Diagnostics, IdLookup};
use crate::viewport::{Viewport, ViewportOptions};
use crate::{viewers, Hierarchy, LoadOptions, Result, SignalRef, Time, ValueChangeStore, VarRef};
use std::fmt::{Debug, Formatter};
use std::io::{BufRead, Seek};

/// Read a waveform file with the default options. Reads in header and body at once.
pub fn read<P: AsRef<std::path::Path>>(filename: P) -> Result<Waveform> {
    read_with_options(filename, &LoadOptions::default())
}

/// Read a waveform file. Reads in header and body at once.
pub fn read_with_options<P: AsRef<std::path::Path>>(
    filename: P,
    options: &LoadOptions,
) -> Result<Waveform> {
    let header = viewers::read_header_from_file(filename, options)?;
    let body = viewers::read_body(header.body, &header.hierarchy, None, None)?;
    Ok(Waveform::new(header.hierarchy, body))
}

/// Read from something that is not a file. `name` becomes the name of the root scope.
pub fn read_from_reader<R: BufRead + Seek>(input: R, name: &str) -> Result<Waveform> {
    let options = LoadOptions::default();
    let header = viewers::read_header(input, name, &options)?;
    let body = viewers::read_body(header.body, &header.hierarchy, None, None)?;
    Ok(Waveform::new(header.hierarchy, body))
}

/// A fully parsed trace. Immutable and thus free to share between threads.
pub struct Waveform {
    hierarchy: Hierarchy,
    stores: Vec<ValueChangeStore>,
    id_lookup: IdLookup,
    start_time: Time,
    end_time: Time,
    diagnostics: Diagnostics,
}

impl Debug for Waveform {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Waveform(...)")
    }
}

impl Waveform {
    fn new(hierarchy: Hierarchy, body: viewers::BodyResult) -> Self {
        Waveform {
            hierarchy,
            stores: body.stores,
            id_lookup: body.id_lookup,
            start_time: body.start_time,
            end_time: body.end_time,
            diagnostics: body.diagnostics,
        }
    }

    pub fn hierarchy(&self) -> &Hierarchy {
        &self.hierarchy
    }

    pub fn start_time(&self) -> Time {
        self.start_time
    }

    pub fn end_time(&self) -> Time {
        self.end_time
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn store(&self, id: SignalRef) -> &ValueChangeStore {
        &self.stores[id.index()]
    }

    /// Store of the signal that was declared with the identifier code `id`.
    pub fn store_by_id(&self, id: &str) -> Option<&ValueChangeStore> {
        self.id_lookup
            .get(id.as_bytes())
            .map(|signal_ref| self.store(*signal_ref))
    }

    /// Number of distinct stores.
    pub fn num_stores(&self) -> usize {
        self.stores.len()
    }

    pub fn signal(&self, var: VarRef) -> SignalView<'_> {
        let v = &self.hierarchy[var];
        SignalView::new(&self.hierarchy, v, self.store(v.signal_ref()))
    }

    /// Looks up a variable by its full path, e.g., `["top", "blk", "bus[7:0]"]`.
    pub fn signal_by_path<N: AsRef<str>>(&self, path: &[N]) -> Option<SignalView<'_>> {
        let (reference, scopes) = path.split_last()?;
        let var = self.hierarchy.lookup_var(scopes, reference.as_ref())?;
        Some(self.signal(var))
    }

    /// Creates a coordinate mapper for the whole trace, zoomed out far enough for every
    /// timestamp to have a pixel.
    pub fn viewport(&self, options: ViewportOptions) -> Result<Viewport> {
        let mut viewport = Viewport::new(self.start_time, self.end_time, options);
        viewport.fit()?;
        Ok(viewport)
    }

    /// Size of all value change stores in bytes.
    pub fn size_in_memory(&self) -> usize {
        self.stores.iter().map(|s| s.size_in_memory()).sum::<usize>()
            + self.hierarchy.size_in_memory()
    }
}
