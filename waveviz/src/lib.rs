// Copyright 2023-2024 The Regents of the University of California
// Copyright 2024-2025 Cornell University
// released under BSD 3-Clause License
// author: Kevin Laeufer <laeufer@cornell.edu>

mod arith;
mod hierarchy;
mod signals;
pub mod simple;
pub mod timeseries;
mod vcd;
pub mod viewers;
pub mod viewport;

/// Cargo.toml version of this library.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// What to do with a value change for an identifier code that was never declared.
#[derive(Debug, PartialEq, Eq, Copy, Clone, Default)]
#[cfg_attr(feature = "serde1", derive(serde::Serialize, serde::Deserialize))]
pub enum UnknownIdPolicy {
    /// Skip the change and record a [`Diagnostic`].
    #[default]
    Warn,
    /// Abort loading.
    Error,
}

#[derive(Debug, Copy, Clone, Default)]
#[cfg_attr(feature = "serde1", derive(serde::Serialize, serde::Deserialize))]
pub struct LoadOptions {
    pub unknown_id_policy: UnknownIdPolicy,
}

#[derive(Debug, thiserror::Error)]
pub enum WavevizError {
    #[error("failed to load:\n{0}")]
    FailedToLoad(String),
    #[error(transparent)]
    EmptyStore(#[from] EmptyStore),
    #[error(transparent)]
    TraceTooLarge(#[from] viewport::TraceTooLarge),
    #[error("io error")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, WavevizError>;

pub use hierarchy::{
    Hierarchy, Scope, ScopeRef, ScopeType, SignalRef, Timescale, TimescaleUnit, Var, VarIndex,
    VarRef, VarType,
};
pub use signals::{
    bit_string_to_hex, DisplayFormat, EmptyStore, Time, TimeRange, ValueChangeStore,
};
pub use vcd::{Diagnostic, DiagnosticKind, Diagnostics, IdLookup, VcdParseError};
