// Copyright 2023-2024 The Regents of the University of California
// Copyright 2024-2025 Cornell University
// released under BSD 3-Clause License
// author: Kevin Laeufer <laeufer@cornell.edu>

use std::fmt::{Display, Formatter};
use std::num::NonZeroU32;
use std::ops::Index;

use crate::signals::Time;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde1", derive(serde::Serialize, serde::Deserialize))]
pub struct Timescale {
    pub factor: u32,
    pub unit: TimescaleUnit,
}

impl Timescale {
    /// Only 1, 10 and 100 are legal multipliers. Anything else is replaced by 1,
    /// use [`Timescale::is_valid_factor`] beforehand in order to report it.
    pub fn new(factor: u32, unit: TimescaleUnit) -> Self {
        let factor = if Self::is_valid_factor(factor) {
            factor
        } else {
            1
        };
        Timescale { factor, unit }
    }

    #[inline]
    pub fn is_valid_factor(factor: u32) -> bool {
        matches!(factor, 1 | 10 | 100)
    }

    /// Renders `time` (in simulation ticks) in the coarsest unit that keeps the value integral.
    /// E.g., with a `10 ns` timescale, `time = 300` is shown as `3 us`.
    pub fn format_time(&self, time: Time) -> String {
        let mut value = time as u128 * self.factor as u128;
        let mut unit = self.unit;
        while value != 0 && value % 1000 == 0 {
            match unit.coarser() {
                Some(coarser) => {
                    value /= 1000;
                    unit = coarser;
                }
                None => break,
            }
        }
        format!("{value} {unit}")
    }
}

impl Display for Timescale {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.factor, self.unit)
    }
}

/// Time units ordered from coarsest to finest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "serde1", derive(serde::Serialize, serde::Deserialize))]
pub enum TimescaleUnit {
    Seconds,
    MilliSeconds,
    MicroSeconds,
    NanoSeconds,
    PicoSeconds,
    FemtoSeconds,
}

const UNITS: [TimescaleUnit; 6] = [
    TimescaleUnit::Seconds,
    TimescaleUnit::MilliSeconds,
    TimescaleUnit::MicroSeconds,
    TimescaleUnit::NanoSeconds,
    TimescaleUnit::PicoSeconds,
    TimescaleUnit::FemtoSeconds,
];

impl TimescaleUnit {
    /// One level coarser, e.g., `ns` -> `us`. `None` for seconds.
    pub fn coarser(&self) -> Option<Self> {
        let pos = *self as usize;
        pos.checked_sub(1).map(|p| UNITS[p])
    }

    /// One level finer, e.g., `ns` -> `ps`. `None` for femtoseconds.
    pub fn finer(&self) -> Option<Self> {
        UNITS.get(*self as usize + 1).copied()
    }

    pub fn from_bytes(name: &[u8]) -> Option<Self> {
        match name {
            b"s" => Some(TimescaleUnit::Seconds),
            b"ms" => Some(TimescaleUnit::MilliSeconds),
            b"us" => Some(TimescaleUnit::MicroSeconds),
            b"ns" => Some(TimescaleUnit::NanoSeconds),
            b"ps" => Some(TimescaleUnit::PicoSeconds),
            b"fs" => Some(TimescaleUnit::FemtoSeconds),
            _ => None,
        }
    }
}

impl Display for TimescaleUnit {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TimescaleUnit::Seconds => "s",
            TimescaleUnit::MilliSeconds => "ms",
            TimescaleUnit::MicroSeconds => "us",
            TimescaleUnit::NanoSeconds => "ns",
            TimescaleUnit::PicoSeconds => "ps",
            TimescaleUnit::FemtoSeconds => "fs",
        };
        write!(f, "{name}")
    }
}

/// Uniquely identifies a variable in the hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde1", derive(serde::Serialize, serde::Deserialize))]
pub struct VarRef(NonZeroU32);

impl VarRef {
    #[inline]
    pub fn from_index(index: usize) -> Option<Self> {
        NonZeroU32::new(index as u32 + 1).map(VarRef)
    }

    #[inline]
    pub fn index(&self) -> usize {
        (self.0.get() - 1) as usize
    }
}

/// Uniquely identifies a scope in the hierarchy.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde1", derive(serde::Serialize, serde::Deserialize))]
pub struct ScopeRef(NonZeroU32);

impl ScopeRef {
    #[inline]
    pub fn from_index(index: usize) -> Option<Self> {
        NonZeroU32::new(index as u32 + 1).map(Self)
    }

    #[inline]
    pub fn index(&self) -> usize {
        (self.0.get() - 1) as usize
    }
}

/// Identifies the value change store of a variable. Several variables may share one store
/// if they were declared with the same identifier code.
#[derive(Debug, Clone, Copy, Eq, Hash, PartialEq, PartialOrd, Ord)]
#[cfg_attr(feature = "serde1", derive(serde::Serialize, serde::Deserialize))]
pub struct SignalRef(NonZeroU32);

impl SignalRef {
    #[inline]
    pub fn from_index(index: usize) -> Option<Self> {
        NonZeroU32::new(index as u32 + 1).map(Self)
    }

    #[inline]
    pub fn index(&self) -> usize {
        (self.0.get() - 1) as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde1", derive(serde::Serialize, serde::Deserialize))]
struct HierarchyStringId(NonZeroU32);

impl HierarchyStringId {
    #[inline]
    fn from_index(index: usize) -> Self {
        let value = (index + 1) as u32;
        HierarchyStringId(NonZeroU32::new(value).unwrap())
    }

    #[inline]
    fn index(&self) -> usize {
        (self.0.get() - 1) as usize
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
#[cfg_attr(feature = "serde1", derive(serde::Serialize, serde::Deserialize))]
#[non_exhaustive]
pub enum ScopeType {
    /// Synthetic root which stands for the trace file itself.
    File,
    Module,
    Task,
    Function,
    Begin,
    Fork,
    // System Verilog
    Generate,
    Struct,
    Union,
    Class,
    Interface,
    Package,
    Program,
}

impl ScopeType {
    pub fn from_bytes(tpe: &[u8]) -> Option<Self> {
        match tpe {
            b"module" => Some(ScopeType::Module),
            b"task" => Some(ScopeType::Task),
            b"function" => Some(ScopeType::Function),
            b"begin" => Some(ScopeType::Begin),
            b"fork" => Some(ScopeType::Fork),
            b"generate" => Some(ScopeType::Generate),
            b"struct" => Some(ScopeType::Struct),
            b"union" => Some(ScopeType::Union),
            b"class" => Some(ScopeType::Class),
            b"interface" => Some(ScopeType::Interface),
            b"package" => Some(ScopeType::Package),
            b"program" => Some(ScopeType::Program),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ScopeType::File => "file",
            ScopeType::Module => "module",
            ScopeType::Task => "task",
            ScopeType::Function => "function",
            ScopeType::Begin => "begin",
            ScopeType::Fork => "fork",
            ScopeType::Generate => "generate",
            ScopeType::Struct => "struct",
            ScopeType::Union => "union",
            ScopeType::Class => "class",
            ScopeType::Interface => "interface",
            ScopeType::Package => "package",
            ScopeType::Program => "program",
        }
    }
}

impl Display for ScopeType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde1", derive(serde::Serialize, serde::Deserialize))]
pub enum VarType {
    Event,
    Integer,
    Parameter,
    Real,
    RealTime,
    Reg,
    Supply0,
    Supply1,
    Time,
    Tri,
    TriAnd,
    TriOr,
    TriReg,
    Tri0,
    Tri1,
    WAnd,
    Wire,
    WOr,
    // System Verilog
    Logic,
    Bit,
    Int,
    ShortInt,
    LongInt,
    Byte,
    ShortReal,
}

impl VarType {
    pub fn from_bytes(tpe: &[u8]) -> Option<Self> {
        match tpe {
            b"event" => Some(VarType::Event),
            b"integer" => Some(VarType::Integer),
            b"parameter" => Some(VarType::Parameter),
            b"real" => Some(VarType::Real),
            b"realtime" => Some(VarType::RealTime),
            b"reg" => Some(VarType::Reg),
            b"supply0" => Some(VarType::Supply0),
            b"supply1" => Some(VarType::Supply1),
            b"time" => Some(VarType::Time),
            b"tri" => Some(VarType::Tri),
            b"triand" => Some(VarType::TriAnd),
            b"trior" => Some(VarType::TriOr),
            b"trireg" => Some(VarType::TriReg),
            b"tri0" => Some(VarType::Tri0),
            b"tri1" => Some(VarType::Tri1),
            b"wand" => Some(VarType::WAnd),
            b"wire" => Some(VarType::Wire),
            b"wor" => Some(VarType::WOr),
            b"logic" => Some(VarType::Logic),
            b"bit" => Some(VarType::Bit),
            b"int" => Some(VarType::Int),
            b"shortint" => Some(VarType::ShortInt),
            b"longint" => Some(VarType::LongInt),
            b"byte" => Some(VarType::Byte),
            b"shortreal" => Some(VarType::ShortReal),
            _ => None,
        }
    }

    /// The keyword used in the `$var` declaration.
    pub fn as_str(&self) -> &'static str {
        match self {
            VarType::Event => "event",
            VarType::Integer => "integer",
            VarType::Parameter => "parameter",
            VarType::Real => "real",
            VarType::RealTime => "realtime",
            VarType::Reg => "reg",
            VarType::Supply0 => "supply0",
            VarType::Supply1 => "supply1",
            VarType::Time => "time",
            VarType::Tri => "tri",
            VarType::TriAnd => "triand",
            VarType::TriOr => "trior",
            VarType::TriReg => "trireg",
            VarType::Tri0 => "tri0",
            VarType::Tri1 => "tri1",
            VarType::WAnd => "wand",
            VarType::Wire => "wire",
            VarType::WOr => "wor",
            VarType::Logic => "logic",
            VarType::Bit => "bit",
            VarType::Int => "int",
            VarType::ShortInt => "shortint",
            VarType::LongInt => "longint",
            VarType::Byte => "byte",
            VarType::ShortReal => "shortreal",
        }
    }

    pub fn is_real(&self) -> bool {
        matches!(self, VarType::Real | VarType::RealTime | VarType::ShortReal)
    }
}

impl Display for VarType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bit index or bit range suffix of a variable reference, e.g., `[7:0]` or `[3]`.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
#[cfg_attr(feature = "serde1", derive(serde::Serialize, serde::Deserialize))]
pub struct VarIndex {
    msb: i64,
    lsb: i64,
    is_range: bool,
}

impl VarIndex {
    pub fn new(msb: i64, lsb: i64) -> Self {
        Self {
            msb,
            lsb,
            is_range: true,
        }
    }

    pub fn bit(index: i64) -> Self {
        Self {
            msb: index,
            lsb: index,
            is_range: false,
        }
    }

    #[inline]
    pub fn msb(&self) -> i64 {
        self.msb
    }

    #[inline]
    pub fn lsb(&self) -> i64 {
        self.lsb
    }

    #[inline]
    pub fn length(&self) -> u64 {
        self.msb.abs_diff(self.lsb) + 1
    }
}

impl Display for VarIndex {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.is_range {
            write!(f, "[{}:{}]", self.msb, self.lsb)
        } else {
            write!(f, "[{}]", self.msb)
        }
    }
}

const SCOPE_SEPARATOR: char = '.';

#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde1", derive(serde::Serialize, serde::Deserialize))]
pub struct Var {
    name: HierarchyStringId,
    var_tpe: VarType,
    width: u32,
    index: Option<VarIndex>,
    signal_idx: SignalRef,
    parent: ScopeRef,
}

impl Var {
    /// Local name of the variable without any bit index.
    #[inline]
    pub fn name<'a>(&self, hierarchy: &'a Hierarchy) -> &'a str {
        &hierarchy[self.name]
    }

    /// Local name including the bit index suffix, e.g., `bus[7:0]`.
    pub fn reference(&self, hierarchy: &Hierarchy) -> String {
        match self.index {
            None => self.name(hierarchy).to_string(),
            Some(index) => format!("{}{}", self.name(hierarchy), index),
        }
    }

    /// Scope names from the top-level scope down, followed by the reference of this variable.
    /// The synthetic file scope is not part of the path.
    pub fn path(&self, hierarchy: &Hierarchy) -> Vec<String> {
        let mut out: Vec<String> = hierarchy[self.parent]
            .path(hierarchy)
            .into_iter()
            .map(|s| s.to_string())
            .collect();
        out.push(self.reference(hierarchy));
        out
    }

    /// Full hierarchical name of the variable, e.g., `top.blk.bus[7:0]`.
    pub fn full_name(&self, hierarchy: &Hierarchy) -> String {
        self.path(hierarchy).join(&SCOPE_SEPARATOR.to_string())
    }

    pub fn var_type(&self) -> VarType {
        self.var_tpe
    }

    /// Declared number of bits.
    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn is_1bit(&self) -> bool {
        self.width == 1
    }

    pub fn index(&self) -> Option<VarIndex> {
        self.index
    }

    pub fn signal_ref(&self) -> SignalRef {
        self.signal_idx
    }

    pub fn parent(&self) -> ScopeRef {
        self.parent
    }
}

#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde1", derive(serde::Serialize, serde::Deserialize))]
pub struct Scope {
    name: HierarchyStringId,
    tpe: ScopeType,
    parent: Option<ScopeRef>,
    scopes: Vec<ScopeRef>,
    vars: Vec<VarRef>,
}

impl Scope {
    /// Local name of the scope.
    pub fn name<'a>(&self, hierarchy: &'a Hierarchy) -> &'a str {
        &hierarchy[self.name]
    }

    pub fn scope_type(&self) -> ScopeType {
        self.tpe
    }

    /// `None` only for the root scope.
    pub fn parent(&self) -> Option<ScopeRef> {
        self.parent
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// Names of all scopes from the top-level scope down to this one.
    /// Empty for the root scope.
    pub fn path<'a>(&self, hierarchy: &'a Hierarchy) -> Vec<&'a str> {
        let mut names = Vec::new();
        let mut current = Some(self);
        while let Some(scope) = current {
            if scope.is_root() {
                break;
            }
            names.push(scope.name(hierarchy));
            current = scope.parent.map(|p| &hierarchy[p]);
        }
        names.reverse();
        names
    }

    /// Full hierarchical name of the scope.
    pub fn full_name(&self, hierarchy: &Hierarchy) -> String {
        if self.is_root() {
            self.name(hierarchy).to_string()
        } else {
            self.path(hierarchy).join(&SCOPE_SEPARATOR.to_string())
        }
    }

    /// Child scopes in declaration order.
    pub fn scopes(&self) -> &[ScopeRef] {
        &self.scopes
    }

    /// Variables declared directly in this scope, in declaration order.
    pub fn vars(&self) -> &[VarRef] {
        &self.vars
    }

    pub fn child(&self, index: usize) -> Option<ScopeRef> {
        self.scopes.get(index).copied()
    }

    pub fn child_count(&self) -> usize {
        self.scopes.len()
    }

    pub fn index_of_child(&self, child: ScopeRef) -> Option<usize> {
        self.scopes.iter().position(|c| *c == child)
    }
}

#[derive(Debug)]
#[cfg_attr(feature = "serde1", derive(serde::Serialize, serde::Deserialize))]
pub struct Hierarchy {
    vars: Vec<Var>,
    scopes: Vec<Scope>,
    strings: Vec<String>,
    num_signals: usize,
    meta: HierarchyMetaData,
}

#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde1", derive(serde::Serialize, serde::Deserialize))]
struct HierarchyMetaData {
    timescale: Option<Timescale>,
    date: String,
    version: String,
    comments: Vec<String>,
}

const ROOT: ScopeRef = ScopeRef(NonZeroU32::MIN);

// public implementation
impl Hierarchy {
    /// The synthetic scope that represents the whole trace.
    pub fn root(&self) -> ScopeRef {
        ROOT
    }

    pub fn root_scope(&self) -> &Scope {
        &self[ROOT]
    }

    /// Returns an iterator over all variables (at all levels).
    pub fn iter_vars(&self) -> std::slice::Iter<'_, Var> {
        self.vars.iter()
    }

    /// Returns an iterator over all scopes (at all levels), starting with the root.
    pub fn iter_scopes(&self) -> std::slice::Iter<'_, Scope> {
        self.scopes.iter()
    }

    /// Returns the top-level scopes, i.e., the children of the root.
    pub fn scopes(&self) -> &[ScopeRef] {
        self.root_scope().scopes()
    }

    /// Returns the first scope that was declared in the underlying file.
    pub fn first_scope(&self) -> Option<&Scope> {
        self.scopes().first().map(|s| &self[*s])
    }

    /// Number of distinct value change stores.
    pub fn num_unique_signals(&self) -> usize {
        self.num_signals
    }

    /// Size of the Hierarchy in bytes.
    pub fn size_in_memory(&self) -> usize {
        let var_size = self.vars.capacity() * std::mem::size_of::<Var>();
        let scope_size = self
            .scopes
            .iter()
            .map(|s| {
                std::mem::size_of::<Scope>()
                    + s.scopes.capacity() * std::mem::size_of::<ScopeRef>()
                    + s.vars.capacity() * std::mem::size_of::<VarRef>()
            })
            .sum::<usize>();
        let string_size = self.strings.capacity() * std::mem::size_of::<String>()
            + self.strings.iter().map(|s| s.len()).sum::<usize>();
        var_size + scope_size + string_size + std::mem::size_of::<Hierarchy>()
    }

    pub fn date(&self) -> &str {
        &self.meta.date
    }
    pub fn version(&self) -> &str {
        &self.meta.version
    }
    pub fn comments(&self) -> &[String] {
        &self.meta.comments
    }
    pub fn timescale(&self) -> Option<Timescale> {
        self.meta.timescale
    }

    pub fn lookup_scope<N: AsRef<str>>(&self, names: &[N]) -> Option<ScopeRef> {
        let mut scope = ROOT;
        for name in names.iter() {
            scope = *self[scope]
                .scopes()
                .iter()
                .find(|s| self[**s].name(self) == name.as_ref())?;
        }
        Some(scope)
    }

    /// Finds a variable by its scope path and its reference, e.g.,
    /// `lookup_var(&["top"], "bus[7:0]")`. A reference without index matches the bare name.
    pub fn lookup_var<N: AsRef<str>>(&self, path: &[N], reference: &str) -> Option<VarRef> {
        let scope = &self[self.lookup_scope(path)?];
        scope
            .vars()
            .iter()
            .find(|v| {
                let var = &self[**v];
                var.name(self) == reference || var.reference(self) == reference
            })
            .copied()
    }
}

impl Index<VarRef> for Hierarchy {
    type Output = Var;

    fn index(&self, index: VarRef) -> &Self::Output {
        &self.vars[index.index()]
    }
}

impl Index<ScopeRef> for Hierarchy {
    type Output = Scope;

    fn index(&self, index: ScopeRef) -> &Self::Output {
        &self.scopes[index.index()]
    }
}

impl Index<HierarchyStringId> for Hierarchy {
    type Output = str;

    fn index(&self, index: HierarchyStringId) -> &Self::Output {
        &self.strings[index.index()]
    }
}

/// Incrementally builds the scope tree while the declarations are parsed.
/// The root scope always exists and can never be popped.
pub struct HierarchyBuilder {
    vars: Vec<Var>,
    scopes: Vec<Scope>,
    scope_stack: Vec<ScopeRef>,
    strings: Vec<String>,
    num_signals: usize,
    meta: HierarchyMetaData,
}

impl HierarchyBuilder {
    pub fn new(root_name: impl Into<String>) -> Self {
        let root = Scope {
            name: HierarchyStringId::from_index(0),
            tpe: ScopeType::File,
            parent: None,
            scopes: Vec::new(),
            vars: Vec::new(),
        };
        HierarchyBuilder {
            vars: Vec::default(),
            scopes: vec![root],
            scope_stack: vec![ROOT],
            strings: vec![root_name.into()],
            num_signals: 0,
            meta: HierarchyMetaData::default(),
        }
    }
}

impl HierarchyBuilder {
    pub fn finish(mut self) -> Hierarchy {
        self.vars.shrink_to_fit();
        self.scopes.shrink_to_fit();
        self.strings.shrink_to_fit();
        Hierarchy {
            vars: self.vars,
            scopes: self.scopes,
            strings: self.strings,
            num_signals: self.num_signals,
            meta: self.meta,
        }
    }

    fn add_string(&mut self, value: String) -> HierarchyStringId {
        // we currently make no effort to avoid saving the same string twice
        let sym = HierarchyStringId::from_index(self.strings.len());
        self.strings.push(value);
        debug_assert_eq!(self.strings.len(), sym.index() + 1);
        sym
    }

    #[inline]
    fn current_scope(&self) -> ScopeRef {
        *self.scope_stack.last().unwrap_or(&ROOT)
    }

    /// Number of currently open scopes, not counting the root.
    pub fn depth(&self) -> usize {
        self.scope_stack.len() - 1
    }

    /// Adds a new scope as the last child of the current scope and makes it the current scope.
    pub fn add_scope(&mut self, name: String, tpe: ScopeType) -> ScopeRef {
        let parent = self.current_scope();
        let scope_ref = ScopeRef::from_index(self.scopes.len()).unwrap();
        let name = self.add_string(name);
        self.scopes.push(Scope {
            name,
            tpe,
            parent: Some(parent),
            scopes: Vec::new(),
            vars: Vec::new(),
        });
        self.scopes[parent.index()].scopes.push(scope_ref);
        self.scope_stack.push(scope_ref);
        scope_ref
    }

    /// Makes the parent of the current scope the current scope.
    /// Returns `false` and leaves the builder unchanged if we are at the root.
    #[must_use]
    pub fn pop_scope(&mut self) -> bool {
        if self.scope_stack.len() > 1 {
            self.scope_stack.pop();
            true
        } else {
            false
        }
    }

    /// Declares a variable in the current scope.
    pub fn add_var(
        &mut self,
        name: String,
        tpe: VarType,
        width: u32,
        index: Option<VarIndex>,
        signal_idx: SignalRef,
    ) -> VarRef {
        let parent = self.current_scope();
        let var_ref = VarRef::from_index(self.vars.len()).unwrap();
        let name = self.add_string(name);
        self.vars.push(Var {
            name,
            var_tpe: tpe,
            width,
            index,
            signal_idx,
            parent,
        });
        self.scopes[parent.index()].vars.push(var_ref);
        self.num_signals = std::cmp::max(self.num_signals, signal_idx.index() + 1);
        var_ref
    }

    pub fn set_date(&mut self, value: String) {
        self.meta.date = value;
    }

    pub fn set_version(&mut self, value: String) {
        self.meta.version = value;
    }

    /// Returns the previous timescale if there was one.
    pub fn set_timescale(&mut self, value: Timescale) -> Option<Timescale> {
        self.meta.timescale.replace(value)
    }

    pub fn add_comment(&mut self, comment: String) {
        self.meta.comments.push(comment);
    }
}
