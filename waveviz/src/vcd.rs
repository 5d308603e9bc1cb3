// Copyright 2023-2024 The Regents of the University of California
// Copyright 2024-2025 Cornell University
// released under BSD 3-Clause License
// author: Kevin Laeufer <laeufer@cornell.edu>

use crate::hierarchy::*;
use crate::signals::{Time, ValueChangeStore};
use crate::viewers::{BodyResult, CancelFlag, ProgressCount};
use crate::{LoadOptions, UnknownIdPolicy};
use rustc_hash::FxHashMap;
use std::borrow::Cow;
use std::fmt::{Display, Formatter};
use std::io::{BufRead, Read, Seek, SeekFrom};
use std::sync::atomic::Ordering;

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum VcdParseError {
    #[error("[vcd] expected {0}, found `{1}`")]
    VcdExpected(&'static str, String),
    #[error("[vcd] expected $end to close `${0}`")]
    VcdMissingEnd(String),
    #[error("[vcd] failed to parse size `{0}` of variable `{1}`")]
    VcdVarLengthParsing(String, String),
    #[error("[vcd] invalid index of reference: `{0}`")]
    VcdInvalidIndex(String),
    #[error("[vcd] expected command to start with `$`, not `{0}`")]
    VcdStartChar(String),
    #[error("[vcd] unknown or invalid command: `{0}`, valid are: {list:?}", list=get_vcd_command_str())]
    VcdInvalidCommand(String),
    #[error("[vcd] $upscope without a matching $scope")]
    VcdUnbalancedUpscope,
    #[error("[vcd] no declaration commands found")]
    VcdEmptyHeader,
    #[error("[vcd] reached the end of the input before $enddefinitions")]
    VcdMissingEndDefinitions,
    #[error("[vcd] unexpected token in VCD body: {0}")]
    VcdUnexpectedBodyToken(String),
    #[error("[vcd] expected time after #, found `{0}`")]
    VcdInvalidTime(String),
    #[error("[vcd] expected an id for a value change, but did not find one")]
    VcdEmptyId,
    #[error("[vcd] unknown identifier code `{0}`")]
    VcdUnknownId(String),
    #[error("[vcd] parsing was cancelled")]
    VcdCancelled,
    #[error("failed to decode string")]
    Utf8(#[from] std::str::Utf8Error),
    #[error("I/O operation failed")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, VcdParseError>;

/// Non-fatal condition that was encountered while parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde1", derive(serde::Serialize, serde::Deserialize))]
pub struct Diagnostic {
    /// Simulation time at which the problem occurred, `None` for the declarations.
    pub time: Option<Time>,
    pub kind: DiagnosticKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde1", derive(serde::Serialize, serde::Deserialize))]
#[non_exhaustive]
pub enum DiagnosticKind {
    /// A value change referred to an identifier code that was never declared. The record was skipped.
    UnknownIdentifier(String),
    /// The timescale multiplier was not 1, 10 or 100 and was replaced by 1.
    /// Multipliers beyond `u64` are reported as `u64::MAX`.
    InvalidTimescaleMultiplier(u64),
    /// A timestamp went back in time and was ignored.
    DecreasingTime { current: Time, found: Time },
    /// More than one `$timescale`, the last one wins.
    DuplicateTimescale,
    /// Number of scopes that were still open at `$enddefinitions`.
    UnclosedScopes(usize),
}

impl Display for Diagnostic {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if let Some(time) = self.time {
            write!(f, "@{time}: ")?;
        }
        match &self.kind {
            DiagnosticKind::UnknownIdentifier(id) => {
                write!(f, "skipping value change of unknown identifier `{id}`")
            }
            DiagnosticKind::InvalidTimescaleMultiplier(factor) => {
                write!(f, "invalid timescale multiplier {factor}, using 1 instead")
            }
            DiagnosticKind::DecreasingTime { current, found } => {
                write!(f, "ignoring timestamp #{found} which is before #{current}")
            }
            DiagnosticKind::DuplicateTimescale => write!(f, "duplicate $timescale"),
            DiagnosticKind::UnclosedScopes(n) => {
                write!(f, "{n} scope(s) still open at $enddefinitions")
            }
        }
    }
}

/// Collects every [`Diagnostic`] of a parse. Each entry is also logged as a warning.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde1", derive(serde::Serialize, serde::Deserialize))]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn push(&mut self, time: Option<Time>, kind: DiagnosticKind) {
        let diagnostic = Diagnostic { time, kind };
        log::warn!("[vcd] {diagnostic}");
        self.entries.push(diagnostic);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Diagnostic> {
        self.entries.iter()
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.entries
    }
}

impl<'a> IntoIterator for &'a Diagnostics {
    type Item = &'a Diagnostic;
    type IntoIter = std::slice::Iter<'a, Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Maps identifier codes to the store that their value changes go to.
pub type IdLookup = FxHashMap<Vec<u8>, SignalRef>;

pub fn read_header_from_file<P: AsRef<std::path::Path>>(
    filename: P,
    options: &LoadOptions,
) -> Result<(
    Hierarchy,
    ReadBodyContinuation<std::io::BufReader<std::fs::File>>,
    u64,
)> {
    let root_name = filename
        .as_ref()
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let input_file = std::fs::File::open(filename)?;
    let mmap = unsafe { memmap2::Mmap::map(&input_file)? };
    let mut diagnostics = Diagnostics::default();
    let (header_len, hierarchy, lookup) = read_hierarchy(
        &mut std::io::Cursor::new(&mmap[..]),
        root_name,
        &mut diagnostics,
    )?;
    let body_len = (mmap.len() - header_len) as u64;
    let cont = ReadBodyContinuation {
        header_len,
        lookup,
        diagnostics,
        unknown_id_policy: options.unknown_id_policy,
        input: Input::Mmap(mmap),
    };
    Ok((hierarchy, cont, body_len))
}

pub fn read_header<R: BufRead + Seek>(
    mut input: R,
    root_name: &str,
    options: &LoadOptions,
) -> Result<(Hierarchy, ReadBodyContinuation<R>, u64)> {
    // determine the length of the input
    let start = input.stream_position()?;
    input.seek(SeekFrom::End(0))?;
    let end = input.stream_position()?;
    input.seek(SeekFrom::Start(start))?;
    let input_len = end - start;

    // actually read the header
    let mut diagnostics = Diagnostics::default();
    let (header_len, hierarchy, lookup) =
        read_hierarchy(&mut input, root_name.to_string(), &mut diagnostics)?;
    let body_len = input_len - header_len as u64;
    let cont = ReadBodyContinuation {
        header_len,
        lookup,
        diagnostics,
        unknown_id_policy: options.unknown_id_policy,
        input: Input::Reader(input),
    };
    Ok((hierarchy, cont, body_len))
}

/// Everything the body parser needs from the declaration phase.
pub struct ReadBodyContinuation<R: BufRead + Seek> {
    header_len: usize,
    lookup: IdLookup,
    diagnostics: Diagnostics,
    unknown_id_policy: UnknownIdPolicy,
    input: Input<R>,
}

impl<R: BufRead + Seek> ReadBodyContinuation<R> {
    /// Diagnostics collected while reading the declarations.
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }
}

enum Input<R: BufRead + Seek> {
    Reader(R),
    Mmap(memmap2::Mmap),
}

pub fn read_body<R: BufRead + Seek>(
    data: ReadBodyContinuation<R>,
    hierarchy: &Hierarchy,
    progress: Option<ProgressCount>,
    cancel: Option<CancelFlag>,
) -> Result<BodyResult> {
    let mut writer = StoreWriter::new(
        hierarchy,
        data.lookup,
        data.unknown_id_policy,
        data.diagnostics,
        cancel,
    );
    match data.input {
        Input::Reader(mut input) => {
            // determine body length
            let start = input.stream_position()?;
            input.seek(SeekFrom::End(0))?;
            let end = input.stream_position()?;
            input.seek(SeekFrom::Start(start))?;
            parse_body(&mut input, &mut writer, (end - start) as usize, progress)?;
        }
        Input::Mmap(mmap) => {
            let body = &mmap[data.header_len..];
            parse_body(
                &mut std::io::Cursor::new(body),
                &mut writer,
                body.len(),
                progress,
            )?;
        }
    }
    Ok(writer.finish())
}

fn read_hierarchy(
    input: &mut (impl BufRead + Seek),
    root_name: String,
    diagnostics: &mut Diagnostics,
) -> Result<(usize, Hierarchy, IdLookup)> {
    let start = input.stream_position()?;
    let mut h = HierarchyBuilder::new(root_name);
    let mut id_map: IdLookup = FxHashMap::default();

    let callback = |cmd: HeaderCmd| match cmd {
        HeaderCmd::Scope(tpe, name) => {
            let tpe = ScopeType::from_bytes(tpe).ok_or_else(|| {
                VcdParseError::VcdExpected("scope type of $scope", lossy(tpe))
            })?;
            h.add_scope(std::str::from_utf8(name)?.to_string(), tpe);
            Ok(())
        }
        HeaderCmd::UpScope => {
            if h.pop_scope() {
                Ok(())
            } else {
                Err(VcdParseError::VcdUnbalancedUpscope)
            }
        }
        HeaderCmd::Var(tpe, size, id, reference) => {
            let tpe = VarType::from_bytes(tpe)
                .ok_or_else(|| VcdParseError::VcdExpected("var type of $var", lossy(tpe)))?;
            let (name, index) = parse_reference(&reference)?;
            let width = match std::str::from_utf8(size)?.parse::<u32>() {
                Ok(len) if len > 0 => len,
                _ => {
                    return Err(VcdParseError::VcdVarLengthParsing(lossy(size), name));
                }
            };
            // several declarations may share one identifier code and thus one store
            let next_index = id_map.len();
            let signal_ref = match id_map.get(id) {
                Some(signal_ref) => *signal_ref,
                None => {
                    let signal_ref = SignalRef::from_index(next_index)
                        .ok_or_else(|| VcdParseError::VcdExpected("fewer variables", lossy(id)))?;
                    id_map.insert(id.to_vec(), signal_ref);
                    signal_ref
                }
            };
            h.add_var(name, tpe, width, index, signal_ref);
            Ok(())
        }
        HeaderCmd::Date(value) => {
            h.set_date(join_tokens(&value));
            Ok(())
        }
        HeaderCmd::Version(value) => {
            h.set_version(join_tokens(&value));
            Ok(())
        }
        HeaderCmd::Comment(value) => {
            h.add_comment(join_tokens(&value));
            Ok(())
        }
        HeaderCmd::Timescale(factor, unit) => {
            if factor.is_empty() || !factor.iter().all(u8::is_ascii_digit) {
                return Err(VcdParseError::VcdExpected(
                    "time number of $timescale",
                    lossy(factor),
                ));
            }
            // digits only, so the parse can only fail on overflow
            let factor_int = std::str::from_utf8(factor)?
                .parse::<u64>()
                .unwrap_or(u64::MAX);
            let unit = TimescaleUnit::from_bytes(unit)
                .ok_or_else(|| VcdParseError::VcdExpected("time unit of $timescale", lossy(unit)))?;
            let factor = match u32::try_from(factor_int) {
                Ok(f) if Timescale::is_valid_factor(f) => f,
                _ => {
                    diagnostics.push(None, DiagnosticKind::InvalidTimescaleMultiplier(factor_int));
                    1
                }
            };
            if h.set_timescale(Timescale::new(factor, unit)).is_some() {
                diagnostics.push(None, DiagnosticKind::DuplicateTimescale);
            }
            Ok(())
        }
    };

    read_vcd_header(input, callback)?;
    let open_scopes = h.depth();
    if open_scopes > 0 {
        diagnostics.push(None, DiagnosticKind::UnclosedScopes(open_scopes));
    }
    let end = input.stream_position()?;
    let hierarchy = h.finish();
    log::debug!(
        "[vcd] read {} header bytes: {} scopes, {} variables, {} identifier codes",
        end - start,
        hierarchy.iter_scopes().len(),
        hierarchy.iter_vars().len(),
        id_map.len()
    );
    Ok(((end - start) as usize, hierarchy, id_map))
}

#[inline]
fn lossy(value: &[u8]) -> String {
    String::from_utf8_lossy(value).to_string()
}

#[inline]
fn join_tokens(tokens: &[&[u8]]) -> String {
    tokens.iter().map(|t| lossy(t)).collect::<Vec<_>>().join(" ")
}

/// Splits a reference like `bus [7:0]`, `bus[7:0]` or `bit [3]` into name and bit index.
/// The index may also be spread over several tokens, e.g., `bus [7 : 0]`.
fn parse_reference(tokens: &[&[u8]]) -> Result<(String, Option<VarIndex>)> {
    let name = tokens[0];
    if tokens.len() > 1 {
        let suffix = tokens[1..].concat();
        let index = parse_index(&suffix)?;
        return Ok((std::str::from_utf8(name)?.to_string(), Some(index)));
    }
    if name.last() == Some(&b']') {
        if let Some(pos) = find_last(name, b'[').filter(|pos| *pos > 0) {
            let index = parse_index(&name[pos..])?;
            return Ok((std::str::from_utf8(&name[..pos])?.to_string(), Some(index)));
        }
    }
    Ok((std::str::from_utf8(name)?.to_string(), None))
}

/// Parses exactly `[N]` or `[N:M]`.
fn parse_index(suffix: &[u8]) -> Result<VarIndex> {
    let invalid = || VcdParseError::VcdInvalidIndex(lossy(suffix));
    let inner = suffix
        .strip_prefix(b"[")
        .and_then(|s| s.strip_suffix(b"]"))
        .ok_or_else(invalid)?;
    let inner = std::str::from_utf8(inner).map_err(|_| invalid())?;
    let parse = |num: &str| num.trim().parse::<i64>().map_err(|_| invalid());
    match inner.split_once(':') {
        Some((msb, lsb)) => Ok(VarIndex::new(parse(msb)?, parse(lsb)?)),
        None => Ok(VarIndex::bit(parse(inner)?)),
    }
}

#[inline]
fn find_last(haystack: &[u8], needle: u8) -> Option<usize> {
    let from_back = haystack.iter().rev().position(|b| *b == needle)?;
    Some(haystack.len() - from_back - 1)
}

fn read_vcd_header(
    input: &mut impl BufRead,
    mut callback: impl FnMut(HeaderCmd) -> Result<()>,
) -> Result<()> {
    let mut buf: Vec<u8> = Vec::with_capacity(128);
    let mut is_first = true;
    loop {
        buf.clear();
        let (cmd, body) = read_command(input, &mut buf, is_first)?;
        is_first = false;
        let tokens = find_tokens(body);
        let parsed = match cmd {
            VcdCmd::Scope => {
                let tpe = expect_token(&tokens, 0, "scope type of $scope")?;
                // `$scope top $end`: the lone token is a name, not a type
                if tokens.len() == 1 && ScopeType::from_bytes(tpe).is_none() {
                    return Err(VcdParseError::VcdExpected("scope type of $scope", lossy(tpe)));
                }
                let name = expect_token(&tokens, 1, "scope identifier of $scope")?;
                expect_no_more_tokens(&tokens, 2)?;
                HeaderCmd::Scope(tpe, name)
            }
            VcdCmd::Var => {
                let tpe = expect_token(&tokens, 0, "var type of $var")?;
                let size = expect_token(&tokens, 1, "size of $var")?;
                let id = expect_token(&tokens, 2, "identifier of $var")?;
                expect_token(&tokens, 3, "identifier of reference")?;
                HeaderCmd::Var(tpe, size, id, tokens[3..].to_vec())
            }
            VcdCmd::UpScope => {
                expect_no_more_tokens(&tokens, 0)?;
                HeaderCmd::UpScope
            }
            VcdCmd::Date => HeaderCmd::Date(tokens),
            VcdCmd::Comment => HeaderCmd::Comment(tokens),
            VcdCmd::Version => HeaderCmd::Version(tokens),
            VcdCmd::Timescale => {
                let (factor, unit) = match tokens.len() {
                    0 => {
                        return Err(VcdParseError::VcdExpected(
                            "time number of $timescale",
                            "$end".to_string(),
                        ))
                    }
                    1 => {
                        // `1ns` is as valid as `1 ns`
                        let token = tokens[0];
                        match token.iter().position(|c| !c.is_ascii_digit()) {
                            None => {
                                return Err(VcdParseError::VcdExpected(
                                    "time unit of $timescale",
                                    "$end".to_string(),
                                ))
                            }
                            Some(pos) => (&token[..pos], &token[pos..]),
                        }
                    }
                    _ => {
                        expect_no_more_tokens(&tokens, 2)?;
                        (tokens[0], tokens[1])
                    }
                };
                HeaderCmd::Timescale(factor, unit)
            }
            VcdCmd::EndDefinitions => {
                // header is done
                return Ok(());
            }
        };
        callback(parsed)?;
    }
}

#[inline]
fn expect_token<'a>(tokens: &[&'a [u8]], index: usize, what: &'static str) -> Result<&'a [u8]> {
    tokens
        .get(index)
        .copied()
        .ok_or_else(|| VcdParseError::VcdExpected(what, "$end".to_string()))
}

#[inline]
fn expect_no_more_tokens(tokens: &[&[u8]], count: usize) -> Result<()> {
    match tokens.get(count) {
        None => Ok(()),
        Some(extra) => Err(VcdParseError::VcdExpected("$end", lossy(extra))),
    }
}

const VCD_DATE: &[u8] = b"date";
const VCD_TIMESCALE: &[u8] = b"timescale";
const VCD_VAR: &[u8] = b"var";
const VCD_SCOPE: &[u8] = b"scope";
const VCD_UP_SCOPE: &[u8] = b"upscope";
const VCD_COMMENT: &[u8] = b"comment";
const VCD_VERSION: &[u8] = b"version";
const VCD_END_DEFINITIONS: &[u8] = b"enddefinitions";
const VCD_COMMANDS: [&[u8]; 8] = [
    VCD_COMMENT,
    VCD_DATE,
    VCD_END_DEFINITIONS,
    VCD_SCOPE,
    VCD_TIMESCALE,
    VCD_UP_SCOPE,
    VCD_VAR,
    VCD_VERSION,
];

/// Used to show all commands when printing an error message.
fn get_vcd_command_str() -> String {
    VCD_COMMANDS
        .iter()
        .map(|c| String::from_utf8_lossy(c))
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, PartialEq, Clone, Copy)]
enum VcdCmd {
    Date,
    Timescale,
    Var,
    Scope,
    UpScope,
    Comment,
    Version,
    EndDefinitions,
}

impl VcdCmd {
    fn from_bytes(name: &[u8]) -> Option<Self> {
        match name {
            VCD_VAR => Some(VcdCmd::Var),
            VCD_SCOPE => Some(VcdCmd::Scope),
            VCD_UP_SCOPE => Some(VcdCmd::UpScope),
            VCD_DATE => Some(VcdCmd::Date),
            VCD_TIMESCALE => Some(VcdCmd::Timescale),
            VCD_COMMENT => Some(VcdCmd::Comment),
            VCD_VERSION => Some(VcdCmd::Version),
            VCD_END_DEFINITIONS => Some(VcdCmd::EndDefinitions),
            _ => None,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            VcdCmd::Date => "date",
            VcdCmd::Timescale => "timescale",
            VcdCmd::Var => "var",
            VcdCmd::Scope => "scope",
            VcdCmd::UpScope => "upscope",
            VcdCmd::Comment => "comment",
            VcdCmd::Version => "version",
            VcdCmd::EndDefinitions => "enddefinitions",
        }
    }
}

enum HeaderCmd<'a> {
    Date(Vec<&'a [u8]>),
    Version(Vec<&'a [u8]>),
    Comment(Vec<&'a [u8]>),
    Timescale(&'a [u8], &'a [u8]), // factor, unit
    Scope(&'a [u8], &'a [u8]),     // tpe, name
    UpScope,
    Var(&'a [u8], &'a [u8], &'a [u8], Vec<&'a [u8]>), // tpe, size, id, reference
}

#[inline]
fn is_eof(e: &std::io::Error) -> bool {
    e.kind() == std::io::ErrorKind::UnexpectedEof
}

/// Reads in a command until the `$end`. Uses buf to store the read data.
/// Returns the name and the body of the command.
fn read_command<'a>(
    input: &mut impl BufRead,
    buf: &'a mut Vec<u8>,
    is_first: bool,
) -> Result<(VcdCmd, &'a [u8])> {
    // start out with an empty buffer
    debug_assert!(buf.is_empty());

    // skip over any preceding whitespace
    let start_char = match skip_whitespace(input) {
        Ok(c) => c,
        Err(e) if is_eof(&e) && is_first => return Err(VcdParseError::VcdEmptyHeader),
        Err(e) if is_eof(&e) => return Err(VcdParseError::VcdMissingEndDefinitions),
        Err(e) => return Err(e.into()),
    };

    if start_char != b'$' {
        return Err(VcdParseError::VcdStartChar(lossy(&[start_char])));
    }

    // read the rest of the command into the buffer
    read_token(input, buf)?;

    // check to see if this is a valid command
    let cmd = VcdCmd::from_bytes(buf).ok_or_else(|| VcdParseError::VcdInvalidCommand(lossy(buf)))?;
    buf.clear();

    // read until we find the end token
    read_until_end_token(input, buf).map_err(|e| {
        if is_eof(&e) {
            VcdParseError::VcdMissingEnd(cmd.name().to_string())
        } else {
            e.into()
        }
    })?;

    // return the name and body of the command
    Ok((cmd, &buf[..]))
}

#[inline]
fn find_tokens(line: &[u8]) -> Vec<&[u8]> {
    line.split(|c| is_white_space(*c))
        .filter(|e| !e.is_empty())
        .collect()
}

#[inline]
fn read_until_end_token(input: &mut impl BufRead, buf: &mut Vec<u8>) -> std::io::Result<()> {
    // count how many characters of the $end token we have recognized
    let mut end_index = 0;
    // `$end` only counts as a token when it is preceded by whitespace
    let mut after_white_space = true;
    loop {
        let byte = read_byte(input)?;
        // we always append and then later drop the `$end` bytes.
        buf.push(byte);
        end_index = match (end_index, byte) {
            (0, b'$') if after_white_space => 1,
            (1, b'e') => 2,
            (2, b'n') => 3,
            (3, b'd') => {
                // the token has to end here
                let at_boundary = match input.fill_buf()?.first() {
                    None => true,
                    Some(next) => is_white_space(*next),
                };
                if at_boundary {
                    buf.truncate(buf.len() - 4); // drop $end
                    return Ok(());
                }
                0
            }
            _ => 0, // reset
        };
        after_white_space = is_white_space(byte);
    }
}

/// Reads bytes until the next whitespace or the end of the input.
#[inline]
fn read_token(input: &mut impl BufRead, buf: &mut Vec<u8>) -> std::io::Result<()> {
    loop {
        let byte = match read_byte(input) {
            Ok(b) => b,
            Err(e) if is_eof(&e) => return Ok(()),
            Err(e) => return Err(e),
        };
        if is_white_space(byte) {
            return Ok(());
        }
        buf.push(byte);
    }
}

/// Advances the input until the first non-whitespace character which is then returned.
#[inline]
fn skip_whitespace(input: &mut impl BufRead) -> std::io::Result<u8> {
    loop {
        let byte = read_byte(input)?;
        if !is_white_space(byte) {
            return Ok(byte);
        }
    }
}

#[inline]
fn read_byte(input: &mut impl BufRead) -> std::io::Result<u8> {
    let mut buf = [0u8; 1];
    input.read_exact(&mut buf)?;
    Ok(buf[0])
}

#[inline]
fn is_white_space(b: u8) -> bool {
    matches!(b, b' ' | b'\n' | b'\r' | b'\t')
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum DumpCmd {
    Vars,
    On,
    Off,
    All,
}

impl DumpCmd {
    fn name(&self) -> &'static str {
        match self {
            DumpCmd::Vars => "dumpvars",
            DumpCmd::On => "dumpon",
            DumpCmd::Off => "dumpoff",
            DumpCmd::All => "dumpall",
        }
    }
}

enum FirstTokenResult {
    Time(u64),
    OneBitValue,
    MultiBitValue,
    CommentStart,
    DumpStart(DumpCmd),
    End,
}

fn parse_first_token(token: &[u8]) -> Result<FirstTokenResult> {
    match token[0] {
        b'#' => {
            let invalid = || VcdParseError::VcdInvalidTime(lossy(&token[1..]));
            let value_str = std::str::from_utf8(&token[1..]).map_err(|_| invalid())?;
            let value = match value_str.parse::<u64>() {
                Ok(val) => val,
                // some simulators print integral times as floats
                Err(_) => match value_str.parse::<f64>() {
                    Ok(val) if val.fract() == 0.0 && val >= 0.0 && val < u64::MAX as f64 => {
                        val as u64
                    }
                    _ => return Err(invalid()),
                },
            };
            Ok(FirstTokenResult::Time(value))
        }
        b'0' | b'1' | b'z' | b'Z' | b'x' | b'X' => Ok(FirstTokenResult::OneBitValue),
        b'b' | b'B' | b'r' | b'R' => Ok(FirstTokenResult::MultiBitValue),
        _ => match token {
            b"$comment" => Ok(FirstTokenResult::CommentStart),
            b"$dumpvars" => Ok(FirstTokenResult::DumpStart(DumpCmd::Vars)),
            b"$dumpon" => Ok(FirstTokenResult::DumpStart(DumpCmd::On)),
            b"$dumpoff" => Ok(FirstTokenResult::DumpStart(DumpCmd::Off)),
            b"$dumpall" => Ok(FirstTokenResult::DumpStart(DumpCmd::All)),
            b"$end" => Ok(FirstTokenResult::End),
            _ => Err(VcdParseError::VcdUnexpectedBodyToken(lossy(token))),
        },
    }
}

/// Turns a raw value token into what we store: scalars and bit vectors in lower case,
/// without the radix prefix. Real values are kept as they are.
fn normalize_value(raw: &[u8]) -> Result<Cow<'_, str>> {
    match raw[0] {
        b'b' | b'B' | b'r' | b'R' if raw.len() == 1 => Err(VcdParseError::VcdExpected(
            "value after radix prefix",
            lossy(raw),
        )),
        b'r' | b'R' => Ok(Cow::Borrowed(std::str::from_utf8(&raw[1..])?)),
        b'b' | b'B' => {
            let bits = std::str::from_utf8(&raw[1..])?;
            if bits.bytes().any(|b| b.is_ascii_uppercase()) {
                Ok(Cow::Owned(bits.to_ascii_lowercase()))
            } else {
                Ok(Cow::Borrowed(bits))
            }
        }
        _ => {
            let symbol = std::str::from_utf8(&raw[..1])?;
            if symbol.bytes().any(|b| b.is_ascii_uppercase()) {
                Ok(Cow::Owned(symbol.to_ascii_lowercase()))
            } else {
                Ok(Cow::Borrowed(symbol))
            }
        }
    }
}

/// Appends every value change to the store of its identifier code.
struct StoreWriter {
    lookup: IdLookup,
    stores: Vec<ValueChangeStore>,
    time: Time,
    start_time: Option<Time>,
    unknown_id_policy: UnknownIdPolicy,
    diagnostics: Diagnostics,
    cancel: Option<CancelFlag>,
}

impl StoreWriter {
    fn new(
        hierarchy: &Hierarchy,
        lookup: IdLookup,
        unknown_id_policy: UnknownIdPolicy,
        diagnostics: Diagnostics,
        cancel: Option<CancelFlag>,
    ) -> Self {
        Self {
            lookup,
            stores: vec![ValueChangeStore::default(); hierarchy.num_unique_signals()],
            time: 0,
            start_time: None,
            unknown_id_policy,
            diagnostics,
            cancel,
        }
    }

    fn finish(mut self) -> BodyResult {
        let end_time = self.time;
        for store in self.stores.iter_mut() {
            store.close(end_time);
            store.shrink_to_fit();
        }
        let start_time = self.start_time.unwrap_or(0);
        log::debug!(
            "[vcd] read values of {} signals from #{start_time} to #{end_time}",
            self.stores.len()
        );
        BodyResult {
            stores: self.stores,
            id_lookup: self.lookup,
            start_time,
            end_time,
            diagnostics: self.diagnostics,
        }
    }
}

impl ParseBodyOutput for StoreWriter {
    fn time(&mut self, value: u64) -> Result<()> {
        if let Some(flag) = self.cancel.as_ref() {
            if flag.load(Ordering::Relaxed) {
                return Err(VcdParseError::VcdCancelled);
            }
        }
        if self.start_time.is_some() && value < self.time {
            self.diagnostics.push(
                Some(self.time),
                DiagnosticKind::DecreasingTime {
                    current: self.time,
                    found: value,
                },
            );
        } else {
            self.time = value;
            self.start_time.get_or_insert(value);
        }
        Ok(())
    }

    fn value(&mut self, value: &[u8], id: &[u8]) -> Result<()> {
        let signal_ref = match self.lookup.get(id) {
            Some(signal_ref) => *signal_ref,
            None => {
                return match self.unknown_id_policy {
                    UnknownIdPolicy::Warn => {
                        self.diagnostics.push(
                            Some(self.time),
                            DiagnosticKind::UnknownIdentifier(lossy(id)),
                        );
                        Ok(())
                    }
                    UnknownIdPolicy::Error => Err(VcdParseError::VcdUnknownId(lossy(id))),
                };
            }
        };
        // changes before the first timestamp happen at time zero
        self.start_time.get_or_insert(self.time);
        let value = normalize_value(value)?;
        self.stores[signal_ref.index()].append(self.time, Some(value.as_ref()));
        Ok(())
    }
}

struct ProgressReporter {
    progress: Option<ProgressCount>,
    last_reported_pos: usize,
    report_increments: usize,
}

impl ProgressReporter {
    #[inline]
    fn new(progress: Option<ProgressCount>, len: usize) -> Self {
        let last_reported_pos = 0;
        let report_increments = std::cmp::max(len / 1000, 512);
        Self {
            progress,
            last_reported_pos,
            report_increments,
        }
    }

    #[inline]
    fn report(&mut self, pos: usize, always_report: bool) {
        if let Some(p) = self.progress.as_ref() {
            let increment = pos - self.last_reported_pos;
            if always_report || increment > self.report_increments {
                p.fetch_add(increment as u64, Ordering::SeqCst);
                self.last_reported_pos = pos;
            }
        }
    }
}

trait ParseBodyOutput {
    fn time(&mut self, value: u64) -> Result<()>;
    fn value(&mut self, value: &[u8], id: &[u8]) -> Result<()>;
}

fn parse_body(
    input: &mut impl BufRead,
    out: &mut impl ParseBodyOutput,
    len: usize,
    progress: Option<ProgressCount>,
) -> Result<()> {
    let mut progress_report = ProgressReporter::new(progress, len);

    let mut state = BodyState::ParsingFirstToken;
    let mut dump_block: Option<DumpCmd> = None;

    let mut first = Vec::with_capacity(32);
    let mut id = Vec::with_capacity(32);
    let mut final_pos = 0;

    for (pos, b) in input.bytes().enumerate() {
        final_pos = pos + 1;
        progress_report.report(pos, false);
        let b = b?;
        match state {
            BodyState::ParsingFirstToken => {
                if is_white_space(b) {
                    if first.is_empty() {
                        // we are in front of the token => nothing to do
                    } else {
                        state = on_first_token(&first, &mut dump_block, out)?;
                        // clear buffer to find next token
                        if state != BodyState::ParsingIdToken {
                            first.clear();
                        }
                    }
                } else {
                    first.push(b);
                }
            }
            BodyState::ParsingIdToken => {
                if is_white_space(b) {
                    if id.is_empty() {
                        // we are in front of the token => nothing to do
                    } else {
                        out.value(first.as_slice(), id.as_slice())?;
                        first.clear();
                        id.clear();
                        state = BodyState::ParsingFirstToken;
                    }
                } else {
                    id.push(b);
                }
            }
            BodyState::LookingForEndToken => {
                if is_white_space(b) {
                    if first.is_empty() {
                        // we are in front of the token => nothing to do
                    } else {
                        if first == b"$end" {
                            state = BodyState::ParsingFirstToken;
                        }
                        first.clear();
                    }
                } else {
                    first.push(b);
                }
            }
        }
    }

    // we reached the end of the file
    match state {
        BodyState::ParsingFirstToken => {
            if !first.is_empty() {
                match on_first_token(&first, &mut dump_block, out)? {
                    BodyState::ParsingFirstToken => {}
                    BodyState::ParsingIdToken => return Err(VcdParseError::VcdEmptyId),
                    BodyState::LookingForEndToken => {
                        return Err(VcdParseError::VcdMissingEnd("comment".to_string()))
                    }
                }
            }
        }
        BodyState::ParsingIdToken => {
            if id.is_empty() {
                return Err(VcdParseError::VcdEmptyId);
            }
            out.value(first.as_slice(), id.as_slice())?;
        }
        BodyState::LookingForEndToken => {
            if first != b"$end" {
                return Err(VcdParseError::VcdMissingEnd("comment".to_string()));
            }
        }
    }
    if let Some(cmd) = dump_block {
        return Err(VcdParseError::VcdMissingEnd(cmd.name().to_string()));
    }
    progress_report.report(final_pos, true);
    Ok(())
}

/// Handles the first token of a record and returns the state to continue in.
#[inline]
fn on_first_token(
    token: &[u8],
    dump_block: &mut Option<DumpCmd>,
    out: &mut impl ParseBodyOutput,
) -> Result<BodyState> {
    let next = match parse_first_token(token)? {
        FirstTokenResult::Time(value) => {
            if let Some(cmd) = dump_block {
                return Err(VcdParseError::VcdMissingEnd(cmd.name().to_string()));
            }
            out.time(value)?;
            BodyState::ParsingFirstToken
        }
        FirstTokenResult::OneBitValue => {
            if token.len() < 2 {
                return Err(VcdParseError::VcdEmptyId);
            }
            out.value(&token[0..1], &token[1..])?;
            BodyState::ParsingFirstToken
        }
        FirstTokenResult::MultiBitValue => BodyState::ParsingIdToken,
        FirstTokenResult::CommentStart => BodyState::LookingForEndToken,
        FirstTokenResult::DumpStart(cmd) => {
            if dump_block.is_some() {
                return Err(VcdParseError::VcdUnexpectedBodyToken(lossy(token)));
            }
            *dump_block = Some(cmd);
            BodyState::ParsingFirstToken
        }
        FirstTokenResult::End => {
            if dump_block.take().is_none() {
                return Err(VcdParseError::VcdUnexpectedBodyToken(lossy(token)));
            }
            BodyState::ParsingFirstToken
        }
    };
    Ok(next)
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum BodyState {
    ParsingFirstToken,
    ParsingIdToken,
    LookingForEndToken,
}
