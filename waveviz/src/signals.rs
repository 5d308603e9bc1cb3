// Copyright 2023-2024 The Regents of the University of California
// Copyright 2024-2025 Cornell University
// released under BSD 3-Clause License
// author: Kevin Laeufer <laeufer@cornell.edu>

use std::fmt::{Debug, Display, Formatter};
use std::ops::RangeInclusive;

pub type Time = u64;

/// Answer to a point query: `value` holds from `start` up to and including `end`.
/// A `value` of `None` is the "no value" marker that pads the end of a trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange<'a> {
    pub start: Time,
    pub end: Time,
    pub value: Option<&'a str>,
}

impl Display for TimeRange<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}, {}] {}",
            self.start,
            self.end,
            self.value.unwrap_or("-")
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("value change store has no entries")]
pub struct EmptyStore;

/// Run-length compressed sequence of value changes of a single signal.
///
/// Times are strictly increasing and no two consecutive entries carry the same token.
/// All tokens are packed into a single string buffer.
#[derive(Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde1", derive(serde::Serialize, serde::Deserialize))]
pub struct ValueChangeStore {
    times: Vec<Time>,
    /// end offset of each token in `values`
    ends: Vec<usize>,
    /// entries without a value
    no_value: Vec<bool>,
    values: String,
}

impl Debug for ValueChangeStore {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.iter_changes()).finish()
    }
}

impl ValueChangeStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.times.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    #[inline]
    fn value_at(&self, index: usize) -> Option<&str> {
        if self.no_value[index] {
            return None;
        }
        let start = match index.checked_sub(1) {
            Some(prev) => self.ends[prev],
            None => 0,
        };
        Some(&self.values[start..self.ends[index]])
    }

    #[inline]
    fn last_value(&self) -> Option<Option<&str>> {
        self.len().checked_sub(1).map(|ii| self.value_at(ii))
    }

    fn pop(&mut self) {
        self.times.pop();
        self.ends.pop();
        self.no_value.pop();
        let end = self.ends.last().copied().unwrap_or(0);
        self.values.truncate(end);
    }

    /// Records that the signal takes on `value` at `time`. Returns whether the store changed.
    ///
    /// A token equal to the last stored one is dropped. A second write at the time of the last
    /// entry replaces that entry. Writes that go back in time are ignored.
    /// An empty token is treated as "no value".
    pub fn append(&mut self, time: Time, value: Option<&str>) -> bool {
        let value = value.filter(|v| !v.is_empty());
        if self.last_value() == Some(value) {
            return false;
        }
        match self.times.last() {
            Some(&last) if time < last => return false,
            Some(&last) if time == last => {
                self.pop();
                if self.last_value() == Some(value) {
                    // the replaced entry collapsed into its predecessor
                    return true;
                }
            }
            _ => {}
        }
        self.times.push(time);
        self.no_value.push(value.is_none());
        if let Some(v) = value {
            self.values.push_str(v);
        }
        self.ends.push(self.values.len());
        true
    }

    /// Pads the store with a "no value" entry at `end_time` so that the last real value has
    /// a well-defined end. Nothing is added if the last change already happens at `end_time`.
    pub fn close(&mut self, end_time: Time) {
        let needs_marker = match self.times.last() {
            None => true,
            Some(&last) => end_time > last,
        };
        if needs_marker {
            self.append(end_time, None);
        }
    }

    pub fn start_time(&self) -> Result<Time, EmptyStore> {
        self.times.first().copied().ok_or(EmptyStore)
    }

    pub fn end_time(&self) -> Result<Time, EmptyStore> {
        self.times.last().copied().ok_or(EmptyStore)
    }

    #[inline]
    fn find_index(&self, time: Time) -> usize {
        match self.times.binary_search(&time) {
            Ok(index) => index,
            // queries before the first entry clamp to it
            Err(insert_at) => insert_at.saturating_sub(1),
        }
    }

    #[inline]
    fn range_at(&self, index: usize) -> TimeRange<'_> {
        let start = self.times[index];
        let end = match self.times.get(index + 1) {
            Some(next) => next - 1,
            None => start,
        };
        TimeRange {
            start,
            end,
            value: self.value_at(index),
        }
    }

    /// Returns the value of the signal at `time` together with the span over which it holds.
    pub fn query(&self, time: Time) -> Result<TimeRange<'_>, EmptyStore> {
        if self.is_empty() {
            return Err(EmptyStore);
        }
        Ok(self.range_at(self.find_index(time)))
    }

    /// All stored changes in time order.
    pub fn iter_changes(&self) -> impl Iterator<Item = (Time, Option<&str>)> + '_ {
        self.times
            .iter()
            .enumerate()
            .map(|(ii, time)| (*time, self.value_at(ii)))
    }

    /// Every value span that overlaps `range`, starting with the one active at its start.
    pub fn changes_in(&self, range: RangeInclusive<Time>) -> impl Iterator<Item = TimeRange<'_>> {
        let (start, end) = range.into_inner();
        let first = if self.is_empty() || start > end {
            self.len()
        } else {
            self.find_index(start)
        };
        (first..self.len())
            .take_while(move |ii| *ii == first || self.times[*ii] <= end)
            .map(|ii| self.range_at(ii))
    }

    /// Size in bytes.
    pub fn size_in_memory(&self) -> usize {
        std::mem::size_of::<Self>()
            + self.times.capacity() * std::mem::size_of::<Time>()
            + self.ends.capacity() * std::mem::size_of::<usize>()
            + self.no_value.capacity()
            + self.values.capacity()
    }

    pub(crate) fn shrink_to_fit(&mut self) {
        self.times.shrink_to_fit();
        self.ends.shrink_to_fit();
        self.no_value.shrink_to_fit();
        self.values.shrink_to_fit();
    }
}

/// How a multi-bit token is shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde1", derive(serde::Serialize, serde::Deserialize))]
pub enum DisplayFormat {
    #[default]
    Binary,
    Hexadecimal,
}

impl DisplayFormat {
    pub fn format(&self, token: &str) -> String {
        match self {
            DisplayFormat::Binary => token.to_string(),
            DisplayFormat::Hexadecimal => bit_string_to_hex(token),
        }
    }
}

/// Converts a string of `0`/`1`/`x`/`z` bits into hex digits. Bits are grouped into nibbles
/// from the right. A nibble with an `x` bit turns into `x`, otherwise one with a `z` bit
/// turns into `z`.
pub fn bit_string_to_hex(bits: &str) -> String {
    let bytes = bits.as_bytes();
    let mut out = String::with_capacity(bytes.len().div_ceil(4));
    let first = match bytes.len() % 4 {
        0 => 4.min(bytes.len()),
        rem => rem,
    };
    let (head, tail) = bytes.split_at(first);
    for nibble in std::iter::once(head).chain(tail.chunks(4)) {
        if nibble.is_empty() {
            continue;
        }
        out.push(nibble_to_hex(nibble));
    }
    out
}

#[inline]
fn nibble_to_hex(nibble: &[u8]) -> char {
    if nibble.iter().any(|b| b.eq_ignore_ascii_case(&b'x')) {
        return 'x';
    }
    if nibble.iter().any(|b| b.eq_ignore_ascii_case(&b'z')) {
        return 'z';
    }
    let mut value = 0u32;
    for bit in nibble.iter() {
        value = (value << 1) | u32::from(*bit == b'1');
    }
    char::from_digit(value, 16).unwrap_or('?')
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn clk() -> ValueChangeStore {
        let mut store = ValueChangeStore::new();
        store.append(0, Some("0"));
        store.append(5, Some("1"));
        store.append(10, Some("0"));
        store.close(10);
        store
    }

    #[test]
    fn test_query() {
        let store = clk();
        assert_eq!(store.len(), 3, "no terminal marker when the last change is at the end");
        let r = store.query(7).unwrap();
        assert_eq!(
            r,
            TimeRange {
                start: 5,
                end: 9,
                value: Some("1")
            }
        );
        assert_eq!(store.query(0).unwrap().end, 4);
        assert_eq!(store.query(5).unwrap().start, 5);
        let last = store.query(1_000).unwrap();
        assert_eq!((last.start, last.end, last.value), (10, 10, Some("0")));
    }

    #[test]
    fn test_query_before_first_entry() {
        let mut store = ValueChangeStore::new();
        store.append(20, Some("1010"));
        store.append(30, Some("1111"));
        let r = store.query(3).unwrap();
        assert_eq!((r.start, r.end, r.value), (20, 29, Some("1010")));
    }

    #[test]
    fn test_empty_store() {
        let store = ValueChangeStore::new();
        assert_eq!(store.query(0), Err(EmptyStore));
        assert_eq!(store.start_time(), Err(EmptyStore));
        assert_eq!(store.end_time(), Err(EmptyStore));
        assert!(store.is_empty());
    }

    #[test]
    fn test_never_changed_signal_is_closed_with_no_value() {
        let mut store = ValueChangeStore::new();
        store.close(100);
        assert_eq!(store.len(), 1);
        let r = store.query(50).unwrap();
        assert_eq!((r.start, r.end, r.value), (100, 100, None));
    }

    #[test]
    fn test_close_adds_terminal_marker() {
        let mut store = ValueChangeStore::new();
        store.append(0, Some("x"));
        store.append(3, Some("1"));
        store.close(8);
        assert_eq!(store.end_time(), Ok(8));
        assert_eq!(store.query(5).unwrap().end, 7);
        assert_eq!(store.query(8).unwrap().value, None);
    }

    #[test]
    fn test_run_length_compression() {
        let mut store = ValueChangeStore::new();
        assert!(store.append(0, Some("1")));
        assert!(!store.append(4, Some("1")));
        assert!(store.append(6, Some("0")));
        assert_eq!(store.len(), 2);
        assert_eq!(
            store.iter_changes().collect::<Vec<_>>(),
            [(0, Some("1")), (6, Some("0"))]
        );
    }

    #[test]
    fn test_same_time_last_write_wins() {
        let mut store = ValueChangeStore::new();
        store.append(0, Some("0"));
        store.append(5, Some("1"));
        assert!(store.append(5, Some("x")));
        assert_eq!(store.query(5).unwrap().value, Some("x"));
        assert_eq!(store.len(), 2);
        // going back to the previous value removes the entry
        assert!(store.append(5, Some("0")));
        assert_eq!(store.len(), 1);
        assert_eq!(store.query(5).unwrap().value, Some("0"));
    }

    #[test]
    fn test_backwards_write_is_ignored() {
        let mut store = ValueChangeStore::new();
        store.append(10, Some("1"));
        assert!(!store.append(3, Some("0")));
        assert_eq!(store.start_time(), Ok(10));
    }

    #[test]
    fn test_changes_in() {
        let store = clk();
        let spans: Vec<_> = store
            .changes_in(3..=7)
            .map(|r| (r.start, r.end, r.value))
            .collect();
        assert_eq!(spans, [(0, 4, Some("0")), (5, 9, Some("1"))]);
        assert_eq!(store.changes_in(10..=20).count(), 1);
        assert_eq!(ValueChangeStore::new().changes_in(0..=10).count(), 0);
    }

    #[test]
    fn test_hex() {
        assert_eq!(bit_string_to_hex("1010"), "a");
        assert_eq!(bit_string_to_hex("11111111"), "ff");
        assert_eq!(bit_string_to_hex("101010"), "2a");
        assert_eq!(bit_string_to_hex("1x0011"), "x3");
        assert_eq!(bit_string_to_hex("zzzz0001"), "z1");
        assert_eq!(bit_string_to_hex("xz01"), "x");
        assert_eq!(bit_string_to_hex("1"), "1");
        assert_eq!(bit_string_to_hex(""), "");
        assert_eq!(DisplayFormat::Binary.format("0110"), "0110");
        assert_eq!(DisplayFormat::Hexadecimal.format("0110"), "6");
    }

    fn changes() -> impl Strategy<Value = Vec<(Time, u8)>> {
        prop::collection::vec((1u64..1_000, 0u8..4), 1..64).prop_map(|deltas| {
            let mut time = 0;
            deltas
                .into_iter()
                .map(|(delta, value)| {
                    time += delta;
                    (time, value)
                })
                .collect()
        })
    }

    const TOKENS: [&str; 4] = ["0", "1", "x", "z"];

    proptest! {
        #[test]
        fn query_returns_latest_append(changes in changes(), probe in 0u64..70_000) {
            let mut store = ValueChangeStore::new();
            for (time, value) in changes.iter() {
                store.append(*time, Some(TOKENS[*value as usize]));
            }
            for (time, value) in changes.iter() {
                prop_assert_eq!(store.query(*time).unwrap().value, Some(TOKENS[*value as usize]));
            }
            let expected = changes
                .iter()
                .rev()
                .find(|(time, _)| *time <= probe)
                .unwrap_or(&changes[0]);
            let r = store.query(probe).unwrap();
            prop_assert_eq!(r.value, Some(TOKENS[expected.1 as usize]));
            prop_assert!(r.start <= r.end);
        }

        #[test]
        fn consecutive_entries_differ(changes in changes()) {
            let mut store = ValueChangeStore::new();
            for (time, value) in changes.iter() {
                let before = store.len();
                let stored = store.append(*time, Some(TOKENS[*value as usize]));
                prop_assert_eq!(stored, store.len() > before);
            }
            let entries: Vec<_> = store.iter_changes().collect();
            for pair in entries.windows(2) {
                prop_assert!(pair[0].0 < pair[1].0);
                prop_assert_ne!(pair[0].1, pair[1].1);
            }
        }

        #[test]
        fn last_entry_has_zero_length_span(changes in changes(), extra in 0u64..100) {
            let mut store = ValueChangeStore::new();
            for (time, value) in changes.iter() {
                store.append(*time, Some(TOKENS[*value as usize]));
            }
            let last = store.end_time().unwrap();
            let r = store.query(last + extra).unwrap();
            prop_assert_eq!((r.start, r.end), (last, last));
        }
    }
}
