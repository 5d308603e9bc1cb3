// Copyright 2024-2025 Cornell University
// released under BSD 3-Clause License
// author: Kevin Laeufer <laeufer@cornell.edu>
//
// Anything a renderer can draw as a wave.

use crate::signals::{EmptyStore, Time, TimeRange, ValueChangeStore};
use crate::{Hierarchy, Var};

pub trait TimeSeries {
    /// Scope names followed by the name of the series.
    fn path(&self) -> Vec<String>;
    /// Kind tag, e.g., `wire`.
    fn kind(&self) -> &str;
    /// Number of bits.
    fn width(&self) -> u32;
    fn value_at(&self, time: Time) -> Result<TimeRange<'_>, EmptyStore>;
    fn first_time(&self) -> Result<Time, EmptyStore>;
    fn last_time(&self) -> Result<Time, EmptyStore>;
}

/// A declared variable together with its value changes.
#[derive(Clone, Copy)]
pub struct SignalView<'a> {
    hierarchy: &'a Hierarchy,
    var: &'a Var,
    store: &'a ValueChangeStore,
}

impl<'a> SignalView<'a> {
    pub fn new(hierarchy: &'a Hierarchy, var: &'a Var, store: &'a ValueChangeStore) -> Self {
        Self {
            hierarchy,
            var,
            store,
        }
    }

    pub fn var(&self) -> &'a Var {
        self.var
    }

    pub fn store(&self) -> &'a ValueChangeStore {
        self.store
    }

    pub fn full_name(&self) -> String {
        self.var.full_name(self.hierarchy)
    }
}

impl std::fmt::Debug for SignalView<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SignalView({})", self.full_name())
    }
}

impl TimeSeries for SignalView<'_> {
    fn path(&self) -> Vec<String> {
        self.var.path(self.hierarchy)
    }

    fn kind(&self) -> &str {
        self.var.var_type().as_str()
    }

    fn width(&self) -> u32 {
        self.var.width()
    }

    fn value_at(&self, time: Time) -> Result<TimeRange<'_>, EmptyStore> {
        self.store.query(time)
    }

    fn first_time(&self) -> Result<Time, EmptyStore> {
        self.store.start_time()
    }

    fn last_time(&self) -> Result<Time, EmptyStore> {
        self.store.end_time()
    }
}

/// Inclusive span of time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde1", derive(serde::Serialize, serde::Deserialize))]
pub struct TimeSpan {
    start: Time,
    end: Time,
}

impl TimeSpan {
    pub fn new(a: Time, b: Time) -> Self {
        Self {
            start: a.min(b),
            end: a.max(b),
        }
    }

    pub fn start(&self) -> Time {
        self.start
    }

    pub fn end(&self) -> Time {
        self.end
    }

    pub fn contains(&self, time: Time) -> bool {
        self.start <= time && time <= self.end
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde1", derive(serde::Serialize, serde::Deserialize))]
pub struct Annotation {
    pub span: TimeSpan,
    pub text: String,
}

/// A track of labelled time spans, e.g., decoded bus transactions.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde1", derive(serde::Serialize, serde::Deserialize))]
pub struct Annotations {
    path: Vec<String>,
    kind: String,
    width: u32,
    /// sorted by start time
    annotations: Vec<Annotation>,
}

impl Annotations {
    pub fn new(path: Vec<String>, kind: impl Into<String>, width: u32) -> Self {
        Self {
            path,
            kind: kind.into(),
            width,
            annotations: Vec::new(),
        }
    }

    pub fn add(&mut self, span: TimeSpan, text: impl Into<String>) {
        let pos = self
            .annotations
            .partition_point(|a| a.span.start <= span.start);
        self.annotations.insert(
            pos,
            Annotation {
                span,
                text: text.into(),
            },
        );
    }

    pub fn len(&self) -> usize {
        self.annotations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.annotations.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Annotation> {
        self.annotations.iter()
    }
}

impl TimeSeries for Annotations {
    fn path(&self) -> Vec<String> {
        self.path.clone()
    }

    fn kind(&self) -> &str {
        &self.kind
    }

    fn width(&self) -> u32 {
        self.width
    }

    /// The annotation that contains `time`, the latest starting one if several overlap.
    /// Outside of any annotation, the surrounding gap is returned without a value.
    fn value_at(&self, time: Time) -> Result<TimeRange<'_>, EmptyStore> {
        if self.annotations.is_empty() {
            return Err(EmptyStore);
        }
        let started = &self.annotations[..self.annotations.partition_point(|a| a.span.start <= time)];
        if let Some(hit) = started.iter().rev().find(|a| a.span.contains(time)) {
            return Ok(TimeRange {
                start: hit.span.start,
                end: hit.span.end,
                value: Some(hit.text.as_str()),
            });
        }
        let gap_start = match started.iter().map(|a| a.span.end).max() {
            Some(end) => end + 1,
            None => 0,
        };
        let gap_end = match self.annotations.get(started.len()) {
            Some(next) => next.span.start - 1,
            None => Time::MAX,
        };
        Ok(TimeRange {
            start: gap_start,
            end: gap_end,
            value: None,
        })
    }

    fn first_time(&self) -> Result<Time, EmptyStore> {
        self.annotations
            .first()
            .map(|a| a.span.start)
            .ok_or(EmptyStore)
    }

    fn last_time(&self) -> Result<Time, EmptyStore> {
        self.annotations
            .iter()
            .map(|a| a.span.end)
            .max()
            .ok_or(EmptyStore)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track() -> Annotations {
        let mut a = Annotations::new(vec!["top".to_string(), "uart".to_string()], "annotation", 8);
        a.add(TimeSpan::new(30, 39), "0x55");
        a.add(TimeSpan::new(10, 19), "0x41");
        a
    }

    #[test]
    fn test_annotation_lookup() {
        let a = track();
        assert_eq!(a.len(), 2);
        assert_eq!(a.first_time(), Ok(10));
        assert_eq!(a.last_time(), Ok(39));
        let r = a.value_at(12).unwrap();
        assert_eq!((r.start, r.end, r.value), (10, 19, Some("0x41")));
        let r = a.value_at(39).unwrap();
        assert_eq!(r.value, Some("0x55"));
    }

    #[test]
    fn test_annotation_gaps() {
        let a = track();
        let r = a.value_at(25).unwrap();
        assert_eq!((r.start, r.end, r.value), (20, 29, None));
        let r = a.value_at(3).unwrap();
        assert_eq!((r.start, r.end, r.value), (0, 9, None));
        let r = a.value_at(100).unwrap();
        assert_eq!((r.start, r.end, r.value), (40, Time::MAX, None));
    }

    #[test]
    fn test_overlapping_annotations() {
        let mut a = track();
        a.add(TimeSpan::new(15, 5), "inner");
        assert_eq!(a.value_at(16).unwrap().value, Some("0x41"));
        assert_eq!(a.value_at(7).unwrap().value, Some("inner"));
        assert_eq!(a.first_time(), Ok(5));
    }

    #[test]
    fn test_empty_track() {
        let a = Annotations::new(vec![], "annotation", 1);
        assert!(a.is_empty());
        assert_eq!(a.value_at(0), Err(EmptyStore));
        assert_eq!(a.first_time(), Err(EmptyStore));
        assert_eq!(a.last_time(), Err(EmptyStore));
    }

    #[test]
    fn test_series_are_interchangeable() {
        let a = track();
        let series: Vec<&dyn TimeSeries> = vec![&a];
        assert_eq!(series[0].path(), ["top", "uart"]);
        assert_eq!(series[0].kind(), "annotation");
        assert_eq!(series[0].width(), 8);
    }
}
