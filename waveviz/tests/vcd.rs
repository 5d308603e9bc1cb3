// Copyright 2024 The Regents of the University of California
// Copyright 2024-2025 Cornell University
// released under BSD 3-Clause License
// author: Kevin Laeufer <laeufer@cornell.edu>

use waveviz::simple::*;
use waveviz::timeseries::TimeSeries;
use waveviz::*;

#[test]
fn test_clock() {
    let waves = read("inputs/clk.vcd").expect("failed to parse");
    let h = waves.hierarchy();
    assert_eq!(h.root_scope().name(h), "clk.vcd");
    let timescale = h.timescale().unwrap();
    assert_eq!(timescale.factor, 1);
    assert_eq!(timescale.unit, TimescaleUnit::NanoSeconds);
    assert_eq!(timescale.format_time(5), "5 ns");

    let clk = waves.store_by_id("!").unwrap();
    let changes: Vec<_> = clk.iter_changes().collect();
    assert_eq!(changes, [(0, Some("0")), (5, Some("1")), (10, Some("0"))]);
    let r = clk.query(7).unwrap();
    assert_eq!((r.start, r.end, r.value), (5, 9, Some("1")));
    assert_eq!((waves.start_time(), waves.end_time()), (0, 10));
    assert!(waves.diagnostics().is_empty());
}

#[test]
fn test_bus_holds_value_until_end() {
    let waves = read("inputs/bus.vcd").expect("failed to parse");
    let bus = waves.signal_by_path(&["top", "bus"]).unwrap();
    assert_eq!(bus.width(), 4);
    assert_eq!(bus.full_name(), "top.bus[3:0]");
    let r = bus.value_at(25).unwrap();
    assert_eq!(r.value, Some("1010"));
    assert_eq!(r.start, 20);
    assert_eq!(r.end, waves.end_time());
    assert_eq!(bus.value_at(3).unwrap().value, Some("0000"));

    // the clock stopped changing at 10 and is padded up to the end of the trace
    let clk = waves.signal_by_path(&["top", "clk"]).unwrap();
    let changes: Vec<_> = clk.store().iter_changes().collect();
    assert_eq!(changes, [(0, Some("0")), (10, Some("1")), (20, None)]);
}

#[test]
fn test_nested_scopes() {
    let waves = read("inputs/nested.vcd").expect("failed to parse");
    let h = waves.hierarchy();
    assert_eq!(h.scopes().len(), 1);
    let top = h.first_scope().unwrap();
    assert_eq!(top.name(h), "top");
    assert_eq!(top.scope_type(), ScopeType::Module);
    assert_eq!(top.parent(), Some(h.root()));
    assert_eq!(top.vars().len(), 1);
    assert_eq!(top.child_count(), 1);

    let blk = &h[top.child(0).unwrap()];
    assert_eq!(blk.name(h), "blk");
    assert_eq!(blk.scope_type(), ScopeType::Begin);
    assert_eq!(blk.full_name(h), "top.blk");
    assert_eq!(blk.child_count(), 0);
    let names: Vec<_> = blk.vars().iter().map(|v| h[*v].reference(h)).collect();
    assert_eq!(names, ["data[7:0]", "b"]);

    let data = waves.signal_by_path(&["top", "blk", "data[7:0]"]).unwrap();
    assert_eq!(data.var().index(), Some(VarIndex::new(7, 0)));
    let value = data.value_at(2).unwrap().value.unwrap();
    assert_eq!(DisplayFormat::Hexadecimal.format(value), "a5");
    let b = waves.signal_by_path(&["top", "blk", "b"]).unwrap();
    assert_eq!(b.value_at(2).unwrap().value, Some("0"));
    assert_eq!(b.value_at(3).unwrap().value, Some("1"));
    assert_eq!(b.path(), ["top", "blk", "b"]);
}

#[test]
fn test_missing_scope_type() {
    let err = read("inputs/missing_scope_type.vcd").unwrap_err();
    assert!(
        err.to_string().contains("expected scope type of $scope"),
        "{err}"
    );
}

#[test]
fn test_unknown_identifier_is_skipped() {
    let waves = read("inputs/unknown_id.vcd").expect("failed to parse");
    let clk = waves.store_by_id("!").unwrap();
    let changes: Vec<_> = clk.iter_changes().collect();
    assert_eq!(changes, [(0, Some("0")), (5, Some("1")), (8, Some("0"))]);

    let diagnostics: Vec<_> = waves.diagnostics().iter().cloned().collect();
    assert_eq!(
        diagnostics,
        [
            Diagnostic {
                time: Some(0),
                kind: DiagnosticKind::UnknownIdentifier("?".to_string()),
            },
            Diagnostic {
                time: Some(5),
                kind: DiagnosticKind::DecreasingTime {
                    current: 5,
                    found: 3
                },
            },
        ]
    );
}

#[test]
fn test_unknown_identifier_is_fatal_on_request() {
    let options = LoadOptions {
        unknown_id_policy: UnknownIdPolicy::Error,
    };
    let err = read_with_options("inputs/unknown_id.vcd", &options).unwrap_err();
    assert!(err.to_string().contains("unknown identifier code `?`"), "{err}");
}

#[test]
fn test_metadata_and_shared_ids() {
    let waves = read("inputs/counter.vcd").expect("failed to parse");
    let h = waves.hierarchy();
    assert_eq!(h.date(), "Mon Oct 13 10:00:00 2025");
    assert_eq!(h.version(), "counter testbench 1.0");
    assert_eq!(h.comments().len(), 1);
    let timescale = h.timescale().unwrap();
    assert_eq!((timescale.factor, timescale.unit), (10, TimescaleUnit::PicoSeconds));

    // `clk` and `count` are declared twice but only stored once
    assert_eq!(h.iter_vars().count(), 7);
    assert_eq!(h.num_unique_signals(), 5);
    assert_eq!(waves.num_stores(), 5);
    let tb_clk = waves.signal_by_path(&["tb", "clk"]).unwrap();
    let dut_clk = waves.signal_by_path(&["tb", "dut", "clk"]).unwrap();
    assert_eq!(tb_clk.var().signal_ref(), dut_clk.var().signal_ref());

    let count = waves.signal_by_path(&["tb", "dut", "q"]).unwrap();
    assert_eq!(count.value_at(27).unwrap().value, Some("0010"));
    assert_eq!(count.value_at(41).unwrap().value, Some("x"));
    let temp = waves.signal_by_path(&["tb", "temp"]).unwrap();
    assert!(temp.var().var_type().is_real());
    assert_eq!(temp.value_at(0).unwrap().value, Some("1.5"));
    assert_eq!(temp.value_at(30).unwrap().value, Some("2.25"));

    assert_eq!((waves.start_time(), waves.end_time()), (0, 45));
    let cycles = waves.signal_by_path(&["tb", "dut", "cycles"]).unwrap();
    let spans: Vec<_> = cycles
        .store()
        .changes_in(20..=36)
        .map(|r| (r.start, r.value))
        .collect();
    assert_eq!(spans, [(15, Some("1")), (25, Some("10")), (35, Some("11"))]);
}

#[test]
fn test_read_from_reader() {
    let bytes = std::fs::read("inputs/clk.vcd").unwrap();
    let waves = read_from_reader(std::io::Cursor::new(bytes), "memory").unwrap();
    assert_eq!(waves.hierarchy().root_scope().name(waves.hierarchy()), "memory");
    assert_eq!(
        waves.store_by_id("!").unwrap().query(12).unwrap().value,
        Some("0")
    );
}

#[test]
fn test_missing_file() {
    match read("inputs/does_not_exist.vcd") {
        Err(WavevizError::Io(e)) => assert_eq!(e.kind(), std::io::ErrorKind::NotFound),
        other => panic!("expected a not found error, got {:?}", other.err()),
    }
    // syntax errors are not I/O errors
    assert!(matches!(
        read("inputs/missing_scope_type.vcd"),
        Err(WavevizError::FailedToLoad(_))
    ));
}
