// Copyright 2024-2025 Cornell University
// released under BSD 3-Clause License
// author: Kevin Laeufer <laeufer@cornell.edu>

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use waveviz::simple::*;
use waveviz::timeseries::{Annotations, TimeSeries, TimeSpan};
use waveviz::viewport::*;
use waveviz::*;

#[test]
fn test_viewport_of_loaded_trace() {
    let waves = read("inputs/counter.vcd").expect("failed to parse");
    let viewport = waves.viewport(ViewportOptions::default()).unwrap();
    assert_eq!(viewport.scale().get(), 40);
    assert_eq!(viewport.total_width(), Some(45 * 40));

    // every change of the counter lands on its own pixel column
    let count = waves.signal_by_path(&["tb", "count"]).unwrap();
    let columns: Vec<_> = count
        .store()
        .iter_changes()
        .map(|(time, _)| viewport.pixel_from_time(time))
        .collect();
    assert_eq!(columns, [0, 600, 1000, 1600, 1800]);

    let at = viewport.time_from_pixel(1010);
    assert_eq!(count.value_at(at).unwrap().value, Some("0010"));
}

#[test]
fn test_huge_trace_fits_after_zooming_out() {
    let options = ViewportOptions {
        initial_scale: 1000,
        ..Default::default()
    };
    let mut viewport = Viewport::new(0, 1_000_000_000_000_000, options);
    let notified = Arc::new(AtomicU64::new(0));
    let counter = notified.clone();
    viewport.add_observer(Box::new(move |_scale: Scale, width: Option<Pixel>| {
        assert!(width.is_some());
        counter.fetch_add(1, Ordering::SeqCst);
    }));
    viewport.fit().unwrap();
    assert_eq!(notified.load(Ordering::SeqCst), 1);
    assert!(matches!(
        viewport.scale().regime(),
        ScaleRegime::UnitsPerPixel(_)
    ));

    let mut steps = 0;
    while viewport.zoom_out() {
        steps += 1;
        assert!(viewport.total_width().unwrap() >= options.min_whole_width);
    }
    assert_eq!(steps, 7);
    assert_eq!(notified.load(Ordering::SeqCst), 8);

    // the ruler still has sensible labels at the coarsest zoom level
    let ticks = viewport.ticks(0, 100, 50);
    assert_eq!(
        ticks,
        [(0, 0), (50, 500_000_000_000_000)],
        "{:?}",
        viewport.scale()
    );
}

#[test]
fn test_trace_that_cannot_be_rendered() {
    let options = ViewportOptions {
        max_width: 4,
        ..Default::default()
    };
    let mut viewport = Viewport::new(0, Time::MAX, options);
    let err: WavevizError = viewport.fit().unwrap_err().into();
    assert_eq!(err.to_string(), "waveform is too large to display");
}

#[test]
fn test_signals_and_annotations_share_a_viewport() {
    let waves = read("inputs/bus.vcd").expect("failed to parse");
    let bus = waves.signal_by_path(&["top", "bus[3:0]"]).unwrap();
    let mut decoded = Annotations::new(vec!["top".to_string(), "decoded".to_string()], "annotation", 4);
    decoded.add(TimeSpan::new(0, 19), "idle");
    decoded.add(TimeSpan::new(20, 20), "0xa");

    let viewport = waves.viewport(ViewportOptions::default()).unwrap();
    let series: Vec<&dyn TimeSeries> = vec![&bus, &decoded];
    let x = viewport.pixel_from_time(20);
    let values: Vec<_> = series
        .iter()
        .map(|s| s.value_at(viewport.time_from_pixel(x)).unwrap().value)
        .collect();
    assert_eq!(values, [Some("1010"), Some("0xa")]);
    for s in series {
        assert_eq!(s.last_time(), Ok(20));
    }
}
