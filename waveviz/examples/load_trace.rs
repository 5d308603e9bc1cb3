// Copyright 2023 The Regents of the University of California
// Copyright 2024-2025 Cornell University
// released under BSD 3-Clause License
// author: Kevin Laeufer <laeufer@cornell.edu>

use bytesize::ByteSize;
use clap::Parser;
use indicatif::ProgressStyle;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use waveviz::viewport::{Viewport, ViewportOptions};
use waveviz::*;

#[derive(Parser, Debug)]
#[command(name = "load_trace")]
#[command(author = "Kevin Laeufer <laeufer@berkeley.edu>")]
#[command(version)]
#[command(about = "Loads a VCD file and reports what a viewer would show.", long_about = None)]
struct Args {
    #[arg(value_name = "VCDFILE", index = 1)]
    filename: String,
    #[arg(long, help = "abort on value changes of undeclared identifiers")]
    strict: bool,
    #[arg(long, default_value_t = 1920, help = "width of the waveform canvas in pixels")]
    width: u64,
    #[arg(long, help = "print the value of every signal at this time")]
    at: Option<Time>,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let load_opts = LoadOptions {
        unknown_id_policy: if args.strict {
            UnknownIdPolicy::Error
        } else {
            UnknownIdPolicy::Warn
        },
    };

    // load header
    let header_start = std::time::Instant::now();
    let header =
        viewers::read_header_from_file(&args.filename, &load_opts).expect("Failed to load file!");
    println!(
        "It took {:?} to load the header of {}",
        header_start.elapsed(),
        args.filename
    );

    // create body progress indicator
    let body_len = header.body_len;
    let (body_progress, progress) = if body_len == 0 {
        (None, None)
    } else {
        let p = Arc::new(AtomicU64::new(0));
        let p_out = p.clone();
        let done = Arc::new(AtomicBool::new(false));
        let done_out = done.clone();
        let t = thread::spawn(move || {
            let bar = indicatif::ProgressBar::new(body_len);
            bar.set_style(
                ProgressStyle::with_template(
                    "[{elapsed_precise}] {bar:40.cyan/blue} {decimal_bytes} ({percent_precise}%)",
                )
                .unwrap(),
            );
            while !done.load(Ordering::SeqCst) {
                bar.set_position(p.load(Ordering::SeqCst));
                thread::sleep(std::time::Duration::from_millis(10));
            }
            bar.set_position(p.load(Ordering::SeqCst));
            bar.finish_and_clear();
        });
        (Some(p_out), Some((done_out, t)))
    };

    // load body
    let hierarchy = header.hierarchy;
    let body_start = std::time::Instant::now();
    let body = viewers::read_body(header.body, &hierarchy, body_progress, None)
        .expect("Failed to load body!");
    println!(
        "It took {:?} to load the body of {}",
        body_start.elapsed(),
        args.filename
    );
    if let Some((done, t)) = progress {
        done.store(true, Ordering::SeqCst);
        t.join().unwrap();
    }

    for diagnostic in body.diagnostics.iter() {
        println!("WARN: {diagnostic}");
    }

    let format_time = |time: Time| match hierarchy.timescale() {
        Some(timescale) => timescale.format_time(time),
        None => time.to_string(),
    };
    println!(
        "{} variables in {} scopes, {} distinct signals from {} to {}",
        hierarchy.iter_vars().len(),
        hierarchy.iter_scopes().len(),
        body.stores.len(),
        format_time(body.start_time),
        format_time(body.end_time)
    );
    let changes = body.stores.iter().map(|s| s.len()).sum::<usize>();
    let store_size = body.stores.iter().map(|s| s.size_in_memory()).sum::<usize>();
    println!(
        "{changes} value changes take up {}, the hierarchy {}.",
        ByteSize::b(store_size as u64),
        ByteSize::b(hierarchy.size_in_memory() as u64)
    );

    // zoom out until the whole trace fits onto the canvas
    let mut viewport = Viewport::new(body.start_time, body.end_time, ViewportOptions::default());
    viewport.fit().expect("Trace is too large to display!");
    while viewport.total_width().is_some_and(|w| w > args.width) && viewport.zoom_out() {}
    println!(
        "The whole trace fits into {:?} pixels at {}.",
        viewport.total_width(),
        viewport.scale()
    );
    let ruler: Vec<_> = viewport
        .ticks(0, args.width, 100)
        .into_iter()
        .map(|(x, t)| format!("{x}px={}", format_time(t)))
        .collect();
    println!("Ruler: {}", ruler.join(" "));

    if let Some(time) = args.at {
        for var in hierarchy.iter_vars() {
            let store = &body.stores[var.signal_ref().index()];
            if let Ok(range) = store.query(time) {
                let value = match range.value {
                    Some(v) if !var.is_1bit() && !var.var_type().is_real() => {
                        DisplayFormat::Hexadecimal.format(v)
                    }
                    Some(v) => v.to_string(),
                    None => "-".to_string(),
                };
                println!("{} = {value}", var.full_name(&hierarchy));
            }
        }
    }
}
