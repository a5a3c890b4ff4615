//! Trace pipeline demo on a synthetic full-size flat frame.
//!
//! Renders a frame with known fiber geometry, runs the trace-finding
//! pipeline end to end and reports how well the fitted polynomials recover
//! the injected drift.
//!
//! Usage:
//! ```
//! cargo run --release --bin trace_demo -- [OPTIONS]
//! ```

use std::collections::BTreeMap;
use std::process::ExitCode;

use clap::Parser;
use fibertrace::fit::eval_polynomial;
use fibertrace::{find_traces, ModeThresholds, Observation, TraceParams};
use fibertrace_harness::FrameSpec;
use log::info;

/// Command line arguments for the trace demo
#[derive(Parser, Debug)]
#[command(
    name = "Trace Pipeline Demo",
    about = "Runs fiber trace finding on a synthetic flat frame",
    long_about = None
)]
struct Args {
    /// Detector columns (dispersion axis)
    #[arg(long, default_value_t = 4096)]
    cols: usize,

    /// Detector rows (spatial axis)
    #[arg(long, default_value_t = 4112)]
    rows: usize,

    /// Row drift per column injected into the synthetic fibers, in pixels
    #[arg(long, default_value_t = 0.01)]
    drift: f64,

    /// Half-range of the uniform detector noise
    #[arg(long, default_value_t = 8.0)]
    noise: f64,

    /// RNG seed for the detector noise
    #[arg(long, default_value_t = 20160208)]
    seed: u64,

    /// Instrument mode selecting the detection threshold
    #[arg(long, default_value = "LR-V")]
    mode: String,

    /// Degree of the fitted trace polynomial
    #[arg(long, default_value_t = 5)]
    poldeg: usize,

    /// Comma-separated 1-based fiber ids to leave dark
    #[arg(long, value_delimiter = ',')]
    dark: Vec<u32>,
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    let spec = FrameSpec {
        nrows: args.rows,
        ncols: args.cols,
        drift: args.drift,
        noise: args.noise,
        seed: args.seed,
        ..FrameSpec::default()
    };

    let layout = match spec.layout() {
        Ok(layout) => layout,
        Err(err) => {
            eprintln!("bad frame geometry: {err}");
            return ExitCode::FAILURE;
        }
    };

    info!("rendering {}x{} synthetic flat frame", spec.nrows, spec.ncols);
    let frame = spec.render(&args.dark);

    let mut params = TraceParams::new(spec.ncols / 2);
    params.poldeg = args.poldeg;
    let observation = Observation {
        instrument: "MEGARA".to_string(),
        mode: args.mode.clone(),
        tags: BTreeMap::from([("vph".to_string(), args.mode.clone())]),
    };

    let map = match find_traces(
        &frame.view(),
        &layout,
        &ModeThresholds::default(),
        &observation,
        &params,
    ) {
        Ok(map) => map,
        Err(err) => {
            eprintln!("trace finding failed: {err}");
            return ExitCode::FAILURE;
        }
    };

    println!(
        "traced {} / {} fibers",
        map.resolved(),
        map.contents.len()
    );

    // Compare fitted polynomials against the injected geometry.
    let centers = spec.base_centers();
    let mut worst_rms = 0.0_f64;
    let mut worst_fibid = 0;
    for trace in map.contents.iter().filter(|t| t.is_resolved()) {
        let mut sq_sum = 0.0;
        let mut count = 0;
        for col in (trace.start..=trace.stop).step_by(64) {
            let truth = centers[trace.fibid as usize - 1] + spec.drift * col as f64;
            let fitted = eval_polynomial(&trace.fitparms, col as f64);
            sq_sum += (fitted - truth).powi(2);
            count += 1;
        }
        let rms = (sq_sum / count as f64).sqrt();
        if rms > worst_rms {
            worst_rms = rms;
            worst_fibid = trace.fibid;
        }
    }
    println!("worst drift recovery: {worst_rms:.4} px RMS (fiber {worst_fibid})");

    for trace in map.contents.iter().filter(|t| !t.is_resolved()) {
        println!("fiber {} (box {}): no usable trace", trace.fibid, trace.boxid);
    }

    ExitCode::SUCCESS
}
