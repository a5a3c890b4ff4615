//! End-to-end tests on synthetic flat frames with known fiber geometry.

use std::collections::BTreeMap;

use fibertrace::{
    find_traces, BoxLayout, FiberBox, ModeThresholds, Observation, TraceParams,
};
use ndarray::Array2;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

const NBOXES: usize = 10;
const FIBERS_PER_BOX: usize = 62;
const NROWS: usize = 4112;
const NCOLS: usize = 512;
const BOX_HEIGHT: f64 = 404.0;
const FIRST_BORDER: f64 = 36.0;
const DRIFT: f64 = 0.01; // px of row drift per column
const SIGMA: f64 = 1.3;

fn layout() -> BoxLayout {
    let boxes = (0..NBOXES)
        .map(|i| FiberBox {
            id: i as u32 + 1,
            nfibers: FIBERS_PER_BOX,
        })
        .collect();
    let borders = (0..=NBOXES)
        .map(|i| FIRST_BORDER + i as f64 * BOX_HEIGHT)
        .collect();
    BoxLayout::new(boxes, borders).unwrap()
}

/// Row centers of all fibers at column 0, in fiber-id order.
fn base_centers() -> Vec<f64> {
    let spacing = BOX_HEIGHT / (FIBERS_PER_BOX as f64 + 2.0);
    let mut centers = Vec::with_capacity(NBOXES * FIBERS_PER_BOX);
    for b in 0..NBOXES {
        let left = FIRST_BORDER + b as f64 * BOX_HEIGHT;
        for k in 1..=FIBERS_PER_BOX {
            centers.push(left + k as f64 * spacing);
        }
    }
    centers
}

/// Flat frame with Gaussian fiber profiles drifting linearly with column.
///
/// `dark` lists 1-based fiber ids that produce no light.
fn synthetic_flat(centers: &[f64], dark: &[u32]) -> Array2<f64> {
    let mut frame = Array2::<f64>::from_elem((NROWS, NCOLS), 100.0);
    let reach = (4.0 * SIGMA).ceil() as i64;

    for (i, &base) in centers.iter().enumerate() {
        if dark.contains(&(i as u32 + 1)) {
            continue;
        }
        for col in 0..NCOLS {
            let center = base + DRIFT * col as f64;
            let row0 = (center as i64 - reach).max(0);
            let row1 = (center as i64 + reach + 1).min(NROWS as i64);
            for row in row0..row1 {
                let d = row as f64 - center;
                frame[[row as usize, col]] += 20000.0 * (-d * d / (2.0 * SIGMA * SIGMA)).exp();
            }
        }
    }

    // Seeded detector noise for reproducibility.
    let mut rng = ChaCha8Rng::seed_from_u64(20160208);
    for pixel in frame.iter_mut() {
        *pixel += rng.gen_range(-8.0..8.0);
    }
    frame
}

fn observation() -> Observation {
    Observation {
        instrument: "MEGARA".to_string(),
        mode: "LR-V".to_string(),
        tags: BTreeMap::from([("vph".to_string(), "LR-V".to_string())]),
    }
}

fn params() -> TraceParams {
    let mut params = TraceParams::new(NCOLS / 2);
    params.poldeg = 3;
    params
}

#[test]
fn test_full_frame_recovers_all_traces() {
    let _ = env_logger::builder().is_test(true).try_init();

    let centers = base_centers();
    let frame = synthetic_flat(&centers, &[]);

    let map = find_traces(
        &frame.view(),
        &layout(),
        &ModeThresholds::default(),
        &observation(),
        &params(),
    )
    .unwrap();

    assert_eq!(map.contents.len(), NBOXES * FIBERS_PER_BOX);
    assert_eq!(map.resolved(), NBOXES * FIBERS_PER_BOX);

    // Fiber ids are a contiguous range starting at 1.
    for (i, trace) in map.contents.iter().enumerate() {
        assert_eq!(trace.fibid, i as u32 + 1);
        assert_eq!(trace.boxid as usize, i / FIBERS_PER_BOX + 1);
    }

    // Every fitted polynomial reproduces the known drift to < 0.05 px RMS.
    let mut worst = 0.0_f64;
    for (trace, &base) in map.contents.iter().zip(centers.iter()) {
        let mut sq_sum = 0.0;
        let mut count = 0;
        for col in (trace.start..=trace.stop).step_by(16) {
            let truth = base + DRIFT * col as f64;
            let fitted = fibertrace::fit::eval_polynomial(&trace.fitparms, col as f64);
            sq_sum += (fitted - truth).powi(2);
            count += 1;
        }
        let rms = (sq_sum / count as f64).sqrt();
        worst = worst.max(rms);
        assert!(
            rms < 0.05,
            "fiber {}: drift recovered to {:.4} px RMS",
            trace.fibid,
            rms
        );
    }
    println!("worst per-fiber RMS: {worst:.4} px");
}

#[test]
fn test_dark_fibers_keep_ids_and_get_sentinels() {
    let _ = env_logger::builder().is_test(true).try_init();

    let centers = base_centers();
    // One dark fiber inside box 3 and one at the edge of box 7.
    let dark = [150_u32, 434_u32];
    let frame = synthetic_flat(&centers, &dark);

    let map = find_traces(
        &frame.view(),
        &layout(),
        &ModeThresholds::default(),
        &observation(),
        &params(),
    )
    .unwrap();

    assert_eq!(map.contents.len(), NBOXES * FIBERS_PER_BOX);
    assert_eq!(map.resolved(), NBOXES * FIBERS_PER_BOX - dark.len());

    for (i, trace) in map.contents.iter().enumerate() {
        assert_eq!(trace.fibid, i as u32 + 1, "ids must stay contiguous");
    }
    for &fibid in &dark {
        let trace = &map.contents[fibid as usize - 1];
        assert!(trace.fitparms.is_empty(), "fiber {fibid} should be a sentinel");
        assert_eq!(trace.start, trace.stop);
    }
    // Neighbors of the dark fibers are still recovered at their own rows.
    for &fibid in &dark {
        let neighbor = &map.contents[fibid as usize];
        assert!(neighbor.is_resolved());
        let expected = centers[fibid as usize] + DRIFT * (NCOLS / 2) as f64;
        let fitted =
            fibertrace::fit::eval_polynomial(&neighbor.fitparms, (NCOLS / 2) as f64);
        assert!((fitted - expected).abs() < 0.1);
    }
}

#[test]
fn test_deterministic_across_runs() {
    let centers = base_centers();
    let frame = synthetic_flat(&centers[..124], &[]);
    // Restrict to the first two boxes for speed.
    let boxes = (0..2)
        .map(|i| FiberBox {
            id: i as u32 + 1,
            nfibers: FIBERS_PER_BOX,
        })
        .collect();
    let borders = (0..=2).map(|i| FIRST_BORDER + i as f64 * BOX_HEIGHT).collect();
    let layout = BoxLayout::new(boxes, borders).unwrap();

    let run = || {
        find_traces(
            &frame.view(),
            &layout,
            &ModeThresholds::default(),
            &observation(),
            &params(),
        )
        .unwrap()
    };
    assert_eq!(run(), run());
}
