//! Column-by-column trace following.
//!
//! Starting from a matched seed, the follower walks the dispersion axis in
//! both directions, re-centering on the fiber at every visited column with
//! a background-subtracted intensity-weighted centroid. A per-step
//! deviation limit keeps the walk from jumping onto an adjacent fiber
//! across weak or noisy columns.

use log::debug;
use ndarray::ArrayView2;

/// One sample along a fiber trace.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TraceSample {
    /// Dispersion-axis column of the sample.
    pub column: usize,
    /// Row center of the fiber at this column.
    pub center: f64,
    /// Peak intensity inside the centroid window.
    pub amplitude: f64,
}

/// A fiber trajectory ordered by ascending column.
pub type Trajectory = Vec<TraceSample>;

/// Parameters controlling the walk.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FollowParams {
    /// Column stride between samples.
    pub step: usize,
    /// Half-width of the centroid window, in rows.
    pub halfwidth: usize,
    /// Local background level subtracted before centroiding.
    pub background: f64,
    /// Maximum allowed centroid movement per step, in rows.
    pub maxdis: f64,
}

/// Background-subtracted centroid of one column within `center ± halfwidth`.
///
/// Returns `(centroid, window peak value)`, or `None` when the window falls
/// off the image or carries no signal above background.
fn window_centroid(
    image: &ArrayView2<f64>,
    column: usize,
    center: f64,
    halfwidth: usize,
    background: f64,
) -> Option<(f64, f64)> {
    let nrows = image.nrows() as i64;
    let base = center.round() as i64;
    let lo = (base - halfwidth as i64).max(0);
    let hi = (base + halfwidth as i64 + 1).min(nrows);
    if lo >= hi {
        return None;
    }

    let mut weight_sum = 0.0;
    let mut position_sum = 0.0;
    let mut peak = f64::NEG_INFINITY;
    for row in lo..hi {
        let value = image[[row as usize, column]];
        peak = peak.max(value);
        let weight = value - background;
        if weight > 0.0 {
            weight_sum += weight;
            position_sum += weight * row as f64;
        }
    }

    if weight_sum > 0.0 {
        Some((position_sum / weight_sum, peak))
    } else {
        None
    }
}

/// Walk one direction from the seed, sampling every `step` columns.
fn walk(
    image: &ArrayView2<f64>,
    start_col: usize,
    seed_row: f64,
    direction: i64,
    params: &FollowParams,
) -> Vec<TraceSample> {
    let ncols = image.ncols() as i64;
    let stride = direction * params.step as i64;
    let mut samples = Vec::new();
    let mut center = seed_row;
    let mut col = start_col as i64 + stride;

    while col >= 0 && col < ncols {
        let column = col as usize;
        match window_centroid(image, column, center, params.halfwidth, params.background) {
            Some((new_center, amplitude)) => {
                let deviation = (new_center - center).abs();
                if deviation > params.maxdis {
                    // Likely a neighboring fiber bleeding in; hold the line.
                    debug!(
                        "column {column}: centroid jumped {deviation:.2} px, keeping previous center"
                    );
                } else {
                    center = new_center;
                }
                samples.push(TraceSample {
                    column,
                    center,
                    amplitude,
                });
            }
            None => {
                // Nothing above background here; carry the center through.
                samples.push(TraceSample {
                    column,
                    center,
                    amplitude: params.background,
                });
            }
        }
        col += stride;
    }
    samples
}

/// Follow one fiber across the image from a seed `(column, row)`.
///
/// Walks left and right until the image boundary, producing a trajectory
/// ordered by ascending column with the seed included once. The walk never
/// backtracks; whether the result has enough samples to fit is the
/// caller's concern.
pub fn follow_trace(
    image: &ArrayView2<f64>,
    seed_col: usize,
    seed_row: f64,
    params: &FollowParams,
) -> Trajectory {
    let seed_amplitude = window_centroid(image, seed_col, seed_row, params.halfwidth, params.background)
        .map(|(_, peak)| peak)
        .unwrap_or(params.background);

    let mut trajectory = walk(image, seed_col, seed_row, -1, params);
    trajectory.reverse();
    trajectory.push(TraceSample {
        column: seed_col,
        center: seed_row,
        amplitude: seed_amplitude,
    });
    trajectory.extend(walk(image, seed_col, seed_row, 1, params));
    trajectory
}
