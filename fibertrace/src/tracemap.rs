//! Trace map assembly: the per-image pipeline.
//!
//! Runs the full stage sequence on one corrected frame: background
//! estimate, peak detection on the central cut, box assignment and
//! peak-to-fiber matching, then per-fiber trace following and polynomial
//! fitting fanned out over a rayon pool. The output is an immutable
//! [`TraceMap`] with one [`GeometricTrace`] per configured fiber.

use std::collections::BTreeMap;

use log::{info, warn};
use ndarray::ArrayView2;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::{BoxLayout, ModeThresholds, TraceParams};
use crate::cut::{column_cut, estimate_background};
use crate::error::TraceError;
use crate::fit::fit_polynomial;
use crate::matching::{match_boxes, FiberSeed};
use crate::peaks::find_peaks;
use crate::tracer::{follow_trace, FollowParams};

/// Identification of the observation being processed.
///
/// The mode selects the detection threshold; instrument name and tags are
/// copied verbatim into the output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    pub instrument: String,
    /// Instrument mode (VPH) name.
    pub mode: String,
    /// Free-form metadata carried through to the trace map.
    pub tags: BTreeMap<String, String>,
}

/// Persisted geometric model of one fiber trace.
///
/// `fitparms` holds polynomial coefficients lowest degree first; an empty
/// sequence marks a fiber for which no usable trace was found, in which
/// case `start == stop` at the cut column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeometricTrace {
    /// Global 1-based fiber id.
    pub fibid: u32,
    /// Id of the box the fiber belongs to.
    pub boxid: u32,
    /// First fitted column.
    pub start: usize,
    /// Last fitted column.
    pub stop: usize,
    pub fitparms: Vec<f64>,
}

impl GeometricTrace {
    /// Whether a usable trace was found for this fiber.
    pub fn is_resolved(&self) -> bool {
        !self.fitparms.is_empty()
    }
}

/// The aggregate result of tracing one frame.
///
/// Holds one trace per configured fiber, ordered by fiber id (contiguous
/// from 1), plus the instrument tag and observation metadata. Never
/// mutated after construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceMap {
    pub instrument: String,
    pub tags: BTreeMap<String, String>,
    pub contents: Vec<GeometricTrace>,
}

impl TraceMap {
    /// Count of fibers with a usable trace.
    pub fn resolved(&self) -> usize {
        self.contents.iter().filter(|t| t.is_resolved()).count()
    }
}

/// Locate and model every fiber trace in one frame.
///
/// Stages run strictly in order; only the per-fiber follow/fit work is
/// parallel, over read-only inputs, so the result is deterministic for
/// identical input.
///
/// # Errors
/// Configuration and matching failures ([`TraceError`]) abort the image;
/// data-quality conditions (unmatched slots, short trajectories) degrade
/// the affected fibers to empty `fitparms` instead.
pub fn find_traces(
    image: &ArrayView2<f64>,
    layout: &BoxLayout,
    thresholds: &ModeThresholds,
    observation: &Observation,
    params: &TraceParams,
) -> Result<TraceMap, TraceError> {
    info!("estimating background in column {}", params.cut_center);
    let background = estimate_background(
        image,
        params.cut_center,
        params.cut_halfwidth,
        &layout.border_rows(),
    );
    info!("background level is {background:.2}");

    let threshold = thresholds.lookup(&observation.mode)?;

    info!("finding peaks in column {}", params.cut_center);
    let profile = column_cut(image, params.cut_center, params.cut_halfwidth).to_vec();
    let peaks = find_peaks(&profile, params.min_separation, threshold);
    info!("{} peaks detected", peaks.len());

    let seeds = match_boxes(&peaks, layout, params.cut_center, params.match_tol)?;

    let follow = FollowParams {
        step: params.step,
        halfwidth: params.trace_halfwidth,
        background: params.trace_background,
        maxdis: params.maxdis,
    };

    info!("tracing {} fibers", seeds.len());
    let contents: Vec<GeometricTrace> = seeds
        .par_iter()
        .map(|seed| trace_one(image, seed, &follow, params))
        .collect();

    Ok(TraceMap {
        instrument: observation.instrument.clone(),
        tags: observation.tags.clone(),
        contents,
    })
}

/// Follow and fit a single fiber.
///
/// Unmatched fibers and trajectories too short for the requested degree
/// produce the empty-coefficient sentinel with `start == stop`.
fn trace_one(
    image: &ArrayView2<f64>,
    seed: &FiberSeed,
    follow: &FollowParams,
    params: &TraceParams,
) -> GeometricTrace {
    let (column, row) = match seed.start {
        Some((column, row, _amplitude)) => (column, row),
        None => {
            return GeometricTrace {
                fibid: seed.fibid,
                boxid: seed.boxid,
                start: params.cut_center,
                stop: params.cut_center,
                fitparms: Vec::new(),
            }
        }
    };

    let trajectory = follow_trace(image, column, row, follow);
    if trajectory.len() < params.poldeg + 1 {
        warn!(
            "fiber {}: only {} points to fit a degree {} polynomial",
            seed.fibid,
            trajectory.len(),
            params.poldeg
        );
        return GeometricTrace {
            fibid: seed.fibid,
            boxid: seed.boxid,
            start: column,
            stop: column,
            fitparms: Vec::new(),
        };
    }

    let cols: Vec<f64> = trajectory.iter().map(|s| s.column as f64).collect();
    let rows: Vec<f64> = trajectory.iter().map(|s| s.center).collect();
    let fitparms = fit_polynomial(&cols, &rows, params.poldeg).unwrap_or_default();

    GeometricTrace {
        fibid: seed.fibid,
        boxid: seed.boxid,
        start: trajectory[0].column,
        stop: trajectory[trajectory.len() - 1].column,
        fitparms,
    }
}
