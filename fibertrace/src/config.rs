//! Instrument configuration for fiber tracing.
//!
//! Everything here is read-only data supplied by an external configuration
//! loader: the pseudo-slit box geometry, the per-mode relative detection
//! thresholds, and the tuning constants of the tracing pipeline. The
//! numeric defaults are empirically tuned per instrument and are treated as
//! opaque data, not logic.

use std::collections::BTreeMap;

use log::info;
use thiserror::Error;

/// Errors raised while validating or querying instrument configuration.
///
/// All of these are fatal: processing of the current image cannot proceed
/// with a broken geometry or an unresolvable detection threshold.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("box borders must be strictly increasing: border {index} = {value} after {previous}")]
    NonMonotonicBorders {
        index: usize,
        value: f64,
        previous: f64,
    },
    #[error("expected {expected} borders for {nboxes} boxes, got {got}")]
    BorderCountMismatch {
        nboxes: usize,
        expected: usize,
        got: usize,
    },
    #[error("no relative threshold configured for mode '{0}' and no fallback set")]
    UnknownMode(String),
}

/// One bundle of physically adjacent fibers sharing a pixel range on the
/// detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FiberBox {
    /// Configured bundle identifier.
    pub id: u32,
    /// Number of fibers the bundle holds.
    pub nfibers: usize,
}

/// The ordered box layout along the spatial (row) axis.
///
/// Borders are strictly increasing pixel positions; consecutive borders
/// delimit one box each, so there is exactly one more border than there
/// are boxes. Neighboring boxes share the border between them.
#[derive(Debug, Clone, PartialEq)]
pub struct BoxLayout {
    boxes: Vec<FiberBox>,
    borders: Vec<f64>,
}

impl BoxLayout {
    /// Validate and build a layout from configured boxes and borders.
    ///
    /// # Errors
    /// * `ConfigError::BorderCountMismatch` - border count is not `boxes + 1`
    /// * `ConfigError::NonMonotonicBorders` - borders are not strictly increasing
    pub fn new(boxes: Vec<FiberBox>, borders: Vec<f64>) -> Result<Self, ConfigError> {
        if borders.len() != boxes.len() + 1 {
            return Err(ConfigError::BorderCountMismatch {
                nboxes: boxes.len(),
                expected: boxes.len() + 1,
                got: borders.len(),
            });
        }
        for index in 1..borders.len() {
            if borders[index] <= borders[index - 1] {
                return Err(ConfigError::NonMonotonicBorders {
                    index,
                    value: borders[index],
                    previous: borders[index - 1],
                });
            }
        }
        Ok(Self { boxes, borders })
    }

    pub fn boxes(&self) -> &[FiberBox] {
        &self.boxes
    }

    pub fn borders(&self) -> &[f64] {
        &self.borders
    }

    /// Pixel span `(left, right)` of the box at `index`.
    pub fn span(&self, index: usize) -> (f64, f64) {
        (self.borders[index], self.borders[index + 1])
    }

    /// Total fiber count over all boxes.
    pub fn total_fibers(&self) -> usize {
        self.boxes.iter().map(|b| b.nfibers).sum()
    }

    /// Border positions rounded to detector rows.
    ///
    /// These are the inter-box gap rows used to sample the background level.
    pub fn border_rows(&self) -> Vec<usize> {
        self.borders.iter().map(|&b| b.round().max(0.0) as usize).collect()
    }
}

/// Relative peak-detection thresholds keyed by instrument mode (VPH).
///
/// The threshold is a fraction of the cut profile's maximum. Values are
/// empirically tuned per grating configuration; unknown modes fall back to
/// a catch-all value when one is set.
#[derive(Debug, Clone, PartialEq)]
pub struct ModeThresholds {
    table: BTreeMap<String, f64>,
    fallback: Option<f64>,
}

impl ModeThresholds {
    pub fn new(table: BTreeMap<String, f64>, fallback: Option<f64>) -> Self {
        Self { table, fallback }
    }

    /// Threshold for `mode`, or the fallback when the mode is unknown.
    ///
    /// # Errors
    /// `ConfigError::UnknownMode` when the mode is absent and no fallback
    /// is configured.
    pub fn lookup(&self, mode: &str) -> Result<f64, ConfigError> {
        if let Some(&threshold) = self.table.get(mode) {
            info!("rel threshold for {mode} is {threshold:4.2}");
            return Ok(threshold);
        }
        match self.fallback {
            Some(threshold) => {
                info!("rel threshold not defined for {mode}, using {threshold:4.2}");
                Ok(threshold)
            }
            None => Err(ConfigError::UnknownMode(mode.to_string())),
        }
    }
}

impl Default for ModeThresholds {
    /// The shipped per-VPH thresholds with the 0.3 catch-all fallback.
    fn default() -> Self {
        let table = BTreeMap::from(
            [
                ("LR-I", 0.27),
                ("LR-R", 0.37),
                ("LR-V", 0.27),
                ("LR-Z", 0.27),
                ("LR-U", 0.02),
                ("HR-I", 0.20),
            ]
            .map(|(mode, thr)| (mode.to_string(), thr)),
        );
        Self {
            table,
            fallback: Some(0.3),
        }
    }
}

/// Tuning constants for the trace-finding pipeline.
///
/// Only the reference column is instrument-specific; the remaining fields
/// start from the standard values and can be adjusted per run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TraceParams {
    /// Reference (dispersion) column of the central cut.
    pub cut_center: usize,
    /// Half-width of the cut in columns.
    pub cut_halfwidth: usize,
    /// Minimum separation between detected peaks, in rows.
    pub min_separation: usize,
    /// Matching tolerance around the expected inter-fiber spacing, in pixels.
    pub match_tol: f64,
    /// Column stride of the trace follower.
    pub step: usize,
    /// Half-width of the follower's centroid window, in rows.
    pub trace_halfwidth: usize,
    /// Local background level subtracted while following a trace.
    pub trace_background: f64,
    /// Maximum allowed per-step centroid deviation, in rows.
    pub maxdis: f64,
    /// Degree of the fitted trace polynomial.
    pub poldeg: usize,
}

impl TraceParams {
    /// Standard parameters around the given reference column.
    pub fn new(cut_center: usize) -> Self {
        Self {
            cut_center,
            cut_halfwidth: 3,
            min_separation: 3,
            match_tol: 1.63,
            step: 2,
            trace_halfwidth: 3,
            trace_background: 300.0,
            maxdis: 2.0,
            poldeg: 5,
        }
    }
}
