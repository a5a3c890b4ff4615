//! Peak-to-fiber matching.
//!
//! Detected peaks are first partitioned into the configured boxes, then each
//! box's peaks are paired with its expected fiber slots by a greedy forward
//! scan that tolerates missing fibers. Slots left over after the scan are
//! padded onto the box edges according to the margin available on each
//! side. Finally, global 1-based fiber ids are folded across boxes in
//! configuration order, which makes the numbering deterministic.

use log::{debug, warn};
use thiserror::Error;

use crate::config::BoxLayout;
use crate::peaks::Peak;

/// Fatal matching failures.
///
/// Both variants indicate a defect or an impossible state, not poor data
/// quality, and abort processing of the current image.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MatchError {
    #[error("box {boxid}: no peak could be matched, cannot determine placement side")]
    NoMatchedPeaks { boxid: u32 },
    #[error("box {boxid}: resolved {got} slots for {expected} configured fibers")]
    SlotCountMismatch {
        boxid: u32,
        expected: usize,
        got: usize,
    },
}

/// Outcome for one expected fiber slot within a box.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotResolution {
    /// Slot paired with the peak at this index into the box's peak list.
    Matched { peak: usize },
    /// No detected peak corresponds to this slot.
    Gap,
}

/// Starting point for one fiber's trace.
///
/// `start` is `(column, row position, amplitude)` for matched slots and
/// `None` for gaps, whose global id is still reserved.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FiberSeed {
    /// Global 1-based fiber id, unique across the whole image.
    pub fibid: u32,
    /// Id of the box the fiber belongs to.
    pub boxid: u32,
    pub start: Option<(usize, f64, f64)>,
}

/// Partition peaks into boxes by their integer row index.
///
/// Digitize semantics over half-open intervals `[border[i], border[i+1])`:
/// a peak exactly on a border belongs to the box on its right. Peaks
/// outside every configured box are dropped with a warning.
pub fn assign_to_boxes(peaks: &[Peak], borders: &[f64]) -> Vec<Vec<Peak>> {
    let nboxes = borders.len().saturating_sub(1);
    let mut grouped = vec![Vec::new(); nboxes];
    for peak in peaks {
        let position = peak.index as f64;
        let slot = borders.partition_point(|&b| b <= position);
        if slot == 0 || slot > nboxes {
            warn!("peak at row {} falls outside all configured boxes, dropped", peak.index);
            continue;
        }
        grouped[slot - 1].push(*peak);
    }
    grouped
}

/// Pair one box's detected peaks with its expected fiber slots.
///
/// Returns exactly `nfibers` slot resolutions in box-relative order.
///
/// The scan seeds the first slot with the lowest peak, then searches the
/// remaining peaks for one at a distance from the last match close to
/// `scale * d`, where `d` is the expected inter-fiber spacing derived from
/// the box span. A failed search records a gap and widens the expected
/// distance to the next slot over; a successful match resets the scale.
/// Slots still missing afterwards are padded onto whichever box edge has
/// margin for them, smaller margin first; slots neither side can hold are
/// appended as gaps and logged.
///
/// # Errors
/// * `MatchError::NoMatchedPeaks` - the box holds no peaks at all, or the
///   reversed search for the last match finds nothing where padding is
///   required.
/// * `MatchError::SlotCountMismatch` - the resolved slot count disagrees
///   with the configured fiber count (a logic defect).
pub fn resolve_box(
    peaks: &[Peak],
    boxid: u32,
    nfibers: usize,
    left: f64,
    right: f64,
    tol: f64,
) -> Result<Vec<SlotResolution>, MatchError> {
    if peaks.is_empty() || nfibers == 0 {
        return Err(MatchError::NoMatchedPeaks { boxid });
    }
    let npeaks = peaks.len();
    // The +2 leaves half a gap of slack at each box edge.
    let spacing = (right - left) / (nfibers as f64 + 2.0);

    // The first expected slot pairs with the lowest peak.
    let mut slots = vec![SlotResolution::Matched { peak: 0 }];
    let mut current_peak = 0usize;
    let mut scale = 1.0_f64;

    while current_peak < npeaks - 1 && slots.len() < nfibers {
        let expected = scale * spacing;
        debug!("box {boxid}: expecting next fiber {expected:.2} px from peak {current_peak}");
        let found = (current_peak + 1..npeaks).find(|&idx| {
            let distance = (peaks[idx].position - peaks[current_peak].position).abs();
            (distance - expected).abs() <= tol
        });
        match found {
            Some(idx) => {
                slots.push(SlotResolution::Matched { peak: idx });
                current_peak = idx;
                scale = 1.0;
            }
            None => {
                // No peak for this slot; look one slot further next time.
                slots.push(SlotResolution::Gap);
                scale += 1.0;
            }
        }
    }

    let remaining = nfibers.saturating_sub(slots.len());
    if remaining > 0 {
        debug!("box {boxid}: {remaining} slots left to place on the edges");
        let last_matched = slots
            .iter()
            .rev()
            .find_map(|slot| match slot {
                SlotResolution::Matched { peak } => Some(*peak),
                SlotResolution::Gap => None,
            })
            .ok_or(MatchError::NoMatchedPeaks { boxid })?;

        let ldist = peaks[0].position - left;
        let rdist = right - peaks[last_matched].position;
        // Truncated half-up rounding of the fiber count each margin holds;
        // the tie-break below fills the right side first.
        let lcap = ((ldist / spacing - 1.0 + 0.5) as i64).max(0) as usize;
        let rcap = ((rdist / spacing - 1.0 + 0.5) as i64).max(0) as usize;
        debug!("box {boxid}: margins hold {lcap} left, {rcap} right");

        let on_right = rcap <= lcap;
        let cap1 = lcap.min(rcap).min(remaining);
        let cap2 = lcap.max(rcap).min(remaining - cap1);
        let unplaced = remaining - cap1 - cap2;
        let (pad_right, pad_left) = if on_right { (cap1, cap2) } else { (cap2, cap1) };

        if unplaced > 0 {
            warn!("box {boxid}: no margin left for {unplaced} fibers, left unmatched");
        }

        let mut padded = Vec::with_capacity(nfibers);
        padded.extend(std::iter::repeat(SlotResolution::Gap).take(pad_left));
        padded.append(&mut slots);
        padded.extend(std::iter::repeat(SlotResolution::Gap).take(pad_right + unplaced));
        slots = padded;
    }

    if slots.len() != nfibers {
        return Err(MatchError::SlotCountMismatch {
            boxid,
            expected: nfibers,
            got: slots.len(),
        });
    }
    Ok(slots)
}

/// Resolve every box and assign global fiber ids.
///
/// Boxes are processed in configuration order and fiber ids are folded
/// across them with an explicit accumulator, so ids are contiguous from 1
/// and reproducible across runs. Matched slots carry their seed
/// `(cut_center, refined position, amplitude)`.
pub fn match_boxes(
    peaks: &[Peak],
    layout: &BoxLayout,
    cut_center: usize,
    tol: f64,
) -> Result<Vec<FiberSeed>, MatchError> {
    let grouped = assign_to_boxes(peaks, layout.borders());
    let mut seeds = Vec::with_capacity(layout.total_fibers());
    let mut counted = 0u32;

    for (index, fiber_box) in layout.boxes().iter().enumerate() {
        let (left, right) = layout.span(index);
        let box_peaks = &grouped[index];
        debug!(
            "box {}: {} peaks for {} fibers",
            fiber_box.id,
            box_peaks.len(),
            fiber_box.nfibers
        );
        let slots = resolve_box(box_peaks, fiber_box.id, fiber_box.nfibers, left, right, tol)?;

        for (offset, slot) in slots.iter().enumerate() {
            let start = match slot {
                SlotResolution::Matched { peak } => {
                    let p = &box_peaks[*peak];
                    Some((cut_center, p.position, p.amplitude))
                }
                SlotResolution::Gap => None,
            };
            seeds.push(FiberSeed {
                fibid: counted + offset as u32 + 1,
                boxid: fiber_box.id,
                start,
            });
        }
        counted += fiber_box.nfibers as u32;
    }
    Ok(seeds)
}
