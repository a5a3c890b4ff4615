//! 1D peak detection with sub-pixel refinement.
//!
//! Operates on the averaged row-intensity profile of a vertical cut. Peaks
//! are strict local maxima above a relative amplitude threshold, thinned so
//! that no two survivors sit closer than a minimum separation, then refined
//! to sub-pixel positions with a background-subtracted weighted centroid.

use itertools::Itertools;

/// Half-width of the centroid window used for sub-pixel refinement.
pub const REFINE_HALFWIDTH: usize = 3;

/// A detected local maximum in a cut profile.
///
/// Ephemeral: peaks only live long enough to be matched to fiber slots for
/// one column cut.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Peak {
    /// Integer row index of the maximum.
    pub index: usize,
    /// Sub-pixel refined row position.
    pub position: f64,
    /// Profile amplitude at the unrefined index.
    pub amplitude: f64,
}

/// Find peaks in `profile` ordered by row index.
///
/// A row qualifies when it is a strict local maximum and exceeds
/// `threshold_rel` times the profile maximum. Candidates are then visited
/// in decreasing amplitude order and any candidate within `min_separation`
/// rows of an already accepted (stronger) peak is suppressed.
pub fn find_peaks(profile: &[f64], min_separation: usize, threshold_rel: f64) -> Vec<Peak> {
    if profile.len() < 3 {
        return Vec::new();
    }
    let max_val = profile.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !max_val.is_finite() || max_val <= 0.0 {
        return Vec::new();
    }
    let floor = threshold_rel * max_val;

    // Plateaus do not qualify; fiber profiles peak on a single row.
    let candidates: Vec<usize> = (1..profile.len() - 1)
        .filter(|&i| {
            profile[i] > profile[i - 1] && profile[i] > profile[i + 1] && profile[i] > floor
        })
        .sorted_by(|&a, &b| {
            profile[b]
                .partial_cmp(&profile[a])
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .collect();

    let mut suppressed = vec![false; profile.len()];
    let mut accepted = Vec::new();
    for &index in &candidates {
        if suppressed[index] {
            continue;
        }
        accepted.push(index);
        let lo = index.saturating_sub(min_separation);
        let hi = (index + min_separation + 1).min(profile.len());
        for cell in &mut suppressed[lo..hi] {
            *cell = true;
        }
    }
    accepted.sort_unstable();

    accepted
        .into_iter()
        .map(|index| Peak {
            index,
            position: refine_peak(profile, index),
            amplitude: profile[index],
        })
        .collect()
}

/// Refine an integer peak location to a sub-pixel row position.
///
/// Computes the intensity-weighted centroid over `index ± 3` rows after
/// subtracting the window minimum as a pedestal. On a symmetric profile the
/// refinement is idempotent; if the window carries no weight the integer
/// index is returned unchanged.
pub fn refine_peak(profile: &[f64], index: usize) -> f64 {
    let lo = index.saturating_sub(REFINE_HALFWIDTH);
    let hi = (index + REFINE_HALFWIDTH + 1).min(profile.len());
    let window = &profile[lo..hi];

    let pedestal = window.iter().copied().fold(f64::INFINITY, f64::min);
    let mut weight_sum = 0.0;
    let mut position_sum = 0.0;
    for (offset, &value) in window.iter().enumerate() {
        let weight = value - pedestal;
        weight_sum += weight;
        position_sum += weight * (lo + offset) as f64;
    }

    if weight_sum > 0.0 {
        position_sum / weight_sum
    } else {
        index as f64
    }
}
