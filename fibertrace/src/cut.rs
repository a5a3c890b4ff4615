//! Vertical cuts and background estimation.
//!
//! A "cut" is a narrow vertical strip of the detector image averaged across
//! a few columns, producing one intensity value per row. The background
//! level that separates fiber signal from inter-fiber gaps is the Otsu
//! threshold of the cut sampled at the box border rows.

use ndarray::{s, Array1, ArrayView2, Axis};

/// Average the columns `[center - hs, center + hs)` into one value per row.
///
/// The strip is clipped to the image, so a cut near the edge simply
/// averages fewer columns.
pub fn column_cut(image: &ArrayView2<f64>, center: usize, hs: usize) -> Array1<f64> {
    let lo = center.saturating_sub(hs);
    let hi = (center + hs).min(image.ncols());
    let strip = image.slice(s![.., lo..hi]);
    strip
        .mean_axis(Axis(1))
        .unwrap_or_else(|| Array1::zeros(image.nrows()))
}

/// Otsu's threshold over a 1D sample.
///
/// Builds a 256-bin histogram and picks the level maximizing the
/// inter-class variance between the populations below and above it.
/// A flat sample returns its own value.
pub fn otsu_threshold(values: &[f64]) -> f64 {
    const BINS: usize = 256;

    let min_val = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max_val = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    if values.is_empty() || (max_val - min_val).abs() < 1e-6 {
        return if min_val.is_finite() { min_val } else { 0.0 };
    }

    let mut histogram = vec![0u32; BINS];
    let scale = (BINS as f64 - 1.0) / (max_val - min_val);

    for &value in values {
        let bin = (((value - min_val) * scale).round() as usize).min(BINS - 1);
        histogram[bin] += 1;
    }

    let total = values.len() as f64;
    let weighted_hist: Vec<f64> = histogram
        .iter()
        .enumerate()
        .map(|(i, &count)| (i as f64) * (count as f64))
        .collect();
    let total_mean = weighted_hist.iter().sum::<f64>() / total;

    let mut cum_sum = 0u32;
    let mut cum_mean = 0.0;
    let mut best_bin = 0;
    let mut max_variance = 0.0;

    for t in 0..BINS - 1 {
        cum_sum += histogram[t];
        cum_mean += weighted_hist[t];

        let w_bg = cum_sum as f64 / total;
        if w_bg == 0.0 || w_bg == 1.0 {
            continue;
        }
        let w_fg = 1.0 - w_bg;

        let mean_bg = cum_mean / cum_sum as f64;
        let mean_fg = (total_mean * total - cum_mean) / (total - cum_sum as f64);

        let variance = w_bg * w_fg * (mean_bg - mean_fg).powi(2);
        if variance > max_variance {
            max_variance = variance;
            best_bin = t;
        }
    }

    min_val + best_bin as f64 / scale
}

/// Background level from the inter-box gap rows of a cut.
///
/// Samples the averaged cut only at the box border rows (the rows between
/// fiber bundles carry no fiber signal) and returns the Otsu threshold of
/// that sample. Pure function of its inputs.
pub fn estimate_background(
    image: &ArrayView2<f64>,
    center: usize,
    hs: usize,
    border_rows: &[usize],
) -> f64 {
    let cut = column_cut(image, center, hs);
    let samples: Vec<f64> = border_rows
        .iter()
        .filter(|&&row| row < cut.len())
        .map(|&row| cut[row])
        .collect();
    otsu_threshold(&samples)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::Array2;

    #[test]
    fn test_column_cut_averages_strip() {
        let mut image = Array2::zeros((4, 10));
        image[[1, 4]] = 2.0;
        image[[1, 5]] = 4.0;

        let cut = column_cut(&image.view(), 5, 1);
        // Columns 4..6 averaged.
        assert_relative_eq!(cut[1], 3.0);
        assert_relative_eq!(cut[0], 0.0);
    }

    #[test]
    fn test_column_cut_clips_to_image() {
        let image = Array2::from_elem((3, 5), 1.5);
        let cut = column_cut(&image.view(), 0, 3);
        assert_eq!(cut.len(), 3);
        assert_relative_eq!(cut[0], 1.5);
    }

    #[test]
    fn test_otsu_separates_bimodal_sample() {
        let mut values = vec![10.0; 50];
        values.extend(vec![200.0; 50]);
        let threshold = otsu_threshold(&values);
        assert!(threshold > 10.0 && threshold < 200.0);
    }

    #[test]
    fn test_otsu_flat_sample() {
        let values = vec![42.0; 16];
        assert_relative_eq!(otsu_threshold(&values), 42.0);
    }

    #[test]
    fn test_otsu_empty_sample() {
        assert_eq!(otsu_threshold(&[]), 0.0);
    }

    #[test]
    fn test_estimate_background_samples_border_rows() {
        // Rows 0 and 4 are gaps (low), rows 1..4 carry signal (high).
        let mut image = Array2::from_elem((5, 8), 100.0);
        for col in 0..8 {
            image[[0, col]] = 5.0;
            image[[4, col]] = 7.0;
        }
        let background = estimate_background(&image.view(), 4, 2, &[0, 4]);
        // Only the gap rows are sampled, so the level stays near them.
        assert!(background < 10.0);
    }
}
