//! Synthetic flat-frame generation for exercising the trace pipeline.
//!
//! Renders detector frames with a known fiber geometry: Gaussian fiber
//! profiles on a flat pedestal, an optional linear row drift along the
//! dispersion axis, and seeded uniform detector noise so runs are
//! reproducible.

use fibertrace::{BoxLayout, ConfigError, FiberBox};
use ndarray::Array2;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Geometry and signal model of a synthetic flat frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameSpec {
    pub nrows: usize,
    pub ncols: usize,
    pub nboxes: usize,
    pub fibers_per_box: usize,
    /// Row position of the first box border.
    pub first_border: f64,
    /// Height of each box in rows.
    pub box_height: f64,
    /// Row drift per column, in pixels.
    pub drift: f64,
    /// Gaussian profile width.
    pub sigma: f64,
    /// Peak fiber intensity above the pedestal.
    pub amplitude: f64,
    pub pedestal: f64,
    /// Half-range of the uniform detector noise.
    pub noise: f64,
    pub seed: u64,
}

impl Default for FrameSpec {
    /// Full-size frame: 10 boxes of 62 fibers on a 4112 x 4096 detector.
    fn default() -> Self {
        Self {
            nrows: 4112,
            ncols: 4096,
            nboxes: 10,
            fibers_per_box: 62,
            first_border: 36.0,
            box_height: 404.0,
            drift: 0.01,
            sigma: 1.3,
            amplitude: 20000.0,
            pedestal: 100.0,
            noise: 8.0,
            seed: 20160208,
        }
    }
}

impl FrameSpec {
    /// The box layout this frame realizes.
    pub fn layout(&self) -> Result<BoxLayout, ConfigError> {
        let boxes = (0..self.nboxes)
            .map(|i| FiberBox {
                id: i as u32 + 1,
                nfibers: self.fibers_per_box,
            })
            .collect();
        let borders = (0..=self.nboxes)
            .map(|i| self.first_border + i as f64 * self.box_height)
            .collect();
        BoxLayout::new(boxes, borders)
    }

    /// Row centers of all fibers at column 0, in fiber-id order.
    ///
    /// Fiber `k` of a box sits at `left + k * spacing` with
    /// `spacing = box_height / (fibers_per_box + 2)`, the same geometry the
    /// matcher assumes.
    pub fn base_centers(&self) -> Vec<f64> {
        let spacing = self.box_height / (self.fibers_per_box as f64 + 2.0);
        let mut centers = Vec::with_capacity(self.nboxes * self.fibers_per_box);
        for b in 0..self.nboxes {
            let left = self.first_border + b as f64 * self.box_height;
            for k in 1..=self.fibers_per_box {
                centers.push(left + k as f64 * spacing);
            }
        }
        centers
    }

    /// True row center of fiber `fibid` (1-based) at `column`.
    pub fn center_at(&self, fibid: u32, column: usize) -> f64 {
        self.base_centers()[fibid as usize - 1] + self.drift * column as f64
    }

    /// Render the frame; fibers listed in `dark` (1-based ids) stay unlit.
    pub fn render(&self, dark: &[u32]) -> Array2<f64> {
        let mut frame = Array2::from_elem((self.nrows, self.ncols), self.pedestal);
        let reach = (4.0 * self.sigma).ceil() as i64;

        for (i, &base) in self.base_centers().iter().enumerate() {
            if dark.contains(&(i as u32 + 1)) {
                continue;
            }
            for col in 0..self.ncols {
                let center = base + self.drift * col as f64;
                let row0 = (center as i64 - reach).max(0);
                let row1 = (center as i64 + reach + 1).min(self.nrows as i64);
                for row in row0..row1 {
                    let d = row as f64 - center;
                    frame[[row as usize, col]] +=
                        self.amplitude * (-d * d / (2.0 * self.sigma * self.sigma)).exp();
                }
            }
        }

        if self.noise > 0.0 {
            let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
            for pixel in frame.iter_mut() {
                *pixel += rng.gen_range(-self.noise..self.noise);
            }
        }
        frame
    }
}
