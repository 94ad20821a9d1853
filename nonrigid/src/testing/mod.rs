//! Synthetic images for tests and benchmarks.

use crate::image::{Image, Stack};

/// Spots as `(dy, dx, sigma, amplitude)` relative to the blob centre.
const BLOB_SPOTS: [(f64, f64, f64, f64); 3] = [
    (0.0, 0.0, 4.0, 1.0),
    (6.0, -5.0, 3.0, 0.7),
    (-5.0, 6.0, 3.5, 0.8),
];

/// Single isotropic Gaussian spot with peak 1 at `(cy, cx)`.
pub fn gaussian_spot(height: usize, width: usize, cy: f64, cx: f64, sigma: f64) -> Image {
    let two_sigma_sq = 2.0 * sigma * sigma;
    Image::from_fn(height, width, |y, x| {
        let dy = y as f64 - cy;
        let dx = x as f64 - cx;
        (-(dy * dy + dx * dx) / two_sigma_sq).exp()
    })
}

/// Three overlapping Gaussian spots around `(cy, cx)` on a zero background.
///
/// Asymmetric enough that both displacement channels are constrained.
pub fn blob_image(height: usize, width: usize, cy: f64, cx: f64) -> Image {
    Image::from_fn(height, width, |y, x| {
        BLOB_SPOTS
            .iter()
            .map(|&(oy, ox, sigma, amplitude)| {
                let dy = y as f64 - (cy + oy);
                let dx = x as f64 - (cx + ox);
                amplitude * (-(dy * dy + dx * dx) / (2.0 * sigma * sigma)).exp()
            })
            .sum()
    })
}

/// Centre of an image grid, `((h - 1) / 2, (w - 1) / 2)`.
pub fn grid_center(height: usize, width: usize) -> (f64, f64) {
    ((height - 1) as f64 * 0.5, (width - 1) as f64 * 0.5)
}

/// One [`blob_image`] per shift, with the content moved by `(dy, dx)` from
/// the grid centre.
pub fn shifted_blob_stack(height: usize, width: usize, shifts: &[(f64, f64)]) -> Stack {
    let (cy, cx) = grid_center(height, width);
    let images = shifts
        .iter()
        .map(|&(dy, dx)| blob_image(height, width, cy + dy, cx + dx))
        .collect();
    Stack::new(images).expect("shifted blob stack is well formed")
}

/// Mean of `channel` over the pixels within `radius` of `(cy, cx)`.
pub fn disc_mean(channel: &Image, cy: f64, cx: f64, radius: f64) -> f64 {
    let (height, width) = channel.shape();
    let mut sum = 0.0;
    let mut count = 0usize;
    for y in 0..height {
        for x in 0..width {
            let dy = y as f64 - cy;
            let dx = x as f64 - cx;
            if dy * dy + dx * dx <= radius * radius {
                sum += channel[(y, x)];
                count += 1;
            }
        }
    }
    sum / count as f64
}
