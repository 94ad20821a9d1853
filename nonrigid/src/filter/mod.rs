//! Separable Gaussian filtering on single images.
//!
//! Kernels are truncated at `TRUNCATE * sigma` and boundaries use reflect
//! extension (`d c b a | a b c d | d c b a`), so kernels longer than the
//! image fold back as many times as needed.
//!
//! All routines here run on the calling thread. Parallelism lives one level
//! up, across the images of a stack.


use crate::image::{Axis, Image};

/// Kernel half-width in units of sigma.
pub const TRUNCATE: f64 = 4.0;

#[inline]
fn kernel_radius(sigma: f64) -> usize {
    (TRUNCATE * sigma + 0.5) as usize
}

/// Maps any integer position onto `0..len` with reflect extension.
#[inline]
pub(crate) fn reflect_index(i: isize, len: usize) -> usize {
    debug_assert!(len > 0);
    let period = 2 * len as isize;
    let m = i.rem_euclid(period) as usize;
    if m >= len { 2 * len - 1 - m } else { m }
}

/// Normalized 1-D Gaussian, length `2 * radius + 1`, centre at index `radius`.
pub fn gaussian_kernel_1d(sigma: f64) -> Vec<f64> {
    assert!(sigma > 0.0, "Sigma must be positive");

    let radius = kernel_radius(sigma) as isize;
    let two_sigma_sq = 2.0 * sigma * sigma;
    let mut kernel: Vec<f64> = (-radius..=radius)
        .map(|k| (-(k * k) as f64 / two_sigma_sq).exp())
        .collect();

    let sum: f64 = kernel.iter().sum();
    for v in &mut kernel {
        *v /= sum;
    }
    kernel
}

/// First derivative of the normalized Gaussian, `-k / sigma^2 * g(k)`.
///
/// Convolving with this kernel estimates `d/dk` of the smoothed signal with
/// a positive sign for increasing signals.
pub fn gaussian_derivative_kernel_1d(sigma: f64) -> Vec<f64> {
    let gauss = gaussian_kernel_1d(sigma);
    let radius = (gauss.len() / 2) as isize;
    let sigma_sq = sigma * sigma;
    gauss
        .iter()
        .zip(-radius..=radius)
        .map(|(&g, k)| -(k as f64) / sigma_sq * g)
        .collect()
}

/// Convolves every line of `input` along `axis` with an odd-length kernel.
///
/// `out[i] = sum_k kernel[r + k] * in[reflect(i - k)]`
pub fn convolve_axis(input: &Image, kernel: &[f64], axis: Axis) -> Image {
    assert!(kernel.len() % 2 == 1, "kernel length must be odd");

    let (height, width) = input.shape();
    let radius = (kernel.len() / 2) as isize;
    let mut output = Image::zeros(height, width);

    match axis {
        Axis::X => {
            for y in 0..height {
                let in_row = input.row(y);
                let out_row = output.row_mut(y);
                for (x, out) in out_row.iter_mut().enumerate() {
                    let mut sum = 0.0;
                    for (ki, &kval) in kernel.iter().enumerate() {
                        let offset = ki as isize - radius;
                        let sx = reflect_index(x as isize - offset, width);
                        sum += kval * in_row[sx];
                    }
                    *out = sum;
                }
            }
        }
        Axis::Y => {
            for y in 0..height {
                let out_row = output.row_mut(y);
                for (ki, &kval) in kernel.iter().enumerate() {
                    let offset = ki as isize - radius;
                    let sy = reflect_index(y as isize - offset, height);
                    let in_row = input.row(sy);
                    for (out, &v) in out_row.iter_mut().zip(in_row) {
                        *out += kval * v;
                    }
                }
            }
        }
    }

    output
}

/// 2-D separable Gaussian blur. `sigma <= 0` returns an exact copy.
pub fn gaussian_smooth(input: &Image, sigma: f64) -> Image {
    if sigma <= 0.0 {
        return input.clone();
    }
    let kernel = gaussian_kernel_1d(sigma);
    let rows = convolve_axis(input, &kernel, Axis::X);
    convolve_axis(&rows, &kernel, Axis::Y)
}

/// 1-D derivative-of-Gaussian along `axis` only.
pub fn gaussian_derivative(input: &Image, sigma: f64, axis: Axis) -> Image {
    let kernel = gaussian_derivative_kernel_1d(sigma);
    convolve_axis(input, &kernel, axis)
}
