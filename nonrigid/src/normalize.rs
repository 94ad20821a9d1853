//! Percentile clipping and rescaling of images into `[0, 1]`.

use rayon::prelude::*;

use crate::error::{Error, Result};
use crate::image::{Image, Stack};

/// Lower/upper clip percentiles, in percent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Percentile {
    /// Clip `p` percent at both ends: `(p, 100 - p)`.
    Symmetric(f64),
    /// Clip `p0` percent at the low end and `p1` percent at the high end.
    Pair(f64, f64),
}

impl Default for Percentile {
    fn default() -> Self {
        Percentile::Symmetric(0.1)
    }
}

impl Percentile {
    pub fn validate(&self) -> Result<()> {
        let (p0, p1) = match *self {
            Percentile::Symmetric(p) => (p, p),
            Percentile::Pair(p0, p1) => (p0, p1),
        };
        for p in [p0, p1] {
            if !(0.0..50.0).contains(&p) {
                return Err(Error::config(format!(
                    "clip percentile must be in [0, 50), got {}",
                    p
                )));
            }
        }
        if p0 + p1 >= 100.0 {
            return Err(Error::config(format!(
                "clip percentiles {} and {} leave no range",
                p0, p1
            )));
        }
        Ok(())
    }

    /// `(low, high)` percentiles in `[0, 100]`.
    pub fn bounds(&self) -> (f64, f64) {
        match *self {
            Percentile::Symmetric(p) => (p, 100.0 - p),
            Percentile::Pair(p0, p1) => (p0, 100.0 - p1),
        }
    }
}

/// `q`-th percentile (`0..=100`) of the non-NaN values, linearly
/// interpolated between order statistics. `None` when every value is NaN.
pub fn percentile(values: &[f64], q: f64) -> Option<f64> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_unstable_by(f64::total_cmp);
    Some(percentile_of_sorted(&sorted, q))
}

fn percentile_of_sorted(sorted: &[f64], q: f64) -> f64 {
    debug_assert!(!sorted.is_empty());
    let pos = q / 100.0 * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = (lo + 1).min(sorted.len() - 1);
    let frac = pos - lo as f64;
    if frac == 0.0 {
        sorted[lo]
    } else {
        sorted[lo] + frac * (sorted[hi] - sorted[lo])
    }
}

/// Clips `image` to its `pct` percentile range and maps that range onto `[0, 1]`.
///
/// `None` returns the image unchanged. NaN pixels stay NaN. A flat image
/// (empty percentile range) maps to zeros.
pub fn normalize(image: &Image, pct: Option<Percentile>) -> Result<Image> {
    let Some(pct) = pct else {
        return Ok(image.clone());
    };
    pct.validate()?;

    let values: Vec<f64> = image.iter().copied().filter(|v| !v.is_nan()).collect();
    Ok(rescale(image, pct, values))
}

/// Like [`normalize`], but the percentile range is taken only over pixels
/// where `domain` is not NaN.
///
/// Two images that agree wherever `domain` is defined normalize to the same
/// values there, whatever lies outside it.
pub fn normalize_within(image: &Image, pct: Option<Percentile>, domain: &Image) -> Result<Image> {
    if image.shape() != domain.shape() {
        return Err(Error::shape(format!(
            "normalization domain is {}x{}, image is {}x{}",
            domain.height(),
            domain.width(),
            image.height(),
            image.width()
        )));
    }
    let Some(pct) = pct else {
        return Ok(image.clone());
    };
    pct.validate()?;

    let values: Vec<f64> = image
        .iter()
        .zip(domain.iter())
        .filter(|&(v, d)| !v.is_nan() && !d.is_nan())
        .map(|(&v, _)| v)
        .collect();
    Ok(rescale(image, pct, values))
}

/// Maps `image` onto `[0, 1]` using the percentile bounds of `values`.
fn rescale(image: &Image, pct: Percentile, mut values: Vec<f64>) -> Image {
    if values.is_empty() {
        return image.clone();
    }
    values.sort_unstable_by(f64::total_cmp);

    let (q_lo, q_hi) = pct.bounds();
    let lo = percentile_of_sorted(&values, q_lo);
    let hi = percentile_of_sorted(&values, q_hi);

    let range = hi - lo;
    if range.is_nan() || range <= 0.0 {
        return image.map(|v| if v.is_nan() { v } else { 0.0 });
    }

    image.map(|v| ((v - lo) / range).clamp(0.0, 1.0))
}

/// Normalizes every image independently, in parallel.
pub fn normalize_stack(images: &[Image], pct: Option<Percentile>) -> Result<Vec<Image>> {
    if let Some(pct) = pct {
        pct.validate()?;
    }
    images.par_iter().map(|image| normalize(image, pct)).collect()
}

/// Flat-array form: `shape` must be `[H, W]` or `[N, H, W]`.
pub fn normalize_array(shape: &[usize], data: Vec<f64>, pct: Option<Percentile>) -> Result<Stack> {
    let stack = Stack::from_shape(shape, data)?;
    Stack::new(normalize_stack(stack.images(), pct)?)
}
