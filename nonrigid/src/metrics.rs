//! Normalized RMS error between images and its aggregation across a stack.

use strum_macros::{Display, EnumString};

use crate::error::{Error, Result};

/// `sqrt(mean((r - i)^2) / (2 * mean(r^2 + i^2)))`.
///
/// NaN pixels propagate. Identical images (zero numerator) give 0.
pub fn nrmse(reference: &[f64], image: &[f64]) -> f64 {
    assert_eq!(reference.len(), image.len(), "nrmse operands differ in length");
    let mut diff_sq = 0.0;
    let mut energy = 0.0;
    for (&r, &i) in reference.iter().zip(image) {
        diff_sq += (r - i) * (r - i);
        energy += r * r + i * i;
    }
    ratio(diff_sq, energy)
}

/// [`nrmse`] over the pixels where both operands are not NaN.
///
/// NaN when no such pixel exists.
pub fn nrmse_nan(reference: &[f64], image: &[f64]) -> f64 {
    assert_eq!(reference.len(), image.len(), "nrmse operands differ in length");
    let mut diff_sq = 0.0;
    let mut energy = 0.0;
    let mut count = 0usize;
    for (&r, &i) in reference.iter().zip(image) {
        if r.is_nan() || i.is_nan() {
            continue;
        }
        diff_sq += (r - i) * (r - i);
        energy += r * r + i * i;
        count += 1;
    }
    if count == 0 {
        return f64::NAN;
    }
    ratio(diff_sq, energy)
}

// Both sums share the pixel count, so it cancels out of the ratio.
#[inline]
fn ratio(diff_sq: f64, energy: f64) -> f64 {
    if diff_sq == 0.0 {
        return 0.0;
    }
    (diff_sq / (2.0 * energy)).sqrt()
}

/// How per-image errors are combined into one stack error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Aggregate {
    #[default]
    Mean,
    Median,
    Max,
    /// `sqrt(sum(e^2) / n)`
    Quad,
}

impl Aggregate {
    /// Parses `"mean"`, `"median"`, `"max"` or `"quad"`.
    pub fn from_name(name: &str) -> Result<Self> {
        name.parse::<Self>()
            .map_err(|_| Error::config(format!("unknown error aggregate '{}'", name)))
    }

    /// Combines `errors`, skipping NaN entries. NaN when nothing is left.
    pub fn apply(&self, errors: &[f64]) -> f64 {
        let mut finite: Vec<f64> = errors.iter().copied().filter(|e| !e.is_nan()).collect();
        if finite.is_empty() {
            return f64::NAN;
        }
        let n = finite.len() as f64;
        match self {
            Aggregate::Mean => finite.iter().sum::<f64>() / n,
            Aggregate::Median => median_f64_mut(&mut finite),
            Aggregate::Max => finite.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            Aggregate::Quad => (finite.iter().map(|e| e * e).sum::<f64>() / n).sqrt(),
        }
    }
}

/// Median of non-NaN values, in place (partial sort via quickselect).
///
/// Even lengths average the two middle values.
pub fn median_f64_mut(data: &mut [f64]) -> f64 {
    debug_assert!(!data.is_empty());

    let len = data.len();
    let mid = len / 2;

    let (left_part, median, _) = data.select_nth_unstable_by(mid, f64::total_cmp);
    let right = *median;
    if len & 1 == 1 {
        right
    } else {
        let left = left_part.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        (left + right) * 0.5
    }
}
