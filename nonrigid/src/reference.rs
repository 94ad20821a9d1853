//! Reference image selection and per-pixel stack statistics.

use std::str::FromStr;

use crate::error::{Error, Result};
use crate::image::Image;
use crate::metrics::median_f64_mut;

/// Image every stack member is aligned toward.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Reference {
    /// NaN-aware mean of the current aligned stack, refreshed every iteration.
    #[default]
    Mean,
    /// NaN-aware median of the current aligned stack, refreshed every iteration.
    Median,
    /// A fixed member of the normalized stack.
    Index(usize),
    /// A separate image, normalized like the stack.
    External(Image),
}

impl Reference {
    /// Recomputed from the aligned stack each iteration.
    pub fn is_dynamic(&self) -> bool {
        matches!(self, Reference::Mean | Reference::Median)
    }
}

/// Accepts `"mean"`, `"median"` or a stack index such as `"0"`.
impl FromStr for Reference {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("mean") {
            Ok(Reference::Mean)
        } else if trimmed.eq_ignore_ascii_case("median") {
            Ok(Reference::Median)
        } else if let Ok(index) = trimmed.parse::<usize>() {
            Ok(Reference::Index(index))
        } else {
            Err(Error::config(format!("unknown reference mode '{}'", s)))
        }
    }
}

/// Per-pixel statistic used by dynamic references.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PixelStatistic {
    Mean,
    Median,
}

impl Reference {
    pub(crate) fn statistic(&self) -> Option<PixelStatistic> {
        match self {
            Reference::Mean => Some(PixelStatistic::Mean),
            Reference::Median => Some(PixelStatistic::Median),
            Reference::Index(_) | Reference::External(_) => None,
        }
    }
}

/// Per-pixel mean across `images`, ignoring NaN. All-NaN pixels stay NaN.
pub fn mean_image(images: &[Image]) -> Image {
    statistic_image(images, PixelStatistic::Mean)
}

/// Per-pixel median across `images`, ignoring NaN. All-NaN pixels stay NaN.
pub fn median_image(images: &[Image]) -> Image {
    statistic_image(images, PixelStatistic::Median)
}

fn statistic_image(images: &[Image], statistic: PixelStatistic) -> Image {
    assert!(!images.is_empty(), "cannot reduce an empty stack");
    let (height, width) = images[0].shape();
    let pixels = (0..height)
        .flat_map(|y| statistic_row(images, y, statistic))
        .collect();
    Image::new(height, width, pixels)
}

/// Row `y` of the per-pixel statistic. Each pixel is reduced in image order,
/// so rows can be computed on any thread with identical results.
pub(crate) fn statistic_row(images: &[Image], y: usize, statistic: PixelStatistic) -> Vec<f64> {
    let width = images[0].width();
    let mut values = Vec::with_capacity(images.len());
    (0..width)
        .map(|x| {
            values.clear();
            values.extend(
                images
                    .iter()
                    .map(|image| image[(y, x)])
                    .filter(|v| !v.is_nan()),
            );
            if values.is_empty() {
                return f64::NAN;
            }
            match statistic {
                PixelStatistic::Mean => values.iter().sum::<f64>() / values.len() as f64,
                PixelStatistic::Median => median_f64_mut(&mut values),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_reference() {
        assert_eq!("mean".parse::<Reference>().unwrap(), Reference::Mean);
        assert_eq!("Median".parse::<Reference>().unwrap(), Reference::Median);
        assert_eq!("3".parse::<Reference>().unwrap(), Reference::Index(3));
        assert!(matches!("mode".parse::<Reference>(), Err(Error::Config(_))));
        assert!(matches!("-1".parse::<Reference>(), Err(Error::Config(_))));
    }

    #[test]
    fn test_is_dynamic() {
        assert!(Reference::Mean.is_dynamic());
        assert!(Reference::Median.is_dynamic());
        assert!(!Reference::Index(0).is_dynamic());
        assert!(!Reference::External(Image::zeros(2, 2)).is_dynamic());
    }

    #[test]
    fn test_mean_image_ignores_nan() {
        let mut a = Image::filled(2, 3, 1.0);
        let b = Image::filled(2, 3, 3.0);
        let mut c = Image::filled(2, 3, 5.0);
        a[(0, 0)] = f64::NAN;
        c[(0, 0)] = f64::NAN;
        c[(1, 2)] = f64::NAN;

        let mean = mean_image(&[a, b, c]);
        assert_eq!(mean[(0, 0)], 3.0);
        assert_eq!(mean[(0, 1)], 3.0);
        assert_eq!(mean[(1, 2)], 2.0);
    }

    #[test]
    fn test_median_image_ignores_nan() {
        let images = vec![
            Image::filled(2, 2, 0.0),
            Image::filled(2, 2, 10.0),
            Image::filled(2, 2, 1.0),
            Image::filled(2, 2, f64::NAN),
        ];
        let median = median_image(&images);
        assert!(median.iter().all(|&v| v == 1.0));
    }

    #[test]
    fn test_statistic_rows_assemble_to_image() {
        let images: Vec<Image> = (0..4)
            .map(|k| Image::from_fn(3, 5, move |y, x| (y * 5 + x + k) as f64))
            .collect();
        let mean = mean_image(&images);
        for y in 0..3 {
            assert_eq!(statistic_row(&images, y, PixelStatistic::Mean), mean.row(y));
        }
        assert_eq!(mean[(2, 4)], 14.0 + 1.5);
        assert_eq!(Reference::Median.statistic(), Some(PixelStatistic::Median));
        assert_eq!(Reference::Index(2).statistic(), None);
    }

    #[test]
    fn test_all_nan_pixel_stays_nan() {
        let mut a = Image::zeros(2, 2);
        let mut b = Image::zeros(2, 2);
        a[(1, 1)] = f64::NAN;
        b[(1, 1)] = f64::NAN;
        assert!(mean_image(&[a.clone(), b.clone()])[(1, 1)].is_nan());
        assert!(median_image(&[a, b])[(1, 1)].is_nan());
    }
}
