//! One gradient-descent update of a single image's displacement field.

use crate::image::{Axis, Field, Image};
use crate::metrics::nrmse_nan;
use crate::regularize::Regularizer;
use crate::warp::warp_image_with_shift;

/// Per-image state read by an update.
pub(crate) struct StepInput<'a> {
    /// Normalized source image, never modified.
    pub source: &'a Image,
    /// Source warped by the current field.
    pub aligned: &'a Image,
    /// Gradient of `aligned`.
    pub gradient: &'a Field,
    pub field: &'a Field,
}

/// Values shared by every image during one outer iteration.
pub(crate) struct StepShared<'a> {
    pub reference: &'a Image,
    pub reference_gradient: &'a Field,
    pub increment_clip: Option<f64>,
    pub regularizer: &'a Regularizer,
    pub intensity_shift: bool,
}

#[derive(Debug)]
pub(crate) struct StepOutput {
    pub field: Field,
    pub aligned: Image,
    pub error: f64,
}

/// `-(aligned - reference) * (G_aligned + G_reference)` per channel.
///
/// Non-finite products become 0 so NaN regions never reach the field.
pub(crate) fn raw_increment(
    aligned: &Image,
    reference: &Image,
    gradient: &Field,
    reference_gradient: &Field,
) -> Field {
    let (height, width) = aligned.shape();
    let mut increment = Field::zeros(height, width);
    for axis in Axis::BOTH {
        let g = gradient.channel(axis).pixels();
        let gr = reference_gradient.channel(axis).pixels();
        let pairs = aligned.pixels().iter().zip(reference.pixels());
        for (((out, (&a, &r)), &g), &gr) in increment
            .channel_mut(axis)
            .iter_mut()
            .zip(pairs)
            .zip(g)
            .zip(gr)
        {
            let value = -(a - r) * (g + gr);
            *out = if value.is_finite() { value } else { 0.0 };
        }
    }
    increment
}

pub(crate) fn clamp_increment(increment: &mut Field, limit: f64) {
    for axis in Axis::BOTH {
        for v in increment.channel_mut(axis).iter_mut() {
            *v = v.clamp(-limit, limit);
        }
    }
}

/// Computes the next field, aligned image and error of one image.
///
/// `step` and `sigma` are the live step size and regularizer sigma, read
/// once by the caller for this update.
pub(crate) fn update_image(
    input: &StepInput<'_>,
    shared: &StepShared<'_>,
    step: f64,
    sigma: f64,
) -> StepOutput {
    let mut increment = raw_increment(
        input.aligned,
        shared.reference,
        input.gradient,
        shared.reference_gradient,
    );
    if let Some(limit) = shared.increment_clip {
        clamp_increment(&mut increment, limit);
    }
    shared.regularizer.apply(&mut increment, sigma);

    let mut field = input.field.clone();
    field.add_scaled(&increment, step);

    let aligned = warp_image_with_shift(input.source, &field, 0.0, shared.intensity_shift);
    let error = nrmse_nan(shared.reference, &aligned);

    StepOutput {
        field,
        aligned,
        error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gradient::gradient;
    use crate::testing::{blob_image, gaussian_spot};

    #[test]
    fn test_raw_increment_is_zero_for_matching_images() {
        let image = blob_image(16, 16, 8.0, 8.0);
        let grad = gradient(&image, 1.0);
        let increment = raw_increment(&image, &image, &grad, &grad);
        assert!(increment.dy().iter().all(|&v| v == 0.0));
        assert!(increment.dx().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_raw_increment_points_toward_shift() {
        // Content shifted to +y: sampling further along +y realigns it.
        // Mirror-symmetric in x, so the x increments cancel out.
        let reference = gaussian_spot(24, 24, 11.5, 11.5, 3.0);
        let moved = gaussian_spot(24, 24, 12.0, 11.5, 3.0);
        let increment = raw_increment(
            &moved,
            &reference,
            &gradient(&moved, 1.0),
            &gradient(&reference, 1.0),
        );
        let (mean_dy, mean_dx) = increment.channel_means();
        assert!(mean_dy > 0.0, "mean_dy={}", mean_dy);
        assert!(mean_dx.abs() < mean_dy * 1e-6, "mean_dx={}", mean_dx);
    }

    #[test]
    fn test_raw_increment_zeroes_non_finite_products() {
        let mut reference = Image::filled(4, 4, 0.5);
        reference[(0, 0)] = f64::NAN;
        let aligned = Image::filled(4, 4, 0.7);
        let mut grad = Field::constant(4, 4, 1.0, 1.0);
        grad.channel_mut(Axis::X)[(3, 3)] = f64::INFINITY;
        let increment = raw_increment(&aligned, &reference, &grad, &Field::zeros(4, 4));
        assert_eq!(increment.dy()[(0, 0)], 0.0);
        assert_eq!(increment.dx()[(3, 3)], 0.0);
        assert!((increment.dy()[(1, 1)] + 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_clamp_increment() {
        let mut increment = Field::new(
            Image::new(1, 3, vec![-2.0, 0.1, 3.0]),
            Image::new(1, 3, vec![0.0, -0.5, 0.5]),
        );
        clamp_increment(&mut increment, 0.25);
        assert_eq!(increment.dy().pixels(), &[-0.25, 0.1, 0.25]);
        assert_eq!(increment.dx().pixels(), &[0.0, -0.25, 0.25]);
    }

    #[test]
    fn test_update_on_aligned_image_keeps_field() {
        let image = blob_image(16, 16, 8.0, 7.5);
        let grad = gradient(&image, 1.0);
        let field = Field::zeros(16, 16);
        let regularizer = Regularizer::Gaussian;
        let output = update_image(
            &StepInput {
                source: &image,
                aligned: &image,
                gradient: &grad,
                field: &field,
            },
            &StepShared {
                reference: &image,
                reference_gradient: &grad,
                increment_clip: Some(0.05),
                regularizer: &regularizer,
                intensity_shift: false,
            },
            100.0,
            8.0,
        );
        assert!(output.field.dy().iter().all(|v| v.abs() < 1e-12));
        assert!(output.field.dx().iter().all(|v| v.abs() < 1e-12));
        assert_eq!(output.aligned, image);
        assert_eq!(output.error, 0.0);
    }

    #[test]
    fn test_update_reduces_error_of_shifted_image() {
        let reference = blob_image(32, 32, 15.5, 15.5);
        let moved = blob_image(32, 32, 16.5, 15.0);
        let grad = gradient(&moved, 1.0);
        let reference_gradient = gradient(&reference, 1.0);
        let field = Field::zeros(32, 32);
        let regularizer = Regularizer::Gaussian;
        let before = nrmse_nan(&reference, &moved);
        let output = update_image(
            &StepInput {
                source: &moved,
                aligned: &moved,
                gradient: &grad,
                field: &field,
            },
            &StepShared {
                reference: &reference,
                reference_gradient: &reference_gradient,
                increment_clip: Some(0.05),
                regularizer: &regularizer,
                intensity_shift: false,
            },
            100.0,
            8.0,
        );
        assert!(output.error < before, "{} >= {}", output.error, before);
        let (mean_dy, _) = output.field.channel_means();
        assert!(mean_dy > 0.2, "mean_dy={}", mean_dy);
    }
}
