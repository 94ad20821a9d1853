//! Resampling images under a per-pixel displacement field.
//!
//! Output pixel `(y, x)` samples the source at `(y + dy, x + dx)` with
//! bilinear interpolation. Sample positions outside `[0, H-1] x [0, W-1]`
//! (or NaN) produce `fill`.

use rayon::prelude::*;

use crate::error::{Error, Result};
use crate::gradient::divergence_factor;
use crate::image::{Field, Image};

/// Linear interpolation that returns an endpoint exactly when `t` is 0 or 1,
/// so a NaN neighbour with zero weight never leaks into the result.
#[inline]
fn lerp(a: f64, b: f64, t: f64) -> f64 {
    if t == 0.0 {
        a
    } else if t == 1.0 {
        b
    } else {
        a + t * (b - a)
    }
}

/// Bilinear sample of `image` at fractional `(y, x)`.
#[inline]
pub fn bilinear_sample(image: &Image, y: f64, x: f64, fill: f64) -> f64 {
    let (height, width) = image.shape();
    let max_y = (height - 1) as f64;
    let max_x = (width - 1) as f64;

    // Written so NaN coordinates fail the test.
    if !(y >= 0.0 && y <= max_y && x >= 0.0 && x <= max_x) {
        return fill;
    }

    // Clamp the cell so the last row/column interpolates with weight 1.
    let y0 = (y.floor() as usize).min(height - 2);
    let x0 = (x.floor() as usize).min(width - 2);
    let fy = y - y0 as f64;
    let fx = x - x0 as f64;

    let top = image.row(y0);
    let bottom = image.row(y0 + 1);

    let upper = lerp(top[x0], top[x0 + 1], fx);
    let lower = lerp(bottom[x0], bottom[x0 + 1], fx);
    lerp(upper, lower, fy)
}

/// Warps one image by `field`, filling out-of-range samples with `fill`.
pub fn warp_image(image: &Image, field: &Field, fill: f64) -> Image {
    assert_eq!(image.shape(), field.shape(), "image and field shape mismatch");

    let (height, width) = image.shape();
    let mut output = Image::zeros(height, width);
    for y in 0..height {
        let dy = field.dy().row(y);
        let dx = field.dx().row(y);
        let out = output.row_mut(y);
        for x in 0..width {
            out[x] = bilinear_sample(image, y as f64 + dy[x], x as f64 + dx[x], fill);
        }
    }
    output
}

/// [`warp_image`], optionally followed by the intensity correction
/// `1 + dD_y/dy + dD_x/dx`.
pub fn warp_image_with_shift(image: &Image, field: &Field, fill: f64, intensity_shift: bool) -> Image {
    let mut warped = warp_image(image, field, fill);
    if intensity_shift {
        let factor = divergence_factor(field);
        for (v, &f) in warped.iter_mut().zip(factor.iter()) {
            *v *= f;
        }
    }
    warped
}

/// Warps every image by its own field, one rayon task per image.
///
/// Fields may come from an alignment run and be applied to any other data
/// sharing the same geometry.
pub fn warp_stack(
    images: &[Image],
    fields: &[Field],
    fill: f64,
    intensity_shift: bool,
) -> Result<Vec<Image>> {
    if images.len() != fields.len() {
        return Err(Error::shape(format!(
            "{} images but {} displacement fields",
            images.len(),
            fields.len()
        )));
    }
    if let Some((index, (image, field))) = images
        .iter()
        .zip(fields)
        .enumerate()
        .find(|(_, (image, field))| image.shape() != field.shape())
    {
        return Err(Error::shape(format!(
            "image {} is {:?} but its field is {:?}",
            index,
            image.shape(),
            field.shape()
        )));
    }

    Ok(images
        .par_iter()
        .zip(fields.par_iter())
        .map(|(image, field)| warp_image_with_shift(image, field, fill, intensity_shift))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(height: usize, width: usize) -> Image {
        Image::from_fn(height, width, |y, x| (y * width + x) as f64 * 0.37 + 0.01)
    }

    #[test]
    fn test_identity_warp_is_bit_exact() {
        let image = ramp(7, 9);
        let warped = warp_image(&image, &Field::zeros(7, 9), f64::NAN);
        assert_eq!(warped, image);
    }

    #[test]
    fn test_integer_shift_moves_content_and_fills_border() {
        let image = ramp(5, 6);
        let warped = warp_image(&image, &Field::constant(5, 6, 0.0, 2.0), -1.0);
        for y in 0..5 {
            for x in 0..4 {
                assert_eq!(warped[(y, x)], image[(y, x + 2)]);
            }
            assert_eq!(warped[(y, 4)], -1.0);
            assert_eq!(warped[(y, 5)], -1.0);
        }
    }

    #[test]
    fn test_exact_edge_coordinate_is_in_range() {
        let image = ramp(4, 4);
        // Sampling row 3 from row 0 lands exactly on the last row.
        let warped = warp_image(&image, &Field::constant(4, 4, 3.0, 0.0), f64::NAN);
        assert_eq!(warped.row(0), image.row(3));
        assert!(warped.row(1).iter().all(|v| v.is_nan()));
    }

    #[test]
    fn test_half_pixel_shift_averages_neighbours() {
        let image = Image::from_fn(3, 4, |_, x| x as f64);
        let warped = warp_image(&image, &Field::constant(3, 4, 0.0, 0.5), 0.0);
        assert_eq!(warped.row(1), &[0.5, 1.5, 2.5, 0.0]);
    }

    #[test]
    fn test_nan_neighbour_with_zero_weight_does_not_leak() {
        let mut image = Image::filled(3, 3, 1.0);
        image[(1, 2)] = f64::NAN;
        let warped = warp_image(&image, &Field::zeros(3, 3), 0.0);
        assert_eq!(warped[(1, 1)], 1.0);
        assert!(warped[(1, 2)].is_nan());
    }

    #[test]
    fn test_nan_displacement_gives_fill() {
        let image = ramp(3, 3);
        let mut field = Field::zeros(3, 3);
        field.channel_mut(crate::image::Axis::X)[(1, 1)] = f64::NAN;
        let warped = warp_image(&image, &field, 42.0);
        assert_eq!(warped[(1, 1)], 42.0);
        assert_eq!(warped[(0, 0)], image[(0, 0)]);
    }

    #[test]
    fn test_intensity_shift_under_translation_is_noop() {
        let image = ramp(8, 8);
        let field = Field::constant(8, 8, 0.25, -0.75);
        let plain = warp_image(&image, &field, 0.0);
        let shifted = warp_image_with_shift(&image, &field, 0.0, true);
        for (a, b) in plain.iter().zip(shifted.iter()) {
            assert!((a - b).abs() < 1e-10);
        }
    }

    #[test]
    fn test_intensity_shift_scales_by_divergence() {
        let image = Image::filled(6, 6, 2.0);
        let field = Field::new(
            Image::from_fn(6, 6, |y, _| 0.05 * y as f64),
            Image::zeros(6, 6),
        );
        let shifted = warp_image_with_shift(&image, &field, 0.0, true);
        // Sample positions stay inside for every pixel but the last row.
        for x in 0..6 {
            assert!((shifted[(2, x)] - 2.1).abs() < 1e-12);
        }
    }

    #[test]
    fn test_warp_stack_checks_shapes() {
        let images = vec![ramp(4, 4), ramp(4, 4)];
        let err = warp_stack(&images, &[Field::zeros(4, 4)], 0.0, false).unwrap_err();
        assert!(matches!(err, Error::Shape(_)));

        let err = warp_stack(&images, &[Field::zeros(4, 4), Field::zeros(4, 5)], 0.0, false)
            .unwrap_err();
        assert!(matches!(err, Error::Shape(_)));

        let fields = vec![Field::zeros(4, 4), Field::constant(4, 4, 1.0, 0.0)];
        let warped = warp_stack(&images, &fields, 0.0, false).unwrap();
        assert_eq!(warped[0], images[0]);
        assert_eq!(warped[1].row(0), images[1].row(1));
    }
}
