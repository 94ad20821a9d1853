//! First-order image derivatives along y and x.

use rayon::prelude::*;

use crate::filter::gaussian_derivative;
use crate::image::{Axis, Field, Image};

/// Finite-difference derivative along `axis`.
///
/// Central differences inside, one-sided first differences on the two edge
/// lines. Needs at least two samples along `axis`.
pub fn finite_difference(input: &Image, axis: Axis) -> Image {
    let (height, width) = input.shape();
    let mut output = Image::zeros(height, width);

    match axis {
        Axis::X => {
            assert!(width >= 2, "finite difference needs width >= 2");
            for y in 0..height {
                let row = input.row(y);
                let out = output.row_mut(y);
                out[0] = row[1] - row[0];
                out[width - 1] = row[width - 1] - row[width - 2];
                for x in 1..width - 1 {
                    out[x] = (row[x + 1] - row[x - 1]) * 0.5;
                }
            }
        }
        Axis::Y => {
            assert!(height >= 2, "finite difference needs height >= 2");
            for y in 0..height {
                let (lo, hi, scale) = if y == 0 {
                    (0, 1, 1.0)
                } else if y == height - 1 {
                    (height - 2, height - 1, 1.0)
                } else {
                    (y - 1, y + 1, 0.5)
                };
                let out = output.row_mut(y);
                for ((o, &a), &b) in out.iter_mut().zip(input.row(lo)).zip(input.row(hi)) {
                    *o = (b - a) * scale;
                }
            }
        }
    }

    output
}

/// `(G_y, G_x)` packed as a [`Field`]-shaped pair.
///
/// `sigma == 0` uses finite differences, otherwise a derivative-of-Gaussian
/// along each axis separately.
pub fn gradient(input: &Image, sigma: f64) -> Field {
    assert!(sigma >= 0.0, "gradient sigma must be >= 0, got {}", sigma);
    if sigma == 0.0 {
        Field::new(
            finite_difference(input, Axis::Y),
            finite_difference(input, Axis::X),
        )
    } else {
        Field::new(
            gaussian_derivative(input, sigma, Axis::Y),
            gaussian_derivative(input, sigma, Axis::X),
        )
    }
}

/// Gradients of every image, one rayon task per image.
///
/// Call inside a pool's `install` to bound the thread count.
pub fn gradient_stack(images: &[Image], sigma: f64) -> Vec<Field> {
    images.par_iter().map(|image| gradient(image, sigma)).collect()
}

/// `1 + dD_y/dy + dD_x/dx`, the local area change of a displacement field.
pub fn divergence_factor(field: &Field) -> Image {
    let ddy = finite_difference(field.dy(), Axis::Y);
    let ddx = finite_difference(field.dx(), Axis::X);
    ddy.zip_map(&ddx, |a, b| 1.0 + a + b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finite_difference_matches_central_and_edges() {
        // x^2 along x: central diff at x gives 2x, edges one-sided.
        let image = Image::from_fn(3, 5, |_, x| (x * x) as f64);
        let gx = finite_difference(&image, Axis::X);
        assert_eq!(gx.row(0), &[1.0, 2.0, 4.0, 6.0, 7.0]);

        let image = Image::from_fn(4, 2, |y, _| 3.0 * y as f64);
        let gy = finite_difference(&image, Axis::Y);
        assert!(gy.iter().all(|&v| v == 3.0));
    }

    #[test]
    fn test_gradient_sigma_zero_uses_finite_difference() {
        let image = Image::from_fn(6, 6, |y, x| (y * 2 + x) as f64);
        let grad = gradient(&image, 0.0);
        assert!(grad.dy().iter().all(|&v| v == 2.0));
        assert!(grad.dx().iter().all(|&v| v == 1.0));
    }

    #[test]
    fn test_gaussian_gradient_sign_follows_slope() {
        let image = Image::from_fn(20, 20, |y, x| {
            let dy = y as f64 - 10.0;
            let dx = x as f64 - 10.0;
            (-(dy * dy + dx * dx) / 18.0).exp()
        });
        let grad = gradient(&image, 1.0);
        // Left of the peak the image rises along x, above it rises along y.
        assert!(grad.dx()[(10, 6)] > 0.0);
        assert!(grad.dx()[(10, 14)] < 0.0);
        assert!(grad.dy()[(6, 10)] > 0.0);
        assert!(grad.dy()[(14, 10)] < 0.0);
        assert!(grad.dx()[(10, 10)].abs() < 1e-12);
    }

    #[test]
    fn test_gradient_does_not_touch_input() {
        let image = Image::from_fn(5, 5, |y, x| (y * x) as f64);
        let before = image.clone();
        let _ = gradient(&image, 1.2);
        assert_eq!(image, before);
    }

    #[test]
    fn test_gradient_stack_matches_single() {
        let images: Vec<Image> = (0..3)
            .map(|k| Image::from_fn(7, 9, move |y, x| ((y + k) * x) as f64))
            .collect();
        let stacked = gradient_stack(&images, 0.8);
        for (image, grad) in images.iter().zip(&stacked) {
            assert_eq!(&gradient(image, 0.8), grad);
        }
    }

    #[test]
    fn test_divergence_factor_of_translation_is_one() {
        let field = Field::constant(8, 8, 2.5, -1.25);
        let factor = divergence_factor(&field);
        assert!(factor.iter().all(|&v| v == 1.0));
    }

    #[test]
    fn test_divergence_factor_of_expansion() {
        // D = 0.1 * (y, x) expands the sampling grid: div = 0.2
        let field = Field::new(
            Image::from_fn(6, 6, |y, _| 0.1 * y as f64),
            Image::from_fn(6, 6, |_, x| 0.1 * x as f64),
        );
        let factor = divergence_factor(&field);
        assert!(factor.iter().all(|&v| (v - 1.2).abs() < 1e-12));
    }
}
