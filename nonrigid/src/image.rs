//! Dense image and displacement-field containers.
//!
//! Everything is row-major `f64` and indexed `(y, x)`. A stack is a plain
//! `Vec<Image>` whose members share one shape; [`Stack`] adds the shape
//! checks needed at the API boundary.

use std::ops::{Deref, DerefMut, Index, IndexMut};

use strum_macros::Display;

use crate::error::{Error, Result};

/// Image axis, also used to name the two channels of a [`Field`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum Axis {
    Y,
    X,
}

impl Axis {
    pub const BOTH: [Axis; 2] = [Axis::Y, Axis::X];
}

#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    pixels: Vec<f64>,
    height: usize,
    width: usize,
}

impl Image {
    pub fn new(height: usize, width: usize, pixels: Vec<f64>) -> Self {
        assert_eq!(
            pixels.len(),
            height * width,
            "pixels length must equal height * width"
        );
        Self {
            pixels,
            height,
            width,
        }
    }

    /// Like [`Image::new`] but reports a length mismatch as [`Error::Shape`].
    pub fn from_vec(height: usize, width: usize, pixels: Vec<f64>) -> Result<Self> {
        if pixels.len() != height * width {
            return Err(Error::shape(format!(
                "{} pixels do not fill a {}x{} image",
                pixels.len(),
                height,
                width
            )));
        }
        Ok(Self::new(height, width, pixels))
    }

    pub fn zeros(height: usize, width: usize) -> Self {
        Self::filled(height, width, 0.0)
    }

    pub fn filled(height: usize, width: usize, value: f64) -> Self {
        Self {
            pixels: vec![value; height * width],
            height,
            width,
        }
    }

    /// Builds an image by evaluating `f(y, x)` at every pixel.
    pub fn from_fn<F>(height: usize, width: usize, f: F) -> Self
    where
        F: Fn(usize, usize) -> f64,
    {
        let pixels = (0..height)
            .flat_map(|y| (0..width).map(move |x| (y, x)))
            .map(|(y, x)| f(y, x))
            .collect();
        Self::new(height, width, pixels)
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    /// `(height, width)`
    #[inline]
    pub fn shape(&self) -> (usize, usize) {
        (self.height, self.width)
    }

    #[inline]
    pub fn get(&self, y: usize, x: usize) -> f64 {
        debug_assert!(y < self.height && x < self.width);
        self.pixels[y * self.width + x]
    }

    #[inline]
    pub fn row(&self, y: usize) -> &[f64] {
        &self.pixels[y * self.width..(y + 1) * self.width]
    }

    #[inline]
    pub fn row_mut(&mut self, y: usize) -> &mut [f64] {
        &mut self.pixels[y * self.width..(y + 1) * self.width]
    }

    #[inline]
    pub fn pixels(&self) -> &[f64] {
        &self.pixels
    }

    #[inline]
    pub fn pixels_mut(&mut self) -> &mut [f64] {
        &mut self.pixels
    }

    pub fn map<F>(&self, f: F) -> Image
    where
        F: Fn(f64) -> f64,
    {
        Image::new(
            self.height,
            self.width,
            self.pixels.iter().map(|&v| f(v)).collect(),
        )
    }

    /// Pixelwise combination of two images of equal shape.
    pub fn zip_map<F>(&self, other: &Image, f: F) -> Image
    where
        F: Fn(f64, f64) -> f64,
    {
        assert_eq!(self.shape(), other.shape(), "image shape mismatch");
        Image::new(
            self.height,
            self.width,
            self.pixels
                .iter()
                .zip(&other.pixels)
                .map(|(&a, &b)| f(a, b))
                .collect(),
        )
    }

    pub fn is_all_nan(&self) -> bool {
        self.pixels.iter().all(|v| v.is_nan())
    }
}

impl Index<(usize, usize)> for Image {
    type Output = f64;

    #[inline]
    fn index(&self, (y, x): (usize, usize)) -> &Self::Output {
        &self.pixels[y * self.width + x]
    }
}

impl IndexMut<(usize, usize)> for Image {
    #[inline]
    fn index_mut(&mut self, (y, x): (usize, usize)) -> &mut Self::Output {
        &mut self.pixels[y * self.width + x]
    }
}

impl Deref for Image {
    type Target = [f64];

    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.pixels
    }
}

impl DerefMut for Image {
    #[inline]
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.pixels
    }
}

/// Per-pixel 2-D displacement of one image: channel 0 is y, channel 1 is x.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    dy: Image,
    dx: Image,
}

impl Field {
    pub fn new(dy: Image, dx: Image) -> Self {
        assert_eq!(dy.shape(), dx.shape(), "field channel shape mismatch");
        Self { dy, dx }
    }

    pub fn zeros(height: usize, width: usize) -> Self {
        Self::new(Image::zeros(height, width), Image::zeros(height, width))
    }

    /// Uniform displacement everywhere.
    pub fn constant(height: usize, width: usize, dy: f64, dx: f64) -> Self {
        Self::new(
            Image::filled(height, width, dy),
            Image::filled(height, width, dx),
        )
    }

    #[inline]
    pub fn shape(&self) -> (usize, usize) {
        self.dy.shape()
    }

    #[inline]
    pub fn dy(&self) -> &Image {
        &self.dy
    }

    #[inline]
    pub fn dx(&self) -> &Image {
        &self.dx
    }

    #[inline]
    pub fn channel(&self, axis: Axis) -> &Image {
        match axis {
            Axis::Y => &self.dy,
            Axis::X => &self.dx,
        }
    }

    #[inline]
    pub fn channel_mut(&mut self, axis: Axis) -> &mut Image {
        match axis {
            Axis::Y => &mut self.dy,
            Axis::X => &mut self.dx,
        }
    }

    /// `self += alpha * increment`
    pub fn add_scaled(&mut self, increment: &Field, alpha: f64) {
        assert_eq!(self.shape(), increment.shape(), "field shape mismatch");
        for axis in Axis::BOTH {
            for (d, &inc) in self
                .channel_mut(axis)
                .iter_mut()
                .zip(increment.channel(axis).iter())
            {
                *d += alpha * inc;
            }
        }
    }

    /// Mean displacement length over all pixels.
    pub fn mean_magnitude(&self) -> f64 {
        let sum: f64 = self
            .dy
            .iter()
            .zip(self.dx.iter())
            .map(|(&dy, &dx)| (dy * dy + dx * dx).sqrt())
            .sum();
        sum / self.dy.len() as f64
    }

    pub fn channel_means(&self) -> (f64, f64) {
        let n = self.dy.len() as f64;
        (
            self.dy.iter().sum::<f64>() / n,
            self.dx.iter().sum::<f64>() / n,
        )
    }
}

/// Ordered images sharing one shape.
#[derive(Debug, Clone, PartialEq)]
pub struct Stack {
    images: Vec<Image>,
}

impl Stack {
    /// Fails with [`Error::Shape`] when the stack is empty, the images differ
    /// in shape, or an image is smaller than 2x2.
    pub fn new(images: Vec<Image>) -> Result<Self> {
        let Some(first) = images.first() else {
            return Err(Error::shape("image stack is empty"));
        };
        let shape = first.shape();
        if shape.0 < 2 || shape.1 < 2 {
            return Err(Error::shape(format!(
                "images must be at least 2x2, got {}x{}",
                shape.0, shape.1
            )));
        }
        if let Some((index, image)) = images
            .iter()
            .enumerate()
            .find(|(_, image)| image.shape() != shape)
        {
            return Err(Error::shape(format!(
                "image {} is {}x{}, expected {}x{}",
                index,
                image.height(),
                image.width(),
                shape.0,
                shape.1
            )));
        }
        Ok(Self { images })
    }

    /// Builds a stack from flat row-major data with a `[H, W]` or `[N, H, W]` shape.
    pub fn from_shape(shape: &[usize], data: Vec<f64>) -> Result<Self> {
        let (count, height, width) = match *shape {
            [height, width] => (1, height, width),
            [count, height, width] => (count, height, width),
            _ => {
                return Err(Error::shape(format!(
                    "expected a 2-D or 3-D image array, got shape {:?}",
                    shape
                )));
            }
        };
        let plane = height * width;
        if data.len() != count * plane {
            return Err(Error::shape(format!(
                "{} values do not fill shape {:?}",
                data.len(),
                shape
            )));
        }
        if plane == 0 {
            return Err(Error::shape(format!("zero-sized images in shape {:?}", shape)));
        }

        let images = data
            .chunks_exact(plane)
            .map(|chunk| Image::new(height, width, chunk.to_vec()))
            .collect();
        Self::new(images)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.images.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    /// `(height, width)` shared by every image.
    #[inline]
    pub fn image_shape(&self) -> (usize, usize) {
        self.images[0].shape()
    }

    #[inline]
    pub fn images(&self) -> &[Image] {
        &self.images
    }

    pub fn into_images(self) -> Vec<Image> {
        self.images
    }
}

impl Index<usize> for Stack {
    type Output = Image;

    #[inline]
    fn index(&self, idx: usize) -> &Self::Output {
        &self.images[idx]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_indexing_is_row_major_yx() {
        let image = Image::new(2, 3, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(image.shape(), (2, 3));
        assert_eq!(image[(0, 2)], 3.0);
        assert_eq!(image[(1, 0)], 4.0);
        assert_eq!(image.get(1, 2), 6.0);
        assert_eq!(image.row(1), &[4.0, 5.0, 6.0]);
    }

    #[test]
    #[should_panic(expected = "pixels length must equal height * width")]
    fn test_new_panics_on_size_mismatch() {
        Image::new(2, 2, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_from_vec_reports_shape_error() {
        let err = Image::from_vec(2, 2, vec![1.0; 3]).unwrap_err();
        assert!(matches!(err, Error::Shape(_)));
    }

    #[test]
    fn test_from_fn() {
        let image = Image::from_fn(3, 4, |y, x| (y * 10 + x) as f64);
        assert_eq!(image[(2, 3)], 23.0);
        assert_eq!(image[(0, 1)], 1.0);
    }

    #[test]
    fn test_field_add_scaled_and_magnitude() {
        let mut field = Field::zeros(2, 2);
        field.add_scaled(&Field::constant(2, 2, 3.0, 4.0), 0.5);
        assert_eq!(field.channel_means(), (1.5, 2.0));
        assert!((field.mean_magnitude() - 2.5).abs() < 1e-12);
    }

    #[test]
    fn test_stack_from_2d_shape() {
        let stack = Stack::from_shape(&[2, 3], vec![0.0; 6]).unwrap();
        assert_eq!(stack.len(), 1);
        assert_eq!(stack.image_shape(), (2, 3));
    }

    #[test]
    fn test_stack_from_3d_shape_splits_planes() {
        let data: Vec<f64> = (0..12).map(|v| v as f64).collect();
        let stack = Stack::from_shape(&[3, 2, 2], data).unwrap();
        assert_eq!(stack.len(), 3);
        assert_eq!(stack[2].pixels(), &[8.0, 9.0, 10.0, 11.0]);
    }

    #[test]
    fn test_stack_rejects_bad_dimensionality() {
        assert!(matches!(
            Stack::from_shape(&[4], vec![0.0; 4]),
            Err(Error::Shape(_))
        ));
        assert!(matches!(
            Stack::from_shape(&[1, 1, 2, 2], vec![0.0; 4]),
            Err(Error::Shape(_))
        ));
        assert!(matches!(
            Stack::from_shape(&[2, 2], vec![0.0; 5]),
            Err(Error::Shape(_))
        ));
    }

    #[test]
    fn test_stack_rejects_mixed_shapes_and_tiny_images() {
        let mixed = Stack::new(vec![Image::zeros(3, 3), Image::zeros(3, 4)]);
        assert!(matches!(mixed, Err(Error::Shape(_))));
        let tiny = Stack::new(vec![Image::zeros(1, 5)]);
        assert!(matches!(tiny, Err(Error::Shape(_))));
        assert!(matches!(Stack::new(vec![]), Err(Error::Shape(_))));
    }
}
