use image::{imageops, imageops::FilterType, RgbImage};
use ndarray::prelude::*;
use nshare::AsNdarray3;

use crate::errors::{RipenessError, Result};

pub const DEFAULT_INPUT_WIDTH: u32 = 640;
pub const DEFAULT_INPUT_HEIGHT: u32 = 640;

/// Detector input resolution. The detector was trained on stretched 640x640 inputs, so the
/// size and the resize filter are part of the model contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetSize {
    width: u32,
    height: u32,
}

impl TargetSize {
    pub fn new(width: u32, height: u32) -> Result<Self> {
        if width == 0 {
            return Err(RipenessError::validation("target width", "must be positive"));
        }
        if height == 0 {
            return Err(RipenessError::validation("target height", "must be positive"));
        }
        Ok(Self { width, height })
    }

    pub const fn width(&self) -> u32 {
        self.width
    }

    pub const fn height(&self) -> u32 {
        self.height
    }
}

impl Default for TargetSize {
    fn default() -> Self {
        Self {
            width: DEFAULT_INPUT_WIDTH,
            height: DEFAULT_INPUT_HEIGHT,
        }
    }
}

/// Resize to exactly `size` with linear interpolation. No letterboxing: the aspect ratio is
/// stretched the same way the training images were.
pub fn resize_exact(image: &RgbImage, size: TargetSize) -> Result<RgbImage> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(RipenessError::validation(
            "image dimensions",
            format!("{width}x{height} has no pixels"),
        ));
    }
    Ok(imageops::resize(
        image,
        size.width,
        size.height,
        FilterType::Triangle,
    ))
}

/// Pack an RGB image into a `(1, 3, H, W)` tensor with values in `[0, 1]`.
pub fn to_nchw_tensor(image: &RgbImage) -> Array4<f32> {
    image
        .as_ndarray3()
        .slice_move(s![NewAxis, .., .., ..])
        .map(|v| f32::from(*v) / 255.0)
}

/// Per-axis factors taking detector-space coordinates back to the original image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleFactors {
    pub x: f32,
    pub y: f32,
}

impl ScaleFactors {
    pub fn between(original: (u32, u32), target: TargetSize) -> Self {
        Self {
            x: original.0 as f32 / target.width as f32,
            y: original.1 as f32 / target.height as f32,
        }
    }

    pub fn is_identity(&self) -> bool {
        self.x == 1.0 && self.y == 1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_target_size_rejects_zero() {
        assert!(TargetSize::new(0, 640).is_err());
        assert!(TargetSize::new(640, 0).is_err());
        let size = TargetSize::new(320, 256).unwrap();
        assert_eq!((size.width(), size.height()), (320, 256));
        assert_eq!(TargetSize::default(), TargetSize::new(640, 640).unwrap());
    }

    #[test]
    fn test_resize_stretches_without_padding() -> Result<()> {
        // A wide strip stretched to a square keeps its colour in every corner.
        let image = RgbImage::from_pixel(200, 50, Rgb([10, 200, 30]));
        let resized = resize_exact(&image, TargetSize::new(64, 64)?)?;

        assert_eq!(resized.dimensions(), (64, 64));
        for (x, y) in [(0, 0), (63, 0), (0, 63), (63, 63)] {
            assert_eq!(resized.get_pixel(x, y), &Rgb([10, 200, 30]));
        }
        Ok(())
    }

    #[test]
    fn test_tensor_is_rgb_ordered_and_normalized() {
        let mut image = RgbImage::new(2, 1);
        image.put_pixel(0, 0, Rgb([255, 0, 0]));
        image.put_pixel(1, 0, Rgb([0, 0, 255]));

        let tensor = to_nchw_tensor(&image);
        assert_eq!(tensor.shape(), &[1, 3, 1, 2]);
        assert_eq!(tensor[[0, 0, 0, 0]], 1.0);
        assert_eq!(tensor[[0, 2, 0, 0]], 0.0);
        assert_eq!(tensor[[0, 2, 0, 1]], 1.0);
        assert_eq!(tensor[[0, 0, 0, 1]], 0.0);
    }

    #[test]
    fn test_scale_factors() {
        let factors = ScaleFactors::between((1280, 320), TargetSize::default());
        assert_eq!(factors, ScaleFactors { x: 2.0, y: 0.5 });
        assert!(!factors.is_identity());
        assert!(ScaleFactors::between((640, 640), TargetSize::default()).is_identity());
    }
}
