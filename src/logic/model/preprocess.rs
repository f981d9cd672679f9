//! Frame pre-processing: orientation fix-up and tensor packing.

use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::Array4;

/// Channel normalisation applied after scaling to the model input size
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Normalization {
    pub mean: f32,
    pub std: f32,
}

impl Default for Normalization {
    /// Maps 0..255 onto -1..1
    fn default() -> Self {
        Self { mean: 127.5, std: 127.5 }
    }
}

/// Clockwise quarter turns needed to upright a frame.
///
/// `rotation_degrees` is how far the sensor image is rotated from upright;
/// truncating division, so 135 counts as one turn.
pub fn quarter_turns(rotation_degrees: i32) -> u8 {
    (rotation_degrees / 90).rem_euclid(4) as u8
}

/// Rotate a frame by its reported sensor rotation
pub fn upright(image: &RgbImage, rotation_degrees: i32) -> RgbImage {
    match quarter_turns(rotation_degrees) {
        1 => imageops::rotate90(image),
        2 => imageops::rotate180(image),
        3 => imageops::rotate270(image),
        _ => image.clone(),
    }
}

/// Resize to `size`x`size` and pack as NCHW f32
pub fn to_tensor(image: &RgbImage, size: u32, norm: Normalization) -> Array4<f32> {
    let resized = if image.width() == size && image.height() == size {
        image.clone()
    } else {
        imageops::resize(image, size, size, FilterType::Triangle)
    };

    let side = size as usize;
    let std = if norm.std.abs() < f32::EPSILON { 1.0 } else { norm.std };
    let mut tensor = Array4::<f32>::zeros((1, 3, side, side));

    for (x, y, pixel) in resized.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, c, y as usize, x as usize]] = (pixel[c] as f32 - norm.mean) / std;
        }
    }

    tensor
}
