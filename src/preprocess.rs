//! Image preprocessing for classifier inference.
//!
//! Turns raw encoded image bytes into the normalized `[1, 3, 224, 224]`
//! tensor the classifiers were trained on. The resize target and the
//! per-channel constants must not change: the models silently lose accuracy
//! if they do.

use crate::error::EnsembleError;
use image::{imageops::FilterType, DynamicImage};
use ndarray::Array4;

/// Spatial resolution expected by every model.
pub const INPUT_SIZE: u32 = 224;

/// Per-channel mean (RGB), ImageNet statistics.
pub const NORMALIZE_MEAN: [f32; 3] = [0.485, 0.456, 0.406];

/// Per-channel standard deviation (RGB), ImageNet statistics.
pub const NORMALIZE_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Converts encoded images into model input tensors.
#[derive(Debug, Clone)]
pub struct ImagePreprocessor {
    size: u32,
    filter: FilterType,
}

impl ImagePreprocessor {
    /// Create a preprocessor with the fixed 224x224 bilinear resize.
    pub fn new() -> Self {
        Self {
            size: INPUT_SIZE,
            filter: FilterType::Triangle,
        }
    }

    /// Decode bytes and produce a `[1, 3, 224, 224]` normalized tensor.
    pub fn preprocess(&self, image_bytes: &[u8]) -> Result<Array4<f32>, EnsembleError> {
        if image_bytes.is_empty() {
            return Err(EnsembleError::InvalidImage("empty image payload".to_string()));
        }

        let image = image::load_from_memory(image_bytes)
            .map_err(|e| EnsembleError::InvalidImage(e.to_string()))?;

        if image.width() == 0 || image.height() == 0 {
            return Err(EnsembleError::InvalidImage(format!(
                "image has zero size ({}x{})",
                image.width(),
                image.height()
            )));
        }

        Ok(self.to_tensor(&image))
    }

    /// Resize and normalize an already decoded image.
    ///
    /// Alpha is dropped; grayscale and palette images are expanded to RGB.
    pub fn to_tensor(&self, image: &DynamicImage) -> Array4<f32> {
        let rgb = image.to_rgb8();
        let resized = image::imageops::resize(&rgb, self.size, self.size, self.filter);

        let side = self.size as usize;
        let mut tensor = Array4::<f32>::zeros((1, 3, side, side));

        for (x, y, pixel) in resized.enumerate_pixels() {
            for c in 0..3 {
                let value = pixel[c] as f32 / 255.0;
                tensor[[0, c, y as usize, x as usize]] =
                    (value - NORMALIZE_MEAN[c]) / NORMALIZE_STD[c];
            }
        }

        tensor
    }

    /// Shape of the produced tensor.
    pub fn output_shape(&self) -> [usize; 4] {
        let side = self.size as usize;
        [1, 3, side, side]
    }
}

impl Default for ImagePreprocessor {
    fn default() -> Self {
        Self::new()
    }
}
