use std::path::Path;

use anyhow::{Result, ensure};
use image::DynamicImage;
use ndarray::Array3;

use crate::embed::Embedder;
use crate::preprocess::Preprocessor;

/// 预处理 + 模型，建库和查询共用同一个实例
pub struct FaceEncoder {
    preprocess: Preprocessor,
    embedder: Box<dyn Embedder>,
}

impl FaceEncoder {
    pub fn new(preprocess: Preprocessor, embedder: Box<dyn Embedder>) -> Result<Self> {
        preprocess.validate()?;
        ensure!(embedder.dim() > 0, "模型 {} 的输出维度为 0", embedder.name());
        Ok(Self { preprocess, embedder })
    }

    pub fn preprocessor(&self) -> &Preprocessor {
        &self.preprocess
    }

    pub fn embedder_name(&self) -> &str {
        self.embedder.name()
    }

    pub fn dim(&self) -> usize {
        self.embedder.dim()
    }

    pub fn preprocess_signature(&self) -> String {
        self.preprocess.signature()
    }

    pub fn encode_file(&self, path: impl AsRef<Path>) -> Result<Vec<f32>> {
        let tensor = self.preprocess.open(path)?;
        self.encode_tensor(tensor)
    }

    pub fn encode_bytes(&self, bytes: &[u8]) -> Result<Vec<f32>> {
        let tensor = self.preprocess.decode(bytes)?;
        self.encode_tensor(tensor)
    }

    pub fn encode_image(&self, image: &DynamicImage) -> Result<Vec<f32>> {
        let tensor = self.preprocess.apply(image)?;
        self.encode_tensor(tensor)
    }

    fn encode_tensor(&self, tensor: Array3<f32>) -> Result<Vec<f32>> {
        let vector = self.embedder.embed(tensor.view())?;
        ensure!(
            vector.len() == self.dim(),
            "模型 {} 输出维度为 {}，期望 {}",
            self.embedder_name(),
            vector.len(),
            self.dim()
        );
        ensure!(vector.iter().all(|v| v.is_finite()), "模型输出包含 NaN 或无穷大");
        Ok(vector)
    }
}

#[cfg(test)]
mod tests {
    use image::{Rgb, RgbImage};
    use ndarray::ArrayView3;

    use super::*;
    use crate::embed::PoolingEmbedder;

    struct BrokenEmbedder;

    impl Embedder for BrokenEmbedder {
        fn name(&self) -> &str {
            "broken"
        }

        fn dim(&self) -> usize {
            4
        }

        fn embed(&self, _input: ArrayView3<f32>) -> Result<Vec<f32>> {
            Ok(vec![0.; 3])
        }
    }

    fn checker() -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(32, 32, |x, y| {
            if (x / 8 + y / 8) % 2 == 0 { Rgb([255, 0, 0]) } else { Rgb([0, 0, 255]) }
        }))
    }

    #[test]
    fn test_encode_image() {
        let encoder =
            FaceEncoder::new(Preprocessor::default(), Box::new(PoolingEmbedder::new(4))).unwrap();
        let v = encoder.encode_image(&checker()).unwrap();
        assert_eq!(v.len(), 48);
        assert_eq!(v, encoder.encode_image(&checker()).unwrap());
    }

    #[test]
    fn test_dimension_mismatch_is_error() {
        let encoder = FaceEncoder::new(Preprocessor::default(), Box::new(BrokenEmbedder)).unwrap();
        assert!(encoder.encode_image(&checker()).is_err());
    }

    #[test]
    fn test_zero_grid_rejected() {
        let encoder = FaceEncoder::new(Preprocessor::default(), Box::new(PoolingEmbedder::new(0)));
        assert!(encoder.is_err());
    }
}
