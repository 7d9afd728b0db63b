//! 图片预处理
//!
//! 建库和查询必须使用完全相同的预处理流程，否则相似度会在没有任何报错的情况下变差。
//! 因此预处理集中在 [`Preprocessor`] 中，并通过 [`Preprocessor::signature`] 写入向量库，
//! 查询时再进行比对。

use std::path::Path;

use anyhow::{Context, Result, ensure};
use image::imageops::{self, FilterType};
use image::{DynamicImage, RgbImage};
use ndarray::Array3;

/// 预处理流程的版本号，修改预处理算法时需要递增
pub const PREPROCESS_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Preprocessor {
    /// 缩放后的边长
    pub size: u32,
    /// 每个通道的归一化均值
    pub mean: [f32; 3],
    /// 每个通道的归一化标准差
    pub std: [f32; 3],
    /// 缩放插值方式
    pub filter: FilterType,
}

impl Default for Preprocessor {
    fn default() -> Self {
        Self { size: 160, mean: [0.5; 3], std: [0.5; 3], filter: FilterType::Triangle }
    }
}

impl Preprocessor {
    /// 检查参数是否合法
    pub fn validate(&self) -> Result<()> {
        ensure!(self.size > 0, "预处理尺寸必须大于 0");
        ensure!(
            self.std.iter().all(|s| s.is_finite() && *s > 0.),
            "归一化标准差必须为正数: {:?}",
            self.std
        );
        ensure!(self.mean.iter().all(|m| m.is_finite()), "归一化均值无效: {:?}", self.mean);
        Ok(())
    }

    /// 预处理流程的签名，包含版本号和全部参数
    pub fn signature(&self) -> String {
        let filter = match self.filter {
            FilterType::Nearest => "nearest",
            FilterType::Triangle => "triangle",
            FilterType::CatmullRom => "catmull-rom",
            FilterType::Gaussian => "gaussian",
            FilterType::Lanczos3 => "lanczos3",
        };
        format!(
            "v{};size={}x{};filter={};mean={:?};std={:?}",
            PREPROCESS_VERSION, self.size, self.size, filter, self.mean, self.std
        )
    }

    /// 读取图片文件并预处理
    pub fn open(&self, path: impl AsRef<Path>) -> Result<Array3<f32>> {
        let path = path.as_ref();
        let image =
            image::open(path).with_context(|| format!("无法读取图片: {}", path.display()))?;
        self.apply(&image)
    }

    /// 解码内存中的图片并预处理
    pub fn decode(&self, bytes: &[u8]) -> Result<Array3<f32>> {
        let image = image::load_from_memory(bytes).context("无法解码图片")?;
        self.apply(&image)
    }

    /// 转换为 RGB，缩放到固定尺寸，并归一化为 `(3, size, size)` 的张量
    pub fn apply(&self, image: &DynamicImage) -> Result<Array3<f32>> {
        self.validate()?;
        ensure!(image.width() > 0 && image.height() > 0, "图片尺寸为 0");

        let rgb = image.to_rgb8();
        let resized: RgbImage = imageops::resize(&rgb, self.size, self.size, self.filter);

        let size = self.size as usize;
        let tensor = Array3::from_shape_fn((3, size, size), |(c, y, x)| {
            let pixel = resized.get_pixel(x as u32, y as u32);
            (pixel.0[c] as f32 / 255. - self.mean[c]) / self.std[c]
        });
        Ok(tensor)
    }
}

#[cfg(test)]
mod tests {
    use image::Rgb;

    use super::*;

    fn gradient(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x * 255 / width) as u8, (y * 255 / height) as u8, 128])
        }))
    }

    #[test]
    fn test_apply_shape_and_range() {
        let pre = Preprocessor::default();
        let tensor = pre.apply(&gradient(300, 200)).unwrap();
        assert_eq!(tensor.shape(), &[3, 160, 160]);
        assert!(tensor.iter().all(|v| (-1.0..=1.0).contains(v)));
    }

    #[test]
    fn test_apply_is_deterministic() {
        let pre = Preprocessor::default();
        let image = gradient(64, 48);
        assert_eq!(pre.apply(&image).unwrap(), pre.apply(&image).unwrap());
    }

    #[test]
    fn test_grayscale_is_expanded_to_rgb() {
        let pre = Preprocessor { size: 4, ..Default::default() };
        let gray = DynamicImage::ImageLuma8(image::GrayImage::from_pixel(8, 8, image::Luma([255])));
        let tensor = pre.apply(&gray).unwrap();
        assert_eq!(tensor.shape(), &[3, 4, 4]);
        assert!(tensor.iter().all(|v| (v - 1.).abs() < 1e-6));
    }

    #[test]
    fn test_invalid_parameters() {
        let pre = Preprocessor { std: [0.5, 0., 0.5], ..Default::default() };
        assert!(pre.apply(&gradient(8, 8)).is_err());
        let pre = Preprocessor { size: 0, ..Default::default() };
        assert!(pre.validate().is_err());
    }

    #[test]
    fn test_decode_garbage() {
        assert!(Preprocessor::default().decode(b"definitely not an image").is_err());
    }

    #[test]
    fn test_signature_changes_with_parameters() {
        let a = Preprocessor::default();
        let b = Preprocessor { filter: FilterType::Nearest, ..a };
        let c = Preprocessor { size: 112, ..a };
        assert_ne!(a.signature(), b.signature());
        assert_ne!(a.signature(), c.signature());
        assert!(a.signature().starts_with("v1;size=160x160;filter=triangle"));
    }
}
