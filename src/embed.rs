use anyhow::{Result, ensure};
use ndarray::{ArrayView3, s};

use crate::utils::l2_normalize;

/// 人脸向量模型：输入预处理后的 `(3, H, W)` 张量，输出固定长度的向量
///
/// 对于同一张图片和同一组模型权重，输出必须是确定的。
pub trait Embedder: Send + Sync {
    /// 模型名称，会被记录到向量库中
    fn name(&self) -> &str;

    /// 输出向量的维度
    fn dim(&self) -> usize;

    fn embed(&self, input: ArrayView3<f32>) -> Result<Vec<f32>>;
}

/// 不依赖神经网络的基准模型
///
/// 把每个通道划分为 `grid x grid` 个区域取均值，展平后做 L2 归一化。
#[derive(Debug, Clone)]
pub struct PoolingEmbedder {
    grid: usize,
    name: String,
}

impl PoolingEmbedder {
    pub fn new(grid: usize) -> Self {
        Self { grid, name: format!("pool-{}", grid) }
    }
}

impl Embedder for PoolingEmbedder {
    fn name(&self) -> &str {
        &self.name
    }

    fn dim(&self) -> usize {
        3 * self.grid * self.grid
    }

    fn embed(&self, input: ArrayView3<f32>) -> Result<Vec<f32>> {
        let (channels, height, width) = input.dim();
        ensure!(self.grid > 0, "池化网格必须大于 0");
        ensure!(channels == 3, "输入必须为 3 通道，实际为 {}", channels);
        ensure!(
            height >= self.grid && width >= self.grid,
            "输入尺寸 {}x{} 小于池化网格 {}",
            width,
            height,
            self.grid
        );

        let mut vector = Vec::with_capacity(self.dim());
        for c in 0..channels {
            for gy in 0..self.grid {
                let (y0, y1) = (gy * height / self.grid, (gy + 1) * height / self.grid);
                for gx in 0..self.grid {
                    let (x0, x1) = (gx * width / self.grid, (gx + 1) * width / self.grid);
                    let cell = input.slice(s![c, y0..y1, x0..x1]);
                    vector.push(cell.mean().unwrap_or(0.));
                }
            }
        }
        l2_normalize(&mut vector);

        Ok(vector)
    }
}
