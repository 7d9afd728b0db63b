use indicatif::ProgressStyle;
use ndarray::{Array1, ArrayView1, ArrayView2, Axis};

/// 进度条样式
pub fn pb_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos:>7}/{len:7} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("##-")
}

/// 向量的 L2 范数
pub fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// 原地 L2 归一化，零向量保持不变
pub fn l2_normalize(v: &mut [f32]) {
    let norm = l2_norm(v);
    if norm > 0. {
        v.iter_mut().for_each(|x| *x /= norm);
    }
}

/// 余弦相似度，任一向量为零时返回 0
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot = a.iter().zip(b).map(|(x, y)| x * y).sum::<f32>();
    let denom = l2_norm(a) * l2_norm(b);
    if denom > 0. { dot / denom } else { 0. }
}

/// 计算矩阵每一行与查询向量的余弦相似度
///
/// # Arguments
///
/// * `matrix` - 形状为 `(n, dim)` 的向量矩阵
/// * `query` - 长度为 `dim` 的查询向量
pub fn cosine_similarities(matrix: ArrayView2<f32>, query: ArrayView1<f32>) -> Array1<f32> {
    let qnorm = query.dot(&query).sqrt();
    let dots = matrix.dot(&query);
    let norms = matrix.map_axis(Axis(1), |row| row.dot(&row).sqrt());
    let mut scores = dots;
    scores.zip_mut_with(&norms, |s, &n| {
        let denom = n * qnorm;
        *s = if denom > 0. { *s / denom } else { 0. };
    });
    scores
}

#[cfg(test)]
mod tests {
    use ndarray::{arr1, arr2};

    use super::*;

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1., 0.], &[1., 0.]) - 1.).abs() < 1e-6);
        assert!(cosine_similarity(&[1., 0.], &[0., 1.]).abs() < 1e-6);
        assert!((cosine_similarity(&[1., 0.], &[-2., 0.]) + 1.).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[0., 0.], &[1., 0.]), 0.);
    }

    #[test]
    fn test_l2_normalize() {
        let mut v = vec![3., 4.];
        l2_normalize(&mut v);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);

        let mut zero = vec![0., 0.];
        l2_normalize(&mut zero);
        assert_eq!(zero, vec![0., 0.]);
    }

    #[test]
    fn test_cosine_similarities_matches_pairwise() {
        let matrix = arr2(&[[1., 0., 0.], [1., 1., 0.], [0., 0., 0.]]);
        let query = arr1(&[1., 0., 0.]);
        let scores = cosine_similarities(matrix.view(), query.view());
        assert!((scores[0] - 1.).abs() < 1e-6);
        assert!((scores[1] - cosine_similarity(&[1., 1., 0.], &[1., 0., 0.])).abs() < 1e-6);
        assert_eq!(scores[2], 0.);
    }
}
