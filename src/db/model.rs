use serde::Serialize;

/// 人脸向量记录，每张图片一条
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FaceRecord {
    /// 人物名
    pub label: String,
    /// 固定维度的人脸向量
    pub embedding: Vec<f32>,
    /// 图片路径
    pub image_path: String,
}

/// 向量表的结构信息
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableSchema {
    /// 表名
    pub name: String,
    /// 向量维度
    pub dim: i64,
    /// 模型名称
    pub embedder: String,
    /// 预处理签名
    pub preprocess: String,
}
