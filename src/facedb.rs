use std::path::Path;

use anyhow::{Result, anyhow, ensure};
use indicatif::{ProgressBar, ProgressDrawTarget};
use log::{debug, error, info, warn};
use ndarray::{Array2, ArrayView1, Axis};
use serde::Serialize;

use crate::config::{DEFAULT_TABLE, StoreDir};
use crate::db::{self, Database, FaceRecord, TableSchema, crud};
use crate::encoder::FaceEncoder;
use crate::persona::LabeledImages;
use crate::utils::{cosine_similarities, pb_style};

/// 无法识别时使用的人物名
pub const UNKNOWN_LABEL: &str = "Unknown";

pub struct FaceDBBuilder {
    store_dir: StoreDir,
    table: String,
    threshold: Option<f32>,
    progress: bool,
}

impl FaceDBBuilder {
    pub fn new(store_dir: StoreDir) -> Self {
        Self { store_dir, table: DEFAULT_TABLE.to_string(), threshold: None, progress: false }
    }

    /// 人脸向量表名
    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    /// 最低相似度，低于该值的结果视为无法识别
    pub fn threshold(mut self, threshold: Option<f32>) -> Self {
        self.threshold = threshold;
        self
    }

    /// 建库时是否在终端显示进度条
    pub fn progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    pub async fn open(self) -> Result<FaceDB> {
        db::check_table_name(&self.table)?;
        let db = db::init_db(self.store_dir.path(), self.store_dir.database()).await?;
        Ok(self.build(db))
    }

    /// 打开已有的向量库，不创建目录和数据库文件
    ///
    /// 向量库不存在时返回 `None`。
    pub async fn open_existing(self) -> Result<Option<FaceDB>> {
        db::check_table_name(&self.table)?;
        let dir = self.store_dir.path();
        ensure!(!dir.exists() || dir.is_dir(), "向量库路径不是目录: {}", dir.display());

        let database = self.store_dir.database();
        if !database.is_file() {
            debug!("向量库 {} 不存在", database.display());
            return Ok(None);
        }
        let db = db::open_db(database).await?;
        Ok(Some(self.build(db)))
    }

    fn build(self, db: Database) -> FaceDB {
        FaceDB { db, table: self.table, threshold: self.threshold, progress: self.progress }
    }
}

pub struct FaceDB {
    db: Database,
    table: String,
    threshold: Option<f32>,
    progress: bool,
}

/// 建库结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexReport {
    /// 没有生成任何向量，向量库未被修改
    Aborted { skipped: usize },
    /// 向量表已被重建
    Indexed { records: usize, skipped: usize },
}

/// 近邻搜索结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Neighbor {
    pub label: String,
    pub similarity: f32,
    pub image_path: String,
}

/// 识别结果，任何错误都会被转换为 [`Recognition::Error`]
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Recognition {
    Match {
        label: String,
        similarity: f32,
        #[serde(skip_serializing_if = "Option::is_none")]
        image_path: Option<String>,
    },
    Error {
        error: String,
    },
}

impl Recognition {
    pub fn unknown() -> Self {
        Self::Match { label: UNKNOWN_LABEL.to_string(), similarity: 0., image_path: None }
    }

    pub fn error(err: anyhow::Error) -> Self {
        Self::Error { error: format!("{:#}", err) }
    }

    pub fn label(&self) -> Option<&str> {
        match self {
            Self::Match { label, .. } => Some(label.as_str()),
            Self::Error { .. } => None,
        }
    }

    pub fn similarity(&self) -> Option<f32> {
        match self {
            Self::Match { similarity, .. } => Some(*similarity),
            Self::Error { .. } => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }
}

/// 每个人物的平均向量
#[derive(Debug, Clone)]
pub struct Centroids {
    pub labels: Vec<String>,
    pub vectors: Array2<f32>,
}

impl FaceDB {
    pub fn table(&self) -> &str {
        &self.table
    }

    /// 计算人脸向量并重建向量表
    ///
    /// 没有生成任何向量时放弃写入，旧表保持不变。
    pub async fn index(&self, images: &LabeledImages, encoder: &FaceEncoder) -> Result<IndexReport> {
        let records = embed_all(images, encoder, self.progress);
        let skipped = images.len() - records.len();
        self.index_records(&records, skipped, encoder).await
    }

    /// 用已经计算好的人脸向量重建向量表
    pub async fn index_records(
        &self,
        records: &[FaceRecord],
        skipped: usize,
        encoder: &FaceEncoder,
    ) -> Result<IndexReport> {
        if records.is_empty() {
            warn!("没有生成任何人脸向量，放弃写入向量库");
            return Ok(IndexReport::Aborted { skipped });
        }

        let schema = TableSchema {
            name: self.table.clone(),
            dim: encoder.dim() as i64,
            embedder: encoder.embedder_name().to_string(),
            preprocess: encoder.preprocess_signature(),
        };
        self.replace_table(&schema, records).await?;
        info!("已写入 {} 条记录到表 {}，跳过 {} 张图片", records.len(), self.table, skipped);

        Ok(IndexReport::Indexed { records: records.len(), skipped })
    }

    /// 删除旧表、创建新表并写入全部记录，在同一个事务中完成
    pub async fn replace_table(&self, schema: &TableSchema, records: &[FaceRecord]) -> Result<()> {
        ensure!(schema.name == self.table, "表名不一致: {} != {}", schema.name, self.table);

        let mut tx = self.db.begin().await?;
        if crud::table_names(&mut *tx).await?.contains(&schema.name) {
            info!("删除已有的表 {}", schema.name);
        }
        crud::drop_table(&mut *tx, &schema.name).await?;
        crud::create_table(&mut *tx, schema).await?;
        for record in records {
            crud::add_record(&mut *tx, schema, record).await?;
        }
        tx.commit().await?;

        Ok(())
    }

    pub async fn schema(&self) -> Result<Option<TableSchema>> {
        crud::get_schema(&self.db, &self.table).await
    }

    /// 记录数量，表不存在时为 0
    pub async fn count(&self) -> Result<i64> {
        match self.schema().await? {
            Some(_) => crud::count_records(&self.db, &self.table).await,
            None => Ok(0),
        }
    }

    /// 每个人物的记录数量
    pub async fn label_counts(&self) -> Result<Vec<(String, i64)>> {
        match self.schema().await? {
            Some(_) => crud::count_by_label(&self.db, &self.table).await,
            None => Ok(vec![]),
        }
    }

    pub async fn records(&self) -> Result<Vec<FaceRecord>> {
        match self.schema().await? {
            Some(_) => crud::get_records(&self.db, &self.table).await,
            None => Ok(vec![]),
        }
    }

    /// 按余弦相似度搜索最近的 k 条记录，结果按相似度从高到低排列
    pub async fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        let Some(schema) = self.schema().await? else {
            debug!("表 {} 不存在", self.table);
            return Ok(vec![]);
        };
        ensure!(
            query.len() as i64 == schema.dim,
            "查询向量维度为 {}，表 {} 的维度为 {}",
            query.len(),
            schema.name,
            schema.dim
        );

        let records = crud::get_records(&self.db, &self.table).await?;
        if records.is_empty() || k == 0 {
            return Ok(vec![]);
        }

        let dim = schema.dim as usize;
        let flat = records.iter().flat_map(|r| r.embedding.iter().copied()).collect::<Vec<_>>();
        let matrix = Array2::from_shape_vec((records.len(), dim), flat)?;
        let scores = cosine_similarities(matrix.view(), ArrayView1::from(query));

        let mut order = (0..records.len()).collect::<Vec<_>>();
        order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));
        order.truncate(k);

        Ok(order
            .into_iter()
            .map(|i| Neighbor {
                label: records[i].label.clone(),
                similarity: scores[i],
                image_path: records[i].image_path.clone(),
            })
            .collect())
    }

    /// 识别图片文件中的人物
    pub async fn recognize_file(&self, path: impl AsRef<Path>, encoder: &FaceEncoder) -> Recognition {
        let path = path.as_ref();
        let result = match encoder.encode_file(path) {
            Ok(query) => self.try_recognize(&query, encoder).await,
            Err(e) => Err(e),
        };
        result.unwrap_or_else(|e| {
            error!("识别 {} 失败: {:#}", path.display(), e);
            Recognition::error(e)
        })
    }

    /// 识别内存中图片的人物
    pub async fn recognize_bytes(&self, bytes: &[u8], encoder: &FaceEncoder) -> Recognition {
        let result = match encoder.encode_bytes(bytes) {
            Ok(query) => self.try_recognize(&query, encoder).await,
            Err(e) => Err(e),
        };
        result.unwrap_or_else(|e| {
            error!("识别失败: {:#}", e);
            Recognition::error(e)
        })
    }

    async fn try_recognize(&self, query: &[f32], encoder: &FaceEncoder) -> Result<Recognition> {
        let Some(schema) = self.schema().await? else {
            return Ok(Recognition::unknown());
        };
        check_compatible(&schema, encoder)?;

        let Some(best) = self.search(query, 1).await?.into_iter().next() else {
            return Ok(Recognition::unknown());
        };
        debug!("最佳匹配: {} ({:.4}) {}", best.label, best.similarity, best.image_path);

        match self.threshold {
            Some(threshold) if best.similarity < threshold => Ok(Recognition::Match {
                label: UNKNOWN_LABEL.to_string(),
                similarity: best.similarity,
                image_path: None,
            }),
            _ => Ok(Recognition::Match {
                label: best.label,
                similarity: best.similarity,
                image_path: Some(best.image_path),
            }),
        }
    }

    /// 计算每个人物的平均向量，人物按首次出现的顺序排列
    pub async fn centroids(&self) -> Result<Centroids> {
        let schema = self.schema().await?.ok_or_else(|| anyhow!("表 {} 不存在", self.table))?;
        let records = crud::get_records(&self.db, &self.table).await?;

        let mut labels: Vec<String> = vec![];
        let mut groups: Vec<Vec<&[f32]>> = vec![];
        for record in &records {
            match labels.iter().position(|l| *l == record.label) {
                Some(i) => groups[i].push(record.embedding.as_slice()),
                None => {
                    labels.push(record.label.clone());
                    groups.push(vec![record.embedding.as_slice()]);
                }
            }
        }

        let dim = schema.dim as usize;
        let mut vectors = Array2::<f32>::zeros((0, dim));
        for group in &groups {
            let flat = group.iter().flat_map(|v| v.iter().copied()).collect::<Vec<_>>();
            let matrix = Array2::from_shape_vec((group.len(), dim), flat)?;
            let mean = matrix.mean_axis(Axis(0)).ok_or_else(|| anyhow!("空的人物分组"))?;
            vectors.push_row(mean.view())?;
        }

        Ok(Centroids { labels, vectors })
    }
}

/// 计算所有图片的人脸向量
///
/// 单张图片失败只会被记录并跳过，不会中断整个批次。
pub fn embed_all(images: &LabeledImages, encoder: &FaceEncoder, progress: bool) -> Vec<FaceRecord> {
    info!("正在计算 {} 张图片的人脸向量", images.len());
    let pb = ProgressBar::new(images.len() as u64).with_style(pb_style());
    if !progress {
        pb.set_draw_target(ProgressDrawTarget::hidden());
    }

    let mut records = Vec::with_capacity(images.len());
    for (path, label) in images.iter() {
        pb.set_message(path.display().to_string());
        match encoder.encode_file(path) {
            Ok(embedding) => records.push(FaceRecord {
                label: label.to_string(),
                embedding,
                image_path: path.to_string_lossy().into_owned(),
            }),
            Err(e) => {
                pb.suspend(|| warn!("处理图片失败 {} ({}): {:#}", path.display(), label, e));
            }
        }
        pb.inc(1);
    }
    pb.finish_and_clear();

    records
}

/// 检查查询使用的模型和预处理是否与建库时一致
fn check_compatible(schema: &TableSchema, encoder: &FaceEncoder) -> Result<()> {
    ensure!(
        schema.dim == encoder.dim() as i64,
        "向量维度不一致: 表 {} 为 {}，当前模型为 {}",
        schema.name,
        schema.dim,
        encoder.dim()
    );
    ensure!(
        schema.embedder == encoder.embedder_name(),
        "模型不一致: 表 {} 使用 {}，当前为 {}",
        schema.name,
        schema.embedder,
        encoder.embedder_name()
    );
    ensure!(
        schema.preprocess == encoder.preprocess_signature(),
        "预处理不一致: 表 {} 使用 {}，当前为 {}",
        schema.name,
        schema.preprocess,
        encoder.preprocess_signature()
    );
    Ok(())
}

/// 打开向量库并识别图片，打开失败同样转换为 [`Recognition::Error`]
///
/// 查询不会创建向量库，向量库不存在时视为空库。
pub async fn recognize(
    builder: FaceDBBuilder,
    image: impl AsRef<Path>,
    encoder: &FaceEncoder,
) -> Recognition {
    match builder.open_existing().await {
        Ok(Some(db)) => db.recognize_file(image, encoder).await,
        Ok(None) => match encoder.encode_file(image.as_ref()) {
            Ok(_) => Recognition::unknown(),
            Err(e) => {
                error!("识别 {} 失败: {:#}", image.as_ref().display(), e);
                Recognition::error(e)
            }
        },
        Err(e) => {
            error!("打开向量库失败: {:#}", e);
            Recognition::error(e)
        }
    }
}
