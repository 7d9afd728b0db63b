use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use log::{info, warn};

use crate::cli::SubCommandExtend;
use crate::config::{EmbedOptions, Opts, PreprocessOptions, build_encoder};
use crate::facedb::{self, FaceDBBuilder, IndexReport};
use crate::persona::{DEFAULT_SUFFIX, PersonaLoader};

#[derive(Parser, Debug, Clone)]
pub struct IndexCommand {
    #[command(flatten)]
    pub preprocess: PreprocessOptions,
    #[command(flatten)]
    pub embed: EmbedOptions,
    /// 人物清单文件（JSON）
    pub manifest: PathBuf,
    /// 图片目录的基准路径，默认为清单文件所在目录
    #[arg(short, long, value_name = "DIR")]
    pub base_dir: Option<PathBuf>,
    /// 扫描的文件后缀名，多个后缀用逗号分隔
    #[arg(long, default_value = DEFAULT_SUFFIX)]
    pub suffix: String,
}

impl SubCommandExtend for IndexCommand {
    async fn run(&self, opts: &Opts) -> Result<()> {
        let encoder = build_encoder(&self.preprocess, &self.embed)?;

        let mut loader = PersonaLoader::new().suffix(&self.suffix);
        if let Some(base_dir) = &self.base_dir {
            loader = loader.base_dir(base_dir);
        }

        info!("正在读取人物清单: {}", self.manifest.display());
        let images = loader.load(&self.manifest);
        if images.is_empty() {
            warn!("没有找到任何图片，请检查人物清单和图片目录");
            return Ok(());
        }

        let records = facedb::embed_all(&images, &encoder, true);
        let skipped = images.len() - records.len();
        if records.is_empty() {
            warn!("{} 张图片均处理失败，向量库未被修改", skipped);
            return Ok(());
        }

        let db = FaceDBBuilder::new(opts.store.clone()).table(&opts.table).open().await?;

        match db.index_records(&records, skipped, &encoder).await? {
            IndexReport::Aborted { skipped } => {
                warn!("{} 张图片均处理失败，向量库未被修改", skipped);
            }
            IndexReport::Indexed { records, skipped } => {
                info!("建库完成: {} 条记录，跳过 {} 张图片", records, skipped);
            }
        }

        Ok(())
    }
}
