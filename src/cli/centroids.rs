use std::fs;
use std::path::PathBuf;

use anyhow::{Result, anyhow};
use clap::Parser;
use log::info;
use ndarray_npy::write_npy;

use crate::cli::SubCommandExtend;
use crate::config::Opts;
use crate::facedb::FaceDBBuilder;

#[derive(Parser, Debug, Clone)]
pub struct CentroidsCommand {
    /// 输出文件，人物名列表会写入同名的 .json 文件
    #[arg(short, long, default_value = "centroids.npy")]
    pub output: PathBuf,
}

impl SubCommandExtend for CentroidsCommand {
    async fn run(&self, opts: &Opts) -> Result<()> {
        let db = FaceDBBuilder::new(opts.store.clone())
            .table(&opts.table)
            .open_existing()
            .await?
            .ok_or_else(|| anyhow!("向量库 {} 不存在", opts.store.path().display()))?;
        let centroids = db.centroids().await?;

        write_npy(&self.output, &centroids.vectors)?;
        let labels_file = self.output.with_extension("json");
        fs::write(&labels_file, serde_json::to_string_pretty(&centroids.labels)?)?;

        info!(
            "已导出 {} 个人物的平均向量到 {} 和 {}",
            centroids.labels.len(),
            self.output.display(),
            labels_file.display()
        );
        Ok(())
    }
}
