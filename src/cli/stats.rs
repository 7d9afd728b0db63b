use anyhow::Result;
use clap::Parser;

use crate::cli::SubCommandExtend;
use crate::config::Opts;
use crate::facedb::FaceDBBuilder;

#[derive(Parser, Debug, Clone)]
pub struct StatsCommand {}

impl SubCommandExtend for StatsCommand {
    async fn run(&self, opts: &Opts) -> Result<()> {
        let builder = FaceDBBuilder::new(opts.store.clone()).table(&opts.table);
        let Some(db) = builder.open_existing().await? else {
            println!("向量库 {} 不存在", opts.store.path().display());
            return Ok(());
        };

        let Some(schema) = db.schema().await? else {
            println!("表 {} 不存在", db.table());
            return Ok(());
        };

        println!("表名      : {}", schema.name);
        println!("向量维度  : {}", schema.dim);
        println!("模型      : {}", schema.embedder);
        println!("预处理    : {}", schema.preprocess);
        println!("记录数量  : {}", db.count().await?);
        for (label, count) in db.label_counts().await? {
            println!("{}\t{}", count, label);
        }

        Ok(())
    }
}
