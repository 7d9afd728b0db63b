use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, ValueEnum};

use crate::cli::SubCommandExtend;
use crate::config::{EmbedOptions, Opts, PreprocessOptions, build_encoder};
use crate::facedb::{self, FaceDBBuilder, Recognition};

#[derive(Parser, Debug, Clone)]
pub struct RecognizeCommand {
    #[command(flatten)]
    pub preprocess: PreprocessOptions,
    #[command(flatten)]
    pub embed: EmbedOptions,
    /// 被识别的图片路径
    pub image: PathBuf,
    /// 最低相似度，低于该值时输出 Unknown
    #[arg(long, value_name = "SIMILARITY")]
    pub threshold: Option<f32>,
    /// 输出格式
    #[arg(long, value_name = "FORMAT", value_enum, default_value_t = OutputFormat::Json)]
    pub output_format: OutputFormat,
}

impl SubCommandExtend for RecognizeCommand {
    async fn run(&self, opts: &Opts) -> Result<()> {
        let encoder = build_encoder(&self.preprocess, &self.embed)?;
        let builder =
            FaceDBBuilder::new(opts.store.clone()).table(&opts.table).threshold(self.threshold);

        let result = facedb::recognize(builder, &self.image, &encoder).await;

        print_result(&result, self.output_format)
    }
}

fn print_result(result: &Recognition, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(result)?)
        }
        OutputFormat::Table => match result {
            Recognition::Match { label, similarity, image_path } => {
                println!("{:.4}\t{}\t{}", similarity, label, image_path.as_deref().unwrap_or("-"))
            }
            Recognition::Error { error } => println!("error\t{}", error),
        },
    }
    Ok(())
}

#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum OutputFormat {
    Json,
    Table,
}
