use std::convert::Infallible;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::LazyLock;

use clap::{Parser, Subcommand, ValueEnum};
use directories::ProjectDirs;
use image::imageops::FilterType;

use crate::cli::*;
use crate::embed::PoolingEmbedder;
use crate::encoder::FaceEncoder;
use crate::preprocess::Preprocessor;

/// 默认的人脸向量表名
pub const DEFAULT_TABLE: &str = "faces";

static STORE_DIR: LazyLock<String> = LazyLock::new(|| {
    ProjectDirs::from("", "", "facechat")
        .map(|dirs| dirs.data_dir().join("store"))
        .unwrap_or_else(|| PathBuf::from("store"))
        .to_string_lossy()
        .into_owned()
});

fn default_store_dir() -> &'static str {
    STORE_DIR.as_str()
}

#[derive(Parser, Debug, Clone)]
pub struct PreprocessOptions {
    /// 模型输入尺寸，图片会被缩放为 SIZExSIZE
    #[arg(long, value_name = "SIZE", default_value_t = 160)]
    pub input_size: u32,
    /// 归一化均值，三个通道共用
    #[arg(long, value_name = "MEAN", default_value_t = 0.5)]
    pub mean: f32,
    /// 归一化标准差，三个通道共用
    #[arg(long, value_name = "STD", default_value_t = 0.5)]
    pub std: f32,
    /// 缩放插值方式
    #[arg(long, value_name = "FILTER", default_value_t = Filter::Triangle, value_enum)]
    pub filter: Filter,
}

impl From<&PreprocessOptions> for Preprocessor {
    fn from(opts: &PreprocessOptions) -> Self {
        Preprocessor {
            size: opts.input_size,
            mean: [opts.mean; 3],
            std: [opts.std; 3],
            filter: opts.filter.into(),
        }
    }
}

#[derive(Parser, Debug, Clone)]
pub struct EmbedOptions {
    /// 池化网格边长，向量维度为 3 * GRID * GRID
    #[arg(long, value_name = "GRID", default_value_t = 8)]
    pub grid: usize,
}

/// 由命令行参数构建编码器
pub fn build_encoder(pre: &PreprocessOptions, embed: &EmbedOptions) -> anyhow::Result<FaceEncoder> {
    FaceEncoder::new(Preprocessor::from(pre), Box::new(PoolingEmbedder::new(embed.grid)))
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Filter {
    Nearest,
    Triangle,
    CatmullRom,
    Gaussian,
    Lanczos3,
}

impl From<Filter> for FilterType {
    fn from(filter: Filter) -> Self {
        match filter {
            Filter::Nearest => FilterType::Nearest,
            Filter::Triangle => FilterType::Triangle,
            Filter::CatmullRom => FilterType::CatmullRom,
            Filter::Gaussian => FilterType::Gaussian,
            Filter::Lanczos3 => FilterType::Lanczos3,
        }
    }
}

#[derive(Parser, Debug, Clone)]
#[command(name = "facechat", version)]
pub struct Opts {
    #[command(subcommand)]
    pub subcmd: SubCommand,
    /// 向量库目录
    #[arg(short, long, default_value = default_store_dir())]
    pub store: StoreDir,
    /// 人脸向量表名
    #[arg(short, long, default_value = DEFAULT_TABLE)]
    pub table: String,
}

#[derive(Subcommand, Debug, Clone)]
pub enum SubCommand {
    /// 根据人物清单计算人脸向量并重建向量表
    Index(IndexCommand),
    /// 识别一张图片中的人物
    Recognize(RecognizeCommand),
    /// 显示向量表的统计信息
    Stats(StatsCommand),
    /// 导出每个人物的平均向量
    Centroids(CentroidsCommand),
}

#[derive(Debug, Clone)]
pub struct StoreDir {
    path: PathBuf,
}

impl StoreDir {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    /// 返回数据库文件的路径
    pub fn database(&self) -> PathBuf {
        self.path.join("faces.db")
    }
}

impl FromStr for StoreDir {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_index_command() {
        let opts = Opts::parse_from([
            "facechat",
            "-s",
            "/tmp/store",
            "index",
            "personas.json",
            "--filter",
            "lanczos3",
            "--grid",
            "4",
        ]);
        assert_eq!(opts.store.database(), PathBuf::from("/tmp/store/faces.db"));
        assert_eq!(opts.table, DEFAULT_TABLE);
        let SubCommand::Index(cmd) = opts.subcmd else {
            panic!("expected index command");
        };
        assert_eq!(cmd.manifest, PathBuf::from("personas.json"));
        assert_eq!(cmd.preprocess.filter, Filter::Lanczos3);
        assert_eq!(cmd.preprocess.input_size, 160);
        assert_eq!(cmd.embed.grid, 4);
        assert_eq!(cmd.suffix, "png,jpg,jpeg");
    }

    #[test]
    fn test_preprocessor_from_options() {
        let opts = Opts::parse_from(["facechat", "recognize", "a.jpg", "--mean", "0.4"]);
        let SubCommand::Recognize(cmd) = opts.subcmd else {
            panic!("expected recognize command");
        };
        let pre = Preprocessor::from(&cmd.preprocess);
        assert_eq!(pre.mean, [0.4; 3]);
        assert_eq!(pre.std, [0.5; 3]);
        assert_eq!(pre.filter, FilterType::Triangle);
    }
}
