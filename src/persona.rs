use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, ensure};
use log::{debug, info, warn};
use regex::Regex;
use serde::Deserialize;
use walkdir::WalkDir;

/// 默认允许的图片后缀
pub const DEFAULT_SUFFIX: &str = "png,jpg,jpeg";

/// 人物清单文件
#[derive(Debug, Default, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub personas: Vec<Persona>,
}

/// 人物及其图片目录
#[derive(Debug, Clone, Deserialize)]
pub struct Persona {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub images_folder: Option<String>,
}

/// 两个等长的并列序列：图片路径和对应的人物名
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LabeledImages {
    pub paths: Vec<PathBuf>,
    pub labels: Vec<String>,
}

impl LabeledImages {
    pub fn push(&mut self, path: PathBuf, label: impl Into<String>) {
        self.paths.push(path);
        self.labels.push(label.into());
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Path, &str)> {
        self.paths.iter().map(PathBuf::as_path).zip(self.labels.iter().map(String::as_str))
    }
}

/// 读取人物清单，列出每个人物目录下的图片
#[derive(Debug, Clone)]
pub struct PersonaLoader {
    base_dir: Option<PathBuf>,
    re_suf: Regex,
}

impl Default for PersonaLoader {
    fn default() -> Self {
        Self { base_dir: None, re_suf: suffix_regex(DEFAULT_SUFFIX) }
    }
}

impl PersonaLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// 图片目录的基准路径，默认为清单文件所在目录
    pub fn base_dir(mut self, base_dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(base_dir.into());
        self
    }

    /// 允许的图片后缀，多个后缀用逗号分隔
    pub fn suffix(mut self, suffix: &str) -> Self {
        self.re_suf = suffix_regex(suffix);
        self
    }

    /// 读取清单文件并列出所有图片
    ///
    /// 清单不存在或无法解析时返回空结果，调用方需要自行检查是否为空。
    pub fn load(&self, manifest: impl AsRef<Path>) -> LabeledImages {
        let manifest = manifest.as_ref();
        let data = match read_manifest(manifest) {
            Ok(data) => data,
            Err(e) => {
                warn!("读取人物清单失败: {:#}", e);
                return LabeledImages::default();
            }
        };

        let base_dir = match &self.base_dir {
            Some(dir) => dir.clone(),
            None => manifest.parent().map(Path::to_path_buf).unwrap_or_default(),
        };

        let mut result = LabeledImages::default();
        for persona in &data.personas {
            let Some(name) = persona.name.as_deref().filter(|s| !s.is_empty()) else {
                warn!("人物缺少 name 字段，跳过: {:?}", persona);
                continue;
            };
            let Some(folder) = persona.images_folder.as_deref().filter(|s| !s.is_empty()) else {
                warn!("人物 '{}' 未指定 images_folder，跳过", name);
                continue;
            };

            let folder = base_dir.join(folder);
            if !folder.exists() {
                warn!("人物 '{}' 的图片目录 '{}' 不存在，跳过", name, folder.display());
                continue;
            }

            match self.scan_folder(&folder) {
                Ok(images) => {
                    debug!("人物 '{}': {} 张图片", name, images.len());
                    for path in images {
                        result.push(path, name);
                    }
                }
                Err(e) => {
                    warn!("无法处理人物 '{}' 的图片目录 '{}': {:#}", name, folder.display(), e);
                }
            }
        }

        info!("共找到 {} 张图片", result.len());
        result
    }

    /// 列出目录下符合后缀的文件，不递归，按文件名排序
    fn scan_folder(&self, folder: &Path) -> Result<Vec<PathBuf>> {
        ensure!(folder.is_dir(), "不是目录");
        let mut images = vec![];
        for entry in WalkDir::new(folder)
            .min_depth(1)
            .max_depth(1)
            .follow_links(true)
            .sort_by_file_name()
        {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            if let Some(ext) = path.extension() {
                if self.re_suf.is_match(&ext.to_string_lossy()) {
                    images.push(path.to_path_buf());
                }
            }
        }
        Ok(images)
    }
}

fn read_manifest(path: &Path) -> Result<Manifest> {
    let content =
        fs::read_to_string(path).with_context(|| format!("无法读取 '{}'", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("无法解析 '{}'", path.display()))
}

fn suffix_regex(suffix: &str) -> Regex {
    let alternatives = suffix
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| regex::escape(s.trim_start_matches('.')))
        .collect::<Vec<_>>()
        .join("|");
    // 所有后缀都经过转义，拼接结果总是合法的正则表达式
    Regex::new(&format!("(?i)^(?:{})$", alternatives)).expect("failed to build regex")
}
