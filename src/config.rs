use crate::archive::DEFAULT_MAX_UNPACKED_SIZE;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 默认封面最大边长（像素）
pub const DEFAULT_MAX_COVER_SIZE: u32 = 300;
/// 默认封面 JPEG 质量
pub const DEFAULT_IMAGE_QUALITY: u8 = 80;
/// 默认文件大小上限：100 MiB
pub const DEFAULT_MAX_FILE_SIZE: u64 = 100 * 1024 * 1024;

/// 解析器配置
///
/// 在构造 `EpubParser` 时一次性确定，之后作为显式参数传给各个解析组件。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ParserConfig {
    /// 是否提取封面
    pub extract_cover: bool,
    /// 是否提取目录
    pub extract_toc: bool,
    /// 封面最大边长（像素），等比缩放，不放大
    pub max_cover_size: u32,
    /// 封面重新编码质量（0-100）
    pub image_quality: u8,
    /// 允许的最大文件大小（字节）
    pub max_file_size: u64,
    /// 解压后所有条目的总大小上限（字节）
    pub max_unpacked_size: u64,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            extract_cover: true,
            extract_toc: true,
            max_cover_size: DEFAULT_MAX_COVER_SIZE,
            image_quality: DEFAULT_IMAGE_QUALITY,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            max_unpacked_size: DEFAULT_MAX_UNPACKED_SIZE,
        }
    }
}

impl ParserConfig {
    /// 从 JSON 字符串加载配置，缺省字段使用默认值
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let config: ParserConfig = serde_json::from_str(json)?;
        Ok(config.normalized())
    }

    /// 修正越界取值
    pub fn normalized(mut self) -> Self {
        self.image_quality = self.image_quality.clamp(1, 100);
        if self.max_cover_size == 0 {
            self.max_cover_size = DEFAULT_MAX_COVER_SIZE;
        }
        if self.max_file_size == 0 {
            self.max_file_size = DEFAULT_MAX_FILE_SIZE;
        }
        if self.max_unpacked_size == 0 {
            self.max_unpacked_size = DEFAULT_MAX_UNPACKED_SIZE;
        }
        self
    }
}

/// 章节拆分选项
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SplitOptions {
    /// 要拆分的目录层级（从 1 开始）
    pub level: u32,
    /// 单章最大字符数，超出部分截断
    pub max_chapter_length: Option<usize>,
    /// “部”标题到后续内容文件名的显式映射
    ///
    /// 键为目录标题，值为按顺序拼接的文件名（相对 OPF 目录）。
    /// 未声明的“部”标题按 spine 顺序推导范围。
    pub part_files: HashMap<String, Vec<String>>,
}

impl Default for SplitOptions {
    fn default() -> Self {
        Self {
            level: 1,
            max_chapter_length: None,
            part_files: HashMap::new(),
        }
    }
}

impl SplitOptions {
    pub fn with_level(level: u32) -> Self {
        Self {
            level,
            ..Self::default()
        }
    }
}
