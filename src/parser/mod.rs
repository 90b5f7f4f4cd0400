use serde::{Deserialize, Serialize};

// 子模块声明
pub mod package;
pub mod metadata;
pub mod cover;
pub mod toc;
pub mod text;
pub mod chapter_detector;
pub mod chapter_splitter;
pub mod epub_parser;

#[cfg(test)]
mod test_support;

/// 元数据缺失时使用的占位值
pub const UNKNOWN: &str = "未知";
pub const UNKNOWN_TITLE: &str = "未知书名";
pub const UNKNOWN_AUTHOR: &str = "未知作者";

/// 书籍信息
///
/// 所有字段总是有值：缺失时使用“未知”占位，译者缺失时为空字符串，
/// 保证下游拿到固定结构。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookInfo {
    pub title: String,
    pub author: String,
    pub translator: String,
    pub publisher: String,
    pub isbn: String,
    pub publication_date: String,
    pub language: String,
}

impl Default for BookInfo {
    fn default() -> Self {
        Self {
            title: UNKNOWN_TITLE.to_string(),
            author: UNKNOWN_AUTHOR.to_string(),
            translator: String::new(),
            publisher: UNKNOWN.to_string(),
            isbn: UNKNOWN.to_string(),
            publication_date: UNKNOWN.to_string(),
            language: UNKNOWN.to_string(),
        }
    }
}

/// 封面信息
///
/// 永远带有状态说明；`cover_image` 为空字符串表示没有可用封面。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoverInfo {
    /// `data:image/jpeg;base64,...` 或空字符串
    pub cover_image: String,
    /// 状态说明：成功、未找到、文件缺失、提取失败
    pub alt_text: String,
    /// 封面在压缩包内的实际路径
    pub source_path: Option<String>,
}

/// 目录项
///
/// 目录以扁平列表表示一片森林，按深度优先顺序排列；
/// `parent_id` 只是查找键，不是所有权指针。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TocItem {
    pub id: String,
    pub title: String,
    /// 层级，从 1 开始
    pub level: u32,
    /// 相对 OPF 目录的路径，可带 `#片段`
    pub href: String,
    pub parent_id: Option<String>,
}

/// 章节内容
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapterContent {
    /// 在最终输出列表中的位置，收集完成后统一编号
    pub index: usize,
    pub title: String,
    /// 规范化后的纯文本
    pub content: String,
    pub word_count: usize,
    /// 提取时使用的目录层级
    pub level: u32,
    pub href: String,
}

/// 章节摘要（用于统计中的最长/最短章节）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapterSummary {
    pub index: usize,
    pub title: String,
    pub word_count: usize,
}

/// 章节统计
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapterStats {
    pub total_chapters: usize,
    pub total_words: usize,
    pub average_words: usize,
    pub longest_chapter: Option<ChapterSummary>,
    pub shortest_chapter: Option<ChapterSummary>,
}

/// 解析结果
///
/// 无论成功与否都返回同一结构，失败时 `error` 给出原因，其他字段为默认值。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParseResult {
    pub success: bool,
    pub book_info: BookInfo,
    pub cover_info: Option<CoverInfo>,
    pub table_of_contents: Vec<TocItem>,
    pub error: Option<String>,
}

impl ParseResult {
    /// 构造失败结果
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            book_info: BookInfo::default(),
            cover_info: None,
            table_of_contents: Vec::new(),
            error: Some(message.into()),
        }
    }
}
