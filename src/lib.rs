//! EPUB 结构解析：书籍信息、封面、目录与章节正文
//!
//! 入口是 [`EpubParser`]：`parse` 得到书籍信息、封面和目录，
//! `split_chapters` 按目录层级拆出纯文本章节，`chapter_stats` 汇总字数。

pub mod archive;
pub mod config;
pub mod error;
pub mod parser;

pub use archive::EpubArchive;
pub use config::{ParserConfig, SplitOptions};
pub use error::{EpubError, Result};
pub use parser::chapter_splitter::chapter_stats;
pub use parser::epub_parser::{EpubParser, EpubSession};
pub use parser::{
    BookInfo, ChapterContent, ChapterStats, ChapterSummary, CoverInfo, ParseResult, TocItem,
};
