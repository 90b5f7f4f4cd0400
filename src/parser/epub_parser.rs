use super::chapter_splitter;
use super::cover::{resolve_cover, CoverContext};
use super::metadata::extract_book_info;
use super::package::{load_package, package_dir, resolve_package_path, PackageDocument};
use super::toc::{resolve_toc, TocContext};
use super::{BookInfo, ChapterContent, ChapterStats, CoverInfo, ParseResult, TocItem};
use crate::archive::EpubArchive;
use crate::config::{ParserConfig, SplitOptions};
use crate::error::{EpubError, Result};
use std::fs;
use std::path::Path;

/// 支持的文件扩展名
pub const EPUB_EXTENSION: &str = "epub";

/// EPUB 解析器
///
/// 配置在构造时确定，之后每次 `parse` / `split_chapters` 都独立打开压缩包，
/// 调用结束即释放。
#[derive(Debug, Clone, Default)]
pub struct EpubParser {
    config: ParserConfig,
}

impl EpubParser {
    /// 创建新的 EPUB 解析器实例
    pub fn new(config: ParserConfig) -> Self {
        Self {
            config: config.normalized(),
        }
    }

    pub fn config(&self) -> &ParserConfig {
        &self.config
    }

    /// 预检：文件存在、扩展名、大小、压缩包结构、mimetype、container.xml
    ///
    /// # 返回
    /// 通过预检的压缩包
    pub fn check(&self, path: &Path) -> Result<EpubArchive> {
        self.preflight(path).map(|(archive, _)| archive)
    }

    /// 预检并返回是否有效，失败原因写入日志
    pub fn validate(&self, path: &Path) -> bool {
        match self.preflight(path) {
            Ok(_) => true,
            Err(e) => {
                log::warn!("EPUB 校验失败 {}: {}", path.display(), e);
                false
            }
        }
    }

    /// 打开 EPUB 并解析 OPF
    pub fn open(&self, path: &Path) -> Result<EpubSession> {
        let (archive, package_path) = self.preflight(path)?;
        let package = load_package(&archive, &package_path)?;
        log::debug!(
            "打开 {}: OPF={} manifest={} spine={}",
            path.display(),
            package_path,
            package.manifest.len(),
            package.spine.len()
        );

        Ok(EpubSession {
            archive,
            package_dir: package_dir(&package_path),
            package_path,
            package,
        })
    }

    /// 解析书籍信息、封面和目录
    ///
    /// 不会返回 Err：结构性错误体现在 `success = false` 和 `error` 中，
    /// 封面和目录的局部问题已在各自组件中降级。
    pub fn parse(&self, path: &Path) -> ParseResult {
        let session = match self.open(path) {
            Ok(session) => session,
            Err(e) => {
                log::error!("EPUB 解析失败 {}: {}", path.display(), e);
                return ParseResult::failure(e.to_string());
            }
        };

        let book_info = session.book_info();
        let cover_info = self
            .config
            .extract_cover
            .then(|| session.cover(&self.config));
        let table_of_contents = if self.config.extract_toc {
            session.table_of_contents()
        } else {
            Vec::new()
        };
        session.close();

        log::info!(
            "解析完成: 《{}》 {}，目录 {} 项",
            book_info.title,
            book_info.author,
            table_of_contents.len()
        );

        ParseResult {
            success: true,
            book_info,
            cover_info,
            table_of_contents,
            error: None,
        }
    }

    /// 按目录拆分章节（目录通常来自 `parse`）
    pub fn split_chapters(
        &self,
        path: &Path,
        toc: &[TocItem],
        options: &SplitOptions,
    ) -> Result<Vec<ChapterContent>> {
        if toc.is_empty() {
            return Err(EpubError::MissingTableOfContents);
        }
        let session = self.open(path)?;
        let chapters = session.split_chapters(toc, options);
        session.close();
        chapters
    }

    /// 章节统计
    pub fn chapter_stats(&self, chapters: &[ChapterContent]) -> ChapterStats {
        chapter_splitter::chapter_stats(chapters)
    }

    fn preflight(&self, path: &Path) -> Result<(EpubArchive, String)> {
        if !path.is_file() {
            return Err(EpubError::FileNotFound(path.display().to_string()));
        }

        let is_epub = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case(EPUB_EXTENSION));
        if !is_epub {
            return Err(EpubError::InvalidExtension(path.display().to_string()));
        }

        let size = fs::metadata(path)?.len();
        if size == 0 {
            return Err(EpubError::EmptyFile);
        }
        if size > self.config.max_file_size {
            return Err(EpubError::FileTooLarge {
                size,
                max: self.config.max_file_size,
            });
        }

        let archive = EpubArchive::open_with_limit(path, self.config.max_unpacked_size)?;
        let package_path = resolve_package_path(&archive)?;
        Ok((archive, package_path))
    }
}

/// 已打开的 EPUB
///
/// 独占持有压缩包；同一会话不支持并发使用。用完调用 `close`（或直接丢弃）释放。
#[derive(Debug)]
pub struct EpubSession {
    pub archive: EpubArchive,
    /// OPF 在压缩包内的路径
    pub package_path: String,
    /// OPF 所在目录，所有 manifest href 都相对于它
    pub package_dir: String,
    pub package: PackageDocument,
}

impl EpubSession {
    pub fn book_info(&self) -> BookInfo {
        extract_book_info(&self.package.metadata)
    }

    pub fn cover(&self, config: &ParserConfig) -> CoverInfo {
        let ctx = CoverContext {
            archive: &self.archive,
            package: &self.package,
            package_dir: &self.package_dir,
        };
        resolve_cover(&ctx, config)
    }

    pub fn table_of_contents(&self) -> Vec<TocItem> {
        let ctx = TocContext {
            archive: &self.archive,
            package: &self.package,
            package_dir: &self.package_dir,
        };
        resolve_toc(&ctx)
    }

    pub fn split_chapters(&self, toc: &[TocItem], options: &SplitOptions) -> Result<Vec<ChapterContent>> {
        chapter_splitter::split_chapters(self, toc, options)
    }

    /// 释放压缩包
    pub fn close(self) {
        log::debug!("关闭 EPUB: {}", self.package_path);
    }
}
