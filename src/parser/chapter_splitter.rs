use super::chapter_detector::detector;
use super::epub_parser::EpubSession;
use super::package::{resolve_href, strip_fragment};
use super::text::{count_words, html_to_text, truncate};
use super::{ChapterContent, ChapterStats, ChapterSummary, TocItem};
use crate::config::SplitOptions;
use crate::error::{EpubError, Result};

/// 按目录层级拆分章节
///
/// # 参数
/// - `session`: 已打开的 EPUB
/// - `toc`: `parse` 得到的目录
/// - `options`: 拆分层级、最大长度、部与文件的对应表
///
/// # 返回
/// 按目录顺序排列的章节，`index` 在全部收集完成后重新编号
pub fn split_chapters(
    session: &EpubSession,
    toc: &[TocItem],
    options: &SplitOptions,
) -> Result<Vec<ChapterContent>> {
    if toc.is_empty() {
        return Err(EpubError::MissingTableOfContents);
    }

    let mut chapters = Vec::new();
    for (position, item) in toc.iter().enumerate() {
        if item.level != options.level {
            continue;
        }

        match extract_entry(session, toc, position, options) {
            Ok(content) => {
                let content = match options.max_chapter_length {
                    Some(max) => truncate(&content, max),
                    None => content,
                };
                chapters.push(ChapterContent {
                    index: 0,
                    title: item.title.clone(),
                    word_count: count_words(&content),
                    content,
                    level: item.level,
                    href: item.href.clone(),
                });
            }
            Err(e) => log::warn!("跳过章节 \"{}\" ({}): {}", item.title, item.href, e),
        }
    }

    for (index, chapter) in chapters.iter_mut().enumerate() {
        chapter.index = index;
    }

    log::info!(
        "拆分完成：第 {} 层共 {} 个目录项，得到 {} 个章节",
        options.level,
        toc.iter().filter(|i| i.level == options.level).count(),
        chapters.len()
    );
    Ok(chapters)
}

/// 提取单个目录项的正文
fn extract_entry(
    session: &EpubSession,
    toc: &[TocItem],
    position: usize,
    options: &SplitOptions,
) -> Result<String> {
    let item = &toc[position];
    let path = entry_path(session, &item.href)?;
    let mut text = read_document_text(session, &path)?;

    if detector().is_part_title(&item.title) {
        let extra = part_documents(session, toc, position, &path, options);
        log::debug!("\"{}\" 按部合并 {} 个文件", item.title, extra.len());
        for extra_path in extra {
            match read_document_text(session, &extra_path) {
                Ok(more) if !more.is_empty() => {
                    if !text.is_empty() {
                        text.push_str("\n\n");
                    }
                    text.push_str(&more);
                }
                Ok(_) => {}
                Err(e) => log::warn!("部内文件读取失败: {}", e),
            }
        }
    }

    Ok(text)
}

fn entry_path(session: &EpubSession, href: &str) -> Result<String> {
    if strip_fragment(href).trim().is_empty() {
        return Err(EpubError::ExtractionFailed("目录项没有链接".to_string()));
    }
    Ok(resolve_href(&session.package_dir, href))
}

fn read_document_text(session: &EpubSession, path: &str) -> Result<String> {
    let html = session
        .archive
        .read_text(path)
        .ok_or_else(|| EpubError::ExtractionFailed(format!("文件不存在: {}", path)))?;
    Ok(html_to_text(&html))
}

/// “部”标题下需要追加的文件（压缩包内路径）
///
/// 调用方在 `part_files` 中声明了该标题时使用声明的文件；
/// 否则取 spine 中从该部文件之后，到下一个同级或更高级目录项所在文件之前的范围。
fn part_documents(
    session: &EpubSession,
    toc: &[TocItem],
    position: usize,
    part_path: &str,
    options: &SplitOptions,
) -> Vec<String> {
    let item = &toc[position];
    if let Some(files) = options.part_files.get(&item.title) {
        return files
            .iter()
            .map(|name| resolve_href(&session.package_dir, name))
            .filter(|path| path != part_path)
            .collect();
    }

    let spine: Vec<String> = session
        .package
        .spine_items()
        .map(|m| resolve_href(&session.package_dir, &m.href))
        .collect();
    let Some(start) = spine.iter().position(|p| p == part_path) else {
        return Vec::new();
    };

    let end = toc[position + 1..]
        .iter()
        .find(|next| next.level <= item.level)
        .and_then(|next| entry_path(session, &next.href).ok())
        .and_then(|next_path| spine.iter().position(|p| *p == next_path))
        .unwrap_or(spine.len());

    if end <= start + 1 {
        return Vec::new();
    }
    spine[start + 1..end].to_vec()
}

/// 章节统计
///
/// 最长、最短章节字数相同时取先出现的
pub fn chapter_stats(chapters: &[ChapterContent]) -> ChapterStats {
    if chapters.is_empty() {
        return ChapterStats::default();
    }

    let total_words: usize = chapters.iter().map(|c| c.word_count).sum();
    let average_words = (total_words as f64 / chapters.len() as f64).round() as usize;

    let mut longest = &chapters[0];
    let mut shortest = &chapters[0];
    for chapter in &chapters[1..] {
        if chapter.word_count > longest.word_count {
            longest = chapter;
        }
        if chapter.word_count < shortest.word_count {
            shortest = chapter;
        }
    }

    ChapterStats {
        total_chapters: chapters.len(),
        total_words,
        average_words,
        longest_chapter: Some(summary(longest)),
        shortest_chapter: Some(summary(shortest)),
    }
}

fn summary(chapter: &ChapterContent) -> ChapterSummary {
    ChapterSummary {
        index: chapter.index,
        title: chapter.title.clone(),
        word_count: chapter.word_count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::EpubArchive;
    use crate::parser::package::parse_package;
    use crate::parser::test_support::{opf, xhtml, EpubBuilder};

    fn toc_item(id: &str, title: &str, level: u32, href: &str, parent: Option<&str>) -> TocItem {
        TocItem {
            id: id.to_string(),
            title: title.to_string(),
            level,
            href: href.to_string(),
            parent_id: parent.map(str::to_string),
        }
    }

    fn chapter(index: usize, title: &str, word_count: usize) -> ChapterContent {
        ChapterContent {
            index,
            title: title.to_string(),
            content: String::new(),
            word_count,
            level: 1,
            href: String::new(),
        }
    }

    /// 一部两章的测试书：part1 只有一段引言，ch1 / ch2 在其后
    fn session() -> EpubSession {
        let manifest = r#"
            <item id="part1" href="text/part1.xhtml" media-type="application/xhtml+xml"/>
            <item id="ch1" href="text/ch1.xhtml" media-type="application/xhtml+xml"/>
            <item id="ch2" href="text/ch2.xhtml" media-type="application/xhtml+xml"/>
            <item id="after" href="text/after.xhtml" media-type="application/xhtml+xml"/>"#;
        let spine = r#"<spine><itemref idref="part1"/><itemref idref="ch1"/>
            <itemref idref="ch2"/><itemref idref="after"/></spine>"#;
        let opf_xml = opf("<dc:title>部</dc:title>", manifest, spine);
        let bytes = EpubBuilder::new()
            .text("OEBPS/text/part1.xhtml", &xhtml("第一部", "<p>引言</p>"))
            .text("OEBPS/text/ch1.xhtml", &xhtml("第一章", "<h1>第一章</h1><p>春天来了</p>"))
            .text("OEBPS/text/ch2.xhtml", &xhtml("第二章", "<h1>第二章</h1><p>hello world</p>"))
            .text("OEBPS/text/after.xhtml", &xhtml("后记", "<p>完</p>"))
            .build();

        EpubSession {
            archive: EpubArchive::from_bytes(bytes).unwrap(),
            package_path: "OEBPS/content.opf".to_string(),
            package_dir: "OEBPS".to_string(),
            package: parse_package(&opf_xml).unwrap(),
        }
    }

    fn toc() -> Vec<TocItem> {
        vec![
            toc_item("toc-1", "第一部 开端", 1, "text/part1.xhtml", None),
            toc_item("toc-2", "第一章", 2, "text/ch1.xhtml#top", Some("toc-1")),
            toc_item("toc-3", "第二章", 2, "text/ch2.xhtml", Some("toc-1")),
            toc_item("toc-4", "后记", 1, "text/after.xhtml", None),
        ]
    }

    #[test]
    fn test_empty_toc_fails() {
        let result = split_chapters(&session(), &[], &SplitOptions::default());
        assert!(matches!(result, Err(EpubError::MissingTableOfContents)));
    }

    #[test]
    fn test_level_without_entries_is_empty() {
        let chapters = split_chapters(&session(), &toc(), &SplitOptions::with_level(4)).unwrap();
        assert!(chapters.is_empty());
    }

    #[test]
    fn test_split_level_two() {
        let chapters = split_chapters(&session(), &toc(), &SplitOptions::with_level(2)).unwrap();
        assert_eq!(chapters.len(), 2);
        assert_eq!(chapters[0].title, "第一章");
        assert_eq!(chapters[0].content, "第一章\n\n春天来了");
        assert_eq!(chapters[0].word_count, 7);
        assert_eq!(chapters[0].level, 2);
        assert_eq!(chapters[1].index, 1);
        assert_eq!(chapters[1].word_count, 3 + 2);
    }

    #[test]
    fn test_part_aggregates_spine_range() {
        let chapters = split_chapters(&session(), &toc(), &SplitOptions::default()).unwrap();
        assert_eq!(chapters.len(), 2);
        assert_eq!(
            chapters[0].content,
            "引言\n\n第一章\n\n春天来了\n\n第二章\n\nhello world"
        );
        // 非“部”标题不合并
        assert_eq!(chapters[1].content, "完");
    }

    #[test]
    fn test_part_uses_declared_files() {
        let mut options = SplitOptions::default();
        options
            .part_files
            .insert("第一部 开端".to_string(), vec!["text/ch2.xhtml".to_string()]);
        let chapters = split_chapters(&session(), &toc(), &options).unwrap();
        assert_eq!(chapters[0].content, "引言\n\n第二章\n\nhello world");
    }

    #[test]
    fn test_failed_entry_is_skipped_and_reindexed() {
        let mut items = toc();
        items.insert(0, toc_item("toc-0", "序", 1, "text/missing.xhtml", None));
        items.insert(1, toc_item("toc-00", "空", 1, "", None));
        let chapters = split_chapters(&session(), &items, &SplitOptions::default()).unwrap();
        assert_eq!(chapters.len(), 2);
        assert_eq!(chapters[0].index, 0);
        assert_eq!(chapters[0].title, "第一部 开端");
        assert_eq!(chapters[1].index, 1);
    }

    #[test]
    fn test_max_chapter_length_truncates() {
        let options = SplitOptions {
            level: 2,
            max_chapter_length: Some(3),
            ..SplitOptions::default()
        };
        let chapters = split_chapters(&session(), &toc(), &options).unwrap();
        assert_eq!(chapters[0].content, "第一章...");
        assert_eq!(chapters[0].word_count, 3);
    }

    #[test]
    fn test_chapter_stats() {
        let chapters = vec![
            chapter(0, "一", 10),
            chapter(1, "二", 30),
            chapter(2, "三", 30),
            chapter(3, "四", 5),
            chapter(4, "五", 5),
        ];
        let stats = chapter_stats(&chapters);
        assert_eq!(stats.total_chapters, 5);
        assert_eq!(stats.total_words, 80);
        assert_eq!(stats.average_words, 16);
        assert_eq!(stats.longest_chapter.unwrap().title, "二");
        assert_eq!(stats.shortest_chapter.unwrap().title, "四");
    }

    #[test]
    fn test_chapter_stats_rounding_and_empty() {
        let stats = chapter_stats(&[chapter(0, "a", 1), chapter(1, "b", 2)]);
        assert_eq!(stats.average_words, 2);

        let empty = chapter_stats(&[]);
        assert_eq!(empty.total_chapters, 0);
        assert!(empty.longest_chapter.is_none());
    }
}
