use regex::Regex;
use std::sync::LazyLock;

static DETECTOR: LazyLock<ChapterDetector> = LazyLock::new(ChapterDetector::new);

/// 共享的检测器实例
pub fn detector() -> &'static ChapterDetector {
    &DETECTOR
}

/// 章节标题检测器
///
/// 基于正则表达式判断一段文本：
/// 1. 是否像章节入口（用于 HTML 目录扫描时过滤无关链接）
/// 2. 是否是“部/卷/篇”这类包含多个章节的标题（用于合并拆分）
pub struct ChapterDetector {
    /// 章节标记（不要求出现在开头）
    chapter_patterns: Vec<Regex>,
    /// “部”标题匹配模式
    part_patterns: Vec<Regex>,
}

impl ChapterDetector {
    /// 创建新的章节检测器实例
    pub fn new() -> Self {
        let chapter_patterns = [
            // 中文章节标记
            r"第\s*[零〇一二三四五六七八九十百千万两\d]+\s*[章节回卷部篇集]",
            r"(序言|序章|楔子|前言|引言|后记|尾声|附录|番外)",
            // 英文章节标记
            r"(?i)\b(chapter|section|part|book|prologue|epilogue|preface|appendix)\b",
        ];

        let part_patterns = [
            r"^第\s*[零〇一二三四五六七八九十百千万两\d]+\s*(部分|部|卷|篇)",
            r"^卷\s*[零〇一二三四五六七八九十百千万两\d]+",
            r"^(?i)(part|book)\s+([IVXLCDM]+|\d+|one|two|three|four|five|six|seven|eight|nine|ten)\b",
        ];

        Self {
            chapter_patterns: compile(&chapter_patterns),
            part_patterns: compile(&part_patterns),
        }
    }

    /// 判断链接文字是否像章节入口
    ///
    /// 包含章节标记，或包含数字
    pub fn looks_like_chapter(&self, text: &str) -> bool {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return false;
        }
        trimmed.chars().any(|c| c.is_ascii_digit())
            || self.chapter_patterns.iter().any(|p| p.is_match(trimmed))
    }

    /// 判断标题是否表示“部”（一个目录项下合并了多个章节）
    pub fn is_part_title(&self, title: &str) -> bool {
        let trimmed = title.trim();
        self.part_patterns.iter().any(|p| p.is_match(trimmed))
    }
}

impl Default for ChapterDetector {
    fn default() -> Self {
        Self::new()
    }
}

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| Regex::new(p).expect("valid chapter pattern"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chinese_chapter_titles() {
        let detector = ChapterDetector::new();
        assert!(detector.looks_like_chapter("第一章 开始"));
        assert!(detector.looks_like_chapter("第12回 风起"));
        assert!(detector.looks_like_chapter("序言"));
        assert!(detector.looks_like_chapter("后记"));
    }

    #[test]
    fn test_english_and_numeric_titles() {
        let detector = ChapterDetector::new();
        assert!(detector.looks_like_chapter("Chapter One"));
        assert!(detector.looks_like_chapter("PROLOGUE"));
        assert!(detector.looks_like_chapter("3. The Road"));
    }

    #[test]
    fn test_incidental_links_rejected() {
        let detector = ChapterDetector::new();
        assert!(!detector.looks_like_chapter("返回首页"));
        assert!(!detector.looks_like_chapter("Copyright"));
        assert!(!detector.looks_like_chapter("   "));
        assert!(!detector.looks_like_chapter("Chapterhouse"));
    }

    #[test]
    fn test_part_titles() {
        let detector = ChapterDetector::new();
        assert!(detector.is_part_title("第一部分 童年"));
        assert!(detector.is_part_title("第二部 远方"));
        assert!(detector.is_part_title("第三卷"));
        assert!(detector.is_part_title("卷一 风"));
        assert!(detector.is_part_title("Part II"));
        assert!(detector.is_part_title("Book 3: Return"));
        assert!(!detector.is_part_title("第一章 开始"));
        assert!(!detector.is_part_title("Partial Results"));
    }

    #[test]
    fn test_shared_detector() {
        assert!(detector().is_part_title("第一部分"));
    }
}
