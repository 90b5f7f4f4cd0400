use regex::Regex;
use std::sync::LazyLock;

/// 截断后追加的标记
pub const ELLIPSIS: &str = "...";

static RE_COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").expect("valid comment regex"));
static RE_HEAD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<head\b[^>]*>.*?</head\s*>").expect("valid head regex"));
static RE_SCRIPT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<script\b[^>]*>.*?</script\s*>").expect("valid script regex"));
static RE_STYLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<style\b[^>]*>.*?</style\s*>").expect("valid style regex"));
static RE_BLOCK_END: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)</\s*(p|div|h[1-6]|li|tr|blockquote|section|article|pre|dd|dt|table|ul|ol)\s*>")
        .expect("valid block regex")
});
static RE_BR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<br\s*/?\s*>").expect("valid br regex"));
static RE_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]*>").expect("valid tag regex"));
static RE_INLINE_SPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\S\n]+").expect("valid whitespace regex"));
static RE_ASCII_WORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[A-Za-z0-9]+(?:['\-][A-Za-z0-9]+)*").expect("valid word regex")
});

/// 将 XHTML 转换为纯文本
///
/// 1. 删除注释、`<head>`、`<script>`、`<style>` 及其内容
/// 2. 块级结束标签和 `<br>` 转为换行
/// 3. 删除其余标签，解码 HTML 实体
/// 4. 合并空白，段落之间保留一个空行
pub fn html_to_text(html: &str) -> String {
    let text = RE_COMMENT.replace_all(html, "");
    let text = RE_HEAD.replace_all(&text, "");
    let text = RE_SCRIPT.replace_all(&text, "");
    let text = RE_STYLE.replace_all(&text, "");
    let text = RE_BLOCK_END.replace_all(&text, "\n");
    let text = RE_BR.replace_all(&text, "\n");
    let text = RE_TAG.replace_all(&text, "");
    let text = html_escape::decode_html_entities(&text);
    let text = text.replace("\r\n", "\n").replace('\r', "\n");
    let text = RE_INLINE_SPACE.replace_all(&text, " ");

    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// 按字符数截断，超出时追加省略标记
pub fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => format!("{}{}", &text[..byte_index], ELLIPSIS),
        None => text.to_string(),
    }
}

/// 统计字数：CJK 汉字个数 + 独立的 ASCII 单词个数
pub fn count_words(text: &str) -> usize {
    let cjk = text.chars().filter(|&c| is_cjk(c)).count();
    let words = RE_ASCII_WORD.find_iter(text).count();
    cjk + words
}

fn is_cjk(c: char) -> bool {
    matches!(
        c,
        '\u{4E00}'..='\u{9FFF}'
            | '\u{3400}'..='\u{4DBF}'
            | '\u{F900}'..='\u{FAFF}'
            | '\u{20000}'..='\u{2A6DF}'
    )
}
