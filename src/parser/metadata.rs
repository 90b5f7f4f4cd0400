use super::package::{MetadataEntry, PackageMetadata};
use super::{BookInfo, UNKNOWN, UNKNOWN_AUTHOR, UNKNOWN_TITLE};

/// 译者角色的取值（MARC relator 代码与全称）
const TRANSLATOR_ROLES: [&str; 2] = ["trl", "translator"];

/// 从 OPF 元数据提取书籍信息
///
/// 该函数不会失败：缺失字段使用占位值，重复元素取第一个。
pub fn extract_book_info(metadata: &PackageMetadata) -> BookInfo {
    let text_or = |name: &str, fallback: &str| {
        metadata
            .first_text(name)
            .map(str::to_string)
            .unwrap_or_else(|| fallback.to_string())
    };

    BookInfo {
        title: text_or("title", UNKNOWN_TITLE),
        author: text_or("creator", UNKNOWN_AUTHOR),
        translator: find_translator(metadata).unwrap_or_default(),
        publisher: text_or("publisher", UNKNOWN),
        isbn: text_or("identifier", UNKNOWN),
        publication_date: text_or("date", UNKNOWN),
        language: text_or("language", UNKNOWN),
    }
}

/// 查找译者
///
/// 先看 contributor 的 role 属性（`role`、`opf:role` 等写法都接受），
/// 再看 EPUB3 的 `<meta refines="#id" property="role">trl</meta>`，
/// 最后兼容把译者写成 creator 的书。
fn find_translator(metadata: &PackageMetadata) -> Option<String> {
    let by_attribute = |name: &str| {
        metadata
            .all(name)
            .find(|entry| entry.attr_local("role").is_some_and(is_translator_role))
            .and_then(non_empty_text)
    };

    by_attribute("contributor")
        .or_else(|| find_refined_translator(metadata, "contributor"))
        .or_else(|| by_attribute("creator"))
        .or_else(|| find_refined_translator(metadata, "creator"))
}

fn find_refined_translator(metadata: &PackageMetadata, name: &str) -> Option<String> {
    metadata
        .all("meta")
        .filter(|meta| meta.attr("property") == Some("role") && is_translator_role(&meta.text))
        .filter_map(|meta| meta.attr("refines"))
        .find_map(|refines| {
            let id = refines.trim_start_matches('#');
            metadata
                .all(name)
                .find(|entry| entry.attr("id") == Some(id))
                .and_then(non_empty_text)
        })
}

fn is_translator_role(role: &str) -> bool {
    let role = role.trim();
    TRANSLATOR_ROLES.iter().any(|r| role.eq_ignore_ascii_case(r))
}

fn non_empty_text(entry: &MetadataEntry) -> Option<String> {
    let text = entry.text.trim();
    (!text.is_empty()).then(|| text.to_string())
}
