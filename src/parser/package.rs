use crate::archive::EpubArchive;
use crate::error::{EpubError, Result};
use percent_encoding::percent_decode_str;
use quick_xml::events::attributes::Attribute;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde::{Deserialize, Serialize};

/// mimetype 条目的唯一合法内容
pub const EPUB_MIMETYPE: &str = "application/epub+zip";
/// 固定入口文件
pub const CONTAINER_PATH: &str = "META-INF/container.xml";

/// OPF 元数据中的一个元素
///
/// `name` 为去掉命名空间前缀的元素名（如 `title`、`creator`、`meta`），
/// `attributes` 保留原始的限定属性名（如 `opf:role`）。
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MetadataEntry {
    pub name: String,
    pub text: String,
    pub attributes: Vec<(String, String)>,
}

impl MetadataEntry {
    /// 按限定名精确查找属性
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// 按本地名查找属性，同时接受 `role` 与 `opf:role` 这类写法
    pub fn attr_local(&self, local: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == local || k.rsplit(':').next() == Some(local))
            .map(|(_, v)| v.as_str())
    }
}

/// OPF 元数据块，保持元素在文档中的顺序与重复次数
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PackageMetadata {
    pub entries: Vec<MetadataEntry>,
}

impl PackageMetadata {
    pub fn all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a MetadataEntry> + 'a {
        self.entries.iter().filter(move |e| e.name == name)
    }

    pub fn first(&self, name: &str) -> Option<&MetadataEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    /// 第一个同名元素的非空文本
    pub fn first_text(&self, name: &str) -> Option<&str> {
        self.first(name)
            .map(|e| e.text.trim())
            .filter(|t| !t.is_empty())
    }
}

/// manifest 中的一项
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestItem {
    pub id: String,
    /// 相对 OPF 所在目录的路径
    pub href: String,
    pub media_type: String,
    pub properties: Option<String>,
}

impl ManifestItem {
    pub fn is_image(&self) -> bool {
        self.media_type.starts_with("image/")
    }

    pub fn is_html(&self) -> bool {
        matches!(
            self.media_type.as_str(),
            "application/xhtml+xml" | "text/html" | "application/html"
        )
    }

    /// properties 是空格分隔的列表
    pub fn has_property(&self, property: &str) -> bool {
        self.properties
            .as_deref()
            .is_some_and(|p| p.split_whitespace().any(|x| x == property))
    }
}

/// 解析后的 OPF 文档
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageDocument {
    pub version: Option<String>,
    pub metadata: PackageMetadata,
    pub manifest: Vec<ManifestItem>,
    /// spine 中的 idref，按阅读顺序
    pub spine: Vec<String>,
    /// spine 的 toc 属性（指向 NCX 的 manifest id）
    pub spine_toc: Option<String>,
}

impl PackageDocument {
    pub fn manifest_item(&self, id: &str) -> Option<&ManifestItem> {
        self.manifest.iter().find(|item| item.id == id)
    }

    /// 按 spine 顺序解析出 manifest 项，无法解析的 idref 被跳过
    pub fn spine_items(&self) -> impl Iterator<Item = &ManifestItem> {
        self.spine.iter().filter_map(move |idref| {
            let item = self.manifest_item(idref);
            if item.is_none() {
                log::debug!("spine idref 无法在 manifest 中找到: {}", idref);
            }
            item
        })
    }
}

/// 从 container.xml 定位 OPF 路径
///
/// 同时校验 mimetype 条目。
pub fn resolve_package_path(archive: &EpubArchive) -> Result<String> {
    match archive.read_bytes("mimetype") {
        Some(bytes) if bytes == EPUB_MIMETYPE.as_bytes() => {}
        _ => return Err(EpubError::MissingMimetype),
    }

    let container = archive
        .read_text(CONTAINER_PATH)
        .ok_or(EpubError::MissingContainerDescriptor)?;
    parse_container(&container)
}

/// 解析 container.xml，返回第一个 rootfile 的 full-path
pub fn parse_container(xml: &str) -> Result<String> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) if e.local_name().as_ref() == b"rootfile" => {
                return attribute(&e, b"full-path")
                    .filter(|p| !p.is_empty())
                    .ok_or_else(|| {
                        EpubError::MalformedContainerDescriptor("rootfile 缺少 full-path 属性".to_string())
                    });
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(EpubError::MalformedContainerDescriptor(e.to_string())),
            _ => {}
        }
    }

    Err(EpubError::MalformedContainerDescriptor("找不到 rootfile 元素".to_string()))
}

/// OPF 所在目录，位于根目录时为空字符串
pub fn package_dir(package_path: &str) -> String {
    match package_path.rfind('/') {
        Some(pos) => package_path[..pos].to_string(),
        None => String::new(),
    }
}

/// 读取并解析 OPF
pub fn load_package(archive: &EpubArchive, package_path: &str) -> Result<PackageDocument> {
    let xml = archive
        .read_text(package_path)
        .ok_or_else(|| EpubError::MissingPackageDocument(package_path.to_string()))?;
    parse_package(&xml)
}

/// 解析 OPF 文档为 `PackageDocument`
pub fn parse_package(xml: &str) -> Result<PackageDocument> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut doc = PackageDocument::default();
    let mut seen_package = false;
    let mut in_metadata = false;
    // 正在收集文本的元数据元素，以及其内部嵌套深度
    let mut current: Option<MetadataEntry> = None;
    let mut nested = 0usize;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let local = e.local_name();
                match local.as_ref() {
                    _ if current.is_some() => nested += 1,
                    b"package" => {
                        seen_package = true;
                        doc.version = attribute(&e, b"version");
                    }
                    b"metadata" => in_metadata = true,
                    b"dc-metadata" | b"x-metadata" if in_metadata => {}
                    b"spine" => doc.spine_toc = attribute(&e, b"toc"),
                    b"item" => push_manifest_item(&mut doc, &e),
                    b"itemref" => push_spine_itemref(&mut doc, &e),
                    _ if in_metadata => {
                        current = Some(metadata_entry(&e));
                        nested = 0;
                    }
                    _ => {}
                }
            }
            Ok(Event::Empty(e)) => {
                let local = e.local_name();
                match local.as_ref() {
                    _ if current.is_some() => {}
                    b"item" => push_manifest_item(&mut doc, &e),
                    b"spine" => doc.spine_toc = attribute(&e, b"toc"),
                    b"itemref" => push_spine_itemref(&mut doc, &e),
                    _ if in_metadata => doc.metadata.entries.push(metadata_entry(&e)),
                    _ => {}
                }
            }
            Ok(Event::Text(e)) => {
                if let Some(entry) = current.as_mut() {
                    entry.text.push_str(&decode_entities(&String::from_utf8_lossy(&e)));
                }
            }
            Ok(Event::CData(e)) => {
                if let Some(entry) = current.as_mut() {
                    entry.text.push_str(&String::from_utf8_lossy(&e));
                }
            }
            Ok(Event::End(e)) => {
                if current.is_some() {
                    if nested > 0 {
                        nested -= 1;
                    } else if let Some(mut entry) = current.take() {
                        entry.text = entry.text.trim().to_string();
                        doc.metadata.entries.push(entry);
                    }
                } else if e.local_name().as_ref() == b"metadata" {
                    in_metadata = false;
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(EpubError::MalformedPackageDocument(e.to_string())),
            _ => {}
        }
    }

    if !seen_package {
        return Err(EpubError::MalformedPackageDocument("缺少 package 根元素".to_string()));
    }

    log::debug!(
        "OPF 解析完成: {} 个元数据, {} 个 manifest 项, spine 长度 {}",
        doc.metadata.entries.len(),
        doc.manifest.len(),
        doc.spine.len()
    );
    Ok(doc)
}

fn push_manifest_item(doc: &mut PackageDocument, e: &BytesStart) {
    let id = attribute(e, b"id").unwrap_or_default();
    let href = attribute(e, b"href").unwrap_or_default();
    if id.is_empty() || href.is_empty() {
        return;
    }
    doc.manifest.push(ManifestItem {
        id,
        href,
        media_type: attribute(e, b"media-type").unwrap_or_default(),
        properties: attribute(e, b"properties"),
    });
}

fn push_spine_itemref(doc: &mut PackageDocument, e: &BytesStart) {
    if let Some(idref) = attribute(e, b"idref") {
        doc.spine.push(idref);
    }
}

fn metadata_entry(e: &BytesStart) -> MetadataEntry {
    MetadataEntry {
        name: String::from_utf8_lossy(e.local_name().as_ref()).into_owned(),
        text: String::new(),
        attributes: e
            .attributes()
            .flatten()
            .map(|attr| {
                let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
                (key, attribute_value(&attr))
            })
            .collect(),
    }
}

/// 按限定名读取属性值
pub(crate) fn attribute(e: &BytesStart, key: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|attr| attr.key.as_ref() == key)
        .map(|attr| attribute_value(&attr))
}

fn attribute_value(attr: &Attribute) -> String {
    match attr.unescape_value() {
        Ok(value) => value.into_owned(),
        Err(_) => decode_entities(&String::from_utf8_lossy(&attr.value)),
    }
}

/// 解码 XML / HTML 实体（`&amp;`、`&nbsp;`、`&#x4E2D;` 等）
pub(crate) fn decode_entities(text: &str) -> String {
    html_escape::decode_html_entities(text).into_owned()
}

/// 去掉 href 中的片段标识（`#` 之后的部分）
pub fn strip_fragment(href: &str) -> &str {
    href.split('#').next().unwrap_or(href)
}

/// 将相对路径拼接到目录上，并规范化 `.` 与 `..`
///
/// 以 `/` 开头的路径视为相对压缩包根目录。
pub fn join_path(dir: &str, relative: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    let combined = if relative.starts_with('/') || dir.is_empty() {
        relative.to_string()
    } else {
        format!("{}/{}", dir, relative)
    };

    for segment in combined.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }
    segments.join("/")
}

/// 把 manifest / 目录中的 href 解析为压缩包内路径：去片段、百分号解码、拼接目录
pub fn resolve_href(dir: &str, href: &str) -> String {
    let path = strip_fragment(href);
    let decoded = percent_decode_str(path).decode_utf8_lossy();
    join_path(dir, &decoded)
}

/// 把压缩包内的完整路径转换为相对 `dir` 的路径
pub fn relative_to(dir: &str, full_path: &str) -> String {
    if dir.is_empty() {
        return full_path.to_string();
    }
    if let Some(rest) = full_path.strip_prefix(dir).and_then(|r| r.strip_prefix('/')) {
        return rest.to_string();
    }

    let dir_segments: Vec<&str> = dir.split('/').filter(|s| !s.is_empty()).collect();
    let path_segments: Vec<&str> = full_path.split('/').filter(|s| !s.is_empty()).collect();
    let common = dir_segments
        .iter()
        .zip(path_segments.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut parts: Vec<&str> = vec![".."; dir_segments.len() - common];
    parts.extend_from_slice(&path_segments[common..]);
    parts.join("/")
}
