use super::chapter_detector::detector;
use super::package::{
    attribute, decode_entities, join_path, package_dir, relative_to, resolve_href, ManifestItem,
    PackageDocument,
};
use super::TocItem;
use crate::archive::EpubArchive;
use crate::error::{EpubError, Result};
use quick_xml::events::Event;
use quick_xml::Reader;
use scraper::{ElementRef, Html, Selector};

/// NCX 的媒体类型
pub const NCX_MEDIA_TYPE: &str = "application/x-dtbncx+xml";

/// 约定的导航文档文件名
const NAV_FILE_NAMES: [&str; 4] = ["nav.xhtml", "nav.html", "toc.xhtml", "toc.html"];
/// 约定的 NCX 位置（相对压缩包根目录；另外会尝试 OPF 目录）
const NCX_LOCATIONS: [&str; 4] = ["toc.ncx", "OEBPS/toc.ncx", "OPS/toc.ncx", "EPUB/toc.ncx"];
/// 目录类文件名关键字
const TOC_NAME_HINTS: [&str; 3] = ["toc", "contents", "index"];
/// HTML 扫描时只考虑位于这些块级容器内的链接
const BLOCK_CONTAINERS: &str =
    "p a[href], div a[href], li a[href], td a[href], dd a[href], dt a[href], \
     h1 a[href], h2 a[href], h3 a[href], h4 a[href], h5 a[href], h6 a[href], \
     section a[href], nav a[href], blockquote a[href]";

/// 目录解析上下文
pub struct TocContext<'a> {
    pub archive: &'a EpubArchive,
    pub package: &'a PackageDocument,
    pub package_dir: &'a str,
}

/// 目录解析层级：返回 Err 或空列表都会落到下一层
pub type TocTier = fn(&TocContext) -> Result<Vec<TocItem>>;

/// 四层回退链，按顺序尝试
pub const TOC_TIERS: [(&str, TocTier); 4] = [
    ("nav-document", from_nav_document),
    ("ncx", from_ncx),
    ("html-scan", from_html_scan),
    ("spine", from_spine),
];

/// 解析目录
///
/// 不会失败：前三层的解析错误只会让该层被跳过，最终至少回退到 spine。
pub fn resolve_toc(ctx: &TocContext) -> Vec<TocItem> {
    for (name, tier) in TOC_TIERS.iter() {
        match tier(ctx) {
            Ok(items) if !items.is_empty() => {
                log::info!("目录来自 {}，共 {} 项", name, items.len());
                return items;
            }
            Ok(_) => log::debug!("目录层级 {} 没有结果", name),
            Err(e) => log::warn!("目录层级 {} 解析失败: {}", name, e),
        }
    }
    log::warn!("没有可用的目录来源");
    Vec::new()
}

/// 扁平目录项的编号器：按输出顺序生成 `toc-1`、`toc-2`……
#[derive(Default)]
struct TocBuilder {
    items: Vec<TocItem>,
}

impl TocBuilder {
    fn push(&mut self, title: String, level: u32, href: String, parent_id: Option<String>) -> String {
        let id = format!("toc-{}", self.items.len() + 1);
        self.items.push(TocItem {
            id: id.clone(),
            title,
            level,
            href,
            parent_id,
        });
        id
    }

    fn finish(self) -> Vec<TocItem> {
        self.items
    }
}

/// 把某个导航文件中的链接改写为相对 OPF 目录的路径
///
/// 外部链接和纯片段链接返回 None。
fn rebase_href(doc_path: &str, opf_dir: &str, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') || href.contains("://") || href.starts_with("mailto:") {
        return None;
    }
    let (path, fragment) = match href.split_once('#') {
        Some((path, fragment)) => (path, Some(fragment)),
        None => (href, None),
    };
    let full = join_path(&package_dir(doc_path), path);
    let relative = relative_to(opf_dir, &full);
    Some(match fragment {
        Some(f) if !f.is_empty() => format!("{}#{}", relative, f),
        _ => relative,
    })
}

fn clean_title(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn item_path(ctx: &TocContext, item: &ManifestItem) -> String {
    resolve_href(ctx.package_dir, &item.href)
}

// ==================== 第一层：EPUB3 导航文档 ====================

/// 找到导航文档：properties 含 nav，或文件名是约定的导航文件名
fn find_nav_item<'a>(package: &'a PackageDocument) -> Option<&'a ManifestItem> {
    package
        .manifest
        .iter()
        .find(|item| item.has_property("nav"))
        .or_else(|| {
            package.manifest.iter().find(|item| {
                let name = item.href.rsplit('/').next().unwrap_or(&item.href).to_lowercase();
                NAV_FILE_NAMES.contains(&name.as_str())
            })
        })
}

/// 第一层：解析 EPUB3 导航文档
///
/// 只取直接包含单个链接的 `<li>`，全部作为第一层目录项。
pub fn from_nav_document(ctx: &TocContext) -> Result<Vec<TocItem>> {
    let Some(item) = find_nav_item(ctx.package) else {
        return Ok(Vec::new());
    };
    let path = item_path(ctx, item);
    let html = ctx
        .archive
        .read_text(&path)
        .ok_or_else(|| EpubError::ExtractionFailed(format!("导航文档不存在: {}", path)))?;

    Ok(parse_nav_document(&html, &path, ctx.package_dir))
}

/// 从导航文档 HTML 中提取目录项
pub fn parse_nav_document(html: &str, doc_path: &str, package_dir: &str) -> Vec<TocItem> {
    let document = Html::parse_document(html);
    let nav_selector = Selector::parse("nav").expect("valid nav selector");
    let li_selector = Selector::parse("li").expect("valid li selector");

    // 优先 epub:type="toc" 的 nav，否则整个文档
    let toc_nav = document.select(&nav_selector).find(|nav| {
        nav.value()
            .attr("epub:type")
            .is_some_and(|t| t.split_whitespace().any(|x| x == "toc"))
    });
    let list_items: Vec<ElementRef> = match toc_nav {
        Some(nav) => nav.select(&li_selector).collect(),
        None => document.select(&li_selector).collect(),
    };

    let mut builder = TocBuilder::default();
    for li in list_items {
        let anchors: Vec<ElementRef> = li
            .children()
            .filter_map(ElementRef::wrap)
            .filter(|child| child.value().name() == "a")
            .collect();
        let [anchor] = anchors.as_slice() else {
            continue;
        };
        let Some(href) = anchor
            .value()
            .attr("href")
            .and_then(|h| rebase_href(doc_path, package_dir, h))
        else {
            continue;
        };
        let title = clean_title(&anchor.text().collect::<String>());
        if title.is_empty() {
            continue;
        }
        builder.push(title, 1, href, None);
    }
    builder.finish()
}

// ==================== 第二层：NCX ====================

/// NCX 中的 navPoint 节点（解析时的临时树）
#[derive(Debug, Default, Clone, PartialEq)]
pub struct NavPoint {
    pub label: String,
    pub src: String,
    pub children: Vec<NavPoint>,
}

fn find_ncx_path(ctx: &TocContext) -> Option<String> {
    let declared = ctx
        .package
        .manifest
        .iter()
        .find(|item| item.media_type == NCX_MEDIA_TYPE)
        .or_else(|| {
            ctx.package
                .spine_toc
                .as_deref()
                .and_then(|id| ctx.package.manifest_item(id))
        })
        .map(|item| item_path(ctx, item))
        .filter(|path| ctx.archive.is_file(path));

    declared.or_else(|| {
        std::iter::once(join_path(ctx.package_dir, "toc.ncx"))
            .chain(NCX_LOCATIONS.iter().map(|p| p.to_string()))
            .find(|path| ctx.archive.is_file(path))
    })
}

/// 第二层：解析 EPUB2 的 NCX
pub fn from_ncx(ctx: &TocContext) -> Result<Vec<TocItem>> {
    let Some(path) = find_ncx_path(ctx) else {
        return Ok(Vec::new());
    };
    let xml = ctx
        .archive
        .read_text(&path)
        .ok_or_else(|| EpubError::ExtractionFailed(format!("NCX 不存在: {}", path)))?;

    let nav_points = parse_nav_map(&xml)?;
    let mut builder = TocBuilder::default();
    flatten_nav_points(&nav_points, 1, None, &path, ctx.package_dir, &mut builder);
    Ok(builder.finish())
}

/// 解析 NCX 的 navMap 为 navPoint 树
pub fn parse_nav_map(xml: &str) -> Result<Vec<NavPoint>> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    // 栈底是一个虚拟根节点，收集顶层 navPoint
    let mut stack: Vec<NavPoint> = vec![NavPoint::default()];
    let mut in_nav_map = false;
    let mut in_label = false;
    let mut in_text = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"navMap" => in_nav_map = true,
                b"navPoint" if in_nav_map => stack.push(NavPoint::default()),
                b"navLabel" if stack.len() > 1 => in_label = true,
                b"text" if in_label => in_text = true,
                b"content" if stack.len() > 1 => set_content_src(&mut stack, &e),
                _ => {}
            },
            Ok(Event::Empty(e)) => {
                if e.local_name().as_ref() == b"content" && stack.len() > 1 {
                    set_content_src(&mut stack, &e);
                }
            }
            Ok(Event::Text(e)) => {
                if in_text {
                    if let Some(node) = stack.last_mut() {
                        if node.label.is_empty() {
                            let raw = String::from_utf8_lossy(&e);
                            node.label = clean_title(&decode_entities(&raw));
                        }
                    }
                }
            }
            Ok(Event::CData(e)) => {
                if in_text {
                    if let Some(node) = stack.last_mut() {
                        if node.label.is_empty() {
                            node.label = clean_title(&String::from_utf8_lossy(&e));
                        }
                    }
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"navMap" => in_nav_map = false,
                b"navPoint" if stack.len() > 1 => {
                    if let Some(node) = stack.pop() {
                        if let Some(parent) = stack.last_mut() {
                            parent.children.push(node);
                        }
                    }
                }
                b"navLabel" => in_label = false,
                b"text" => in_text = false,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(EpubError::ExtractionFailed(format!("NCX 解析失败: {}", e))),
            _ => {}
        }
    }

    Ok(stack.into_iter().next().map(|root| root.children).unwrap_or_default())
}

fn set_content_src(stack: &mut [NavPoint], e: &quick_xml::events::BytesStart) {
    if let Some(node) = stack.last_mut() {
        if node.src.is_empty() {
            if let Some(src) = attribute(e, b"src") {
                node.src = src;
            }
        }
    }
}

/// 递归展开 navPoint 树：层级等于递归深度，parent_id 指向直接外层节点
fn flatten_nav_points(
    nodes: &[NavPoint],
    level: u32,
    parent_id: Option<&str>,
    ncx_path: &str,
    package_dir: &str,
    builder: &mut TocBuilder,
) {
    for node in nodes {
        let href = rebase_href(ncx_path, package_dir, &node.src).unwrap_or_default();
        let id = builder.push(
            node.label.clone(),
            level,
            href,
            parent_id.map(str::to_string),
        );
        flatten_nav_points(&node.children, level + 1, Some(&id), ncx_path, package_dir, builder);
    }
}

// ==================== 第三层：HTML 目录页扫描 ====================

/// 候选目录页：文件名带目录关键字的排在前面，其余 HTML 文档在后
fn html_scan_candidates<'a>(package: &'a PackageDocument) -> Vec<&'a ManifestItem> {
    let hinted = |item: &ManifestItem| {
        let name = format!("{} {}", item.id, item.href).to_lowercase();
        TOC_NAME_HINTS.iter().any(|hint| name.contains(hint))
    };

    let mut candidates: Vec<&ManifestItem> = package
        .manifest
        .iter()
        .filter(|item| item.is_html() && hinted(*item))
        .collect();
    candidates.extend(package.manifest.iter().filter(|item| item.is_html() && !hinted(*item)));
    candidates
}

/// 第三层：在疑似目录页中扫描块级容器内的章节链接
///
/// 遇到第一个有结果的文档就停止。
pub fn from_html_scan(ctx: &TocContext) -> Result<Vec<TocItem>> {
    for item in html_scan_candidates(ctx.package) {
        let path = item_path(ctx, item);
        let Some(html) = ctx.archive.read_text(&path) else {
            continue;
        };
        let items = scan_html_links(&html, &path, ctx.package_dir);
        if !items.is_empty() {
            log::debug!("HTML 目录扫描命中: {}", path);
            return Ok(items);
        }
    }
    Ok(Vec::new())
}

/// 提取一个 HTML 文档中像章节的链接
pub fn scan_html_links(html: &str, doc_path: &str, package_dir: &str) -> Vec<TocItem> {
    let document = Html::parse_document(html);
    let selector = Selector::parse(BLOCK_CONTAINERS).expect("valid block container selector");
    let detector = detector();

    let mut builder = TocBuilder::default();
    for anchor in document.select(&selector) {
        let title = clean_title(&anchor.text().collect::<String>());
        if !detector.looks_like_chapter(&title) {
            continue;
        }
        let Some(href) = anchor
            .value()
            .attr("href")
            .and_then(|h| rebase_href(doc_path, package_dir, h))
        else {
            continue;
        };
        builder.push(title, 1, href, None);
    }
    builder.finish()
}

// ==================== 第四层：spine ====================

/// 第四层：每个 spine 项生成一个通用标题的目录项
pub fn from_spine(ctx: &TocContext) -> Result<Vec<TocItem>> {
    if ctx.package.spine.is_empty() {
        return Err(EpubError::ExtractionFailed("OPF 中没有 spine".to_string()));
    }

    let mut builder = TocBuilder::default();
    for (i, item) in ctx.package.spine_items().enumerate() {
        builder.push(format!("第 {} 章", i + 1), 1, item.href.clone(), None);
    }
    Ok(builder.finish())
}
