use super::package::{join_path, strip_fragment, ManifestItem, PackageDocument};
use super::CoverInfo;
use crate::archive::EpubArchive;
use crate::config::ParserConfig;
use crate::error::{EpubError, Result};
use base64::{engine::general_purpose, Engine as _};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::ExtendedColorType;
use percent_encoding::percent_decode_str;

pub const ALT_SUCCESS: &str = "封面图片";
pub const ALT_NOT_FOUND: &str = "未找到封面";
pub const ALT_FILE_MISSING: &str = "封面文件缺失";
pub const ALT_EXTRACTION_FAILED: &str = "封面提取失败";

/// 约定俗成的封面文件名
const CONVENTIONAL_NAMES: [&str; 5] = ["cover.jpg", "cover.jpeg", "cover.png", "cover.gif", "cover.webp"];
/// 路径搜索时尝试的常见子目录（空字符串表示根目录）
const CONVENTIONAL_DIRS: [&str; 5] = ["", "OEBPS", "content", "images", "img"];

/// 封面查找上下文
pub struct CoverContext<'a> {
    pub archive: &'a EpubArchive,
    pub package: &'a PackageDocument,
    pub package_dir: &'a str,
}

/// 某个策略找到的封面候选
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverCandidate {
    /// manifest 中的 href，或约定文件名
    pub href: String,
    pub id: Option<String>,
    /// 命中的策略名
    pub strategy: &'static str,
}

impl CoverCandidate {
    fn from_item(item: &ManifestItem, strategy: &'static str) -> Self {
        Self {
            href: item.href.clone(),
            id: Some(item.id.clone()),
            strategy,
        }
    }
}

/// 封面查找策略：返回候选即视为命中
pub type CoverStrategy = fn(&CoverContext) -> Option<CoverCandidate>;

/// 按优先级排列的封面策略链
pub const COVER_STRATEGIES: [(&str, CoverStrategy); 6] = [
    ("metadata-cover", from_metadata_cover),
    ("cover-image-property", from_cover_image_property),
    ("meta-name-cover", from_meta_name_cover),
    ("image-named-cover", from_image_named_cover),
    ("conventional-filename", from_conventional_filename),
    ("first-image", from_first_image),
];

/// 策略 1：元数据中显式的 cover 元素，按 id 对应到 manifest
pub fn from_metadata_cover(ctx: &CoverContext) -> Option<CoverCandidate> {
    let entry = ctx.package.metadata.first("cover")?;
    let id = match entry.text.trim() {
        "" => entry.attr("content").or_else(|| entry.attr("idref"))?,
        text => text,
    };
    ctx.package
        .manifest_item(id)
        .map(|item| CoverCandidate::from_item(item, "metadata-cover"))
}

/// 策略 2：EPUB3 的 `properties="cover-image"`，或 id 就叫 `cover-image`
pub fn from_cover_image_property(ctx: &CoverContext) -> Option<CoverCandidate> {
    ctx.package
        .manifest
        .iter()
        .find(|item| item.has_property("cover-image") || item.id == "cover-image")
        .map(|item| CoverCandidate::from_item(item, "cover-image-property"))
}

/// 策略 3：EPUB2 的 `<meta name="cover" content="manifest-id"/>`
///
/// 部分书把图片路径直接写进 content，找不到对应 id 时按路径处理。
pub fn from_meta_name_cover(ctx: &CoverContext) -> Option<CoverCandidate> {
    let content = ctx
        .package
        .metadata
        .all("meta")
        .filter(|meta| meta.attr("name") == Some("cover"))
        .find_map(|meta| meta.attr("content"))
        .map(str::trim)
        .filter(|c| !c.is_empty())?;

    if let Some(item) = ctx.package.manifest_item(content) {
        return Some(CoverCandidate::from_item(item, "meta-name-cover"));
    }
    looks_like_image_path(content).then(|| CoverCandidate {
        href: content.to_string(),
        id: None,
        strategy: "meta-name-cover",
    })
}

/// 策略 4：id 或 href 中包含 "cover" 的图片
pub fn from_image_named_cover(ctx: &CoverContext) -> Option<CoverCandidate> {
    ctx.package
        .manifest
        .iter()
        .filter(|item| item.is_image())
        .find(|item| {
            item.id.to_lowercase().contains("cover") || item.href.to_lowercase().contains("cover")
        })
        .map(|item| CoverCandidate::from_item(item, "image-named-cover"))
}

/// 策略 5：OPF 目录下的约定文件名
pub fn from_conventional_filename(ctx: &CoverContext) -> Option<CoverCandidate> {
    CONVENTIONAL_NAMES
        .iter()
        .find(|name| ctx.archive.is_file(&join_path(ctx.package_dir, name)))
        .map(|name| CoverCandidate {
            href: name.to_string(),
            id: None,
            strategy: "conventional-filename",
        })
}

/// 策略 6：第一张图片
pub fn from_first_image(ctx: &CoverContext) -> Option<CoverCandidate> {
    ctx.package
        .manifest
        .iter()
        .find(|item| item.is_image())
        .map(|item| CoverCandidate::from_item(item, "first-image"))
}

fn looks_like_image_path(value: &str) -> bool {
    let lower = value.to_lowercase();
    [".jpg", ".jpeg", ".png", ".gif", ".webp"]
        .iter()
        .any(|ext| lower.ends_with(ext))
}

/// 依次运行策略链，返回第一个命中的候选
pub fn locate_cover(ctx: &CoverContext) -> Option<CoverCandidate> {
    COVER_STRATEGIES.iter().find_map(|(name, strategy)| {
        let candidate = strategy(ctx);
        if let Some(ref c) = candidate {
            log::debug!("封面策略 {} 命中: {}", name, c.href);
        }
        candidate
    })
}

/// 生成封面路径的候选列表（按尝试顺序，已去重）
///
/// manifest 的 href 有时相对 OPF 目录，有时相对压缩包根目录，
/// 所以原样路径、拼接 OPF 目录、去掉/加上 `./`、常见子目录都要试。
pub fn candidate_paths(package_dir: &str, href: &str) -> Vec<String> {
    let href = strip_fragment(href);
    let decoded = percent_decode_str(href).decode_utf8_lossy().into_owned();
    let stripped = href.trim_start_matches("./");
    let file_name = href.rsplit('/').next().unwrap_or(href);

    let mut paths = vec![
        href.to_string(),
        join_path(package_dir, href),
        stripped.to_string(),
        join_path(package_dir, stripped),
        format!("./{}", stripped),
        decoded.clone(),
        join_path(package_dir, &decoded),
    ];
    for dir in CONVENTIONAL_DIRS {
        paths.push(join_path(dir, stripped));
        paths.push(join_path(dir, file_name));
    }

    let mut unique = Vec::with_capacity(paths.len());
    for path in paths {
        if !path.is_empty() && !unique.contains(&path) {
            unique.push(path);
        }
    }
    unique
}

/// 在压缩包里找到第一个存在的候选路径
pub fn find_cover_path(archive: &EpubArchive, package_dir: &str, href: &str) -> Option<String> {
    candidate_paths(package_dir, href).into_iter().find(|path| {
        let found = archive.is_file(path);
        log::trace!("尝试封面路径 {} -> {}", path, found);
        found
    })
}

/// 解析封面
///
/// 不会失败：任何问题都降级为空图片加状态说明。
pub fn resolve_cover(ctx: &CoverContext, config: &ParserConfig) -> CoverInfo {
    let Some(candidate) = locate_cover(ctx) else {
        log::info!("未找到封面声明");
        return cover_status(ALT_NOT_FOUND, None);
    };

    let Some(path) = find_cover_path(ctx.archive, ctx.package_dir, &candidate.href) else {
        log::warn!("封面文件不存在: {} (策略 {})", candidate.href, candidate.strategy);
        return cover_status(ALT_FILE_MISSING, None);
    };

    let bytes = ctx.archive.read_bytes(&path).unwrap_or_default();
    match encode_cover(bytes, config.max_cover_size, config.image_quality) {
        Ok(data_uri) => CoverInfo {
            cover_image: data_uri,
            alt_text: ALT_SUCCESS.to_string(),
            source_path: Some(path),
        },
        Err(e) => {
            log::warn!("封面处理失败 {}: {}", path, e);
            cover_status(ALT_EXTRACTION_FAILED, Some(path))
        }
    }
}

fn cover_status(alt_text: &str, source_path: Option<String>) -> CoverInfo {
    CoverInfo {
        cover_image: String::new(),
        alt_text: alt_text.to_string(),
        source_path,
    }
}

/// 解码图片，等比缩小到 `max_size` 见方以内（不放大），重新编码为 JPEG 并转为 data URI
pub fn encode_cover(bytes: &[u8], max_size: u32, quality: u8) -> Result<String> {
    let image = image::load_from_memory(bytes)
        .map_err(|e| EpubError::ExtractionFailed(format!("图片解码失败: {}", e)))?;

    let image = if image.width() > max_size || image.height() > max_size {
        image.resize(max_size, max_size, FilterType::Lanczos3)
    } else {
        image
    };

    let rgb = image.to_rgb8();
    let mut jpeg = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut jpeg, quality);
    encoder
        .encode(rgb.as_raw(), rgb.width(), rgb.height(), ExtendedColorType::Rgb8)
        .map_err(|e| EpubError::ExtractionFailed(format!("图片编码失败: {}", e)))?;

    Ok(format!(
        "data:image/jpeg;base64,{}",
        general_purpose::STANDARD.encode(&jpeg)
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::package::parse_package;
    use crate::parser::test_support::{png_bytes, EpubBuilder};

    fn package(manifest: &str, metadata: &str) -> PackageDocument {
        let xml = format!(
            r#"<package version="2.0" xmlns:dc="http://purl.org/dc/elements/1.1/">
                 <metadata>{}</metadata><manifest>{}</manifest><spine/></package>"#,
            metadata, manifest
        );
        parse_package(&xml).unwrap()
    }

    fn empty_archive() -> EpubArchive {
        EpubArchive::from_bytes(EpubBuilder::new().build()).unwrap()
    }

    #[test]
    fn test_metadata_cover_strategy() {
        let archive = empty_archive();
        let package = package(
            r#"<item id="img1" href="a.jpg" media-type="image/jpeg"/>
               <item id="img2" href="b.jpg" media-type="image/jpeg"/>"#,
            "<cover>img2</cover>",
        );
        let ctx = CoverContext { archive: &archive, package: &package, package_dir: "" };

        let candidate = locate_cover(&ctx).unwrap();
        assert_eq!(candidate.strategy, "metadata-cover");
        assert_eq!(candidate.href, "b.jpg");
    }

    #[test]
    fn test_cover_image_property_before_meta() {
        let archive = empty_archive();
        let package = package(
            r#"<item id="meta-cover" href="m.jpg" media-type="image/jpeg"/>
               <item id="c" href="images/c1.jpg" media-type="image/jpeg" properties="cover-image"/>"#,
            r#"<meta name="cover" content="meta-cover"/>"#,
        );
        let ctx = CoverContext { archive: &archive, package: &package, package_dir: "OEBPS" };

        let candidate = locate_cover(&ctx).unwrap();
        assert_eq!(candidate.strategy, "cover-image-property");
        assert_eq!(candidate.id.as_deref(), Some("c"));
    }

    #[test]
    fn test_meta_name_cover_strategy() {
        let archive = empty_archive();
        let by_id = package(
            r#"<item id="pic" href="pic.png" media-type="image/png"/>
               <item id="x" href="zz.png" media-type="image/png"/>"#,
            r#"<meta name="cover" content="pic"/>"#,
        );
        let ctx = CoverContext { archive: &archive, package: &by_id, package_dir: "" };
        assert_eq!(from_meta_name_cover(&ctx).unwrap().href, "pic.png");

        let by_path = package(
            r#"<item id="x" href="zz.png" media-type="image/png"/>"#,
            r#"<meta name="cover" content="Images/front.jpg"/>"#,
        );
        let ctx = CoverContext { archive: &archive, package: &by_path, package_dir: "" };
        let candidate = from_meta_name_cover(&ctx).unwrap();
        assert_eq!(candidate.href, "Images/front.jpg");
        assert!(candidate.id.is_none());
    }

    #[test]
    fn test_image_named_cover_strategy() {
        let archive = empty_archive();
        let package = package(
            r#"<item id="p1" href="images/p1.png" media-type="image/png"/>
               <item id="page" href="Cover.xhtml" media-type="application/xhtml+xml"/>
               <item id="p2" href="images/MyCover.png" media-type="image/png"/>"#,
            "",
        );
        let ctx = CoverContext { archive: &archive, package: &package, package_dir: "" };

        let candidate = locate_cover(&ctx).unwrap();
        assert_eq!(candidate.strategy, "image-named-cover");
        assert_eq!(candidate.href, "images/MyCover.png");
    }

    #[test]
    fn test_conventional_filename_strategy() {
        let archive = EpubArchive::from_bytes(
            EpubBuilder::new().file("OEBPS/cover.png", b"png").build(),
        )
        .unwrap();
        let package = package(r#"<item id="t" href="t.xhtml" media-type="application/xhtml+xml"/>"#, "");
        let ctx = CoverContext { archive: &archive, package: &package, package_dir: "OEBPS" };

        let candidate = locate_cover(&ctx).unwrap();
        assert_eq!(candidate.strategy, "conventional-filename");
        assert_eq!(candidate.href, "cover.png");
    }

    #[test]
    fn test_first_image_fallback() {
        let archive = empty_archive();
        let package = package(
            r#"<item id="t" href="t.xhtml" media-type="application/xhtml+xml"/>
               <item id="a" href="a.gif" media-type="image/gif"/>
               <item id="b" href="b.gif" media-type="image/gif"/>"#,
            "",
        );
        let ctx = CoverContext { archive: &archive, package: &package, package_dir: "" };

        let candidate = locate_cover(&ctx).unwrap();
        assert_eq!(candidate.strategy, "first-image");
        assert_eq!(candidate.href, "a.gif");
    }

    #[test]
    fn test_no_cover_candidate() {
        let archive = empty_archive();
        let package = package(r#"<item id="t" href="t.xhtml" media-type="application/xhtml+xml"/>"#, "");
        let ctx = CoverContext { archive: &archive, package: &package, package_dir: "" };

        assert!(locate_cover(&ctx).is_none());
        let info = resolve_cover(&ctx, &ParserConfig::default());
        assert_eq!(info.cover_image, "");
        assert_eq!(info.alt_text, ALT_NOT_FOUND);
    }

    #[test]
    fn test_candidate_paths_order() {
        let paths = candidate_paths("OEBPS", "images/c1.jpg");
        assert_eq!(paths[0], "images/c1.jpg");
        assert_eq!(paths[1], "OEBPS/images/c1.jpg");
        assert!(paths.contains(&"./images/c1.jpg".to_string()));
        assert!(paths.contains(&"content/images/c1.jpg".to_string()));
        assert!(paths.contains(&"img/c1.jpg".to_string()));
        assert!(paths.contains(&"c1.jpg".to_string()));
    }

    #[test]
    fn test_find_cover_path_with_package_dir() {
        let archive = EpubArchive::from_bytes(
            EpubBuilder::new().file("OEBPS/images/c1.jpg", b"jpg").build(),
        )
        .unwrap();
        assert_eq!(
            find_cover_path(&archive, "OEBPS", "images/c1.jpg").as_deref(),
            Some("OEBPS/images/c1.jpg")
        );
        assert_eq!(
            find_cover_path(&archive, "", "../OEBPS/images/c1.jpg").as_deref(),
            Some("OEBPS/images/c1.jpg")
        );
        assert!(find_cover_path(&archive, "OEBPS", "images/none.jpg").is_none());
    }

    #[test]
    fn test_encode_cover_shrinks_and_keeps_aspect() {
        let data_uri = encode_cover(&png_bytes(600, 400), 300, 80).unwrap();
        assert!(data_uri.starts_with("data:image/jpeg;base64,"));

        let encoded = data_uri.trim_start_matches("data:image/jpeg;base64,");
        let jpeg = general_purpose::STANDARD.decode(encoded).unwrap();
        let image = image::load_from_memory(&jpeg).unwrap();
        assert_eq!((image.width(), image.height()), (300, 200));
    }

    #[test]
    fn test_encode_cover_never_upscales() {
        let data_uri = encode_cover(&png_bytes(100, 50), 300, 80).unwrap();
        let encoded = data_uri.trim_start_matches("data:image/jpeg;base64,");
        let jpeg = general_purpose::STANDARD.decode(encoded).unwrap();
        let image = image::load_from_memory(&jpeg).unwrap();
        assert_eq!((image.width(), image.height()), (100, 50));
    }

    #[test]
    fn test_encode_cover_rejects_garbage() {
        assert!(matches!(
            encode_cover(b"not an image", 300, 80),
            Err(EpubError::ExtractionFailed(_))
        ));
    }

    #[test]
    fn test_resolve_cover_statuses() {
        let archive = EpubArchive::from_bytes(
            EpubBuilder::new()
                .file("OEBPS/images/bad.jpg", b"garbage")
                .file("OEBPS/images/good.png", &png_bytes(40, 40))
                .build(),
        )
        .unwrap();
        let config = ParserConfig::default();

        let missing = package(r#"<item id="c" href="images/gone.jpg" media-type="image/jpeg" properties="cover-image"/>"#, "");
        let ctx = CoverContext { archive: &archive, package: &missing, package_dir: "OEBPS" };
        assert_eq!(resolve_cover(&ctx, &config).alt_text, ALT_FILE_MISSING);

        let bad = package(r#"<item id="c" href="images/bad.jpg" media-type="image/jpeg" properties="cover-image"/>"#, "");
        let ctx = CoverContext { archive: &archive, package: &bad, package_dir: "OEBPS" };
        let info = resolve_cover(&ctx, &config);
        assert_eq!(info.alt_text, ALT_EXTRACTION_FAILED);
        assert_eq!(info.cover_image, "");

        let good = package(r#"<item id="c" href="images/good.png" media-type="image/png" properties="cover-image"/>"#, "");
        let ctx = CoverContext { archive: &archive, package: &good, package_dir: "OEBPS" };
        let info = resolve_cover(&ctx, &config);
        assert_eq!(info.alt_text, ALT_SUCCESS);
        assert_eq!(info.source_path.as_deref(), Some("OEBPS/images/good.png"));
        assert!(info.cover_image.starts_with("data:image/jpeg;base64,"));
    }
}
