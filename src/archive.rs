use crate::error::{EpubError, Result};
use encoding_rs::{Encoding, GBK, UTF_8};
use regex::bytes::Regex;
use std::collections::BTreeMap;
use std::fs;
use std::io::{Cursor, Read};
use std::path::Path;
use std::sync::LazyLock;
use zip::ZipArchive;

// 文档内声明的编码：<?xml encoding="..."?> 或 <meta charset="..."> / content="...; charset=..."
static DECLARED_CHARSET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)(?:encoding|charset)\s*=\s*["']?([A-Za-z0-9_\-]+)"#)
        .expect("valid charset regex")
});

/// 默认的解压总量上限：512 MiB
pub const DEFAULT_MAX_UNPACKED_SIZE: u64 = 512 * 1024 * 1024;
/// 单个条目预分配的上限
const PREALLOCATE_LIMIT: u64 = 16 * 1024 * 1024;

/// 压缩包条目
#[derive(Debug, Clone, PartialEq)]
pub enum ArchiveEntry {
    File(Vec<u8>),
    Directory,
}

/// EPUB 压缩包（内存中的只读条目表）
///
/// 路径区分大小写，查找为精确匹配，不做目录规范化。
#[derive(Debug)]
pub struct EpubArchive {
    entries: BTreeMap<String, ArchiveEntry>,
}

impl EpubArchive {
    /// 从磁盘打开压缩包并把所有条目读入内存
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with_limit(path, DEFAULT_MAX_UNPACKED_SIZE)
    }

    /// 同 `open`，解压后的总字节数不得超过 `max_unpacked`
    pub fn open_with_limit(path: &Path, max_unpacked: u64) -> Result<Self> {
        let bytes = fs::read(path)?;
        Self::from_bytes_with_limit(bytes, max_unpacked)
    }

    /// 从字节数据构建压缩包
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        Self::from_bytes_with_limit(bytes, DEFAULT_MAX_UNPACKED_SIZE)
    }

    /// 从字节数据构建压缩包，解压总量超过 `max_unpacked` 时返回 `FileTooLarge`
    ///
    /// 条目头中声明的大小不可信，只用来预分配，实际读取量由剩余额度限制。
    pub fn from_bytes_with_limit(bytes: Vec<u8>, max_unpacked: u64) -> Result<Self> {
        let mut zip = ZipArchive::new(Cursor::new(bytes))
            .map_err(|e| EpubError::InvalidArchive(e.to_string()))?;

        let mut entries = BTreeMap::new();
        let mut unpacked: u64 = 0;
        for i in 0..zip.len() {
            let file = zip
                .by_index(i)
                .map_err(|e| EpubError::InvalidArchive(e.to_string()))?;
            let name = file.name().to_string();

            if file.is_dir() {
                entries.insert(name.trim_end_matches('/').to_string(), ArchiveEntry::Directory);
                continue;
            }

            let remaining = max_unpacked - unpacked;
            let capacity = file.size().min(remaining).min(PREALLOCATE_LIMIT) as usize;
            let mut data = Vec::with_capacity(capacity);
            file.take(remaining.saturating_add(1))
                .read_to_end(&mut data)
                .map_err(|e| EpubError::InvalidArchive(format!("{}: {}", name, e)))?;

            unpacked += data.len() as u64;
            if unpacked > max_unpacked {
                log::warn!("解压后超过上限: {} ({} 字节)", name, unpacked);
                return Err(EpubError::FileTooLarge {
                    size: unpacked,
                    max: max_unpacked,
                });
            }
            entries.insert(name, ArchiveEntry::File(data));
        }

        log::debug!("压缩包已载入，共 {} 个条目", entries.len());
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 是否存在该条目（文件或目录）
    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    pub fn is_file(&self, path: &str) -> bool {
        matches!(self.entries.get(path), Some(ArchiveEntry::File(_)))
    }

    pub fn is_dir(&self, path: &str) -> bool {
        matches!(self.entries.get(path), Some(ArchiveEntry::Directory))
    }

    /// 所有文件条目的路径（按字典序）
    pub fn file_names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().filter_map(|(name, entry)| match entry {
            ArchiveEntry::File(_) => Some(name.as_str()),
            ArchiveEntry::Directory => None,
        })
    }

    /// 按路径读取字节
    pub fn read_bytes(&self, path: &str) -> Option<&[u8]> {
        match self.entries.get(path) {
            Some(ArchiveEntry::File(data)) => Some(data.as_slice()),
            _ => None,
        }
    }

    /// 按路径读取文本，自动检测编码
    pub fn read_text(&self, path: &str) -> Option<String> {
        self.read_bytes(path).map(decode_text)
    }
}

/// 将字节解码为字符串
///
/// 依次尝试：BOM、UTF-8、文档内声明的编码、GBK 特征检测，最后按 UTF-8 有损解码。
pub fn decode_text(bytes: &[u8]) -> String {
    let encoding = detect_encoding(bytes);
    let (content, _encoding_used, had_errors) = encoding.decode(bytes);
    if had_errors {
        log::warn!("文本按 {} 解码时出现错误，可能存在乱码", encoding.name());
    }
    content.into_owned()
}

/// 检测字节数据的字符编码
fn detect_encoding(bytes: &[u8]) -> &'static Encoding {
    // 1. 检查 BOM
    if let Some((encoding, _bom_length)) = Encoding::for_bom(bytes) {
        return encoding;
    }

    // 2. 合法的 UTF-8
    if std::str::from_utf8(bytes).is_ok() {
        return UTF_8;
    }

    // 3. 文档头部声明的编码
    let head = &bytes[..bytes.len().min(1024)];
    if let Some(label) = DECLARED_CHARSET.captures(head).and_then(|c| c.get(1)) {
        if let Some(encoding) = Encoding::for_label(label.as_bytes()) {
            if encoding != UTF_8 {
                return encoding;
            }
        }
    }

    // 4. GBK 特征
    if looks_like_gbk(bytes) {
        return GBK;
    }

    UTF_8
}

/// 检测字节序列是否像 GBK 编码
///
/// 第一字节范围 0x81-0xFE，第二字节范围 0x40-0xFE
fn looks_like_gbk(bytes: &[u8]) -> bool {
    let mut gbk_pairs = 0;
    let mut total_pairs = 0;

    let mut i = 0;
    while i < bytes.len().saturating_sub(1) {
        let b1 = bytes[i];
        let b2 = bytes[i + 1];

        if b1 < 0x80 {
            i += 1;
            continue;
        }

        total_pairs += 1;
        if (0x81..=0xFE).contains(&b1) && (0x40..=0xFE).contains(&b2) {
            gbk_pairs += 1;
            i += 2;
        } else {
            i += 1;
        }
    }

    total_pairs > 0 && (gbk_pairs as f32 / total_pairs as f32) > 0.5
}
