// 测试辅助：在内存中构建 EPUB 压缩包

use image::{ImageBuffer, ImageFormat, Rgb};
use std::io::{Cursor, Write};
use tempfile::NamedTempFile;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

pub const CONTAINER_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="{OPF}" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>"#;

#[derive(Default)]
pub struct EpubBuilder {
    files: Vec<(String, Vec<u8>)>,
}

impl EpubBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 带 mimetype、container.xml 和 OPF 的标准骨架
    pub fn standard(opf_path: &str, opf: &str) -> Self {
        Self::new()
            .text("mimetype", "application/epub+zip")
            .text("META-INF/container.xml", &CONTAINER_XML.replace("{OPF}", opf_path))
            .text(opf_path, opf)
    }

    pub fn file(mut self, path: &str, data: &[u8]) -> Self {
        self.files.push((path.to_string(), data.to_vec()));
        self
    }

    pub fn text(self, path: &str, content: &str) -> Self {
        self.file(path, content.as_bytes())
    }

    pub fn build(&self) -> Vec<u8> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
        for (path, data) in &self.files {
            zip.start_file(path.as_str(), options).unwrap();
            zip.write_all(data).unwrap();
        }
        zip.finish().unwrap().into_inner()
    }

    /// 写入带 .epub 后缀的临时文件
    pub fn write_temp(&self) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".epub").tempfile().unwrap();
        file.write_all(&self.build()).unwrap();
        file.flush().unwrap();
        file
    }
}

/// 生成一张纯色 PNG
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let image = ImageBuffer::from_pixel(width, height, Rgb([200u8, 40, 40]));
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
    bytes
}

/// 拼出一个 OPF 文档
pub fn opf(metadata: &str, manifest: &str, spine: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="3.0" unique-identifier="uid"
         xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:opf="http://www.idpf.org/2007/opf">
  <metadata>{}</metadata>
  <manifest>{}</manifest>
  {}
</package>"#,
        metadata, manifest, spine
    )
}

/// 简单的 XHTML 内容文档
pub fn xhtml(title: &str, body: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<html xmlns="http://www.w3.org/1999/xhtml"><head><title>{}</title></head>
<body>{}</body></html>"#,
        title, body
    )
}
