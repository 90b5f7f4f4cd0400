use thiserror::Error;

/// EPUB 解析错误
///
/// 结构性错误（压缩包、container.xml、OPF）会让 `parse()` 直接返回失败结果；
/// 局部错误（封面、单个目录层级、单个章节）在各组件内部被吸收并降级处理。
#[derive(Error, Debug)]
pub enum EpubError {
    #[error("文件不存在: {0}")]
    FileNotFound(String),
    #[error("文件扩展名不是 .epub: {0}")]
    InvalidExtension(String),
    #[error("文件为空")]
    EmptyFile,
    #[error("文件过大: {size} 字节，上限 {max} 字节")]
    FileTooLarge { size: u64, max: u64 },
    #[error("无效的压缩包: {0}")]
    InvalidArchive(String),
    #[error("缺少 mimetype 文件或其内容不是 application/epub+zip")]
    MissingMimetype,
    #[error("缺少 META-INF/container.xml")]
    MissingContainerDescriptor,
    #[error("container.xml 格式错误: {0}")]
    MalformedContainerDescriptor(String),
    #[error("找不到 OPF 文件: {0}")]
    MissingPackageDocument(String),
    #[error("OPF 文件格式错误: {0}")]
    MalformedPackageDocument(String),
    #[error("目录为空，请先解析目录")]
    MissingTableOfContents,
    #[error("提取失败: {0}")]
    ExtractionFailed(String),
    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, EpubError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = EpubError::FileTooLarge { size: 200, max: 100 };
        assert!(err.to_string().contains("200"));
        assert!(err.to_string().contains("100"));

        let err = EpubError::ExtractionFailed("chapter1.xhtml".to_string());
        assert_eq!(err.to_string(), "提取失败: chapter1.xhtml");
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: EpubError = io.into();
        assert!(matches!(err, EpubError::Io(_)));
    }
}
