/// 解析一个 EPUB 文件并打印书籍信息、封面状态和目录结构
///
/// 用法: explore_epub <file.epub>
/// 设置 RUST_LOG=debug 可以看到每个封面策略和目录层级的尝试过程

use epub_ingest::{EpubParser, ParserConfig, TocItem};
use std::path::Path;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let Some(arg) = std::env::args().nth(1) else {
        eprintln!("用法: explore_epub <file.epub>");
        std::process::exit(2);
    };
    let epub_path = Path::new(&arg);

    let parser = EpubParser::new(ParserConfig::default());
    if let Err(e) = parser.check(epub_path) {
        eprintln!("✗ 校验失败: {}", e);
        std::process::exit(1);
    }
    println!("✓ EPUB 校验通过: {:?}\n", epub_path);

    let result = parser.parse(epub_path);
    if !result.success {
        eprintln!("✗ 解析失败: {}", result.error.unwrap_or_default());
        std::process::exit(1);
    }

    println!("=== 书籍信息 ===");
    let info = &result.book_info;
    println!("书名: {}", info.title);
    println!("作者: {}", info.author);
    if !info.translator.is_empty() {
        println!("译者: {}", info.translator);
    }
    println!("出版社: {}", info.publisher);
    println!("ISBN: {}", info.isbn);
    println!("出版日期: {}", info.publication_date);
    println!("语言: {}", info.language);
    println!();

    println!("=== 封面 ===");
    match &result.cover_info {
        Some(cover) => {
            println!("状态: {}", cover.alt_text);
            if let Some(path) = &cover.source_path {
                println!("路径: {}", path);
            }
            println!("数据长度: {} 字节", cover.cover_image.len());
        }
        None => println!("未提取"),
    }
    println!();

    println!("=== 目录 ({} 项) ===", result.table_of_contents.len());
    for item in &result.table_of_contents {
        print_toc_item(item);
    }
    println!();

    println!("=== 各层级条目数 ===");
    let max_level = result.table_of_contents.iter().map(|i| i.level).max().unwrap_or(0);
    for level in 1..=max_level {
        let count = result.table_of_contents.iter().filter(|i| i.level == level).count();
        println!("第 {} 层: {} 项", level, count);
    }
}

fn print_toc_item(item: &TocItem) {
    let indent = "  ".repeat(item.level.saturating_sub(1) as usize);
    println!("{}[{}] \"{}\" -> {}", indent, item.id, item.title, item.href);
}
