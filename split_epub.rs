/// 按目录层级拆分 EPUB 章节，输出统计信息和 JSON 格式的章节列表
///
/// 用法: split_epub <file.epub> [level] [maxLen]

use epub_ingest::{EpubParser, ParserConfig, SplitOptions};
use std::path::Path;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        eprintln!("用法: split_epub <file.epub> [level] [maxLen]");
        std::process::exit(2);
    }
    let epub_path = Path::new(&args[1]);

    let level = match args.get(2).map(|s| s.parse::<u32>()) {
        Some(Ok(level)) if level > 0 => level,
        Some(_) => {
            eprintln!("错误: level 必须是正整数");
            std::process::exit(2);
        }
        None => 1,
    };
    let max_chapter_length = match args.get(3).map(|s| s.parse::<usize>()) {
        Some(Ok(max)) => Some(max),
        Some(Err(_)) => {
            eprintln!("错误: maxLen 必须是非负整数");
            std::process::exit(2);
        }
        None => None,
    };

    let parser = EpubParser::new(ParserConfig {
        extract_cover: false,
        ..ParserConfig::default()
    });
    let result = parser.parse(epub_path);
    if !result.success {
        eprintln!("✗ 解析失败: {}", result.error.unwrap_or_default());
        std::process::exit(1);
    }

    let options = SplitOptions {
        level,
        max_chapter_length,
        ..SplitOptions::default()
    };
    let chapters = match parser.split_chapters(epub_path, &result.table_of_contents, &options) {
        Ok(chapters) => chapters,
        Err(e) => {
            eprintln!("✗ 拆分失败: {}", e);
            std::process::exit(1);
        }
    };

    let stats = parser.chapter_stats(&chapters);
    eprintln!("《{}》第 {} 层", result.book_info.title, level);
    eprintln!("章节数: {}", stats.total_chapters);
    eprintln!("总字数: {}", stats.total_words);
    eprintln!("平均字数: {}", stats.average_words);
    if let Some(longest) = &stats.longest_chapter {
        eprintln!("最长: [{}] {} ({} 字)", longest.index, longest.title, longest.word_count);
    }
    if let Some(shortest) = &stats.shortest_chapter {
        eprintln!("最短: [{}] {} ({} 字)", shortest.index, shortest.title, shortest.word_count);
    }

    match serde_json::to_string_pretty(&chapters) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            eprintln!("✗ JSON 序列化失败: {}", e);
            std::process::exit(1);
        }
    }
}
