//! rsmime 命令行工具
//! `rsmime FILE` 输出 MIME 类型；不带参数时列出已加载的全部规则

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use rsmime::rule::{classification_to_compact_json, rule_infos_to_pretty_json};
use rsmime::{ConfigManager, GlobalConfig, MagicConverter, MimeDetector, DEFAULT_MAX_PREFIX_LEN};

#[derive(Parser, Debug)]
#[command(name = "rsmime")]
#[command(about = "按文件内容识别 MIME 类型，无法识别时按扩展名回退")]
#[command(version)]
struct Args {
    /// 待识别的文件；省略时列出全部已加载规则
    file: Option<PathBuf>,

    /// 结构化 XML 规则文件（优先于 --magic）
    #[arg(long, value_name = "XML")]
    rules: Option<PathBuf>,

    /// magic 规则文件
    #[arg(long, value_name = "FILE")]
    magic: Option<PathBuf>,

    /// 解析后规则的 MessagePack 缓存
    #[arg(long, value_name = "PATH")]
    cache: Option<PathBuf>,

    /// 读取的文件头最大字节数
    #[arg(long, value_name = "N", default_value_t = DEFAULT_MAX_PREFIX_LEN)]
    prefix: usize,

    /// 以 JSON 输出
    #[arg(long)]
    json: bool,

    /// 详细日志
    #[arg(short, long)]
    verbose: bool,

    /// 把 magic 文件转换为结构化 XML 规则
    #[arg(long, value_name = "MAGIC")]
    convert: Option<PathBuf>,

    /// --convert 的输出路径（省略时写到标准输出）
    #[arg(short, long, value_name = "XML", requires = "convert")]
    output: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    if let Some(input) = &args.convert {
        return convert(input, args.output.as_deref());
    }

    let detector = MimeDetector::new(build_config(&args));
    match &args.file {
        Some(path) => classify(&detector, path, args.json),
        None => list_rules(&detector, args.json),
    }
}

fn init_tracing(verbose: bool) {
    let env_filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if verbose {
        EnvFilter::new("rsmime=debug")
    } else {
        EnvFilter::new("rsmime=warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

fn build_config(args: &Args) -> GlobalConfig {
    let mut builder = ConfigManager::custom().max_prefix_len(args.prefix).verbose(args.verbose);
    if let Some(rules) = &args.rules {
        builder = builder.structured_file(rules);
    }
    if let Some(magic) = &args.magic {
        builder = builder.magic_file(magic);
    }
    if let Some(cache) = &args.cache {
        builder = builder.rule_cache_path(cache.clone());
    }
    builder.build()
}

fn classify(detector: &MimeDetector, path: &Path, json: bool) -> Result<()> {
    let result = detector
        .classify_path(path)
        .with_context(|| format!("识别失败：{}", path.display()))?;

    if let Some(detection) = result.detection() {
        info!("{}: {}", path.display(), detection.designation);
    }

    if json {
        println!("{}", classification_to_compact_json(&result)?);
    } else {
        println!("{}", result);
    }
    Ok(())
}

fn list_rules(detector: &MimeDetector, json: bool) -> Result<()> {
    let rules = detector.list_rules().context("规则加载失败")?;

    if json {
        println!("{}", rule_infos_to_pretty_json(&rules)?);
    } else {
        for rule in &rules {
            println!("{}", rule);
        }
    }
    Ok(())
}

fn convert(input: &Path, output: Option<&Path>) -> Result<()> {
    match output {
        Some(output) => {
            let count = MagicConverter::convert_file(input, output)
                .with_context(|| format!("转换失败：{}", input.display()))?;
            eprintln!("已写出 {} 条规则到 {}", count, output.display());
        }
        None => {
            let bytes = fs::read(input).with_context(|| format!("读取失败：{}", input.display()))?;
            print!("{}", MagicConverter::convert(&String::from_utf8_lossy(&bytes))?);
        }
    }
    Ok(())
}
