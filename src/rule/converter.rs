//! magic 文本 -> 结构化规则文件转换

use std::fs;
use std::path::Path;
use tracing::info;

use super::source::{MagicParser, StructuredWriter};
use crate::error::{RsmResult, RsmimeError};

/// magic 规则转换器
pub struct MagicConverter;

impl MagicConverter {
    /// 转换 magic 文本为结构化规则文档；没有任何可用规则时报错
    pub fn convert(magic_text: &str) -> RsmResult<String> {
        let library = MagicParser::parse(magic_text);
        if library.is_empty() {
            return Err(RsmimeError::RuleConvertError(
                "输入中没有可用的 magic 规则".to_string(),
            ));
        }
        StructuredWriter::write(&library)
    }

    /// 文件到文件转换，返回写出的规则总数
    pub fn convert_file(input: &Path, output: &Path) -> RsmResult<usize> {
        let bytes = fs::read(input)?;
        let text = String::from_utf8_lossy(&bytes);

        let library = MagicParser::parse(&text);
        if library.is_empty() {
            return Err(RsmimeError::RuleConvertError(format!(
                "{} 中没有可用的 magic 规则",
                input.display()
            )));
        }

        fs::write(output, StructuredWriter::write(&library)?)?;
        info!(
            "已转换 {} 条规则：{} -> {}",
            library.total_rules(),
            input.display(),
            output.display()
        );
        Ok(library.total_rules())
    }
}
