//! 规则源：结构化 XML 规则文件与传统 magic 文本两种格式
pub mod config_tree;
pub mod magic;
pub mod structured;

pub use self::config_tree::{ConfigNode, ConfigTreeReader};
pub use self::magic::MagicParser;
pub use self::structured::{StructuredParser, StructuredWriter};

/// 解析整数字面量：十进制或 `0x` 十六进制，允许前导负号
pub(crate) fn parse_number(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    let (negative, digits) = match raw.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, raw.strip_prefix('+').unwrap_or(raw)),
    };

    let magnitude = match digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        // 十六进制允许写满 64 位（如 0xffffffffffffffff）
        Some(hex) => u64::from_str_radix(hex, 16).ok()? as i64,
        None => {
            if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            digits.parse::<i64>().ok()?
        }
    };

    Some(if negative { magnitude.wrapping_neg() } else { magnitude })
}
