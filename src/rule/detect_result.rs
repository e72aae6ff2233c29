//! 识别结果与规则元数据的对外数据结构

use std::fmt;
use serde::{Deserialize, Serialize};

use crate::error::RsmResult;

/// 无法识别时的固定输出文本
pub const FAILED_TO_DETERMINE: &str = "Failed to determine type";

/// 一次成功识别
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Detection {
    /// 顶层命中规则的 MIME 类型
    pub mime_type: String,
    /// 父规则与所有命中子规则拼接后的描述
    pub designation: String,
    /// 顶层命中规则的主扩展名
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extension: Option<String>,
    /// 是否由扩展名回退得出（而非内容匹配）
    #[serde(default)]
    pub by_extension: bool,
}

/// 识别结果：命中 或 “无法识别”哨兵
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Classification {
    Matched(Detection),
    Failed,
}

impl Classification {
    pub fn is_matched(&self) -> bool {
        matches!(self, Classification::Matched(_))
    }

    pub fn mime_type(&self) -> Option<&str> {
        match self {
            Classification::Matched(detection) => Some(&detection.mime_type),
            Classification::Failed => None,
        }
    }

    pub fn designation(&self) -> Option<&str> {
        match self {
            Classification::Matched(detection) => Some(&detection.designation),
            Classification::Failed => None,
        }
    }

    pub fn detection(&self) -> Option<&Detection> {
        match self {
            Classification::Matched(detection) => Some(detection),
            Classification::Failed => None,
        }
    }

    /// 命中则保留自身，否则使用回退结果
    pub fn or_else(self, fallback: impl FnOnce() -> Classification) -> Classification {
        match self {
            Classification::Matched(_) => self,
            Classification::Failed => fallback(),
        }
    }
}

// ======== CLI 输出：MIME 类型或哨兵文本 ========
impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Classification::Matched(detection) => f.write_str(&detection.mime_type),
            Classification::Failed => f.write_str(FAILED_TO_DETERMINE),
        }
    }
}

/// 规则元数据（listRules 输出，先序遍历，depth 表示嵌套层级）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleInfo {
    pub depth: usize,
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<i64>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub primitive_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comparator: Option<String>,
    pub test: String,
    pub designation: String,
    pub mime_type: String,
    pub extensions: Vec<String>,
}

impl fmt::Display for RuleInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let indent = ">".repeat(self.depth);
        let offset = self.offset.map(|o| o.to_string()).unwrap_or_else(|| "-".to_string());
        write!(
            f,
            "{}{}\t{}\t{}{}\t{}\t[{}] {}",
            indent,
            offset,
            self.primitive_type.as_deref().unwrap_or(&self.kind),
            self.comparator.as_deref().unwrap_or(""),
            self.test,
            self.designation,
            self.mime_type,
            self.extensions.join(","),
        )
    }
}

/// 规则列表转为格式化 JSON
pub fn rule_infos_to_pretty_json(rules: &[RuleInfo]) -> RsmResult<String> {
    Ok(serde_json::to_string_pretty(rules)?)
}

/// 识别结果转为紧凑 JSON（无法识别时为 null）
pub fn classification_to_compact_json(classification: &Classification) -> RsmResult<String> {
    Ok(serde_json::to_string(&classification.detection())?)
}
