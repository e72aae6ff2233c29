//! 全局错误类型定义
//! 规则级别的问题（单条规则/单行解析失败）只记录日志并跳过，不会出现在这里

use thiserror::Error;
use regex::Error as RegexError;
use serde_json::Error as SerdeJsonError;
use std::io::Error as IoError;

#[derive(Error, Debug)]
pub enum RsmimeError {
    // 规则相关错误
    #[error("规则加载失败：{0}")]
    RuleLoadError(String),
    #[error("规则解析失败：{0}")]
    RuleParseError(String),
    #[error("规则缓存失败：{0}")]
    RuleCacheError(String),
    #[error("规则转换失败：{0}")]
    RuleConvertError(String),

    // 编译相关错误
    #[error("正则编译失败：{0}")]
    RegexCompileError(#[from] RegexError),

    // 配置文档错误（XML 文档本身不可读）
    #[error("配置XML解析失败：{0}")]
    XmlError(String),

    // 检测相关错误
    #[error("检测器未初始化：{0}")]
    DetectorNotInitialized(String),
    #[error("特性未启用：{0}")]
    FeatureDisabled(String),

    // 基础错误
    #[error("IO操作失败：{0}")]
    IoError(#[from] IoError),
    #[error("JSON序列化失败：{0}")]
    JsonError(#[from] SerdeJsonError),
}

impl From<quick_xml::Error> for RsmimeError {
    fn from(e: quick_xml::Error) -> Self {
        RsmimeError::XmlError(e.to_string())
    }
}

// 全局Result类型
pub type RsmResult<T> = Result<T, RsmimeError>;
