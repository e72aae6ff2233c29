//! rsmime - 基于魔数规则的 MIME 类型识别库
//! 字节模式、XML 命名空间、zip 条目三类规则，内容无法识别时按扩展名回退

pub mod config;
pub mod error;
pub mod rule;
pub mod compiler;
pub mod analyzer;
pub mod detector;
pub mod utils;

// 导出全局错误类型
pub use self::error::{RsmResult, RsmimeError};

// 导出配置模块
pub use self::config::{ConfigManager, CustomConfigBuilder, GlobalConfig, RuleOrigin, DEFAULT_MAX_PREFIX_LEN};

// 导出规则模块核心接口
pub use self::rule::{
    Classification, Detection, MagicConverter, RuleCacheManager, RuleDefinition, RuleInfo, RuleLibrary,
    RuleLoader, StructuredParser, StructuredWriter, MagicParser, FAILED_TO_DETERMINE,
};

// 导出编译模块核心接口
pub use self::compiler::{CompiledRule, CompiledRuleSet, RuleCompiler};

// 导出检测模块核心接口
pub use self::detector::{
    MimeDetector, ReloadHandle, detect_bytes, detect_path, init_global_detector,
    init_global_detector_with_rules,
};

// 内置默认规则库 - 仅在开启embedded-rules特性时编译
#[cfg(feature = "embedded-rules")]
pub mod rsmime_rules {
    /// 默认结构化规则文档（data/detectors.xml）
    pub static EMBEDDED_DETECTORS: &str = include_str!("../data/detectors.xml");
}
