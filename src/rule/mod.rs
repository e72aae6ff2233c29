//! 规则模块：负责规则的加载、缓存、格式转换、数据模型定义
pub mod model;
pub mod detect_result;
pub mod source;
pub mod cache;
pub mod loader;
pub mod converter;

// 导出核心接口
pub use self::model::{
    Comparator, Endian, MagicTest, PrimitiveType, RuleDefinition, RuleKind, RuleLibrary, TestValue, XmlTarget,
    DEFAULT_MIME_TYPE,
};
pub use self::detect_result::{
    classification_to_compact_json, rule_infos_to_pretty_json, Classification, Detection, RuleInfo, FAILED_TO_DETERMINE,
};
pub use self::source::{ConfigNode, ConfigTreeReader, MagicParser, StructuredParser, StructuredWriter};
pub use self::loader::{ResolvedSource, RuleLoader};
pub use self::cache::RuleCacheManager;
pub use self::converter::MagicConverter;
