//! 全局配置管理,存储所有可配置项

use std::path::PathBuf;

/// 默认的前缀读取上限（字节）
pub const DEFAULT_MAX_PREFIX_LEN: usize = 8192;

/// 规则来源
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleOrigin {
    /// 内置规则（编译期 embed data/detectors.xml）
    Embedded,
    /// 结构化 XML 规则文件
    StructuredFile(PathBuf),
    /// 传统 Unix magic 文本规则文件
    MagicFile(PathBuf),
    /// 两者都配置：结构化规则优先，缺失时回退到 magic 文件
    Auto {
        structured: Option<PathBuf>,
        magic: Option<PathBuf>,
    },
}

/// 全局配置
#[derive(Debug, Clone)]
pub struct GlobalConfig {
    // 规则来源
    pub rule_origin: RuleOrigin,
    // 规则缓存路径（MessagePack），None 表示不缓存
    pub rule_cache_path: Option<PathBuf>,
    // 内容识别时最多读取/检查的前缀字节数
    pub max_prefix_len: usize,
    // 是否以 info 级别记录每次识别结果（默认 debug）
    pub verbose: bool,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            rule_origin: RuleOrigin::Embedded,
            rule_cache_path: None,
            max_prefix_len: DEFAULT_MAX_PREFIX_LEN,
            verbose: false,
        }
    }
}

/// 配置管理器
pub struct ConfigManager;

impl ConfigManager {
    /// 获取默认配置
    pub fn get_default() -> GlobalConfig {
        GlobalConfig::default()
    }

    /// 自定义配置
    pub fn custom() -> CustomConfigBuilder {
        CustomConfigBuilder::new()
    }
}

/// 配置构建器（便于自定义配置）
#[derive(Debug, Clone)]
pub struct CustomConfigBuilder {
    config: GlobalConfig,
}

impl Default for CustomConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CustomConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: GlobalConfig::default(),
        }
    }

    pub fn rule_origin(mut self, origin: RuleOrigin) -> Self {
        self.config.rule_origin = origin;
        self
    }

    /// 结构化规则文件（若之前已配置 magic 文件，则两者并存，结构化优先）
    pub fn structured_file(mut self, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        self.config.rule_origin = match self.config.rule_origin {
            RuleOrigin::MagicFile(magic) => RuleOrigin::Auto {
                structured: Some(path),
                magic: Some(magic),
            },
            RuleOrigin::Auto { magic, .. } => RuleOrigin::Auto {
                structured: Some(path),
                magic,
            },
            _ => RuleOrigin::StructuredFile(path),
        };
        self
    }

    /// 传统 magic 规则文件
    pub fn magic_file(mut self, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        self.config.rule_origin = match self.config.rule_origin {
            RuleOrigin::StructuredFile(structured) => RuleOrigin::Auto {
                structured: Some(structured),
                magic: Some(path),
            },
            RuleOrigin::Auto { structured, .. } => RuleOrigin::Auto {
                structured,
                magic: Some(path),
            },
            _ => RuleOrigin::MagicFile(path),
        };
        self
    }

    pub fn rule_cache_path(mut self, path: PathBuf) -> Self {
        self.config.rule_cache_path = Some(path);
        self
    }

    pub fn max_prefix_len(mut self, len: usize) -> Self {
        // 至少保留 1 字节，0 会让所有内容规则失效
        self.config.max_prefix_len = len.max(1);
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.config.verbose = verbose;
        self
    }

    pub fn build(self) -> GlobalConfig {
        self.config
    }
}
