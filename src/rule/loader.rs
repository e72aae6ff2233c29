//! 规则加载管理器
//! 按配置解析规则来源（内置 / 结构化文件 / magic 文件），优先使用未过期的本地缓存

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

use super::cache::RuleCacheManager;
use super::model::RuleLibrary;
use super::source::{MagicParser, StructuredParser};
use crate::config::{GlobalConfig, RuleOrigin};
use crate::error::{RsmResult, RsmimeError};

/// 解析后的具体规则来源
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedSource {
    Embedded,
    Structured(PathBuf),
    Magic(PathBuf),
}

impl ResolvedSource {
    /// 文件型来源的路径（内置规则无路径，也不走缓存）
    pub fn path(&self) -> Option<&Path> {
        match self {
            ResolvedSource::Embedded => None,
            ResolvedSource::Structured(path) | ResolvedSource::Magic(path) => Some(path),
        }
    }
}

/// 规则加载管理器
pub struct RuleLoader;

impl RuleLoader {
    /// 加载规则库（优先本地缓存，缓存缺失/过期/损坏时解析规则源并回写缓存）
    pub fn load(config: &GlobalConfig) -> RsmResult<RuleLibrary> {
        let source = Self::resolve_source(&config.rule_origin);
        debug!("规则来源：{:?}", source);

        // 1. 优先加载本地缓存
        let cache_target = config.rule_cache_path.as_deref().zip(source.path());
        if let Some((cache_path, source_path)) = cache_target {
            if RuleCacheManager::is_fresh(cache_path, source_path) {
                match RuleCacheManager::load_from_cache(cache_path) {
                    Ok(rule_lib) => {
                        debug!("从本地缓存 {} 加载规则库成功", cache_path.display());
                        return Ok(rule_lib);
                    }
                    Err(e) => warn!("本地缓存 {} 不可用，重新解析规则源：{}", cache_path.display(), e),
                }
            } else {
                debug!("本地缓存 {} 不存在或已过期", cache_path.display());
            }
        }

        // 2. 解析规则源
        let start = Instant::now();
        let rule_lib = Self::load_source(&source)?;
        info!(
            "规则库加载完成：共 {} 条规则（顶层 {} 条），来源 {:?}，耗时 {:?}",
            rule_lib.total_rules(),
            rule_lib.rules.len(),
            source,
            start.elapsed()
        );

        // 3. 缓存到本地
        if let Some((cache_path, _)) = cache_target {
            match RuleCacheManager::save_to_cache(cache_path, &rule_lib) {
                Ok(()) => debug!("规则库已缓存到 {}", cache_path.display()),
                Err(e) => warn!("规则库缓存到 {} 失败：{}", cache_path.display(), e),
            }
        }

        Ok(rule_lib)
    }

    /// 解析规则来源：结构化文件优先，未配置（或不存在）时回退到 magic 文件，都未配置则用内置规则
    pub fn resolve_source(origin: &RuleOrigin) -> ResolvedSource {
        match origin {
            RuleOrigin::Embedded => ResolvedSource::Embedded,
            RuleOrigin::StructuredFile(path) => ResolvedSource::Structured(path.clone()),
            RuleOrigin::MagicFile(path) => ResolvedSource::Magic(path.clone()),
            RuleOrigin::Auto { structured, magic } => match (structured, magic) {
                (Some(path), _) if path.exists() => ResolvedSource::Structured(path.clone()),
                (Some(path), Some(fallback)) => {
                    warn!(
                        "结构化规则文件 {} 不存在，回退到 magic 文件 {}",
                        path.display(),
                        fallback.display()
                    );
                    ResolvedSource::Magic(fallback.clone())
                }
                // 只配置了结构化文件：保留路径，由读取时报告 IO 错误
                (Some(path), None) => ResolvedSource::Structured(path.clone()),
                (None, Some(fallback)) => ResolvedSource::Magic(fallback.clone()),
                (None, None) => ResolvedSource::Embedded,
            },
        }
    }

    /// 直接解析规则源（不经过缓存）
    pub fn load_source(source: &ResolvedSource) -> RsmResult<RuleLibrary> {
        match source {
            ResolvedSource::Embedded => Self::load_embedded(),
            ResolvedSource::Structured(path) => {
                let text = fs::read_to_string(path)?;
                StructuredParser::parse(&text)
            }
            ResolvedSource::Magic(path) => {
                // magic 文件的注释可能不是 UTF-8
                let bytes = fs::read(path)?;
                let rule_lib = MagicParser::parse(&String::from_utf8_lossy(&bytes));
                if rule_lib.is_empty() {
                    return Err(RsmimeError::RuleLoadError(format!(
                        "{} 中没有可用的 magic 规则",
                        path.display()
                    )));
                }
                Ok(rule_lib)
            }
        }
    }

    #[cfg(feature = "embedded-rules")]
    fn load_embedded() -> RsmResult<RuleLibrary> {
        StructuredParser::parse(crate::rsmime_rules::EMBEDDED_DETECTORS)
    }

    #[cfg(not(feature = "embedded-rules"))]
    fn load_embedded() -> RsmResult<RuleLibrary> {
        Err(RsmimeError::FeatureDisabled(
            "未启用 embedded-rules 特性，无法使用内置规则库，请启用该特性或配置规则文件".to_string(),
        ))
    }
}
