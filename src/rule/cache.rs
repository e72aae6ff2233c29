//! 规则缓存管理
//! 仅处理规则库的本地序列化（MessagePack）和反序列化
//! 缓存只在不早于规则源文件时才被采用

use std::fs;
use std::path::Path;
use std::time::SystemTime;

use rmp_serde::{from_slice, Serializer};
use serde::Serialize;
use tracing::debug;

use super::model::RuleLibrary;
use crate::error::{RsmResult, RsmimeError};

/// 规则缓存管理器
pub struct RuleCacheManager;

impl RuleCacheManager {
    /// 从本地缓存加载规则库
    pub fn load_from_cache(cache_path: &Path) -> RsmResult<RuleLibrary> {
        let cache_data = fs::read(cache_path)?;

        // MessagePack反序列化
        let rule_lib: RuleLibrary = from_slice(&cache_data)
            .map_err(|e| RsmimeError::RuleCacheError(format!("反序列化失败：{}", e)))?;

        debug!(
            "规则缓存 {} 加载完成：top_level={} total={}",
            cache_path.display(),
            rule_lib.rules.len(),
            rule_lib.total_rules()
        );
        Ok(rule_lib)
    }

    /// 将规则库缓存到本地（按需创建父目录）
    pub fn save_to_cache(cache_path: &Path, rule_lib: &RuleLibrary) -> RsmResult<()> {
        let mut cache_data = Vec::new();

        // MessagePack序列化（map 形式，保留字段名）
        rule_lib
            .serialize(&mut Serializer::new(&mut cache_data).with_struct_map())
            .map_err(|e| RsmimeError::RuleCacheError(format!("序列化失败：{}", e)))?;

        debug!("规则库序列化为 {} 字节", cache_data.len());

        if let Some(parent) = cache_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(cache_path, cache_data)?;
        Ok(())
    }

    /// 清除本地缓存
    pub fn clear_cache(cache_path: &Path) -> RsmResult<()> {
        if cache_path.exists() {
            fs::remove_file(cache_path)?;
        }
        Ok(())
    }

    /// 缓存存在且修改时间不早于规则源
    pub fn is_fresh(cache_path: &Path, source_path: &Path) -> bool {
        match (Self::modified(cache_path), Self::modified(source_path)) {
            (Some(cache_time), Some(source_time)) => cache_time >= source_time,
            _ => false,
        }
    }

    fn modified(path: &Path) -> Option<SystemTime> {
        fs::metadata(path).and_then(|m| m.modified()).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::model::{MagicTest, PrimitiveType, RuleDefinition, RuleKind, TestValue};
    use tempfile::tempdir;

    fn sample_library() -> RuleLibrary {
        RuleLibrary::new(vec![
            RuleDefinition::magic(MagicTest::new(0, PrimitiveType::String, TestValue::Bytes(b"%PDF-".to_vec())))
                .with_mime("application/pdf")
                .with_extension("pdf"),
            RuleDefinition::new(RuleKind::Lookup).with_mime("text/csv").with_extension("csv"),
        ])
    }

    #[test]
    fn test_save_and_load_cache() {
        let dir = tempdir().unwrap();
        let cache_path = dir.path().join("nested").join("rules.mp");
        let library = sample_library();

        RuleCacheManager::save_to_cache(&cache_path, &library).unwrap();
        assert_eq!(RuleCacheManager::load_from_cache(&cache_path).unwrap(), library);

        RuleCacheManager::clear_cache(&cache_path).unwrap();
        assert!(!cache_path.exists());
        // 不存在时清除不报错
        RuleCacheManager::clear_cache(&cache_path).unwrap();
    }

    #[test]
    fn test_corrupt_cache_is_error() {
        let dir = tempdir().unwrap();
        let cache_path = dir.path().join("rules.mp");
        fs::write(&cache_path, b"\xc1 definitely not msgpack").unwrap();

        assert!(matches!(
            RuleCacheManager::load_from_cache(&cache_path),
            Err(RsmimeError::RuleCacheError(_))
        ));
        assert!(matches!(
            RuleCacheManager::load_from_cache(&dir.path().join("missing.mp")),
            Err(RsmimeError::IoError(_))
        ));
    }

    #[test]
    fn test_freshness() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("detectors.xml");
        let cache = dir.path().join("rules.mp");

        fs::write(&source, "<detectors/>").unwrap();
        assert!(!RuleCacheManager::is_fresh(&cache, &source));

        RuleCacheManager::save_to_cache(&cache, &sample_library()).unwrap();
        assert!(RuleCacheManager::is_fresh(&cache, &source));
    }
}
