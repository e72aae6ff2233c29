//! 全局检测器单例管理
//! 未显式初始化时，首次调用自动以默认配置创建（规则仍按需惰性加载）
use once_cell::sync::OnceCell;
use std::path::Path;
use tracing::debug;

use super::detector::MimeDetector;
use crate::config::GlobalConfig;
use crate::error::{RsmResult, RsmimeError};
use crate::rule::{Classification, RuleLibrary};

/// 全局检测器实例
static GLOBAL_DETECTOR: OnceCell<MimeDetector> = OnceCell::new();

/// 带自定义配置初始化全局检测器（立即加载规则）
/// 已初始化时直接返回成功，不会替换已有实例
pub fn init_global_detector(config: GlobalConfig) -> RsmResult<()> {
    if GLOBAL_DETECTOR.get().is_some() {
        return Ok(());
    }

    let detector = MimeDetector::load(config)?;
    install(detector)
}

/// 使用内存中的规则库初始化全局检测器
pub fn init_global_detector_with_rules(rule_lib: RuleLibrary, config: GlobalConfig) -> RsmResult<()> {
    if GLOBAL_DETECTOR.get().is_some() {
        return Ok(());
    }

    install(MimeDetector::with_rules(rule_lib, config))
}

fn install(detector: MimeDetector) -> RsmResult<()> {
    // 并发初始化时后到者失败，但已有实例可用，视为成功
    if GLOBAL_DETECTOR.set(detector).is_err() {
        debug!("全局检测器已被并发初始化，保留现有实例");
    }
    Ok(())
}

/// 获取全局检测器（未初始化时以默认配置创建）
pub fn global_detector() -> &'static MimeDetector {
    GLOBAL_DETECTOR.get_or_init(|| MimeDetector::new(GlobalConfig::default()))
}

/// 获取已显式初始化的全局检测器
pub fn try_global_detector() -> RsmResult<&'static MimeDetector> {
    GLOBAL_DETECTOR.get().ok_or_else(|| {
        RsmimeError::DetectorNotInitialized("请先调用 init_global_detector".to_string())
    })
}

/// 使用全局检测器识别内存数据
pub fn detect_bytes(buffer: &[u8]) -> RsmResult<Classification> {
    global_detector().classify_bytes(buffer)
}

/// 使用全局检测器识别文件
pub fn detect_path(path: impl AsRef<Path>) -> RsmResult<Classification> {
    global_detector().classify_path(path)
}
