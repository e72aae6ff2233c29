//! 检测模块：识别引擎与可选的进程级单例
pub mod global;
pub mod detector;

// 导出核心接口
pub use self::detector::{MimeDetector, ReloadHandle};
pub use self::global::{
    detect_bytes, detect_path, global_detector, init_global_detector, init_global_detector_with_rules,
    try_global_detector,
};
