//! MIME 识别引擎核心
//! 核心职责：
//! 1. 规则加载与编译（首次使用时惰性加载，或直接注入规则库）
//! 2. 内容识别：按声明顺序尝试顶层规则，第一个命中的规则决定结果
//! 3. 扩展名 / MIME 类型双向查询
//! 4. 规则重载：新快照构建完成后整体替换，进行中的识别继续使用旧快照

use std::ffi::OsStr;
use std::fmt;
use std::io::Read;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock, Weak};
use std::time::Instant;
use tracing::{debug, info};

use crate::analyzer::RuleEvaluator;
use crate::compiler::{CompiledRule, CompiledRuleSet, RuleCompiler};
use crate::config::GlobalConfig;
use crate::error::RsmResult;
use crate::rule::{Classification, Detection, RuleInfo, RuleLibrary, RuleLoader};
use crate::utils::PrefixReader;

/// 规则提供方：按配置加载，或使用注入的规则库
#[derive(Debug)]
enum RuleProvider {
    Configured,
    Library(RuleLibrary),
}

/// 检测器共享状态（ReloadHandle 通过弱引用访问）
#[derive(Debug)]
struct DetectorState {
    config: GlobalConfig,
    provider: RwLock<RuleProvider>,
    /// 当前规则快照，None 表示尚未加载
    snapshot: RwLock<Option<Arc<CompiledRuleSet>>>,
}

impl DetectorState {
    /// 获取当前快照，未加载时加载
    fn current(&self) -> RsmResult<Arc<CompiledRuleSet>> {
        if let Some(rules) = self.snapshot.read().unwrap_or_else(PoisonError::into_inner).as_ref() {
            return Ok(Arc::clone(rules));
        }

        // 写锁内再次检查，并发首次调用只构建一次
        let mut slot = self.snapshot.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(rules) = slot.as_ref() {
            return Ok(Arc::clone(rules));
        }
        let rules = Arc::new(self.build()?);
        *slot = Some(Arc::clone(&rules));
        Ok(rules)
    }

    fn build(&self) -> RsmResult<CompiledRuleSet> {
        let start = Instant::now();
        let provider = self.provider.read().unwrap_or_else(PoisonError::into_inner);

        let compiled = match &*provider {
            RuleProvider::Configured => {
                // 1. 加载规则库（优先从缓存加载）
                let rule_lib = RuleLoader::load(&self.config)?;
                // 2. 编译规则库
                RuleCompiler::compile(&rule_lib)
            }
            RuleProvider::Library(rule_lib) => RuleCompiler::compile(rule_lib),
        };

        info!(
            "规则集就绪：顶层规则 {} 条，耗时 {:?}",
            compiled.len(),
            start.elapsed()
        );
        Ok(compiled)
    }

    /// 构建新快照后替换；构建失败时保留旧快照
    fn reload(&self) -> RsmResult<()> {
        let rules = Arc::new(self.build()?);
        let mut slot = self.snapshot.write().unwrap_or_else(PoisonError::into_inner);
        *slot = Some(rules);
        debug!("规则快照已替换");
        Ok(())
    }
}

/// MIME 识别引擎
/// 克隆开销很小，克隆体共享同一份规则快照
#[derive(Debug, Clone)]
pub struct MimeDetector {
    state: Arc<DetectorState>,
}

impl MimeDetector {
    /// 创建检测器（惰性：首次识别/查询时才加载规则）
    pub fn new(config: GlobalConfig) -> Self {
        Self {
            state: Arc::new(DetectorState {
                config,
                provider: RwLock::new(RuleProvider::Configured),
                snapshot: RwLock::new(None),
            }),
        }
    }

    /// 创建检测器并立即加载规则，加载失败直接返回错误
    pub fn load(config: GlobalConfig) -> RsmResult<Self> {
        let detector = Self::new(config);
        detector.rule_set()?;
        Ok(detector)
    }

    /// 使用内存中的规则库创建检测器（立即编译）
    pub fn with_rules(rule_lib: RuleLibrary, config: GlobalConfig) -> Self {
        let compiled = RuleCompiler::compile(&rule_lib);
        Self {
            state: Arc::new(DetectorState {
                config,
                provider: RwLock::new(RuleProvider::Library(rule_lib)),
                snapshot: RwLock::new(Some(Arc::new(compiled))),
            }),
        }
    }

    pub fn config(&self) -> &GlobalConfig {
        &self.state.config
    }

    /// 规则是否已加载
    pub fn is_loaded(&self) -> bool {
        self.state
            .snapshot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// 当前规则快照
    pub fn rule_set(&self) -> RsmResult<Arc<CompiledRuleSet>> {
        self.state.current()
    }

    /// 按原来源重新加载规则
    pub fn reload(&self) -> RsmResult<()> {
        self.state.reload()
    }

    /// 用新的规则库替换当前规则（之后的 reload 也使用该规则库）
    pub fn reload_with(&self, rule_lib: RuleLibrary) -> RsmResult<()> {
        *self.state.provider.write().unwrap_or_else(PoisonError::into_inner) = RuleProvider::Library(rule_lib);
        self.state.reload()
    }

    /// 获取重载句柄，供外部变更监听方触发重载
    pub fn reload_handle(&self) -> ReloadHandle {
        ReloadHandle {
            state: Arc::downgrade(&self.state),
        }
    }

    /// 识别内存数据（只检查前 max_prefix_len 字节）
    pub fn classify_bytes(&self, buffer: &[u8]) -> RsmResult<Classification> {
        let rules = self.rule_set()?;
        let prefix = &buffer[..buffer.len().min(self.state.config.max_prefix_len)];
        let result = Self::classify_with(&rules, prefix);
        self.report(format_args!("{} 字节输入", prefix.len()), &result);
        Ok(result)
    }

    /// 识别任意字节流（只读取前 max_prefix_len 字节）
    pub fn classify_reader<R: Read>(&self, reader: R) -> RsmResult<Classification> {
        let prefix = PrefixReader::read_prefix(reader, self.state.config.max_prefix_len)?;
        self.classify_bytes(&prefix)
    }

    /// 识别文件：内容无法识别时按扩展名回退
    pub fn classify_path(&self, path: impl AsRef<Path>) -> RsmResult<Classification> {
        let path = path.as_ref();
        let prefix = PrefixReader::read_file_prefix(path, self.state.config.max_prefix_len)?;
        self.classify_file_prefix(path, &prefix)
    }

    /// 异步识别文件（tokio::fs 读取前缀）
    #[cfg(feature = "async-io")]
    pub async fn classify_path_async(&self, path: impl AsRef<Path>) -> RsmResult<Classification> {
        let path = path.as_ref();
        let prefix = PrefixReader::read_file_prefix_async(path, self.state.config.max_prefix_len).await?;
        self.classify_file_prefix(path, &prefix)
    }

    /// 扩展名 -> 类型（忽略大小写与前导点；先序遍历整个规则森林，第一个声明该扩展名的规则生效）
    pub fn extension_to_mime(&self, extension: &str) -> RsmResult<Classification> {
        let rules = self.rule_set()?;
        Ok(Self::lookup_extension(&rules, extension))
    }

    /// 类型 -> 主扩展名；未知类型返回空串
    pub fn mime_to_extension(&self, mime_type: &str) -> RsmResult<String> {
        let rules = self.rule_set()?;
        let mime_type = mime_type.trim();

        Ok(rules
            .iter_all()
            .find(|rule| rule.mime_type.eq_ignore_ascii_case(mime_type))
            .and_then(CompiledRule::primary_extension)
            .unwrap_or_default()
            .to_string())
    }

    /// 导出所有规则的元数据（先序）
    pub fn list_rules(&self) -> RsmResult<Vec<RuleInfo>> {
        let rules = self.rule_set()?;
        Ok(rules.iter_all().map(CompiledRule::info).collect())
    }

    /// 规则总数（含子规则）
    pub fn rule_count(&self) -> RsmResult<usize> {
        Ok(self.rule_set()?.iter_all().count())
    }

    fn classify_file_prefix(&self, path: &Path, prefix: &[u8]) -> RsmResult<Classification> {
        let rules = self.rule_set()?;

        let result = Self::classify_with(&rules, prefix).or_else(|| {
            path.extension()
                .and_then(OsStr::to_str)
                .map(|ext| Self::lookup_extension(&rules, ext))
                .unwrap_or(Classification::Failed)
        });

        self.report(path.display(), &result);
        Ok(result)
    }

    /// 记录识别结果：verbose 配置下为 info 级别，否则为 debug
    fn report(&self, subject: impl fmt::Display, result: &Classification) {
        let by_extension = result.detection().is_some_and(|d| d.by_extension);
        if self.state.config.verbose {
            info!("{} 识别为 {}（扩展名回退：{}）", subject, result, by_extension);
        } else {
            debug!("{} 识别为 {}（扩展名回退：{}）", subject, result, by_extension);
        }
    }

    /// 内容识别：第一个命中的顶层规则决定结果
    fn classify_with(rules: &CompiledRuleSet, buffer: &[u8]) -> Classification {
        rules
            .rules
            .iter()
            .find_map(|rule| RuleEvaluator::evaluate(rule, buffer).map(|designation| (rule, designation)))
            .map(|(rule, designation)| {
                Classification::Matched(Detection {
                    mime_type: rule.mime_type.clone(),
                    designation,
                    extension: rule.primary_extension().map(str::to_string),
                    by_extension: false,
                })
            })
            .unwrap_or(Classification::Failed)
    }

    fn lookup_extension(rules: &CompiledRuleSet, extension: &str) -> Classification {
        let extension = extension.trim().trim_start_matches('.');
        if extension.is_empty() {
            return Classification::Failed;
        }

        rules
            .iter_all()
            .find(|rule| rule.has_extension(extension))
            .map(|rule| {
                Classification::Matched(Detection {
                    mime_type: rule.mime_type.clone(),
                    designation: rule.designation.clone(),
                    extension: rule.primary_extension().map(str::to_string),
                    by_extension: true,
                })
            })
            .unwrap_or(Classification::Failed)
    }
}

/// 重载句柄
/// 只持有弱引用：检测器释放后通知不再生效
#[derive(Debug, Clone)]
pub struct ReloadHandle {
    state: Weak<DetectorState>,
}

impl ReloadHandle {
    /// 触发重载；返回 Ok(false) 表示检测器已释放
    pub fn notify(&self) -> RsmResult<bool> {
        match self.state.upgrade() {
            Some(state) => {
                state.reload()?;
                Ok(true)
            }
            None => {
                debug!("检测器已释放，忽略重载请求");
                Ok(false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigManager, RuleOrigin};
    use crate::error::RsmimeError;
    use crate::rule::model::{MagicTest, PrimitiveType, RuleDefinition, RuleKind, TestValue, XmlTarget};
    use std::io::Cursor;
    use std::path::PathBuf;

    fn string_rule(offset: i64, literal: &[u8], mime: &str) -> RuleDefinition {
        RuleDefinition::magic(MagicTest::new(offset, PrimitiveType::String, TestValue::Bytes(literal.to_vec())))
            .with_mime(mime)
    }

    fn sample_detector() -> MimeDetector {
        let library = RuleLibrary::new(vec![
            string_rule(0, b"%PDF-", "application/pdf")
                .with_extension("pdf")
                .with_designation("PDF document,")
                .with_child(
                    RuleDefinition::magic(MagicTest::new(5, PrimitiveType::String, TestValue::Any))
                        .with_designation("version %s"),
                ),
            RuleDefinition::new(RuleKind::Xml(XmlTarget::Namespace("http://www.w3.org/2000/svg".to_string())))
                .with_mime("image/svg+xml")
                .with_extension("svg"),
            string_rule(0, b"<html", "text/html").with_extension("htm").with_extension("html"),
            string_rule(0, b"<HTML", "text/html").with_extension("xhtm"),
            RuleDefinition::new(RuleKind::Lookup).with_mime("text/csv").with_extension("csv"),
        ]);
        MimeDetector::with_rules(library, GlobalConfig::default())
    }

    #[test]
    fn test_classify_bytes_first_match_wins() {
        let detector = sample_detector();

        let result = detector.classify_bytes(b"%PDF-1.7\n%binary").unwrap();
        assert_eq!(result.mime_type(), Some("application/pdf"));
        assert_eq!(result.designation(), Some("PDF document, version 1.7"));
        assert_eq!(result.detection().and_then(|d| d.extension.as_deref()), Some("pdf"));

        let svg = br#"<svg xmlns="http://www.w3.org/2000/svg"/>"#;
        assert_eq!(detector.classify_bytes(svg).unwrap().mime_type(), Some("image/svg+xml"));

        assert_eq!(detector.classify_bytes(b"a,b,c\n1,2,3\n").unwrap(), Classification::Failed);
        assert_eq!(detector.classify_bytes(b"").unwrap(), Classification::Failed);
    }

    #[test]
    fn test_prefix_limit_applies() {
        let library = RuleLibrary::new(vec![string_rule(10, b"MARK", "application/x-mark")]);
        let config = ConfigManager::custom().max_prefix_len(12).build();
        let detector = MimeDetector::with_rules(library, config);

        // 标记跨越前缀边界：不可见
        assert!(!detector.classify_bytes(b"0123456789MARK").unwrap().is_matched());
        assert!(!detector.classify_reader(Cursor::new(b"0123456789MARK".to_vec())).unwrap().is_matched());
    }

    #[test]
    fn test_extension_and_mime_lookups() {
        let detector = sample_detector();

        let csv = detector.extension_to_mime(".CSV").unwrap();
        assert_eq!(csv.mime_type(), Some("text/csv"));
        assert!(csv.detection().unwrap().by_extension);

        assert_eq!(detector.extension_to_mime("").unwrap(), Classification::Failed);
        assert_eq!(detector.extension_to_mime("nope").unwrap(), Classification::Failed);

        // 第一个声明该类型的规则的最后一个扩展名
        assert_eq!(detector.mime_to_extension("TEXT/HTML").unwrap(), "html");
        assert_eq!(detector.mime_to_extension("application/x-unknown").unwrap(), "");
    }

    #[test]
    fn test_list_rules_preorder() {
        let detector = sample_detector();
        let rules = detector.list_rules().unwrap();

        assert_eq!(rules.len(), 6);
        assert_eq!(detector.rule_count().unwrap(), 6);
        assert_eq!((rules[0].depth, rules[0].mime_type.as_str()), (0, "application/pdf"));
        assert_eq!((rules[1].depth, rules[1].designation.as_str()), (1, "version %s"));
        assert_eq!(rules[2].kind, "xml");
        assert_eq!(rules[5].kind, "lookup");
    }

    #[derive(Clone, Default)]
    struct LogBuffer(Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    /// 在 info 级别的订阅者下识别一次，返回日志输出
    fn classify_with_info_logs(verbose: bool) -> String {
        let library = RuleLibrary::new(vec![string_rule(0, b"%PDF-", "application/pdf")]);
        let detector = MimeDetector::with_rules(library, ConfigManager::custom().verbose(verbose).build());

        let logs = LogBuffer::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        tracing::subscriber::with_default(subscriber, || {
            assert!(detector.classify_bytes(b"%PDF-1.4").unwrap().is_matched());
        });

        let bytes = logs.0.lock().unwrap().clone();
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn test_verbose_logs_each_classification() {
        assert!(classify_with_info_logs(true).contains("识别为 application/pdf"));
        assert!(!classify_with_info_logs(false).contains("识别为"));
    }

    #[test]
    fn test_lazy_load_reports_errors_on_use() {
        let config = ConfigManager::custom()
            .rule_origin(RuleOrigin::MagicFile(PathBuf::from("/nonexistent/magic")))
            .build();
        let detector = MimeDetector::new(config.clone());
        assert!(!detector.is_loaded());
        assert!(matches!(detector.classify_bytes(b"abc"), Err(RsmimeError::IoError(_))));
        assert!(!detector.is_loaded());

        assert!(MimeDetector::load(config).is_err());
    }

    #[test]
    fn test_reload_swaps_snapshot() {
        let detector = MimeDetector::with_rules(
            RuleLibrary::new(vec![string_rule(0, b"AAAA", "application/x-a")]),
            GlobalConfig::default(),
        );
        let before = detector.rule_set().unwrap();
        let handle = detector.reload_handle();

        detector
            .reload_with(RuleLibrary::new(vec![string_rule(0, b"AAAA", "application/x-b")]))
            .unwrap();
        assert_eq!(detector.classify_bytes(b"AAAA").unwrap().mime_type(), Some("application/x-b"));
        // 旧快照仍可独立使用
        assert_eq!(before.rules[0].mime_type, "application/x-a");

        assert!(handle.notify().unwrap());
        assert_eq!(detector.classify_bytes(b"AAAA").unwrap().mime_type(), Some("application/x-b"));

        drop(detector);
        assert!(!handle.notify().unwrap());
    }

    #[test]
    fn test_concurrent_classification_during_reload() {
        let detector = sample_detector();

        std::thread::scope(|scope| {
            for _ in 0..4 {
                let detector = detector.clone();
                scope.spawn(move || {
                    for _ in 0..200 {
                        let result = detector.classify_bytes(b"%PDF-1.4").unwrap();
                        assert_eq!(result.mime_type(), Some("application/pdf"));
                    }
                });
            }
            for _ in 0..20 {
                detector.reload().unwrap();
            }
        });
    }

    #[test]
    fn test_classify_path_extension_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let csv = dir.path().join("table.csv");
        let pdf_named_txt = dir.path().join("report.csv");
        let unknown = dir.path().join("blob.bin");
        std::fs::write(&csv, "a,b\n1,2\n").unwrap();
        std::fs::write(&pdf_named_txt, "%PDF-1.5\n").unwrap();
        std::fs::write(&unknown, [0u8, 1, 2, 3]).unwrap();

        let detector = sample_detector();
        let by_ext = detector.classify_path(&csv).unwrap();
        assert_eq!(by_ext.mime_type(), Some("text/csv"));
        assert!(by_ext.detection().unwrap().by_extension);

        // 内容优先于扩展名
        let by_content = detector.classify_path(&pdf_named_txt).unwrap();
        assert_eq!(by_content.mime_type(), Some("application/pdf"));
        assert!(!by_content.detection().unwrap().by_extension);

        assert_eq!(detector.classify_path(&unknown).unwrap(), Classification::Failed);
        assert!(matches!(
            detector.classify_path(dir.path().join("missing.csv")),
            Err(RsmimeError::IoError(_))
        ));
    }

    #[cfg(feature = "async-io")]
    #[tokio::test]
    async fn test_classify_path_async() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.bin");
        tokio::fs::write(&path, b"%PDF-2.0\n").await.unwrap();

        let detector = sample_detector();
        let result = detector.classify_path_async(&path).await.unwrap();
        assert_eq!(result.designation(), Some("PDF document, version 2.0"));
    }
}
