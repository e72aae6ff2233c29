//! 规则编译器核心
//! 将规则定义树编译为可执行的规则森林：编译 zip 正则、剔除无效规则

use std::time::Instant;
use regex::Regex;
use tracing::{debug, warn};

use super::compiled::{CompiledRule, CompiledRuleSet, RuleMatcher, ZipPatterns};
use crate::error::RsmResult;
use crate::rule::model::{PrimitiveType, RuleDefinition, RuleKind, RuleLibrary};

/// 规则编译器
pub struct RuleCompiler;

impl RuleCompiler {
    /// 编译规则库；单条规则编译失败只跳过该规则（连同其子树）
    pub fn compile(rule_lib: &RuleLibrary) -> CompiledRuleSet {
        let start = Instant::now();
        let mut stats = CompileStats::default();

        let rules: Vec<CompiledRule> = rule_lib
            .rules
            .iter()
            .filter_map(|def| Self::compile_rule(def, 0, &mut stats))
            .collect();

        debug!("规则编译完成，耗时 {:?}", start.elapsed());
        debug!(
            "编译统计：magic={} xml={} zip={} lookup={} unsupported_type={} skipped={}",
            stats.magic_count,
            stats.xml_count,
            stats.zip_count,
            stats.lookup_count,
            stats.unsupported_count,
            stats.skipped_count
        );

        CompiledRuleSet { rules }
    }

    /// 编译单条规则及其子树
    fn compile_rule(def: &RuleDefinition, depth: usize, stats: &mut CompileStats) -> Option<CompiledRule> {
        if !def.valid {
            debug!("跳过已禁用的规则：{}（{}）", def.designation, def.mime_type);
            stats.skipped_count += 1;
            return None;
        }

        let matcher = match &def.kind {
            RuleKind::Magic(test) => {
                if let PrimitiveType::Unsupported(name) = &test.primitive_type {
                    // 保留规则，匹配阶段永不命中
                    debug!("规则 '{}' 使用了不支持的类型 '{}'", def.designation, name);
                    stats.unsupported_count += 1;
                }
                stats.magic_count += 1;
                RuleMatcher::Magic(test.clone())
            }
            RuleKind::Xml(target) => {
                stats.xml_count += 1;
                RuleMatcher::Xml(target.clone())
            }
            RuleKind::Zip { files, directories } => match Self::compile_zip_patterns(files, directories) {
                Ok(patterns) => {
                    stats.zip_count += 1;
                    RuleMatcher::Zip(patterns)
                }
                Err(e) => {
                    warn!("zip 规则 '{}' 的正则无效，已跳过：{}", def.designation, e);
                    stats.skipped_count += 1;
                    return None;
                }
            },
            RuleKind::Lookup => {
                stats.lookup_count += 1;
                RuleMatcher::Never
            }
        };

        let children = def
            .children
            .iter()
            .filter_map(|child| Self::compile_rule(child, depth + 1, stats))
            .collect();

        Some(CompiledRule {
            mime_type: def.mime_type.clone(),
            extensions: def.extensions.clone(),
            designation: def.designation.clone(),
            matcher,
            children,
            depth,
        })
    }

    fn compile_zip_patterns(files: &[String], directories: &[String]) -> RsmResult<ZipPatterns> {
        Ok(ZipPatterns {
            files: files.iter().map(|p| Self::compile_anchored(p)).collect::<RsmResult<_>>()?,
            directories: directories.iter().map(|p| Self::compile_anchored(p)).collect::<RsmResult<_>>()?,
        })
    }

    /// 条目名需整体匹配模式
    fn compile_anchored(raw_pattern: &str) -> RsmResult<Regex> {
        Ok(Regex::new(&format!("^(?:{})$", raw_pattern))?)
    }
}

/// 编译统计信息
#[derive(Debug, Clone, Default)]
struct CompileStats {
    magic_count: usize,
    xml_count: usize,
    zip_count: usize,
    lookup_count: usize,
    unsupported_count: usize,
    skipped_count: usize,
}
