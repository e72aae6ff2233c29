//! 分析模块：字节/XML/zip 三种匹配策略，以及按规则树递归求值的调度器
//! 捕获值只在单次调用内传递，不写回共享的规则对象
pub mod magic;
pub mod xml;
pub mod zip;

use std::fmt;

pub use self::magic::MagicAnalyzer;
pub use self::xml::XmlAnalyzer;
pub use self::zip::ZipAnalyzer;

use crate::compiler::{CompiledRule, RuleMatcher};
use crate::utils::DesignationFormatter;

/// 恒真测试或不等比较时捕获到的值
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Captured {
    Int(i64),
    Byte(u8),
    Text(String),
}

impl Captured {
    /// 按占位符渲染：%c 输出字符，其余输出数值或文本
    pub fn render(&self, placeholder: &str) -> String {
        match (self, placeholder) {
            (Captured::Byte(b), "%c") => (*b as char).to_string(),
            (Captured::Int(n), "%c") => u32::try_from(*n)
                .ok()
                .and_then(char::from_u32)
                .map(String::from)
                .unwrap_or_else(|| n.to_string()),
            (Captured::Text(s), "%c") => s.chars().next().map(String::from).unwrap_or_default(),
            _ => self.to_string(),
        }
    }
}

impl fmt::Display for Captured {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Captured::Int(n) => write!(f, "{}", n),
            Captured::Byte(b) => write!(f, "{}", b),
            Captured::Text(s) => f.write_str(s),
        }
    }
}

/// 单条测试的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchOutcome {
    NoMatch,
    Matched(Option<Captured>),
}

impl MatchOutcome {
    pub fn from_bool(matched: bool) -> Self {
        if matched {
            MatchOutcome::Matched(None)
        } else {
            MatchOutcome::NoMatch
        }
    }

    pub fn is_match(&self) -> bool {
        matches!(self, MatchOutcome::Matched(_))
    }
}

/// 规则求值器
pub struct RuleEvaluator;

impl RuleEvaluator {
    /// 按匹配策略分派单条测试（不含子规则）
    pub fn test(matcher: &RuleMatcher, buffer: &[u8]) -> MatchOutcome {
        match matcher {
            RuleMatcher::Magic(test) => MagicAnalyzer::test(test, buffer),
            RuleMatcher::Xml(target) => MatchOutcome::from_bool(XmlAnalyzer::test(target, buffer)),
            RuleMatcher::Zip(patterns) => MatchOutcome::from_bool(ZipAnalyzer::test(patterns, buffer)),
            RuleMatcher::Never => MatchOutcome::NoMatch,
        }
    }

    /// 规则命中时返回描述：自身描述 + 所有命中子规则的描述（空格拼接，递归）
    pub fn evaluate(rule: &CompiledRule, buffer: &[u8]) -> Option<String> {
        let captured = match Self::test(&rule.matcher, buffer) {
            MatchOutcome::NoMatch => return None,
            MatchOutcome::Matched(captured) => captured,
        };

        let mut designation = DesignationFormatter::fill(&rule.designation, captured.as_ref());
        for child in &rule.children {
            if let Some(child_designation) = Self::evaluate(child, buffer) {
                DesignationFormatter::join(&mut designation, &child_designation);
            }
        }

        Some(designation)
    }
}
