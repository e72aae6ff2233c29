//! 编译后规则模型
//! 加载完成后只读，多个识别调用可并发共享同一份快照

use regex::Regex;

use crate::rule::detect_result::RuleInfo;
use crate::rule::model::{MagicTest, XmlTarget};

/// zip 内容规则编译后的正则（均为全匹配锚定）
#[derive(Debug, Clone)]
pub struct ZipPatterns {
    pub files: Vec<Regex>,
    pub directories: Vec<Regex>,
}

/// 规则匹配策略：封闭集合，按枚举分派
#[derive(Debug, Clone)]
pub enum RuleMatcher {
    Magic(MagicTest),
    Xml(XmlTarget),
    Zip(ZipPatterns),
    /// 仅供查询的规则
    Never,
}

/// 编译后的单条规则
#[derive(Debug, Clone)]
pub struct CompiledRule {
    pub mime_type: String,
    pub extensions: Vec<String>,
    pub designation: String,
    pub matcher: RuleMatcher,
    pub children: Vec<CompiledRule>,
    /// 嵌套层级，顶层为 0
    pub depth: usize,
}

impl CompiledRule {
    /// 主扩展名：最近一次声明的扩展名
    pub fn primary_extension(&self) -> Option<&str> {
        self.extensions.last().map(String::as_str)
    }

    /// 扩展名匹配（忽略大小写）
    pub fn has_extension(&self, extension: &str) -> bool {
        self.extensions.iter().any(|e| e.eq_ignore_ascii_case(extension))
    }

    /// 导出规则元数据
    pub fn info(&self) -> RuleInfo {
        let (kind, offset, primitive_type, comparator, test) = match &self.matcher {
            RuleMatcher::Magic(t) => (
                "magic",
                Some(t.offset),
                Some(t.primitive_type.to_string()),
                Some(t.comparator.symbol().to_string()),
                t.value.to_string(),
            ),
            RuleMatcher::Xml(XmlTarget::Namespace(ns)) => ("xml", None, None, None, format!("namespace={}", ns)),
            RuleMatcher::Xml(XmlTarget::Doctype(id)) => ("xml", None, None, None, format!("doctype={}", id)),
            RuleMatcher::Zip(p) => {
                let files: Vec<&str> = p.files.iter().map(Regex::as_str).collect();
                let dirs: Vec<&str> = p.directories.iter().map(Regex::as_str).collect();
                ("zip", None, None, None, format!("files=[{}] dirs=[{}]", files.join(" "), dirs.join(" ")))
            }
            RuleMatcher::Never => ("lookup", None, None, None, String::new()),
        };

        RuleInfo {
            depth: self.depth,
            kind: kind.to_string(),
            offset,
            primitive_type,
            comparator,
            test,
            designation: self.designation.clone(),
            mime_type: self.mime_type.clone(),
            extensions: self.extensions.clone(),
        }
    }
}

/// 编译后的规则集（声明顺序即匹配顺序）
#[derive(Debug, Clone, Default)]
pub struct CompiledRuleSet {
    pub rules: Vec<CompiledRule>,
}

impl CompiledRuleSet {
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// 先序遍历整个规则森林（父规则先于子规则，兄弟按声明顺序）
    pub fn iter_all(&self) -> PreorderIter<'_> {
        PreorderIter {
            stack: self.rules.iter().rev().collect(),
        }
    }
}

/// 规则森林先序迭代器
pub struct PreorderIter<'a> {
    stack: Vec<&'a CompiledRule>,
}

impl<'a> Iterator for PreorderIter<'a> {
    type Item = &'a CompiledRule;

    fn next(&mut self) -> Option<Self::Item> {
        let rule = self.stack.pop()?;
        self.stack.extend(rule.children.iter().rev());
        Some(rule)
    }
}
