//! 规则数据模型定义
//! 仅存储规则定义数据（加载器产出、缓存读写的对象），无任何匹配逻辑，支持序列化/反序列化

use std::fmt;
use serde::{Deserialize, Serialize};

use crate::utils::escape::escape_test_body;

/// 未声明 mimetype 时的默认类型
pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

/// 字节序
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Endian {
    Big,
    Little,
}

/// 测试所用的原始类型
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrimitiveType {
    Byte,
    Short(Endian),
    Long(Endian),
    String,
    /// 可以解析但永不匹配的类型（如 date/ledate）
    Unsupported(String),
}

impl PrimitiveType {
    /// 从类型名解析；short/long 按大端处理
    pub fn parse(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "byte" => PrimitiveType::Byte,
            "short" | "beshort" => PrimitiveType::Short(Endian::Big),
            "leshort" => PrimitiveType::Short(Endian::Little),
            "long" | "belong" => PrimitiveType::Long(Endian::Big),
            "lelong" => PrimitiveType::Long(Endian::Little),
            "string" => PrimitiveType::String,
            other => PrimitiveType::Unsupported(other.to_string()),
        }
    }

    /// 规范化类型名（序列化时使用）
    pub fn name(&self) -> &str {
        match self {
            PrimitiveType::Byte => "byte",
            PrimitiveType::Short(Endian::Big) => "beshort",
            PrimitiveType::Short(Endian::Little) => "leshort",
            PrimitiveType::Long(Endian::Big) => "belong",
            PrimitiveType::Long(Endian::Little) => "lelong",
            PrimitiveType::String => "string",
            PrimitiveType::Unsupported(name) => name,
        }
    }

    /// 数值类型的字节宽度；字符串/不支持的类型返回 None
    pub fn numeric_width(&self) -> Option<usize> {
        match self {
            PrimitiveType::Byte => Some(1),
            PrimitiveType::Short(_) => Some(2),
            PrimitiveType::Long(_) => Some(4),
            PrimitiveType::String | PrimitiveType::Unsupported(_) => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        self.numeric_width().is_some()
    }
}

impl fmt::Display for PrimitiveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 比较运算符
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Comparator {
    #[default]
    Equal,
    Greater,
    Less,
    /// 掩码包含：(value & test) == test
    BitAnd,
    /// 掩码全清：(value & test) == 0
    BitClear,
}

impl Comparator {
    pub fn from_symbol(symbol: char) -> Option<Self> {
        match symbol {
            '=' => Some(Comparator::Equal),
            '>' => Some(Comparator::Greater),
            '<' => Some(Comparator::Less),
            '&' => Some(Comparator::BitAnd),
            '^' => Some(Comparator::BitClear),
            _ => None,
        }
    }

    pub fn symbol(&self) -> char {
        match self {
            Comparator::Equal => '=',
            Comparator::Greater => '>',
            Comparator::Less => '<',
            Comparator::BitAnd => '&',
            Comparator::BitClear => '^',
        }
    }

    /// 大于/小于：字符串比较时表示“在此处观察到的值”，需要捕获
    pub fn is_inequality(&self) -> bool {
        matches!(self, Comparator::Greater | Comparator::Less)
    }
}

/// 测试值
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TestValue {
    /// `x`：恒真，匹配并捕获该位置的值
    Any,
    Number(i64),
    Bytes(Vec<u8>),
}

impl fmt::Display for TestValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestValue::Any => f.write_str("x"),
            TestValue::Number(n) => write!(f, "{}", n),
            TestValue::Bytes(bytes) => f.write_str(&escape_test_body(bytes)),
        }
    }
}

/// 字节级测试定义
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MagicTest {
    pub offset: i64,
    pub primitive_type: PrimitiveType,
    #[serde(default)]
    pub comparator: Comparator,
    pub value: TestValue,
    /// 类型后缀 `&mask`：解析并保存，但匹配时不生效
    #[serde(default)]
    pub mask: Option<i64>,
}

impl MagicTest {
    pub fn new(offset: i64, primitive_type: PrimitiveType, value: TestValue) -> Self {
        Self {
            offset,
            primitive_type,
            comparator: Comparator::Equal,
            value,
            mask: None,
        }
    }

    pub fn with_comparator(mut self, comparator: Comparator) -> Self {
        self.comparator = comparator;
        self
    }
}

/// XML 规则的目标：命名空间与 DOCTYPE 标识二选一
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum XmlTarget {
    Namespace(String),
    Doctype(String),
}

/// 规则种类
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuleKind {
    Magic(MagicTest),
    Xml(XmlTarget),
    Zip {
        #[serde(default)]
        files: Vec<String>,
        #[serde(default)]
        directories: Vec<String>,
    },
    /// 无内容测试：只参与扩展名/类型查询，永不命中内容识别
    Lookup,
}

impl RuleKind {
    pub fn label(&self) -> &'static str {
        match self {
            RuleKind::Magic(_) => "magic",
            RuleKind::Xml(_) => "xml",
            RuleKind::Zip { .. } => "zip",
            RuleKind::Lookup => "lookup",
        }
    }
}

/// 单条规则定义（含子规则树）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleDefinition {
    pub kind: RuleKind,
    pub mime_type: String,
    #[serde(default)]
    pub extensions: Vec<String>,
    #[serde(default)]
    pub designation: String,
    #[serde(default)]
    pub children: Vec<RuleDefinition>,
    #[serde(default = "default_valid")]
    pub valid: bool,
}

fn default_valid() -> bool {
    true
}

impl RuleDefinition {
    pub fn new(kind: RuleKind) -> Self {
        Self {
            kind,
            mime_type: DEFAULT_MIME_TYPE.to_string(),
            extensions: Vec::new(),
            designation: String::new(),
            children: Vec::new(),
            valid: true,
        }
    }

    pub fn magic(test: MagicTest) -> Self {
        Self::new(RuleKind::Magic(test))
    }

    pub fn with_mime(mut self, mime_type: impl Into<String>) -> Self {
        let mime_type = mime_type.into();
        self.mime_type = mime_type.trim().to_string();
        self
    }

    pub fn with_designation(mut self, designation: impl Into<String>) -> Self {
        self.designation = designation.into();
        self
    }

    /// 追加扩展名（最后追加的为主扩展名），去掉首尾空白与前导点
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        let extension = extension.into();
        let extension = extension.trim().trim_start_matches('.');
        if !extension.is_empty() {
            self.extensions.push(extension.to_string());
        }
        self
    }

    pub fn with_child(mut self, child: RuleDefinition) -> Self {
        self.children.push(child);
        self
    }

    /// 主扩展名：最近一次声明的扩展名
    pub fn primary_extension(&self) -> Option<&str> {
        self.extensions.last().map(String::as_str)
    }

    /// 规则树中的规则总数（含自身）
    pub fn tree_size(&self) -> usize {
        1 + self.children.iter().map(RuleDefinition::tree_size).sum::<usize>()
    }
}

/// 完整规则库（声明顺序即匹配顺序）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleLibrary {
    pub rules: Vec<RuleDefinition>,
}

impl RuleLibrary {
    pub fn new(rules: Vec<RuleDefinition>) -> Self {
        Self { rules }
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// 规则总数（含所有子规则）
    pub fn total_rules(&self) -> usize {
        self.rules.iter().map(RuleDefinition::tree_size).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitive_type_parse() {
        assert_eq!(PrimitiveType::parse("belong"), PrimitiveType::Long(Endian::Big));
        assert_eq!(PrimitiveType::parse("LESHORT"), PrimitiveType::Short(Endian::Little));
        assert_eq!(PrimitiveType::parse("short"), PrimitiveType::Short(Endian::Big));
        // 日期类型：可以解析，但标记为不支持
        assert_eq!(
            PrimitiveType::parse("ledate"),
            PrimitiveType::Unsupported("ledate".to_string())
        );
        assert_eq!(PrimitiveType::parse("ledate").numeric_width(), None);
    }

    #[test]
    fn test_primary_extension_is_last_declared() {
        let rule = RuleDefinition::magic(MagicTest::new(0, PrimitiveType::String, TestValue::Bytes(b"<html".to_vec())))
            .with_mime("text/html")
            .with_extension("htm")
            .with_extension("html");

        assert_eq!(rule.primary_extension(), Some("html"));
        assert_eq!(RuleDefinition::new(RuleKind::Zip { files: vec![], directories: vec![] }).primary_extension(), None);
    }

    #[test]
    fn test_tree_size_counts_children() {
        let child = RuleDefinition::magic(MagicTest::new(4, PrimitiveType::Byte, TestValue::Any));
        let rule = RuleDefinition::magic(MagicTest::new(0, PrimitiveType::Byte, TestValue::Number(1)))
            .with_child(child.clone().with_child(child.clone()))
            .with_child(child);

        let library = RuleLibrary::new(vec![rule]);
        assert_eq!(library.total_rules(), 4);
    }

    #[test]
    fn test_comparator_symbols() {
        for symbol in ['=', '>', '<', '&', '^'] {
            let comparator = Comparator::from_symbol(symbol).unwrap();
            assert_eq!(comparator.symbol(), symbol);
        }
        assert_eq!(Comparator::from_symbol('!'), None);
        assert!(Comparator::Less.is_inequality());
        assert!(!Comparator::BitAnd.is_inequality());
    }
}
