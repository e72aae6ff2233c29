//! 结构化规则文件
//! 读取：配置树 -> 规则定义树；单个节点格式错误只跳过该节点
//! 写出：规则定义树 -> XML 文本，是读取的逆过程（写出后再读取得到相同的规则库）

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use tracing::{debug, warn};

use super::config_tree::{ConfigNode, ConfigTreeReader};
use super::parse_number;
use crate::error::{RsmResult, RsmimeError};
use crate::rule::model::{
    Comparator, MagicTest, PrimitiveType, RuleDefinition, RuleKind, RuleLibrary, TestValue, XmlTarget,
    DEFAULT_MIME_TYPE,
};
use crate::utils::escape::{escape_octal, unescape_octal};

const ROOT_NODE: &str = "detectors";
const DETECTOR_NODE: &str = "detector";
const XML_DETECTOR_NODE: &str = "xmldetector";
const ZIP_DETECTOR_NODE: &str = "zipdetector";
const CHILD_LIST_NODE: &str = "childlist";
const TEST_NODE: &str = "test";

/// 恒真哨兵
const ANY_SENTINEL: &str = "x";

/// 结构化规则解析器
pub struct StructuredParser;

impl StructuredParser {
    /// 解析完整规则文档
    /// 文档本身不可读时返回错误；单条规则格式错误只记录警告
    pub fn parse(text: &str) -> RsmResult<RuleLibrary> {
        let root = ConfigTreeReader::parse(text)?;
        if root.name != ROOT_NODE {
            return Err(RsmimeError::RuleParseError(format!(
                "根元素应为 <{}>，实际为 <{}>",
                ROOT_NODE, root.name
            )));
        }

        let mut skipped = 0usize;
        let library = RuleLibrary::new(Self::parse_list(&root, &mut skipped));

        debug!(
            "结构化规则解析完成：top_level={} total={} skipped={}",
            library.rules.len(),
            library.total_rules(),
            skipped
        );
        if skipped > 0 {
            warn!("已跳过 {} 个格式错误的规则节点", skipped);
        }

        Ok(library)
    }

    fn parse_list(parent: &ConfigNode, skipped: &mut usize) -> Vec<RuleDefinition> {
        let mut rules = Vec::new();

        for (index, node) in parent.children.iter().enumerate() {
            if !matches!(node.name.as_str(), DETECTOR_NODE | XML_DETECTOR_NODE | ZIP_DETECTOR_NODE) {
                debug!("忽略未知节点 <{}>（位于 <{}> 下）", node.name, parent.name);
                continue;
            }

            match Self::parse_detector(node, skipped) {
                Ok(rule) => rules.push(rule),
                Err(e) => {
                    warn!("跳过 <{}> #{}（位于 <{}> 下）：{}", node.name, index + 1, parent.name, e);
                    *skipped += 1;
                }
            }
        }

        rules
    }

    fn parse_detector(node: &ConfigNode, skipped: &mut usize) -> RsmResult<RuleDefinition> {
        let mut valid = true;

        // 1. 规则种类
        let kind = match node.name.as_str() {
            XML_DETECTOR_NODE => RuleKind::Xml(Self::parse_xml_target(node)?),
            ZIP_DETECTOR_NODE => RuleKind::Zip {
                files: Self::texts(node, "file"),
                directories: Self::texts(node, "directory"),
            },
            _ => match node.child(TEST_NODE) {
                Some(test) => {
                    let (test, offset_ok) = Self::parse_test(test)?;
                    valid = offset_ok;
                    RuleKind::Magic(test)
                }
                None => RuleKind::Lookup,
            },
        };

        // 2. 公共元数据
        let mut rule = RuleDefinition::new(kind);
        rule.valid = valid;
        if let Some(mime_type) = node.child_text("mimetype").filter(|m| !m.is_empty()) {
            rule.mime_type = mime_type.to_string();
        }
        rule.extensions = node
            .children_named("extension")
            .map(|n| n.trimmed_text().trim_start_matches('.'))
            .filter(|e| !e.is_empty())
            .map(str::to_string)
            .collect();
        // 描述按原文保留（不裁剪），其余元数据都是标识符
        rule.designation = node.child("designation").map(|n| n.text.clone()).unwrap_or_default();

        // 3. 子规则
        if let Some(list) = node.child(CHILD_LIST_NODE) {
            rule.children = Self::parse_list(list, skipped);
        }

        Ok(rule)
    }

    /// 返回 (测试, 偏移量是否可用)；偏移量缺失或不可解析时规则保留但禁用
    fn parse_test(test: &ConfigNode) -> RsmResult<(MagicTest, bool)> {
        let type_name = test
            .attr("type")
            .ok_or_else(|| RsmimeError::RuleParseError("<test> 缺少 type 属性".to_string()))?;
        let primitive_type = PrimitiveType::parse(type_name);

        let comparator = match test.attr("comparator").map(str::trim) {
            None | Some("") => Comparator::Equal,
            Some(symbol) => {
                let mut chars = symbol.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Comparator::from_symbol(c),
                    _ => None,
                }
                .ok_or_else(|| RsmimeError::RuleParseError(format!("未知比较符 '{}'", symbol)))?
            }
        };

        let mask = match test.attr("mask") {
            Some(raw) => Some(
                parse_number(raw).ok_or_else(|| RsmimeError::RuleParseError(format!("掩码无效 '{}'", raw)))?,
            ),
            None => None,
        };

        let value = Self::parse_test_body(&primitive_type, &test.text)?;

        let (offset, offset_ok) = match test.attr("offset").and_then(parse_number) {
            Some(offset) => (offset, true),
            None => {
                warn!("<test> 没有可用的偏移量（{:?}），规则已禁用", test.attr("offset"));
                (-1, false)
            }
        };

        Ok((
            MagicTest {
                offset,
                primitive_type,
                comparator,
                value,
                mask,
            },
            offset_ok,
        ))
    }

    fn parse_test_body(primitive_type: &PrimitiveType, body: &str) -> RsmResult<TestValue> {
        match primitive_type {
            // 字符串测试体不裁剪：首尾空白写成 \040
            PrimitiveType::String => Ok(if body == ANY_SENTINEL {
                TestValue::Any
            } else {
                TestValue::Bytes(unescape_octal(body))
            }),
            PrimitiveType::Unsupported(_) => {
                let trimmed = body.trim();
                Ok(if trimmed == ANY_SENTINEL {
                    TestValue::Any
                } else if let Some(n) = parse_number(trimmed) {
                    TestValue::Number(n)
                } else {
                    TestValue::Bytes(unescape_octal(body))
                })
            }
            _ => {
                let trimmed = body.trim();
                if trimmed == ANY_SENTINEL {
                    return Ok(TestValue::Any);
                }
                parse_number(trimmed)
                    .map(TestValue::Number)
                    .ok_or_else(|| RsmimeError::RuleParseError(format!("数值测试值无效 '{}'", trimmed)))
            }
        }
    }

    /// namespace 与 doctype 必须恰好声明一个
    fn parse_xml_target(node: &ConfigNode) -> RsmResult<XmlTarget> {
        let namespace = node.child_text("namespace").filter(|s| !s.is_empty());
        let doctype = node.child_text("doctype").filter(|s| !s.is_empty());

        match (namespace, doctype) {
            (Some(ns), None) => Ok(XmlTarget::Namespace(ns.to_string())),
            (None, Some(id)) => Ok(XmlTarget::Doctype(id.to_string())),
            (Some(_), Some(_)) => Err(RsmimeError::RuleParseError(
                "xmldetector 同时声明了 <namespace> 与 <doctype>".to_string(),
            )),
            (None, None) => Err(RsmimeError::RuleParseError(
                "xmldetector 未声明 <namespace> 或 <doctype>".to_string(),
            )),
        }
    }

    fn texts(node: &ConfigNode, name: &str) -> Vec<String> {
        node.children_named(name)
            .map(ConfigNode::trimmed_text)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// 结构化规则写出器
pub struct StructuredWriter;

impl StructuredWriter {
    /// 序列化规则库；被禁用的规则不写出
    pub fn write(library: &RuleLibrary) -> RsmResult<String> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);

        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        writer.write_event(Event::Start(BytesStart::new(ROOT_NODE)))?;
        for rule in &library.rules {
            Self::write_rule(&mut writer, rule)?;
        }
        writer.write_event(Event::End(BytesEnd::new(ROOT_NODE)))?;

        let mut text = String::from_utf8(writer.into_inner())
            .map_err(|e| RsmimeError::RuleConvertError(format!("序列化结果不是 UTF-8：{}", e)))?;
        text.push('\n');
        Ok(text)
    }

    fn write_rule(writer: &mut Writer<Vec<u8>>, rule: &RuleDefinition) -> RsmResult<()> {
        if !rule.valid {
            debug!("已禁用的规则不写出：'{}'", rule.designation);
            return Ok(());
        }

        let tag = match &rule.kind {
            RuleKind::Xml(_) => XML_DETECTOR_NODE,
            RuleKind::Zip { .. } => ZIP_DETECTOR_NODE,
            RuleKind::Magic(_) | RuleKind::Lookup => DETECTOR_NODE,
        };
        writer.write_event(Event::Start(BytesStart::new(tag)))?;

        // 标识符类元数据按解析时的规则规范化后写出
        let mime_type = match rule.mime_type.trim() {
            "" => DEFAULT_MIME_TYPE,
            mime_type => mime_type,
        };
        Self::write_text_element(writer, "mimetype", mime_type)?;
        for extension in rule.extensions.iter().map(|e| e.trim().trim_start_matches('.')) {
            if !extension.is_empty() {
                Self::write_text_element(writer, "extension", extension)?;
            }
        }
        if !rule.designation.is_empty() {
            Self::write_text_element(writer, "designation", &rule.designation)?;
        }

        match &rule.kind {
            RuleKind::Magic(test) => Self::write_test(writer, test)?,
            RuleKind::Xml(XmlTarget::Namespace(ns)) => Self::write_text_element(writer, "namespace", ns.trim())?,
            RuleKind::Xml(XmlTarget::Doctype(id)) => Self::write_text_element(writer, "doctype", id.trim())?,
            RuleKind::Zip { files, directories } => {
                for file in files.iter().map(|f| f.trim()).filter(|f| !f.is_empty()) {
                    Self::write_text_element(writer, "file", file)?;
                }
                for directory in directories.iter().map(|d| d.trim()).filter(|d| !d.is_empty()) {
                    Self::write_text_element(writer, "directory", directory)?;
                }
            }
            RuleKind::Lookup => {}
        }

        if rule.children.iter().any(|c| c.valid) {
            writer.write_event(Event::Start(BytesStart::new(CHILD_LIST_NODE)))?;
            for child in &rule.children {
                Self::write_rule(writer, child)?;
            }
            writer.write_event(Event::End(BytesEnd::new(CHILD_LIST_NODE)))?;
        }

        writer.write_event(Event::End(BytesEnd::new(tag)))?;
        Ok(())
    }

    fn write_test(writer: &mut Writer<Vec<u8>>, test: &MagicTest) -> RsmResult<()> {
        let offset = test.offset.to_string();
        let comparator = test.comparator.symbol().to_string();

        let mut start = BytesStart::new(TEST_NODE);
        start.push_attribute(("offset", offset.as_str()));
        start.push_attribute(("type", test.primitive_type.name()));
        start.push_attribute(("comparator", comparator.as_str()));
        if let Some(mask) = test.mask {
            let mask = if mask >= 0 { format!("{:#x}", mask) } else { mask.to_string() };
            start.push_attribute(("mask", mask.as_str()));
        }

        let body = Self::test_body(test);
        writer.write_event(Event::Start(start))?;
        writer.write_event(Event::Text(BytesText::new(&body)))?;
        writer.write_event(Event::End(BytesEnd::new(TEST_NODE)))?;
        Ok(())
    }

    /// 不支持的类型解析时先尝试数值：数值形态的字符串把首字节写成 `\ddd`
    fn test_body(test: &MagicTest) -> String {
        let body = test.value.to_string();
        match (&test.primitive_type, &test.value) {
            (PrimitiveType::Unsupported(_), TestValue::Bytes(bytes)) if parse_number(body.trim()).is_some() => {
                match bytes.split_first() {
                    Some((first, rest)) => format!("\\{:03o}{}", first, escape_octal(rest)),
                    None => body,
                }
            }
            _ => body,
        }
    }

    fn write_text_element(writer: &mut Writer<Vec<u8>>, name: &str, text: &str) -> RsmResult<()> {
        writer.write_event(Event::Start(BytesStart::new(name)))?;
        writer.write_event(Event::Text(BytesText::new(text)))?;
        writer.write_event(Event::End(BytesEnd::new(name)))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::model::Endian;

    const PDF_DOC: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<detectors>
  <detector>
    <mimetype>application/pdf</mimetype>
    <extension>pdf</extension>
    <designation>PDF document, version</designation>
    <test offset="0" type="string" comparator="=">%PDF-</test>
    <childlist>
      <detector>
        <designation>%c</designation>
        <test offset="5" type="byte">x</test>
        <childlist>
          <detector>
            <designation>.%c</designation>
            <test offset="7" type="byte">x</test>
          </detector>
        </childlist>
      </detector>
    </childlist>
  </detector>
</detectors>"#;

    #[test]
    fn test_parse_nested_detectors() {
        let library = StructuredParser::parse(PDF_DOC).unwrap();
        assert_eq!(library.rules.len(), 1);
        assert_eq!(library.total_rules(), 3);

        let pdf = &library.rules[0];
        assert_eq!(pdf.mime_type, "application/pdf");
        assert_eq!(pdf.primary_extension(), Some("pdf"));
        assert_eq!(
            pdf.kind,
            RuleKind::Magic(MagicTest::new(0, PrimitiveType::String, TestValue::Bytes(b"%PDF-".to_vec())))
        );

        let version = &pdf.children[0];
        assert_eq!(version.mime_type, DEFAULT_MIME_TYPE);
        assert_eq!(version.designation, "%c");
        assert_eq!(version.children[0].designation, ".%c");
    }

    #[test]
    fn test_octal_escapes_and_numeric_forms() {
        let doc = r#"<detectors>
  <detector><test offset="0" type="string">\211PNG\015\012</test></detector>
  <detector><test offset="0x10" type="lelong" comparator="&amp;" mask="0xff">0x0100</test></detector>
  <detector><test offset="2" type="beshort" comparator="&lt;">-3</test></detector>
</detectors>"#;
        let library = StructuredParser::parse(doc).unwrap();

        let RuleKind::Magic(png) = &library.rules[0].kind else { panic!("expected magic rule") };
        assert_eq!(png.value, TestValue::Bytes(b"\x89PNG\r\n".to_vec()));

        let RuleKind::Magic(flags) = &library.rules[1].kind else { panic!("expected magic rule") };
        assert_eq!(flags.offset, 16);
        assert_eq!(flags.primitive_type, PrimitiveType::Long(Endian::Little));
        assert_eq!(flags.comparator, Comparator::BitAnd);
        assert_eq!(flags.mask, Some(0xff));
        assert_eq!(flags.value, TestValue::Number(0x100));

        let RuleKind::Magic(less) = &library.rules[2].kind else { panic!("expected magic rule") };
        assert_eq!(less.comparator, Comparator::Less);
        assert_eq!(less.value, TestValue::Number(-3));
    }

    #[test]
    fn test_malformed_nodes_are_skipped() {
        let doc = r#"<detectors>
  <xmldetector><mimetype>a/both</mimetype><namespace>urn:a</namespace><doctype>b</doctype></xmldetector>
  <xmldetector><mimetype>a/none</mimetype></xmldetector>
  <detector><mimetype>a/bad-number</mimetype><test offset="0" type="byte">zz</test></detector>
  <detector><mimetype>a/bad-offset</mimetype><test offset="nope" type="byte">1</test></detector>
  <detector><mimetype>text/csv</mimetype><extension>.csv</extension></detector>
  <xmldetector><mimetype>image/svg+xml</mimetype><namespace>http://www.w3.org/2000/svg</namespace></xmldetector>
</detectors>"#;
        let library = StructuredParser::parse(doc).unwrap();
        let mimes: Vec<&str> = library.rules.iter().map(|r| r.mime_type.as_str()).collect();
        assert_eq!(mimes, vec!["a/bad-offset", "text/csv", "image/svg+xml"]);

        // 偏移量不可用：保留但禁用
        assert!(!library.rules[0].valid);
        // 无测试节点：仅供查询
        assert_eq!(library.rules[1].kind, RuleKind::Lookup);
        assert_eq!(library.rules[1].extensions, vec!["csv"]);
    }

    #[test]
    fn test_zip_detector_lists() {
        let doc = r#"<detectors>
  <zipdetector>
    <mimetype>application/vnd.openxmlformats-officedocument.wordprocessingml.document</mimetype>
    <file>.*\.xml</file>
    <directory>docProps</directory>
    <directory>word</directory>
  </zipdetector>
</detectors>"#;
        let library = StructuredParser::parse(doc).unwrap();
        assert_eq!(
            library.rules[0].kind,
            RuleKind::Zip {
                files: vec![r".*\.xml".to_string()],
                directories: vec!["docProps".to_string(), "word".to_string()],
            }
        );
    }

    #[test]
    fn test_wrong_root_is_error() {
        assert!(StructuredParser::parse("<rules/>").is_err());
        assert!(StructuredParser::parse("not xml at all <").is_err());
    }

    #[test]
    fn test_write_then_parse_is_identity() {
        let library = RuleLibrary::new(vec![
            RuleDefinition::magic(MagicTest::new(0, PrimitiveType::String, TestValue::Bytes(b"x".to_vec())))
                .with_mime("text/x-literal")
                .with_designation("Tom & Jerry <1>"),
            RuleDefinition::magic(MagicTest::new(3, PrimitiveType::String, TestValue::Bytes(b" a\\b\0 ".to_vec())))
                .with_child(
                    RuleDefinition::magic(
                        MagicTest::new(8, PrimitiveType::Short(Endian::Little), TestValue::Number(-2))
                            .with_comparator(Comparator::Greater),
                    )
                    .with_designation("%d"),
                ),
            RuleDefinition::magic(MagicTest {
                offset: 4,
                primitive_type: PrimitiveType::Long(Endian::Big),
                comparator: Comparator::BitClear,
                value: TestValue::Any,
                mask: Some(0xffff),
            }),
            RuleDefinition::magic(MagicTest::new(0, PrimitiveType::Unsupported("ledate".to_string()), TestValue::Any)),
            RuleDefinition::new(RuleKind::Xml(XmlTarget::Doctype("-//W3C//DTD SVG 1.1//EN".to_string())))
                .with_mime("image/svg+xml"),
            RuleDefinition::new(RuleKind::Zip {
                files: vec!["mimetype".to_string()],
                directories: vec!["META-INF".to_string()],
            })
            .with_mime("application/epub+zip")
            .with_extension("epub"),
            RuleDefinition::new(RuleKind::Lookup).with_mime("text/plain").with_extension("text").with_extension("txt"),
            // 描述首尾空白原样保留
            RuleDefinition::new(RuleKind::Lookup)
                .with_mime(" text/x-padded ")
                .with_extension(" .pad ")
                .with_designation("  padded designation\t"),
            // 不支持的类型：数值形态的字符串仍是字符串
            RuleDefinition::magic(MagicTest::new(
                0,
                PrimitiveType::Unsupported("ldate".to_string()),
                TestValue::Bytes(b"12".to_vec()),
            )),
            RuleDefinition::magic(MagicTest::new(
                4,
                PrimitiveType::Unsupported("ldate".to_string()),
                TestValue::Bytes(b"-0x5".to_vec()),
            )),
            RuleDefinition::magic(MagicTest::new(8, PrimitiveType::Unsupported("ldate".to_string()), TestValue::Number(12))),
        ]);

        let text = StructuredWriter::write(&library).unwrap();
        assert!(text.contains("<test offset=\"0\" type=\"string\" comparator=\"=\">\\170</test>"));
        assert!(text.contains("<designation>  padded designation\t</designation>"));
        assert!(text.contains("<mimetype>text/x-padded</mimetype>"));
        assert!(text.contains(">\\0612</test>"));
        assert_eq!(StructuredParser::parse(&text).unwrap(), library);
    }

    #[test]
    fn test_writer_normalizes_identifier_fields() {
        let mut rule = RuleDefinition::new(RuleKind::Zip {
            files: vec![" mimetype ".to_string()],
            directories: vec!["META-INF\n".to_string()],
        });
        rule.mime_type = " application/epub+zip ".to_string();
        rule.extensions = vec![".epub".to_string()];

        let parsed = StructuredParser::parse(&StructuredWriter::write(&RuleLibrary::new(vec![rule])).unwrap()).unwrap();
        assert_eq!(parsed.rules[0].mime_type, "application/epub+zip");
        assert_eq!(parsed.rules[0].extensions, vec!["epub"]);
        assert_eq!(
            parsed.rules[0].kind,
            RuleKind::Zip {
                files: vec!["mimetype".to_string()],
                directories: vec!["META-INF".to_string()],
            }
        );
    }

    #[test]
    fn test_disabled_rules_are_not_written() {
        let mut disabled = RuleDefinition::magic(MagicTest::new(0, PrimitiveType::Byte, TestValue::Number(1)));
        disabled.valid = false;
        let library = RuleLibrary::new(vec![disabled]);

        let text = StructuredWriter::write(&library).unwrap();
        assert!(StructuredParser::parse(&text).unwrap().is_empty());
    }
}
