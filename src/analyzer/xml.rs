//! XML 结构分析器
//! 以命名空间感知方式解析缓冲区，看到目标命名空间（或 DOCTYPE 标识）立即停止
//! DOCTYPE 标识与 PUBLIC / SYSTEM 字面量逐字比较
//! 任何解析错误都只意味着“不匹配”

use quick_xml::events::Event;
use quick_xml::name::{Namespace, ResolveResult};
use quick_xml::NsReader;
use tracing::trace;

use crate::rule::model::XmlTarget;

/// XML 结构分析器
pub struct XmlAnalyzer;

impl XmlAnalyzer {
    pub fn test(target: &XmlTarget, buffer: &[u8]) -> bool {
        let mut reader = NsReader::from_reader(buffer);
        // 前缀被截断时结束标签往往不成对，关闭相关校验
        reader.config_mut().check_end_names = false;

        let mut buf = Vec::new();
        loop {
            let observed = match reader.read_resolved_event_into(&mut buf) {
                Ok((ResolveResult::Bound(Namespace(ns)), Event::Start(_) | Event::Empty(_))) => {
                    matches!(target, XmlTarget::Namespace(uri) if uri.as_bytes() == ns)
                }
                Ok((_, Event::DocType(doctype))) => match target {
                    XmlTarget::Doctype(id) => external_ids(&doctype).contains(&id.as_bytes()),
                    XmlTarget::Namespace(_) => false,
                },
                Ok((_, Event::Eof)) => return false,
                Ok(_) => false,
                Err(e) => {
                    trace!("XML 解析在位置 {} 处停止：{}", reader.buffer_position(), e);
                    return false;
                }
            };

            // 命中即中止，不做完整解析
            if observed {
                return true;
            }
            buf.clear();
        }
    }
}

/// `<!DOCTYPE` 之后的内容中的外部标识：PUBLIC 后两个字面量，SYSTEM 后一个
fn external_ids(content: &[u8]) -> Vec<&[u8]> {
    // 1. 跳过根元素名
    let rest = content.trim_ascii_start();
    let name_end = rest
        .iter()
        .position(|b| b.is_ascii_whitespace() || *b == b'[')
        .unwrap_or(rest.len());
    let rest = rest[name_end..].trim_ascii_start();

    // 2. 外部标识关键字
    let (mut rest, literal_count) = if let Some(tail) = rest.strip_prefix(b"PUBLIC") {
        (tail, 2)
    } else if let Some(tail) = rest.strip_prefix(b"SYSTEM") {
        (tail, 1)
    } else {
        return Vec::new();
    };

    // 3. 引号字面量，单双引号均可
    let mut ids = Vec::with_capacity(literal_count);
    for _ in 0..literal_count {
        rest = rest.trim_ascii_start();
        let quote = match rest.first() {
            Some(&q @ (b'"' | b'\'')) => q,
            _ => break,
        };
        let Some(end) = rest[1..].iter().position(|&b| b == quote) else {
            break;
        };
        ids.push(&rest[1..=end]);
        rest = &rest[end + 2..];
    }
    ids
}
