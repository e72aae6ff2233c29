//! 传统 magic 文本解析
//! 每行一条规则：偏移量、类型[&掩码]、测试、描述；前导 `>` 的个数表示嵌套层级
//! `!:mime` / `!:ext` 行为上一条规则补充元数据
//! 单行解析失败只记录警告并跳过，其子行一并跳过，不影响其余行

use tracing::{debug, warn};

use super::parse_number;
use crate::error::{RsmResult, RsmimeError};
use crate::rule::model::{Comparator, MagicTest, PrimitiveType, RuleDefinition, RuleLibrary, TestValue};

const ANY_SENTINEL: &str = "x";

/// 传统 magic 文本解析器
pub struct MagicParser;

impl MagicParser {
    /// 解析完整文本；该操作本身不会失败，无法识别的行全部跳过
    pub fn parse(text: &str) -> RuleLibrary {
        let mut builder = RuleTreeBuilder::default();
        let mut skipped = 0usize;

        for (index, raw_line) in text.lines().enumerate() {
            let line_no = index + 1;
            let line = raw_line.trim_end_matches('\r').trim_start();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some(directive) = line.strip_prefix("!:") {
                builder.apply_directive(directive, line_no);
                continue;
            }

            let level = line.chars().take_while(|c| *c == '>').count();
            match Self::parse_line(&line[level..]) {
                Ok(rule) => builder.push(level, rule, line_no),
                Err(e) => {
                    warn!("跳过 magic 第 {} 行：{}", line_no, e);
                    builder.skip(level);
                    skipped += 1;
                }
            }
        }

        let library = RuleLibrary::new(builder.finish());
        debug!(
            "magic 规则解析完成：top_level={} total={} skipped_lines={}",
            library.rules.len(),
            library.total_rules(),
            skipped
        );
        library
    }

    /// 解析去掉层级前缀后的一行
    fn parse_line(line: &str) -> RsmResult<RuleDefinition> {
        // 1. 偏移量
        let (offset_field, rest) = split_field(line);
        if offset_field.starts_with('&') || offset_field.starts_with('(') {
            return Err(RsmimeError::RuleParseError(format!(
                "不支持间接或相对偏移量 '{}'",
                offset_field
            )));
        }
        let offset = parse_number(offset_field)
            .ok_or_else(|| RsmimeError::RuleParseError(format!("偏移量无效 '{}'", offset_field)))?;

        // 2. 类型与可选掩码
        let (type_field, rest) = split_field(rest);
        if type_field.is_empty() {
            return Err(RsmimeError::RuleParseError("缺少类型字段".to_string()));
        }
        let (type_name, mask) = match type_field.split_once('&') {
            Some((name, raw_mask)) => {
                let mask = parse_number(raw_mask)
                    .ok_or_else(|| RsmimeError::RuleParseError(format!("掩码无效 '{}'", raw_mask)))?;
                (name, Some(mask))
            }
            None => (type_field, None),
        };
        let primitive_type = PrimitiveType::parse(type_name);

        // 3. 测试
        let (test_field, rest) = split_test_field(rest);
        if test_field.is_empty() {
            return Err(RsmimeError::RuleParseError("缺少测试字段".to_string()));
        }
        let (comparator, value) = match &primitive_type {
            PrimitiveType::String => (Comparator::Equal, Self::parse_string_test(test_field)?),
            PrimitiveType::Unsupported(_) => {
                Self::parse_numeric_test(test_field).or_else(|_| Self::parse_string_test(test_field).map(|v| (Comparator::Equal, v)))?
            }
            _ => Self::parse_numeric_test(test_field)?,
        };

        // 4. 描述：剩余部分
        let designation = rest.trim();

        Ok(RuleDefinition::magic(MagicTest {
            offset,
            primitive_type,
            comparator,
            value,
            mask,
        })
        .with_designation(designation))
    }

    /// 数值测试：可选比较符 + `x` 或整数
    fn parse_numeric_test(field: &str) -> RsmResult<(Comparator, TestValue)> {
        let mut chars = field.chars();
        let (comparator, literal) = match chars.next().and_then(Comparator::from_symbol) {
            Some(comparator) => (comparator, chars.as_str()),
            None => (Comparator::Equal, field),
        };

        if literal == ANY_SENTINEL {
            return Ok((comparator, TestValue::Any));
        }
        parse_number(literal)
            .map(|n| (comparator, TestValue::Number(n)))
            .ok_or_else(|| RsmimeError::RuleParseError(format!("数值测试无效 '{}'", field)))
    }

    fn parse_string_test(field: &str) -> RsmResult<TestValue> {
        if field == ANY_SENTINEL {
            return Ok(TestValue::Any);
        }
        unescape_magic_string(field).map(TestValue::Bytes)
    }
}

/// 按层级组装规则树：栈中第 i 个元素是当前打开的第 i 层规则
#[derive(Default)]
struct RuleTreeBuilder {
    roots: Vec<RuleDefinition>,
    stack: Vec<RuleDefinition>,
    /// 被跳过行的层级；更深的后续行属于它的子树，一并跳过
    skip_level: Option<usize>,
}

impl RuleTreeBuilder {
    fn push(&mut self, level: usize, rule: RuleDefinition, line_no: usize) {
        if let Some(skip_level) = self.skip_level {
            if level > skip_level {
                debug!("跳过 magic 第 {} 行：父规则已被跳过", line_no);
                return;
            }
            self.skip_level = None;
        }

        if level > self.stack.len() {
            warn!(
                "跳过 magic 第 {} 行：层级 {} 缺少第 {} 层父规则",
                line_no,
                level,
                level - 1
            );
            self.skip(level);
            return;
        }

        self.close_to(level);
        self.stack.push(rule);
    }

    fn skip(&mut self, level: usize) {
        match self.skip_level {
            Some(current) if current <= level => {}
            _ => self.skip_level = Some(level),
        }
    }

    /// `mime <type>` 或 `ext <a/b/c>`，作用于最近一条成功解析的规则
    fn apply_directive(&mut self, directive: &str, line_no: usize) {
        if self.skip_level.is_some() {
            debug!("忽略第 {} 行的指令：所属规则已被跳过", line_no);
            return;
        }
        let Some(rule) = self.stack.last_mut() else {
            warn!("忽略第 {} 行的指令：前面没有规则", line_no);
            return;
        };

        let (name, value) = split_field(directive.trim());
        let value = value.trim();
        match name {
            "mime" if !value.is_empty() => rule.mime_type = value.to_string(),
            "ext" => rule.extensions.extend(
                value
                    .split('/')
                    .map(|e| e.trim().trim_start_matches('.'))
                    .filter(|e| !e.is_empty())
                    .map(str::to_string),
            ),
            other => debug!("忽略不支持的指令 '!:{}'（第 {} 行）", other, line_no),
        }
    }

    /// 关闭层级 >= level 的规则，挂到父规则（或顶层）
    fn close_to(&mut self, level: usize) {
        while self.stack.len() > level {
            if let Some(done) = self.stack.pop() {
                match self.stack.last_mut() {
                    Some(parent) => parent.children.push(done),
                    None => self.roots.push(done),
                }
            }
        }
    }

    fn finish(mut self) -> Vec<RuleDefinition> {
        self.close_to(0);
        self.roots
    }
}

/// 取出第一个空白分隔的字段，返回 (字段, 剩余部分)
fn split_field(text: &str) -> (&str, &str) {
    let text = text.trim_start();
    match text.find(char::is_whitespace) {
        Some(idx) => (&text[..idx], &text[idx..]),
        None => (text, ""),
    }
}

/// 测试字段以未转义的空白结束
fn split_test_field(text: &str) -> (&str, &str) {
    let text = text.trim_start();
    let mut escaped = false;
    for (idx, c) in text.char_indices() {
        if escaped {
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c.is_whitespace() {
            return (&text[..idx], &text[idx..]);
        }
    }
    (text, "")
}

/// 字符串转义：\n \r \t \\ \ddd（1-3 位八进制）\xHH（1-2 位十六进制），其余 `\c` 表示字面字符
fn unescape_magic_string(field: &str) -> RsmResult<Vec<u8>> {
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != b'\\' {
            out.push(bytes[i]);
            i += 1;
            continue;
        }

        let Some(&next) = bytes.get(i + 1) else {
            return Err(RsmimeError::RuleParseError(format!("末尾存在孤立的反斜杠 '{}'", field)));
        };
        i += 2;

        match next {
            b'n' => out.push(b'\n'),
            b'r' => out.push(b'\r'),
            b't' => out.push(b'\t'),
            b'0'..=b'7' => {
                let mut value = u32::from(next - b'0');
                let mut digits = 1;
                while digits < 3 {
                    match bytes.get(i).copied() {
                        Some(d @ b'0'..=b'7') => {
                            value = value * 8 + u32::from(d - b'0');
                            i += 1;
                            digits += 1;
                        }
                        _ => break,
                    }
                }
                let byte = u8::try_from(value)
                    .map_err(|_| RsmimeError::RuleParseError(format!("八进制转义超出范围 '{}'", field)))?;
                out.push(byte);
            }
            b'x' => {
                let mut value = 0u8;
                let mut digits = 0;
                while digits < 2 {
                    match bytes.get(i).and_then(|d| (*d as char).to_digit(16)) {
                        Some(d) => {
                            value = value * 16 + d as u8;
                            i += 1;
                            digits += 1;
                        }
                        None => break,
                    }
                }
                if digits == 0 {
                    return Err(RsmimeError::RuleParseError(format!("十六进制转义为空 '{}'", field)));
                }
                out.push(value);
            }
            // `\\`、`\ ` 以及其他字面转义
            other => out.push(other),
        }
    }

    Ok(out)
}
