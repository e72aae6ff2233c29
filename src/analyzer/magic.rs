//! 字节规则分析器
//! 负责按偏移读取缓冲区、按字节序解码整数，并执行字符串/字节/整数比较

use super::{Captured, MatchOutcome};
use crate::rule::model::{Comparator, Endian, MagicTest, PrimitiveType, TestValue};

/// `string x` 捕获的最大长度
const MAX_STRING_CAPTURE: usize = 64;

/// 字节规则分析器
pub struct MagicAnalyzer;

impl MagicAnalyzer {
    /// 对缓冲区执行单条字节测试；越界、负偏移、类型不支持均视为不匹配
    pub fn test(test: &MagicTest, buffer: &[u8]) -> MatchOutcome {
        let Ok(offset) = usize::try_from(test.offset) else {
            return MatchOutcome::NoMatch;
        };

        match &test.primitive_type {
            PrimitiveType::Byte => Self::test_byte(test, offset, buffer),
            PrimitiveType::Short(endian) => Self::test_integer(test, offset, 2, *endian, buffer),
            PrimitiveType::Long(endian) => Self::test_integer(test, offset, 4, *endian, buffer),
            PrimitiveType::String => Self::test_string(test, offset, buffer),
            PrimitiveType::Unsupported(_) => MatchOutcome::NoMatch,
        }
    }

    /// 按字节序组装整数，每个字节先按无符号（0-255）处理
    pub fn decode(bytes: &[u8], endian: Endian) -> i64 {
        let fold = |acc: i64, b: &u8| (acc << 8) | *b as i64;
        match endian {
            Endian::Big => bytes.iter().fold(0, fold),
            Endian::Little => bytes.iter().rev().fold(0, fold),
        }
    }

    /// 读取 [offset, offset + width)，越界返回 None
    fn slice_at(buffer: &[u8], offset: usize, width: usize) -> Option<&[u8]> {
        let end = offset.checked_add(width)?;
        buffer.get(offset..end)
    }

    fn test_byte(test: &MagicTest, offset: usize, buffer: &[u8]) -> MatchOutcome {
        let Some(&raw) = buffer.get(offset) else {
            return MatchOutcome::NoMatch;
        };

        let expected = match &test.value {
            TestValue::Any => return MatchOutcome::Matched(Some(Captured::Byte(raw))),
            TestValue::Number(n) => *n,
            TestValue::Bytes(_) => return MatchOutcome::NoMatch,
        };

        let value = raw as i64;
        let matched = match test.comparator {
            // 按有符号字节比较：只看测试值的低 8 位
            Comparator::Equal => raw as i8 == expected as i8,
            Comparator::Greater => (raw as i8 as i64) > expected,
            Comparator::Less => ((raw as i8) as i64) < expected,
            Comparator::BitAnd => value & expected == expected,
            Comparator::BitClear => value & expected == 0,
        };

        MatchOutcome::from_bool(matched)
    }

    fn test_integer(test: &MagicTest, offset: usize, width: usize, endian: Endian, buffer: &[u8]) -> MatchOutcome {
        let Some(bytes) = Self::slice_at(buffer, offset, width) else {
            return MatchOutcome::NoMatch;
        };
        let value = Self::decode(bytes, endian);

        let expected = match &test.value {
            TestValue::Any => return MatchOutcome::Matched(Some(Captured::Int(value))),
            TestValue::Number(n) => *n,
            TestValue::Bytes(_) => return MatchOutcome::NoMatch,
        };

        // 相等/掩码比较按位宽截断测试值，-1 与 0xffff 等价
        let width_mask = (1i64 << (width * 8)) - 1;
        let matched = match test.comparator {
            Comparator::Equal => value == expected & width_mask,
            Comparator::Greater => value > expected,
            Comparator::Less => value < expected,
            Comparator::BitAnd => value & (expected & width_mask) == expected & width_mask,
            Comparator::BitClear => value & expected == 0,
        };

        MatchOutcome::from_bool(matched)
    }

    fn test_string(test: &MagicTest, offset: usize, buffer: &[u8]) -> MatchOutcome {
        match &test.value {
            TestValue::Bytes(expected) => {
                if expected.is_empty() {
                    return MatchOutcome::NoMatch;
                }
                let Some(slice) = Self::slice_at(buffer, offset, expected.len()) else {
                    return MatchOutcome::NoMatch;
                };

                let ordering = slice.cmp(expected.as_slice());
                let matched = match test.comparator {
                    Comparator::Equal => ordering.is_eq(),
                    Comparator::Greater => ordering.is_gt(),
                    Comparator::Less => ordering.is_lt(),
                    // 掩码运算对字符串无意义
                    Comparator::BitAnd | Comparator::BitClear => false,
                };

                if !matched {
                    MatchOutcome::NoMatch
                } else if test.comparator.is_inequality() {
                    MatchOutcome::Matched(Some(Captured::Text(latin1(slice))))
                } else {
                    MatchOutcome::Matched(None)
                }
            }
            TestValue::Any => {
                let Some(rest) = buffer.get(offset..).filter(|r| !r.is_empty()) else {
                    return MatchOutcome::NoMatch;
                };
                let captured: Vec<u8> = rest
                    .iter()
                    .take(MAX_STRING_CAPTURE)
                    .take_while(|b| !matches!(b, 0 | b'\r' | b'\n'))
                    .copied()
                    .collect();
                MatchOutcome::Matched(Some(Captured::Text(latin1(&captured))))
            }
            TestValue::Number(_) => MatchOutcome::NoMatch,
        }
    }
}

/// 单字节即单字符，保证偏移可预期
fn latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}
