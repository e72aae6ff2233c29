//! 测试字面量的八进制转义工具
//! 结构化规则中字符串测试体使用 `\ddd`（三位八进制）表示任意字节

/// 将字节序列编码为可打印文本：非可打印 ASCII 与反斜杠写成 `\ddd`
pub fn escape_octal(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    for &b in bytes {
        if b == b'\\' || !(0x20..=0x7e).contains(&b) {
            out.push_str(&format!("\\{:03o}", b));
        } else {
            out.push(b as char);
        }
    }
    out
}

/// 字符串测试体编码
/// 单字节 `x` 会与恒真哨兵冲突，首尾空白会被格式化工具吞掉，这两种情况同样写成 `\ddd`
pub fn escape_test_body(bytes: &[u8]) -> String {
    if bytes == b"x" {
        return "\\170".to_string();
    }

    let mut out = escape_octal(bytes);
    if bytes.first() == Some(&b' ') {
        out.replace_range(0..1, "\\040");
    }
    if bytes.len() > 1 && bytes.last() == Some(&b' ') {
        out.truncate(out.len() - 1);
        out.push_str("\\040");
    }
    out
}

/// 解码 `\ddd` 八进制转义；不构成合法转义的反斜杠按字面保留
pub fn unescape_octal(text: &str) -> Vec<u8> {
    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'\\' {
            if let Some(value) = parse_octal_triplet(&bytes[i + 1..]) {
                out.push(value);
                i += 4;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }

    out
}

/// 读取恰好三位八进制数字，且值不超过 0o377
fn parse_octal_triplet(bytes: &[u8]) -> Option<u8> {
    let digits = bytes.get(..3)?;
    if !digits.iter().all(|d| (b'0'..=b'7').contains(d)) {
        return None;
    }
    let value = digits.iter().fold(0u32, |acc, d| acc * 8 + (d - b'0') as u32);
    u8::try_from(value).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_non_printable_bytes() {
        assert_eq!(escape_octal(b"\x89PNG\r\n"), "\\211PNG\\015\\012");
        assert_eq!(escape_octal(b"a\\b"), "a\\134b");
    }

    #[test]
    fn test_unescape_octal_sequences() {
        assert_eq!(unescape_octal("\\211PNG\\015\\012"), b"\x89PNG\r\n".to_vec());
        // 不足三位或超出范围的转义按字面保留
        assert_eq!(unescape_octal("\\12"), b"\\12".to_vec());
        assert_eq!(unescape_octal("\\400"), b"\\400".to_vec());
    }

    #[test]
    fn test_escape_test_body_special_cases() {
        assert_eq!(escape_test_body(b"x"), "\\170");
        assert_eq!(escape_test_body(b" ab "), "\\040ab\\040");
        assert_eq!(unescape_octal(&escape_test_body(b" ab ")), b" ab ".to_vec());
        assert_eq!(escape_test_body(b"xy"), "xy");
    }
}
