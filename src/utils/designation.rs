//! 描述模板填充工具
//! 恒真测试（`x`）捕获到的值按 %d → %s → %c 的优先级替换模板中第一个占位符，最多替换一次

use crate::analyzer::Captured;

/// 支持的占位符，按优先级排列
const PLACEHOLDERS: [&str; 3] = ["%d", "%s", "%c"];

/// 描述模板填充工具类
pub struct DesignationFormatter;

impl DesignationFormatter {
    /// 用捕获值填充描述模板
    ///
    /// # 参数
    /// - `template`: 规则上的描述模板
    /// - `captured`: 本次匹配捕获到的值（没有捕获时原样返回模板）
    pub fn fill(template: &str, captured: Option<&Captured>) -> String {
        let Some(captured) = captured else {
            return template.to_string();
        };

        for placeholder in PLACEHOLDERS {
            if let Some(pos) = template.find(placeholder) {
                let mut filled = String::with_capacity(template.len() + 8);
                filled.push_str(&template[..pos]);
                filled.push_str(&captured.render(placeholder));
                filled.push_str(&template[pos + placeholder.len()..]);
                return filled;
            }
        }

        template.to_string()
    }

    /// 父描述与子描述以空格拼接，忽略空串
    pub fn join(parent: &mut String, child: &str) {
        if child.is_empty() {
            return;
        }
        if !parent.is_empty() {
            parent.push(' ');
        }
        parent.push_str(child);
    }
}

// 单元测试
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_priority_d_before_s() {
        // 同时存在 %s 和 %d 时，优先替换 %d
        let filled = DesignationFormatter::fill("%s version %d", Some(&Captured::Int(3)));
        assert_eq!(filled, "%s version 3");
    }

    #[test]
    fn test_fill_replaces_only_first_occurrence() {
        let filled = DesignationFormatter::fill("v%d.%d", Some(&Captured::Int(1)));
        assert_eq!(filled, "v1.%d");
    }

    #[test]
    fn test_fill_char_placeholder_with_byte() {
        let filled = DesignationFormatter::fill("drive %c:", Some(&Captured::Byte(b'C')));
        assert_eq!(filled, "drive C:");
    }

    #[test]
    fn test_fill_without_capture_keeps_template() {
        assert_eq!(DesignationFormatter::fill("version %d", None), "version %d");
        assert_eq!(DesignationFormatter::fill("plain", Some(&Captured::Int(9))), "plain");
    }

    #[test]
    fn test_join_skips_empty() {
        let mut parent = String::from("PNG image");
        DesignationFormatter::join(&mut parent, "");
        DesignationFormatter::join(&mut parent, "interlaced");
        assert_eq!(parent, "PNG image interlaced");

        let mut empty = String::new();
        DesignationFormatter::join(&mut empty, "child");
        assert_eq!(empty, "child");
    }
}
