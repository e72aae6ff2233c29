//! 通用工具模块
pub mod designation;
pub mod escape;
pub mod prefix_reader;

pub use self::designation::DesignationFormatter;
pub use self::escape::{escape_octal, escape_test_body, unescape_octal};
pub use self::prefix_reader::PrefixReader;
