//! 编译模块：将规则定义编译为可执行的规则森林
pub mod compiled;
pub mod compiler;

pub use self::compiled::{CompiledRule, CompiledRuleSet, RuleMatcher, ZipPatterns};
pub use self::compiler::RuleCompiler;
