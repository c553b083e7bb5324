//! Norn コンパイラのセマンティックフロントエンド。
//!
//! 構築済みの AST とスコープ木を入力に、名前解決・型実体化・制約生成と
//! 求解・準拠検査を行い、ローワリングが消費する注釈付き成果物を返す。
//! 字句解析・構文解析・診断レンダリングの外側・IR 生成は外部
//! コラボレータ。

pub mod ast;
pub mod diagnostic;
pub mod span;
pub mod typeck;

pub use span::{Span, SpanTagged};
pub use typeck::{CheckResult, Checker, CheckerConfig};

/// フロントエンド共通で保持するソースファイル識別子。
pub type SourceId = u32;
