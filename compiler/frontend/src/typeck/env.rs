//! チェッカ全体で共有する設定と総称環境のデータモデル。

use serde::Serialize;

use super::types::TypeId;
use crate::ast::DeclId;
use crate::span::Span;

/// セマンティック検査フェーズで利用する設定値。
///
/// 設定はチェッカインスタンスが所有する。プロセス全体のグローバル状態は
/// 持たない。
#[derive(Debug, Clone, Serialize)]
pub struct CheckerConfig {
    /// `Builtin` という名前で組み込みモジュールを可視にするかどうか。
    pub is_builtin_module_visible: bool,
    /// 指定範囲に重なる式についてソルバのトレースを収集する。
    pub inference_tracing_span: Option<Span>,
    /// トレース行を標準エラーにも出力するかどうか。
    pub trace_enabled: bool,
}

impl CheckerConfig {
    /// 既定値をベースにしたビルダーを返す。
    pub fn builder() -> CheckerConfigBuilder {
        CheckerConfigBuilder::default()
    }
}

impl Default for CheckerConfig {
    fn default() -> Self {
        Self {
            is_builtin_module_visible: false,
            inference_tracing_span: None,
            trace_enabled: false,
        }
    }
}

/// `CheckerConfig` を生成するためのビルダー。
#[derive(Debug, Default)]
pub struct CheckerConfigBuilder {
    is_builtin_module_visible: Option<bool>,
    inference_tracing_span: Option<Span>,
    trace_enabled: Option<bool>,
}

impl CheckerConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builtin_module_visible(mut self, visible: bool) -> Self {
        self.is_builtin_module_visible = Some(visible);
        self
    }

    pub fn inference_tracing_span(mut self, span: Span) -> Self {
        self.inference_tracing_span = Some(span);
        self
    }

    pub fn trace_enabled(mut self, enabled: bool) -> Self {
        self.trace_enabled = Some(enabled);
        self
    }

    pub fn build(self) -> CheckerConfig {
        CheckerConfig {
            is_builtin_module_visible: self.is_builtin_module_visible.unwrap_or(false),
            inference_tracing_span: self.inference_tracing_span,
            trace_enabled: self.trace_enabled.unwrap_or(false),
        }
    }
}

/// 総称スコープ 1 つ分の環境。パラメータ列と where 制約を保持する。
/// 構築は遅延され、宣言 ID ごとにキャッシュされる。
#[derive(Debug, Clone, Default, Serialize)]
pub struct GenericEnvironment {
    pub params: Vec<DeclId>,
    pub constraints: Vec<EnvConstraint>,
}

impl GenericEnvironment {
    pub fn is_trivial(&self) -> bool {
        self.params.is_empty() && self.constraints.is_empty()
    }
}

/// 環境制約 1 件。出所のサイトを必ず持つ。
#[derive(Debug, Clone, Serialize)]
pub struct EnvConstraint {
    pub site: Span,
    pub kind: EnvConstraintKind,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EnvConstraintKind {
    /// 主体が列挙されたビューすべてに準拠する。
    Conformance { subject: TypeId, views: Vec<DeclId> },
    /// 2 つの型が等しい。
    Equality { lhs: TypeId, rhs: TypeId },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_applies_overrides() {
        let config = CheckerConfig::builder()
            .builtin_module_visible(true)
            .trace_enabled(true)
            .build();
        assert!(config.is_builtin_module_visible);
        assert!(config.trace_enabled);
        assert!(config.inference_tracing_span.is_none());
    }
}
