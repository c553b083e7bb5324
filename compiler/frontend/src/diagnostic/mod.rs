//! セマンティックフロントエンドが出力する構造化診断。
//!
//! メッセージは整形済み文字列ではなく、安定コードと引数マップからなる
//! 構造化レコードとして保持する。表示はレンダリング層（`render` と
//! `json`）の責務。

use indexmap::IndexMap;
use serde::Serialize;
use smol_str::SmolStr;
use std::collections::HashSet;
use std::fmt;

use crate::span::Span;

pub mod json;

pub use json::{render_diagnostics, LineIndex};

/// 診断の重大度。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticSeverity {
    Error,
    Warning,
    Info,
    Hint,
}

impl DiagnosticSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiagnosticSeverity::Error => "error",
            DiagnosticSeverity::Warning => "warning",
            DiagnosticSeverity::Info => "info",
            DiagnosticSeverity::Hint => "hint",
        }
    }
}

/// 診断コードの安定列挙。JSON 出力やテストはこのコード文字列に依存する。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticCode {
    // 構造
    CircularDependency,
    DeclarationRequiresBody,
    DuplicateOperator,
    DuplicateParameterName,
    DuplicateCapture,
    // 探索
    UndefinedName,
    AmbiguousUse,
    NoViableCandidate,
    UndefinedOperator,
    // 型
    InvalidConformanceTarget,
    NotAView,
    DoesNotConform,
    RedundantConformance,
    InvalidEqualityConstraint,
    TooManyAnnotations,
    ExtensionOfBuiltin,
    // 推論
    NotEnoughContext,
    AmbiguousOverload,
    UnusedResult,
    TypeMismatch,
    // 意味
    ValueInTypePosition,
    ValueInSumTypePosition,
    SumTypeTooFewElements,
    MutatingBundleMustReturn,
}

impl DiagnosticCode {
    /// 安定コード文字列。
    pub fn as_str(&self) -> &'static str {
        match self {
            DiagnosticCode::CircularDependency => "sema.structure.circular_dependency",
            DiagnosticCode::DeclarationRequiresBody => "sema.structure.declaration_requires_body",
            DiagnosticCode::DuplicateOperator => "sema.structure.duplicate_operator",
            DiagnosticCode::DuplicateParameterName => "sema.structure.duplicate_parameter_name",
            DiagnosticCode::DuplicateCapture => "sema.structure.duplicate_capture",
            DiagnosticCode::UndefinedName => "sema.lookup.undefined_name",
            DiagnosticCode::AmbiguousUse => "sema.lookup.ambiguous_use",
            DiagnosticCode::NoViableCandidate => "sema.lookup.no_viable_candidate",
            DiagnosticCode::UndefinedOperator => "sema.lookup.undefined_operator",
            DiagnosticCode::InvalidConformanceTarget => "sema.type.invalid_conformance_target",
            DiagnosticCode::NotAView => "sema.type.not_a_view",
            DiagnosticCode::DoesNotConform => "sema.type.does_not_conform",
            DiagnosticCode::RedundantConformance => "sema.type.redundant_conformance",
            DiagnosticCode::InvalidEqualityConstraint => "sema.type.invalid_equality_constraint",
            DiagnosticCode::TooManyAnnotations => "sema.type.too_many_annotations",
            DiagnosticCode::ExtensionOfBuiltin => "sema.type.extension_of_builtin",
            DiagnosticCode::NotEnoughContext => "sema.inference.not_enough_context",
            DiagnosticCode::AmbiguousOverload => "sema.inference.ambiguous_overload",
            DiagnosticCode::UnusedResult => "sema.inference.unused_result",
            DiagnosticCode::TypeMismatch => "sema.inference.type_mismatch",
            DiagnosticCode::ValueInTypePosition => "sema.semantic.value_in_type_position",
            DiagnosticCode::ValueInSumTypePosition => "sema.semantic.value_in_sum_type_position",
            DiagnosticCode::SumTypeTooFewElements => "sema.semantic.sum_type_too_few_elements",
            DiagnosticCode::MutatingBundleMustReturn => "sema.semantic.mutating_bundle_must_return",
        }
    }

    /// コード既定の重大度。
    pub fn default_severity(&self) -> DiagnosticSeverity {
        match self {
            DiagnosticCode::UnusedResult => DiagnosticSeverity::Warning,
            _ => DiagnosticSeverity::Error,
        }
    }
}

impl fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 診断本体に付随する補足ノート。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiagnosticNote {
    pub message: String,
    pub site: Option<Span>,
}

impl DiagnosticNote {
    pub fn new(message: impl Into<String>, site: Option<Span>) -> Self {
        Self {
            message: message.into(),
            site,
        }
    }
}

/// 1 件の構造化診断。
#[derive(Debug, Clone, Serialize)]
pub struct Diagnostic {
    pub code: DiagnosticCode,
    pub severity: DiagnosticSeverity,
    pub site: Span,
    /// コードごとのメッセージ引数。挿入順を保持する。
    pub args: IndexMap<SmolStr, String>,
    pub notes: Vec<DiagnosticNote>,
}

impl Diagnostic {
    pub fn new(code: DiagnosticCode, site: Span) -> Self {
        Self {
            code,
            severity: code.default_severity(),
            site,
            args: IndexMap::new(),
            notes: Vec::new(),
        }
    }

    pub fn with_arg(mut self, key: impl Into<SmolStr>, value: impl Into<String>) -> Self {
        self.args.insert(key.into(), value.into());
        self
    }

    pub fn with_note(mut self, note: DiagnosticNote) -> Self {
        self.notes.push(note);
        self
    }

    pub fn with_notes(mut self, notes: impl IntoIterator<Item = DiagnosticNote>) -> Self {
        self.notes.extend(notes);
        self
    }

    fn arg(&self, key: &str) -> &str {
        self.args.get(key).map(String::as_str).unwrap_or("?")
    }

    /// 人間向けメッセージを組み立てる。構造化レコードが正であり、
    /// この文字列はあくまで表示用。
    pub fn render(&self) -> String {
        match self.code {
            DiagnosticCode::CircularDependency => {
                format!("宣言 `{}` の実体化が循環しています", self.arg("name"))
            }
            DiagnosticCode::DeclarationRequiresBody => {
                format!("宣言 `{}` には本体が必要です", self.arg("name"))
            }
            DiagnosticCode::DuplicateOperator => {
                format!("演算子 `{}` は既に宣言されています", self.arg("operator"))
            }
            DiagnosticCode::DuplicateParameterName => {
                format!("パラメータ名 `{}` が重複しています", self.arg("name"))
            }
            DiagnosticCode::DuplicateCapture => {
                format!("キャプチャ名 `{}` が重複しています", self.arg("name"))
            }
            DiagnosticCode::UndefinedName => {
                format!("名前 `{}` は未定義です", self.arg("name"))
            }
            DiagnosticCode::AmbiguousUse => {
                format!("名前 `{}` の参照先が曖昧です", self.arg("name"))
            }
            DiagnosticCode::NoViableCandidate => format!(
                "名前 `{}` に適用可能な候補がありません",
                self.arg("name")
            ),
            DiagnosticCode::UndefinedOperator => {
                format!("演算子 `{}` は宣言されていません", self.arg("operator"))
            }
            DiagnosticCode::InvalidConformanceTarget => format!(
                "型 `{}` は準拠宣言の対象になれません",
                self.arg("subject")
            ),
            DiagnosticCode::NotAView => {
                format!("`{}` はビューではありません", self.arg("name"))
            }
            DiagnosticCode::DoesNotConform => format!(
                "型 `{}` はビュー `{}` に準拠していません",
                self.arg("model"),
                self.arg("view")
            ),
            DiagnosticCode::RedundantConformance => format!(
                "型 `{}` のビュー `{}` への準拠は既に登録されています",
                self.arg("model"),
                self.arg("view")
            ),
            DiagnosticCode::InvalidEqualityConstraint => format!(
                "`{}` と `{}` の等値制約は無効です",
                self.arg("lhs"),
                self.arg("rhs")
            ),
            DiagnosticCode::TooManyAnnotations => format!(
                "値パラメータ `{}` に複数の注釈は指定できません",
                self.arg("name")
            ),
            DiagnosticCode::ExtensionOfBuiltin => {
                "組み込み型は拡張できません".to_string()
            }
            DiagnosticCode::NotEnoughContext => {
                "型を推論するための文脈が不足しています".to_string()
            }
            DiagnosticCode::AmbiguousOverload => format!(
                "オーバーロード `{}` の解決が曖昧です",
                self.arg("name")
            ),
            DiagnosticCode::UnusedResult => {
                format!("型 `{}` の結果が使用されていません", self.arg("type"))
            }
            DiagnosticCode::TypeMismatch => format!(
                "型 `{}` と `{}` は一致しません",
                self.arg("found"),
                self.arg("expected")
            ),
            DiagnosticCode::ValueInTypePosition => format!(
                "`{}` は値を表すため型の位置では使えません",
                self.arg("name")
            ),
            DiagnosticCode::ValueInSumTypePosition => {
                "直和型の要素には型のみを指定できます".to_string()
            }
            DiagnosticCode::SumTypeTooFewElements => {
                "直和型には 2 つ以上の要素が必要です".to_string()
            }
            DiagnosticCode::MutatingBundleMustReturn => {
                "inout/set 変種を持つバンドルはレシーバ型を先頭にした 2 要素タプルを返す必要があります"
                    .to_string()
            }
        }
    }
}

/// 挿入順を保持する診断集合。完全に同一の診断は 1 度だけ記録する。
#[derive(Debug, Clone, Default, Serialize)]
pub struct DiagnosticSet {
    items: Vec<Diagnostic>,
    #[serde(skip)]
    seen: HashSet<(DiagnosticCode, Span, u64)>,
}

impl DiagnosticSet {
    pub fn new() -> Self {
        Self::default()
    }

    fn fingerprint(diagnostic: &Diagnostic) -> u64 {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};
        let mut hasher = DefaultHasher::new();
        for (key, value) in &diagnostic.args {
            key.hash(&mut hasher);
            value.hash(&mut hasher);
        }
        hasher.finish()
    }

    /// 診断を挿入する。新規に追加された場合は `true`。
    pub fn insert(&mut self, diagnostic: Diagnostic) -> bool {
        let key = (
            diagnostic.code,
            diagnostic.site,
            Self::fingerprint(&diagnostic),
        );
        if !self.seen.insert(key) {
            return false;
        }
        self.items.push(diagnostic);
        true
    }

    pub fn extend(&mut self, other: DiagnosticSet) {
        for diagnostic in other.items {
            self.insert(diagnostic);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn contains_code(&self, code: DiagnosticCode) -> bool {
        self.items.iter().any(|diagnostic| diagnostic.code == code)
    }

    pub fn count_of(&self, code: DiagnosticCode) -> usize {
        self.items
            .iter()
            .filter(|diagnostic| diagnostic.code == code)
            .count()
    }

    pub fn error_count(&self) -> usize {
        self.items
            .iter()
            .filter(|diagnostic| diagnostic.severity == DiagnosticSeverity::Error)
            .count()
    }
}

impl IntoIterator for DiagnosticSet {
    type Item = Diagnostic;
    type IntoIter = std::vec::IntoIter<Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_diagnostics_are_inserted_once() {
        let mut set = DiagnosticSet::new();
        let first = Diagnostic::new(DiagnosticCode::UndefinedName, Span::new(0, 4))
            .with_arg("name", "x");
        let second = Diagnostic::new(DiagnosticCode::UndefinedName, Span::new(0, 4))
            .with_arg("name", "x");
        assert!(set.insert(first));
        assert!(!set.insert(second), "同一診断は 1 度しか記録されない");
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn different_args_are_distinct() {
        let mut set = DiagnosticSet::new();
        let site = Span::new(0, 4);
        set.insert(Diagnostic::new(DiagnosticCode::UndefinedName, site).with_arg("name", "x"));
        set.insert(Diagnostic::new(DiagnosticCode::UndefinedName, site).with_arg("name", "y"));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn render_uses_structured_args() {
        let diagnostic = Diagnostic::new(DiagnosticCode::DoesNotConform, Span::new(0, 1))
            .with_arg("model", "P")
            .with_arg("view", "Movable");
        assert!(diagnostic.render().contains("P"));
        assert!(diagnostic.render().contains("Movable"));
    }
}
