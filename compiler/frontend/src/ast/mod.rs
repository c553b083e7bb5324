//! 検査対象プログラムの入力データモデル。
//!
//! パーサとスコープ構築は外部コラボレータであり、この層は構築済みの
//! AST とレキシカルスコープ木を ID ベースで提供する。チェッカは本モジュール
//! を読み取り専用で参照し、結果はすべてチェッカ側のプロパティマップに書く。

use serde::Serialize;
use smol_str::SmolStr;
use std::fmt;

use crate::span::Span;

pub mod build;
pub mod scope;

pub use build::ProgramBuilder;
pub use scope::{ScopeData, ScopeId, ScopeTree};

macro_rules! node_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
        pub struct $name(pub u32);

        impl $name {
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

node_id!(
    /// 宣言ノードの識別子。
    DeclId
);
node_id!(
    /// 式ノードの識別子。
    ExprId
);
node_id!(
    /// 文ノードの識別子。
    StmtId
);
node_id!(
    /// パターンノードの識別子。
    PatternId
);

/// レシーバや引数のアクセス規約。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessEffect {
    Let,
    Inout,
    Set,
    Sink,
    Yielded,
}

impl AccessEffect {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessEffect::Let => "let",
            AccessEffect::Inout => "inout",
            AccessEffect::Set => "set",
            AccessEffect::Sink => "sink",
            AccessEffect::Yielded => "yielded",
        }
    }
}

impl fmt::Display for AccessEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 束縛宣言の導入キーワード。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BindingIntroducer {
    Let,
    Var,
    SinkLet,
    Inout,
}

/// 演算子の記法種別。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperatorNotation {
    Infix,
    Prefix,
    Postfix,
}

/// 宣言・式から参照される名前。関数名はラベル列を伴うことがある。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Name {
    pub stem: SmolStr,
    /// `f(x:y:)` 形式のラベル列。ラベルなし引数は `None`。
    pub labels: Option<Vec<Option<SmolStr>>>,
    pub notation: Option<OperatorNotation>,
}

impl Name {
    pub fn simple(stem: impl Into<SmolStr>) -> Self {
        Self {
            stem: stem.into(),
            labels: None,
            notation: None,
        }
    }

    pub fn functional(stem: impl Into<SmolStr>, labels: Vec<Option<SmolStr>>) -> Self {
        Self {
            stem: stem.into(),
            labels: Some(labels),
            notation: None,
        }
    }

    pub fn operator(stem: impl Into<SmolStr>, notation: OperatorNotation) -> Self {
        Self {
            stem: stem.into(),
            labels: None,
            notation: Some(notation),
        }
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.stem)?;
        if let Some(labels) = &self.labels {
            write!(f, "(")?;
            for label in labels {
                match label {
                    Some(label) => write!(f, "{label}:")?,
                    None => write!(f, "_:")?,
                }
            }
            write!(f, ")")?;
        }
        Ok(())
    }
}

/// 宣言ノード。`scope` は宣言が属するレキシカルスコープ。
#[derive(Debug, Clone, Serialize)]
pub struct Decl {
    pub id: DeclId,
    pub span: Span,
    pub scope: ScopeId,
    pub kind: DeclKind,
}

/// 宣言種別の閉集合。
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeclKind {
    Module(ModuleDecl),
    SourceFile(SourceFileDecl),
    Import(ImportDecl),
    Namespace(NamespaceDecl),
    Record(RecordDecl),
    View(ViewDecl),
    TypeAlias(TypeAliasDecl),
    Binding(BindingDecl),
    Function(FunctionDecl),
    Initializer(InitializerDecl),
    Method(MethodDecl),
    MethodVariant(MethodVariantDecl),
    Subscript(SubscriptDecl),
    SubscriptVariant(SubscriptVariantDecl),
    Parameter(ParameterDecl),
    GenericParam(GenericParamDecl),
    AssocType(AssocTypeDecl),
    AssocValue(AssocValueDecl),
    Extension(ExtensionDecl),
    Conformance(ConformanceDecl),
    Operator(OperatorDecl),
}

impl DeclKind {
    /// 同名宣言の多重定義（オーバーロード）が許される種別かどうか。
    pub fn is_overloadable(&self) -> bool {
        matches!(
            self,
            DeclKind::Function(_)
                | DeclKind::Initializer(_)
                | DeclKind::Method(_)
                | DeclKind::Subscript(_)
        )
    }

    /// 呼び出し可能な本体を持ちうる種別かどうか。
    pub fn is_callable(&self) -> bool {
        matches!(
            self,
            DeclKind::Function(_)
                | DeclKind::Initializer(_)
                | DeclKind::Method(_)
                | DeclKind::MethodVariant(_)
                | DeclKind::Subscript(_)
                | DeclKind::SubscriptVariant(_)
        )
    }

    /// 型を導入する宣言かどうか。
    pub fn is_type_introducing(&self) -> bool {
        matches!(
            self,
            DeclKind::Record(_)
                | DeclKind::View(_)
                | DeclKind::TypeAlias(_)
                | DeclKind::GenericParam(_)
                | DeclKind::AssocType(_)
        )
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ModuleDecl {
    pub name: SmolStr,
    pub sources: Vec<DeclId>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceFileDecl {
    pub name: SmolStr,
    pub members: Vec<DeclId>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportDecl {
    pub module: SmolStr,
}

#[derive(Debug, Clone, Serialize)]
pub struct NamespaceDecl {
    pub name: SmolStr,
    pub members: Vec<DeclId>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecordDecl {
    pub name: SmolStr,
    pub generic_params: Vec<DeclId>,
    /// 宣言ヘッダに書かれた準拠先ビューの型式。
    pub conformances: Vec<ExprId>,
    pub where_clause: Vec<WhereConstraintExpr>,
    pub members: Vec<DeclId>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ViewDecl {
    pub name: SmolStr,
    /// `view B: A` の `A` 側。精緻化されるビューの型式。
    pub refinements: Vec<ExprId>,
    pub members: Vec<DeclId>,
    /// 暗黙に導入される `Self` 総称パラメータ。
    pub receiver_param: DeclId,
}

#[derive(Debug, Clone, Serialize)]
pub struct TypeAliasDecl {
    pub name: SmolStr,
    pub generic_params: Vec<DeclId>,
    pub where_clause: Vec<WhereConstraintExpr>,
    pub aliasee: ExprId,
}

#[derive(Debug, Clone, Serialize)]
pub struct BindingDecl {
    pub introducer: BindingIntroducer,
    pub pattern: PatternId,
    pub annotation: Option<ExprId>,
    pub initializer: Option<ExprId>,
}

/// 関数本体。単一式か波括弧ブロックのいずれか。
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FunctionBody {
    Expr { expr: ExprId },
    Block { block: ExprId },
}

#[derive(Debug, Clone, Serialize)]
pub struct FunctionDecl {
    pub name: Name,
    pub generic_params: Vec<DeclId>,
    pub where_clause: Vec<WhereConstraintExpr>,
    /// 明示キャプチャリスト（束縛宣言）。
    pub explicit_captures: Vec<DeclId>,
    pub params: Vec<DeclId>,
    /// 非スタティックなメンバ関数のレシーバ規約。
    pub receiver_effect: Option<AccessEffect>,
    pub output: Option<ExprId>,
    pub body: Option<FunctionBody>,
    /// 式の内部に現れたラムダかどうか。注釈省略時の型変数割り当てに影響する。
    pub is_in_expr_context: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct InitializerDecl {
    pub name: Name,
    pub generic_params: Vec<DeclId>,
    pub params: Vec<DeclId>,
    pub body: Option<FunctionBody>,
    pub is_memberwise: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct MethodDecl {
    pub name: Name,
    pub generic_params: Vec<DeclId>,
    pub where_clause: Vec<WhereConstraintExpr>,
    pub params: Vec<DeclId>,
    pub output: Option<ExprId>,
    /// アクセス効果ごとの変種。空であってはならない。
    pub variants: Vec<DeclId>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MethodVariantDecl {
    pub effect: AccessEffect,
    pub body: Option<FunctionBody>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubscriptDecl {
    pub name: Option<Name>,
    /// 引数リストを持たないプロパティ形式かどうか。
    pub is_property: bool,
    pub generic_params: Vec<DeclId>,
    pub where_clause: Vec<WhereConstraintExpr>,
    pub params: Vec<DeclId>,
    pub output: ExprId,
    pub variants: Vec<DeclId>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubscriptVariantDecl {
    pub effect: AccessEffect,
    pub body: Option<ExprId>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ParameterDecl {
    pub label: Option<SmolStr>,
    pub name: SmolStr,
    pub convention: AccessEffect,
    pub annotation: Option<ExprId>,
    pub default_value: Option<ExprId>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GenericParamDecl {
    pub name: SmolStr,
    /// 最初の注釈がビューを指すなら型パラメータ、そうでなければ値パラメータ。
    pub annotations: Vec<ExprId>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AssocTypeDecl {
    pub name: SmolStr,
}

#[derive(Debug, Clone, Serialize)]
pub struct AssocValueDecl {
    pub name: SmolStr,
    pub annotation: ExprId,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExtensionDecl {
    pub subject: ExprId,
    pub where_clause: Vec<WhereConstraintExpr>,
    pub members: Vec<DeclId>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConformanceDecl {
    pub subject: ExprId,
    pub views: Vec<ExprId>,
    pub where_clause: Vec<WhereConstraintExpr>,
    pub members: Vec<DeclId>,
}

/// 優先順位グループ。結合の強い順に並ぶ。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PrecedenceGroup {
    Assignment,
    Disjunction,
    Conjunction,
    Comparison,
    Fallback,
    Range,
    Addition,
    Multiplication,
    Shift,
}

impl PrecedenceGroup {
    /// 右結合のグループかどうか。
    pub fn is_right_associative(&self) -> bool {
        matches!(self, PrecedenceGroup::Assignment)
    }

    /// 同一グループ内での連鎖を許すかどうか。
    pub fn allows_chaining(&self) -> bool {
        !matches!(self, PrecedenceGroup::Comparison | PrecedenceGroup::Range)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OperatorDecl {
    pub notation: OperatorNotation,
    pub stem: SmolStr,
    pub precedence_group: Option<PrecedenceGroup>,
}

/// 式ノード。
#[derive(Debug, Clone, Serialize)]
pub struct Expr {
    pub id: ExprId,
    pub span: Span,
    pub scope: ScopeId,
    pub kind: ExprKind,
}

/// 名前式のドメイン。`None` のみがキャプチャ候補になる。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NameDomain {
    None,
    Implicit,
    Explicit { subject: ExprId },
}

#[derive(Debug, Clone, Serialize)]
pub struct NameExpr {
    pub domain: NameDomain,
    pub name: Name,
    /// 明示的な総称引数（型式）。
    pub arguments: Vec<ExprId>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Argument {
    pub label: Option<SmolStr>,
    pub value: ExprId,
}

#[derive(Debug, Clone, Serialize)]
pub struct TupleElementExpr {
    pub label: Option<SmolStr>,
    pub value: ExprId,
}

#[derive(Debug, Clone, Serialize)]
pub struct ParameterTypeExpr {
    pub label: Option<SmolStr>,
    pub convention: AccessEffect,
    pub bare: ExprId,
}

/// `where` 節の単一制約。
#[derive(Debug, Clone, Serialize)]
pub struct WhereConstraintExpr {
    pub span: Span,
    pub kind: WhereConstraintKind,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WhereConstraintKind {
    Conformance { subject: ExprId, views: Vec<ExprId> },
    Equality { lhs: ExprId, rhs: ExprId },
}

/// 二項演算子連鎖の 1 リンク。
#[derive(Debug, Clone, Serialize)]
pub struct SequenceLink {
    /// 演算子を指す名前式。
    pub operator: ExprId,
    pub operand: ExprId,
}

/// 式種別の閉集合。型位置に現れる式（直和型・存在型など）も含む。
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExprKind {
    BoolLiteral {
        value: bool,
    },
    IntLiteral {
        value: i64,
    },
    FloatLiteral {
        text: SmolStr,
    },
    StringLiteral {
        value: SmolStr,
    },
    Name(NameExpr),
    Call {
        callee: ExprId,
        arguments: Vec<Argument>,
    },
    SubscriptCall {
        callee: ExprId,
        arguments: Vec<Argument>,
    },
    Lambda {
        decl: DeclId,
    },
    Tuple {
        elements: Vec<TupleElementExpr>,
    },
    Sequence {
        head: ExprId,
        tail: Vec<SequenceLink>,
    },
    Inout {
        subject: ExprId,
    },
    Conditional {
        condition: ExprId,
        success: ExprId,
        failure: Option<ExprId>,
    },
    Block {
        statements: Vec<StmtId>,
    },
    SumType {
        variants: Vec<ExprId>,
    },
    ExistentialType {
        interfaces: Vec<ExprId>,
        where_clause: Vec<WhereConstraintExpr>,
    },
    LambdaType {
        receiver_effect: AccessEffect,
        environment: Option<ExprId>,
        parameters: Vec<ParameterTypeExpr>,
        output: ExprId,
    },
    RemoteType {
        effect: AccessEffect,
        operand: ExprId,
    },
    ParameterType {
        convention: AccessEffect,
        bare: ExprId,
    },
}

/// 文ノード。
#[derive(Debug, Clone, Serialize)]
pub struct Stmt {
    pub id: StmtId,
    pub span: Span,
    pub kind: StmtKind,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StmtKind {
    Decl { decl: DeclId },
    Expr { expr: ExprId },
    Return { value: Option<ExprId> },
    Discard { expr: ExprId },
}

/// パターンノード。
#[derive(Debug, Clone, Serialize)]
pub struct Pattern {
    pub id: PatternId,
    pub span: Span,
    pub kind: PatternKind,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PatternKind {
    Name { name: SmolStr },
    Tuple { elements: Vec<PatternId> },
    Wildcard,
}

/// 構築済みの AST とスコープ木。チェッカからは読み取り専用。
#[derive(Debug, Clone, Serialize)]
pub struct Program {
    pub(crate) decls: Vec<Decl>,
    pub(crate) exprs: Vec<Expr>,
    pub(crate) stmts: Vec<Stmt>,
    pub(crate) patterns: Vec<Pattern>,
    pub scopes: ScopeTree,
    /// トップレベルモジュールの一覧（宣言順）。
    pub modules: Vec<DeclId>,
    /// コアライブラリモジュール。存在すれば明示 import なしで可視になる。
    pub core_library: Option<DeclId>,
}

impl Program {
    pub fn decl(&self, id: DeclId) -> &Decl {
        &self.decls[id.index()]
    }

    pub fn expr(&self, id: ExprId) -> &Expr {
        &self.exprs[id.index()]
    }

    pub fn stmt(&self, id: StmtId) -> &Stmt {
        &self.stmts[id.index()]
    }

    pub fn pattern(&self, id: PatternId) -> &Pattern {
        &self.patterns[id.index()]
    }

    pub fn decl_count(&self) -> usize {
        self.decls.len()
    }

    pub fn decl_ids(&self) -> impl Iterator<Item = DeclId> + '_ {
        (0..self.decls.len() as u32).map(DeclId)
    }

    /// 宣言が導入するスコープを返す。スコープを導入しない宣言は `None`。
    pub fn scope_introduced_by(&self, decl: DeclId) -> Option<ScopeId> {
        self.scopes.scope_introduced_by(decl)
    }

    /// 宣言名（名前を持つ種別のみ）。
    pub fn decl_name(&self, id: DeclId) -> Option<Name> {
        match &self.decl(id).kind {
            DeclKind::Module(decl) => Some(Name::simple(decl.name.clone())),
            DeclKind::SourceFile(decl) => Some(Name::simple(decl.name.clone())),
            DeclKind::Namespace(decl) => Some(Name::simple(decl.name.clone())),
            DeclKind::Record(decl) => Some(Name::simple(decl.name.clone())),
            DeclKind::View(decl) => Some(Name::simple(decl.name.clone())),
            DeclKind::TypeAlias(decl) => Some(Name::simple(decl.name.clone())),
            DeclKind::Function(decl) => Some(decl.name.clone()),
            DeclKind::Initializer(decl) => Some(decl.name.clone()),
            DeclKind::Method(decl) => Some(decl.name.clone()),
            DeclKind::Subscript(decl) => decl.name.clone(),
            DeclKind::Parameter(decl) => Some(Name::simple(decl.name.clone())),
            DeclKind::GenericParam(decl) => Some(Name::simple(decl.name.clone())),
            DeclKind::AssocType(decl) => Some(Name::simple(decl.name.clone())),
            DeclKind::AssocValue(decl) => Some(Name::simple(decl.name.clone())),
            DeclKind::Operator(decl) => {
                Some(Name::operator(decl.stem.clone(), decl.notation))
            }
            _ => None,
        }
    }

    /// パターンが導入する束縛名を宣言順で収集する。
    pub fn pattern_names(&self, id: PatternId) -> Vec<(SmolStr, PatternId)> {
        let mut names = Vec::new();
        self.collect_pattern_names(id, &mut names);
        names
    }

    fn collect_pattern_names(&self, id: PatternId, out: &mut Vec<(SmolStr, PatternId)>) {
        match &self.pattern(id).kind {
            PatternKind::Name { name } => out.push((name.clone(), id)),
            PatternKind::Tuple { elements } => {
                for element in elements {
                    self.collect_pattern_names(*element, out);
                }
            }
            PatternKind::Wildcard => {}
        }
    }

    /// スコープを包含するモジュール宣言を返す。
    pub fn module_containing(&self, scope: ScopeId) -> Option<DeclId> {
        self.scopes.ancestors_inclusive(scope).find_map(|s| {
            let introducer = self.scopes.introducer(s)?;
            matches!(self.decl(introducer).kind, DeclKind::Module(_)).then_some(introducer)
        })
    }

    /// スコープを包含する翻訳単位（ソースファイル）を返す。
    pub fn translation_unit_containing(&self, scope: ScopeId) -> Option<DeclId> {
        self.scopes.ancestors_inclusive(scope).find_map(|s| {
            let introducer = self.scopes.introducer(s)?;
            matches!(self.decl(introducer).kind, DeclKind::SourceFile(_)).then_some(introducer)
        })
    }

    /// 宣言がグローバルかどうか。呼び出し可能スコープの内側に
    /// 現れない宣言をグローバルとみなす。
    pub fn is_global(&self, decl: DeclId) -> bool {
        let scope = self.decl(decl).scope;
        !self.scopes.ancestors_inclusive(scope).any(|s| {
            self.scopes
                .introducer(s)
                .is_some_and(|d| self.decl(d).kind.is_callable())
        })
    }

    /// 宣言 `inner` が宣言 `outer` の導入スコープに包含されるかどうか。
    pub fn decl_is_contained_in(&self, inner: DeclId, outer: DeclId) -> bool {
        if inner == outer {
            return true;
        }
        let Some(outer_scope) = self.scope_introduced_by(outer) else {
            return false;
        };
        self.scopes
            .is_contained_in(self.decl(inner).scope, outer_scope)
    }

    /// 関数がキャプチャを持たない（グローバル関数など）かどうかの判定に
    /// 使う補助。明示キャプチャリストが空のグローバル関数が該当する。
    pub fn is_captureless_function(&self, decl: DeclId) -> bool {
        match &self.decl(decl).kind {
            DeclKind::Function(function) => {
                function.explicit_captures.is_empty() && self.is_global(decl)
            }
            _ => false,
        }
    }
}
