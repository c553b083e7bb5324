//! 制約集合のデータモデル。生成は `generate`、求解は `solve` が担う。

use indexmap::IndexMap;
use serde::Serialize;
use std::fmt;

use super::resolve::DeclReference;
use super::types::TypeId;
use crate::ast::{DeclId, ExprId, Name, ScopeId};
use crate::span::Span;

/// 制約の出所。診断とトレースに使う。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConstraintOrigin {
    pub site: Span,
    pub kind: OriginKind,
}

impl ConstraintOrigin {
    pub fn new(site: Span, kind: OriginKind) -> Self {
        Self { site, kind }
    }
}

/// 出所の種別。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OriginKind {
    Literal,
    Annotation,
    Initialization,
    Return,
    Argument,
    Callee,
    Condition,
    Branch,
    Member,
    OperatorApplication,
    Structural,
    WhereClause,
    Binding,
}

/// 1 件の制約。
#[derive(Debug, Clone, Serialize)]
pub struct Constraint {
    pub kind: ConstraintKind,
    pub origin: ConstraintOrigin,
}

impl Constraint {
    pub fn new(kind: ConstraintKind, origin: ConstraintOrigin) -> Self {
        Self { kind, origin }
    }

    pub fn equality(lhs: TypeId, rhs: TypeId, origin: ConstraintOrigin) -> Self {
        Self::new(ConstraintKind::Equality { lhs, rhs }, origin)
    }

    pub fn subtyping(subtype: TypeId, supertype: TypeId, origin: ConstraintOrigin) -> Self {
        Self::new(
            ConstraintKind::Subtyping {
                subtype,
                supertype,
            },
            origin,
        )
    }

    pub fn parameter(argument: TypeId, parameter: TypeId, origin: ConstraintOrigin) -> Self {
        Self::new(
            ConstraintKind::Parameter {
                argument,
                parameter,
            },
            origin,
        )
    }

    pub fn conformance(
        model: TypeId,
        views: Vec<DeclId>,
        scope: ScopeId,
        origin: ConstraintOrigin,
    ) -> Self {
        Self::new(
            ConstraintKind::Conformance {
                model,
                views,
                scope,
            },
            origin,
        )
    }

    /// メトリクス・トレース用の種別キー。
    pub fn kind_label(&self) -> &'static str {
        match &self.kind {
            ConstraintKind::Equality { .. } => "equality",
            ConstraintKind::Subtyping { .. } => "subtyping",
            ConstraintKind::Parameter { .. } => "parameter",
            ConstraintKind::Conformance { .. } => "conformance",
            ConstraintKind::Disjunction { .. } => "disjunction",
            ConstraintKind::OverloadBinding { .. } => "overload_binding",
            ConstraintKind::Member { .. } => "member",
        }
    }
}

/// 制約種別の閉集合。
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConstraintKind {
    /// `lhs` と `rhs` が単一化可能。
    Equality { lhs: TypeId, rhs: TypeId },
    /// `subtype <: supertype`。
    Subtyping { subtype: TypeId, supertype: TypeId },
    /// `argument` が `parameter`（規約付きパラメータ型）の契約を満たす。
    Parameter { argument: TypeId, parameter: TypeId },
    /// `model` が列挙されたビューすべてに `scope` から見て準拠する。
    Conformance {
        model: TypeId,
        views: Vec<DeclId>,
        scope: ScopeId,
    },
    /// いずれか 1 つの分岐が成立する。ペナルティ合計の小さい解を選ぶ。
    Disjunction { branches: Vec<ConstraintBranch> },
    /// 名前式に対する候補選択。各候補は固有の付帯制約を持つ。
    OverloadBinding {
        name: ExprId,
        candidates: Vec<OverloadCandidate>,
    },
    /// レシーバ型が変数のままのメンバ参照。具体化後に解決する。
    Member {
        receiver: TypeId,
        member_name: Name,
        member_expr: ExprId,
        output: TypeId,
        scope: ScopeId,
    },
}

/// 選言の 1 分岐。
#[derive(Debug, Clone, Serialize)]
pub struct ConstraintBranch {
    pub constraints: Vec<Constraint>,
    pub penalty: u32,
}

impl ConstraintBranch {
    pub fn new(constraints: Vec<Constraint>, penalty: u32) -> Self {
        Self {
            constraints,
            penalty,
        }
    }
}

/// オーバーロード候補。
#[derive(Debug, Clone, Serialize)]
pub struct OverloadCandidate {
    pub reference: DeclReference,
    pub ty: TypeId,
    pub constraints: Vec<Constraint>,
    pub penalty: u32,
}

/// 式ごとの推論結果を蓄積するレコード。
#[derive(Debug, Clone, Default, Serialize)]
pub struct InferenceFacts {
    /// 部分式 → 推論中の型（変数を含みうる）。
    pub expr_types: IndexMap<ExprId, TypeId>,
    /// オーバーロードされた名前式 → 候補一覧。
    pub binding_hints: IndexMap<ExprId, Vec<OverloadCandidate>>,
}

impl InferenceFacts {
    pub fn assign(&mut self, expr: ExprId, ty: TypeId) {
        self.expr_types.insert(expr, ty);
    }

    pub fn type_of(&self, expr: ExprId) -> Option<TypeId> {
        self.expr_types.get(&expr).copied()
    }
}

impl fmt::Display for ConstraintOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}@{}", self.kind, self.site)
    }
}
