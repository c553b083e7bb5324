//! 二項演算子連鎖の畳み込み。
//!
//! パーサは演算子連鎖を平坦な列（先頭 + [(演算子, 被演算子)]）として
//! 渡す。ここで各中置演算子の宣言を演算子名前空間から引き、優先順位と
//! 結合性に従って二分木へ畳み込む。未宣言の演算子は診断を発行して
//! 畳み込みを中止する。

use serde::Serialize;

use super::driver::Checker;
use crate::ast::{
    DeclId, DeclKind, ExprId, ExprKind, OperatorNotation, PrecedenceGroup,
};
use crate::diagnostic::{Diagnostic, DiagnosticCode};

/// 畳み込み済みの演算子木。
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FoldedSequence {
    Leaf {
        expr: ExprId,
    },
    Node {
        /// 演算子を指す名前式。
        operator_expr: ExprId,
        /// 解決された演算子宣言。
        operator: DeclId,
        group: PrecedenceGroup,
        lhs: Box<FoldedSequence>,
        rhs: Box<FoldedSequence>,
    },
}

impl FoldedSequence {
    /// 葉を左から右へ列挙する。
    pub fn leaves(&self) -> Vec<ExprId> {
        match self {
            FoldedSequence::Leaf { expr } => vec![*expr],
            FoldedSequence::Node { lhs, rhs, .. } => {
                let mut out = lhs.leaves();
                out.extend(rhs.leaves());
                out
            }
        }
    }
}

struct Link {
    operator_expr: ExprId,
    operator: DeclId,
    group: PrecedenceGroup,
    operand: ExprId,
}

impl<'p> Checker<'p> {
    /// 演算子連鎖を畳み込む。失敗時は診断発行済みで `None`。
    pub fn fold_sequence(&mut self, expr: ExprId) -> Option<FoldedSequence> {
        let program = self.program;
        let ExprKind::Sequence { head, tail } = &program.expr(expr).kind else {
            return Some(FoldedSequence::Leaf { expr });
        };
        let head = *head;
        let tail = tail.clone();
        let scope = program.expr(expr).scope;

        let mut links = Vec::with_capacity(tail.len());
        for link in &tail {
            let ExprKind::Name(name) = &program.expr(link.operator).kind else {
                return None;
            };
            let stem = name.name.stem.clone();
            let Some(operator) = self.lookup_operator(&stem, OperatorNotation::Infix, scope)
            else {
                self.diagnostics.insert(
                    Diagnostic::new(
                        DiagnosticCode::UndefinedOperator,
                        program.expr(link.operator).span,
                    )
                    .with_arg("operator", stem.to_string()),
                );
                return None;
            };
            let group = match &program.decl(operator).kind {
                DeclKind::Operator(decl) => {
                    decl.precedence_group.unwrap_or(PrecedenceGroup::Fallback)
                }
                _ => PrecedenceGroup::Fallback,
            };
            links.push(Link {
                operator_expr: link.operator,
                operator,
                group,
                operand: link.operand,
            });
        }

        let mut iter = links.into_iter().peekable();
        Some(Self::fold_with_precedence(
            FoldedSequence::Leaf { expr: head },
            &mut iter,
            None,
        ))
    }

    /// 優先順位登坂法による畳み込み。`floor` より弱い演算子に出会ったら
    /// 打ち切って呼び出し元へ返す。
    fn fold_with_precedence(
        lhs: FoldedSequence,
        links: &mut std::iter::Peekable<std::vec::IntoIter<Link>>,
        floor: Option<PrecedenceGroup>,
    ) -> FoldedSequence {
        let mut lhs = lhs;
        while let Some(next) = links.peek() {
            let group = next.group;
            if let Some(floor) = floor {
                let stop = if group.is_right_associative() {
                    group < floor
                } else {
                    group <= floor
                };
                if stop {
                    break;
                }
            }
            let link = links.next().expect("peek 済み");
            let mut rhs = FoldedSequence::Leaf { expr: link.operand };
            // 右側により強い演算子が続く限り先に畳む。
            while let Some(lookahead) = links.peek() {
                let continue_right = if lookahead.group.is_right_associative() {
                    lookahead.group >= group
                } else {
                    lookahead.group > group
                };
                if !continue_right {
                    break;
                }
                rhs = Self::fold_with_precedence(rhs, links, Some(group));
            }
            lhs = FoldedSequence::Node {
                operator_expr: link.operator_expr,
                operator: link.operator,
                group,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        lhs
    }
}
