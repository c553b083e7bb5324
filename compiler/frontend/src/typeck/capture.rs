//! 暗黙キャプチャの解析。
//!
//! 宣言本体を走査して名前式の使用を可変ビット付きで収集する。
//! 現在の宣言に包含される宣言・グローバル・キャプチャレス関数への参照は
//! 除外し、メンバ参照は `self` のキャプチャに書き換える。保持された使用
//! ごとに、可変な使用が 1 つでもあれば `inout`、なければ `let` とする。

use indexmap::IndexMap;
use serde::Serialize;
use smol_str::SmolStr;

use super::driver::Checker;
use crate::ast::{
    AccessEffect, DeclId, DeclKind, ExprId, ExprKind, FunctionBody, NameDomain, StmtKind,
};

/// 暗黙キャプチャ 1 件。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaptureRecord {
    pub name: SmolStr,
    pub effect: AccessEffect,
    pub referenced: DeclId,
}

#[derive(Default)]
struct CaptureCollector {
    /// 名前 → (効果, 参照宣言)。挿入順がキャプチャ順になる。
    uses: IndexMap<SmolStr, (AccessEffect, DeclId)>,
}

impl CaptureCollector {
    fn record(&mut self, name: SmolStr, referenced: DeclId, mutable: bool) {
        let effect = if mutable {
            AccessEffect::Inout
        } else {
            AccessEffect::Let
        };
        match self.uses.get_mut(&name) {
            Some((existing, _)) => {
                if mutable {
                    *existing = AccessEffect::Inout;
                }
            }
            None => {
                self.uses.insert(name, (effect, referenced));
            }
        }
    }
}

impl<'p> Checker<'p> {
    /// 宣言本体を走査して暗黙キャプチャを収集する。
    pub fn collect_implicit_captures(&mut self, decl: DeclId) -> Vec<CaptureRecord> {
        let program = self.program;
        let body = match &program.decl(decl).kind {
            DeclKind::Function(function) => function.body,
            DeclKind::MethodVariant(variant) => variant.body,
            _ => None,
        };
        let Some(body) = body else {
            return Vec::new();
        };
        let mut collector = CaptureCollector::default();
        let root = match body {
            FunctionBody::Expr { expr } => expr,
            FunctionBody::Block { block } => block,
        };
        self.walk_for_captures(decl, root, false, &mut collector);
        collector
            .uses
            .into_iter()
            .map(|(name, (effect, referenced))| CaptureRecord {
                name,
                effect,
                referenced,
            })
            .collect()
    }

    fn walk_for_captures(
        &mut self,
        owner: DeclId,
        expr: ExprId,
        mutable: bool,
        collector: &mut CaptureCollector,
    ) {
        let program = self.program;
        match &program.expr(expr).kind {
            ExprKind::Name(name) => {
                match name.domain {
                    NameDomain::None => {
                        self.record_name_use(owner, expr, mutable, collector);
                    }
                    NameDomain::Implicit => {
                        // メンバ参照は self のキャプチャに書き換える。
                        if let Some(enclosing) = self.enclosing_type_decl(owner) {
                            collector.record(SmolStr::new("self"), enclosing, mutable);
                        }
                    }
                    NameDomain::Explicit { subject } => {
                        // ドメインが non-none の名前はキャプチャ候補でない。
                        self.walk_for_captures(owner, subject, mutable, collector);
                    }
                }
            }
            ExprKind::Call { callee, arguments } | ExprKind::SubscriptCall { callee, arguments } => {
                let callee = *callee;
                let arguments = arguments.clone();
                self.walk_for_captures(owner, callee, mutable, collector);
                for argument in arguments {
                    self.walk_for_captures(owner, argument.value, false, collector);
                }
            }
            ExprKind::Inout { subject } => {
                let subject = *subject;
                self.walk_for_captures(owner, subject, true, collector);
            }
            ExprKind::Tuple { elements } => {
                for element in elements.clone() {
                    self.walk_for_captures(owner, element.value, false, collector);
                }
            }
            ExprKind::Sequence { head, tail } => {
                let head = *head;
                let tail = tail.clone();
                self.walk_for_captures(owner, head, false, collector);
                for link in tail {
                    self.walk_for_captures(owner, link.operand, false, collector);
                }
            }
            ExprKind::Conditional {
                condition,
                success,
                failure,
            } => {
                let (condition, success, failure) = (*condition, *success, *failure);
                self.walk_for_captures(owner, condition, false, collector);
                self.walk_for_captures(owner, success, false, collector);
                if let Some(failure) = failure {
                    self.walk_for_captures(owner, failure, false, collector);
                }
            }
            ExprKind::Block { statements } => {
                for stmt in statements.clone() {
                    match &program.stmt(stmt).kind {
                        StmtKind::Expr { expr } | StmtKind::Discard { expr } => {
                            let expr = *expr;
                            self.walk_for_captures(owner, expr, false, collector);
                        }
                        StmtKind::Return { value } => {
                            if let Some(value) = *value {
                                self.walk_for_captures(owner, value, false, collector);
                            }
                        }
                        StmtKind::Decl { decl } => {
                            let decl = *decl;
                            if let DeclKind::Binding(binding) = &program.decl(decl).kind {
                                if let Some(initializer) = binding.initializer {
                                    self.walk_for_captures(
                                        owner,
                                        initializer,
                                        false,
                                        collector,
                                    );
                                }
                            }
                        }
                    }
                }
            }
            ExprKind::Lambda { decl } => {
                // 入れ子ラムダの自由名は外側のキャプチャにもなる。
                let nested = *decl;
                if let DeclKind::Function(function) = &program.decl(nested).kind {
                    if let Some(body) = function.body {
                        let root = match body {
                            FunctionBody::Expr { expr } => expr,
                            FunctionBody::Block { block } => block,
                        };
                        self.walk_for_captures(owner, root, false, collector);
                    }
                }
            }
            _ => {}
        }
    }

    fn record_name_use(
        &mut self,
        owner: DeclId,
        expr: ExprId,
        mutable: bool,
        collector: &mut CaptureCollector,
    ) {
        let program = self.program;
        let ExprKind::Name(name) = &program.expr(expr).kind else {
            return;
        };
        let stem = name.name.stem.clone();
        let scope = program.expr(expr).scope;
        let matches = self.lookup_unqualified(&stem, scope);
        let Some(referenced) = matches.into_iter().next() else {
            return;
        };
        // 現在の宣言に包含される参照・グローバル・キャプチャレス関数は
        // キャプチャではない。
        if program.decl_is_contained_in(referenced, owner) {
            return;
        }
        if program.is_global(referenced) {
            return;
        }
        if program.is_captureless_function(referenced) {
            return;
        }
        collector.record(stem, referenced, mutable);
    }

    /// 宣言を囲む型宣言（レコード・ビュー・拡張・準拠）。
    fn enclosing_type_decl(&self, decl: DeclId) -> Option<DeclId> {
        let program = self.program;
        for scope in program.scopes.ancestors_inclusive(program.decl(decl).scope) {
            if let Some(introducer) = program.scopes.introducer(scope) {
                if matches!(
                    program.decl(introducer).kind,
                    DeclKind::Record(_)
                        | DeclKind::View(_)
                        | DeclKind::Extension(_)
                        | DeclKind::Conformance(_)
                ) {
                    return Some(introducer);
                }
            }
        }
        None
    }
}
