//! 制約ソルバ。
//!
//! 作業リストを 1 件ずつ適用し、選言・オーバーロードでは系をフォーク
//! して探索する。各分岐は親のスコアを引き継ぎ、確定済み最良スコアより
//! 真に悪い分岐は刈る。同点の解はすべて曖昧として報告する。
//! フォークは置換表・制約リストのスナップショット（クローン）で行う。

use indexmap::IndexMap;
use serde::Serialize;

use super::constraint::{Constraint, ConstraintKind, ConstraintOrigin};
use super::driver::Checker;
use super::resolve::DeclReference;
use super::types::{TypeId, TypeNode, VarId};
use crate::ast::{AccessEffect, DeclKind, ExprId, Name, ScopeId};
use crate::diagnostic::{Diagnostic, DiagnosticCode, DiagnosticNote, DiagnosticSet};

/// 解のスコア。エラー数を第一キー、ペナルティ合計を第二キーとする。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize)]
pub struct SolutionScore {
    pub errors: u32,
    pub penalties: u32,
}

/// ソルバの出力。
#[derive(Debug, Clone, Default, Serialize)]
pub struct Solution {
    /// 変数 → 型の置換表。
    pub substitution: IndexMap<VarId, TypeId>,
    /// オーバーロード名 → 選択された参照。
    pub bindings: IndexMap<ExprId, DeclReference>,
    pub diagnostics: DiagnosticSet,
    pub score: SolutionScore,
    pub is_sound: bool,
}

/// 探索中の系。フォーク時はまるごとクローンする。
#[derive(Debug, Clone, Default)]
struct System {
    fresh: Vec<Constraint>,
    stale: Vec<Constraint>,
    substitution: IndexMap<VarId, TypeId>,
    bindings: IndexMap<ExprId, DeclReference>,
    diagnostics: DiagnosticSet,
    score: SolutionScore,
    made_progress: bool,
    desperate: bool,
}

impl System {
    fn new(constraints: Vec<Constraint>) -> Self {
        let mut fresh = constraints;
        // pop で先頭から消費するため逆順に積む。
        fresh.reverse();
        Self {
            fresh,
            ..Self::default()
        }
    }

    fn push(&mut self, constraint: Constraint) {
        self.fresh.push(constraint);
    }

    fn fail(&mut self, diagnostic: Diagnostic) {
        if self.diagnostics.insert(diagnostic) {
            self.score.errors += 1;
        }
    }

    fn into_solution(self) -> Solution {
        Solution {
            substitution: self.substitution,
            bindings: self.bindings,
            diagnostics: self.diagnostics,
            score: self.score,
            is_sound: self.score.errors == 0,
        }
    }
}

impl<'p> Checker<'p> {
    /// 制約集合を解く。
    pub fn solve_constraints(&mut self, constraints: Vec<Constraint>) -> Solution {
        for constraint in &constraints {
            self.metrics.record_constraint(constraint.kind_label());
        }
        let system = System::new(constraints);
        let mut best: Option<Solution> = None;
        let mut ties: Vec<Solution> = Vec::new();
        self.explore(system, &mut best, &mut ties);
        let mut solution = best.unwrap_or_else(|| Solution {
            is_sound: false,
            ..Solution::default()
        });
        if !ties.is_empty() {
            // 同点の解は曖昧。選ばれたオーバーロードを注記で列挙する。
            let mut notes = Vec::new();
            for tied in std::iter::once(&solution).chain(ties.iter()) {
                for reference in tied.bindings.values() {
                    if let Some(decl) = reference.decl() {
                        notes.push(DiagnosticNote::new(
                            format!("候補: {}", self.decl_display_name(decl)),
                            Some(self.program.decl(decl).span),
                        ));
                    }
                }
            }
            let site = solution
                .bindings
                .keys()
                .next()
                .map(|expr| self.program.expr(*expr).span)
                .unwrap_or_default();
            let name = solution
                .bindings
                .keys()
                .next()
                .map(|expr| self.name_of_expr(*expr))
                .unwrap_or_else(|| "<expr>".to_string());
            solution.diagnostics.insert(
                Diagnostic::new(DiagnosticCode::AmbiguousOverload, site)
                    .with_arg("name", name)
                    .with_notes(notes),
            );
            solution.is_sound = false;
        }
        solution
    }

    fn name_of_expr(&self, expr: ExprId) -> String {
        match &self.program.expr(expr).kind {
            crate::ast::ExprKind::Name(name) => name.name.stem.to_string(),
            _ => "<expr>".to_string(),
        }
    }

    pub(crate) fn decl_display_name(&self, decl: crate::ast::DeclId) -> String {
        self.program
            .decl_name(decl)
            .map(|name| name.to_string())
            .unwrap_or_else(|| "<anonymous>".to_string())
    }

    fn explore(
        &mut self,
        mut system: System,
        best: &mut Option<Solution>,
        ties: &mut Vec<Solution>,
    ) {
        loop {
            // 確定した最良より真に悪い分岐は刈る。
            if let Some(best) = best.as_ref() {
                if system.score > best.score {
                    return;
                }
            }
            let Some(constraint) = system.fresh.pop() else {
                if !system.stale.is_empty() {
                    if system.made_progress {
                        system.made_progress = false;
                        system.fresh = std::mem::take(&mut system.stale);
                        system.fresh.reverse();
                        continue;
                    }
                    if !system.desperate {
                        // 進捗が止まったらサブタイピングを等値に格下げして
                        // 停滞を解消する。
                        system.desperate = true;
                        let stale = std::mem::take(&mut system.stale);
                        for constraint in stale.into_iter().rev() {
                            let converted = match constraint.kind {
                                ConstraintKind::Subtyping {
                                    subtype,
                                    supertype,
                                } => Constraint::equality(subtype, supertype, constraint.origin),
                                other => Constraint { kind: other, origin: constraint.origin },
                            };
                            system.fresh.push(converted);
                        }
                        continue;
                    }
                    // それでも残る制約は文脈不足。
                    let stale = std::mem::take(&mut system.stale);
                    for constraint in stale {
                        system.fail(Diagnostic::new(
                            DiagnosticCode::NotEnoughContext,
                            constraint.origin.site,
                        ));
                    }
                    continue;
                }
                break;
            };

            self.trace_step(&constraint);
            let forked = self.apply_constraint(&mut system, constraint, best, ties);
            if forked {
                // フォーク済み。この系の探索は子に引き継がれた。
                return;
            }
        }

        let solution = system.into_solution();
        match best.as_ref() {
            None => *best = Some(solution),
            Some(current) => {
                if solution.score < current.score {
                    *best = Some(solution);
                    ties.clear();
                } else if solution.score == current.score
                    && solution.score.errors == 0
                    && solution.bindings != current.bindings
                {
                    ties.push(solution);
                }
            }
        }
    }

    /// 制約 1 件を適用する。フォークした場合は `true`。
    fn apply_constraint(
        &mut self,
        system: &mut System,
        constraint: Constraint,
        best: &mut Option<Solution>,
        ties: &mut Vec<Solution>,
    ) -> bool {
        let origin = constraint.origin;
        match constraint.kind {
            ConstraintKind::Equality { lhs, rhs } => {
                self.apply_equality(system, lhs, rhs, origin);
                false
            }
            ConstraintKind::Subtyping {
                subtype,
                supertype,
            } => {
                self.apply_subtyping(system, subtype, supertype, origin);
                false
            }
            ConstraintKind::Parameter {
                argument,
                parameter,
            } => {
                self.apply_parameter(system, argument, parameter, origin);
                false
            }
            ConstraintKind::Conformance {
                model,
                views,
                scope,
            } => {
                self.apply_conformance(system, model, &views, scope, origin);
                false
            }
            ConstraintKind::Member {
                receiver,
                member_name,
                member_expr,
                output,
                scope,
            } => self.apply_member(
                system,
                receiver,
                &member_name,
                member_expr,
                output,
                scope,
                origin,
                best,
                ties,
            ),
            ConstraintKind::Disjunction { branches } => {
                self.metrics.record_solver_fork();
                for branch in branches {
                    let mut child = system.clone();
                    child.score.penalties += branch.penalty;
                    child.made_progress = true;
                    for constraint in branch.constraints.into_iter().rev() {
                        child.push(constraint);
                    }
                    self.explore(child, best, ties);
                }
                true
            }
            ConstraintKind::OverloadBinding { name, candidates } => {
                self.metrics.record_solver_fork();
                for candidate in candidates {
                    let mut child = system.clone();
                    child.score.penalties += candidate.penalty;
                    child.made_progress = true;
                    child.bindings.insert(name, candidate.reference.clone());
                    for constraint in candidate.constraints.into_iter().rev() {
                        child.push(constraint);
                    }
                    self.explore(child, best, ties);
                }
                true
            }
        }
    }

    fn apply(&mut self, system: &System, ty: TypeId) -> TypeId {
        self.types.substitute(ty, &system.substitution)
    }

    // ---- 等値 ----

    fn apply_equality(
        &mut self,
        system: &mut System,
        lhs: TypeId,
        rhs: TypeId,
        origin: ConstraintOrigin,
    ) {
        if !self.unify(system, lhs, rhs) {
            let lhs = self.apply(system, lhs);
            let rhs = self.apply(system, rhs);
            // エラー型の伝播は追加診断を抑制する。
            if !self.types.flags(lhs).has_error() && !self.types.flags(rhs).has_error() {
                let found = format!("{}", self.types.display(self.program, lhs));
                let expected = format!("{}", self.types.display(self.program, rhs));
                system.fail(
                    Diagnostic::new(DiagnosticCode::TypeMismatch, origin.site)
                        .with_arg("found", found)
                        .with_arg("expected", expected),
                );
            }
        }
    }

    fn occurs(&self, var: VarId, ty: TypeId) -> bool {
        if !self.types.flags(ty).has_variable() {
            return false;
        }
        if let TypeNode::Var { id } = self.types.node(ty) {
            return *id == var;
        }
        self.types
            .children(ty)
            .into_iter()
            .any(|child| self.occurs(var, child))
    }

    fn bind_var(&mut self, system: &mut System, var: VarId, ty: TypeId) -> bool {
        if let TypeNode::Var { id } = self.types.node(ty) {
            if *id == var {
                return true;
            }
        }
        if self.occurs(var, ty) {
            return false;
        }
        system.substitution.insert(var, ty);
        system.made_progress = true;
        true
    }

    /// 単一化。フラグ伝播と出現検査を尊重する。
    fn unify(&mut self, system: &mut System, lhs: TypeId, rhs: TypeId) -> bool {
        self.metrics.record_unify_call();
        let lhs = self.apply(system, lhs);
        let rhs = self.apply(system, rhs);
        if lhs == rhs {
            return true;
        }
        let lhs = self.relations.canonical(&mut self.types, lhs);
        let rhs = self.relations.canonical(&mut self.types, rhs);
        if lhs == rhs {
            return true;
        }
        // エラー型は何とでも単一化し、診断を増やさない。
        if self.types.flags(lhs).has_error() || self.types.flags(rhs).has_error() {
            return true;
        }
        match (self.types.node(lhs).clone(), self.types.node(rhs).clone()) {
            (TypeNode::Var { id }, _) => self.bind_var(system, id, rhs),
            (_, TypeNode::Var { id }) => self.bind_var(system, id, lhs),
            (
                TypeNode::Metatype { instance: lhs },
                TypeNode::Metatype { instance: rhs },
            ) => self.unify(system, lhs, rhs),
            (
                TypeNode::Parameter {
                    bare: lhs_bare, ..
                },
                TypeNode::Parameter {
                    bare: rhs_bare, ..
                },
            ) => {
                // 規約は Parameter 制約側で検査済み。裸型のみ単一化する。
                self.unify(system, lhs_bare, rhs_bare)
            }
            (TypeNode::Parameter { bare, .. }, _) => self.unify(system, bare, rhs),
            (_, TypeNode::Parameter { bare, .. }) => self.unify(system, lhs, bare),
            (
                TypeNode::Remote {
                    effect: lhs_effect,
                    target: lhs_target,
                },
                TypeNode::Remote {
                    effect: rhs_effect,
                    target: rhs_target,
                },
            ) => lhs_effect == rhs_effect && self.unify(system, lhs_target, rhs_target),
            (
                TypeNode::Tuple {
                    elements: lhs_elements,
                },
                TypeNode::Tuple {
                    elements: rhs_elements,
                },
            ) => {
                if lhs_elements.len() != rhs_elements.len() {
                    return false;
                }
                lhs_elements.iter().zip(&rhs_elements).all(|(a, b)| {
                    a.label == b.label && {
                        let (a, b) = (a.ty, b.ty);
                        self.unify(system, a, b)
                    }
                })
            }
            (
                TypeNode::Lambda {
                    environment: lhs_environment,
                    inputs: lhs_inputs,
                    output: lhs_output,
                    ..
                },
                TypeNode::Lambda {
                    environment: rhs_environment,
                    inputs: rhs_inputs,
                    output: rhs_output,
                    ..
                },
            ) => {
                if lhs_inputs.len() != rhs_inputs.len() {
                    return false;
                }
                for (a, b) in lhs_inputs.iter().zip(&rhs_inputs) {
                    if a.label != b.label {
                        return false;
                    }
                    let (a, b) = (a.ty, b.ty);
                    if !self.unify(system, a, b) {
                        return false;
                    }
                }
                self.unify(system, lhs_environment, rhs_environment)
                    && self.unify(system, lhs_output, rhs_output)
            }
            (
                TypeNode::Subscript {
                    inputs: lhs_inputs,
                    output: lhs_output,
                    ..
                },
                TypeNode::Subscript {
                    inputs: rhs_inputs,
                    output: rhs_output,
                    ..
                },
            ) => {
                if lhs_inputs.len() != rhs_inputs.len() {
                    return false;
                }
                for (a, b) in lhs_inputs.iter().zip(&rhs_inputs) {
                    let (a, b) = (a.ty, b.ty);
                    if !self.unify(system, a, b) {
                        return false;
                    }
                }
                self.unify(system, lhs_output, rhs_output)
            }
            (
                TypeNode::BoundGeneric {
                    base: lhs_base,
                    arguments: lhs_arguments,
                },
                TypeNode::BoundGeneric {
                    base: rhs_base,
                    arguments: rhs_arguments,
                },
            ) => {
                if !self.unify(system, lhs_base, rhs_base) {
                    return false;
                }
                if lhs_arguments.len() != rhs_arguments.len() {
                    return false;
                }
                for ((lhs_param, lhs_argument), (rhs_param, rhs_argument)) in
                    lhs_arguments.iter().zip(&rhs_arguments)
                {
                    if lhs_param != rhs_param {
                        return false;
                    }
                    use super::types::GenericArgument;
                    match (lhs_argument, rhs_argument) {
                        (
                            GenericArgument::Type { ty: lhs_ty },
                            GenericArgument::Type { ty: rhs_ty },
                        ) => {
                            let (a, b) = (*lhs_ty, *rhs_ty);
                            if !self.unify(system, a, b) {
                                return false;
                            }
                        }
                        (lhs_value, rhs_value) => {
                            if lhs_value != rhs_value {
                                return false;
                            }
                        }
                    }
                }
                true
            }
            (
                TypeNode::Sum {
                    variants: lhs_variants,
                },
                TypeNode::Sum {
                    variants: rhs_variants,
                },
            ) => {
                lhs_variants.len() == rhs_variants.len()
                    && lhs_variants
                        .iter()
                        .zip(&rhs_variants)
                        .all(|(a, b)| {
                            let (a, b) = (*a, *b);
                            self.unify(system, a, b)
                        })
            }
            _ => false,
        }
    }

    // ---- サブタイピング ----

    fn apply_subtyping(
        &mut self,
        system: &mut System,
        subtype: TypeId,
        supertype: TypeId,
        origin: ConstraintOrigin,
    ) {
        let sub = self.apply(system, subtype);
        let sup = self.apply(system, supertype);
        if self.types.flags(sub).has_error() || self.types.flags(sup).has_error() {
            return;
        }
        // 片側が変数のうちは情報が足りない。保留する。
        let sub_is_var = matches!(self.types.node(sub), TypeNode::Var { .. });
        let sup_is_var = matches!(self.types.node(sup), TypeNode::Var { .. });
        if sub_is_var || sup_is_var {
            if system.desperate {
                self.apply_equality(system, sub, sup, origin);
            } else {
                system.stale.push(Constraint::subtyping(sub, sup, origin));
            }
            return;
        }
        let sub = self.relations.canonical(&mut self.types, sub);
        let sup = self.relations.canonical(&mut self.types, sup);
        if sub == sup || sup == TypeId::ANY {
            system.made_progress = true;
            return;
        }
        match (self.types.node(sub).clone(), self.types.node(sup).clone()) {
            // 関数は入力に反変、出力に共変。
            (
                TypeNode::Lambda {
                    environment: sub_environment,
                    inputs: sub_inputs,
                    output: sub_output,
                    ..
                },
                TypeNode::Lambda {
                    environment: sup_environment,
                    inputs: sup_inputs,
                    output: sup_output,
                    ..
                },
            ) => {
                if sub_inputs.len() != sup_inputs.len() {
                    self.subtyping_mismatch(system, sub, sup, origin);
                    return;
                }
                for (sub_input, sup_input) in sub_inputs.iter().zip(&sup_inputs) {
                    if sub_input.label != sup_input.label {
                        self.subtyping_mismatch(system, sub, sup, origin);
                        return;
                    }
                    let sub_bare = self.types.strip_parameter(sub_input.ty);
                    let sup_bare = self.types.strip_parameter(sup_input.ty);
                    system.push(Constraint::subtyping(sup_bare, sub_bare, origin));
                }
                system.push(Constraint::subtyping(sub_output, sup_output, origin));
                system.push(Constraint::equality(sub_environment, sup_environment, origin));
                system.made_progress = true;
            }
            // タプルは要素ごと。
            (
                TypeNode::Tuple {
                    elements: sub_elements,
                },
                TypeNode::Tuple {
                    elements: sup_elements,
                },
            ) => {
                if sub_elements.len() != sup_elements.len()
                    || sub_elements
                        .iter()
                        .zip(&sup_elements)
                        .any(|(a, b)| a.label != b.label)
                {
                    self.subtyping_mismatch(system, sub, sup, origin);
                    return;
                }
                for (sub_element, sup_element) in sub_elements.iter().zip(&sup_elements) {
                    system.push(Constraint::subtyping(
                        sub_element.ty,
                        sup_element.ty,
                        origin,
                    ));
                }
                system.made_progress = true;
            }
            // 直和は要素集合の包含。
            (TypeNode::Sum { variants: sub_variants }, TypeNode::Sum { variants: sup_variants }) => {
                let all_included = sub_variants.iter().all(|variant| {
                    sup_variants
                        .iter()
                        .any(|candidate| candidate == variant)
                });
                if all_included {
                    system.made_progress = true;
                } else {
                    self.subtyping_mismatch(system, sub, sup, origin);
                }
            }
            (_, TypeNode::Sum { variants }) => {
                if variants.iter().any(|variant| *variant == sub) {
                    system.made_progress = true;
                } else {
                    self.subtyping_mismatch(system, sub, sup, origin);
                }
            }
            // 存在型が上界なら準拠制約へ変換する。
            (_, TypeNode::Existential { interface, .. }) => {
                use super::types::ExistentialInterface;
                match interface {
                    ExistentialInterface::Views { views } => {
                        let mut view_decls = Vec::new();
                        for view in views {
                            if let TypeNode::View { decl } = self.types.node(view) {
                                view_decls.push(*decl);
                            }
                        }
                        system.push(Constraint::conformance(
                            sub,
                            view_decls,
                            crate::ast::ScopeTree::root(),
                            origin,
                        ));
                        system.made_progress = true;
                    }
                    ExistentialInterface::Generic { .. } => {
                        self.apply_equality(system, sub, sup, origin);
                    }
                }
            }
            _ => {
                // 既知の変性規則がなければ等値に畳む。
                self.apply_equality(system, sub, sup, origin);
            }
        }
    }

    fn subtyping_mismatch(
        &mut self,
        system: &mut System,
        sub: TypeId,
        sup: TypeId,
        origin: ConstraintOrigin,
    ) {
        let found = format!("{}", self.types.display(self.program, sub));
        let expected = format!("{}", self.types.display(self.program, sup));
        system.fail(
            Diagnostic::new(DiagnosticCode::TypeMismatch, origin.site)
                .with_arg("found", found)
                .with_arg("expected", expected),
        );
    }

    // ---- パラメータ ----

    fn apply_parameter(
        &mut self,
        system: &mut System,
        argument: TypeId,
        parameter: TypeId,
        origin: ConstraintOrigin,
    ) {
        let parameter = self.apply(system, parameter);
        match self.types.node(parameter).clone() {
            TypeNode::Var { .. } => {
                system
                    .stale
                    .push(Constraint::parameter(argument, parameter, origin));
            }
            TypeNode::Parameter { convention, bare } => match convention {
                // 規約を剥がし、向きに応じて再帰する。
                AccessEffect::Let | AccessEffect::Sink | AccessEffect::Yielded => {
                    system.push(Constraint::subtyping(argument, bare, origin));
                }
                AccessEffect::Inout | AccessEffect::Set => {
                    system.push(Constraint::equality(argument, bare, origin));
                }
            },
            TypeNode::Remote { target, .. } => {
                system.push(Constraint::equality(argument, target, origin));
            }
            _ => {
                system.push(Constraint::equality(argument, parameter, origin));
            }
        }
    }

    // ---- 準拠 ----

    fn apply_conformance(
        &mut self,
        system: &mut System,
        model: TypeId,
        views: &[crate::ast::DeclId],
        scope: ScopeId,
        origin: ConstraintOrigin,
    ) {
        let model = self.apply(system, model);
        if matches!(self.types.node(model), TypeNode::Var { .. }) {
            system.stale.push(Constraint::conformance(
                model,
                views.to_vec(),
                scope,
                origin,
            ));
            return;
        }
        if self.types.flags(model).has_error() {
            return;
        }
        for view in views {
            if !self.model_conforms_to(model, *view, scope) {
                let model_name = format!("{}", self.types.display(self.program, model));
                let view_name = self.decl_display_name(*view);
                system.fail(
                    Diagnostic::new(DiagnosticCode::DoesNotConform, origin.site)
                        .with_arg("model", model_name)
                        .with_arg("view", view_name),
                );
            } else {
                system.made_progress = true;
            }
        }
    }

    /// モデルがビューに準拠するか。関係ストア、スコーレムの上界、
    /// 拡張探索の順に調べる。
    pub(crate) fn model_conforms_to(
        &mut self,
        model: TypeId,
        view: crate::ast::DeclId,
        scope: ScopeId,
    ) -> bool {
        let model = self.relations.canonical(&mut self.types, model);
        // スコーレム・総称パラメータは環境の上界で判定する。
        if let Some(bounds) = self.parameter_bounds(model) {
            if bounds.contains(&view) {
                return true;
            }
            for bound in &bounds {
                if self.relations.refinement_closure(*bound).contains(&view) {
                    return true;
                }
            }
            return false;
        }
        let context = super::relations::VisibilityContext {
            program: self.program,
            imports: &self.imports,
        };
        if self
            .relations
            .conformance(&mut self.types, &context, model, view, scope)
            .is_some()
        {
            return true;
        }
        // 直接の登録がなくても、精緻化で包含されるビューなら成立する。
        let conformed = self.relations.conformed_views(&mut self.types, model);
        if conformed.contains(&view) {
            return true;
        }
        // 拡張探索。まだ検査されていない準拠宣言を強制する。
        let pending: Vec<crate::ast::DeclId> = self
            .extensions_applying_to(model, scope)
            .into_iter()
            .filter(|decl| {
                matches!(self.program.decl(*decl).kind, DeclKind::Conformance(_))
            })
            .collect();
        for conformance_decl in pending {
            self.check_decl(conformance_decl);
        }
        let conformed = self.relations.conformed_views(&mut self.types, model);
        conformed.contains(&view)
    }

    /// スコーレム・総称パラメータの上界ビュー集合。
    fn parameter_bounds(&mut self, model: TypeId) -> Option<Vec<crate::ast::DeclId>> {
        let param_decl = match self.types.node(model) {
            TypeNode::Skolem { base } => {
                let base = *base;
                match self.types.node(base) {
                    TypeNode::GenericParam { decl } => *decl,
                    _ => return None,
                }
            }
            TypeNode::GenericParam { decl } => *decl,
            _ => return None,
        };
        let DeclKind::GenericParam(param) = &self.program.decl(param_decl).kind else {
            return None;
        };
        let annotations = param.annotations.clone();
        let mut bounds = Vec::new();
        for annotation in annotations {
            if let Some(view) = self.view_referred_by(annotation) {
                bounds.push(view);
            }
        }
        Some(bounds)
    }

    // ---- メンバ ----

    #[allow(clippy::too_many_arguments)]
    fn apply_member(
        &mut self,
        system: &mut System,
        receiver: TypeId,
        member_name: &Name,
        member_expr: ExprId,
        output: TypeId,
        scope: ScopeId,
        origin: ConstraintOrigin,
        best: &mut Option<Solution>,
        ties: &mut Vec<Solution>,
    ) -> bool {
        let receiver = self.apply(system, receiver);
        if matches!(self.types.node(receiver), TypeNode::Var { .. }) {
            system.stale.push(Constraint::new(
                ConstraintKind::Member {
                    receiver,
                    member_name: member_name.clone(),
                    member_expr,
                    output,
                    scope,
                },
                origin,
            ));
            return false;
        }
        if self.types.flags(receiver).has_error() {
            self.apply_equality(system, output, TypeId::ERROR, origin);
            return false;
        }
        let instance = self.instance_of(receiver);
        let matches = self.lookup_member(instance, &member_name.stem, scope);
        if matches.is_empty() {
            system.fail(
                Diagnostic::new(DiagnosticCode::UndefinedName, origin.site)
                    .with_arg("name", member_name.stem.to_string()),
            );
            self.apply_equality(system, output, TypeId::ERROR, origin);
            return false;
        }
        let mut candidates = Vec::new();
        for decl in matches {
            let candidate =
                self.candidate_for(decl, Some(receiver), &[], scope, origin.site, false);
            if candidate.diagnostic.is_none() {
                candidates.push(candidate);
            }
        }
        match candidates.len() {
            0 => {
                system.fail(
                    Diagnostic::new(DiagnosticCode::NoViableCandidate, origin.site)
                        .with_arg("name", member_name.stem.to_string()),
                );
                self.apply_equality(system, output, TypeId::ERROR, origin);
                false
            }
            1 => {
                let candidate = candidates.pop().expect("1 件");
                system
                    .bindings
                    .insert(member_expr, candidate.reference.clone());
                for constraint in candidate.constraints {
                    system.push(constraint);
                }
                system.push(Constraint::equality(output, candidate.ty, origin));
                system.made_progress = true;
                false
            }
            _ => {
                // メンバのオーバーロードは候補選択のフォークへ精錬する。
                self.metrics.record_solver_fork();
                for candidate in candidates {
                    let mut child = system.clone();
                    child.made_progress = true;
                    child
                        .bindings
                        .insert(member_expr, candidate.reference.clone());
                    for constraint in candidate.constraints.into_iter().rev() {
                        child.push(constraint);
                    }
                    child.push(Constraint::equality(output, candidate.ty, origin));
                    self.explore(child, best, ties);
                }
                true
            }
        }
    }

    fn trace_step(&mut self, constraint: &Constraint) {
        let should_trace = self.config.trace_enabled
            || self
                .config
                .inference_tracing_span
                .map(|span| span.overlaps(constraint.origin.site))
                .unwrap_or(false);
        if !should_trace {
            return;
        }
        let line = format!(
            "apply {} at {}",
            constraint.kind_label(),
            constraint.origin.site
        );
        if self.config.trace_enabled {
            eprintln!("[TRACE] {line}");
        }
        self.solver_trace.push(line);
    }

    /// 解の置換を型へ適用する。
    pub fn reify(&mut self, ty: TypeId, solution: &Solution) -> TypeId {
        self.types.substitute(ty, &solution.substitution)
    }
}
