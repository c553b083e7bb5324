//! 式単位の制約生成。
//!
//! 式と任意の形状型（shape）を受け取り、(a) 部分式 → 推論型の
//! `InferenceFacts`、(b) 制約集合、(c) オーバーロード名の束縛ヒント、
//! (d) 解決後に走る遅延クエリ、を生成する。

use smol_str::SmolStr;

use super::constraint::{
    Constraint, ConstraintKind, ConstraintOrigin, InferenceFacts, OriginKind, OverloadCandidate,
};
use super::driver::{
    Checker, VAR_CONTEXT_ENVIRONMENT, VAR_CONTEXT_EXPR, VAR_CONTEXT_MEMBER,
};
use super::fold::FoldedSequence;
use super::resolve::{Candidate, NamePurpose, NameResolution};
use super::solve::Solution;
use super::types::{CallableParam, TupleElement, TypeId, TypeNode};
use crate::ast::{
    AccessEffect, DeclId, DeclKind, ExprId, ExprKind, Name, NameDomain, PatternKind, StmtKind,
};
use crate::diagnostic::{Diagnostic, DiagnosticCode};
use crate::span::Span;

/// 解決後に追加検査を行うクエリ。返り値は健全性フラグに AND される。
pub type DeferredQuery<'p> = Box<dyn FnOnce(&mut Checker<'p>, &Solution) -> bool + 'p>;

/// 1 回の推論で生成される成果物一式。
pub struct Problem<'p> {
    pub facts: InferenceFacts,
    pub constraints: Vec<Constraint>,
    pub deferred: Vec<DeferredQuery<'p>>,
}

impl<'p> Problem<'p> {
    pub fn new() -> Self {
        Self {
            facts: InferenceFacts::default(),
            constraints: Vec::new(),
            deferred: Vec::new(),
        }
    }

    pub fn push(&mut self, constraint: Constraint) {
        self.constraints.push(constraint);
    }
}

impl<'p> Default for Problem<'p> {
    fn default() -> Self {
        Self::new()
    }
}

/// 名前式推論の内部結果。
enum NameInference {
    /// 参照先が一意に確定した。
    Bound(TypeId),
    /// 複数候補。選択はソルバに委ねる。
    Overloaded {
        var: TypeId,
        expr: ExprId,
        candidates: Vec<Candidate>,
    },
    /// レシーバ型が未知でメンバ制約として保留した。
    Deferred(TypeId),
    Failed,
}

impl<'p> Checker<'p> {
    /// 式の制約を生成する。`shape` は外側から与えられる期待形状。
    pub fn generate_constraints(
        &mut self,
        expr: ExprId,
        shape: Option<TypeId>,
        problem: &mut Problem<'p>,
    ) -> TypeId {
        self.infer_expr(expr, shape, problem)
    }

    fn infer_expr(
        &mut self,
        expr: ExprId,
        shape: Option<TypeId>,
        problem: &mut Problem<'p>,
    ) -> TypeId {
        let program = self.program;
        let site = program.expr(expr).span;
        let ty = match &program.expr(expr).kind {
            ExprKind::BoolLiteral { .. } => self.literal_type("Bool"),
            ExprKind::IntLiteral { .. } => self.literal_type("Int"),
            ExprKind::FloatLiteral { .. } => self.literal_type("Float64"),
            ExprKind::StringLiteral { .. } => self.literal_type("String"),
            ExprKind::Name(_) => match self.infer_name(expr, NamePurpose::Unapplied, problem) {
                NameInference::Bound(ty)
                | NameInference::Overloaded { var: ty, .. }
                | NameInference::Deferred(ty) => ty,
                NameInference::Failed => TypeId::ERROR,
            },
            ExprKind::Call { callee, arguments } => {
                let (callee, arguments) = (*callee, arguments.clone());
                self.infer_call(expr, callee, &arguments, false, site, problem)
            }
            ExprKind::SubscriptCall { callee, arguments } => {
                let (callee, arguments) = (*callee, arguments.clone());
                self.infer_call(expr, callee, &arguments, true, site, problem)
            }
            ExprKind::Lambda { decl } => {
                let decl = *decl;
                let ty = self.realize_decl(decl);
                if let Some(shape) = shape {
                    problem.push(Constraint::subtyping(
                        ty,
                        shape,
                        ConstraintOrigin::new(site, OriginKind::Structural),
                    ));
                }
                // 本体の検査はシグネチャが確定してから行う。
                problem.deferred.push(Box::new(move |checker, solution| {
                    checker.check_lambda_body(decl, solution)
                }));
                ty
            }
            ExprKind::Tuple { elements } => {
                let elements = elements.clone();
                let shapes: Vec<Option<TypeId>> = match shape.map(|s| self.types.node(s).clone())
                {
                    Some(TypeNode::Tuple {
                        elements: shape_elements,
                    }) if shape_elements.len() == elements.len() => shape_elements
                        .iter()
                        .map(|element| Some(element.ty))
                        .collect(),
                    _ => vec![None; elements.len()],
                };
                let mut realized = Vec::new();
                for (element, element_shape) in elements.iter().zip(shapes) {
                    let element_ty = self.infer_expr(element.value, element_shape, problem);
                    realized.push(TupleElement {
                        label: element.label.clone(),
                        ty: element_ty,
                    });
                }
                self.types.tuple(realized)
            }
            ExprKind::Sequence { .. } => {
                let folded = self.fold_sequence(expr);
                match folded {
                    Some(folded) => {
                        let ty = self.infer_folded(&folded, problem);
                        self.folded_sequences.insert(expr, folded);
                        ty
                    }
                    None => TypeId::ERROR,
                }
            }
            ExprKind::Inout { subject } => {
                let subject = *subject;
                self.infer_expr(subject, shape, problem)
            }
            ExprKind::Conditional {
                condition,
                success,
                failure,
            } => {
                let (condition, success, failure) = (*condition, *success, *failure);
                let bool_ty = self.core_type("Bool");
                let condition_ty = self.infer_expr(condition, Some(bool_ty), problem);
                problem.push(Constraint::equality(
                    condition_ty,
                    bool_ty,
                    ConstraintOrigin::new(program.expr(condition).span, OriginKind::Condition),
                ));
                match failure {
                    Some(failure) => {
                        let merged = self.types.fresh_var(VAR_CONTEXT_EXPR);
                        let success_ty = self.infer_expr(success, shape, problem);
                        let failure_ty = self.infer_expr(failure, shape, problem);
                        problem.push(Constraint::subtyping(
                            success_ty,
                            merged,
                            ConstraintOrigin::new(
                                program.expr(success).span,
                                OriginKind::Branch,
                            ),
                        ));
                        problem.push(Constraint::subtyping(
                            failure_ty,
                            merged,
                            ConstraintOrigin::new(
                                program.expr(failure).span,
                                OriginKind::Branch,
                            ),
                        ));
                        merged
                    }
                    None => {
                        let _ = self.infer_expr(success, None, problem);
                        TypeId::VOID
                    }
                }
            }
            ExprKind::Block { statements } => {
                let statements = statements.clone();
                for stmt in statements {
                    self.infer_stmt(stmt, problem);
                }
                TypeId::VOID
            }
            // 型位置の式が値位置に現れた場合はメタタイプとして実体化する。
            ExprKind::SumType { .. }
            | ExprKind::ExistentialType { .. }
            | ExprKind::LambdaType { .. }
            | ExprKind::RemoteType { .. }
            | ExprKind::ParameterType { .. } => match self.realize_type_expr(expr) {
                Some(instance) => self.types.metatype(instance),
                None => TypeId::ERROR,
            },
        };
        problem.facts.assign(expr, ty);
        ty
    }

    /// リテラル型。コアライブラリの既定型をそのまま与える。
    /// 束縛側の等値制約がリテラル精度を保つ。
    fn literal_type(&mut self, default_name: &str) -> TypeId {
        self.core_type(default_name)
    }

    // ---- 名前式 ----

    fn infer_name(
        &mut self,
        expr: ExprId,
        purpose: NamePurpose,
        problem: &mut Problem<'p>,
    ) -> NameInference {
        let program = self.program;
        let site = program.expr(expr).span;
        match self.resolve_name(expr, purpose) {
            NameResolution::Done {
                resolved,
                unresolved,
            } => {
                // 解決済みコンポーネントを確定する。
                let mut current: Option<TypeId> = None;
                for component in &resolved {
                    let is_last_resolved =
                        component.expr == resolved.last().map(|c| c.expr).unwrap_or(component.expr);
                    match component.candidates.viable_count() {
                        0 => {
                            let name = self.name_stem_of(component.expr);
                            self.diagnostics.insert(
                                Diagnostic::new(
                                    DiagnosticCode::NoViableCandidate,
                                    program.expr(component.expr).span,
                                )
                                .with_arg("name", name),
                            );
                            return NameInference::Failed;
                        }
                        1 => {
                            let unique = component.candidates.unique_viable().expect("1 件");
                            self.referred_decls
                                .insert(component.expr, unique.reference.clone());
                            problem.facts.assign(component.expr, unique.ty);
                            for constraint in &unique.constraints {
                                problem.push(constraint.clone());
                            }
                            current = Some(unique.ty);
                        }
                        _ if is_last_resolved && unresolved.is_empty() => {
                            // 末尾コンポーネントのオーバーロードはソルバが選ぶ。
                            let var = self.types.fresh_var(VAR_CONTEXT_EXPR);
                            let origin = ConstraintOrigin::new(site, OriginKind::Binding);
                            let candidates: Vec<OverloadCandidate> = component
                                .candidates
                                .viable_candidates()
                                .map(|candidate| {
                                    let mut constraints = candidate.constraints.clone();
                                    constraints.push(Constraint::equality(
                                        var,
                                        candidate.ty,
                                        origin,
                                    ));
                                    OverloadCandidate {
                                        reference: candidate.reference.clone(),
                                        ty: candidate.ty,
                                        constraints,
                                        penalty: 0,
                                    }
                                })
                                .collect();
                            problem
                                .facts
                                .binding_hints
                                .insert(component.expr, candidates.clone());
                            problem.push(Constraint::new(
                                ConstraintKind::OverloadBinding {
                                    name: component.expr,
                                    candidates,
                                },
                                origin,
                            ));
                            problem.facts.assign(component.expr, var);
                            return NameInference::Overloaded {
                                var,
                                expr: component.expr,
                                candidates: component
                                    .candidates
                                    .viable_candidates()
                                    .cloned()
                                    .collect(),
                            };
                        }
                        _ => {
                            let name = self.name_stem_of(component.expr);
                            self.diagnostics.insert(
                                Diagnostic::new(
                                    DiagnosticCode::AmbiguousUse,
                                    program.expr(component.expr).span,
                                )
                                .with_arg("name", name),
                            );
                            return NameInference::Failed;
                        }
                    }
                }
                if unresolved.is_empty() {
                    match current {
                        Some(ty) => NameInference::Bound(ty),
                        None => NameInference::Failed,
                    }
                } else {
                    let receiver = match current {
                        Some(ty) => ty,
                        None => return NameInference::Failed,
                    };
                    NameInference::Deferred(self.defer_member_chain(
                        receiver,
                        &unresolved,
                        problem,
                    ))
                }
            }
            NameResolution::Inexecutable { components } => {
                // 非名義的な先頭。ドメイン式を推論してメンバ連鎖を保留する。
                let head = components[0];
                let receiver = match program.expr(head).kind {
                    ExprKind::Name(ref name) => match name.domain {
                        NameDomain::Explicit { subject } => {
                            self.infer_expr(subject, None, problem)
                        }
                        NameDomain::Implicit => {
                            let scope = program.expr(head).scope;
                            match self.receiver_type_in(scope) {
                                Some(ty) => ty,
                                None => {
                                    self.diagnostics.insert(Diagnostic::new(
                                        DiagnosticCode::NotEnoughContext,
                                        site,
                                    ));
                                    return NameInference::Failed;
                                }
                            }
                        }
                        NameDomain::None => return NameInference::Failed,
                    },
                    _ => return NameInference::Failed,
                };
                NameInference::Deferred(self.defer_member_chain(receiver, &components, problem))
            }
            NameResolution::Failed => NameInference::Failed,
        }
    }

    /// 未解決のメンバコンポーネント列を `Member` 制約の連鎖へ変換する。
    fn defer_member_chain(
        &mut self,
        receiver: TypeId,
        components: &[ExprId],
        problem: &mut Problem<'p>,
    ) -> TypeId {
        let program = self.program;
        let mut current = receiver;
        for component in components {
            let name = match &program.expr(*component).kind {
                ExprKind::Name(name) => name.name.clone(),
                _ => Name::simple("<expr>"),
            };
            let output = self.types.fresh_var(VAR_CONTEXT_MEMBER);
            let origin = ConstraintOrigin::new(
                program.expr(*component).span,
                OriginKind::Member,
            );
            problem.push(Constraint::new(
                ConstraintKind::Member {
                    receiver: current,
                    member_name: name,
                    member_expr: *component,
                    output,
                    scope: program.expr(*component).scope,
                },
                origin,
            ));
            problem.facts.assign(*component, output);
            current = output;
        }
        current
    }

    fn name_stem_of(&self, expr: ExprId) -> String {
        match &self.program.expr(expr).kind {
            ExprKind::Name(name) => name.name.stem.to_string(),
            _ => "<expr>".to_string(),
        }
    }

    // ---- 呼び出し ----

    fn infer_call(
        &mut self,
        _call: ExprId,
        callee: ExprId,
        arguments: &[crate::ast::Argument],
        is_subscript: bool,
        site: Span,
        problem: &mut Problem<'p>,
    ) -> TypeId {
        let program = self.program;
        let purpose = if is_subscript {
            NamePurpose::SubscriptCallee
        } else {
            NamePurpose::FunctionCallee
        };

        // 引数を先に推論する。
        let mut argument_infos = Vec::with_capacity(arguments.len());
        for argument in arguments {
            let ty = self.infer_expr(argument.value, None, problem);
            argument_infos.push((
                argument.label.clone(),
                ty,
                program.expr(argument.value).span,
            ));
        }
        let output = self.types.fresh_var(VAR_CONTEXT_EXPR);

        let callee_inference = if matches!(program.expr(callee).kind, ExprKind::Name(_)) {
            self.infer_name(callee, purpose, problem)
        } else {
            let ty = self.infer_expr(callee, None, problem);
            NameInference::Bound(ty)
        };

        match callee_inference {
            NameInference::Bound(callee_ty) => {
                if self.types.flags(callee_ty).has_error() {
                    return TypeId::ERROR;
                }
                // コンストラクタシュガー: メタタイプを被呼者に使う呼び出し
                // は `init` の探索に書き換える。
                if !is_subscript {
                    if let TypeNode::Metatype { instance } = self.types.node(callee_ty) {
                        let instance = *instance;
                        return self.infer_constructor_call(
                            callee,
                            instance,
                            &argument_infos,
                            output,
                            site,
                            problem,
                        );
                    }
                }
                // 添字シュガー: 非メタタイプ値への添字適用は `[]` メンバの
                // 探索に書き換える。
                if is_subscript
                    && !matches!(self.types.node(callee_ty), TypeNode::Subscript { .. })
                {
                    let member_var = self.types.fresh_var(VAR_CONTEXT_MEMBER);
                    let origin = ConstraintOrigin::new(site, OriginKind::Member);
                    problem.push(Constraint::new(
                        ConstraintKind::Member {
                            receiver: callee_ty,
                            member_name: Name::simple("[]"),
                            member_expr: callee,
                            output: member_var,
                            scope: program.expr(callee).scope,
                        },
                        origin,
                    ));
                    let expected = self.expected_callable(&argument_infos, output, true);
                    problem.push(Constraint::equality(member_var, expected, origin));
                    problem.facts.assign(callee, callee_ty);
                    return output;
                }
                match self.call_constraints(callee_ty, &argument_infos, output, site) {
                    Ok(constraints) => {
                        for constraint in constraints {
                            problem.push(constraint);
                        }
                        problem.facts.assign(callee, callee_ty);
                        output
                    }
                    Err(()) => {
                        self.diagnostics.insert(
                            Diagnostic::new(DiagnosticCode::NoViableCandidate, site)
                                .with_arg("name", self.name_stem_of(callee)),
                        );
                        TypeId::ERROR
                    }
                }
            }
            NameInference::Overloaded {
                var,
                expr: name_expr,
                candidates,
            } => {
                // 候補ごとに適用制約を付けて選択をソルバへ委ねる。
                let origin = ConstraintOrigin::new(site, OriginKind::Callee);
                let mut viable = Vec::new();
                for candidate in candidates {
                    match self.call_constraints(candidate.ty, &argument_infos, output, site) {
                        Ok(mut constraints) => {
                            constraints.extend(candidate.constraints.iter().cloned());
                            constraints.push(Constraint::equality(var, candidate.ty, origin));
                            viable.push(OverloadCandidate {
                                reference: candidate.reference.clone(),
                                ty: candidate.ty,
                                constraints,
                                penalty: 0,
                            });
                        }
                        Err(()) => continue,
                    }
                }
                match viable.len() {
                    0 => {
                        self.diagnostics.insert(
                            Diagnostic::new(DiagnosticCode::NoViableCandidate, site)
                                .with_arg("name", self.name_stem_of(name_expr)),
                        );
                        TypeId::ERROR
                    }
                    1 => {
                        let candidate = viable.pop().expect("1 件");
                        self.referred_decls
                            .insert(name_expr, candidate.reference.clone());
                        for constraint in candidate.constraints {
                            problem.push(constraint);
                        }
                        output
                    }
                    _ => {
                        // 生成済みの OverloadBinding を適用制約付きで置き換える。
                        if let Some(position) = problem.constraints.iter().rposition(
                            |constraint| matches!(
                                &constraint.kind,
                                ConstraintKind::OverloadBinding { name, .. } if *name == name_expr
                            ),
                        ) {
                            problem.constraints.remove(position);
                        }
                        problem
                            .facts
                            .binding_hints
                            .insert(name_expr, viable.clone());
                        problem.push(Constraint::new(
                            ConstraintKind::OverloadBinding {
                                name: name_expr,
                                candidates: viable,
                            },
                            origin,
                        ));
                        output
                    }
                }
            }
            NameInference::Deferred(callee_ty) => {
                // 被呼者の型が確定していない。期待形状のラムダと単一化する。
                let expected = self.expected_callable(&argument_infos, output, is_subscript);
                problem.push(Constraint::equality(
                    callee_ty,
                    expected,
                    ConstraintOrigin::new(site, OriginKind::Callee),
                ));
                output
            }
            NameInference::Failed => TypeId::ERROR,
        }
    }

    /// メタタイプ被呼者のコンストラクタ呼び出し。
    fn infer_constructor_call(
        &mut self,
        callee: ExprId,
        instance: TypeId,
        arguments: &[(Option<SmolStr>, TypeId, Span)],
        output: TypeId,
        site: Span,
        problem: &mut Problem<'p>,
    ) -> TypeId {
        let scope = self.program.expr(callee).scope;
        let metatype = self.types.metatype(instance);
        let inits = self.lookup_member(instance, "init", scope);
        let mut viable = Vec::new();
        for decl in inits {
            let candidate = self.candidate_for(decl, Some(metatype), &[], scope, site, true);
            if candidate.diagnostic.is_some() {
                continue;
            }
            if let Ok(mut constraints) =
                self.call_constraints(candidate.ty, arguments, output, site)
            {
                constraints.extend(candidate.constraints.iter().cloned());
                viable.push(OverloadCandidate {
                    reference: candidate.reference.clone(),
                    ty: candidate.ty,
                    constraints,
                    penalty: 0,
                });
            }
        }
        match viable.len() {
            0 => {
                self.diagnostics.insert(
                    Diagnostic::new(DiagnosticCode::NoViableCandidate, site)
                        .with_arg("name", self.name_stem_of(callee)),
                );
                TypeId::ERROR
            }
            1 => {
                let candidate = viable.pop().expect("1 件");
                self.referred_decls
                    .insert(callee, candidate.reference.clone());
                for constraint in candidate.constraints {
                    problem.push(constraint);
                }
                output
            }
            _ => {
                problem.facts.binding_hints.insert(callee, viable.clone());
                problem.push(Constraint::new(
                    ConstraintKind::OverloadBinding {
                        name: callee,
                        candidates: viable,
                    },
                    ConstraintOrigin::new(site, OriginKind::Callee),
                ));
                output
            }
        }
    }

    /// 呼び出しの適用制約を作る。ラベル・引数個数が合わなければ `Err`。
    fn call_constraints(
        &mut self,
        callable: TypeId,
        arguments: &[(Option<SmolStr>, TypeId, Span)],
        output: TypeId,
        site: Span,
    ) -> Result<Vec<Constraint>, ()> {
        let node = self.types.node(callable).clone();
        let (inputs, callable_output) = match node {
            TypeNode::Lambda {
                inputs, output, ..
            } => (inputs, output),
            TypeNode::Subscript {
                inputs, output, ..
            } => (inputs, output),
            TypeNode::Bundle { variants, .. } => {
                // バンドル適用は let 変種を優先する。
                let (_, variant) = variants
                    .iter()
                    .find(|(effect, _)| *effect == AccessEffect::Let)
                    .or_else(|| variants.first())
                    .ok_or(())?;
                let variant = *variant;
                return self.call_constraints(variant, arguments, output, site);
            }
            TypeNode::Var { .. } => {
                let expected = self.expected_callable(arguments, output, false);
                return Ok(vec![Constraint::equality(
                    callable,
                    expected,
                    ConstraintOrigin::new(site, OriginKind::Callee),
                )]);
            }
            _ => return Err(()),
        };
        if inputs.len() != arguments.len() {
            return Err(());
        }
        let mut constraints = Vec::new();
        for (input, (label, argument_ty, argument_site)) in inputs.iter().zip(arguments) {
            if input.label != *label {
                return Err(());
            }
            constraints.push(Constraint::parameter(
                *argument_ty,
                input.ty,
                ConstraintOrigin::new(*argument_site, OriginKind::Argument),
            ));
        }
        constraints.push(Constraint::equality(
            output,
            callable_output,
            ConstraintOrigin::new(site, OriginKind::Callee),
        ));
        Ok(constraints)
    }

    /// 引数形状から期待される呼び出し可能型を合成する。
    fn expected_callable(
        &mut self,
        arguments: &[(Option<SmolStr>, TypeId, Span)],
        output: TypeId,
        is_subscript: bool,
    ) -> TypeId {
        let environment = self.types.fresh_var(VAR_CONTEXT_ENVIRONMENT);
        let inputs: Vec<CallableParam> = arguments
            .iter()
            .map(|(label, ty, _)| {
                let parameter = self.types.parameter(AccessEffect::Let, *ty);
                CallableParam {
                    label: label.clone(),
                    ty: parameter,
                }
            })
            .collect();
        if is_subscript {
            self.types.subscript(
                false,
                vec![AccessEffect::Let],
                environment,
                inputs,
                output,
            )
        } else {
            self.types
                .lambda(AccessEffect::Let, environment, inputs, output)
        }
    }

    // ---- 演算子木 ----

    fn infer_folded(&mut self, tree: &FoldedSequence, problem: &mut Problem<'p>) -> TypeId {
        let program = self.program;
        match tree {
            FoldedSequence::Leaf { expr } => self.infer_expr(*expr, None, problem),
            FoldedSequence::Node {
                operator_expr,
                lhs,
                rhs,
                ..
            } => {
                let lhs_ty = self.infer_folded(lhs, problem);
                let rhs_ty = self.infer_folded(rhs, problem);
                let operator_name = match &program.expr(*operator_expr).kind {
                    ExprKind::Name(name) => name.name.clone(),
                    _ => Name::simple("<operator>"),
                };
                let member_var = self.types.fresh_var(VAR_CONTEXT_MEMBER);
                let origin = ConstraintOrigin::new(
                    program.expr(*operator_expr).span,
                    OriginKind::OperatorApplication,
                );
                problem.push(Constraint::new(
                    ConstraintKind::Member {
                        receiver: lhs_ty,
                        member_name: operator_name,
                        member_expr: *operator_expr,
                        output: member_var,
                        scope: program.expr(*operator_expr).scope,
                    },
                    origin,
                ));
                let result = self.types.fresh_var(VAR_CONTEXT_EXPR);
                let operand_var = self.types.fresh_var(VAR_CONTEXT_EXPR);
                let parameter = self.types.parameter(AccessEffect::Let, operand_var);
                let environment = self.types.fresh_var(VAR_CONTEXT_ENVIRONMENT);
                let expected = self.types.lambda(
                    AccessEffect::Let,
                    environment,
                    vec![CallableParam {
                        label: None,
                        ty: parameter,
                    }],
                    result,
                );
                problem.push(Constraint::equality(member_var, expected, origin));
                problem.push(Constraint::parameter(rhs_ty, parameter, origin));
                problem.facts.assign(*operator_expr, member_var);
                result
            }
        }
    }

    // ---- 文 ----

    fn infer_stmt(&mut self, stmt: crate::ast::StmtId, problem: &mut Problem<'p>) {
        let program = self.program;
        match &program.stmt(stmt).kind {
            StmtKind::Expr { expr } => {
                let expr = *expr;
                let ty = self.infer_expr(expr, None, problem);
                let site = program.expr(expr).span;
                // 捨てられた非 Void 値には警告を出す。
                problem.deferred.push(Box::new(move |checker, solution| {
                    let resolved = checker.reify(ty, solution);
                    let is_discardable = matches!(
                        checker.types.node(resolved),
                        TypeNode::Void | TypeNode::Never | TypeNode::Error
                    ) || checker.types.flags(resolved).has_error();
                    if !is_discardable {
                        let rendered =
                            format!("{}", checker.types.display(checker.program, resolved));
                        checker.diagnostics.insert(
                            Diagnostic::new(DiagnosticCode::UnusedResult, site)
                                .with_arg("type", rendered),
                        );
                    }
                    true
                }));
            }
            StmtKind::Discard { expr } => {
                let expr = *expr;
                let _ = self.infer_expr(expr, None, problem);
            }
            StmtKind::Return { value } => {
                let value = *value;
                let site = program.stmt(stmt).span;
                let expected = self.current_return_type.unwrap_or(TypeId::ERROR);
                match value {
                    Some(value) => {
                        let ty = self.infer_expr(value, Some(expected), problem);
                        problem.push(Constraint::subtyping(
                            ty,
                            expected,
                            ConstraintOrigin::new(site, OriginKind::Return),
                        ));
                    }
                    None => {
                        problem.push(Constraint::equality(
                            TypeId::VOID,
                            expected,
                            ConstraintOrigin::new(site, OriginKind::Return),
                        ));
                    }
                }
            }
            StmtKind::Decl { decl } => {
                let decl = *decl;
                if matches!(program.decl(decl).kind, DeclKind::Binding(_)) {
                    self.infer_local_binding(decl, problem);
                } else {
                    // ローカルの入れ子宣言は通常経路で検査する。
                    self.check_decl(decl);
                }
            }
        }
    }

    /// ローカル束縛。パターン形状を初期化子の形状として伝播する。
    /// 注釈付きはサブタイピング、注釈なしは等値でリテラル精度を保つ。
    pub(crate) fn infer_local_binding(&mut self, decl: DeclId, problem: &mut Problem<'p>) {
        let program = self.program;
        let DeclKind::Binding(binding) = &program.decl(decl).kind else {
            return;
        };
        let pattern = binding.pattern;
        let annotation = binding.annotation;
        let initializer = binding.initializer;
        let site = program.decl(decl).span;

        let annotated = match annotation {
            Some(annotation) => self.realize_type_expr(annotation),
            None => None,
        };
        let pattern_ty = match annotated {
            Some(ty) => ty,
            None => self.pattern_shape(pattern),
        };

        if let Some(initializer) = initializer {
            let initializer_ty = self.infer_expr(initializer, Some(pattern_ty), problem);
            let origin = ConstraintOrigin::new(site, OriginKind::Initialization);
            if annotation.is_some() {
                problem.push(Constraint::subtyping(initializer_ty, pattern_ty, origin));
            } else {
                problem.push(Constraint::equality(initializer_ty, pattern_ty, origin));
            }
        } else if annotated.is_none() {
            self.diagnostics
                .insert(Diagnostic::new(DiagnosticCode::NotEnoughContext, site));
        }

        // 解決後に束縛の型を確定する。
        problem.deferred.push(Box::new(move |checker, solution| {
            let resolved = checker.reify(pattern_ty, solution);
            checker.decl_types.insert(decl, resolved);
            checker
                .decl_states
                .insert(decl, super::driver::DeclState::Done);
            !checker.types.flags(resolved).has_error()
        }));
    }

    /// パターンから形状型を作る。名前・ワイルドカードは新しい変数。
    fn pattern_shape(&mut self, pattern: crate::ast::PatternId) -> TypeId {
        let program = self.program;
        match &program.pattern(pattern).kind {
            PatternKind::Name { .. } | PatternKind::Wildcard => {
                self.types.fresh_var(VAR_CONTEXT_EXPR)
            }
            PatternKind::Tuple { elements } => {
                let elements = elements.clone();
                let mut realized = Vec::new();
                for element in elements {
                    let ty = self.pattern_shape(element);
                    realized.push(TupleElement { label: None, ty });
                }
                self.types.tuple(realized)
            }
        }
    }
}
