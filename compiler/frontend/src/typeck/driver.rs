//! チェッカ本体。
//!
//! `realize_decl` と `check_decl` がメモ化された 2 つの入口で、全可変
//! 状態（プロパティマップ・宣言状態・メモ化表・関係ストア・診断）は
//! 1 つの `Checker` 値が所有する。検査は単一スレッドの再帰下降で行い、
//! 中断も再開もない。循環は `decl_states` マーカで検出して診断へ変換
//! する。

use indexmap::{IndexMap, IndexSet};
use serde::Serialize;
use smol_str::SmolStr;

use super::capture::CaptureRecord;
use super::conformance::SynthesizedDecl;
use super::constraint::{Constraint, ConstraintBranch, ConstraintKind, ConstraintOrigin, OriginKind};
use super::env::{CheckerConfig, GenericEnvironment};
use super::fold::FoldedSequence;
use super::generate::Problem;
use super::metrics::CheckerMetrics;
use super::relations::Relations;
use super::resolve::DeclReference;
use super::solve::Solution;
use super::types::{TypeId, TypeNode, TypeStore};
use crate::ast::{
    DeclId, DeclKind, ExprId, ExprKind, FunctionBody, OperatorNotation, Program, ScopeId, StmtKind,
};
use crate::diagnostic::{Diagnostic, DiagnosticCode, DiagnosticSet};

/// 推論変数の文脈タグ。
pub(crate) const VAR_CONTEXT_EXPR: u8 = 1;
pub(crate) const VAR_CONTEXT_PARAMETER: u8 = 2;
pub(crate) const VAR_CONTEXT_RETURN: u8 = 3;
pub(crate) const VAR_CONTEXT_INSTANTIATION: u8 = 4;
pub(crate) const VAR_CONTEXT_MEMBER: u8 = 5;
pub(crate) const VAR_CONTEXT_ENVIRONMENT: u8 = 6;

/// 宣言要求の状態機械。`unseen` はエントリ不在で表す。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeclState {
    Realizing,
    Realized,
    Checking,
    Done,
}

/// チェッカ本体。AST とスコープ木は読み取り専用で借用する。
pub struct Checker<'p> {
    pub program: &'p Program,
    pub config: CheckerConfig,
    pub types: TypeStore,
    pub relations: Relations,
    pub diagnostics: DiagnosticSet,
    pub metrics: CheckerMetrics,

    pub(crate) decl_states: IndexMap<DeclId, DeclState>,
    pub(crate) decl_types: IndexMap<DeclId, TypeId>,
    pub(crate) expr_types: IndexMap<ExprId, TypeId>,
    pub(crate) referred_decls: IndexMap<ExprId, DeclReference>,
    pub(crate) folded_sequences: IndexMap<ExprId, FoldedSequence>,
    pub(crate) implicit_captures: IndexMap<DeclId, Vec<CaptureRecord>>,
    pub(crate) environments: IndexMap<DeclId, GenericEnvironment>,
    pub(crate) synthesized_decls: IndexMap<DeclId, Vec<SynthesizedDecl>>,
    pub(crate) imports: IndexMap<DeclId, IndexSet<DeclId>>,
    pub(crate) solver_trace: Vec<String>,

    pub(crate) member_tables:
        IndexMap<(TypeId, ScopeId), IndexMap<SmolStr, IndexSet<DeclId>>>,
    pub(crate) scope_name_tables: IndexMap<ScopeId, IndexMap<SmolStr, IndexSet<DeclId>>>,
    pub(crate) extensions_on_stack: IndexSet<DeclId>,
    pub(crate) current_return_type: Option<TypeId>,
    pub(crate) is_sound: bool,
}

/// 検査完了後の成果物一式。
#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    pub decl_types: IndexMap<DeclId, TypeId>,
    pub expr_types: IndexMap<ExprId, TypeId>,
    pub referred_decls: IndexMap<ExprId, DeclReference>,
    pub folded_sequences: IndexMap<ExprId, FoldedSequence>,
    pub implicit_captures: IndexMap<DeclId, Vec<CaptureRecord>>,
    pub environments: IndexMap<DeclId, GenericEnvironment>,
    pub synthesized_decls: IndexMap<DeclId, Vec<SynthesizedDecl>>,
    pub imports: IndexMap<DeclId, IndexSet<DeclId>>,
    pub diagnostics: DiagnosticSet,
    pub metrics: CheckerMetrics,
    pub solver_trace: Vec<String>,
    pub is_sound: bool,
    #[serde(skip)]
    pub relations: Relations,
}

impl CheckResult {
    /// 致命的な診断なしで検査を終えたかどうか。
    pub fn is_clean(&self) -> bool {
        self.is_sound && self.diagnostics.error_count() == 0
    }
}

impl<'p> Checker<'p> {
    pub fn new(program: &'p Program, config: CheckerConfig) -> Self {
        Self {
            program,
            config,
            types: TypeStore::new(),
            relations: Relations::new(),
            diagnostics: DiagnosticSet::new(),
            metrics: CheckerMetrics::default(),
            decl_states: IndexMap::new(),
            decl_types: IndexMap::new(),
            expr_types: IndexMap::new(),
            referred_decls: IndexMap::new(),
            folded_sequences: IndexMap::new(),
            implicit_captures: IndexMap::new(),
            environments: IndexMap::new(),
            synthesized_decls: IndexMap::new(),
            imports: IndexMap::new(),
            solver_trace: Vec::new(),
            member_tables: IndexMap::new(),
            scope_name_tables: IndexMap::new(),
            extensions_on_stack: IndexSet::new(),
            current_return_type: None,
            is_sound: true,
        }
    }

    /// プログラム全体を検査して成果物を返す。
    pub fn check_program(program: &'p Program, config: CheckerConfig) -> CheckResult {
        let mut checker = Checker::new(program, config);
        checker.check_all();
        checker.finish()
    }

    /// 全モジュールを検査する。決定的な順序で走る。
    pub fn check_all(&mut self) {
        self.collect_imports();
        self.detect_duplicate_operators();
        self.register_program_conformances();
        for module in self.program.modules.clone() {
            self.check_decl(module);
        }
    }

    pub fn finish(mut self) -> CheckResult {
        // 実体化のみで終わった宣言も検査済みへ昇格する。
        for state in self.decl_states.values_mut() {
            if matches!(state, DeclState::Realizing | DeclState::Realized) {
                *state = DeclState::Done;
            }
        }
        let is_sound = self.is_sound && self.diagnostics.error_count() == 0;
        CheckResult {
            decl_types: self.decl_types,
            expr_types: self.expr_types,
            referred_decls: self.referred_decls,
            folded_sequences: self.folded_sequences,
            implicit_captures: self.implicit_captures,
            environments: self.environments,
            synthesized_decls: self.synthesized_decls,
            imports: self.imports,
            diagnostics: self.diagnostics,
            metrics: self.metrics,
            solver_trace: self.solver_trace,
            is_sound,
            relations: self.relations,
        }
    }

    /// 宣言の状態を返す。未着手は `None`。
    pub fn decl_state(&self, decl: DeclId) -> Option<DeclState> {
        self.decl_states.get(&decl).copied()
    }

    pub fn decl_type(&self, decl: DeclId) -> Option<TypeId> {
        self.decl_types.get(&decl).copied()
    }

    pub fn expr_type(&self, expr: ExprId) -> Option<TypeId> {
        self.expr_types.get(&expr).copied()
    }

    pub fn referred_decl(&self, expr: ExprId) -> Option<&DeclReference> {
        self.referred_decls.get(&expr)
    }

    // ---- 事前パス ----

    fn collect_imports(&mut self) {
        let program = self.program;
        for module in &program.modules {
            let DeclKind::Module(module_decl) = &program.decl(*module).kind else {
                continue;
            };
            for unit in &module_decl.sources {
                let DeclKind::SourceFile(file) = &program.decl(*unit).kind else {
                    continue;
                };
                for member in &file.members {
                    if let DeclKind::Import(import) = &program.decl(*member).kind {
                        match self.module_named(&import.module) {
                            Some(imported) => {
                                self.imports.entry(*unit).or_default().insert(imported);
                            }
                            None => {
                                self.diagnostics.insert(
                                    Diagnostic::new(
                                        DiagnosticCode::UndefinedName,
                                        program.decl(*member).span,
                                    )
                                    .with_arg("name", import.module.to_string()),
                                );
                            }
                        }
                    }
                }
            }
        }
    }

    fn detect_duplicate_operators(&mut self) {
        let program = self.program;
        for scope_index in 0..program.scopes.len() {
            let scope = ScopeId(scope_index as u32);
            let mut seen: IndexMap<(SmolStr, OperatorNotation), DeclId> = IndexMap::new();
            for decl in program.scopes.decls(scope) {
                let DeclKind::Operator(operator) = &program.decl(*decl).kind else {
                    continue;
                };
                let key = (operator.stem.clone(), operator.notation);
                if seen.contains_key(&key) {
                    self.diagnostics.insert(
                        Diagnostic::new(
                            DiagnosticCode::DuplicateOperator,
                            program.decl(*decl).span,
                        )
                        .with_arg("operator", operator.stem.to_string()),
                    );
                } else {
                    seen.insert(key, *decl);
                }
            }
        }
    }

    /// 宣言された準拠と精緻化を登録する事前パス。本体検査の最中に
    /// 準拠が問い合わせられても答えられるようにしておく。
    fn register_program_conformances(&mut self) {
        let program = self.program;
        for module in program.modules.clone() {
            let DeclKind::Module(module_decl) = &program.decl(module).kind else {
                continue;
            };
            for unit in module_decl.sources.clone() {
                let DeclKind::SourceFile(file) = &program.decl(unit).kind else {
                    continue;
                };
                for member in file.members.clone() {
                    self.register_member_conformances(member);
                }
            }
        }
    }

    fn register_member_conformances(&mut self, decl: DeclId) {
        let program = self.program;
        match &program.decl(decl).kind {
            DeclKind::View(view) => {
                let refinements = view.refinements.clone();
                for refinement in refinements {
                    if let Some(base) = self.view_referred_by(refinement) {
                        self.relations.register_refinement(decl, base);
                    }
                }
            }
            DeclKind::Record(record) => {
                let conformances = record.conformances.clone();
                if conformances.is_empty() {
                    return;
                }
                let model = self.self_type_of_record(decl);
                for view_expr in conformances {
                    self.register_declared_conformance(decl, model, view_expr);
                }
            }
            DeclKind::Conformance(conformance) => {
                let subject = conformance.subject;
                let views = conformance.views.clone();
                let Some(subject_ty) = self.realize_type_expr(subject) else {
                    return;
                };
                let model = self.instance_of(subject_ty);
                for view_expr in views {
                    self.register_declared_conformance(decl, model, view_expr);
                }
            }
            DeclKind::Namespace(namespace) => {
                for member in namespace.members.clone() {
                    self.register_member_conformances(member);
                }
            }
            _ => {}
        }
    }

    // ---- 検査 ----

    /// 宣言を検査する。冪等。検査中の再入は循環依存として診断する。
    pub fn check_decl(&mut self, decl: DeclId) {
        match self.decl_states.get(&decl) {
            Some(DeclState::Done) => return,
            Some(DeclState::Checking) => {
                let site = self.program.decl(decl).span;
                let name = self
                    .program
                    .decl_name(decl)
                    .map(|name| name.stem.to_string())
                    .unwrap_or_else(|| "<anonymous>".to_string());
                self.diagnostics.insert(
                    Diagnostic::new(DiagnosticCode::CircularDependency, site)
                        .with_arg("name", name),
                );
                self.decl_states.insert(decl, DeclState::Done);
                self.decl_types.insert(decl, TypeId::ERROR);
                return;
            }
            _ => {}
        }
        self.decl_states.insert(decl, DeclState::Checking);
        self.metrics.record_checked_decl();
        self.check_decl_uncached(decl);
        // 検査が型を確定していなければ実体化で補う。
        if !self.decl_types.contains_key(&decl) {
            self.decl_states.insert(decl, DeclState::Realized);
            let ty = self.realize_decl(decl);
            self.decl_types.insert(decl, ty);
        }
        self.decl_states.insert(decl, DeclState::Done);
    }

    fn check_decl_uncached(&mut self, decl: DeclId) {
        let program = self.program;
        match &program.decl(decl).kind {
            DeclKind::Module(module) => {
                let ty = self.types.module(decl);
                self.decl_types.insert(decl, ty);
                for unit in module.sources.clone() {
                    self.check_decl(unit);
                }
            }
            DeclKind::SourceFile(file) => {
                self.decl_types.insert(decl, TypeId::VOID);
                for member in file.members.clone() {
                    self.check_decl(member);
                }
            }
            DeclKind::Namespace(namespace) => {
                let ty = self.types.namespace(decl);
                self.decl_types.insert(decl, ty);
                for member in namespace.members.clone() {
                    self.check_decl(member);
                }
            }
            DeclKind::Import(_) | DeclKind::Operator(_) => {
                let ty = self.realize_with_state_guard(decl);
                self.decl_types.insert(decl, ty);
            }
            DeclKind::Record(record) => {
                let members = record.members.clone();
                let generic_params = record.generic_params.clone();
                let ty = self.realize_with_state_guard(decl);
                self.decl_types.insert(decl, ty);
                let _ = self.environment_of(decl);
                for param in generic_params {
                    self.check_decl(param);
                }
                for member in members {
                    self.check_decl(member);
                }
            }
            DeclKind::View(view) => {
                let members = view.members.clone();
                let ty = self.realize_with_state_guard(decl);
                self.decl_types.insert(decl, ty);
                let _ = self.environment_of(decl);
                for member in members {
                    self.check_decl(member);
                }
            }
            DeclKind::Extension(extension) => {
                let members = extension.members.clone();
                let ty = self.realize_with_state_guard(decl);
                self.decl_types.insert(decl, ty);
                let _ = self.environment_of(decl);
                for member in members {
                    self.check_decl(member);
                }
            }
            DeclKind::Conformance(conformance) => {
                let members = conformance.members.clone();
                let ty = self.realize_with_state_guard(decl);
                self.decl_types.insert(decl, ty);
                let _ = self.environment_of(decl);
                for member in members {
                    self.check_decl(member);
                }
            }
            DeclKind::TypeAlias(_)
            | DeclKind::Parameter(_)
            | DeclKind::GenericParam(_)
            | DeclKind::AssocType(_)
            | DeclKind::AssocValue(_) => {
                let ty = self.realize_with_state_guard(decl);
                self.decl_types.insert(decl, ty);
            }
            DeclKind::Binding(_) => {
                self.check_binding(decl);
            }
            DeclKind::Function(function) => {
                let body = function.body;
                let is_requirement = self.is_view_member(decl);
                let in_expr_context = function.is_in_expr_context;
                let generic_params = function.generic_params.clone();
                let ty = self.realize_with_state_guard(decl);
                self.decl_types.insert(decl, ty);
                let _ = self.environment_of(decl);
                for param in generic_params {
                    self.check_decl(param);
                }
                match body {
                    Some(body) if !in_expr_context => {
                        let output = match self.types.node(ty) {
                            TypeNode::Lambda { output, .. } => *output,
                            _ => TypeId::ERROR,
                        };
                        self.check_callable_body(decl, body, output);
                    }
                    Some(_) => {
                        // 式文脈のラムダ本体は推論の遅延クエリが検査する。
                    }
                    None if !is_requirement => {
                        self.diagnostics.insert(
                            Diagnostic::new(
                                DiagnosticCode::DeclarationRequiresBody,
                                program.decl(decl).span,
                            )
                            .with_arg(
                                "name",
                                program
                                    .decl_name(decl)
                                    .map(|name| name.stem.to_string())
                                    .unwrap_or_default(),
                            ),
                        );
                    }
                    None => {}
                }
            }
            DeclKind::Initializer(initializer) => {
                let body = initializer.body;
                let is_memberwise = initializer.is_memberwise;
                let is_requirement = self.is_view_member(decl);
                let ty = self.realize_with_state_guard(decl);
                self.decl_types.insert(decl, ty);
                match body {
                    Some(body) => self.check_callable_body(decl, body, TypeId::VOID),
                    None if !is_memberwise && !is_requirement => {
                        self.diagnostics.insert(
                            Diagnostic::new(
                                DiagnosticCode::DeclarationRequiresBody,
                                program.decl(decl).span,
                            )
                            .with_arg("name", "init"),
                        );
                    }
                    None => {}
                }
            }
            DeclKind::Method(method) => {
                let variants = method.variants.clone();
                let generic_params = method.generic_params.clone();
                let ty = self.realize_with_state_guard(decl);
                self.decl_types.insert(decl, ty);
                let _ = self.environment_of(decl);
                for param in generic_params {
                    self.check_decl(param);
                }
                for variant in variants {
                    self.check_decl(variant);
                }
            }
            DeclKind::MethodVariant(variant) => {
                let body = variant.body;
                let is_requirement = self.is_view_member(decl);
                let ty = self.realize_with_state_guard(decl);
                self.decl_types.insert(decl, ty);
                match body {
                    Some(body) => {
                        let output = match self.types.node(ty) {
                            TypeNode::Lambda { output, .. } => *output,
                            _ => TypeId::ERROR,
                        };
                        self.check_callable_body(decl, body, output);
                    }
                    None if !is_requirement => {
                        self.diagnostics.insert(
                            Diagnostic::new(
                                DiagnosticCode::DeclarationRequiresBody,
                                program.decl(decl).span,
                            )
                            .with_arg("name", "<variant>"),
                        );
                    }
                    None => {}
                }
            }
            DeclKind::Subscript(subscript) => {
                let variants = subscript.variants.clone();
                let generic_params = subscript.generic_params.clone();
                let ty = self.realize_with_state_guard(decl);
                self.decl_types.insert(decl, ty);
                let _ = self.environment_of(decl);
                for param in generic_params {
                    self.check_decl(param);
                }
                for variant in variants {
                    self.check_decl(variant);
                }
            }
            DeclKind::SubscriptVariant(variant) => {
                let body = variant.body;
                let is_requirement = self.is_view_member(decl);
                let ty = self.realize_with_state_guard(decl);
                self.decl_types.insert(decl, ty);
                match body {
                    Some(body) => {
                        let output = match self.types.node(ty) {
                            TypeNode::Subscript { output, .. } => *output,
                            _ => TypeId::ERROR,
                        };
                        let mut problem = Problem::new();
                        let body_ty = self.generate_constraints(body, Some(output), &mut problem);
                        let origin = ConstraintOrigin::new(
                            program.expr(body).span,
                            OriginKind::Return,
                        );
                        problem.push(Constraint::subtyping(body_ty, output, origin));
                        self.solve_and_commit(problem);
                    }
                    None if !is_requirement => {
                        self.diagnostics.insert(
                            Diagnostic::new(
                                DiagnosticCode::DeclarationRequiresBody,
                                program.decl(decl).span,
                            )
                            .with_arg("name", "<variant>"),
                        );
                    }
                    None => {}
                }
            }
        }
    }

    /// `check_decl` の内側から実体化を呼ぶための補助。状態を一時的に
    /// 実体化前へ戻し、循環検出を実体化側に委ねる。
    fn realize_with_state_guard(&mut self, decl: DeclId) -> TypeId {
        if let Some(ty) = self.decl_types.get(&decl) {
            return *ty;
        }
        let saved = self.decl_states.get(&decl).copied();
        self.decl_states.shift_remove(&decl);
        let ty = self.realize_decl(decl);
        if let Some(saved) = saved {
            // 検査中マーカを復元する（実体化が Done へ確定した場合を除く）。
            if matches!(
                self.decl_states.get(&decl),
                Some(DeclState::Realized) | Some(DeclState::Realizing)
            ) {
                self.decl_states.insert(decl, saved);
            }
        }
        ty
    }

    fn is_view_member(&self, decl: DeclId) -> bool {
        let program = self.program;
        program
            .scopes
            .ancestors_inclusive(program.decl(decl).scope)
            .any(|scope| {
                program
                    .scopes
                    .introducer(scope)
                    .is_some_and(|introducer| {
                        matches!(program.decl(introducer).kind, DeclKind::View(_))
                    })
            })
    }

    // ---- 束縛と本体 ----

    fn check_binding(&mut self, decl: DeclId) {
        let mut problem = Problem::new();
        self.infer_local_binding(decl, &mut problem);
        self.solve_and_commit(problem);
    }

    /// 呼び出し可能宣言の本体を検査する。単一式本体には「本体 <: 宣言
    /// された戻り値」（ペナルティ 0）と「本体 = Never」（ペナルティ 1）の
    /// 選言を与え、発散する本体を高コスト側の分岐で受理する。
    fn check_callable_body(&mut self, _decl: DeclId, body: FunctionBody, output: TypeId) {
        let program = self.program;
        let saved_return = self.current_return_type;
        self.current_return_type = Some(output);
        let mut problem = Problem::new();

        let single_expr = match body {
            FunctionBody::Expr { expr } => Some(expr),
            FunctionBody::Block { block } => match &program.expr(block).kind {
                // 単文ブロックの式文は単一式本体として扱う。
                ExprKind::Block { statements } if statements.len() == 1 => {
                    match &program.stmt(statements[0]).kind {
                        StmtKind::Expr { expr } => Some(*expr),
                        _ => None,
                    }
                }
                _ => None,
            },
        };

        match single_expr {
            Some(expr) => {
                let body_ty = self.generate_constraints(expr, Some(output), &mut problem);
                let origin =
                    ConstraintOrigin::new(program.expr(expr).span, OriginKind::Return);
                problem.push(Constraint::new(
                    ConstraintKind::Disjunction {
                        branches: vec![
                            ConstraintBranch::new(
                                vec![Constraint::subtyping(body_ty, output, origin)],
                                0,
                            ),
                            ConstraintBranch::new(
                                vec![Constraint::equality(body_ty, TypeId::NEVER, origin)],
                                1,
                            ),
                        ],
                    },
                    origin,
                ));
            }
            None => {
                let root = match body {
                    FunctionBody::Expr { expr } => expr,
                    FunctionBody::Block { block } => block,
                };
                let _ = self.generate_constraints(root, None, &mut problem);
            }
        }

        self.solve_and_commit(problem);
        self.current_return_type = saved_return;
    }

    /// 式文脈のラムダ本体。シグネチャが解で確定した後に検査する。
    pub(crate) fn check_lambda_body(&mut self, decl: DeclId, solution: &Solution) -> bool {
        let program = self.program;
        let DeclKind::Function(function) = &program.decl(decl).kind else {
            return false;
        };
        let Some(body) = function.body else {
            return true;
        };
        // 解決済みシグネチャを宣言型として確定する。
        let realized = self.realize_decl(decl);
        let reified = self.reify(realized, solution);
        self.decl_types.insert(decl, reified);
        self.decl_states.insert(decl, DeclState::Done);
        // パラメータ型も確定する。
        let params = function.params.clone();
        for param in params {
            if let Some(ty) = self.decl_types.get(&param).copied() {
                let reified = self.reify(ty, solution);
                self.decl_types.insert(param, reified);
            } else {
                let realized = self.realize_decl(param);
                let reified = self.reify(realized, solution);
                self.decl_types.insert(param, reified);
            }
        }
        let output = match self.types.node(reified) {
            TypeNode::Lambda { output, .. } => *output,
            _ => TypeId::ERROR,
        };
        let before = self.diagnostics.error_count();
        self.check_callable_body(decl, body, output);
        self.diagnostics.error_count() == before
    }

    // ---- 解のコミット ----

    /// 問題を解き、解を書き戻し、遅延クエリを順に実行する。
    pub(crate) fn solve_and_commit(&mut self, problem: Problem<'p>) -> Solution {
        let Problem {
            facts,
            constraints,
            deferred,
        } = problem;
        let solution = self.solve_constraints(constraints);
        // 診断を併合する。
        for diagnostic in solution.diagnostics.clone() {
            self.diagnostics.insert(diagnostic);
        }
        // 推論された型を解の置換で確定して書き戻す。
        for (expr, ty) in &facts.expr_types {
            let reified = self.reify(*ty, &solution);
            self.expr_types.insert(*expr, reified);
        }
        for (expr, reference) in &solution.bindings {
            self.referred_decls.insert(*expr, reference.clone());
        }
        if !solution.is_sound {
            self.is_sound = false;
        }
        // 遅延クエリは生成順に走り、健全性フラグへ AND される。
        for query in deferred {
            let sound = query(self, &solution);
            if !sound {
                self.is_sound = false;
            }
        }
        solution
    }

    /// コアライブラリの型を名前で引く。コア不在時は組み込み型へ
    /// フォールバックする。
    pub(crate) fn core_type(&mut self, name: &str) -> TypeId {
        let program = self.program;
        if let Some(core) = program.core_library {
            if let Some(module_scope) = program.scope_introduced_by(core) {
                for unit in program.scopes.decls(module_scope).to_vec() {
                    let Some(file_scope) = program.scope_introduced_by(unit) else {
                        continue;
                    };
                    for decl in program.scopes.decls(file_scope).to_vec() {
                        if let DeclKind::Record(record) = &program.decl(decl).kind {
                            if record.name == name {
                                return self.self_type_of_record(decl);
                            }
                        }
                    }
                }
            }
        }
        // コアライブラリ不在時は組み込み型へフォールバックする。
        match name {
            "Bool" => self.types.builtin(super::types::BuiltinType::I1),
            "Int" => self.types.builtin(super::types::BuiltinType::I64),
            "Float64" => self.types.builtin(super::types::BuiltinType::Float64),
            _ => TypeId::ERROR,
        }
    }
}
