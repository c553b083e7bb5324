//! 名前解決。非修飾・修飾探索、メンバ表、拡張探索、組み込み名、
//! 演算子探索を担当する。
//!
//! 名前式はコンポーネント列（最内から最外へ逆順に連なるリスト）として
//! 処理する。非名義的な先頭（任意の式や暗黙レシーバをドメインに持つ
//! コンポーネント）は切り離し、呼び出し側が型を供給するか解決を中止する。

use indexmap::{IndexMap, IndexSet};
use once_cell::sync::Lazy;
use serde::Serialize;
use smallvec::SmallVec;
use smol_str::SmolStr;

use super::constraint::{Constraint, ConstraintOrigin, OriginKind};
use super::driver::Checker;
use super::types::{
    BuiltinType, CallableParam, CompileTimeValue, GenericArgument, GenericArgumentMap, TypeId,
    TypeNode, TypeTransform,
};
use crate::ast::{
    AccessEffect, DeclId, DeclKind, ExprId, ExprKind, Name, NameDomain, OperatorNotation, ScopeId,
};
use crate::diagnostic::{Diagnostic, DiagnosticCode};

/// 名前式が指す宣言への参照。総称引数の束縛を伴う。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeclReference {
    Direct {
        decl: DeclId,
        arguments: GenericArgumentMap,
    },
    Member {
        decl: DeclId,
        arguments: GenericArgumentMap,
    },
    Constructor {
        decl: DeclId,
        arguments: GenericArgumentMap,
    },
    BuiltinFunction {
        name: SmolStr,
    },
    BuiltinType {
        builtin: BuiltinType,
    },
    BuiltinModule,
    CompilerKnown {
        name: SmolStr,
    },
}

impl DeclReference {
    pub fn decl(&self) -> Option<DeclId> {
        match self {
            DeclReference::Direct { decl, .. }
            | DeclReference::Member { decl, .. }
            | DeclReference::Constructor { decl, .. } => Some(*decl),
            _ => None,
        }
    }

    pub fn arguments(&self) -> Option<&GenericArgumentMap> {
        match self {
            DeclReference::Direct { arguments, .. }
            | DeclReference::Member { arguments, .. }
            | DeclReference::Constructor { arguments, .. } => Some(arguments),
            _ => None,
        }
    }
}

/// 名前コンポーネントの用途。シュガー規則の適用条件に使う。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamePurpose {
    Unapplied,
    FunctionCallee,
    SubscriptCallee,
}

/// 解決候補。`viable` でない候補は診断付きで残り、曖昧性の説明に使う。
#[derive(Debug, Clone, Serialize)]
pub struct Candidate {
    pub reference: DeclReference,
    pub ty: TypeId,
    /// 候補の選択時に追加で成立すべき制約。
    pub constraints: Vec<Constraint>,
    #[serde(skip)]
    pub diagnostic: Option<Diagnostic>,
}

/// 候補集合。要素列と、そのうち実行可能なものの添字を分けて持つ。
#[derive(Debug, Clone, Default, Serialize)]
pub struct CandidateSet {
    pub elements: Vec<Candidate>,
    pub viable: Vec<usize>,
}

impl CandidateSet {
    pub fn push(&mut self, candidate: Candidate) {
        if candidate.diagnostic.is_none() {
            self.viable.push(self.elements.len());
        }
        self.elements.push(candidate);
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn viable_count(&self) -> usize {
        self.viable.len()
    }

    /// 唯一の実行可能候補。
    pub fn unique_viable(&self) -> Option<&Candidate> {
        match self.viable.as_slice() {
            [index] => Some(&self.elements[*index]),
            _ => None,
        }
    }

    pub fn viable_candidates(&self) -> impl Iterator<Item = &Candidate> {
        self.viable.iter().map(|index| &self.elements[*index])
    }
}

/// 解決済みコンポーネント。
#[derive(Debug, Clone)]
pub struct ResolvedComponent {
    pub expr: ExprId,
    pub candidates: CandidateSet,
}

/// 名前解決の結果。
#[derive(Debug, Clone)]
pub enum NameResolution {
    /// 名義的な解決が（途中まで）完了した。`unresolved` はレシーバ型が
    /// 決まるまで保留するコンポーネント列。
    Done {
        resolved: Vec<ResolvedComponent>,
        unresolved: Vec<ExprId>,
    },
    /// 先頭が非名義的で、呼び出し側が型を供給する必要がある。
    Inexecutable { components: Vec<ExprId> },
    /// 診断発行済みの失敗。
    Failed,
}

/// 組み込み関数名の一覧。`Builtin` モジュール可視時のみ解決される。
static BUILTIN_FUNCTION_NAMES: Lazy<Vec<&'static str>> = Lazy::new(|| {
    vec![
        "i64_add",
        "i64_sub",
        "i64_mul",
        "i64_lt",
        "i64_eq",
        "i1_copy",
        "i64_copy",
        "float64_add",
        "address_of",
        "trap",
    ]
});

impl<'p> Checker<'p> {
    // ---- 全体の流れ ----

    /// 名前式をコンポーネント列に分解する。返り値は最内が先頭。
    /// 非名義的な先頭（任意の式・暗黙レシーバ）は `Err` 側で返す。
    pub(crate) fn decompose_name(&self, expr: ExprId) -> (Vec<ExprId>, Option<NameDomain>) {
        let mut components = vec![expr];
        let mut current = expr;
        loop {
            let ExprKind::Name(name) = &self.program.expr(current).kind else {
                break;
            };
            match name.domain {
                NameDomain::None => break,
                NameDomain::Implicit => {
                    return (components, Some(NameDomain::Implicit));
                }
                NameDomain::Explicit { subject } => {
                    if matches!(self.program.expr(subject).kind, ExprKind::Name(_)) {
                        components.insert(0, subject);
                        current = subject;
                    } else {
                        return (components, Some(NameDomain::Explicit { subject }));
                    }
                }
            }
        }
        (components, None)
    }

    /// 名前式を解決する。先頭が非名義的な場合は `Inexecutable` を返し、
    /// 呼び出し側がレシーバ型を与えて `resolve_components` を呼び直す。
    pub(crate) fn resolve_name(&mut self, expr: ExprId, purpose: NamePurpose) -> NameResolution {
        let (components, prefix) = self.decompose_name(expr);
        if prefix.is_some() {
            return NameResolution::Inexecutable { components };
        }
        self.resolve_components(&components, None, purpose)
    }

    /// 名義的コンポーネント列を左から右へ解決する。
    pub(crate) fn resolve_components(
        &mut self,
        components: &[ExprId],
        mut parent: Option<TypeId>,
        purpose: NamePurpose,
    ) -> NameResolution {
        let mut resolved = Vec::new();
        for (index, component) in components.iter().enumerate() {
            let is_last = index + 1 == components.len();
            let component_purpose = if is_last {
                purpose
            } else {
                NamePurpose::Unapplied
            };
            // レシーバ型が変数のままなら以降は保留してソルバへ委ねる。
            if let Some(ty) = parent {
                if self.types.flags(ty).has_variable() {
                    return NameResolution::Done {
                        resolved,
                        unresolved: components[index..].to_vec(),
                    };
                }
            }
            let candidates = self.resolve_component(*component, parent, component_purpose);
            if candidates.is_empty() {
                return NameResolution::Failed;
            }
            if is_last {
                resolved.push(ResolvedComponent {
                    expr: *component,
                    candidates,
                });
                break;
            }
            // 中間コンポーネントは一意に決まらなければならない。
            let Some(unique) = candidates.unique_viable() else {
                let name = self.component_name(*component);
                let site = self.program.expr(*component).span;
                let code = if candidates.viable_count() == 0 {
                    DiagnosticCode::NoViableCandidate
                } else {
                    DiagnosticCode::AmbiguousUse
                };
                self.diagnostics
                    .insert(Diagnostic::new(code, site).with_arg("name", name.stem.to_string()));
                return NameResolution::Failed;
            };
            parent = Some(unique.ty);
            resolved.push(ResolvedComponent {
                expr: *component,
                candidates,
            });
        }
        NameResolution::Done {
            resolved,
            unresolved: Vec::new(),
        }
    }

    fn component_name(&self, expr: ExprId) -> Name {
        match &self.program.expr(expr).kind {
            ExprKind::Name(name) => name.name.clone(),
            _ => Name::simple("<expr>"),
        }
    }

    /// 1 コンポーネントを解決して候補集合を作る。
    pub(crate) fn resolve_component(
        &mut self,
        expr: ExprId,
        parent: Option<TypeId>,
        purpose: NamePurpose,
    ) -> CandidateSet {
        let program = self.program;
        let node = program.expr(expr);
        let use_scope = node.scope;
        let site = node.span;
        let ExprKind::Name(name_expr) = &node.kind else {
            return CandidateSet::default();
        };
        let mut name = name_expr.name.clone();
        let argument_exprs: Vec<ExprId> = name_expr.arguments.clone();

        // 静的引数リストの評価。各引数は型（または値）に実体化される。
        let Some(arguments) = self.evaluate_static_arguments(&argument_exprs) else {
            return CandidateSet::default();
        };

        // 組み込みモジュールと組み込み名。
        if let Some(candidates) = self.builtin_candidates(&name, parent, use_scope) {
            return candidates;
        }
        // 本組み込みエイリアス（Any / Never / Self / Sum / Metatype）。
        if parent.is_none() {
            if let Some(candidates) =
                self.intrinsic_alias_candidates(&name, &arguments, use_scope, site)
            {
                return candidates;
            }
        }

        // シュガー規則: メタタイプを関数呼び出しの被呼者に使う場合は
        // `init` の探索に、非メタタイプへの添字適用は `[]` の探索に書き換える。
        let mut lookup_parent = parent;
        let mut as_constructor = false;
        if let Some(parent_ty) = parent {
            if let TypeNode::Metatype { instance } = self.types.node(parent_ty) {
                let instance = *instance;
                lookup_parent = Some(instance);
                if purpose == NamePurpose::FunctionCallee {
                    name = Name::simple("init");
                    as_constructor = true;
                }
            } else if purpose == NamePurpose::SubscriptCallee {
                name = Name::simple("[]");
            }
        }

        // 探索本体。
        let matches = match lookup_parent {
            Some(parent_ty) => {
                let instance = self.instance_of(parent_ty);
                self.lookup_member(instance, &name.stem, use_scope)
            }
            None => self.lookup_unqualified(&name.stem, use_scope),
        };

        if matches.is_empty() {
            self.diagnostics.insert(
                Diagnostic::new(DiagnosticCode::UndefinedName, site)
                    .with_arg("name", name.stem.to_string()),
            );
            return CandidateSet::default();
        }

        let mut candidates = CandidateSet::default();
        for decl in matches {
            let candidate = self.candidate_for(
                decl,
                lookup_parent,
                &arguments,
                use_scope,
                site,
                as_constructor,
            );
            candidates.push(candidate);
        }
        candidates
    }

    /// 静的引数リストを評価する。失敗時は診断発行済みで `None`。
    fn evaluate_static_arguments(&mut self, exprs: &[ExprId]) -> Option<Vec<GenericArgument>> {
        let mut out = Vec::with_capacity(exprs.len());
        for expr in exprs {
            match &self.program.expr(*expr).kind {
                ExprKind::IntLiteral { value } => out.push(GenericArgument::Value {
                    value: CompileTimeValue::Int { value: *value },
                }),
                ExprKind::BoolLiteral { value } => out.push(GenericArgument::Value {
                    value: CompileTimeValue::Bool { value: *value },
                }),
                _ => {
                    let ty = self.realize_type_expr(*expr)?;
                    out.push(GenericArgument::Type { ty });
                }
            }
        }
        Some(out)
    }

    // ---- 組み込み ----

    fn builtin_candidates(
        &mut self,
        name: &Name,
        parent: Option<TypeId>,
        _use_scope: ScopeId,
    ) -> Option<CandidateSet> {
        // `Builtin` モジュール自体。
        if parent.is_none() {
            if name.stem == "Builtin" && self.config.is_builtin_module_visible {
                let ty = self.types.builtin(BuiltinType::Module);
                let mut candidates = CandidateSet::default();
                candidates.push(Candidate {
                    reference: DeclReference::BuiltinModule,
                    ty,
                    constraints: Vec::new(),
                    diagnostic: None,
                });
                return Some(candidates);
            }
            return None;
        }
        // 親が組み込みモジュールなら組み込み型・関数を引く。
        let parent_ty = parent?;
        if !matches!(
            self.types.node(parent_ty),
            TypeNode::Builtin {
                builtin: BuiltinType::Module
            }
        ) {
            return None;
        }
        let mut candidates = CandidateSet::default();
        if let Some(builtin) = BuiltinType::from_name(&name.stem) {
            let instance = self.types.builtin(builtin);
            let ty = self.types.metatype(instance);
            candidates.push(Candidate {
                reference: DeclReference::BuiltinType { builtin },
                ty,
                constraints: Vec::new(),
                diagnostic: None,
            });
        } else if BUILTIN_FUNCTION_NAMES.contains(&name.stem.as_str()) {
            let ty = self.builtin_function_type(&name.stem);
            candidates.push(Candidate {
                reference: DeclReference::BuiltinFunction {
                    name: name.stem.clone(),
                },
                ty,
                constraints: Vec::new(),
                diagnostic: None,
            });
        }
        Some(candidates)
    }

    fn builtin_function_type(&mut self, name: &str) -> TypeId {
        let i64_ty = self.types.builtin(BuiltinType::I64);
        let i1_ty = self.types.builtin(BuiltinType::I1);
        let float64_ty = self.types.builtin(BuiltinType::Float64);
        let ptr_ty = self.types.builtin(BuiltinType::Ptr);
        let sink = |store: &mut super::types::TypeStore, ty| {
            let parameter = store.parameter(crate::ast::AccessEffect::Sink, ty);
            CallableParam {
                label: None,
                ty: parameter,
            }
        };
        let (inputs, output) = match name {
            "i64_add" | "i64_sub" | "i64_mul" => (
                vec![sink(&mut self.types, i64_ty), sink(&mut self.types, i64_ty)],
                i64_ty,
            ),
            "i64_lt" | "i64_eq" => (
                vec![sink(&mut self.types, i64_ty), sink(&mut self.types, i64_ty)],
                i1_ty,
            ),
            "i1_copy" => (vec![sink(&mut self.types, i1_ty)], i1_ty),
            "i64_copy" => (vec![sink(&mut self.types, i64_ty)], i64_ty),
            "float64_add" => (
                vec![
                    sink(&mut self.types, float64_ty),
                    sink(&mut self.types, float64_ty),
                ],
                float64_ty,
            ),
            "address_of" => (vec![sink(&mut self.types, TypeId::ANY)], ptr_ty),
            "trap" => (Vec::new(), TypeId::NEVER),
            _ => (Vec::new(), TypeId::ERROR),
        };
        self.types
            .lambda(crate::ast::AccessEffect::Let, TypeId::VOID, inputs, output)
    }

    /// AST 探索なしで処理する本組み込みエイリアス。
    fn intrinsic_alias_candidates(
        &mut self,
        name: &Name,
        arguments: &[GenericArgument],
        use_scope: ScopeId,
        site: crate::span::Span,
    ) -> Option<CandidateSet> {
        let instance = match name.stem.as_str() {
            "Any" => TypeId::ANY,
            "Never" => TypeId::NEVER,
            "Void" => TypeId::VOID,
            "Self" => self.receiver_type_in(use_scope)?,
            "Sum" => {
                let mut variants = Vec::new();
                for argument in arguments {
                    match argument {
                        GenericArgument::Type { ty } => variants.push(*ty),
                        GenericArgument::Value { .. } => {
                            self.diagnostics.insert(Diagnostic::new(
                                DiagnosticCode::ValueInSumTypePosition,
                                site,
                            ));
                            variants.push(TypeId::ERROR);
                        }
                    }
                }
                if variants.len() < 2 {
                    self.diagnostics
                        .insert(Diagnostic::new(DiagnosticCode::SumTypeTooFewElements, site));
                    TypeId::ERROR
                } else {
                    self.types.sum(variants)
                }
            }
            "Metatype" => match arguments {
                [GenericArgument::Type { ty }] => self.types.metatype(*ty),
                _ => return None,
            },
            _ => return None,
        };
        let ty = self.types.metatype(instance);
        let mut candidates = CandidateSet::default();
        candidates.push(Candidate {
            reference: DeclReference::CompilerKnown {
                name: name.stem.clone(),
            },
            ty,
            constraints: Vec::new(),
            diagnostic: None,
        });
        Some(candidates)
    }

    /// `use_scope` を囲む型スコープのレシーバ型（`Self` の指示対象）。
    pub(crate) fn receiver_type_in(&mut self, use_scope: ScopeId) -> Option<TypeId> {
        let program = self.program;
        for scope in program.scopes.ancestors_inclusive(use_scope) {
            let Some(introducer) = program.scopes.introducer(scope) else {
                continue;
            };
            match &program.decl(introducer).kind {
                DeclKind::Record(_) => {
                    return Some(self.self_type_of_record(introducer));
                }
                DeclKind::View(view) => {
                    let param = self.types.generic_param(view.receiver_param);
                    return Some(self.types.skolem(param));
                }
                DeclKind::Extension(extension) => {
                    let subject = extension.subject;
                    let ty = self.realize_type_expr(subject)?;
                    return Some(self.instance_of(ty));
                }
                DeclKind::Conformance(conformance) => {
                    let subject = conformance.subject;
                    let ty = self.realize_type_expr(subject)?;
                    return Some(self.instance_of(ty));
                }
                _ => continue,
            }
        }
        None
    }

    /// メタタイプなら中身を、そうでなければそのまま返す。
    pub(crate) fn instance_of(&self, ty: TypeId) -> TypeId {
        match self.types.node(ty) {
            TypeNode::Metatype { instance } => *instance,
            _ => ty,
        }
    }

    /// レコード宣言の `Self` 型。総称ならパラメータを自己束縛した形。
    /// 値パラメータは値引数として束縛する。
    pub(crate) fn self_type_of_record(&mut self, decl: DeclId) -> TypeId {
        let DeclKind::Record(record) = &self.program.decl(decl).kind else {
            return TypeId::ERROR;
        };
        let base = self.types.record(decl);
        if record.generic_params.is_empty() {
            return base;
        }
        let params = record.generic_params.clone();
        let mut arguments = Vec::with_capacity(params.len());
        for param in params {
            let argument = if self.is_type_generic_param(param) {
                let ty = self.types.generic_param(param);
                GenericArgument::Type { ty }
            } else {
                GenericArgument::Value {
                    value: CompileTimeValue::Param { decl: param },
                }
            };
            arguments.push((param, argument));
        }
        self.types.bound_generic(base, arguments)
    }

    /// 総称パラメータが型パラメータかどうか（値パラメータでないか）。
    pub(crate) fn is_type_generic_param(&mut self, param: DeclId) -> bool {
        let DeclKind::GenericParam(generic) = &self.program.decl(param).kind else {
            return false;
        };
        let annotations = generic.annotations.clone();
        annotations.is_empty() || self.view_referred_by(annotations[0]).is_some()
    }

    // ---- 非修飾探索 ----

    /// スコープ内の名前表。挿入順を保ち、(スコープ) 単位でメモ化する。
    fn names_in_scope(&mut self, scope: ScopeId) -> &IndexMap<SmolStr, IndexSet<DeclId>> {
        if !self.scope_name_tables.contains_key(&scope) {
            let program = self.program;
            let mut table: IndexMap<SmolStr, IndexSet<DeclId>> = IndexMap::new();
            for decl in program.scopes.decls(scope) {
                if let Some(name) = program.decl_name(*decl) {
                    table.entry(name.stem).or_default().insert(*decl);
                }
                // 束縛宣言はパターンが導入する名前で引けるようにする。
                if let DeclKind::Binding(binding) = &program.decl(*decl).kind {
                    for (name, _) in program.pattern_names(binding.pattern) {
                        table.entry(name).or_default().insert(*decl);
                    }
                }
            }
            self.scope_name_tables.insert(scope, table);
        } else {
            self.metrics.record_memoized_lookup();
        }
        &self.scope_name_tables[&scope]
    }

    /// 非修飾探索。内側から外側へスコープ連鎖を辿り、オーバーロード
    /// 不能な一致が見つかった時点で打ち切る。インポートされたモジュール
    /// は最後に（同じ翻訳単位内でのみ）参照する。
    pub(crate) fn lookup_unqualified(
        &mut self,
        stem: &str,
        scope: ScopeId,
    ) -> IndexSet<DeclId> {
        let program = self.program;
        let mut matches = IndexSet::new();
        for current in program.scopes.ancestors_inclusive(scope).collect::<Vec<_>>() {
            let found: SmallVec<[DeclId; 4]> = self
                .names_in_scope(current)
                .get(stem)
                .map(|decls| decls.iter().copied().collect())
                .unwrap_or_default();
            for decl in found {
                let overloadable = program.decl(decl).kind.is_overloadable();
                matches.insert(decl);
                if !overloadable {
                    return matches;
                }
            }
        }
        if !matches.is_empty() {
            return matches;
        }
        // インポート済みモジュール、次いでコアライブラリ。
        let mut imported: Vec<DeclId> = Vec::new();
        if let Some(unit) = program.translation_unit_containing(scope) {
            if let Some(modules) = self.imports.get(&unit) {
                imported.extend(modules.iter().copied());
            }
        }
        if let Some(core) = program.core_library {
            if !imported.contains(&core) {
                imported.push(core);
            }
        }
        for module in imported {
            for unit in self.units_of_module(module) {
                let Some(unit_scope) = program.scope_introduced_by(unit) else {
                    continue;
                };
                let found: SmallVec<[DeclId; 4]> = self
                    .names_in_scope(unit_scope)
                    .get(stem)
                    .map(|decls| decls.iter().copied().collect())
                    .unwrap_or_default();
                matches.extend(found);
            }
        }
        matches
    }

    fn units_of_module(&self, module: DeclId) -> Vec<DeclId> {
        match &self.program.decl(module).kind {
            DeclKind::Module(decl) => decl.sources.clone(),
            _ => Vec::new(),
        }
    }

    // ---- メンバ探索 ----

    /// 型のメンバ探索。型スコープ直下、次に `use_scope` から見える拡張、
    /// 最後に継承された準拠要件の順で探す。(型, スコープ) 単位でメモ化。
    pub(crate) fn lookup_member(
        &mut self,
        receiver: TypeId,
        stem: &str,
        use_scope: ScopeId,
    ) -> IndexSet<DeclId> {
        self.metrics.record_member_lookup();
        let receiver = self.relations.canonical(&mut self.types, receiver);
        let key = (receiver, use_scope);
        if let Some(table) = self.member_tables.get(&key) {
            self.metrics.record_memoized_lookup();
            return table.get(stem).cloned().unwrap_or_default();
        }
        let table = self.build_member_table(receiver, use_scope);
        let result = table.get(stem).cloned().unwrap_or_default();
        self.member_tables.insert(key, table);
        result
    }

    fn build_member_table(
        &mut self,
        receiver: TypeId,
        use_scope: ScopeId,
    ) -> IndexMap<SmolStr, IndexSet<DeclId>> {
        let program = self.program;
        let mut table: IndexMap<SmolStr, IndexSet<DeclId>> = IndexMap::new();
        let Some(base_decl) = self.nominal_base_decl(receiver) else {
            return table;
        };

        let mut add_members = |checker: &mut Self,
                               table: &mut IndexMap<SmolStr, IndexSet<DeclId>>,
                               container: DeclId| {
            let Some(scope) = program.scope_introduced_by(container) else {
                return;
            };
            let names = checker.names_in_scope(scope).clone();
            for (name, decls) in names {
                table.entry(name).or_default().extend(decls);
            }
        };

        // モジュール・名前空間はスコープ直下のみ。
        match &program.decl(base_decl).kind {
            DeclKind::Module(module) => {
                for unit in module.sources.clone() {
                    add_members(self, &mut table, unit);
                }
                return table;
            }
            DeclKind::Namespace(_) => {
                add_members(self, &mut table, base_decl);
                return table;
            }
            _ => {}
        }

        // 1. 型スコープ直下の宣言。
        add_members(self, &mut table, base_decl);

        // 2. `use_scope` から見える拡張・準拠宣言。
        for extension in self.extensions_applying_to(receiver, use_scope) {
            add_members(self, &mut table, extension);
        }

        // 3. 継承された準拠要件。
        let views = self.relations.conformed_views(&mut self.types, receiver);
        for view in views {
            add_members(self, &mut table, view);
        }
        table
    }

    /// 名義型の基底宣言。束縛総称は基底へ剥がす。
    pub(crate) fn nominal_base_decl(&mut self, ty: TypeId) -> Option<DeclId> {
        match self.types.node(ty) {
            TypeNode::Record { decl }
            | TypeNode::View { decl }
            | TypeNode::Module { decl }
            | TypeNode::Namespace { decl } => Some(*decl),
            TypeNode::Alias { aliasee, .. } => {
                let aliasee = *aliasee;
                self.nominal_base_decl(aliasee)
            }
            TypeNode::BoundGeneric { base, .. } => {
                let base = *base;
                self.nominal_base_decl(base)
            }
            TypeNode::Skolem { base } => {
                let base = *base;
                self.nominal_base_decl(base)
            }
            TypeNode::GenericParam { decl } => {
                // 上界ビューのメンバが見えるよう、最初のビュー注釈を辿る。
                let decl = *decl;
                match &self.program.decl(decl).kind {
                    DeclKind::GenericParam(param) => {
                        let annotations = param.annotations.clone();
                        for annotation in annotations {
                            if let Some(view) = self.view_referred_by(annotation) {
                                return Some(view);
                            }
                        }
                        None
                    }
                    _ => None,
                }
            }
            TypeNode::Lens { view, .. } => {
                let view = *view;
                self.nominal_base_decl(view)
            }
            _ => None,
        }
    }

    /// 解決順に拡張・準拠宣言を集める。解決中の拡張は
    /// `extensions_on_stack` で除外して無限再帰を避ける。
    pub(crate) fn extensions_applying_to(
        &mut self,
        receiver: TypeId,
        use_scope: ScopeId,
    ) -> Vec<DeclId> {
        let program = self.program;
        let mut sources: Vec<DeclId> = Vec::new();
        // 対象型のモジュール、use_scope のモジュール、インポート、コア。
        if let Some(base) = self.nominal_base_decl(receiver) {
            if let Some(module) = program.module_containing(program.decl(base).scope) {
                sources.push(module);
            }
        }
        if let Some(module) = program.module_containing(use_scope) {
            if !sources.contains(&module) {
                sources.push(module);
            }
        }
        if let Some(unit) = program.translation_unit_containing(use_scope) {
            if let Some(imported) = self.imports.get(&unit) {
                for module in imported {
                    if !sources.contains(module) {
                        sources.push(*module);
                    }
                }
            }
        }
        if let Some(core) = program.core_library {
            if !sources.contains(&core) {
                sources.push(core);
            }
        }

        let mut out = Vec::new();
        for module in sources {
            for unit in self.units_of_module(module) {
                let members = match &program.decl(unit).kind {
                    DeclKind::SourceFile(file) => file.members.clone(),
                    _ => continue,
                };
                for member in members {
                    let subject = match &program.decl(member).kind {
                        DeclKind::Extension(extension) => extension.subject,
                        DeclKind::Conformance(conformance) => conformance.subject,
                        _ => continue,
                    };
                    if self.extensions_on_stack.contains(&member) {
                        continue;
                    }
                    self.extensions_on_stack.insert(member);
                    let applies = self
                        .realize_type_expr(subject)
                        .map(|subject_ty| self.extension_subject_matches(subject_ty, receiver))
                        .unwrap_or(false);
                    self.extensions_on_stack.swap_remove(&member);
                    if applies {
                        out.push(member);
                    }
                }
            }
        }
        out
    }

    fn extension_subject_matches(&mut self, subject: TypeId, receiver: TypeId) -> bool {
        let subject = self.instance_of(subject);
        let subject = self.relations.canonical(&mut self.types, subject);
        let receiver = self.relations.canonical(&mut self.types, receiver);
        if subject == receiver {
            return true;
        }
        // 総称型の拡張は基底宣言の一致で適用する。
        let subject_base = self.nominal_base_decl(subject);
        let receiver_base = self.nominal_base_decl(receiver);
        subject_base.is_some() && subject_base == receiver_base
    }

    /// 型式がビュー宣言を指すならその宣言を返す。実体化はしない。
    pub(crate) fn view_referred_by(&mut self, expr: ExprId) -> Option<DeclId> {
        let ExprKind::Name(name) = &self.program.expr(expr).kind else {
            return None;
        };
        let stem = name.name.stem.clone();
        let scope = self.program.expr(expr).scope;
        let matches = self.lookup_unqualified(&stem, scope);
        matches
            .into_iter()
            .find(|decl| matches!(self.program.decl(*decl).kind, DeclKind::View(_)))
    }

    // ---- 候補の構築 ----

    /// 1 宣言から候補を作る。型の実体化、規約の剥離、プロパティ添字の
    /// 出力置換、総称引数の対応付け、特殊化、インスタンス化を行う。
    pub(crate) fn candidate_for(
        &mut self,
        decl: DeclId,
        parent: Option<TypeId>,
        explicit_arguments: &[GenericArgument],
        use_scope: ScopeId,
        site: crate::span::Span,
        as_constructor: bool,
    ) -> Candidate {
        let realized = self.realize_decl(decl);
        let mut diagnostic = None;
        // エラー型の宣言は追加診断なしで流す（エラーフラグが抑制する）。

        // 規約を剥がし、プロパティ添字は出力で置き換える。
        let mut ty = self.types.strip_parameter(realized);
        if let TypeNode::Subscript {
            is_property: true,
            output,
            ..
        } = self.types.node(ty)
        {
            ty = *output;
        }

        // 総称引数の対応付け。明示引数、親の束縛引数、暗黙の変数の順。
        let params = self.generic_params_of(decl);
        let mut arguments = GenericArgumentMap::new();
        if !explicit_arguments.is_empty() {
            if explicit_arguments.len() != params.len() {
                diagnostic = Some(
                    Diagnostic::new(DiagnosticCode::NoViableCandidate, site)
                        .with_arg("name", self.decl_stem(decl)),
                );
            } else {
                for (param, argument) in params.iter().zip(explicit_arguments) {
                    arguments.insert(*param, *argument);
                }
            }
        } else if let Some(parent_ty) = parent {
            // 親の束縛総称引数から引き継ぐ。
            let parent_instance = self.instance_of(parent_ty);
            if let TypeNode::BoundGeneric {
                arguments: parent_arguments,
                ..
            } = self.types.node(parent_instance)
            {
                for (param, argument) in parent_arguments.clone() {
                    arguments.insert(param, argument);
                }
            }
        }

        // 親型を通したメンバ参照では `Self` を親へ特殊化する。
        if let Some(parent_ty) = parent {
            if let Some(receiver_param) = self.enclosing_view_receiver(decl) {
                let instance = self.instance_of(parent_ty);
                arguments.insert(receiver_param, GenericArgument::Type { ty: instance });
            }
        }

        ty = self.types.specialize(ty, &arguments);

        // コンストラクタシュガー: イニシャライザ型 (args) -> Void を
        // (args) -> Self に書き換える。
        if as_constructor {
            if let Some(parent_ty) = parent {
                let instance = self.instance_of(parent_ty);
                if let TypeNode::Lambda {
                    environment,
                    inputs,
                    ..
                } = self.types.node(ty).clone()
                {
                    ty = self
                        .types
                        .lambda(AccessEffect::Let, environment, inputs, instance);
                }
            }
        }

        // インスタンス化: use_scope の内側で導入されたパラメータは
        // スコーレム化し、他は変数として開く。
        ty = self.instantiate(ty, use_scope, &mut arguments);

        // 総称環境の制約を候補の付帯制約として持ち込む。
        let mut constraints = Vec::new();
        let environment_constraints = self
            .environment_of(decl)
            .map(|environment| environment.constraints)
            .unwrap_or_default();
        for constraint in environment_constraints {
            let origin = ConstraintOrigin::new(constraint.site, OriginKind::WhereClause);
            match constraint.kind {
                super::env::EnvConstraintKind::Conformance { subject, views } => {
                    let subject = self.types.specialize(subject, &arguments);
                    constraints.push(Constraint::conformance(subject, views, use_scope, origin));
                }
                super::env::EnvConstraintKind::Equality { lhs, rhs } => {
                    let lhs = self.types.specialize(lhs, &arguments);
                    let rhs = self.types.specialize(rhs, &arguments);
                    constraints.push(Constraint::equality(lhs, rhs, origin));
                }
            }
        }

        let reference = if as_constructor {
            DeclReference::Constructor { decl, arguments }
        } else if parent.is_some() {
            DeclReference::Member { decl, arguments }
        } else {
            DeclReference::Direct { decl, arguments }
        };
        Candidate {
            reference,
            ty,
            constraints,
            diagnostic,
        }
    }

    fn decl_stem(&self, decl: DeclId) -> String {
        self.program
            .decl_name(decl)
            .map(|name| name.stem.to_string())
            .unwrap_or_else(|| "<anonymous>".to_string())
    }

    /// 宣言を囲むビューの暗黙 `Self` パラメータ。
    fn enclosing_view_receiver(&self, decl: DeclId) -> Option<DeclId> {
        let program = self.program;
        for scope in program.scopes.ancestors_inclusive(program.decl(decl).scope) {
            if let Some(introducer) = program.scopes.introducer(scope) {
                if let DeclKind::View(view) = &program.decl(introducer).kind {
                    return Some(view.receiver_param);
                }
            }
        }
        None
    }

    /// 宣言の総称パラメータ列。
    pub(crate) fn generic_params_of(&self, decl: DeclId) -> Vec<DeclId> {
        match &self.program.decl(decl).kind {
            DeclKind::Record(record) => record.generic_params.clone(),
            DeclKind::TypeAlias(alias) => alias.generic_params.clone(),
            DeclKind::Function(function) => function.generic_params.clone(),
            DeclKind::Initializer(initializer) => initializer.generic_params.clone(),
            DeclKind::Method(method) => method.generic_params.clone(),
            DeclKind::Subscript(subscript) => subscript.generic_params.clone(),
            _ => Vec::new(),
        }
    }

    /// 型中の総称パラメータをインスタンス化する。`use_scope` の内側で
    /// 導入されたものは固定（スコーレム）、それ以外は新しい変数として
    /// 開き、対応を `arguments` に記録する。
    pub(crate) fn instantiate(
        &mut self,
        ty: TypeId,
        use_scope: ScopeId,
        arguments: &mut GenericArgumentMap,
    ) -> TypeId {
        if !self.types.flags(ty).has_generic_type_param() {
            return ty;
        }
        let program = self.program;
        let mut opened: IndexMap<DeclId, TypeId> = IndexMap::new();
        for (param, argument) in arguments.iter() {
            if let GenericArgument::Type { ty } = argument {
                opened.insert(*param, *ty);
            }
        }
        let result = self.types.transform(ty, &mut |store, current| {
            let TypeNode::GenericParam { decl } = store.node(current) else {
                return TypeTransform::Recurse;
            };
            let decl = *decl;
            if let Some(existing) = opened.get(&decl) {
                return TypeTransform::Replace(*existing);
            }
            let introduced_in = program.decl(decl).scope;
            let replacement = if program.scopes.is_contained_in(use_scope, introduced_in) {
                store.skolem(current)
            } else {
                store.fresh_var(super::driver::VAR_CONTEXT_INSTANTIATION)
            };
            opened.insert(decl, replacement);
            TypeTransform::Replace(replacement)
        });
        for (param, replacement) in opened {
            arguments
                .entry(param)
                .or_insert(GenericArgument::Type { ty: replacement });
        }
        result
    }

    // ---- 演算子探索 ----

    /// 演算子名前空間での探索。スコープ連鎖、インポート、コアの順。
    pub(crate) fn lookup_operator(
        &mut self,
        stem: &str,
        notation: OperatorNotation,
        scope: ScopeId,
    ) -> Option<DeclId> {
        let program = self.program;
        let match_in_scope = |checker: &Self, scope: ScopeId| -> Option<DeclId> {
            program
                .scopes
                .decls(scope)
                .iter()
                .copied()
                .find(|decl| match &checker.program.decl(*decl).kind {
                    DeclKind::Operator(operator) => {
                        operator.stem == stem && operator.notation == notation
                    }
                    _ => false,
                })
        };
        for current in program.scopes.ancestors_inclusive(scope) {
            if let Some(found) = match_in_scope(self, current) {
                return Some(found);
            }
        }
        let mut modules: Vec<DeclId> = Vec::new();
        if let Some(unit) = program.translation_unit_containing(scope) {
            if let Some(imported) = self.imports.get(&unit) {
                modules.extend(imported.iter().copied());
            }
        }
        if let Some(core) = program.core_library {
            if !modules.contains(&core) {
                modules.push(core);
            }
        }
        for module in modules {
            for unit in self.units_of_module(module) {
                if let Some(unit_scope) = program.scope_introduced_by(unit) {
                    if let Some(found) = match_in_scope(self, unit_scope) {
                        return Some(found);
                    }
                }
            }
        }
        None
    }
}
