//! 準拠検査。ビューの要件をモデルの候補と突き合わせ、満たされた準拠を
//! 関係ストアへ登録する。組み込みビューについては実装の合成を行う。

use indexmap::IndexMap;
use serde::Serialize;

use super::driver::Checker;
use super::relations::{Conformance, Implementation, SynthesizedKind};
use super::types::{GenericArgument, GenericArgumentMap, TypeId};
use crate::ast::{AccessEffect, DeclId, DeclKind, ExprId, ScopeId};
use crate::diagnostic::{Diagnostic, DiagnosticCode, DiagnosticNote};
use crate::span::Span;

/// 合成された宣言の記述子。下流のローワリングが消費する。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SynthesizedDecl {
    pub kind: SynthesizedKind,
    pub for_type: TypeId,
    pub scope: ScopeId,
}

/// 合成が許される組み込みビュー。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BuiltinView {
    Destructible,
    Movable,
    Copyable,
}

impl<'p> Checker<'p> {
    /// `Model: View` 形式の宣言された準拠を検査・登録する。
    /// `source` は準拠を宣言したレコード宣言または準拠宣言。
    pub(crate) fn register_declared_conformance(
        &mut self,
        source: DeclId,
        model: TypeId,
        view_expr: ExprId,
    ) {
        let site = self.program.expr(view_expr).span;
        let Some(view) = self.view_referred_by(view_expr) else {
            self.diagnostics.insert(
                Diagnostic::new(DiagnosticCode::NotAView, site).with_arg(
                    "name",
                    match &self.program.expr(view_expr).kind {
                        crate::ast::ExprKind::Name(name) => name.name.stem.to_string(),
                        _ => "<expr>".to_string(),
                    },
                ),
            );
            return;
        };
        if self.types.flags(model).has_error() {
            return;
        }
        if !self.is_conformance_subject(model) {
            let rendered = format!("{}", self.types.display(self.program, model));
            self.diagnostics.insert(
                Diagnostic::new(DiagnosticCode::InvalidConformanceTarget, site)
                    .with_arg("subject", rendered),
            );
            return;
        }
        self.establish_conformance(source, model, view, site);
    }

    fn is_conformance_subject(&self, model: TypeId) -> bool {
        use super::types::TypeNode;
        matches!(
            self.types.node(model),
            TypeNode::Record { .. } | TypeNode::BoundGeneric { .. } | TypeNode::Alias { .. }
        )
    }

    /// 準拠を成立させる。精緻化先の組み込みビューへの準拠は再帰的に
    /// 確立し、要件ごとの実装を記録して登録する。
    fn establish_conformance(
        &mut self,
        source: DeclId,
        model: TypeId,
        view: DeclId,
        site: Span,
    ) -> bool {
        let program = self.program;
        let exposition = self.exposition_scope_of(source);
        {
            let context = super::relations::VisibilityContext {
                program,
                imports: &self.imports,
            };
            if self
                .relations
                .conformance(&mut self.types, &context, model, view, program.decl(source).scope)
                .is_some()
            {
                // 既に同じ公開範囲で登録済み。二重宣言として報告する。
                let existing_site = self
                    .relations
                    .conformance(
                        &mut self.types,
                        &context,
                        model,
                        view,
                        program.decl(source).scope,
                    )
                    .map(|conformance| conformance.site);
                let model_name = format!("{}", self.types.display(program, model));
                let mut diagnostic =
                    Diagnostic::new(DiagnosticCode::RedundantConformance, site)
                        .with_arg("model", model_name)
                        .with_arg("view", self.decl_display_name(view));
                if let Some(existing_site) = existing_site {
                    diagnostic = diagnostic.with_note(DiagnosticNote::new(
                        "既存の準拠はここで登録された",
                        Some(existing_site),
                    ));
                }
                self.diagnostics.insert(diagnostic);
                return false;
            }
        }

        // 組み込みビューの精緻化先は合成込みで先に確立する。それ以外の
        // 精緻化先は閉包を通して準拠集合に含まれる。
        let refined = self.direct_refinements_of(view);
        for base in refined {
            if self.model_conforms_to(model, base, program.decl(source).scope) {
                continue;
            }
            if self.builtin_view_kind(base).is_some()
                && !self.establish_conformance(source, model, base, site)
            {
                return false;
            }
        }

        // Self → Model の特殊化の下で全要件の充足を試みる。
        let DeclKind::View(view_decl) = &program.decl(view).kind else {
            return false;
        };
        let receiver_param = view_decl.receiver_param;
        let members = view_decl.members.clone();
        let mut specializations = GenericArgumentMap::new();
        specializations.insert(receiver_param, GenericArgument::Type { ty: model });

        let mut implementations: IndexMap<DeclId, Implementation> = IndexMap::new();
        let mut failures: Vec<DiagnosticNote> = Vec::new();
        for member in members {
            match &program.decl(member).kind {
                DeclKind::Function(function) => {
                    let has_default = function.body.is_some();
                    match self.satisfy_callable_requirement(
                        member,
                        model,
                        &specializations,
                        None,
                        source,
                    ) {
                        Some(implementation) => {
                            implementations.insert(member, implementation);
                        }
                        None if has_default => {
                            implementations.insert(
                                member,
                                Implementation::Concrete { decl: member },
                            );
                        }
                        None => {
                            failures.push(DiagnosticNote::new(
                                format!(
                                    "要件 `{}` を満たす候補がない",
                                    self.decl_display_name(member)
                                ),
                                Some(program.decl(member).span),
                            ));
                        }
                    }
                }
                DeclKind::Initializer(_) => {
                    match self.satisfy_callable_requirement(
                        member,
                        model,
                        &specializations,
                        None,
                        source,
                    ) {
                        Some(implementation) => {
                            implementations.insert(member, implementation);
                        }
                        None => failures.push(DiagnosticNote::new(
                            format!(
                                "要件 `{}` を満たす候補がない",
                                self.decl_display_name(member)
                            ),
                            Some(program.decl(member).span),
                        )),
                    }
                }
                DeclKind::Method(method) => {
                    // 変種ごとに 1 候補ずつ、効果で突き合わせる。
                    let variants = method.variants.clone();
                    for variant in variants {
                        let DeclKind::MethodVariant(variant_decl) =
                            &program.decl(variant).kind
                        else {
                            continue;
                        };
                        let effect = variant_decl.effect;
                        match self.satisfy_callable_requirement(
                            member,
                            model,
                            &specializations,
                            Some(effect),
                            source,
                        ) {
                            Some(implementation) => {
                                implementations.insert(variant, implementation);
                            }
                            None => failures.push(DiagnosticNote::new(
                                format!(
                                    "要件 `{}` の {} 変種を満たす候補がない",
                                    self.decl_display_name(member),
                                    effect
                                ),
                                Some(program.decl(variant).span),
                            )),
                        }
                    }
                }
                // 関連型・関連値要件の解決は保留し、下流のローワリングに委ねる。
                DeclKind::AssocType(_) | DeclKind::AssocValue(_) => {
                    implementations.insert(member, Implementation::Deferred);
                }
                _ => {}
            }
        }

        if !failures.is_empty() {
            let model_name = format!("{}", self.types.display(program, model));
            self.diagnostics.insert(
                Diagnostic::new(DiagnosticCode::DoesNotConform, site)
                    .with_arg("model", model_name)
                    .with_arg("view", self.decl_display_name(view))
                    .with_notes(failures),
            );
            return false;
        }

        let conformance = Conformance {
            model,
            view,
            arguments: specializations,
            conditions: Vec::new(),
            source,
            exposition,
            implementations,
            site,
        };
        match self.relations.insert_conformance(&mut self.types, conformance) {
            Ok(()) => true,
            Err(super::relations::RegistrationError::Redundant { existing }) => {
                let model_name = format!("{}", self.types.display(program, model));
                self.diagnostics.insert(
                    Diagnostic::new(DiagnosticCode::RedundantConformance, site)
                        .with_arg("model", model_name)
                        .with_arg("view", self.decl_display_name(view))
                        .with_note(DiagnosticNote::new(
                            "既存の準拠はここで登録された",
                            Some(existing.site),
                        )),
                );
                false
            }
        }
    }

    /// 呼び出し可能要件 1 件の充足を試みる。候補の実体化型が特殊化済み
    /// 要件型と正準等価なら具象実装、なければ組み込みビュー限定で合成。
    fn satisfy_callable_requirement(
        &mut self,
        requirement: DeclId,
        model: TypeId,
        specializations: &GenericArgumentMap,
        variant_effect: Option<AccessEffect>,
        source: DeclId,
    ) -> Option<Implementation> {
        let program = self.program;
        let requirement_ty = match variant_effect {
            None => self.realize_decl(requirement),
            Some(effect) => {
                let bundle_ty = self.realize_decl(requirement);
                match self.types.node(bundle_ty) {
                    super::types::TypeNode::Bundle { variants, .. } => variants
                        .iter()
                        .find(|(variant, _)| *variant == effect)
                        .map(|(_, ty)| *ty)
                        .unwrap_or(TypeId::ERROR),
                    _ => TypeId::ERROR,
                }
            }
        };
        let expected = self.types.specialize(requirement_ty, specializations);

        let stem = program
            .decl_name(requirement)
            .map(|name| name.stem)
            .unwrap_or_default();
        let scope = program.decl(source).scope;
        let candidates = self.lookup_member(model, &stem, scope);
        // 要件自身（ビューのメンバ）は候補から除く。
        let mut matched: Vec<DeclId> = Vec::new();
        for candidate in candidates {
            if candidate == requirement {
                continue;
            }
            let candidate_ty = match variant_effect {
                None => self.realize_decl(candidate),
                Some(effect) => {
                    let bundle_ty = self.realize_decl(candidate);
                    match self.types.node(bundle_ty) {
                        super::types::TypeNode::Bundle { variants, .. } => variants
                            .iter()
                            .find(|(variant, _)| *variant == effect)
                            .map(|(_, ty)| *ty)
                            .unwrap_or(TypeId::ERROR),
                        _ => continue,
                    }
                }
            };
            if self
                .relations
                .are_equivalent(&mut self.types, candidate_ty, expected)
            {
                matched.push(candidate);
            }
        }
        match matched.len() {
            0 => self.synthesize_implementation(requirement, model, variant_effect, source),
            1 => Some(Implementation::Concrete { decl: matched[0] }),
            _ => {
                // 複数候補は決定的に選ぶ。モデル型スコープ直下の宣言を
                // 優先し、なお同点なら宣言順で最初のもの。
                let direct = matched.iter().copied().find(|candidate| {
                    self.nominal_base_decl(model)
                        .and_then(|base| program.scope_introduced_by(base))
                        .map(|scope| program.decl(*candidate).scope == scope)
                        .unwrap_or(false)
                });
                Some(Implementation::Concrete {
                    decl: direct.unwrap_or(matched[0]),
                })
            }
        }
    }

    /// 合成は組み込みビュー（Destructible / Movable / Copyable）の要件に
    /// 限って許される。合成された宣言は包含モジュールの合成リストに
    /// 追記される。
    fn synthesize_implementation(
        &mut self,
        requirement: DeclId,
        model: TypeId,
        variant_effect: Option<AccessEffect>,
        source: DeclId,
    ) -> Option<Implementation> {
        let program = self.program;
        let enclosing_view = self.parent_decl(requirement)?;
        // メソッド変種の場合は 2 段上がビュー。
        let enclosing_view = match &program.decl(enclosing_view).kind {
            DeclKind::View(_) => enclosing_view,
            _ => self.parent_decl(enclosing_view)?,
        };
        let builtin = self.builtin_view_kind(enclosing_view)?;
        let kind = match (builtin, variant_effect) {
            (BuiltinView::Destructible, _) => SynthesizedKind::Deinit,
            (BuiltinView::Movable, Some(AccessEffect::Set)) => SynthesizedKind::MoveInit,
            (BuiltinView::Movable, Some(AccessEffect::Inout)) => SynthesizedKind::MoveAssign,
            (BuiltinView::Movable, _) => return None,
            (BuiltinView::Copyable, _) => SynthesizedKind::CopyInit,
        };
        let exposition = self.exposition_scope_of(source);
        let module = program.module_containing(program.decl(source).scope)?;
        self.synthesized_decls
            .entry(module)
            .or_default()
            .push(SynthesizedDecl {
                kind,
                for_type: model,
                scope: exposition,
            });
        self.metrics.record_synthesized_decl();
        Some(Implementation::Synthesized { synthesized: kind })
    }

    fn builtin_view_kind(&self, view: DeclId) -> Option<BuiltinView> {
        let program = self.program;
        let core = program.core_library?;
        let module = program.module_containing(program.decl(view).scope)?;
        if module != core {
            return None;
        }
        match &program.decl(view).kind {
            DeclKind::View(decl) => match decl.name.as_str() {
                "Destructible" => Some(BuiltinView::Destructible),
                "Movable" => Some(BuiltinView::Movable),
                "Copyable" => Some(BuiltinView::Copyable),
                _ => None,
            },
            _ => None,
        }
    }

    /// ビューが直接精緻化するビューの一覧。
    pub(crate) fn direct_refinements_of(&mut self, view: DeclId) -> Vec<DeclId> {
        let DeclKind::View(view_decl) = &self.program.decl(view).kind else {
            return Vec::new();
        };
        let refinements = view_decl.refinements.clone();
        let mut out = Vec::new();
        for refinement in refinements {
            if let Some(base) = self.view_referred_by(refinement) {
                out.push(base);
            }
        }
        out
    }

    /// 準拠の公開スコープ。ファイルスコープの準拠はモジュール全体へ
    /// 昇格する。
    fn exposition_scope_of(&self, source: DeclId) -> ScopeId {
        let program = self.program;
        let scope = program.decl(source).scope;
        program
            .module_containing(scope)
            .and_then(|module| program.scope_introduced_by(module))
            .unwrap_or(scope)
    }
}
