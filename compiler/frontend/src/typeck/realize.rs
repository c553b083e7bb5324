//! 宣言・型式の実体化。宣言の全域型を遅延かつ一度だけ計算する。
//!
//! `decl_states` を三色マーカとして使い、実体化中の再入を循環依存として
//! 検出する。循環は診断へ変換し、該当宣言を `Done` とエラー型で確定する。
//! 巻き戻しはしない。

use indexmap::IndexMap;
use smol_str::SmolStr;

use super::driver::{Checker, DeclState, VAR_CONTEXT_PARAMETER, VAR_CONTEXT_RETURN};
use super::env::{EnvConstraint, EnvConstraintKind, GenericEnvironment};
use super::resolve::NamePurpose;
use super::types::{CallableParam, TupleElement, TypeId, TypeNode};
use crate::ast::{
    AccessEffect, BindingIntroducer, DeclId, DeclKind, ExprId, ExprKind, FunctionDecl, MethodDecl,
    SubscriptDecl, WhereConstraintKind,
};
use crate::diagnostic::{Diagnostic, DiagnosticCode};

impl<'p> Checker<'p> {
    /// 宣言の全域型を返す。冪等で、2 回目以降はキャッシュを返す。
    pub fn realize_decl(&mut self, decl: DeclId) -> TypeId {
        match self.decl_states.get(&decl) {
            None => {}
            Some(DeclState::Realizing) => {
                // 実体化中の再入は循環依存。
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
                return TypeId::ERROR;
            }
            Some(_) => {
                return self
                    .decl_types
                    .get(&decl)
                    .copied()
                    .unwrap_or(TypeId::ERROR);
            }
        }
        self.decl_states.insert(decl, DeclState::Realizing);
        self.metrics.record_realized_decl();
        let ty = self.realize_decl_uncached(decl);
        // 再帰中に循環が検出されていれば Done とエラー型が確定している。
        if matches!(self.decl_states.get(&decl), Some(DeclState::Realizing)) {
            self.decl_states.insert(decl, DeclState::Realized);
            self.decl_types.insert(decl, ty);
        }
        self.decl_types
            .get(&decl)
            .copied()
            .unwrap_or(TypeId::ERROR)
    }

    fn realize_decl_uncached(&mut self, decl: DeclId) -> TypeId {
        let program = self.program;
        match &program.decl(decl).kind {
            DeclKind::Module(_) => self.types.module(decl),
            DeclKind::SourceFile(_) => TypeId::VOID,
            DeclKind::Import(import) => {
                let name = import.module.clone();
                match self.module_named(&name) {
                    Some(module) => self.types.module(module),
                    None => {
                        let site = program.decl(decl).span;
                        self.diagnostics.insert(
                            Diagnostic::new(DiagnosticCode::UndefinedName, site)
                                .with_arg("name", name.to_string()),
                        );
                        TypeId::ERROR
                    }
                }
            }
            DeclKind::Namespace(_) => self.types.namespace(decl),
            DeclKind::Record(_) => {
                let instance = self.self_type_of_record(decl);
                self.types.metatype(instance)
            }
            DeclKind::View(_) => {
                let instance = self.types.view(decl);
                self.types.metatype(instance)
            }
            DeclKind::TypeAlias(alias) => {
                let aliasee_expr = alias.aliasee;
                let aliasee = self
                    .realize_type_expr(aliasee_expr)
                    .unwrap_or(TypeId::ERROR);
                if self.types.flags(aliasee).has_error() {
                    return TypeId::ERROR;
                }
                let alias_ty = self.types.alias(decl, aliasee);
                self.types.metatype(alias_ty)
            }
            DeclKind::Binding(_) => {
                // 束縛の型はパターン推論の結果。検査へ委譲する。
                self.check_decl(decl);
                self.decl_types
                    .get(&decl)
                    .copied()
                    .unwrap_or(TypeId::ERROR)
            }
            DeclKind::Function(function) => {
                let function = function.clone();
                self.realize_function(decl, &function)
            }
            DeclKind::Initializer(_) => self.realize_initializer(decl),
            DeclKind::Method(method) => {
                let method = method.clone();
                self.realize_method_bundle(decl, &method)
            }
            DeclKind::MethodVariant(variant) => {
                let effect = variant.effect;
                let Some(bundle) = self.parent_decl(decl) else {
                    return TypeId::ERROR;
                };
                let bundle_ty = self.realize_decl(bundle);
                match self.types.node(bundle_ty) {
                    TypeNode::Bundle { variants, .. } => variants
                        .iter()
                        .find(|(variant_effect, _)| *variant_effect == effect)
                        .map(|(_, ty)| *ty)
                        .unwrap_or(TypeId::ERROR),
                    _ => TypeId::ERROR,
                }
            }
            DeclKind::Subscript(subscript) => {
                let subscript = subscript.clone();
                self.realize_subscript(decl, &subscript)
            }
            DeclKind::SubscriptVariant(variant) => {
                let effect = variant.effect;
                let Some(bundle) = self.parent_decl(decl) else {
                    return TypeId::ERROR;
                };
                let bundle_ty = self.realize_decl(bundle);
                match self.types.node(bundle_ty).clone() {
                    TypeNode::Subscript {
                        is_property,
                        environment,
                        inputs,
                        output,
                        ..
                    } => self.types.subscript(
                        is_property,
                        vec![effect],
                        environment,
                        inputs,
                        output,
                    ),
                    _ => TypeId::ERROR,
                }
            }
            DeclKind::Parameter(_) => self.realize_parameter(decl),
            DeclKind::GenericParam(_) => self.realize_generic_param(decl),
            DeclKind::AssocType(_) => {
                let Some(receiver) = self.enclosing_view_receiver_of(decl) else {
                    return TypeId::ERROR;
                };
                let domain = self.types.generic_param(receiver);
                let marker = self.types.assoc_type(decl, domain);
                self.types.metatype(marker)
            }
            DeclKind::AssocValue(assoc) => {
                let annotation = assoc.annotation;
                let Some(receiver) = self.enclosing_view_receiver_of(decl) else {
                    return TypeId::ERROR;
                };
                let _ = self.realize_type_expr(annotation);
                let domain = self.types.generic_param(receiver);
                self.types.assoc_value(decl, domain)
            }
            DeclKind::Extension(extension) => {
                let subject = extension.subject;
                self.realize_type_extending(decl, subject)
            }
            DeclKind::Conformance(conformance) => {
                let subject = conformance.subject;
                self.realize_type_extending(decl, subject)
            }
            DeclKind::Operator(_) => TypeId::VOID,
        }
    }

    pub(crate) fn module_named(&self, name: &str) -> Option<DeclId> {
        self.program.modules.iter().copied().find(|module| {
            match &self.program.decl(*module).kind {
                DeclKind::Module(decl) => decl.name == name,
                _ => false,
            }
        })
    }

    pub(crate) fn parent_decl(&self, decl: DeclId) -> Option<DeclId> {
        self.program.scopes.introducer(self.program.decl(decl).scope)
    }

    fn enclosing_view_receiver_of(&self, decl: DeclId) -> Option<DeclId> {
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

    // ---- 呼び出し可能宣言 ----

    fn realize_function(&mut self, decl: DeclId, function: &FunctionDecl) -> TypeId {
        let program = self.program;
        let inputs = self.realize_parameter_list(&function.params, function.is_in_expr_context);

        // 明示キャプチャ。let/inout はリモート借用、sink-let/var は所有。
        let mut environment_elements: Vec<TupleElement> = Vec::new();
        let mut capture_names: IndexMap<SmolStr, DeclId> = IndexMap::new();
        for capture in &function.explicit_captures {
            let DeclKind::Binding(binding) = &program.decl(*capture).kind else {
                continue;
            };
            let introducer = binding.introducer;
            let names = program.pattern_names(binding.pattern);
            for (name, _) in &names {
                if capture_names.contains_key(name) {
                    self.diagnostics.insert(
                        Diagnostic::new(
                            DiagnosticCode::DuplicateCapture,
                            program.decl(*capture).span,
                        )
                        .with_arg("name", name.to_string()),
                    );
                }
                capture_names.insert(name.clone(), *capture);
            }
            let captured = self.realize_decl(*capture);
            let element_ty = match introducer {
                BindingIntroducer::Let => self.types.remote(AccessEffect::Let, captured),
                BindingIntroducer::Inout => {
                    self.types.remote(AccessEffect::Inout, captured)
                }
                BindingIntroducer::SinkLet | BindingIntroducer::Var => captured,
            };
            environment_elements.push(TupleElement {
                label: names.first().map(|(name, _)| name.clone()),
                ty: element_ty,
            });
        }

        // 暗黙キャプチャ。
        if function.body.is_some() && !program.is_captureless_function(decl) {
            let captures = self.collect_implicit_captures(decl);
            for capture in &captures {
                if capture_names.contains_key(&capture.name) {
                    self.diagnostics.insert(
                        Diagnostic::new(
                            DiagnosticCode::DuplicateCapture,
                            program.decl(decl).span,
                        )
                        .with_arg("name", capture.name.to_string()),
                    );
                    continue;
                }
                let captured = self.realize_decl(capture.referenced);
                let element_ty = self.types.remote(capture.effect, captured);
                environment_elements.push(TupleElement {
                    label: Some(capture.name.clone()),
                    ty: element_ty,
                });
            }
            self.implicit_captures.insert(decl, captures);
        }
        let environment = self.types.tuple(environment_elements);

        let output = match function.output {
            Some(annotation) => self
                .realize_type_expr(annotation)
                .unwrap_or(TypeId::ERROR),
            None if function.is_in_expr_context => {
                self.types.fresh_var(VAR_CONTEXT_RETURN)
            }
            None => TypeId::VOID,
        };

        let receiver_effect = function.receiver_effect.unwrap_or(AccessEffect::Let);
        self.types
            .lambda(receiver_effect, environment, inputs, output)
    }

    fn realize_initializer(&mut self, decl: DeclId) -> TypeId {
        let program = self.program;
        let DeclKind::Initializer(initializer) = &program.decl(decl).kind else {
            return TypeId::ERROR;
        };
        let is_memberwise = initializer.is_memberwise;
        let params = initializer.params.clone();
        let inputs = if is_memberwise {
            // メンバワイズイニシャライザは格納束縛ごとに 1 つの sink
            // パラメータを持つ。
            let Some(record) = self.parent_decl(decl) else {
                return TypeId::ERROR;
            };
            let DeclKind::Record(record_decl) = &program.decl(record).kind else {
                return TypeId::ERROR;
            };
            let mut inputs = Vec::new();
            for member in record_decl.members.clone() {
                let DeclKind::Binding(binding) = &program.decl(member).kind else {
                    continue;
                };
                let names = program.pattern_names(binding.pattern);
                let ty = self.realize_decl(member);
                let parameter = self.types.parameter(AccessEffect::Sink, ty);
                inputs.push(CallableParam {
                    label: names.first().map(|(name, _)| name.clone()),
                    ty: parameter,
                });
            }
            inputs
        } else {
            self.realize_parameter_list(&params, false)
        };
        self.types
            .lambda(AccessEffect::Set, TypeId::VOID, inputs, TypeId::VOID)
    }

    fn realize_method_bundle(&mut self, decl: DeclId, method: &MethodDecl) -> TypeId {
        let program = self.program;
        let Some(receiver) = self.receiver_type_in(program.decl(decl).scope) else {
            return TypeId::ERROR;
        };
        let inputs = self.realize_parameter_list(&method.params, false);
        let declared_output = match method.output {
            Some(annotation) => self
                .realize_type_expr(annotation)
                .unwrap_or(TypeId::ERROR),
            None => TypeId::VOID,
        };

        debug_assert!(!method.variants.is_empty(), "バンドルの変種は空でない");
        let mut variants = Vec::new();
        for variant_decl in &method.variants {
            let DeclKind::MethodVariant(variant) = &program.decl(*variant_decl).kind else {
                continue;
            };
            let effect = variant.effect;
            let output = self.variant_output(
                effect,
                declared_output,
                receiver,
                program.decl(*variant_decl).span,
            );
            let variant_ty =
                self.types
                    .lambda(effect, TypeId::VOID, inputs.clone(), output);
            variants.push((effect, variant_ty));
        }
        if variants.is_empty() {
            return TypeId::ERROR;
        }
        self.types.bundle(receiver, variants)
    }

    /// 変種の出力型。inout/set 変種では、宣言された出力が Void でなければ
    /// レシーバ型を先頭要素とする 2 要素タプルであることを要求する。
    fn variant_output(
        &mut self,
        effect: AccessEffect,
        declared: TypeId,
        receiver: TypeId,
        site: crate::span::Span,
    ) -> TypeId {
        match effect {
            AccessEffect::Let | AccessEffect::Sink | AccessEffect::Yielded => declared,
            AccessEffect::Inout | AccessEffect::Set => {
                if declared == TypeId::VOID || self.types.flags(declared).has_error() {
                    return declared;
                }
                let TypeNode::Tuple { elements } = self.types.node(declared) else {
                    self.diagnostics
                        .insert(Diagnostic::new(DiagnosticCode::MutatingBundleMustReturn, site));
                    return TypeId::ERROR;
                };
                let elements = elements.clone();
                if elements.len() != 2
                    || !self
                        .relations
                        .are_equivalent(&mut self.types, elements[0].ty, receiver)
                {
                    self.diagnostics
                        .insert(Diagnostic::new(DiagnosticCode::MutatingBundleMustReturn, site));
                    return TypeId::ERROR;
                }
                elements[1].ty
            }
        }
    }

    fn realize_subscript(&mut self, decl: DeclId, subscript: &SubscriptDecl) -> TypeId {
        let program = self.program;
        let inputs = self.realize_parameter_list(&subscript.params, false);
        let output = self
            .realize_type_expr(subscript.output)
            .unwrap_or(TypeId::ERROR);
        let mut capabilities = Vec::new();
        for variant_decl in &subscript.variants {
            if let DeclKind::SubscriptVariant(variant) = &program.decl(*variant_decl).kind {
                capabilities.push(variant.effect);
            }
        }
        if capabilities.is_empty() {
            capabilities.push(AccessEffect::Let);
        }
        let _ = decl;
        self.types.subscript(
            subscript.is_property,
            capabilities,
            TypeId::VOID,
            inputs,
            output,
        )
    }

    fn realize_parameter_list(
        &mut self,
        params: &[DeclId],
        _in_expr_context: bool,
    ) -> Vec<CallableParam> {
        let program = self.program;
        let mut seen: IndexMap<SmolStr, DeclId> = IndexMap::new();
        let mut inputs = Vec::new();
        for param in params {
            let DeclKind::Parameter(parameter) = &program.decl(*param).kind else {
                continue;
            };
            if seen.contains_key(&parameter.name) {
                self.diagnostics.insert(
                    Diagnostic::new(
                        DiagnosticCode::DuplicateParameterName,
                        program.decl(*param).span,
                    )
                    .with_arg("name", parameter.name.to_string()),
                );
            }
            seen.insert(parameter.name.clone(), *param);
            let label = parameter.label.clone();
            let ty = self.realize_decl(*param);
            inputs.push(CallableParam { label, ty });
        }
        inputs
    }

    fn realize_parameter(&mut self, decl: DeclId) -> TypeId {
        let program = self.program;
        let DeclKind::Parameter(parameter) = &program.decl(decl).kind else {
            return TypeId::ERROR;
        };
        let convention = parameter.convention;
        match parameter.annotation {
            Some(annotation) => {
                let bare = self.realize_type_expr(annotation).unwrap_or(TypeId::ERROR);
                self.types.parameter(convention, bare)
            }
            None => {
                // 式文脈のラムダでは注釈省略を許し、変数を割り当てる。
                let in_expr_context = self
                    .parent_decl(decl)
                    .map(|parent| match &program.decl(parent).kind {
                        DeclKind::Function(function) => function.is_in_expr_context,
                        _ => false,
                    })
                    .unwrap_or(false);
                if in_expr_context {
                    let bare = self.types.fresh_var(VAR_CONTEXT_PARAMETER);
                    self.types.parameter(convention, bare)
                } else {
                    self.diagnostics.insert(
                        Diagnostic::new(
                            DiagnosticCode::NotEnoughContext,
                            program.decl(decl).span,
                        )
                        .with_arg("name", parameter.name.to_string()),
                    );
                    TypeId::ERROR
                }
            }
        }
    }

    fn realize_generic_param(&mut self, decl: DeclId) -> TypeId {
        let program = self.program;
        let DeclKind::GenericParam(param) = &program.decl(decl).kind else {
            return TypeId::ERROR;
        };
        let annotations = param.annotations.clone();
        let name = param.name.clone();
        if annotations.is_empty() {
            let instance = self.types.generic_param(decl);
            return self.types.metatype(instance);
        }
        // 最初の注釈がビューを指すなら型パラメータ、そうでなければ
        // 値パラメータ。
        if self.view_referred_by(annotations[0]).is_some() {
            let instance = self.types.generic_param(decl);
            return self.types.metatype(instance);
        }
        if annotations.len() > 1 {
            self.diagnostics.insert(
                Diagnostic::new(DiagnosticCode::TooManyAnnotations, program.decl(decl).span)
                    .with_arg("name", name.to_string()),
            );
            return TypeId::ERROR;
        }
        self.realize_type_expr(annotations[0]).unwrap_or(TypeId::ERROR)
    }

    fn realize_type_extending(&mut self, decl: DeclId, subject: ExprId) -> TypeId {
        let Some(subject_ty) = self.realize_type_expr(subject) else {
            return TypeId::ERROR;
        };
        let instance = self.instance_of(subject_ty);
        if matches!(
            self.types.node(instance),
            TypeNode::Builtin { .. } | TypeNode::Never | TypeNode::Any | TypeNode::Void
        ) {
            self.diagnostics.insert(Diagnostic::new(
                DiagnosticCode::ExtensionOfBuiltin,
                self.program.decl(decl).span,
            ));
            return TypeId::ERROR;
        }
        self.types.metatype(instance)
    }

    // ---- 型式 ----

    /// 型式が表す型（インスタンス側）を実体化する。失敗時は診断発行済みで
    /// `None` を返し、呼び出し側はエラー型を代入する。
    pub fn realize_type_expr(&mut self, expr: ExprId) -> Option<TypeId> {
        let program = self.program;
        let node = program.expr(expr);
        let site = node.span;
        match &node.kind {
            ExprKind::Name(_) => self.realize_name_type_expr(expr),
            ExprKind::SumType { variants } => {
                let variant_exprs = variants.clone();
                let mut realized = Vec::new();
                let mut sound = true;
                for variant in variant_exprs {
                    match self.realize_type_expr(variant) {
                        Some(ty) => realized.push(ty),
                        None => sound = false,
                    }
                }
                if realized.len() < 2 {
                    self.diagnostics
                        .insert(Diagnostic::new(DiagnosticCode::SumTypeTooFewElements, site));
                    return Some(TypeId::ERROR);
                }
                if !sound {
                    return Some(TypeId::ERROR);
                }
                Some(self.types.sum(realized))
            }
            ExprKind::ExistentialType {
                interfaces,
                where_clause,
            } => {
                let interface_exprs = interfaces.clone();
                let where_clause = where_clause.clone();
                self.realize_existential(expr, &interface_exprs, &where_clause)
            }
            ExprKind::LambdaType {
                receiver_effect,
                environment,
                parameters,
                output,
            } => {
                let receiver_effect = *receiver_effect;
                let environment_expr = *environment;
                let parameters = parameters.clone();
                let output_expr = *output;
                let environment = match environment_expr {
                    Some(env) => self.realize_type_expr(env)?,
                    None => TypeId::VOID,
                };
                let mut inputs = Vec::new();
                for parameter in parameters {
                    let bare = self.realize_type_expr(parameter.bare)?;
                    let ty = self.types.parameter(parameter.convention, bare);
                    inputs.push(CallableParam {
                        label: parameter.label,
                        ty,
                    });
                }
                let output = self.realize_type_expr(output_expr)?;
                Some(
                    self.types
                        .lambda(receiver_effect, environment, inputs, output),
                )
            }
            ExprKind::RemoteType { effect, operand } => {
                let effect = *effect;
                let operand = *operand;
                let target = self.realize_type_expr(operand)?;
                Some(self.types.remote(effect, target))
            }
            ExprKind::ParameterType { convention, bare } => {
                let convention = *convention;
                let bare_expr = *bare;
                let bare = self.realize_type_expr(bare_expr)?;
                Some(self.types.parameter(convention, bare))
            }
            ExprKind::Tuple { elements } => {
                let elements = elements.clone();
                let mut realized = Vec::new();
                for element in elements {
                    let ty = self.realize_type_expr(element.value)?;
                    realized.push(TupleElement {
                        label: element.label,
                        ty,
                    });
                }
                Some(self.types.tuple(realized))
            }
            _ => {
                self.diagnostics.insert(
                    Diagnostic::new(DiagnosticCode::ValueInTypePosition, site)
                        .with_arg("name", "<expr>"),
                );
                None
            }
        }
    }

    fn realize_name_type_expr(&mut self, expr: ExprId) -> Option<TypeId> {
        let site = self.program.expr(expr).span;
        match self.resolve_name(expr, NamePurpose::Unapplied) {
            super::resolve::NameResolution::Done {
                resolved,
                unresolved,
            } => {
                if !unresolved.is_empty() {
                    self.diagnostics.insert(
                        Diagnostic::new(DiagnosticCode::NotEnoughContext, site),
                    );
                    return None;
                }
                let last = resolved.last()?;
                let candidates = &last.candidates;
                if candidates.viable_count() == 0 {
                    let name = match &self.program.expr(last.expr).kind {
                        ExprKind::Name(name) => name.name.stem.to_string(),
                        _ => "<expr>".to_string(),
                    };
                    self.diagnostics.insert(
                        Diagnostic::new(DiagnosticCode::NoViableCandidate, site)
                            .with_arg("name", name),
                    );
                    return None;
                }
                if candidates.viable_count() > 1 {
                    let name = match &self.program.expr(last.expr).kind {
                        ExprKind::Name(name) => name.name.stem.to_string(),
                        _ => "<expr>".to_string(),
                    };
                    self.diagnostics.insert(
                        Diagnostic::new(DiagnosticCode::AmbiguousUse, site)
                            .with_arg("name", name),
                    );
                    return None;
                }
                // 各コンポーネントの参照先と型を記録する。
                for component in &resolved {
                    if let Some(unique) = component.candidates.unique_viable() {
                        self.referred_decls
                            .insert(component.expr, unique.reference.clone());
                        self.expr_types.insert(component.expr, unique.ty);
                    }
                }
                let candidate = last.candidates.unique_viable()?;
                let ty = candidate.ty;
                if self.types.flags(ty).has_error() {
                    // エラー型は追加診断なしで流す。
                    return Some(TypeId::ERROR);
                }
                match self.types.node(ty) {
                    TypeNode::Metatype { instance } => Some(*instance),
                    TypeNode::Module { .. } | TypeNode::Namespace { .. } => Some(ty),
                    _ => {
                        let name = match &self.program.expr(expr).kind {
                            ExprKind::Name(name) => name.name.stem.to_string(),
                            _ => "<expr>".to_string(),
                        };
                        self.diagnostics.insert(
                            Diagnostic::new(DiagnosticCode::ValueInTypePosition, site)
                                .with_arg("name", name),
                        );
                        None
                    }
                }
            }
            super::resolve::NameResolution::Inexecutable { .. } => {
                self.diagnostics.insert(
                    Diagnostic::new(DiagnosticCode::ValueInTypePosition, site)
                        .with_arg("name", "<expr>"),
                );
                None
            }
            super::resolve::NameResolution::Failed => None,
        }
    }

    fn realize_existential(
        &mut self,
        expr: ExprId,
        interfaces: &[ExprId],
        where_clause: &[crate::ast::WhereConstraintExpr],
    ) -> Option<TypeId> {
        use super::types::{ExistentialConstraint, ExistentialInterface};
        let site = self.program.expr(expr).span;
        let mut views = Vec::new();
        let mut generic = None;
        for interface in interfaces {
            let ty = self.realize_type_expr(*interface)?;
            match self.types.node(ty) {
                TypeNode::View { .. } => views.push(ty),
                TypeNode::GenericParam { .. } => generic = Some(ty),
                _ => {
                    let name = match &self.program.expr(*interface).kind {
                        ExprKind::Name(name) => name.name.stem.to_string(),
                        _ => "<expr>".to_string(),
                    };
                    self.diagnostics.insert(
                        Diagnostic::new(DiagnosticCode::NotAView, site).with_arg("name", name),
                    );
                    return None;
                }
            }
        }
        let interface = match (generic, views.is_empty()) {
            (Some(generic), true) => ExistentialInterface::Generic { ty: generic },
            (None, false) => ExistentialInterface::Views { views },
            _ => {
                self.diagnostics
                    .insert(Diagnostic::new(DiagnosticCode::NotAView, site));
                return None;
            }
        };
        let mut constraints = Vec::new();
        for constraint in where_clause {
            match &constraint.kind {
                WhereConstraintKind::Conformance { subject, views } => {
                    let subject = self.realize_type_expr(*subject)?;
                    let mut view_tys = Vec::new();
                    for view in views {
                        view_tys.push(self.realize_type_expr(*view)?);
                    }
                    constraints.push(ExistentialConstraint::Conformance {
                        subject,
                        views: view_tys,
                    });
                }
                WhereConstraintKind::Equality { lhs, rhs } => {
                    let lhs = self.realize_type_expr(*lhs)?;
                    let rhs = self.realize_type_expr(*rhs)?;
                    constraints.push(ExistentialConstraint::Equality { lhs, rhs });
                }
            }
        }
        Some(self.types.existential(interface, constraints))
    }

    // ---- 総称環境 ----

    /// 宣言の総称環境。遅延構築してキャッシュする。総称でない宣言は
    /// `None`。
    pub fn environment_of(&mut self, decl: DeclId) -> Option<GenericEnvironment> {
        if let Some(environment) = self.environments.get(&decl) {
            return Some(environment.clone());
        }
        let program = self.program;
        let (params, where_clause): (Vec<DeclId>, Vec<crate::ast::WhereConstraintExpr>) =
            match &program.decl(decl).kind {
                DeclKind::Record(record) => {
                    (record.generic_params.clone(), record.where_clause.clone())
                }
                DeclKind::TypeAlias(alias) => {
                    (alias.generic_params.clone(), alias.where_clause.clone())
                }
                DeclKind::Function(function) => {
                    (function.generic_params.clone(), function.where_clause.clone())
                }
                DeclKind::Method(method) => {
                    (method.generic_params.clone(), method.where_clause.clone())
                }
                DeclKind::Subscript(subscript) => (
                    subscript.generic_params.clone(),
                    subscript.where_clause.clone(),
                ),
                DeclKind::Extension(extension) => (Vec::new(), extension.where_clause.clone()),
                DeclKind::Conformance(conformance) => {
                    (Vec::new(), conformance.where_clause.clone())
                }
                DeclKind::View(view) => {
                    let environment = self.view_environment(decl, view.receiver_param);
                    self.environments.insert(decl, environment.clone());
                    return Some(environment);
                }
                _ => return None,
            };
        if params.is_empty() && where_clause.is_empty() {
            return None;
        }
        let mut environment = GenericEnvironment {
            params: params.clone(),
            constraints: Vec::new(),
        };
        // パラメータ注釈に書かれた糖衣準拠制約。
        for param in &params {
            let DeclKind::GenericParam(generic) = &program.decl(*param).kind else {
                continue;
            };
            let annotations = generic.annotations.clone();
            if annotations.is_empty() {
                continue;
            }
            if self.view_referred_by(annotations[0]).is_none() {
                // 値パラメータ。制約は生まない。
                continue;
            }
            let mut views = Vec::new();
            for annotation in &annotations {
                match self.view_referred_by(*annotation) {
                    Some(view) => views.push(view),
                    None => {
                        self.diagnostics.insert(
                            Diagnostic::new(
                                DiagnosticCode::NotAView,
                                program.expr(*annotation).span,
                            )
                            .with_arg("name", "<annotation>"),
                        );
                    }
                }
            }
            if !views.is_empty() {
                let subject = self.types.generic_param(*param);
                environment.constraints.push(EnvConstraint {
                    site: program.decl(*param).span,
                    kind: EnvConstraintKind::Conformance { subject, views },
                });
            }
        }
        // where 節の制約。
        for constraint in &where_clause {
            match &constraint.kind {
                WhereConstraintKind::Conformance { subject, views } => {
                    let Some(subject_ty) = self.realize_type_expr(*subject) else {
                        continue;
                    };
                    let mut view_decls = Vec::new();
                    for view in views {
                        match self.view_referred_by(*view) {
                            Some(decl) => view_decls.push(decl),
                            None => {
                                self.diagnostics.insert(
                                    Diagnostic::new(
                                        DiagnosticCode::NotAView,
                                        program.expr(*view).span,
                                    )
                                    .with_arg("name", "<annotation>"),
                                );
                            }
                        }
                    }
                    if !view_decls.is_empty() {
                        environment.constraints.push(EnvConstraint {
                            site: constraint.span,
                            kind: EnvConstraintKind::Conformance {
                                subject: subject_ty,
                                views: view_decls,
                            },
                        });
                    }
                }
                WhereConstraintKind::Equality { lhs, rhs } => {
                    let lhs_ty = self.realize_type_expr(*lhs);
                    let rhs_ty = self.realize_type_expr(*rhs);
                    match (lhs_ty, rhs_ty) {
                        (Some(lhs), Some(rhs)) => {
                            environment.constraints.push(EnvConstraint {
                                site: constraint.span,
                                kind: EnvConstraintKind::Equality { lhs, rhs },
                            });
                        }
                        _ => {
                            self.diagnostics.insert(Diagnostic::new(
                                DiagnosticCode::InvalidEqualityConstraint,
                                constraint.span,
                            ));
                        }
                    }
                }
            }
        }
        self.environments.insert(decl, environment.clone());
        Some(environment)
    }

    /// ビューの環境。`Self` パラメータとビュー自身（と精緻化先）への
    /// 準拠制約からなる。
    fn view_environment(&mut self, view: DeclId, receiver_param: DeclId) -> GenericEnvironment {
        let program = self.program;
        let DeclKind::View(view_decl) = &program.decl(view).kind else {
            return GenericEnvironment::default();
        };
        let refinements = view_decl.refinements.clone();
        let mut views = vec![view];
        for refinement in refinements {
            if let Some(base) = self.view_referred_by(refinement) {
                views.push(base);
            }
        }
        let subject = self.types.generic_param(receiver_param);
        GenericEnvironment {
            params: vec![receiver_param],
            constraints: vec![EnvConstraint {
                site: program.decl(view).span,
                kind: EnvConstraintKind::Conformance { subject, views },
            }],
        }
    }
}
