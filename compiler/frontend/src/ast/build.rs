//! テスト・ツーリング向けの `Program` 構築 API。
//!
//! パーサは外部コラボレータなので、検査対象のプログラムはこのビルダで
//! 組み立てる。スコープ木と宣言順は構築順にそのまま従う。

use smol_str::SmolStr;

use super::scope::{ScopeId, ScopeTree};
use super::{
    AccessEffect, Argument, AssocTypeDecl, AssocValueDecl, BindingDecl, BindingIntroducer,
    ConformanceDecl, Decl, DeclId, DeclKind, Expr, ExprId, ExprKind, ExtensionDecl, FunctionBody,
    FunctionDecl, GenericParamDecl, ImportDecl, InitializerDecl, MethodDecl, MethodVariantDecl,
    ModuleDecl, Name, NameDomain, NameExpr, NamespaceDecl, OperatorDecl, OperatorNotation,
    ParameterDecl, Pattern, PatternId, PatternKind, PrecedenceGroup, Program, RecordDecl,
    SequenceLink, SourceFileDecl, Stmt, StmtId, StmtKind, SubscriptDecl, SubscriptVariantDecl,
    TupleElementExpr, TypeAliasDecl, ViewDecl,
};
use crate::span::Span;

/// `Program` を段階的に構築するビルダ。
///
/// 各ノードには単調増加のダミー `Span` を割り当てるので、診断サイトは
/// ノードごとに一意になる。
#[derive(Debug)]
pub struct ProgramBuilder {
    decls: Vec<Decl>,
    exprs: Vec<Expr>,
    stmts: Vec<Stmt>,
    patterns: Vec<Pattern>,
    scopes: ScopeTree,
    modules: Vec<DeclId>,
    core_library: Option<DeclId>,
    cursor: u32,
}

impl Default for ProgramBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgramBuilder {
    pub fn new() -> Self {
        Self {
            decls: Vec::new(),
            exprs: Vec::new(),
            stmts: Vec::new(),
            patterns: Vec::new(),
            scopes: ScopeTree::new(),
            modules: Vec::new(),
            core_library: None,
            cursor: 0,
        }
    }

    pub fn finish(self) -> Program {
        Program {
            decls: self.decls,
            exprs: self.exprs,
            stmts: self.stmts,
            patterns: self.patterns,
            scopes: self.scopes,
            modules: self.modules,
            core_library: self.core_library,
        }
    }

    fn next_span(&mut self) -> Span {
        let start = self.cursor;
        self.cursor += 4;
        Span::new(start, start + 4)
    }

    /// 宣言が導入したスコープを返す。スコープを導入しない宣言には使えない。
    pub fn scope_of(&self, decl: DeclId) -> ScopeId {
        self.scopes
            .scope_introduced_by(decl)
            .unwrap_or_else(|| panic!("decl {decl} はスコープを導入しない"))
    }

    fn push_decl(&mut self, scope: ScopeId, kind: DeclKind) -> DeclId {
        let id = DeclId(self.decls.len() as u32);
        let span = self.next_span();
        self.decls.push(Decl {
            id,
            span,
            scope,
            kind,
        });
        self.scopes.declare(scope, id);
        id
    }

    fn push_decl_with_scope(&mut self, scope: ScopeId, kind: DeclKind) -> DeclId {
        let id = self.push_decl(scope, kind);
        self.scopes.push(scope, Some(id));
        id
    }

    fn members_mut(&mut self, container: DeclId) -> &mut Vec<DeclId> {
        match &mut self.decls[container.index()].kind {
            DeclKind::Module(decl) => &mut decl.sources,
            DeclKind::SourceFile(decl) => &mut decl.members,
            DeclKind::Namespace(decl) => &mut decl.members,
            DeclKind::Record(decl) => &mut decl.members,
            DeclKind::View(decl) => &mut decl.members,
            DeclKind::Extension(decl) => &mut decl.members,
            DeclKind::Conformance(decl) => &mut decl.members,
            other => panic!("メンバを持たない宣言種別: {other:?}"),
        }
    }

    // ---- モジュール構造 ----

    pub fn module(&mut self, name: impl Into<SmolStr>) -> DeclId {
        let id = self.push_decl_with_scope(
            ScopeTree::root(),
            DeclKind::Module(ModuleDecl {
                name: name.into(),
                sources: Vec::new(),
            }),
        );
        self.modules.push(id);
        id
    }

    pub fn source_file(&mut self, module: DeclId, name: impl Into<SmolStr>) -> DeclId {
        let scope = self.scope_of(module);
        let id = self.push_decl_with_scope(
            scope,
            DeclKind::SourceFile(SourceFileDecl {
                name: name.into(),
                members: Vec::new(),
            }),
        );
        self.members_mut(module).push(id);
        id
    }

    pub fn import(&mut self, file: DeclId, module: impl Into<SmolStr>) -> DeclId {
        let scope = self.scope_of(file);
        let id = self.push_decl(
            scope,
            DeclKind::Import(ImportDecl {
                module: module.into(),
            }),
        );
        self.members_mut(file).push(id);
        id
    }

    pub fn namespace(&mut self, container: DeclId, name: impl Into<SmolStr>) -> DeclId {
        let scope = self.scope_of(container);
        let id = self.push_decl_with_scope(
            scope,
            DeclKind::Namespace(NamespaceDecl {
                name: name.into(),
                members: Vec::new(),
            }),
        );
        self.members_mut(container).push(id);
        id
    }

    // ---- 型宣言 ----

    pub fn record(&mut self, container: DeclId, name: impl Into<SmolStr>) -> DeclId {
        let scope = self.scope_of(container);
        let id = self.push_decl_with_scope(
            scope,
            DeclKind::Record(RecordDecl {
                name: name.into(),
                generic_params: Vec::new(),
                conformances: Vec::new(),
                where_clause: Vec::new(),
                members: Vec::new(),
            }),
        );
        self.members_mut(container).push(id);
        id
    }

    /// レコード宣言ヘッダに準拠先ビューの型式を追加する。
    pub fn add_conformance(&mut self, record: DeclId, view: ExprId) {
        match &mut self.decls[record.index()].kind {
            DeclKind::Record(decl) => decl.conformances.push(view),
            other => panic!("準拠リストを持たない宣言: {other:?}"),
        }
    }

    pub fn view(&mut self, container: DeclId, name: impl Into<SmolStr>) -> DeclId {
        let name = name.into();
        let scope = self.scope_of(container);
        let id = self.push_decl_with_scope(
            scope,
            DeclKind::View(ViewDecl {
                name: name.clone(),
                refinements: Vec::new(),
                members: Vec::new(),
                receiver_param: DeclId(u32::MAX),
            }),
        );
        self.members_mut(container).push(id);
        // 暗黙の Self パラメータ。ビュー自身を上界とする。
        let view_scope = self.scope_of(id);
        let bound = self.name(view_scope, name);
        let receiver = self.push_decl(
            view_scope,
            DeclKind::GenericParam(GenericParamDecl {
                name: SmolStr::new("Self"),
                annotations: vec![bound],
            }),
        );
        match &mut self.decls[id.index()].kind {
            DeclKind::View(decl) => decl.receiver_param = receiver,
            _ => unreachable!(),
        }
        id
    }

    pub fn add_refinement(&mut self, view: DeclId, base: ExprId) {
        match &mut self.decls[view.index()].kind {
            DeclKind::View(decl) => decl.refinements.push(base),
            other => panic!("精緻化リストを持たない宣言: {other:?}"),
        }
    }

    pub fn type_alias(
        &mut self,
        container: DeclId,
        name: impl Into<SmolStr>,
        aliasee: ExprId,
    ) -> DeclId {
        let scope = self.scope_of(container);
        let id = self.push_decl_with_scope(
            scope,
            DeclKind::TypeAlias(TypeAliasDecl {
                name: name.into(),
                generic_params: Vec::new(),
                where_clause: Vec::new(),
                aliasee,
            }),
        );
        self.members_mut(container).push(id);
        id
    }

    /// エイリアス先を後から差し替える。相互参照するエイリアスの構築に使う。
    pub fn set_aliasee(&mut self, alias: DeclId, aliasee: ExprId) {
        match &mut self.decls[alias.index()].kind {
            DeclKind::TypeAlias(decl) => decl.aliasee = aliasee,
            other => panic!("エイリアスでない宣言: {other:?}"),
        }
    }

    pub fn extension(&mut self, container: DeclId, subject: ExprId) -> DeclId {
        let scope = self.scope_of(container);
        let id = self.push_decl_with_scope(
            scope,
            DeclKind::Extension(ExtensionDecl {
                subject,
                where_clause: Vec::new(),
                members: Vec::new(),
            }),
        );
        self.members_mut(container).push(id);
        id
    }

    pub fn conformance_decl(
        &mut self,
        container: DeclId,
        subject: ExprId,
        views: Vec<ExprId>,
    ) -> DeclId {
        let scope = self.scope_of(container);
        let id = self.push_decl_with_scope(
            scope,
            DeclKind::Conformance(ConformanceDecl {
                subject,
                views,
                where_clause: Vec::new(),
                members: Vec::new(),
            }),
        );
        self.members_mut(container).push(id);
        id
    }

    pub fn assoc_type(&mut self, view: DeclId, name: impl Into<SmolStr>) -> DeclId {
        let scope = self.scope_of(view);
        let id = self.push_decl(
            scope,
            DeclKind::AssocType(AssocTypeDecl { name: name.into() }),
        );
        self.members_mut(view).push(id);
        id
    }

    pub fn assoc_value(
        &mut self,
        view: DeclId,
        name: impl Into<SmolStr>,
        annotation: ExprId,
    ) -> DeclId {
        let scope = self.scope_of(view);
        let id = self.push_decl(
            scope,
            DeclKind::AssocValue(AssocValueDecl {
                name: name.into(),
                annotation,
            }),
        );
        self.members_mut(view).push(id);
        id
    }

    // ---- 呼び出し可能宣言 ----

    pub fn function(&mut self, container: DeclId, name: Name) -> DeclId {
        let scope = self.scope_of(container);
        let id = self.function_in_scope(scope, name);
        self.members_mut(container).push(id);
        id
    }

    /// コンテナに追加せず、指定スコープに直接関数を宣言する。
    /// ラムダの基底宣言を作るときに使う。
    pub fn function_in_scope(&mut self, scope: ScopeId, name: Name) -> DeclId {
        self.push_decl_with_scope(
            scope,
            DeclKind::Function(FunctionDecl {
                name,
                generic_params: Vec::new(),
                where_clause: Vec::new(),
                explicit_captures: Vec::new(),
                params: Vec::new(),
                receiver_effect: None,
                output: None,
                body: None,
                is_in_expr_context: false,
            }),
        )
    }

    pub fn initializer(&mut self, container: DeclId) -> DeclId {
        let scope = self.scope_of(container);
        let id = self.push_decl_with_scope(
            scope,
            DeclKind::Initializer(InitializerDecl {
                name: Name::simple("init"),
                generic_params: Vec::new(),
                params: Vec::new(),
                body: None,
                is_memberwise: false,
            }),
        );
        self.members_mut(container).push(id);
        id
    }

    /// 格納束縛ごとの sink パラメータを持つメンバワイズイニシャライザ。
    pub fn memberwise_initializer(&mut self, record: DeclId) -> DeclId {
        let id = self.initializer(record);
        match &mut self.decls[id.index()].kind {
            DeclKind::Initializer(decl) => decl.is_memberwise = true,
            _ => unreachable!(),
        }
        id
    }

    pub fn method(&mut self, container: DeclId, name: Name) -> DeclId {
        let scope = self.scope_of(container);
        let id = self.push_decl_with_scope(
            scope,
            DeclKind::Method(MethodDecl {
                name,
                generic_params: Vec::new(),
                where_clause: Vec::new(),
                params: Vec::new(),
                output: None,
                variants: Vec::new(),
            }),
        );
        self.members_mut(container).push(id);
        id
    }

    pub fn method_variant(&mut self, method: DeclId, effect: AccessEffect) -> DeclId {
        let scope = self.scope_of(method);
        let id = self.push_decl_with_scope(
            scope,
            DeclKind::MethodVariant(MethodVariantDecl { effect, body: None }),
        );
        match &mut self.decls[method.index()].kind {
            DeclKind::Method(decl) => decl.variants.push(id),
            other => panic!("メソッドバンドルでない宣言: {other:?}"),
        }
        id
    }

    pub fn subscript(
        &mut self,
        container: DeclId,
        name: Option<Name>,
        is_property: bool,
        output: ExprId,
    ) -> DeclId {
        let scope = self.scope_of(container);
        let id = self.push_decl_with_scope(
            scope,
            DeclKind::Subscript(SubscriptDecl {
                name,
                is_property,
                generic_params: Vec::new(),
                where_clause: Vec::new(),
                params: Vec::new(),
                output,
                variants: Vec::new(),
            }),
        );
        self.members_mut(container).push(id);
        id
    }

    pub fn subscript_variant(&mut self, subscript: DeclId, effect: AccessEffect) -> DeclId {
        let scope = self.scope_of(subscript);
        let id = self.push_decl_with_scope(
            scope,
            DeclKind::SubscriptVariant(SubscriptVariantDecl { effect, body: None }),
        );
        match &mut self.decls[subscript.index()].kind {
            DeclKind::Subscript(decl) => decl.variants.push(id),
            other => panic!("添字バンドルでない宣言: {other:?}"),
        }
        id
    }

    pub fn param(
        &mut self,
        callable: DeclId,
        label: Option<&str>,
        name: impl Into<SmolStr>,
        convention: AccessEffect,
        annotation: Option<ExprId>,
    ) -> DeclId {
        let scope = self.scope_of(callable);
        let id = self.push_decl(
            scope,
            DeclKind::Parameter(ParameterDecl {
                label: label.map(SmolStr::new),
                name: name.into(),
                convention,
                annotation,
                default_value: None,
            }),
        );
        match &mut self.decls[callable.index()].kind {
            DeclKind::Function(decl) => decl.params.push(id),
            DeclKind::Initializer(decl) => decl.params.push(id),
            DeclKind::Method(decl) => decl.params.push(id),
            DeclKind::Subscript(decl) => decl.params.push(id),
            other => panic!("パラメータを持たない宣言: {other:?}"),
        }
        id
    }

    pub fn generic_param(
        &mut self,
        owner: DeclId,
        name: impl Into<SmolStr>,
        annotations: Vec<ExprId>,
    ) -> DeclId {
        let scope = self.scope_of(owner);
        let id = self.push_decl(
            scope,
            DeclKind::GenericParam(GenericParamDecl {
                name: name.into(),
                annotations,
            }),
        );
        match &mut self.decls[owner.index()].kind {
            DeclKind::Record(decl) => decl.generic_params.push(id),
            DeclKind::TypeAlias(decl) => decl.generic_params.push(id),
            DeclKind::Function(decl) => decl.generic_params.push(id),
            DeclKind::Initializer(decl) => decl.generic_params.push(id),
            DeclKind::Method(decl) => decl.generic_params.push(id),
            DeclKind::Subscript(decl) => decl.generic_params.push(id),
            other => panic!("総称パラメータを持たない宣言: {other:?}"),
        }
        id
    }

    pub fn set_receiver_effect(&mut self, function: DeclId, effect: AccessEffect) {
        match &mut self.decls[function.index()].kind {
            DeclKind::Function(decl) => decl.receiver_effect = Some(effect),
            other => panic!("レシーバ効果を持たない宣言: {other:?}"),
        }
    }

    pub fn set_output(&mut self, callable: DeclId, output: ExprId) {
        match &mut self.decls[callable.index()].kind {
            DeclKind::Function(decl) => decl.output = Some(output),
            DeclKind::Method(decl) => decl.output = Some(output),
            other => panic!("戻り値注釈を持たない宣言: {other:?}"),
        }
    }

    pub fn set_body(&mut self, callable: DeclId, body: FunctionBody) {
        match &mut self.decls[callable.index()].kind {
            DeclKind::Function(decl) => decl.body = Some(body),
            DeclKind::Initializer(decl) => decl.body = Some(body),
            DeclKind::MethodVariant(decl) => decl.body = Some(body),
            other => panic!("本体を持たない宣言: {other:?}"),
        }
    }

    pub fn set_in_expr_context(&mut self, function: DeclId) {
        match &mut self.decls[function.index()].kind {
            DeclKind::Function(decl) => decl.is_in_expr_context = true,
            other => panic!("関数でない宣言: {other:?}"),
        }
    }

    pub fn add_explicit_capture(&mut self, function: DeclId, capture: DeclId) {
        match &mut self.decls[function.index()].kind {
            DeclKind::Function(decl) => decl.explicit_captures.push(capture),
            other => panic!("関数でない宣言: {other:?}"),
        }
    }

    /// 総称宣言に `where` 制約を追加する。
    pub fn add_where_constraint(&mut self, owner: DeclId, constraint: super::WhereConstraintExpr) {
        let clause = match &mut self.decls[owner.index()].kind {
            DeclKind::Record(decl) => &mut decl.where_clause,
            DeclKind::TypeAlias(decl) => &mut decl.where_clause,
            DeclKind::Function(decl) => &mut decl.where_clause,
            DeclKind::Method(decl) => &mut decl.where_clause,
            DeclKind::Subscript(decl) => &mut decl.where_clause,
            DeclKind::Extension(decl) => &mut decl.where_clause,
            DeclKind::Conformance(decl) => &mut decl.where_clause,
            other => panic!("where 節を持たない宣言: {other:?}"),
        };
        clause.push(constraint);
    }

    pub fn operator(
        &mut self,
        container: DeclId,
        notation: OperatorNotation,
        stem: impl Into<SmolStr>,
        precedence_group: Option<PrecedenceGroup>,
    ) -> DeclId {
        let scope = self.scope_of(container);
        let id = self.push_decl(
            scope,
            DeclKind::Operator(OperatorDecl {
                notation,
                stem: stem.into(),
                precedence_group,
            }),
        );
        self.members_mut(container).push(id);
        id
    }

    // ---- 束縛とパターン ----

    pub fn name_pattern(&mut self, name: impl Into<SmolStr>) -> PatternId {
        self.push_pattern(PatternKind::Name { name: name.into() })
    }

    pub fn tuple_pattern(&mut self, elements: Vec<PatternId>) -> PatternId {
        self.push_pattern(PatternKind::Tuple { elements })
    }

    pub fn wildcard_pattern(&mut self) -> PatternId {
        self.push_pattern(PatternKind::Wildcard)
    }

    fn push_pattern(&mut self, kind: PatternKind) -> PatternId {
        let id = PatternId(self.patterns.len() as u32);
        let span = self.next_span();
        self.patterns.push(Pattern { id, span, kind });
        id
    }

    /// コンテナのメンバとして束縛宣言を追加する（レコードの格納束縛など）。
    pub fn binding(
        &mut self,
        container: DeclId,
        introducer: BindingIntroducer,
        pattern: PatternId,
        annotation: Option<ExprId>,
        initializer: Option<ExprId>,
    ) -> DeclId {
        let scope = self.scope_of(container);
        let id = self.binding_in(scope, introducer, pattern, annotation, initializer);
        self.members_mut(container).push(id);
        id
    }

    /// スコープ直下に束縛宣言を作る（ブロック内のローカル束縛など）。
    pub fn binding_in(
        &mut self,
        scope: ScopeId,
        introducer: BindingIntroducer,
        pattern: PatternId,
        annotation: Option<ExprId>,
        initializer: Option<ExprId>,
    ) -> DeclId {
        self.push_decl(
            scope,
            DeclKind::Binding(BindingDecl {
                introducer,
                pattern,
                annotation,
                initializer,
            }),
        )
    }

    // ---- 式 ----

    pub fn expr(&mut self, scope: ScopeId, kind: ExprKind) -> ExprId {
        let id = ExprId(self.exprs.len() as u32);
        let span = self.next_span();
        self.exprs.push(Expr {
            id,
            span,
            scope,
            kind,
        });
        id
    }

    pub fn bool_lit(&mut self, scope: ScopeId, value: bool) -> ExprId {
        self.expr(scope, ExprKind::BoolLiteral { value })
    }

    pub fn int(&mut self, scope: ScopeId, value: i64) -> ExprId {
        self.expr(scope, ExprKind::IntLiteral { value })
    }

    pub fn float(&mut self, scope: ScopeId, text: impl Into<SmolStr>) -> ExprId {
        self.expr(scope, ExprKind::FloatLiteral { text: text.into() })
    }

    pub fn string(&mut self, scope: ScopeId, value: impl Into<SmolStr>) -> ExprId {
        self.expr(
            scope,
            ExprKind::StringLiteral {
                value: value.into(),
            },
        )
    }

    pub fn name(&mut self, scope: ScopeId, stem: impl Into<SmolStr>) -> ExprId {
        self.name_expr(scope, NameDomain::None, Name::simple(stem), Vec::new())
    }

    pub fn member_name(
        &mut self,
        scope: ScopeId,
        subject: ExprId,
        stem: impl Into<SmolStr>,
    ) -> ExprId {
        self.name_expr(
            scope,
            NameDomain::Explicit { subject },
            Name::simple(stem),
            Vec::new(),
        )
    }

    pub fn name_expr(
        &mut self,
        scope: ScopeId,
        domain: NameDomain,
        name: Name,
        arguments: Vec<ExprId>,
    ) -> ExprId {
        self.expr(
            scope,
            ExprKind::Name(NameExpr {
                domain,
                name,
                arguments,
            }),
        )
    }

    pub fn call(&mut self, scope: ScopeId, callee: ExprId, arguments: Vec<Argument>) -> ExprId {
        self.expr(scope, ExprKind::Call { callee, arguments })
    }

    pub fn subscript_call(
        &mut self,
        scope: ScopeId,
        callee: ExprId,
        arguments: Vec<Argument>,
    ) -> ExprId {
        self.expr(scope, ExprKind::SubscriptCall { callee, arguments })
    }

    pub fn arg(&mut self, value: ExprId) -> Argument {
        Argument { label: None, value }
    }

    pub fn labeled_arg(&mut self, label: impl Into<SmolStr>, value: ExprId) -> Argument {
        Argument {
            label: Some(label.into()),
            value,
        }
    }

    pub fn tuple(&mut self, scope: ScopeId, elements: Vec<TupleElementExpr>) -> ExprId {
        self.expr(scope, ExprKind::Tuple { elements })
    }

    pub fn inout_expr(&mut self, scope: ScopeId, subject: ExprId) -> ExprId {
        self.expr(scope, ExprKind::Inout { subject })
    }

    pub fn lambda(&mut self, scope: ScopeId, decl: DeclId) -> ExprId {
        self.expr(scope, ExprKind::Lambda { decl })
    }

    pub fn sequence(
        &mut self,
        scope: ScopeId,
        head: ExprId,
        tail: Vec<(ExprId, ExprId)>,
    ) -> ExprId {
        let tail = tail
            .into_iter()
            .map(|(operator, operand)| SequenceLink { operator, operand })
            .collect();
        self.expr(scope, ExprKind::Sequence { head, tail })
    }

    /// 中置演算子の名前式を作る。`Sequence` の `operator` 位置に置く。
    pub fn infix_operator(&mut self, scope: ScopeId, stem: impl Into<SmolStr>) -> ExprId {
        self.name_expr(
            scope,
            NameDomain::None,
            Name::operator(stem, OperatorNotation::Infix),
            Vec::new(),
        )
    }

    pub fn conditional(
        &mut self,
        scope: ScopeId,
        condition: ExprId,
        success: ExprId,
        failure: Option<ExprId>,
    ) -> ExprId {
        self.expr(
            scope,
            ExprKind::Conditional {
                condition,
                success,
                failure,
            },
        )
    }

    /// 新しいスコープを持つブロック式を作る。文は後から `push_stmt` で足す。
    pub fn block(&mut self, scope: ScopeId) -> (ExprId, ScopeId) {
        let inner = self.scopes.push(scope, None);
        let id = self.expr(
            scope,
            ExprKind::Block {
                statements: Vec::new(),
            },
        );
        (id, inner)
    }

    pub fn push_stmt(&mut self, block: ExprId, stmt: StmtId) {
        match &mut self.exprs[block.index()].kind {
            ExprKind::Block { statements } => statements.push(stmt),
            other => panic!("ブロックでない式: {other:?}"),
        }
    }

    pub fn stmt(&mut self, kind: StmtKind) -> StmtId {
        let id = StmtId(self.stmts.len() as u32);
        let span = self.next_span();
        self.stmts.push(Stmt { id, span, kind });
        id
    }

    pub fn expr_stmt(&mut self, expr: ExprId) -> StmtId {
        self.stmt(StmtKind::Expr { expr })
    }

    pub fn decl_stmt(&mut self, decl: DeclId) -> StmtId {
        self.stmt(StmtKind::Decl { decl })
    }

    pub fn return_stmt(&mut self, value: Option<ExprId>) -> StmtId {
        self.stmt(StmtKind::Return { value })
    }

    // ---- 型式 ----

    pub fn sum_type(&mut self, scope: ScopeId, variants: Vec<ExprId>) -> ExprId {
        self.expr(scope, ExprKind::SumType { variants })
    }

    pub fn existential(&mut self, scope: ScopeId, interfaces: Vec<ExprId>) -> ExprId {
        self.expr(
            scope,
            ExprKind::ExistentialType {
                interfaces,
                where_clause: Vec::new(),
            },
        )
    }

    pub fn lambda_type(
        &mut self,
        scope: ScopeId,
        parameters: Vec<ParameterTypeExprSpec>,
        output: ExprId,
    ) -> ExprId {
        let parameters = parameters
            .into_iter()
            .map(|spec| super::ParameterTypeExpr {
                label: spec.label.map(SmolStr::new),
                convention: spec.convention,
                bare: spec.bare,
            })
            .collect();
        self.expr(
            scope,
            ExprKind::LambdaType {
                receiver_effect: AccessEffect::Let,
                environment: None,
                parameters,
                output,
            },
        )
    }

    pub fn remote_type(&mut self, scope: ScopeId, effect: AccessEffect, operand: ExprId) -> ExprId {
        self.expr(scope, ExprKind::RemoteType { effect, operand })
    }

    /// 総称引数つきの名前型式（`Box<Int>` など）。
    pub fn generic_name(
        &mut self,
        scope: ScopeId,
        stem: impl Into<SmolStr>,
        arguments: Vec<ExprId>,
    ) -> ExprId {
        self.name_expr(scope, NameDomain::None, Name::simple(stem), arguments)
    }

    // ---- コアライブラリ ----

    /// 最小のコアライブラリモジュールを構築して登録する。
    ///
    /// `Bool` `Int` `Float64` `String` の各型、組み込みビュー
    /// `Destructible` `Movable` `Copyable`、基本演算子を含む。
    pub fn core_library(&mut self) -> DeclId {
        let core = self.module("Core");
        let file = self.source_file(core, "core.norn");
        let file_scope = self.scope_of(file);

        let bool_ty = self.record(file, "Bool");
        let int_ty = self.record(file, "Int");
        let float_ty = self.record(file, "Float64");
        let string_ty = self.record(file, "String");
        let _ = (bool_ty, float_ty, string_ty);

        // view Destructible { fun deinit(sink self) }
        let destructible = self.view(file, "Destructible");
        let deinit = self.function(destructible, Name::functional("deinit", vec![]));
        self.set_receiver_effect(deinit, AccessEffect::Sink);

        // view Movable: Destructible { method take_value(source: sink Self) { set, inout } }
        let movable = self.view(file, "Movable");
        let movable_scope = self.scope_of(movable);
        let destructible_ref = self.name(movable_scope, "Destructible");
        self.add_refinement(movable, destructible_ref);
        let take_value = self.method(
            movable,
            Name::functional("take_value", vec![Some(SmolStr::new("from"))]),
        );
        let take_scope = self.scope_of(take_value);
        let self_ref = self.name(take_scope, "Self");
        self.param(
            take_value,
            Some("from"),
            "source",
            AccessEffect::Sink,
            Some(self_ref),
        );
        self.method_variant(take_value, AccessEffect::Set);
        self.method_variant(take_value, AccessEffect::Inout);

        // view Copyable: Destructible { fun copy(self) -> Self }
        let copyable = self.view(file, "Copyable");
        let copyable_scope = self.scope_of(copyable);
        let destructible_ref = self.name(copyable_scope, "Destructible");
        self.add_refinement(copyable, destructible_ref);
        let copy = self.function(copyable, Name::functional("copy", vec![]));
        self.set_receiver_effect(copy, AccessEffect::Let);
        let copy_scope = self.scope_of(copy);
        let self_ref = self.name(copy_scope, "Self");
        self.set_output(copy, self_ref);

        // 標準演算子の優先順位宣言と Int 上の中置演算子。
        for (stem, group) in [
            ("+", PrecedenceGroup::Addition),
            ("-", PrecedenceGroup::Addition),
            ("*", PrecedenceGroup::Multiplication),
            ("/", PrecedenceGroup::Multiplication),
            ("==", PrecedenceGroup::Comparison),
            ("<", PrecedenceGroup::Comparison),
        ] {
            self.operator(file, OperatorNotation::Infix, stem, Some(group));
        }
        for stem in ["+", "-", "*", "/"] {
            let f = self.function(
                int_ty,
                Name {
                    stem: SmolStr::new(stem),
                    labels: Some(vec![None]),
                    notation: Some(OperatorNotation::Infix),
                },
            );
            self.set_receiver_effect(f, AccessEffect::Let);
            let f_scope = self.scope_of(f);
            let rhs_ty = self.name(f_scope, "Int");
            self.param(f, None, "other", AccessEffect::Let, Some(rhs_ty));
            let out = self.name(f_scope, "Int");
            self.set_output(f, out);
        }
        for stem in ["==", "<"] {
            let f = self.function(
                int_ty,
                Name {
                    stem: SmolStr::new(stem),
                    labels: Some(vec![None]),
                    notation: Some(OperatorNotation::Infix),
                },
            );
            self.set_receiver_effect(f, AccessEffect::Let);
            let f_scope = self.scope_of(f);
            let rhs_ty = self.name(f_scope, "Int");
            self.param(f, None, "other", AccessEffect::Let, Some(rhs_ty));
            let out = self.name(f_scope, "Bool");
            self.set_output(f, out);
        }

        self.core_library = Some(core);
        core
    }

    /// ビュー宣言の暗黙 `Self` パラメータを返す。
    pub fn receiver_param(&self, view: DeclId) -> DeclId {
        match &self.decls[view.index()].kind {
            DeclKind::View(decl) => decl.receiver_param,
            other => panic!("ビューでない宣言: {other:?}"),
        }
    }
}

/// `lambda_type` 用のパラメータ指定。
#[derive(Debug, Clone)]
pub struct ParameterTypeExprSpec {
    pub label: Option<&'static str>,
    pub convention: AccessEffect,
    pub bare: ExprId,
}

impl ParameterTypeExprSpec {
    pub fn new(convention: AccessEffect, bare: ExprId) -> Self {
        Self {
            label: None,
            convention,
            bare,
        }
    }
}
