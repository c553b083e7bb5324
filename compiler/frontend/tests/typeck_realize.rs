use norn_frontend::ast::{
    AccessEffect, BindingIntroducer, Name, ProgramBuilder,
};
use norn_frontend::diagnostic::DiagnosticCode;
use norn_frontend::typeck::{Checker, CheckerConfig, DeclState, TypeNode};

#[test]
fn realization_is_idempotent_and_emits_no_new_diagnostics() {
    let mut builder = ProgramBuilder::new();
    builder.core_library();
    let module = builder.module("Main");
    let file = builder.source_file(module, "main.norn");
    let function = builder.function(file, Name::functional("id", vec![None]));
    let scope = builder.scope_of(function);
    let int_ty = builder.name(scope, "Int");
    builder.param(function, None, "x", AccessEffect::Sink, Some(int_ty));
    let out_ty = builder.name(scope, "Int");
    builder.set_output(function, out_ty);
    let body = builder.name(scope, "x");
    builder.set_body(
        function,
        norn_frontend::ast::FunctionBody::Expr { expr: body },
    );
    let program = builder.finish();

    let mut checker = Checker::new(&program, CheckerConfig::default());
    let first = checker.realize_decl(function);
    let diagnostics_after_first = checker.diagnostics.len();
    let second = checker.realize_decl(function);
    assert_eq!(first, second, "実体化は冪等");
    assert_eq!(
        checker.diagnostics.len(),
        diagnostics_after_first,
        "2 回目の実体化は診断を追加しない"
    );
    assert!(matches!(
        checker.types.node(first),
        TypeNode::Lambda { .. }
    ));
}

#[test]
fn circular_aliases_produce_exactly_one_diagnostic() {
    let mut builder = ProgramBuilder::new();
    let module = builder.module("Main");
    let file = builder.source_file(module, "main.norn");
    // type X = Y; type Y = X
    let placeholder = builder.name(builder.scope_of(file), "Y");
    let alias_x = builder.type_alias(file, "X", placeholder);
    let y_ref = builder.name(builder.scope_of(file), "Y");
    builder.set_aliasee(alias_x, y_ref);
    let x_ref = builder.name(builder.scope_of(file), "X");
    let alias_y = builder.type_alias(file, "Y", x_ref);
    let program = builder.finish();

    let mut checker = Checker::new(&program, CheckerConfig::default());
    checker.check_all();
    assert_eq!(
        checker
            .diagnostics
            .count_of(DiagnosticCode::CircularDependency),
        1,
        "循環依存の診断はちょうど 1 件"
    );
    assert_eq!(
        checker.decl_type(alias_x),
        Some(norn_frontend::typeck::TypeId::ERROR)
    );
    assert_eq!(
        checker.decl_type(alias_y),
        Some(norn_frontend::typeck::TypeId::ERROR)
    );
    let result = checker.finish();
    assert!(!result.is_clean());
}

#[test]
fn every_declaration_reaches_done_after_module_check() {
    let mut builder = ProgramBuilder::new();
    builder.core_library();
    let module = builder.module("Main");
    let file = builder.source_file(module, "main.norn");
    let record = builder.record(file, "Point");
    let pattern = builder.name_pattern("x");
    let annotation = builder.name(builder.scope_of(record), "Int");
    builder.binding(
        record,
        BindingIntroducer::Var,
        pattern,
        Some(annotation),
        None,
    );
    let program = builder.finish();

    let mut checker = Checker::new(&program, CheckerConfig::default());
    checker.check_all();
    for decl in [module, file, record] {
        assert_eq!(
            checker.decl_state(decl),
            Some(DeclState::Done),
            "検査後の宣言は done 状態"
        );
    }
}

#[test]
fn memberwise_initializer_takes_one_sink_parameter_per_stored_binding() {
    let mut builder = ProgramBuilder::new();
    builder.core_library();
    let module = builder.module("Main");
    let file = builder.source_file(module, "main.norn");
    let record = builder.record(file, "Pair");
    let record_scope = builder.scope_of(record);
    for field in ["first", "second"] {
        let pattern = builder.name_pattern(field);
        let annotation = builder.name(record_scope, "Int");
        builder.binding(
            record,
            BindingIntroducer::Var,
            pattern,
            Some(annotation),
            None,
        );
    }
    let init = builder.memberwise_initializer(record);
    let program = builder.finish();

    let mut checker = Checker::new(&program, CheckerConfig::default());
    let ty = checker.realize_decl(init);
    let TypeNode::Lambda { inputs, .. } = checker.types.node(ty).clone() else {
        panic!("イニシャライザはラムダ型に実体化される");
    };
    assert_eq!(inputs.len(), 2, "格納束縛ごとに 1 パラメータ");
    assert_eq!(inputs[0].label.as_deref(), Some("first"));
    assert_eq!(inputs[1].label.as_deref(), Some("second"));
    for input in inputs {
        assert!(matches!(
            checker.types.node(input.ty),
            TypeNode::Parameter {
                convention: AccessEffect::Sink,
                ..
            }
        ));
    }
}

#[test]
fn mutating_bundle_with_non_pair_output_is_rejected() {
    let mut builder = ProgramBuilder::new();
    builder.core_library();
    let module = builder.module("Main");
    let file = builder.source_file(module, "main.norn");
    let record = builder.record(file, "Counter");
    let method = builder.method(record, Name::functional("bump", vec![]));
    let method_scope = builder.scope_of(method);
    let out = builder.name(method_scope, "Int");
    builder.set_output(method, out);
    builder.method_variant(method, AccessEffect::Inout);
    let program = builder.finish();

    let mut checker = Checker::new(&program, CheckerConfig::default());
    let _ = checker.realize_decl(method);
    assert!(
        checker
            .diagnostics
            .contains_code(DiagnosticCode::MutatingBundleMustReturn),
        "inout 変種の出力が 2 要素タプルでなければ診断される"
    );
}

#[test]
fn value_generic_parameter_rejects_multiple_annotations() {
    let mut builder = ProgramBuilder::new();
    builder.core_library();
    let module = builder.module("Main");
    let file = builder.source_file(module, "main.norn");
    let record = builder.record(file, "Vector");
    let record_scope = builder.scope_of(record);
    let first = builder.name(record_scope, "Int");
    let second = builder.name(record_scope, "Int");
    builder.generic_param(record, "N", vec![first, second]);
    let program = builder.finish();

    let mut checker = Checker::new(&program, CheckerConfig::default());
    checker.check_all();
    assert!(checker
        .diagnostics
        .contains_code(DiagnosticCode::TooManyAnnotations));
}

#[test]
fn extensions_of_builtin_types_are_rejected() {
    let mut builder = ProgramBuilder::new();
    builder.core_library();
    let module = builder.module("Main");
    let file = builder.source_file(module, "main.norn");
    let file_scope = builder.scope_of(file);
    let never_ref = builder.name(file_scope, "Never");
    builder.extension(file, never_ref);
    let program = builder.finish();

    let mut checker = Checker::new(&program, CheckerConfig::default());
    checker.check_all();
    assert!(checker
        .diagnostics
        .contains_code(DiagnosticCode::ExtensionOfBuiltin));
}

#[test]
fn unannotated_parameter_outside_expression_context_is_rejected() {
    let mut builder = ProgramBuilder::new();
    builder.core_library();
    let module = builder.module("Main");
    let file = builder.source_file(module, "main.norn");
    let function = builder.function(file, Name::functional("f", vec![None]));
    builder.param(function, None, "x", AccessEffect::Sink, None);
    let program = builder.finish();

    let mut checker = Checker::new(&program, CheckerConfig::default());
    let _ = checker.realize_decl(function);
    assert!(checker
        .diagnostics
        .contains_code(DiagnosticCode::NotEnoughContext));
}
