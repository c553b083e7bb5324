use norn_frontend::ast::{
    AccessEffect, BindingIntroducer, FunctionBody, Name, ProgramBuilder,
};
use norn_frontend::diagnostic::DiagnosticCode;
use norn_frontend::typeck::{Checker, CheckerConfig, TypeId, TypeNode};

/// 発散する本体は「本体 = Never」分岐（ペナルティ 1）で受理される。
#[test]
fn diverging_body_is_accepted_through_never_branch() {
    let mut builder = ProgramBuilder::new();
    builder.core_library();
    let module = builder.module("Main");
    let file = builder.source_file(module, "main.norn");

    // fun fatal_error() -> Never = fatal_error()
    let fatal = builder.function(file, Name::functional("fatal_error", vec![]));
    let fatal_scope = builder.scope_of(fatal);
    let never_ref = builder.name(fatal_scope, "Never");
    builder.set_output(fatal, never_ref);
    let recurse_callee = builder.name(fatal_scope, "fatal_error");
    let recurse = builder.call(fatal_scope, recurse_callee, vec![]);
    builder.set_body(fatal, FunctionBody::Expr { expr: recurse });

    // fun f() -> Int { fatal_error() }
    let f = builder.function(file, Name::functional("f", vec![]));
    let f_scope = builder.scope_of(f);
    let int_ref = builder.name(f_scope, "Int");
    builder.set_output(f, int_ref);
    let (block, block_scope) = builder.block(f_scope);
    let callee = builder.name(block_scope, "fatal_error");
    let call = builder.call(block_scope, callee, vec![]);
    let stmt = builder.expr_stmt(call);
    builder.push_stmt(block, stmt);
    builder.set_body(f, FunctionBody::Block { block });

    let program = builder.finish();
    let mut checker = Checker::new(&program, CheckerConfig::default());
    checker.check_all();

    assert_eq!(checker.expr_type(call), Some(TypeId::NEVER));
    let result = checker.finish();
    assert!(
        result.is_clean(),
        "発散する本体は受理される: {:?}",
        result
            .diagnostics
            .iter()
            .map(|diagnostic| diagnostic.code)
            .collect::<Vec<_>>()
    );
}

/// 注釈なし束縛は等値でリテラル精度を保つ。
#[test]
fn unannotated_binding_takes_literal_type() {
    let mut builder = ProgramBuilder::new();
    builder.core_library();
    let module = builder.module("Main");
    let file = builder.source_file(module, "main.norn");
    let main = builder.function(file, Name::functional("main", vec![]));
    let main_scope = builder.scope_of(main);
    let (block, block_scope) = builder.block(main_scope);
    let pattern = builder.name_pattern("x");
    let one = builder.int(block_scope, 1);
    let binding = builder.binding_in(block_scope, BindingIntroducer::Let, pattern, None, Some(one));
    let stmt = builder.decl_stmt(binding);
    builder.push_stmt(block, stmt);
    builder.set_body(main, FunctionBody::Block { block });

    let program = builder.finish();
    let mut checker = Checker::new(&program, CheckerConfig::default());
    checker.check_all();

    let binding_ty = checker.decl_type(binding).expect("束縛の型が確定する");
    assert!(
        matches!(checker.types.node(binding_ty), TypeNode::Record { .. }),
        "束縛はコアの Int レコードに型付けされる"
    );
    let result = checker.finish();
    assert!(result.is_clean());
}

/// 注釈付き束縛は初期化子とのサブタイピングを検査し、不一致を診断する。
#[test]
fn annotated_binding_mismatch_is_diagnosed() {
    let mut builder = ProgramBuilder::new();
    builder.core_library();
    let module = builder.module("Main");
    let file = builder.source_file(module, "main.norn");
    let main = builder.function(file, Name::functional("main", vec![]));
    let main_scope = builder.scope_of(main);
    let (block, block_scope) = builder.block(main_scope);
    let pattern = builder.name_pattern("flag");
    let annotation = builder.name(block_scope, "Bool");
    let one = builder.int(block_scope, 1);
    let binding = builder.binding_in(
        block_scope,
        BindingIntroducer::Let,
        pattern,
        Some(annotation),
        Some(one),
    );
    let stmt = builder.decl_stmt(binding);
    builder.push_stmt(block, stmt);
    builder.set_body(main, FunctionBody::Block { block });

    let program = builder.finish();
    let mut checker = Checker::new(&program, CheckerConfig::default());
    checker.check_all();

    assert!(checker
        .diagnostics
        .contains_code(DiagnosticCode::TypeMismatch));
}

/// 条件式の分岐は共通の上界へ合流する。
#[test]
fn conditional_branches_merge_into_result_type() {
    let mut builder = ProgramBuilder::new();
    builder.core_library();
    let module = builder.module("Main");
    let file = builder.source_file(module, "main.norn");
    let main = builder.function(file, Name::functional("main", vec![]));
    let main_scope = builder.scope_of(main);
    let int_ref = builder.name(main_scope, "Int");
    builder.set_output(main, int_ref);
    let (block, block_scope) = builder.block(main_scope);
    let condition = builder.bool_lit(block_scope, true);
    let one = builder.int(block_scope, 1);
    let two = builder.int(block_scope, 2);
    let conditional = builder.conditional(block_scope, condition, one, Some(two));
    let stmt = builder.return_stmt(Some(conditional));
    builder.push_stmt(block, stmt);
    builder.set_body(main, FunctionBody::Block { block });

    let program = builder.finish();
    let mut checker = Checker::new(&program, CheckerConfig::default());
    checker.check_all();

    let ty = checker.expr_type(conditional).expect("条件式の型");
    assert!(matches!(checker.types.node(ty), TypeNode::Record { .. }));
    let result = checker.finish();
    assert!(result.is_clean());
}

/// 非 Bool 条件は診断される。
#[test]
fn non_bool_condition_is_diagnosed() {
    let mut builder = ProgramBuilder::new();
    builder.core_library();
    let module = builder.module("Main");
    let file = builder.source_file(module, "main.norn");
    let main = builder.function(file, Name::functional("main", vec![]));
    let main_scope = builder.scope_of(main);
    let (block, block_scope) = builder.block(main_scope);
    let condition = builder.int(block_scope, 1);
    let one = builder.int(block_scope, 1);
    let two = builder.int(block_scope, 2);
    let conditional = builder.conditional(block_scope, condition, one, Some(two));
    let pattern = builder.name_pattern("x");
    let binding = builder.binding_in(
        block_scope,
        BindingIntroducer::Let,
        pattern,
        None,
        Some(conditional),
    );
    let stmt = builder.decl_stmt(binding);
    builder.push_stmt(block, stmt);
    builder.set_body(main, FunctionBody::Block { block });

    let program = builder.finish();
    let mut checker = Checker::new(&program, CheckerConfig::default());
    checker.check_all();

    assert!(checker
        .diagnostics
        .contains_code(DiagnosticCode::TypeMismatch));
}

/// タプルは要素ごとに推論される。
#[test]
fn tuple_expressions_type_elementwise() {
    let mut builder = ProgramBuilder::new();
    builder.core_library();
    let module = builder.module("Main");
    let file = builder.source_file(module, "main.norn");
    let main = builder.function(file, Name::functional("main", vec![]));
    let main_scope = builder.scope_of(main);
    let (block, block_scope) = builder.block(main_scope);
    let one = builder.int(block_scope, 1);
    let flag = builder.bool_lit(block_scope, true);
    let tuple = builder.tuple(
        block_scope,
        vec![
            norn_frontend::ast::TupleElementExpr {
                label: Some("count".into()),
                value: one,
            },
            norn_frontend::ast::TupleElementExpr {
                label: Some("ready".into()),
                value: flag,
            },
        ],
    );
    let pattern = builder.name_pattern("pair");
    let binding = builder.binding_in(
        block_scope,
        BindingIntroducer::Let,
        pattern,
        None,
        Some(tuple),
    );
    let stmt = builder.decl_stmt(binding);
    builder.push_stmt(block, stmt);
    builder.set_body(main, FunctionBody::Block { block });

    let program = builder.finish();
    let mut checker = Checker::new(&program, CheckerConfig::default());
    checker.check_all();

    let ty = checker.decl_type(binding).expect("束縛の型");
    let TypeNode::Tuple { elements } = checker.types.node(ty).clone() else {
        panic!("タプル型");
    };
    assert_eq!(elements.len(), 2);
    assert_eq!(elements[0].label.as_deref(), Some("count"));
    assert_eq!(elements[1].label.as_deref(), Some("ready"));
}

/// 引数が一致しない呼び出しは候補なしとして診断される。
#[test]
fn call_with_wrong_arity_has_no_viable_candidate() {
    let mut builder = ProgramBuilder::new();
    builder.core_library();
    let module = builder.module("Main");
    let file = builder.source_file(module, "main.norn");
    let f = builder.function(file, Name::functional("f", vec![None]));
    let f_scope = builder.scope_of(f);
    let int_ref = builder.name(f_scope, "Int");
    builder.param(f, None, "x", AccessEffect::Sink, Some(int_ref));
    let (f_block, _) = builder.block(f_scope);
    builder.set_body(f, FunctionBody::Block { block: f_block });

    let main = builder.function(file, Name::functional("main", vec![]));
    let main_scope = builder.scope_of(main);
    let (block, block_scope) = builder.block(main_scope);
    let callee = builder.name(block_scope, "f");
    let call = builder.call(block_scope, callee, vec![]);
    let stmt = builder.expr_stmt(call);
    builder.push_stmt(block, stmt);
    builder.set_body(main, FunctionBody::Block { block });

    let program = builder.finish();
    let mut checker = Checker::new(&program, CheckerConfig::default());
    checker.check_all();

    assert!(checker
        .diagnostics
        .contains_code(DiagnosticCode::NoViableCandidate));
}

/// 捨てられた非 Void 値は警告される。
#[test]
fn discarded_non_void_result_warns() {
    let mut builder = ProgramBuilder::new();
    builder.core_library();
    let module = builder.module("Main");
    let file = builder.source_file(module, "main.norn");
    let main = builder.function(file, Name::functional("main", vec![]));
    let main_scope = builder.scope_of(main);
    let (block, block_scope) = builder.block(main_scope);
    let one = builder.int(block_scope, 1);
    let stmt = builder.expr_stmt(one);
    builder.push_stmt(block, stmt);
    // 2 文にして単一式本体の扱いを避ける。
    let two = builder.int(block_scope, 2);
    let discard = builder.stmt(norn_frontend::ast::StmtKind::Discard { expr: two });
    builder.push_stmt(block, discard);
    builder.set_body(main, FunctionBody::Block { block });

    let program = builder.finish();
    let mut checker = Checker::new(&program, CheckerConfig::default());
    checker.check_all();

    assert_eq!(
        checker.diagnostics.count_of(DiagnosticCode::UnusedResult),
        1,
        "式文のみ警告され、明示的な破棄は警告されない"
    );
}
