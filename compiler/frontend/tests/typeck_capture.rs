use norn_frontend::ast::{
    AccessEffect, BindingIntroducer, FunctionBody, Name, ProgramBuilder,
};
use norn_frontend::typeck::{Checker, CheckerConfig};

/// 外側のローカル束縛を読む入れ子関数は let キャプチャを持つ。
#[test]
fn reading_use_is_captured_as_let() {
    let mut builder = ProgramBuilder::new();
    builder.core_library();
    let module = builder.module("Main");
    let file = builder.source_file(module, "main.norn");
    let outer = builder.function(file, Name::functional("outer", vec![]));
    let outer_scope = builder.scope_of(outer);
    let (block, block_scope) = builder.block(outer_scope);

    let pattern = builder.name_pattern("counter");
    let zero = builder.int(block_scope, 0);
    let counter = builder.binding_in(
        block_scope,
        BindingIntroducer::Var,
        pattern,
        None,
        Some(zero),
    );
    let counter_stmt = builder.decl_stmt(counter);
    builder.push_stmt(block, counter_stmt);

    // 入れ子関数 read() = counter
    let inner = builder.function_in_scope(block_scope, Name::functional("read", vec![]));
    let inner_scope = builder.scope_of(inner);
    let use_expr = builder.name(inner_scope, "counter");
    builder.set_body(inner, FunctionBody::Expr { expr: use_expr });
    let inner_stmt = builder.decl_stmt(inner);
    builder.push_stmt(block, inner_stmt);

    builder.set_body(outer, FunctionBody::Block { block });
    let program = builder.finish();

    let mut checker = Checker::new(&program, CheckerConfig::default());
    checker.check_all();

    let result = checker.finish();
    let captures = result
        .implicit_captures
        .get(&inner)
        .expect("入れ子関数のキャプチャが記録される");
    assert_eq!(captures.len(), 1);
    assert_eq!(captures[0].name, "counter");
    assert_eq!(captures[0].effect, AccessEffect::Let);
    assert_eq!(captures[0].referenced, counter);
}

/// `&` 式の内側の使用は inout キャプチャになる。
#[test]
fn mutable_use_is_captured_as_inout() {
    let mut builder = ProgramBuilder::new();
    builder.core_library();
    let module = builder.module("Main");
    let file = builder.source_file(module, "main.norn");
    let outer = builder.function(file, Name::functional("outer", vec![]));
    let outer_scope = builder.scope_of(outer);
    let (block, block_scope) = builder.block(outer_scope);

    let pattern = builder.name_pattern("counter");
    let zero = builder.int(block_scope, 0);
    let counter = builder.binding_in(
        block_scope,
        BindingIntroducer::Var,
        pattern,
        None,
        Some(zero),
    );
    let counter_stmt = builder.decl_stmt(counter);
    builder.push_stmt(block, counter_stmt);

    let inner = builder.function_in_scope(block_scope, Name::functional("touch", vec![]));
    let inner_scope = builder.scope_of(inner);
    let use_expr = builder.name(inner_scope, "counter");
    let inout_expr = builder.inout_expr(inner_scope, use_expr);
    builder.set_body(inner, FunctionBody::Expr { expr: inout_expr });
    let inner_stmt = builder.decl_stmt(inner);
    builder.push_stmt(block, inner_stmt);

    builder.set_body(outer, FunctionBody::Block { block });
    let program = builder.finish();

    let mut checker = Checker::new(&program, CheckerConfig::default());
    checker.check_all();

    let result = checker.finish();
    let captures = result
        .implicit_captures
        .get(&inner)
        .expect("キャプチャが記録される");
    assert_eq!(captures.len(), 1);
    assert_eq!(captures[0].effect, AccessEffect::Inout);
}

/// グローバル宣言とキャプチャレス関数への参照はキャプチャにならない。
#[test]
fn globals_and_captureless_functions_are_not_captured() {
    let mut builder = ProgramBuilder::new();
    builder.core_library();
    let module = builder.module("Main");
    let file = builder.source_file(module, "main.norn");

    // グローバル関数 helper()
    let helper = builder.function(file, Name::functional("helper", vec![]));
    let helper_scope = builder.scope_of(helper);
    let (helper_block, _) = builder.block(helper_scope);
    builder.set_body(helper, FunctionBody::Block { block: helper_block });

    let outer = builder.function(file, Name::functional("outer", vec![]));
    let outer_scope = builder.scope_of(outer);
    let (block, block_scope) = builder.block(outer_scope);
    let inner = builder.function_in_scope(block_scope, Name::functional("call_helper", vec![]));
    let inner_scope = builder.scope_of(inner);
    let callee = builder.name(inner_scope, "helper");
    let call = builder.call(inner_scope, callee, vec![]);
    builder.set_body(inner, FunctionBody::Expr { expr: call });
    let inner_stmt = builder.decl_stmt(inner);
    builder.push_stmt(block, inner_stmt);
    builder.set_body(outer, FunctionBody::Block { block });

    let program = builder.finish();
    let mut checker = Checker::new(&program, CheckerConfig::default());
    checker.check_all();

    let result = checker.finish();
    let captures = result.implicit_captures.get(&inner);
    assert!(
        captures.map(|captures| captures.is_empty()).unwrap_or(true),
        "キャプチャレス関数への参照はキャプチャではない: {captures:?}"
    );
}
