use norn_frontend::ast::{FunctionBody, Name, ProgramBuilder};
use norn_frontend::diagnostic::{render_diagnostics, DiagnosticCode, LineIndex};
use norn_frontend::typeck::{Checker, CheckerConfig, TypeNode};

/// 未定義名の診断が安定コードと位置情報つきで JSON 化される。
#[test]
fn undefined_name_renders_with_stable_code() {
    let mut builder = ProgramBuilder::new();
    builder.core_library();
    let module = builder.module("Main");
    let file = builder.source_file(module, "main.norn");
    let main = builder.function(file, Name::functional("main", vec![]));
    let main_scope = builder.scope_of(main);
    let (block, block_scope) = builder.block(main_scope);
    let missing = builder.name(block_scope, "missing");
    let stmt = builder.expr_stmt(missing);
    builder.push_stmt(block, stmt);
    builder.set_body(main, FunctionBody::Block { block });

    let program = builder.finish();
    let mut checker = Checker::new(&program, CheckerConfig::default());
    checker.check_all();
    let result = checker.finish();

    let value = render_diagnostics(&result.diagnostics, None);
    assert_eq!(value["schema_version"], "1.0.0");
    let rendered = value["diagnostics"]
        .as_array()
        .expect("診断は配列にレンダリングされる");
    assert!(!rendered.is_empty());
    let undefined = rendered
        .iter()
        .find(|entry| entry["code"] == DiagnosticCode::UndefinedName.as_str())
        .expect("未定義名の診断が含まれる");
    assert!(undefined["message"]
        .as_str()
        .expect("メッセージは文字列")
        .contains("missing"));
    assert_eq!(undefined["args"]["name"], "missing");
    assert!(undefined["location"]["start"].is_u64());
}

#[test]
fn line_index_is_attached_when_source_is_present() {
    let mut set = norn_frontend::diagnostic::DiagnosticSet::new();
    set.insert(
        norn_frontend::diagnostic::Diagnostic::new(
            DiagnosticCode::UndefinedName,
            norn_frontend::span::Span::new(7, 8),
        )
        .with_arg("name", "x"),
    );
    let value = render_diagnostics(&set, Some("let a\nlet x\n"));
    assert_eq!(value["diagnostics"][0]["location"]["line"], 2);

    let index = LineIndex::new("let a\nlet x\n");
    assert_eq!(index.line_col(7), (2, 2));
}

/// 型表示はメタタイプ・束縛総称・ラムダを読める形に整形する。
#[test]
fn type_display_is_human_readable() {
    let mut builder = ProgramBuilder::new();
    builder.core_library();
    let module = builder.module("Main");
    let file = builder.source_file(module, "main.norn");
    let record = builder.record(file, "Box");
    builder.generic_param(record, "T", vec![]);
    let main = builder.function(file, Name::functional("main", vec![]));
    let main_scope = builder.scope_of(main);
    let (block, block_scope) = builder.block(main_scope);
    let int_ref = builder.name(block_scope, "Int");
    let boxed = builder.generic_name(block_scope, "Box", vec![int_ref]);
    let stmt = builder.expr_stmt(boxed);
    builder.push_stmt(block, stmt);
    builder.set_body(main, FunctionBody::Block { block });

    let program = builder.finish();
    let mut checker = Checker::new(&program, CheckerConfig::default());
    checker.check_all();

    let ty = checker.expr_type(boxed).expect("式の型");
    let rendered = format!("{}", checker.types.display(&program, ty));
    insta::assert_snapshot!(rendered, @"Metatype<Box<Int>>");

    let TypeNode::Metatype { instance } = checker.types.node(ty).clone() else {
        panic!("メタタイプ");
    };
    let rendered = format!("{}", checker.types.display(&program, instance));
    insta::assert_snapshot!(rendered, @"Box<Int>");
}
