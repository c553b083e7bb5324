use norn_frontend::ast::{AccessEffect, FunctionBody, Name, ProgramBuilder};
use norn_frontend::diagnostic::DiagnosticCode;
use norn_frontend::typeck::{
    Checker, CheckerConfig, SynthesizedKind, TypeNode,
};

/// ビュー A、B: A、レコード T: B。準拠集合は {A, B} になり、
/// A のメンバが T 上で解決される。
#[test]
fn refined_conformance_is_transitive() {
    let mut builder = ProgramBuilder::new();
    builder.core_library();
    let module = builder.module("Main");
    let file = builder.source_file(module, "main.norn");
    let file_scope = builder.scope_of(file);

    let view_a = builder.view(file, "A");
    let ping = builder.function(view_a, Name::functional("ping", vec![]));
    builder.set_receiver_effect(ping, AccessEffect::Let);

    let view_b = builder.view(file, "B");
    let b_scope = builder.scope_of(view_b);
    let a_ref = builder.name(b_scope, "A");
    builder.add_refinement(view_b, a_ref);

    let record = builder.record(file, "T");
    let b_conformance = builder.name(file_scope, "B");
    builder.add_conformance(record, b_conformance);

    // fun main() { let t: T; t.ping() }
    let main = builder.function(file, Name::functional("main", vec![]));
    let main_scope = builder.scope_of(main);
    let (block, block_scope) = builder.block(main_scope);
    let pattern = builder.name_pattern("t");
    let annotation = builder.name(block_scope, "T");
    let binding = builder.binding_in(
        block_scope,
        norn_frontend::ast::BindingIntroducer::Let,
        pattern,
        Some(annotation),
        None,
    );
    let decl_stmt = builder.decl_stmt(binding);
    builder.push_stmt(block, decl_stmt);
    let t_ref = builder.name(block_scope, "t");
    let member = builder.member_name(block_scope, t_ref, "ping");
    let call = builder.call(block_scope, member, vec![]);
    let stmt = builder.expr_stmt(call);
    builder.push_stmt(block, stmt);
    builder.set_body(main, FunctionBody::Block { block });

    let program = builder.finish();
    let mut checker = Checker::new(&program, CheckerConfig::default());
    checker.check_all();

    // conformedTraits(T) = {B, A}
    let record_ty = {
        let metatype = checker.realize_decl(record);
        let TypeNode::Metatype { instance } = checker.types.node(metatype).clone() else {
            panic!("レコードはメタタイプに実体化される");
        };
        instance
    };
    let conformed = checker
        .relations
        .conformed_views(&mut checker.types, record_ty);
    assert!(conformed.contains(&view_b));
    assert!(conformed.contains(&view_a), "精緻化閉包で A も含まれる");

    // A のメンバ ping が T 上で解決される。
    let reference = checker.referred_decl(member).expect("ping が解決される");
    assert_eq!(reference.decl(), Some(ping));
    assert!(!checker
        .diagnostics
        .contains_code(DiagnosticCode::DoesNotConform));
}

/// 空のレコード P に P: Movable を宣言すると、ムーブ初期化・ムーブ代入・
/// 破棄の 3 つの合成エントリが包含モジュールへ付く。
#[test]
fn movable_conformance_synthesizes_three_implementations() {
    let mut builder = ProgramBuilder::new();
    builder.core_library();
    let module = builder.module("Main");
    let file = builder.source_file(module, "main.norn");
    let file_scope = builder.scope_of(file);
    let record = builder.record(file, "P");
    let movable_ref = builder.name(file_scope, "Movable");
    builder.add_conformance(record, movable_ref);

    let program = builder.finish();
    let mut checker = Checker::new(&program, CheckerConfig::default());
    checker.check_all();

    let result = checker.finish();
    assert!(
        !result.diagnostics.contains_code(DiagnosticCode::DoesNotConform),
        "合成により準拠は成立する"
    );
    let synthesized = result
        .synthesized_decls
        .get(&module)
        .expect("包含モジュールに合成リストが付く");
    let kinds: Vec<SynthesizedKind> = synthesized.iter().map(|decl| decl.kind).collect();
    assert_eq!(synthesized.len(), 3, "合成エントリは 3 件: {kinds:?}");
    assert!(kinds.contains(&SynthesizedKind::MoveInit));
    assert!(kinds.contains(&SynthesizedKind::MoveAssign));
    assert!(kinds.contains(&SynthesizedKind::Deinit));
}

/// 同じ (モデル, ビュー) 対を同じ公開スコープに二度登録すると診断される。
#[test]
fn redundant_conformance_is_diagnosed_with_both_sites() {
    let mut builder = ProgramBuilder::new();
    builder.core_library();
    let module = builder.module("Main");
    let file = builder.source_file(module, "main.norn");
    let file_scope = builder.scope_of(file);

    let view = builder.view(file, "Tagged");
    let record = builder.record(file, "T");
    let first = builder.name(file_scope, "Tagged");
    builder.add_conformance(record, first);
    let subject = builder.name(file_scope, "T");
    let second = builder.name(file_scope, "Tagged");
    builder.conformance_decl(file, subject, vec![second]);
    let _ = view;

    let program = builder.finish();
    let mut checker = Checker::new(&program, CheckerConfig::default());
    checker.check_all();

    let redundant: Vec<_> = checker
        .diagnostics
        .iter()
        .filter(|diagnostic| diagnostic.code == DiagnosticCode::RedundantConformance)
        .collect();
    assert_eq!(redundant.len(), 1);
    assert!(
        !redundant[0].notes.is_empty(),
        "既存サイトを指すノートが付く"
    );
}

/// 要件を満たす候補がなければ does-not-conform がノート付きで出る。
#[test]
fn unsatisfied_requirement_reports_does_not_conform() {
    let mut builder = ProgramBuilder::new();
    builder.core_library();
    let module = builder.module("Main");
    let file = builder.source_file(module, "main.norn");
    let file_scope = builder.scope_of(file);

    let view = builder.view(file, "Measured");
    let length = builder.function(view, Name::functional("length", vec![]));
    builder.set_receiver_effect(length, AccessEffect::Let);
    let length_scope = builder.scope_of(length);
    let out = builder.name(length_scope, "Int");
    builder.set_output(length, out);

    let record = builder.record(file, "Q");
    let conformance = builder.name(file_scope, "Measured");
    builder.add_conformance(record, conformance);

    let program = builder.finish();
    let mut checker = Checker::new(&program, CheckerConfig::default());
    checker.check_all();

    let failures: Vec<_> = checker
        .diagnostics
        .iter()
        .filter(|diagnostic| diagnostic.code == DiagnosticCode::DoesNotConform)
        .collect();
    assert_eq!(failures.len(), 1);
    assert!(
        !failures[0].notes.is_empty(),
        "不足要件がノートとして列挙される"
    );
}

/// 要件と同じ型のメンバを持つモデルは具象実装で準拠する。
#[test]
fn concrete_member_satisfies_requirement() {
    let mut builder = ProgramBuilder::new();
    builder.core_library();
    let module = builder.module("Main");
    let file = builder.source_file(module, "main.norn");
    let file_scope = builder.scope_of(file);

    let view = builder.view(file, "Measured");
    let requirement = builder.function(view, Name::functional("length", vec![]));
    builder.set_receiver_effect(requirement, AccessEffect::Let);
    let requirement_scope = builder.scope_of(requirement);
    let out = builder.name(requirement_scope, "Int");
    builder.set_output(requirement, out);

    let record = builder.record(file, "Ruler");
    let implementation = builder.function(record, Name::functional("length", vec![]));
    builder.set_receiver_effect(implementation, AccessEffect::Let);
    let implementation_scope = builder.scope_of(implementation);
    let out = builder.name(implementation_scope, "Int");
    builder.set_output(implementation, out);
    let (body, body_scope) = builder.block(implementation_scope);
    let zero = builder.int(body_scope, 0);
    let ret = builder.return_stmt(Some(zero));
    builder.push_stmt(body, ret);
    builder.set_body(implementation, FunctionBody::Block { block: body });

    let conformance = builder.name(file_scope, "Measured");
    builder.add_conformance(record, conformance);

    let program = builder.finish();
    let mut checker = Checker::new(&program, CheckerConfig::default());
    checker.check_all();

    assert!(!checker
        .diagnostics
        .contains_code(DiagnosticCode::DoesNotConform));
    let _ = (view, module);
}

/// ビューでない名前への準拠宣言は not-a-view。
#[test]
fn conformance_to_non_view_is_rejected() {
    let mut builder = ProgramBuilder::new();
    builder.core_library();
    let module = builder.module("Main");
    let file = builder.source_file(module, "main.norn");
    let file_scope = builder.scope_of(file);
    let record = builder.record(file, "T");
    let other = builder.record(file, "NotAView");
    let conformance = builder.name(file_scope, "NotAView");
    builder.add_conformance(record, conformance);
    let _ = (module, other);

    let program = builder.finish();
    let mut checker = Checker::new(&program, CheckerConfig::default());
    checker.check_all();

    assert!(checker.diagnostics.contains_code(DiagnosticCode::NotAView));
}
