use norn_frontend::ast::{BindingIntroducer, FunctionBody, Name, ProgramBuilder};
use norn_frontend::diagnostic::DiagnosticCode;
use norn_frontend::typeck::{Checker, CheckerConfig, FoldedSequence, TypeNode};

fn int_sequence_program(
    operators: &[&str],
) -> (norn_frontend::ast::Program, norn_frontend::ast::ExprId) {
    let mut builder = ProgramBuilder::new();
    builder.core_library();
    let module = builder.module("Main");
    let file = builder.source_file(module, "main.norn");
    let main = builder.function(file, Name::functional("main", vec![]));
    let main_scope = builder.scope_of(main);
    let (block, block_scope) = builder.block(main_scope);

    let head = builder.int(block_scope, 1);
    let mut tail = Vec::new();
    for (index, stem) in operators.iter().enumerate() {
        let operator = builder.infix_operator(block_scope, *stem);
        let operand = builder.int(block_scope, (index + 2) as i64);
        tail.push((operator, operand));
    }
    let sequence = builder.sequence(block_scope, head, tail);
    let pattern = builder.name_pattern("x");
    let binding = builder.binding_in(
        block_scope,
        BindingIntroducer::Let,
        pattern,
        None,
        Some(sequence),
    );
    let stmt = builder.decl_stmt(binding);
    builder.push_stmt(block, stmt);
    builder.set_body(main, FunctionBody::Block { block });
    (builder.finish(), sequence)
}

/// `1 + 2 * 3` は乗算を先に畳む。
#[test]
fn folding_honors_precedence() {
    let (program, sequence) = int_sequence_program(&["+", "*"]);
    let mut checker = Checker::new(&program, CheckerConfig::default());
    checker.check_all();

    let result = checker.finish();
    let folded = result
        .folded_sequences
        .get(&sequence)
        .expect("畳み込み結果が記録される");
    // ルートは + で、右側に 2 * 3 のノードが来る。
    let FoldedSequence::Node { lhs, rhs, .. } = folded else {
        panic!("ルートはノード");
    };
    assert!(matches!(**lhs, FoldedSequence::Leaf { .. }));
    assert!(
        matches!(**rhs, FoldedSequence::Node { .. }),
        "右側に乗算のサブツリーが畳まれる"
    );
    assert!(result.is_clean(), "{:?}", result.diagnostics.iter().collect::<Vec<_>>());
}

/// `1 * 2 + 3` は乗算を左側に畳む。
#[test]
fn folding_is_left_associative_within_same_direction() {
    let (program, sequence) = int_sequence_program(&["*", "+"]);
    let mut checker = Checker::new(&program, CheckerConfig::default());
    checker.check_all();

    let result = checker.finish();
    let folded = result
        .folded_sequences
        .get(&sequence)
        .expect("畳み込み結果が記録される");
    let FoldedSequence::Node { lhs, rhs, .. } = folded else {
        panic!("ルートはノード");
    };
    assert!(
        matches!(**lhs, FoldedSequence::Node { .. }),
        "左側に乗算のサブツリー"
    );
    assert!(matches!(**rhs, FoldedSequence::Leaf { .. }));
}

/// 演算子連鎖は被演算子型のメンバ演算子で型付けされる。
#[test]
fn operator_chain_types_through_member_operators() {
    let (program, sequence) = int_sequence_program(&["+", "*"]);
    let mut checker = Checker::new(&program, CheckerConfig::default());
    checker.check_all();

    let ty = checker.expr_type(sequence).expect("連鎖の型");
    assert!(
        matches!(checker.types.node(ty), TypeNode::Record { .. }),
        "Int + Int * Int は Int に型付けされる"
    );
    let result = checker.finish();
    assert!(result.is_clean());
}

/// 比較演算子は Bool を返す。
#[test]
fn comparison_operators_type_as_bool() {
    let mut builder = ProgramBuilder::new();
    builder.core_library();
    let module = builder.module("Main");
    let file = builder.source_file(module, "main.norn");
    let main = builder.function(file, Name::functional("main", vec![]));
    let main_scope = builder.scope_of(main);
    let (block, block_scope) = builder.block(main_scope);
    let head = builder.int(block_scope, 1);
    let operator = builder.infix_operator(block_scope, "<");
    let operand = builder.int(block_scope, 2);
    let sequence = builder.sequence(block_scope, head, vec![(operator, operand)]);
    let pattern = builder.name_pattern("flag");
    let annotation = builder.name(block_scope, "Bool");
    let binding = builder.binding_in(
        block_scope,
        BindingIntroducer::Let,
        pattern,
        Some(annotation),
        Some(sequence),
    );
    let stmt = builder.decl_stmt(binding);
    builder.push_stmt(block, stmt);
    builder.set_body(main, FunctionBody::Block { block });

    let program = builder.finish();
    let mut checker = Checker::new(&program, CheckerConfig::default());
    checker.check_all();

    let result = checker.finish();
    assert!(result.is_clean(), "{:?}", result.diagnostics.iter().collect::<Vec<_>>());
}

/// 未宣言の演算子は畳み込みを中止して診断する。
#[test]
fn undefined_operator_aborts_folding() {
    let (program, sequence) = int_sequence_program(&["???"]);
    let mut checker = Checker::new(&program, CheckerConfig::default());
    checker.check_all();

    assert!(checker
        .diagnostics
        .contains_code(DiagnosticCode::UndefinedOperator));
    let result = checker.finish();
    assert!(
        !result.folded_sequences.contains_key(&sequence),
        "失敗した畳み込みは記録されない"
    );
}

/// 同一スコープでの演算子の再宣言は診断される。
#[test]
fn duplicate_operator_declaration_is_diagnosed() {
    let mut builder = ProgramBuilder::new();
    builder.core_library();
    let module = builder.module("Main");
    let file = builder.source_file(module, "main.norn");
    builder.operator(
        file,
        norn_frontend::ast::OperatorNotation::Infix,
        "<>",
        Some(norn_frontend::ast::PrecedenceGroup::Comparison),
    );
    builder.operator(
        file,
        norn_frontend::ast::OperatorNotation::Infix,
        "<>",
        Some(norn_frontend::ast::PrecedenceGroup::Comparison),
    );

    let program = builder.finish();
    let mut checker = Checker::new(&program, CheckerConfig::default());
    checker.check_all();

    assert!(checker
        .diagnostics
        .contains_code(DiagnosticCode::DuplicateOperator));
}
