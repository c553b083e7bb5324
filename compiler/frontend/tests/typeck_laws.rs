use norn_frontend::ast::{DeclId, ProgramBuilder};
use norn_frontend::span::Span;
use norn_frontend::typeck::{
    Checker, CheckerConfig, Constraint, ConstraintOrigin, GenericArgument, OriginKind, Relations,
    SharedRelations, TypeStore,
};

/// 正準化は冪等。
#[test]
fn canonicalization_is_idempotent() {
    let mut store = TypeStore::new();
    let mut relations = Relations::new();
    let record = store.record(DeclId(0));
    let alias = store.alias(DeclId(1), record);
    let sum = store.sum(vec![alias, record]);

    let canonical = relations.canonical(&mut store, sum);
    assert_eq!(relations.canonical(&mut store, canonical), canonical);
    assert_eq!(canonical, record, "エイリアス展開後に直和は 1 要素へ潰れる");
}

/// ドメインが交わらない特殊化は合成できる。
#[test]
fn specialization_composes_when_domains_are_disjoint() {
    let mut store = TypeStore::new();
    let param_a = DeclId(10);
    let param_b = DeclId(11);
    let generic_a = store.generic_param(param_a);
    let generic_b = store.generic_param(param_b);
    let pair = store.tuple(vec![
        norn_frontend::typeck::TupleElement {
            label: None,
            ty: generic_a,
        },
        norn_frontend::typeck::TupleElement {
            label: None,
            ty: generic_b,
        },
    ]);
    let int_like = store.record(DeclId(20));
    let bool_like = store.record(DeclId(21));

    let mut first = norn_frontend::typeck::GenericArgumentMap::new();
    first.insert(param_a, GenericArgument::Type { ty: int_like });
    let mut second = norn_frontend::typeck::GenericArgumentMap::new();
    second.insert(param_b, GenericArgument::Type { ty: bool_like });

    let step_by_step = {
        let intermediate = store.specialize(pair, &first);
        store.specialize(intermediate, &second)
    };
    let composed = {
        let mut union = first.clone();
        union.extend(second.clone());
        store.specialize(pair, &union)
    };
    assert_eq!(step_by_step, composed);
}

/// 常に充足可能な制約を足しても最良スコアは悪化しない。
#[test]
fn solving_is_monotone_under_satisfiable_extension() {
    let mut builder = ProgramBuilder::new();
    builder.core_library();
    builder.module("Main");
    let program = builder.finish();

    let mut checker = Checker::new(&program, CheckerConfig::default());
    let int_like = checker.types.record(DeclId(0));
    let origin = ConstraintOrigin::new(Span::new(0, 1), OriginKind::Structural);

    let base = vec![Constraint::equality(int_like, int_like, origin)];
    let baseline = checker.solve_constraints(base.clone());

    let mut extended = base;
    extended.push(Constraint::equality(int_like, int_like, origin));
    let extended_solution = checker.solve_constraints(extended);

    assert!(extended_solution.score <= baseline.score);
    assert!(baseline.is_sound && extended_solution.is_sound);
}

/// 完了後の関係ストアは共有ラッパ越しに並行読み出しできる。
#[test]
fn shared_relations_supports_concurrent_readers() {
    let mut store = TypeStore::new();
    let mut relations = Relations::new();
    relations.register_refinement(DeclId(2), DeclId(1));
    let record = store.record(DeclId(0));
    let canonical = relations.canonical(&mut store, record);
    assert_eq!(canonical, record);

    let shared = SharedRelations::new(relations);
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let shared = shared.clone();
            std::thread::spawn(move || {
                shared.read(|relations| {
                    relations.refinement_closure(DeclId(2)).contains(&DeclId(1))
                })
            })
        })
        .collect();
    for handle in handles {
        assert!(handle.join().expect("リーダは成功する"));
    }
}
