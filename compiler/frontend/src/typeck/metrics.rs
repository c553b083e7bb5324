use indexmap::IndexMap;
use serde::Serialize;

/// セマンティック検査で収集する基本メトリクス。
#[derive(Debug, Clone, Default, Serialize)]
pub struct CheckerMetrics {
    pub realized_decls: usize,
    pub checked_decls: usize,
    pub constraints_total: usize,
    pub constraint_breakdown: IndexMap<String, usize>,
    pub unify_calls: usize,
    pub solver_forks: usize,
    pub member_lookups: usize,
    pub memoized_lookups: usize,
    pub synthesized_decls: usize,
}

impl CheckerMetrics {
    pub fn record_realized_decl(&mut self) {
        self.realized_decls += 1;
    }

    pub fn record_checked_decl(&mut self) {
        self.checked_decls += 1;
    }

    pub fn record_constraint(&mut self, key: impl Into<String>) {
        let key = key.into();
        self.constraints_total += 1;
        *self.constraint_breakdown.entry(key).or_insert(0) += 1;
    }

    pub fn record_unify_call(&mut self) {
        self.unify_calls += 1;
    }

    pub fn record_solver_fork(&mut self) {
        self.solver_forks += 1;
    }

    pub fn record_member_lookup(&mut self) {
        self.member_lookups += 1;
    }

    pub fn record_memoized_lookup(&mut self) {
        self.memoized_lookups += 1;
    }

    pub fn record_synthesized_decl(&mut self) {
        self.synthesized_decls += 1;
    }
}
