//! 型の間の関係を記録するストア。正準化・等価判定・登録済み準拠・
//! 精緻化閉包を担当する。

use indexmap::{IndexMap, IndexSet};
use serde::Serialize;
use std::sync::{Arc, RwLock};
use thiserror::Error;

use super::types::{GenericArgumentMap, TypeId, TypeNode, TypeStore, TypeTransform};
use crate::ast::{DeclId, Program, ScopeId};
use crate::span::Span;

/// 準拠要件の実装。具象宣言・合成・保留のいずれか。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Implementation {
    Concrete { decl: DeclId },
    Synthesized { synthesized: SynthesizedKind },
    /// 関連型・関連値要件。解決は下流に委ねる。
    Deferred,
}

/// 合成可能な実装の種別。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SynthesizedKind {
    Deinit,
    MoveInit,
    MoveAssign,
    CopyInit,
}

impl SynthesizedKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SynthesizedKind::Deinit => "deinit",
            SynthesizedKind::MoveInit => "move_init",
            SynthesizedKind::MoveAssign => "move_assign",
            SynthesizedKind::CopyInit => "copy_init",
        }
    }
}

/// 条件付き準拠の条件。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConformanceCondition {
    pub subject: TypeId,
    pub view: DeclId,
}

/// 登録済み準拠。モデルは正準型で保持する。
#[derive(Debug, Clone, Serialize)]
pub struct Conformance {
    pub model: TypeId,
    pub view: DeclId,
    pub arguments: GenericArgumentMap,
    pub conditions: Vec<ConformanceCondition>,
    /// 準拠を宣言したソース宣言。
    pub source: DeclId,
    /// 公開スコープ。ファイルスコープの準拠はモジュールスコープへ昇格する。
    pub exposition: ScopeId,
    /// 要件宣言 → 実装。
    pub implementations: IndexMap<DeclId, Implementation>,
    pub site: Span,
}

/// 準拠登録の失敗種別。
#[derive(Debug, Clone, Error)]
pub enum RegistrationError {
    #[error("同じ (モデル, ビュー) 対の準拠が同じ公開スコープに登録済みです")]
    Redundant { existing: Conformance },
}

/// 準拠の可視性判定に必要な文脈。
pub struct VisibilityContext<'a> {
    pub program: &'a Program,
    /// 翻訳単位 → インポート済みモジュール。
    pub imports: &'a IndexMap<DeclId, IndexSet<DeclId>>,
}

impl VisibilityContext<'_> {
    /// `exposition` スコープに登録された準拠が `from` から見えるか。
    fn is_visible(&self, exposition: ScopeId, from: ScopeId) -> bool {
        if self.program.scopes.is_contained_in(from, exposition) {
            return true;
        }
        // 公開モジュールが from の翻訳単位にインポートされていれば見える。
        let Some(exposing_module) = self
            .program
            .scopes
            .introducer(exposition)
            .filter(|decl| self.program.module_containing(exposition) == Some(*decl))
        else {
            return false;
        };
        let Some(unit) = self.program.translation_unit_containing(from) else {
            return false;
        };
        self.imports
            .get(&unit)
            .is_some_and(|imported| imported.contains(&exposing_module))
    }
}

/// 関係ストア本体。チェッカ 1 インスタンスが占有する。
#[derive(Debug, Clone, Default, Serialize)]
pub struct Relations {
    #[serde(skip)]
    canonical_cache: IndexMap<TypeId, TypeId>,
    /// (正準モデル, ビュー宣言) → 登録済み準拠。
    #[serde(skip)]
    conformances: IndexMap<(TypeId, DeclId), Vec<Conformance>>,
    /// ビュー → 直接精緻化するビュー。
    refinements: IndexMap<DeclId, IndexSet<DeclId>>,
}

impl Relations {
    pub fn new() -> Self {
        Self::default()
    }

    // ---- 正準化 ----

    /// 型の正準形を返す。エイリアス展開と引数正規化を行い、結果を
    /// メモ化する。正準化は冪等。
    pub fn canonical(&mut self, store: &mut TypeStore, ty: TypeId) -> TypeId {
        if store.flags(ty).is_canonical() {
            return ty;
        }
        if let Some(cached) = self.canonical_cache.get(&ty) {
            return *cached;
        }
        let canonical = store.transform(ty, &mut |store, current| {
            if store.flags(current).is_canonical() {
                return TypeTransform::Replace(current);
            }
            if let TypeNode::Alias { aliasee, .. } = store.node(current) {
                let aliasee = *aliasee;
                let expanded = self.canonical(store, aliasee);
                return TypeTransform::Replace(expanded);
            }
            TypeTransform::Recurse
        });
        self.canonical_cache.insert(ty, canonical);
        canonical
    }

    /// 正準形同士の等価判定。
    pub fn are_equivalent(&mut self, store: &mut TypeStore, lhs: TypeId, rhs: TypeId) -> bool {
        self.canonical(store, lhs) == self.canonical(store, rhs)
    }

    // ---- 精緻化 ----

    /// `view` が `base` を精緻化することを登録する。
    pub fn register_refinement(&mut self, view: DeclId, base: DeclId) {
        self.refinements.entry(view).or_default().insert(base);
    }

    /// 精緻化閉包（自分自身は含まない）。
    pub fn refinement_closure(&self, view: DeclId) -> IndexSet<DeclId> {
        let mut closure = IndexSet::new();
        let mut work = vec![view];
        while let Some(current) = work.pop() {
            if let Some(bases) = self.refinements.get(&current) {
                for base in bases {
                    if closure.insert(*base) {
                        work.push(*base);
                    }
                }
            }
        }
        closure
    }

    // ---- 準拠 ----

    /// 準拠を登録する。同一 (モデル, ビュー) 対に対し、同じ公開スコープ
    /// への二重登録は拒否して既存エントリを返す。
    pub fn insert_conformance(
        &mut self,
        store: &mut TypeStore,
        mut conformance: Conformance,
    ) -> Result<(), RegistrationError> {
        conformance.model = self.canonical(store, conformance.model);
        let key = (conformance.model, conformance.view);
        let entries = self.conformances.entry(key).or_default();
        if let Some(existing) = entries
            .iter()
            .find(|existing| existing.exposition == conformance.exposition)
        {
            return Err(RegistrationError::Redundant {
                existing: existing.clone(),
            });
        }
        entries.push(conformance);
        Ok(())
    }

    /// 指定スコープから見える準拠を探す。
    pub fn conformance(
        &mut self,
        store: &mut TypeStore,
        context: &VisibilityContext<'_>,
        model: TypeId,
        view: DeclId,
        from: ScopeId,
    ) -> Option<&Conformance> {
        let model = self.canonical(store, model);
        let entries = self.conformances.get(&(model, view))?;
        entries
            .iter()
            .find(|conformance| context.is_visible(conformance.exposition, from))
    }

    /// モデルが準拠する全ビュー（精緻化閉包込み）。
    pub fn conformed_views(&mut self, store: &mut TypeStore, model: TypeId) -> IndexSet<DeclId> {
        let model = self.canonical(store, model);
        let mut views = IndexSet::new();
        for ((conforming_model, view), entries) in &self.conformances {
            if *conforming_model == model && !entries.is_empty() {
                views.insert(*view);
            }
        }
        let direct: Vec<DeclId> = views.iter().copied().collect();
        for view in direct {
            views.extend(self.refinement_closure(view));
        }
        views
    }

    /// モデルの (ビュー, 準拠) 一覧。挿入順。
    pub fn conformances_of(
        &mut self,
        store: &mut TypeStore,
        model: TypeId,
    ) -> Vec<&Conformance> {
        let model = self.canonical(store, model);
        self.conformances
            .iter()
            .filter(|((conforming_model, _), _)| *conforming_model == model)
            .flat_map(|(_, entries)| entries.iter())
            .collect()
    }

    pub fn conformance_count(&self) -> usize {
        self.conformances.values().map(Vec::len).sum()
    }
}

/// 検査完了後の関係ストアを複数ワーカから参照するための共有ラッパ。
/// 検査中はチェッカが占有し、完了後にのみ共有する。
#[derive(Debug, Clone)]
pub struct SharedRelations {
    inner: Arc<RwLock<Relations>>,
}

impl SharedRelations {
    pub fn new(relations: Relations) -> Self {
        Self {
            inner: Arc::new(RwLock::new(relations)),
        }
    }

    /// 読み取りアクセス。
    pub fn read<R>(&self, f: impl FnOnce(&Relations) -> R) -> R {
        let guard = self.inner.read().unwrap_or_else(|e| e.into_inner());
        f(&guard)
    }

    /// 書き込みアクセス。下流が補助情報を足す場合に使う。
    pub fn modify<R>(&self, f: impl FnOnce(&mut Relations) -> R) -> R {
        let mut guard = self.inner.write().unwrap_or_else(|e| e.into_inner());
        f(&mut guard)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonicalization_is_idempotent() {
        let mut store = TypeStore::new();
        let mut relations = Relations::new();
        let record = store.record(DeclId(1));
        let alias = store.alias(DeclId(2), record);
        let outer = store.alias(DeclId(3), alias);

        let canonical = relations.canonical(&mut store, outer);
        assert_eq!(canonical, record);
        assert_eq!(
            relations.canonical(&mut store, canonical),
            canonical,
            "正準化は冪等"
        );
    }

    #[test]
    fn alias_expansion_reaches_nested_positions() {
        let mut store = TypeStore::new();
        let mut relations = Relations::new();
        let record = store.record(DeclId(1));
        let alias = store.alias(DeclId(2), record);
        let metatype = store.metatype(alias);

        let canonical = relations.canonical(&mut store, metatype);
        let expected = store.metatype(record);
        assert_eq!(canonical, expected);
        assert!(store.flags(canonical).is_canonical());
    }

    #[test]
    fn refinement_closure_is_transitive() {
        let mut relations = Relations::new();
        // C は B を、B は A を精緻化する。
        relations.register_refinement(DeclId(3), DeclId(2));
        relations.register_refinement(DeclId(2), DeclId(1));
        let closure = relations.refinement_closure(DeclId(3));
        assert!(closure.contains(&DeclId(2)));
        assert!(closure.contains(&DeclId(1)));
        assert!(!closure.contains(&DeclId(3)));
    }

    #[test]
    fn duplicate_conformance_in_same_scope_is_rejected() {
        let mut store = TypeStore::new();
        let mut relations = Relations::new();
        let model = store.record(DeclId(1));
        let make = |exposition: ScopeId| Conformance {
            model,
            view: DeclId(2),
            arguments: GenericArgumentMap::new(),
            conditions: Vec::new(),
            source: DeclId(3),
            exposition,
            implementations: IndexMap::new(),
            site: Span::new(0, 1),
        };
        assert!(relations
            .insert_conformance(&mut store, make(ScopeId(1)))
            .is_ok());
        assert!(
            relations
                .insert_conformance(&mut store, make(ScopeId(1)))
                .is_err(),
            "同一公開スコープへの再登録は拒否される"
        );
        assert!(
            relations
                .insert_conformance(&mut store, make(ScopeId(2)))
                .is_ok(),
            "別スコープへの登録は許される"
        );
    }
}
