//! レキシカルスコープ木。包含関係と外側スコープの問い合わせに答える。

use indexmap::IndexMap;
use serde::Serialize;
use std::fmt;

use super::DeclId;

/// スコープの識別子。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ScopeId(pub u32);

impl ScopeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

/// 1 スコープ分のデータ。`decls` は宣言順を保持する。
#[derive(Debug, Clone, Serialize)]
pub struct ScopeData {
    pub parent: Option<ScopeId>,
    /// このスコープを導入した宣言。ルートスコープのみ `None`。
    pub introducer: Option<DeclId>,
    pub decls: Vec<DeclId>,
}

/// スコープ木。ルートは常に `ScopeId(0)`。
#[derive(Debug, Clone, Serialize)]
pub struct ScopeTree {
    scopes: Vec<ScopeData>,
    introduced: IndexMap<DeclId, ScopeId>,
}

impl Default for ScopeTree {
    fn default() -> Self {
        Self::new()
    }
}

impl ScopeTree {
    pub fn new() -> Self {
        Self {
            scopes: vec![ScopeData {
                parent: None,
                introducer: None,
                decls: Vec::new(),
            }],
            introduced: IndexMap::new(),
        }
    }

    pub fn root() -> ScopeId {
        ScopeId(0)
    }

    /// 新しい子スコープを追加する。
    pub fn push(&mut self, parent: ScopeId, introducer: Option<DeclId>) -> ScopeId {
        let id = ScopeId(self.scopes.len() as u32);
        self.scopes.push(ScopeData {
            parent: Some(parent),
            introducer,
            decls: Vec::new(),
        });
        if let Some(decl) = introducer {
            self.introduced.insert(decl, id);
        }
        id
    }

    /// スコープに宣言を追加する。宣言順はそのまま探索順になる。
    pub fn declare(&mut self, scope: ScopeId, decl: DeclId) {
        self.scopes[scope.index()].decls.push(decl);
    }

    pub fn parent(&self, scope: ScopeId) -> Option<ScopeId> {
        self.scopes[scope.index()].parent
    }

    pub fn introducer(&self, scope: ScopeId) -> Option<DeclId> {
        self.scopes[scope.index()].introducer
    }

    pub fn decls(&self, scope: ScopeId) -> &[DeclId] {
        &self.scopes[scope.index()].decls
    }

    pub fn scope_introduced_by(&self, decl: DeclId) -> Option<ScopeId> {
        self.introduced.get(&decl).copied()
    }

    /// 自分自身を含め、外側に向かってスコープを列挙する。
    pub fn ancestors_inclusive(&self, scope: ScopeId) -> impl Iterator<Item = ScopeId> + '_ {
        let mut current = Some(scope);
        std::iter::from_fn(move || {
            let found = current?;
            current = self.parent(found);
            Some(found)
        })
    }

    /// `inner` が `outer` に（自分自身も含めて）包含されるかどうか。
    pub fn is_contained_in(&self, inner: ScopeId, outer: ScopeId) -> bool {
        self.ancestors_inclusive(inner).any(|s| s == outer)
    }

    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ancestors_walk_outward_from_innermost() {
        let mut tree = ScopeTree::new();
        let module = tree.push(ScopeTree::root(), Some(DeclId(0)));
        let function = tree.push(module, Some(DeclId(1)));
        let block = tree.push(function, None);

        let chain: Vec<_> = tree.ancestors_inclusive(block).collect();
        assert_eq!(chain, vec![block, function, module, ScopeTree::root()]);
    }

    #[test]
    fn containment_is_reflexive_and_transitive() {
        let mut tree = ScopeTree::new();
        let module = tree.push(ScopeTree::root(), Some(DeclId(0)));
        let inner = tree.push(module, None);

        assert!(tree.is_contained_in(inner, inner), "自己包含が成り立つ");
        assert!(tree.is_contained_in(inner, module));
        assert!(tree.is_contained_in(inner, ScopeTree::root()));
        assert!(!tree.is_contained_in(module, inner));
    }
}
