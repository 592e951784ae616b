//! The symbol pool and the fresh-symbol factory.
//!
//! The verifier works over an infinite supply of symbols. First-order
//! symbols denote a single value of some sort; second-order symbols denote
//! a set of data values — the *flow* of a heap cell. Declarations live in a
//! process-wide [`SymbolPool`] that only ever grows: freshness is cheap and
//! symbols are never collected.
//!
//! A [`SymbolFactory`] is a thin view over a pool plus an *avoid-set*. Every
//! symbol it hands out is outside the avoid-set and distinct from every
//! symbol it handed out before; callers fold context symbols in through
//! [`SymbolFactory::avoid_all`] before requesting fresh ones.
//!
//! ## Example
//!
//! ```
//! use keyflow_language::Sort;
//! use keyflow_logic::symbols::{SymbolFactory, SymbolPool};
//!
//! let mut pool = SymbolPool::new();
//! let mut factory = SymbolFactory::new(&mut pool);
//!
//! let a = factory.fresh_value(Sort::Ptr);
//! let f = factory.fresh_flow();
//! assert_ne!(a, f);
//! assert_eq!(pool.sort(a), Some(Sort::Ptr));
//! assert!(pool.is_flow(f));
//! ```

use std::collections::BTreeSet;
use std::fmt;

use keyflow_language::Sort;

/// What a symbol denotes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    /// First-order: a single value of the given sort.
    Value(Sort),
    /// Second-order: a set of data values (an inflow).
    Flow,
}

/// Handle to a declaration in a [`SymbolPool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SymbolId(u32);

impl SymbolId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for SymbolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

/// The arena of symbol declarations.
#[derive(Debug, Clone, Default)]
pub struct SymbolPool {
    kinds: Vec<SymbolKind>,
}

impl SymbolPool {
    pub fn new() -> Self {
        SymbolPool { kinds: Vec::new() }
    }

    fn allocate(&mut self, kind: SymbolKind) -> SymbolId {
        let id = SymbolId(self.kinds.len() as u32);
        self.kinds.push(kind);
        id
    }

    pub fn kind(&self, id: SymbolId) -> SymbolKind {
        self.kinds[id.index()]
    }

    /// The sort of a first-order symbol, `None` for flow symbols.
    pub fn sort(&self, id: SymbolId) -> Option<Sort> {
        match self.kind(id) {
            SymbolKind::Value(sort) => Some(sort),
            SymbolKind::Flow => None,
        }
    }

    pub fn is_flow(&self, id: SymbolId) -> bool {
        matches!(self.kind(id), SymbolKind::Flow)
    }

    /// Number of declarations ever made.
    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }

    /// A display name for a symbol: `v<i>` for values, `F<i>` for flows.
    pub fn name(&self, id: SymbolId) -> String {
        match self.kind(id) {
            SymbolKind::Value(_) => format!("v{}", id.0),
            SymbolKind::Flow => format!("F{}", id.0),
        }
    }
}

/// Source of fresh symbols with an avoid-set.
pub struct SymbolFactory<'p> {
    pool: &'p mut SymbolPool,
    avoid: BTreeSet<SymbolId>,
}

impl<'p> SymbolFactory<'p> {
    pub fn new(pool: &'p mut SymbolPool) -> Self {
        SymbolFactory {
            pool,
            avoid: BTreeSet::new(),
        }
    }

    /// Creates a factory whose avoid-set is pre-seeded.
    pub fn avoiding(pool: &'p mut SymbolPool, avoid: impl IntoIterator<Item = SymbolId>) -> Self {
        SymbolFactory {
            pool,
            avoid: avoid.into_iter().collect(),
        }
    }

    /// Adds a symbol to the avoid-set.
    pub fn avoid(&mut self, id: SymbolId) {
        self.avoid.insert(id);
    }

    /// Folds a collection of symbols into the avoid-set.
    pub fn avoid_all(&mut self, ids: impl IntoIterator<Item = SymbolId>) {
        self.avoid.extend(ids);
    }

    /// `true` if the symbol is in the avoid-set.
    pub fn is_avoided(&self, id: SymbolId) -> bool {
        self.avoid.contains(&id)
    }

    /// A fresh first-order symbol of the given sort.
    pub fn fresh_value(&mut self, sort: Sort) -> SymbolId {
        self.fresh(SymbolKind::Value(sort))
    }

    /// A fresh second-order (flow) symbol.
    pub fn fresh_flow(&mut self) -> SymbolId {
        self.fresh(SymbolKind::Flow)
    }

    /// A fresh symbol of the same kind as an existing one.
    pub fn fresh_like(&mut self, id: SymbolId) -> SymbolId {
        let kind = self.pool.kind(id);
        self.fresh(kind)
    }

    fn fresh(&mut self, kind: SymbolKind) -> SymbolId {
        loop {
            let id = self.pool.allocate(kind);
            if self.avoid.insert(id) {
                return id;
            }
        }
    }

    pub fn pool(&self) -> &SymbolPool {
        self.pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_symbols_are_distinct() {
        let mut pool = SymbolPool::new();
        let mut factory = SymbolFactory::new(&mut pool);
        let a = factory.fresh_value(Sort::Data);
        let b = factory.fresh_value(Sort::Data);
        let f = factory.fresh_flow();
        assert_ne!(a, b);
        assert_ne!(a, f);
        assert_ne!(b, f);
    }

    #[test]
    fn fresh_symbols_dodge_the_avoid_set() {
        let mut pool = SymbolPool::new();
        let existing = {
            let mut factory = SymbolFactory::new(&mut pool);
            factory.fresh_value(Sort::Ptr)
        };
        let mut factory = SymbolFactory::avoiding(&mut pool, [existing]);
        let fresh = factory.fresh_value(Sort::Ptr);
        assert_ne!(fresh, existing);
    }

    #[test]
    fn kinds_are_recorded() {
        let mut pool = SymbolPool::new();
        let mut factory = SymbolFactory::new(&mut pool);
        let v = factory.fresh_value(Sort::Bool);
        let f = factory.fresh_flow();
        assert_eq!(pool.sort(v), Some(Sort::Bool));
        assert_eq!(pool.sort(f), None);
        assert!(pool.is_flow(f));
    }

    #[test]
    fn names_distinguish_orders() {
        let mut pool = SymbolPool::new();
        let mut factory = SymbolFactory::new(&mut pool);
        let v = factory.fresh_value(Sort::Data);
        let f = factory.fresh_flow();
        assert!(pool.name(v).starts_with('v'));
        assert!(pool.name(f).starts_with('F'));
    }

    #[test]
    fn fresh_like_preserves_kind() {
        let mut pool = SymbolPool::new();
        let mut factory = SymbolFactory::new(&mut pool);
        let f = factory.fresh_flow();
        let g = factory.fresh_like(f);
        assert!(pool.is_flow(g));
    }
}
