//! Symbol table with nested scopes
//!
//! Symbols live in one append-only arena and are addressed by [`SymbolId`];
//! scopes form a tree addressed by [`ScopeId`]. Neither is ever removed or
//! renumbered. Duplicate names are the caller's business.

use super::symbol::{func_name_key, Symbol, SymbolKind};
use crate::types::{ClassChain, ClassRegistry};
use serde::Serialize;
use std::collections::BTreeMap;

/// Unique identifier for a scope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ScopeId(pub usize);

/// Unique identifier for a symbol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SymbolId(pub usize);

impl ScopeId {
    pub const ROOT: ScopeId = ScopeId(0);
}

/// A scope containing symbols
#[derive(Debug, Serialize)]
pub struct Scope {
    pub parent: Option<ScopeId>,
    pub symbols: BTreeMap<String, SymbolId>,
}

/// Symbol table with nested scopes
#[derive(Debug, Serialize)]
pub struct SymbolTable {
    scopes: Vec<Scope>,
    symbols: Vec<Symbol>,
    #[serde(skip)]
    current: ScopeId,
    #[serde(skip)]
    class_count: usize,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self {
            scopes: vec![Scope { parent: None, symbols: BTreeMap::new() }],
            symbols: Vec::new(),
            current: ScopeId::ROOT,
            class_count: 0,
        }
    }

    // ==================== Scopes ====================

    /// Create a child scope without entering it
    pub fn create_scope(&mut self, parent: ScopeId) -> ScopeId {
        let id = ScopeId(self.scopes.len());
        self.scopes.push(Scope { parent: Some(parent), symbols: BTreeMap::new() });
        id
    }

    pub fn enter(&mut self, scope: ScopeId) {
        debug_assert!(scope.0 < self.scopes.len());
        self.current = scope;
    }

    pub fn current(&self) -> ScopeId {
        self.current
    }

    pub fn reset_to_root(&mut self) {
        self.current = ScopeId::ROOT;
    }

    pub fn parent(&self, scope: ScopeId) -> Option<ScopeId> {
        self.scopes[scope.0].parent
    }

    /// Re-parent a scope; used to hang a class scope under its superclass
    pub fn link_scope_to_parent(&mut self, scope: ScopeId, new_parent: ScopeId) {
        debug_assert_ne!(scope, ScopeId::ROOT);
        self.scopes[scope.0].parent = Some(new_parent);
    }

    // ==================== Symbols ====================

    /// Define a symbol in `scope`, replacing any same-named entry there
    pub fn declare(&mut self, scope: ScopeId, mut symbol: Symbol) -> SymbolId {
        let id = SymbolId(self.symbols.len());
        symbol.id = id;
        symbol.belongs_to = scope;
        if let SymbolKind::Class(class) = &mut symbol.kind {
            self.class_count += 1;
            class.runtime_id = self.class_count;
        }
        self.scopes[scope.0].symbols.insert(symbol.name.clone(), id);
        self.symbols.push(symbol);
        id
    }

    pub fn get(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id.0]
    }

    pub fn get_mut(&mut self, id: SymbolId) -> &mut Symbol {
        &mut self.symbols[id.0]
    }

    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }

    /// Number of class symbols; runtime ids run from 1 to this
    pub fn class_count(&self) -> usize {
        self.class_count
    }

    /// Look up a symbol only in `scope`
    pub fn lookup_local(&self, scope: ScopeId, name: &str) -> Option<SymbolId> {
        self.scopes[scope.0].symbols.get(name).copied()
    }

    /// Look up a symbol, searching from `scope` upward
    pub fn lookup_chain(&self, scope: ScopeId, name: &str) -> Option<SymbolId> {
        let mut scope_id = Some(scope);
        while let Some(id) = scope_id {
            if let Some(symbol) = self.scopes[id.0].symbols.get(name) {
                return Some(*symbol);
            }
            scope_id = self.scopes[id.0].parent;
        }
        None
    }

    pub fn lookup_root(&self, name: &str) -> Option<SymbolId> {
        self.lookup_local(ScopeId::ROOT, name)
    }

    /// All functions named `name` visible from `scope`. Method overload sets
    /// are followed outward through superclass scopes and the walk stops at
    /// the first set of the other kind.
    pub fn collect_overload_set(&self, scope: ScopeId, name: &str) -> Vec<SymbolId> {
        let key = func_name_key(name);
        let mut found = Vec::new();
        let mut from = Some(scope);
        while let Some(start) = from {
            let Some(id) = self.lookup_chain(start, &key) else {
                break;
            };
            let symbol = self.get(id);
            let SymbolKind::FunctionName(set) = &symbol.kind else {
                debug_assert!(false, "'{}' is not an overload set", symbol.name);
                break;
            };
            if !found.is_empty() && !set.is_for_methods {
                break;
            }
            found.extend(set.belonging_functions.iter().copied());
            if !set.is_for_methods {
                break;
            }
            from = self.parent(symbol.belongs_to);
        }
        found
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ClassRegistry for SymbolTable {
    fn class_by_signature(&self, signature: &str) -> Option<SymbolId> {
        let id = self.lookup_root(signature)?;
        self.get(id).as_class().map(|_| id)
    }

    fn class_chain(&self, id: SymbolId) -> Option<ClassChain> {
        let class = self.symbols.get(id.0)?.as_class()?;
        Some(ClassChain {
            name: class.display_name.clone(),
            depth: class.depth?,
            upper_class: class.upper_class,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::semantic::symbol::{ClassInfo, FunctionNameInfo, VariableInfo, VariableKind, VariableStatus};
    use crate::utils::Span;
    use pretty_assertions::assert_eq;

    fn variable(name: &str) -> Symbol {
        Symbol::new(
            name,
            Span::dummy(),
            SymbolKind::Variable(VariableInfo::new(VariableKind::Local, VariableStatus::FinishedInit)),
        )
    }

    fn overloads(name: &str, is_for_methods: bool, functions: &[usize]) -> Symbol {
        Symbol::new(
            func_name_key(name),
            Span::dummy(),
            SymbolKind::FunctionName(FunctionNameInfo {
                is_for_methods,
                belonging_functions: functions.iter().map(|id| SymbolId(*id)).collect(),
            }),
        )
    }

    #[test]
    fn test_scope_chain_lookup() {
        let mut table = SymbolTable::new();
        let x = table.declare(ScopeId::ROOT, variable("x"));
        let inner = table.create_scope(ScopeId::ROOT);
        let shadow = table.declare(inner, variable("x"));

        assert_eq!(table.lookup_chain(inner, "x"), Some(shadow));
        assert_eq!(table.lookup_chain(ScopeId::ROOT, "x"), Some(x));
        assert_eq!(table.lookup_local(inner, "y"), None);
        assert_eq!(table.get(shadow).belongs_to, inner);

        table.enter(inner);
        assert_eq!(table.current(), inner);
        table.reset_to_root();
        assert_eq!(table.current(), ScopeId::ROOT);
    }

    #[test]
    fn test_runtime_ids_are_dense() {
        let mut table = SymbolTable::new();
        table.declare(ScopeId::ROOT, variable("a"));
        let scope_a = table.create_scope(ScopeId::ROOT);
        let a = table.declare(ScopeId::ROOT, Symbol::new("A<>", Span::dummy(), SymbolKind::Class(ClassInfo::new("A", false, scope_a))));
        table.declare(ScopeId::ROOT, variable("b"));
        let scope_b = table.create_scope(ScopeId::ROOT);
        let b = table.declare(ScopeId::ROOT, Symbol::new("B<>", Span::dummy(), SymbolKind::Class(ClassInfo::new("B", false, scope_b))));

        assert_eq!(table.get(a).as_class().map(|c| c.runtime_id), Some(1));
        assert_eq!(table.get(b).as_class().map(|c| c.runtime_id), Some(2));
        assert_eq!(table.class_count(), 2);
        assert_eq!(table.class_by_signature("B<>"), Some(b));
        assert_eq!(table.class_by_signature("a"), None);
    }

    #[test]
    fn test_collect_overload_set_follows_class_scopes() {
        let mut table = SymbolTable::new();
        table.declare(ScopeId::ROOT, overloads("speak", false, &[100]));
        let base = table.create_scope(ScopeId::ROOT);
        table.declare(base, overloads("speak", true, &[1, 2]));
        let derived = table.create_scope(ScopeId::ROOT);
        table.declare(derived, overloads("speak", true, &[3]));
        let method_body = table.create_scope(derived);

        // Before re-parenting the derived class only sees its own methods
        assert_eq!(table.collect_overload_set(method_body, "speak"), vec![SymbolId(3)]);

        table.link_scope_to_parent(derived, base);
        assert_eq!(
            table.collect_overload_set(method_body, "speak"),
            vec![SymbolId(3), SymbolId(1), SymbolId(2)]
        );
        assert_eq!(table.collect_overload_set(ScopeId::ROOT, "speak"), vec![SymbolId(100)]);
        assert!(table.collect_overload_set(ScopeId::ROOT, "missing").is_empty());
    }
}
