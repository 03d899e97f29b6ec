//! Scoped symbol table: a stack of maps supporting nested lexical scopes.
//!
//! Used both by the expression code generator (mapping local names to stack offsets) and, via
//! cloning the top scope, by semantic environment propagation: a child class's
//! environment starts life as a shallow copy of its parent's innermost scope.

use indexmap::IndexMap;
use std::hash::Hash;

/// A stack of maps. `enter_scope` pushes a fresh, empty map; `exit_scope` pops it. Lookup
/// walks from the innermost scope outward, so an inner binding shadows an outer one of the
/// same name.
#[derive(Debug, Clone)]
pub struct SymbolTable<K, V> {
    scopes: Vec<IndexMap<K, V>>,
}

impl<K, V> Default for SymbolTable<K, V> {
    fn default() -> Self {
        Self { scopes: vec![IndexMap::new()] }
    }
}

impl<K, V> SymbolTable<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enter_scope(&mut self) {
        self.scopes.push(IndexMap::new());
    }

    pub fn exit_scope(&mut self) {
        self.scopes.pop();
        assert!(!self.scopes.is_empty(), "exit_scope popped the base scope");
    }

    /// Binds `key` to `value` in the innermost scope, shadowing any outer binding.
    pub fn add(&mut self, key: K, value: V) {
        self.scopes
            .last_mut()
            .expect("symbol table always has at least one scope")
            .insert(key, value);
    }

    /// Looks up `key` from the innermost scope outward.
    pub fn lookup(&self, key: &K) -> Option<&V> {
        for scope in self.scopes.iter().rev() {
            if let Some(v) = scope.get(key) {
                return Some(v);
            }
        }
        None
    }

    /// True if `key` is bound in the *innermost* scope only (used to detect same-class
    /// redeclaration as distinct from shadowing an ancestor's binding).
    pub fn declared_in_current_scope(&self, key: &K) -> bool {
        self.scopes
            .last()
            .expect("symbol table always has at least one scope")
            .contains_key(key)
    }

    /// A shallow clone of the innermost scope, as a fresh single-scope table. This is how
    /// environment propagation seeds a child class's table from its parent's.
    pub fn clone_top_scope(&self) -> Self {
        let top = self
            .scopes
            .last()
            .expect("symbol table always has at least one scope")
            .clone();
        Self { scopes: vec![top] }
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }
}

#[cfg(test)]
mod symbol_table_tests {
    use super::*;

    #[test]
    fn shadowing_in_inner_scope_hides_outer_binding() {
        let mut t: SymbolTable<&str, i32> = SymbolTable::new();
        t.add("x", 1);
        t.enter_scope();
        t.add("x", 2);
        assert_eq!(t.lookup(&"x"), Some(&2));
        t.exit_scope();
        assert_eq!(t.lookup(&"x"), Some(&1));
    }

    #[test]
    fn declared_in_current_scope_distinguishes_shadow_from_fresh() {
        let mut t: SymbolTable<&str, i32> = SymbolTable::new();
        t.add("x", 1);
        t.enter_scope();
        assert!(!t.declared_in_current_scope(&"x"));
        t.add("x", 2);
        assert!(t.declared_in_current_scope(&"x"));
    }

    #[test]
    fn clone_top_scope_is_independent_of_original() {
        let mut t: SymbolTable<&str, i32> = SymbolTable::new();
        t.add("x", 1);
        let mut cloned = t.clone_top_scope();
        cloned.add("y", 2);
        assert_eq!(t.lookup(&"y"), None);
        assert_eq!(cloned.lookup(&"x"), Some(&1));
        assert_eq!(cloned.lookup(&"y"), Some(&2));
    }

    #[test]
    fn lookup_misses_return_none() {
        let t: SymbolTable<&str, i32> = SymbolTable::new();
        assert_eq!(t.lookup(&"missing"), None);
    }
}
