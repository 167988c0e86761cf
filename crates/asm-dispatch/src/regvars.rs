//! `.regvar`/`.reg` name bookkeeping (`spec.md` §4.F "regvar declarations").
//!
//! `asm_symtab::Scope` carries a `regvars` field but the symbol table
//! exposes no accessor for it (it only manages name -> value bindings), so
//! the dispatcher keeps its own scoped name table here, the same way it
//! owns the `RegVarTable` (allocator-facing decl list) and `RegVarDeps`
//! (allocator-facing dependency edges) built up while scanning `.regvar`
//! directives and instruction operands.

use std::collections::HashMap;

use asm_regalloc::RegVarDeps;
use asm_symtab::{RegVarId, ScopeId};

#[derive(Debug, Default)]
pub struct RegVarNames {
    next_id: u32,
    by_scope: HashMap<ScopeId, HashMap<String, RegVarId>>,
}

impl RegVarNames {
    pub fn new() -> Self {
        Self::default()
    }

    fn fresh_id(&mut self) -> RegVarId {
        let id = RegVarId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Look up `name` in `scope` only (no parent-chain walk: regvars are
    /// scope-local by `spec.md` §4.F, unlike ordinary symbols).
    pub fn lookup(&self, scope: ScopeId, name: &str) -> Option<RegVarId> {
        self.by_scope.get(&scope)?.get(name).copied()
    }

    /// Declare a new regvar in `scope`, or return the existing id if the
    /// name is already bound there (re-declaration with the same shape is
    /// tolerated; the caller reports a diagnostic if the shape differs).
    pub fn declare(&mut self, scope: ScopeId, name: &str) -> (RegVarId, bool) {
        if let Some(existing) = self.lookup(scope, name) {
            return (existing, false);
        }
        let id = self.fresh_id();
        self.by_scope
            .entry(scope)
            .or_default()
            .insert(name.to_string(), id);
        (id, true)
    }
}

/// Accumulates `equal_to`/`linear` edges as instructions and `.regvar`
/// aliases are scanned, for a single handoff to `asm_regalloc::Allocator`
/// once a section is complete.
#[derive(Debug, Default)]
pub struct DepsBuilder {
    deps: RegVarDeps,
}

impl DepsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn equal_to(&mut self, a: RegVarId, b: RegVarId) {
        self.deps.equal_to.push((a, b));
    }

    pub fn linear(&mut self, dep: asm_regalloc::LinearDep) {
        self.deps.linear.push(dep);
    }

    pub fn build(&self) -> RegVarDeps {
        self.deps.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_name_in_same_scope_reuses_the_id() {
        let mut names = RegVarNames::new();
        let (a, fresh_a) = names.declare(ScopeId(0), "tmp");
        let (b, fresh_b) = names.declare(ScopeId(0), "tmp");
        assert!(fresh_a);
        assert!(!fresh_b);
        assert_eq!(a, b);
    }

    #[test]
    fn same_name_in_different_scopes_gets_distinct_ids() {
        let mut names = RegVarNames::new();
        let (a, _) = names.declare(ScopeId(0), "tmp");
        let (b, _) = names.declare(ScopeId(1), "tmp");
        assert_ne!(a, b);
    }
}
