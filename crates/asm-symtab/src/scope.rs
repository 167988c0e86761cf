//! Symbol and scope table (`spec.md` §4.C).
//!
//! Scope-name resolution is an iterative walk with an explicit visited-set
//! (`spec.md` §9 design note) rather than recursion, so a buggy `use` cycle
//! introduced by a bad directive can never blow the stack.

use crate::value::{ExprId, SectionId, Value};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SymbolId(pub u32);

/// Where a pending expression must be re-evaluated from: the `.`
/// this-location-counter binds to whatever section/offset was current at
/// the point of assignment, not at the point of a later retry, so that
/// context travels with the expression rather than being re-derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvalContext {
    pub section: SectionId,
    pub offset: u64,
}

/// A symbol's value: either an expression tree awaiting evaluation, or a
/// final resolved value.
#[derive(Debug, Clone)]
pub enum SymbolValue {
    Pending { expr: ExprId, at: EvalContext },
    Final(Value),
}

impl SymbolValue {
    pub fn as_final(&self) -> Option<&Value> {
        match self {
            SymbolValue::Final(v) => Some(v),
            SymbolValue::Pending { .. } => None,
        }
    }

    pub fn as_pending(&self) -> Option<(ExprId, EvalContext)> {
        match self {
            SymbolValue::Pending { expr, at } => Some((*expr, *at)),
            SymbolValue::Final(_) => None,
        }
    }
}

/// Shared, reference-counted dependent list. Cloned cheaply when a `.eqv`
/// snapshot shares dependents with its source symbol (`spec.md` §4.C
/// "clone-on-write"); diverges into an owned copy the first time either
/// clone is reassigned after the split.
#[derive(Debug, Clone, Default)]
struct Dependents(Rc<RefCell<Vec<ExprId>>>);

impl Dependents {
    fn new() -> Self {
        Self(Rc::new(RefCell::new(Vec::new())))
    }

    fn push(&self, expr: ExprId) {
        self.0.borrow_mut().push(expr);
    }

    fn snapshot(&self) -> Vec<ExprId> {
        self.0.borrow().clone()
    }

    /// Detach from any shared clone by replacing the inner `Rc` with a fresh
    /// owned copy of the current contents. Called the first time a symbol
    /// that came out of a clone-on-write split is reassigned.
    fn diverge(&mut self) {
        let copy = self.0.borrow().clone();
        self.0 = Rc::new(RefCell::new(copy));
    }
}

#[derive(Debug, Clone)]
pub struct Symbol {
    pub name: String,
    pub scope: ScopeId,
    pub value: SymbolValue,
    pub is_defined: bool,
    /// A base symbol is a genuine definition; a non-base symbol is an alias
    /// produced by `.eqv`/clone-on-write.
    pub is_base: bool,
    pub is_global: bool,
    pub snapshot_of: Option<SymbolId>,
    dependents: Dependents,
    /// True once this symbol has diverged from a clone-on-write sibling.
    diverged: bool,
}

impl Symbol {
    fn new(name: impl Into<String>, scope: ScopeId) -> Self {
        Self {
            name: name.into(),
            scope,
            value: SymbolValue::Pending {
                expr: ExprId(u32::MAX),
                at: EvalContext {
                    section: SectionId::ABS,
                    offset: 0,
                },
            },
            is_defined: false,
            is_base: true,
            is_global: false,
            snapshot_of: None,
            dependents: Dependents::new(),
            diverged: true,
        }
    }

    pub fn occurrences(&self) -> Vec<ExprId> {
        self.dependents.snapshot()
    }
}

#[derive(Debug, Clone)]
pub struct Scope {
    pub name: Option<String>,
    pub parent: Option<ScopeId>,
    pub symbols: HashMap<String, SymbolId>,
    pub regvars: HashMap<String, crate::value::RegVarId>,
    pub children: Vec<ScopeId>,
    pub use_list: Vec<ScopeId>,
}

impl Scope {
    fn new(name: Option<String>, parent: Option<ScopeId>) -> Self {
        Self {
            name,
            parent,
            symbols: HashMap::new(),
            regvars: HashMap::new(),
            children: Vec::new(),
            use_list: Vec::new(),
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ScopeError {
    #[error("cannot pop the global scope")]
    PopGlobal,
    #[error("`use` would introduce a scope cycle")]
    UseCycle,
    #[error("duplicate definition of `{0}` in the same scope")]
    DuplicateDefinition(String),
}

pub struct SymbolTable {
    scopes: Vec<Scope>,
    symbols: Vec<Symbol>,
    global: ScopeId,
    stack: Vec<ScopeId>,
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolTable {
    pub fn new() -> Self {
        let global_scope = Scope::new(None, None);
        Self {
            scopes: vec![global_scope],
            symbols: Vec::new(),
            global: ScopeId(0),
            stack: vec![ScopeId(0)],
        }
    }

    pub fn global_scope(&self) -> ScopeId {
        self.global
    }

    pub fn current_scope(&self) -> ScopeId {
        *self.stack.last().expect("scope stack never empties")
    }

    pub fn push_scope(&mut self, name: Option<String>) -> ScopeId {
        let parent = self.current_scope();
        let id = ScopeId(self.scopes.len() as u32);
        self.scopes.push(Scope::new(name, Some(parent)));
        self.scopes[parent.0 as usize].children.push(id);
        self.stack.push(id);
        id
    }

    pub fn pop_scope(&mut self) -> Result<(), ScopeError> {
        if self.stack.len() <= 1 {
            return Err(ScopeError::PopGlobal);
        }
        self.stack.pop();
        Ok(())
    }

    /// Add a `use` edge from the current scope to `target`, rejecting cycles
    /// (`spec.md` §4.C "cycle detection"), checked via an iterative BFS with
    /// a visited-set.
    pub fn add_use(&mut self, target: ScopeId) -> Result<(), ScopeError> {
        let from = self.current_scope();
        if from == target || self.reaches(target, from) {
            return Err(ScopeError::UseCycle);
        }
        self.scopes[from.0 as usize].use_list.push(target);
        Ok(())
    }

    /// True if `start` can reach `needle` by walking parent links and use
    /// edges (used to reject a `use` that would close a cycle).
    fn reaches(&self, start: ScopeId, needle: ScopeId) -> bool {
        let mut visited = std::collections::HashSet::new();
        let mut stack = vec![start];
        while let Some(cur) = stack.pop() {
            if cur == needle {
                return true;
            }
            if !visited.insert(cur) {
                continue;
            }
            let scope = &self.scopes[cur.0 as usize];
            if let Some(p) = scope.parent {
                stack.push(p);
            }
            stack.extend(scope.use_list.iter().copied());
        }
        false
    }

    fn new_symbol_in(&mut self, scope: ScopeId, name: &str) -> SymbolId {
        let id = SymbolId(self.symbols.len() as u32);
        self.symbols.push(Symbol::new(name, scope));
        self.scopes[scope.0 as usize]
            .symbols
            .insert(name.to_string(), id);
        id
    }

    /// Resolve a dotted scoped name (`a::b::sym`) or bare name
    /// (`spec.md` §4.C resolution rules). When `insert` is true and the name
    /// is not found, it is created in the innermost applicable scope.
    pub fn lookup(&mut self, name: &str, insert: bool) -> Option<SymbolId> {
        if let Some((path, leaf)) = split_scoped(name) {
            return self.lookup_scoped(&path, leaf, insert);
        }
        // 1. walk from current scope outward through parent
        let mut visited = std::collections::HashSet::new();
        let mut scope = Some(self.current_scope());
        while let Some(s) = scope {
            if !visited.insert(s) {
                break;
            }
            if let Some(&sym) = self.scopes[s.0 as usize].symbols.get(name) {
                return Some(sym);
            }
            scope = self.scopes[s.0 as usize].parent;
        }
        // 2. across use edges of the current scope (one hop, iteratively over the chain)
        let mut stack: Vec<ScopeId> = self.scopes[self.current_scope().0 as usize]
            .use_list
            .clone();
        let mut use_visited = std::collections::HashSet::new();
        while let Some(s) = stack.pop() {
            if !use_visited.insert(s) {
                continue;
            }
            if let Some(&sym) = self.scopes[s.0 as usize].symbols.get(name) {
                return Some(sym);
            }
            stack.extend(self.scopes[s.0 as usize].use_list.iter().copied());
        }
        // 3. fall back to global scope
        if let Some(&sym) = self.scopes[self.global.0 as usize].symbols.get(name) {
            return Some(sym);
        }
        if insert {
            let target = self.current_scope();
            Some(self.new_symbol_in(target, name))
        } else {
            None
        }
    }

    fn lookup_scoped(&mut self, path: &[&str], leaf: &str, insert: bool) -> Option<SymbolId> {
        let mut scope = self.global;
        for component in path {
            let child = self.scopes[scope.0 as usize]
                .children
                .iter()
                .find(|c| self.scopes[c.0 as usize].name.as_deref() == Some(*component))
                .copied();
            match child {
                Some(c) => scope = c,
                None => return None,
            }
        }
        if let Some(&sym) = self.scopes[scope.0 as usize].symbols.get(leaf) {
            return Some(sym);
        }
        if insert {
            Some(self.new_symbol_in(scope, leaf))
        } else {
            None
        }
    }

    pub fn symbol(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id.0 as usize]
    }

    pub fn symbol_mut(&mut self, id: SymbolId) -> &mut Symbol {
        &mut self.symbols[id.0 as usize]
    }

    /// Assign a new value (`.equ`/`.set`), marking the symbol defined.
    /// Returns the set of expression occurrences that must be retried.
    pub fn set_value(&mut self, id: SymbolId, value: Value) -> Vec<ExprId> {
        let sym = &mut self.symbols[id.0 as usize];
        if !sym.diverged {
            sym.dependents.diverge();
            sym.diverged = true;
        }
        sym.value = SymbolValue::Final(value);
        sym.is_defined = true;
        sym.occurrences()
    }

    /// Store an as-yet-unevaluated expression as a symbol's value
    /// (`.equ`/`.set` with an operand that doesn't resolve yet). `at` pins
    /// the section/offset the expression's `.` must resolve against, even
    /// if the retry pass runs after the current section has moved on.
    pub fn set_pending(&mut self, id: SymbolId, expr: ExprId, at: EvalContext) {
        let sym = &mut self.symbols[id.0 as usize];
        if !sym.diverged {
            sym.dependents.diverge();
            sym.diverged = true;
        }
        sym.value = SymbolValue::Pending { expr, at };
    }

    /// True if this symbol has never been assigned any value at all (as
    /// opposed to holding a `Pending` value awaiting retry).
    pub fn is_never_assigned(&self, id: SymbolId) -> bool {
        matches!(
            self.symbols[id.0 as usize].value,
            SymbolValue::Pending { expr, .. } if expr.0 == u32::MAX
        )
    }

    pub fn record_occurrence(&mut self, id: SymbolId, expr: ExprId) {
        self.symbols[id.0 as usize].dependents.push(expr);
    }

    /// `.eqv`: define `name` in the current scope as a frozen snapshot of
    /// `source`'s current value. If `source` already has dependents, those
    /// are shared with the new snapshot until either is reassigned
    /// (`spec.md` §4.C clone-on-write).
    pub fn define_snapshot(&mut self, name: &str, source: SymbolId) -> Result<SymbolId, ScopeError> {
        let scope = self.current_scope();
        if self.scopes[scope.0 as usize].symbols.contains_key(name) {
            return Err(ScopeError::DuplicateDefinition(name.to_string()));
        }
        let src = &self.symbols[source.0 as usize];
        let value = src.value.clone();
        let dependents = src.dependents.clone();
        let id = SymbolId(self.symbols.len() as u32);
        self.symbols.push(Symbol {
            name: name.to_string(),
            scope,
            value,
            is_defined: true,
            is_base: false,
            is_global: false,
            snapshot_of: Some(source),
            dependents,
            diverged: false,
        });
        self.scopes[scope.0 as usize]
            .symbols
            .insert(name.to_string(), id);
        // The source symbol now shares its dependent list; mark it
        // not-yet-diverged too so the *next* rebind of either clone splits it.
        self.symbols[source.0 as usize].diverged = false;
        Ok(id)
    }

    pub fn define(&mut self, name: &str) -> Result<SymbolId, ScopeError> {
        let scope = self.current_scope();
        if self.scopes[scope.0 as usize].symbols.contains_key(name) {
            return Err(ScopeError::DuplicateDefinition(name.to_string()));
        }
        Ok(self.new_symbol_in(scope, name))
    }
}

fn split_scoped(name: &str) -> Option<(Vec<&str>, &str)> {
    if !name.contains("::") {
        return None;
    }
    let mut parts: Vec<&str> = name.split("::").collect();
    let leaf = parts.pop().unwrap();
    Some((parts, leaf))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_walks_parent_chain() {
        let mut t = SymbolTable::new();
        let outer = t.define("x").unwrap();
        t.set_value(outer, Value::Int(1));
        t.push_scope(Some("inner".into()));
        let found = t.lookup("x", false).unwrap();
        assert_eq!(found, outer);
    }

    #[test]
    fn lookup_inserts_in_innermost_scope_when_requested() {
        let mut t = SymbolTable::new();
        t.push_scope(None);
        let id = t.lookup("fresh", true).unwrap();
        assert_eq!(t.current_scope(), t.symbol(id).scope);
    }

    #[test]
    fn use_cycle_is_rejected() {
        let mut t = SymbolTable::new();
        let a = t.push_scope(Some("a".into()));
        t.pop_scope().unwrap();
        let b = t.push_scope(Some("b".into()));
        t.add_use(a).unwrap();
        t.pop_scope().unwrap();
        // re-enter `a`, try to `use b` -> would cycle since b already uses a
        t.stack.push(a);
        assert_eq!(t.add_use(b), Err(ScopeError::UseCycle));
    }

    #[test]
    fn scoped_dotted_lookup_resolves_from_root() {
        let mut t = SymbolTable::new();
        t.push_scope(Some("a".into()));
        let sym = t.define("sym").unwrap();
        t.set_value(sym, Value::Int(42));
        t.pop_scope().unwrap();
        let found = t.lookup("a::sym", false).unwrap();
        assert_eq!(found, sym);
    }

    #[test]
    fn eqv_snapshot_freezes_value_independent_of_future_rebinds() {
        let mut t = SymbolTable::new();
        let base = t.define("base").unwrap();
        t.set_value(base, Value::Int(10));
        let snap = t.define_snapshot("frozen", base).unwrap();
        t.set_value(base, Value::Int(99));
        assert_eq!(
            t.symbol(snap).value.as_final().cloned(),
            Some(Value::Int(10))
        );
        assert_eq!(
            t.symbol(base).value.as_final().cloned(),
            Some(Value::Int(99))
        );
    }

    #[test]
    fn eqv_snapshot_shares_dependents_until_reassigned() {
        let mut t = SymbolTable::new();
        let base = t.define("base").unwrap();
        t.set_value(base, Value::Int(1));
        t.record_occurrence(base, ExprId(7));
        let snap = t.define_snapshot("frozen", base).unwrap();
        // Still shared: recording against base should also appear for snap.
        t.record_occurrence(base, ExprId(8));
        assert_eq!(t.symbol(snap).occurrences(), vec![ExprId(7), ExprId(8)]);
        // Reassigning snap diverges it; base keeps growing independently.
        t.set_value(snap, Value::Int(2));
        t.record_occurrence(base, ExprId(9));
        assert_eq!(t.symbol(snap).occurrences(), vec![ExprId(7), ExprId(8)]);
        assert_eq!(
            t.symbol(base).occurrences(),
            vec![ExprId(7), ExprId(8), ExprId(9)]
        );
    }

    #[test]
    fn duplicate_definition_in_same_scope_is_rejected() {
        let mut t = SymbolTable::new();
        t.define("dup").unwrap();
        assert_eq!(
            t.define("dup"),
            Err(ScopeError::DuplicateDefinition("dup".to_string()))
        );
    }
}
