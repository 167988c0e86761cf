//! Deferred-expression bookkeeping: forward references that couldn't be
//! evaluated when first seen get retried to a fixed point once assembly of
//! the whole source has finished (`spec.md` §4.C "Pending"/§8 scenario 3,
//! `s_mov_b32 s0, x` before `.set x, 7`).
//!
//! Two kinds of thing can be pending:
//!  - a symbol's own value (`.set`/`.equ` whose right-hand side didn't
//!    evaluate yet) - tracked in `asm_symtab::Symbol::value` itself;
//!  - a relocation recorded against a section's byte content (an operand
//!    that referred to a symbol not yet defined at encode time).
//!
//! Both are registered here against the `ExprId` that was used as the
//! evaluator's `owner` argument, so that when `SymbolTable::set_value`
//! reports the occurrences depending on a newly-resolved symbol, we know
//! immediately which other pending entries just became retriable, without
//! rescanning everything each pass.

use std::collections::{HashMap, VecDeque};

use asm_diag::{DiagCode, Diagnostic, DiagSink};
use asm_lexer::{EvalTarget, Evaluator, ExprArena};
use asm_symtab::{ExprId, SectionId, SectionTable, SymbolId, SymbolTable};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingTarget {
    Symbol(SymbolId),
    Reloc {
        section: SectionId,
        offset: u64,
        width: u8,
    },
}

#[derive(Debug, Default)]
pub struct PendingSet {
    entries: HashMap<ExprId, (PendingTarget, EvalTarget)>,
}

impl PendingSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, expr: ExprId, target: PendingTarget, at: EvalTarget) {
        self.entries.insert(expr, (target, at));
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

fn patch_bytes(content: &mut [u8], offset: u64, width: u8, value: u64) {
    let start = offset as usize;
    let end = start + width as usize;
    if end > content.len() {
        return;
    }
    let bytes = value.to_le_bytes();
    content[start..end].copy_from_slice(&bytes[..width as usize]);
}

/// Re-evaluate every pending entry, following the chain of symbol
/// occurrences it unlocks, until a full pass resolves nothing more.
/// Remaining entries after this call are unresolved forward references.
pub fn retry_to_fixed_point(
    arena: &ExprArena,
    symtab: &mut SymbolTable,
    sections: &mut SectionTable,
    pending: &mut PendingSet,
) {
    let mut worklist: VecDeque<ExprId> = pending.entries.keys().copied().collect();
    while let Some(expr) = worklist.pop_front() {
        let Some((target, at)) = pending.entries.get(&expr).copied() else {
            continue;
        };
        let mut ev = Evaluator::new(arena, symtab, at);
        let Ok(value) = ev.eval(expr, Some(expr)) else {
            continue;
        };
        pending.entries.remove(&expr);
        match target {
            PendingTarget::Symbol(id) => {
                let woken = symtab.set_value(id, value);
                for w in woken {
                    if pending.entries.contains_key(&w) {
                        worklist.push_back(w);
                    }
                }
            }
            PendingTarget::Reloc { section, offset, width } => {
                if let Some(s) = sections.get_mut(section) {
                    // A resolved label evaluates to `Value::Addr`; relocations
                    // in this single-section address space patch in the
                    // byte offset, not a linker-relocated absolute address.
                    let n = value.as_int().or_else(|| match value {
                        asm_symtab::Value::Addr { offset, .. } => Some(offset),
                        _ => None,
                    });
                    if let Some(n) = n {
                        patch_bytes(&mut s.content, offset, width, n);
                    }
                }
            }
        }
    }
}

/// Report every entry still pending after the retry pass as an undefined
/// symbol; called once at the very end of assembly.
pub fn report_unresolved(pending: &PendingSet, diag: &dyn DiagSink) {
    for _ in 0..pending.len() {
        diag.emit(Diagnostic::error(
            DiagCode::UndefinedSymbol,
            "expression never resolved: symbol used but never defined",
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use asm_diag::VecDiagSink;
    use asm_lexer::{ExprArena, ExprNode};
    use asm_symtab::{SectionFlags, SectionType, Value};

    #[test]
    fn pending_relocation_resolves_once_symbol_is_set() {
        let mut arena = ExprArena::new();
        let mut symtab = SymbolTable::new();
        let mut sections = SectionTable::new();
        let sect = sections.create(".text", None, SectionType::Text, SectionFlags::CODE);
        sections.get_mut(sect).unwrap().append_bytes(&[0u8; 4]);

        let sym = symtab.define("x").unwrap();
        let expr = arena.push(ExprNode::SymbolRef(sym));

        let mut pending = PendingSet::new();
        pending.register(
            expr,
            PendingTarget::Reloc {
                section: sect,
                offset: 0,
                width: 4,
            },
            EvalTarget {
                section: sect,
                offset: 0,
            },
        );

        retry_to_fixed_point(&arena, &mut symtab, &mut sections, &mut pending);
        assert!(!pending.is_empty());

        symtab.set_value(sym, Value::Int(7));
        // The relocation's expr id is not itself re-queued until something
        // retries it; simulate the dispatcher's own pass re-adding it.
        pending.entries.clear();
        pending.register(
            expr,
            PendingTarget::Reloc {
                section: sect,
                offset: 0,
                width: 4,
            },
            EvalTarget {
                section: sect,
                offset: 0,
            },
        );
        retry_to_fixed_point(&arena, &mut symtab, &mut sections, &mut pending);
        assert!(pending.is_empty());
        assert_eq!(sections.get(sect).unwrap().content[0], 7);
    }

    #[test]
    fn unresolved_entries_are_reported_once_each() {
        let pending = PendingSet::default();
        let sink = VecDiagSink::new();
        report_unresolved(&pending, &sink);
        assert!(sink.snapshot().is_empty());
    }
}
