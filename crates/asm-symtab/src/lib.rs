//! Symbol & scope table and the multi-section address space expressions are
//! evaluated against (`spec.md` components B/C, §3 data model).

mod scope;
mod section;
mod value;

pub use scope::{EvalContext, Scope, ScopeError, ScopeId, Symbol, SymbolId, SymbolTable, SymbolValue};
pub use section::{
    CodeFlowEntry, FlowKind, Relocation, Section, SectionFlags, SectionTable, SectionType,
};
pub use value::{ExprId, RegClass, RegRef, RegVarId, SectionId, Value};
