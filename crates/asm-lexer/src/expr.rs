//! Expression trees (`spec.md` §3 "Expression node", §4.B).
//!
//! Nodes are owned by an arena and referenced by `ExprId`, rather than
//! holding raw pointers between leaves and the symbols they reference
//! (`spec.md` §9 design note). The arena is owned by whichever symbol or
//! relocation the tree parametrises; once fully evaluated, a tree may be
//! dropped by dropping its arena.

use asm_symtab::{ExprId, SymbolId, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Shl,
    Shr,
    Sar,
    And,
    Or,
    Xor,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    LogAnd,
    LogOr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Not,
    Neg,
    LogNot,
}

#[derive(Debug, Clone)]
pub enum ExprNode {
    Literal(Value),
    SymbolRef(SymbolId),
    /// `(symbol)` snapshot-capture form: evaluates like `SymbolRef` but the
    /// evaluator does not register a re-evaluation occurrence for it, since
    /// its value is meant to be captured once by `.eqv`.
    ParenSymbol(SymbolId),
    ThisLocation,
    Unary(UnOp, ExprId),
    Binary(BinOp, ExprId, ExprId),
    Select(ExprId, ExprId, ExprId),
    /// `lit(...)` / `lit64(...)`: reinterpret the operand's evaluated bits as
    /// an integer of the given width, without a numeric value conversion.
    LitWrap { bits: u8, inner: ExprId },
}

#[derive(Debug, Default)]
pub struct ExprArena {
    nodes: Vec<ExprNode>,
}

impl ExprArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, node: ExprNode) -> ExprId {
        let id = ExprId(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }

    pub fn get(&self, id: ExprId) -> &ExprNode {
        &self.nodes[id.0 as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arena_round_trips_nodes() {
        let mut arena = ExprArena::new();
        let a = arena.push(ExprNode::Literal(Value::Int(3)));
        let b = arena.push(ExprNode::Literal(Value::Int(4)));
        let sum = arena.push(ExprNode::Binary(BinOp::Add, a, b));
        match arena.get(sum) {
            ExprNode::Binary(BinOp::Add, l, r) => {
                assert_eq!(*l, a);
                assert_eq!(*r, b);
            }
            other => panic!("unexpected node: {other:?}"),
        }
    }
}
