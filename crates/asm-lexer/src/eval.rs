//! Expression evaluation against a multi-section address space
//! (`spec.md` §4.B "Evaluation model").

use crate::expr::{BinOp, ExprArena, ExprNode, UnOp};
use asm_diag::SourcePos;
use asm_symtab::{EvalContext, ExprId, SectionId, SymbolTable, Value};

/// What the evaluator was asked to resolve against: the section/offset that
/// `ThisLocation` (`.`) stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvalTarget {
    pub section: SectionId,
    pub offset: u64,
}

impl From<EvalContext> for EvalTarget {
    fn from(c: EvalContext) -> Self {
        EvalTarget {
            section: c.section,
            offset: c.offset,
        }
    }
}

/// `spec.md` §4.B rule 4: "expression evaluation failed" with the source
/// position of the offending node. We don't have per-node positions in the
/// arena (positions live on the original token stream), so callers attach
/// `pos` from the directive/line that triggered evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvalError {
    pub message: String,
}

impl EvalError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn with_pos(self, pos: Option<SourcePos>) -> asm_diag::Diagnostic {
        let d = asm_diag::Diagnostic::error(asm_diag::DiagCode::BadExpression, self.message);
        match pos {
            Some(p) => d.at(p),
            None => d,
        }
    }
}

type EResult<T> = Result<T, EvalError>;

/// Evaluates expression-arena nodes against the symbol table and a target
/// location. Registers a re-evaluation occurrence on every (non-snapshot)
/// `SymbolRef` it touches, per `spec.md` §3 "every occurrence in an
/// expression tree holds a back-reference".
pub struct Evaluator<'a> {
    arena: &'a ExprArena,
    symtab: &'a mut SymbolTable,
    here: EvalTarget,
}

impl<'a> Evaluator<'a> {
    pub fn new(arena: &'a ExprArena, symtab: &'a mut SymbolTable, here: EvalTarget) -> Self {
        Self {
            arena,
            symtab,
            here,
        }
    }

    /// Evaluate `id`, registering `owner` (if given) as the occurrence on
    /// every `SymbolRef` reached (so future rebinds retry `owner`).
    pub fn eval(&mut self, id: ExprId, owner: Option<ExprId>) -> EResult<Value> {
        match self.arena.get(id).clone() {
            ExprNode::Literal(v) => Ok(v),
            ExprNode::ThisLocation => Ok(Value::Addr {
                section: self.here.section,
                offset: self.here.offset,
            }),
            ExprNode::SymbolRef(sym) => {
                if let Some(owner) = owner {
                    self.symtab.record_occurrence(sym, owner);
                }
                self.eval_symbol(sym)
            }
            ExprNode::ParenSymbol(sym) => {
                // Snapshot-capture form: evaluated once, no re-eval occurrence.
                self.eval_symbol(sym)
            }
            ExprNode::Unary(op, inner) => {
                let v = self.eval(inner, owner)?;
                eval_unary(op, v)
            }
            ExprNode::Binary(op, l, r) => {
                let lv = self.eval(l, owner)?;
                let rv = self.eval(r, owner)?;
                eval_binary(op, lv, rv)
            }
            ExprNode::Select(c, t, f) => {
                let cv = self.eval(c, owner)?;
                let truthy = is_truthy(&cv)?;
                if truthy {
                    self.eval(t, owner)
                } else {
                    self.eval(f, owner)
                }
            }
            ExprNode::LitWrap { bits, inner } => {
                let v = self.eval(inner, owner)?;
                let bits_val = match v {
                    Value::Int(i) if bits == 32 => (i as u32) as u64,
                    Value::Int(i) => i,
                    _ => return Err(EvalError::new("lit()/lit64() requires an integer operand")),
                };
                Ok(Value::Int(bits_val))
            }
        }
    }

    fn eval_symbol(&mut self, sym: asm_symtab::SymbolId) -> EResult<Value> {
        if self.symtab.is_never_assigned(sym) {
            return Err(EvalError::new(format!(
                "use of undefined symbol `{}`",
                self.symtab.symbol(sym).name
            )));
        }
        match self.symtab.symbol(sym).value.clone() {
            asm_symtab::SymbolValue::Final(v) => Ok(v),
            asm_symtab::SymbolValue::Pending { .. } => Ok(Value::Unresolved),
        }
    }
}

fn is_truthy(v: &Value) -> EResult<bool> {
    match v {
        Value::Int(i) => Ok(*i != 0),
        Value::Addr { offset, .. } => Ok(*offset != 0),
        _ => Err(EvalError::new("condition requires an integer value")),
    }
}

/// `spec.md` §4.B evaluation rules 1-3: how two tagged values combine.
fn eval_binary(op: BinOp, l: Value, r: Value) -> EResult<Value> {
    if matches!(l, Value::Unresolved) || matches!(r, Value::Unresolved) {
        return Ok(Value::Unresolved);
    }
    match (l, r) {
        (Value::Int(a), Value::Int(b)) => int_binary(op, a, b).map(Value::Int),
        // Rule 1: same-section difference collapses to a scalar integer.
        (
            Value::Addr {
                section: sa,
                offset: oa,
            },
            Value::Addr {
                section: sb,
                offset: ob,
            },
        ) if sa == sb => {
            if op == BinOp::Sub {
                Ok(Value::Int(oa.wrapping_sub(ob)))
            } else if op == BinOp::Eq || op == BinOp::Ne {
                int_binary(op, oa, ob).map(Value::Int)
            } else {
                Err(EvalError::new(
                    "only subtraction/comparison are defined between two addresses in the same section",
                ))
            }
        }
        // Rule 3: two different sections combined by anything but difference.
        (Value::Addr { section: sa, .. }, Value::Addr { section: sb, .. }) => Err(EvalError::new(
            format!("cannot combine values from different sections ({sa:?} vs {sb:?})"),
        )),
        // Rule 2: integer + sectioned value => sectioned value (label+offset).
        (Value::Addr { section, offset }, Value::Int(b)) => {
            let offset = apply_offset(op, offset, b)?;
            Ok(Value::Addr { section, offset })
        }
        (Value::Int(a), Value::Addr { section, offset }) => {
            // Only commutative addition is meaningful for int + label.
            if op == BinOp::Add {
                Ok(Value::Addr {
                    section,
                    offset: offset.wrapping_add(a),
                })
            } else {
                Err(EvalError::new(
                    "only addition is defined for integer + section value",
                ))
            }
        }
        (a, b) => Err(EvalError::new(format!(
            "operator not defined for operand kinds {a} and {b}"
        ))),
    }
}

fn apply_offset(op: BinOp, offset: u64, b: u64) -> EResult<u64> {
    match op {
        BinOp::Add => Ok(offset.wrapping_add(b)),
        BinOp::Sub => Ok(offset.wrapping_sub(b)),
        _ => Err(EvalError::new(
            "only +/- are defined between a section value and an integer",
        )),
    }
}

fn int_binary(op: BinOp, a: u64, b: u64) -> EResult<u64> {
    let sa = a as i64;
    let sb = b as i64;
    Ok(match op {
        BinOp::Add => a.wrapping_add(b),
        BinOp::Sub => a.wrapping_sub(b),
        BinOp::Mul => a.wrapping_mul(b),
        BinOp::Div => {
            if b == 0 {
                return Err(EvalError::new("division by zero"));
            }
            a / b
        }
        BinOp::Mod => {
            if b == 0 {
                return Err(EvalError::new("modulo by zero"));
            }
            a % b
        }
        BinOp::Shl => a.wrapping_shl(b as u32),
        BinOp::Shr => a.wrapping_shr(b as u32),
        BinOp::Sar => (sa >> (b & 63)) as u64,
        BinOp::And => a & b,
        BinOp::Or => a | b,
        BinOp::Xor => a ^ b,
        BinOp::Eq => (a == b) as u64,
        BinOp::Ne => (a != b) as u64,
        BinOp::Lt => (sa < sb) as u64,
        BinOp::Le => (sa <= sb) as u64,
        BinOp::Gt => (sa > sb) as u64,
        BinOp::Ge => (sa >= sb) as u64,
        BinOp::LogAnd => ((a != 0) && (b != 0)) as u64,
        BinOp::LogOr => ((a != 0) || (b != 0)) as u64,
    })
}

fn eval_unary(op: UnOp, v: Value) -> EResult<Value> {
    if matches!(v, Value::Unresolved) {
        return Ok(Value::Unresolved);
    }
    let i = v
        .as_int()
        .ok_or_else(|| EvalError::new("unary operator requires an integer operand"))?;
    Ok(Value::Int(match op {
        UnOp::Not => !i,
        UnOp::Neg => i.wrapping_neg(),
        UnOp::LogNot => (i == 0) as u64,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;
    use crate::parser::Parser;

    fn eval_src(src: &str, symtab: &mut SymbolTable, here: EvalTarget) -> EResult<Value> {
        let toks = Lexer::new(src).tokenize().unwrap();
        let mut arena = ExprArena::new();
        let id = {
            let mut p = Parser::new(&toks, &mut arena, symtab);
            p.parse_expr().unwrap()
        };
        let mut ev = Evaluator::new(&arena, symtab, here);
        ev.eval(id, None)
    }

    #[test]
    fn simple_arithmetic() {
        let mut t = SymbolTable::new();
        let here = EvalTarget {
            section: SectionId::ABS,
            offset: 0,
        };
        assert_eq!(eval_src("1 + 2 * 3", &mut t, here), Ok(Value::Int(7)));
    }

    #[test]
    fn division_by_zero_is_an_error() {
        let mut t = SymbolTable::new();
        let here = EvalTarget {
            section: SectionId::ABS,
            offset: 0,
        };
        assert!(eval_src("1 / 0", &mut t, here).is_err());
    }

    #[test]
    fn label_difference_is_an_integer() {
        let mut t = SymbolTable::new();
        let a = t.define("a").unwrap();
        t.set_value(
            a,
            Value::Addr {
                section: SectionId(0),
                offset: 4,
            },
        );
        let b = t.define("b").unwrap();
        t.set_value(
            b,
            Value::Addr {
                section: SectionId(0),
                offset: 12,
            },
        );
        let here = EvalTarget {
            section: SectionId(0),
            offset: 0,
        };
        assert_eq!(eval_src("b - a", &mut t, here), Ok(Value::Int(8)));
    }

    #[test]
    fn label_plus_offset_stays_sectioned() {
        let mut t = SymbolTable::new();
        let a = t.define("a").unwrap();
        t.set_value(
            a,
            Value::Addr {
                section: SectionId(0),
                offset: 4,
            },
        );
        let here = EvalTarget {
            section: SectionId(0),
            offset: 0,
        };
        assert_eq!(
            eval_src("a + 4", &mut t, here),
            Ok(Value::Addr {
                section: SectionId(0),
                offset: 8
            })
        );
    }

    #[test]
    fn undefined_symbol_is_an_error() {
        let mut t = SymbolTable::new();
        let here = EvalTarget {
            section: SectionId::ABS,
            offset: 0,
        };
        assert!(eval_src("nope", &mut t, here).is_err());
    }

    #[test]
    fn this_location_resolves_to_current_target() {
        let mut t = SymbolTable::new();
        let here = EvalTarget {
            section: SectionId(3),
            offset: 0x40,
        };
        assert_eq!(
            eval_src(". + 8", &mut t, here),
            Ok(Value::Addr {
                section: SectionId(3),
                offset: 0x48
            })
        );
    }

    #[test]
    fn different_sections_cannot_be_added() {
        let mut t = SymbolTable::new();
        let a = t.define("a").unwrap();
        t.set_value(
            a,
            Value::Addr {
                section: SectionId(0),
                offset: 0,
            },
        );
        let b = t.define("b").unwrap();
        t.set_value(
            b,
            Value::Addr {
                section: SectionId(1),
                offset: 0,
            },
        );
        let here = EvalTarget {
            section: SectionId(0),
            offset: 0,
        };
        assert!(eval_src("a + b", &mut t, here).is_err());
    }

    #[test]
    fn forward_reference_yields_unresolved_not_an_error() {
        let mut t = SymbolTable::new();
        let x = t.lookup("x", true).unwrap();
        let dummy_expr = ExprId(0);
        t.set_pending(
            x,
            dummy_expr,
            asm_symtab::EvalContext {
                section: SectionId::ABS,
                offset: 0,
            },
        );
        let here = EvalTarget {
            section: SectionId::ABS,
            offset: 0,
        };
        assert_eq!(eval_src("x", &mut t, here), Ok(Value::Unresolved));
    }
}
