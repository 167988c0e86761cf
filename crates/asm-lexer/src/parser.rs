//! Precedence-climbing expression parser (`spec.md` §4.B).
//!
//! Precedence ladder, low to high: ternary select, `||`, `&&`, `|`, `^`, `&`,
//! equality, relational, shift, additive, multiplicative, unary, primary.
//! This is the C ladder plus the assembler extras `%`, `<<`/`>>` (logical),
//! `>>>` (arithmetic), `&&`, `||`.

use crate::expr::{BinOp, ExprArena, ExprNode, UnOp};
use crate::token::{NumLit, Spanned, Token};
use asm_symtab::{ExprId, SymbolTable, Value};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub message: String,
    pub column: u32,
}

pub struct Parser<'a> {
    tokens: &'a [Spanned<Token>],
    pos: usize,
    arena: &'a mut ExprArena,
    symtab: &'a mut SymbolTable,
}

type PResult<T> = Result<T, ParseError>;

impl<'a> Parser<'a> {
    pub fn new(
        tokens: &'a [Spanned<Token>],
        arena: &'a mut ExprArena,
        symtab: &'a mut SymbolTable,
    ) -> Self {
        Self {
            tokens,
            pos: 0,
            arena,
            symtab,
        }
    }

    /// Parse a full expression, requiring every token to be consumed.
    pub fn parse_expr(&mut self) -> PResult<ExprId> {
        let e = self.parse_ternary()?;
        if let Some(tok) = self.tokens.get(self.pos) {
            return Err(self.err(format!("unexpected trailing token {:?}", tok.value)));
        }
        Ok(e)
    }

    /// Parse an expression without requiring full consumption; returns the
    /// node and leaves the cursor positioned after it (used when parsing a
    /// comma-separated operand list).
    pub fn parse_expr_prefix(&mut self) -> PResult<ExprId> {
        self.parse_ternary()
    }

    pub fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|s| &s.value)
    }

    fn column(&self) -> u32 {
        self.tokens
            .get(self.pos)
            .map(|s| s.column)
            .unwrap_or(u32::MAX)
    }

    fn err(&self, message: impl Into<String>) -> ParseError {
        ParseError {
            message: message.into(),
            column: self.column(),
        }
    }

    fn eat_punct(&mut self, p: &str) -> bool {
        if matches!(self.peek(), Some(Token::Punct(x)) if *x == p) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_punct(&mut self, p: &str) -> PResult<()> {
        if self.eat_punct(p) {
            Ok(())
        } else {
            Err(self.err(format!("expected '{p}'")))
        }
    }

    fn parse_ternary(&mut self) -> PResult<ExprId> {
        let cond = self.parse_logor()?;
        if self.eat_punct("?") {
            let then_e = self.parse_ternary()?;
            self.expect_punct(":")?;
            let else_e = self.parse_ternary()?;
            return Ok(self.arena.push(ExprNode::Select(cond, then_e, else_e)));
        }
        Ok(cond)
    }

    fn parse_logor(&mut self) -> PResult<ExprId> {
        self.parse_left_assoc(&[("||", BinOp::LogOr)], Self::parse_logand)
    }

    fn parse_logand(&mut self) -> PResult<ExprId> {
        self.parse_left_assoc(&[("&&", BinOp::LogAnd)], Self::parse_bitor)
    }

    fn parse_bitor(&mut self) -> PResult<ExprId> {
        self.parse_left_assoc(&[("|", BinOp::Or)], Self::parse_bitxor)
    }

    fn parse_bitxor(&mut self) -> PResult<ExprId> {
        self.parse_left_assoc(&[("^", BinOp::Xor)], Self::parse_bitand)
    }

    fn parse_bitand(&mut self) -> PResult<ExprId> {
        self.parse_left_assoc(&[("&", BinOp::And)], Self::parse_equality)
    }

    fn parse_equality(&mut self) -> PResult<ExprId> {
        self.parse_left_assoc(
            &[("==", BinOp::Eq), ("!=", BinOp::Ne)],
            Self::parse_relational,
        )
    }

    fn parse_relational(&mut self) -> PResult<ExprId> {
        self.parse_left_assoc(
            &[
                ("<=", BinOp::Le),
                (">=", BinOp::Ge),
                ("<", BinOp::Lt),
                (">", BinOp::Gt),
            ],
            Self::parse_shift,
        )
    }

    fn parse_shift(&mut self) -> PResult<ExprId> {
        self.parse_left_assoc(
            &[(">>>", BinOp::Sar), ("<<", BinOp::Shl), (">>", BinOp::Shr)],
            Self::parse_additive,
        )
    }

    fn parse_additive(&mut self) -> PResult<ExprId> {
        self.parse_left_assoc(&[("+", BinOp::Add), ("-", BinOp::Sub)], Self::parse_mul)
    }

    fn parse_mul(&mut self) -> PResult<ExprId> {
        self.parse_left_assoc(
            &[("*", BinOp::Mul), ("/", BinOp::Div), ("%", BinOp::Mod)],
            Self::parse_unary,
        )
    }

    fn parse_left_assoc(
        &mut self,
        ops: &[(&str, BinOp)],
        mut next: impl FnMut(&mut Self) -> PResult<ExprId>,
    ) -> PResult<ExprId> {
        let mut lhs = next(self)?;
        'outer: loop {
            for (spelling, op) in ops {
                if self.eat_punct(spelling) {
                    let rhs = next(self)?;
                    lhs = self.arena.push(ExprNode::Binary(*op, lhs, rhs));
                    continue 'outer;
                }
            }
            return Ok(lhs);
        }
    }

    fn parse_unary(&mut self) -> PResult<ExprId> {
        if self.eat_punct("-") {
            let e = self.parse_unary()?;
            return Ok(self.arena.push(ExprNode::Unary(UnOp::Neg, e)));
        }
        if self.eat_punct("~") {
            let e = self.parse_unary()?;
            return Ok(self.arena.push(ExprNode::Unary(UnOp::Not, e)));
        }
        if self.eat_punct("!") {
            let e = self.parse_unary()?;
            return Ok(self.arena.push(ExprNode::Unary(UnOp::LogNot, e)));
        }
        if self.eat_punct("+") {
            return self.parse_unary();
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> PResult<ExprId> {
        match self.peek().cloned() {
            Some(Token::Number(NumLit::Int(v))) => {
                self.pos += 1;
                Ok(self.arena.push(ExprNode::Literal(Value::Int(v))))
            }
            Some(Token::Number(NumLit::Float(v))) => {
                self.pos += 1;
                Ok(self
                    .arena
                    .push(ExprNode::Literal(Value::Int(v.to_bits()))))
            }
            Some(Token::Char(c)) => {
                self.pos += 1;
                Ok(self.arena.push(ExprNode::Literal(Value::Int(c as u64))))
            }
            Some(Token::Register(r)) => {
                self.pos += 1;
                Ok(self.arena.push(ExprNode::Literal(Value::Reg(r))))
            }
            Some(Token::Punct(".")) => {
                self.pos += 1;
                Ok(self.arena.push(ExprNode::ThisLocation))
            }
            Some(Token::Ident(name)) if name == "lit" || name == "lit64" => {
                let bits = if name == "lit" { 32 } else { 64 };
                self.pos += 1;
                self.expect_punct("(")?;
                let inner = self.parse_ternary()?;
                self.expect_punct(")")?;
                Ok(self.arena.push(ExprNode::LitWrap { bits, inner }))
            }
            Some(Token::Ident(name)) => {
                self.pos += 1;
                let full = self.extend_scoped_name(name)?;
                let sym = self.symtab.lookup(&full, true).expect("insert=true always succeeds");
                Ok(self.arena.push(ExprNode::SymbolRef(sym)))
            }
            Some(Token::Punct("(")) => {
                self.pos += 1;
                // Snapshot-capture form `(symbol)`: a bare identifier
                // (optionally scoped) immediately followed by `)`.
                if let Some(Token::Ident(name)) = self.peek().cloned() {
                    let save = self.pos;
                    self.pos += 1;
                    if let Ok(full) = self.extend_scoped_name(name) {
                        if self.eat_punct(")") {
                            let sym = self
                                .symtab
                                .lookup(&full, true)
                                .expect("insert=true always succeeds");
                            return Ok(self.arena.push(ExprNode::ParenSymbol(sym)));
                        }
                    }
                    self.pos = save;
                }
                let inner = self.parse_ternary()?;
                self.expect_punct(")")?;
                Ok(inner)
            }
            Some(other) => Err(self.err(format!("unexpected token {other:?} in expression"))),
            None => Err(self.err("unexpected end of expression")),
        }
    }

    /// Accumulate `::`-separated identifier components into a dotted scoped
    /// name (`a::b::sym`), starting from an already-consumed leading ident.
    fn extend_scoped_name(&mut self, first: String) -> PResult<String> {
        let mut full = first;
        while self.eat_punct("::") {
            match self.peek().cloned() {
                Some(Token::Ident(next)) => {
                    self.pos += 1;
                    full.push_str("::");
                    full.push_str(&next);
                }
                _ => return Err(self.err("expected identifier after '::'")),
            }
        }
        Ok(full)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;

    fn parse(src: &str) -> (ExprArena, ExprId) {
        let toks = Lexer::new(src).tokenize().unwrap();
        let mut arena = ExprArena::new();
        let mut symtab = SymbolTable::new();
        let id = {
            let mut p = Parser::new(&toks, &mut arena, &mut symtab);
            p.parse_expr().unwrap()
        };
        (arena, id)
    }

    #[test]
    fn additive_is_left_associative_and_lower_than_mul() {
        let (arena, id) = parse("1 + 2 * 3");
        match arena.get(id) {
            ExprNode::Binary(BinOp::Add, l, r) => {
                assert!(matches!(
                    arena.get(*l),
                    ExprNode::Literal(Value::Int(1))
                ));
                assert!(matches!(arena.get(*r), ExprNode::Binary(BinOp::Mul, _, _)));
            }
            other => panic!("{other:?}"),
        }
    }

    #[test]
    fn parens_around_bare_symbol_become_capture_form() {
        let (arena, id) = parse("(sym)");
        assert!(matches!(arena.get(id), ExprNode::ParenSymbol(_)));
    }

    #[test]
    fn parens_around_an_expression_are_just_grouping() {
        let (arena, id) = parse("(1 + 2) * 3");
        match arena.get(id) {
            ExprNode::Binary(BinOp::Mul, l, _) => {
                assert!(matches!(arena.get(*l), ExprNode::Binary(BinOp::Add, _, _)));
            }
            other => panic!("{other:?}"),
        }
    }

    #[test]
    fn scoped_dotted_names_parse_as_one_symbol_ref() {
        let (arena, id) = parse("a::b::c");
        match arena.get(id) {
            ExprNode::SymbolRef(_) => {}
            other => panic!("{other:?}"),
        }
    }

    #[test]
    fn lit_wrap_parses_its_argument() {
        let (_arena, _id) = parse("lit(1.0)");
    }

    #[test]
    fn ternary_select_binds_loosest() {
        let (arena, id) = parse("1 ? 2 : 3 + 4");
        match arena.get(id) {
            ExprNode::Select(_, _, else_) => {
                assert!(matches!(arena.get(*else_), ExprNode::Binary(BinOp::Add, _, _)));
            }
            other => panic!("{other:?}"),
        }
    }
}
