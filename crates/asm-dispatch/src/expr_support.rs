//! Small helpers gluing `asm-lexer`'s tokeniser/parser into the dispatcher's
//! line-oriented directive parsing: splitting an operand list on top-level
//! commas, and parsing+evaluating one expression in a single call.

use asm_diag::{DiagSink, SourcePos};
use asm_lexer::{EvalTarget, Evaluator, ExprArena, ExprId, Lexer, ParseError, Parser, Spanned, Token};
use asm_symtab::{SymbolTable, Value};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirError {
    pub message: String,
}

impl DirError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

impl From<ParseError> for DirError {
    fn from(e: ParseError) -> Self {
        DirError::new(e.message)
    }
}

/// Lex `text` into a token stream, reporting a syntax diagnostic (and
/// returning an empty stream) on failure rather than propagating an error
/// up through every call site (`spec.md` §7: "logged; parser skips to
/// end-of-line and continues").
pub fn lex_or_diag(text: &str, diag: &dyn DiagSink, pos: &Option<SourcePos>) -> Vec<Spanned<Token>> {
    match Lexer::new(text).tokenize() {
        Ok(toks) => toks,
        Err(e) => {
            let mut d = asm_diag::Diagnostic::error(asm_diag::DiagCode::Syntax, e.message);
            if let Some(p) = pos {
                d = d.at(p.clone());
            }
            diag.emit(d);
            Vec::new()
        }
    }
}

/// Split a token slice on top-level commas (respecting `(...)`/`[...]`
/// nesting), the way a directive's or instruction's operand list is laid
/// out in source text.
pub fn split_commas(tokens: &[Spanned<Token>]) -> Vec<&[Spanned<Token>]> {
    if tokens.is_empty() {
        return Vec::new();
    }
    let mut out = Vec::new();
    let mut depth: i32 = 0;
    let mut start = 0usize;
    for (i, t) in tokens.iter().enumerate() {
        match &t.value {
            Token::Punct("(") | Token::Punct("[") => depth += 1,
            Token::Punct(")") | Token::Punct("]") => depth -= 1,
            Token::Punct(",") if depth == 0 => {
                out.push(&tokens[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    out.push(&tokens[start..]);
    out
}

/// Parse one expression from a token slice, requiring full consumption.
pub fn parse_expr(
    tokens: &[Spanned<Token>],
    arena: &mut ExprArena,
    symtab: &mut SymbolTable,
) -> Result<ExprId, DirError> {
    let mut p = Parser::new(tokens, arena, symtab);
    Ok(p.parse_expr()?)
}

/// Parse then immediately evaluate one expression, registering `owner` as
/// the occurrence on any symbol reference reached (`spec.md` §3 "every
/// occurrence in an expression tree holds a back-reference").
pub fn eval_tokens(
    tokens: &[Spanned<Token>],
    arena: &mut ExprArena,
    symtab: &mut SymbolTable,
    here: EvalTarget,
    owner: Option<ExprId>,
) -> Result<(ExprId, Value), DirError> {
    let id = parse_expr(tokens, arena, symtab)?;
    let mut ev = Evaluator::new(arena, symtab, here);
    let v = ev
        .eval(id, owner)
        .map_err(|e| DirError::new(e.message))?;
    Ok((id, v))
}

/// Split raw, unlexed source text on top-level commas (respecting
/// `()`/`[]` nesting and string/char literals), for contexts that need
/// the literal argument text rather than a token stream: macro-invocation
/// arguments, which are substituted textually into the macro body before
/// anything is re-lexed.
pub fn split_commas_text(s: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut depth = 0i32;
    let mut start = 0usize;
    let mut in_str: Option<char> = None;
    let chars: Vec<char> = s.chars().collect();
    for (i, &c) in chars.iter().enumerate() {
        if let Some(q) = in_str {
            if c == q {
                in_str = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => in_str = Some(c),
            '(' | '[' => depth += 1,
            ')' | ']' => depth -= 1,
            ',' if depth == 0 => {
                out.push(chars[start..i].iter().collect::<String>().trim().to_string());
                start = i + 1;
            }
            _ => {}
        }
    }
    let tail: String = chars[start..].iter().collect::<String>().trim().to_string();
    if !tail.is_empty() || !out.is_empty() {
        out.push(tail);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_top_level_commas_but_not_nested_ones() {
        let toks = Lexer::new("1, (2,3), 4").tokenize().unwrap();
        let parts = split_commas(&toks);
        assert_eq!(parts.len(), 3);
    }

    #[test]
    fn splits_raw_text_commas_for_macro_arguments() {
        let parts = split_commas_text("5, 6");
        assert_eq!(parts, vec!["5".to_string(), "6".to_string()]);
    }

    #[test]
    fn empty_text_has_no_arguments() {
        assert!(split_commas_text("").is_empty());
        assert!(split_commas_text("   ").is_empty());
    }
}
