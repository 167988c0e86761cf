//! Tokeniser: turns one logical line of source text into a token stream.

use crate::token::{NumLit, Spanned, Token, try_register};

/// Multi-character operators, longest first so the scanner can match
/// greedily without backtracking.
const MULTI_OPS: &[&str] = &[
    ">>>", "<<", ">>", "&&", "||", "==", "!=", "<=", ">=", "::", "->",
];

pub struct Lexer<'a> {
    text: &'a str,
    bytes: &'a [u8],
    pos: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LexError {
    pub message: String,
    pub column: u32,
}

impl<'a> Lexer<'a> {
    pub fn new(text: &'a str) -> Self {
        Self {
            text,
            bytes: text.as_bytes(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    fn skip_ws_and_comments(&mut self) {
        loop {
            while matches!(self.peek(), Some(b' ') | Some(b'\t') | Some(b'\r')) {
                self.pos += 1;
            }
            match (self.peek(), self.peek_at(1)) {
                (Some(b'/'), Some(b'/')) => {
                    self.pos = self.bytes.len();
                }
                (Some(b'#'), _) => {
                    self.pos = self.bytes.len();
                }
                _ => break,
            }
        }
    }

    /// Tokenise the entire line. Stops (without error) at an unterminated
    /// construct only for the caller to report, per `spec.md` §7 Syntax:
    /// "parser skips to end-of-line and continues".
    pub fn tokenize(mut self) -> Result<Vec<Spanned<Token>>, LexError> {
        let mut out = Vec::new();
        loop {
            self.skip_ws_and_comments();
            let column = self.pos as u32 + 1;
            let Some(c) = self.peek() else { break };
            let tok = match c {
                b'"' => self.lex_string()?,
                b'\'' => self.lex_char()?,
                b'0'..=b'9' => self.lex_number()?,
                b'.' if self.peek_at(1).is_some_and(|b| b.is_ascii_digit()) => self.lex_number()?,
                b'\\' => self.lex_macro_arg(),
                c if is_ident_start(c) => self.lex_ident(),
                _ => self.lex_operator(column)?,
            };
            out.push(Spanned { value: tok, column });
        }
        Ok(out)
    }

    fn lex_ident(&mut self) -> Token {
        let start = self.pos;
        while self.peek().is_some_and(is_ident_continue) {
            self.pos += 1;
        }
        let text = &self.text[start..self.pos];
        if let Some(r) = try_register(text) {
            return Token::Register(r);
        }
        Token::Ident(text.to_string())
    }

    fn lex_macro_arg(&mut self) -> Token {
        self.pos += 1; // consume '\'
        if self.peek() == Some(b'@') {
            self.pos += 1;
            return Token::MacroArg("@".to_string());
        }
        let start = self.pos;
        while self.peek().is_some_and(is_ident_continue) {
            self.pos += 1;
        }
        Token::MacroArg(self.text[start..self.pos].to_string())
    }

    fn lex_number(&mut self) -> Result<Token, LexError> {
        let start = self.pos;
        let mut is_float = false;
        if self.peek() == Some(b'0') && matches!(self.peek_at(1), Some(b'x') | Some(b'X')) {
            self.pos += 2;
            while self.peek().is_some_and(|b| b.is_ascii_hexdigit()) {
                self.pos += 1;
            }
            let text = &self.text[start + 2..self.pos];
            let v = u64::from_str_radix(text, 16).map_err(|_| LexError {
                message: "malformed hex literal".into(),
                column: start as u32 + 1,
            })?;
            return Ok(Token::Number(NumLit::Int(v)));
        }
        while self.peek().is_some_and(|b| b.is_ascii_digit()) {
            self.pos += 1;
        }
        if self.peek() == Some(b'.') && self.peek_at(1) != Some(b'.') {
            is_float = true;
            self.pos += 1;
            while self.peek().is_some_and(|b| b.is_ascii_digit()) {
                self.pos += 1;
            }
        }
        if matches!(self.peek(), Some(b'e') | Some(b'E')) {
            let save = self.pos;
            self.pos += 1;
            if matches!(self.peek(), Some(b'+') | Some(b'-')) {
                self.pos += 1;
            }
            if self.peek().is_some_and(|b| b.is_ascii_digit()) {
                is_float = true;
                while self.peek().is_some_and(|b| b.is_ascii_digit()) {
                    self.pos += 1;
                }
            } else {
                self.pos = save;
            }
        }
        let text = &self.text[start..self.pos];
        if is_float {
            let v: f64 = text.parse().map_err(|_| LexError {
                message: "malformed float literal".into(),
                column: start as u32 + 1,
            })?;
            Ok(Token::Number(NumLit::Float(v)))
        } else if let Some(octal) = text.strip_prefix('0').filter(|s| !s.is_empty()) {
            let v = u64::from_str_radix(octal, 8).unwrap_or(0);
            Ok(Token::Number(NumLit::Int(v)))
        } else {
            let v: u64 = text.parse().map_err(|_| LexError {
                message: "malformed integer literal".into(),
                column: start as u32 + 1,
            })?;
            Ok(Token::Number(NumLit::Int(v)))
        }
    }

    fn lex_string(&mut self) -> Result<Token, LexError> {
        let col = self.pos as u32 + 1;
        self.pos += 1;
        let mut s = String::new();
        loop {
            match self.bump() {
                Some(b'"') => return Ok(Token::Str(s)),
                Some(b'\\') => s.push(self.lex_escape()),
                Some(c) => s.push(c as char),
                None => {
                    return Err(LexError {
                        message: "unterminated string literal".into(),
                        column: col,
                    });
                }
            }
        }
    }

    fn lex_char(&mut self) -> Result<Token, LexError> {
        let col = self.pos as u32 + 1;
        self.pos += 1;
        let c = match self.bump() {
            Some(b'\\') => self.lex_escape(),
            Some(c) => c as char,
            None => {
                return Err(LexError {
                    message: "unterminated character literal".into(),
                    column: col,
                });
            }
        };
        if self.bump() != Some(b'\'') {
            return Err(LexError {
                message: "unterminated character literal".into(),
                column: col,
            });
        }
        Ok(Token::Char(c))
    }

    fn lex_escape(&mut self) -> char {
        match self.bump() {
            Some(b'n') => '\n',
            Some(b't') => '\t',
            Some(b'r') => '\r',
            Some(b'0') => '\0',
            Some(b'\\') => '\\',
            Some(b'\'') => '\'',
            Some(b'"') => '"',
            Some(c) => c as char,
            None => '\\',
        }
    }

    fn lex_operator(&mut self, column: u32) -> Result<Token, LexError> {
        for op in MULTI_OPS {
            if self.text[self.pos..].starts_with(op) {
                self.pos += op.len();
                return Ok(Token::Punct(op));
            }
        }
        let c = self.bump().ok_or(LexError {
            message: "unexpected end of line".into(),
            column,
        })?;
        const SINGLE: &[(u8, &str)] = &[
            (b'+', "+"),
            (b'-', "-"),
            (b'*', "*"),
            (b'/', "/"),
            (b'%', "%"),
            (b'&', "&"),
            (b'|', "|"),
            (b'^', "^"),
            (b'~', "~"),
            (b'!', "!"),
            (b'<', "<"),
            (b'>', ">"),
            (b'(', "("),
            (b')', ")"),
            (b'[', "["),
            (b']', "]"),
            (b',', ","),
            (b':', ":"),
            (b'.', "."),
            (b'@', "@"),
            (b'?', "?"),
        ];
        for (byte, s) in SINGLE {
            if *byte == c {
                return Ok(Token::Punct(s));
            }
        }
        Err(LexError {
            message: format!("unexpected character '{}'", c as char),
            column,
        })
    }
}

fn is_ident_start(c: u8) -> bool {
    c.is_ascii_alphabetic() || c == b'_' || c == b'.' || c == b'$'
}

fn is_ident_continue(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'_' || c == b'$'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toks(s: &str) -> Vec<Token> {
        Lexer::new(s)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|s| s.value)
            .collect()
    }

    #[test]
    fn tokenizes_byte_directive_operands() {
        assert_eq!(
            toks(".byte 1,2,3"),
            vec![
                Token::Ident(".byte".into()),
                Token::Number(NumLit::Int(1)),
                Token::Punct(","),
                Token::Number(NumLit::Int(2)),
                Token::Punct(","),
                Token::Number(NumLit::Int(3)),
            ]
        );
    }

    #[test]
    fn tokenizes_register_range_and_arithmetic_shifts() {
        assert_eq!(
            toks("v[4:7] >>> 2"),
            vec![
                Token::Register(asm_symtab::RegRef::range(asm_symtab::RegClass::Vgpr, 4, 7)),
                Token::Punct(">>>"),
                Token::Number(NumLit::Int(2)),
            ]
        );
    }

    #[test]
    fn strips_line_comments() {
        assert_eq!(
            toks("mov x // trailing comment"),
            vec![Token::Ident("mov".into()), Token::Ident("x".into())]
        );
    }

    #[test]
    fn hex_and_string_literals() {
        assert_eq!(
            toks(r#"0xBE8003FF "hi\n""#),
            vec![
                Token::Number(NumLit::Int(0xBE8003FF)),
                Token::Str("hi\n".to_string()),
            ]
        );
    }

    #[test]
    fn unterminated_string_is_a_lex_error() {
        let err = Lexer::new("\"abc").tokenize().unwrap_err();
        assert_eq!(err.column, 1);
    }
}
