//! Per-line, column-driven lexing (`spec.md` §4.B).

use asm_symtab::{RegClass, RegRef};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NumLit {
    Int(u64),
    Float(f64),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Ident(String),
    Number(NumLit),
    Str(String),
    Char(char),
    /// A register specifier recognised directly by the lexer: `s0`, `v[4:7]`.
    Register(RegRef),
    /// Punctuation and operators, kept as their literal spelling so the
    /// parser's precedence table can match on it directly.
    Punct(&'static str),
    /// `\name` or `\@` inside a macro body, left for the macro filter to
    /// substitute before re-lexing.
    MacroArg(String),
    Eol,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Col(pub u32);

#[derive(Debug, Clone, PartialEq)]
pub struct Spanned<T> {
    pub value: T,
    pub column: u32,
}

/// Try to parse an identifier as a bare or ranged register specifier
/// (`s0`, `v12`, `s[4:7]`, `v[8:11]`). Returns `None` for anything else,
/// including named register variables (those resolve through the regvar
/// table instead).
pub fn try_register(text: &str) -> Option<RegRef> {
    let (class_ch, rest) = text.split_at(1);
    let class = match class_ch {
        "s" | "S" => RegClass::Sgpr,
        "v" | "V" => RegClass::Vgpr,
        _ => return None,
    };
    if rest.is_empty() {
        return None;
    }
    if let Some(inner) = rest.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
        let (lo, hi) = inner.split_once(':')?;
        let lo: u16 = lo.parse().ok()?;
        let hi: u16 = hi.parse().ok()?;
        if hi < lo {
            return None;
        }
        return Some(RegRef::range(class, lo, hi));
    }
    let idx: u16 = rest.parse().ok()?;
    Some(RegRef::single(class, idx))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognises_bare_and_ranged_registers() {
        assert_eq!(
            try_register("s0"),
            Some(RegRef::single(RegClass::Sgpr, 0))
        );
        assert_eq!(
            try_register("v[4:7]"),
            Some(RegRef::range(RegClass::Vgpr, 4, 7))
        );
        assert_eq!(try_register("foo"), None);
        assert_eq!(try_register("v[7:4]"), None);
    }
}
