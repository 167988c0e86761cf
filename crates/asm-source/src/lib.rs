//! Source stream & input filters (`spec.md` §4.A component A).
//!
//! Filters form a LIFO stack (`spec.md` §9 "polymorphic input filters"): a
//! tagged enum rather than a trait object, so the stack is a plain `Vec`
//! with no boxing or dynamic dispatch. Each filter owns its buffer and
//! tracks its own source position; `FilterStack::read_line` asks the top
//! filter and pops it on exhaustion.

use asm_diag::SourcePos;
use std::collections::HashMap;
use std::sync::Arc;

/// `spec.md` §4.A: "maximum nesting depth 256 for macros and 64 for
/// includes; exceeding either is a fatal error on that line".
pub const MAX_MACRO_DEPTH: usize = 256;
pub const MAX_INCLUDE_DEPTH: usize = 64;

#[derive(Debug, thiserror::Error, Clone, Copy, PartialEq, Eq)]
pub enum FilterError {
    #[error("macro/repeat nesting exceeds the maximum depth of {0}")]
    MacroDepthExceeded(usize),
    #[error("include nesting exceeds the maximum depth of {0}")]
    IncludeDepthExceeded(usize),
}

/// Where a line of input came from, for diagnostics and introspection
/// (`current_source`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceDescriptor {
    Stream { file: Arc<str> },
    Macro { name: Arc<str> },
    Repeat { label: Arc<str> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineRecord {
    pub text: String,
    pub source: SourceDescriptor,
}

/// A captured macro body and its parameter list, ready to be replayed by a
/// `MacroFilter` (`spec.md` §3 "Macro").
#[derive(Debug, Clone)]
pub struct MacroDef {
    pub name: Arc<str>,
    pub params: Vec<String>,
    pub defaults: Vec<Option<String>>,
    pub body: Vec<String>,
    pub case_sensitive: bool,
}

impl MacroDef {
    /// Bind `args` against the parameter list (falling back to declared
    /// defaults, then empty string) and produce a filter that replays the
    /// body with substitution applied line by line.
    pub fn invoke(&self, args: &[String], invocation_id: u64) -> MacroFilter {
        let mut bound = HashMap::new();
        for (i, param) in self.params.iter().enumerate() {
            let val = args
                .get(i)
                .cloned()
                .or_else(|| self.defaults.get(i).cloned().flatten())
                .unwrap_or_default();
            let key = normalize_key(param, self.case_sensitive);
            bound.insert(key, val);
        }
        MacroFilter {
            name: self.name.clone(),
            body: self.body.clone(),
            idx: 0,
            line_no: 0,
            args: bound,
            invocation_id,
            case_sensitive: self.case_sensitive,
        }
    }
}

fn normalize_key(name: &str, case_sensitive: bool) -> String {
    if case_sensitive {
        name.to_string()
    } else {
        name.to_lowercase()
    }
}

/// Replace `\argname` and `\@` occurrences in `line` using `args` (keys
/// already normalised the same way `args` was populated) and the running
/// invocation id.
fn substitute(line: &str, args: &HashMap<String, String>, invocation_id: u64, case_sensitive: bool) -> String {
    let mut out = String::with_capacity(line.len());
    let chars: Vec<char> = line.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == '\\' {
            if chars.get(i + 1) == Some(&'@') {
                out.push_str(&invocation_id.to_string());
                i += 2;
                continue;
            }
            let start = i + 1;
            let mut j = start;
            while j < chars.len() && (chars[j].is_alphanumeric() || chars[j] == '_') {
                j += 1;
            }
            if j > start {
                let name: String = chars[start..j].iter().collect();
                let key = normalize_key(&name, case_sensitive);
                if let Some(v) = args.get(&key) {
                    out.push_str(v);
                    i = j;
                    continue;
                }
            }
        }
        out.push(chars[i]);
        i += 1;
    }
    out
}

/// Reads physical lines from a whole-file buffer, folding `\`-terminated
/// continuations into one logical line (`spec.md` §4.A).
pub struct StreamFilter {
    file: Arc<str>,
    lines: Vec<String>,
    idx: usize,
    current_line_no: u32,
}

impl StreamFilter {
    pub fn new(file: impl Into<Arc<str>>, content: &str) -> Self {
        Self {
            file: file.into(),
            lines: content.lines().map(str::to_string).collect(),
            idx: 0,
            current_line_no: 0,
        }
    }

    fn read_line(&mut self) -> Option<LineRecord> {
        if self.idx >= self.lines.len() {
            return None;
        }
        let start_line = self.idx as u32 + 1;
        let mut logical = String::new();
        loop {
            if self.idx >= self.lines.len() {
                break;
            }
            let physical = self.lines[self.idx].clone();
            self.idx += 1;
            if let Some(stripped) = physical.strip_suffix('\\') {
                logical.push_str(stripped);
            } else {
                logical.push_str(&physical);
                break;
            }
        }
        self.current_line_no = start_line;
        Some(LineRecord {
            text: logical,
            source: SourceDescriptor::Stream {
                file: self.file.clone(),
            },
        })
    }

    fn translate_position(&self, column: u32) -> SourcePos {
        SourcePos::new(self.file.clone(), self.current_line_no, column)
    }
}

/// Replays a macro body, substituting `\argname`/`\@` as each line is read.
pub struct MacroFilter {
    name: Arc<str>,
    body: Vec<String>,
    idx: usize,
    line_no: u32,
    args: HashMap<String, String>,
    invocation_id: u64,
    case_sensitive: bool,
}

impl MacroFilter {
    fn read_line(&mut self) -> Option<LineRecord> {
        if self.idx >= self.body.len() {
            return None;
        }
        let raw = &self.body[self.idx];
        self.line_no = self.idx as u32 + 1;
        self.idx += 1;
        let text = substitute(raw, &self.args, self.invocation_id, self.case_sensitive);
        Some(LineRecord {
            text,
            source: SourceDescriptor::Macro {
                name: self.name.clone(),
            },
        })
    }

    fn translate_position(&self, column: u32) -> SourcePos {
        SourcePos::new(format!("<macro {}>", self.name), self.line_no, column)
    }
}

/// One iteration variable binding for `.irp`/`.irpc` (`spec.md` §4.A).
#[derive(Debug, Clone)]
pub struct IterVar {
    pub name: String,
    pub values: Vec<String>,
}

/// Replays a captured block `count` times (`.rept`), or once per value of an
/// iteration variable (`.irp`/`.irpc`), substituting like a macro body when
/// an iteration variable is present.
pub struct RepeatFilter {
    label: Arc<str>,
    body: Vec<String>,
    idx: usize,
    line_no: u32,
    pass: u64,
    count: u64,
    iter_var: Option<IterVar>,
    case_sensitive: bool,
}

impl RepeatFilter {
    pub fn rept(label: impl Into<Arc<str>>, body: Vec<String>, count: u64) -> Self {
        Self {
            label: label.into(),
            body,
            idx: 0,
            line_no: 0,
            pass: 0,
            count,
            iter_var: None,
            case_sensitive: true,
        }
    }

    pub fn irp(label: impl Into<Arc<str>>, body: Vec<String>, var: IterVar, case_sensitive: bool) -> Self {
        let count = var.values.len() as u64;
        Self {
            label: label.into(),
            body,
            idx: 0,
            line_no: 0,
            pass: 0,
            count,
            iter_var: Some(var),
            case_sensitive,
        }
    }

    fn read_line(&mut self) -> Option<LineRecord> {
        loop {
            if self.pass >= self.count {
                return None;
            }
            if self.idx >= self.body.len() {
                self.pass += 1;
                self.idx = 0;
                continue;
            }
            let raw = self.body[self.idx].clone();
            self.line_no = self.idx as u32 + 1;
            self.idx += 1;
            let text = match &self.iter_var {
                Some(v) => {
                    let mut args = HashMap::new();
                    args.insert(
                        normalize_key(&v.name, self.case_sensitive),
                        v.values[self.pass as usize].clone(),
                    );
                    substitute(&raw, &args, 0, self.case_sensitive)
                }
                None => raw,
            };
            return Some(LineRecord {
                text,
                source: SourceDescriptor::Repeat {
                    label: self.label.clone(),
                },
            });
        }
    }

    fn translate_position(&self, column: u32) -> SourcePos {
        SourcePos::new(format!("<repeat {}>", self.label), self.line_no, column)
    }
}

/// Tagged variant of {stream, macro, repeat} (`spec.md` §9).
pub enum Filter {
    Stream(StreamFilter),
    Macro(MacroFilter),
    Repeat(RepeatFilter),
}

impl Filter {
    fn read_line(&mut self) -> Option<LineRecord> {
        match self {
            Filter::Stream(f) => f.read_line(),
            Filter::Macro(f) => f.read_line(),
            Filter::Repeat(f) => f.read_line(),
        }
    }

    fn translate_position(&self, column: u32) -> SourcePos {
        match self {
            Filter::Stream(f) => f.translate_position(column),
            Filter::Macro(f) => f.translate_position(column),
            Filter::Repeat(f) => f.translate_position(column),
        }
    }

    fn source(&self) -> SourceDescriptor {
        match self {
            Filter::Stream(f) => SourceDescriptor::Stream {
                file: f.file.clone(),
            },
            Filter::Macro(f) => SourceDescriptor::Macro { name: f.name.clone() },
            Filter::Repeat(f) => SourceDescriptor::Repeat {
                label: f.label.clone(),
            },
        }
    }
}

/// Owns the LIFO filter stack and enforces the nesting-depth limits.
#[derive(Default)]
pub struct FilterStack {
    stack: Vec<Filter>,
    include_depth: usize,
    macro_depth: usize,
}

impl FilterStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_stream(&mut self, filter: StreamFilter) -> Result<(), FilterError> {
        if self.include_depth >= MAX_INCLUDE_DEPTH {
            return Err(FilterError::IncludeDepthExceeded(MAX_INCLUDE_DEPTH));
        }
        self.include_depth += 1;
        self.stack.push(Filter::Stream(filter));
        Ok(())
    }

    pub fn push_macro(&mut self, filter: MacroFilter) -> Result<(), FilterError> {
        if self.macro_depth >= MAX_MACRO_DEPTH {
            return Err(FilterError::MacroDepthExceeded(MAX_MACRO_DEPTH));
        }
        self.macro_depth += 1;
        self.stack.push(Filter::Macro(filter));
        Ok(())
    }

    pub fn push_repeat(&mut self, filter: RepeatFilter) -> Result<(), FilterError> {
        if self.macro_depth >= MAX_MACRO_DEPTH {
            return Err(FilterError::MacroDepthExceeded(MAX_MACRO_DEPTH));
        }
        self.macro_depth += 1;
        self.stack.push(Filter::Repeat(filter));
        Ok(())
    }

    /// Pull one logical line from the top filter, popping exhausted filters
    /// until a line is produced or the stack empties.
    pub fn read_line(&mut self) -> Option<LineRecord> {
        loop {
            let line = self.stack.last_mut()?.read_line();
            if let Some(line) = line {
                return Some(line);
            }
            match self.stack.pop().unwrap() {
                Filter::Stream(_) => self.include_depth -= 1,
                Filter::Macro(_) | Filter::Repeat(_) => self.macro_depth -= 1,
            }
        }
    }

    pub fn translate_position(&self, column: u32) -> Option<SourcePos> {
        self.stack.last().map(|f| f.translate_position(column))
    }

    pub fn current_source(&self) -> Option<SourceDescriptor> {
        self.stack.last().map(|f| f.source())
    }

    pub fn current_macro_substitution(&self) -> Option<Arc<str>> {
        match self.stack.last()? {
            Filter::Macro(f) => Some(f.name.clone()),
            _ => None,
        }
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_filter_folds_line_continuations() {
        let mut f = StreamFilter::new("a.s", "foo \\\nbar\nbaz");
        let l1 = f.read_line().unwrap();
        assert_eq!(l1.text, "foo bar");
        let l2 = f.read_line().unwrap();
        assert_eq!(l2.text, "baz");
        assert!(f.read_line().is_none());
    }

    #[test]
    fn macro_filter_substitutes_args_and_invocation_id() {
        let def = MacroDef {
            name: "pair".into(),
            params: vec!["a".into(), "b".into()],
            defaults: vec![None, None],
            body: vec![".byte \\a, \\b, \\@".into()],
            case_sensitive: false,
        };
        let mut filter = def.invoke(&["5".into(), "6".into()], 3);
        let line = filter.read_line().unwrap();
        assert_eq!(line.text, ".byte 5, 6, 3");
        assert!(filter.read_line().is_none());
    }

    #[test]
    fn macro_filter_falls_back_to_default_for_missing_arg() {
        let def = MacroDef {
            name: "m".into(),
            params: vec!["a".into()],
            defaults: vec![Some("9".into())],
            body: vec!["\\a".into()],
            case_sensitive: false,
        };
        let mut filter = def.invoke(&[], 0);
        assert_eq!(filter.read_line().unwrap().text, "9");
    }

    #[test]
    fn rept_replays_body_n_times() {
        let mut f = RepeatFilter::rept("r", vec![".byte 0xAA".into()], 3);
        let lines: Vec<_> = std::iter::from_fn(|| f.read_line()).collect();
        assert_eq!(lines.len(), 3);
        assert!(lines.iter().all(|l| l.text == ".byte 0xAA"));
    }

    #[test]
    fn irp_binds_one_value_per_pass() {
        let var = IterVar {
            name: "x".into(),
            values: vec!["1".into(), "2".into(), "3".into()],
        };
        let mut f = RepeatFilter::irp("r", vec![".byte \\x".into()], var, false);
        let lines: Vec<_> = std::iter::from_fn(|| f.read_line())
            .map(|l| l.text)
            .collect();
        assert_eq!(lines, vec![".byte 1", ".byte 2", ".byte 3"]);
    }

    #[test]
    fn filter_stack_pops_exhausted_filters_and_resumes_enclosing() {
        let mut stack = FilterStack::new();
        stack.push_stream(StreamFilter::new("outer.s", "a\nb")).unwrap();
        // Simulate a macro invocation interleaved mid-stream.
        let line = stack.read_line().unwrap();
        assert_eq!(line.text, "a");
        let def = MacroDef {
            name: "m".into(),
            params: vec![],
            defaults: vec![],
            body: vec!["inner".into()],
            case_sensitive: true,
        };
        stack.push_macro(def.invoke(&[], 1)).unwrap();
        assert_eq!(stack.read_line().unwrap().text, "inner");
        // Macro exhausted, falls back to the stream filter's next line.
        assert_eq!(stack.read_line().unwrap().text, "b");
        assert!(stack.read_line().is_none());
        assert!(stack.is_empty());
    }

    #[test]
    fn include_depth_limit_is_enforced() {
        let mut stack = FilterStack::new();
        for i in 0..MAX_INCLUDE_DEPTH {
            stack
                .push_stream(StreamFilter::new(format!("f{i}.s"), "x"))
                .unwrap();
        }
        assert_eq!(
            stack.push_stream(StreamFilter::new("overflow.s", "x")),
            Err(FilterError::IncludeDepthExceeded(MAX_INCLUDE_DEPTH))
        );
    }
}
