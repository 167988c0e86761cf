//! The pseudo-op dispatcher's main loop (`spec.md` §4.D, §2 "Control
//! flow"): pulls one logical line from the top of the input-filter stack,
//! classifies it as label / macro invocation / directive / instruction,
//! and drives components B/C/E/F/G accordingly.

use std::collections::HashMap;

use asm_diag::{DiagCode, DiagSink, Diagnostic, SourcePos};
use asm_encoder::{Encoder, Gpu, RvuStream};
use asm_format::{AmdLegacyFormat, Amdcl2Format, FormatHandler, Kernel, KernelConfig, RawFormat};
use asm_lexer::{EvalTarget, ExprArena, Lexer};
use asm_regalloc::{Allocator, RegVarTable};
use asm_source::StreamFilter;
use asm_symtab::{EvalContext, ScopeId, SectionFlags, SectionId, SectionTable, SectionType, SymbolTable, Value};

use crate::includes::IncludeResolver;
use crate::macros::MacroTable;
use crate::options::DialectConfig;
use crate::pending::{report_unresolved, retry_to_fixed_point, PendingSet};
use crate::regvars::{DepsBuilder, RegVarNames};

/// Output container flavour, selected by `--format`/`-F` at the CLI layer
/// (`spec.md` §4.G).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Raw,
    AmdLegacy,
    Amdcl2,
}

fn make_format(kind: OutputFormat) -> Box<dyn FormatHandler> {
    match kind {
        OutputFormat::Raw => Box::new(RawFormat),
        OutputFormat::AmdLegacy => Box::new(AmdLegacyFormat),
        OutputFormat::Amdcl2 => Box::new(Amdcl2Format),
    }
}

/// Counts surfaced at end of assembly (`SPEC_FULL.md` §3 `BuildTelemetry`).
#[derive(Debug, Clone, Copy, Default)]
pub struct BuildTelemetry {
    pub instructions_encoded: u64,
    pub bytes_emitted: u64,
    pub warnings: u64,
    pub errors: u64,
}

pub struct Assembler<'a> {
    pub(crate) dialect: DialectConfig,
    pub(crate) diag: &'a dyn DiagSink,
    pub(crate) includes: &'a dyn IncludeResolver,
    pub(crate) gpu: Gpu,

    pub(crate) filters: asm_source::FilterStack,
    pub(crate) arena: ExprArena,
    pub(crate) symtab: SymbolTable,
    pub(crate) sections: SectionTable,
    pub(crate) macros: MacroTable,

    pub(crate) regvar_names: RegVarNames,
    pub(crate) regvar_decls: RegVarTable,
    pub(crate) deps: DepsBuilder,

    pub(crate) kernels: Vec<Kernel>,
    pub(crate) current_kernel: Option<u32>,
    next_kernel_id: u32,
    pub(crate) scope_names: HashMap<String, ScopeId>,

    pub(crate) format: Box<dyn FormatHandler>,
    format_kind: OutputFormat,
    pub(crate) encoder: Encoder,
    pub(crate) rvu: HashMap<SectionId, RvuStream>,
    pub(crate) pending: PendingSet,

    pub(crate) instructions_encoded: u64,
}

impl<'a> Assembler<'a> {
    pub fn new(
        gpu: Gpu,
        format: OutputFormat,
        dialect: DialectConfig,
        diag: &'a dyn DiagSink,
        includes: &'a dyn IncludeResolver,
    ) -> Self {
        Self {
            dialect,
            diag,
            includes,
            gpu,
            filters: asm_source::FilterStack::new(),
            arena: ExprArena::new(),
            symtab: SymbolTable::new(),
            sections: SectionTable::new(),
            macros: MacroTable::new(),
            regvar_names: RegVarNames::new(),
            regvar_decls: RegVarTable::new(),
            deps: DepsBuilder::new(),
            kernels: Vec::new(),
            current_kernel: None,
            next_kernel_id: 0,
            scope_names: HashMap::new(),
            format: make_format(format),
            format_kind: format,
            encoder: Encoder::new(gpu),
            rvu: HashMap::new(),
            pending: PendingSet::new(),
            instructions_encoded: 0,
        }
    }

    pub(crate) fn emit_diag(&self, code: DiagCode, pos: Option<SourcePos>, message: impl Into<String>) {
        let mut d = Diagnostic::error(code, message);
        if let Some(p) = pos {
            d = d.at(p);
        }
        self.diag.emit(d);
    }

    pub(crate) fn current_pos(&self) -> Option<SourcePos> {
        self.filters.translate_position(1)
    }

    pub(crate) fn here(&self) -> EvalTarget {
        match self.sections.current() {
            Some(id) => EvalTarget {
                section: id,
                offset: self.sections.get(id).map(|s| s.current_out_pos()).unwrap_or(0),
            },
            None => EvalTarget {
                section: SectionId::ABS,
                offset: 0,
            },
        }
    }

    pub(crate) fn eval_context(&self) -> EvalContext {
        let t = self.here();
        EvalContext {
            section: t.section,
            offset: t.offset,
        }
    }

    /// All sections accumulated during assembly, handed to the binary
    /// generator the CLI layer selects by `--format`.
    pub fn sections(&self) -> &SectionTable {
        &self.sections
    }

    /// Kernels declared via `.kernel`, in declaration order.
    pub fn kernels(&self) -> &[Kernel] {
        &self.kernels
    }

    /// The output format this assembler was constructed with.
    pub fn output_format(&self) -> OutputFormat {
        self.format_kind
    }

    /// Byte/instruction counters surfaced to the CLI layer at end of assembly.
    pub fn telemetry(&self) -> BuildTelemetry {
        BuildTelemetry {
            instructions_encoded: self.instructions_encoded,
            bytes_emitted: self.sections.iter().map(|s| s.content.len() as u64).sum(),
            warnings: 0,
            errors: 0,
        }
    }

    /// Begin (or resume, if already created) kernel `name` and make it current.
    pub(crate) fn begin_kernel(&mut self, name: &str) -> u32 {
        if let Some(k) = self.kernels.iter().find(|k| k.name == name) {
            let id = k.id;
            self.current_kernel = Some(id);
            return id;
        }
        let id = self.next_kernel_id;
        self.next_kernel_id += 1;
        let config = match self.format_kind {
            OutputFormat::Amdcl2 => KernelConfig::Amdcl2(Default::default()),
            OutputFormat::AmdLegacy => KernelConfig::Legacy(Default::default()),
            OutputFormat::Raw => KernelConfig::None,
        };
        self.kernels.push(Kernel::new(id, name, config));
        self.current_kernel = Some(id);
        id
    }

    /// Run the whole pipeline over one source buffer: lex/parse/dispatch to
    /// a fixed point, then (if any regvars were used) register-allocate and
    /// hand the result to the format handler's `finalise`.
    pub fn assemble(&mut self, file_name: &str, source: &str) -> bool {
        self.filters
            .push_stream(StreamFilter::new(file_name, source))
            .expect("top-level source push never exceeds the include-depth limit");

        while let Some(line) = self.filters.read_line() {
            self.dispatch_line(&line.text);
        }

        retry_to_fixed_point(&self.arena, &mut self.symtab, &mut self.sections, &mut self.pending);
        if !self.pending.is_empty() {
            report_unresolved(&self.pending, self.diag);
        }

        if !self.regvar_decls.ids().collect::<Vec<_>>().is_empty() {
            self.run_register_allocation();
        }

        if let Err(e) = self.format.finalise(&self.kernels, &self.sections) {
            self.emit_diag(DiagCode::Internal, None, e.to_string());
        }

        !self.diag.has_errors()
    }

    fn run_register_allocation(&mut self) {
        let deps = self.deps.build();
        let section_ids: Vec<SectionId> = self.sections.iter().map(|s| s.id).collect();
        for id in section_ids {
            let rvu_items = self.rvu.get(&id).map(|r| r.all().to_vec()).unwrap_or_default();
            if rvu_items.is_empty() {
                continue;
            }
            let section = self.sections.get(id).expect("section exists").clone();
            match Allocator::allocate(&section, &rvu_items, &self.regvar_decls, &deps) {
                Ok(coloring) => {
                    let section_mut = self.sections.get_mut(id).expect("section exists");
                    Allocator::emit(section_mut, &rvu_items, &coloring);
                }
                Err(e) => self.emit_diag(DiagCode::Internal, None, e.to_string()),
            }
        }
    }

    fn dispatch_line(&mut self, raw: &str) {
        let text = raw.trim_end();
        let trimmed = text.trim_start();
        if trimmed.is_empty() {
            return;
        }

        let (label, rest) = split_label(trimmed);
        if let Some(name) = label {
            self.define_label(name);
        }
        let rest = rest.trim_start();
        if rest.is_empty() {
            return;
        }

        if let Some(dir) = rest.strip_prefix('.') {
            let (name, args) = split_first_word(dir);
            crate::directive::execute(self, &format!(".{name}"), args.trim_start());
            return;
        }

        let (first, rest_after_first) = split_first_word(rest);
        if self.macros.contains(&first, self.dialect.case_sensitive_names) {
            self.invoke_macro(&first, rest_after_first.trim_start());
            return;
        }

        self.dispatch_instruction(first.trim(), rest_after_first.trim());
    }

    fn define_label(&mut self, name: &str) {
        let here = self.here();
        let sym = self.symtab.lookup(name, true).expect("insert=true always succeeds");
        if self.symtab.is_never_assigned(sym) {
            self.symtab.set_value(
                sym,
                Value::Addr {
                    section: here.section,
                    offset: here.offset,
                },
            );
        } else {
            let pos = self.current_pos();
            self.emit_diag(DiagCode::DuplicateSymbol, pos, format!("label `{name}` redefined"));
        }
    }

    fn invoke_macro(&mut self, name: &str, args_text: &str) {
        let args: Vec<String> = crate::expr_support::split_commas_text(args_text);
        let case_sensitive = self.dialect.case_sensitive_names;
        let Some(def) = self.macros.get(name, case_sensitive).cloned() else {
            return;
        };
        let invocation_id = self.macros.next_invocation_id();
        let filter = def.invoke(&args, invocation_id);
        if self.filters.push_macro(filter).is_err() {
            let pos = self.current_pos();
            self.emit_diag(DiagCode::NestingExceeded, pos, "macro nesting exceeds the maximum depth");
        }
    }

    fn dispatch_instruction(&mut self, mnemonic: &str, operands_text: &str) {
        if mnemonic.is_empty() {
            return;
        }
        let Some(section_id) = self.sections.current() else {
            let pos = self.current_pos();
            self.emit_diag(DiagCode::Internal, pos, "instruction encountered with no current section");
            return;
        };

        let scope = self.symtab.current_scope();
        let operand_texts = crate::expr_support::split_commas_text(operands_text);
        let mut values = Vec::with_capacity(operand_texts.len());
        for part in &operand_texts {
            values.push(self.resolve_operand(part, scope));
        }

        let pos = self.current_pos();
        let mut rvu = self.rvu.remove(&section_id).unwrap_or_default();
        let section = self.sections.get_mut(section_id).expect("current section exists");
        let ok = self.encoder.encode(mnemonic, &values, &self.regvar_decls, section, &mut rvu, self.diag, pos);
        self.rvu.insert(section_id, rvu);
        if ok {
            self.instructions_encoded += 1;
        }
    }

    /// Resolve one instruction operand: a bare regvar name (optionally with
    /// a `[lo:hi]` sub-range) bypasses the general expression parser
    /// entirely, since named register variables are dispatcher-owned state
    /// that `asm-lexer` has no notion of (`spec.md` §3 "Register variable").
    fn resolve_operand(&mut self, text: &str, scope: ScopeId) -> Value {
        if let Some(v) = self.try_resolve_regvar_operand(text, scope) {
            return v;
        }
        let toks = match Lexer::new(text).tokenize() {
            Ok(t) => t,
            Err(e) => {
                let pos = self.current_pos();
                self.emit_diag(DiagCode::Syntax, pos, e.message);
                return Value::Unresolved;
            }
        };
        let here = self.here();
        match crate::expr_support::eval_tokens(&toks, &mut self.arena, &mut self.symtab, here, None) {
            Ok((_, v)) => v,
            Err(e) => {
                let pos = self.current_pos();
                self.emit_diag(DiagCode::BadExpression, pos, e.message);
                Value::Unresolved
            }
        }
    }

    fn try_resolve_regvar_operand(&self, text: &str, scope: ScopeId) -> Option<Value> {
        let text = text.trim();
        let (name, range) = match text.find('[') {
            Some(i) if text.ends_with(']') => (&text[..i], Some(&text[i + 1..text.len() - 1])),
            Some(_) => (text, None),
            None => (text, None),
        };
        if !name.chars().all(|c| c.is_alphanumeric() || c == '_') {
            return None;
        }
        if asm_lexer::try_register(name).is_some() {
            return None;
        }
        let var = self.regvar_names.lookup(scope, name)?;
        let decl = self.regvar_decls.get(var)?;
        let (start, count) = match range {
            Some(r) => {
                let (lo, hi) = r.split_once(':')?;
                let lo: u16 = lo.trim().parse().ok()?;
                let hi: u16 = hi.trim().parse().ok()?;
                (lo, hi.saturating_sub(lo) + 1)
            }
            None => (0, decl.count),
        };
        Some(Value::RegVar { var, start, count })
    }
}

/// Split a trimmed line into a leading `name:` label (a single `:`, not the
/// `::` scope separator, immediately after an identifier at the start of
/// the line) and the remainder.
fn split_label(text: &str) -> (Option<&str>, &str) {
    let bytes = text.as_bytes();
    let mut i = 0usize;
    while i < bytes.len() {
        let b = bytes[i];
        if b == b':' {
            if bytes.get(i + 1) == Some(&b':') {
                return (None, text);
            }
            let candidate = &text[..i];
            let valid = !candidate.is_empty()
                && candidate
                    .chars()
                    .next()
                    .map(|c| c.is_alphabetic() || c == '_' || c == '.')
                    .unwrap_or(false)
                && candidate.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '.');
            if valid {
                return (Some(candidate), &text[i + 1..]);
            }
            return (None, text);
        }
        if b == b' ' || b == b'\t' || b == b',' {
            return (None, text);
        }
        i += 1;
    }
    (None, text)
}

/// Split on the first run of whitespace: `first word` / `rest of line`.
fn split_first_word(text: &str) -> (String, &str) {
    let text = text.trim_start();
    match text.find(char::is_whitespace) {
        Some(i) => (text[..i].to_string(), &text[i..]),
        None => (text.to_string(), ""),
    }
}

/// Standard sections every format recognises as a shorthand
/// (`spec.md` §4.D ".text/.data/.rodata/.bss").
pub(crate) fn standard_section(name: &str) -> Option<(SectionType, SectionFlags)> {
    match name {
        ".text" => Some((SectionType::Text, SectionFlags::CODE | SectionFlags::ADDRESSABLE)),
        ".data" => Some((SectionType::Data, SectionFlags::WRITABLE | SectionFlags::ADDRESSABLE)),
        ".rodata" => Some((SectionType::Rodata, SectionFlags::ADDRESSABLE)),
        ".bss" => Some((SectionType::Bss, SectionFlags::WRITABLE | SectionFlags::ADDRESSABLE)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use asm_diag::VecDiagSink;
    use crate::includes::NullIncludeResolver;

    fn new_asm<'a>(diag: &'a VecDiagSink, includes: &'a NullIncludeResolver) -> Assembler<'a> {
        let mut asm = Assembler::new(Gpu::Gcn1_0, OutputFormat::Raw, DialectConfig::default(), diag, includes);
        let id = asm.format.create_section(&mut asm.sections, ".text", None, SectionFlags::CODE);
        asm.sections.set_current(id);
        asm
    }

    #[test]
    fn byte_then_align_pads_to_the_scenario_in_the_spec() {
        let diag = VecDiagSink::new();
        let includes = NullIncludeResolver;
        let mut asm = new_asm(&diag, &includes);
        let ok = asm.assemble("t.s", ".byte 1,2,3\n.align 4\n");
        assert!(ok, "{:?}", diag.snapshot());
        let id = asm.sections.current().unwrap();
        assert_eq!(asm.sections.get(id).unwrap().content, vec![1, 2, 3, 0]);
    }

    #[test]
    fn label_arithmetic_matches_the_spec_scenario() {
        let diag = VecDiagSink::new();
        let includes = NullIncludeResolver;
        let mut asm = new_asm(&diag, &includes);
        let ok = asm.assemble("t.s", "a: .word 0\nb: .word 0\n.word b-a\n");
        assert!(ok, "{:?}", diag.snapshot());
        let id = asm.sections.current().unwrap();
        assert_eq!(
            asm.sections.get(id).unwrap().content,
            vec![0, 0, 0, 0, 0, 0, 0, 0, 4, 0, 0, 0]
        );
    }

    #[test]
    fn forward_symbol_resolves_through_retry_pass() {
        let diag = VecDiagSink::new();
        let includes = NullIncludeResolver;
        let mut asm = new_asm(&diag, &includes);
        let ok = asm.assemble("t.s", "s_mov_b32 s0, x\n.set x, 7\n");
        assert!(ok, "{:?}", diag.snapshot());
        let id = asm.sections.current().unwrap();
        assert_eq!(
            asm.sections.get(id).unwrap().content,
            vec![0xFF, 0x03, 0x80, 0xBE, 0x07, 0x00, 0x00, 0x00]
        );
    }

    #[test]
    fn macro_expansion_matches_the_spec_scenario() {
        let diag = VecDiagSink::new();
        let includes = NullIncludeResolver;
        let mut asm = new_asm(&diag, &includes);
        let ok = asm.assemble("t.s", ".macro pair a,b\n.byte \\a, \\b\n.endm\npair 5,6\n");
        assert!(ok, "{:?}", diag.snapshot());
        let id = asm.sections.current().unwrap();
        assert_eq!(asm.sections.get(id).unwrap().content, vec![5, 6]);
    }

    #[test]
    fn rept_replays_the_body_n_times() {
        let diag = VecDiagSink::new();
        let includes = NullIncludeResolver;
        let mut asm = new_asm(&diag, &includes);
        let ok = asm.assemble("t.s", ".rept 3\n.byte 0xAA\n.endr\n");
        assert!(ok, "{:?}", diag.snapshot());
        let id = asm.sections.current().unwrap();
        assert_eq!(asm.sections.get(id).unwrap().content, vec![0xAA, 0xAA, 0xAA]);
    }
}
