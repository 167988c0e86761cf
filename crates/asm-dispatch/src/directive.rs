//! Per-directive dispatch (`spec.md` §4.D). `execute` is the single entry
//! point `Assembler::dispatch_line` calls once a line has been recognised
//! as `.something`; everything else lives behind small private helpers
//! below it, one group per directive family.

use std::sync::Arc;

use asm_diag::DiagCode;
use asm_lexer::Lexer;
use asm_source::{IterVar, MacroDef, RepeatFilter};
use asm_symtab::{RegClass, SectionFlags, Value};

use crate::assembler::{standard_section, Assembler};
use crate::expr_support::{eval_tokens, split_commas_text};

pub fn execute(asm: &mut Assembler, directive: &str, args: &str) {
    let name = directive.to_ascii_lowercase();
    match name.as_str() {
        ".byte" => append_list(asm, args, 1),
        ".half" => append_list(asm, args, 2),
        ".word" => append_list(asm, args, 4),
        ".quad" => append_list(asm, args, 8),
        ".fill" => fill(asm, args),
        ".skip" => skip(asm, args),
        ".align" => align(asm, args),
        ".equ" | ".set" => assign(asm, args, false),
        ".eqv" => assign(asm, args, true),
        ".section" => switch_section(asm, args.trim()),
        ".text" | ".data" | ".rodata" | ".bss" => switch_section(asm, &name),
        ".kernel" => {
            asm.begin_kernel(args.trim());
        }
        ".gpu" => set_gpu(asm, args.trim()),
        ".macro" => capture_macro(asm, args),
        ".endm" => unexpected_close(asm, ".endm"),
        ".if" => capture_if(asm, args),
        ".elseif" | ".else" | ".endif" => unexpected_close(asm, &name),
        ".rept" => capture_rept(asm, args),
        ".irp" => capture_irp(asm, args, false),
        ".irpc" => capture_irp(asm, args, true),
        ".endr" => unexpected_close(asm, ".endr"),
        ".reg" => declare_reg(asm, args),
        ".regvar" | ".usereg" => (),
        ".include" => include_file(asm, args.trim()),
        ".error" => {
            let pos = asm.current_pos();
            asm.emit_diag(DiagCode::Syntax, pos, format!("error: {}", args.trim()));
        }
        ".warning" => {
            let pos = asm.current_pos();
            asm.emit_diag(DiagCode::Syntax, pos, format!("warning: {}", args.trim()));
        }
        ".print" => tracing::info!(target: "asm::print", "{}", args.trim()),
        ".scope" => {
            let scope_name = args.trim();
            let name = if scope_name.is_empty() { None } else { Some(scope_name.to_string()) };
            let id = asm.symtab.push_scope(name.clone());
            if let Some(n) = name {
                asm.scope_names.insert(n, id);
            }
        }
        ".ends" => {
            if asm.symtab.pop_scope().is_err() {
                let pos = asm.current_pos();
                asm.emit_diag(DiagCode::Syntax, pos, "`.ends` with no open `.scope`");
            }
        }
        ".globl" | ".global" => set_linkage(asm, args, true),
        ".local" => set_linkage(asm, args, false),
        other => {
            let pos = asm.current_pos();
            asm.emit_diag(DiagCode::Syntax, pos, format!("unrecognised directive `{other}`"));
        }
    }
}

fn unexpected_close(asm: &mut Assembler, name: &str) {
    let pos = asm.current_pos();
    asm.emit_diag(DiagCode::Syntax, pos, format!("`{name}` with no matching open"));
}

fn eval_one(asm: &mut Assembler, text: &str) -> Option<Value> {
    let toks = match Lexer::new(text).tokenize() {
        Ok(t) => t,
        Err(e) => {
            let pos = asm.current_pos();
            asm.emit_diag(DiagCode::Syntax, pos, e.message);
            return None;
        }
    };
    let here = asm.here();
    match eval_tokens(&toks, &mut asm.arena, &mut asm.symtab, here, None) {
        Ok((_, v)) => Some(v),
        Err(e) => {
            let pos = asm.current_pos();
            asm.emit_diag(DiagCode::BadExpression, pos, e.message);
            None
        }
    }
}

fn append_list(asm: &mut Assembler, args: &str, width: u8) {
    let Some(section_id) = asm.sections.current() else {
        let pos = asm.current_pos();
        asm.emit_diag(DiagCode::Internal, pos, "data directive with no current section");
        return;
    };
    for part in split_commas_text(args) {
        if part.is_empty() {
            continue;
        }
        let Some(v) = eval_one(asm, &part) else { continue };
        let n = v.as_int().unwrap_or(0);
        let bytes = n.to_le_bytes();
        let section = asm.sections.get_mut(section_id).expect("current section exists");
        section.append_bytes(&bytes[..width as usize]);
    }
}

fn fill(asm: &mut Assembler, args: &str) {
    let parts = split_commas_text(args);
    let (Some(n_text), Some(size_text)) = (parts.first(), parts.get(1)) else {
        let pos = asm.current_pos();
        asm.emit_diag(DiagCode::Syntax, pos, "`.fill` requires n, size[, value]");
        return;
    };
    let n = eval_one(asm, n_text).and_then(|v| v.as_int()).unwrap_or(0);
    let size = eval_one(asm, size_text).and_then(|v| v.as_int()).unwrap_or(1).clamp(1, 8) as u8;
    let value = match parts.get(2) {
        Some(v) => eval_one(asm, v).and_then(|v| v.as_int()).unwrap_or(0),
        None => 0,
    };
    let Some(section_id) = asm.sections.current() else { return };
    let bytes = value.to_le_bytes();
    let section = asm.sections.get_mut(section_id).expect("current section exists");
    for _ in 0..n {
        section.append_bytes(&bytes[..size as usize]);
    }
}

fn skip(asm: &mut Assembler, args: &str) {
    let parts = split_commas_text(args);
    let Some(n_text) = parts.first() else {
        let pos = asm.current_pos();
        asm.emit_diag(DiagCode::Syntax, pos, "`.skip` requires a count");
        return;
    };
    let n = eval_one(asm, n_text).and_then(|v| v.as_int()).unwrap_or(0);
    let value = match parts.get(1) {
        Some(v) => eval_one(asm, v).and_then(|v| v.as_int()).unwrap_or(0) as u8,
        None => 0,
    };
    let Some(section_id) = asm.sections.current() else { return };
    let section = asm.sections.get_mut(section_id).expect("current section exists");
    section.append_fill(n, value);
}

fn align(asm: &mut Assembler, args: &str) {
    let parts = split_commas_text(args);
    let Some(a_text) = parts.first() else {
        let pos = asm.current_pos();
        asm.emit_diag(DiagCode::Syntax, pos, "`.align` requires an alignment");
        return;
    };
    let align = eval_one(asm, a_text).and_then(|v| v.as_int()).unwrap_or(1).max(1);
    let value = match parts.get(1) {
        Some(v) => eval_one(asm, v).and_then(|v| v.as_int()).unwrap_or(0) as u8,
        None => 0,
    };
    let Some(section_id) = asm.sections.current() else { return };
    let section = asm.sections.get_mut(section_id).expect("current section exists");
    section.align_to(align, value);
}

fn assign(asm: &mut Assembler, args: &str, snapshot: bool) {
    let parts = split_commas_text(args);
    let (Some(name), Some(expr_text)) = (parts.first(), parts.get(1)) else {
        let pos = asm.current_pos();
        asm.emit_diag(DiagCode::Syntax, pos, "symbol assignment requires a name and a value");
        return;
    };

    // `.eqv name, other_symbol` clones the named source symbol's current
    // value and (while undiverged) its dependents, so future changes to
    // `other_symbol` alone stop propagating to `name` the moment either
    // side is next reassigned. Anything else on the right falls back to
    // evaluating now and storing the result as a plain, already-resolved
    // value, which is an equivalent snapshot since a resolved `Value`
    // carries no further back-reference to what produced it.
    if snapshot {
        if let Some(source) = asm.symtab.lookup(expr_text.trim(), false) {
            match asm.symtab.define_snapshot(name, source) {
                Ok(_) => return,
                Err(_) => {
                    let pos = asm.current_pos();
                    asm.emit_diag(DiagCode::DuplicateSymbol, pos, format!("`{name}` already defined"));
                    return;
                }
            }
        }
    }

    let toks = match Lexer::new(expr_text).tokenize() {
        Ok(t) => t,
        Err(e) => {
            let pos = asm.current_pos();
            asm.emit_diag(DiagCode::Syntax, pos, e.message);
            return;
        }
    };
    let sym = match asm.symtab.lookup(name, true) {
        Some(id) => id,
        None => return,
    };

    let here = asm.here();
    match eval_tokens(&toks, &mut asm.arena, &mut asm.symtab, here, None) {
        Ok((_, v)) if !v.is_unresolved() => {
            asm.symtab.set_value(sym, v);
        }
        Ok((expr, _)) => {
            let ctx = asm.eval_context();
            asm.symtab.set_pending(sym, expr, ctx);
        }
        Err(e) => {
            let pos = asm.current_pos();
            asm.emit_diag(DiagCode::BadExpression, pos, e.message);
        }
    }
}

fn switch_section(asm: &mut Assembler, name: &str) {
    let kernel = asm.current_kernel;
    if let Some(id) = asm.format.section_id_for_name(&asm.sections, name, kernel) {
        asm.sections.set_current(id);
        return;
    }
    let flags = standard_section(name).map(|(_, f)| f).unwrap_or(SectionFlags::empty());
    let id = asm.format.create_section(&mut asm.sections, name, kernel, flags);
    asm.sections.set_current(id);
    if let Some(k) = kernel {
        if let Some(kernel_rec) = asm.kernels.iter_mut().find(|k2| k2.id == k) {
            kernel_rec.sections.push(id);
        }
    }
}

fn set_gpu(asm: &mut Assembler, name: &str) {
    match asm_encoder::Gpu::parse(name) {
        Some(g) => {
            asm.gpu = g;
            asm.encoder = asm_encoder::Encoder::new(g);
        }
        None => {
            let pos = asm.current_pos();
            asm.emit_diag(DiagCode::Syntax, pos, format!("unknown GPU target `{name}`"));
        }
    }
}

/// Read raw (undispatched) lines from the current filter top until a line
/// whose first word matches `close`, tracking nested opens of any word in
/// `opens` so an inner `.macro`/`.rept`/`.if` of the same family doesn't
/// terminate the capture early. Returns the captured body, sans the
/// closing line itself.
fn capture_until(asm: &mut Assembler, opens: &[&str], close: &str) -> Vec<String> {
    let mut depth = 0u32;
    let mut body = Vec::new();
    while let Some(line) = asm.filters.read_line() {
        let trimmed = line.text.trim_start();
        let word = trimmed
            .split(|c: char| c.is_whitespace())
            .next()
            .unwrap_or("")
            .to_ascii_lowercase();
        if word == close.to_ascii_lowercase() {
            if depth == 0 {
                return body;
            }
            depth -= 1;
        } else if opens.iter().any(|o| word == *o) {
            depth += 1;
        }
        body.push(line.text);
    }
    let pos = asm.current_pos();
    asm.emit_diag(DiagCode::NestingExceeded, pos, format!("missing `{close}` before end of input"));
    body
}

fn capture_macro(asm: &mut Assembler, args: &str) {
    let args = args.trim();
    let (name, rest) = args.split_once(char::is_whitespace).unwrap_or((args, ""));
    if name.is_empty() {
        let pos = asm.current_pos();
        asm.emit_diag(DiagCode::Syntax, pos, "`.macro` requires a name");
        return;
    }
    let mut params = Vec::new();
    let mut defaults = Vec::new();
    for p in split_commas_text(rest) {
        if p.is_empty() {
            continue;
        }
        match p.split_once('=') {
            Some((pname, pdef)) => {
                params.push(pname.trim().to_string());
                defaults.push(Some(pdef.trim().to_string()));
            }
            None => {
                params.push(p);
                defaults.push(None);
            }
        }
    }
    let body = capture_until(asm, &["macro"], ".endm");
    asm.macros.define(MacroDef {
        name: Arc::from(name),
        params,
        defaults,
        body,
        case_sensitive: asm.dialect.case_sensitive_names,
    });
}

fn capture_rept(asm: &mut Assembler, args: &str) {
    let count = eval_one(asm, args.trim()).and_then(|v| v.as_int()).unwrap_or(0);
    let body = capture_until(asm, &["rept", "irp", "irpc"], ".endr");
    if asm.filters.push_repeat(RepeatFilter::rept("rept", body, count)).is_err() {
        let pos = asm.current_pos();
        asm.emit_diag(DiagCode::NestingExceeded, pos, "`.rept` nesting exceeds the maximum depth");
    }
}

fn capture_irp(asm: &mut Assembler, args: &str, by_char: bool) {
    let parts = split_commas_text(args);
    let Some(var_name) = parts.first().cloned() else {
        let pos = asm.current_pos();
        asm.emit_diag(DiagCode::Syntax, pos, "`.irp`/`.irpc` requires a variable name");
        return;
    };
    let values: Vec<String> = if by_char {
        parts.get(1).cloned().unwrap_or_default().chars().map(|c| c.to_string()).collect()
    } else {
        parts[1..].to_vec()
    };
    let body = capture_until(asm, &["rept", "irp", "irpc"], ".endr");
    let iter = IterVar {
        name: var_name,
        values,
    };
    let filter = RepeatFilter::irp("irp", body, iter, asm.dialect.case_sensitive_names);
    if asm.filters.push_repeat(filter).is_err() {
        let pos = asm.current_pos();
        asm.emit_diag(DiagCode::NestingExceeded, pos, "`.irp`/`.irpc` nesting exceeds the maximum depth");
    }
}

/// Capture an `.if`/`.elseif`/`.else`/`.endif` block into `(condition,
/// body)` branches (the `.else` branch's condition is `None`), tracking
/// nested `.if`/`.endif` depth so an inner conditional's `.elseif`/`.else`
/// doesn't split this block.
fn capture_if_branches(asm: &mut Assembler, first_condition: String) -> Vec<(Option<String>, Vec<String>)> {
    let mut branches = vec![(Some(first_condition), Vec::new())];
    let mut depth = 0u32;
    while let Some(line) = asm.filters.read_line() {
        let trimmed = line.text.trim_start();
        let mut words = trimmed.splitn(2, char::is_whitespace);
        let word = words.next().unwrap_or("").to_ascii_lowercase();
        let rest = words.next().unwrap_or("").to_string();
        match word.as_str() {
            ".if" => {
                depth += 1;
                branches.last_mut().unwrap().1.push(line.text);
            }
            ".endif" if depth > 0 => {
                depth -= 1;
                branches.last_mut().unwrap().1.push(line.text);
            }
            ".endif" => return branches,
            ".elseif" if depth == 0 => branches.push((Some(rest), Vec::new())),
            ".else" if depth == 0 => branches.push((None, Vec::new())),
            _ => branches.last_mut().unwrap().1.push(line.text),
        }
    }
    let pos = asm.current_pos();
    asm.emit_diag(DiagCode::NestingExceeded, pos, "missing `.endif` before end of input");
    branches
}

fn capture_if(asm: &mut Assembler, args: &str) {
    let branches = capture_if_branches(asm, args.trim().to_string());
    for (cond, body) in branches {
        let taken = match cond {
            Some(c) => eval_one(asm, &c).map(|v| v.as_int().unwrap_or(0) != 0).unwrap_or(false),
            None => true,
        };
        if taken {
            if asm.filters.push_repeat(RepeatFilter::rept("if", body, 1)).is_err() {
                let pos = asm.current_pos();
                asm.emit_diag(DiagCode::NestingExceeded, pos, "`.if` nesting exceeds the maximum depth");
            }
            return;
        }
    }
}

fn declare_reg(asm: &mut Assembler, args: &str) {
    let parts = split_commas_text(args);
    let Some(spec) = parts.first() else {
        let pos = asm.current_pos();
        asm.emit_diag(DiagCode::Syntax, pos, "`.reg` requires a name and class:count");
        return;
    };
    let Some((name, shape_text)) = spec.split_once(':') else {
        let pos = asm.current_pos();
        asm.emit_diag(DiagCode::Syntax, pos, "`.reg` expects `name:class[count]`");
        return;
    };
    let name = name.trim();
    let shape_text = shape_text.trim();
    let (class_text, count_text) = shape_text.find(|c: char| c.is_ascii_digit())
        .map(|i| (&shape_text[..i], &shape_text[i..]))
        .unwrap_or((shape_text, "1"));
    let class = match class_text.to_ascii_lowercase().as_str() {
        "s" | "sgpr" => RegClass::Sgpr,
        "v" | "vgpr" => RegClass::Vgpr,
        other => {
            let pos = asm.current_pos();
            asm.emit_diag(DiagCode::Syntax, pos, format!("unknown register class `{other}`"));
            return;
        }
    };
    let count: u16 = count_text.trim().parse().unwrap_or(1).max(1);

    let scope = asm.symtab.current_scope();
    let (id, fresh) = asm.regvar_names.declare(scope, name);
    if fresh {
        asm.regvar_decls.declare(id, class, count);
    }
}

fn include_file(asm: &mut Assembler, path_text: &str) {
    let path = path_text.trim_matches('"');
    match asm.includes.resolve(path) {
        Ok(content) => {
            if asm.filters.push_stream(asm_source::StreamFilter::new(path.to_string(), &content)).is_err() {
                let pos = asm.current_pos();
                asm.emit_diag(DiagCode::NestingExceeded, pos, "`.include` nesting exceeds the maximum depth");
            }
        }
        Err(e) => {
            let pos = asm.current_pos();
            asm.emit_diag(DiagCode::Io, pos, e);
        }
    }
}

fn set_linkage(asm: &mut Assembler, args: &str, global: bool) {
    for name in split_commas_text(args) {
        if name.is_empty() {
            continue;
        }
        if let Some(sym) = asm.symtab.lookup(&name, true) {
            asm.symtab.symbol_mut(sym).is_global = global;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use asm_diag::VecDiagSink;
    use crate::assembler::OutputFormat;
    use crate::includes::NullIncludeResolver;
    use crate::options::DialectConfig;
    use asm_encoder::Gpu;

    fn new_asm<'a>(diag: &'a VecDiagSink, includes: &'a NullIncludeResolver) -> Assembler<'a> {
        let mut asm = Assembler::new(Gpu::Gcn1_0, OutputFormat::Raw, DialectConfig::default(), diag, includes);
        let id = asm.format.create_section(&mut asm.sections, ".text", None, SectionFlags::CODE);
        asm.sections.set_current(id);
        asm
    }

    #[test]
    fn byte_list_appends_each_value() {
        let diag = VecDiagSink::new();
        let includes = NullIncludeResolver;
        let mut asm = new_asm(&diag, &includes);
        append_list(&mut asm, "1,2,3", 1);
        let id = asm.sections.current().unwrap();
        assert_eq!(asm.sections.get(id).unwrap().content, vec![1, 2, 3]);
    }

    #[test]
    fn align_pads_with_zero_by_default() {
        let diag = VecDiagSink::new();
        let includes = NullIncludeResolver;
        let mut asm = new_asm(&diag, &includes);
        append_list(&mut asm, "1,2,3", 1);
        align(&mut asm, "4");
        let id = asm.sections.current().unwrap();
        assert_eq!(asm.sections.get(id).unwrap().content, vec![1, 2, 3, 0]);
    }

    #[test]
    fn set_assigns_an_immediately_resolvable_value() {
        let diag = VecDiagSink::new();
        let includes = NullIncludeResolver;
        let mut asm = new_asm(&diag, &includes);
        assign(&mut asm, "x, 7", false);
        let sym = asm.symtab.lookup("x", false).unwrap();
        assert!(!asm.symtab.is_never_assigned(sym));
    }
}
