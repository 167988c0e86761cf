//! `gcnasm` entrypoint: the out-of-core CLI driver (`spec.md` §6,
//! `SPEC_FULL.md` §4.K) — argument parsing, file I/O, and top-level message
//! formatting around the `asm-dispatch` pipeline. Contains no assembler
//! logic of its own.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Once;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;

use asm_binary::{
    build_amdcl2_container, build_legacy_container, AmdGpuArchValues, Amdcl2Kernel, DriverVersion,
    InstrCounts, LegacyKernel,
};
use asm_diag::{DiagSink, TracingDiagSink};
use asm_dispatch::{
    Assembler, AssemblerOptions, DialectConfig, IncludeResolver, OutputFormat,
};
use asm_elf::ElfClass;
use asm_encoder::Gpu;
use asm_format::{Amdcl2KernelConfig, KernelConfig, LegacyKernelConfig};

/// CLI arguments, named after `spec.md` §6's summary of the legacy tool's
/// flags.
#[derive(Parser, Debug)]
#[command(name = "gcnasm", version, about = "GCN assembler and OpenCL binary generator")]
struct Args {
    /// Assembly source file to assemble.
    input: PathBuf,

    /// Target device, e.g. `tahiti`, `bonaire`, `tonga`, `vega10`.
    #[arg(short = 'A', long = "arch", default_value = "tahiti")]
    arch: String,

    /// Output container: `raw`, `amd` (legacy AMD Catalyst), `amdcl2`.
    #[arg(short = 'F', long = "format", default_value = "raw")]
    format: String,

    /// Write a 64-bit ELF container (legacy/amdcl2 formats only).
    #[arg(long = "64bit")]
    bit64: bool,

    /// `-D name[=val]`: predefine a symbol before assembling (repeatable).
    #[arg(short = 'D', value_name = "name[=val]")]
    defines: Vec<String>,

    /// `-I dir`: add a directory to the `.include` search path (repeatable).
    #[arg(short = 'I', value_name = "dir")]
    include_dirs: Vec<PathBuf>,

    /// Output file path.
    #[arg(short = 'o', long = "output", default_value = "a.out")]
    output: PathBuf,

    /// Emit warning-level diagnostics, not just errors.
    #[arg(long = "Wall")]
    wall: bool,

    /// Warnings affect the exit status like errors do.
    #[arg(long = "Werror")]
    werror: bool,

    /// Alternate string-literal delimiters and `LOCAL` declarations.
    #[arg(long = "alt-macro")]
    alt_macro: bool,

    /// Preserve the legacy tool's buggy FP-literal folding (`spec.md` §9
    /// open question; off by default per `DESIGN.md`).
    #[arg(long = "buggy-fp-lit")]
    buggy_fp_lit: bool,

    /// Restrict modifier parametrisation to 0/1 only (`ASM_OLDMODPARAM`).
    #[arg(long = "old-mod-param")]
    old_mod_param: bool,
}

/// Resolves `.include "path"` against the `-I` search path, falling back to
/// the directory containing the top-level source file.
struct FsIncludeResolver {
    search_dirs: Vec<PathBuf>,
}

impl IncludeResolver for FsIncludeResolver {
    fn resolve(&self, path: &str) -> Result<String, String> {
        for dir in &self.search_dirs {
            let candidate = dir.join(path);
            if let Ok(text) = fs::read_to_string(&candidate) {
                return Ok(text);
            }
        }
        fs::read_to_string(path).map_err(|e| format!("cannot open include `{path}`: {e}"))
    }
}

struct LogGuard(#[allow(dead_code)] Option<WorkerGuard>);

fn configure_logging() -> LogGuard {
    let log_path = Path::new("gcnasm.log");
    if log_path.exists() {
        let _ = fs::remove_file(log_path);
    }
    let file_appender = tracing_appender::rolling::never(".", "gcnasm.log");
    let (nb_writer, guard) = tracing_appender::non_blocking(file_appender);
    let result = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(nb_writer)
        .try_init();
    match result {
        Ok(()) => LogGuard(Some(guard)),
        Err(_) => LogGuard(None),
    }
}

fn install_panic_hook() {
    static HOOK: Once = Once::new();
    HOOK.call_once(|| {
        let default_panic = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            tracing::error!(target: "runtime.panic", ?info, "panic");
            default_panic(info);
        }));
    });
}

#[derive(Debug)]
struct UnknownOption(&'static str, String);

impl fmt::Display for UnknownOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unrecognised {}: {:?}", self.0, self.1)
    }
}
impl std::error::Error for UnknownOption {}

fn parse_format(s: &str) -> Result<OutputFormat> {
    match s.to_ascii_lowercase().as_str() {
        "raw" => Ok(OutputFormat::Raw),
        "amd" | "amd-legacy" | "catalyst" => Ok(OutputFormat::AmdLegacy),
        "amdcl2" | "rocm-cl2" => Ok(OutputFormat::Amdcl2),
        other => Err(UnknownOption("--format", other.to_string()).into()),
    }
}

fn parse_define(spec: &str) -> (String, u64) {
    match spec.split_once('=') {
        Some((name, value)) => {
            let parsed = if let Some(hex) = value.strip_prefix("0x") {
                u64::from_str_radix(hex, 16).unwrap_or(0)
            } else {
                value.parse().unwrap_or(0)
            };
            (name.to_string(), parsed)
        }
        None => (spec.to_string(), 1),
    }
}

/// Best-effort instruction count for the legacy stub header: most GCN
/// instructions this core encodes are 4 bytes, with a single trailing
/// 4-byte literal for forms that consumed one. Exact per-instruction
/// accounting lives upstream in the encoder's RVU stream, which the CLI
/// layer does not retain once assembly has produced final bytes.
fn approximate_instr_count(code: &[u8]) -> u32 {
    (code.len() as u32).div_ceil(4)
}

fn run(args: &Args) -> Result<()> {
    let gpu = Gpu::parse(&args.arch).with_context(|| format!("unknown --arch `{}`", args.arch))?;
    let format = parse_format(&args.format)?;

    let mut options = AssemblerOptions::empty();
    if args.wall {
        options |= AssemblerOptions::WARNINGS;
    }
    if args.werror {
        options |= AssemblerOptions::WARNINGS_AS_ERRORS;
    }
    if args.alt_macro {
        options |= AssemblerOptions::ALT_MACRO;
    }
    if args.buggy_fp_lit {
        options |= AssemblerOptions::BUGGY_FP_LIT;
    }
    if args.old_mod_param {
        options |= AssemblerOptions::OLD_MOD_PARAM;
    }
    let dialect = DialectConfig {
        options,
        case_sensitive_names: false,
    };

    let source = fs::read_to_string(&args.input)
        .with_context(|| format!("cannot open input `{}`", args.input.display()))?;

    let mut search_dirs = args.include_dirs.clone();
    if let Some(parent) = args.input.parent() {
        search_dirs.push(parent.to_path_buf());
    }
    let includes = FsIncludeResolver { search_dirs };

    let diag = TracingDiagSink::new();
    let mut asm = Assembler::new(gpu, format, dialect, &diag, &includes);

    let file_name = args
        .input
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("input.s")
        .to_string();

    // `-D name[=val]` predefinitions: materialised as an implicit prologue
    // of `.set` directives so they flow through the normal symbol-table
    // path instead of a bespoke injection API (`spec.md` §6).
    let mut prologue = String::new();
    for spec in &args.defines {
        let (name, value) = parse_define(spec);
        prologue.push_str(&format!(".set {name}, {value}\n"));
    }
    let combined = format!("{prologue}{source}");

    let good = asm.assemble(&file_name, &combined);
    let telemetry = asm.telemetry();
    info!(
        target: "gcnasm.build",
        instructions = telemetry.instructions_encoded,
        bytes = telemetry.bytes_emitted,
        good,
        "assembly_complete"
    );

    if !good {
        error!(target: "gcnasm.build", "assembly failed, refusing to generate output");
        bail!("assembly failed");
    }

    let class = if args.bit64 { ElfClass::Elf64 } else { ElfClass::Elf32 };
    let bytes = generate_output(&asm, class)?;
    fs::write(&args.output, &bytes)
        .with_context(|| format!("cannot write output `{}`", args.output.display()))?;
    info!(target: "gcnasm.build", path = %args.output.display(), bytes = bytes.len(), "output_written");
    Ok(())
}

fn generate_output(asm: &Assembler<'_>, class: ElfClass) -> Result<Vec<u8>> {
    match asm.output_format() {
        OutputFormat::Raw => {
            let sections = asm.sections();
            let text_id = sections.find(".text", None);
            let code = text_id
                .and_then(|id| sections.get(id))
                .map(|s| s.content.clone())
                .unwrap_or_default();
            Ok(code)
        }
        OutputFormat::AmdLegacy => {
            let sections = asm.sections();
            let mut kernels = Vec::new();
            for k in asm.kernels() {
                let config = match &k.config {
                    KernelConfig::Legacy(c) => c.clone(),
                    _ => LegacyKernelConfig::default(),
                };
                let text_id = sections
                    .find(".text", Some(k.id))
                    .context("kernel has no .text section")?;
                let code = &sections.get(text_id).expect("section exists").content;
                kernels.push((k.name.clone(), config, code.clone()));
            }
            let legacy_kernels: Vec<LegacyKernel<'_>> = kernels
                .iter()
                .map(|(name, config, code)| LegacyKernel {
                    name,
                    config: config.clone(),
                    counts: InstrCounts {
                        instrs_num: approximate_instr_count(code),
                        global_mem_ops: 0,
                        local_mem_ops: 0,
                    },
                    code,
                })
                .collect();
            let rodata = sections
                .find(".rodata", None)
                .and_then(|id| sections.get(id))
                .map(|s| s.content.as_slice())
                .unwrap_or(&[]);
            Ok(build_legacy_container(class, &legacy_kernels, rodata))
        }
        OutputFormat::Amdcl2 => {
            let sections = asm.sections();
            let mut kernels = Vec::new();
            for k in asm.kernels() {
                let config = match &k.config {
                    KernelConfig::Amdcl2(c) => c.clone(),
                    _ => Amdcl2KernelConfig::default(),
                };
                let text_id = sections
                    .find(".text", Some(k.id))
                    .context("kernel has no .text section")?;
                let code = sections.get(text_id).expect("section exists").content.clone();
                kernels.push((k.name.clone(), config, code));
            }
            let amdcl2_kernels: Vec<Amdcl2Kernel<'_>> = kernels
                .iter()
                .map(|(name, config, code)| Amdcl2Kernel {
                    name,
                    config: config.clone(),
                    code,
                })
                .collect();
            let global_data = sections
                .find(".rodata", None)
                .and_then(|id| sections.get(id))
                .map(|s| s.content.as_slice())
                .unwrap_or(&[]);
            Ok(build_amdcl2_container(
                class,
                DriverVersion(200_406),
                AmdGpuArchValues {
                    major: 9,
                    minor: 0,
                    stepping: 0,
                },
                9,
                &amdcl2_kernels,
                global_data,
            ))
        }
    }
}

fn main() {
    let _log_guard = configure_logging();
    install_panic_hook();
    info!(target: "gcnasm.startup", "startup");

    let args = Args::parse();
    match run(&args) {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            eprintln!("gcnasm: error: {e:#}");
            error!(target: "gcnasm.build", error = %e, "fatal");
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_format_recognises_all_three_containers() {
        assert_eq!(parse_format("raw").unwrap(), OutputFormat::Raw);
        assert_eq!(parse_format("amd").unwrap(), OutputFormat::AmdLegacy);
        assert_eq!(parse_format("amdcl2").unwrap(), OutputFormat::Amdcl2);
        assert!(parse_format("bogus").is_err());
    }

    #[test]
    fn parse_define_splits_name_and_value() {
        assert_eq!(parse_define("foo=7"), ("foo".to_string(), 7));
        assert_eq!(parse_define("bar=0x10"), ("bar".to_string(), 16));
        assert_eq!(parse_define("baz"), ("baz".to_string(), 1));
    }

    #[test]
    fn approximate_instr_count_rounds_up_to_words() {
        assert_eq!(approximate_instr_count(&[0u8; 8]), 2);
        assert_eq!(approximate_instr_count(&[0u8; 5]), 2);
    }
}
