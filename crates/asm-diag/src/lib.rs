//! Shared diagnostic vocabulary for the assembler core.
//!
//! Every `asm-*` crate takes a `&dyn DiagSink` as an explicit dependency
//! instead of reaching for a process-wide logger, so the same assembler core
//! can run concurrently for independent programs (one instance per caller)
//! without shared mutable state. See `spec.md` §5 and §9.

use std::fmt;
use std::sync::Arc;

/// How serious a diagnostic is, per the error taxonomy in `spec.md` §7.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Warning,
    Error,
    Fatal,
}

/// Stable short code so tests can match on identity rather than message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagCode {
    /// Malformed token, unterminated string, bad directive.
    Syntax,
    /// Undefined symbol used where a value is required.
    UndefinedSymbol,
    /// Incompatible types in an operator, or division by zero.
    BadExpression,
    /// Duplicate symbol definition in the same scope.
    DuplicateSymbol,
    /// Unknown mnemonic.
    UnknownMnemonic,
    /// Operand count mismatch, illegal register range, modifier conflict.
    BadOperand,
    /// Two non-inline literals in one instruction.
    TwoLiterals,
    /// Include depth or macro nesting exceeded.
    NestingExceeded,
    /// Allocator ran out of architectural registers.
    OutOfRegisters,
    /// `use` scope cycle detected.
    ScopeCycle,
    /// I/O failure opening an include or writing output.
    Io,
    /// Table consistency violated / invariant broken.
    Internal,
}

/// A source position as translated by the active input filter
/// (`spec.md` §4.A `translate_position`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourcePos {
    pub file: Arc<str>,
    pub line: u32,
    pub column: u32,
}

impl SourcePos {
    pub fn new(file: impl Into<Arc<str>>, line: u32, column: u32) -> Self {
        Self {
            file: file.into(),
            line,
            column,
        }
    }
}

impl fmt::Display for SourcePos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: DiagCode,
    pub message: String,
    pub pos: Option<SourcePos>,
}

impl Diagnostic {
    pub fn new(severity: Severity, code: DiagCode, message: impl Into<String>) -> Self {
        Self {
            severity,
            code,
            message: message.into(),
            pos: None,
        }
    }

    pub fn at(mut self, pos: SourcePos) -> Self {
        self.pos = Some(pos);
        self
    }

    pub fn warning(code: DiagCode, message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, code, message)
    }

    pub fn error(code: DiagCode, message: impl Into<String>) -> Self {
        Self::new(Severity::Error, code, message)
    }

    pub fn fatal(code: DiagCode, message: impl Into<String>) -> Self {
        Self::new(Severity::Fatal, code, message)
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(pos) = &self.pos {
            write!(f, "{pos}: {:?}: {}", self.severity, self.message)
        } else {
            write!(f, "{:?}: {}", self.severity, self.message)
        }
    }
}

/// Explicit diagnostic output dependency. Implementors decide where
/// diagnostics go (in-memory buffer for tests, `tracing` events for the CLI).
pub trait DiagSink: Send + Sync {
    fn emit(&self, diag: Diagnostic);

    /// True once any diagnostic at `Severity::Error` or above has been
    /// emitted. Backs the assembler's `good` flag (`spec.md` §7).
    fn has_errors(&self) -> bool;
}

/// In-memory sink, used by library tests and anywhere diagnostics need to be
/// inspected programmatically.
#[derive(Debug, Default)]
pub struct VecDiagSink {
    inner: std::sync::Mutex<Vec<Diagnostic>>,
}

impl VecDiagSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take(&self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.inner.lock().expect("diag sink poisoned"))
    }

    pub fn snapshot(&self) -> Vec<Diagnostic> {
        self.inner.lock().expect("diag sink poisoned").clone()
    }
}

impl DiagSink for VecDiagSink {
    fn emit(&self, diag: Diagnostic) {
        self.inner.lock().expect("diag sink poisoned").push(diag);
    }

    fn has_errors(&self) -> bool {
        self.inner
            .lock()
            .expect("diag sink poisoned")
            .iter()
            .any(|d| d.severity >= Severity::Error)
    }
}

/// `tracing`-backed sink used by the CLI binary. Routes severity to the
/// matching `tracing` level under the `asm::diag` target, mirroring the
/// teacher's `target: "state.undo"`-style structured logging.
#[derive(Debug, Default)]
pub struct TracingDiagSink {
    errored: std::sync::atomic::AtomicBool,
}

impl TracingDiagSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DiagSink for TracingDiagSink {
    fn emit(&self, diag: Diagnostic) {
        let pos = diag.pos.as_ref().map(|p| p.to_string());
        match diag.severity {
            Severity::Warning => {
                tracing::warn!(target: "asm::diag", code = ?diag.code, pos, "{}", diag.message)
            }
            Severity::Error => {
                self.errored
                    .store(true, std::sync::atomic::Ordering::Relaxed);
                tracing::error!(target: "asm::diag", code = ?diag.code, pos, "{}", diag.message)
            }
            Severity::Fatal => {
                self.errored
                    .store(true, std::sync::atomic::Ordering::Relaxed);
                tracing::error!(target: "asm::diag", code = ?diag.code, pos, fatal = true, "{}", diag.message)
            }
        }
    }

    fn has_errors(&self) -> bool {
        self.errored.load(std::sync::atomic::Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vec_sink_tracks_errors() {
        let sink = VecDiagSink::new();
        assert!(!sink.has_errors());
        sink.emit(Diagnostic::warning(DiagCode::Syntax, "just a warning"));
        assert!(!sink.has_errors());
        sink.emit(Diagnostic::error(DiagCode::UndefinedSymbol, "oops"));
        assert!(sink.has_errors());
        assert_eq!(sink.snapshot().len(), 2);
    }

    #[test]
    fn diagnostic_display_includes_position() {
        let d = Diagnostic::error(DiagCode::BadExpression, "division by zero")
            .at(SourcePos::new("a.s", 3, 7));
        assert_eq!(format!("{d}"), "a.s:3:7: Error: division by zero");
    }

    #[test]
    fn take_drains_the_sink() {
        let sink = VecDiagSink::new();
        sink.emit(Diagnostic::warning(DiagCode::Syntax, "w"));
        assert_eq!(sink.take().len(), 1);
        assert_eq!(sink.snapshot().len(), 0);
    }
}
