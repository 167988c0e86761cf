//! Pseudo-op dispatcher (`spec.md` §4 component D): the main assembly
//! loop, directive table, macro/repeat/conditional block capture, and the
//! glue that drives the lexer, symbol table, encoder, allocator and format
//! handler as one pipeline over a source buffer.

mod assembler;
mod directive;
mod expr_support;
mod includes;
mod macros;
mod options;
mod pending;
mod regvars;

pub use assembler::{Assembler, BuildTelemetry, OutputFormat};
pub use includes::{IncludeResolver, MapIncludeResolver, NullIncludeResolver};
pub use options::{AssemblerOptions, DialectConfig};
