//! Core ELF writer (`spec.md` §4 component I): section/program header
//! tables, string tables, 32/64-bit support. Shared by every `asm-binary`
//! container generator.

mod header;
mod program;
mod section;
mod strtab;
mod writer;

pub use header::{
    ElfClass, ET_DYN, ET_EXEC, ET_REL, PT_LOAD, PT_NOTE, SHF_ALLOC, SHF_EXECINSTR, SHF_WRITE,
    SHT_NOBITS, SHT_NOTE, SHT_NULL, SHT_PROGBITS, SHT_RELA, SHT_STRTAB, SHT_SYMTAB,
};
pub use program::ProgramHeaderSpec;
pub use section::{SectionPlacement, SectionSpec};
pub use strtab::StrTab;
pub use writer::{BuiltElf, ElfError, ElfWriter};
