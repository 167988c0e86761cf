//! Kernel records (`spec.md` §3 "Kernel"). Config is format-tagged: a
//! legacy-AMD kernel and an AMDCL2 kernel carry different setup-word
//! fields, so `KernelConfig` is a sum type rather than one record with
//! optional fields, mirroring how `spec.md` §6 describes them.

use asm_symtab::{SectionId, SymbolId};

#[derive(Debug, Clone, Default)]
pub struct LegacyKernelConfig {
    pub float_mode: u8,
    pub sgprs_num: u16,
    pub vgprs_num: u16,
    pub sgprs_num_all: u16,
    pub scratch_buffer_size: u32,
    pub local_size: u32,
    pub uses_printf: bool,
}

#[derive(Debug, Clone, Default)]
pub struct Amdcl2KernelConfig {
    pub reqd_work_group_size: Option<[u32; 3]>,
    pub uses_enqueue: bool,
    pub uses_local_memory: bool,
    pub uses_pipes: bool,
    pub uses_scratch: bool,
    pub sgprs_num: u16,
    pub vgprs_num: u16,
}

#[derive(Debug, Clone)]
pub enum KernelConfig {
    Legacy(LegacyKernelConfig),
    Amdcl2(Amdcl2KernelConfig),
    /// Raw format kernels carry no setup-word metadata at all.
    None,
}

#[derive(Debug, Clone)]
pub struct Kernel {
    pub id: u32,
    pub name: String,
    pub config: KernelConfig,
    pub sections: Vec<SectionId>,
    pub symbols: Vec<SymbolId>,
}

impl Kernel {
    pub fn new(id: u32, name: impl Into<String>, config: KernelConfig) -> Self {
        Self {
            id,
            name: name.into(),
            config,
            sections: Vec::new(),
            symbols: Vec::new(),
        }
    }
}
