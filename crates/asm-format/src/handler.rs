//! The format-handler contract (`spec.md` §4.G). One interface type,
//! concrete variants behind it, per the re-architecture note in `spec.md`
//! §9 ("deep inheritance between... format handlers... replace with a
//! single interface type per role").

use thiserror::Error;

use asm_symtab::{SectionFlags, SectionId, SectionTable, SectionType};

use crate::kernel::Kernel;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FormatError {
    #[error("kernel {0:?} has no code section")]
    KernelMissingCode(String),
    #[error("format does not support section {0:?}")]
    UnsupportedSection(String),
}

/// The parts of a format handler the core consumes (`spec.md` §4.G).
pub trait FormatHandler {
    fn section_id_for_name(&self, sections: &SectionTable, name: &str, kernel: Option<u32>) -> Option<SectionId>;

    fn create_section(
        &mut self,
        sections: &mut SectionTable,
        name: &str,
        kernel: Option<u32>,
        flags: SectionFlags,
    ) -> SectionId;

    /// True iff the format resolves cross-section expressions during
    /// writing rather than requiring them to already be sectioned
    /// identically at encode time.
    fn is_section_diffs_resolvable(&self) -> bool;

    fn finalise(&mut self, kernels: &[Kernel], sections: &SectionTable) -> Result<(), FormatError>;
}

fn section_type_for(name: &str) -> SectionType {
    match name {
        ".text" => SectionType::Text,
        ".data" => SectionType::Data,
        ".rodata" => SectionType::Rodata,
        ".bss" => SectionType::Bss,
        _ => SectionType::Other,
    }
}

/// Single `.text` section, no metadata (`spec.md` §4.G "Raw").
#[derive(Debug, Default)]
pub struct RawFormat;

impl FormatHandler for RawFormat {
    fn section_id_for_name(&self, sections: &SectionTable, name: &str, _kernel: Option<u32>) -> Option<SectionId> {
        sections.find(name, None)
    }

    fn create_section(
        &mut self,
        sections: &mut SectionTable,
        name: &str,
        _kernel: Option<u32>,
        flags: SectionFlags,
    ) -> SectionId {
        sections.create(name, None, section_type_for(name), flags)
    }

    fn is_section_diffs_resolvable(&self) -> bool {
        false
    }

    fn finalise(&mut self, _kernels: &[Kernel], _sections: &SectionTable) -> Result<(), FormatError> {
        Ok(())
    }
}

/// Per-kernel `.text`/`.header`/`.metadata`/`.data`, a global `.rodata`
/// (`spec.md` §4.G "AMD (legacy)").
#[derive(Debug, Default)]
pub struct AmdLegacyFormat;

impl AmdLegacyFormat {
    const PER_KERNEL: [&'static str; 4] = [".text", ".header", ".metadata", ".data"];
}

impl FormatHandler for AmdLegacyFormat {
    fn section_id_for_name(&self, sections: &SectionTable, name: &str, kernel: Option<u32>) -> Option<SectionId> {
        if name == ".rodata" {
            sections.find(name, None)
        } else {
            sections.find(name, kernel)
        }
    }

    fn create_section(
        &mut self,
        sections: &mut SectionTable,
        name: &str,
        kernel: Option<u32>,
        flags: SectionFlags,
    ) -> SectionId {
        let owner = if name == ".rodata" { None } else { kernel };
        sections.create(name, owner, section_type_for(name), flags)
    }

    fn is_section_diffs_resolvable(&self) -> bool {
        false
    }

    fn finalise(&mut self, kernels: &[Kernel], sections: &SectionTable) -> Result<(), FormatError> {
        for k in kernels {
            let has_text = Self::PER_KERNEL.iter().take(1).any(|n| {
                sections.find(n, Some(k.id)).is_some()
            });
            if !has_text {
                return Err(FormatError::KernelMissingCode(k.name.clone()));
            }
        }
        Ok(())
    }
}

/// Two-level container: a device ELF's per-kernel `.text`, sampler-init
/// and relocation sections (`spec.md` §4.G "AMDCL2").
#[derive(Debug, Default)]
pub struct Amdcl2Format;

impl FormatHandler for Amdcl2Format {
    fn section_id_for_name(&self, sections: &SectionTable, name: &str, kernel: Option<u32>) -> Option<SectionId> {
        sections.find(name, kernel)
    }

    fn create_section(
        &mut self,
        sections: &mut SectionTable,
        name: &str,
        kernel: Option<u32>,
        flags: SectionFlags,
    ) -> SectionId {
        sections.create(name, kernel, section_type_for(name), flags)
    }

    fn is_section_diffs_resolvable(&self) -> bool {
        true
    }

    fn finalise(&mut self, kernels: &[Kernel], sections: &SectionTable) -> Result<(), FormatError> {
        for k in kernels {
            if sections.find(".text", Some(k.id)).is_none() {
                return Err(FormatError::KernelMissingCode(k.name.clone()));
            }
        }
        Ok(())
    }
}

/// Interface-level stubs only (`spec.md` §4.G: "specified at the interface
/// level only; they plug into the same handler contract").
#[derive(Debug, Default)]
pub struct GalliumFormat;

impl FormatHandler for GalliumFormat {
    fn section_id_for_name(&self, sections: &SectionTable, name: &str, kernel: Option<u32>) -> Option<SectionId> {
        sections.find(name, kernel)
    }

    fn create_section(
        &mut self,
        _sections: &mut SectionTable,
        name: &str,
        _kernel: Option<u32>,
        _flags: SectionFlags,
    ) -> SectionId {
        unimplemented!("gallium container layout is outside this core's scope: {name}")
    }

    fn is_section_diffs_resolvable(&self) -> bool {
        false
    }

    fn finalise(&mut self, _kernels: &[Kernel], _sections: &SectionTable) -> Result<(), FormatError> {
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct RocmFormat;

impl FormatHandler for RocmFormat {
    fn section_id_for_name(&self, sections: &SectionTable, name: &str, kernel: Option<u32>) -> Option<SectionId> {
        sections.find(name, kernel)
    }

    fn create_section(
        &mut self,
        _sections: &mut SectionTable,
        name: &str,
        _kernel: Option<u32>,
        _flags: SectionFlags,
    ) -> SectionId {
        unimplemented!("rocm container layout is outside this core's scope: {name}")
    }

    fn is_section_diffs_resolvable(&self) -> bool {
        true
    }

    fn finalise(&mut self, _kernels: &[Kernel], _sections: &SectionTable) -> Result<(), FormatError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use asm_symtab::SectionFlags;

    #[test]
    fn raw_format_creates_and_finds_a_single_text_section() {
        let mut sections = SectionTable::new();
        let mut fmt = RawFormat;
        let id = fmt.create_section(&mut sections, ".text", None, SectionFlags::CODE);
        assert_eq!(fmt.section_id_for_name(&sections, ".text", None), Some(id));
    }

    #[test]
    fn amd_legacy_finalise_rejects_kernel_without_text() {
        let sections = SectionTable::new();
        let mut fmt = AmdLegacyFormat;
        let kernels = vec![Kernel::new(0, "foo", crate::kernel::KernelConfig::None)];
        assert!(fmt.finalise(&kernels, &sections).is_err());
    }

    #[test]
    fn amd_legacy_rodata_is_shared_across_kernels() {
        let mut sections = SectionTable::new();
        let mut fmt = AmdLegacyFormat;
        let id = fmt.create_section(&mut sections, ".rodata", Some(1), SectionFlags::empty());
        assert_eq!(fmt.section_id_for_name(&sections, ".rodata", Some(2)), Some(id));
    }
}
