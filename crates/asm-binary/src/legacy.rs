//! Legacy AMD Catalyst OpenCL 1.2 container (`spec.md` §6 "Legacy AMD
//! OpenCL 1.2 container"). Bit-exact per-kernel stub/setup/trailer layout.

use asm_elf::{
    ElfClass, ElfWriter, SectionSpec, ET_EXEC, SHF_ALLOC, SHF_EXECINSTR, SHF_WRITE, SHT_PROGBITS,
    SHT_STRTAB,
};
use asm_format::LegacyKernelConfig;

pub const STUB_SIZE: u64 = 0xa60;
pub const SETUP_SIZE: u64 = 0x100;
const STUB_TRAILER_OFFSET: usize = 0x9a0;

/// Per-instruction memory-op counts driving `global_mem_ops`/`local_mem_ops`
/// in the stub header. Classification of the GCN `INSTRTYPE_GLOBAL` /
/// `INSTRTYPE_LOCAL` table lives upstream in the encoder/dispatcher; this
/// generator only serialises whatever counts it is handed.
#[derive(Debug, Clone, Copy, Default)]
pub struct InstrCounts {
    pub instrs_num: u32,
    pub global_mem_ops: u32,
    pub local_mem_ops: u32,
}

fn push_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn push_u64(out: &mut Vec<u8>, v: u64) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn write_stub_header(out: &mut Vec<u8>, config: &LegacyKernelConfig, counts: &InstrCounts) {
    push_u32(out, STUB_SIZE as u32); // hsa_text_offset
    push_u32(out, counts.instrs_num);
    push_u32(out, config.vgprs_num as u32);
    for _ in 0..6 {
        push_u32(out, 0);
    }
    push_u32(out, 0); // size_prog_val: filled in by the driver at load time
    push_u32(out, counts.global_mem_ops);
    push_u32(out, counts.local_mem_ops);
    push_u32(out, 0);
    push_u32(out, (config.sgprs_num_all as u32) + (config.vgprs_num as u32)); // program_reg_size
    push_u32(out, 0);
    push_u32(out, config.sgprs_num_all as u32);
}

fn write_stub_trailer(out: &mut Vec<u8>, config: &LegacyKernelConfig, code_size: u32) {
    push_u64(out, STUB_SIZE);
    push_u32(out, SETUP_SIZE as u32);
    push_u32(out, code_size + SETUP_SIZE as u32);
    push_u32(out, 0);
    push_u32(out, 0);
    push_u32(out, 0x200);
    push_u32(out, 0);
    push_u64(out, code_size as u64 + STUB_SIZE + 0x100);
    push_u32(out, 0);
    push_u32(out, 0);
    push_u64(out, code_size as u64 + STUB_SIZE + 0x100);
    push_u32(out, config.vgprs_num as u32);
    push_u32(out, config.sgprs_num_all as u32);
    push_u32(out, 0);
    push_u32(out, 0);
    push_u32(out, config.vgprs_num as u32);
    push_u32(out, config.sgprs_num as u32);
    push_u32(out, config.float_mode as u32);
    push_u32(out, 0);
    push_u32(out, 1);
    for _ in 0..3 {
        push_u32(out, 0);
    }
    push_u32(out, config.scratch_buffer_size.div_ceil(4));
    push_u32(out, config.local_size);
    push_u32(out, 0xffffffff);
    push_u32(out, 0);
}

/// Build one kernel's `stub + setup + code` blob (`spec.md` §6: "A
/// per-kernel stub of fixed 0xa60 bytes followed by a 0x100-byte setup and
/// then code").
pub fn build_kernel_blob(config: &LegacyKernelConfig, counts: &InstrCounts, code: &[u8]) -> Vec<u8> {
    let mut stub = vec![0u8; STUB_SIZE as usize];
    let mut header = Vec::new();
    write_stub_header(&mut header, config, counts);
    stub[..header.len()].copy_from_slice(&header);

    let mut trailer = Vec::new();
    write_stub_trailer(&mut trailer, config, code.len() as u32);
    stub[STUB_TRAILER_OFFSET..STUB_TRAILER_OFFSET + trailer.len()].copy_from_slice(&trailer);

    let mut blob = Vec::with_capacity(STUB_SIZE as usize + SETUP_SIZE as usize + code.len());
    blob.extend_from_slice(&stub);
    blob.extend(std::iter::repeat(0u8).take(SETUP_SIZE as usize));
    blob.extend_from_slice(code);
    blob
}

pub struct LegacyKernel<'a> {
    pub name: &'a str,
    pub config: LegacyKernelConfig,
    pub counts: InstrCounts,
    pub code: &'a [u8],
}

/// Assembles the full single-ELF legacy container (`spec.md` §6):
/// `.shstrtab .strtab .symtab .comment .rodata .text`.
pub fn build_legacy_container(
    class: ElfClass,
    kernels: &[LegacyKernel<'_>],
    rodata: &[u8],
) -> Vec<u8> {
    let mut text = Vec::new();
    let mut symtab_names = Vec::new();
    for k in kernels {
        symtab_names.push((k.name.to_string(), text.len() as u64));
        text.extend_from_slice(&build_kernel_blob(&k.config, &k.counts, k.code));
    }

    let mut strtab_bytes = vec![0u8];
    let mut symtab = Vec::new();
    for (name, value) in &symtab_names {
        let name_off = strtab_bytes.len() as u32;
        strtab_bytes.extend_from_slice(name.as_bytes());
        strtab_bytes.push(0);
        write_symtab_entry(&mut symtab, class, name_off, *value);
    }

    let comment = b"asm-binary legacy generator\0".to_vec();

    let sections = vec![
        SectionSpec::new(".text", SHT_PROGBITS)
            .with_flags(SHF_ALLOC | SHF_EXECINSTR)
            .with_align(4)
            .with_content(text),
        SectionSpec::new(".rodata", SHT_PROGBITS)
            .with_flags(SHF_ALLOC)
            .with_align(4)
            .with_content(rodata.to_vec()),
        SectionSpec::new(".comment", SHT_PROGBITS).with_content(comment),
        SectionSpec::new(".strtab", SHT_STRTAB).with_content(strtab_bytes),
        SectionSpec::new(".symtab", asm_elf::SHT_SYMTAB)
            .with_link(4) // index of .strtab among declared sections (1-based + null)
            .with_entsize(if class == ElfClass::Elf64 { 24 } else { 16 })
            .with_content(symtab),
    ];
    let _ = SHF_WRITE; // reserved for future .data sections

    let writer = ElfWriter {
        class,
        e_type: ET_EXEC,
        e_machine: 0xe0, // EM_AMDGPU-ish placeholder: the core does not model a real e_machine registry
        e_flags: 0,
        e_entry: 0,
    };
    writer.build(&sections, &[]).expect("legacy container sections are well-formed").bytes
}

fn write_symtab_entry(out: &mut Vec<u8>, class: ElfClass, name_off: u32, value: u64) {
    match class {
        ElfClass::Elf32 => {
            out.extend_from_slice(&name_off.to_le_bytes());
            out.extend_from_slice(&(value as u32).to_le_bytes());
            out.extend_from_slice(&0u32.to_le_bytes()); // st_size
            out.push(0x10); // st_info: STB_GLOBAL<<4 | STT_FUNC
            out.push(0); // st_other
            out.extend_from_slice(&1u16.to_le_bytes()); // st_shndx: .text
        }
        ElfClass::Elf64 => {
            out.extend_from_slice(&name_off.to_le_bytes());
            out.push(0x10);
            out.push(0);
            out.extend_from_slice(&1u16.to_le_bytes());
            out.extend_from_slice(&value.to_le_bytes());
            out.extend_from_slice(&0u64.to_le_bytes()); // st_size
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stub_header_has_fixed_hsa_text_offset_and_counts() {
        let config = LegacyKernelConfig {
            vgprs_num: 4,
            sgprs_num: 8,
            sgprs_num_all: 16,
            float_mode: 0xc0,
            scratch_buffer_size: 10,
            local_size: 256,
            ..Default::default()
        };
        let counts = InstrCounts {
            instrs_num: 3,
            global_mem_ops: 1,
            local_mem_ops: 0,
        };
        let blob = build_kernel_blob(&config, &counts, &[0u8; 8]);
        assert_eq!(blob.len(), STUB_SIZE as usize + SETUP_SIZE as usize + 8);
        let hsa_text_offset = u32::from_le_bytes(blob[0..4].try_into().unwrap());
        assert_eq!(hsa_text_offset, 0xa60);
        let instrs_num = u32::from_le_bytes(blob[4..8].try_into().unwrap());
        assert_eq!(instrs_num, 3);
    }

    #[test]
    fn stub_trailer_reports_code_size_plus_setup() {
        let config = LegacyKernelConfig::default();
        let counts = InstrCounts::default();
        let code = vec![0u8; 16];
        let blob = build_kernel_blob(&config, &counts, &code);
        let trailer = &blob[STUB_TRAILER_OFFSET..];
        let hsa_text_offset = u64::from_le_bytes(trailer[0..8].try_into().unwrap());
        assert_eq!(hsa_text_offset, 0xa60);
        let end_size = u32::from_le_bytes(trailer[8..12].try_into().unwrap());
        assert_eq!(end_size, 0x100);
        let hsa_text_size = u32::from_le_bytes(trailer[12..16].try_into().unwrap());
        assert_eq!(hsa_text_size, 16 + 0x100);
    }

    #[test]
    fn container_places_every_kernel_blob_back_to_back_in_text() {
        let kernels = vec![
            LegacyKernel {
                name: "a",
                config: LegacyKernelConfig::default(),
                counts: InstrCounts::default(),
                code: &[0xAA, 0xBB],
            },
            LegacyKernel {
                name: "b",
                config: LegacyKernelConfig::default(),
                counts: InstrCounts::default(),
                code: &[0xCC, 0xDD],
            },
        ];
        let bytes = build_legacy_container(ElfClass::Elf64, &kernels, &[]);
        assert!(!bytes.is_empty());
        assert_eq!(bytes[4], 2); // EI_CLASS = ELFCLASS64
    }
}
