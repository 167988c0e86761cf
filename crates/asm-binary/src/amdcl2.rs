//! AMDCL2 OpenCL 2.0 container (`spec.md` §6 "AMDCL2 OpenCL 2.0
//! container"): nested ELF, kernel metadata, sampler-init table, and the
//! architecture-version notes section.

use asm_elf::{ElfClass, ElfWriter, SectionSpec, ET_DYN, SHF_ALLOC, SHF_EXECINSTR, SHT_NOTE, SHT_PROGBITS};
use asm_format::Amdcl2KernelConfig;

/// `GPUDeviceType`-keyed device-code table, one column per driver-version
/// band (`spec.md` §6: "Driver-version→GPU-device-code table is a 30-entry
/// array... seven driver-version bands select different tables").
/// A missing entry is `u32::MAX`, a fatal error at generation time.
pub const GPU_DEVICE_COUNT: usize = 30;
pub const DRIVER_VERSION_BANDS: usize = 7;

pub type DeviceCodeTable = [u32; GPU_DEVICE_COUNT];

pub fn device_code(tables: &[DeviceCodeTable; DRIVER_VERSION_BANDS], band: usize, device: usize) -> Option<u32> {
    let code = *tables.get(band)?.get(device)?;
    if code == u32::MAX {
        None
    } else {
        Some(code)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverVersion(pub u32);

impl DriverVersion {
    pub fn header_size(self) -> u32 {
        if self.0 >= 200_406 {
            0x110
        } else if self.0 >= 191_205 {
            0xe0
        } else {
            0xd8
        }
    }

    fn arg_type_band(self) -> u32 {
        if self.0 >= 200_406 {
            2
        } else if self.0 >= 191_205 {
            1
        } else {
            0
        }
    }
}

/// Architecture word per `GPUDeviceType` generation, used both for the
/// kernel metadata second-name field and the notes section.
fn arch_word(gfx_gen: u8) -> &'static str {
    match gfx_gen {
        6 => "GFX6",
        7 => "GFX7",
        8 => "GFX8",
        _ => "GFX9",
    }
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct KernelOptions: u32 {
        const HAS_REQD_WG_SIZE = 1 << 2;
        const IS_64_BIT        = 1 << 5;
        const USES_EXTRA       = 1 << 8;
    }
}

fn push_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn push_u64(out: &mut Vec<u8>, v: u64) {
    out.extend_from_slice(&v.to_le_bytes());
}

/// Serialise one kernel's metadata record (`spec.md` §6 "Kernel metadata
/// record layout (64-bit)").
pub fn write_kernel_metadata(
    out: &mut Vec<u8>,
    driver: DriverVersion,
    kernel_index: u32,
    config: &Amdcl2KernelConfig,
    is_64_bit: bool,
    gfx_gen: u8,
) {
    let header_size = driver.header_size();
    push_u32(out, header_size);
    push_u32(out, header_size); // metadata_size: equal to header.size absent argument records here
    push_u32(out, 3);
    push_u32(out, 1);
    push_u32(out, 0x68);

    let mut options = KernelOptions::empty();
    if config.reqd_work_group_size.is_some() {
        options |= KernelOptions::HAS_REQD_WG_SIZE;
    }
    if is_64_bit {
        options |= KernelOptions::IS_64_BIT;
    }
    if config.uses_enqueue || config.uses_local_memory || config.uses_pipes || config.uses_scratch {
        options |= KernelOptions::USES_EXTRA;
    }
    push_u32(out, options.bits());
    push_u32(out, kernel_index + 1024);
    push_u32(out, 0); // unknown_xy[0]
    push_u32(out, 0); // unknown_xy[1]
    push_u64(out, 0x0100000008);
    push_u64(out, 0x0200000001);

    let wg = config.reqd_work_group_size.unwrap_or([0, 0, 0]);
    for v in wg {
        push_u32(out, v);
    }
    for _ in 0..3 {
        push_u32(out, 0);
    }
    push_u32(out, 0x15);

    let arch = arch_word(gfx_gen);
    let second_name_len = if driver.arg_type_band() == 0 { 7 } else { arch.len() as u32 };
    push_u32(out, second_name_len);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PtrSpace {
    Private,
    Global,
    Constant,
    Local,
}

impl PtrSpace {
    /// `spec.md` §6 "ptrSpace (space table {0,3,5,4})".
    fn code(self) -> u32 {
        match self {
            PtrSpace::Private => 0,
            PtrSpace::Global => 3,
            PtrSpace::Constant => 5,
            PtrSpace::Local => 4,
        }
    }
}

#[derive(Debug, Clone)]
pub struct KernelArg {
    pub name: String,
    pub type_name: String,
    pub size_or_resource_id: u32,
    pub is_pointer_or_pipe: bool,
    pub ptr_space: PtrSpace,
    pub ptr_align: u32,
    pub is_const: bool,
    pub is_volatile: bool,
    pub is_restrict: bool,
    pub is_pipe: bool,
    pub kind_of_type: u32,
}

/// One 48-byte argument entry (`spec.md` §6 "Kernel-argument entries (48
/// bytes × argsN + null terminator)"). `running_offset` is mutated in
/// place, 16-byte aligned between entries.
pub fn write_kernel_arg(out: &mut Vec<u8>, arg: &KernelArg, running_offset: &mut u32, driver: DriverVersion) {
    push_u32(out, arg.name.len() as u32);
    push_u32(out, arg.type_name.len() as u32);
    push_u32(out, arg.size_or_resource_id);

    let aligned = running_offset.next_multiple_of(16);
    push_u32(out, aligned);
    *running_offset = aligned + arg.size_or_resource_id.max(4);

    let _ = driver; // argType remap by driver band is opaque per spec.md §9; current core emits kindOfType verbatim
    push_u32(out, arg.kind_of_type);
    push_u32(out, arg.ptr_align);
    push_u32(out, if arg.is_pointer_or_pipe { 1 } else { 0 });
    push_u32(out, arg.ptr_space.code());
    push_u32(out, arg.is_pointer_or_pipe as u32);

    let mut bits = 0u32;
    if arg.is_const {
        bits |= 1;
    }
    if arg.is_volatile {
        bits |= 2;
    }
    if arg.is_restrict {
        bits |= 4;
    }
    push_u32(out, bits);
    push_u32(out, arg.is_pipe as u32);
    push_u32(out, 0); // reserved
    // 48 bytes total: 12 u32 fields above = 48 bytes exactly.
}

/// Sampler-init table entry: `(0x10008, sampler_value)` (`spec.md` §6
/// "Sampler-init table (AMDCL2)").
pub fn write_sampler_entry(out: &mut Vec<u8>, sampler_value: u32) {
    push_u32(out, 0x10008);
    push_u32(out, sampler_value);
}

/// `Elf64_Rela` binding a sampler symbol to its slot in global data.
pub fn write_sampler_reloc(out: &mut Vec<u8>, offset: u64, symbol_index: u32, addend: i64) {
    push_u64(out, offset);
    let r_info = ((symbol_index as u64) << 32) | 1; // R_TYPE = 1: direct 64-bit relocation
    push_u64(out, r_info);
    out.extend_from_slice(&addend.to_le_bytes());
}

#[derive(Debug, Clone, Copy)]
pub struct AmdGpuArchValues {
    pub major: u32,
    pub minor: u32,
    pub stepping: u32,
}

/// The five-note `.note` section (`spec.md` §6 "Notes section (AMDCL2)").
/// Notes 4 and 5 carry opaque byte sequences per `spec.md` §9's open
/// question; they are reproduced as fixed zero-filled placeholders here,
/// to be overwritten only if a specific target driver's exact bytes are
/// later confirmed.
pub fn write_notes(out: &mut Vec<u8>, arch: AmdGpuArchValues) {
    write_note(out, 1, &[]);
    write_note(out, 2, &[]);
    let mut type3 = Vec::new();
    push_u32(&mut type3, 0x0004_0007);
    push_u32(&mut type3, arch.major);
    push_u32(&mut type3, arch.minor);
    push_u32(&mut type3, arch.stepping);
    type3.extend_from_slice(b"AMD\0AMDGPU\0");
    write_note(out, 3, &type3);
    write_note(out, 4, &[0u8; 8]);
    write_note(out, 5, &[0u8; 8]);
}

fn write_note(out: &mut Vec<u8>, note_type: u32, desc: &[u8]) {
    let name = b"AMD\0";
    push_u32(out, name.len() as u32);
    push_u32(out, desc.len() as u32);
    push_u32(out, note_type);
    out.extend_from_slice(name);
    pad_to_4(out, name.len());
    out.extend_from_slice(desc);
    pad_to_4(out, desc.len());
}

fn pad_to_4(out: &mut Vec<u8>, written: usize) {
    let rem = written % 4;
    if rem != 0 {
        out.extend(std::iter::repeat(0u8).take(4 - rem));
    }
}

/// One kernel's code and config as handed to [`build_amdcl2_container`].
pub struct Amdcl2Kernel<'a> {
    pub name: &'a str,
    pub config: Amdcl2KernelConfig,
    pub code: &'a [u8],
}

/// Assembles the nested-ELF AMDCL2 container (`spec.md` §6 "outer ELF...
/// contains an inner ELF... as the `.text` region"): an inner device ELF
/// holding per-kernel code, global data, kernel metadata and the
/// architecture-version notes, wrapped as the `.text` section of an outer
/// host ELF.
pub fn build_amdcl2_container(
    class: ElfClass,
    driver: DriverVersion,
    arch: AmdGpuArchValues,
    gfx_gen: u8,
    kernels: &[Amdcl2Kernel<'_>],
    global_data: &[u8],
) -> Vec<u8> {
    let is_64_bit = class == ElfClass::Elf64;

    let mut text = Vec::new();
    let mut metadata = Vec::new();
    for (i, k) in kernels.iter().enumerate() {
        write_kernel_metadata(&mut metadata, driver, i as u32, &k.config, is_64_bit, gfx_gen);
        text.extend_from_slice(k.code);
    }

    let mut notes = Vec::new();
    write_notes(&mut notes, arch);

    let inner_sections = vec![
        SectionSpec::new(".text", SHT_PROGBITS)
            .with_flags(SHF_ALLOC | SHF_EXECINSTR)
            .with_align(256)
            .with_content(text),
        SectionSpec::new(".rodata", SHT_PROGBITS)
            .with_flags(SHF_ALLOC)
            .with_align(4)
            .with_content(global_data.to_vec()),
        SectionSpec::new(".note", SHT_NOTE).with_content(notes),
        SectionSpec::new(".metadata", SHT_PROGBITS).with_content(metadata),
    ];
    let inner = ElfWriter {
        class,
        e_type: ET_DYN,
        e_machine: 0xe0,
        e_flags: 0,
        e_entry: 0,
    }
    .build(&inner_sections, &[])
    .expect("amdcl2 device elf sections are well-formed")
    .bytes;

    let outer_sections = vec![
        SectionSpec::new(".text", SHT_PROGBITS)
            .with_flags(SHF_ALLOC)
            .with_align(4096)
            .with_content(inner),
    ];
    let outer = ElfWriter {
        class,
        e_type: ET_DYN,
        e_machine: 0,
        e_flags: 0,
        e_entry: 0,
    }
    .build(&outer_sections, &[])
    .expect("amdcl2 host elf sections are well-formed");
    outer.bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_size_selects_by_driver_version_band() {
        assert_eq!(DriverVersion(191_100).header_size(), 0xd8);
        assert_eq!(DriverVersion(191_205).header_size(), 0xe0);
        assert_eq!(DriverVersion(200_406).header_size(), 0x110);
    }

    #[test]
    fn device_code_lookup_treats_u32_max_as_unsupported() {
        let mut tables = [[0u32; GPU_DEVICE_COUNT]; DRIVER_VERSION_BANDS];
        tables[0][0] = 7;
        tables[0][1] = u32::MAX;
        assert_eq!(device_code(&tables, 0, 0), Some(7));
        assert_eq!(device_code(&tables, 0, 1), None);
    }

    #[test]
    fn kernel_metadata_sets_reqd_wg_size_option_bit() {
        let config = Amdcl2KernelConfig {
            reqd_work_group_size: Some([64, 1, 1]),
            ..Default::default()
        };
        let mut out = Vec::new();
        write_kernel_metadata(&mut out, DriverVersion(191_100), 0, &config, false, 8);
        let options = u32::from_le_bytes(out[20..24].try_into().unwrap());
        assert_ne!(options & KernelOptions::HAS_REQD_WG_SIZE.bits(), 0);
    }

    #[test]
    fn type3_note_encodes_arch_values_and_amd_amdgpu_strings() {
        let mut out = Vec::new();
        write_notes(
            &mut out,
            AmdGpuArchValues {
                major: 9,
                minor: 0,
                stepping: 0,
            },
        );
        assert!(out.windows(4).any(|w| w == b"AMD\0"));
        assert!(out.windows(7).any(|w| w == b"AMDGPU\0"));
    }

    #[test]
    fn container_nests_device_elf_inside_host_text_section() {
        let kernels = vec![Amdcl2Kernel {
            name: "k",
            config: Amdcl2KernelConfig::default(),
            code: &[0x7f, 0x80, 0x81, 0x82],
        }];
        let bytes = build_amdcl2_container(
            ElfClass::Elf64,
            DriverVersion(191_100),
            AmdGpuArchValues {
                major: 9,
                minor: 0,
                stepping: 0,
            },
            9,
            &kernels,
            &[],
        );
        assert_eq!(bytes[4], 2); // outer EI_CLASS = ELFCLASS64
        assert!(bytes.windows(4).any(|w| w == [0x7f, 0x45, 0x4c, 0x46])); // nested ELF magic
        assert!(bytes.windows(4).any(|w| w == [0x7f, 0x80, 0x81, 0x82])); // kernel code reached the inner .text
    }
}
