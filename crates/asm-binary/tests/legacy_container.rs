use asm_binary::{build_legacy_container, InstrCounts, LegacyKernel};
use asm_elf::ElfClass;
use asm_format::LegacyKernelConfig;

#[test]
fn legacy_container_round_trips_through_elf_header_fields() {
    let kernels = vec![LegacyKernel {
        name: "vector_add",
        config: LegacyKernelConfig {
            vgprs_num: 6,
            sgprs_num: 12,
            sgprs_num_all: 24,
            float_mode: 0xc0,
            scratch_buffer_size: 0,
            local_size: 0,
            uses_printf: false,
        },
        counts: InstrCounts {
            instrs_num: 5,
            global_mem_ops: 2,
            local_mem_ops: 0,
        },
        code: &[0x7e, 0x00, 0x02, 0x00, 0x81, 0x00, 0x00, 0x00],
    }];

    let bytes = build_legacy_container(ElfClass::Elf64, &kernels, b"const data");

    assert_eq!(&bytes[0..4], &[0x7f, b'E', b'L', b'F']);
    assert_eq!(bytes[4], 2); // ELFCLASS64
    let e_shoff = u64::from_le_bytes(bytes[40..48].try_into().unwrap());
    assert!(e_shoff as usize <= bytes.len());
    assert_eq!(e_shoff % 8, 0);
}

#[test]
fn two_kernels_produce_two_stub_headers_back_to_back() {
    let kernel = |name: &'static str| LegacyKernel {
        name,
        config: LegacyKernelConfig::default(),
        counts: InstrCounts::default(),
        code: &[0u8; 4],
    };
    let kernels = vec![kernel("a"), kernel("b")];
    let bytes = build_legacy_container(ElfClass::Elf64, &kernels, &[]);
    assert!(bytes.len() > asm_binary::STUB_SIZE as usize * 2);
}
