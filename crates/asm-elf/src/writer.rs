//! Header, section-content, section-header-table, and program-header-table
//! emission (`spec.md` §4.I). Layout order matches the responsibilities
//! listed there: assign indices, build `.shstrtab`, resolve
//! cross-references, then write.

use thiserror::Error;

use crate::header::{write_ident, ElfClass, SHT_NULL, SHT_STRTAB};
use crate::program::ProgramHeaderSpec;
use crate::section::{SectionPlacement, SectionSpec};
use crate::strtab::StrTab;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ElfError {
    #[error("program header covers no sections")]
    EmptyProgramHeader,
    #[error("program header references out-of-range section index {0}")]
    BadSectionIndex(usize),
}

fn align_up(value: u64, align: u64) -> u64 {
    if align <= 1 {
        return value;
    }
    let rem = value % align;
    if rem == 0 {
        value
    } else {
        value + (align - rem)
    }
}

fn put_addr(out: &mut Vec<u8>, class: ElfClass, value: u64) {
    match class {
        ElfClass::Elf32 => out.extend_from_slice(&(value as u32).to_le_bytes()),
        ElfClass::Elf64 => out.extend_from_slice(&value.to_le_bytes()),
    }
}

/// Builds a single ELF image: section index 0 is the mandatory `SHT_NULL`
/// entry, `.shstrtab` is appended automatically from the given sections'
/// names, and the section-header-table offset is 8-byte aligned
/// (`spec.md` §8 invariant 7).
pub struct ElfWriter {
    pub class: ElfClass,
    pub e_type: u16,
    pub e_machine: u16,
    pub e_flags: u32,
    pub e_entry: u64,
}

pub struct BuiltElf {
    pub bytes: Vec<u8>,
    /// Placement of every *declared* section (not counting the synthetic
    /// null entry or the auto-appended `.shstrtab`), in the order given to
    /// [`ElfWriter::build`].
    pub placements: Vec<SectionPlacement>,
}

impl ElfWriter {
    pub fn build(
        &self,
        sections: &[SectionSpec],
        programs: &[ProgramHeaderSpec],
    ) -> Result<BuiltElf, ElfError> {
        for p in programs {
            if p.covers.is_empty() {
                return Err(ElfError::EmptyProgramHeader);
            }
            for &idx in &p.covers {
                if idx >= sections.len() {
                    return Err(ElfError::BadSectionIndex(idx));
                }
            }
        }

        let class = self.class;
        let ehdr_size = class.ehdr_size() as u64;
        let phdr_size = class.phdr_size() as u64;
        let shdr_size = class.shdr_size() as u64;

        let phoff = if programs.is_empty() { 0 } else { ehdr_size };
        let mut cursor = phoff + phdr_size * programs.len() as u64;

        let mut placements = Vec::with_capacity(sections.len());
        let mut content_blobs: Vec<(u64, &[u8])> = Vec::new();

        for (i, s) in sections.iter().enumerate() {
            cursor = align_up(cursor, s.addralign.max(1));
            let offset = cursor;
            let size = if s.sh_type == crate::header::SHT_NOBITS {
                s.nobits_size
            } else {
                s.content.len() as u64
            };
            placements.push(SectionPlacement {
                index: (i + 1) as u32, // +1: index 0 is the null section
                offset,
                size,
            });
            if s.sh_type != crate::header::SHT_NOBITS {
                content_blobs.push((offset, &s.content));
                cursor += size;
            }
        }

        // .shstrtab, built last so every declared name (plus its own) is
        // already known.
        let mut shstrtab = StrTab::new();
        let mut name_offsets = Vec::with_capacity(sections.len());
        for s in sections {
            name_offsets.push(shstrtab.add(&s.name));
        }
        let shstrtab_name_off = shstrtab.add(".shstrtab");
        let shstrtab_bytes = shstrtab.into_bytes();

        cursor = align_up(cursor, 1);
        let shstrtab_offset = cursor;
        cursor += shstrtab_bytes.len() as u64;

        let shoff = align_up(cursor, 8);

        let total_sections = sections.len() + 2; // null + declared + shstrtab
        let shstrndx = (sections.len() + 1) as u16;

        let mut out = Vec::with_capacity(shoff as usize + total_sections * shdr_size as usize);

        write_ident(&mut out, class);
        out.extend_from_slice(&self.e_type.to_le_bytes());
        out.extend_from_slice(&self.e_machine.to_le_bytes());
        out.extend_from_slice(&1u32.to_le_bytes()); // e_version
        put_addr(&mut out, class, self.e_entry);
        put_addr(&mut out, class, phoff);
        put_addr(&mut out, class, shoff);
        out.extend_from_slice(&self.e_flags.to_le_bytes());
        out.extend_from_slice(&(ehdr_size as u16).to_le_bytes());
        out.extend_from_slice(&(phdr_size as u16).to_le_bytes());
        out.extend_from_slice(&(programs.len() as u16).to_le_bytes());
        out.extend_from_slice(&(shdr_size as u16).to_le_bytes());
        out.extend_from_slice(&(total_sections as u16).to_le_bytes());
        out.extend_from_slice(&shstrndx.to_le_bytes());
        debug_assert_eq!(out.len() as u64, ehdr_size);

        for p in programs {
            let first = &placements[p.covers[0]];
            let last = &placements[*p.covers.last().unwrap()];
            let span = (last.offset + last.size) - first.offset;
            write_phdr(&mut out, class, p, first.offset, span);
        }
        debug_assert_eq!(out.len() as u64, phoff + phdr_size * programs.len() as u64, "program header table must be contiguous");

        for (offset, bytes) in &content_blobs {
            while (out.len() as u64) < *offset {
                out.push(0);
            }
            out.extend_from_slice(bytes);
        }
        while (out.len() as u64) < shstrtab_offset {
            out.push(0);
        }
        out.extend_from_slice(&shstrtab_bytes);
        while (out.len() as u64) < shoff {
            out.push(0);
        }

        write_shdr_null(&mut out, class);
        for (i, s) in sections.iter().enumerate() {
            let placement = &placements[i];
            write_shdr(
                &mut out,
                class,
                name_offsets[i],
                s,
                placement.offset,
                placement.size,
            );
        }
        write_shdr_strtab(&mut out, class, shstrtab_name_off, shstrtab_offset, shstrtab_bytes.len() as u64);

        tracing::debug!(
            target: "asm::elf",
            sections = sections.len(),
            programs = programs.len(),
            shoff,
            "elf image built"
        );

        Ok(BuiltElf {
            bytes: out,
            placements,
        })
    }
}

fn write_phdr(out: &mut Vec<u8>, class: ElfClass, p: &ProgramHeaderSpec, offset: u64, filesz: u64) {
    match class {
        ElfClass::Elf32 => {
            out.extend_from_slice(&p.p_type.to_le_bytes());
            out.extend_from_slice(&(offset as u32).to_le_bytes());
            out.extend_from_slice(&(p.p_vaddr as u32).to_le_bytes());
            out.extend_from_slice(&(p.p_vaddr as u32).to_le_bytes()); // p_paddr
            out.extend_from_slice(&(filesz as u32).to_le_bytes());
            out.extend_from_slice(&(filesz as u32).to_le_bytes()); // p_memsz
            out.extend_from_slice(&p.p_flags.to_le_bytes());
            out.extend_from_slice(&(p.p_align as u32).to_le_bytes());
        }
        ElfClass::Elf64 => {
            out.extend_from_slice(&p.p_type.to_le_bytes());
            out.extend_from_slice(&p.p_flags.to_le_bytes());
            out.extend_from_slice(&offset.to_le_bytes());
            out.extend_from_slice(&p.p_vaddr.to_le_bytes());
            out.extend_from_slice(&p.p_vaddr.to_le_bytes()); // p_paddr
            out.extend_from_slice(&filesz.to_le_bytes());
            out.extend_from_slice(&filesz.to_le_bytes()); // p_memsz
            out.extend_from_slice(&p.p_align.to_le_bytes());
        }
    }
}

fn write_shdr_null(out: &mut Vec<u8>, class: ElfClass) {
    out.extend(std::iter::repeat(0u8).take(class.shdr_size()));
    debug_assert!(SHT_NULL == 0);
}

fn write_shdr(
    out: &mut Vec<u8>,
    class: ElfClass,
    name_off: u32,
    s: &SectionSpec,
    offset: u64,
    size: u64,
) {
    match class {
        ElfClass::Elf32 => {
            out.extend_from_slice(&name_off.to_le_bytes());
            out.extend_from_slice(&s.sh_type.to_le_bytes());
            out.extend_from_slice(&(s.sh_flags as u32).to_le_bytes());
            out.extend_from_slice(&0u32.to_le_bytes()); // sh_addr
            out.extend_from_slice(&(offset as u32).to_le_bytes());
            out.extend_from_slice(&(size as u32).to_le_bytes());
            out.extend_from_slice(&s.link.to_le_bytes());
            out.extend_from_slice(&s.info.to_le_bytes());
            out.extend_from_slice(&(s.addralign as u32).to_le_bytes());
            out.extend_from_slice(&(s.entsize as u32).to_le_bytes());
        }
        ElfClass::Elf64 => {
            out.extend_from_slice(&name_off.to_le_bytes());
            out.extend_from_slice(&s.sh_type.to_le_bytes());
            out.extend_from_slice(&s.sh_flags.to_le_bytes());
            out.extend_from_slice(&0u64.to_le_bytes()); // sh_addr
            out.extend_from_slice(&offset.to_le_bytes());
            out.extend_from_slice(&size.to_le_bytes());
            out.extend_from_slice(&s.link.to_le_bytes());
            out.extend_from_slice(&s.info.to_le_bytes());
            out.extend_from_slice(&s.addralign.to_le_bytes());
            out.extend_from_slice(&s.entsize.to_le_bytes());
        }
    }
}

fn write_shdr_strtab(out: &mut Vec<u8>, class: ElfClass, name_off: u32, offset: u64, size: u64) {
    let spec = SectionSpec::new("", SHT_STRTAB);
    write_shdr(out, class, name_off, &spec, offset, size);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::{ET_REL, SHF_ALLOC, SHF_EXECINSTR, SHT_PROGBITS};

    #[test]
    fn shoff_is_eight_byte_aligned_and_sections_match_declared_offsets() {
        let writer = ElfWriter {
            class: ElfClass::Elf64,
            e_type: ET_REL,
            e_machine: 0xe0,
            e_flags: 0,
            e_entry: 0,
        };
        let text = SectionSpec::new(".text", SHT_PROGBITS)
            .with_flags(SHF_ALLOC | SHF_EXECINSTR)
            .with_align(4)
            .with_content(vec![0xAA; 7]);
        let built = writer.build(&[text], &[]).unwrap();
        assert_eq!(built.bytes.len() % 1, 0);
        let shoff = u64::from_le_bytes(built.bytes[40..48].try_into().unwrap());
        assert_eq!(shoff % 8, 0);
        let placement = built.placements[0];
        assert_eq!(placement.size, 7);
        assert_eq!(
            &built.bytes[placement.offset as usize..placement.offset as usize + 7],
            &[0xAAu8; 7]
        );
    }

    #[test]
    fn thirty_two_bit_header_is_52_bytes_and_uses_narrow_fields() {
        let writer = ElfWriter {
            class: ElfClass::Elf32,
            e_type: ET_REL,
            e_machine: 0x3f,
            e_flags: 0,
            e_entry: 0,
        };
        let built = writer.build(&[], &[]).unwrap();
        assert!(built.bytes.len() >= 52);
        assert_eq!(built.bytes[4], 1); // EI_CLASS = ELFCLASS32
    }

    #[test]
    fn program_header_spans_its_covered_sections() {
        let writer = ElfWriter {
            class: ElfClass::Elf64,
            e_type: ET_REL,
            e_machine: 0xe0,
            e_flags: 0,
            e_entry: 0,
        };
        let a = SectionSpec::new(".a", SHT_PROGBITS).with_content(vec![1, 2, 3, 4]);
        let b = SectionSpec::new(".b", SHT_PROGBITS).with_content(vec![5, 6]);
        let programs = vec![ProgramHeaderSpec {
            p_type: crate::header::PT_LOAD,
            p_flags: 5,
            p_vaddr: 0,
            p_align: 0x1000,
            covers: vec![0, 1],
        }];
        let built = writer.build(&[a, b], &programs).unwrap();
        let phoff = 64usize;
        let p_filesz = u64::from_le_bytes(built.bytes[phoff + 32..phoff + 40].try_into().unwrap());
        assert!(p_filesz >= 6);
    }

    #[test]
    fn out_of_range_section_index_is_rejected() {
        let writer = ElfWriter {
            class: ElfClass::Elf64,
            e_type: ET_REL,
            e_machine: 0,
            e_flags: 0,
            e_entry: 0,
        };
        let programs = vec![ProgramHeaderSpec {
            p_type: crate::header::PT_LOAD,
            p_flags: 5,
            p_vaddr: 0,
            p_align: 0x1000,
            covers: vec![3],
        }];
        assert!(matches!(
            writer.build(&[], &programs),
            Err(ElfError::BadSectionIndex(3))
        ));
    }
}
