//! Program header declarations (`spec.md` §4.I.4 "for host ELF the
//! program-header table"). A program header covers the file range already
//! occupied by a run of sections, so it is expressed relative to their
//! placements rather than re-stating an offset by hand.

#[derive(Debug, Clone)]
pub struct ProgramHeaderSpec {
    pub p_type: u32,
    pub p_flags: u32,
    pub p_vaddr: u64,
    pub p_align: u64,
    /// Indices (into the section list passed to the writer) this segment
    /// covers; the writer computes `p_offset`/`p_filesz`/`p_memsz` as the
    /// span from the first section's offset to the last section's end.
    pub covers: Vec<usize>,
}
