//! Register allocation (`spec.md` §4 component F): turns the regvars a
//! section's code referred to into concrete SGPR/VGPR numbers and patches
//! them back into the already-encoded instruction bytes.
//!
//! Pipeline, one invocation per code section (§4.F stages 1-6):
//!  1. [`codeflow`] - basic blocks from the section's recorded code-flow
//!     entries.
//!  2. [`ssa`] - per-block SSA bookkeeping for every regvar touched.
//!  3. [`ssa`] - inter-block reconciliation (recorded but not acted on: no
//!     code motion is performed, only used to size the interference graph
//!     correctly across block boundaries).
//!  4. [`interference`] - interference graph plus `equal_to`/`linear`
//!     dependency edges.
//!  5. [`color`] - greedy colouring against the SGPR/VGPR palettes.
//!  6. [`Allocator::emit`] - patch each RVU's field tag into the section's
//!     byte buffer.
//!
//! Optimisation of the resulting assignment (coalescing, spilling) is out
//! of scope; see `spec.md` §4.F Non-goals.

mod codeflow;
mod color;
mod decl;
mod interference;
mod ssa;

pub use codeflow::{BasicBlock, CodeFlowGraph};
pub use color::{color, ColorError, Coloring, SGPR_COUNT, VGPR_COUNT};
pub use decl::{RegVarDecl, RegVarTable};
pub use interference::{InterferenceGraph, LinearDep};
pub use ssa::{build_ssa, Replacement, SsaInfo, SsaResult};

use asm_encoder::Rvu;
use asm_symtab::{RegVarId, Section};

/// Declared `equal_to`/`linear` dependencies, gathered by the dispatcher
/// from `.regvar a = b` and adjacent-operand instructions respectively.
#[derive(Debug, Default, Clone)]
pub struct RegVarDeps {
    pub equal_to: Vec<(RegVarId, RegVarId)>,
    pub linear: Vec<LinearDep>,
}

pub struct Allocator;

impl Allocator {
    /// Run the full stage 1-5 pipeline for one section and return the
    /// resulting colouring, without touching the section's bytes yet.
    pub fn allocate(
        section: &Section,
        rvu: &[Rvu],
        decls: &RegVarTable,
        deps: &RegVarDeps,
    ) -> Result<Coloring, ColorError> {
        let graph = CodeFlowGraph::build(section.content.len() as u64, &section.code_flow);
        let ssa = build_ssa(&graph, rvu);
        tracing::debug!(
            target: "asm::regalloc",
            blocks = graph.blocks.len(),
            replacements = ssa.replacements.len(),
            "built ssa info for section {}",
            section.name
        );
        let interference =
            InterferenceGraph::build(&ssa.per_block, &deps.equal_to, &deps.linear);
        color(&interference, decls)
    }

    /// Stage 6: patch every RVU's field tag with the chosen concrete
    /// register number, in place, into `section`'s content buffer.
    pub fn emit(section: &mut Section, rvu: &[Rvu], coloring: &Coloring) {
        for r in rvu {
            let Some(base) = coloring.register_of(r.var) else {
                tracing::warn!(
                    target: "asm::regalloc",
                    var = r.var.0,
                    "no colour assigned for regvar referenced in {}",
                    section.name
                );
                continue;
            };
            let reg = base + r.start;
            patch_field(&mut section.content, r.instr_offset, &r.field, reg as u32);
        }
    }
}

fn patch_field(
    content: &mut [u8],
    instr_offset: u64,
    field: &asm_encoder::FieldTag,
    value: u32,
) {
    let word_start = (instr_offset + field.word_byte_offset as u64) as usize;
    if word_start + 4 > content.len() {
        return;
    }
    let mut word = u32::from_le_bytes(content[word_start..word_start + 4].try_into().unwrap());
    let mask = ((1u64 << field.bit_width) - 1) as u32;
    word &= !(mask << field.bit_offset);
    word |= (value & mask) << field.bit_offset;
    content[word_start..word_start + 4].copy_from_slice(&word.to_le_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;
    use asm_encoder::FieldTag;
    use asm_symtab::{RegClass, SectionFlags, SectionId, SectionType};

    fn make_rvu(var: u32, offset: u64, bit_offset: u8, bit_width: u8, write: bool) -> Rvu {
        Rvu {
            var: RegVarId(var),
            start: 0,
            count: 1,
            read: !write,
            write,
            field: FieldTag {
                word_byte_offset: 0,
                bit_offset,
                bit_width,
            },
            instr_offset: offset,
            pos: None,
        }
    }

    #[test]
    fn two_non_conflicting_regvars_in_one_block_get_distinct_registers() {
        let mut section = Section::new(SectionId(0), ".text", SectionType::Text, SectionFlags::CODE);
        section.append_bytes(&[0u8; 8]);

        let rvus = vec![
            make_rvu(1, 0, 0, 8, true),
            make_rvu(2, 4, 0, 8, true),
        ];
        let mut decls = RegVarTable::new();
        decls.declare(RegVarId(1), RegClass::Vgpr, 1);
        decls.declare(RegVarId(2), RegClass::Vgpr, 1);

        let coloring =
            Allocator::allocate(&section, &rvus, &decls, &RegVarDeps::default()).unwrap();
        assert_ne!(
            coloring.register_of(RegVarId(1)),
            coloring.register_of(RegVarId(2))
        );

        Allocator::emit(&mut section, &rvus, &coloring);
        assert_eq!(
            section.content[0] as u16,
            coloring.register_of(RegVarId(1)).unwrap()
        );
        assert_eq!(
            section.content[4] as u16,
            coloring.register_of(RegVarId(2)).unwrap()
        );
    }

    #[test]
    fn equal_to_regvars_share_one_register_end_to_end() {
        let mut section = Section::new(SectionId(0), ".text", SectionType::Text, SectionFlags::CODE);
        section.append_bytes(&[0u8; 8]);

        let rvus = vec![
            make_rvu(1, 0, 0, 8, true),
            make_rvu(2, 4, 0, 8, true),
        ];
        let mut decls = RegVarTable::new();
        decls.declare(RegVarId(1), RegClass::Sgpr, 1);
        decls.declare(RegVarId(2), RegClass::Sgpr, 1);
        let deps = RegVarDeps {
            equal_to: vec![(RegVarId(1), RegVarId(2))],
            linear: vec![],
        };

        let coloring = Allocator::allocate(&section, &rvus, &decls, &deps).unwrap();
        assert_eq!(
            coloring.register_of(RegVarId(1)),
            coloring.register_of(RegVarId(2))
        );
    }
}
