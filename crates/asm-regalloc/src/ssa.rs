//! SSA construction and inter-block reconciliation (`spec.md` §4.F stages
//! 2-3).

use std::collections::HashMap;

use asm_encoder::Rvu;
use asm_symtab::RegVarId;

use crate::codeflow::CodeFlowGraph;

/// Per-block, per-regvar bookkeeping (`spec.md` §3 "SSA info per basic
/// block, per regvar").
#[derive(Debug, Clone, Copy, Default)]
pub struct SsaInfo {
    pub ssa_id_before: u32,
    pub ssa_id_first: u32,
    pub ssa_id_last: u32,
    pub ssa_id_change_count: u32,
    pub first_pos: u64,
    pub last_pos: u64,
    pub read_before_write: bool,
}

/// A replacement recorded when a successor's `ssa_id_before` differs from a
/// predecessor's carried-out value (`spec.md` §4.F stage 3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Replacement {
    pub var: RegVarId,
    pub orig: u32,
    pub dest: u32,
}

#[derive(Debug, Default)]
pub struct SsaResult {
    /// `(block_index, regvar) -> SsaInfo`.
    pub per_block: HashMap<(usize, RegVarId), SsaInfo>,
    pub replacements: Vec<Replacement>,
}

/// Walk every block in program order, tracking a monotonically increasing
/// SSA id per regvar, then reconcile across CFG edges.
pub fn build_ssa(graph: &CodeFlowGraph, rvu: &[Rvu]) -> SsaResult {
    let mut running: HashMap<RegVarId, u32> = HashMap::new();
    let mut next_id: HashMap<RegVarId, u32> = HashMap::new();
    let mut per_block: HashMap<(usize, RegVarId), SsaInfo> = HashMap::new();
    // Out-value per (block, regvar): the running id at the end of the block.
    let mut out_value: HashMap<(usize, RegVarId), u32> = HashMap::new();

    for (bi, block) in graph.blocks.iter().enumerate() {
        let mut touched_this_block: Vec<RegVarId> = Vec::new();
        let entries = rvu
            .iter()
            .filter(|r| r.instr_offset >= block.start && r.instr_offset < block.end);
        for r in entries {
            let before = *running.get(&r.var).unwrap_or(&0);
            let info = per_block.entry((bi, r.var)).or_insert_with(|| {
                touched_this_block.push(r.var);
                SsaInfo {
                    ssa_id_before: before,
                    ssa_id_first: before,
                    ssa_id_last: before,
                    ssa_id_change_count: 0,
                    first_pos: r.instr_offset,
                    last_pos: r.instr_offset,
                    read_before_write: r.read && !r.write,
                }
            });
            info.last_pos = r.instr_offset;
            if r.write {
                let counter = next_id.entry(r.var).or_insert(before);
                *counter += 1;
                let new_id = *counter;
                running.insert(r.var, new_id);
                info.ssa_id_last = new_id;
                if info.ssa_id_change_count == 0 {
                    info.ssa_id_first = new_id;
                }
                info.ssa_id_change_count += 1;
            }
        }
        for var in touched_this_block {
            let id = *running.get(&var).unwrap_or(&0);
            out_value.insert((bi, var), id);
        }
    }

    let mut replacements = Vec::new();
    for (bi, block) in graph.blocks.iter().enumerate() {
        for &succ in &block.successors {
            let vars: Vec<RegVarId> = per_block
                .keys()
                .filter(|(b, _)| *b == succ)
                .map(|(_, v)| *v)
                .collect();
            for var in vars {
                let Some(pred_out) = out_value.get(&(bi, var)).copied() else {
                    continue;
                };
                let succ_before = per_block[&(succ, var)].ssa_id_before;
                if succ_before != pred_out {
                    replacements.push(Replacement {
                        var,
                        orig: succ_before,
                        dest: pred_out,
                    });
                }
            }
        }
    }

    SsaResult {
        per_block,
        replacements,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use asm_encoder::FieldTag;
    use asm_symtab::FlowKind;

    fn rvu(var: u32, offset: u64, read: bool, write: bool) -> Rvu {
        Rvu {
            var: RegVarId(var),
            start: 0,
            count: 1,
            read,
            write,
            field: FieldTag {
                word_byte_offset: 0,
                bit_offset: 0,
                bit_width: 8,
            },
            instr_offset: offset,
            pos: None,
        }
    }

    #[test]
    fn single_block_single_write_then_read_has_no_replacements() {
        let g = CodeFlowGraph::build(8, &[]);
        let entries = vec![rvu(1, 0, false, true), rvu(1, 4, true, false)];
        let r = build_ssa(&g, &entries);
        let info = r.per_block[&(0, RegVarId(1))];
        assert_eq!(info.ssa_id_change_count, 1);
        assert!(!info.read_before_write);
        assert!(r.replacements.is_empty());
    }

    #[test]
    fn read_before_any_write_in_the_block_is_flagged() {
        let g = CodeFlowGraph::build(4, &[]);
        let entries = vec![rvu(2, 0, true, false)];
        let r = build_ssa(&g, &entries);
        assert!(r.per_block[&(0, RegVarId(2))].read_before_write);
    }

    #[test]
    fn straight_line_carry_across_blocks_needs_no_replacement() {
        let flow = vec![asm_symtab::CodeFlowEntry {
            offset: 4,
            kind: FlowKind::Jump,
            target_offset: Some(12),
        }];
        let g = CodeFlowGraph::build(16, &flow);
        // Block 0: [0,4) writes var 1. Block 1 (target of the unconditional
        // jump): [12,16) reads var 1 with no intervening write anywhere.
        let entries = vec![rvu(1, 0, false, true), rvu(1, 12, true, false)];
        let r = build_ssa(&g, &entries);
        assert!(r.replacements.is_empty());
    }
}
