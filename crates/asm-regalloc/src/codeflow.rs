//! Basic-block construction from code-flow directives (`spec.md` §4.F
//! stage 1 "Code-structure").
//!
//! Block boundaries are: targets of any flow entry, the instruction after
//! any unconditional branch/return, and the start of the section. Every
//! branch/call mnemonic this core's table recognises (`s_branch`,
//! `s_cbranch_scc0/1`, `s_call_b64`, `s_setpc_b64`, `s_endpgm`) encodes to a
//! single 32-bit word, so "the instruction after" a flow entry is always
//! `offset + 4`.

use std::collections::BTreeSet;

use asm_symtab::{CodeFlowEntry, FlowKind};

const FLOW_INSTR_LEN: u64 = 4;

#[derive(Debug, Clone, Default)]
pub struct BasicBlock {
    pub start: u64,
    pub end: u64,
    pub successors: Vec<usize>,
    pub ends_in_call: bool,
    pub ends_in_return: bool,
    /// Ends in an unconditional terminator (jump/return/end): no
    /// fallthrough successor.
    pub have_end: bool,
}

#[derive(Debug, Clone, Default)]
pub struct CodeFlowGraph {
    pub blocks: Vec<BasicBlock>,
}

impl CodeFlowGraph {
    pub fn build(code_len: u64, flow: &[CodeFlowEntry]) -> Self {
        let mut boundaries: BTreeSet<u64> = BTreeSet::new();
        boundaries.insert(0);
        boundaries.insert(code_len);
        for e in flow {
            boundaries.insert(e.offset);
            let after = e.offset + FLOW_INSTR_LEN;
            if after <= code_len {
                boundaries.insert(after);
            }
            if let Some(t) = e.target_offset {
                if t <= code_len {
                    boundaries.insert(t);
                }
            }
        }
        let edges: Vec<u64> = boundaries.into_iter().collect();
        let mut blocks: Vec<BasicBlock> = Vec::new();
        for w in edges.windows(2) {
            let (start, end) = (w[0], w[1]);
            if start >= end {
                continue;
            }
            blocks.push(BasicBlock {
                start,
                end,
                successors: Vec::new(),
                ends_in_call: false,
                ends_in_return: false,
                have_end: false,
            });
        }

        let block_at = |offset: u64, blocks: &[BasicBlock]| -> Option<usize> {
            blocks
                .iter()
                .position(|b| b.start <= offset && offset < b.end)
        };

        for i in 0..blocks.len() {
            let (start, end) = (blocks[i].start, blocks[i].end);
            let entry = flow.iter().find(|e| e.offset >= start && e.offset < end);
            match entry {
                Some(e) => match e.kind {
                    FlowKind::Jump => {
                        if let Some(t) = e.target_offset.and_then(|t| block_at(t, &blocks)) {
                            blocks[i].successors.push(t);
                        }
                        blocks[i].have_end = true;
                    }
                    FlowKind::CondJump => {
                        if let Some(t) = e.target_offset.and_then(|t| block_at(t, &blocks)) {
                            blocks[i].successors.push(t);
                        }
                        if i + 1 < blocks.len() {
                            blocks[i].successors.push(i + 1);
                        }
                    }
                    FlowKind::Call => {
                        blocks[i].ends_in_call = true;
                        if i + 1 < blocks.len() {
                            blocks[i].successors.push(i + 1);
                        }
                    }
                    FlowKind::Return => {
                        blocks[i].ends_in_return = true;
                        blocks[i].have_end = true;
                    }
                    FlowKind::End => {
                        blocks[i].have_end = true;
                    }
                },
                None => {
                    if i + 1 < blocks.len() {
                        blocks[i].successors.push(i + 1);
                    }
                }
            }
        }

        Self { blocks }
    }

    pub fn block_containing(&self, offset: u64) -> Option<usize> {
        self.blocks
            .iter()
            .position(|b| b.start <= offset && offset < b.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn straight_line_code_is_one_block() {
        let g = CodeFlowGraph::build(16, &[]);
        assert_eq!(g.blocks.len(), 1);
        assert_eq!(g.blocks[0].start, 0);
        assert_eq!(g.blocks[0].end, 16);
    }

    #[test]
    fn unconditional_branch_splits_into_two_blocks_no_fallthrough() {
        let flow = vec![CodeFlowEntry {
            offset: 0,
            kind: FlowKind::Jump,
            target_offset: Some(8),
        }];
        let g = CodeFlowGraph::build(12, &flow);
        assert_eq!(g.blocks.len(), 2);
        assert_eq!(g.blocks[0].successors, vec![1]);
        assert!(g.blocks[0].have_end);
    }

    #[test]
    fn cond_branch_has_two_successors() {
        let flow = vec![CodeFlowEntry {
            offset: 4,
            kind: FlowKind::CondJump,
            target_offset: Some(12),
        }];
        let g = CodeFlowGraph::build(16, &flow);
        // blocks: [0,4) [4,8) [8,12) [12,16)
        assert_eq!(g.blocks.len(), 4);
        let cond_block = g.block_containing(4).unwrap();
        assert_eq!(g.blocks[cond_block].successors.len(), 2);
    }

    #[test]
    fn return_ends_the_block_with_no_successors() {
        let flow = vec![CodeFlowEntry {
            offset: 4,
            kind: FlowKind::Return,
            target_offset: None,
        }];
        let g = CodeFlowGraph::build(8, &flow);
        let last = g.blocks.last().unwrap();
        assert!(last.ends_in_return);
        assert!(last.successors.is_empty());
    }
}
