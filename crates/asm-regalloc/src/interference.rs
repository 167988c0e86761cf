//! Interference graph construction (`spec.md` §4.F stage 4).
//!
//! Conflicts are tracked at regvar granularity rather than per SSA
//! instance: GCN regvars behave like named reservations held for their
//! whole declared scope rather than true SSA virtuals that die and are
//! reborn within a block, so two regvars interfere whenever their live
//! ranges (as approximated by the blocks and intra-block positions they
//! touch) overlap. `equal_to` deps (from `.regvar a = b`) and `linear`
//! deps (consecutive-register operand pairs) both suppress interference
//! between the pair they name, in favour of a shared-register or
//! adjacent-register constraint handled at coloring time.

use std::collections::{HashMap, HashSet};

use asm_symtab::RegVarId;

use crate::ssa::SsaInfo;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LinearDep {
    pub first: RegVarId,
    pub second: RegVarId,
}

#[derive(Debug, Default)]
pub struct InterferenceGraph {
    pub vertices: Vec<RegVarId>,
    edges: HashSet<(RegVarId, RegVarId)>,
    pub equal_to: HashMap<RegVarId, RegVarId>,
    pub linear: Vec<LinearDep>,
}

fn key(a: RegVarId, b: RegVarId) -> (RegVarId, RegVarId) {
    if a.0 <= b.0 {
        (a, b)
    } else {
        (b, a)
    }
}

impl InterferenceGraph {
    pub fn interferes(&self, a: RegVarId, b: RegVarId) -> bool {
        a != b && self.edges.contains(&key(a, b))
    }

    pub fn neighbors<'a>(&'a self, v: RegVarId) -> impl Iterator<Item = RegVarId> + 'a {
        self.edges.iter().filter_map(move |&(a, b)| {
            if a == v {
                Some(b)
            } else if b == v {
                Some(a)
            } else {
                None
            }
        })
    }

    /// Resolve `a`/`b` to the representative that survives equal-to
    /// unioning: the lower-numbered id of an equal-to pair stands in for
    /// both when colouring.
    pub fn representative(&self, v: RegVarId) -> RegVarId {
        let mut cur = v;
        let mut guard = 0;
        while let Some(&next) = self.equal_to.get(&cur) {
            if next == cur || guard > self.equal_to.len() {
                break;
            }
            cur = next;
            guard += 1;
        }
        cur
    }

    /// Build from per-(block, regvar) SSA info: two regvars interfere if
    /// they're both live (touched) in the same block, unless the pair is
    /// declared `equal_to` or `linear`.
    pub fn build(
        per_block: &HashMap<(usize, RegVarId), SsaInfo>,
        equal_to: &[(RegVarId, RegVarId)],
        linear: &[LinearDep],
    ) -> Self {
        let mut g = InterferenceGraph::default();
        for &(a, b) in equal_to {
            let (lo, hi) = if a.0 <= b.0 { (a, b) } else { (b, a) };
            g.equal_to.insert(hi, lo);
        }
        g.linear = linear.to_vec();

        let mut vars: HashSet<RegVarId> = HashSet::new();
        let mut by_block: HashMap<usize, Vec<RegVarId>> = HashMap::new();
        for &(block, var) in per_block.keys() {
            vars.insert(var);
            by_block.entry(block).or_default().push(var);
        }
        g.vertices = vars.into_iter().collect();
        g.vertices.sort_by_key(|v| v.0);

        let linear_pairs: HashSet<(RegVarId, RegVarId)> =
            linear.iter().map(|d| key(d.first, d.second)).collect();

        for vs in by_block.values() {
            for i in 0..vs.len() {
                for j in (i + 1)..vs.len() {
                    let a = g.representative(vs[i]);
                    let b = g.representative(vs[j]);
                    if a == b {
                        continue;
                    }
                    if linear_pairs.contains(&key(vs[i], vs[j])) {
                        continue;
                    }
                    g.edges.insert(key(a, b));
                }
            }
        }
        g
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info() -> SsaInfo {
        SsaInfo {
            ssa_id_before: 0,
            ssa_id_first: 0,
            ssa_id_last: 1,
            ssa_id_change_count: 1,
            first_pos: 0,
            last_pos: 0,
            read_before_write: false,
        }
    }

    #[test]
    fn two_vars_live_in_same_block_interfere() {
        let mut per_block = HashMap::new();
        per_block.insert((0usize, RegVarId(1)), info());
        per_block.insert((0usize, RegVarId(2)), info());
        let g = InterferenceGraph::build(&per_block, &[], &[]);
        assert!(g.interferes(RegVarId(1), RegVarId(2)));
    }

    #[test]
    fn vars_in_different_blocks_do_not_interfere() {
        let mut per_block = HashMap::new();
        per_block.insert((0usize, RegVarId(1)), info());
        per_block.insert((1usize, RegVarId(2)), info());
        let g = InterferenceGraph::build(&per_block, &[], &[]);
        assert!(!g.interferes(RegVarId(1), RegVarId(2)));
    }

    #[test]
    fn equal_to_pair_never_interferes_and_shares_a_representative() {
        let mut per_block = HashMap::new();
        per_block.insert((0usize, RegVarId(1)), info());
        per_block.insert((0usize, RegVarId(2)), info());
        let g = InterferenceGraph::build(&per_block, &[(RegVarId(1), RegVarId(2))], &[]);
        assert!(!g.interferes(RegVarId(1), RegVarId(2)));
        assert_eq!(g.representative(RegVarId(2)), RegVarId(1));
    }

    #[test]
    fn linear_pair_suppresses_the_direct_interference_edge() {
        let mut per_block = HashMap::new();
        per_block.insert((0usize, RegVarId(1)), info());
        per_block.insert((0usize, RegVarId(2)), info());
        let dep = LinearDep {
            first: RegVarId(1),
            second: RegVarId(2),
        };
        let g = InterferenceGraph::build(&per_block, &[], std::slice::from_ref(&dep));
        assert!(!g.interferes(RegVarId(1), RegVarId(2)));
    }
}
