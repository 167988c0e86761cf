//! Inline-constant folding (`spec.md` §4.E step 4).
//!
//! GCN source operand fields reserve a range of codes for values that can be
//! encoded directly in the instruction without occupying the trailing
//! 32-bit literal dword. This module recognises that set; everything else
//! that isn't a register falls through to the one-literal-slot path.

use crate::arch::{ArchMask, Gpu};

/// 1/(2*pi), the one transcendental inline constant GCN >= 1.1 recognises.
const INV_2PI: f32 = 0.159_154_94;

/// An operand source field's encoded value: either an inline code (no
/// literal dword consumed) or a literal that must follow the instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FoldedSrc {
    Inline(u16),
    Literal(u32),
}

/// Fold a signed integer immediate into an inline code if it is in
/// `{0, +-1..64}` (`spec.md` §4.E step 4), else require the literal slot.
pub fn fold_int(v: i64) -> FoldedSrc {
    if v == 0 {
        return FoldedSrc::Inline(128);
    }
    if (1..=64).contains(&v) {
        return FoldedSrc::Inline(128 + v as u16);
    }
    if (-64..=-1).contains(&v) {
        return FoldedSrc::Inline(192 + (-v) as u16);
    }
    FoldedSrc::Literal(v as u32)
}

/// Fold an IEEE-754 single-precision bit pattern, recognising
/// `+-0.5/1.0/2.0/4.0` and (GCN >= 1.1) `1/(2*pi)`.
pub fn fold_float(bits: u32, gpu: Gpu) -> FoldedSrc {
    let f = f32::from_bits(bits);
    let code = if f == 0.5 {
        Some(240)
    } else if f == -0.5 {
        Some(241)
    } else if f == 1.0 {
        Some(242)
    } else if f == -1.0 {
        Some(243)
    } else if f == 2.0 {
        Some(244)
    } else if f == -2.0 {
        Some(245)
    } else if f == 4.0 {
        Some(246)
    } else if f == -4.0 {
        Some(247)
    } else if gpu.arch_bit().intersects(ArchMask::GCN1_1_UP) && f == INV_2PI {
        Some(248)
    } else {
        None
    };
    match code {
        Some(c) => FoldedSrc::Inline(c),
        None => FoldedSrc::Literal(bits),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_and_small_positive_ints_are_inline() {
        assert_eq!(fold_int(0), FoldedSrc::Inline(128));
        assert_eq!(fold_int(1), FoldedSrc::Inline(129));
        assert_eq!(fold_int(64), FoldedSrc::Inline(192));
    }

    #[test]
    fn small_negative_ints_are_inline() {
        assert_eq!(fold_int(-1), FoldedSrc::Inline(193));
        assert_eq!(fold_int(-64), FoldedSrc::Inline(256));
    }

    #[test]
    fn out_of_range_int_needs_the_literal_slot() {
        assert_eq!(fold_int(7), FoldedSrc::Inline(135));
        assert_eq!(fold_int(65), FoldedSrc::Literal(65));
        assert_eq!(fold_int(100), FoldedSrc::Literal(100));
    }

    #[test]
    fn common_float_constants_are_inline() {
        assert_eq!(fold_float(1.0f32.to_bits(), Gpu::Gcn1_0), FoldedSrc::Inline(242));
        assert_eq!(fold_float((-2.0f32).to_bits(), Gpu::Gcn1_0), FoldedSrc::Inline(245));
    }

    #[test]
    fn inv_2pi_requires_gcn_1_1_or_newer() {
        let bits = INV_2PI.to_bits();
        assert_eq!(fold_float(bits, Gpu::Gcn1_0), FoldedSrc::Literal(bits));
        assert_eq!(fold_float(bits, Gpu::Gcn1_1), FoldedSrc::Inline(248));
    }
}
