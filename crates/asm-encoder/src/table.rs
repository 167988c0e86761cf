//! Mnemonic table: `(mnemonic, arch_mask) -> (encoding_form, opcode,
//! operand_pattern)` (`spec.md` §4.E step 1).
//!
//! A representative instruction per form is tabulated; `spec.md` describes
//! this as table-driven ("the spec is the table, not a flowchart") rather
//! than exhaustive, so the core ships the forms and a working sample from
//! each rather than the full several-hundred-mnemonic GCN ISA.

use crate::arch::ArchMask;
use crate::forms::EncodingForm;
use crate::modifiers::ModMask;
use crate::operand::{OperandKind, OperandSlot};
use asm_symtab::FlowKind;

pub struct InstrDesc {
    pub mnemonic: &'static str,
    pub arch_mask: ArchMask,
    pub form: EncodingForm,
    pub opcode: u32,
    pub operands: &'static [OperandSlot],
    /// If set, this mnemonic also has a VOP3 long form selected when
    /// `_e64`/`_clamp`/`_saturate` (anything VOP2 can't express) is present.
    pub vop3_opcode: Option<u32>,
    pub flow: Option<FlowKind>,
    pub requires_mods: ModMask,
}

const fn slot(kind: OperandKind) -> OperandSlot {
    OperandSlot::new(kind)
}

const fn aligned(kind: OperandKind, align: u16) -> OperandSlot {
    OperandSlot::aligned(kind, align)
}

macro_rules! desc {
    ($mnem:literal, $arch:expr, $form:expr, $op:expr, [$($slot:expr),* $(,)?]) => {
        InstrDesc {
            mnemonic: $mnem,
            arch_mask: $arch,
            form: $form,
            opcode: $op,
            operands: &[$($slot),*],
            vop3_opcode: None,
            flow: None,
            requires_mods: ModMask::empty(),
        }
    };
}

pub static INSTR_TABLE: &[InstrDesc] = &[
    desc!("s_mov_b32", ArchMask::ALL, EncodingForm::Sop1, 3, [slot(OperandKind::Sdst), slot(OperandKind::Ssrc)]),
    desc!("s_mov_b64", ArchMask::ALL, EncodingForm::Sop1, 4, [aligned(OperandKind::Sdst, 2), aligned(OperandKind::Ssrc, 2)]),
    desc!("s_not_b32", ArchMask::ALL, EncodingForm::Sop1, 8, [slot(OperandKind::Sdst), slot(OperandKind::Ssrc)]),
    InstrDesc {
        mnemonic: "s_setpc_b64",
        arch_mask: ArchMask::ALL,
        form: EncodingForm::Sop1,
        opcode: 28,
        operands: &[aligned(OperandKind::Ssrc, 2)],
        vop3_opcode: None,
        flow: Some(FlowKind::Return),
        requires_mods: ModMask::empty(),
    },
    desc!("s_add_u32", ArchMask::ALL, EncodingForm::Sop2, 0, [slot(OperandKind::Sdst), slot(OperandKind::Ssrc), slot(OperandKind::Ssrc)]),
    desc!("s_sub_u32", ArchMask::ALL, EncodingForm::Sop2, 1, [slot(OperandKind::Sdst), slot(OperandKind::Ssrc), slot(OperandKind::Ssrc)]),
    desc!("s_and_b32", ArchMask::ALL, EncodingForm::Sop2, 14, [slot(OperandKind::Sdst), slot(OperandKind::Ssrc), slot(OperandKind::Ssrc)]),
    desc!("s_lshl_b32", ArchMask::ALL, EncodingForm::Sop2, 28, [slot(OperandKind::Sdst), slot(OperandKind::Ssrc), slot(OperandKind::Ssrc)]),
    desc!("s_movk_i32", ArchMask::ALL, EncodingForm::Sopk, 0, [slot(OperandKind::Sdst), slot(OperandKind::Imm)]),
    InstrDesc {
        mnemonic: "s_call_b64",
        arch_mask: ArchMask::GCN1_2_UP,
        form: EncodingForm::Sopk,
        opcode: 2,
        operands: &[aligned(OperandKind::Sdst, 2), slot(OperandKind::Label)],
        vop3_opcode: None,
        flow: Some(FlowKind::Call),
        requires_mods: ModMask::empty(),
    },
    desc!("s_cmpk_eq_i32", ArchMask::ALL, EncodingForm::Sopk, 3, [slot(OperandKind::Ssrc), slot(OperandKind::Imm)]),
    desc!("s_cmp_eq_i32", ArchMask::ALL, EncodingForm::Sopc, 0, [slot(OperandKind::Ssrc), slot(OperandKind::Ssrc)]),
    desc!("s_cmp_lt_i32", ArchMask::ALL, EncodingForm::Sopc, 1, [slot(OperandKind::Ssrc), slot(OperandKind::Ssrc)]),
    InstrDesc {
        mnemonic: "s_endpgm",
        arch_mask: ArchMask::ALL,
        form: EncodingForm::Sopp,
        opcode: 1,
        operands: &[],
        vop3_opcode: None,
        flow: Some(FlowKind::End),
        requires_mods: ModMask::empty(),
    },
    InstrDesc {
        mnemonic: "s_branch",
        arch_mask: ArchMask::ALL,
        form: EncodingForm::Sopp,
        opcode: 2,
        operands: &[slot(OperandKind::Label)],
        vop3_opcode: None,
        flow: Some(FlowKind::Jump),
        requires_mods: ModMask::empty(),
    },
    InstrDesc {
        mnemonic: "s_cbranch_scc0",
        arch_mask: ArchMask::ALL,
        form: EncodingForm::Sopp,
        opcode: 4,
        operands: &[slot(OperandKind::Label)],
        vop3_opcode: None,
        flow: Some(FlowKind::CondJump),
        requires_mods: ModMask::empty(),
    },
    InstrDesc {
        mnemonic: "s_cbranch_scc1",
        arch_mask: ArchMask::ALL,
        form: EncodingForm::Sopp,
        opcode: 5,
        operands: &[slot(OperandKind::Label)],
        vop3_opcode: None,
        flow: Some(FlowKind::CondJump),
        requires_mods: ModMask::empty(),
    },
    desc!("s_nop", ArchMask::ALL, EncodingForm::Sopp, 0, [slot(OperandKind::Imm)]),
    desc!(
        "s_load_dword",
        ArchMask::ALL,
        EncodingForm::Smem,
        0,
        [slot(OperandKind::Sdst), aligned(OperandKind::Ssrc, 2), slot(OperandKind::Imm)]
    ),
    desc!(
        "s_load_dwordx4",
        ArchMask::ALL,
        EncodingForm::Smem,
        2,
        [aligned(OperandKind::Sdst, 4), aligned(OperandKind::Ssrc, 2), slot(OperandKind::Imm)]
    ),
    desc!("v_mov_b32", ArchMask::ALL, EncodingForm::Vop1, 1, [slot(OperandKind::Vdst), slot(OperandKind::Vsrc)]),
    desc!("v_cvt_f32_i32", ArchMask::ALL, EncodingForm::Vop1, 6, [slot(OperandKind::Vdst), slot(OperandKind::Vsrc)]),
    desc!("v_rcp_f32", ArchMask::ALL, EncodingForm::Vop1, 42, [slot(OperandKind::Vdst), slot(OperandKind::Vsrc)]),
    InstrDesc {
        mnemonic: "v_add_f32",
        arch_mask: ArchMask::ALL,
        form: EncodingForm::Vop2,
        opcode: 3,
        operands: &[slot(OperandKind::Vdst), slot(OperandKind::Vsrc), slot(OperandKind::Vgpr)],
        vop3_opcode: Some(0x103),
        flow: None,
        requires_mods: ModMask::empty(),
    },
    desc!("v_mul_f32", ArchMask::ALL, EncodingForm::Vop2, 8, [slot(OperandKind::Vdst), slot(OperandKind::Vsrc), slot(OperandKind::Vgpr)]),
    desc!("v_mac_f32", ArchMask::ALL, EncodingForm::Vop2, 21, [slot(OperandKind::Vdst), slot(OperandKind::Vsrc), slot(OperandKind::Vgpr)]),
    desc!(
        "v_mad_f32",
        ArchMask::ALL,
        EncodingForm::Vop3,
        0x141,
        [slot(OperandKind::Vdst), slot(OperandKind::Vsrc), slot(OperandKind::Vsrc), slot(OperandKind::Vsrc)]
    ),
    desc!("v_cmp_eq_f32", ArchMask::ALL, EncodingForm::Vopc, 2, [slot(OperandKind::Vsrc), slot(OperandKind::Vgpr)]),
    desc!("v_cmp_lt_f32", ArchMask::ALL, EncodingForm::Vopc, 1, [slot(OperandKind::Vsrc), slot(OperandKind::Vgpr)]),
    desc!("v_interp_p1_f32", ArchMask::ALL, EncodingForm::Vintrp, 0, [slot(OperandKind::Vdst), slot(OperandKind::Vgpr), slot(OperandKind::Imm), slot(OperandKind::Imm)]),
    desc!("v_interp_p2_f32", ArchMask::ALL, EncodingForm::Vintrp, 1, [slot(OperandKind::Vdst), slot(OperandKind::Vgpr), slot(OperandKind::Imm), slot(OperandKind::Imm)]),
    desc!("ds_write_b32", ArchMask::ALL, EncodingForm::Ds, 13, [slot(OperandKind::Vgpr), slot(OperandKind::Vsrc)]),
    desc!("ds_read_b32", ArchMask::ALL, EncodingForm::Ds, 54, [slot(OperandKind::Vdst), slot(OperandKind::Vgpr)]),
    desc!("flat_load_dword", ArchMask::ALL, EncodingForm::Flat, 16, [slot(OperandKind::Vdst), aligned(OperandKind::Vgpr, 2)]),
    desc!("flat_store_dword", ArchMask::ALL, EncodingForm::Flat, 24, [aligned(OperandKind::Vgpr, 2), slot(OperandKind::Vsrc)]),
    desc!(
        "buffer_load_dword",
        ArchMask::ALL,
        EncodingForm::Mubuf,
        20,
        [slot(OperandKind::Vdst), slot(OperandKind::Vgpr), aligned(OperandKind::Sgpr, 4), slot(OperandKind::Ssrc)]
    ),
    desc!(
        "buffer_store_dword",
        ArchMask::ALL,
        EncodingForm::Mubuf,
        28,
        [slot(OperandKind::Vgpr), slot(OperandKind::Vsrc), aligned(OperandKind::Sgpr, 4), slot(OperandKind::Ssrc)]
    ),
    desc!(
        "tbuffer_load_format_x",
        ArchMask::ALL,
        EncodingForm::Mtbuf,
        0,
        [slot(OperandKind::Vdst), slot(OperandKind::Vgpr), aligned(OperandKind::Sgpr, 4), slot(OperandKind::Ssrc)]
    ),
    desc!(
        "image_sample",
        ArchMask::ALL,
        EncodingForm::Mimg,
        32,
        [aligned(OperandKind::Vdst, 4), aligned(OperandKind::Vgpr, 4), aligned(OperandKind::Sgpr, 8), aligned(OperandKind::Sgpr, 4)]
    ),
    desc!(
        "exp",
        ArchMask::ALL,
        EncodingForm::Exp,
        0,
        [slot(OperandKind::Imm), slot(OperandKind::Imm), slot(OperandKind::Vsrc), slot(OperandKind::Vsrc), slot(OperandKind::Vsrc), slot(OperandKind::Vsrc)]
    ),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s_mov_b32_is_gated_to_every_generation() {
        let desc = INSTR_TABLE.iter().find(|d| d.mnemonic == "s_mov_b32").unwrap();
        assert_eq!(desc.arch_mask, ArchMask::ALL);
        assert_eq!(desc.opcode, 3);
    }

    #[test]
    fn s_call_b64_is_restricted_to_gcn_1_2_and_up() {
        let desc = INSTR_TABLE.iter().find(|d| d.mnemonic == "s_call_b64").unwrap();
        assert_eq!(desc.arch_mask, ArchMask::GCN1_2_UP);
        assert_eq!(desc.flow, Some(FlowKind::Call));
    }
}
