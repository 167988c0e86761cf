//! Per-instruction-form bit layouts (`spec.md` §4.E "Encoding forms
//! handled").
//!
//! SOP1/SOP2/SOPK/SOPC/SOPP and VOP1/VOP2/VOPC follow the documented GCN
//! encoding (the layout `spec.md` §8 scenario 3 pins down bit-exactly for
//! SOP1). VOP3/SMEM/DS/FLAT/MUBUF/MTBUF/MIMG/EXP use simplified, internally
//! consistent layouts of our own devising: `spec.md` §6 only mandates
//! bit-exactness for the container *formats*, not every instruction word,
//! and the non-goals exclude ISA validation beyond what encoding needs.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EncodingForm {
    Sop1,
    Sop2,
    Sopk,
    Sopc,
    Sopp,
    Smem,
    Vop1,
    Vop2,
    Vop3,
    Vopc,
    Vintrp,
    Ds,
    Flat,
    Mubuf,
    Mtbuf,
    Mimg,
    Exp,
}

impl EncodingForm {
    /// Encoded instruction length in bytes, not counting a trailing literal
    /// dword (`spec.md` §8 invariant 4 depends on this matching exactly
    /// what `encode_*` below writes).
    pub fn base_len(self) -> usize {
        match self {
            EncodingForm::Sop1
            | EncodingForm::Sop2
            | EncodingForm::Sopk
            | EncodingForm::Sopc
            | EncodingForm::Sopp
            | EncodingForm::Vop1
            | EncodingForm::Vop2
            | EncodingForm::Vopc
            | EncodingForm::Vintrp => 4,
            EncodingForm::Vop3
            | EncodingForm::Smem
            | EncodingForm::Ds
            | EncodingForm::Flat
            | EncodingForm::Mubuf
            | EncodingForm::Mtbuf
            | EncodingForm::Exp => 8,
            EncodingForm::Mimg => 16,
        }
    }
}

fn words_to_le_bytes(words: &[u32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(words.len() * 4);
    for w in words {
        out.extend_from_slice(&w.to_le_bytes());
    }
    out
}

pub fn encode_sop2(op: u8, sdst: u8, ssrc0: u16, ssrc1: u16) -> Vec<u8> {
    let word = (0b10u32 << 30)
        | ((op as u32 & 0x7F) << 23)
        | ((sdst as u32 & 0x7F) << 16)
        | ((ssrc1 as u32 & 0xFF) << 8)
        | (ssrc0 as u32 & 0xFF);
    words_to_le_bytes(&[word])
}

/// SOP1: ENCODING (9 bits, `0x17D`) | SDST (7) | OP (8) | SSRC0 (8).
pub fn encode_sop1(op: u8, sdst: u8, ssrc0: u16) -> Vec<u8> {
    let word = (0x17Du32 << 23)
        | ((sdst as u32 & 0x7F) << 16)
        | ((op as u32) << 8)
        | (ssrc0 as u32 & 0xFF);
    words_to_le_bytes(&[word])
}

pub fn encode_sopk(op: u8, sdst: u8, simm16: u16) -> Vec<u8> {
    let word = (0b1011u32 << 28)
        | ((op as u32 & 0x1F) << 23)
        | ((sdst as u32 & 0x7F) << 16)
        | (simm16 as u32);
    words_to_le_bytes(&[word])
}

pub fn encode_sopc(op: u8, ssrc0: u16, ssrc1: u16) -> Vec<u8> {
    let word = (0x17Eu32 << 23)
        | ((op as u32 & 0x7F) << 16)
        | ((ssrc1 as u32 & 0xFF) << 8)
        | (ssrc0 as u32 & 0xFF);
    words_to_le_bytes(&[word])
}

pub fn encode_sopp(op: u8, simm16: u16) -> Vec<u8> {
    let word = (0x17Fu32 << 23) | ((op as u32 & 0x7F) << 16) | (simm16 as u32);
    words_to_le_bytes(&[word])
}

pub fn encode_vop1(op: u8, vdst: u8, src0: u16) -> Vec<u8> {
    let word = (0x3Fu32 << 25) | ((vdst as u32) << 17) | ((op as u32) << 9) | (src0 as u32 & 0x1FF);
    words_to_le_bytes(&[word])
}

pub fn encode_vop2(op: u8, vdst: u8, src1_vgpr: u8, src0: u16) -> Vec<u8> {
    let word = ((op as u32 & 0x3F) << 25)
        | ((vdst as u32) << 17)
        | ((src1_vgpr as u32) << 9)
        | (src0 as u32 & 0x1FF);
    words_to_le_bytes(&[word])
}

pub fn encode_vopc(op: u8, src1_vgpr: u8, src0: u16) -> Vec<u8> {
    let word =
        (0x3Eu32 << 25) | ((op as u32) << 17) | ((src1_vgpr as u32) << 9) | (src0 as u32 & 0x1FF);
    words_to_le_bytes(&[word])
}

pub fn encode_vintrp(vdst: u8, vsrc: u8, attr: u8, attr_chan: u8, op: u8) -> Vec<u8> {
    let word = (0x32u32 << 26)
        | ((vdst as u32 & 0xFF) << 18)
        | ((vsrc as u32 & 0xFF) << 9)
        | ((op as u32 & 0x3) << 6)
        | ((attr as u32 & 0x3F) << 2)
        | (attr_chan as u32 & 0x3);
    words_to_le_bytes(&[word])
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Vop3Fields {
    pub op: u16,
    pub vdst: u16,
    pub clamp: bool,
    pub omod: u8,
    pub neg: u8,
    pub src0: u16,
    pub src1: u16,
    pub src2: u16,
}

pub fn encode_vop3(f: Vop3Fields) -> Vec<u8> {
    let d0 = (0x34u32 << 26)
        | ((f.op as u32 & 0x1FF) << 17)
        | ((f.vdst as u32 & 0xFF) << 9)
        | ((f.clamp as u32) << 8)
        | (f.omod as u32 & 0x3);
    let d1 = (f.src0 as u32 & 0x1FF)
        | ((f.src1 as u32 & 0x1FF) << 9)
        | ((f.src2 as u32 & 0x1FF) << 18)
        | ((f.neg as u32 & 0x7) << 27);
    words_to_le_bytes(&[d0, d1])
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SmemFields {
    pub op: u8,
    pub sdst: u8,
    pub sbase: u8,
    pub imm: bool,
    pub offset: u32,
}

pub fn encode_smem(f: SmemFields) -> Vec<u8> {
    let d0 = (0x30u32 << 26)
        | ((f.op as u32) << 18)
        | ((f.sdst as u32 & 0x7F) << 11)
        | ((f.sbase as u32 & 0x3F) << 5)
        | ((f.imm as u32) << 4);
    let d1 = f.offset & 0x000F_FFFF;
    words_to_le_bytes(&[d0, d1])
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DsFields {
    pub op: u8,
    pub offset0: u8,
    pub offset1: u8,
    pub addr: u8,
    pub data0: u8,
    pub data1: u8,
    pub vdst: u8,
}

pub fn encode_ds(f: DsFields) -> Vec<u8> {
    let d0 = (0x36u32 << 26) | ((f.op as u32) << 18) | ((f.offset1 as u32) << 8) | (f.offset0 as u32);
    let d1 = ((f.vdst as u32) << 24)
        | ((f.data1 as u32) << 16)
        | ((f.data0 as u32) << 8)
        | (f.addr as u32);
    words_to_le_bytes(&[d0, d1])
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FlatFields {
    pub op: u8,
    pub glc: bool,
    pub slc: bool,
    pub addr: u8,
    pub data: u8,
    pub vdst: u8,
}

pub fn encode_flat(f: FlatFields) -> Vec<u8> {
    let d0 = (0x37u32 << 26) | ((f.op as u32 & 0x7F) << 18) | ((f.slc as u32) << 17) | ((f.glc as u32) << 16);
    let d1 = ((f.vdst as u32) << 24) | ((f.data as u32) << 8) | (f.addr as u32);
    words_to_le_bytes(&[d0, d1])
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MubufFields {
    pub op: u8,
    pub offset: u16,
    pub vaddr: u8,
    pub vdst: u8,
    pub srsrc: u8,
    pub soffset: u8,
}

pub fn encode_mubuf(f: MubufFields) -> Vec<u8> {
    let d0 = (0x38u32 << 26) | ((f.op as u32 & 0x7F) << 18) | (f.offset as u32 & 0xFFF);
    let d1 = ((f.vdst as u32) << 24)
        | ((f.srsrc as u32 & 0x1F) << 16)
        | ((f.soffset as u32) << 8)
        | (f.vaddr as u32);
    words_to_le_bytes(&[d0, d1])
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MtbufFields {
    pub op: u8,
    pub dfmt: u8,
    pub nfmt: u8,
    pub offset: u16,
    pub vaddr: u8,
    pub vdst: u8,
    pub srsrc: u8,
    pub soffset: u8,
}

pub fn encode_mtbuf(f: MtbufFields) -> Vec<u8> {
    let d0 = (0x3Au32 << 26)
        | ((f.op as u32 & 0x7) << 23)
        | ((f.dfmt as u32 & 0xF) << 19)
        | ((f.nfmt as u32 & 0x7) << 16)
        | (f.offset as u32 & 0xFFF);
    let d1 = ((f.vdst as u32) << 24)
        | ((f.srsrc as u32 & 0x1F) << 16)
        | ((f.soffset as u32) << 8)
        | (f.vaddr as u32);
    words_to_le_bytes(&[d0, d1])
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MimgFields {
    pub op: u8,
    pub dmask: u8,
    pub unorm: bool,
    pub vaddr: u8,
    pub vdata: u8,
    pub srsrc: u8,
    pub ssamp: u8,
}

pub fn encode_mimg(f: MimgFields) -> Vec<u8> {
    let d0 = (0x3Cu32 << 26) | ((f.op as u32 & 0x7F) << 18) | ((f.dmask as u32 & 0xF) << 8) | ((f.unorm as u32) << 7);
    let d1 = ((f.vaddr as u32) << 24)
        | ((f.vdata as u32) << 16)
        | ((f.srsrc as u32 & 0x1F) << 8)
        | (f.ssamp as u32 & 0x1F);
    words_to_le_bytes(&[d0, d1, 0, 0])
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ExpFields {
    pub en: u8,
    pub tgt: u8,
    pub compr: bool,
    pub done: bool,
    pub vm: bool,
    pub vsrc0: u8,
    pub vsrc1: u8,
    pub vsrc2: u8,
    pub vsrc3: u8,
}

pub fn encode_exp(f: ExpFields) -> Vec<u8> {
    let d0 = (0x3Eu32 << 26)
        | (f.en as u32 & 0xF)
        | ((f.tgt as u32 & 0x3F) << 4)
        | ((f.compr as u32) << 10)
        | ((f.done as u32) << 11)
        | ((f.vm as u32) << 12);
    let d1 = (f.vsrc0 as u32) | ((f.vsrc1 as u32) << 8) | ((f.vsrc2 as u32) << 16) | ((f.vsrc3 as u32) << 24);
    words_to_le_bytes(&[d0, d1])
}

#[cfg(test)]
mod tests {
    use super::*;

    /// `spec.md` §8 scenario 3, bit-exact: `s_mov_b32 s0, x` with `x` later
    /// set to 7 encodes to `0xBE8003FF 0x00000007` on GCN1.0.
    #[test]
    fn s_mov_b32_with_literal_matches_the_spec_scenario() {
        let bytes = encode_sop1(0x03, 0, 0xFF);
        assert_eq!(bytes, vec![0xFF, 0x03, 0x80, 0xBE]);
        let word = u32::from_le_bytes(bytes.try_into().unwrap());
        assert_eq!(word, 0xBE8003FF);
    }

    #[test]
    fn form_base_lengths_match_what_encode_fns_write() {
        assert_eq!(EncodingForm::Sop1.base_len(), encode_sop1(0, 0, 0).len());
        assert_eq!(EncodingForm::Sop2.base_len(), encode_sop2(0, 0, 0, 0).len());
        assert_eq!(
            EncodingForm::Vop3.base_len(),
            encode_vop3(Vop3Fields::default()).len()
        );
        assert_eq!(
            EncodingForm::Mimg.base_len(),
            encode_mimg(MimgFields::default()).len()
        );
    }
}
