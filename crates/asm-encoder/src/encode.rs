//! The encoding pipeline itself: mnemonic lookup, modifier and operand
//! validation, literal folding, form selection and byte emission
//! (`spec.md` §4.E, steps 1-7).

use asm_diag::{DiagCode, DiagSink, Diagnostic, SourcePos};
use asm_symtab::{CodeFlowEntry, RegClass, RegVarId, Section, SectionId, Value};

use crate::arch::Gpu;
use crate::forms::{
    encode_ds, encode_exp, encode_flat, encode_mimg, encode_mtbuf, encode_mubuf, encode_smem,
    encode_sop1, encode_sop2, encode_sopc, encode_sopk, encode_sopp, encode_vintrp, encode_vop1,
    encode_vop2, encode_vop3, encode_vopc, DsFields, EncodingForm, ExpFields, FlatFields,
    MimgFields, MtbufFields, MubufFields, SmemFields, Vop3Fields,
};
use crate::literal::{fold_float, fold_int, FoldedSrc};
use crate::modifiers::{split_mnemonic_suffixes, ModMask};
use crate::operand::{range_satisfies_alignment, OperandKind, OperandSlot, RegVarLookup};
use crate::rvu::{FieldTag, Rvu, RvuStream};
use crate::table::{InstrDesc, INSTR_TABLE};

/// A single operand, resolved to the bits it contributes to the instruction
/// word (or the regvar it defers those bits to, for the allocator to patch).
struct Resolved {
    field: u16,
    regvar: Option<(RegVarId, u16, u16)>,
    label_target: Option<u64>,
}

fn emit_diag(diag: &dyn DiagSink, pos: &Option<SourcePos>, code: DiagCode, msg: impl Into<String>) {
    let mut d = Diagnostic::error(code, msg);
    if let Some(p) = pos {
        d = d.at(p.clone());
    }
    diag.emit(d);
}

/// Drives the lookup -> validate -> fold -> emit pipeline for one
/// instruction line. Carries no mutable state beyond the selected target, so
/// one instance is shared across a whole assembly run.
pub struct Encoder {
    pub gpu: Gpu,
}

impl Encoder {
    pub fn new(gpu: Gpu) -> Self {
        Self { gpu }
    }

    /// Encode one instruction, appending its bytes (and a trailing literal
    /// dword, if one was folded) to `section`. Returns `true` on success; on
    /// failure a diagnostic has already been emitted and nothing was written.
    pub fn encode(
        &self,
        raw_mnemonic: &str,
        operands: &[Value],
        regvars: &dyn RegVarLookup,
        section: &mut Section,
        rvu: &mut RvuStream,
        diag: &dyn DiagSink,
        pos: Option<SourcePos>,
    ) -> bool {
        let (base, mods) = split_mnemonic_suffixes(raw_mnemonic);

        let candidates: Vec<&InstrDesc> = INSTR_TABLE
            .iter()
            .filter(|d| d.mnemonic.eq_ignore_ascii_case(&base))
            .collect();
        if candidates.is_empty() {
            emit_diag(diag, &pos, DiagCode::UnknownMnemonic, format!("unknown mnemonic `{base}`"));
            return false;
        }

        let gated: Vec<&InstrDesc> = candidates
            .iter()
            .copied()
            .filter(|d| d.arch_mask.contains(self.gpu.arch_bit()))
            .collect();
        let Some(desc) = gated.first().copied() else {
            emit_diag(
                diag,
                &pos,
                DiagCode::UnknownMnemonic,
                format!("`{base}` is not available on the selected target architecture"),
            );
            return false;
        };
        if gated.len() > 1 {
            // The table maps one name to one arch_mask; more than one
            // equally-specific match means the table itself is broken.
            emit_diag(
                diag,
                &pos,
                DiagCode::Internal,
                format!("mnemonic table has more than one match for `{base}` on this target"),
            );
            return false;
        }

        if operands.len() != desc.operands.len() {
            emit_diag(
                diag,
                &pos,
                DiagCode::BadOperand,
                format!("`{base}` takes {} operand(s), {} given", desc.operands.len(), operands.len()),
            );
            return false;
        }

        let allowed = allowed_mods(desc);
        if !mods.difference(allowed).is_empty() {
            emit_diag(diag, &pos, DiagCode::BadOperand, format!("`{base}` does not accept that modifier"));
            return false;
        }
        if !mods.contains(desc.requires_mods) {
            emit_diag(diag, &pos, DiagCode::BadOperand, format!("`{base}` requires a modifier that was not given"));
            return false;
        }

        let cur_section = section.id;
        let mut literal: Option<u32> = None;
        let mut resolved = Vec::with_capacity(operands.len());
        for (slot, value) in desc.operands.iter().zip(operands.iter()) {
            match self.resolve_operand(&base, *slot, value, regvars, cur_section, &mut literal, diag, &pos) {
                Some(r) => resolved.push(r),
                None => return false,
            }
        }

        // Step 5: pick the 32- or 64-bit encoding. VOP2 mnemonics with a
        // registered VOP3 long form promote when a modifier VOP2 can't
        // express (`_e64`, `_clamp`) is present; everything else uses its
        // one and only table form.
        let wants_vop3 = mods.intersects(ModMask::E64 | ModMask::CLAMP);
        let (form, opcode) = match (wants_vop3, desc.vop3_opcode) {
            (true, Some(op)) => (EncodingForm::Vop3, op),
            _ => (desc.form, desc.opcode),
        };

        let instr_offset = section.current_out_pos();
        let bytes = assemble_bytes(form, opcode, desc, &resolved, instr_offset, mods);
        section.append_bytes(&bytes);
        if let Some(lit) = literal {
            section.append_bytes(&lit.to_le_bytes());
        }

        for (idx, (slot, r)) in desc.operands.iter().zip(resolved.iter()).enumerate() {
            let Some((var, start, count)) = r.regvar else { continue };
            let rank = rank_of(desc.operands, slot.kind, idx);
            if let Some(field) = field_tag_for(form, slot.kind, rank) {
                let write = matches!(slot.kind, OperandKind::Sdst | OperandKind::Vdst);
                rvu.push(Rvu {
                    var,
                    start,
                    count,
                    read: !write,
                    write,
                    field,
                    instr_offset,
                    pos: pos.clone(),
                });
            }
        }

        if let Some(kind) = desc.flow {
            let target_offset = resolved.iter().find_map(|r| r.label_target);
            section.code_flow.push(CodeFlowEntry {
                offset: instr_offset,
                kind,
                target_offset,
            });
        }

        true
    }

    fn resolve_operand(
        &self,
        base_mnemonic: &str,
        slot: OperandSlot,
        value: &Value,
        regvars: &dyn RegVarLookup,
        cur_section: SectionId,
        literal: &mut Option<u32>,
        diag: &dyn DiagSink,
        pos: &Option<SourcePos>,
    ) -> Option<Resolved> {
        use OperandKind::*;
        match slot.kind {
            Sgpr | Vgpr | Sdst | Vdst => {
                let want = slot.kind.reg_class().expect("register slot kinds carry a reg_class");
                match value {
                    Value::Reg(r) => {
                        if r.class != want {
                            emit_diag(
                                diag,
                                pos,
                                DiagCode::BadOperand,
                                format!("`{base_mnemonic}` expects a {want:?} register here"),
                            );
                            return None;
                        }
                        if !range_satisfies_alignment(r.start, r.count, slot.align) {
                            emit_diag(
                                diag,
                                pos,
                                DiagCode::BadOperand,
                                format!("register range does not satisfy the alignment `{base_mnemonic}` requires"),
                            );
                            return None;
                        }
                        Some(Resolved { field: r.start, regvar: None, label_target: None })
                    }
                    Value::RegVar { var, start, count } => {
                        let Some(class) = regvars.class_of(*var) else {
                            emit_diag(diag, pos, DiagCode::Internal, "regvar referenced before it was declared");
                            return None;
                        };
                        if class != want {
                            emit_diag(
                                diag,
                                pos,
                                DiagCode::BadOperand,
                                format!("`{base_mnemonic}` expects a {want:?} register here"),
                            );
                            return None;
                        }
                        if !range_satisfies_alignment(*start, *count, slot.align) {
                            emit_diag(
                                diag,
                                pos,
                                DiagCode::BadOperand,
                                format!("register range does not satisfy the alignment `{base_mnemonic}` requires"),
                            );
                            return None;
                        }
                        Some(Resolved { field: 0, regvar: Some((*var, *start, *count)), label_target: None })
                    }
                    _ => {
                        emit_diag(diag, pos, DiagCode::BadOperand, format!("`{base_mnemonic}` expects a register operand"));
                        None
                    }
                }
            }
            Ssrc | Vsrc => match value {
                Value::Reg(r) => {
                    if r.class == RegClass::Vgpr && slot.kind == Ssrc {
                        emit_diag(diag, pos, DiagCode::BadOperand, "a scalar source cannot reference a VGPR");
                        return None;
                    }
                    if !range_satisfies_alignment(r.start, r.count, slot.align) {
                        emit_diag(diag, pos, DiagCode::BadOperand, "register range does not satisfy the required alignment");
                        return None;
                    }
                    let base = if r.class == RegClass::Vgpr { 256 } else { 0 };
                    Some(Resolved { field: base + r.start, regvar: None, label_target: None })
                }
                Value::RegVar { var, start, count } => {
                    let Some(class) = regvars.class_of(*var) else {
                        emit_diag(diag, pos, DiagCode::Internal, "regvar referenced before it was declared");
                        return None;
                    };
                    if class == RegClass::Vgpr && slot.kind == Ssrc {
                        emit_diag(diag, pos, DiagCode::BadOperand, "a scalar source cannot reference a VGPR");
                        return None;
                    }
                    if !range_satisfies_alignment(*start, *count, slot.align) {
                        emit_diag(diag, pos, DiagCode::BadOperand, "register range does not satisfy the required alignment");
                        return None;
                    }
                    let base = if class == RegClass::Vgpr { 256 } else { 0 };
                    Some(Resolved { field: base, regvar: Some((*var, *start, *count)), label_target: None })
                }
                Value::Int(v) => self.apply_literal(base_mnemonic, *v, literal, diag, pos),
                Value::Addr { .. } => {
                    emit_diag(diag, pos, DiagCode::BadOperand, "an address cannot be used as a scalar/vector source");
                    None
                }
                Value::Unresolved => {
                    emit_diag(diag, pos, DiagCode::UndefinedSymbol, "operand value is not yet resolved");
                    None
                }
            },
            Imm => match value {
                Value::Int(v) => Some(Resolved { field: *v as u16, regvar: None, label_target: None }),
                Value::Unresolved => {
                    emit_diag(diag, pos, DiagCode::UndefinedSymbol, "operand value is not yet resolved");
                    None
                }
                _ => {
                    emit_diag(diag, pos, DiagCode::BadOperand, format!("`{base_mnemonic}` expects a plain integer operand here"));
                    None
                }
            },
            Label => match value {
                Value::Addr { section, offset } => {
                    if *section != cur_section {
                        emit_diag(diag, pos, DiagCode::BadOperand, "branch target is not in the current section");
                        return None;
                    }
                    Some(Resolved { field: 0, regvar: None, label_target: Some(*offset) })
                }
                Value::Unresolved => {
                    emit_diag(diag, pos, DiagCode::BadExpression, "branch target is not yet resolved");
                    None
                }
                _ => {
                    emit_diag(diag, pos, DiagCode::BadOperand, "expected a branch target");
                    None
                }
            },
        }
    }

    /// Fold an integer operand into an inline code or the one literal slot.
    /// Mnemonics ending in `_f32`/`_f16` fold against the float inline-constant
    /// table (`spec.md` §4.E step 4 names both, but the operand model here
    /// carries immediates as plain bit patterns rather than a typed `Float`
    /// value, so the mnemonic's own suffix is what tells folding which table
    /// to use).
    fn apply_literal(
        &self,
        base_mnemonic: &str,
        v: u64,
        literal: &mut Option<u32>,
        diag: &dyn DiagSink,
        pos: &Option<SourcePos>,
    ) -> Option<Resolved> {
        let folded = if base_mnemonic.ends_with("_f32") || base_mnemonic.ends_with("_f16") {
            fold_float(v as u32, self.gpu)
        } else {
            fold_int(v as i64)
        };
        match folded {
            FoldedSrc::Inline(code) => Some(Resolved { field: code, regvar: None, label_target: None }),
            FoldedSrc::Literal(bits) => match literal {
                None => {
                    *literal = Some(bits);
                    Some(Resolved { field: 255, regvar: None, label_target: None })
                }
                Some(existing) if *existing == bits => Some(Resolved { field: 255, regvar: None, label_target: None }),
                Some(_) => {
                    emit_diag(
                        diag,
                        pos,
                        DiagCode::TwoLiterals,
                        format!("`{base_mnemonic}` cannot encode two different literal constants in one instruction"),
                    );
                    None
                }
            },
        }
    }
}

/// How many operands of the same kind preceded this one in `desc`'s operand
/// list. Several forms (SOP2's two `Ssrc`s, VOP3's three, EXP's four `Vsrc`s)
/// repeat a kind at different bit positions, so the RVU field tag needs this
/// rather than the kind alone.
fn rank_of(operands: &[OperandSlot], kind: OperandKind, idx: usize) -> usize {
    operands[..idx].iter().filter(|s| s.kind == kind).count()
}

/// Where in the emitted word a regvar-bound operand's register index lands,
/// so the allocator can OR the chosen architectural register into place once
/// it has one. `rank` disambiguates forms that repeat a kind (SOP2's two
/// `Ssrc`s, VOP3's three, EXP's four `Vsrc`s) at different bit positions.
fn field_tag_for(form: EncodingForm, kind: OperandKind, rank: usize) -> Option<FieldTag> {
    use OperandKind::*;
    let tag = |byte, bit, width| Some(FieldTag { word_byte_offset: byte, bit_offset: bit, bit_width: width });
    match (form, kind, rank) {
        (EncodingForm::Sop1, Sdst, _) => tag(0, 16, 7),
        (EncodingForm::Sop1, Ssrc, _) => tag(0, 0, 8),
        (EncodingForm::Sopk, Sdst, _) | (EncodingForm::Sopk, Ssrc, _) => tag(0, 16, 7),
        (EncodingForm::Sop2, Sdst, _) => tag(0, 16, 7),
        (EncodingForm::Sop2, Ssrc, 0) | (EncodingForm::Sopc, Ssrc, 0) => tag(0, 0, 8),
        (EncodingForm::Sop2, Ssrc, 1) | (EncodingForm::Sopc, Ssrc, 1) => tag(0, 8, 8),
        // Vsrc field tags cover only the low 8 index bits of the 9-bit VOP
        // source field: bit 8 (the SGPR/VGPR discriminant) is already baked
        // in at encode time from the regvar's declared class and must not be
        // clobbered when the allocator patches in the chosen index.
        (EncodingForm::Vop1, Vdst, _) => tag(0, 17, 8),
        (EncodingForm::Vop1, Vsrc, _) => tag(0, 0, 8),
        (EncodingForm::Vop2, Vdst, _) => tag(0, 17, 8),
        (EncodingForm::Vop2, Vsrc, _) => tag(0, 0, 8),
        (EncodingForm::Vop2, Vgpr, _) => tag(0, 9, 8),
        (EncodingForm::Vopc, Vsrc, _) => tag(0, 0, 8),
        (EncodingForm::Vopc, Vgpr, _) => tag(0, 9, 8),
        (EncodingForm::Vintrp, Vdst, _) => tag(0, 18, 8),
        (EncodingForm::Vintrp, Vgpr, _) => tag(0, 9, 8),
        (EncodingForm::Vop3, Vdst, _) => tag(0, 9, 8),
        (EncodingForm::Vop3, Vsrc, 0) => tag(4, 0, 8),
        (EncodingForm::Vop3, Vsrc, 1) => tag(4, 9, 8),
        (EncodingForm::Vop3, Vsrc, 2) => tag(4, 18, 8),
        (EncodingForm::Smem, Sdst, _) => tag(0, 11, 7),
        (EncodingForm::Smem, Ssrc, _) => tag(0, 5, 6),
        (EncodingForm::Ds, Vdst, _) => tag(4, 24, 8),
        (EncodingForm::Ds, Vgpr, _) => tag(4, 0, 8),
        (EncodingForm::Ds, Vsrc, _) => tag(4, 8, 8),
        (EncodingForm::Flat, Vdst, _) => tag(4, 24, 8),
        (EncodingForm::Flat, Vgpr, _) => tag(4, 0, 8),
        (EncodingForm::Flat, Vsrc, _) => tag(4, 8, 8),
        (EncodingForm::Mubuf, Vdst, _) | (EncodingForm::Mtbuf, Vdst, _) => tag(4, 24, 8),
        (EncodingForm::Mubuf, Vsrc, _) | (EncodingForm::Mtbuf, Vsrc, _) => tag(4, 24, 8),
        (EncodingForm::Mubuf, Vgpr, _) | (EncodingForm::Mtbuf, Vgpr, _) => tag(4, 0, 8),
        (EncodingForm::Mubuf, Sgpr, _) | (EncodingForm::Mtbuf, Sgpr, _) => tag(4, 16, 5),
        (EncodingForm::Mubuf, Ssrc, _) | (EncodingForm::Mtbuf, Ssrc, _) => tag(4, 8, 8),
        (EncodingForm::Mimg, Vdst, _) => tag(4, 16, 8),
        (EncodingForm::Mimg, Vgpr, _) => tag(4, 24, 8),
        (EncodingForm::Mimg, Sgpr, 0) => tag(4, 8, 5),
        (EncodingForm::Mimg, Sgpr, 1) => tag(4, 0, 5),
        (EncodingForm::Exp, Vsrc, 0) => tag(4, 0, 8),
        (EncodingForm::Exp, Vsrc, 1) => tag(4, 8, 8),
        (EncodingForm::Exp, Vsrc, 2) => tag(4, 16, 8),
        (EncodingForm::Exp, Vsrc, 3) => tag(4, 24, 8),
        _ => None,
    }
}

fn allowed_mods(desc: &InstrDesc) -> ModMask {
    let mut m = desc.requires_mods | ModMask::E32;
    if desc.vop3_opcode.is_some() || desc.form == EncodingForm::Vop3 {
        m |= ModMask::E64 | ModMask::CLAMP | ModMask::SATURATE | ModMask::SDWA | ModMask::DPP;
    }
    m
}

/// Relative branch displacement in dwords, per the documented SOPP `simm16`
/// convention: signed, relative to the address immediately after this
/// instruction.
fn branch_simm16(instr_offset: u64, base_len: u64, target: Option<u64>) -> u16 {
    let target = target.unwrap_or(instr_offset + base_len);
    let delta = target as i64 - (instr_offset as i64 + base_len as i64);
    ((delta / 4) as i16) as u16
}

/// The `omod`/`neg` VOP3 fields have no surface syntax in this grammar
/// (`spec.md` §4.E step 2 names only `_e32`/`_e64`/`_sdwa`/`_dpp`/
/// `_saturate`/`_clamp`), so they stay zero; `clamp` is the one bit a
/// parsed modifier actually sets.
fn vop3_mod_bits(mods: ModMask) -> (bool, u8, u8) {
    let clamp = mods.intersects(ModMask::CLAMP | ModMask::SATURATE);
    (clamp, 0, 0)
}

fn assemble_bytes(
    form: EncodingForm,
    opcode: u32,
    desc: &InstrDesc,
    r: &[Resolved],
    instr_offset: u64,
    mods: ModMask,
) -> Vec<u8> {
    use OperandKind::*;
    match form {
        EncodingForm::Sop1 => {
            if r.len() == 2 {
                encode_sop1(opcode as u8, r[0].field as u8, r[1].field)
            } else {
                encode_sop1(opcode as u8, 0, r[0].field)
            }
        }
        EncodingForm::Sop2 => encode_sop2(opcode as u8, r[0].field as u8, r[1].field, r[2].field),
        EncodingForm::Sopk => {
            let simm16 = match desc.operands.get(1).map(|s| s.kind) {
                Some(Label) => branch_simm16(instr_offset, 4, r[1].label_target),
                _ => r[1].field,
            };
            encode_sopk(opcode as u8, r[0].field as u8, simm16)
        }
        EncodingForm::Sopc => encode_sopc(opcode as u8, r[0].field, r[1].field),
        EncodingForm::Sopp => {
            let simm16 = match desc.operands.first().map(|s| s.kind) {
                Some(Label) => branch_simm16(instr_offset, 4, r[0].label_target),
                Some(_) => r[0].field,
                None => 0,
            };
            encode_sopp(opcode as u8, simm16)
        }
        EncodingForm::Vop1 => encode_vop1(opcode as u8, r[0].field as u8, r[1].field),
        EncodingForm::Vop2 => encode_vop2(opcode as u8, r[0].field as u8, r[2].field as u8, r[1].field),
        EncodingForm::Vopc => encode_vopc(opcode as u8, r[1].field as u8, r[0].field),
        EncodingForm::Vintrp => {
            encode_vintrp(r[0].field as u8, r[1].field as u8, r[2].field as u8, r[3].field as u8, opcode as u8)
        }
        EncodingForm::Vop3 => {
            let (clamp, omod, neg) = vop3_mod_bits(mods);
            encode_vop3(Vop3Fields {
                op: opcode as u16,
                vdst: r[0].field,
                clamp,
                omod,
                neg,
                src0: r.get(1).map(|x| x.field).unwrap_or(0),
                src1: r.get(2).map(|x| x.field).unwrap_or(0),
                src2: r.get(3).map(|x| x.field).unwrap_or(0),
            })
        }
        EncodingForm::Smem => encode_smem(SmemFields {
            op: opcode as u8,
            sdst: r[0].field as u8,
            sbase: r[1].field as u8,
            imm: true,
            offset: r[2].field as u32,
        }),
        EncodingForm::Ds => {
            if desc.operands[0].kind == Vdst {
                encode_ds(DsFields { op: opcode as u8, offset0: 0, offset1: 0, addr: r[1].field as u8, data0: 0, data1: 0, vdst: r[0].field as u8 })
            } else {
                encode_ds(DsFields { op: opcode as u8, offset0: 0, offset1: 0, addr: r[0].field as u8, data0: r[1].field as u8, data1: 0, vdst: 0 })
            }
        }
        EncodingForm::Flat => {
            if desc.operands[0].kind == Vdst {
                encode_flat(FlatFields { op: opcode as u8, glc: false, slc: false, addr: r[1].field as u8, data: 0, vdst: r[0].field as u8 })
            } else {
                encode_flat(FlatFields { op: opcode as u8, glc: false, slc: false, addr: r[0].field as u8, data: r[1].field as u8, vdst: 0 })
            }
        }
        EncodingForm::Mubuf => {
            if desc.operands[0].kind == Vdst {
                encode_mubuf(MubufFields { op: opcode as u8, offset: 0, vaddr: r[1].field as u8, vdst: r[0].field as u8, srsrc: r[2].field as u8, soffset: r[3].field as u8 })
            } else {
                encode_mubuf(MubufFields { op: opcode as u8, offset: 0, vaddr: r[0].field as u8, vdst: r[1].field as u8, srsrc: r[2].field as u8, soffset: r[3].field as u8 })
            }
        }
        EncodingForm::Mtbuf => {
            if desc.operands[0].kind == Vdst {
                encode_mtbuf(MtbufFields { op: opcode as u8, dfmt: 0, nfmt: 0, offset: 0, vaddr: r[1].field as u8, vdst: r[0].field as u8, srsrc: r[2].field as u8, soffset: r[3].field as u8 })
            } else {
                encode_mtbuf(MtbufFields { op: opcode as u8, dfmt: 0, nfmt: 0, offset: 0, vaddr: r[0].field as u8, vdst: r[1].field as u8, srsrc: r[2].field as u8, soffset: r[3].field as u8 })
            }
        }
        EncodingForm::Mimg => encode_mimg(MimgFields {
            op: opcode as u8,
            dmask: 0xF,
            unorm: false,
            vaddr: r[1].field as u8,
            vdata: r[0].field as u8,
            srsrc: r[2].field as u8,
            ssamp: r[3].field as u8,
        }),
        EncodingForm::Exp => encode_exp(ExpFields {
            en: r[1].field as u8,
            tgt: r[0].field as u8,
            compr: false,
            done: false,
            vm: false,
            vsrc0: r[2].field as u8,
            vsrc1: r[3].field as u8,
            vsrc2: r[4].field as u8,
            vsrc3: r[5].field as u8,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use asm_diag::VecDiagSink;
    use asm_symtab::{RegRef, SectionFlags, SectionId as SymSectionId, SectionTable, SectionType};

    struct NoRegVars;
    impl RegVarLookup for NoRegVars {
        fn class_of(&self, _id: RegVarId) -> Option<RegClass> {
            None
        }
        fn count_of(&self, _id: RegVarId) -> Option<u16> {
            None
        }
    }

    fn text_section() -> (SectionTable, SymSectionId) {
        let mut table = SectionTable::new();
        let id = table.create(".text", None, SectionType::Text, SectionFlags::CODE | SectionFlags::ADDRESSABLE);
        (table, id)
    }

    #[test]
    fn s_mov_b32_with_forward_literal_matches_the_spec_scenario() {
        let (mut table, id) = text_section();
        let section = table.get_mut(id).unwrap();
        let enc = Encoder::new(Gpu::Gcn1_0);
        let diag = VecDiagSink::new();
        let mut rvu = RvuStream::new();
        let ok = enc.encode(
            "s_mov_b32",
            &[Value::Reg(RegRef::single(RegClass::Sgpr, 0)), Value::Int(0xFF)],
            &NoRegVars,
            section,
            &mut rvu,
            &diag,
            None,
        );
        assert!(ok, "{:?}", diag.snapshot());
        assert_eq!(section.content[..4], [0xFF, 0x03, 0x80, 0xBE]);
    }

    #[test]
    fn unknown_mnemonic_is_reported_and_nothing_is_written() {
        let (mut table, id) = text_section();
        let section = table.get_mut(id).unwrap();
        let enc = Encoder::new(Gpu::Gcn1_0);
        let diag = VecDiagSink::new();
        let mut rvu = RvuStream::new();
        let ok = enc.encode("not_a_real_op", &[], &NoRegVars, section, &mut rvu, &diag, None);
        assert!(!ok);
        assert!(diag.has_errors());
        assert!(section.content.is_empty());
    }

    #[test]
    fn two_distinct_literals_in_one_instruction_is_rejected() {
        let (mut table, id) = text_section();
        let section = table.get_mut(id).unwrap();
        let enc = Encoder::new(Gpu::Gcn1_0);
        let diag = VecDiagSink::new();
        let mut rvu = RvuStream::new();
        let ok = enc.encode(
            "s_add_u32",
            &[
                Value::Reg(RegRef::single(RegClass::Sgpr, 0)),
                Value::Int(1000),
                Value::Int(2000),
            ],
            &NoRegVars,
            section,
            &mut rvu,
            &diag,
            None,
        );
        assert!(!ok);
        assert!(diag.snapshot().iter().any(|d| d.code == DiagCode::TwoLiterals));
    }

    #[test]
    fn s_call_b64_is_rejected_on_gcn_1_0() {
        let (mut table, id) = text_section();
        let section = table.get_mut(id).unwrap();
        let enc = Encoder::new(Gpu::Gcn1_0);
        let diag = VecDiagSink::new();
        let mut rvu = RvuStream::new();
        let ok = enc.encode(
            "s_call_b64",
            &[
                Value::Reg(RegRef::single(RegClass::Sgpr, 30)),
                Value::Addr { section: id, offset: 0 },
            ],
            &NoRegVars,
            section,
            &mut rvu,
            &diag,
            None,
        );
        assert!(!ok);
    }

    #[test]
    fn branch_to_a_later_label_encodes_a_positive_dword_offset() {
        let (mut table, id) = text_section();
        let section = table.get_mut(id).unwrap();
        let enc = Encoder::new(Gpu::Gcn1_0);
        let diag = VecDiagSink::new();
        let mut rvu = RvuStream::new();
        let ok = enc.encode(
            "s_branch",
            &[Value::Addr { section: id, offset: 20 }],
            &NoRegVars,
            section,
            &mut rvu,
            &diag,
            None,
        );
        assert!(ok, "{:?}", diag.snapshot());
        let word = u32::from_le_bytes(section.content[..4].try_into().unwrap());
        // offset 20 - (0 + 4) = 16 bytes = 4 dwords ahead.
        assert_eq!(word & 0xFFFF, 4);
        assert_eq!(section.code_flow[0].target_offset, Some(20));
    }

    #[test]
    fn regvar_operand_is_recorded_as_an_rvu_entry_instead_of_a_concrete_register() {
        struct OneVgpr;
        impl RegVarLookup for OneVgpr {
            fn class_of(&self, _id: RegVarId) -> Option<RegClass> {
                Some(RegClass::Vgpr)
            }
            fn count_of(&self, _id: RegVarId) -> Option<u16> {
                Some(1)
            }
        }
        let (mut table, id) = text_section();
        let section = table.get_mut(id).unwrap();
        let enc = Encoder::new(Gpu::Gcn1_0);
        let diag = VecDiagSink::new();
        let mut rvu = RvuStream::new();
        let ok = enc.encode(
            "v_mov_b32",
            &[
                Value::Reg(RegRef::single(RegClass::Vgpr, 3)),
                Value::RegVar { var: RegVarId(7), start: 0, count: 1 },
            ],
            &OneVgpr,
            section,
            &mut rvu,
            &diag,
            None,
        );
        assert!(ok, "{:?}", diag.snapshot());
        assert_eq!(rvu.len(), 1);
        let entry = rvu.all()[0];
        assert_eq!(entry.var, RegVarId(7));
        assert!(entry.read);
        assert!(!entry.write);
    }

    #[test]
    fn clamp_modifier_sets_the_vop3_clamp_bit() {
        let operands = [
            Value::Reg(RegRef::single(RegClass::Vgpr, 0)),
            Value::Reg(RegRef::single(RegClass::Vgpr, 1)),
            Value::Reg(RegRef::single(RegClass::Vgpr, 2)),
        ];

        let (mut table, id) = text_section();
        let section = table.get_mut(id).unwrap();
        let enc = Encoder::new(Gpu::Gcn1_0);
        let diag = VecDiagSink::new();
        let mut rvu = RvuStream::new();
        let ok = enc.encode("v_add_f32_e64", &operands, &NoRegVars, section, &mut rvu, &diag, None);
        assert!(ok, "{:?}", diag.snapshot());
        let plain_word0 = u32::from_le_bytes(section.content[0..4].try_into().unwrap());

        let (mut table, id) = text_section();
        let section = table.get_mut(id).unwrap();
        let diag = VecDiagSink::new();
        let mut rvu = RvuStream::new();
        let ok = enc.encode("v_add_f32_clamp", &operands, &NoRegVars, section, &mut rvu, &diag, None);
        assert!(ok, "{:?}", diag.snapshot());
        let clamp_word0 = u32::from_le_bytes(section.content[0..4].try_into().unwrap());

        assert_eq!(plain_word0 & (1 << 8), 0);
        assert_ne!(clamp_word0 & (1 << 8), 0);
        assert_eq!(plain_word0 | (1 << 8), clamp_word0);
    }
}
