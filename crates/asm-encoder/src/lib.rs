//! GCN instruction encoder (`spec.md` §4 component E): mnemonic table,
//! architecture gating, modifier and operand validation, inline-constant
//! folding, and byte emission.

mod arch;
mod encode;
mod forms;
mod literal;
mod modifiers;
mod operand;
mod rvu;
mod table;

pub use arch::{ArchMask, Gpu};
pub use encode::Encoder;
pub use forms::{
    encode_ds, encode_exp, encode_flat, encode_mimg, encode_mtbuf, encode_mubuf, encode_smem,
    encode_sop1, encode_sop2, encode_sopc, encode_sopk, encode_sopp, encode_vintrp, encode_vop1,
    encode_vop2, encode_vop3, encode_vopc, DsFields, EncodingForm, ExpFields, FlatFields,
    MimgFields, MtbufFields, MubufFields, SmemFields, Vop3Fields,
};
pub use literal::{fold_float, fold_int, FoldedSrc};
pub use modifiers::{parse_modifier, split_mnemonic_suffixes, ModMask};
pub use operand::{range_satisfies_alignment, OperandKind, OperandSlot, RegVarLookup};
pub use rvu::{FieldTag, Rvu, RvuStream};
pub use table::{InstrDesc, INSTR_TABLE};
