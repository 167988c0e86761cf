//! Multi-section address space. Only the *current* section accumulates bytes
//! (`spec.md` §3 "Section").

use crate::value::{ExprId, SectionId};

bitflags::bitflags! {
    /// Section attribute flags (`spec.md` §3: writable, addressable,
    /// unresolvable, code).
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct SectionFlags: u8 {
        const WRITABLE      = 0b0001;
        const ADDRESSABLE   = 0b0010;
        const UNRESOLVABLE  = 0b0100;
        const CODE          = 0b1000;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionType {
    Text,
    Data,
    Rodata,
    Bss,
    Other,
}

/// Kind of branch/flow-affecting instruction recorded by the encoder
/// (`spec.md` §3 "Code-flow entry").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowKind {
    Jump,
    CondJump,
    Call,
    Return,
    End,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodeFlowEntry {
    pub offset: u64,
    pub kind: FlowKind,
    pub target_offset: Option<u64>,
}

/// A cross-section (or forward-reference) relocation the writer must patch
/// once every contributing expression has a final value.
#[derive(Debug, Clone)]
pub struct Relocation {
    /// Byte offset within the section's content at which the fixup is applied.
    pub offset: u64,
    /// Width of the fixup in bytes (1, 2, 4 or 8).
    pub width: u8,
    /// The expression supplying the value, if still unresolved at emission time.
    pub expr: Option<ExprId>,
}

#[derive(Debug, Clone)]
pub struct Section {
    pub id: SectionId,
    pub name: String,
    /// Owning kernel for per-kernel code sections; `None` for global sections.
    pub kernel_id: Option<u32>,
    pub ty: SectionType,
    pub flags: SectionFlags,
    pub alignment: u32,
    pub content: Vec<u8>,
    pub relocations: Vec<Relocation>,
    pub code_flow: Vec<CodeFlowEntry>,
}

impl Section {
    pub fn new(id: SectionId, name: impl Into<String>, ty: SectionType, flags: SectionFlags) -> Self {
        Self {
            id,
            name: name.into(),
            kernel_id: None,
            ty,
            flags,
            alignment: 1,
            content: Vec::new(),
            relocations: Vec::new(),
            code_flow: Vec::new(),
        }
    }

    /// Current location-counter offset: invariant #1 in `spec.md` §8 requires
    /// every write to advance this by exactly the number of bytes written.
    pub fn current_out_pos(&self) -> u64 {
        self.content.len() as u64
    }

    pub fn append_bytes(&mut self, bytes: &[u8]) {
        self.content.extend_from_slice(bytes);
    }

    pub fn append_fill(&mut self, count: u64, value: u8) {
        self.content
            .resize(self.content.len() + count as usize, value);
    }

    pub fn align_to(&mut self, alignment: u64, fill: u8) {
        if alignment <= 1 {
            return;
        }
        let pos = self.current_out_pos();
        let rem = pos % alignment;
        if rem != 0 {
            self.append_fill(alignment - rem, fill);
        }
    }
}

/// Owns every section; tracks which one is "current" for the dispatcher.
#[derive(Debug, Default)]
pub struct SectionTable {
    sections: Vec<Section>,
    by_name: std::collections::HashMap<(Option<u32>, String), SectionId>,
    current: Option<SectionId>,
}

impl SectionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(
        &mut self,
        name: impl Into<String>,
        kernel_id: Option<u32>,
        ty: SectionType,
        flags: SectionFlags,
    ) -> SectionId {
        let name = name.into();
        let id = SectionId(self.sections.len() as u32);
        let mut section = Section::new(id, name.clone(), ty, flags);
        section.kernel_id = kernel_id;
        self.sections.push(section);
        self.by_name.insert((kernel_id, name), id);
        id
    }

    pub fn find(&self, name: &str, kernel_id: Option<u32>) -> Option<SectionId> {
        self.by_name.get(&(kernel_id, name.to_string())).copied()
    }

    pub fn get(&self, id: SectionId) -> Option<&Section> {
        self.sections.get(id.0 as usize)
    }

    pub fn get_mut(&mut self, id: SectionId) -> Option<&mut Section> {
        self.sections.get_mut(id.0 as usize)
    }

    pub fn current(&self) -> Option<SectionId> {
        self.current
    }

    pub fn set_current(&mut self, id: SectionId) {
        self.current = Some(id);
    }

    pub fn current_mut(&mut self) -> Option<&mut Section> {
        let id = self.current?;
        self.get_mut(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Section> {
        self.sections.iter()
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_bytes_advances_out_pos_exactly() {
        let mut s = Section::new(SectionId(0), "text", SectionType::Text, SectionFlags::CODE);
        assert_eq!(s.current_out_pos(), 0);
        s.append_bytes(&[1, 2, 3]);
        assert_eq!(s.current_out_pos(), 3);
        s.append_fill(4, 0);
        assert_eq!(s.content, vec![1, 2, 3, 0, 0, 0, 0]);
    }

    #[test]
    fn align_pads_to_boundary() {
        let mut s = Section::new(SectionId(0), "text", SectionType::Text, SectionFlags::CODE);
        s.append_bytes(&[1, 2, 3]);
        s.align_to(4, 0);
        assert_eq!(s.content, vec![1, 2, 3, 0]);
        s.align_to(4, 0xAA); // already aligned: no-op
        assert_eq!(s.content, vec![1, 2, 3, 0]);
    }

    #[test]
    fn section_table_creates_and_finds_by_kernel_scope() {
        let mut t = SectionTable::new();
        let global = t.create(".rodata", None, SectionType::Rodata, SectionFlags::empty());
        let per_kernel = t.create(".text", Some(1), SectionType::Text, SectionFlags::CODE);
        assert_ne!(global, per_kernel);
        assert_eq!(t.find(".text", Some(1)), Some(per_kernel));
        assert_eq!(t.find(".text", None), None);
        t.set_current(per_kernel);
        assert_eq!(t.current(), Some(per_kernel));
    }
}
