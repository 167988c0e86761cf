//! Architecture-variant dispatch (`spec.md` §4.E "Target-architecture
//! gating").

bitflags::bitflags! {
    /// Bitmask of GCN variants an instruction form is valid on.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ArchMask: u8 {
        const GCN1_0 = 0b0001;
        const GCN1_1 = 0b0010;
        const GCN1_2 = 0b0100;
        const GCN1_4 = 0b1000;
    }
}

impl ArchMask {
    pub const ALL: ArchMask = ArchMask::GCN1_0
        .union(ArchMask::GCN1_1)
        .union(ArchMask::GCN1_2)
        .union(ArchMask::GCN1_4);
    pub const GCN1_1_UP: ArchMask = ArchMask::GCN1_1
        .union(ArchMask::GCN1_2)
        .union(ArchMask::GCN1_4);
    pub const GCN1_2_UP: ArchMask = ArchMask::GCN1_2.union(ArchMask::GCN1_4);
}

/// `.gpu <name>` selects one of these (`spec.md` §4.E).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Gpu {
    Gcn1_0,
    Gcn1_1,
    Gcn1_2,
    Gcn1_4,
}

impl Gpu {
    pub fn arch_bit(self) -> ArchMask {
        match self {
            Gpu::Gcn1_0 => ArchMask::GCN1_0,
            Gpu::Gcn1_1 => ArchMask::GCN1_1,
            Gpu::Gcn1_2 => ArchMask::GCN1_2,
            Gpu::Gcn1_4 => ArchMask::GCN1_4,
        }
    }

    /// Recognise a `.gpu` device name, grouped by the GCN generation it
    /// implements. Unknown names return `None` so the dispatcher can raise
    /// a diagnostic instead of silently defaulting.
    pub fn parse(name: &str) -> Option<Gpu> {
        match name.to_ascii_lowercase().as_str() {
            "tahiti" | "pitcairn" | "capeverde" | "oland" | "hainan" | "gcn1.0" | "gcn1_0" => {
                Some(Gpu::Gcn1_0)
            }
            "bonaire" | "hawaii" | "gcn1.1" | "gcn1_1" => Some(Gpu::Gcn1_1),
            "tonga" | "fiji" | "iceland" | "carrizo" | "gcn1.2" | "gcn1_2" => Some(Gpu::Gcn1_2),
            "vega" | "vega10" | "vega20" | "gcn1.4" | "gcn1_4" => Some(Gpu::Gcn1_4),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gpu_names_resolve_to_the_right_generation() {
        assert_eq!(Gpu::parse("tahiti"), Some(Gpu::Gcn1_0));
        assert_eq!(Gpu::parse("Hawaii"), Some(Gpu::Gcn1_1));
        assert_eq!(Gpu::parse("tonga"), Some(Gpu::Gcn1_2));
        assert_eq!(Gpu::parse("vega10"), Some(Gpu::Gcn1_4));
        assert_eq!(Gpu::parse("nonsense"), None);
    }

    #[test]
    fn arch_mask_groups_upward_compatible_variants() {
        assert!(ArchMask::GCN1_1_UP.contains(ArchMask::GCN1_2));
        assert!(!ArchMask::GCN1_2_UP.contains(ArchMask::GCN1_0));
    }
}
