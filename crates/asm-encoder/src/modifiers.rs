//! Instruction modifiers (`spec.md` §4.E step 2).

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ModMask: u16 {
        const E32      = 0b0000001;
        const E64      = 0b0000010;
        const SDWA     = 0b0000100;
        const DPP      = 0b0001000;
        const SATURATE = 0b0010000;
        const CLAMP    = 0b0100000;
    }
}

/// Recognise a modifier suffix/trailing token. Returns `None` for anything
/// that isn't one of the modifiers this core understands.
pub fn parse_modifier(name: &str) -> Option<ModMask> {
    match name.to_ascii_lowercase().as_str() {
        "_e32" => Some(ModMask::E32),
        "_e64" => Some(ModMask::E64),
        "_sdwa" => Some(ModMask::SDWA),
        "_dpp" => Some(ModMask::DPP),
        "_saturate" => Some(ModMask::SATURATE),
        "_clamp" => Some(ModMask::CLAMP),
        _ => None,
    }
}

/// Split a raw mnemonic token (`v_add_f32_e64`) into its base mnemonic and
/// any modifier suffixes chained onto it, longest-suffix-first so
/// `_saturate` isn't mistaken for part of the base name.
pub fn split_mnemonic_suffixes(raw: &str) -> (String, ModMask) {
    let mut base = raw.to_string();
    let mut mask = ModMask::empty();
    loop {
        let mut matched = None;
        for suffix in ["_e32", "_e64", "_sdwa", "_dpp", "_saturate", "_clamp"] {
            if base.to_ascii_lowercase().ends_with(suffix) {
                matched = Some(suffix);
                break;
            }
        }
        match matched {
            Some(suffix) => {
                mask |= parse_modifier(suffix).unwrap();
                base.truncate(base.len() - suffix.len());
            }
            None => break,
        }
    }
    (base, mask)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_chained_suffixes() {
        let (base, mask) = split_mnemonic_suffixes("v_add_f32_e64");
        assert_eq!(base, "v_add_f32");
        assert_eq!(mask, ModMask::E64);
    }

    #[test]
    fn plain_mnemonic_has_no_modifiers() {
        let (base, mask) = split_mnemonic_suffixes("s_mov_b32");
        assert_eq!(base, "s_mov_b32");
        assert!(mask.is_empty());
    }
}
