//! Format handlers (`spec.md` §4 component G): per-format section layout
//! and kernel-level config, driven by the pseudo-op dispatcher.

mod handler;
mod kernel;

pub use handler::{
    AmdLegacyFormat, Amdcl2Format, FormatError, FormatHandler, GalliumFormat, RawFormat,
    RocmFormat,
};
pub use kernel::{Amdcl2KernelConfig, Kernel, KernelConfig, LegacyKernelConfig};
