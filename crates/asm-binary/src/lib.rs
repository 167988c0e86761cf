//! Binary container generators (`spec.md` §4 component H): turns sections
//! produced by a format handler into the vendor-specific container bytes
//! a driver expects to load.

pub mod amdcl2;
pub mod legacy;

pub use amdcl2::{
    build_amdcl2_container, device_code, write_kernel_arg, write_kernel_metadata, write_notes,
    write_sampler_entry, write_sampler_reloc, AmdGpuArchValues, Amdcl2Kernel, DeviceCodeTable,
    DriverVersion, KernelArg, KernelOptions, PtrSpace, DRIVER_VERSION_BANDS, GPU_DEVICE_COUNT,
};
pub use legacy::{build_kernel_blob, build_legacy_container, InstrCounts, LegacyKernel, SETUP_SIZE, STUB_SIZE};
