//! Architecture-specific microkernels.

#[cfg(target_arch = "x86_64")]
mod avx2;

#[cfg(target_arch = "x86_64")]
pub use avx2::{Avx2F32Kernel, Avx2F64Kernel};
