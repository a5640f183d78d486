use std::sync::OnceLock;

/// Host micro-kernel families a tile multiply can run on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimdLevel {
    /// Lane-generic kernel built on `wide`; available everywhere.
    Portable,
    /// 256-bit AVX2 kernel for `f32`/`f64` (x86-64 only).
    Avx2,
}

impl SimdLevel {
    fn from_cpu() -> Self {
        #[cfg(target_arch = "x86_64")]
        if is_x86_feature_detected!("avx2") {
            return SimdLevel::Avx2;
        }
        SimdLevel::Portable
    }

    pub fn has_avx2(self) -> bool {
        self == SimdLevel::Avx2
    }
}

static SIMD_LEVEL: OnceLock<SimdLevel> = OnceLock::new();

/// Kernel family for this process, detected once.
pub fn simd_level() -> SimdLevel {
    *SIMD_LEVEL.get_or_init(SimdLevel::from_cpu)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detection_is_cached() {
        assert_eq!(simd_level(), simd_level());
        assert_eq!(simd_level(), SimdLevel::from_cpu());
    }

    #[test]
    fn test_avx2_only_on_x86_64() {
        if simd_level().has_avx2() {
            assert!(cfg!(target_arch = "x86_64"));
        }
    }
}
