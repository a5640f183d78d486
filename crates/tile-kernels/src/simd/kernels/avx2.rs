use crate::kernel::{store, Microkernel};
use wide::{f32x8, f64x4};

/// AVX2 microkernel for f32: 8x4 register block, one `f32x8` per C column.
#[derive(Default, Clone, Copy)]
pub struct Avx2F32Kernel;

impl Microkernel<f32> for Avx2F32Kernel {
    const MR: usize = 8;
    const NR: usize = 4;

    #[target_feature(enable = "avx2")]
    unsafe fn execute(
        &self,
        mr: usize,
        nr: usize,
        k: usize,
        alpha: f32,
        a: *const f32,
        b: *const f32,
        beta: f32,
        c: *mut f32,
        ldc: usize,
    ) {
        let mut acc = [f32x8::splat(0.0); 4];

        for p in 0..k {
            // packed A sliver is padded to MR, so a full load is in bounds
            let mut a_vals = [0.0f32; 8];
            std::ptr::copy_nonoverlapping(a.add(p * Self::MR), a_vals.as_mut_ptr(), 8);
            let a_vec = f32x8::from(a_vals);

            for (j, col) in acc.iter_mut().enumerate().take(nr) {
                // separate multiply and add keep results identical to the portable kernel
                let product = a_vec * f32x8::splat(*b.add(p * Self::NR + j));
                *col = *col + product;
            }
        }

        for (j, col) in acc.iter().enumerate().take(nr) {
            let vals: [f32; 8] = (*col).into();
            for (i, &v) in vals.iter().enumerate().take(mr) {
                store(c.add(i + j * ldc), alpha, v, beta);
            }
        }
    }
}

/// AVX2 microkernel for f64: 4x4 register block, one `f64x4` per C column.
#[derive(Default, Clone, Copy)]
pub struct Avx2F64Kernel;

impl Microkernel<f64> for Avx2F64Kernel {
    const MR: usize = 4;
    const NR: usize = 4;

    #[target_feature(enable = "avx2")]
    unsafe fn execute(
        &self,
        mr: usize,
        nr: usize,
        k: usize,
        alpha: f64,
        a: *const f64,
        b: *const f64,
        beta: f64,
        c: *mut f64,
        ldc: usize,
    ) {
        let mut acc = [f64x4::splat(0.0); 4];

        for p in 0..k {
            let mut a_vals = [0.0f64; 4];
            std::ptr::copy_nonoverlapping(a.add(p * Self::MR), a_vals.as_mut_ptr(), 4);
            let a_vec = f64x4::from(a_vals);

            for (j, col) in acc.iter_mut().enumerate().take(nr) {
                let product = a_vec * f64x4::splat(*b.add(p * Self::NR + j));
                *col = *col + product;
            }
        }

        for (j, col) in acc.iter().enumerate().take(nr) {
            let vals: [f64; 4] = (*col).into();
            for (i, &v) in vals.iter().enumerate().take(mr) {
                store(c.add(i + j * ldc), alpha, v, beta);
            }
        }
    }
}
