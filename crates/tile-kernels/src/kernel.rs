use tile_types::Scalar;

/// Register-blocked inner kernel of the tile multiply.
///
/// Computes `C[0..mr, 0..nr] = alpha * (A * B) + beta * C` for one packed
/// sliver pair, where `C` is column-major with stride `ldc`. The product is
/// accumulated from zero in increasing `p`, so every implementation yields
/// the same bits for the same inputs.
pub trait Microkernel<T: Scalar> {
    /// Register block rows.
    const MR: usize;

    /// Register block columns.
    const NR: usize;

    /// Run the kernel on one register block.
    ///
    /// When `beta` is zero, `C` is written without being read.
    ///
    /// # Safety
    /// - `a` points to at least `Self::MR * k` packed elements
    /// - `b` points to at least `k * Self::NR` packed elements
    /// - `c` is valid for `(nr - 1) * ldc + mr` elements
    /// - `mr <= Self::MR` and `nr <= Self::NR`
    #[allow(clippy::too_many_arguments)]
    unsafe fn execute(
        &self,
        mr: usize,
        nr: usize,
        k: usize,
        alpha: T,
        a: *const T,
        b: *const T,
        beta: T,
        c: *mut T,
        ldc: usize,
    );
}

/// Scale-and-store of one accumulated element.
#[inline(always)]
pub(crate) unsafe fn store<T: Scalar>(c: *mut T, alpha: T, acc: T, beta: T) {
    if beta.is_zero() {
        *c = alpha * acc;
    } else {
        *c = alpha * acc + beta * *c;
    }
}

/// Scalar microkernel; the fallback for every element type.
#[derive(Default, Clone, Copy)]
pub struct PortableMicrokernel;

impl<T: Scalar> Microkernel<T> for PortableMicrokernel {
    const MR: usize = 4;
    const NR: usize = 4;

    unsafe fn execute(
        &self,
        mr: usize,
        nr: usize,
        k: usize,
        alpha: T,
        a: *const T,
        b: *const T,
        beta: T,
        c: *mut T,
        ldc: usize,
    ) {
        const MR: usize = 4;
        const NR: usize = 4;

        let mut acc = [[T::zero(); MR]; NR];
        for p in 0..k {
            for j in 0..nr {
                let b_val = *b.add(p * NR + j);
                for i in 0..mr {
                    acc[j][i] += *a.add(p * MR + i) * b_val;
                }
            }
        }

        for j in 0..nr {
            for i in 0..mr {
                store(c.add(i + j * ldc), alpha, acc[j][i], beta);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_portable_kernel() {
        // A = [[1, 2, 3], [4, 5, 6]] packed in MR=4 slivers
        let a: [f64; 12] = [1.0, 4.0, 0.0, 0.0, 2.0, 5.0, 0.0, 0.0, 3.0, 6.0, 0.0, 0.0];
        // B = [[1, 2], [3, 4], [5, 6]] packed in NR=4 slivers
        let b: [f64; 12] = [1.0, 2.0, 0.0, 0.0, 3.0, 4.0, 0.0, 0.0, 5.0, 6.0, 0.0, 0.0];
        let mut c = [f64::NAN; 4];

        unsafe {
            Microkernel::<f64>::execute(
                &PortableMicrokernel,
                2,
                2,
                3,
                1.0,
                a.as_ptr(),
                b.as_ptr(),
                0.0,
                c.as_mut_ptr(),
                2,
            );
        }

        // column-major: c00, c10, c01, c11
        assert_eq!(c, [22.0, 49.0, 28.0, 64.0]);
    }

    #[test]
    fn test_portable_kernel_alpha_beta() {
        let a: [f64; 4] = [1.0, 0.0, 0.0, 0.0];
        let b: [f64; 4] = [2.0, 0.0, 0.0, 0.0];
        let mut c = [10.0f64];

        unsafe {
            Microkernel::<f64>::execute(
                &PortableMicrokernel,
                1,
                1,
                1,
                3.0,
                a.as_ptr(),
                b.as_ptr(),
                0.5,
                c.as_mut_ptr(),
                1,
            );
        }

        assert_eq!(c[0], 3.0 * 2.0 + 0.5 * 10.0);
    }
}
