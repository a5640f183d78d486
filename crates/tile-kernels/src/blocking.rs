//! Cache blocking of the tile multiply.
//!
//! Matrix tiles are a few hundred rows at most, so a tile rarely splits into
//! more than one block per dimension; the block sizes mostly bound the
//! packing buffers. Register blocking comes from the microkernel.

/// Outer block sizes of [`gemm_inner`](crate::gemm_inner).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheBlocking {
    /// Rows of `op(A)` packed at once.
    pub mc: usize,
    /// Columns of `op(B)` packed at once.
    pub nc: usize,
    /// Depth of one packed panel pair.
    pub kc: usize,
}

impl CacheBlocking {
    pub const AVX2_F32: Self = Self {
        mc: 256,
        nc: 256,
        kc: 512,
    };

    pub const AVX2_F64: Self = Self {
        mc: 128,
        nc: 128,
        kc: 256,
    };

    /// Portable kernel, any scalar.
    pub const PORTABLE: Self = Self {
        mc: 64,
        nc: 64,
        kc: 256,
    };
}

/// `(start, len)` of consecutive blocks of `size` covering `0..total`; the
/// last one is ragged. `size` must be non-zero.
pub fn blocks(total: usize, size: usize) -> impl Iterator<Item = (usize, usize)> {
    (0..total).step_by(size).map(move |start| (start, size.min(total - start)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blocks_ragged_tail() {
        let got: Vec<_> = blocks(10, 4).collect();
        assert_eq!(got, vec![(0, 4), (4, 4), (8, 2)]);
    }

    #[test]
    fn test_small_tile_is_one_block() {
        let nb = 192;
        for params in [CacheBlocking::PORTABLE, CacheBlocking::AVX2_F64] {
            assert_eq!(blocks(nb, params.kc).collect::<Vec<_>>(), vec![(0, nb)]);
        }
        assert_eq!(blocks(0, 8).count(), 0);
    }
}
