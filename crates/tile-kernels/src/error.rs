//! Error types for kernel argument checking.

use thiserror::Error;

/// Errors raised by the kernel entry points before any data is touched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BlasError {
    /// An argument is outside its legal range.
    #[error("invalid argument '{arg}': {reason}")]
    InvalidArgument {
        /// The argument name.
        arg: &'static str,
        /// Why it was rejected.
        reason: String,
    },

    /// Buffers or batch arrays disagree on their dimensions.
    #[error("dimension mismatch: {0}")]
    DimensionMismatch(String),
}

/// Result type for kernel operations.
pub type Result<T> = std::result::Result<T, BlasError>;

/// Bail out with `InvalidArgument` when `cond` holds.
macro_rules! blas_error_if {
    ($cond:expr, $arg:literal) => {
        if $cond {
            return Err($crate::error::BlasError::InvalidArgument {
                arg: $arg,
                reason: stringify!($cond).to_string(),
            });
        }
    };
}

pub(crate) use blas_error_if;

/// Check that a column-major buffer can hold `rows x cols` with leading dimension `ld`.
pub(crate) fn check_buffer(
    arg: &'static str,
    len: usize,
    rows: usize,
    cols: usize,
    ld: usize,
) -> Result<()> {
    if ld < rows.max(1) {
        return Err(BlasError::InvalidArgument {
            arg,
            reason: format!("leading dimension {} < {}", ld, rows.max(1)),
        });
    }
    if rows > 0 && cols > 0 {
        let needed = ld * (cols - 1) + rows;
        if len < needed {
            return Err(BlasError::DimensionMismatch(format!(
                "{}: buffer holds {} elements, {}x{} with ld {} needs {}",
                arg, len, rows, cols, ld, needed
            )));
        }
    }
    Ok(())
}
