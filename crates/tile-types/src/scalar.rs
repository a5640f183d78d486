use num_complex::Complex;
use std::fmt::{Debug, Display};
use std::ops::{Add, AddAssign, Div, Mul, MulAssign, Neg, Sub, SubAssign};

/// Trait for the numeric element types a tiled matrix can hold.
///
/// The set of implementors is closed: `f32`, `f64`, `Complex<f32>` and
/// `Complex<f64>`. Every engine entry point is generic over this trait, so the
/// choice of precision is resolved at compile time.
pub trait Scalar:
    Copy
    + Clone
    + Send
    + Sync
    + Debug
    + Display
    + Default
    + PartialEq
    + 'static
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Neg<Output = Self>
    + AddAssign
    + SubAssign
    + MulAssign
{
    /// The real type underlying this scalar (itself for real scalars).
    type Real: RealScalar;

    /// Whether the scalar carries an imaginary part.
    const IS_COMPLEX: bool;

    /// Additive identity.
    fn zero() -> Self;

    /// Multiplicative identity.
    fn one() -> Self;

    /// Complex conjugate (identity for real scalars).
    fn conj(self) -> Self;

    /// Lift a real value.
    fn from_real(re: Self::Real) -> Self;

    /// Build from a pair of f64 parts; the imaginary part is dropped for real scalars.
    fn from_parts(re: f64, im: f64) -> Self;

    /// Build from an f64 value.
    #[inline(always)]
    fn from_f64(v: f64) -> Self {
        Self::from_parts(v, 0.0)
    }

    /// Real part.
    fn re(self) -> Self::Real;

    /// Imaginary part (zero for real scalars).
    fn im(self) -> Self::Real;

    /// Modulus, widened to f64.
    fn modulus(self) -> f64;

    /// Whether this value equals zero exactly.
    #[inline(always)]
    fn is_zero(self) -> bool {
        self == Self::zero()
    }
}

/// Real scalars (`f32`, `f64`).
pub trait RealScalar: Scalar<Real = Self> + PartialOrd {
    /// Widen to f64.
    fn to_f64(self) -> f64;
}

macro_rules! impl_scalar_real {
    ($($t:ty),*) => {
        $(
            impl Scalar for $t {
                type Real = $t;

                const IS_COMPLEX: bool = false;

                #[inline(always)]
                fn zero() -> Self {
                    0.0
                }

                #[inline(always)]
                fn one() -> Self {
                    1.0
                }

                #[inline(always)]
                fn conj(self) -> Self {
                    self
                }

                #[inline(always)]
                fn from_real(re: Self::Real) -> Self {
                    re
                }

                #[inline(always)]
                fn from_parts(re: f64, _im: f64) -> Self {
                    re as $t
                }

                #[inline(always)]
                fn re(self) -> Self::Real {
                    self
                }

                #[inline(always)]
                fn im(self) -> Self::Real {
                    0.0
                }

                #[inline(always)]
                fn modulus(self) -> f64 {
                    (self as f64).abs()
                }
            }

            impl RealScalar for $t {
                #[inline(always)]
                fn to_f64(self) -> f64 {
                    self as f64
                }
            }
        )*
    };
}

macro_rules! impl_scalar_complex {
    ($($t:ty),*) => {
        $(
            impl Scalar for Complex<$t> {
                type Real = $t;

                const IS_COMPLEX: bool = true;

                #[inline(always)]
                fn zero() -> Self {
                    Complex::new(0.0, 0.0)
                }

                #[inline(always)]
                fn one() -> Self {
                    Complex::new(1.0, 0.0)
                }

                #[inline(always)]
                fn conj(self) -> Self {
                    Complex::new(self.re, -self.im)
                }

                #[inline(always)]
                fn from_real(re: Self::Real) -> Self {
                    Complex::new(re, 0.0)
                }

                #[inline(always)]
                fn from_parts(re: f64, im: f64) -> Self {
                    Complex::new(re as $t, im as $t)
                }

                #[inline(always)]
                fn re(self) -> Self::Real {
                    self.re
                }

                #[inline(always)]
                fn im(self) -> Self::Real {
                    self.im
                }

                #[inline(always)]
                fn modulus(self) -> f64 {
                    (self.re as f64).hypot(self.im as f64)
                }
            }
        )*
    };
}

impl_scalar_real!(f32, f64);
impl_scalar_complex!(f32, f64);
