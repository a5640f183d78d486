//! Symmetric and triangular views, and the lazy transpose operators.

use super::{Context, Distribution, Matrix};
use crate::error::{Error, Result};
use std::ops::Deref;
use std::sync::Arc;
use tile_types::{Diag, Op, Scalar, Uplo};

/// Matrices that can carry a lazy transpose.
pub trait OpView: Sized {
    fn apply_op(&self, op: Op) -> Result<Self>;
}

/// `A^T`, sharing storage with `A`.
pub fn transpose<M: OpView>(a: &M) -> Result<M> {
    a.apply_op(Op::Trans)
}

/// `A^H`, sharing storage with `A`.
pub fn conj_transpose<M: OpView>(a: &M) -> Result<M> {
    a.apply_op(Op::ConjTrans)
}

impl<T: Scalar> OpView for Matrix<T> {
    fn apply_op(&self, op: Op) -> Result<Self> {
        self.with_op(op)
    }
}

fn check_triangle(uplo: Uplo) -> Result<()> {
    if uplo == Uplo::General {
        return Err(Error::invalid("uplo", "a triangle view needs Lower or Upper"));
    }
    Ok(())
}

fn logical_uplo<T: Scalar>(mat: &Matrix<T>) -> Uplo {
    if mat.op() == Op::NoTrans {
        mat.uplo_physical()
    } else {
        mat.uplo_physical().flip()
    }
}

/// Symmetric `n x n` matrix; only the `uplo` triangle is stored.
#[derive(Clone, Debug)]
pub struct SymmetricMatrix<T>(Matrix<T>);

impl<T: Scalar> SymmetricMatrix<T> {
    pub fn new(
        uplo: Uplo,
        n: usize,
        nb: usize,
        dist: Distribution,
        ctx: Arc<Context>,
    ) -> Result<Self> {
        check_triangle(uplo)?;
        Ok(Self(Matrix::with_uplo(n, n, nb, uplo, dist, ctx)?))
    }

    /// Local tiles of the stored triangle filled with `f(row, col)`.
    pub fn from_fn<F>(
        uplo: Uplo,
        n: usize,
        nb: usize,
        dist: Distribution,
        ctx: Arc<Context>,
        f: F,
    ) -> Result<Self>
    where
        F: Fn(usize, usize) -> T,
    {
        let c = Self::new(uplo, n, nb, dist, ctx)?;
        c.insert_local_tiles_with(f)?;
        Ok(c)
    }

    /// Triangle as seen through the view's op.
    pub fn uplo(&self) -> Uplo {
        logical_uplo(&self.0)
    }

    pub fn is_real(&self) -> bool {
        !T::IS_COMPLEX
    }

    pub fn as_matrix(&self) -> &Matrix<T> {
        &self.0
    }
}

impl<T> Deref for SymmetricMatrix<T> {
    type Target = Matrix<T>;

    fn deref(&self) -> &Matrix<T> {
        &self.0
    }
}

impl<T: Scalar> OpView for SymmetricMatrix<T> {
    fn apply_op(&self, op: Op) -> Result<Self> {
        Ok(Self(self.0.with_op(op)?))
    }
}

/// Triangular `n x n` matrix with a unit or non-unit diagonal.
#[derive(Clone, Debug)]
pub struct TriangularMatrix<T> {
    mat: Matrix<T>,
    diag: Diag,
}

impl<T: Scalar> TriangularMatrix<T> {
    pub fn new(
        uplo: Uplo,
        diag: Diag,
        n: usize,
        nb: usize,
        dist: Distribution,
        ctx: Arc<Context>,
    ) -> Result<Self> {
        check_triangle(uplo)?;
        Ok(Self {
            mat: Matrix::with_uplo(n, n, nb, uplo, dist, ctx)?,
            diag,
        })
    }

    pub fn from_fn<F>(
        uplo: Uplo,
        diag: Diag,
        n: usize,
        nb: usize,
        dist: Distribution,
        ctx: Arc<Context>,
        f: F,
    ) -> Result<Self>
    where
        F: Fn(usize, usize) -> T,
    {
        let a = Self::new(uplo, diag, n, nb, dist, ctx)?;
        a.insert_local_tiles_with(f)?;
        Ok(a)
    }

    pub fn uplo(&self) -> Uplo {
        logical_uplo(&self.mat)
    }

    pub fn diag(&self) -> Diag {
        self.diag
    }

    pub fn is_real(&self) -> bool {
        !T::IS_COMPLEX
    }

    pub fn as_matrix(&self) -> &Matrix<T> {
        &self.mat
    }
}

impl<T> Deref for TriangularMatrix<T> {
    type Target = Matrix<T>;

    fn deref(&self) -> &Matrix<T> {
        &self.mat
    }
}

impl<T: Scalar> OpView for TriangularMatrix<T> {
    fn apply_op(&self, op: Op) -> Result<Self> {
        Ok(Self {
            mat: self.mat.with_op(op)?,
            diag: self.diag,
        })
    }
}
