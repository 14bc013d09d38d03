// matrix.rs
// Richard Dalley

//! # Matrix Module
//!
//! This module provides the dense `Matrix` type used throughout the crate:
//! - construction (zero-filled, value-filled, from a row-major buffer, identity)
//! - checked element access
//! - element-wise and matrix-product arithmetic, scalar scaling
//! - randomized initializers (uniform, Xavier, He)
//! - row/column utilities and a fixed-width text rendering for debugging
//!
//! Storage is a single row-major `Vec<f64>`; element `(i, j)` lives at
//! `i * cols + j`. Every fallible operation returns a [`MatrixError`]
//! instead of panicking.
//!
//! ## Usage:
//! ```rust
//! use neural_matrix::Matrix;
//!
//! let a = Matrix::new(2, 2, vec![1.0, 2.0, 3.0, 4.0]).unwrap();
//! let b = Matrix::new(2, 2, vec![5.0, 6.0, 7.0, 8.0]).unwrap();
//! let c = a.multiply(&b).unwrap();
//! assert_eq!(c.as_slice(), &[19.0, 22.0, 43.0, 50.0]);
//! ```

use std::fmt;
use std::io::{self, Write};
use std::ops::Add;
use std::ops::Div;
use std::ops::Mul;
use std::ops::MulAssign;
use std::ops::Sub;

use log::{debug, warn};
use rand::Rng;
use rand_distr::{Distribution, Normal, Uniform};

use crate::error::{MatrixError, Result};

// Matrix
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>, // Flat vector for matrix elements
}

impl Matrix {
    /// Builds a matrix from a row-major buffer.
    ///
    /// # Errors
    /// `InvalidArgument` when `rows * cols` overflows or differs from
    /// `data.len()`.
    pub fn new(rows: usize, cols: usize, data: Vec<f64>) -> Result<Self> {
        if Self::element_count(rows, cols)? != data.len() {
            return Err(MatrixError::InvalidArgument(format!(
                "data length {} does not fit a {}x{} matrix",
                data.len(),
                rows,
                cols
            )));
        }
        Ok(Self { rows, cols, data })
    }

    fn element_count(rows: usize, cols: usize) -> Result<usize> {
        rows.checked_mul(cols).ok_or_else(|| {
            MatrixError::InvalidArgument(format!("{}x{} matrix is too large", rows, cols))
        })
    }

    /// Zero-initialized matrix.
    ///
    /// # Panics
    /// Panics if `rows * cols` overflows `usize` or the store cannot be
    /// allocated. Use [`Matrix::try_filled`] for caller-supplied shapes.
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self::filled(rows, cols, 0.0)
    }

    /// # Panics
    /// Same conditions as [`Matrix::zeros`].
    pub fn filled(rows: usize, cols: usize, value: f64) -> Self {
        Self {
            rows,
            cols,
            data: vec![value; rows * cols],
        }
    }

    /// Like [`Matrix::filled`] but rejects shapes whose element count
    /// overflows `usize`.
    pub fn try_filled(rows: usize, cols: usize, value: f64) -> Result<Self> {
        let len = Self::element_count(rows, cols)?;
        Ok(Self {
            rows,
            cols,
            data: vec![value; len],
        })
    }

    /// `n x n` identity matrix.
    pub fn eye(n: usize) -> Self {
        let mut eye = Self::zeros(n, n);
        for i in 0..n {
            eye.data[i * n + i] = 1.0;
        }
        eye
    }

    /// Creates a row matrix (1 row, `vec.len()` columns)
    pub fn from_row(vec: Vec<f64>) -> Self {
        Self {
            rows: 1,
            cols: vec.len(),
            data: vec,
        }
    }

    /// Creates a column matrix (`vec.len()` rows, 1 column)
    pub fn from_col(vec: Vec<f64>) -> Self {
        Self {
            rows: vec.len(),
            cols: 1,
            data: vec,
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// True when either dimension is zero.
    pub fn is_empty(&self) -> bool {
        self.rows == 0 || self.cols == 0
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    pub fn rows_iter(&self) -> impl Iterator<Item = &[f64]> {
        (0..self.rows).map(move |row| {
            let start = row * self.cols;
            let end = start + self.cols;
            &self.data[start..end]
        })
    }

    fn index_of(&self, row: usize, col: usize) -> Result<usize> {
        if row >= self.rows || col >= self.cols {
            return Err(MatrixError::IndexOutOfBounds {
                row,
                col,
                rows: self.rows,
                cols: self.cols,
            });
        }
        Ok(row * self.cols + col)
    }

    // Immutable access to matrix elements
    pub fn at(&self, row: usize, col: usize) -> Result<&f64> {
        let index = self.index_of(row, col)?;
        Ok(&self.data[index])
    }

    // Mutable access to matrix elements
    pub fn at_mut(&mut self, row: usize, col: usize) -> Result<&mut f64> {
        let index = self.index_of(row, col)?;
        Ok(&mut self.data[index])
    }

    fn check_same_shape(&self, other: &Matrix, op: &'static str) -> Result<()> {
        if self.shape() != other.shape() {
            return Err(MatrixError::DimensionMismatch {
                op,
                left: self.shape(),
                right: other.shape(),
            });
        }
        Ok(())
    }

    // Combine two equally shaped matrices element by element
    fn zip_with<F>(&self, other: &Matrix, op: &'static str, func: F) -> Result<Matrix>
    where
        F: Fn(f64, f64) -> f64,
    {
        self.check_same_shape(other, op)?;
        let data = self
            .data
            .iter()
            .zip(other.data.iter())
            .map(|(&a, &b)| func(a, b))
            .collect();

        Ok(Matrix {
            rows: self.rows,
            cols: self.cols,
            data,
        })
    }

    pub fn add(&self, other: &Matrix) -> Result<Matrix> {
        self.zip_with(other, "add", |a, b| a + b)
    }

    pub fn subtract(&self, other: &Matrix) -> Result<Matrix> {
        self.zip_with(other, "subtract", |a, b| a - b)
    }

    /// Element-wise (Hadamard) product.
    pub fn hadamard(&self, other: &Matrix) -> Result<Matrix> {
        self.zip_with(other, "hadamard", |a, b| a * b)
    }

    /// Matrix product of an `m x k` and a `k x n` matrix.
    ///
    /// Each entry is accumulated left to right over `k` in plain `f64`.
    ///
    /// # Errors
    /// `DimensionMismatch` when `self.cols() != other.rows()`.
    pub fn multiply(&self, other: &Matrix) -> Result<Matrix> {
        if self.cols != other.rows {
            return Err(MatrixError::DimensionMismatch {
                op: "multiply",
                left: self.shape(),
                right: other.shape(),
            });
        }

        let mut result = Matrix::zeros(self.rows, other.cols);
        for i in 0..self.rows {
            for j in 0..other.cols {
                let mut sum = 0.0;
                for k in 0..self.cols {
                    sum += self.data[i * self.cols + k] * other.data[k * other.cols + j];
                }
                result.data[i * other.cols + j] = sum;
            }
        }

        Ok(result)
    }

    pub fn scale(&self, factor: f64) -> Matrix {
        let data = self.data.iter().map(|&x| x * factor).collect();
        Matrix {
            rows: self.rows,
            cols: self.cols,
            data,
        }
    }

    /// Scales by `1 / factor`.
    ///
    /// # Errors
    /// `InvalidArgument` when `factor` is exactly zero.
    pub fn divide(&self, factor: f64) -> Result<Matrix> {
        if factor == 0.0 {
            return Err(MatrixError::InvalidArgument("division by zero".to_string()));
        }
        Ok(self.scale(1.0 / factor))
    }

    // In-place variants replace the receiver only once the result exists,
    // so a failed call leaves it untouched
    pub fn add_in_place(&mut self, other: &Matrix) -> Result<()> {
        *self = self.add(other)?;
        Ok(())
    }

    pub fn subtract_in_place(&mut self, other: &Matrix) -> Result<()> {
        *self = self.subtract(other)?;
        Ok(())
    }

    pub fn scale_in_place(&mut self, factor: f64) {
        self.data.iter_mut().for_each(|x| *x *= factor);
    }

    // Transpose - flip rows and cols
    pub fn transpose(&self) -> Matrix {
        let mut transposed = Matrix::zeros(self.cols, self.rows);

        for i in 0..self.rows {
            for j in 0..self.cols {
                transposed.data[j * self.rows + i] = self.data[i * self.cols + j];
            }
        }

        transposed
    }

    // Apply the function to every element
    pub fn apply<F>(&self, func: F) -> Matrix
    where
        F: Fn(f64) -> f64,
    {
        let data = self.data.iter().map(|&x| func(x)).collect();
        Matrix {
            rows: self.rows,
            cols: self.cols,
            data,
        }
    }

    /// Fills every element with an independent draw from `U[min, max)`
    /// using the calling thread's entropy-seeded generator.
    pub fn randomize(&mut self, min: f64, max: f64) -> Result<()> {
        self.randomize_with(min, max, &mut rand::thread_rng())
    }

    /// Same as [`Matrix::randomize`] with a caller-supplied generator.
    ///
    /// # Errors
    /// `InvalidArgument` unless both bounds are finite, `min < max`, and
    /// the width of the range is itself finite.
    pub fn randomize_with<R: Rng + ?Sized>(&mut self, min: f64, max: f64, rng: &mut R) -> Result<()> {
        if !min.is_finite() || !max.is_finite() || min >= max || !(max - min).is_finite() {
            return Err(MatrixError::InvalidArgument(format!(
                "uniform range [{}, {}) is empty or not finite",
                min, max
            )));
        }

        let uniform = Uniform::new(min, max);
        for x in self.data.iter_mut() {
            *x = uniform.sample(rng);
        }
        Ok(())
    }

    pub fn xavier_init(&mut self) -> Result<()> {
        self.xavier_init_with(&mut rand::thread_rng())
    }

    /// Uniform fill over `[-limit, limit)` with `limit = sqrt(6 / (rows + cols))`.
    ///
    /// # Errors
    /// `InvalidArgument` for a 0x0 matrix.
    pub fn xavier_init_with<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<()> {
        let fan = self.rows + self.cols;
        if fan == 0 {
            return Err(MatrixError::InvalidArgument(
                "xavier init needs rows + cols > 0".to_string(),
            ));
        }

        let limit = (6.0 / fan as f64).sqrt();
        debug!("xavier init {}x{} limit={}", self.rows, self.cols, limit);
        self.randomize_with(-limit, limit, rng)
    }

    pub fn he_init(&mut self) -> Result<()> {
        self.he_init_with(&mut rand::thread_rng())
    }

    /// Normal fill with mean 0 and standard deviation `sqrt(2 / rows)`.
    ///
    /// # Errors
    /// `InvalidArgument` when the matrix has no rows.
    pub fn he_init_with<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<()> {
        if self.rows == 0 {
            return Err(MatrixError::InvalidArgument("he init needs rows > 0".to_string()));
        }

        let std_dev = (2.0 / self.rows as f64).sqrt();
        let normal = Normal::new(0.0, std_dev)
            .map_err(|e| MatrixError::InvalidArgument(e.to_string()))?;
        debug!("he init {}x{} std_dev={}", self.rows, self.cols, std_dev);

        for x in self.data.iter_mut() {
            *x = normal.sample(rng);
        }
        Ok(())
    }

    pub fn fill(&mut self, value: f64) {
        self.data.iter_mut().for_each(|x| *x = value);
    }

    /// Turns a square matrix into the identity in place.
    ///
    /// # Errors
    /// `InvalidArgument` when the matrix is not square.
    pub fn identity(&mut self) -> Result<()> {
        if self.rows != self.cols {
            return Err(MatrixError::InvalidArgument(format!(
                "identity needs a square matrix, got {}x{}",
                self.rows, self.cols
            )));
        }

        self.fill(0.0);
        for i in 0..self.rows {
            self.data[i * self.cols + i] = 1.0;
        }
        Ok(())
    }

    pub fn sum(&self) -> f64 {
        self.data.iter().sum()
    }

    // Return the flat index of the maximum value in the data
    pub fn argmax(&self) -> Option<usize> {
        self.data
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.total_cmp(b))
            .map(|(index, _)| index)
    }

    // Returns a slice for the row specified by row_index
    pub fn row_slice(&self, row_index: usize) -> Result<&[f64]> {
        if row_index >= self.rows {
            return Err(MatrixError::IndexOutOfBounds {
                row: row_index,
                col: 0,
                rows: self.rows,
                cols: self.cols,
            });
        }

        let start = row_index * self.cols;
        Ok(&self.data[start..start + self.cols])
    }

    pub fn get_row(&self, row: usize) -> Result<Vec<f64>> {
        self.row_slice(row).map(<[f64]>::to_vec)
    }

    /// Copies column `col` into a new `rows x 1` matrix.
    pub fn get_column(&self, col: usize) -> Result<Matrix> {
        if col >= self.cols {
            return Err(MatrixError::IndexOutOfBounds {
                row: 0,
                col,
                rows: self.rows,
                cols: self.cols,
            });
        }

        let data = (0..self.rows).map(|row| self.data[row * self.cols + col]).collect();
        Ok(Matrix::from_col(data))
    }

    /// Overwrites column `col` with the values of a `rows x 1` matrix.
    ///
    /// # Errors
    /// `IndexOutOfBounds` when `col >= cols`, `DimensionMismatch` when
    /// `source` is not exactly `rows x 1`.
    pub fn set_column(&mut self, col: usize, source: &Matrix) -> Result<()> {
        if col >= self.cols {
            return Err(MatrixError::IndexOutOfBounds {
                row: 0,
                col,
                rows: self.rows,
                cols: self.cols,
            });
        }
        if source.shape() != (self.rows, 1) {
            return Err(MatrixError::DimensionMismatch {
                op: "set_column",
                left: (self.rows, 1),
                right: source.shape(),
            });
        }

        for (row, &value) in source.data.iter().enumerate() {
            self.data[row * self.cols + col] = value;
        }
        Ok(())
    }

    /// Broadcasts a single-column matrix across `target_cols` columns.
    pub fn repeat_columns(&self, target_cols: usize) -> Result<Matrix> {
        if self.cols != 1 {
            return Err(MatrixError::DimensionMismatch {
                op: "repeat_columns",
                left: self.shape(),
                right: (self.rows, 1),
            });
        }

        let mut repeated_data = Vec::with_capacity(self.rows * target_cols);
        for &value in &self.data {
            repeated_data.extend(std::iter::repeat(value).take(target_cols));
        }

        Ok(Matrix {
            rows: self.rows,
            cols: target_cols,
            data: repeated_data,
        })
    }

    /// Row-wise softmax. A row whose exponent sum collapses to zero is
    /// replaced by the uniform distribution.
    pub fn softmax_rows(&self) -> Matrix {
        let epsilon = 1e-9;
        let mut data = Vec::with_capacity(self.data.len());

        for row in self.rows_iter() {
            if row.is_empty() {
                continue;
            }
            let max_row = row.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            let exp_row: Vec<f64> = row.iter().map(|&x| (x - max_row).exp()).collect();
            let sum_exp = exp_row.iter().sum::<f64>();

            if sum_exp.abs() < epsilon || !sum_exp.is_finite() {
                warn!("softmax encountered a degenerate exponent sum ({})", sum_exp);
                data.extend(row.iter().map(|_| 1.0 / self.cols as f64));
            } else {
                data.extend(exp_row.iter().map(|&x| x / sum_exp));
            }
        }

        Matrix {
            rows: self.rows,
            cols: self.cols,
            data,
        }
    }

    /// Destructive reshape: drops all contents and reallocates a zeroed
    /// `new_rows x new_cols` store.
    ///
    /// # Errors
    /// `InvalidArgument` when `new_rows * new_cols` overflows; the matrix
    /// is left unchanged.
    pub fn resize(&mut self, new_rows: usize, new_cols: usize) -> Result<()> {
        let len = Self::element_count(new_rows, new_cols)?;
        self.rows = new_rows;
        self.cols = new_cols;
        self.data = vec![0.0; len];
        Ok(())
    }

    /// Fixed-width text form: one bracketed line per row, each value
    /// right-aligned in 10 columns with 6 fractional digits.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for row in self.rows_iter() {
            let cells: Vec<String> = row.iter().map(|x| format!("{:10.6}", x)).collect();
            out.push('[');
            out.push_str(&cells.join(" "));
            out.push_str("]\n");
        }
        out
    }

    // Write the rendering followed by a blank line
    pub fn write_to<W: Write>(&self, out: &mut W) -> io::Result<()> {
        writeln!(out, "{}", self.render())
    }

    pub fn print(&self) -> io::Result<()> {
        self.write_to(&mut io::stdout().lock())
    }
}

impl fmt::Display for Matrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Matrix({}x{})", self.rows, self.cols)
    }
}

// Scalar multiplication
impl Mul<f64> for Matrix {
    type Output = Matrix;

    fn mul(mut self, scalar: f64) -> Matrix {
        self.scale_in_place(scalar);
        self
    }
}

impl<'a> Mul<f64> for &'a Matrix {
    type Output = Matrix;

    fn mul(self, scalar: f64) -> Matrix {
        self.scale(scalar)
    }
}

impl<'a> Mul<&'a Matrix> for f64 {
    type Output = Matrix;

    fn mul(self, matrix: &'a Matrix) -> Matrix {
        matrix.scale(self)
    }
}

// Scalar multiplication assign (*=)
impl MulAssign<f64> for Matrix {
    fn mul_assign(&mut self, scalar: f64) {
        self.scale_in_place(scalar);
    }
}

// Shape-checked operators yield a Result, so `(&a + &b)?` reads like
// the named methods. Only borrowed operands: an owned `Add` impl would
// shadow the inherent `add(&self, ..)` wherever `std::ops::Add` is imported.
impl<'a, 'b> Add<&'b Matrix> for &'a Matrix {
    type Output = Result<Matrix>;

    fn add(self, rhs: &'b Matrix) -> Result<Matrix> {
        Matrix::add(self, rhs)
    }
}

impl<'a, 'b> Sub<&'b Matrix> for &'a Matrix {
    type Output = Result<Matrix>;

    fn sub(self, rhs: &'b Matrix) -> Result<Matrix> {
        self.subtract(rhs)
    }
}

impl Div<f64> for Matrix {
    type Output = Result<Matrix>;

    fn div(self, scalar: f64) -> Result<Matrix> {
        self.divide(scalar)
    }
}

impl<'a> Div<f64> for &'a Matrix {
    type Output = Result<Matrix>;

    fn div(self, scalar: f64) -> Result<Matrix> {
        self.divide(scalar)
    }
}
