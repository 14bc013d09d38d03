//! Dense 2-D `f64` matrices with checked arithmetic, element-wise
//! transforms, Xavier/He initializers, and a small fully connected
//! layer built on top of them, plus an MNIST IDX loader for feeding it.

pub mod activation_functions;
pub mod config;
pub mod data_loader;
pub mod error;
pub mod layer;
pub mod matrix;

pub use error::{MatrixError, Result};
pub use matrix::Matrix;
