use std::fmt;

use crate::error::{MatrixError, Result};
use crate::matrix::Matrix;

const DEFAULT_LEAKY_ALPHA: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ActivationFunction {
    Identity,
    Sigmoid,
    ReLU,
    LeakyReLU(f64), // Alpha value for Leaky ReLU
    Tanh,
    Softmax, // Applied per column, not per element
}

impl fmt::Display for ActivationFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActivationFunction::Identity => write!(f, "Identity"),
            ActivationFunction::Sigmoid => write!(f, "Sigmoid"),
            ActivationFunction::ReLU => write!(f, "ReLU"),
            ActivationFunction::LeakyReLU(alpha) => write!(f, "LeakyReLU(α = {:.2})", alpha),
            ActivationFunction::Tanh => write!(f, "Tanh"),
            ActivationFunction::Softmax => write!(f, "Softmax"),
        }
    }
}

/// Resolves an activation by its case-insensitive name.
pub fn get_activation_function(name: &str, alpha: Option<f64>) -> Result<ActivationFunction> {
    match name.to_lowercase().as_str() {
        "identity" | "none" => Ok(ActivationFunction::Identity),
        "sigmoid" => Ok(ActivationFunction::Sigmoid),
        "relu" => Ok(ActivationFunction::ReLU),
        "leaky_relu" => Ok(ActivationFunction::LeakyReLU(alpha.unwrap_or(DEFAULT_LEAKY_ALPHA))),
        "tanh" => Ok(ActivationFunction::Tanh),
        "softmax" => Ok(ActivationFunction::Softmax),
        _ => Err(MatrixError::InvalidArgument(format!(
            "unknown activation function: {}",
            name
        ))),
    }
}

impl ActivationFunction {
    pub fn activate(&self, x: &Matrix) -> Matrix {
        match *self {
            ActivationFunction::Identity => x.clone(),
            ActivationFunction::Sigmoid => x.apply(sigmoid),
            ActivationFunction::ReLU => x.apply(relu),
            ActivationFunction::LeakyReLU(alpha) => x.apply(|v| leaky_relu(v, alpha)),
            ActivationFunction::Tanh => x.apply(tanh),
            // each column is one sample
            ActivationFunction::Softmax => x.transpose().softmax_rows().transpose(),
        }
    }

    /// Element-wise derivative evaluated at `x`.
    ///
    /// Softmax has no element-wise derivative here; its gradient is
    /// expected to be combined with the loss by the caller.
    pub fn derivative(&self, x: &Matrix) -> Result<Matrix> {
        match *self {
            ActivationFunction::Identity => Ok(Matrix::filled(x.rows(), x.cols(), 1.0)),
            ActivationFunction::Sigmoid => Ok(x.apply(sigmoid_derivative)),
            ActivationFunction::ReLU => Ok(x.apply(relu_derivative)),
            ActivationFunction::LeakyReLU(alpha) => Ok(x.apply(|v| leaky_relu_derivative(v, alpha))),
            ActivationFunction::Tanh => Ok(x.apply(tanh_derivative)),
            ActivationFunction::Softmax => Err(MatrixError::InvalidArgument(
                "softmax derivative must be handled with the loss".to_string(),
            )),
        }
    }
}

pub fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

pub fn sigmoid_derivative(x: f64) -> f64 {
    let s = sigmoid(x);
    s * (1.0 - s)
}

pub fn relu(x: f64) -> f64 {
    if x > 0.0 { x } else { 0.0 }
}

pub fn relu_derivative(x: f64) -> f64 {
    if x > 0.0 { 1.0 } else { 0.0 }
}

pub fn leaky_relu(x: f64, alpha: f64) -> f64 {
    if x > 0.0 { x } else { alpha * x }
}

pub fn leaky_relu_derivative(x: f64, alpha: f64) -> f64 {
    if x > 0.0 { 1.0 } else { alpha }
}

pub fn tanh(x: f64) -> f64 {
    x.tanh()
}

pub fn tanh_derivative(x: f64) -> f64 {
    1.0 - x.tanh().powi(2)
}
