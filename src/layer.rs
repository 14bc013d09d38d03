// module Layer

use log::debug;
use rand::Rng;
use serde::Deserialize;

use crate::activation_functions::ActivationFunction;
use crate::error::{MatrixError, Result};
use crate::matrix::Matrix;

/// Weight initialization strategy for a [`Layer`].
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum InitType {
    None,
    Random,
    #[default]
    Xavier,
    He,
}

/// Fully connected layer. Inputs are laid out one sample per column,
/// so `forward` takes an `input_size x batch` matrix.
#[derive(Debug, Clone)]
pub struct Layer {
    input_size: usize,
    output_size: usize,
    weights: Matrix, // output_size x input_size
    biases: Matrix,  // output_size x 1
    input: Option<Matrix>,
    z: Matrix,
    output: Matrix,
    activation: ActivationFunction,
}

impl Layer {
    pub fn new<R: Rng + ?Sized>(
        input_size: usize,
        output_size: usize,
        activation: ActivationFunction,
        init: InitType,
        rng: &mut R,
    ) -> Result<Self> {
        if input_size == 0 || output_size == 0 {
            return Err(MatrixError::InvalidArgument(format!(
                "layer sizes must be non-zero, got {} -> {}",
                input_size, output_size
            )));
        }

        let mut weights = Matrix::zeros(output_size, input_size);
        match init {
            InitType::None => weights.fill(0.0),
            InitType::Random => weights.randomize_with(-1.0, 1.0, rng)?,
            InitType::Xavier => weights.xavier_init_with(rng)?,
            InitType::He => weights.he_init_with(rng)?,
        }
        debug!(
            "layer {} -> {} ({}, {:?} init)",
            input_size, output_size, activation, init
        );

        Ok(Self {
            input_size,
            output_size,
            weights,
            biases: Matrix::zeros(output_size, 1),
            input: None,
            z: Matrix::default(),
            output: Matrix::default(),
            activation,
        })
    }

    pub fn input_size(&self) -> usize {
        self.input_size
    }

    pub fn output_size(&self) -> usize {
        self.output_size
    }

    pub fn activation(&self) -> ActivationFunction {
        self.activation
    }

    pub fn weights(&self) -> &Matrix {
        &self.weights
    }

    pub fn biases(&self) -> &Matrix {
        &self.biases
    }

    pub fn output(&self) -> &Matrix {
        &self.output
    }

    pub fn z(&self) -> &Matrix {
        &self.z
    }

    /// Computes `activation(W·x + b)`, broadcasting the bias over the
    /// batch columns, and caches what `backward` needs.
    pub fn forward(&mut self, x: &Matrix) -> Result<Matrix> {
        if x.rows() != self.input_size {
            return Err(MatrixError::DimensionMismatch {
                op: "layer forward",
                left: self.weights.shape(),
                right: x.shape(),
            });
        }

        let bias = self.biases.repeat_columns(x.cols())?;
        let z = self.weights.multiply(x)?.add(&bias)?;
        let output = self.activation.activate(&z);

        self.input = Some(x.clone());
        self.z = z;
        self.output = output.clone();
        Ok(output)
    }

    /// Backpropagates `d_a` (gradient w.r.t. this layer's output), applies
    /// a gradient-descent step and returns the gradient w.r.t. the input.
    ///
    /// For softmax layers `d_a` is taken to already be the gradient
    /// w.r.t. `z` (e.g. `prediction - target` under cross-entropy).
    pub fn backward(&mut self, d_a: &Matrix, learning_rate: f64) -> Result<Matrix> {
        let input = self.input.as_ref().ok_or_else(|| {
            MatrixError::InvalidArgument("backward called before forward".to_string())
        })?;

        let d_z = match self.activation {
            ActivationFunction::Softmax => {
                if d_a.shape() != self.z.shape() {
                    return Err(MatrixError::DimensionMismatch {
                        op: "layer backward",
                        left: self.z.shape(),
                        right: d_a.shape(),
                    });
                }
                d_a.clone()
            }
            activation => d_a.hadamard(&activation.derivative(&self.z)?)?,
        };

        let d_w = d_z.multiply(&input.transpose())?;
        let d_b = d_z.multiply(&Matrix::filled(d_z.cols(), 1, 1.0))?;
        let d_input = self.weights.transpose().multiply(&d_z)?;

        self.weights.subtract_in_place(&(&d_w * learning_rate))?;
        self.biases.subtract_in_place(&(&d_b * learning_rate))?;

        Ok(d_input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(11)
    }

    #[test]
    fn shapes_and_zero_bias() {
        let layer = Layer::new(4, 3, ActivationFunction::ReLU, InitType::He, &mut rng()).unwrap();
        assert_eq!(layer.weights().shape(), (3, 4));
        assert_eq!(layer.biases(), &Matrix::zeros(3, 1));
        assert!(layer.weights().as_slice().iter().any(|&w| w != 0.0));
    }

    #[test]
    fn zero_sizes_rejected() {
        assert!(Layer::new(0, 3, ActivationFunction::ReLU, InitType::Xavier, &mut rng()).is_err());
        assert!(Layer::new(3, 0, ActivationFunction::ReLU, InitType::Xavier, &mut rng()).is_err());
    }

    #[test]
    fn none_init_gives_zero_weights() {
        let mut layer =
            Layer::new(2, 2, ActivationFunction::Identity, InitType::None, &mut rng()).unwrap();
        let out = layer.forward(&Matrix::from_col(vec![3.0, -1.0])).unwrap();
        assert_eq!(out, Matrix::zeros(2, 1));
    }

    #[test]
    fn forward_handles_batches() {
        let mut layer =
            Layer::new(3, 2, ActivationFunction::Sigmoid, InitType::Xavier, &mut rng()).unwrap();
        let x = Matrix::new(3, 5, (0..15).map(|v| v as f64 / 10.0).collect()).unwrap();
        let out = layer.forward(&x).unwrap();
        assert_eq!(out.shape(), (2, 5));
        assert!(out.as_slice().iter().all(|&v| v > 0.0 && v < 1.0));
        assert_eq!(layer.z().shape(), (2, 5));
        assert_eq!(layer.output(), &out);
    }

    #[test]
    fn forward_rejects_wrong_input() {
        let mut layer =
            Layer::new(3, 2, ActivationFunction::ReLU, InitType::Xavier, &mut rng()).unwrap();
        assert!(matches!(
            layer.forward(&Matrix::zeros(2, 1)),
            Err(MatrixError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn backward_before_forward_fails() {
        let mut layer =
            Layer::new(3, 2, ActivationFunction::ReLU, InitType::Xavier, &mut rng()).unwrap();
        assert!(matches!(
            layer.backward(&Matrix::zeros(2, 1), 0.1),
            Err(MatrixError::InvalidArgument(_))
        ));
    }

    #[test]
    fn backward_matches_hand_computed_step() {
        let mut layer =
            Layer::new(2, 1, ActivationFunction::Identity, InitType::None, &mut rng()).unwrap();
        // W = [[0, 0]], b = [0]; x = [1, 2]^T, dA = [1]
        layer.forward(&Matrix::from_col(vec![1.0, 2.0])).unwrap();
        let d_input = layer.backward(&Matrix::from_col(vec![1.0]), 0.5).unwrap();

        // gradient w.r.t. input uses the weights before the update
        assert_eq!(d_input, Matrix::zeros(2, 1));
        assert_eq!(layer.weights().as_slice(), &[-0.5, -1.0]);
        assert_eq!(layer.biases().as_slice(), &[-0.5]);
    }

    #[test]
    fn training_reduces_squared_error() {
        let mut layer =
            Layer::new(2, 1, ActivationFunction::Identity, InitType::Random, &mut rng()).unwrap();
        let x = Matrix::new(2, 4, vec![0.0, 1.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0]).unwrap();
        // y = x0 + 2 * x1
        let y = Matrix::from_row(vec![0.0, 1.0, 2.0, 3.0]);

        let loss = |pred: &Matrix| -> f64 { pred.subtract(&y).unwrap().apply(|d| d * d).sum() };

        let initial = loss(&layer.forward(&x).unwrap());
        for _ in 0..200 {
            let pred = layer.forward(&x).unwrap();
            let grad = pred.subtract(&y).unwrap().scale(2.0 / 4.0);
            layer.backward(&grad, 0.1).unwrap();
        }
        let trained = loss(&layer.forward(&x).unwrap());
        assert!(trained < initial * 0.01, "loss {} -> {}", initial, trained);
    }

    #[test]
    fn softmax_layer_takes_gradient_as_is() {
        let mut layer =
            Layer::new(2, 3, ActivationFunction::Softmax, InitType::Xavier, &mut rng()).unwrap();
        let out = layer.forward(&Matrix::from_col(vec![0.5, -0.5])).unwrap();
        assert!((out.sum() - 1.0).abs() < 1e-12);

        let target = Matrix::from_col(vec![0.0, 1.0, 0.0]);
        let grad = out.subtract(&target).unwrap();
        assert_eq!(layer.backward(&grad, 0.1).unwrap().shape(), (2, 1));
        assert!(layer.backward(&Matrix::zeros(2, 1), 0.1).is_err());
    }
}
