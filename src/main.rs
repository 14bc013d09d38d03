use std::env;
use std::error::Error;
use std::path::Path;
use std::process;

use log::{error, info, warn};
use rand::rngs::StdRng;

use neural_matrix::activation_functions::ActivationFunction;
use neural_matrix::config::NetworkConfig;
use neural_matrix::data_loader::{self, DataLoader, MnistDataset, TEST_IMAGES, TEST_LABELS, TRAIN_IMAGES, TRAIN_LABELS};
use neural_matrix::layer::Layer;
use neural_matrix::{Matrix, Result};

static DEFAULT_CONFIG: &str = "./data/network.json";
const BATCH_SIZE: usize = 32;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config_location = env::args().nth(1).unwrap_or_else(|| DEFAULT_CONFIG.to_string());
    if let Err(e) = run(&config_location) {
        error!("{}", e);
        process::exit(1);
    }
}

fn run(config_location: &str) -> std::result::Result<(), Box<dyn Error>> {
    let config = NetworkConfig::from_json(config_location)?;
    let mut rng = config.rng();
    let mut layers = config.build_layers(&mut rng)?;

    let input_size = layers[0].input_size();
    let num_classes = layers[layers.len() - 1].output_size();
    let classify = layers[layers.len() - 1].activation() == ActivationFunction::Softmax;
    info!(
        "{} layers, {} -> {}, lr={}, epochs={}",
        layers.len(),
        input_size,
        num_classes,
        config.learning_rate,
        config.epochs
    );

    let mnist = match &config.data_dir {
        Some(dir) => load_mnist(dir, input_size, num_classes)?,
        None => None,
    };

    let prediction = match mnist {
        Some((train, test)) => {
            for epoch in 0..config.epochs {
                let mut total_loss = 0.0;
                let mut steps = 0;
                for batch in batches(&train) {
                    let (inputs, targets) = batch?;
                    total_loss += step(&mut layers, &inputs, &targets, config.learning_rate, classify)?;
                    steps += 1;
                }
                info!("epoch {:>4}: mean loss {:.6}", epoch, total_loss / steps.max(1) as f64);
            }

            let eval = test.as_ref().unwrap_or(&train);
            let mut correct = 0;
            for batch in batches(eval) {
                let (inputs, targets) = batch?;
                correct += count_correct(&forward(&mut layers, &inputs)?, &targets)?;
            }
            info!(
                "accuracy {:.2}% on {} samples",
                correct as f64 / eval.num_samples() as f64 * 100.0,
                eval.num_samples()
            );
            forward(&mut layers, &eval.batch(0, 1)?.0)?
        }
        None => {
            let (inputs, targets) = synthetic_batch(input_size, num_classes, &mut rng)?;
            for epoch in 0..config.epochs {
                let loss = step(&mut layers, &inputs, &targets, config.learning_rate, classify)?;
                if epoch % 10 == 0 || epoch + 1 == config.epochs {
                    info!("epoch {:>4}: loss {:.6}", epoch, loss);
                }
            }

            let prediction = forward(&mut layers, &inputs)?;
            let correct = count_correct(&prediction, &targets)?;
            info!("accuracy {:.2}%", correct as f64 / BATCH_SIZE as f64 * 100.0);
            prediction
        }
    };

    info!("first sample of {}:", prediction);
    prediction.get_column(0)?.transpose().print()?;

    Ok(())
}

// Training set plus the test set when it is present. `None` when the
// training files are missing so the caller can fall back to synthetic data
fn load_mnist(
    dir: &Path,
    input_size: usize,
    num_classes: usize,
) -> std::result::Result<Option<(MnistDataset, Option<MnistDataset>)>, Box<dyn Error>> {
    if !dir.join(TRAIN_IMAGES).exists() || !dir.join(TRAIN_LABELS).exists() {
        warn!("no MNIST training files in {}, using a synthetic batch", dir.display());
        return Ok(None);
    }

    let loader = DataLoader::default();
    let train = loader.load_training_data(dir)?;
    train.log_info();
    if train.images.rows() != input_size || train.num_classes != num_classes {
        return Err(format!(
            "network maps {} -> {} but the data has {} pixels and {} classes",
            input_size,
            num_classes,
            train.images.rows(),
            train.num_classes
        )
        .into());
    }

    let test = if dir.join(TEST_IMAGES).exists() && dir.join(TEST_LABELS).exists() {
        Some(loader.load_test_data(dir)?)
    } else {
        None
    };

    Ok(Some((train, test)))
}

fn batches(data: &MnistDataset) -> impl Iterator<Item = data_loader::Result<(Matrix, Matrix)>> + '_ {
    (0..data.num_samples())
        .step_by(BATCH_SIZE)
        .map(move |start| data.batch(start, start + BATCH_SIZE))
}

// Random inputs in [0, 1); the label is the index of the largest of the
// first `num_classes` features
fn synthetic_batch(
    input_size: usize,
    num_classes: usize,
    rng: &mut StdRng,
) -> Result<(Matrix, Matrix)> {
    let mut inputs = Matrix::zeros(input_size, BATCH_SIZE);
    inputs.randomize_with(0.0, 1.0, rng)?;

    let mut targets = Matrix::zeros(num_classes, BATCH_SIZE);
    for sample in 0..BATCH_SIZE {
        let features = inputs.get_column(sample)?;
        let visible = &features.as_slice()[..num_classes.min(input_size)];
        let label = Matrix::from_row(visible.to_vec()).argmax().unwrap_or(0);

        let mut one_hot = Matrix::zeros(num_classes, 1);
        *one_hot.at_mut(label, 0)? = 1.0;
        targets.set_column(sample, &one_hot)?;
    }

    Ok((inputs, targets))
}

fn forward(layers: &mut [Layer], inputs: &Matrix) -> Result<Matrix> {
    let mut activations = inputs.clone();
    for layer in layers.iter_mut() {
        activations = layer.forward(&activations)?;
    }
    Ok(activations)
}

// One forward/backward pass over a batch; returns the loss before the update
fn step(layers: &mut [Layer], inputs: &Matrix, targets: &Matrix, learning_rate: f64, classify: bool) -> Result<f64> {
    let prediction = forward(layers, inputs)?;
    let (loss, grad) = loss_and_gradient(&prediction, targets, classify)?;

    let mut d_a = grad;
    for layer in layers.iter_mut().rev() {
        d_a = layer.backward(&d_a, learning_rate)?;
    }
    Ok(loss)
}

// Cross-entropy for softmax outputs, mean squared error otherwise
fn loss_and_gradient(prediction: &Matrix, targets: &Matrix, classify: bool) -> Result<(f64, Matrix)> {
    let batch = prediction.cols() as f64;
    let diff = (prediction - targets)?;

    if classify {
        let log_pred = prediction.apply(|p| (p + 1e-12).ln());
        let loss = -targets.hadamard(&log_pred)?.sum() / batch;
        Ok((loss, (diff / batch)?))
    } else {
        let loss = diff.hadamard(&diff)?.sum() / batch;
        Ok((loss, diff * (2.0 / batch)))
    }
}

fn count_correct(prediction: &Matrix, targets: &Matrix) -> Result<usize> {
    let mut correct = 0;
    for sample in 0..prediction.cols() {
        if prediction.get_column(sample)?.argmax() == targets.get_column(sample)?.argmax() {
            correct += 1;
        }
    }
    Ok(correct)
}
