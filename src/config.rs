use serde::Deserialize;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use log::warn;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::from_reader;
use thiserror::Error;

use crate::activation_functions::{get_activation_function, ActivationFunction};
use crate::error::MatrixError;
use crate::layer::{InitType, Layer};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not parse config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error(transparent)]
    Matrix(#[from] MatrixError),
}

#[derive(Debug, Deserialize, Clone)]
pub struct NetworkConfig {
    pub layers: Vec<LayerConfig>,

    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,

    #[serde(default = "default_epochs")]
    pub epochs: usize,

    // absent: entropy-seeded generator
    #[serde(default)]
    pub seed: Option<u64>,

    // directory holding the MNIST IDX files; absent or missing files
    // fall back to a synthetic batch
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LayerConfig {
    pub input_size: usize,
    pub output_size: usize,

    #[serde(default = "default_activation")]
    pub activation: String,
    pub activation_alpha: Option<f64>,

    #[serde(default)]
    pub init: InitType,
}

fn default_learning_rate() -> f64 {
    0.01
}

fn default_epochs() -> usize {
    100
}

fn default_activation() -> String {
    "relu".to_string()
}

impl LayerConfig {
    pub fn activation_function(&self) -> Result<ActivationFunction, ConfigError> {
        get_activation_function(&self.activation, self.activation_alpha)
            .map_err(|_| ConfigError::Invalid(format!("unknown activation '{}'", self.activation)))
    }
}

impl NetworkConfig {
    // get config from the json file
    pub fn from_json<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let config: NetworkConfig = from_reader(reader)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_str_json(text: &str) -> Result<Self, ConfigError> {
        let config: NetworkConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.layers.is_empty() {
            return Err(ConfigError::Invalid("no layers defined".to_string()));
        }
        if !self.learning_rate.is_finite() || self.learning_rate <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "learning rate must be positive, got {}",
                self.learning_rate
            )));
        }

        for (i, layer) in self.layers.iter().enumerate() {
            if layer.input_size == 0 || layer.output_size == 0 {
                return Err(ConfigError::Invalid(format!("layer {} has a zero size", i)));
            }
            layer.activation_function()?;
        }

        for (i, pair) in self.layers.windows(2).enumerate() {
            if pair[0].output_size != pair[1].input_size {
                return Err(ConfigError::Invalid(format!(
                    "layer {} outputs {} values but layer {} expects {}",
                    i,
                    pair[0].output_size,
                    i + 1,
                    pair[1].input_size
                )));
            }
        }

        Ok(())
    }

    pub fn rng(&self) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => {
                warn!("no seed configured, weights will not be reproducible");
                StdRng::from_entropy()
            }
        }
    }

    /// Builds every configured layer, drawing initial weights from `rng`.
    pub fn build_layers(&self, rng: &mut StdRng) -> Result<Vec<Layer>, ConfigError> {
        self.layers
            .iter()
            .map(|layer| -> Result<Layer, ConfigError> {
                Ok(Layer::new(
                    layer.input_size,
                    layer.output_size,
                    layer.activation_function()?,
                    layer.init,
                    &mut *rng,
                )?)
            })
            .collect()
    }
}
