//! MNIST IDX loader.
//!
//! Reads the big-endian IDX image (`idx3`, magic 2051) and label (`idx1`,
//! magic 2049) files into matrices laid out one sample per column, the
//! layout [`crate::layer::Layer::forward`] expects.

use std::fs;
use std::path::Path;

use log::info;
use thiserror::Error;

use crate::error::MatrixError;
use crate::matrix::Matrix;

const IMAGE_MAGIC: u32 = 2051;
const LABEL_MAGIC: u32 = 2049;
const MNIST_CLASSES: usize = 10;

pub const TRAIN_IMAGES: &str = "train-images.idx3-ubyte";
pub const TRAIN_LABELS: &str = "train-labels.idx1-ubyte";
pub const TEST_IMAGES: &str = "t10k-images.idx3-ubyte";
pub const TEST_LABELS: &str = "t10k-labels.idx1-ubyte";

#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("could not read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid magic number {found} (expected {expected})")]
    BadMagic { expected: u32, found: u32 },

    #[error("file truncated: header promises {expected} bytes, found {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("{images} images but {labels} labels")]
    CountMismatch { images: usize, labels: usize },

    #[error("label {label} of sample {index} is not below {num_classes}")]
    LabelOutOfRange {
        index: usize,
        label: u8,
        num_classes: usize,
    },

    #[error(transparent)]
    Matrix(#[from] MatrixError),
}

pub type Result<T> = std::result::Result<T, LoaderError>;

/// Raw pixels of an IDX image file, image after image, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct IdxImages {
    pub count: usize,
    pub rows: usize,
    pub cols: usize,
    pub pixels: Vec<u8>,
}

fn read_u32(bytes: &[u8], offset: usize) -> Result<u32> {
    bytes
        .get(offset..offset + 4)
        .map(|word| u32::from_be_bytes([word[0], word[1], word[2], word[3]]))
        .ok_or(LoaderError::Truncated {
            expected: offset + 4,
            actual: bytes.len(),
        })
}

fn check_magic(found: u32, expected: u32) -> Result<()> {
    if found != expected {
        return Err(LoaderError::BadMagic { expected, found });
    }
    Ok(())
}

fn body(bytes: &[u8], header: usize, count: Option<usize>) -> Result<&[u8]> {
    let expected = count
        .and_then(|len| len.checked_add(header))
        .unwrap_or(usize::MAX);
    if bytes.len() < expected {
        return Err(LoaderError::Truncated {
            expected,
            actual: bytes.len(),
        });
    }
    Ok(&bytes[header..expected])
}

pub fn parse_idx_images(bytes: &[u8]) -> Result<IdxImages> {
    check_magic(read_u32(bytes, 0)?, IMAGE_MAGIC)?;
    let count = read_u32(bytes, 4)? as usize;
    let rows = read_u32(bytes, 8)? as usize;
    let cols = read_u32(bytes, 12)? as usize;

    let len = rows.checked_mul(cols).and_then(|px| px.checked_mul(count));
    let pixels = body(bytes, 16, len)?.to_vec();

    Ok(IdxImages {
        count,
        rows,
        cols,
        pixels,
    })
}

pub fn parse_idx_labels(bytes: &[u8]) -> Result<Vec<u8>> {
    check_magic(read_u32(bytes, 0)?, LABEL_MAGIC)?;
    let count = read_u32(bytes, 4)? as usize;
    Ok(body(bytes, 8, Some(count))?.to_vec())
}

/// A loaded dataset. `images` is `pixels x samples`; `labels` is
/// `num_classes x samples` when one-hot encoded, `1 x samples` otherwise.
#[derive(Debug, Clone)]
pub struct MnistDataset {
    pub images: Matrix,
    pub labels: Matrix,
    pub label_indices: Vec<usize>,
    pub image_width: usize,
    pub image_height: usize,
    pub num_classes: usize,
    pub mean_pixel_value: f64,
    pub std_pixel_value: f64,
}

impl MnistDataset {
    pub fn num_samples(&self) -> usize {
        self.label_indices.len()
    }

    /// Samples `start..end` as `(images, labels)`, still one per column.
    /// `end` is clamped to the dataset size.
    pub fn batch(&self, start: usize, end: usize) -> Result<(Matrix, Matrix)> {
        let end = end.min(self.num_samples());
        if start >= end {
            return Err(MatrixError::InvalidArgument(format!(
                "empty batch {}..{} of {} samples",
                start,
                end,
                self.num_samples()
            ))
            .into());
        }

        let mut images = Matrix::zeros(self.images.rows(), end - start);
        let mut labels = Matrix::zeros(self.labels.rows(), end - start);
        for (col, sample) in (start..end).enumerate() {
            images.set_column(col, &self.images.get_column(sample)?)?;
            labels.set_column(col, &self.labels.get_column(sample)?)?;
        }
        Ok((images, labels))
    }

    pub fn class_counts(&self) -> Vec<usize> {
        let mut counts = vec![0; self.num_classes];
        for &label in &self.label_indices {
            counts[label] += 1;
        }
        counts
    }

    pub fn log_info(&self) {
        info!(
            "{} samples, {}x{} images, {} classes",
            self.num_samples(),
            self.image_width,
            self.image_height,
            self.num_classes
        );
        info!(
            "pixel mean {:.4}, std {:.4}",
            self.mean_pixel_value, self.std_pixel_value
        );
        for (class, count) in self.class_counts().iter().enumerate() {
            info!("  class {}: {} samples", class, count);
        }
    }
}

#[derive(Debug, Clone)]
pub struct DataLoader {
    pub normalize: bool,
    pub one_hot: bool,
    pub num_classes: usize,
}

impl Default for DataLoader {
    fn default() -> Self {
        Self {
            normalize: true,
            one_hot: true,
            num_classes: MNIST_CLASSES,
        }
    }
}

impl DataLoader {
    pub fn load_training_data<P: AsRef<Path>>(&self, data_dir: P) -> Result<MnistDataset> {
        let dir = data_dir.as_ref();
        self.load_dataset(dir.join(TRAIN_IMAGES), dir.join(TRAIN_LABELS))
    }

    pub fn load_test_data<P: AsRef<Path>>(&self, data_dir: P) -> Result<MnistDataset> {
        let dir = data_dir.as_ref();
        self.load_dataset(dir.join(TEST_IMAGES), dir.join(TEST_LABELS))
    }

    pub fn load_dataset<P: AsRef<Path>>(&self, images_path: P, labels_path: P) -> Result<MnistDataset> {
        let read = |path: &Path| {
            fs::read(path).map_err(|source| LoaderError::Io {
                path: path.display().to_string(),
                source,
            })
        };

        info!(
            "loading images from {}, labels from {}",
            images_path.as_ref().display(),
            labels_path.as_ref().display()
        );
        let images = read(images_path.as_ref())?;
        let labels = read(labels_path.as_ref())?;
        self.load_bytes(&images, &labels)
    }

    /// Builds a dataset from the raw contents of an image and a label file.
    pub fn load_bytes(&self, image_bytes: &[u8], label_bytes: &[u8]) -> Result<MnistDataset> {
        let raw = parse_idx_images(image_bytes)?;
        let raw_labels = parse_idx_labels(label_bytes)?;
        if raw.count != raw_labels.len() {
            return Err(LoaderError::CountMismatch {
                images: raw.count,
                labels: raw_labels.len(),
            });
        }

        let scale = if self.normalize { 255.0 } else { 1.0 };
        let pixel_count = raw.rows * raw.cols;

        // IDX stores image after image; transposing gives one image per column
        let by_sample: Vec<f64> = raw.pixels.iter().map(|&p| f64::from(p) / scale).collect();
        let images = Matrix::new(raw.count, pixel_count, by_sample)?.transpose();

        let label_rows = if self.one_hot { self.num_classes } else { 1 };
        let mut labels = Matrix::zeros(label_rows, raw.count);
        let mut label_indices = Vec::with_capacity(raw.count);
        for (index, &label) in raw_labels.iter().enumerate() {
            let class = label as usize;
            if class >= self.num_classes {
                return Err(LoaderError::LabelOutOfRange {
                    index,
                    label,
                    num_classes: self.num_classes,
                });
            }
            if self.one_hot {
                *labels.at_mut(class, index)? = 1.0;
            } else {
                *labels.at_mut(0, index)? = f64::from(label);
            }
            label_indices.push(class);
        }

        let total = images.as_slice().len().max(1) as f64;
        let mean_pixel_value = images.sum() / total;
        let std_pixel_value = (images
            .apply(|p| (p - mean_pixel_value).powi(2))
            .sum()
            / total)
            .sqrt();

        Ok(MnistDataset {
            images,
            labels,
            label_indices,
            image_width: raw.cols,
            image_height: raw.rows,
            num_classes: self.num_classes,
            mean_pixel_value,
            std_pixel_value,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn idx_images(count: u32, rows: u32, cols: u32, pixels: &[u8]) -> Vec<u8> {
        let mut bytes = Vec::new();
        for word in [IMAGE_MAGIC, count, rows, cols] {
            bytes.extend_from_slice(&word.to_be_bytes());
        }
        bytes.extend_from_slice(pixels);
        bytes
    }

    fn idx_labels(labels: &[u8]) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&LABEL_MAGIC.to_be_bytes());
        bytes.extend_from_slice(&(labels.len() as u32).to_be_bytes());
        bytes.extend_from_slice(labels);
        bytes
    }

    // three 2x2 images
    fn fixture() -> (Vec<u8>, Vec<u8>) {
        let pixels = [0, 255, 51, 102, 255, 255, 0, 0, 10, 20, 30, 40];
        (idx_images(3, 2, 2, &pixels), idx_labels(&[0, 9, 3]))
    }

    #[test]
    fn parses_headers() {
        let (images, labels) = fixture();
        let raw = parse_idx_images(&images).unwrap();
        assert_eq!((raw.count, raw.rows, raw.cols), (3, 2, 2));
        assert_eq!(raw.pixels.len(), 12);
        assert_eq!(parse_idx_labels(&labels).unwrap(), vec![0, 9, 3]);
    }

    #[test]
    fn one_sample_per_column() {
        let (images, labels) = fixture();
        let data = DataLoader::default().load_bytes(&images, &labels).unwrap();

        assert_eq!(data.num_samples(), 3);
        assert_eq!(data.images.shape(), (4, 3));
        assert_eq!(data.images.get_column(0).unwrap().as_slice(), &[0.0, 1.0, 0.2, 0.4]);
        assert_eq!(data.images.get_column(1).unwrap().as_slice(), &[1.0, 1.0, 0.0, 0.0]);

        assert_eq!(data.labels.shape(), (10, 3));
        assert_eq!(data.labels.get_column(1).unwrap().argmax(), Some(9));
        assert_eq!(data.labels.sum(), 3.0);
        assert_eq!(data.label_indices, vec![0, 9, 3]);
        assert_eq!((data.image_width, data.image_height), (2, 2));
    }

    #[test]
    fn raw_labels_and_pixels() {
        let (images, labels) = fixture();
        let loader = DataLoader {
            normalize: false,
            one_hot: false,
            ..DataLoader::default()
        };
        let data = loader.load_bytes(&images, &labels).unwrap();
        assert_eq!(data.labels.as_slice(), &[0.0, 9.0, 3.0]);
        assert_eq!(*data.images.at(1, 0).unwrap(), 255.0);
    }

    #[test]
    fn statistics_and_counts() {
        let images = idx_images(2, 1, 2, &[0, 255, 255, 0]);
        let data = DataLoader::default().load_bytes(&images, &idx_labels(&[1, 1])).unwrap();
        assert!((data.mean_pixel_value - 0.5).abs() < 1e-12);
        assert!((data.std_pixel_value - 0.5).abs() < 1e-12);
        assert_eq!(data.class_counts()[1], 2);
        assert_eq!(data.class_counts().iter().sum::<usize>(), 2);
    }

    #[test]
    fn batches_keep_columns_aligned() {
        let (images, labels) = fixture();
        let data = DataLoader::default().load_bytes(&images, &labels).unwrap();

        let (x, y) = data.batch(1, 10).unwrap();
        assert_eq!(x.shape(), (4, 2));
        assert_eq!(y.shape(), (10, 2));
        assert_eq!(x.get_column(0).unwrap(), data.images.get_column(1).unwrap());
        assert_eq!(y.get_column(1).unwrap().argmax(), Some(3));

        assert!(data.batch(3, 5).is_err());
    }

    #[test]
    fn malformed_input_is_an_error() {
        let (images, labels) = fixture();

        assert!(matches!(
            parse_idx_images(&labels),
            Err(LoaderError::BadMagic { expected: 2051, found: 2049 })
        ));
        assert!(matches!(
            parse_idx_labels(&images),
            Err(LoaderError::BadMagic { .. })
        ));
        assert!(matches!(
            parse_idx_images(&images[..images.len() - 1]),
            Err(LoaderError::Truncated { .. })
        ));
        assert!(matches!(parse_idx_images(&images[..6]), Err(LoaderError::Truncated { .. })));
        assert!(matches!(parse_idx_labels(&[]), Err(LoaderError::Truncated { .. })));

        let huge = idx_images(u32::MAX, u32::MAX, u32::MAX, &[]);
        assert!(matches!(parse_idx_images(&huge), Err(LoaderError::Truncated { .. })));

        let loader = DataLoader::default();
        assert!(matches!(
            loader.load_bytes(&images, &idx_labels(&[0, 1])),
            Err(LoaderError::CountMismatch { images: 3, labels: 2 })
        ));
        assert!(matches!(
            loader.load_bytes(&images, &idx_labels(&[0, 12, 1])),
            Err(LoaderError::LabelOutOfRange { index: 1, label: 12, .. })
        ));
    }

    #[test]
    fn loads_from_directory() {
        let dir = std::env::temp_dir().join(format!("neural_matrix_idx_{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let (images, labels) = fixture();
        fs::write(dir.join(TRAIN_IMAGES), &images).unwrap();
        fs::write(dir.join(TRAIN_LABELS), &labels).unwrap();

        let data = DataLoader::default().load_training_data(&dir).unwrap();
        assert_eq!(data.num_samples(), 3);
        assert!(matches!(
            DataLoader::default().load_test_data(&dir),
            Err(LoaderError::Io { .. })
        ));

        fs::remove_dir_all(&dir).unwrap();
    }
}
