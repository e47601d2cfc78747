//! The MNIST hand-written digit dataset, normalized and batched for the convolutional model.
//!
//! The idx files are read from a local directory when present, otherwise the dataset is
//! fetched from the hugging face hub.
use std::path::Path;

use candle::{DType, Device, Result, Tensor};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

pub const IMAGE_SIDE: usize = 28;
pub const LABELS: usize = 10;

// Mean and standard deviation of the MNIST training pixels.
pub const PIXEL_MEAN: f64 = 0.1307;
pub const PIXEL_STD: f64 = 0.3081;

const IDX_FILES: [&str; 4] = [
    "train-images-idx3-ubyte",
    "train-labels-idx1-ubyte",
    "t10k-images-idx3-ubyte",
    "t10k-labels-idx1-ubyte",
];

/// A set of examples: images of shape `(n, 1, 28, 28)` in f32 and labels of shape `(n,)` in u32.
#[derive(Debug, Clone)]
pub struct Split {
    images: Tensor,
    labels: Tensor,
}

impl Split {
    /// Build a split from prepared tensors, labels are converted to u32.
    pub fn new(images: Tensor, labels: Tensor) -> Result<Self> {
        let (n, c, h, w) = images.dims4()?;
        let n_labels = labels.dims1()?;
        if n != n_labels {
            candle::bail!("got {n} images but {n_labels} labels")
        }
        if (c, h, w) != (1, IMAGE_SIDE, IMAGE_SIDE) {
            candle::bail!("unexpected image shape {:?}", images.shape())
        }
        let images = images.to_dtype(DType::F32)?;
        let labels = labels.to_dtype(DType::U32)?;
        Ok(Self { images, labels })
    }

    /// Build a split from flat pixels in `[0, 1]` as returned by `candle_datasets`, applying
    /// the usual MNIST normalization.
    pub fn from_pixels(pixels: &Tensor, labels: &Tensor) -> Result<Self> {
        let (n, _) = pixels.dims2()?;
        let images = ((pixels.to_dtype(DType::F32)? - PIXEL_MEAN)? / PIXEL_STD)?;
        let images = images.reshape((n, 1, IMAGE_SIDE, IMAGE_SIDE))?;
        Self::new(images, labels.clone())
    }

    pub fn len(&self) -> usize {
        self.labels.dims()[0]
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn images(&self) -> &Tensor {
        &self.images
    }

    pub fn labels(&self) -> &Tensor {
        &self.labels
    }

    pub fn device(&self) -> &Device {
        self.images.device()
    }

    pub fn to_device(&self, device: &Device) -> Result<Self> {
        Ok(Self {
            images: self.images.to_device(device)?,
            labels: self.labels.to_device(device)?,
        })
    }
}

pub struct Mnist {
    pub train: Split,
    pub test: Split,
}

impl Mnist {
    /// Load the dataset from `dir`, downloading it from the hub if the idx files are missing.
    ///
    /// Hub downloads land in the hugging face cache (`HF_HOME`), nothing is written to `dir`.
    pub fn load<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        let dataset = if IDX_FILES.iter().all(|f| dir.join(f).is_file()) {
            tracing::info!(?dir, "loading mnist from idx files");
            candle_datasets::vision::mnist::load_dir(dir)?
        } else {
            tracing::info!(?dir, "mnist idx files not found, fetching from the hub");
            candle_datasets::vision::mnist::load()?
        };
        Self::from_dataset(&dataset)
    }

    pub fn from_dataset(dataset: &candle_datasets::vision::Dataset) -> Result<Self> {
        if dataset.labels != LABELS {
            candle::bail!("expected {LABELS} labels, got {}", dataset.labels)
        }
        let train = Split::from_pixels(&dataset.train_images, &dataset.train_labels)?;
        let test = Split::from_pixels(&dataset.test_images, &dataset.test_labels)?;
        Ok(Self { train, test })
    }

    pub fn to_device(&self, device: &Device) -> Result<Self> {
        Ok(Self {
            train: self.train.to_device(device)?,
            test: self.test.to_device(device)?,
        })
    }
}

pub struct Batch {
    pub images: Tensor,
    pub labels: Tensor,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.labels.dims()[0]
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Iterates over a split in batches, optionally in a new random order on every pass.
///
/// The last batch is returned even when it holds fewer than `batch_size` examples.
pub struct DataLoader {
    split: Split,
    batch_size: usize,
    rng: Option<StdRng>,
}

impl DataLoader {
    pub fn new(split: Split) -> Self {
        Self {
            split,
            batch_size: 16,
            rng: None,
        }
    }

    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Reshuffle on every pass, seeded from `seed` or from the OS when `None`.
    pub fn shuffle(mut self, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::seed_from_u64(rand::random()),
        };
        self.rng = Some(rng);
        self
    }

    /// Number of examples in the underlying split.
    pub fn dataset_len(&self) -> usize {
        self.split.len()
    }

    /// Number of batches yielded per pass, zero when the batch size is zero.
    pub fn len(&self) -> usize {
        if self.batch_size == 0 {
            0
        } else {
            self.split.len().div_ceil(self.batch_size)
        }
    }

    pub fn is_empty(&self) -> bool {
        self.split.is_empty()
    }

    /// Start a new pass over the split.
    pub fn iter(&mut self) -> Result<Batches<'_>> {
        if self.batch_size == 0 {
            candle::bail!("batch size must be positive")
        }
        let order = match self.rng.as_mut() {
            None => None,
            Some(rng) => {
                let mut order = (0..self.split.len() as u32).collect::<Vec<_>>();
                order.shuffle(rng);
                Some(order)
            }
        };
        Ok(Batches {
            split: &self.split,
            batch_size: self.batch_size,
            order,
            pos: 0,
        })
    }
}

pub struct Batches<'a> {
    split: &'a Split,
    batch_size: usize,
    order: Option<Vec<u32>>,
    pos: usize,
}

impl Batches<'_> {
    fn batch(&self, start: usize, len: usize) -> Result<Batch> {
        let (images, labels) = match self.order.as_ref() {
            None => (
                self.split.images.narrow(0, start, len)?,
                self.split.labels.narrow(0, start, len)?,
            ),
            Some(order) => {
                let idxs = order[start..start + len].to_vec();
                let idxs = Tensor::from_vec(idxs, len, self.split.device())?;
                (
                    self.split.images.index_select(&idxs, 0)?,
                    self.split.labels.index_select(&idxs, 0)?,
                )
            }
        };
        Ok(Batch { images, labels })
    }
}

impl Iterator for Batches<'_> {
    type Item = Result<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        let total = self.split.len();
        if self.pos >= total {
            return None;
        }
        let len = usize::min(self.batch_size, total - self.pos);
        let batch = self.batch(self.pos, len);
        self.pos += len;
        Some(batch)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.split.len().saturating_sub(self.pos).div_ceil(self.batch_size);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Batches<'_> {}
