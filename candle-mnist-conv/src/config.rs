//! Command line flags and the validated run configuration derived from them.
use std::path::PathBuf;

use candle::Result;
use clap::{Parser, ValueEnum};

/// The loss function used for the whole run.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum LossKind {
    /// Cross-entropy between raw class scores and integer labels.
    #[value(name = "CE")]
    CrossEntropy,
    /// Mean squared error between raw class scores and one-hot labels.
    #[value(name = "MSE")]
    MeanSquaredError,
}

impl LossKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::CrossEntropy => "CE",
            Self::MeanSquaredError => "MSE",
        }
    }
}

impl std::fmt::Display for LossKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for LossKind {
    type Err = candle::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "CE" => Ok(Self::CrossEntropy),
            "MSE" => Ok(Self::MeanSquaredError),
            other => candle::bail!("unknown loss function {other:?}, expected CE or MSE"),
        }
    }
}

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Where the MNIST idx files live, they are downloaded from the hub when missing.
    #[arg(long, alias = "data_dir", default_value = "downloads")]
    pub data_dir: PathBuf,

    /// Input batch size for training.
    #[arg(long, alias = "train_batch_size", default_value_t = 128)]
    pub train_batch_size: usize,

    /// Input batch size for testing.
    #[arg(long, alias = "test_batch_size", default_value_t = 10_000)]
    pub test_batch_size: usize,

    /// The loss function, CE or MSE.
    #[arg(long, alias = "loss_fn", value_enum, default_value_t = LossKind::CrossEntropy)]
    pub loss_fn: LossKind,

    /// Number of epochs to train.
    #[arg(long, default_value_t = 10)]
    pub epochs: usize,

    /// Initial learning rate.
    #[arg(long, default_value_t = 0.1)]
    pub lr: f64,

    /// Multiplicative learning rate decay applied after every epoch.
    #[arg(long, default_value_t = 0.7)]
    pub gamma: f64,

    /// How many batches to wait before logging training status.
    #[arg(long, alias = "log_interval", default_value_t = 100)]
    pub log_interval: usize,

    /// Restore this safetensors checkpoint before any training.
    #[arg(long, alias = "start_checkpoint")]
    pub start_checkpoint: Option<PathBuf>,

    /// Save the trained weights at the end of the run.
    #[arg(long, alias = "save_model")]
    pub save_model: bool,

    /// The file where to save the trained weights, in safetensors format.
    #[arg(
        long,
        alias = "save_checkpoint",
        default_value = "downloads/mnist_cnn.safetensors"
    )]
    pub save_checkpoint: PathBuf,

    /// Where to save the plotted training loss curve.
    #[arg(long, alias = "loss_fig", default_value = "downloads/loss_curve.png")]
    pub loss_fig: PathBuf,

    /// Seed for the shuffling of both data loaders.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Run on CPU rather than on GPU.
    #[arg(long)]
    pub cpu: bool,

    /// Enable tracing (generates a trace-timestamp.json file).
    #[arg(long)]
    pub tracing: bool,
}

/// Every hyperparameter of a run, fixed before the first epoch starts.
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    pub data_dir: PathBuf,
    pub train_batch_size: usize,
    pub test_batch_size: usize,
    pub loss: LossKind,
    pub epochs: usize,
    pub learning_rate: f64,
    pub gamma: f64,
    pub log_interval: usize,
    pub start_checkpoint: Option<PathBuf>,
    pub save_checkpoint: Option<PathBuf>,
    pub loss_fig: PathBuf,
    pub seed: Option<u64>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("downloads"),
            train_batch_size: 128,
            test_batch_size: 10_000,
            loss: LossKind::CrossEntropy,
            epochs: 10,
            learning_rate: 0.1,
            gamma: 0.7,
            log_interval: 100,
            start_checkpoint: None,
            save_checkpoint: None,
            loss_fig: PathBuf::from("downloads/loss_curve.png"),
            seed: None,
        }
    }
}

impl RunConfig {
    pub fn validate(&self) -> Result<()> {
        if self.train_batch_size == 0 {
            candle::bail!("train batch size must be positive")
        }
        if self.test_batch_size == 0 {
            candle::bail!("test batch size must be positive")
        }
        if self.log_interval == 0 {
            candle::bail!("log interval must be positive")
        }
        if !self.learning_rate.is_finite() || self.learning_rate <= 0. {
            candle::bail!("learning rate must be positive, got {}", self.learning_rate)
        }
        if !(self.gamma > 0. && self.gamma <= 1.) {
            candle::bail!("gamma must be in (0, 1], got {}", self.gamma)
        }
        Ok(())
    }
}

impl TryFrom<&Args> for RunConfig {
    type Error = candle::Error;

    fn try_from(args: &Args) -> Result<Self> {
        let config = Self {
            data_dir: args.data_dir.clone(),
            train_batch_size: args.train_batch_size,
            test_batch_size: args.test_batch_size,
            loss: args.loss_fn,
            epochs: args.epochs,
            learning_rate: args.lr,
            gamma: args.gamma,
            log_interval: args.log_interval,
            start_checkpoint: args.start_checkpoint.clone(),
            save_checkpoint: args.save_model.then(|| args.save_checkpoint.clone()),
            loss_fig: args.loss_fig.clone(),
            seed: args.seed,
        };
        config.validate()?;
        Ok(config)
    }
}
