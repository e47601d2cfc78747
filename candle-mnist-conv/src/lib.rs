//! Training a small convolutional MNIST classifier with candle.
//!
//! The crate wires candle's layers, optimizer and autograd into a fixed train/evaluate loop.
//! See [`train::fit`] for the entry point used by the `mnist-conv` binary.
pub mod checkpoint;
pub mod config;
pub mod dataset;
pub mod loss;
pub mod model;
pub mod plot;
pub mod scheduler;
pub mod train;

pub use config::{LossKind, RunConfig};
pub use dataset::{Batch, DataLoader, Mnist, Split};
pub use model::{Classifier, ConvNet, LayerSpec};
pub use train::{fit, EvalReport, History, ProgressRecord, TrainConfig};

use candle::{Device, Result};

pub fn device(cpu: bool) -> Result<Device> {
    if cpu {
        Ok(Device::Cpu)
    } else if candle::utils::cuda_is_available() {
        Ok(Device::new_cuda(0)?)
    } else if candle::utils::metal_is_available() {
        Ok(Device::new_metal(0)?)
    } else {
        #[cfg(all(target_os = "macos", target_arch = "aarch64"))]
        {
            println!(
                "Running on CPU, to run on GPU(metal), build this example with `--features metal`"
            );
        }
        #[cfg(not(all(target_os = "macos", target_arch = "aarch64")))]
        {
            println!("Running on CPU, to run on GPU, build this example with `--features cuda`");
        }
        Ok(Device::Cpu)
    }
}
