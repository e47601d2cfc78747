//! Learning rate decay applied to an optimizer between epochs.
use candle::Result;
use candle_nn::Optimizer;

/// Multiplies the optimizer's learning rate by `gamma` once every `step_size` epochs.
///
/// The decay is fixed in advance, it does not look at any training metric.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepLR {
    step_size: usize,
    gamma: f64,
    epochs: usize,
}

impl StepLR {
    pub fn new(step_size: usize, gamma: f64) -> Result<Self> {
        if step_size == 0 {
            candle::bail!("step_size must be positive")
        }
        if !gamma.is_finite() || gamma <= 0. {
            candle::bail!("gamma must be positive, got {gamma}")
        }
        Ok(Self {
            step_size,
            gamma,
            epochs: 0,
        })
    }

    /// Number of completed epochs.
    pub fn epochs(&self) -> usize {
        self.epochs
    }

    /// Learning rate after `epochs` completed epochs when starting from `initial`.
    pub fn lr_after(&self, initial: f64, epochs: usize) -> f64 {
        initial * self.gamma.powi((epochs / self.step_size) as i32)
    }

    /// Mark the end of an epoch, decaying the learning rate of `opt` when due.
    ///
    /// Returns the learning rate the next epoch runs with.
    pub fn step<O: Optimizer>(&mut self, opt: &mut O) -> f64 {
        self.epochs += 1;
        if self.epochs % self.step_size == 0 {
            opt.set_learning_rate(opt.learning_rate() * self.gamma);
        }
        opt.learning_rate()
    }
}
