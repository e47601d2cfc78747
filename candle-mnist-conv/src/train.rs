//! The train/evaluate loop.
use candle::Result;
use candle_nn::{Optimizer, SGD};

use crate::config::{LossKind, RunConfig};
use crate::dataset::{DataLoader, LABELS};
use crate::loss::{self, LossFn};
use crate::model::Classifier;
use crate::scheduler::StepLR;

/// Hyperparameters consumed by [`fit`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainConfig {
    pub epochs: usize,
    pub learning_rate: f64,
    pub gamma: f64,
    pub log_interval: usize,
    pub loss: LossKind,
}

impl From<&RunConfig> for TrainConfig {
    fn from(config: &RunConfig) -> Self {
        Self {
            epochs: config.epochs,
            learning_rate: config.learning_rate,
            gamma: config.gamma,
            log_interval: config.log_interval,
            loss: config.loss,
        }
    }
}

/// A sampled training loss, emitted every `log_interval` batches.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressRecord {
    pub epoch: usize,
    pub batch_idx: usize,
    /// Examples processed before this batch, counted with this batch's size.
    pub seen: usize,
    pub total: usize,
    pub percent: f64,
    pub loss: f32,
}

impl std::fmt::Display for ProgressRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Train Epoch: {} [{}/{} ({:.0}%)]\tLoss: {:.6}",
            self.epoch, self.seen, self.total, self.percent, self.loss
        )
    }
}

/// Aggregate metrics over a full pass of the test set.
#[derive(Debug, Clone, PartialEq)]
pub struct EvalReport {
    /// Mean negative log-likelihood per example.
    pub loss: f64,
    pub correct: usize,
    pub total: usize,
}

impl EvalReport {
    pub fn accuracy(&self) -> f64 {
        if self.total == 0 {
            0.
        } else {
            self.correct as f64 / self.total as f64
        }
    }
}

impl std::fmt::Display for EvalReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Test set: Average loss: {:.4}, Accuracy: {}/{} ({:.0}%)",
            self.loss,
            self.correct,
            self.total,
            100. * self.accuracy()
        )
    }
}

/// Everything observed during [`fit`].
#[derive(Debug, Clone, Default)]
pub struct History {
    pub progress: Vec<ProgressRecord>,
    pub evaluations: Vec<EvalReport>,
    /// Learning rate in effect after each epoch's scheduler step.
    pub learning_rates: Vec<f64>,
    /// Number of optimizer steps taken.
    pub steps: usize,
}

impl History {
    /// The sampled training losses, in order.
    pub fn losses(&self) -> Vec<f32> {
        self.progress.iter().map(|r| r.loss).collect()
    }
}

/// One pass over `train`, one optimizer step per batch.
pub fn train_epoch(
    model: &Classifier,
    train: &mut DataLoader,
    sgd: &mut SGD,
    loss_fn: &LossFn,
    epoch: usize,
    log_interval: usize,
    history: &mut History,
) -> Result<()> {
    let _span = tracing::span!(tracing::Level::DEBUG, "train-epoch", epoch).entered();
    let n_batches = train.len();
    let total = train.dataset_len();
    for (batch_idx, batch) in train.iter()?.enumerate() {
        let batch = batch?;
        let logits = model.forward_t(&batch.images, true)?;
        let loss = loss_fn.compute(&logits, &batch.labels)?;
        // candle builds a fresh gradient store on every backward pass.
        let grads = loss.backward()?;
        sgd.step(&grads)?;
        history.steps += 1;

        if batch_idx % log_interval == 0 {
            let record = ProgressRecord {
                epoch,
                batch_idx,
                seen: batch_idx * batch.len(),
                total,
                percent: 100. * batch_idx as f64 / n_batches as f64,
                loss: loss.to_scalar::<f32>()?,
            };
            println!("{record}");
            history.progress.push(record);
        }
    }
    Ok(())
}

/// Mean loss and accuracy over every batch of `test`, without updating the model.
pub fn evaluate(model: &Classifier, test: &mut DataLoader) -> Result<EvalReport> {
    let _span = tracing::span!(tracing::Level::DEBUG, "evaluate").entered();
    let total = test.dataset_len();
    let mut summed_loss = 0f64;
    let mut correct = 0usize;
    for batch in test.iter()? {
        let batch = batch?;
        let logits = model.forward_t(&batch.images, false)?.detach();
        summed_loss += loss::summed_nll(&logits, &batch.labels)?;
        correct += loss::correct_predictions(&logits, &batch.labels)?;
    }
    let loss = if total == 0 {
        0.
    } else {
        summed_loss / total as f64
    };
    Ok(EvalReport {
        loss,
        correct,
        total,
    })
}

/// Train for `config.epochs` epochs, evaluating and decaying the learning rate after each one.
pub fn fit(
    model: &Classifier,
    train: &mut DataLoader,
    test: &mut DataLoader,
    config: &TrainConfig,
) -> Result<History> {
    if config.log_interval == 0 {
        candle::bail!("log interval must be positive")
    }
    let loss_fn = LossFn::new(config.loss, LABELS);
    let mut sgd = SGD::new(model.vars(), config.learning_rate)?;
    let mut scheduler = StepLR::new(1, config.gamma)?;
    let mut history = History::default();
    tracing::info!(
        epochs = config.epochs,
        lr = config.learning_rate,
        loss = %config.loss,
        train = train.dataset_len(),
        test = test.dataset_len(),
        "starting training"
    );
    for epoch in 1..=config.epochs {
        train_epoch(
            model,
            train,
            &mut sgd,
            &loss_fn,
            epoch,
            config.log_interval,
            &mut history,
        )?;
        let report = evaluate(model, test)?;
        println!("\n{report}\n");
        history.evaluations.push(report);

        let lr = scheduler.step(&mut sgd);
        history.learning_rates.push(lr);
    }
    Ok(history)
}
