//! Loss functions for training and the metrics reported on the test set.
use candle::{DType, Result, Tensor, D};

use crate::config::LossKind;

/// The loss used for every training batch of a run, built once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LossFn {
    kind: LossKind,
    classes: usize,
}

impl LossFn {
    pub fn new(kind: LossKind, classes: usize) -> Self {
        Self { kind, classes }
    }

    /// Scalar loss between raw scores `(b, classes)` and integer labels `(b,)`.
    pub fn compute(&self, logits: &Tensor, labels: &Tensor) -> Result<Tensor> {
        match self.kind {
            LossKind::CrossEntropy => candle_nn::loss::cross_entropy(logits, labels),
            LossKind::MeanSquaredError => {
                let targets = one_hot(labels, self.classes)?;
                candle_nn::loss::mse(logits, &targets)
            }
        }
    }
}

/// Encode integer labels `(b,)` as `(b, classes)` f32 rows with a single one.
pub fn one_hot(labels: &Tensor, classes: usize) -> Result<Tensor> {
    let labels = labels.to_dtype(DType::U32)?;
    let classes = Tensor::arange(0u32, classes as u32, labels.device())?;
    labels
        .unsqueeze(1)?
        .broadcast_eq(&classes.unsqueeze(0)?)?
        .to_dtype(DType::F32)
}

/// Sum over the batch of the negative log-likelihood of the labels under `softmax(logits)`.
pub fn summed_nll(logits: &Tensor, labels: &Tensor) -> Result<f64> {
    let log_sm = candle_nn::ops::log_softmax(logits, D::Minus1)?;
    let picked = log_sm.gather(&labels.unsqueeze(1)?, 1)?;
    let sum = picked.sum_all()?.to_dtype(DType::F64)?.to_scalar::<f64>()?;
    Ok(-sum)
}

/// Number of examples whose highest score is at the label index.
pub fn correct_predictions(logits: &Tensor, labels: &Tensor) -> Result<usize> {
    let correct = logits
        .argmax(D::Minus1)?
        .eq(labels)?
        .to_dtype(DType::U32)?
        .sum_all()?
        .to_scalar::<u32>()?;
    Ok(correct as usize)
}
