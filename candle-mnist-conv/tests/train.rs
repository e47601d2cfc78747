#[cfg(feature = "mkl")]
extern crate intel_mkl_src;

#[cfg(feature = "accelerate")]
extern crate accelerate_src;

use anyhow::Result;
use candle::{Device, Tensor};
use candle_mnist_conv::train::{evaluate, fit, TrainConfig};
use candle_mnist_conv::{Classifier, DataLoader, LossKind, Split};

fn synthetic(n: usize) -> Result<Split> {
    let images = Tensor::randn(0f32, 1f32, (n, 1, 28, 28), &Device::Cpu)?;
    let labels = (0..n as u32).map(|i| i % 10).collect::<Vec<_>>();
    let labels = Tensor::from_vec(labels, n, &Device::Cpu)?;
    Ok(Split::new(images, labels)?)
}

fn config(epochs: usize, log_interval: usize, loss: LossKind) -> TrainConfig {
    TrainConfig {
        epochs,
        learning_rate: 0.1,
        gamma: 0.7,
        log_interval,
        loss,
    }
}

#[test]
fn one_epoch_on_two_examples() -> Result<()> {
    let split = synthetic(2)?;
    let mut train = DataLoader::new(split.clone()).batch_size(128).shuffle(None);
    let mut test = DataLoader::new(split).batch_size(10_000).shuffle(None);
    let model = Classifier::new(&Device::Cpu)?;

    let history = fit(&model, &mut train, &mut test, &config(1, 100, LossKind::CrossEntropy))?;
    assert_eq!(history.steps, 1);
    let idxs = history.progress.iter().map(|r| r.batch_idx).collect::<Vec<_>>();
    assert_eq!(idxs, [0]);
    let record = &history.progress[0];
    assert_eq!((record.epoch, record.seen, record.total), (1, 0, 2));
    assert_eq!(record.percent, 0.);
    assert!(record.loss.is_finite() && record.loss >= 0.);

    assert_eq!(history.evaluations.len(), 1);
    let report = &history.evaluations[0];
    assert_eq!(report.total, 2);
    assert!(report.loss.is_finite() && report.loss >= 0.);
    assert!((0. ..=1.).contains(&report.accuracy()));
    Ok(())
}

#[test]
fn logs_every_interval_and_counts_steps() -> Result<()> {
    let split = synthetic(20)?;
    let mut train = DataLoader::new(split.clone()).batch_size(3).shuffle(Some(0));
    let mut test = DataLoader::new(split).batch_size(7);
    let model = Classifier::new(&Device::Cpu)?;

    let history = fit(&model, &mut train, &mut test, &config(2, 3, LossKind::MeanSquaredError))?;
    // 7 batches per epoch, the last one holding 2 examples.
    assert_eq!(history.steps, 14);
    let logged = history
        .progress
        .iter()
        .map(|r| (r.epoch, r.batch_idx, r.seen))
        .collect::<Vec<_>>();
    assert_eq!(
        logged,
        [(1, 0, 0), (1, 3, 9), (1, 6, 12), (2, 0, 0), (2, 3, 9), (2, 6, 12)]
    );
    assert_eq!(history.losses().len(), 6);
    assert_eq!(history.evaluations.len(), 2);
    Ok(())
}

#[test]
fn learning_rate_decays_once_per_epoch() -> Result<()> {
    let split = synthetic(4)?;
    let mut train = DataLoader::new(split.clone()).batch_size(4);
    let mut test = DataLoader::new(split).batch_size(4);
    let model = Classifier::new(&Device::Cpu)?;

    let history = fit(&model, &mut train, &mut test, &config(3, 1, LossKind::CrossEntropy))?;
    assert_eq!(history.learning_rates.len(), 3);
    for (k, lr) in history.learning_rates.iter().enumerate() {
        let expected = 0.1 * 0.7f64.powi(k as i32 + 1);
        assert!((lr - expected).abs() < 1e-12, "{lr} {expected}");
    }
    Ok(())
}

#[test]
fn evaluation_accuracy_is_exact() -> Result<()> {
    let split = synthetic(25)?;
    let model = Classifier::new(&Device::Cpu)?;
    let preds = model.predict(split.images())?.to_vec1::<u32>()?;
    let labels = split.labels().to_vec1::<u32>()?;
    let expected = preds.iter().zip(labels.iter()).filter(|(p, l)| p == l).count();

    let mut test = DataLoader::new(split).batch_size(10).shuffle(Some(1));
    let report = evaluate(&model, &mut test)?;
    assert_eq!(report.total, 25);
    assert_eq!(report.correct, expected);
    assert_eq!(report.accuracy(), expected as f64 / 25.);
    Ok(())
}

#[test]
fn evaluation_does_not_update_parameters() -> Result<()> {
    let split = synthetic(8)?;
    let model = Classifier::new(&Device::Cpu)?;
    let before = model.forward_t(split.images(), false)?.to_vec2::<f32>()?;
    let mut test = DataLoader::new(split.clone()).batch_size(8);
    evaluate(&model, &mut test)?;
    let after = model.forward_t(split.images(), false)?.to_vec2::<f32>()?;
    assert_eq!(before, after);
    Ok(())
}

#[test]
fn seeded_runs_from_the_same_weights_are_identical() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let init = dir.path().join("init.safetensors");
    Classifier::new(&Device::Cpu)?.save(&init)?;
    let split = synthetic(24)?;

    let run = || -> Result<Vec<f32>> {
        let mut model = Classifier::new(&Device::Cpu)?;
        model.restore(&init)?;
        let mut train = DataLoader::new(split.clone()).batch_size(8).shuffle(Some(7));
        let mut test = DataLoader::new(split.clone()).batch_size(24).shuffle(Some(7));
        let history = fit(&model, &mut train, &mut test, &config(2, 1, LossKind::CrossEntropy))?;
        Ok(history.losses())
    };
    let first = run()?;
    assert_eq!(first.len(), 6);
    assert_eq!(first, run()?);
    Ok(())
}

#[test]
fn zero_log_interval_is_rejected() -> Result<()> {
    let split = synthetic(2)?;
    let mut train = DataLoader::new(split.clone());
    let mut test = DataLoader::new(split);
    let model = Classifier::new(&Device::Cpu)?;
    assert!(fit(&model, &mut train, &mut test, &config(1, 0, LossKind::CrossEntropy)).is_err());
    Ok(())
}

#[test]
fn zero_batch_size_is_rejected() -> Result<()> {
    let split = synthetic(2)?;
    let mut train = DataLoader::new(split.clone()).batch_size(0);
    let mut test = DataLoader::new(split);
    let model = Classifier::new(&Device::Cpu)?;
    assert!(fit(&model, &mut train, &mut test, &config(1, 1, LossKind::CrossEntropy)).is_err());
    Ok(())
}
