// This should reach 99% accuracy after a few epochs.
#[cfg(feature = "mkl")]
extern crate intel_mkl_src;

#[cfg(feature = "accelerate")]
extern crate accelerate_src;

use std::time::Instant;

use anyhow::Result;
use clap::Parser;

use candle_mnist_conv::config::Args;
use candle_mnist_conv::plot::LossCurve;
use candle_mnist_conv::{Classifier, DataLoader, Mnist, RunConfig, TrainConfig};

fn main() -> Result<()> {
    use tracing_chrome::ChromeLayerBuilder;
    use tracing_subscriber::prelude::*;

    let args = Args::parse();
    let _guard = if args.tracing {
        let (chrome_layer, guard) = ChromeLayerBuilder::new().build();
        tracing_subscriber::registry().with(chrome_layer).init();
        Some(guard)
    } else {
        tracing_subscriber::fmt::init();
        None
    };
    let config = RunConfig::try_from(&args)?;

    let device = candle_mnist_conv::device(args.cpu)?;
    let m = Mnist::load(&config.data_dir)?;
    println!("train-images: {:?}", m.train.images().shape());
    println!("train-labels: {:?}", m.train.labels().shape());
    println!("test-images: {:?}", m.test.images().shape());
    println!("test-labels: {:?}", m.test.labels().shape());
    let m = m.to_device(&device)?;

    let mut model = Classifier::new(&device)?;
    tracing::info!(parameters = model.parameter_count(), "built model");
    if let Some(start) = config.start_checkpoint.as_ref() {
        println!("restoring weights from {}", start.display());
        model.restore(start)?;
    }

    let mut train = DataLoader::new(m.train)
        .batch_size(config.train_batch_size)
        .shuffle(config.seed);
    let mut test = DataLoader::new(m.test)
        .batch_size(config.test_batch_size)
        .shuffle(config.seed);

    let start = Instant::now();
    let train_config = TrainConfig::from(&config);
    let history = candle_mnist_conv::fit(&model, &mut train, &mut test, &train_config)?;
    if let Some(save) = config.save_checkpoint.as_ref() {
        println!("saving trained weights in {}", save.display());
        model.save(save)?;
    }
    let elapsed = start.elapsed();

    let curve = LossCurve::new(
        &history.losses(),
        config.train_batch_size * config.log_interval,
        train.dataset_len(),
    );
    curve.save(&config.loss_fig)?;
    println!(
        "Training and Testing total execution time is: {} seconds",
        elapsed.as_secs_f64()
    );
    Ok(())
}
