#[cfg(feature = "mkl")]
extern crate intel_mkl_src;

#[cfg(feature = "accelerate")]
extern crate accelerate_src;

use candle::{Device, Result, Tensor};
use candle_mnist_conv::model::TOPOLOGY;
use candle_mnist_conv::Classifier;

#[test]
fn topology_parameter_count() -> Result<()> {
    let from_specs: usize = TOPOLOGY.iter().map(|s| s.parameter_count()).sum();
    assert_eq!(from_specs, 1_199_882);
    let model = Classifier::new(&Device::Cpu)?;
    assert_eq!(model.parameter_count(), from_specs);
    Ok(())
}

#[test]
fn parameter_names() -> Result<()> {
    let model = Classifier::new(&Device::Cpu)?;
    assert_eq!(
        model.parameter_names(),
        [
            "conv1.bias",
            "conv1.weight",
            "conv2.bias",
            "conv2.weight",
            "fc1.bias",
            "fc1.weight",
            "fc2.bias",
            "fc2.weight",
        ]
    );
    Ok(())
}

#[test]
fn forward_shapes() -> Result<()> {
    let model = Classifier::new(&Device::Cpu)?;
    let xs = Tensor::randn(0f32, 1f32, (3, 1, 28, 28), &Device::Cpu)?;
    let train = model.forward_t(&xs, true)?;
    let eval = model.forward_t(&xs, false)?;
    assert_eq!(train.dims(), &[3, 10]);
    // No layer depends on the mode.
    let diff = (train - &eval)?.abs()?.sum_all()?.to_scalar::<f32>()?;
    assert_eq!(diff, 0.);
    let preds = model.predict(&xs)?.to_vec1::<u32>()?;
    assert_eq!(preds.len(), 3);
    assert!(preds.iter().all(|&p| p < 10));
    Ok(())
}

#[test]
fn forward_rejects_wrong_image_size() -> Result<()> {
    let model = Classifier::new(&Device::Cpu)?;
    let xs = Tensor::zeros((1, 1, 32, 32), candle::DType::F32, &Device::Cpu)?;
    assert!(model.forward_t(&xs, false).is_err());
    Ok(())
}
