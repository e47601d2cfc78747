use candle::{Device, Result, Var};
use candle_mnist_conv::scheduler::StepLR;
use candle_nn::{Optimizer, SGD};

#[test]
fn step_lr_decays_the_optimizer_every_epoch() -> Result<()> {
    let mut sgd = SGD::new(vec![], 0.1)?;
    let mut scheduler = StepLR::new(1, 0.7)?;
    for k in 1..=10 {
        let lr = scheduler.step(&mut sgd);
        let expected = 0.1 * 0.7f64.powi(k);
        assert!((lr - expected).abs() < 1e-12, "{lr} {expected}");
        assert_eq!(sgd.learning_rate(), lr);
    }
    assert_eq!(scheduler.epochs(), 10);
    assert!((scheduler.lr_after(0.1, 10) - sgd.learning_rate()).abs() < 1e-12);
    Ok(())
}

#[test]
fn step_lr_with_larger_step_size() -> Result<()> {
    let mut sgd = SGD::new(vec![], 1.0)?;
    let mut scheduler = StepLR::new(2, 0.5)?;
    let lrs = (0..4).map(|_| scheduler.step(&mut sgd)).collect::<Vec<_>>();
    assert_eq!(lrs, [1.0, 0.5, 0.5, 0.25]);
    assert_eq!(scheduler.lr_after(1.0, 3), 0.5);
    assert_eq!(scheduler.lr_after(1.0, 4), 0.25);
    Ok(())
}

#[test]
fn decayed_rate_is_used_by_the_next_update() -> Result<()> {
    let w = Var::new(&[1f32], &Device::Cpu)?;
    let mut sgd = SGD::new(vec![w.clone()], 1.0)?;
    let mut scheduler = StepLR::new(1, 0.5)?;
    scheduler.step(&mut sgd);
    // d(w)/dw = 1, so one step moves w by the learning rate.
    let grads = w.as_tensor().sum_all()?.backward()?;
    sgd.step(&grads)?;
    assert_eq!(w.as_tensor().to_vec1::<f32>()?, [0.5]);
    Ok(())
}

#[test]
fn step_lr_rejects_bad_parameters() {
    assert!(StepLR::new(0, 0.7).is_err());
    assert!(StepLR::new(1, 0.).is_err());
    assert!(StepLR::new(1, -0.5).is_err());
    assert!(StepLR::new(1, f64::NAN).is_err());
}
