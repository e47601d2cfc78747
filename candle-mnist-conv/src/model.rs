//! The convolutional classifier.
//!
//! The network is described by [`TOPOLOGY`], an immutable list of layer descriptors that is
//! turned into candle layers once, with every trainable tensor stored in a single [`VarMap`].
use std::path::Path;

use candle::{DType, Device, Module, ModuleT, Result, Tensor};
use candle_nn::{Conv2d, Conv2dConfig, Linear, VarBuilder, VarMap};

use crate::dataset::LABELS;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerSpec {
    Conv2d {
        name: &'static str,
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
    },
    Relu,
    /// Max pooling with a stride equal to the kernel size.
    MaxPool2d { kernel_size: usize },
    Flatten,
    Linear {
        name: &'static str,
        in_dim: usize,
        out_dim: usize,
    },
}

// 1x28x28 -> 32x26x26 -> 64x24x24 -> 64x12x12 -> 9216 -> 128 -> 10
pub const TOPOLOGY: [LayerSpec; 9] = [
    LayerSpec::Conv2d {
        name: "conv1",
        in_channels: 1,
        out_channels: 32,
        kernel_size: 3,
    },
    LayerSpec::Relu,
    LayerSpec::Conv2d {
        name: "conv2",
        in_channels: 32,
        out_channels: 64,
        kernel_size: 3,
    },
    LayerSpec::Relu,
    LayerSpec::MaxPool2d { kernel_size: 2 },
    LayerSpec::Flatten,
    LayerSpec::Linear {
        name: "fc1",
        in_dim: 9216,
        out_dim: 128,
    },
    LayerSpec::Relu,
    LayerSpec::Linear {
        name: "fc2",
        in_dim: 128,
        out_dim: LABELS,
    },
];

impl LayerSpec {
    /// Number of trainable scalars, weights and biases included.
    pub fn parameter_count(&self) -> usize {
        match *self {
            Self::Conv2d {
                in_channels,
                out_channels,
                kernel_size,
                ..
            } => (in_channels * kernel_size * kernel_size + 1) * out_channels,
            Self::Linear {
                in_dim, out_dim, ..
            } => (in_dim + 1) * out_dim,
            Self::Relu | Self::MaxPool2d { .. } | Self::Flatten => 0,
        }
    }

    fn build(&self, vb: &VarBuilder) -> Result<Layer> {
        let layer = match *self {
            Self::Conv2d {
                name,
                in_channels,
                out_channels,
                kernel_size,
            } => {
                let cfg = Conv2dConfig::default();
                let conv =
                    candle_nn::conv2d(in_channels, out_channels, kernel_size, cfg, vb.pp(name))?;
                Layer::Conv2d(conv)
            }
            Self::Relu => Layer::Relu,
            Self::MaxPool2d { kernel_size } => Layer::MaxPool2d(kernel_size),
            Self::Flatten => Layer::Flatten,
            Self::Linear {
                name,
                in_dim,
                out_dim,
            } => Layer::Linear(candle_nn::linear(in_dim, out_dim, vb.pp(name))?),
        };
        Ok(layer)
    }
}

#[derive(Debug, Clone)]
enum Layer {
    Conv2d(Conv2d),
    Relu,
    MaxPool2d(usize),
    Flatten,
    Linear(Linear),
}

impl Module for Layer {
    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        match self {
            Self::Conv2d(conv) => conv.forward(xs),
            Self::Relu => xs.relu(),
            Self::MaxPool2d(k) => xs.max_pool2d(*k),
            Self::Flatten => xs.flatten_from(1),
            Self::Linear(linear) => linear.forward(xs),
        }
    }
}

/// A sequential stack of layers mapping `(b, 1, 28, 28)` images to `(b, 10)` raw scores.
#[derive(Debug, Clone)]
pub struct ConvNet {
    layers: Vec<Layer>,
    span: tracing::Span,
}

impl ConvNet {
    pub fn new(vb: VarBuilder) -> Result<Self> {
        Self::from_specs(&TOPOLOGY, vb)
    }

    pub fn from_specs(specs: &[LayerSpec], vb: VarBuilder) -> Result<Self> {
        let layers = specs
            .iter()
            .map(|spec| spec.build(&vb))
            .collect::<Result<Vec<_>>>()?;
        let span = tracing::span!(tracing::Level::TRACE, "conv-net");
        Ok(Self { layers, span })
    }
}

impl ModuleT for ConvNet {
    // None of the layers behave differently at train time, the flag is kept so that the
    // training and evaluation passes stay explicit.
    fn forward_t(&self, xs: &Tensor, _train: bool) -> Result<Tensor> {
        let _enter = self.span.enter();
        self.layers
            .iter()
            .try_fold(xs.clone(), |xs, layer| layer.forward(&xs))
    }
}

/// The network together with the store owning its parameters.
pub struct Classifier {
    varmap: VarMap,
    net: ConvNet,
}

impl Classifier {
    /// Build a freshly initialized model on `device`.
    pub fn new(device: &Device) -> Result<Self> {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, device);
        let net = ConvNet::new(vb)?;
        Ok(Self { varmap, net })
    }

    pub fn varmap(&self) -> &VarMap {
        &self.varmap
    }

    /// All trainable variables, the handles share storage with the model.
    pub fn vars(&self) -> Vec<candle::Var> {
        self.varmap.all_vars()
    }

    /// Sorted parameter names, e.g. `conv1.weight`.
    pub fn parameter_names(&self) -> Vec<String> {
        let data = self.varmap.data().lock().unwrap();
        let mut names = data.keys().cloned().collect::<Vec<_>>();
        names.sort();
        names
    }

    pub fn parameter_count(&self) -> usize {
        self.vars().iter().map(|v| v.elem_count()).sum()
    }

    pub fn forward_t(&self, xs: &Tensor, train: bool) -> Result<Tensor> {
        self.net.forward_t(xs, train)
    }

    /// Predicted class per example.
    pub fn predict(&self, xs: &Tensor) -> Result<Tensor> {
        self.forward_t(xs, false)?
            .detach()
            .argmax(candle::D::Minus1)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        crate::checkpoint::save(&self.varmap, path)
    }

    pub fn restore<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        crate::checkpoint::restore(&mut self.varmap, path)
    }
}
