use burn::constant;
use burn::module::Module;
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::pool::{MaxPool2d, MaxPool2dConfig};
use burn::nn::{Dropout, DropoutConfig, Linear, LinearConfig, PaddingConfig2d, Relu};
use burn::tensor::{backend::Backend, Tensor};

use crate::config::ArchitectureConfig;

constant!(ArchitectureConfig);

/// Convolutional digit classifier.
///
/// Each configured conv block is convolution (same padding) + ReLU + 2x2
/// max-pool, followed by a dropout-regularized dense layer and the class
/// head. Input is `[batch, channels, height, width]`, output is
/// `[batch, num_classes]` logits.
#[derive(Module, Debug)]
pub struct DigitRecognizer<B: Backend> {
    #[module(skip)]
    architecture: ArchitectureConfig,
    convs: Vec<Conv2d<B>>,
    pool: MaxPool2d,
    activation: Relu,
    dropout: Dropout,
    hidden: Linear<B>,
    head: Linear<B>,
}

impl<B: Backend> DigitRecognizer<B> {
    pub fn new(architecture: ArchitectureConfig, device: &B::Device) -> Self {
        let mut convs = Vec::new();
        let mut in_channels = architecture.image_channels;
        for block in &architecture.conv_blocks {
            let conv = Conv2dConfig::new(
                [in_channels, block.filters],
                [block.kernel_size, block.kernel_size],
            )
            .with_padding(PaddingConfig2d::Same)
            .init(device);
            convs.push(conv);
            in_channels = block.filters;
        }

        let pool = MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init();
        let dropout = DropoutConfig::new(architecture.dropout).init();

        let hidden =
            LinearConfig::new(architecture.flattened_size(), architecture.dense_units).init(device);
        let head =
            LinearConfig::new(architecture.dense_units, architecture.num_classes).init(device);

        Self {
            architecture,
            convs,
            pool,
            activation: Relu::new(),
            dropout,
            hidden,
            head,
        }
    }

    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let mut x = images;
        for conv in &self.convs {
            x = self.pool.forward(self.activation.forward(conv.forward(x)));
        }

        let [batch, channels, height, width] = x.dims();
        let x = x.reshape([batch, channels * height * width]);

        let x = self.dropout.forward(self.activation.forward(self.hidden.forward(x)));
        self.head.forward(x)
    }

    pub fn architecture(&self) -> &ArchitectureConfig {
        &self.architecture
    }
}

impl ArchitectureConfig {
    /// Number of features entering the dense layer, after every conv block
    /// has halved the spatial dims.
    pub fn flattened_size(&self) -> usize {
        let stages = self.conv_blocks.len();
        let height = self.image_height >> stages;
        let width = self.image_width >> stages;
        let channels = self
            .conv_blocks
            .last()
            .map(|b| b.filters)
            .unwrap_or(self.image_channels);
        channels * height * width
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn forward_produces_class_logits() {
        let architecture = ArchitectureConfig::default();
        let device = Default::default();
        let model = DigitRecognizer::<TestBackend>::new(architecture, &device);

        let images = Tensor::<TestBackend, 4>::zeros([3, 1, 28, 28], &device);
        let logits = model.forward(images);
        assert_eq!(logits.dims(), [3, 10]);
    }

    #[test]
    fn flattened_size_follows_pooling() {
        // Two blocks: 28 -> 14 -> 7, last block has 64 filters.
        let architecture = ArchitectureConfig::default();
        assert_eq!(architecture.flattened_size(), 64 * 7 * 7);
    }
}
