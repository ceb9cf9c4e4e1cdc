use burn::module::AutodiffModule;
use burn::nn::loss::CrossEntropyLoss;
use burn::optim::adaptor::OptimizerAdaptor;
use burn::optim::{Adam, AdamConfig, GradientsParams, Optimizer};
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::{ElementConversion, Int, Tensor};

use crate::data::DigitBatch;
use crate::model::DigitRecognizer;

/// Metrics from one validation batch.
#[derive(Debug, Clone, Copy)]
pub struct ValidationOutput {
    pub loss: f32,
    pub correct: usize,
    pub total: usize,
}

/// Model plus optimizer state for one training run.
pub struct Trainer<B: AutodiffBackend> {
    model: DigitRecognizer<B>,
    optimizer: OptimizerAdaptor<Adam, DigitRecognizer<B>, B>,
    loss_fn: CrossEntropyLoss<B>,
    learning_rate: f64,
}

impl<B: AutodiffBackend> Trainer<B> {
    pub fn new(model: DigitRecognizer<B>, learning_rate: f64, device: &B::Device) -> Self {
        let optimizer = AdamConfig::new().init::<B, DigitRecognizer<B>>();
        let loss_fn = CrossEntropyLoss::new(None, device);

        Self {
            model,
            optimizer,
            loss_fn,
            learning_rate,
        }
    }

    /// One forward/backward/update step. Returns the batch loss.
    pub fn train_step(&mut self, batch: DigitBatch<B>) -> f32 {
        let logits = self.model.forward(batch.images);
        let loss = self.loss_fn.forward(logits, batch.targets);

        let loss_value = loss
            .clone()
            .into_data()
            .to_vec::<f32>()
            .unwrap_or_default()
            .first()
            .copied()
            .unwrap_or(f32::NAN);

        let grads = GradientsParams::from_grads(loss.backward(), &self.model);
        self.model = self
            .optimizer
            .step(self.learning_rate, self.model.clone(), grads);

        loss_value
    }

    /// Loss and accuracy on one batch, with gradients disabled.
    pub fn validate(&self, batch: &DigitBatch<B>) -> ValidationOutput {
        let model = self.model.valid();
        let images = batch.images.clone().inner();
        let targets = batch.targets.clone().inner();
        let total = targets.dims()[0];

        let logits = model.forward(images);
        let loss_fn = CrossEntropyLoss::new(None, &logits.device());
        let loss: f32 = loss_fn
            .forward(logits.clone(), targets.clone())
            .into_scalar()
            .elem();

        let predictions: Tensor<B::InnerBackend, 1, Int> = logits.argmax(1).reshape([total]);
        let correct: i64 = predictions
            .equal(targets)
            .int()
            .sum()
            .into_scalar()
            .elem();

        ValidationOutput {
            loss,
            correct: correct as usize,
            total,
        }
    }

    pub fn model(&self) -> &DigitRecognizer<B> {
        &self.model
    }
}
