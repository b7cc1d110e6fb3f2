use std::time::Instant;

use log::{debug, info};

use crate::backend::Elm;
use crate::data::dataset::PatchSet;
use crate::engine::layer::stack::StackedDenoisingAutoencoder;
use crate::error::{Result, SdaError};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FinetuneConfig {
    pub epochs: usize,
    pub learning_rate: Elm,
    pub batch_size: usize,
    pub log_interval: usize,
}

/// Joint gradient descent on the whole-stack reconstruction cost at a fixed rate.
pub struct FinetuningOptimizer {
    config: FinetuneConfig,
}

impl FinetuningOptimizer {
    pub fn new(config: FinetuneConfig) -> Self {
        Self { config }
    }

    /// Runs epochs `1..=epochs` and returns the mean cost of each.
    pub fn run(
        &self,
        stack: &mut StackedDenoisingAutoencoder,
        data: &PatchSet,
    ) -> Result<Vec<Elm>> {
        let mut train_fn =
            stack.build_finetune_function(data, self.config.batch_size, self.config.learning_rate)?;

        info!("... finetuning the model");
        let start = Instant::now();
        let mut costs = Vec::with_capacity(self.config.epochs);
        for epoch in 1..=self.config.epochs {
            let mut total = 0.0;
            for minibatch_index in 0..train_fn.n_batches() {
                total += train_fn.call(stack, minibatch_index)?;
            }
            let mean = total / train_fn.n_batches() as Elm;
            if !mean.is_finite() {
                return Err(SdaError::Diverged {
                    phase: "fine-tuning".to_string(),
                    epoch,
                    cost: mean,
                });
            }
            if epoch % self.config.log_interval.max(1) == 0 {
                info!("fine tuning, epoch {}, cost {:.6}", epoch, mean);
            } else {
                debug!("fine tuning, epoch {}, cost {:.6}", epoch, mean);
            }
            costs.push(mean);
        }
        info!(
            "The training code ran for {:.2}m",
            start.elapsed().as_secs_f64() / 60.0
        );
        Ok(costs)
    }
}
