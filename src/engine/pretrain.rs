//! Greedy layer-wise pretraining.
//!
//! Layers are trained strictly one after another; each layer runs all of its
//! epochs, and each epoch visits every minibatch in index order.

use std::time::Instant;

use log::{debug, info};
use rand::Rng;

use crate::backend::Elm;
use crate::data::dataset::PatchSet;
use crate::engine::layer::stack::StackedDenoisingAutoencoder;
use crate::error::{Result, SdaError};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PretrainConfig {
    pub epochs: usize,
    pub learning_rate: Elm,
    pub batch_size: usize,
    /// Epochs between learning-rate adjustments.
    pub adjust_interval: usize,
    /// Absolute change of the epoch cost below which the rate is doubled back.
    pub plateau_threshold: Elm,
    pub log_interval: usize,
}

impl Default for PretrainConfig {
    fn default() -> Self {
        Self {
            epochs: 100,
            learning_rate: 0.01,
            batch_size: 128,
            adjust_interval: 100,
            plateau_threshold: 0.01,
            log_interval: 100,
        }
    }
}

/// Progress of one layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerState {
    NotStarted,
    Running { epoch: usize },
    Done,
}

/// Per-layer record of a finished pretraining run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PretrainReport {
    /// Mean minibatch cost of every epoch, one list per layer.
    pub layer_costs: Vec<Vec<Elm>>,
    /// Learning rate in effect when pretraining ended.
    pub final_learning_rate: Elm,
}

/// Learning rate to use for `epoch` (0-based) given the epoch means recorded so far.
///
/// Every `interval` epochs (never at epoch 0) the rate is halved; then, if the
/// last two recorded costs differ by less than `threshold`, it is doubled
/// instead of staying halved. Fewer than two recorded costs skip the doubling.
pub fn adapt_learning_rate(
    learning_rate: Elm,
    epoch: usize,
    interval: usize,
    threshold: Elm,
    history: &[Elm],
) -> Elm {
    if epoch == 0 || interval == 0 || epoch % interval != 0 {
        return learning_rate;
    }
    let mut lr = learning_rate * 0.5;
    if let [.., previous, last] = history {
        if (last - previous).abs() < threshold {
            lr *= 2.0;
        }
    }
    lr
}

pub struct PretrainingScheduler {
    config: PretrainConfig,
    learning_rate: Elm,
    states: Vec<LayerState>,
    layer_costs: Vec<Vec<Elm>>,
}

impl PretrainingScheduler {
    pub fn new(config: PretrainConfig, n_layers: usize) -> Self {
        Self {
            learning_rate: config.learning_rate,
            config,
            states: vec![LayerState::NotStarted; n_layers],
            layer_costs: vec![Vec::new(); n_layers],
        }
    }

    pub fn states(&self) -> &[LayerState] {
        &self.states
    }

    pub fn learning_rate(&self) -> Elm {
        self.learning_rate
    }

    pub fn is_done(&self) -> bool {
        self.states.iter().all(|s| *s == LayerState::Done)
    }

    /// Pretrains every layer of `stack` on `data`, in order.
    ///
    /// The learning rate is not reset between layers: layer `i + 1` starts from
    /// the rate layer `i` ended with.
    pub fn run<R: Rng + ?Sized>(
        &mut self,
        stack: &mut StackedDenoisingAutoencoder,
        data: &PatchSet,
        rng: &mut R,
    ) -> Result<PretrainReport> {
        if self.states.len() != stack.n_layers() {
            return Err(SdaError::DimensionMismatch {
                context: "pretraining layer count",
                expected: stack.n_layers(),
                actual: self.states.len(),
            });
        }
        let steps = stack.pretraining_functions(data, self.config.batch_size)?;

        info!("... pre-training the model");
        let start = Instant::now();
        for step in &steps {
            let layer = step.layer();
            for epoch in 0..self.config.epochs {
                self.states[layer] = LayerState::Running { epoch };
                self.learning_rate = adapt_learning_rate(
                    self.learning_rate,
                    epoch,
                    self.config.adjust_interval,
                    self.config.plateau_threshold,
                    &self.layer_costs[layer],
                );

                let mut total = 0.0;
                for batch_index in 0..step.n_batches() {
                    total += step.call(stack, batch_index, self.learning_rate, rng)?;
                }
                let mean = total / step.n_batches() as Elm;
                if !mean.is_finite() {
                    return Err(SdaError::Diverged {
                        phase: format!("pretraining layer {}", layer),
                        epoch,
                        cost: mean,
                    });
                }

                if epoch % self.config.log_interval.max(1) == 0 {
                    info!(
                        "Pre-training layer {}, epoch {}, cost {:.6}, lr {}",
                        layer, epoch, mean, self.learning_rate
                    );
                } else {
                    debug!(
                        "Pre-training layer {}, epoch {}, cost {:.6}, lr {}",
                        layer, epoch, mean, self.learning_rate
                    );
                }
                self.layer_costs[layer].push(mean);
            }
            self.states[layer] = LayerState::Done;
        }
        info!(
            "The pretraining code ran for {:.2}m",
            start.elapsed().as_secs_f64() / 60.0
        );

        Ok(PretrainReport {
            layer_costs: self.layer_costs.clone(),
            final_learning_rate: self.learning_rate,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_adjustment_off_interval() {
        assert_eq!(adapt_learning_rate(0.4, 0, 100, 0.01, &[1.0, 1.0]), 0.4);
        assert_eq!(adapt_learning_rate(0.4, 99, 100, 0.01, &[1.0, 2.0]), 0.4);
    }

    #[test]
    fn halves_when_cost_still_moves() {
        let history = vec![3.0; 98].into_iter().chain([2.5, 2.0]).collect::<Vec<_>>();
        assert_eq!(adapt_learning_rate(0.4, 100, 100, 0.01, &history), 0.2);
    }

    #[test]
    fn plateau_restores_rate() {
        let history = [2.0, 1.5, 1.001, 1.0];
        assert_eq!(adapt_learning_rate(0.4, 200, 100, 0.01, &history), 0.4);
    }

    #[test]
    fn single_sample_only_halves() {
        assert_eq!(adapt_learning_rate(0.4, 1, 1, 0.01, &[1.0]), 0.2);
    }
}
