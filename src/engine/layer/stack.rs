//! Stacked denoising autoencoder.
//!
//! The stack is an ordered list of [`DenoisingAutoencoder`]s topped by a
//! [`RegressionLayer`]. Every autoencoder plays two roles over one set of
//! buffers: as an autoencoder it is pretrained on its local reconstruction
//! cost, and as a hidden layer ([`HiddenLayer`]) it is part of the
//! feed-forward network that is fine-tuned end to end and used for inference.
//!
//! Two signal paths run through the stack during training:
//!
//! * the clean path, the uncorrupted patch encoded through layers `0..i`,
//!   which only ever serves as the reconstruction target of layer `i`;
//! * the noisy path, the noisy patch pushed through the hidden layers
//!   `0..i`, which feeds layer `i`'s (corrupted) forward pass.

use ndarray::{Array1, Array2, ArrayD, ArrayView1, ArrayView2, ArrayViewD, ArrayViewMutD, Axis};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::backend::{Elm, cpu};
use crate::config::hidden_sizes_from_fractions;
use crate::data::dataset::PatchSet;
use crate::data::loader::MiniBatchLoader;
use crate::engine::layer::Layer;
use crate::engine::layer::denoising::{DenoisingAutoencoder, HiddenLayer};
use crate::engine::layer::regression::RegressionLayer;
use crate::engine::loss::CrossEntropyLoss;
use crate::engine::optimizer::{Optimizer, SGD};
use crate::error::{Result, SdaError, ensure_dim};

/// Architecture of a stack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackConfig {
    /// Input dimensionality (patch pixel count).
    pub n_ins: usize,
    /// Hidden size of every autoencoder, bottom to top. Must not be empty.
    pub hidden_layer_sizes: Vec<usize>,
    /// Output dimensionality of the regression layer.
    pub n_outs: usize,
    /// Masking rate of layer 0. Deeper layers receive the already noisy
    /// signal and are not corrupted again.
    pub corruption_level: Elm,
}

impl StackConfig {
    /// Square-patch architecture whose hidden sizes are fractions of the patch area.
    /// Input and output sizes are both `width * height`.
    pub fn from_fractions(
        fractions: &[f64],
        width: usize,
        height: usize,
        corruption_level: Elm,
    ) -> Result<Self> {
        let hidden_layer_sizes = hidden_sizes_from_fractions(fractions, width, height)?;
        Ok(Self {
            n_ins: width * height,
            hidden_layer_sizes,
            n_outs: width * height,
            corruption_level,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackedDenoisingAutoencoder {
    layers: Vec<DenoisingAutoencoder>,
    regression: RegressionLayer,
}

impl StackedDenoisingAutoencoder {
    pub fn new<R: Rng + ?Sized>(rng: &mut R, config: &StackConfig) -> Result<Self> {
        if config.hidden_layer_sizes.is_empty() {
            return Err(SdaError::Config(
                "a stack needs at least one hidden layer".to_string(),
            ));
        }
        if config.n_ins == 0 || config.n_outs == 0 {
            return Err(SdaError::Config(format!(
                "input and output sizes must be positive (in {}, out {})",
                config.n_ins, config.n_outs
            )));
        }

        let mut layers = Vec::with_capacity(config.hidden_layer_sizes.len());
        let mut input_size = config.n_ins;
        for (i, &hidden_size) in config.hidden_layer_sizes.iter().enumerate() {
            let corruption = if i == 0 { config.corruption_level } else { 0.0 };
            layers.push(DenoisingAutoencoder::new(
                rng,
                input_size,
                hidden_size,
                corruption,
            )?);
            input_size = hidden_size;
        }
        let regression = RegressionLayer::new(input_size, config.n_outs)?;

        Ok(Self { layers, regression })
    }

    /// Assembles a stack from existing layers, checking the size chain.
    pub fn from_layers(
        layers: Vec<DenoisingAutoencoder>,
        regression: RegressionLayer,
    ) -> Result<Self> {
        let stack = Self { layers, regression };
        stack.validate()?;
        Ok(stack)
    }

    /// Checks every structural invariant. Deserialized stacks go through here.
    pub fn validate(&self) -> Result<()> {
        let first = self
            .layers
            .first()
            .ok_or_else(|| SdaError::InvalidModel("stack has no hidden layer".to_string()))?;
        let mut expected_visible = first.n_visible();
        for (i, layer) in self.layers.iter().enumerate() {
            if layer.n_visible() != expected_visible {
                return Err(SdaError::InvalidModel(format!(
                    "layer {} expects {} inputs but the layer below produces {}",
                    i,
                    layer.n_visible(),
                    expected_visible
                )));
            }
            if layer.hidden_bias().len() != layer.n_hidden()
                || layer.visible_bias().len() != layer.n_visible()
            {
                return Err(SdaError::InvalidModel(format!(
                    "layer {} has biases that do not match its weights",
                    i
                )));
            }
            if !(0.0..1.0).contains(&layer.corruption_level()) {
                return Err(SdaError::InvalidModel(format!(
                    "layer {} has corruption level {}",
                    i,
                    layer.corruption_level()
                )));
            }
            expected_visible = layer.n_hidden();
        }
        if self.regression.n_in() != expected_visible
            || self.regression.bias().len() != self.regression.n_out()
        {
            return Err(SdaError::InvalidModel(format!(
                "regression layer is {}x{} on top of {} hidden units",
                self.regression.n_in(),
                self.regression.n_out(),
                expected_visible
            )));
        }
        Ok(())
    }

    pub fn n_layers(&self) -> usize {
        self.layers.len()
    }

    pub fn n_ins(&self) -> usize {
        self.layers[0].n_visible()
    }

    pub fn n_outs(&self) -> usize {
        self.regression.n_out()
    }

    pub fn hidden_layer_sizes(&self) -> Vec<usize> {
        self.layers.iter().map(|l| l.n_hidden()).collect()
    }

    /// The `i`-th layer in its autoencoder role.
    pub fn autoencoder(&self, i: usize) -> Option<&DenoisingAutoencoder> {
        self.layers.get(i)
    }

    /// The `i`-th layer in its hidden-layer role, backed by the same buffers
    /// as [`Self::autoencoder`].
    pub fn hidden_layer(&self, i: usize) -> Option<HiddenLayer<'_>> {
        self.layers.get(i).map(|l| l.hidden_layer())
    }

    pub fn regression(&self) -> &RegressionLayer {
        &self.regression
    }

    /// All fine-tuned parameters in order `[W0, bh0, W1, bh1, ..., Wr, br]`.
    pub fn parameters(&self) -> Vec<ArrayViewD<'_, Elm>> {
        let mut params = Vec::with_capacity(2 * self.layers.len() + 2);
        for layer in &self.layers {
            params.push(layer.weights().view().into_dyn());
            params.push(layer.hidden_bias().view().into_dyn());
        }
        params.extend(self.regression.parameters());
        params
    }

    /// Mutable counterpart of [`Self::parameters`], same order.
    pub fn parameters_mut(&mut self) -> Vec<ArrayViewMutD<'_, Elm>> {
        let mut params = Vec::with_capacity(2 * self.layers.len() + 2);
        for layer in &mut self.layers {
            params.extend(layer.hidden_parameters_mut());
        }
        params.extend(self.regression.parameters_mut());
        params
    }

    fn check_depth(&self, depth: usize) -> Result<()> {
        if depth < self.layers.len() {
            Ok(())
        } else {
            Err(SdaError::Config(format!(
                "layer index {} out of range for a {}-layer stack",
                depth,
                self.layers.len()
            )))
        }
    }

    /// Clean representation feeding layer `depth`: the uncorrupted batch
    /// encoded by layers `0..depth` with their current parameters.
    pub fn clean_input(&self, x: ArrayView2<Elm>, depth: usize) -> Result<Array2<Elm>> {
        ensure_dim("patch", self.n_ins(), x.ncols())?;
        Ok(self.layers[..depth]
            .iter()
            .fold(x.to_owned(), |acc, layer| layer.encode(acc.view())))
    }

    /// Noisy representation feeding layer `depth`: the noisy batch through
    /// the hidden-layer views of layers `0..depth`, never re-corrupted.
    pub fn noisy_input(&self, x: ArrayView2<Elm>, depth: usize) -> Result<Array2<Elm>> {
        ensure_dim("patch", self.n_ins(), x.ncols())?;
        Ok(self.layers[..depth]
            .iter()
            .fold(x.to_owned(), |acc, layer| {
                layer.hidden_layer().forward(acc.view())
            }))
    }

    /// One pretraining step of layer `depth` on a minibatch.
    pub fn pretrain_step<R: Rng + ?Sized>(
        &mut self,
        depth: usize,
        clean: ArrayView2<Elm>,
        noisy: ArrayView2<Elm>,
        learning_rate: Elm,
        rng: &mut R,
    ) -> Result<Elm> {
        self.check_depth(depth)?;
        ensure_dim("patch batch", clean.nrows(), noisy.nrows())?;
        let target = self.clean_input(clean, depth)?;
        let input = self.noisy_input(noisy, depth)?;
        self.layers[depth].gradient_step(target.view(), input.view(), learning_rate, rng)
    }

    /// Activations of the noisy path: the input followed by every hidden layer output.
    fn noisy_forward(&self, noisy: ArrayView2<Elm>) -> Result<Vec<Array2<Elm>>> {
        ensure_dim("patch", self.n_ins(), noisy.ncols())?;
        let mut activations = Vec::with_capacity(self.layers.len() + 1);
        activations.push(noisy.to_owned());
        for (i, layer) in self.layers.iter().enumerate() {
            let next = layer.hidden_layer().forward(activations[i].view());
            activations.push(next);
        }
        Ok(activations)
    }

    /// Whole-stack cost: regression output on the noisy path against the clean patch.
    pub fn finetune_cost(&self, clean: ArrayView2<Elm>, noisy: ArrayView2<Elm>) -> Result<Elm> {
        ensure_dim("target patch", self.n_outs(), clean.ncols())?;
        let activations = self.noisy_forward(noisy)?;
        let top = &activations[activations.len() - 1];
        let out = self.regression.forward(top.view());
        CrossEntropyLoss::new().forward(clean, out.view())
    }

    /// Whole-stack cost and gradients ordered like [`Self::parameters`].
    pub fn finetune_cost_and_gradients(
        &self,
        clean: ArrayView2<Elm>,
        noisy: ArrayView2<Elm>,
    ) -> Result<(Elm, Vec<ArrayD<Elm>>)> {
        ensure_dim("target patch", self.n_outs(), clean.ncols())?;
        ensure_dim("patch batch", clean.nrows(), noisy.nrows())?;

        let loss = CrossEntropyLoss::new();
        let activations = self.noisy_forward(noisy)?;
        let n = self.layers.len();
        let top = &activations[n];
        let out = self.regression.forward(top.view());
        let cost = loss.forward(clean, out.view())?;

        // 出力側から逆伝播する
        let d_out = loss.grad_pre_activation(clean, out.view());
        let g_wr = top.t().dot(&d_out);
        let g_br = cpu::sum_rows(&d_out);
        let mut delta = d_out.dot(&self.regression.weights().t()) * cpu::sigmoid_grad(top);

        let mut layer_grads = Vec::with_capacity(n);
        for i in (0..n).rev() {
            let a_in = &activations[i];
            let gw = a_in.t().dot(&delta);
            let gb = cpu::sum_rows(&delta);
            if i > 0 {
                delta = delta.dot(&self.layers[i].weights().t()) * cpu::sigmoid_grad(a_in);
            }
            layer_grads.push((gw, gb));
        }
        layer_grads.reverse();

        let mut grads = Vec::with_capacity(2 * n + 2);
        for (gw, gb) in layer_grads {
            grads.push(gw.into_dyn());
            grads.push(gb.into_dyn());
        }
        grads.push(g_wr.into_dyn());
        grads.push(g_br.into_dyn());
        Ok((cost, grads))
    }

    /// One synchronized update of every stack parameter.
    pub fn finetune_step<O: Optimizer>(
        &mut self,
        clean: ArrayView2<Elm>,
        noisy: ArrayView2<Elm>,
        optimizer: &mut O,
    ) -> Result<Elm> {
        let (cost, grads) = self.finetune_cost_and_gradients(clean, noisy)?;
        optimizer.step(self.parameters_mut(), &grads)?;
        Ok(cost)
    }

    /// One pretraining step function per layer, bound to `data`.
    pub fn pretraining_functions<'d>(
        &self,
        data: &'d PatchSet,
        batch_size: usize,
    ) -> Result<Vec<PretrainStep<'d>>> {
        ensure_dim("training patches", self.n_ins(), data.patch_dim())?;
        let loader = MiniBatchLoader::new(data, batch_size)?;
        Ok((0..self.layers.len())
            .map(|layer| PretrainStep { layer, loader })
            .collect())
    }

    /// Fine-tuning step function bound to `data` with a fixed learning rate.
    pub fn build_finetune_function<'d>(
        &self,
        data: &'d PatchSet,
        batch_size: usize,
        learning_rate: Elm,
    ) -> Result<FinetuneStep<'d>> {
        ensure_dim("training patches", self.n_ins(), data.patch_dim())?;
        ensure_dim("target patches", self.n_outs(), data.patch_dim())?;
        Ok(FinetuneStep {
            loader: MiniBatchLoader::new(data, batch_size)?,
            optimizer: SGD::new(learning_rate),
        })
    }

    /// Inference: clean path through every layer, no corruption, then regression.
    pub fn denoise(&self, x: ArrayView2<Elm>) -> Result<Array2<Elm>> {
        let top = self.clean_input(x, self.layers.len())?;
        Ok(self.regression.forward(top.view()))
    }

    pub fn denoise_patch(&self, x: ArrayView1<Elm>) -> Result<Array1<Elm>> {
        let out = self.denoise(x.insert_axis(Axis(0)))?;
        Ok(out.row(0).to_owned())
    }
}

/// Pretraining step of one layer: `call(stack, batch_index, lr, rng) -> cost`.
#[derive(Debug, Clone, Copy)]
pub struct PretrainStep<'d> {
    layer: usize,
    loader: MiniBatchLoader<'d>,
}

impl<'d> PretrainStep<'d> {
    pub fn layer(&self) -> usize {
        self.layer
    }

    pub fn n_batches(&self) -> usize {
        self.loader.n_batches()
    }

    pub fn call<R: Rng + ?Sized>(
        &self,
        stack: &mut StackedDenoisingAutoencoder,
        batch_index: usize,
        learning_rate: Elm,
        rng: &mut R,
    ) -> Result<Elm> {
        let (clean, noisy) = self.loader.batch(batch_index)?;
        stack.pretrain_step(self.layer, clean, noisy, learning_rate, rng)
    }
}

/// Fine-tuning step: `call(stack, batch_index) -> cost`.
#[derive(Debug, Clone, Copy)]
pub struct FinetuneStep<'d> {
    loader: MiniBatchLoader<'d>,
    optimizer: SGD,
}

impl<'d> FinetuneStep<'d> {
    pub fn n_batches(&self) -> usize {
        self.loader.n_batches()
    }

    pub fn learning_rate(&self) -> Elm {
        self.optimizer.learning_rate()
    }

    pub fn call(
        &mut self,
        stack: &mut StackedDenoisingAutoencoder,
        batch_index: usize,
    ) -> Result<Elm> {
        let (clean, noisy) = self.loader.batch(batch_index)?;
        stack.finetune_step(clean, noisy, &mut self.optimizer)
    }
}
