//! Denoising autoencoder with tied weights.
//!
//! The encoder computes `y = sigmoid(x̃ · W + b_hidden)` from a corrupted input
//! `x̃`, the decoder reconstructs `z = sigmoid(y · Wᵀ + b_visible)` with the
//! transpose of the same matrix, and the cost compares `z` against the
//! *uncorrupted* input.

use ndarray::{Array1, Array2, ArrayD, ArrayView2, ArrayViewD, ArrayViewMutD};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::backend::{Elm, cpu};
use crate::engine::layer::Layer;
use crate::engine::loss::CrossEntropyLoss;
use crate::engine::optimizer::{Optimizer, SGD};
use crate::error::{Result, SdaError, ensure_dim};

/// One autoencoder of the stack. Owns `w` and `b_hidden`, which the stack's
/// hidden-layer view borrows without copying.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DenoisingAutoencoder {
    w: Array2<Elm>,
    b_hidden: Array1<Elm>,
    b_visible: Array1<Elm>,
    corruption_level: Elm,
}

/// Gradients of the reconstruction cost, same shapes as the parameters.
#[derive(Debug, Clone)]
pub struct AutoencoderGradients {
    pub w: Array2<Elm>,
    pub b_hidden: Array1<Elm>,
    pub b_visible: Array1<Elm>,
}

impl AutoencoderGradients {
    /// Ordered like [`Layer::parameters`]: `[w, b_hidden, b_visible]`.
    pub fn into_vec(self) -> Vec<ArrayD<Elm>> {
        vec![
            self.w.into_dyn(),
            self.b_hidden.into_dyn(),
            self.b_visible.into_dyn(),
        ]
    }
}

/// The "hidden layer" role of an autoencoder: `sigmoid(x · W + b_hidden)`
/// evaluated on the very buffers the autoencoder trains.
#[derive(Debug, Clone, Copy)]
pub struct HiddenLayer<'a> {
    w: &'a Array2<Elm>,
    b: &'a Array1<Elm>,
}

impl<'a> HiddenLayer<'a> {
    pub fn weights(&self) -> &'a Array2<Elm> {
        self.w
    }

    pub fn bias(&self) -> &'a Array1<Elm> {
        self.b
    }

    pub fn forward(&self, x: ArrayView2<Elm>) -> Array2<Elm> {
        cpu::affine_sigmoid(x, self.w.view(), self.b.view())
    }
}

impl DenoisingAutoencoder {
    /// Random tied weights in `±4·sqrt(6 / (n_visible + n_hidden))`, zero biases.
    pub fn new<R: Rng + ?Sized>(
        rng: &mut R,
        n_visible: usize,
        n_hidden: usize,
        corruption_level: Elm,
    ) -> Result<Self> {
        if n_visible == 0 || n_hidden == 0 {
            return Err(SdaError::Config(format!(
                "autoencoder sizes must be positive (visible {}, hidden {})",
                n_visible, n_hidden
            )));
        }
        let limit = 4.0 * (6.0 / (n_visible + n_hidden) as Elm).sqrt();
        let w = cpu::random_uniform((n_visible, n_hidden), -limit, limit, rng);
        Self::from_parts(
            w,
            Array1::zeros(n_hidden),
            Array1::zeros(n_visible),
            corruption_level,
        )
    }

    /// Builds an autoencoder from explicit parameters (used by tests and model loading).
    pub fn from_parts(
        w: Array2<Elm>,
        b_hidden: Array1<Elm>,
        b_visible: Array1<Elm>,
        corruption_level: Elm,
    ) -> Result<Self> {
        ensure_dim("hidden bias", w.ncols(), b_hidden.len())?;
        ensure_dim("visible bias", w.nrows(), b_visible.len())?;
        if !(0.0..1.0).contains(&corruption_level) {
            return Err(SdaError::Config(format!(
                "corruption level must lie in [0, 1), got {}",
                corruption_level
            )));
        }
        Ok(Self {
            w,
            b_hidden,
            b_visible,
            corruption_level,
        })
    }

    pub fn n_visible(&self) -> usize {
        self.w.nrows()
    }

    pub fn n_hidden(&self) -> usize {
        self.w.ncols()
    }

    pub fn corruption_level(&self) -> Elm {
        self.corruption_level
    }

    pub fn weights(&self) -> &Array2<Elm> {
        &self.w
    }

    pub fn hidden_bias(&self) -> &Array1<Elm> {
        &self.b_hidden
    }

    pub fn visible_bias(&self) -> &Array1<Elm> {
        &self.b_visible
    }

    pub fn hidden_layer(&self) -> HiddenLayer<'_> {
        HiddenLayer {
            w: &self.w,
            b: &self.b_hidden,
        }
    }

    /// Mutable access to the shared pair `(w, b_hidden)` for whole-stack updates.
    pub(crate) fn hidden_parameters_mut(&mut self) -> [ArrayViewMutD<'_, Elm>; 2] {
        [self.w.view_mut().into_dyn(), self.b_hidden.view_mut().into_dyn()]
    }

    /// Zeroes each coordinate independently with probability `corruption_level`.
    /// A level of zero returns an exact copy and draws nothing from `rng`.
    pub fn corrupt<R: Rng + ?Sized>(&self, x: ArrayView2<Elm>, rng: &mut R) -> Array2<Elm> {
        if self.corruption_level == 0.0 {
            return x.to_owned();
        }
        let mask = cpu::keep_mask(x.dim(), self.corruption_level, rng);
        &x * &mask
    }

    pub fn encode(&self, x: ArrayView2<Elm>) -> Array2<Elm> {
        self.hidden_layer().forward(x)
    }

    pub fn decode(&self, h: ArrayView2<Elm>) -> Array2<Elm> {
        cpu::affine_sigmoid(h, self.w.t(), self.b_visible.view())
    }

    /// Mean cross-entropy between the clean target `x` and a reconstruction `z`.
    pub fn reconstruction_cost(&self, x: ArrayView2<Elm>, z: ArrayView2<Elm>) -> Result<Elm> {
        CrossEntropyLoss::new().forward(x, z)
    }

    /// Cost and analytic gradients for an already corrupted input.
    ///
    /// `clean` is the reconstruction target, `corrupted` feeds the encoder.
    pub fn cost_and_gradients(
        &self,
        clean: ArrayView2<Elm>,
        corrupted: ArrayView2<Elm>,
    ) -> Result<(Elm, AutoencoderGradients)> {
        ensure_dim("autoencoder input", self.n_visible(), corrupted.ncols())?;
        ensure_dim("autoencoder target", self.n_visible(), clean.ncols())?;
        ensure_dim("autoencoder batch", clean.nrows(), corrupted.nrows())?;

        let loss = CrossEntropyLoss::new();
        let y = self.encode(corrupted);
        let z = self.decode(y.view());
        let cost = loss.forward(clean, z.view())?;

        // dz: [Batch, Visible], dy: [Batch, Hidden]
        let dz = loss.grad_pre_activation(clean, z.view());
        let dy = dz.dot(&self.w) * cpu::sigmoid_grad(&y);

        // W はエンコーダとデコーダ（転置）で共有しているので両方の寄与を足す
        let gw = corrupted.t().dot(&dy) + dz.t().dot(&y);
        let grads = AutoencoderGradients {
            w: gw,
            b_hidden: cpu::sum_rows(&dy),
            b_visible: cpu::sum_rows(&dz),
        };
        Ok((cost, grads))
    }

    /// One gradient-descent step on a minibatch. `noisy` is corrupted first;
    /// the returned cost is the one measured before the update.
    pub fn gradient_step<R: Rng + ?Sized>(
        &mut self,
        clean: ArrayView2<Elm>,
        noisy: ArrayView2<Elm>,
        learning_rate: Elm,
        rng: &mut R,
    ) -> Result<Elm> {
        let corrupted = self.corrupt(noisy, rng);
        let (cost, grads) = self.cost_and_gradients(clean, corrupted.view())?;
        SGD::new(learning_rate).step(self.parameters_mut(), &grads.into_vec())?;
        Ok(cost)
    }
}

impl Layer for DenoisingAutoencoder {
    fn forward(&self, x: ArrayView2<Elm>) -> Array2<Elm> {
        self.encode(x)
    }

    fn parameters(&self) -> Vec<ArrayViewD<'_, Elm>> {
        vec![
            self.w.view().into_dyn(),
            self.b_hidden.view().into_dyn(),
            self.b_visible.view().into_dyn(),
        ]
    }

    fn parameters_mut(&mut self) -> Vec<ArrayViewMutD<'_, Elm>> {
        vec![
            self.w.view_mut().into_dyn(),
            self.b_hidden.view_mut().into_dyn(),
            self.b_visible.view_mut().into_dyn(),
        ]
    }
}
