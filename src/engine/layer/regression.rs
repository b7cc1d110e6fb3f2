use ndarray::{Array1, Array2, ArrayView2, ArrayViewD, ArrayViewMutD};
use serde::{Deserialize, Serialize};

use crate::backend::{Elm, cpu};
use crate::engine::layer::Layer;
use crate::error::{Result, SdaError, ensure_dim};

/// Output layer mapping the last hidden representation back to patch space:
/// `sigmoid(h · W + b)`. Starts from all-zero weights and bias.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegressionLayer {
    w: Array2<Elm>,
    b: Array1<Elm>,
}

impl RegressionLayer {
    pub fn new(n_in: usize, n_out: usize) -> Result<Self> {
        if n_in == 0 || n_out == 0 {
            return Err(SdaError::Config(format!(
                "regression layer sizes must be positive (in {}, out {})",
                n_in, n_out
            )));
        }
        Ok(Self {
            w: Array2::zeros((n_in, n_out)),
            b: Array1::zeros(n_out),
        })
    }

    pub fn from_parts(w: Array2<Elm>, b: Array1<Elm>) -> Result<Self> {
        ensure_dim("regression bias", w.ncols(), b.len())?;
        Ok(Self { w, b })
    }

    pub fn n_in(&self) -> usize {
        self.w.nrows()
    }

    pub fn n_out(&self) -> usize {
        self.w.ncols()
    }

    pub fn weights(&self) -> &Array2<Elm> {
        &self.w
    }

    pub fn bias(&self) -> &Array1<Elm> {
        &self.b
    }
}

impl Layer for RegressionLayer {
    fn forward(&self, x: ArrayView2<Elm>) -> Array2<Elm> {
        cpu::affine_sigmoid(x, self.w.view(), self.b.view())
    }

    fn parameters(&self) -> Vec<ArrayViewD<'_, Elm>> {
        vec![self.w.view().into_dyn(), self.b.view().into_dyn()]
    }

    fn parameters_mut(&mut self) -> Vec<ArrayViewMutD<'_, Elm>> {
        vec![self.w.view_mut().into_dyn(), self.b.view_mut().into_dyn()]
    }
}
