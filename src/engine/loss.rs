use ndarray::{Array1, Array2, ArrayView2, Axis, Zip};

use crate::backend::Elm;
use crate::error::{Result, ensure_dim};

// log(0) を避けるために予測値をこの範囲にクランプする
const PROB_EPS: Elm = 1e-7;

/// Binary cross-entropy between a target batch and a sigmoid output batch,
/// summed over coordinates and averaged over rows.
///
/// `-Σ_k [x_k ln z_k + (1 - x_k) ln(1 - z_k)]`
pub struct CrossEntropyLoss;

impl CrossEntropyLoss {
    pub fn new() -> Self {
        Self
    }

    /// Mean per-row cost. `target` and `pred` must have the same shape.
    pub fn forward(&self, target: ArrayView2<Elm>, pred: ArrayView2<Elm>) -> Result<Elm> {
        let per_row = self.per_row(target, pred)?;
        Ok(per_row.mean().unwrap_or(0.0))
    }

    /// Unreduced cost, one value per row.
    pub fn per_row(&self, target: ArrayView2<Elm>, pred: ArrayView2<Elm>) -> Result<Array1<Elm>> {
        ensure_dim("cross-entropy rows", target.nrows(), pred.nrows())?;
        ensure_dim("cross-entropy columns", target.ncols(), pred.ncols())?;

        let mut elem = Array2::<Elm>::zeros(target.raw_dim());
        Zip::from(&mut elem)
            .and(&target)
            .and(&pred)
            .for_each(|e, &x, &z| {
                let z = z.clamp(PROB_EPS, 1.0 - PROB_EPS);
                *e = -(x * z.ln() + (1.0 - x) * (1.0 - z).ln());
            });
        Ok(elem.sum_axis(Axis(1)))
    }

    /// Gradient of the mean cost w.r.t. the pre-sigmoid activations of `pred`.
    ///
    /// For a sigmoid output the chain rule collapses to `(z - x) / batch`.
    pub fn grad_pre_activation(&self, target: ArrayView2<Elm>, pred: ArrayView2<Elm>) -> Array2<Elm> {
        let batch = pred.nrows().max(1) as Elm;
        (&pred - &target) / batch
    }
}

impl Default for CrossEntropyLoss {
    fn default() -> Self {
        Self::new()
    }
}
