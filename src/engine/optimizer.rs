use ndarray::{ArrayD, ArrayViewMutD, Zip};

use crate::backend::Elm;
use crate::error::{Result, SdaError, ensure_dim};

/// Applies one update to an ordered parameter list given gradients in the same order.
pub trait Optimizer {
    fn step(&mut self, params: Vec<ArrayViewMutD<'_, Elm>>, grads: &[ArrayD<Elm>]) -> Result<()>;
}

/// Fixed-step gradient descent: `param -= lr * grad`.
#[derive(Debug, Clone, Copy)]
pub struct SGD {
    lr: Elm,
}

impl SGD {
    pub fn new(lr: Elm) -> Self {
        Self { lr }
    }

    pub fn learning_rate(&self) -> Elm {
        self.lr
    }
}

impl Optimizer for SGD {
    fn step(&mut self, params: Vec<ArrayViewMutD<'_, Elm>>, grads: &[ArrayD<Elm>]) -> Result<()> {
        ensure_dim("optimizer parameter count", params.len(), grads.len())?;
        // 形状はすべて更新前に検証する
        for (param, grad) in params.iter().zip(grads) {
            if param.shape() != grad.shape() {
                return Err(SdaError::DimensionMismatch {
                    context: "optimizer gradient",
                    expected: param.len(),
                    actual: grad.len(),
                });
            }
        }
        let lr = self.lr;
        for (mut param, grad) in params.into_iter().zip(grads) {
            Zip::from(&mut param).and(grad).for_each(|p, &g| *p -= lr * g);
        }
        Ok(())
    }
}
