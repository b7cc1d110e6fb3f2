use ndarray::ArrayView2;

use super::dataset::PatchSet;
use crate::backend::Elm;
use crate::error::{Result, SdaError};

/// Fixed-order minibatches over a [`PatchSet`].
///
/// Batches never shuffle and never pad: the batch size has to divide the
/// number of patches.
#[derive(Debug, Clone, Copy)]
pub struct MiniBatchLoader<'a> {
    dataset: &'a PatchSet,
    batch_size: usize,
    n_batches: usize,
}

impl<'a> MiniBatchLoader<'a> {
    pub fn new(dataset: &'a PatchSet, batch_size: usize) -> Result<Self> {
        let n_patches = dataset.len();
        if batch_size == 0 || n_patches == 0 || n_patches % batch_size != 0 {
            return Err(SdaError::BatchSize {
                batch_size,
                n_patches,
            });
        }
        Ok(Self {
            dataset,
            batch_size,
            n_batches: n_patches / batch_size,
        })
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn n_batches(&self) -> usize {
        self.n_batches
    }

    /// `(clean, noisy)` rows of minibatch `index`.
    pub fn batch(&self, index: usize) -> Result<(ArrayView2<'a, Elm>, ArrayView2<'a, Elm>)> {
        let dataset: &'a PatchSet = self.dataset;
        dataset.batch(index, self.batch_size)
    }
}
