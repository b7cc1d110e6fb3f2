use ndarray::Array1;

use crate::backend::Elm;
use crate::data::dataset::PatchedImage;
use crate::engine::layer::stack::StackedDenoisingAutoencoder;
use crate::engine::loss::CrossEntropyLoss;
use crate::error::{Result, SdaError, ensure_dim};

/// Applies a trained stack to whole images, channel by channel.
pub struct InferencePipeline<'a> {
    stack: &'a StackedDenoisingAutoencoder,
}

impl<'a> InferencePipeline<'a> {
    pub fn new(stack: &'a StackedDenoisingAutoencoder) -> Self {
        Self { stack }
    }

    /// Denoises every patch of every channel. Channels are independent and
    /// each is run through the stack as one batch; `image` is left untouched.
    pub fn denoise_image(&self, image: &PatchedImage) -> Result<PatchedImage> {
        ensure_dim("image patch size", self.stack.n_ins(), image.patch_dim())?;
        image.map_channels(|channel| self.stack.denoise(channel.data.view()))
    }

    pub fn denoise_images(&self, images: &[PatchedImage]) -> Result<Vec<PatchedImage>> {
        images.iter().map(|image| self.denoise_image(image)).collect()
    }

    /// Per-patch cross-entropy between a denoised image and its clean
    /// reference, channel after channel.
    pub fn reconstruction_costs(
        &self,
        filtered: &PatchedImage,
        clean: &PatchedImage,
    ) -> Result<Vec<Elm>> {
        ensure_dim(
            "reference channel count",
            filtered.channels().len(),
            clean.channels().len(),
        )?;
        let loss = CrossEntropyLoss::new();
        let mut costs = Vec::with_capacity(filtered.n_patches() * filtered.channels().len());
        for (out, reference) in filtered.channels().iter().zip(clean.channels()) {
            if out.name != reference.name {
                return Err(SdaError::Config(format!(
                    "channel {} compared against channel {}",
                    out.name, reference.name
                )));
            }
            let per_patch: Array1<Elm> = loss.per_row(reference.data.view(), out.data.view())?;
            costs.extend(per_patch.iter().copied());
        }
        Ok(costs)
    }
}
