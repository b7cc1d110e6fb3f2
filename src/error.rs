//! Error types for model construction, training and persistence.

/// Errors raised by the denoising stack and its collaborators.
#[derive(thiserror::Error, Debug)]
pub enum SdaError {
    /// Invalid architecture or hyperparameter.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A matrix or patch does not have the size the model expects.
    #[error("Dimension mismatch in {context}: expected {expected}, got {actual}")]
    DimensionMismatch {
        context: &'static str,
        expected: usize,
        actual: usize,
    },

    /// The batch size does not split the patch set into whole minibatches.
    #[error("Batch size {batch_size} does not divide {n_patches} patches")]
    BatchSize { batch_size: usize, n_patches: usize },

    /// The mean cost of an epoch became NaN or infinite.
    #[error("Training diverged during {phase} at epoch {epoch}: cost {cost}")]
    Diverged {
        phase: String,
        epoch: usize,
        cost: f32,
    },

    /// A stored model violates the stack invariants.
    #[error("Invalid stored model: {0}")]
    InvalidModel(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Image(#[from] image::ImageError),

    #[error(transparent)]
    Serialization(#[from] bincode::Error),

    #[error(transparent)]
    ConfigParse(#[from] toml::de::Error),
}

/// Result type for this crate
pub type Result<T> = std::result::Result<T, SdaError>;

/// Fails with [`SdaError::DimensionMismatch`] unless `actual == expected`.
pub(crate) fn ensure_dim(context: &'static str, expected: usize, actual: usize) -> Result<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(SdaError::DimensionMismatch {
            context,
            expected,
            actual,
        })
    }
}
