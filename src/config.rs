//! Run configuration, loaded from TOML. Every field has a default.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::backend::Elm;
use crate::error::{Result, SdaError};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub training: TrainingConfig,
    pub data: DataConfig,
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Config = toml::from_str(text)?;
        config.training.validate()?;
        Ok(config)
    }
}

/// Hyperparameters of one training run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub finetune_lr: Elm,
    pub pretraining_epochs: usize,
    pub pretrain_lr: Elm,
    /// Fine-tuning epochs.
    pub training_epochs: usize,
    /// Hidden layer sizes as fractions of the patch area.
    pub hidden_layers_fraction: Vec<f64>,
    /// Samples per pixel of the noisy renderings (selects the noisy dataset).
    pub noise_dataset_samples: usize,
    pub batch_size: usize,
    pub corruption_level: Elm,
    pub seed: u64,
    /// Pretraining epochs between learning-rate adjustments.
    pub lr_adjust_interval: usize,
    /// Cost change below which pretraining is considered stalled.
    pub plateau_threshold: Elm,
    /// Epochs between `info` progress lines.
    pub log_interval: usize,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            finetune_lr: 0.01,
            pretraining_epochs: 100,
            pretrain_lr: 0.01,
            training_epochs: 100,
            hidden_layers_fraction: vec![0.5, 0.5, 0.5],
            noise_dataset_samples: 20,
            batch_size: 128,
            corruption_level: 0.0,
            seed: 1,
            lr_adjust_interval: 100,
            plateau_threshold: 0.01,
            log_interval: 100,
        }
    }
}

impl TrainingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.hidden_layers_fraction.is_empty() {
            return Err(SdaError::Config(
                "hidden_layers_fraction must list at least one layer".to_string(),
            ));
        }
        if self.batch_size == 0 {
            return Err(SdaError::Config("batch_size must be positive".to_string()));
        }
        if self.lr_adjust_interval == 0 || self.log_interval == 0 {
            return Err(SdaError::Config(
                "lr_adjust_interval and log_interval must be positive".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&self.corruption_level) {
            return Err(SdaError::Config(format!(
                "corruption_level must lie in [0, 1), got {}",
                self.corruption_level
            )));
        }
        Ok(())
    }

    /// Suffix identifying a trained model, e.g.
    /// `_SdA_pretrain100_tuning100_0L32_1L32_tunerate0.01_pretrainrate0.01_W8_batchsize128`.
    pub fn parameters_name(&self, hidden_layer_sizes: &[usize], patch_width: usize) -> String {
        let layers: String = hidden_layer_sizes
            .iter()
            .enumerate()
            .map(|(idx, size)| format!("_{}L{}", idx, size))
            .collect();
        format!(
            "_SdA_pretrain{}_tuning{}{}_tunerate{}_pretrainrate{}_W{}_batchsize{}",
            self.pretraining_epochs,
            self.training_epochs,
            layers,
            self.finetune_lr,
            self.pretrain_lr,
            patch_width,
            self.batch_size
        )
    }
}

/// Where datasets, trained models and results live.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Base names of the scenes; clean and noisy dataset names derive from these.
    pub dataset_base: Vec<String>,
    pub clean_suffix: String,
    pub data_dir: PathBuf,
    pub result_folder: PathBuf,
    pub training_dir: PathBuf,
    pub patch_width: usize,
    pub patch_height: usize,
    pub extension: String,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            dataset_base: vec!["sponzat_0".to_string(), "sponzat_1".to_string()],
            clean_suffix: "_10000".to_string(),
            data_dir: PathBuf::from("data"),
            result_folder: PathBuf::from("./result_images"),
            training_dir: PathBuf::from("training"),
            patch_width: 8,
            patch_height: 8,
            extension: "png".to_string(),
        }
    }
}

impl DataConfig {
    pub fn dataset_names(&self) -> Vec<String> {
        self.dataset_base
            .iter()
            .map(|base| format!("{}{}", base, self.clean_suffix))
            .collect()
    }

    pub fn noise_dataset_names(&self, noise_samples: usize) -> Vec<String> {
        self.dataset_base
            .iter()
            .map(|base| format!("{}_{}", base, noise_samples))
            .collect()
    }

    /// Base names joined with `_`, the dataset part of a model file name.
    pub fn common_name(&self) -> String {
        self.dataset_base.join("_")
    }
}

/// `floor(fraction * width * height)` for every fraction, multiplied left to
/// right in `f64` so that sizes (and model file names) are reproducible.
///
/// An empty list, or a fraction that yields zero units, is a configuration error.
pub fn hidden_sizes_from_fractions(
    fractions: &[f64],
    width: usize,
    height: usize,
) -> Result<Vec<usize>> {
    if fractions.is_empty() {
        return Err(SdaError::Config(
            "at least one hidden layer fraction is required".to_string(),
        ));
    }
    fractions
        .iter()
        .map(|&f| {
            // (f * w) * h と (f * (w * h)) は丸めが異なる
            let size = (f * width as f64 * height as f64).floor();
            if !size.is_finite() || size < 1.0 {
                Err(SdaError::Config(format!(
                    "hidden layer fraction {} of a {}x{} patch gives no units",
                    f, width, height
                )))
            } else {
                Ok(size as usize)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parameters_name_lists_every_layer() {
        let config = TrainingConfig::default();
        let name = config.parameters_name(&[32, 16], 8);
        assert_eq!(
            name,
            "_SdA_pretrain100_tuning100_0L32_1L16_tunerate0.01_pretrainrate0.01_W8_batchsize128"
        );
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = Config::from_toml(
            r#"
            [training]
            batch_size = 64
            hidden_layers_fraction = [0.3, 0.3]

            [data]
            patch_width = 4
            "#,
        )
        .unwrap();
        assert_eq!(config.training.batch_size, 64);
        assert_eq!(config.training.pretraining_epochs, 100);
        assert_eq!(config.data.patch_width, 4);
        assert_eq!(config.data.patch_height, 8);
    }

    #[test]
    fn empty_fraction_list_is_rejected_when_parsing() {
        let err = Config::from_toml("[training]\nhidden_layers_fraction = []\n").unwrap_err();
        assert!(matches!(err, SdaError::Config(_)));
    }

    #[test]
    fn hidden_sizes_multiply_fraction_by_width_first() {
        assert_eq!(hidden_sizes_from_fractions(&[0.29], 10, 10).unwrap(), vec![29]);
        assert_eq!(hidden_sizes_from_fractions(&[0.47], 10, 10).unwrap(), vec![46]);
        assert_eq!(hidden_sizes_from_fractions(&[0.5, 0.25], 8, 8).unwrap(), vec![32, 16]);
    }

    #[test]
    fn dataset_names_follow_the_base_names() {
        let data = DataConfig::default();
        assert_eq!(data.dataset_names(), vec!["sponzat_0_10000", "sponzat_1_10000"]);
        assert_eq!(data.noise_dataset_names(5), vec!["sponzat_0_5", "sponzat_1_5"]);
        assert_eq!(data.common_name(), "sponzat_0_sponzat_1");
    }
}
