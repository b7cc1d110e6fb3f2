//! End-to-end run: load data, train (or load a stored model), denoise, save.

use std::path::PathBuf;

use log::{info, warn};
use rand::{SeedableRng, rngs::StdRng};

use crate::backend::Elm;
use crate::config::{Config, TrainingConfig, hidden_sizes_from_fractions};
use crate::data::dataset::PatchSet;
use crate::data::provider::DatasetProvider;
use crate::engine::finetune::{FinetuneConfig, FinetuningOptimizer};
use crate::engine::layer::stack::{StackConfig, StackedDenoisingAutoencoder};
use crate::engine::pretrain::{PretrainConfig, PretrainReport, PretrainingScheduler};
use crate::error::{Result, ensure_dim};
use crate::inference::InferencePipeline;
use crate::store::ModelStore;
use crate::vis::save_image;

#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub stack: StackedDenoisingAutoencoder,
    pub model_path: PathBuf,
    /// `false` when the model was loaded from the store.
    pub trained: bool,
    pub pretrain: Option<PretrainReport>,
    pub finetune_costs: Vec<Elm>,
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub model_path: PathBuf,
    pub trained: bool,
    pub output_paths: Vec<PathBuf>,
    /// Mean per-patch cost of every denoised image against its clean reference.
    pub mean_costs: Vec<Elm>,
}

/// Builds a stack for `patch_size` patches, pretrains it, then fine-tunes it.
pub fn train(
    training: &TrainingConfig,
    patches: &PatchSet,
    patch_size: (usize, usize),
) -> Result<(StackedDenoisingAutoencoder, PretrainReport, Vec<Elm>)> {
    training.validate()?;
    let (width, height) = patch_size;
    let stack_config = StackConfig::from_fractions(
        &training.hidden_layers_fraction,
        width,
        height,
        training.corruption_level,
    )?;
    ensure_dim("training patch size", stack_config.n_ins, patches.patch_dim())?;

    let mut rng = StdRng::seed_from_u64(training.seed);
    info!(
        "... building the model ({} inputs, hidden {:?})",
        stack_config.n_ins, stack_config.hidden_layer_sizes
    );
    let mut stack = StackedDenoisingAutoencoder::new(&mut rng, &stack_config)?;

    let mut scheduler = PretrainingScheduler::new(
        PretrainConfig {
            epochs: training.pretraining_epochs,
            learning_rate: training.pretrain_lr,
            batch_size: training.batch_size,
            adjust_interval: training.lr_adjust_interval,
            plateau_threshold: training.plateau_threshold,
            log_interval: training.log_interval,
        },
        stack.n_layers(),
    );
    let report = scheduler.run(&mut stack, patches, &mut rng)?;

    let finetune_costs = FinetuningOptimizer::new(FinetuneConfig {
        epochs: training.training_epochs,
        learning_rate: training.finetune_lr,
        batch_size: training.batch_size,
        log_interval: training.log_interval,
    })
    .run(&mut stack, patches)?;

    Ok((stack, report, finetune_costs))
}

/// Loads the stored model for this configuration if one exists, otherwise
/// trains a new one and stores it.
pub fn train_or_load(
    config: &Config,
    patches: &PatchSet,
    patch_size: (usize, usize),
    store: &ModelStore,
) -> Result<TrainingOutcome> {
    let (width, height) = patch_size;
    let hidden = hidden_sizes_from_fractions(&config.training.hidden_layers_fraction, width, height)?;
    let model_path = store.model_path(&config.data.common_name(), &config.training, &hidden, width);

    if store.exists(&model_path) {
        let stack = store.load(&model_path)?;
        warn!(
            "reusing {}: corruption_level, seed, patch_height and the learning-rate \
             schedule are not part of the model key",
            model_path.display()
        );
        ensure_dim("stored model input size", width * height, stack.n_ins())?;
        return Ok(TrainingOutcome {
            stack,
            model_path,
            trained: false,
            pretrain: None,
            finetune_costs: Vec::new(),
        });
    }

    let (stack, report, finetune_costs) = train(&config.training, patches, patch_size)?;
    store.save(&stack, &model_path)?;
    Ok(TrainingOutcome {
        stack,
        model_path,
        trained: true,
        pretrain: Some(report),
        finetune_costs,
    })
}

/// Full run over the datasets named by `config.data`.
pub fn run<P: DatasetProvider>(config: &Config, provider: &P) -> Result<RunSummary> {
    let dataset_names = config.data.dataset_names();
    let noise_dataset_names = config
        .data
        .noise_dataset_names(config.training.noise_dataset_samples);
    let dataset = provider.load(&dataset_names, &noise_dataset_names)?;

    let store = ModelStore::new(&config.data.training_dir);
    let outcome = train_or_load(config, &dataset.patches, dataset.patch_size, &store)?;
    let parameters_name = config
        .training
        .parameters_name(&outcome.stack.hidden_layer_sizes(), dataset.patch_size.0);

    let pipeline = InferencePipeline::new(&outcome.stack);
    let mut output_paths = Vec::with_capacity(dataset.noisy_images.len());
    let mut mean_costs = Vec::with_capacity(dataset.noisy_images.len());
    let denoised_images = pipeline.denoise_images(&dataset.noisy_images)?;
    for ((denoised, clean), noise_name) in denoised_images
        .iter()
        .zip(&dataset.clean_images)
        .zip(&noise_dataset_names)
    {
        let costs = pipeline.reconstruction_costs(denoised, clean)?;
        let mean = costs.iter().sum::<Elm>() / costs.len().max(1) as Elm;
        info!("{}: mean reconstruction cost {:.6}", noise_name, mean);
        mean_costs.push(mean);

        let name = format!("{}{}", noise_name, parameters_name);
        output_paths.push(save_image(denoised, &name, &config.data.result_folder)?);
    }

    Ok(RunSummary {
        model_path: outcome.model_path,
        trained: outcome.trained,
        output_paths,
        mean_costs,
    })
}
