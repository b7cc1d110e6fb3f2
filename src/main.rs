// 学習済みモデルがあれば読み込み、なければ事前学習とファインチューニングを行い、
// ノイズ画像をパッチ単位でデノイズして保存する

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::{error, info};

use sda_denoise::config::Config;
use sda_denoise::data::provider::ImageFolderProvider;
use sda_denoise::runner;

#[derive(Parser, Debug)]
#[command(name = "sda-denoise", about = "Stacked denoising autoencoder for rendered images")]
struct Args {
    /// TOML configuration file; defaults apply to every missing field
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory holding the clean and noisy images
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Directory for denoised images
    #[arg(long)]
    result_folder: Option<PathBuf>,

    /// Directory for trained models
    #[arg(long)]
    training_dir: Option<PathBuf>,

    /// Seed for weight initialization and corruption
    #[arg(long)]
    seed: Option<u64>,
}

fn load_config(args: &Args) -> sda_denoise::Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    if let Some(dir) = &args.data_dir {
        config.data.data_dir = dir.clone();
    }
    if let Some(dir) = &args.result_folder {
        config.data.result_folder = dir.clone();
    }
    if let Some(dir) = &args.training_dir {
        config.data.training_dir = dir.clone();
    }
    if let Some(seed) = args.seed {
        config.training.seed = seed;
    }
    Ok(config)
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let result = load_config(&args).and_then(|config| {
        let provider = ImageFolderProvider::new(
            &config.data.data_dir,
            config.data.patch_width,
            config.data.patch_height,
        )
        .with_extension(&config.data.extension);
        runner::run(&config, &provider)
    });

    match result {
        Ok(summary) => {
            info!(
                "{} model {}",
                if summary.trained { "trained" } else { "reused" },
                summary.model_path.display()
            );
            for (path, cost) in summary.output_paths.iter().zip(&summary.mean_costs) {
                info!("{} (mean cost {:.6})", path.display(), cost);
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
