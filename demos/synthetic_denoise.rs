use ndarray::Array2;
use ndarray_rand::RandomExt;
use rand::distributions::Uniform;
use rand::{SeedableRng, rngs::StdRng};

use sda_denoise::config::TrainingConfig;
use sda_denoise::data::dataset::{PatchSet, PatchedImage};
use sda_denoise::inference::InferencePipeline;
use sda_denoise::runner;
use sda_denoise::vis::save_image;

// 合成画像（なめらかなグラデーション）に一様ノイズを加え、
// 8x8 パッチで学習してからノイズ画像全体をデノイズする
fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let (width, height) = (64, 64);
    let mut rng = StdRng::seed_from_u64(42);

    let clean_plane = Array2::from_shape_fn((height, width), |(y, x)| {
        let fx = x as f32 / width as f32;
        let fy = y as f32 / height as f32;
        0.5 + 0.4 * (6.0 * fx).sin() * (4.0 * fy).cos()
    });
    let noise = Array2::random_using((height, width), Uniform::new(-0.2f32, 0.2), &mut rng);
    let noisy_plane = (&clean_plane + &noise).mapv(|v| v.clamp(0.0, 1.0));

    let clean = PatchedImage::from_planes(vec![("l".to_string(), clean_plane)], 8, 8).unwrap();
    let noisy = PatchedImage::from_planes(vec![("l".to_string(), noisy_plane)], 8, 8).unwrap();
    let patches = PatchSet::new(
        clean.stacked_patches().unwrap(),
        noisy.stacked_patches().unwrap(),
    )
    .unwrap();

    // 64 パッチなのでバッチサイズは 64 を割り切る値にする
    let training = TrainingConfig {
        pretraining_epochs: 50,
        training_epochs: 200,
        pretrain_lr: 0.1,
        finetune_lr: 0.1,
        hidden_layers_fraction: vec![0.5, 0.5],
        batch_size: 16,
        log_interval: 25,
        ..TrainingConfig::default()
    };
    let (stack, report, finetune_costs) = runner::train(&training, &patches, (8, 8)).unwrap();
    for (layer, costs) in report.layer_costs.iter().enumerate() {
        println!(
            "layer {}: pretraining cost {:.4} -> {:.4}",
            layer,
            costs.first().copied().unwrap_or(f32::NAN),
            costs.last().copied().unwrap_or(f32::NAN)
        );
    }
    println!(
        "fine-tuning cost {:.4} -> {:.4}",
        finetune_costs.first().copied().unwrap_or(f32::NAN),
        finetune_costs.last().copied().unwrap_or(f32::NAN)
    );

    let pipeline = InferencePipeline::new(&stack);
    let denoised = pipeline.denoise_image(&noisy).unwrap();
    let mean = |costs: Vec<f32>| costs.iter().sum::<f32>() / costs.len() as f32;
    let before = mean(pipeline.reconstruction_costs(&noisy, &clean).unwrap());
    let after = mean(pipeline.reconstruction_costs(&denoised, &clean).unwrap());
    println!("mean patch cost: noisy {:.4}, denoised {:.4}", before, after);

    let out_dir = std::path::Path::new("demo_output");
    for (name, image) in [("clean", &clean), ("noisy", &noisy), ("denoised", &denoised)] {
        let path = save_image(image, name, out_dir).unwrap();
        println!("wrote {}", path.display());
    }
}
