use ndarray::{ArrayD, IxDyn, array};
use rand::{SeedableRng, rngs::StdRng};
use sda_denoise::data::dataset::PatchSet;
use sda_denoise::engine::finetune::{FinetuneConfig, FinetuningOptimizer};
use sda_denoise::engine::optimizer::{Optimizer, SGD};
use sda_denoise::engine::pretrain::{LayerState, PretrainConfig, PretrainingScheduler};
use sda_denoise::{SdaError, StackConfig, StackedDenoisingAutoencoder};

fn small_problem(n: usize) -> PatchSet {
    let clean = ndarray::Array2::from_shape_fn((n, 4), |(i, j)| if (i + j) % 2 == 0 { 0.9 } else { 0.1 });
    let noisy = clean.mapv(|v| (v + 0.15f32).min(1.0) * 0.9);
    PatchSet::new(clean, noisy).unwrap()
}

#[test]
fn test_sgd_convergence() {
    // L = x^2, dL/dx = 2x。lr = 0.1 なら毎ステップ x は 0.8 倍になる
    let mut x = ArrayD::from_elem(IxDyn(&[1]), 2.0f32);
    let mut optimizer = SGD::new(0.1);
    for _ in 0..10 {
        let grad = x.mapv(|v| 2.0 * v);
        optimizer.step(vec![x.view_mut()], &[grad]).unwrap();
    }
    let expected = 2.0 * 0.8f32.powi(10);
    let value = x.sum();
    assert!((value - expected).abs() < 1e-5, "got {}", value);
}

#[test]
fn test_sgd_rejects_mismatched_gradients() {
    let mut a = array![1.0f32, 2.0].into_dyn();
    let mut b = array![[1.0f32]].into_dyn();
    let mut optimizer = SGD::new(1.0);

    let wrong_shape = vec![ArrayD::zeros(IxDyn(&[2])), ArrayD::zeros(IxDyn(&[2]))];
    let err = optimizer
        .step(vec![a.view_mut(), b.view_mut()], &wrong_shape)
        .unwrap_err();
    assert!(matches!(err, SdaError::DimensionMismatch { .. }));
    // 途中まで更新されることはない
    assert_eq!(a, array![1.0f32, 2.0].into_dyn());

    let too_few = vec![ArrayD::zeros(IxDyn(&[2]))];
    assert!(optimizer.step(vec![a.view_mut(), b.view_mut()], &too_few).is_err());
}

#[test]
fn test_scheduler_trains_layers_in_order() {
    let config = StackConfig::from_fractions(&[0.5, 0.5], 2, 2, 0.0).unwrap();
    let mut rng = StdRng::seed_from_u64(3);
    let mut stack = StackedDenoisingAutoencoder::new(&mut rng, &config).unwrap();
    let data = small_problem(8);

    let mut scheduler = PretrainingScheduler::new(
        PretrainConfig {
            epochs: 5,
            learning_rate: 0.1,
            batch_size: 4,
            ..PretrainConfig::default()
        },
        stack.n_layers(),
    );
    assert_eq!(scheduler.states(), &[LayerState::NotStarted, LayerState::NotStarted]);
    assert!(!scheduler.is_done());

    let report = scheduler.run(&mut stack, &data, &mut rng).unwrap();
    assert!(scheduler.is_done());
    assert_eq!(report.layer_costs.len(), 2);
    assert!(report.layer_costs.iter().all(|c| c.len() == 5));
    assert!(report.layer_costs.iter().flatten().all(|c| c.is_finite()));
    assert_eq!(report.final_learning_rate, 0.1);
}

#[test]
fn test_scheduler_learning_rate_carries_across_layers() {
    let config = StackConfig::from_fractions(&[0.5, 0.5], 2, 2, 0.0).unwrap();
    let mut rng = StdRng::seed_from_u64(3);
    let mut stack = StackedDenoisingAutoencoder::new(&mut rng, &config).unwrap();
    let data = small_problem(4);

    // 3 エポックごとに調整、しきい値 0 なので倍に戻ることはない
    let mut scheduler = PretrainingScheduler::new(
        PretrainConfig {
            epochs: 4,
            learning_rate: 0.8,
            batch_size: 4,
            adjust_interval: 3,
            plateau_threshold: 0.0,
            log_interval: 1,
        },
        stack.n_layers(),
    );
    let report = scheduler.run(&mut stack, &data, &mut rng).unwrap();
    // 層 0 のエポック 3 で 0.4、層 1 のエポック 3 で 0.2
    assert!((report.final_learning_rate - 0.2).abs() < 1e-7);
    assert!((scheduler.learning_rate() - 0.2).abs() < 1e-7);
}

#[test]
fn test_scheduler_rejects_wrong_layer_count() {
    let config = StackConfig::from_fractions(&[0.5], 2, 2, 0.0).unwrap();
    let mut rng = StdRng::seed_from_u64(3);
    let mut stack = StackedDenoisingAutoencoder::new(&mut rng, &config).unwrap();
    let mut scheduler = PretrainingScheduler::new(PretrainConfig::default(), 3);
    assert!(scheduler.run(&mut stack, &small_problem(4), &mut rng).is_err());
}

#[test]
fn test_batch_size_must_divide_patches() {
    let config = StackConfig::from_fractions(&[0.5], 2, 2, 0.0).unwrap();
    let mut rng = StdRng::seed_from_u64(3);
    let mut stack = StackedDenoisingAutoencoder::new(&mut rng, &config).unwrap();
    let data = small_problem(10);

    let mut scheduler = PretrainingScheduler::new(
        PretrainConfig {
            batch_size: 4,
            ..PretrainConfig::default()
        },
        1,
    );
    assert!(matches!(
        scheduler.run(&mut stack, &data, &mut rng),
        Err(SdaError::BatchSize { batch_size: 4, n_patches: 10 })
    ));

    let finetune = FinetuningOptimizer::new(FinetuneConfig {
        epochs: 1,
        learning_rate: 0.1,
        batch_size: 3,
        log_interval: 1,
    });
    assert!(matches!(
        finetune.run(&mut stack, &data),
        Err(SdaError::BatchSize { .. })
    ));
}

#[test]
fn test_finetuning_reduces_cost() {
    let config = StackConfig::from_fractions(&[0.5], 2, 2, 0.0).unwrap();
    let mut rng = StdRng::seed_from_u64(5);
    let mut stack = StackedDenoisingAutoencoder::new(&mut rng, &config).unwrap();
    let data = small_problem(8);

    let before = stack.finetune_cost(data.clean(), data.noisy()).unwrap();
    let costs = FinetuningOptimizer::new(FinetuneConfig {
        epochs: 30,
        learning_rate: 0.5,
        batch_size: 4,
        log_interval: 10,
    })
    .run(&mut stack, &data)
    .unwrap();
    let after = stack.finetune_cost(data.clean(), data.noisy()).unwrap();

    assert_eq!(costs.len(), 30);
    assert!(after < before, "cost went from {} to {}", before, after);
    assert!(costs[29] < costs[0]);
}

#[test]
fn test_diverging_finetune_is_reported() {
    let config = StackConfig::from_fractions(&[0.5], 2, 2, 0.0).unwrap();
    let mut rng = StdRng::seed_from_u64(5);
    let mut stack = StackedDenoisingAutoencoder::new(&mut rng, &config).unwrap();
    let data = small_problem(4);

    let result = FinetuningOptimizer::new(FinetuneConfig {
        epochs: 3,
        learning_rate: f32::NAN,
        batch_size: 4,
        log_interval: 1,
    })
    .run(&mut stack, &data);
    assert!(matches!(result, Err(SdaError::Diverged { epoch: 2, .. })));
}

#[test]
fn test_diverging_pretraining_is_reported() {
    let config = StackConfig::from_fractions(&[0.5, 0.5], 2, 2, 0.0).unwrap();
    let mut rng = StdRng::seed_from_u64(5);
    let mut stack = StackedDenoisingAutoencoder::new(&mut rng, &config).unwrap();
    let data = small_problem(4);

    let mut scheduler = PretrainingScheduler::new(
        PretrainConfig {
            epochs: 3,
            learning_rate: f32::NAN,
            batch_size: 4,
            ..PretrainConfig::default()
        },
        stack.n_layers(),
    );
    let result = scheduler.run(&mut stack, &data, &mut rng);
    match result {
        Err(SdaError::Diverged { phase, epoch, cost }) => {
            assert_eq!(phase, "pretraining layer 0");
            assert_eq!(epoch, 1);
            assert!(cost.is_nan());
        }
        other => panic!("expected divergence, got {:?}", other.map(|r| r.layer_costs)),
    }
    assert_eq!(scheduler.states()[0], LayerState::Running { epoch: 1 });
    assert_eq!(scheduler.states()[1], LayerState::NotStarted);
}
