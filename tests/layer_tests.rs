use ndarray::{Array1, Array2, array};
use rand::{SeedableRng, rngs::StdRng};
use sda_denoise::engine::layer::Layer;
use sda_denoise::engine::layer::denoising::DenoisingAutoencoder;

fn small_autoencoder(corruption: f32) -> DenoisingAutoencoder {
    DenoisingAutoencoder::from_parts(
        array![[0.1, -0.2], [0.3, 0.4]],
        array![0.05, -0.1],
        array![0.0, 0.2],
        corruption,
    )
    .unwrap()
}

fn cost_of(da: &DenoisingAutoencoder, x: &Array2<f32>) -> f32 {
    let z = da.decode(da.encode(x.view()).view());
    da.reconstruction_cost(x.view(), z.view()).unwrap()
}

#[test]
fn test_zero_corruption_is_identity() {
    let mut rng = StdRng::seed_from_u64(0);
    let da = DenoisingAutoencoder::new(&mut rng, 6, 3, 0.0).unwrap();
    let x = array![[0.1, 0.9, 0.3, 0.0, 1.0, 0.5], [0.7, 0.2, 0.4, 0.6, 0.8, 0.05]];
    for _ in 0..5 {
        assert_eq!(da.corrupt(x.view(), &mut rng), x);
    }
}

#[test]
fn test_corruption_only_zeroes_coordinates() {
    let mut rng = StdRng::seed_from_u64(3);
    let da = DenoisingAutoencoder::new(&mut rng, 50, 10, 0.5).unwrap();
    let x = Array2::from_elem((20, 50), 0.7f32);
    let corrupted = da.corrupt(x.view(), &mut rng);
    assert!(corrupted.iter().all(|&v| v == 0.0 || v == 0.7));
    let zeros = corrupted.iter().filter(|&&v| v == 0.0).count();
    assert!(zeros > 300 && zeros < 700, "{} zeroed of 1000", zeros);

    // 毎回サンプルし直される
    let again = da.corrupt(x.view(), &mut rng);
    assert_ne!(corrupted, again);
}

#[test]
fn test_encode_decode_ranges_and_shapes() {
    let mut rng = StdRng::seed_from_u64(11);
    let da = DenoisingAutoencoder::new(&mut rng, 16, 8, 0.0).unwrap();
    let x = Array2::from_shape_fn((5, 16), |(i, j)| ((i * 16 + j) % 7) as f32 / 6.0);

    let h = da.encode(x.view());
    assert_eq!(h.dim(), (5, 8));
    assert!(h.iter().all(|&v| v > 0.0 && v < 1.0));

    let z = da.decode(h.view());
    assert_eq!(z.dim(), (5, 16));
    assert!(z.iter().all(|&v| v > 0.0 && v < 1.0));
}

#[test]
fn test_initialization_bounds() {
    let mut rng = StdRng::seed_from_u64(5);
    let da = DenoisingAutoencoder::new(&mut rng, 64, 32, 0.0).unwrap();
    let limit = 4.0 * (6.0f32 / 96.0).sqrt();
    assert!(da.weights().iter().all(|&w| w.abs() <= limit));
    assert!(da.weights().iter().any(|&w| w.abs() > limit / 2.0));
    assert!(da.hidden_bias().iter().all(|&b| b == 0.0));
    assert!(da.visible_bias().iter().all(|&b| b == 0.0));
}

#[test]
fn test_gradient_step_decreases_cost() {
    let mut da = small_autoencoder(0.0);
    let x = array![[1.0, 0.0], [0.0, 1.0]];
    let mut rng = StdRng::seed_from_u64(0);

    let before = cost_of(&da, &x);
    let reported = da.gradient_step(x.view(), x.view(), 0.1, &mut rng).unwrap();
    let after = cost_of(&da, &x);

    assert!((reported - before).abs() < 1e-6);
    assert!(after < before, "cost went from {} to {}", before, after);
}

#[test]
fn test_hand_computed_gradient_2x2() {
    // 1 サンプル、x = [1, 0]、W = I、バイアス 0
    // y = sigmoid([1, 0]) = [s1, 0.5]
    // z = sigmoid(y · Wᵀ) = [sigmoid(s1), sigmoid(0.5)]
    let da = DenoisingAutoencoder::from_parts(
        array![[1.0, 0.0], [0.0, 1.0]],
        Array1::zeros(2),
        Array1::zeros(2),
        0.0,
    )
    .unwrap();
    let x = array![[1.0, 0.0]];
    let (_, grads) = da.cost_and_gradients(x.view(), x.view()).unwrap();

    let sig = |v: f32| 1.0 / (1.0 + (-v).exp());
    let y = [sig(1.0), sig(0.0)];
    let z = [sig(y[0]), sig(y[1])];
    let dz = [z[0] - 1.0, z[1]];
    // dy_j = Σ_i dz_i W_ij * y_j (1 - y_j), W = I
    let dy = [dz[0] * y[0] * (1.0 - y[0]), dz[1] * y[1] * (1.0 - y[1])];
    for i in 0..2 {
        for j in 0..2 {
            let expected = x[[0, i]] * dy[j] + dz[i] * y[j];
            assert!(
                (grads.w[[i, j]] - expected).abs() < 1e-6,
                "dW[{}][{}] = {}, expected {}",
                i,
                j,
                grads.w[[i, j]],
                expected
            );
        }
        assert!((grads.b_hidden[i] - dy[i]).abs() < 1e-6);
        assert!((grads.b_visible[i] - dz[i]).abs() < 1e-6);
    }
}

#[test]
fn test_gradients_match_finite_differences() {
    let da = DenoisingAutoencoder::from_parts(
        array![[0.2, -0.5, 0.1], [0.4, 0.3, -0.2], [-0.3, 0.1, 0.6], [0.05, -0.4, 0.2]],
        array![0.1, 0.0, -0.1],
        array![0.0, 0.1, -0.2, 0.05],
        0.0,
    )
    .unwrap();
    let clean = array![[1.0, 0.0, 0.5, 0.25], [0.0, 1.0, 0.75, 0.5]];
    let noisy = array![[0.9, 0.1, 0.4, 0.3], [0.1, 0.8, 0.7, 0.6]];
    let (_, grads) = da.cost_and_gradients(clean.view(), noisy.view()).unwrap();

    let eps = 1e-3f32;
    let cost_with = |w: Array2<f32>, bh: Array1<f32>, bv: Array1<f32>| {
        let probe = DenoisingAutoencoder::from_parts(w, bh, bv, 0.0).unwrap();
        let z = probe.decode(probe.encode(noisy.view()).view());
        probe.reconstruction_cost(clean.view(), z.view()).unwrap()
    };

    for i in 0..4 {
        for j in 0..3 {
            let mut plus = da.weights().clone();
            let mut minus = da.weights().clone();
            plus[[i, j]] += eps;
            minus[[i, j]] -= eps;
            let numeric = (cost_with(plus, da.hidden_bias().clone(), da.visible_bias().clone())
                - cost_with(minus, da.hidden_bias().clone(), da.visible_bias().clone()))
                / (2.0 * eps);
            assert!(
                (numeric - grads.w[[i, j]]).abs() < 2e-3,
                "dW[{}][{}]: numeric {} analytic {}",
                i,
                j,
                numeric,
                grads.w[[i, j]]
            );
        }
    }
    for j in 0..3 {
        let mut plus = da.hidden_bias().clone();
        let mut minus = da.hidden_bias().clone();
        plus[j] += eps;
        minus[j] -= eps;
        let numeric = (cost_with(da.weights().clone(), plus, da.visible_bias().clone())
            - cost_with(da.weights().clone(), minus, da.visible_bias().clone()))
            / (2.0 * eps);
        assert!((numeric - grads.b_hidden[j]).abs() < 2e-3);
    }
    for i in 0..4 {
        let mut plus = da.visible_bias().clone();
        let mut minus = da.visible_bias().clone();
        plus[i] += eps;
        minus[i] -= eps;
        let numeric = (cost_with(da.weights().clone(), da.hidden_bias().clone(), plus)
            - cost_with(da.weights().clone(), da.hidden_bias().clone(), minus))
            / (2.0 * eps);
        assert!((numeric - grads.b_visible[i]).abs() < 2e-3);
    }
}

#[test]
fn test_parameters_order() {
    let da = small_autoencoder(0.0);
    let params = da.parameters();
    assert_eq!(params.len(), 3);
    assert_eq!(params[0].shape(), &[2, 2]);
    assert_eq!(params[1], da.hidden_bias().view().into_dyn());
    assert_eq!(params[2], da.visible_bias().view().into_dyn());
}

#[test]
fn test_rejects_mismatched_parts() {
    assert!(
        DenoisingAutoencoder::from_parts(Array2::zeros((3, 2)), Array1::zeros(3), Array1::zeros(3), 0.0)
            .is_err()
    );
    assert!(
        DenoisingAutoencoder::from_parts(Array2::zeros((3, 2)), Array1::zeros(2), Array1::zeros(3), 1.0)
            .is_err()
    );
}
