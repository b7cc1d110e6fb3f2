use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use ndarray_rand::RandomExt;
use rand::{Rng, distributions::Uniform};

use crate::backend::Elm;

/// Elementwise logistic function.
pub fn sigmoid(a: &Array2<Elm>) -> Array2<Elm> {
    a.mapv(|v| 1.0 / (1.0 + (-v).exp()))
}

/// `sigmoid'(x)` expressed through the activation `s = sigmoid(x)`.
pub fn sigmoid_grad(s: &Array2<Elm>) -> Array2<Elm> {
    s.mapv(|v| v * (1.0 - v))
}

/// `sigmoid(x · w + b)` for a row batch `x`.
pub fn affine_sigmoid(x: ArrayView2<Elm>, w: ArrayView2<Elm>, b: ArrayView1<Elm>) -> Array2<Elm> {
    let pre = x.dot(&w) + &b;
    sigmoid(&pre)
}

/// Sums a row batch into one vector (bias gradients).
pub fn sum_rows(a: &Array2<Elm>) -> Array1<Elm> {
    a.sum_axis(Axis(0))
}

pub fn random_uniform<R: Rng + ?Sized>(
    shape: (usize, usize),
    low: Elm,
    high: Elm,
    rng: &mut R,
) -> Array2<Elm> {
    Array2::random_using(shape, Uniform::new(low, high), rng)
}

/// Keep-mask with entries 0.0 (dropped, probability `level`) or 1.0.
pub fn keep_mask<R: Rng + ?Sized>(shape: (usize, usize), level: Elm, rng: &mut R) -> Array2<Elm> {
    Array2::random_using(shape, Uniform::new(0.0, 1.0), rng)
        .mapv(|u: Elm| if u < level { 0.0 } else { 1.0 })
}
