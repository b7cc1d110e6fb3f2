use ndarray::{Array2, ArrayView2, ArrayViewD, ArrayViewMutD};

use crate::backend::Elm;

pub mod denoising;
pub mod regression;
pub mod stack;

// 行列に対する演算の集合をまとめておくレイヤーのトレイト
// 入力は [Batch, In] の行バッチ、出力は [Batch, Out]
pub trait Layer {
    fn forward(&self, x: ArrayView2<Elm>) -> Array2<Elm>;

    // パラメータを返す（学習対象の行列・ベクトル）
    fn parameters(&self) -> Vec<ArrayViewD<'_, Elm>>;

    fn parameters_mut(&mut self) -> Vec<ArrayViewMutD<'_, Elm>>;
}
