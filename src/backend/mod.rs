// 数値計算の下回り。モデル側は ndarray の行列をそのまま扱い、
// 活性化関数や乱数による初期化・マスク生成はここにまとめておく
pub mod cpu;

/// Scalar element type used by every tensor in the crate.
pub type Elm = f32;
