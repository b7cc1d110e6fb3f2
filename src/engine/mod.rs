// 計算はすべて即時評価。クリーン経路とノイズ経路はミニバッチごとに
// 2 回の順伝播として明示的に計算し、計算グラフは構築しない

pub mod finetune;
pub mod layer;
pub mod loss;
pub mod optimizer;
pub mod pretrain;
