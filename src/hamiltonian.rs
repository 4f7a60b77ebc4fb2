use crate::dataset::PhaseBatch;
use crate::model::HamiltonianModel;
use burn::nn::loss::{MseLoss, Reduction};
use burn::prelude::Backend;
use burn::tensor::Tensor;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// 予測した `zdot` と正解の誤差関数。
#[derive(Serialize, Deserialize, ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorFn {
    /// 二乗誤差の平均
    #[serde(rename = "L2error")]
    #[value(name = "L2error")]
    L2Error,
    #[serde(rename = "MSE")]
    #[value(name = "MSE")]
    Mse,
    /// 絶対誤差の平均
    #[serde(rename = "L1error")]
    #[value(name = "L1error")]
    L1Error,
}

impl ErrorFn {
    pub fn forward<B: Backend>(&self, pred: Tensor<B, 2>, target: Tensor<B, 2>) -> Tensor<B, 1> {
        match self {
            ErrorFn::L2Error | ErrorFn::Mse => {
                MseLoss::new().forward(pred, target, Reduction::Mean)
            }
            ErrorFn::L1Error => (pred - target).abs().mean(),
        }
    }
}

/// 物理損失を計算します。
///
/// 学習中のハミルトニアンから求めた位相空間の右辺 `zdot` と、
/// データの `zdot` との誤差を返します。
pub fn physics_loss<B: Backend>(
    model: &HamiltonianModel<B>,
    batch: &PhaseBatch<B>,
    error_fn: ErrorFn,
) -> Tensor<B, 1> {
    let pred = model.zdot(batch.positions.clone(), batch.momenta.clone());
    error_fn.forward(pred, batch.zdot.clone())
}

/// 決定係数 `R² = 1 - SS_res / SS_tot`。
pub fn r2_score(truth: &[f32], pred: &[f32]) -> f64 {
    let n = truth.len() as f64;
    if n == 0.0 {
        return f64::NAN;
    }
    let mean = truth.iter().map(|&y| y as f64).sum::<f64>() / n;
    let ss_tot: f64 = truth.iter().map(|&y| (y as f64 - mean).powi(2)).sum();
    let ss_res: f64 = truth
        .iter()
        .zip(pred)
        .map(|(&y, &p)| (y as f64 - p as f64).powi(2))
        .sum();
    if ss_tot == 0.0 {
        return if ss_res == 0.0 { 1.0 } else { 0.0 };
    }
    1.0 - ss_res / ss_tot
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Samples;
    use crate::model::HamiltonianModelConfig;
    use burn::backend::{Autodiff, NdArray};
    use burn::module::AutodiffModule;
    use burn::optim::{AdamConfig, GradientsParams, Optimizer};
    use burn::tensor::ElementConversion;

    #[test]
    fn error_functions() {
        let device = Default::default();
        let pred = Tensor::<NdArray<f32>, 2>::from_floats([[1.0, 2.0], [3.0, 4.0]], &device);
        let target = Tensor::<NdArray<f32>, 2>::from_floats([[1.0, 0.0], [3.0, 5.0]], &device);
        let l2: f32 = ErrorFn::L2Error
            .forward(pred.clone(), target.clone())
            .into_scalar()
            .elem();
        let l1: f32 = ErrorFn::L1Error.forward(pred, target).into_scalar().elem();
        assert!((l2 - 1.25).abs() < 1e-6);
        assert!((l1 - 0.75).abs() < 1e-6);
    }

    #[test]
    fn error_fn_names_follow_cli_spelling() {
        assert_eq!(ErrorFn::from_str("L2error", false).unwrap(), ErrorFn::L2Error);
        assert_eq!(ErrorFn::from_str("L1error", false).unwrap(), ErrorFn::L1Error);
        assert_eq!(serde_json::to_string(&ErrorFn::Mse).unwrap(), "\"MSE\"");
    }

    #[test]
    fn r2_of_perfect_and_mean_predictions() {
        let truth = [1.0, 2.0, 3.0, 4.0];
        assert!((r2_score(&truth, &truth) - 1.0).abs() < 1e-12);
        assert!(r2_score(&truth, &[2.5; 4]).abs() < 1e-12);
    }

    #[test]
    fn adam_steps_reduce_the_physics_loss() {
        type B = Autodiff<NdArray<f32>>;
        let device = Default::default();
        let mut samples = Samples::new(2, 1);
        for i in 0..8 {
            let x = i as f32 * 0.1;
            // 単位質量の自由粒子: zdot = [p, 0]
            samples.push(&[x, -x, 0.5, -0.5], &[0.5, -0.5, 0.0, 0.0]);
        }
        let batch = samples.to_tensors::<B>(&device);
        let mut model = HamiltonianModelConfig::new(2, 1)
            .with_hidden(8)
            .init::<B>(&device);
        let mut optim = AdamConfig::new().init();

        let initial: f32 = physics_loss(&model.valid(), &samples.to_tensors(&device), ErrorFn::L2Error)
            .into_scalar()
            .elem();
        for _ in 0..200 {
            let loss = physics_loss(&model, &batch, ErrorFn::L2Error);
            let grads = GradientsParams::from_grads(loss.backward(), &model);
            model = optim.step(1e-2, model, grads);
        }
        let trained: f32 = physics_loss(&model.valid(), &samples.to_tensors(&device), ErrorFn::L2Error)
            .into_scalar()
            .elem();
        assert!(trained < initial, "{trained} >= {initial}");
    }
}
