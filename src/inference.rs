use crate::dataset::TrajectorySet;
use crate::error::{HnnError, Result};
use crate::hamiltonian::r2_score;
use crate::model::HamiltonianModelConfig;
use crate::training::{TrainingConfig, evaluate_loss};
use burn::backend::NdArray;
use burn::config::Config;
use burn::module::Module;
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder};
use log::info;
use std::path::{Path, PathBuf};
use std::time::Instant;

type MyBackend = NdArray<f32>;

/// 評価結果
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluation {
    pub samples: usize,
    pub loss: f32,
    pub r2: f64,
}

/// `evaluate`サブコマンドを実行します。
///
/// 学習時の `config.json` からモデルの形状を復元し、`model` を読み込んで
/// データセット全体の `zdot` について損失と決定係数を計算します。
pub fn run(run_dir: &Path, model: &str, dataset: &Path) -> Result<Evaluation> {
    let device = Default::default();

    let config = TrainingConfig::load(run_dir.join("config.json"))
        .map_err(|e| HnnError::InvalidArgument(format!("学習設定 config.json を読み込めません: {e:?}")))?;
    let model_path: PathBuf = run_dir.join(model);
    if !model_path.with_extension("mpk").exists() {
        return Err(HnnError::InvalidArgument(format!(
            "モデルファイル '{}' が見つかりません。最初に 'train' コマンドでモデルを学習・保存してください。",
            model_path.with_extension("mpk").display()
        )));
    }
    let set = TrajectorySet::load(dataset)?;

    info!("推論を実行します - バックエンド: NdArray (CPU)");
    let start = Instant::now();

    info!("保存済みモデルを '{}' からロード中...", model_path.display());
    let model = HamiltonianModelConfig::new(set.n_particles, set.dim)
        .with_hidden(config.hidden)
        .with_n_hidden(config.nhidden)
        .with_train_kinetic(config.trainm)
        .with_drag(config.ifdrag != 0)
        .init::<MyBackend>(&device)
        .load_file(
            model_path,
            &NamedMpkFileRecorder::<FullPrecisionSettings>::new(),
            &device,
        )?;

    let samples = set.samples();
    let batch = samples.to_tensors::<MyBackend>(&device);
    let loss = evaluate_loss(&model, &batch, config.error_fn);
    let pred = model
        .zdot(batch.positions.clone(), batch.momenta.clone())
        .into_data()
        .to_vec::<f32>()
        .map_err(|e| HnnError::TensorData(format!("{e:?}")))?;
    let truth = batch
        .zdot
        .into_data()
        .to_vec::<f32>()
        .map_err(|e| HnnError::TensorData(format!("{e:?}")))?;
    let evaluation = Evaluation {
        samples: samples.len(),
        loss,
        r2: r2_score(&truth, &pred),
    };

    info!(
        "{} 状態: {:?} = {:.6e}, R² = {:.6}",
        evaluation.samples,
        config.error_fn,
        evaluation.loss,
        evaluation.r2
    );
    info!("=> 推論時間: {:.2?}", start.elapsed());
    Ok(evaluation)
}
