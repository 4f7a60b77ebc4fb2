use crate::dataset::{PhaseBatch, TrajectorySet, batches};
use crate::error::HnnError;
use crate::generation::dataset_filename;
use crate::hamiltonian::{ErrorFn, physics_loss};
use crate::model::{HamiltonianModel, HamiltonianModelConfig};
use crate::output::{DATA_TAG, RunDirs, TAG, save_json, write_metadata};
use crate::plot::plot_loss_history;
use burn::backend::{Autodiff, NdArray};
use burn::config::Config;
use burn::module::{AutodiffModule, Module};
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::prelude::Backend;
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder};
use burn::tensor::ElementConversion;
use burn::tensor::backend::AutodiffBackend;
use log::{info, warn};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Instant;

type MyBackend = Autodiff<NdArray<f32>>;

/// 学習用に使うサンプルの割合
pub const TRAIN_FRACTION: f64 = 0.75;

/// 学習設定
#[derive(Config, Debug)]
pub struct TrainingConfig {
    /// 結果を置くルートディレクトリ
    pub out_dir: String,
    /// 出力ディレクトリ名に使う粒子数（モデルの形状はデータセットから決まります）
    #[config(default = 5)]
    pub n_particles: usize,
    #[config(default = 10000)]
    pub epochs: usize,
    #[config(default = 42)]
    pub seed: u64,
    /// 結果を日時付きのディレクトリに置くかどうか
    #[config(default = true)]
    pub rname: bool,
    /// チェックポイントを保存する間隔（エポック）
    #[config(default = 10)]
    pub saveat: usize,
    #[config(default = "ErrorFn::L2Error")]
    pub error_fn: ErrorFn,
    /// データ生成時の時間刻み（記録用）
    #[config(default = 1.0e-3)]
    pub dt: f64,
    #[config(default = 0)]
    pub ifdrag: u8,
    /// データ生成時の記録間隔（記録用）
    #[config(default = 100)]
    pub stride: usize,
    /// 運動エネルギー係数を学習するかどうか
    #[config(default = true)]
    pub trainm: bool,
    #[config(default = 1.0e-3)]
    pub lr: f64,
    #[config(default = "None")]
    pub withdata: Option<String>,
    #[config(default = "None")]
    pub datapoints: Option<usize>,
    #[config(default = 100)]
    pub batch_size: usize,
    #[config(default = 256)]
    pub hidden: usize,
    #[config(default = 2)]
    pub nhidden: usize,
}

/// エポックごとの学習・テスト損失。
#[derive(Serialize, Debug, Clone, Default)]
pub struct LossHistory {
    pub train: Vec<f32>,
    pub test: Vec<f32>,
}

/// 学習結果の概要。
#[derive(Debug, Clone)]
pub struct TrainReport {
    pub run_dir: PathBuf,
    pub history: LossHistory,
    pub skipped_steps: usize,
}

/// `train`サブコマンドを実行します。
pub fn run(config: &TrainingConfig) -> crate::Result<TrainReport> {
    let device = Default::default();
    train::<MyBackend>(config, &device)
}

/// 学習ループ本体。
///
/// データセットを読み込み、75% を学習、残りをテストに分けて Adam で最適化します。
/// `saveat` エポックごとにモデル・損失・グラフを保存します。
pub fn train<B: AutodiffBackend>(config: &TrainingConfig, device: &B::Device) -> crate::Result<TrainReport> {
    if config.saveat == 0 {
        return Err(HnnError::InvalidArgument("saveat は 1 以上を指定してください".into()));
    }
    info!("Configs: {config}");
    B::seed(config.seed);

    let dirs = RunDirs::new(
        &config.out_dir,
        config.n_particles,
        config.rname,
        config.withdata.clone(),
        config.datapoints,
    );
    let set = TrajectorySet::load(&dirs.dir(DATA_TAG).join(dataset_filename(config.ifdrag)))?;
    if set.n_particles != config.n_particles {
        warn!(
            "データセットの粒子数 {} が --n-particles ({}) と一致しません",
            set.n_particles, config.n_particles
        );
    }

    let (train_samples, test_samples) = set.samples().shuffle_split(config.seed, TRAIN_FRACTION);
    if train_samples.is_empty() || test_samples.is_empty() {
        return Err(HnnError::InvalidDataset(format!(
            "学習サンプル {} 個、テストサンプル {} 個: それぞれ 1 個以上必要です",
            train_samples.len(),
            test_samples.len()
        )));
    }
    let batch_size = config.batch_size.min(train_samples.len());
    let train_batches: Vec<PhaseBatch<B>> = batches(&train_samples, Some(batch_size))
        .iter()
        .map(|b| b.to_tensors(device))
        .collect();
    let train_full = train_samples.to_tensors::<B::InnerBackend>(device);
    let test_full = test_samples.to_tensors::<B::InnerBackend>(device);
    info!(
        "学習 {} / テスト {} サンプル、サイズ {} のバッチが {} 個",
        train_samples.len(),
        test_samples.len(),
        batch_size,
        train_batches.len()
    );

    if config.ifdrag != 0 {
        info!("抵抗: 学習あり");
    } else {
        info!("抵抗なし");
    }
    let mut model = HamiltonianModelConfig::new(set.n_particles, set.dim)
        .with_hidden(config.hidden)
        .with_n_hidden(config.nhidden)
        .with_train_kinetic(config.trainm)
        .with_drag(config.ifdrag != 0)
        .init::<B>(device);
    let mut optim = AdamConfig::new().init();
    config.save(dirs.file("config.json", TAG)?)?;

    let model_name = |suffix: &str| format!("{suffix}_{}", config.ifdrag);
    let loss_file = dirs.file(&format!("loss_array_{}.json", config.ifdrag), TAG)?;
    let plot_file = dirs.file(&format!("training_loss_{}.png", config.ifdrag), TAG)?;

    let mut history = LossHistory::default();
    let mut train_time = Vec::with_capacity(config.epochs);
    let mut best_loss = 1000.0f32;
    let mut skipped_steps = 0;
    let mut last_epoch = 0;
    let training_start = Instant::now();

    info!("training ...");
    for epoch in 0..config.epochs {
        for batch in &train_batches {
            let loss = physics_loss(&model, batch, config.error_fn);
            let value: f32 = loss.clone().into_scalar().elem();
            if !value.is_finite() {
                warn!("エポック {epoch}: バッチ損失が有限ではありません ({value})。このステップをスキップします。");
                skipped_steps += 1;
                continue;
            }
            let grads = GradientsParams::from_grads(loss.backward(), &model);
            model = optim.step(config.lr, model, grads);
        }

        let valid = model.valid();
        let train_loss = evaluate_loss(&valid, &train_full, config.error_fn);
        let test_loss = evaluate_loss(&valid, &test_full, config.error_fn);
        history.train.push(train_loss);
        history.test.push(test_loss);

        if epoch % config.saveat == 0 {
            info!("Epoch: {epoch}/{}  {train_loss}, {test_loss}", config.epochs);
            save_model(&model, &dirs.file(&model_name("hnn_trained_model"), TAG)?, epoch)?;
            save_json(&loss_file, &history, epoch)?;
            if best_loss > train_loss {
                best_loss = train_loss;
                let low = format!("{}_low", model_name("hnn_trained_model"));
                save_model(&model, &dirs.file(&low, TAG)?, epoch)?;
            }
            plot_or_warn(&plot_file, &history);
        }

        train_time.push(training_start.elapsed().as_secs_f64());
        last_epoch = epoch;
    }
    info!("学習が完了しました。=> 学習時間: {:.2?}", training_start.elapsed());

    plot_or_warn(&plot_file, &history);
    save_model(&model, &dirs.file(&model_name("trained_model"), TAG)?, last_epoch)?;
    save_json(&loss_file, &history, last_epoch)?;
    save_json(&dirs.file("train_time.json", TAG)?, &train_time, last_epoch)?;

    Ok(TrainReport {
        run_dir: dirs.dir(TAG),
        history,
        skipped_steps,
    })
}

/// 勾配を追跡しないバックエンドでバッチ全体の損失を計算します。
pub fn evaluate_loss<B: Backend>(
    model: &HamiltonianModel<B>,
    batch: &PhaseBatch<B>,
    error_fn: ErrorFn,
) -> f32 {
    physics_loss(model, batch, error_fn).into_scalar().elem()
}

/// モデルを `{path}.mpk` に保存し、メタデータを書きます。
fn save_model<B: Backend>(model: &HamiltonianModel<B>, path: &Path, savedat: usize) -> crate::Result<()> {
    model
        .clone()
        .save_file(path, &NamedMpkFileRecorder::<FullPrecisionSettings>::new())?;
    write_metadata(&path.with_extension("mpk"), savedat)
}

fn plot_or_warn(path: &Path, history: &LossHistory) {
    if let Err(e) = plot_loss_history(path, &history.train, &history.test) {
        warn!("グラフの描画に失敗しました: {e}");
    }
}
