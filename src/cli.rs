use crate::error::{HnnError, Result};
use crate::generation::GenerateOptions;
use crate::hamiltonian::ErrorFn;
use crate::training::TrainingConfig;
use burn::config::Config;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// clapでコマンドラインの構造を定義します。
#[derive(Parser, Debug)]
#[command(author, version, about = "Hamiltonian neural network for a chain of springs, built with Burn", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// 実行するサブコマンドを定義します。
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// 正解のバネ連鎖系をシミュレーションしてデータセットを作ります
    Generate(GenerateArgs),
    /// HNNを学習し、結果をファイルに保存します
    Train(TrainArgs),
    /// 保存されたモデルをデータセット上で評価します
    Evaluate(EvaluateArgs),
}

#[derive(Args, Debug)]
pub struct GenerateArgs {
    #[arg(short = 'N', long = "n-particles", default_value_t = 5)]
    pub n_particles: usize,
    #[arg(long, default_value_t = 2)]
    pub dim: usize,
    /// 軌道の本数
    #[arg(long, default_value_t = 100)]
    pub trajectories: usize,
    /// 1 本あたりの記録数
    #[arg(long, default_value_t = 100)]
    pub frames: usize,
    #[arg(long, default_value_t = 1.0e-3)]
    pub dt: f64,
    #[arg(long, default_value_t = 100)]
    pub stride: usize,
    #[arg(long, default_value_t = 0)]
    pub ifdrag: u8,
    #[arg(long, default_value_t = 42)]
    pub seed: u64,
    #[arg(long, default_value = "../results")]
    pub out_dir: PathBuf,
}

impl From<GenerateArgs> for GenerateOptions {
    fn from(args: GenerateArgs) -> Self {
        Self {
            n_particles: args.n_particles,
            dim: args.dim,
            trajectories: args.trajectories,
            frames: args.frames,
            dt: args.dt,
            stride: args.stride,
            ifdrag: args.ifdrag,
            seed: args.seed,
            out_dir: args.out_dir,
        }
    }
}

#[derive(Args, Debug)]
pub struct TrainArgs {
    /// 保存済みの設定ファイル（JSON）。指定した場合は他のオプションを無視します
    #[arg(long)]
    pub config: Option<PathBuf>,
    #[arg(short = 'N', long = "n-particles", default_value_t = 5)]
    pub n_particles: usize,
    #[arg(long, default_value_t = 10000)]
    pub epochs: usize,
    #[arg(long, default_value_t = 42)]
    pub seed: u64,
    /// 結果を日時付きのディレクトリに置く
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub rname: bool,
    #[arg(long, default_value_t = 10)]
    pub saveat: usize,
    #[arg(long, value_enum, default_value_t = ErrorFn::L2Error)]
    pub error_fn: ErrorFn,
    #[arg(long, default_value_t = 1.0e-3)]
    pub dt: f64,
    #[arg(long, default_value_t = 0)]
    pub ifdrag: u8,
    #[arg(long, default_value_t = 100)]
    pub stride: usize,
    /// 運動エネルギー係数を学習する
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub trainm: bool,
    #[arg(long, default_value_t = 1.0e-3)]
    pub lr: f64,
    #[arg(long)]
    pub withdata: Option<String>,
    #[arg(long)]
    pub datapoints: Option<usize>,
    #[arg(long, default_value_t = 100)]
    pub batch_size: usize,
    #[arg(long, default_value_t = 256)]
    pub hidden: usize,
    #[arg(long, default_value_t = 2)]
    pub nhidden: usize,
    #[arg(long, default_value = "../results")]
    pub out_dir: String,
}

impl TrainArgs {
    /// 学習設定を組み立てます。
    pub fn into_config(self) -> Result<TrainingConfig> {
        if let Some(path) = self.config {
            return TrainingConfig::load(&path).map_err(|e| {
                HnnError::InvalidArgument(format!(
                    "設定ファイル '{}' を読み込めません: {e:?}",
                    path.display()
                ))
            });
        }
        Ok(TrainingConfig::new(self.out_dir)
            .with_n_particles(self.n_particles)
            .with_epochs(self.epochs)
            .with_seed(self.seed)
            .with_rname(self.rname)
            .with_saveat(self.saveat)
            .with_error_fn(self.error_fn)
            .with_dt(self.dt)
            .with_ifdrag(self.ifdrag)
            .with_stride(self.stride)
            .with_trainm(self.trainm)
            .with_lr(self.lr)
            .with_withdata(self.withdata)
            .with_datapoints(self.datapoints)
            .with_batch_size(self.batch_size)
            .with_hidden(self.hidden)
            .with_nhidden(self.nhidden))
    }
}

#[derive(Args, Debug)]
pub struct EvaluateArgs {
    /// 学習結果のディレクトリ（`config.json` を含む）
    pub run_dir: PathBuf,
    /// データセットファイル
    pub dataset: PathBuf,
    /// 拡張子なしのモデル名
    #[arg(long, default_value = "trained_model_0")]
    pub model: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn train_flags_build_the_config() {
        let cli = Cli::try_parse_from([
            "spring-hnn",
            "train",
            "-N",
            "4",
            "--epochs",
            "20",
            "--rname",
            "false",
            "--error-fn",
            "L1error",
            "--withdata",
            "full",
        ])
        .unwrap();
        let Commands::Train(args) = cli.command else {
            panic!("expected train");
        };
        let config = args.into_config().unwrap();
        assert_eq!(config.n_particles, 4);
        assert_eq!(config.epochs, 20);
        assert!(!config.rname);
        assert_eq!(config.error_fn, ErrorFn::L1Error);
        assert_eq!(config.withdata.as_deref(), Some("full"));
        assert_eq!(config.batch_size, 100);
    }

    #[test]
    fn config_file_overrides_flags() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.json");
        TrainingConfig::new("elsewhere".to_string())
            .with_epochs(7)
            .save(&path)
            .unwrap();
        let cli = Cli::try_parse_from([
            "spring-hnn",
            "train",
            "--epochs",
            "20",
            "--config",
            path.to_str().unwrap(),
        ])
        .unwrap();
        let Commands::Train(args) = cli.command else {
            panic!("expected train");
        };
        let config = args.into_config().unwrap();
        assert_eq!(config.epochs, 7);
        assert_eq!(config.out_dir, "elsewhere");
    }

    #[test]
    fn generate_defaults() {
        let cli = Cli::try_parse_from(["spring-hnn", "generate"]).unwrap();
        let Commands::Generate(args) = cli.command else {
            panic!("expected generate");
        };
        let options = GenerateOptions::from(args);
        assert_eq!(options.n_particles, 5);
        assert_eq!(options.stride, 100);
    }
}
