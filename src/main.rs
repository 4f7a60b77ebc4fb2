//! # バネ連鎖 HNN プログラム
//!
//! `burn` フレームワークを使用して、バネ連鎖系のハミルトニアンを
//! ニューラルネットワークで学習します。
//!
//! ## 使い方
//!
//! ### データセット生成
//! ```bash
//! cargo run --release -- generate -N 5
//! ```
//!
//! ### 学習
//! ```bash
//! cargo run --release -- train -N 5 --epochs 10000
//! ```
//!
//! ### 評価
//! ```bash
//! cargo run --release -- evaluate <RUN_DIR> <DATASET> --model trained_model_0
//! ```
//!
//! ログの詳細度は `RUST_LOG` で変更できます。

use clap::Parser;
use log::info;
use spring_hnn::cli::{Cli, Commands};
use spring_hnn::{generation, inference, training};

/// プログラムのエントリーポイント。
///
/// コマンドライン引数を解析し、各サブコマンドの処理に振り分けます。
fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Generate(args) => {
            generation::run(&args.into())?;
        }
        Commands::Train(args) => {
            let report = training::run(&args.into_config()?)?;
            info!("=> 結果を '{}' に保存しました。", report.run_dir.display());
        }
        Commands::Evaluate(args) => {
            inference::run(&args.run_dir, &args.model, &args.dataset)?;
        }
    }

    Ok(())
}
