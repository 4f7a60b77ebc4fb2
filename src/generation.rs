//! # データセット生成
//!
//! 正解のバネ連鎖系を数値積分し、学習に使う `(z, zdot)` の軌道を保存します。

use crate::dataset::{Trajectory, TrajectorySet};
use crate::error::Result;
use crate::output::{DATA_TAG, RunDirs};
use crate::springs::SpringChain;
use log::info;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::path::PathBuf;
use std::time::Instant;

/// `generate` サブコマンドの設定。
#[derive(Debug, Clone)]
pub struct GenerateOptions {
    pub n_particles: usize,
    pub dim: usize,
    pub trajectories: usize,
    pub frames: usize,
    pub dt: f64,
    pub stride: usize,
    pub ifdrag: u8,
    pub seed: u64,
    pub out_dir: PathBuf,
}

/// データセットのファイル名
pub fn dataset_filename(ifdrag: u8) -> String {
    format!("model_states_{ifdrag}.json")
}

/// 軌道を生成します。
pub fn simulate(options: &GenerateOptions) -> Result<TrajectorySet> {
    let chain = SpringChain::new(options.n_particles, options.dim, options.ifdrag != 0)?;
    let mut rng = StdRng::seed_from_u64(options.seed);
    let mut trajectories = Vec::with_capacity(options.trajectories);
    for _ in 0..options.trajectories {
        let initial = chain.random_state(&mut rng)?;
        let states = chain.simulate(initial, options.dt, options.stride, options.frames);
        let to_f32 = |v: Vec<f64>| v.into_iter().map(|x| x as f32).collect::<Vec<f32>>();
        trajectories.push(Trajectory {
            z: states.iter().map(|s| to_f32(s.to_z())).collect(),
            zdot: states.iter().map(|s| to_f32(chain.zdot(s))).collect(),
        });
    }
    Ok(TrajectorySet {
        n_particles: options.n_particles,
        dim: options.dim,
        trajectories,
    })
}

/// `generate` サブコマンドを実行します。
pub fn run(options: &GenerateOptions) -> Result<PathBuf> {
    info!(
        "バネ連鎖 ({} 粒子, {} 次元) の軌道を {} 本生成します (drag: {})",
        options.n_particles,
        options.dim,
        options.trajectories,
        options.ifdrag != 0
    );
    let start = Instant::now();
    let set = simulate(options)?;

    let dirs = RunDirs::new(&options.out_dir, options.n_particles, false, None, None);
    let path = dirs.file(&dataset_filename(options.ifdrag), DATA_TAG)?;
    set.save(&path)?;
    info!(
        "=> {} x {} 状態を '{}' に保存しました ({:.2?})",
        set.trajectories.len(),
        options.frames,
        path.display(),
        start.elapsed()
    );
    Ok(path)
}
