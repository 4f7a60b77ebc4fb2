//! # 軌道データセット
//!
//! 位相空間の状態 `z` とその時間微分 `zdot` の組を軌道ごとに保持し、
//! 学習用のシャッフル・分割・バッチ化を行います。

use crate::error::{HnnError, Result};
use burn::prelude::Backend;
use burn::tensor::{Tensor, TensorData};
use log::info;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

/// 1 本の軌道。各フレームは `2N * dim` の平坦化された配列です
/// （先頭 `N` 行が位置、残り `N` 行が運動量）。
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Trajectory {
    pub z: Vec<Vec<f32>>,
    pub zdot: Vec<Vec<f32>>,
}

/// 軌道の集合と系の形状。
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TrajectorySet {
    pub n_particles: usize,
    pub dim: usize,
    pub trajectories: Vec<Trajectory>,
}

impl TrajectorySet {
    pub fn frame_len(&self) -> usize {
        2 * self.n_particles * self.dim
    }

    /// 全フレームの形状を検査します。
    pub fn validate(&self) -> Result<()> {
        if self.n_particles == 0 || self.dim == 0 {
            return Err(HnnError::InvalidDataset(format!(
                "粒子数と次元は 1 以上が必要です (n_particles = {}, dim = {})",
                self.n_particles, self.dim
            )));
        }
        if self.trajectories.is_empty() {
            return Err(HnnError::InvalidDataset("軌道がありません".into()));
        }
        let expected = self.frame_len();
        for (t, traj) in self.trajectories.iter().enumerate() {
            if traj.z.len() != traj.zdot.len() {
                return Err(HnnError::InvalidDataset(format!(
                    "軌道 {t}: 状態 {} 個に対して時間微分が {} 個です",
                    traj.z.len(),
                    traj.zdot.len()
                )));
            }
            if let Some(bad) = traj
                .z
                .iter()
                .chain(&traj.zdot)
                .find(|frame| frame.len() != expected)
            {
                return Err(HnnError::InvalidDataset(format!(
                    "軌道 {t}: フレーム長 {} (期待値 {expected})",
                    bad.len()
                )));
            }
        }
        Ok(())
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer(writer, self)?;
        Ok(())
    }

    /// ファイルからデータセットを読み込みます。存在しない場合は
    /// [`HnnError::MissingDataset`] を返します。
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(HnnError::MissingDataset(path.display().to_string()));
        }
        let reader = BufReader::new(File::open(path)?);
        let set: Self = serde_json::from_reader(reader)?;
        set.validate()?;
        info!(
            "Total number of data points: {}x{}",
            set.trajectories.len(),
            set.trajectories[0].z.len()
        );
        Ok(set)
    }

    /// 全軌道のフレームを 1 つのサンプル列にまとめます。
    pub fn samples(&self) -> Samples {
        let mut samples = Samples::new(self.n_particles, self.dim);
        for traj in &self.trajectories {
            for (z, zdot) in traj.z.iter().zip(&traj.zdot) {
                samples.push(z, zdot);
            }
        }
        samples
    }
}

/// 平坦化したサンプル列。`z` と `zdot` はどちらも `len * 2N * dim` 要素。
#[derive(Debug, Clone, PartialEq)]
pub struct Samples {
    pub n_particles: usize,
    pub dim: usize,
    z: Vec<f32>,
    zdot: Vec<f32>,
}

impl Samples {
    pub fn new(n_particles: usize, dim: usize) -> Self {
        Self {
            n_particles,
            dim,
            z: Vec::new(),
            zdot: Vec::new(),
        }
    }

    fn frame_len(&self) -> usize {
        2 * self.n_particles * self.dim
    }

    fn half_len(&self) -> usize {
        self.n_particles * self.dim
    }

    pub fn push(&mut self, z: &[f32], zdot: &[f32]) {
        self.z.extend_from_slice(z);
        self.zdot.extend_from_slice(zdot);
    }

    pub fn len(&self) -> usize {
        self.z.len() / self.frame_len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn select(&self, indices: impl IntoIterator<Item = usize>) -> Self {
        let width = self.frame_len();
        let mut out = Self::new(self.n_particles, self.dim);
        for i in indices {
            out.push(
                &self.z[i * width..(i + 1) * width],
                &self.zdot[i * width..(i + 1) * width],
            );
        }
        out
    }

    /// サンプルの連続区間 `[start, end)` を取り出します。
    pub fn slice(&self, start: usize, end: usize) -> Self {
        self.select(start..end)
    }

    /// シードで決まる順にシャッフルし、先頭 `floor(train_fraction * len)` 個を学習用、
    /// 残りをテスト用に分けます。
    pub fn shuffle_split(&self, seed: u64, train_fraction: f64) -> (Self, Self) {
        let mut order: Vec<usize> = (0..self.len()).collect();
        let mut rng = StdRng::seed_from_u64(seed);
        order.shuffle(&mut rng);
        let n_train = (train_fraction * self.len() as f64) as usize;
        let shuffled = self.select(order);
        (
            shuffled.slice(0, n_train),
            shuffled.slice(n_train, shuffled.len()),
        )
    }

    /// `(R, V, Zdot)` をテンソルにします。`R`, `V` は `[len, N*dim]`、
    /// `Zdot` は `[len, 2N*dim]` です。
    pub fn to_tensors<B: Backend>(&self, device: &B::Device) -> PhaseBatch<B> {
        let len = self.len();
        let half = self.half_len();
        let width = self.frame_len();
        let mut positions = Vec::with_capacity(len * half);
        let mut momenta = Vec::with_capacity(len * half);
        for frame in self.z.chunks(width) {
            let (r, v) = frame.split_at(half);
            positions.extend_from_slice(r);
            momenta.extend_from_slice(v);
        }
        PhaseBatch {
            positions: Tensor::from_data(TensorData::new(positions, [len, half]), device),
            momenta: Tensor::from_data(TensorData::new(momenta, [len, half]), device),
            zdot: Tensor::from_data(TensorData::new(self.zdot.clone(), [len, width]), device),
        }
    }
}

/// モデルに渡す 1 バッチ分のテンソル。
#[derive(Debug, Clone)]
pub struct PhaseBatch<B: Backend> {
    pub positions: Tensor<B, 2>,
    pub momenta: Tensor<B, 2>,
    pub zdot: Tensor<B, 2>,
}

/// 長さ `len` のデータを `size` 前後の大きさで等分するときの
/// `(バッチサイズ, バッチ数)` を返します。余りは捨てられます。
///
/// `size` が `None` のときは全体を 1 バッチにします。
pub fn batch_layout(len: usize, size: Option<usize>) -> (usize, usize) {
    let Some(size) = size else {
        return (len, 1);
    };
    let size = size.max(1);
    let nbatches1 = ((len as f64 - 0.5) / size as f64).floor() as usize + 1;
    let nbatches2 = nbatches1.saturating_sub(1).max(1);
    let size1 = len / nbatches1;
    let size2 = len / nbatches2;
    if size1 * nbatches1 > size2 * nbatches2 {
        (size1, nbatches1)
    } else {
        (size2, nbatches2)
    }
}

/// [`batch_layout`] に従って連続したバッチに分割します。
pub fn batches(samples: &Samples, size: Option<usize>) -> Vec<Samples> {
    let (size, nbatches) = batch_layout(samples.len(), size);
    (0..nbatches)
        .map(|i| samples.slice(i * size, (i + 1) * size))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    fn toy_set(frames: usize) -> TrajectorySet {
        let traj = Trajectory {
            z: (0..frames)
                .map(|i| vec![i as f32, 0.0, 1.0, 1.0 + i as f32])
                .collect(),
            zdot: (0..frames)
                .map(|i| vec![-(i as f32), 0.5, 0.25, 0.0])
                .collect(),
        };
        TrajectorySet {
            n_particles: 1,
            dim: 2,
            trajectories: vec![traj.clone(), traj],
        }
    }

    #[test]
    fn batch_layout_prefers_covering_more_samples() {
        assert_eq!(batch_layout(10, Some(3)), (3, 3));
        assert_eq!(batch_layout(100, Some(100)), (100, 1));
        assert_eq!(batch_layout(75, Some(20)), (25, 3));
        assert_eq!(batch_layout(90, Some(20)), (18, 5));
        assert_eq!(batch_layout(7, None), (7, 1));
    }

    #[test]
    fn batches_drop_the_tail() {
        let samples = toy_set(5).samples();
        assert_eq!(samples.len(), 10);
        let parts = batches(&samples, Some(3));
        assert_eq!(parts.len(), 3);
        assert!(parts.iter().all(|b| b.len() == 3));
        assert_eq!(parts[1], samples.slice(3, 6));
    }

    #[test]
    fn split_is_seeded_and_three_quarters() {
        let samples = toy_set(10).samples();
        let (train, test) = samples.shuffle_split(42, 0.75);
        assert_eq!(train.len(), 15);
        assert_eq!(test.len(), 5);
        let (again, _) = samples.shuffle_split(42, 0.75);
        assert_eq!(train, again);
    }

    #[test]
    fn validate_rejects_bad_frames() {
        let mut set = toy_set(3);
        set.trajectories[1].zdot[2].pop();
        assert!(matches!(
            set.validate(),
            Err(HnnError::InvalidDataset(_))
        ));
        set.trajectories.clear();
        assert!(set.validate().is_err());
    }

    #[test]
    fn validate_rejects_empty_system_shape() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.json");
        std::fs::write(
            &path,
            r#"{"n_particles":0,"dim":2,"trajectories":[{"z":[[]],"zdot":[[]]}]}"#,
        )
        .unwrap();
        assert!(matches!(
            TrajectorySet::load(&path),
            Err(HnnError::InvalidDataset(_))
        ));

        let mut set = toy_set(2);
        set.dim = 0;
        assert!(matches!(
            set.validate(),
            Err(HnnError::InvalidDataset(_))
        ));
    }

    #[test]
    fn missing_file_asks_for_generation() {
        let dir = tempfile::tempdir().unwrap();
        let err = TrajectorySet::load(&dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(err, HnnError::MissingDataset(_)));
        assert!(err.to_string().contains("'generate'"));
    }

    #[test]
    fn save_then_load_keeps_frames() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("states.json");
        let set = toy_set(4);
        set.save(&path).unwrap();
        assert_eq!(TrajectorySet::load(&path).unwrap(), set);
    }

    #[test]
    fn tensors_split_positions_and_momenta() {
        let samples = toy_set(2).samples();
        let device = Default::default();
        let batch = samples.to_tensors::<NdArray<f32>>(&device);
        assert_eq!(batch.positions.dims(), [4, 2]);
        assert_eq!(batch.zdot.dims(), [4, 4]);
        let momenta = batch.momenta.into_data().to_vec::<f32>().unwrap();
        assert_eq!(&momenta[..4], &[1.0, 1.0, 1.0, 2.0]);
    }
}
