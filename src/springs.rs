//! # バネ連鎖系（正解データ用の物理系）
//!
//! 単位質量の粒子 `N` 個を環状につないだバネ連鎖のハミルトニアン
//!
//! ```text
//! H = Σ |p_i|² / 2m + Σ_(i,j) ½ k (|r_i - r_j| - L)²
//! ```
//!
//! と、その位相空間上の時間発展を提供します。学習用データセットの生成に使います。

use crate::error::{HnnError, Result};
use rand::Rng;
use rand_distr::{Distribution, Normal};

/// 減衰ありのデータで使う抵抗係数
pub const DRAG_COEFFICIENT: f64 = 0.1;

/// バネ連鎖系のパラメータ。
#[derive(Debug, Clone)]
pub struct SpringChain {
    pub n_particles: usize,
    pub dim: usize,
    pub mass: f64,
    pub stiffness: f64,
    pub rest_length: f64,
    /// `true` のとき運動量に `-γ p` の抵抗を加える
    pub drag: bool,
    edges: Vec<(usize, usize)>,
}

/// 位相空間上の 1 状態。`position`, `momentum` はどちらも `N * dim` の行優先配列です。
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseState {
    pub position: Vec<f64>,
    pub momentum: Vec<f64>,
}

impl PhaseState {
    /// `[r_0, ..., r_{N-1}, p_0, ..., p_{N-1}]` の順に並べた状態ベクトル `z`。
    pub fn to_z(&self) -> Vec<f64> {
        let mut z = self.position.clone();
        z.extend_from_slice(&self.momentum);
        z
    }
}

impl SpringChain {
    /// 単位質量・単位剛性・自然長 1 の環状連鎖を作ります。
    pub fn new(n_particles: usize, dim: usize, drag: bool) -> Result<Self> {
        if n_particles < 2 {
            return Err(HnnError::InvalidArgument(format!(
                "バネ連鎖には 2 個以上の粒子が必要です (指定: {n_particles})"
            )));
        }
        if dim == 0 {
            return Err(HnnError::InvalidArgument("dim は 1 以上を指定してください".into()));
        }
        Ok(Self {
            n_particles,
            dim,
            mass: 1.0,
            stiffness: 1.0,
            rest_length: 1.0,
            drag,
            edges: ring_edges(n_particles),
        })
    }

    pub fn edges(&self) -> &[(usize, usize)] {
        &self.edges
    }

    pub fn kinetic_energy(&self, state: &PhaseState) -> f64 {
        state.momentum.iter().map(|p| p * p).sum::<f64>() / (2.0 * self.mass)
    }

    pub fn potential_energy(&self, state: &PhaseState) -> f64 {
        self.edges
            .iter()
            .map(|&(i, j)| {
                let stretch = self.distance(&state.position, i, j) - self.rest_length;
                0.5 * self.stiffness * stretch * stretch
            })
            .sum()
    }

    pub fn hamiltonian(&self, state: &PhaseState) -> f64 {
        self.kinetic_energy(state) + self.potential_energy(state)
    }

    /// `-∂V/∂r`。
    pub fn forces(&self, position: &[f64]) -> Vec<f64> {
        let d = self.dim;
        let mut forces = vec![0.0; position.len()];
        for &(i, j) in &self.edges {
            let dist = self.distance(position, i, j);
            if dist == 0.0 {
                continue;
            }
            let magnitude = -self.stiffness * (dist - self.rest_length) / dist;
            for k in 0..d {
                let delta = position[i * d + k] - position[j * d + k];
                forces[i * d + k] += magnitude * delta;
                forces[j * d + k] -= magnitude * delta;
            }
        }
        forces
    }

    /// 位相空間の右辺 `zdot = [∂H/∂p ; -∂H/∂r - γ p]`。
    pub fn zdot(&self, state: &PhaseState) -> Vec<f64> {
        let mut zdot: Vec<f64> = state.momentum.iter().map(|p| p / self.mass).collect();
        let forces = self.forces(&state.position);
        zdot.extend(
            forces
                .iter()
                .zip(&state.momentum)
                .map(|(f, p)| f - self.drag_coefficient() * p),
        );
        zdot
    }

    fn drag_coefficient(&self) -> f64 {
        if self.drag { DRAG_COEFFICIENT } else { 0.0 }
    }

    /// 速度ベルレ法で 1 ステップ進めます。
    pub fn verlet_step(&self, state: &mut PhaseState, dt: f64) {
        let gamma = self.drag_coefficient();
        let forces = self.forces(&state.position);
        for (p, f) in state.momentum.iter_mut().zip(forces) {
            *p += 0.5 * dt * (f - gamma * *p);
        }
        for (r, p) in state.position.iter_mut().zip(&state.momentum) {
            *r += dt * p / self.mass;
        }
        let forces = self.forces(&state.position);
        for (p, f) in state.momentum.iter_mut().zip(forces) {
            *p += 0.5 * dt * (f - gamma * *p);
        }
    }

    /// `stride` ステップごとに状態を記録しながら `frames` 個の状態を返します。
    /// 最初の記録は初期状態そのものです。
    pub fn simulate(
        &self,
        initial: PhaseState,
        dt: f64,
        stride: usize,
        frames: usize,
    ) -> Vec<PhaseState> {
        let mut state = initial;
        let mut recorded = Vec::with_capacity(frames);
        for frame in 0..frames {
            if frame > 0 {
                for _ in 0..stride {
                    self.verlet_step(&mut state, dt);
                }
            }
            recorded.push(state.clone());
        }
        recorded
    }

    /// 一辺 `L` の正多角形に一様な揺らぎを加えた配置と、
    /// 全運動量がゼロになる正規乱数の運動量を作ります。
    pub fn random_state<R: Rng>(&self, rng: &mut R) -> Result<PhaseState> {
        let n = self.n_particles;
        let d = self.dim;
        let circumradius = self.rest_length / (2.0 * (std::f64::consts::PI / n as f64).sin());
        let mut position = vec![0.0; n * d];
        for i in 0..n {
            let angle = 2.0 * std::f64::consts::PI * i as f64 / n as f64;
            position[i * d] = circumradius * angle.cos();
            if d > 1 {
                position[i * d + 1] = circumradius * angle.sin();
            }
        }
        for r in position.iter_mut() {
            *r += rng.random_range(-0.1..0.1);
        }

        let normal = Normal::new(0.0, 0.5)
            .map_err(|e| HnnError::InvalidArgument(format!("正規分布の生成に失敗しました: {e}")))?;
        let mut momentum: Vec<f64> = (0..n * d).map(|_| normal.sample(&mut *rng)).collect();
        for k in 0..d {
            let mean = (0..n).map(|i| momentum[i * d + k]).sum::<f64>() / n as f64;
            for i in 0..n {
                momentum[i * d + k] -= mean;
            }
        }
        Ok(PhaseState { position, momentum })
    }

    fn distance(&self, position: &[f64], i: usize, j: usize) -> f64 {
        let d = self.dim;
        (0..d)
            .map(|k| {
                let delta = position[i * d + k] - position[j * d + k];
                delta * delta
            })
            .sum::<f64>()
            .sqrt()
    }
}

/// 環状連鎖の辺。2 粒子のときは 1 本だけ。
fn ring_edges(n: usize) -> Vec<(usize, usize)> {
    if n == 2 {
        return vec![(0, 1)];
    }
    (0..n).map(|i| (i, (i + 1) % n)).collect()
}
