//! # バネ連鎖のハミルトニアンニューラルネットワーク (HNN) ライブラリ
//!
//! `burn` フレームワークを使用して、バネでつながった粒子系の軌道データから
//! ハミルトニアン（ニューラルネットワークによるポテンシャル項と粒子ごとの運動エネルギー係数）
//! を学習するための主要なコンポーネントを提供します。

pub mod cli;
pub mod dataset;
pub mod error;
pub mod generation;
pub mod hamiltonian;
pub mod inference;
pub mod model;
pub mod output;
pub mod plot;
pub mod springs;
pub mod training;

pub use error::{HnnError, Result};
