//! 実験結果の出力先
//!
//! すべての成果物は `{out_dir}/a-{N}-Spring-{tag}/{run}/{name}` に置かれます。

use crate::error::Result;
use chrono::Local;
use log::info;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

/// 学習結果のタグ
pub const TAG: &str = "1HNN";
/// データセットのタグ
pub const DATA_TAG: &str = "data-ham";

/// 1 回の実行の出力先を決めます。
#[derive(Debug, Clone)]
pub struct RunDirs {
    out_dir: PathBuf,
    psys: String,
    run_name: String,
}

impl RunDirs {
    /// `rname` が真なら学習結果を日時付きのディレクトリに置きます。
    pub fn new(
        out_dir: impl Into<PathBuf>,
        n_particles: usize,
        rname: bool,
        withdata: Option<String>,
        datapoints: Option<usize>,
    ) -> Self {
        let run_name = if rname {
            let stamp = Local::now().format("%m-%d-%Y_%H-%M-%S").to_string();
            match datapoints {
                Some(points) => format!("{stamp}_{points}"),
                None => stamp,
            }
        } else {
            fixed_run_name(withdata.as_deref())
        };
        Self {
            out_dir: out_dir.into(),
            psys: format!("a-{n_particles}-Spring"),
            run_name,
        }
    }

    /// `tag` 用のディレクトリ。データセットは常に固定名のディレクトリです。
    pub fn dir(&self, tag: &str) -> PathBuf {
        let run = if tag == DATA_TAG { "0" } else { self.run_name.as_str() };
        self.out_dir.join(format!("{}-{tag}", self.psys)).join(run)
    }

    /// 親ディレクトリを作成したうえでファイルのパスを返します。
    pub fn file(&self, name: &str, tag: &str) -> Result<PathBuf> {
        let dir = self.dir(tag);
        fs::create_dir_all(&dir)?;
        let path = dir.join(name);
        info!("=== {} ===", path.display());
        Ok(path)
    }
}

fn fixed_run_name(withdata: Option<&str>) -> String {
    match withdata {
        Some(tag) => format!("0_{tag}"),
        None => "0".to_string(),
    }
}

/// 保存したエポックを記録するメタデータ。
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct SavedAt {
    pub savedat: usize,
}

/// `value` を JSON で保存し、隣に `{name}.meta.json` を書きます。
pub fn save_json<T: Serialize>(path: &Path, value: &T, savedat: usize) -> Result<()> {
    fs::write(path, serde_json::to_vec(value)?)?;
    write_metadata(path, savedat)
}

/// 成果物 `path` の隣にメタデータを書きます。
pub fn write_metadata(path: &Path, savedat: usize) -> Result<()> {
    let mut meta = path.as_os_str().to_owned();
    meta.push(".meta.json");
    fs::write(PathBuf::from(meta), serde_json::to_vec(&SavedAt { savedat })?)?;
    Ok(())
}
