use burn::record::RecorderError;
use thiserror::Error;

/// このクレートで発生するエラー。
#[derive(Error, Debug)]
pub enum HnnError {
    #[error("入出力エラー: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON エラー: {0}")]
    Json(#[from] serde_json::Error),

    #[error("モデルの保存・読み込みエラー: {0}")]
    Recorder(#[from] RecorderError),

    /// データセットファイルが存在しない
    #[error("データセット '{0}' が見つかりません。最初に 'generate' コマンドでデータセットを生成してください")]
    MissingDataset(String),

    #[error("不正なデータセット: {0}")]
    InvalidDataset(String),

    #[error("不正な引数: {0}")]
    InvalidArgument(String),

    /// テンソルからホスト側データへの変換に失敗した
    #[error("テンソルデータの変換エラー: {0}")]
    TensorData(String),

    #[error("グラフ描画エラー: {0}")]
    Plot(String),
}

pub type Result<T> = std::result::Result<T, HnnError>;
