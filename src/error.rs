use std::path::PathBuf;
use thiserror::Error;

/// 推論リクエスト中に発生するエラー
#[derive(Error, Debug)]
pub enum RecommendError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    InvalidArgument(String),

    // モデルの異常など、呼び出し側には詳細を見せないもの
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// 起動時のファイル読み込みエラー。これが出たらサーバーは起動しない
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Csv { path: PathBuf, source: csv::Error },

    #[error("failed to load model {path}: {source}")]
    Model {
        path: PathBuf,
        source: candle_core::Error,
    },

    #[error("inconsistent encoder {path}: {reason}")]
    InconsistentEncoder { path: PathBuf, reason: String },
}
