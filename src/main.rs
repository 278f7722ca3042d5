use crate::server::{AppState, router};
use candle_core::Device;
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod cf_model;
mod datasets;
mod error;
mod interactions;
mod ranking;
mod recommenders;
mod server;
mod types;

/// 学習済みモデルでユーザーごとのおすすめ商品を返すAPIサーバー
#[derive(Parser, Debug, Clone)]
#[command(version, about)]
pub struct Args {
    /// user_emb.weight と item_emb.weight を含む safetensors
    #[arg(long, env = "RECOMMEND_MODEL_PATH", default_value = "model.safetensors")]
    pub model_path: PathBuf,

    #[arg(long, env = "RECOMMEND_USER_ENCODER_PATH", default_value = "user_encoder.json")]
    pub user_encoder_path: PathBuf,

    #[arg(long, env = "RECOMMEND_ITEM_ENCODER_PATH", default_value = "item_encoder.json")]
    pub item_encoder_path: PathBuf,

    /// product_id,product_name の列を持つCSV
    #[arg(long, env = "RECOMMEND_PRODUCTS_PATH")]
    pub products_path: Option<PathBuf>,

    /// 既知アイテムの除外に使う user_id,item_id[,rating] のCSV
    #[arg(long, env = "RECOMMEND_INTERACTIONS_PATH")]
    pub interactions_path: Option<PathBuf>,

    #[arg(long, env = "RECOMMEND_EMBEDDING_DIM", default_value_t = 32)]
    pub embedding_dim: usize,

    #[arg(long, env = "RECOMMEND_BIND", default_value = "0.0.0.0:8000")]
    pub bind: String,
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {err}");
    }
    tracing::info!("shutting down");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let device = Device::Cpu;

    tracing::info!(?args, "loading artifacts");
    let state = AppState::load(&args, &device)?;

    let listener = tokio::net::TcpListener::bind(&args.bind).await?;
    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}
