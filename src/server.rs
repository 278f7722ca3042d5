use crate::cf_model::CollaborativeFilteringModel;
use crate::datasets::{IdEncoder, read_interactions, read_products};
use crate::error::{LoadError, RecommendError};
use crate::interactions::InteractionMatrix;
use crate::recommenders::{ModelRecommender, Recommender};
use crate::types::{ExternalId, Recommendation};
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use candle_nn::VarBuilder;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub const DEFAULT_NUM_RECOMMENDATIONS: i64 = 5;

/// 起動時に一度だけ読み込み、以後は読み取り専用で全リクエストから共有する
#[derive(Clone)]
pub struct AppState {
    pub recommender: Arc<dyn Recommender + Send + Sync>,
}

impl AppState {
    pub fn new(recommender: impl Recommender + Send + Sync + 'static) -> Self {
        AppState {
            recommender: Arc::new(recommender),
        }
    }

    pub fn load(arg: &crate::Args, device: &candle_core::Device) -> Result<AppState, LoadError> {
        let user_encoder = IdEncoder::load(&arg.user_encoder_path)?;
        let item_encoder = IdEncoder::load(&arg.item_encoder_path)?;
        tracing::info!(
            users = user_encoder.len(),
            items = item_encoder.len(),
            user_id_kind = %user_encoder.kind(),
            item_id_kind = %item_encoder.kind(),
            "loaded encoders"
        );
        if item_encoder.is_empty() {
            tracing::warn!("item encoder is empty, every recommendation list will be empty");
        }

        let model_error = |source| LoadError::Model {
            path: arg.model_path.clone(),
            source,
        };
        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(
                &[&arg.model_path],
                candle_core::DType::F32,
                device,
            )
            .map_err(model_error)?
        };
        let model = CollaborativeFilteringModel::new(
            vb,
            user_encoder.len(),
            item_encoder.len(),
            arg.embedding_dim,
        )
        .map_err(model_error)?;
        tracing::info!(path = %arg.model_path.display(), dim = arg.embedding_dim, "loaded model");

        let interactions = match &arg.interactions_path {
            Some(path) => {
                let rows = read_interactions(path)?;
                let matrix = InteractionMatrix::new(&rows, &user_encoder, &item_encoder);
                tracing::info!(
                    rows = rows.len(),
                    known = matrix.n_interactions(),
                    "loaded interactions"
                );
                Some(matrix)
            }
            None => None,
        };

        let id2product = match &arg.products_path {
            Some(path) => {
                let id2product = read_products(path, item_encoder.kind())?;
                tracing::info!(products = id2product.len(), "loaded product metadata");
                Some(id2product)
            }
            None => None,
        };

        let mut recommender = ModelRecommender::new(model, user_encoder, item_encoder);
        if let Some(matrix) = interactions {
            recommender = recommender.with_interactions(matrix);
        }
        if let Some(id2product) = id2product {
            recommender = recommender.with_products(id2product);
        }
        Ok(AppState::new(recommender))
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/recommend", get(recommend_by_query).post(recommend_by_body))
        .route("/recommend/{user_id}", get(recommend_by_path))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Deserialize)]
pub struct PathQuery {
    pub num_recommendations: Option<i64>,
    #[serde(default)]
    pub mask_known: bool,
}

#[derive(Deserialize)]
pub struct RecommendQuery {
    pub user_id: String,
    pub k: Option<i64>,
    #[serde(default)]
    pub mask_known: bool,
}

#[derive(Deserialize)]
pub struct RecommendRequest {
    pub user_id: ExternalId,
    pub num_recommendations: Option<i64>,
    #[serde(default)]
    pub mask_known: bool,
}

#[derive(Serialize)]
pub struct RecommendResponse {
    pub user_id: ExternalId,
    pub recommendations: Vec<Recommendation>,
}

async fn root() -> Json<serde_json::Value> {
    Json(json!({ "message": "Recommendation API is running" }))
}

async fn recommend_by_path(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    query: Result<Query<PathQuery>, QueryRejection>,
) -> Result<Json<RecommendResponse>, AppError> {
    let Query(query) = query?;
    let user_id = state.recommender.user_id_kind().parse(&user_id)?;
    recommend(state, user_id, query.num_recommendations, query.mask_known).await
}

async fn recommend_by_query(
    State(state): State<AppState>,
    query: Result<Query<RecommendQuery>, QueryRejection>,
) -> Result<Json<RecommendResponse>, AppError> {
    let Query(query) = query?;
    let user_id = state.recommender.user_id_kind().parse(&query.user_id)?;
    recommend(state, user_id, query.k, query.mask_known).await
}

async fn recommend_by_body(
    State(state): State<AppState>,
    request: Result<Json<RecommendRequest>, JsonRejection>,
) -> Result<Json<RecommendResponse>, AppError> {
    let Json(request) = request?;
    recommend(
        state,
        request.user_id,
        request.num_recommendations,
        request.mask_known,
    )
    .await
}

async fn recommend(
    state: AppState,
    user_id: ExternalId,
    k: Option<i64>,
    mask_known: bool,
) -> Result<Json<RecommendResponse>, AppError> {
    let k = k.unwrap_or(DEFAULT_NUM_RECOMMENDATIONS);
    let recommender = Arc::clone(&state.recommender);
    let id = user_id.clone();
    // スコア計算はCPUを使うのでブロッキング用のスレッドで行う
    let recommendations =
        tokio::task::spawn_blocking(move || recommender.recommend(&id, k, mask_known))
            .await
            .map_err(|e| AppError::Unexpected(e.into()))??;

    tracing::debug!(%user_id, k, returned = recommendations.len(), "recommended");
    Ok(Json(RecommendResponse {
        user_id,
        recommendations,
    }))
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

impl From<RecommendError> for AppError {
    fn from(err: RecommendError) -> Self {
        match err {
            RecommendError::NotFound(message) => AppError::NotFound(message),
            RecommendError::InvalidArgument(message) => AppError::BadRequest(message),
            RecommendError::Internal(err) => AppError::Unexpected(err),
        }
    }
}

// 抽出時のエラーも他と同じ {"detail": ...} の 400 にそろえる
impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::NotFound(message) => (StatusCode::NOT_FOUND, message),
            AppError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            // 詳細はログにだけ出す
            AppError::Unexpected(err) => {
                tracing::error!("Internal Server Error: {:?}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Server Error".to_string(),
                )
            }
        };
        (status, Json(json!({ "detail": message }))).into_response()
    }
}
