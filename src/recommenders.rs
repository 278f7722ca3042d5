use crate::cf_model::Scorer;
use crate::datasets::IdEncoder;
use crate::error::RecommendError;
use crate::interactions::InteractionMatrix;
use crate::ranking::top_k;
use crate::types::{ExternalId, IdKind, Product, Recommendation};
use anyhow::anyhow;
use std::collections::HashMap;

pub const UNKNOWN_PRODUCT: &str = "Unknown product";

pub trait Recommender {
    fn recommend(
        &self,
        user_id: &ExternalId,
        k: i64,
        mask_known: bool,
    ) -> Result<Vec<Recommendation>, RecommendError>;

    /// リクエストのユーザーIDをどの型として解釈するか
    fn user_id_kind(&self) -> IdKind;
}

/// 学習済みモデルでスコアを付け、上位 k 件を外部IDに戻して返す
pub struct ModelRecommender<S> {
    scorer: S,
    user_encoder: IdEncoder,
    item_encoder: IdEncoder,
    interactions: Option<InteractionMatrix>,
    id2product: Option<HashMap<String, Product>>,
}

impl<S: Scorer> ModelRecommender<S> {
    pub fn new(scorer: S, user_encoder: IdEncoder, item_encoder: IdEncoder) -> Self {
        Self {
            scorer,
            user_encoder,
            item_encoder,
            interactions: None,
            id2product: None,
        }
    }

    pub fn with_interactions(mut self, interactions: InteractionMatrix) -> Self {
        self.interactions = Some(interactions);
        self
    }

    pub fn with_products(mut self, id2product: HashMap<String, Product>) -> Self {
        self.id2product = Some(id2product);
        self
    }

    fn score(&self, user_index: usize) -> Result<Vec<f32>, RecommendError> {
        let n_items = self.item_encoder.len();
        let scores = self.scorer.score_all_items(user_index, n_items)?;
        if scores.len() != n_items {
            return Err(anyhow!(
                "scorer returned {} scores for {} items",
                scores.len(),
                n_items
            )
            .into());
        }
        if let Some(item) = scores.iter().position(|s| s.is_nan()) {
            return Err(anyhow!("scorer returned NaN for item index {item}").into());
        }
        Ok(scores)
    }

    /// (商品名, カテゴリ)。メタデータが無い場合は両方 None、
    /// 該当商品が無い場合は名前を UNKNOWN_PRODUCT にして行を残す
    fn describe(&self, product_id: &ExternalId) -> (Option<String>, Option<String>) {
        let Some(id2product) = &self.id2product else {
            return (None, None);
        };
        match id2product.get(&product_id.key()) {
            Some(product) => (Some(product.product_name.clone()), product.category.clone()),
            None => (Some(UNKNOWN_PRODUCT.to_string()), None),
        }
    }
}

impl<S: Scorer> Recommender for ModelRecommender<S> {
    fn recommend(
        &self,
        user_id: &ExternalId,
        k: i64,
        mask_known: bool,
    ) -> Result<Vec<Recommendation>, RecommendError> {
        if k < 0 {
            return Err(RecommendError::InvalidArgument(format!(
                "number of recommendations must not be negative, got {k}"
            )));
        }
        let user_index = self
            .user_encoder
            .encode(user_id)
            .map_err(|e| match e {
                RecommendError::NotFound(_) => {
                    RecommendError::NotFound(format!("User {user_id} not found in training data"))
                }
                other => other,
            })?;

        let mut scores = self.score(user_index)?;

        let known = match (&self.interactions, mask_known) {
            (Some(matrix), true) => {
                let masked = matrix.mask_known(&mut scores, user_index);
                tracing::debug!(user_index, masked, "masked known interactions");
                Some(matrix)
            }
            (None, true) => {
                tracing::debug!("mask_known requested but no interaction source is loaded");
                None
            }
            _ => None,
        };

        // 既知アイテムを後で取り除く分だけ多めに取る
        let extra = known.map_or(0, |m| m.known_items(user_index).len());
        let ranked = top_k(&scores, k.saturating_add(extra as i64))?;

        ranked
            .into_iter()
            .filter(|&item| !known.is_some_and(|m| m.contains(user_index, item)))
            .take(k as usize)
            .map(|item| -> Result<Recommendation, RecommendError> {
                let product_id = self.item_encoder.decode(item).ok_or_else(|| {
                    RecommendError::NotFound(format!("Item index {item} has no product ID"))
                })?;
                let (product_name, category) = self.describe(&product_id);
                Ok(Recommendation {
                    product_id,
                    product_name,
                    category,
                    score: scores[item],
                })
            })
            .collect()
    }

    fn user_id_kind(&self) -> IdKind {
        self.user_encoder.kind()
    }
}
