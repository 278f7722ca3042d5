use candle_core::{Device, Module, Result, Tensor};
use candle_nn::{Embedding, VarBuilder, embedding};

/// ユーザー1人に対して全アイテムのスコアを返すもの。値が大きいほど関連が強い
pub trait Scorer {
    fn score_all_items(&self, user_index: usize, n_items: usize) -> anyhow::Result<Vec<f32>>;
}

pub struct CollaborativeFilteringModel {
    user_embeddings: Embedding,
    item_embeddings: Embedding,
}

impl CollaborativeFilteringModel {
    pub fn new(
        vb: VarBuilder,
        n_users: usize,
        n_items: usize,
        embedding_dim: usize,
    ) -> Result<Self> {
        let user_embeddings = embedding(n_users, embedding_dim, vb.pp("user_emb"))?;
        let item_embeddings = embedding(n_items, embedding_dim, vb.pp("item_emb"))?;
        Ok(Self {
            user_embeddings,
            item_embeddings,
        })
    }

    pub fn forward(&self, user_ids: &Tensor, item_ids: &Tensor) -> Result<Tensor> {
        // (batch, embedding)
        let user_embeddings = self.user_embeddings.forward(user_ids)?;
        let item_embeddings = self.item_embeddings.forward(item_ids)?;

        let ratings = (user_embeddings * item_embeddings)?;
        ratings.sum(1)
    }

    pub fn device(&self) -> &Device {
        self.user_embeddings.embeddings().device()
    }
}

// Embedding の添字は u32
fn to_u32_index(index: usize) -> anyhow::Result<u32> {
    u32::try_from(index).map_err(|_| anyhow::anyhow!("index {index} does not fit in u32"))
}

impl Scorer for CollaborativeFilteringModel {
    fn score_all_items(&self, user_index: usize, n_items: usize) -> anyhow::Result<Vec<f32>> {
        if n_items == 0 {
            return Ok(Vec::new());
        }
        let device = self.device();
        // 同じユーザーを n_items 回並べて、全アイテムと一度に内積を取る
        let user_index = to_u32_index(user_index)?;
        let end = to_u32_index(n_items)?;
        let user_ids = Tensor::from_vec(vec![user_index; n_items], n_items, device)?;
        let item_ids = Tensor::from_vec((0..end).collect::<Vec<u32>>(), n_items, device)?;
        let scores = self.forward(&user_ids, &item_ids)?;
        Ok(scores.to_vec1::<f32>()?)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use candle_core::{DType, Device};
    use candle_nn::VarMap;
    use std::collections::HashMap;

    const N_USERS: usize = 10;
    const N_ITEMS: usize = 5;
    const DIM: usize = 32;

    fn model_from_weights(user_weights: &[f32], item_weights: &[f32], dim: usize) -> Result<CollaborativeFilteringModel> {
        let device = Device::Cpu;
        let n_users = user_weights.len() / dim;
        let n_items = item_weights.len() / dim;
        let mut tensors = HashMap::new();
        tensors.insert(
            "user_emb.weight".to_string(),
            Tensor::from_slice(user_weights, (n_users, dim), &device)?,
        );
        tensors.insert(
            "item_emb.weight".to_string(),
            Tensor::from_slice(item_weights, (n_items, dim), &device)?,
        );
        let vb = VarBuilder::from_tensors(tensors, DType::F32, &device);
        CollaborativeFilteringModel::new(vb, n_users, n_items, dim)
    }

    #[test]
    fn test_build_model() -> Result<()> {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);

        let _model = CollaborativeFilteringModel::new(vb, N_USERS, N_ITEMS, DIM)?;

        let v_data = varmap.data().lock().unwrap();
        let user_w = v_data.get("user_emb.weight").expect("user_emb.weightが見つかりません");
        assert_eq!(user_w.dims(), &[N_USERS, DIM]);

        let item_w = v_data.get("item_emb.weight").expect("item_emb.weightが見つかりません");
        assert_eq!(item_w.dims(), &[N_ITEMS, DIM]);
        Ok(())
    }

    #[test]
    fn test_forward_with_specific_embeddings() -> Result<()> {
        let device = Device::Cpu;
        let model = model_from_weights(&[1.0, 1.0, 2.0, 0.0], &[0.5, 2.0, 3.0, 3.0], 2)?;
        let user_input = Tensor::new(&[0u32, 1u32], &device)?;
        let item_input = Tensor::new(&[0u32, 1u32], &device)?;

        let result = model.forward(&user_input, &item_input)?.to_vec1::<f32>()?;
        assert_eq!(result, vec![2.5, 6.0]);
        Ok(())
    }

    #[test]
    fn test_score_all_items() -> anyhow::Result<()> {
        let model = model_from_weights(&[1.0, 1.0, 2.0, 0.0], &[0.5, 2.0, 3.0, 3.0, 1.0, 0.0], 2)?;

        assert_eq!(model.score_all_items(0, 3)?, vec![2.5, 6.0, 1.0]);
        assert_eq!(model.score_all_items(1, 3)?, vec![1.0, 6.0, 2.0]);
        assert!(model.score_all_items(1, 0)?.is_empty());
        Ok(())
    }

    #[test]
    fn test_score_all_items_is_deterministic() -> anyhow::Result<()> {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let model = CollaborativeFilteringModel::new(vb, N_USERS, N_ITEMS, DIM)?;

        let first = model.score_all_items(3, N_ITEMS)?;
        assert_eq!(first.len(), N_ITEMS);
        assert_eq!(first, model.score_all_items(3, N_ITEMS)?);
        Ok(())
    }

    #[test]
    fn test_index_larger_than_u32_is_rejected() {
        assert_eq!(to_u32_index(7).unwrap(), 7);
        assert_eq!(to_u32_index(u32::MAX as usize).unwrap(), u32::MAX);
        #[cfg(target_pointer_width = "64")]
        assert!(to_u32_index(u32::MAX as usize + 1).is_err());
    }
}
