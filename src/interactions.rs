use crate::datasets::IdEncoder;
use crate::types::Interaction;

/// ユーザーごとの既知アイテム (疎行列の各行をソート済みで持つ)
#[derive(Debug, Default)]
pub struct InteractionMatrix {
    rows: Vec<Vec<usize>>,
}

impl InteractionMatrix {
    /// エンコーダーで引けない行と rating <= 0 の行は捨てる
    pub fn new(
        interactions: &[Interaction],
        user_encoder: &IdEncoder,
        item_encoder: &IdEncoder,
    ) -> Self {
        let mut rows = vec![Vec::new(); user_encoder.len()];
        for action in interactions {
            if action.rating <= 0.0 {
                continue;
            }
            if let (Some(u), Some(i)) = (
                user_encoder.encode_raw(&action.user_id),
                item_encoder.encode_raw(&action.item_id),
            ) {
                rows[u].push(i);
            }
        }
        for row in &mut rows {
            row.sort_unstable();
            row.dedup();
        }
        Self { rows }
    }

    pub fn known_items(&self, user_index: usize) -> &[usize] {
        self.rows.get(user_index).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains(&self, user_index: usize, item_index: usize) -> bool {
        self.known_items(user_index).binary_search(&item_index).is_ok()
    }

    pub fn n_interactions(&self) -> usize {
        self.rows.iter().map(Vec::len).sum()
    }

    /// 既知アイテムのスコアを -inf に上書きし、上書きした件数を返す
    pub fn mask_known(&self, scores: &mut [f32], user_index: usize) -> usize {
        let mut masked = 0;
        for &item in self.known_items(user_index) {
            if let Some(score) = scores.get_mut(item) {
                *score = f32::NEG_INFINITY;
                masked += 1;
            }
        }
        masked
    }
}
