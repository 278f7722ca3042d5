use crate::error::RecommendError;
use std::cmp::Ordering;

// NaN はどのスコアよりも下に並べる
fn rank_key(score: f32) -> f32 {
    if score.is_nan() { f32::NEG_INFINITY } else { score }
}

fn compare(scores: &[f32], a: usize, b: usize) -> Ordering {
    rank_key(scores[b])
        .total_cmp(&rank_key(scores[a]))
        .then(a.cmp(&b))
}

/// スコアの高い順に上位 k 件のアイテム番号を返す。
///
/// 同点のときは番号の小さい方が先に来る (安定ソートと同じ順序)。
/// `k` が負ならエラー、`k` がアイテム数を超えるときは全件を返す。
pub fn top_k(scores: &[f32], k: i64) -> Result<Vec<usize>, RecommendError> {
    if k < 0 {
        return Err(RecommendError::InvalidArgument(format!(
            "number of recommendations must not be negative, got {k}"
        )));
    }
    let k = usize::try_from(k).unwrap_or(usize::MAX).min(scores.len());
    if k == 0 {
        return Ok(Vec::new());
    }

    let mut indices: Vec<usize> = (0..scores.len()).collect();
    if k < indices.len() {
        indices.select_nth_unstable_by(k - 1, |&a, &b| compare(scores, a, b));
        indices.truncate(k);
    }
    indices.sort_unstable_by(|&a, &b| compare(scores, a, b));
    Ok(indices)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_top_k_breaks_ties_by_index() {
        let scores = [0.1, 0.9, 0.5, 0.9];
        assert_eq!(top_k(&scores, 2).unwrap(), vec![1, 3]);
        assert_eq!(top_k(&scores, 3).unwrap(), vec![1, 3, 2]);
    }

    #[test]
    fn test_top_k_length() {
        let scores = [0.3, 0.1, 0.2];
        for k in 0..6 {
            let actual = top_k(&scores, k).unwrap();
            assert_eq!(actual.len(), (k as usize).min(scores.len()));
        }
        assert_eq!(top_k(&scores, i64::MAX).unwrap(), vec![0, 2, 1]);
    }

    #[test]
    fn test_top_k_is_sorted_by_score() {
        let scores: Vec<f32> = (0..50).map(|i| ((i * 37) % 11) as f32 * 0.5).collect();
        let actual = top_k(&scores, 20).unwrap();
        for pair in actual.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            assert!(scores[a] >= scores[b]);
            if scores[a] == scores[b] {
                assert!(a < b);
            }
        }
        // 部分選択しても全件ソートの先頭と一致する
        let full = top_k(&scores, 50).unwrap();
        assert_eq!(actual, full[..20].to_vec());
    }

    #[test]
    fn test_top_k_zero_and_empty() {
        assert!(top_k(&[1.0, 2.0], 0).unwrap().is_empty());
        assert!(top_k(&[], 5).unwrap().is_empty());
    }

    #[test]
    fn test_top_k_negative_k() {
        let actual = top_k(&[1.0, 2.0], -1);
        assert!(matches!(actual, Err(RecommendError::InvalidArgument(_))));
    }

    #[test]
    fn test_top_k_masked_and_nan_scores_go_last() {
        let scores = [f32::NEG_INFINITY, f32::NAN, 0.0, -3.0];
        assert_eq!(top_k(&scores, 4).unwrap(), vec![2, 3, 0, 1]);
    }
}
