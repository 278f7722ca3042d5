use crate::error::{LoadError, RecommendError};
use crate::types::{ExternalId, IdKind, Interaction, Product};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Serialize, Deserialize)]
pub struct IdEncoder {
    #[serde(default)]
    kind: IdKind,
    map: HashMap<String, usize>,
    reverse_map: HashMap<usize, String>,
}

impl IdEncoder {
    /// IDのリスト(イテレータ)を受け取ってマッピングを作る。
    /// 型が `kind` と一致しないIDがあればエラー
    #[cfg_attr(not(test), allow(dead_code))]
    pub fn new(
        kind: IdKind,
        ids: impl IntoIterator<Item = ExternalId>,
    ) -> Result<Self, RecommendError> {
        let mut map = HashMap::new();
        let mut reverse_map = HashMap::new();
        let mut count = 0;
        for id in ids {
            if id.kind() != kind {
                return Err(RecommendError::InvalidArgument(format!(
                    "ID {id} is not of kind {kind}"
                )));
            }
            let key = id.key();
            if !map.contains_key(&key) {
                map.insert(key.clone(), count);
                reverse_map.insert(count, key);
                count += 1;
            }
        }
        Ok(Self {
            kind,
            map,
            reverse_map,
        })
    }

    pub fn kind(&self) -> IdKind {
        self.kind
    }

    pub fn encode(&self, id: &ExternalId) -> Result<usize, RecommendError> {
        if id.kind() != self.kind {
            return Err(RecommendError::InvalidArgument(format!(
                "ID {id} is a {} but this encoder holds {} IDs",
                id.kind(),
                self.kind
            )));
        }
        self.map
            .get(&id.key())
            .copied()
            .ok_or_else(|| RecommendError::NotFound(format!("ID {id} not found in training data")))
    }

    /// CSVなどから読んだ生の文字列で引く。型が合わなければ None
    pub fn encode_raw(&self, raw: &str) -> Option<usize> {
        let id = self.kind.parse(raw).ok()?;
        self.map.get(&id.key()).copied()
    }

    pub fn decode(&self, idx: usize) -> Option<ExternalId> {
        let key = self.reverse_map.get(&idx)?;
        match self.kind {
            IdKind::String => Some(ExternalId::Str(key.clone())),
            IdKind::Integer => key.parse().ok().map(ExternalId::Int),
        }
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    #[cfg_attr(not(test), allow(dead_code))]
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), LoadError> {
        let path = path.as_ref();
        let json_string = serde_json::to_string(self).map_err(|source| LoadError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        std::fs::write(path, json_string).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, LoadError> {
        let path = path.as_ref();
        let json_string = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let instance: Self =
            serde_json::from_str(&json_string).map_err(|source| LoadError::Json {
                path: path.to_path_buf(),
                source,
            })?;
        instance
            .validate()
            .map_err(|reason| LoadError::InconsistentEncoder {
                path: path.to_path_buf(),
                reason,
            })?;
        Ok(instance)
    }

    // map と reverse_map が [0, len) 上で全単射になっているか
    fn validate(&self) -> Result<(), String> {
        if self.map.len() != self.reverse_map.len() {
            return Err(format!(
                "map has {} entries but reverse_map has {}",
                self.map.len(),
                self.reverse_map.len()
            ));
        }
        for (key, &idx) in &self.map {
            if idx >= self.map.len() {
                return Err(format!("index {idx} of {key:?} is out of range"));
            }
            if self.reverse_map.get(&idx) != Some(key) {
                return Err(format!("index {idx} does not map back to {key:?}"));
            }
            let canonical = key.parse::<i64>().map(|v| v.to_string()).ok();
            if self.kind == IdKind::Integer && canonical.as_deref() != Some(key.as_str()) {
                return Err(format!("{key:?} is not a canonical integer ID"));
            }
        }
        Ok(())
    }
}

fn read_csv<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, LoadError> {
    let csv_error = |source| LoadError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut reader = csv::Reader::from_path(path).map_err(csv_error)?;
    reader
        .deserialize()
        .collect::<Result<Vec<T>, _>>()
        .map_err(csv_error)
}

pub fn read_interactions(path: impl AsRef<Path>) -> Result<Vec<Interaction>, LoadError> {
    read_csv(path.as_ref())
}

/// 商品メタデータを読み込み、アイテムエンコーダーと同じ正規化キーで引けるようにする
pub fn read_products(
    path: impl AsRef<Path>,
    item_kind: IdKind,
) -> Result<HashMap<String, Product>, LoadError> {
    let products: Vec<Product> = read_csv(path.as_ref())?;
    let mut id2product = HashMap::with_capacity(products.len());
    for product in products {
        match item_kind.parse(&product.product_id) {
            Ok(id) => {
                id2product.insert(id.key(), product);
            }
            Err(_) => {
                tracing::warn!(product_id = %product.product_id, "skipping product with mismatched ID type");
            }
        }
    }
    Ok(id2product)
}
