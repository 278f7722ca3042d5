use crate::error::RecommendError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// エンコーダー作成時に決まるIDの型。文字列と整数は相互に変換しない
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdKind {
    #[default]
    String,
    Integer,
}

impl IdKind {
    /// URLのパスやクエリから来た生の文字列を、宣言された型として解釈する
    pub fn parse(self, raw: &str) -> Result<ExternalId, RecommendError> {
        match self {
            IdKind::String => Ok(ExternalId::Str(raw.to_string())),
            IdKind::Integer => raw
                .trim()
                .parse::<i64>()
                .map(ExternalId::Int)
                .map_err(|_| {
                    RecommendError::InvalidArgument(format!("ID {raw:?} is not an integer"))
                }),
        }
    }
}

impl fmt::Display for IdKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdKind::String => f.write_str("string"),
            IdKind::Integer => f.write_str("integer"),
        }
    }
}

/// 外部から渡されるユーザー/アイテムのID
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExternalId {
    Int(i64),
    Str(String),
}

impl ExternalId {
    pub fn kind(&self) -> IdKind {
        match self {
            ExternalId::Int(_) => IdKind::Integer,
            ExternalId::Str(_) => IdKind::String,
        }
    }

    /// エンコーダーのマップで使う正規化済みのキー
    pub fn key(&self) -> String {
        match self {
            ExternalId::Int(v) => v.to_string(),
            ExternalId::Str(s) => s.clone(),
        }
    }
}

impl fmt::Display for ExternalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExternalId::Int(v) => write!(f, "{v}"),
            ExternalId::Str(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interaction {
    #[serde(alias = "userId")]
    pub user_id: String,
    #[serde(alias = "movieId")]
    pub item_id: String,
    #[serde(default = "default_rating")]
    pub rating: f32,
}

fn default_rating() -> f32 {
    1.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub product_id: String,
    pub product_name: String,
    #[serde(default)]
    pub category: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
    pub product_id: ExternalId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub score: f32,
}
