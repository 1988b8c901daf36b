//! 不透明上下文值
//!
//! 成就条件与进度/颁发上下文由上游业务定义，引擎只负责原样存储和传递。
//! 使用显式的值类型代替无类型 JSON，存储层解码失败时返回错误而不是静默置空。

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{AchievementError, Result};

/// 自由格式的上下文值
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum ContextValue {
    #[default]
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    List(Vec<ContextValue>),
    Map(BTreeMap<String, ContextValue>),
}

impl ContextValue {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// 从 JSON 值转换
    ///
    /// 超出 i64 范围的无符号整数按浮点数保存。
    pub fn from_json(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Integer(i),
                None => Self::Float(n.as_f64().unwrap_or_default()),
            },
            serde_json::Value::String(s) => Self::Text(s),
            serde_json::Value::Array(items) => {
                Self::List(items.into_iter().map(Self::from_json).collect())
            }
            serde_json::Value::Object(map) => Self::Map(
                map.into_iter()
                    .map(|(k, v)| (k, Self::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// 转换为 JSON 值（用于 JSONB 存储）
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Null => serde_json::Value::Null,
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Integer(i) => serde_json::Value::from(*i),
            Self::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Self::Text(s) => serde_json::Value::String(s.clone()),
            Self::List(items) => {
                serde_json::Value::Array(items.iter().map(Self::to_json).collect())
            }
            Self::Map(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }

    /// 从存储中的 JSON 文本解码
    ///
    /// 空字符串视为 Null；非法 JSON 报告为数据损坏。
    pub fn parse_stored(raw: &str) -> Result<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::Null);
        }
        serde_json::from_str(raw)
            .map_err(|e| AchievementError::CorruptData(format!("上下文 JSON 无法解析: {e}")))
    }

    /// 按键读取 Map 中的值
    pub fn get(&self, key: &str) -> Option<&ContextValue> {
        match self {
            Self::Map(map) => map.get(key),
            _ => None,
        }
    }
}

impl From<&str> for ContextValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<i64> for ContextValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<bool> for ContextValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl<const N: usize> From<[(&str, ContextValue); N]> for ContextValue {
    fn from(entries: [(&str, ContextValue); N]) -> Self {
        Self::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_untagged_deserialization_picks_narrowest_variant() {
        let value: ContextValue =
            serde_json::from_value(json!({"lesson": 3, "score": 0.5, "tags": ["a"], "ok": true}))
                .unwrap();

        assert_eq!(value.get("lesson"), Some(&ContextValue::Integer(3)));
        assert_eq!(value.get("score"), Some(&ContextValue::Float(0.5)));
        assert_eq!(value.get("ok"), Some(&ContextValue::Bool(true)));
        assert_eq!(
            value.get("tags"),
            Some(&ContextValue::List(vec![ContextValue::Text("a".to_string())]))
        );
    }

    #[test]
    fn test_json_conversion_preserves_structure() {
        let original = json!({"course": "rust-101", "attempts": [1, 2], "meta": null});
        let value = ContextValue::from_json(original.clone());
        assert_eq!(value.to_json(), original);
    }

    #[test]
    fn test_parse_stored_reports_corruption() {
        let err = ContextValue::parse_stored("{not json").unwrap_err();
        assert!(matches!(err, AchievementError::CorruptData(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_parse_stored_empty_is_null() {
        assert_eq!(ContextValue::parse_stored("").unwrap(), ContextValue::Null);
        assert!(ContextValue::parse_stored("null").unwrap().is_null());
    }

    #[test]
    fn test_map_from_entries() {
        let value = ContextValue::from([("source", "lesson".into()), ("count", 2i64.into())]);
        assert_eq!(value.get("count"), Some(&ContextValue::Integer(2)));
        assert!(ContextValue::Null.get("count").is_none());
    }
}
