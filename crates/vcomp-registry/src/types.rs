//! Registry wire types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// One registry document: system attributes plus user fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(rename = "$id")]
    pub id: String,

    #[serde(rename = "$createdAt", default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,

    #[serde(rename = "$updatedAt", default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,

    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Document {
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field).filter(|v| !v.is_null())
    }

    /// String field, trimmed; `None` when absent, null or blank.
    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.get(field)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Field rendered as a string; numbers are accepted.
    pub fn get_string_lenient(&self, field: &str) -> Option<String> {
        match self.get(field)? {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    pub fn get_u64(&self, field: &str) -> Option<u64> {
        match self.get(field)? {
            Value::Number(n) => n
                .as_u64()
                .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
    }
}

/// Response of a list call.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DocumentList {
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub documents: Vec<Document>,
}

/// PATCH body for a partial document update.
#[derive(Debug, Clone, Serialize)]
pub struct UpdateRequest<'a> {
    pub data: &'a Map<String, Value>,
}

/// JSON-encoded list query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query(String);

impl Query {
    pub fn equal(attribute: &str, value: impl Into<Value>) -> Self {
        Self::encode("equal", Some(attribute), vec![value.into()])
    }

    pub fn order_asc(attribute: &str) -> Self {
        Self::encode("orderAsc", Some(attribute), Vec::new())
    }

    pub fn limit(n: usize) -> Self {
        Self::encode("limit", None, vec![json!(n)])
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn encode(method: &str, attribute: Option<&str>, values: Vec<Value>) -> Self {
        let mut query = Map::new();
        query.insert("method".into(), json!(method));
        if let Some(attribute) = attribute {
            query.insert("attribute".into(), json!(attribute));
        }
        if !values.is_empty() {
            query.insert("values".into(), Value::Array(values));
        }
        Self(Value::Object(query).to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_encoding() {
        let q: Value = serde_json::from_str(Query::equal("compression_status", "pending").as_str()).unwrap();
        assert_eq!(
            q,
            json!({"method": "equal", "attribute": "compression_status", "values": ["pending"]})
        );

        let q: Value = serde_json::from_str(Query::order_asc("$createdAt").as_str()).unwrap();
        assert_eq!(q, json!({"method": "orderAsc", "attribute": "$createdAt"}));

        let q: Value = serde_json::from_str(Query::limit(1).as_str()).unwrap();
        assert_eq!(q, json!({"method": "limit", "values": [1]}));
    }

    #[test]
    fn test_document_field_access() {
        let doc: Document = serde_json::from_value(json!({
            "$id": "abc",
            "$createdAt": "2024-05-01T10:00:00.000+00:00",
            "wp_post_id": 1234,
            "title": "  ",
            "progress": 42,
            "error_message": null,
            "original_video_url": " https://x.io/a.mp4 "
        }))
        .unwrap();

        assert_eq!(doc.id, "abc");
        assert_eq!(doc.get_string_lenient("wp_post_id").as_deref(), Some("1234"));
        assert_eq!(doc.get_str("title"), None);
        assert_eq!(doc.get_u64("progress"), Some(42));
        assert!(doc.get("error_message").is_none());
        assert_eq!(doc.get_str("original_video_url"), Some("https://x.io/a.mp4"));
        assert!(doc.created_at().is_some());
    }

    #[test]
    fn test_document_list_defaults() {
        let list: DocumentList = serde_json::from_str("{}").unwrap();
        assert_eq!(list.total, 0);
        assert!(list.documents.is_empty());
    }
}
