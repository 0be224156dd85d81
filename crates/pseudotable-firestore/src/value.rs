//! Firestore REST document encoding.
//!
//! Mapping tables only store string fields, so only `stringValue` is
//! written. Fields of any other type are skipped on read.

use std::collections::BTreeMap;

use pseudotable_core::{Document, Fields};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as Json};
use tracing::debug;

/// A typed field value as the REST API sends it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Value {
    #[serde(rename = "stringValue", default, skip_serializing_if = "Option::is_none")]
    pub string_value: Option<String>,
}

/// A document resource.
#[derive(Debug, Clone, Deserialize)]
pub struct RawDocument {
    /// Full resource name, `projects/<p>/databases/<d>/documents/<path>`
    pub name: String,
    #[serde(default)]
    pub fields: BTreeMap<String, Value>,
}

/// Response of a collection listing.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResponse {
    #[serde(default)]
    pub documents: Vec<RawDocument>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

/// One element of a `runQuery` response stream.
#[derive(Debug, Deserialize)]
pub struct QueryResult {
    #[serde(default)]
    pub document: Option<RawDocument>,
}

impl RawDocument {
    /// Convert to a core document, keeping only string fields.
    pub fn into_document(self) -> Document {
        let id = self.name.rsplit('/').next().unwrap_or_default().to_string();
        let mut fields = Fields::new();
        for (name, value) in self.fields {
            match value.string_value {
                Some(text) => {
                    fields.insert(name, text);
                }
                None => debug!(document = %self.name, field = %name, "skipping non-string field"),
            }
        }
        Document { id, fields }
    }
}

/// `fields` object for `fields`.
pub fn encode_fields(fields: &Fields) -> Json {
    let encoded: serde_json::Map<String, Json> = fields
        .iter()
        .map(|(name, text)| (name.clone(), json!({ "stringValue": text })))
        .collect();
    Json::Object(encoded)
}

/// One `Write` of a commit request.
///
/// `must_not_exist` attaches the `exists: false` precondition.
pub fn encode_write(name: &str, fields: &Fields, must_not_exist: bool) -> Json {
    let mut write = json!({
        "update": {
            "name": name,
            "fields": encode_fields(fields),
        }
    });
    if must_not_exist {
        write["currentDocument"] = json!({ "exists": false });
    }
    write
}

/// Body of a `runQuery` request matching `field == value` in one collection.
pub fn encode_eq_query(collection_id: &str, field: &str, value: &str) -> Json {
    json!({
        "structuredQuery": {
            "from": [{ "collectionId": collection_id }],
            "where": {
                "fieldFilter": {
                    "field": { "fieldPath": field },
                    "op": "EQUAL",
                    "value": { "stringValue": value },
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_document() {
        let raw: RawDocument = serde_json::from_value(json!({
            "name": "projects/p/databases/(default)/documents/tables/t/mappings/+254700000001",
            "fields": {
                "uuid": { "stringValue": "avf-phone-uuid-1" },
                "count": { "integerValue": "3" }
            },
            "createTime": "2024-01-01T00:00:00Z"
        }))
        .unwrap();
        let doc = raw.into_document();
        assert_eq!(doc.id, "+254700000001");
        assert_eq!(doc.field("uuid"), Some("avf-phone-uuid-1"));
        assert_eq!(doc.fields.len(), 1);
    }

    #[test]
    fn test_encode_create_write() {
        let fields = Fields::from([("uuid".to_string(), "p-1".to_string())]);
        let name = "projects/p/databases/d/documents/tables/t/mappings/a";
        let write = encode_write(name, &fields, true);
        assert_eq!(write["update"]["fields"]["uuid"]["stringValue"], "p-1");
        assert_eq!(write["currentDocument"]["exists"], false);

        let set = encode_write("projects/p/databases/d/documents/tables/t", &fields, false);
        assert!(set.get("currentDocument").is_none());
    }

    #[test]
    fn test_list_and_query_responses() {
        let empty: ListResponse = serde_json::from_str("{}").unwrap();
        assert!(empty.documents.is_empty());
        assert!(empty.next_page_token.is_none());

        let results: Vec<QueryResult> = serde_json::from_value(json!([
            { "readTime": "2024-01-01T00:00:00Z" }
        ]))
        .unwrap();
        assert!(results[0].document.is_none());
    }

    #[test]
    fn test_eq_query_shape() {
        let query = encode_eq_query("mappings", "uuid", "p-1");
        let filter = &query["structuredQuery"]["where"]["fieldFilter"];
        assert_eq!(filter["op"], "EQUAL");
        assert_eq!(filter["value"]["stringValue"], "p-1");
        assert_eq!(query["structuredQuery"]["from"][0]["collectionId"], "mappings");
    }
}
