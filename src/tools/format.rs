//! Conversion between tool arguments (plain JSON) and BSON, and rendering
//! of result documents as canonical extended JSON.

use crate::error::{DbError, DbResult};
use mongodb::bson::{Bson, Document};
use serde_json::{Map, Value as JsonValue};

pub type JsonObject = Map<String, JsonValue>;

/// Parse an extended-JSON object argument into a BSON document.
pub fn to_document(field: &str, value: JsonObject) -> DbResult<Document> {
    Document::try_from(value)
        .map_err(|e| DbError::validation(format!("`{field}` is not a valid document: {e}")))
}

/// Like [`to_document`], treating a missing argument as `{}`.
pub fn to_optional_document(field: &str, value: Option<JsonObject>) -> DbResult<Document> {
    value.map_or_else(|| Ok(Document::new()), |v| to_document(field, v))
}

pub fn to_documents(field: &str, values: Vec<JsonObject>) -> DbResult<Vec<Document>> {
    values
        .into_iter()
        .enumerate()
        .map(|(i, v)| to_document(&format!("{field}[{i}]"), v))
        .collect()
}

/// Canonical extended JSON keeps dates, ObjectIds, binary and numeric widths.
pub fn to_extjson(document: Document) -> String {
    Bson::Document(document).into_canonical_extjson().to_string()
}

pub fn document_blocks(documents: Vec<Document>) -> Vec<String> {
    documents.into_iter().map(to_extjson).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::{doc, oid::ObjectId, DateTime};
    use serde_json::json;

    fn object(value: JsonValue) -> JsonObject {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_extended_json_arguments_are_parsed() {
        let parsed = to_document(
            "filter",
            object(json!({ "_id": { "$oid": "507f1f77bcf86cd799439011" }, "n": 3 })),
        )
        .unwrap();
        assert!(matches!(parsed.get("_id"), Some(Bson::ObjectId(_))));
    }

    #[test]
    fn test_invalid_extended_json_is_validation_error() {
        let err = to_document("filter", object(json!({ "_id": { "$oid": "nope" } }))).unwrap_err();
        assert!(matches!(err, DbError::Validation { .. }));
        assert!(err.to_string().contains("filter"));
    }

    #[test]
    fn test_missing_optional_document_is_empty() {
        assert!(to_optional_document("sort", None).unwrap().is_empty());
    }

    #[test]
    fn test_canonical_output_preserves_types() {
        let id = ObjectId::parse_str("507f1f77bcf86cd799439011").unwrap();
        let text = to_extjson(doc! {
            "_id": id,
            "at": DateTime::from_millis(0),
            "n": 1_i32,
        });
        let value: JsonValue = serde_json::from_str(&text).unwrap();
        assert_eq!(value["_id"]["$oid"], "507f1f77bcf86cd799439011");
        assert_eq!(value["at"]["$date"]["$numberLong"], "0");
        assert_eq!(value["n"]["$numberInt"], "1");
    }

    #[test]
    fn test_document_order_is_kept() {
        let blocks = document_blocks(vec![doc! { "a": 1 }, doc! { "b": 2 }]);
        assert!(blocks[0].contains("\"a\""));
        assert!(blocks[1].contains("\"b\""));
    }
}
