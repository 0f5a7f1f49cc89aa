use serde::Deserialize;
use serde_json::Value;

use crate::core::error::AppError;
use crate::stages::image::decode_base64_image;

/// The several shapes the legacy Edge Gateway body has carried a document's
/// image bytes in, modeled as a single tagged variant with one
/// normalization function rather than scattered ternaries across handlers
/// (§9 re-architecture guidance).
#[derive(Debug, Clone)]
pub enum DocumentPayload {
    /// `documents[*].pages[0].base64`
    Base64Nested(String),
    /// `documents[*].base64`
    Base64Flat(String),
    /// `documents[*].data`
    Base64DataKey(String),
}

impl DocumentPayload {
    pub fn from_document_value(value: &Value) -> Option<Self> {
        if let Some(b64) = value
            .get("pages")
            .and_then(|p| p.get(0))
            .and_then(|p| p.get("base64"))
            .and_then(Value::as_str)
        {
            return Some(Self::Base64Nested(b64.to_string()));
        }
        if let Some(b64) = value.get("base64").and_then(Value::as_str) {
            return Some(Self::Base64Flat(b64.to_string()));
        }
        if let Some(b64) = value.get("data").and_then(Value::as_str) {
            return Some(Self::Base64DataKey(b64.to_string()));
        }
        None
    }

    pub fn decode(&self) -> Result<Vec<u8>, AppError> {
        match self {
            Self::Base64Nested(s) | Self::Base64Flat(s) | Self::Base64DataKey(s) => decode_base64_image(s),
        }
    }
}

const FRONT_ID_TYPES: &[&str] = &["id_card", "passport", "drivers_license", "id-card"];
const SELFIE_TYPES: &[&str] = &["selfie", "face"];

#[derive(Debug, Deserialize)]
pub struct LegacyVerifyRequest {
    pub documents: Vec<Value>,
}

/// Picks the front-ID and selfie documents out of the legacy `documents`
/// array by their declared `type` (§6 "Edge Gateway specifics").
pub fn extract_documents(documents: &[Value]) -> Result<(DocumentPayload, DocumentPayload), AppError> {
    let mut front_id = None;
    let mut selfie = None;

    for doc in documents {
        let doc_type = doc.get("type").and_then(Value::as_str).unwrap_or("").to_ascii_lowercase();
        let payload = DocumentPayload::from_document_value(doc);

        if FRONT_ID_TYPES.contains(&doc_type.as_str()) && front_id.is_none() {
            front_id = payload.clone();
        } else if SELFIE_TYPES.contains(&doc_type.as_str()) && selfie.is_none() {
            selfie = payload;
        }
    }

    let front_id = front_id.ok_or_else(|| AppError::BadInput("no front identity document found".to_string()))?;
    let selfie = selfie.ok_or_else(|| AppError::BadInput("no selfie document found".to_string()))?;
    Ok((front_id, selfie))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reads_nested_pages_location() {
        let doc = json!({ "type": "passport", "pages": [{ "base64": "QUJD" }] });
        let payload = DocumentPayload::from_document_value(&doc).unwrap();
        assert!(matches!(payload, DocumentPayload::Base64Nested(_)));
    }

    #[test]
    fn reads_flat_base64_location() {
        let doc = json!({ "type": "selfie", "base64": "QUJD" });
        let payload = DocumentPayload::from_document_value(&doc).unwrap();
        assert!(matches!(payload, DocumentPayload::Base64Flat(_)));
    }

    #[test]
    fn reads_data_key_location() {
        let doc = json!({ "type": "id_card", "data": "QUJD" });
        let payload = DocumentPayload::from_document_value(&doc).unwrap();
        assert!(matches!(payload, DocumentPayload::Base64DataKey(_)));
    }

    #[test]
    fn extracts_front_id_and_selfie_regardless_of_array_order() {
        let documents = vec![
            json!({ "type": "face", "base64": "eA==" }),
            json!({ "type": "drivers_license", "base64": "eQ==" }),
        ];
        let (front, selfie) = extract_documents(&documents).unwrap();
        assert_eq!(front.decode().unwrap(), b"y");
        assert_eq!(selfie.decode().unwrap(), b"x");
    }

    #[test]
    fn missing_selfie_is_bad_input() {
        let documents = vec![json!({ "type": "passport", "base64": "eA==" })];
        assert!(extract_documents(&documents).is_err());
    }
}
